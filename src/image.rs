// image.rs — Host-side 2D image container, generic over pixel type.
//
// This is the host half of every transfer: depth maps, edge-strength maps,
// RGBA frames, per-tile counts and flags all live in an `Image<T>` before
// upload and after download.
//
// Rows may be padded (stride > width). A stride equal to the width is the
// "host-contiguous" layout; anything larger is the "host-pitched" layout.
// The device side keeps its own pitch (see gpu/buffer.rs) and every transfer
// converts between the two.
//
// New concepts this file introduces:
// - Trait definition + implementation (Pixel)
// - Supertraits from another crate (bytemuck::Pod) so pixels can be viewed
//   as raw bytes without unsafe casts
// - impl Iterator (return type that hides the concrete iterator type)

use std::fmt;

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------
// Trait bounds explained:
//   Copy + Default — trivially copyable, with a zero value for new()
//   PartialEq      — tests compare whole images
//   Send + Sync    — images move between the host thread and readback callbacks
//   Pod            — plain old data: any bit pattern is valid, no padding,
//                    so `bytemuck::cast_slice` can hand the pixels to wgpu.

/// Trait for types that can serve as pixel values in an Image.
///
/// Every implementor is a multiple of 4 bytes, which is what wgpu requires
/// for buffer copy sizes and offsets.
pub trait Pixel: Copy + Default + PartialEq + Send + Sync + bytemuck::Pod + 'static {}

impl Pixel for f32 {}
impl Pixel for u32 {}
impl Pixel for [f32; 4] {}

/// Four-channel float color. Channel 3 (alpha) equal to zero marks a hole.
pub type Rgba = [f32; 4];

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------
// Row-major, contiguous buffer with explicit stride.
//
// Memory layout (stride = 5, width = 4):
//
//   data index:  0  1  2  3 [4]  5  6  7  8 [9] 10 11 12 13 [14]
//   pixel:       ■  ■  ■  ■  ·   ■  ■  ■  ■  ·   ■  ■  ■  ■  ·
//   row:         |--- row 0 ---|  |--- row 1 ---|  |--- row 2 ---|

/// A 2D image with runtime dimensions, generic over pixel type `T`.
pub struct Image<T: Pixel> {
    /// Pixel data in row-major order. Length = height * stride.
    data: Vec<T>,
    width: usize,
    height: usize,
    /// Row stride in *elements* (not bytes). stride >= width.
    stride: usize,
}

impl<T: Pixel> Clone for Image<T> {
    fn clone(&self) -> Self {
        Image {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }
}

impl<T: Pixel> Image<T> {
    // --- Constructors ---

    /// Create a zero-initialized image. Stride equals width.
    pub fn new(width: usize, height: usize) -> Self {
        Self::new_with_stride(width, height, width)
    }

    /// Create a zero-initialized image with an explicit stride.
    ///
    /// # Panics
    /// Panics if `stride < width`.
    pub fn new_with_stride(width: usize, height: usize, stride: usize) -> Self {
        assert!(
            stride >= width,
            "stride ({stride}) must be >= width ({width})"
        );
        Image {
            data: vec![T::default(); height * stride],
            width,
            height,
            stride,
        }
    }

    /// Create an image with every pixel set to `value`.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Image {
            data: vec![value; width * height],
            width,
            height,
            stride: width,
        }
    }

    /// Create an image from an existing pixel vector (no stride padding).
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// Create an image from raw data with explicit stride.
    ///
    /// # Panics
    /// Panics if `data.len() != height * stride` or `stride < width`.
    pub fn from_vec_with_stride(
        width: usize,
        height: usize,
        stride: usize,
        data: Vec<T>,
    ) -> Self {
        assert!(stride >= width, "stride ({stride}) must be >= width ({width})");
        assert_eq!(
            data.len(),
            height * stride,
            "data length ({}) must equal height * stride ({})",
            data.len(),
            height * stride,
        );
        Image {
            data,
            width,
            height,
            stride,
        }
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// `true` when both images have the same width and height (strides may differ).
    pub fn same_size<U: Pixel>(&self, other: &Image<U>) -> bool {
        self.width == other.width() && self.height == other.height()
    }

    /// Get the pixel value at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.stride + x]
    }

    /// Get a mutable reference to the pixel at (x, y).
    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        &mut self.data[idx]
    }

    /// Set the pixel at (x, y) to the given value.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        *self.get_mut(x, y) = value;
    }

    /// Borrow a single row (valid pixels only, no stride padding).
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Mutable borrow of a single row.
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Set every pixel (padding included) to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Iterate over all pixels as `(x, y, value)` tuples, skipping padding.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| (x, y, self.data[y * self.stride + x]))
        })
    }

    /// Copy the valid pixels into a tightly packed image (stride == width).
    pub fn to_contiguous(&self) -> Image<T> {
        if self.stride == self.width {
            return self.clone();
        }
        let mut data = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            data.extend_from_slice(self.row(y));
        }
        Image::from_vec(self.width, self.height, data)
    }

    /// Access the underlying data as a flat slice, padding included.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to the underlying data.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Total number of elements in the buffer (including stride padding).
    pub fn buffer_len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl Image<f32> {
    /// Multiply every pixel by `factor`.
    pub fn scaled(&self, factor: f32) -> Image<f32> {
        let mut out = self.clone();
        for v in out.as_mut_slice() {
            *v *= factor;
        }
        out
    }
}

impl<T: Pixel> PartialEq for Image<T> {
    /// Compares dimensions and valid pixels; stride padding is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && (0..self.height).all(|y| self.row(y) == other.row(y))
    }
}

// Debug formatting — useful for small images in tests.
impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{}, stride={} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
            self.stride,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Index / IndexMut — img[(x, y)] syntax
// ---------------------------------------------------------------------------

impl<T: Pixel> std::ops::Index<(usize, usize)> for Image<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &T {
        self.bounds_check(x, y);
        &self.data[y * self.stride + x]
    }
}

impl<T: Pixel> std::ops::IndexMut<(usize, usize)> for Image<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        &mut self.data[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_f32() {
        let img: Image<f32> = Image::new(10, 5);
        assert_eq!(img.width(), 10);
        assert_eq!(img.height(), 5);
        assert_eq!(img.stride(), 10);
        for (_, _, v) in img.pixels() {
            assert_eq!(v, 0.0);
        }
    }

    #[test]
    fn test_roundtrip() {
        let mut img: Image<u32> = Image::new(4, 3);
        img.set(0, 0, 10);
        img.set(3, 2, 255);
        img.set(1, 1, 42);
        assert_eq!(img.get(0, 0), 10);
        assert_eq!(img.get(3, 2), 255);
        assert_eq!(img.get(1, 1), 42);
        assert_eq!(img.get(2, 2), 0);
    }

    #[test]
    fn test_stride_padding() {
        let img: Image<f32> = Image::new_with_stride(4, 3, 8);
        assert_eq!(img.stride(), 8);
        assert_eq!(img.buffer_len(), 3 * 8);
    }

    #[test]
    fn test_row_slice_skips_padding() {
        let img = Image::from_vec_with_stride(
            3, 2, 4,
            vec![1u32, 2, 3, 99,
                 4, 5, 6, 99],
        );
        assert_eq!(img.row(0), &[1, 2, 3]);
        assert_eq!(img.row(1), &[4, 5, 6]);
    }

    #[test]
    fn test_to_contiguous_strips_padding() {
        let img = Image::from_vec_with_stride(
            2, 2, 3,
            vec![1.0f32, 2.0, -1.0,
                 3.0, 4.0, -1.0],
        );
        let packed = img.to_contiguous();
        assert_eq!(packed.stride(), 2);
        assert_eq!(packed.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
        // Equality ignores padding.
        assert_eq!(packed, img);
    }

    #[test]
    fn test_scaled() {
        let img = Image::from_vec(2, 1, vec![1.5f32, 0.0]);
        let s = img.scaled(2.0);
        assert_eq!(s.as_slice(), &[3.0, 0.0]);
    }

    #[test]
    fn test_rgba_pixels() {
        let mut img: Image<Rgba> = Image::new(2, 2);
        img.set(1, 0, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(img.get(1, 0)[3], 1.0);
        assert_eq!(img.get(0, 0), [0.0; 4]);
    }

    #[test]
    fn test_filled_and_fill() {
        let mut img = Image::filled(3, 3, 7u32);
        assert!(img.pixels().all(|(_, _, v)| v == 7));
        img.fill(1);
        assert!(img.pixels().all(|(_, _, v)| v == 1));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_get_out_of_bounds() {
        let img: Image<f32> = Image::new(4, 4);
        img.get(4, 0);
    }

    #[test]
    #[should_panic(expected = "stride")]
    fn test_stride_less_than_width() {
        let _img: Image<f32> = Image::new_with_stride(10, 5, 8);
    }

    #[test]
    fn test_index_read_write() {
        let mut img: Image<u32> = Image::new(4, 3);
        img[(1, 2)] = 42;
        assert_eq!(img[(1, 2)], 42);
        assert_eq!(img.get(1, 2), 42);
    }
}
