// tests/test_image.rs — Integration tests for the host Image<T> container.
//
// These run with `cargo test --test test_image`.
// Unlike unit tests (inside #[cfg(test)] mod tests {}), integration tests
// live in tests/ and can only access the crate's public API — a good check
// that the public surface is usable.

use depth_inpaint::image::{Image, Rgba};

// ===== Construction & basic access =====

#[test]
fn image_new_zero_initialized() {
    let img: Image<f32> = Image::new(100, 50);
    assert_eq!(img.width(), 100);
    assert_eq!(img.height(), 50);
    assert_eq!(img.get(0, 0), 0.0);
    assert_eq!(img.get(99, 49), 0.0);
}

#[test]
fn image_set_get_consistency() {
    let mut img: Image<u32> = Image::new(10, 10);
    // Write a checkerboard pattern.
    for y in 0..10 {
        for x in 0..10 {
            img.set(x, y, ((x + y) % 2) as u32);
        }
    }
    for y in 0..10 {
        for x in 0..10 {
            assert_eq!(img.get(x, y), ((x + y) % 2) as u32, "mismatch at ({x}, {y})");
        }
    }
}

#[test]
fn image_from_vec_layout() {
    // 3×2 image, row-major:
    //  [10, 20, 30]
    //  [40, 50, 60]
    let img = Image::from_vec(3, 2, vec![10.0f32, 20.0, 30.0, 40.0, 50.0, 60.0]);
    assert_eq!(img.get(0, 0), 10.0);
    assert_eq!(img.get(2, 0), 30.0);
    assert_eq!(img.get(0, 1), 40.0);
    assert_eq!(img.get(2, 1), 60.0);
}

#[test]
fn rgba_pixels_round_trip() {
    let mut img: Image<Rgba> = Image::new(4, 4);
    img.set(1, 2, [0.1, 0.2, 0.3, 0.0]);
    assert_eq!(img.get(1, 2), [0.1, 0.2, 0.3, 0.0]);
    assert_eq!(img.get(0, 0), [0.0; 4]);
}

// ===== Stride (host-pitched layout) =====

#[test]
fn image_stride_does_not_affect_pixel_access() {
    // Width 3, stride 8 — lots of padding.
    let mut img: Image<f32> = Image::new_with_stride(3, 2, 8);
    img.set(0, 0, 1.0);
    img.set(2, 0, 2.0);
    img.set(0, 1, 3.0);
    img.set(2, 1, 4.0);

    assert_eq!(img.get(2, 1), 4.0);
    // Row slices are `width` long, not `stride` long.
    assert_eq!(img.row(0), &[1.0, 0.0, 2.0]);
    assert_eq!(img.buffer_len(), 16);
}

#[test]
fn equality_ignores_padding() {
    let packed = Image::from_vec(2, 2, vec![1u32, 2, 3, 4]);
    let pitched = Image::from_vec_with_stride(2, 2, 3, vec![1u32, 2, 77, 3, 4, 88]);
    assert_eq!(packed, pitched);
    assert_eq!(pitched.to_contiguous().stride(), 2);
    assert_eq!(pitched.to_contiguous().as_slice(), packed.as_slice());
}

#[test]
fn pixels_iterator_skips_padding() {
    let img = Image::from_vec_with_stride(2, 2, 4, vec![1u32, 2, 9, 9, 3, 4, 9, 9]);
    let collected: Vec<(usize, usize, u32)> = img.pixels().collect();
    assert_eq!(collected, vec![(0, 0, 1), (1, 0, 2), (0, 1, 3), (1, 1, 4)]);
}

#[test]
fn scaled_multiplies_every_pixel() {
    let img = Image::from_vec(2, 1, vec![1.5f32, -2.0]);
    assert_eq!(img.scaled(2.0), Image::from_vec(2, 1, vec![3.0, -4.0]));
}

#[test]
fn same_size_ignores_type_and_stride() {
    let a: Image<f32> = Image::new(5, 3);
    let b: Image<Rgba> = Image::new_with_stride(5, 3, 9);
    let c: Image<u32> = Image::new(3, 5);
    assert!(a.same_size(&b));
    assert!(!a.same_size(&c));
}

// ===== Contract violations =====

#[test]
#[should_panic(expected = "out of bounds")]
fn out_of_bounds_get_panics() {
    let img: Image<f32> = Image::new(4, 4);
    img.get(4, 0);
}

#[test]
#[should_panic(expected = "must be >= width")]
fn stride_smaller_than_width_panics() {
    let _: Image<f32> = Image::new_with_stride(8, 2, 4);
}
