// gpu/buffer.rs — Pitched 2-D device buffers and host↔device transfers.
//
// A DeviceBuffer<T> is a `height × width` array of T in one wgpu storage
// buffer. Rows start `pitch` bytes apart, with the pitch rounded up to
// wgpu::COPY_BYTES_PER_ROW_ALIGNMENT (256) so the same allocation can be
// copied straight into a texture for sampling:
//
//   width = 5 f32 (20 bytes), pitch = 256 bytes
//
//   byte 0                  20                                    256
//   row 0: [ e e e e e ][.............. padding ...............]
//   row 1: [ e e e e e ][.............. padding ...............]
//
// Host images may be contiguous (stride == width) or pitched (stride >
// width); every transfer repacks rows between the host stride and the device
// pitch.
//
// TRANSFERS
// ─────────
// Synchronous transfers submit and wait. The `_async` variants record into a
// GpuStream and stay ordered with the kernels on that stream. Async downloads
// return a PendingDownload that borrows the host destination; it copies the
// data out when resolved, after the stream has been synchronized.
//
// NEW RUST CONCEPTS
// ──────────────────
// - `PhantomData<T>` — records the element type without storing a T.
// - Struct lifetimes on a return value (`PendingDownload<'d, T>`): the
//   destination stays mutably borrowed until the download is resolved.
// - `#[must_use]` on a type — the compiler warns when a pending download
//   is dropped without being resolved.

use std::marker::PhantomData;
use std::mem::size_of;

use wgpu::util::DeviceExt;

use crate::gpu::device::{map_read_blocking, GpuDevice};
use crate::gpu::sampler::{BoundarySampler, SamplerConfig, TexelElement};
use crate::gpu::stream::GpuStream;
use crate::image::{Image, Pixel};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

// ---------------------------------------------------------------------------
// DeviceBuffer
// ---------------------------------------------------------------------------

/// A pitched 2-D array of `T` in device memory.
///
/// Owns its allocation and at most one cached [`BoundarySampler`]. Both are
/// released when the buffer is dropped.
pub struct DeviceBuffer<T: Pixel> {
    buffer: wgpu::Buffer,
    width: usize,
    height: usize,
    /// Row pitch in bytes.
    pitch: usize,
    cached_sampler: Option<BoundarySampler>,
    _marker: PhantomData<T>,
}

impl<T: Pixel> DeviceBuffer<T> {
    /// Allocate `height × width` elements. Contents are unspecified until
    /// written.
    pub fn new(gpu: &GpuDevice, height: usize, width: usize) -> Self {
        let row_bytes = width * size_of::<T>();
        let pitch = align_to(row_bytes as u32, COPY_ALIGNMENT) as usize;
        if pitch != row_bytes {
            log::warn!(
                "device pitch {pitch} B differs from packed row size {row_bytes} B ({}×{} of {})",
                width,
                height,
                std::any::type_name::<T>()
            );
        }
        let size = (pitch * height).max(wgpu::COPY_BUFFER_ALIGNMENT as usize) as u64;
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("DeviceBuffer"),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        DeviceBuffer {
            buffer,
            width,
            height,
            pitch,
            cached_sampler: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row pitch in bytes.
    #[inline]
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// Row pitch in elements, as the kernels index it.
    #[inline]
    pub fn pitch_elements(&self) -> usize {
        self.pitch / size_of::<T>()
    }

    /// The underlying storage buffer, for binding.
    #[inline]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    // -----------------------------------------------------------------------
    // Upload
    // -----------------------------------------------------------------------

    /// Copy a whole host image (contiguous or pitched) and wait for it.
    pub fn upload(&mut self, gpu: &GpuDevice, src: &Image<T>) {
        let mut stream = GpuStream::new(gpu);
        self.upload_async(&mut stream, src);
        stream.synchronize();
    }

    /// Record a copy of a whole host image.
    ///
    /// # Panics
    /// Panics if `src` is not `height × width`.
    pub fn upload_async(&mut self, stream: &mut GpuStream, src: &Image<T>) {
        assert!(
            src.width() == self.width && src.height() == self.height,
            "upload of {}×{} image into {}×{} buffer",
            src.width(),
            src.height(),
            self.width,
            self.height
        );
        let staging = pack_pitched(src, self.pitch);
        self.record_upload(stream, 0, &staging);
    }

    /// Record a copy of `data` into a flattened buffer at byte offset
    /// `start_byte`.
    ///
    /// # Panics
    /// Panics if the buffer is not flat (`height != 1`), the offset is not
    /// element-aligned, or the range runs past the end.
    pub fn upload_part_async(&mut self, stream: &mut GpuStream, start_byte: usize, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.check_part(start_byte, bytes.len());
        self.record_upload(stream, start_byte as u64, bytes);
    }

    fn record_upload(&self, stream: &mut GpuStream, offset: u64, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let staging = stream.gpu().device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("DeviceBuffer::upload staging"),
            contents: bytes,
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        stream
            .encoder()
            .copy_buffer_to_buffer(&staging, 0, &self.buffer, offset, bytes.len() as u64);
    }

    fn check_part(&self, start_byte: usize, len: usize) {
        assert_eq!(self.height, 1, "partial transfers require a flattened buffer (height 1)");
        assert_eq!(
            start_byte % size_of::<T>(),
            0,
            "start byte {start_byte} is not a multiple of the element size"
        );
        assert!(
            start_byte + len <= self.width * size_of::<T>(),
            "partial transfer of {len} B at {start_byte} exceeds buffer of {} B",
            self.width * size_of::<T>()
        );
    }

    // -----------------------------------------------------------------------
    // Download
    // -----------------------------------------------------------------------

    /// Copy the whole buffer into `dest` (contiguous or pitched) and wait.
    pub fn download(&self, gpu: &GpuDevice, dest: &mut Image<T>) {
        let mut stream = GpuStream::new(gpu);
        self.download_async(&mut stream, dest).resolve(&mut stream);
    }

    /// Copy the whole buffer, keeping the device pitch as the image stride.
    pub fn download_pitched(&self, gpu: &GpuDevice) -> Image<T> {
        let mut dest = Image::new_with_stride(self.width, self.height, self.pitch_elements());
        self.download(gpu, &mut dest);
        dest
    }

    /// Record a copy of the whole buffer into `dest`.
    ///
    /// # Panics
    /// Panics if `dest` is not `height × width`.
    pub fn download_async<'d>(
        &self,
        stream: &mut GpuStream,
        dest: &'d mut Image<T>,
    ) -> PendingDownload<'d, T> {
        assert!(
            dest.width() == self.width && dest.height() == self.height,
            "download of {}×{} buffer into {}×{} image",
            self.width,
            self.height,
            dest.width(),
            dest.height()
        );
        let staging = self.readback_buffer(stream.gpu(), self.pitch * self.height);
        if self.height > 0 {
            stream.encoder().copy_buffer_to_buffer(
                &self.buffer,
                0,
                &staging,
                0,
                (self.pitch * self.height) as u64,
            );
        }
        PendingDownload {
            staging,
            staging_pitch: self.pitch,
            rows: self.height,
            cols: self.width,
            dest: Destination::Image { image: dest, x: 0, y: 0 },
        }
    }

    /// Record a copy of `dest.len()` elements starting at byte `start_byte`
    /// of a flattened buffer.
    pub fn download_part_async<'d>(
        &self,
        stream: &mut GpuStream,
        start_byte: usize,
        dest: &'d mut [T],
    ) -> PendingDownload<'d, T> {
        let len = dest.len() * size_of::<T>();
        self.check_part(start_byte, len);
        let staging = self.readback_buffer(stream.gpu(), len);
        if len > 0 {
            stream.encoder().copy_buffer_to_buffer(
                &self.buffer,
                start_byte as u64,
                &staging,
                0,
                len as u64,
            );
        }
        PendingDownload {
            staging,
            staging_pitch: len,
            rows: 1,
            cols: dest.len(),
            dest: Destination::Slice(dest),
        }
    }

    /// Record a copy of the `height × width` rectangle at (`src_x`, `src_y`)
    /// into `dest` at (`dest_x`, `dest_y`).
    ///
    /// # Panics
    /// Panics if either rectangle leaves its image.
    #[allow(clippy::too_many_arguments)]
    pub fn download_rect_async<'d>(
        &self,
        stream: &mut GpuStream,
        src_y: usize,
        src_x: usize,
        height: usize,
        width: usize,
        dest_y: usize,
        dest_x: usize,
        dest: &'d mut Image<T>,
    ) -> PendingDownload<'d, T> {
        assert!(
            src_x + width <= self.width && src_y + height <= self.height,
            "source rectangle exceeds {}×{} buffer",
            self.width,
            self.height
        );
        assert!(
            dest_x + width <= dest.width() && dest_y + height <= dest.height(),
            "destination rectangle exceeds {}×{} image",
            dest.width(),
            dest.height()
        );
        let row_bytes = width * size_of::<T>();
        let staging = self.readback_buffer(stream.gpu(), row_bytes * height);
        if row_bytes > 0 {
            let encoder = stream.encoder();
            for r in 0..height {
                let src_offset = (src_y + r) * self.pitch + src_x * size_of::<T>();
                encoder.copy_buffer_to_buffer(
                    &self.buffer,
                    src_offset as u64,
                    &staging,
                    (r * row_bytes) as u64,
                    row_bytes as u64,
                );
            }
        }
        PendingDownload {
            staging,
            staging_pitch: row_bytes,
            rows: height,
            cols: width,
            dest: Destination::Image { image: dest, x: dest_x, y: dest_y },
        }
    }

    fn readback_buffer(&self, gpu: &GpuDevice, size: usize) -> wgpu::Buffer {
        gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("DeviceBuffer::readback"),
            size: size.max(wgpu::COPY_BUFFER_ALIGNMENT as usize) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    // -----------------------------------------------------------------------
    // Fill
    // -----------------------------------------------------------------------

    /// Record setting every element to `value`.
    pub fn fill(&mut self, stream: &mut GpuStream, value: T) {
        if bytemuck::bytes_of(&value).iter().all(|&b| b == 0) {
            stream.encoder().clear_buffer(&self.buffer, 0, None);
        } else {
            let filled = Image::filled(self.width, self.height, value);
            let staging = pack_pitched(&filled, self.pitch);
            self.record_upload(stream, 0, &staging);
        }
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

impl<T: TexelElement> DeviceBuffer<T> {
    /// Build a fresh sampler over the current contents. Not cached.
    pub fn create_sampler(&self, stream: &mut GpuStream, config: SamplerConfig) -> BoundarySampler {
        let sampler = BoundarySampler::new(
            stream.gpu(),
            self.width as u32,
            self.height as u32,
            T::FORMAT,
            config,
        );
        sampler.refresh(stream, &self.buffer, self.pitch as u32);
        sampler
    }

    /// Return a sampler for `config`, reusing the cached one when the
    /// configuration matches and rebuilding it otherwise. The texels are
    /// refreshed from the buffer either way.
    pub fn acquire_sampler(
        &mut self,
        stream: &mut GpuStream,
        config: SamplerConfig,
    ) -> &BoundarySampler {
        if self.cached_sampler.as_ref().is_some_and(|s| s.config != config) {
            log::debug!("boundary sampler configuration changed, rebuilding");
            self.cached_sampler = None;
        }
        let gpu = stream.gpu();
        let (width, height) = (self.width as u32, self.height as u32);
        let sampler = self
            .cached_sampler
            .get_or_insert_with(|| BoundarySampler::new(gpu, width, height, T::FORMAT, config));
        sampler.refresh(stream, &self.buffer, self.pitch as u32);
        sampler
    }

    /// Record writing every element by sampling `sampler` at the element's
    /// normalized center. Resamples when the sizes differ.
    pub fn copy_from_sampler(&mut self, stream: &mut GpuStream, sampler: &BoundarySampler) {
        record_resample::<T>(
            stream,
            sampler,
            &self.buffer,
            self.width as u32,
            self.height as u32,
            self.pitch_elements() as u32,
        );
    }

    /// Record a resampling copy from `other` through a temporary clamped,
    /// nearest-neighbor sampler.
    pub fn copy_from(&mut self, stream: &mut GpuStream, other: &DeviceBuffer<T>) {
        let sampler = other.create_sampler(stream, SamplerConfig::default());
        self.copy_from_sampler(stream, &sampler);
    }
}

/// Uniform parameters for resample.wgsl.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ResampleParams {
    width: u32,
    height: u32,
    pitch: u32,
    _pad: u32,
}

fn record_resample<T: TexelElement>(
    stream: &mut GpuStream,
    sampler: &BoundarySampler,
    dest: &wgpu::Buffer,
    width: u32,
    height: u32,
    pitch: u32,
) {
    let gpu = stream.gpu();
    let filtering = sampler.config.is_filtering();

    // The element type and workgroup size are baked into the source.
    let shader_src = include_str!("../shaders/resample.wgsl")
        .replace("{{WG_X}}", &gpu.workgroup_size.x.to_string())
        .replace("{{WG_Y}}", &gpu.workgroup_size.y.to_string())
        .replace("{{VALUE_TYPE}}", T::WGSL_TYPE)
        .replace("{{FROM_SAMPLE}}", T::WGSL_FROM_SAMPLE);
    let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("resample.wgsl"),
        source: wgpu::ShaderSource::Wgsl(shader_src.into()),
    });

    let [tex_entry, sampler_entry] = BoundarySampler::layout_entries(0, filtering);
    let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("resample BGL"),
        entries: &[
            tex_entry,
            sampler_entry,
            storage_entry(2, false),
            uniform_entry(3),
        ],
    });
    let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("resample pipeline layout"),
        bind_group_layouts: &[&bgl],
        push_constant_ranges: &[],
    });
    let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("resample"),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: "resample",
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });

    let params = ResampleParams { width, height, pitch, _pad: 0 };
    let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("ResampleParams"),
        contents: bytemuck::bytes_of(&params),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let [tex_bind, sampler_bind] = sampler.bind_entries(0);
    let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("resample bind group"),
        layout: &bgl,
        entries: &[
            tex_bind,
            sampler_bind,
            wgpu::BindGroupEntry { binding: 2, resource: dest.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 3, resource: params_buf.as_entire_binding() },
        ],
    });

    let (dx, dy) = gpu.dispatch_size(width, height);
    let mut pass = stream.encoder().begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("resample"),
        timestamp_writes: None,
    });
    pass.set_pipeline(&pipeline);
    pass.set_bind_group(0, &bind_group, &[]);
    pass.dispatch_workgroups(dx, dy, 1);
}

// ---------------------------------------------------------------------------
// Bind group layout helpers (shared with gpu/inpaint.rs)
// ---------------------------------------------------------------------------

pub(crate) fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

// ---------------------------------------------------------------------------
// PendingDownload
// ---------------------------------------------------------------------------

enum Destination<'d, T: Pixel> {
    Image { image: &'d mut Image<T>, x: usize, y: usize },
    Slice(&'d mut [T]),
}

/// A recorded device→host copy waiting for its stream to finish.
#[must_use = "a pending download writes nothing until it is resolved"]
pub struct PendingDownload<'d, T: Pixel> {
    staging: wgpu::Buffer,
    staging_pitch: usize,
    rows: usize,
    cols: usize,
    dest: Destination<'d, T>,
}

impl<T: Pixel> PendingDownload<'_, T> {
    /// Synchronize `stream` and copy the data into the destination.
    pub fn resolve(self, stream: &mut GpuStream) {
        let PendingDownload { staging, staging_pitch, rows, cols, dest } = self;
        stream.synchronize();
        if rows == 0 || cols == 0 {
            return;
        }
        map_read_blocking(stream.gpu(), &staging);
        {
            let mapped = staging.slice(..).get_mapped_range();
            match dest {
                Destination::Image { image, x, y } => {
                    unpack_rows(&mapped, staging_pitch, cols, rows, image, x, y)
                }
                Destination::Slice(slice) => {
                    let bytes: &mut [u8] = bytemuck::cast_slice_mut(slice);
                    let n = bytes.len();
                    bytes.copy_from_slice(&mapped[..n]);
                }
            }
        }
        staging.unmap();
    }
}

// ---------------------------------------------------------------------------
// Row packing helpers
// ---------------------------------------------------------------------------

/// Lay out `src` rows `pitch` bytes apart, zero padding in between.
pub(crate) fn pack_pitched<T: Pixel>(src: &Image<T>, pitch: usize) -> Vec<u8> {
    let row_bytes = src.width() * size_of::<T>();
    assert!(pitch >= row_bytes, "pitch {pitch} B is shorter than a row of {row_bytes} B");
    let mut out = vec![0u8; pitch * src.height()];
    for y in 0..src.height() {
        let start = y * pitch;
        out[start..start + row_bytes].copy_from_slice(bytemuck::cast_slice(src.row(y)));
    }
    out
}

/// Copy `rows × cols` elements, source rows `src_pitch` bytes apart, into
/// `dest` starting at (`dest_x`, `dest_y`).
pub(crate) fn unpack_rows<T: Pixel>(
    bytes: &[u8],
    src_pitch: usize,
    cols: usize,
    rows: usize,
    dest: &mut Image<T>,
    dest_x: usize,
    dest_y: usize,
) {
    let row_bytes = cols * size_of::<T>();
    for r in 0..rows {
        let src = &bytes[r * src_pitch..r * src_pitch + row_bytes];
        let dst = &mut dest.row_mut(dest_y + r)[dest_x..dest_x + cols];
        bytemuck::cast_slice_mut::<T, u8>(dst).copy_from_slice(src);
    }
}

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(100, 256) = 256
///   align_to(256, 256) = 256
///   align_to(257, 256) = 512
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::device::tests::run_gpu_test_in_subprocess;
    use crate::image::Rgba;

    // ---- Pure helpers (no GPU) ---------------------------------------------

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 256), 0);
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        assert_eq!(align_to(641, 256), 768);
    }

    #[test]
    fn test_pack_pitched_pads_rows() {
        let img = Image::from_vec(2, 2, vec![1.0f32, 2.0, 3.0, 4.0]);
        let bytes = pack_pitched(&img, 16);
        assert_eq!(bytes.len(), 32);
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(floats, &[1.0, 2.0, 0.0, 0.0, 3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pack_pitched_from_host_pitched_image() {
        let img = Image::from_vec_with_stride(2, 2, 3, vec![1u32, 2, 99, 3, 4, 99]);
        let bytes = pack_pitched(&img, 8);
        let words: &[u32] = bytemuck::cast_slice(&bytes);
        assert_eq!(words, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_pack_unpack_with_pitch() {
        let img = Image::from_vec(3, 2, (0..6).map(|i| [i as f32; 4]).collect::<Vec<Rgba>>());
        let pitch = align_to(3 * 16, 256) as usize;
        let bytes = pack_pitched(&img, pitch);
        let mut back: Image<Rgba> = Image::new_with_stride(3, 2, 5);
        unpack_rows(&bytes, pitch, 3, 2, &mut back, 0, 0);
        assert_eq!(back, img);
    }

    #[test]
    fn test_unpack_into_sub_rectangle() {
        let bytes: Vec<u8> = bytemuck::cast_slice(&[7u32, 8, 9, 10]).to_vec();
        let mut dest: Image<u32> = Image::new(4, 4);
        unpack_rows(&bytes, 8, 2, 2, &mut dest, 1, 2);
        assert_eq!(dest.get(1, 2), 7);
        assert_eq!(dest.get(2, 2), 8);
        assert_eq!(dest.get(1, 3), 9);
        assert_eq!(dest.get(2, 3), 10);
        assert_eq!(dest.get(0, 0), 0);
    }

    // ---- GPU tests (subprocess-isolated) -----------------------------------

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_upload_download_round_trip() {
        let gpu = GpuDevice::new().expect("need Vulkan GPU");
        let src = Image::from_vec(37, 5, (0..37 * 5).map(|i| i as f32 * 0.5).collect());
        let mut buf = DeviceBuffer::<f32>::new(&gpu, 5, 37);
        assert_eq!(buf.pitch(), 256);
        buf.upload(&gpu, &src);

        let mut back: Image<f32> = Image::new(37, 5);
        buf.download(&gpu, &mut back);
        assert_eq!(back, src);

        let pitched = buf.download_pitched(&gpu);
        assert_eq!(pitched.stride(), 64);
        assert_eq!(pitched, src);
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_partial_and_rect_transfers() {
        let gpu = GpuDevice::new().expect("need Vulkan GPU");
        let mut stream = GpuStream::new(&gpu);

        let mut flat = DeviceBuffer::<u32>::new(&gpu, 1, 16);
        flat.fill(&mut stream, 3);
        flat.upload_part_async(&mut stream, 8, &[40, 50]);
        let mut part = [0u32; 4];
        flat.download_part_async(&mut stream, 4, &mut part).resolve(&mut stream);
        assert_eq!(part, [3, 40, 50, 3]);

        let src = Image::from_vec(6, 4, (0..24u32).collect());
        let mut buf = DeviceBuffer::<u32>::new(&gpu, 4, 6);
        buf.upload_async(&mut stream, &src);
        let mut dest: Image<u32> = Image::new(3, 3);
        buf.download_rect_async(&mut stream, 1, 2, 2, 3, 1, 0, &mut dest)
            .resolve(&mut stream);
        assert_eq!(dest.row(0), &[0, 0, 0]);
        assert_eq!(dest.row(1), &[8, 9, 10]);
        assert_eq!(dest.row(2), &[14, 15, 16]);
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_sampler_cache_and_copy_from() {
        let gpu = GpuDevice::new().expect("need Vulkan GPU");
        let mut stream = GpuStream::new(&gpu);
        let src = Image::from_vec(4, 2, vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let mut a = DeviceBuffer::<f32>::new(&gpu, 2, 4);
        a.upload_async(&mut stream, &src);

        let first = a.acquire_sampler(&mut stream, SamplerConfig::default()) as *const _;
        let again = a.acquire_sampler(&mut stream, SamplerConfig::default()) as *const _;
        assert_eq!(first, again, "equal configuration must reuse the cached sampler");
        let repeat = SamplerConfig {
            address_mode_x: wgpu::AddressMode::Repeat,
            ..SamplerConfig::default()
        };
        assert_eq!(a.acquire_sampler(&mut stream, repeat).config, repeat);

        let mut b = DeviceBuffer::<f32>::new(&gpu, 2, 4);
        b.copy_from(&mut stream, &a);
        let mut back: Image<f32> = Image::new(4, 2);
        b.download_async(&mut stream, &mut back).resolve(&mut stream);
        assert_eq!(back, src);
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real Vulkan GPU"]
    fn test_upload_download_round_trip() {
        let out = run_gpu_test_in_subprocess("gpu::buffer::tests::inner_upload_download_round_trip");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real Vulkan GPU"]
    fn test_partial_and_rect_transfers() {
        let out = run_gpu_test_in_subprocess("gpu::buffer::tests::inner_partial_and_rect_transfers");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real Vulkan GPU"]
    fn test_sampler_cache_and_copy_from() {
        let out = run_gpu_test_in_subprocess("gpu::buffer::tests::inner_sampler_cache_and_copy_from");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
