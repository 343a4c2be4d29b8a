// gpu/stream.rs — Ordered, host-asynchronous queue of device work.
//
// Every command recorded on a GpuStream goes into one CommandEncoder in issue
// order. Nothing reaches the GPU until the stream is flushed, and the host
// only waits at `synchronize()`. An inpainting call records the locator, the
// diffusion launches between two checks, and the flag clears all on the same
// stream, so the device sees them back to back.
//
//   record ── record ── record ── synchronize() ── read back ── record ...
//                                  │
//                                  └─ submit + poll(Wait)
//
// NEW RUST CONCEPTS:
// - A struct borrowing another (`GpuStream<'a>` holds `&'a GpuDevice`):
//   the stream cannot outlive the device it records for.
// - `Option::get_or_insert_with` for lazy construction.
// - `impl Drop` so recorded work is never silently lost.

use crate::gpu::device::GpuDevice;

/// A lazily created command encoder tied to one device.
pub struct GpuStream<'a> {
    gpu: &'a GpuDevice,
    encoder: Option<wgpu::CommandEncoder>,
    submissions: usize,
}

impl<'a> GpuStream<'a> {
    pub fn new(gpu: &'a GpuDevice) -> Self {
        GpuStream {
            gpu,
            encoder: None,
            submissions: 0,
        }
    }

    /// The device this stream records for.
    #[inline]
    pub fn gpu(&self) -> &'a GpuDevice {
        self.gpu
    }

    /// The current encoder, created on first use after a flush.
    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let gpu = self.gpu;
        self.encoder.get_or_insert_with(|| {
            gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("GpuStream"),
            })
        })
    }

    /// Submit everything recorded so far without waiting for it.
    pub fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.gpu.queue.submit(std::iter::once(encoder.finish()));
            self.submissions += 1;
        }
    }

    /// Submit recorded work and block until the device has finished it.
    pub fn synchronize(&mut self) {
        self.flush();
        self.gpu.device.poll(wgpu::Maintain::Wait);
    }

    /// Number of command buffers submitted so far.
    pub fn submissions(&self) -> usize {
        self.submissions
    }
}

impl Drop for GpuStream<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}
