// gpu/mod.rs — GPU acceleration layer.
//
// wgpu compute kernels that mirror the host algorithms in the parent crate.
// The host implementations remain the authoritative reference; every kernel
// is validated against them.
//
// Architecture: hybrid host/device model.
//
//   Device handles all per-pixel work:
//     ingestion + hole counting (locator) → tile-cached diffusion launches
//
//   Host handles orchestration between launches:
//     active list compaction → convergence check scheduling → list shrinking
//
// The boundary is two small readbacks: per-tile hole counts after the
// locator, and per-block change flags at each convergence check. Everything
// in between is queued on one GpuStream without host synchronization.

pub mod device;
pub mod stream;
pub mod sampler;
pub mod buffer;
pub mod inpaint;
