// depth-inpaint: tiled, convergence-tracked depth map inpainting.
//
// Host reference implementation of the view-correction inpainting core, plus
// a wgpu compute path (`gpu`) that mirrors it tile for tile.
//
// Pipeline per call:
//   input depth/RGBA → locator (per-tile hole counts) → compactor (active list)
//   → diffusion launches over the active list ↔ periodic convergence checks
//   → completed buffer.

pub mod image;
pub mod tiling;
pub mod locator;
pub mod compaction;
pub mod diffusion;
pub mod inpaint;
pub mod gpu;
