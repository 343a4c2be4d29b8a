// inpaint.rs — Inpainting configuration, orchestration loop, and the host
// reference entry points.
//
// The orchestrator is a small state machine over the active block list:
//
//   locate → compact ─┬─ empty ──────────────────────────────→ done (0 iterations)
//                     └─ diffuse ×N ─→ check ─┬─ none left ───→ done (converged)
//                            ↑                └─ shrink ─┐
//                            └───────────────────────────┘
//                     ... until max_num_iterations → done (warning)
//
// It never touches pixel data itself. Everything device- or host-specific
// goes through the InpaintBackend trait, so the same loop drives the host
// reference path below and the GPU path in gpu/inpaint.rs.
//
// New concepts this file introduces:
// - A trait as the seam between algorithm and execution engine
// - Generic functions monomorphized over marker types (DiffusionVariant)

use crate::compaction::{compact_active_blocks, retain_changing, ActiveBlocks};
use crate::diffusion::{diffuse_blocks, Color, DepthUnweighted, DepthWeighted, DiffusionVariant};
use crate::image::{Image, Rgba};
use crate::locator::locate_active_blocks;
use crate::tiling::{BlockCoord, TileGrid, CONVERGENCE_CHECK_INTERVAL, SUB_ITERATIONS};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Parameters of one inpainting call.
#[derive(Debug, Clone)]
pub struct InpaintConfig {
    /// Scale neighbor contributions by the edge-strength image.
    pub use_weighting: bool,
    /// Upper bound on diffusion iterations (rounded up to a multiple of 4).
    pub max_num_iterations: usize,
    /// Relative change below which a block counts as converged. Must be > 0.
    pub max_change_rate_threshold: f32,
    /// Factor applied to the depth input on ingestion.
    pub depth_input_scaling_factor: f32,
}

impl Default for InpaintConfig {
    fn default() -> Self {
        InpaintConfig {
            use_weighting: false,
            max_num_iterations: 100,
            max_change_rate_threshold: 0.01,
            depth_input_scaling_factor: 1.0,
        }
    }
}

impl InpaintConfig {
    /// # Panics
    /// Panics if the threshold is not strictly positive.
    pub fn validate(&self) {
        assert!(
            self.max_change_rate_threshold > 0.0,
            "max_change_rate_threshold must be > 0 (got {})",
            self.max_change_rate_threshold
        );
    }
}

/// What an inpainting call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InpaintStats {
    /// Diffusion iterations run (a multiple of SUB_ITERATIONS).
    pub iterations: usize,
    /// Hole pixels found by the locator.
    pub pixels_to_inpaint: usize,
    /// `false` when the iteration limit was hit with blocks still active.
    pub converged: bool,
    /// Active block count after each convergence check.
    pub active_blocks_per_check: Vec<usize>,
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// Execution engine driven by [`run_inpainting`].
pub trait InpaintBackend {
    /// Tile grid of the image being inpainted.
    fn grid(&self) -> TileGrid;

    /// Copy the scaled input into the working buffer and return per-tile
    /// hole counts (row-major). Blocks until the counts are available.
    fn locate_active_blocks(&mut self) -> Vec<u32>;

    /// Replace the active block list used by subsequent launches.
    fn set_active_blocks(&mut self, blocks: &[BlockCoord]);

    /// Queue one launch (SUB_ITERATIONS sub-iterations) over the active
    /// blocks. With `check`, the launch also records per-block change flags.
    fn diffuse(&mut self, check: bool);

    /// Wait for queued work and return the first `count` change flags.
    fn read_max_change_flags(&mut self, count: usize) -> Vec<u32>;
}

/// Run the locate / compact / diffuse / check loop to completion.
pub fn run_inpainting<B: InpaintBackend + ?Sized>(
    backend: &mut B,
    config: &InpaintConfig,
) -> InpaintStats {
    config.validate();
    let grid = backend.grid();

    let counts = backend.locate_active_blocks();
    let ActiveBlocks {
        mut blocks,
        pixels_to_inpaint,
    } = compact_active_blocks(&counts, &grid);

    let mut stats = InpaintStats {
        iterations: 0,
        pixels_to_inpaint,
        converged: true,
        active_blocks_per_check: Vec::new(),
    };
    if blocks.is_empty() {
        log::debug!("no holes in {}×{} input", grid.image_width, grid.image_height);
        return stats;
    }
    log::debug!(
        "{} hole pixels in {} of {} blocks",
        pixels_to_inpaint,
        blocks.len(),
        grid.cell_count()
    );
    backend.set_active_blocks(&blocks);

    let mut iteration = 0;
    let mut last_check = 0;
    while iteration < config.max_num_iterations {
        let check = iteration - last_check >= CONVERGENCE_CHECK_INTERVAL;
        backend.diffuse(check);

        if check {
            last_check = iteration;
            let flags = backend.read_max_change_flags(blocks.len());
            retain_changing(&mut blocks, &flags);
            stats.active_blocks_per_check.push(blocks.len());
            log::debug!("iteration {}: {} blocks still changing", iteration, blocks.len());

            if blocks.is_empty() {
                stats.iterations = iteration + SUB_ITERATIONS;
                log::info!(
                    "inpainting converged after {} iterations ({} pixels)",
                    stats.iterations,
                    pixels_to_inpaint
                );
                return stats;
            }
            backend.set_active_blocks(&blocks);
        }
        iteration += SUB_ITERATIONS;
    }

    log::warn!(
        "inpainting stopped at the iteration limit ({} iterations, {} blocks still active)",
        iteration,
        blocks.len()
    );
    stats.iterations = iteration;
    stats.converged = false;
    stats
}

// ---------------------------------------------------------------------------
// Host backend
// ---------------------------------------------------------------------------

struct HostBackend<'a, V: DiffusionVariant> {
    grid: TileGrid,
    input: Image<V::Value>,
    edge: Option<&'a Image<f32>>,
    working: &'a mut Image<V::Value>,
    blocks: Vec<BlockCoord>,
    flags: Vec<u32>,
    threshold: f32,
}

impl<'a, V: DiffusionVariant> HostBackend<'a, V> {
    fn new(
        input: Image<V::Value>,
        edge: Option<&'a Image<f32>>,
        working: &'a mut Image<V::Value>,
        threshold: f32,
    ) -> Self {
        assert!(input.same_size(working), "input and output sizes differ");
        if let Some(e) = edge {
            assert!(input.same_size(e), "edge-strength and input sizes differ");
        }
        HostBackend {
            grid: TileGrid::new(input.width(), input.height()),
            input,
            edge,
            working,
            blocks: Vec::new(),
            flags: Vec::new(),
            threshold,
        }
    }
}

impl<V: DiffusionVariant> InpaintBackend for HostBackend<'_, V> {
    fn grid(&self) -> TileGrid {
        self.grid
    }

    fn locate_active_blocks(&mut self) -> Vec<u32> {
        locate_active_blocks::<V>(&self.grid, &self.input, self.working)
    }

    fn set_active_blocks(&mut self, blocks: &[BlockCoord]) {
        self.blocks = blocks.to_vec();
    }

    fn diffuse(&mut self, check: bool) {
        let flags = diffuse_blocks::<V>(
            &self.grid,
            &self.blocks,
            &self.input,
            self.edge,
            self.working,
            self.threshold,
            check,
        );
        if check {
            self.flags = flags;
        }
    }

    fn read_max_change_flags(&mut self, count: usize) -> Vec<u32> {
        self.flags[..count].to_vec()
    }
}

/// Inpaint a depth map on the host.
///
/// `output` receives the scaled input with holes filled. `edge_strength` is
/// only consulted when `config.use_weighting` is set.
///
/// # Panics
/// Panics on size mismatches or an invalid config.
pub fn inpaint_depth_map(
    config: &InpaintConfig,
    edge_strength: Option<&Image<f32>>,
    input: &Image<f32>,
    output: &mut Image<f32>,
) -> InpaintStats {
    let scaled = input.scaled(config.depth_input_scaling_factor);
    let threshold = config.max_change_rate_threshold;
    if config.use_weighting {
        let mut backend = HostBackend::<DepthWeighted>::new(scaled, edge_strength, output, threshold);
        run_inpainting(&mut backend, config)
    } else {
        let mut backend = HostBackend::<DepthUnweighted>::new(scaled, None, output, threshold);
        run_inpainting(&mut backend, config)
    }
}

/// Inpaint an RGBA image on the host. Holes are pixels with zero alpha.
///
/// Color inpainting has no weighted variant; `use_weighting` is ignored.
pub fn inpaint_image(
    config: &InpaintConfig,
    input: &Image<Rgba>,
    output: &mut Image<Rgba>,
) -> InpaintStats {
    if config.use_weighting {
        log::warn!("use_weighting is not supported for RGBA inpainting; ignoring it");
    }
    let mut backend = HostBackend::<Color>::new(
        input.clone(),
        None,
        output,
        config.max_change_rate_threshold,
    );
    run_inpainting(&mut backend, config)
}
