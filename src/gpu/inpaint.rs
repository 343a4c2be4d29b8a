// gpu/inpaint.rs — GPU inpainting engine.
//
// GpuInpainter compiles every kernel variant once and then drives the shared
// orchestrator (inpaint::run_inpainting) through a DeviceBackend that records
// into the caller's GpuStream:
//
//   locate ──sync── compact ── upload list ── diffuse ×7 ── clear flags ── diffuse(check)
//                                                  ↑                              │
//                                                  └── upload shrunk list ──sync──┘
//
// The host only waits after the locator and at each convergence check; the
// launches between two checks are queued back to back.
//
// KERNEL VARIANTS
// ───────────────
// The weighting and convergence-check modes are WGSL `override` constants,
// so each combination is its own pipeline built from the same source:
//
//   depth locate   USE_WEIGHTING ∈ {0, 1}                          2 pipelines
//   depth diffuse  USE_WEIGHTING ∈ {0, 1} × CHECK_CONVERGENCE ∈ {0, 1}  4
//   image locate   —                                               1
//   image diffuse  CHECK_CONVERGENCE ∈ {0, 1}                      2
//
// Tiling constants and the kernel weights are baked into the source with
// `{{TOKEN}}` replacement (naga does not accept overrides in array sizes or
// @workgroup_size).
//
// SCRATCH BUFFERS
// ───────────────
// Both scratch buffers are flat (height 1) and caller-owned:
//   block_coordinates: per-tile hole counts after the locator, then the
//                      flattened [x0, y0, x1, y1, ...] active list
//   max_change:        one flag per active block, cleared before each check
//
// NEW RUST CONCEPTS
// ──────────────────
// - One generic loop behind a trait: it runs over host images and
//   over device buffers borrowed for the duration of one call.
// - Several lifetimes on one struct (`DeviceBackend<'a, 'g>`): borrows of
//   the call's resources vs. the device the stream records for.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::gpu::buffer::{storage_entry, uniform_entry, DeviceBuffer};
use crate::gpu::device::GpuDevice;
use crate::gpu::sampler::{BoundarySampler, SamplerConfig};
use crate::gpu::stream::GpuStream;
use crate::image::Rgba;
use crate::inpaint::{run_inpainting, InpaintBackend, InpaintConfig, InpaintStats};
use crate::tiling::{
    BlockCoord, TileGrid, AXIAL_WEIGHT, DIAGONAL_WEIGHT, HALO, SUB_ITERATIONS, TILE_SIZE,
};

/// Largest workgroup count wgpu accepts in one dispatch dimension.
const MAX_DISPATCH_DIM: u32 = 65535;

// ---------------------------------------------------------------------------
// Uniform params (must match the WGSL structs exactly)
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct LocateParams {
    width:      u32,
    height:     u32,
    pitch:      u32,
    grid_width: u32,
    scale:      f32,
    _pad:       [u32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct TileParams {
    width:           u32,
    height:          u32,
    pitch:           u32,
    block_count:     u32,
    max_change_rate: f32,
    scale:           f32,
    _pad:            [u32; 2],
}

// ---------------------------------------------------------------------------
// GpuInpainter
// ---------------------------------------------------------------------------

/// Compiled inpainting kernels for one device.
///
/// Create once per [`GpuDevice`]; every call borrows its buffers and stream.
pub struct GpuInpainter {
    locate_bgl:         wgpu::BindGroupLayout,
    /// Indexed by `use_weighting`.
    depth_locate:       [wgpu::ComputePipeline; 2],
    depth_diffuse_bgl:  wgpu::BindGroupLayout,
    /// Indexed by `[use_weighting][check]`.
    depth_diffuse:      [[wgpu::ComputePipeline; 2]; 2],
    image_locate:       wgpu::ComputePipeline,
    image_diffuse_bgl:  wgpu::BindGroupLayout,
    /// Indexed by `check`.
    image_diffuse:      [wgpu::ComputePipeline; 2],
    /// Bound in place of the edge-strength image when none is given.
    dummy_edge:         BoundarySampler,
}

impl GpuInpainter {
    pub fn new(gpu: &GpuDevice) -> Self {
        let lanes = (TILE_SIZE / 2) as u32;
        assert!(
            lanes * lanes <= gpu.device.limits().max_compute_invocations_per_workgroup,
            "device cannot run {lanes}×{lanes} workgroups"
        );

        // ---- Bind group layouts ----
        let [in_tex, in_samp] = BoundarySampler::layout_entries(0, false);
        let locate_bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("locate BGL"),
            entries: &[
                in_tex,
                in_samp,
                storage_entry(2, false), // working buffer
                storage_entry(3, false), // per-tile counts
                uniform_entry(4),
            ],
        });

        let [edge_tex, edge_samp] = BoundarySampler::layout_entries(2, false);
        let depth_diffuse_bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("depth diffuse BGL"),
            entries: &[
                in_tex,
                in_samp,
                edge_tex,
                edge_samp,
                storage_entry(4, false), // working buffer
                storage_entry(5, true),  // active block list
                storage_entry(6, false), // max_change flags
                uniform_entry(7),
            ],
        });
        let image_diffuse_bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("image diffuse BGL"),
            entries: &[
                in_tex,
                in_samp,
                storage_entry(4, false),
                storage_entry(5, true),
                storage_entry(6, false),
                uniform_entry(7),
            ],
        });

        // ---- Pipelines ----
        let locate_depth = compile(gpu, "locate_depth.wgsl", include_str!("../shaders/locate_depth.wgsl"));
        let locate_image = compile(gpu, "locate_image.wgsl", include_str!("../shaders/locate_image.wgsl"));
        let diffuse_depth = compile(gpu, "diffuse_depth.wgsl", include_str!("../shaders/diffuse_depth.wgsl"));
        let diffuse_image = compile(gpu, "diffuse_image.wgsl", include_str!("../shaders/diffuse_image.wgsl"));

        let depth_locate = [false, true].map(|weighted| {
            build_pipeline(
                gpu,
                "locate_depth",
                &locate_depth,
                &locate_bgl,
                "locate",
                &[("USE_WEIGHTING", weighted)],
            )
        });
        let depth_diffuse = [false, true].map(|weighted| {
            [false, true].map(|check| {
                build_pipeline(
                    gpu,
                    "diffuse_depth",
                    &diffuse_depth,
                    &depth_diffuse_bgl,
                    "diffuse",
                    &[("USE_WEIGHTING", weighted), ("CHECK_CONVERGENCE", check)],
                )
            })
        });
        let image_locate =
            build_pipeline(gpu, "locate_image", &locate_image, &locate_bgl, "locate", &[]);
        let image_diffuse = [false, true].map(|check| {
            build_pipeline(
                gpu,
                "diffuse_image",
                &diffuse_image,
                &image_diffuse_bgl,
                "diffuse",
                &[("CHECK_CONVERGENCE", check)],
            )
        });

        let dummy_edge = BoundarySampler::new(
            gpu,
            1,
            1,
            wgpu::TextureFormat::R32Float,
            SamplerConfig::default(),
        );

        log::debug!("inpainting kernels compiled for {}", gpu.adapter_info);
        GpuInpainter {
            locate_bgl,
            depth_locate,
            depth_diffuse_bgl,
            depth_diffuse,
            image_locate,
            image_diffuse_bgl,
            image_diffuse,
            dummy_edge,
        }
    }

    /// Inpaint a depth map.
    ///
    /// `depth_output` receives the input scaled by
    /// `config.depth_input_scaling_factor`, with holes filled. The edge
    /// strength is only read when `config.use_weighting` is set. All work is
    /// recorded on `stream`; the call returns after the last convergence
    /// check, with the final launches possibly still queued.
    ///
    /// # Panics
    /// Panics on size mismatches, undersized or non-flat scratch buffers, a
    /// filtering input sampler, or an invalid config.
    #[allow(clippy::too_many_arguments)]
    pub fn inpaint_depth_map(
        &self,
        stream: &mut GpuStream,
        config: &InpaintConfig,
        edge_strength: Option<&BoundarySampler>,
        depth_input: &BoundarySampler,
        max_change: &mut DeviceBuffer<u32>,
        depth_output: &mut DeviceBuffer<f32>,
        block_coordinates: &mut DeviceBuffer<u32>,
    ) -> InpaintStats {
        config.validate();
        let grid = check_call(depth_input, depth_output, max_change, block_coordinates);
        let edge = if config.use_weighting {
            let edge = edge_strength.unwrap_or_else(|| {
                log::warn!("use_weighting set without an edge-strength image; using uniform weights");
                &self.dummy_edge
            });
            if !std::ptr::eq(edge, &self.dummy_edge) {
                assert!(
                    edge.width as usize == depth_output.width()
                        && edge.height as usize == depth_output.height(),
                    "edge-strength size {}×{} differs from depth size {}×{}",
                    edge.width,
                    edge.height,
                    depth_output.width(),
                    depth_output.height()
                );
                check_nearest(edge, "edge-strength");
            }
            edge
        } else {
            &self.dummy_edge
        };

        let weighted = usize::from(config.use_weighting);
        let kernels = Kernels {
            locate: &self.depth_locate[weighted],
            diffuse: [&self.depth_diffuse[weighted][0], &self.depth_diffuse[weighted][1]],
            diffuse_bgl: &self.depth_diffuse_bgl,
        };
        let mut backend = DeviceBackend::new(
            stream,
            kernels,
            &self.locate_bgl,
            grid,
            Inputs { input: depth_input, edge: Some(edge) },
            depth_output.buffer(),
            depth_output.pitch_elements() as u32,
            config,
            max_change,
            block_coordinates,
        );
        run_inpainting(&mut backend, config)
    }

    /// Inpaint an RGBA image; holes are pixels with zero alpha.
    ///
    /// Color inpainting has no weighted variant: `edge_strength` and
    /// `config.use_weighting` are ignored. The input is read through its
    /// cached clamped, nearest-neighbor sampler.
    ///
    /// # Panics
    /// Same contract as [`GpuInpainter::inpaint_depth_map`].
    #[allow(clippy::too_many_arguments)]
    pub fn inpaint_image(
        &self,
        stream: &mut GpuStream,
        config: &InpaintConfig,
        edge_strength: Option<&BoundarySampler>,
        rgba_input: &mut DeviceBuffer<Rgba>,
        max_change: &mut DeviceBuffer<u32>,
        rgba_output: &mut DeviceBuffer<Rgba>,
        block_coordinates: &mut DeviceBuffer<u32>,
    ) -> InpaintStats {
        config.validate();
        if config.use_weighting || edge_strength.is_some() {
            log::warn!("edge weighting is not supported for RGBA inpainting; ignoring it");
        }
        let input = rgba_input.acquire_sampler(stream, SamplerConfig::default());
        let grid = check_call(input, rgba_output, max_change, block_coordinates);

        let kernels = Kernels {
            locate: &self.image_locate,
            diffuse: [&self.image_diffuse[0], &self.image_diffuse[1]],
            diffuse_bgl: &self.image_diffuse_bgl,
        };
        let mut backend = DeviceBackend::new(
            stream,
            kernels,
            &self.locate_bgl,
            grid,
            Inputs { input, edge: None },
            rgba_output.buffer(),
            rgba_output.pitch_elements() as u32,
            config,
            max_change,
            block_coordinates,
        );
        run_inpainting(&mut backend, config)
    }
}

/// Validate the arguments shared by both entry points and return the grid.
fn check_call<T: crate::image::Pixel>(
    input: &BoundarySampler,
    output: &DeviceBuffer<T>,
    max_change: &DeviceBuffer<u32>,
    block_coordinates: &DeviceBuffer<u32>,
) -> TileGrid {
    assert!(TILE_SIZE == 32 && HALO == 4, "kernels are laid out for 32×32 tiles with a 4-pixel halo");
    assert!(
        input.width as usize == output.width() && input.height as usize == output.height(),
        "input size {}×{} differs from output size {}×{}",
        input.width,
        input.height,
        output.width(),
        output.height()
    );
    check_nearest(input, "input");

    let grid = TileGrid::new(output.width(), output.height());
    let cells = grid.cell_count();
    assert!(
        max_change.height() == 1 && max_change.width() >= cells,
        "max_change must be a flat buffer of at least {cells} elements (got {}×{})",
        max_change.width(),
        max_change.height()
    );
    assert!(
        block_coordinates.height() == 1 && block_coordinates.width() >= 2 * cells,
        "block_coordinates must be a flat buffer of at least {} elements (got {}×{})",
        2 * cells,
        block_coordinates.width(),
        block_coordinates.height()
    );
    grid
}

fn check_nearest(sampler: &BoundarySampler, what: &str) {
    assert!(
        sampler.config.filter_mode == wgpu::FilterMode::Nearest,
        "{what} sampler must use nearest filtering"
    );
}

// ---------------------------------------------------------------------------
// Pipeline construction
// ---------------------------------------------------------------------------

/// Replace the tiling tokens in a kernel template.
fn bake_tiling(template: &str) -> String {
    let lanes = TILE_SIZE / 2;
    template
        .replace("{{TILE_SIZE}}", &TILE_SIZE.to_string())
        .replace("{{HALO}}", &HALO.to_string())
        .replace("{{LANES}}", &lanes.to_string())
        .replace("{{INVOCATIONS}}", &(lanes * lanes).to_string())
        .replace("{{TILE_PIXELS}}", &(TILE_SIZE * TILE_SIZE).to_string())
        .replace("{{SUB_ITERATIONS}}", &SUB_ITERATIONS.to_string())
        // `{:?}` always prints a decimal point, which WGSL needs for an f32.
        .replace("{{DIAGONAL_WEIGHT}}", &format!("{DIAGONAL_WEIGHT:?}"))
        .replace("{{AXIAL_WEIGHT}}", &format!("{AXIAL_WEIGHT:?}"))
}

fn compile(gpu: &GpuDevice, label: &str, template: &str) -> wgpu::ShaderModule {
    gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(bake_tiling(template).into()),
    })
}

fn build_pipeline(
    gpu: &GpuDevice,
    label: &str,
    module: &wgpu::ShaderModule,
    bgl: &wgpu::BindGroupLayout,
    entry_point: &str,
    overrides: &[(&str, bool)],
) -> wgpu::ComputePipeline {
    let constants: HashMap<String, f64> = overrides
        .iter()
        .map(|&(name, on)| (name.to_string(), if on { 1.0 } else { 0.0 }))
        .collect();
    let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bgl],
        push_constant_ranges: &[],
    });
    gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        module,
        entry_point,
        compilation_options: wgpu::PipelineCompilationOptions {
            constants: &constants,
            ..Default::default()
        },
        cache: None,
    })
}

/// Workgroup counts for `blocks` one-block workgroups, split over y when the
/// list exceeds one dispatch row. Kernels skip indices past the list.
fn block_dispatch_size(blocks: u32) -> (u32, u32) {
    if blocks == 0 {
        return (0, 0);
    }
    let x = blocks.min(MAX_DISPATCH_DIM);
    (x, blocks.div_ceil(x))
}

// ---------------------------------------------------------------------------
// DeviceBackend
// ---------------------------------------------------------------------------

/// The pipelines one call uses.
struct Kernels<'a> {
    locate: &'a wgpu::ComputePipeline,
    /// Indexed by `check`.
    diffuse: [&'a wgpu::ComputePipeline; 2],
    diffuse_bgl: &'a wgpu::BindGroupLayout,
}

/// Samplers over the original input and, for depth, the edge strength.
struct Inputs<'a> {
    input: &'a BoundarySampler,
    edge: Option<&'a BoundarySampler>,
}

struct DeviceBackend<'a, 'g> {
    stream: &'a mut GpuStream<'g>,
    kernels: Kernels<'a>,
    inputs: Inputs<'a>,
    grid: TileGrid,
    working: &'a wgpu::Buffer,
    /// Working buffer pitch, in elements.
    pitch: u32,
    threshold: f32,
    scale: f32,
    max_change: &'a mut DeviceBuffer<u32>,
    block_coordinates: &'a mut DeviceBuffer<u32>,
    locate_group: wgpu::BindGroup,
    /// Built by `set_active_blocks`.
    diffuse_group: Option<wgpu::BindGroup>,
    block_count: u32,
}

impl<'a, 'g> DeviceBackend<'a, 'g> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        stream: &'a mut GpuStream<'g>,
        kernels: Kernels<'a>,
        locate_bgl: &wgpu::BindGroupLayout,
        grid: TileGrid,
        inputs: Inputs<'a>,
        working: &'a wgpu::Buffer,
        pitch: u32,
        config: &InpaintConfig,
        max_change: &'a mut DeviceBuffer<u32>,
        block_coordinates: &'a mut DeviceBuffer<u32>,
    ) -> Self {
        let gpu = stream.gpu();
        let params = LocateParams {
            width: grid.image_width as u32,
            height: grid.image_height as u32,
            pitch,
            grid_width: grid.cols as u32,
            scale: config.depth_input_scaling_factor,
            _pad: [0; 3],
        };
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("LocateParams"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let [tex_bind, sampler_bind] = inputs.input.bind_entries(0);
        let locate_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("locate bind group"),
            layout: locate_bgl,
            entries: &[
                tex_bind,
                sampler_bind,
                wgpu::BindGroupEntry { binding: 2, resource: working.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: block_coordinates.buffer().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: params_buf.as_entire_binding() },
            ],
        });

        DeviceBackend {
            stream,
            kernels,
            inputs,
            grid,
            working,
            pitch,
            threshold: config.max_change_rate_threshold,
            scale: config.depth_input_scaling_factor,
            max_change,
            block_coordinates,
            locate_group,
            diffuse_group: None,
            block_count: 0,
        }
    }

    /// Bind group for the diffusion kernels with `block_count` baked into a
    /// fresh params buffer, so launches already queued keep their own count.
    fn build_diffuse_group(&self, block_count: u32) -> wgpu::BindGroup {
        let gpu = self.stream.gpu();
        let params = TileParams {
            width: self.grid.image_width as u32,
            height: self.grid.image_height as u32,
            pitch: self.pitch,
            block_count,
            max_change_rate: self.threshold,
            scale: self.scale,
            _pad: [0; 2],
        };
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("TileParams"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries: Vec<wgpu::BindGroupEntry> = self.inputs.input.bind_entries(0).into();
        if let Some(edge) = self.inputs.edge {
            entries.extend(edge.bind_entries(2));
        }
        entries.extend([
            wgpu::BindGroupEntry { binding: 4, resource: self.working.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 5, resource: self.block_coordinates.buffer().as_entire_binding() },
            wgpu::BindGroupEntry { binding: 6, resource: self.max_change.buffer().as_entire_binding() },
            wgpu::BindGroupEntry { binding: 7, resource: params_buf.as_entire_binding() },
        ]);
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("diffuse bind group"),
            layout: self.kernels.diffuse_bgl,
            entries: &entries,
        })
    }
}

impl InpaintBackend for DeviceBackend<'_, '_> {
    fn grid(&self) -> TileGrid {
        self.grid
    }

    fn locate_active_blocks(&mut self) -> Vec<u32> {
        let cells = self.grid.cell_count();
        let mut counts = vec![0u32; cells];
        if cells == 0 {
            return counts;
        }
        {
            let mut pass = self.stream.encoder().begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("locate"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.kernels.locate);
            pass.set_bind_group(0, &self.locate_group, &[]);
            pass.dispatch_workgroups(self.grid.cols as u32, self.grid.rows as u32, 1);
        }
        self.block_coordinates
            .download_part_async(self.stream, 0, &mut counts)
            .resolve(self.stream);
        counts
    }

    fn set_active_blocks(&mut self, blocks: &[BlockCoord]) {
        self.block_coordinates
            .upload_part_async(self.stream, 0, &BlockCoord::flatten(blocks));
        self.block_count = blocks.len() as u32;
        self.diffuse_group = Some(self.build_diffuse_group(self.block_count));
    }

    fn diffuse(&mut self, check: bool) {
        let Some(group) = &self.diffuse_group else {
            panic!("diffusion launched before an active block list was set");
        };
        if check {
            self.max_change.fill(self.stream, 0);
        }
        let (x, y) = block_dispatch_size(self.block_count);
        let mut pass = self.stream.encoder().begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(if check { "diffuse (check)" } else { "diffuse" }),
            timestamp_writes: None,
        });
        pass.set_pipeline(self.kernels.diffuse[usize::from(check)]);
        pass.set_bind_group(0, group, &[]);
        pass.dispatch_workgroups(x, y, 1);
    }

    fn read_max_change_flags(&mut self, count: usize) -> Vec<u32> {
        let mut flags = vec![0u32; count];
        self.max_change
            .download_part_async(self.stream, 0, &mut flags)
            .resolve(self.stream);
        flags
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
