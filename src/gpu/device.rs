// gpu/device.rs — wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate Vulkan adapters and select the first non-CPU one.
//   - Expose a `DeviceProfile` for simulating hardware limits on a
//     development machine (e.g., cap invocations and workgroup memory to
//     match a Raspberry Pi).
//   - Provide `WorkgroupSize` for the per-pixel kernels (resampling). The
//     tile kernels use a fixed 16×16 layout instead; see gpu/inpaint.rs.
//   - Install the fatal-error policy: any device error (validation,
//     out-of-memory, lost device) is logged and aborts the process.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` uses power preference heuristics that
// may grab llvmpipe/softpipe on WSL2 (where the software renderer appears
// as a valid Vulkan device). We enumerate explicitly and prefer anything
// that is not DeviceType::Cpu.
//
// DEVICE LIMITS:
// We request *lower* limits than the hardware actually supports when
// running under a non-Native profile. wgpu validates every dispatch against
// the requested limits, so violations that would crash on RPi are caught at
// dev time on the laptop.
//
// FLOAT FILTERING:
// Depth and RGBA surfaces are R32Float / Rgba32Float, which are only
// filterable with FLOAT32_FILTERABLE. We enable it when the adapter offers
// it; linear boundary samplers are refused otherwise.
//
// NEW RUST CONCEPTS:
// - `pollster::block_on` — runs an async fn to completion on the current
//   thread. wgpu's device/adapter API is async because on WebGPU it maps
//   to JS Promises, but for native Vulkan we just block.
// - `-> !` (the never type) — `fatal()` never returns, so it can stand in
//   for a value of any type in a match arm.
// - `#[derive(thiserror::Error)]` — generates Display and Error impls from
//   `#[error("...")]` attributes.

use std::fmt;

/// Hardware profile controlling device limits and default workgroup sizes.
///
/// Use `Native` for best performance on your development machine.
/// Use `RaspberryPi` to simulate RPi 4/5 constraints — wgpu will reject
/// any dispatch that exceeds the RPi's actual Vulkan limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// Use wgpu's default limits. No artificial caps.
    Native,
    /// Simulate Raspberry Pi 4/5 (Broadcom VideoCore VI/VII, V3DV Vulkan).
    RaspberryPi,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::RaspberryPi => write!(f, "RaspberryPi (simulated limits)"),
        }
    }
}

/// A workgroup size configuration for 2D per-pixel dispatches.
///
/// The product must not exceed the profile's
/// `max_compute_invocations_per_workgroup` limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Validated default for the given profile.
    ///
    /// - `Native`: 16×8 = 128 invocations (4 NVIDIA warps, 2 AMD waves).
    /// - `RaspberryPi`: 8×8 = 64 invocations, well inside the 256 cap.
    fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Native => WorkgroupSize { x: 16, y: 8 },
            DeviceProfile::RaspberryPi => WorkgroupSize { x: 8, y: 8 },
        }
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// The core GPU context: adapter, device, queue, and active profile.
///
/// Hold one `GpuDevice` for the lifetime of the application; creating it
/// initializes a Vulkan instance and device.
///
/// # Field drop order
/// Rust drops struct fields in declaration order (top → bottom).
/// `_instance` is declared last so the `wgpu::Instance` outlives `device`
/// and `queue` (dzn on WSL2 crashes otherwise).
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    /// `true` when R32Float / Rgba32Float textures may be linearly filtered.
    pub float32_filterable: bool,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a `GpuDevice` using the first non-CPU Vulkan adapter found,
    /// with `DeviceProfile::Native` limits.
    ///
    /// # Errors
    /// Returns `Err` if no adapter is found or the device request fails.
    pub fn new() -> Result<Self, GpuError> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    /// Create a `GpuDevice` with an explicit hardware profile.
    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self, GpuError> {
        // ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER lets dzn (D3D12-to-Vulkan
        // on WSL2) through; we only run compute kernels on it.
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            flags,
            ..Default::default()
        });

        let all_adapters: Vec<wgpu::Adapter> = instance
            .enumerate_adapters(wgpu::Backends::VULKAN)
            .into_iter()
            .collect();

        if all_adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }

        for a in &all_adapters {
            let info = a.get_info();
            log::info!(
                "Vulkan adapter: {} ({:?}, {:?})",
                info.name,
                info.backend,
                info.device_type
            );
        }

        // Real hardware first; software rasterizers only as a last resort.
        let adapter = all_adapters
            .into_iter()
            .find(|a| {
                matches!(
                    a.get_info().device_type,
                    wgpu::DeviceType::DiscreteGpu
                        | wgpu::DeviceType::IntegratedGpu
                        | wgpu::DeviceType::VirtualGpu
                        | wgpu::DeviceType::Other
                )
            })
            .or_else(|| {
                instance
                    .enumerate_adapters(wgpu::Backends::VULKAN)
                    .into_iter()
                    .next()
            })
            .ok_or(GpuError::NoSuitableAdapter)?;

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        // Auto-detect RPi when the caller passed Native but the adapter is V3D.
        let profile = match profile {
            DeviceProfile::Native if raw_info.name.to_ascii_lowercase().contains("v3d") => {
                log::info!("V3D adapter detected, using RaspberryPi profile");
                DeviceProfile::RaspberryPi
            }
            other => other,
        };

        let optional_features = adapter.features() & wgpu::Features::FLOAT32_FILTERABLE;

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("depth-inpaint"),
                    required_features: optional_features,
                    required_limits: limits_for_profile(profile),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceRequest)?;

        // A validation error or lost device leaves every buffer in an
        // undefined state; there is nothing sensible to continue with.
        device.on_uncaptured_error(Box::new(|err| {
            log::error!("wgpu device error: {err}");
            std::process::abort();
        }));

        let gpu = GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            workgroup_size: WorkgroupSize::for_profile(profile),
            float32_filterable: optional_features.contains(wgpu::Features::FLOAT32_FILTERABLE),
            _instance: instance,
        };
        log::info!("{gpu}");
        Ok(gpu)
    }

    /// Override the default workgroup size, validating against the active profile.
    pub fn set_workgroup_size(&mut self, x: u32, y: u32) -> Result<(), GpuError> {
        let total = x * y;
        let max = max_invocations_for_profile(self.profile);
        if total > max {
            return Err(GpuError::WorkgroupTooLarge { total, max });
        }
        self.workgroup_size = WorkgroupSize { x, y };
        Ok(())
    }

    /// Workgroup counts covering a `img_w × img_h` image with the active
    /// workgroup size (ceiling division; shaders guard the overhang).
    pub fn dispatch_size(&self, img_w: u32, img_h: u32) -> (u32, u32) {
        dispatch_size_for(self.workgroup_size, img_w, img_h)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, workgroup: {}, float32 filtering: {} }}",
            self.adapter_info, self.profile, self.workgroup_size, self.float32_filterable
        )
    }
}

fn dispatch_size_for(ws: WorkgroupSize, img_w: u32, img_h: u32) -> (u32, u32) {
    (img_w.div_ceil(ws.x), img_h.div_ceil(ws.y))
}

// ============================================================
// Fatal errors
// ============================================================

/// Log and abort. Used for device failures that surface outside the
/// uncaptured-error handler (failed buffer maps).
pub(crate) fn fatal(what: &str) -> ! {
    log::error!("fatal device error: {what}");
    std::process::abort()
}

/// Map `buffer` for reading and block until the map completes.
///
/// The caller must already have submitted the commands that fill it.
pub(crate) fn map_read_blocking(gpu: &GpuDevice, buffer: &wgpu::Buffer) {
    let (sender, receiver) = std::sync::mpsc::channel();
    buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    gpu.device.poll(wgpu::Maintain::Wait);
    match receiver.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => fatal(&format!("readback map failed: {e}")),
        Err(_) => fatal("readback map callback never fired"),
    }
}

// ============================================================
// Limits helpers
// ============================================================

fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),

        DeviceProfile::RaspberryPi => wgpu::Limits {
            // VideoCore VI/VII: vulkaninfo reports 256 max invocations.
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            // The RGBA tile cache fills this exactly.
            max_compute_workgroup_storage_size: 16384,
            max_texture_dimension_2d: 4096,
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

fn max_invocations_for_profile(profile: DeviceProfile) -> u32 {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default().max_compute_invocations_per_workgroup,
        DeviceProfile::RaspberryPi => 256,
    }
}

// ============================================================
// Error type
// ============================================================

/// Recoverable errors from GPU device initialization and configuration.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    /// No Vulkan adapter found. On WSL2, check that `vulkaninfo` lists a GPU.
    #[error(
        "no suitable Vulkan adapter found. \
         On WSL2: ensure Vulkan is installed and `vulkaninfo` lists a real GPU."
    )]
    NoSuitableAdapter,
    #[error("device request failed: {0}")]
    DeviceRequest(#[source] wgpu::RequestDeviceError),
    #[error("workgroup size {total} exceeds profile limit of {max} invocations")]
    WorkgroupTooLarge { total: u32, max: u32 },
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn test_workgroup_size_for_profiles() {
        let native = WorkgroupSize::for_profile(DeviceProfile::Native);
        assert_eq!((native.x, native.y), (16, 8));
        let rpi = WorkgroupSize::for_profile(DeviceProfile::RaspberryPi);
        assert_eq!(rpi.total(), 64);
    }

    #[test]
    fn test_dispatch_size_ceiling() {
        let ws = WorkgroupSize { x: 8, y: 8 };
        assert_eq!(dispatch_size_for(ws, 752, 480), (94, 60));
        assert_eq!(dispatch_size_for(ws, 100, 100), (13, 13));
    }

    #[test]
    fn test_rpi_limits() {
        let limits = limits_for_profile(DeviceProfile::RaspberryPi);
        assert_eq!(limits.max_compute_invocations_per_workgroup, 256);
        assert_eq!(limits.max_compute_workgroup_storage_size, 16384);
    }

    #[test]
    fn test_native_limits_are_default() {
        assert_eq!(limits_for_profile(DeviceProfile::Native), wgpu::Limits::default());
    }

    #[test]
    fn test_error_messages() {
        let e = GpuError::WorkgroupTooLarge { total: 272, max: 256 };
        assert_eq!(e.to_string(), "workgroup size 272 exceeds profile limit of 256 invocations");
    }

    // ---- GPU integration tests (subprocess isolation) -------------------------
    //
    // dzn (D3D12-to-Vulkan on WSL2) segfaults during process exit once a
    // Vulkan device has existed in the process. Each GPU test therefore runs
    // in a child `cargo test`; the child prints "GPU_TEST_OK" after its
    // assertions pass and the parent only checks the output, not the exit
    // code.

    /// Spawn a child `cargo test` running one `#[ignore]`d test and return
    /// its combined stdout+stderr.
    pub(crate) fn run_gpu_test_in_subprocess(test_name: &str) -> String {
        let output = std::process::Command::new("cargo")
            .args(["test", "--lib", "--", test_name, "--exact", "--ignored", "--nocapture"])
            .output()
            .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        print!("{stdout}");
        eprint!("{stderr}");
        stdout + &stderr
    }

    // Inner tests ─────────────────────────────────────────────────────────────

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_device_init_rpi_profile() {
        let gpu = GpuDevice::new_with_profile(DeviceProfile::RaspberryPi)
            .expect("RPi profile should work on any Vulkan device");
        println!("{gpu}");
        assert_eq!(gpu.profile, DeviceProfile::RaspberryPi);
        assert_eq!(gpu.workgroup_size, WorkgroupSize { x: 8, y: 8 });
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_set_workgroup_size_too_large() {
        let mut gpu = GpuDevice::new_with_profile(DeviceProfile::RaspberryPi).unwrap();
        gpu.set_workgroup_size(16, 16).expect("256 should be valid on RPi profile");
        let err = gpu.set_workgroup_size(16, 17).unwrap_err();
        assert!(matches!(err, GpuError::WorkgroupTooLarge { total: 272, max: 256 }));
        println!("GPU_TEST_OK");
    }

    // Outer wrappers ──────────────────────────────────────────────────────────

    #[test]
    #[ignore = "requires a real Vulkan GPU"]
    fn test_gpu_device_init_rpi_profile() {
        let out = run_gpu_test_in_subprocess("gpu::device::tests::inner_gpu_device_init_rpi_profile");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real Vulkan GPU"]
    fn test_set_workgroup_size_too_large() {
        let out = run_gpu_test_in_subprocess("gpu::device::tests::inner_set_workgroup_size_too_large");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
