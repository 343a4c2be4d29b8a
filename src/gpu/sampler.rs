// gpu/sampler.rs — Boundary samplers over device buffers.
//
// Kernels read the original input images through a sampler with a defined
// boundary behavior instead of indexing the storage buffer directly. wgpu can
// only sample textures, so a BoundarySampler owns a texture mirror of the
// buffer plus the wgpu::Sampler, and is refreshed from the buffer with an
// on-stream buffer→texture copy. Device buffers keep a 256-byte row pitch, so
// the copy needs no repacking.
//
// Texel formats:
//   f32   → R32Float
//   Rgba  → Rgba32Float
//
// Both are non-filterable unless the device has FLOAT32_FILTERABLE, so
// samplers are bound as NonFiltering whenever the filter mode is Nearest.

use crate::gpu::device::GpuDevice;
use crate::gpu::stream::GpuStream;
use crate::image::{Pixel, Rgba};

/// Pixel types that have a sampleable texture format.
pub trait TexelElement: Pixel {
    const FORMAT: wgpu::TextureFormat;
    /// WGSL type returned by the resample shader for this element.
    const WGSL_TYPE: &'static str;
    /// WGSL expression turning a sampled `vec4<f32>` named `s` into `WGSL_TYPE`.
    const WGSL_FROM_SAMPLE: &'static str;
}

impl TexelElement for f32 {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
    const WGSL_TYPE: &'static str = "f32";
    const WGSL_FROM_SAMPLE: &'static str = "s.r";
}

impl TexelElement for Rgba {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
    const WGSL_TYPE: &'static str = "vec4<f32>";
    const WGSL_FROM_SAMPLE: &'static str = "s";
}

/// Requested boundary-sampler behavior. Two requests share a cached sampler
/// exactly when they compare equal.
///
/// There is no read-mode or coordinate-mode field: wgpu samplers always take
/// normalized coordinates, and the element type's [`TexelElement`] format
/// fixes how texels are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    pub address_mode_x: wgpu::AddressMode,
    pub address_mode_y: wgpu::AddressMode,
    pub filter_mode: wgpu::FilterMode,
}

impl Default for SamplerConfig {
    /// Clamp to edge, nearest neighbor: the configuration inpainting requires.
    fn default() -> Self {
        SamplerConfig {
            address_mode_x: wgpu::AddressMode::ClampToEdge,
            address_mode_y: wgpu::AddressMode::ClampToEdge,
            filter_mode: wgpu::FilterMode::Nearest,
        }
    }
}

impl SamplerConfig {
    /// `true` when binding the sampler requires a filtering binding type.
    pub fn is_filtering(&self) -> bool {
        self.filter_mode == wgpu::FilterMode::Linear
    }
}

/// A texture mirror of a device buffer plus a sampler reading it.
pub struct BoundarySampler {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub config: SamplerConfig,
    pub width: u32,
    pub height: u32,
}

impl BoundarySampler {
    /// Allocate the texture and sampler. The texture starts zeroed; call
    /// [`BoundarySampler::refresh`] to fill it.
    ///
    /// # Panics
    /// Panics on a linear filter when the device cannot filter float textures.
    pub fn new(
        gpu: &GpuDevice,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        config: SamplerConfig,
    ) -> Self {
        assert!(
            !config.is_filtering() || gpu.float32_filterable,
            "linear filtering of float textures is not supported by this device"
        );
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("BoundarySampler"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("BoundarySampler"),
            address_mode_u: config.address_mode_x,
            address_mode_v: config.address_mode_y,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: config.filter_mode,
            min_filter: config.filter_mode,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        BoundarySampler { texture, view, sampler, config, width, height }
    }

    /// Record a copy of `buffer` (rows `pitch` bytes apart) into the texture.
    pub fn refresh(&self, stream: &mut GpuStream, buffer: &wgpu::Buffer, pitch: u32) {
        stream.encoder().copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(pitch),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 },
        );
    }

    /// Layout entries (texture + sampler) for binding this sampler at
    /// `binding` and `binding + 1`.
    pub fn layout_entries(binding: u32, filtering: bool) -> [wgpu::BindGroupLayoutEntry; 2] {
        let sampler_type = if filtering {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };
        [
            wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: filtering },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: binding + 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Sampler(sampler_type),
                count: None,
            },
        ]
    }

    /// Bind group entries matching [`BoundarySampler::layout_entries`].
    pub fn bind_entries(&self, binding: u32) -> [wgpu::BindGroupEntry<'_>; 2] {
        [
            wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(&self.view),
            },
            wgpu::BindGroupEntry {
                binding: binding + 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_clamped_nearest() {
        let c = SamplerConfig::default();
        assert_eq!(c.address_mode_x, wgpu::AddressMode::ClampToEdge);
        assert_eq!(c.address_mode_y, wgpu::AddressMode::ClampToEdge);
        assert!(!c.is_filtering());
    }

    #[test]
    fn test_config_equality_drives_cache_reuse() {
        let a = SamplerConfig::default();
        let b = SamplerConfig {
            address_mode_x: wgpu::AddressMode::Repeat,
            ..a
        };
        assert_eq!(a, SamplerConfig::default());
        assert_ne!(a, b);
    }

    #[test]
    fn test_texel_formats() {
        assert_eq!(<f32 as TexelElement>::FORMAT, wgpu::TextureFormat::R32Float);
        assert_eq!(<Rgba as TexelElement>::FORMAT, wgpu::TextureFormat::Rgba32Float);
    }

    #[test]
    fn test_layout_entries_binding_types() {
        let [tex, samp] = BoundarySampler::layout_entries(2, false);
        assert_eq!(tex.binding, 2);
        assert_eq!(samp.binding, 3);
        assert!(matches!(
            samp.ty,
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering)
        ));
    }
}
