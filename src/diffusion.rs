// diffusion.rs — Tile-cached diffusion iterator (host reference path).
//
// Each launch walks the active block list. For every block, a TileCache holds
// the 32×32 pixels around the block's output region (origin minus HALO,
// clamped into the image). SUB_ITERATIONS rounds of 3×3 weighted averaging
// then run entirely inside the cache, and the output region is flushed back
// to the working image.
//
// The device kernels (shaders/diffuse_*.wgsl) implement exactly the same
// steps in workgroup memory; this file is what they are tested against.
//
// Three variants share the machinery through the DiffusionVariant trait:
//
//   DepthUnweighted  f32,  hole == 0,   neighbor valid if != 0
//   DepthWeighted    f32,  hole <= 0,   neighbor valid if > 0, scaled by
//                    the neighbor's base weight 1 / (1 + max(edge, 0))
//   Color            Rgba, hole a == 0, neighbor valid if a != 0
//
// New concepts this file introduces:
// - Associated types and associated consts on a trait
// - Zero-sized marker types selecting behavior at compile time (the host
//   analogue of the WGSL `override` constants)

use crate::image::{Image, Pixel, Rgba};
use crate::tiling::{
    has_full_ring, in_output_region, BlockCoord, TileGrid, NEIGHBORS, SUB_ITERATIONS, TILE_SIZE,
};

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Pixel semantics of one diffusion variant.
pub trait DiffusionVariant {
    type Value: Pixel;

    /// `true` when neighbor contributions are scaled by an edge-derived base weight.
    const WEIGHTED: bool;

    /// Hole test applied to the (scaled) original input.
    fn is_hole(v: Self::Value) -> bool;

    /// `true` when a neighbor's current working value may contribute.
    fn is_valid(v: Self::Value) -> bool;

    /// `acc += v * w`
    fn accumulate(acc: Self::Value, v: Self::Value, w: f32) -> Self::Value;

    /// `acc / weight`
    fn normalize(acc: Self::Value, weight: f32) -> Self::Value;

    /// `true` when the relative change from `old` to `new` exceeds `threshold`.
    ///
    /// A pixel whose `old` value is not valid has not been filled yet and
    /// always counts as changing, as does a change measure of NaN.
    fn exceeds_threshold(new: Self::Value, old: Self::Value, threshold: f32) -> bool;
}

/// Plain depth diffusion: zero marks a hole.
pub struct DepthUnweighted;

/// Edge-aware depth diffusion: non-positive values mark a hole.
pub struct DepthWeighted;

/// RGBA diffusion: zero alpha marks a hole.
pub struct Color;

impl DiffusionVariant for DepthUnweighted {
    type Value = f32;
    const WEIGHTED: bool = false;

    fn is_hole(v: f32) -> bool {
        v == 0.0
    }

    fn is_valid(v: f32) -> bool {
        v != 0.0
    }

    fn accumulate(acc: f32, v: f32, w: f32) -> f32 {
        acc + v * w
    }

    fn normalize(acc: f32, weight: f32) -> f32 {
        acc / weight
    }

    fn exceeds_threshold(new: f32, old: f32, threshold: f32) -> bool {
        !Self::is_valid(old) || !((new - old).abs() / old <= threshold)
    }
}

impl DiffusionVariant for DepthWeighted {
    type Value = f32;
    const WEIGHTED: bool = true;

    fn is_hole(v: f32) -> bool {
        v <= 0.0
    }

    fn is_valid(v: f32) -> bool {
        v > 0.0
    }

    fn accumulate(acc: f32, v: f32, w: f32) -> f32 {
        acc + v * w
    }

    fn normalize(acc: f32, weight: f32) -> f32 {
        acc / weight
    }

    fn exceeds_threshold(new: f32, old: f32, threshold: f32) -> bool {
        !Self::is_valid(old) || !((new - old).abs() / old <= threshold)
    }
}

impl DiffusionVariant for Color {
    type Value = Rgba;
    const WEIGHTED: bool = false;

    fn is_hole(v: Rgba) -> bool {
        v[3] == 0.0
    }

    fn is_valid(v: Rgba) -> bool {
        v[3] != 0.0
    }

    fn accumulate(acc: Rgba, v: Rgba, w: f32) -> Rgba {
        [
            acc[0] + v[0] * w,
            acc[1] + v[1] * w,
            acc[2] + v[2] * w,
            acc[3] + v[3] * w,
        ]
    }

    fn normalize(acc: Rgba, weight: f32) -> Rgba {
        [acc[0] / weight, acc[1] / weight, acc[2] / weight, acc[3] / weight]
    }

    fn exceeds_threshold(new: Rgba, old: Rgba, threshold: f32) -> bool {
        let diff: f32 = (0..4).map(|c| (new[c] - old[c]).powi(2)).sum::<f32>().sqrt();
        let len: f32 = old.iter().map(|c| c * c).sum::<f32>().sqrt();
        !Self::is_valid(old) || !(diff / len <= threshold)
    }
}

/// Base weight of a pixel with the given edge strength.
#[inline]
pub fn edge_base_weight(edge_strength: f32) -> f32 {
    1.0 / (1.0 + edge_strength.max(0.0))
}

// ---------------------------------------------------------------------------
// TileCache
// ---------------------------------------------------------------------------

const TILE_PIXELS: usize = TILE_SIZE * TILE_SIZE;

/// Local copy of one block plus its halo: the host counterpart of the
/// kernels' workgroup arrays.
pub struct TileCache<T: Pixel> {
    origin: BlockCoord,
    values: Vec<T>,
    base_weight: Vec<f32>,
    hole: Vec<bool>,
    inside: Vec<bool>,
}

impl<T: Pixel> TileCache<T> {
    /// Load the block at `origin`.
    ///
    /// `working` supplies the current values, `input` (already scaled)
    /// decides hole status, `edge` supplies base weights when present.
    pub fn load<V: DiffusionVariant<Value = T>>(
        grid: &TileGrid,
        origin: BlockCoord,
        working: &Image<T>,
        input: &Image<T>,
        edge: Option<&Image<f32>>,
    ) -> Self {
        let mut cache = TileCache {
            origin,
            values: Vec::with_capacity(TILE_PIXELS),
            base_weight: Vec::with_capacity(TILE_PIXELS),
            hole: Vec::with_capacity(TILE_PIXELS),
            inside: Vec::with_capacity(TILE_PIXELS),
        };
        for ty in 0..TILE_SIZE {
            for tx in 0..TILE_SIZE {
                let (gx, gy) = TileGrid::global_coord(origin, tx, ty);
                let (cx, cy) = grid.clamp(gx, gy);
                cache.values.push(working.get(cx, cy));
                cache.hole.push(V::is_hole(input.get(cx, cy)));
                cache.inside.push(grid.contains(gx, gy));
                let w = match edge {
                    Some(e) if V::WEIGHTED => edge_base_weight(e.get(cx, cy)),
                    _ => 1.0,
                };
                cache.base_weight.push(w);
            }
        }
        cache
    }

    #[inline]
    pub fn value(&self, tx: usize, ty: usize) -> T {
        self.values[ty * TILE_SIZE + tx]
    }

    #[inline]
    fn updatable(&self, idx: usize, tx: usize, ty: usize) -> bool {
        has_full_ring(tx, ty) && self.inside[idx] && self.hole[idx]
    }

    /// One synchronous averaging step over the whole cache.
    ///
    /// Candidates are computed from the state at the start of the step and
    /// committed together. With `check` set, returns whether any output
    /// pixel changed by more than `threshold`.
    pub fn step<V: DiffusionVariant<Value = T>>(&mut self, check: bool, threshold: f32) -> bool {
        let mut candidates: Vec<(usize, T)> = Vec::new();
        let mut changed = false;

        for ty in 0..TILE_SIZE {
            for tx in 0..TILE_SIZE {
                let idx = ty * TILE_SIZE + tx;
                if !self.updatable(idx, tx, ty) {
                    continue;
                }
                let mut sum = T::default();
                let mut weight = 0.0f32;
                for &(dx, dy, k) in NEIGHBORS.iter() {
                    let n = (ty as isize + dy) as usize * TILE_SIZE + (tx as isize + dx) as usize;
                    let v = self.values[n];
                    if self.inside[n] && V::is_valid(v) {
                        let w = k * self.base_weight[n];
                        sum = V::accumulate(sum, v, w);
                        weight += w;
                    }
                }

                let old = self.values[idx];
                let new = if weight > 0.0 {
                    let new = V::normalize(sum, weight);
                    candidates.push((idx, new));
                    new
                } else {
                    old
                };
                if check && in_output_region(tx, ty) && V::exceeds_threshold(new, old, threshold) {
                    changed = true;
                }
            }
        }

        for (idx, v) in candidates {
            self.values[idx] = v;
        }
        changed
    }

    /// Write the hole pixels of the output region back to `working`.
    pub fn store(&self, working: &mut Image<T>) {
        for ty in 0..TILE_SIZE {
            for tx in 0..TILE_SIZE {
                let idx = ty * TILE_SIZE + tx;
                if !in_output_region(tx, ty) || !self.inside[idx] || !self.hole[idx] {
                    continue;
                }
                let (gx, gy) = TileGrid::global_coord(self.origin, tx, ty);
                working.set(gx as usize, gy as usize, self.values[idx]);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Launch
// ---------------------------------------------------------------------------

/// Run one launch (SUB_ITERATIONS steps) over every block in `blocks`.
///
/// All blocks read the working image as it was at the start of the launch.
/// Returns one flag per block: 1 when `check` is set and the block changed
/// by more than `threshold` on its last sub-iteration, else 0.
pub fn diffuse_blocks<V: DiffusionVariant>(
    grid: &TileGrid,
    blocks: &[BlockCoord],
    input: &Image<V::Value>,
    edge: Option<&Image<f32>>,
    working: &mut Image<V::Value>,
    threshold: f32,
    check: bool,
) -> Vec<u32> {
    let snapshot = working.clone();
    blocks
        .iter()
        .map(|&origin| {
            let mut cache = TileCache::load::<V>(grid, origin, &snapshot, input, edge);
            let mut changed = false;
            for sub in 0..SUB_ITERATIONS {
                let last = sub + 1 == SUB_ITERATIONS;
                changed = cache.step::<V>(check && last, threshold);
            }
            cache.store(working);
            changed as u32
        })
        .collect()
}
