// locator.rs — Active-block locator (host reference path).
//
// One pass over the tile grid. Every tile pixel inside the tile's 24×24 output
// region and inside the image copies the scaled input into the working image
// and counts itself if it is a hole. The per-tile counts come out row-major
// over the grid, ready for the compactor.
//
// The device version (shaders/locate_*.wgsl) maps 16×16 invocations onto the
// 32×32 tile and sums the counts with a workgroup tree reduction; the result
// per tile is identical.

use crate::diffusion::DiffusionVariant;
use crate::image::Image;
use crate::tiling::{in_output_region, TileGrid, TILE_SIZE};

/// Copy `input` into `working` and count holes per tile.
///
/// `input` is the original image with the scaling factor already applied.
/// Returns `grid.cell_count()` counts in row-major order.
///
/// # Panics
/// Panics if `input` and `working` differ in size or do not match `grid`.
pub fn locate_active_blocks<V: DiffusionVariant>(
    grid: &TileGrid,
    input: &Image<V::Value>,
    working: &mut Image<V::Value>,
) -> Vec<u32> {
    assert!(input.same_size(working), "input and working image sizes differ");
    assert!(
        input.width() == grid.image_width && input.height() == grid.image_height,
        "tile grid does not match image size"
    );

    let mut counts = Vec::with_capacity(grid.cell_count());
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let origin = grid.origin(col, row);
            let mut holes = 0u32;
            for ty in 0..TILE_SIZE {
                for tx in 0..TILE_SIZE {
                    if !in_output_region(tx, ty) {
                        continue;
                    }
                    let (gx, gy) = TileGrid::global_coord(origin, tx, ty);
                    if !grid.contains(gx, gy) {
                        continue;
                    }
                    let (x, y) = (gx as usize, gy as usize);
                    let v = input.get(x, y);
                    working.set(x, y, v);
                    if V::is_hole(v) {
                        holes += 1;
                    }
                }
            }
            counts.push(holes);
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::{Color, DepthUnweighted, DepthWeighted};
    use crate::image::Rgba;

    #[test]
    fn test_counts_per_tile() {
        // 50×30 → 3×2 tiles. Holes at (0,0), (30,5) and (49,29).
        let mut input = Image::filled(50, 30, 1.0f32);
        input.set(0, 0, 0.0);
        input.set(30, 5, 0.0);
        input.set(49, 29, 0.0);
        let mut working: Image<f32> = Image::new(50, 30);
        let grid = TileGrid::new(50, 30);

        let counts = locate_active_blocks::<DepthUnweighted>(&grid, &input, &mut working);
        assert_eq!(counts, vec![1, 1, 0, 0, 0, 1]);
        assert_eq!(working, input);
    }

    #[test]
    fn test_weighted_counts_negative_values() {
        let mut input = Image::filled(10, 10, 1.0f32);
        input.set(1, 1, -2.0);
        input.set(2, 2, 0.0);
        let mut working: Image<f32> = Image::new(10, 10);
        let grid = TileGrid::new(10, 10);

        let plain = locate_active_blocks::<DepthUnweighted>(&grid, &input, &mut working);
        let weighted = locate_active_blocks::<DepthWeighted>(&grid, &input, &mut working);
        assert_eq!(plain, vec![1]);
        assert_eq!(weighted, vec![2]);
    }

    #[test]
    fn test_every_pixel_counted_once() {
        let input: Image<Rgba> = Image::new(70, 49);
        let mut working = Image::filled(70, 49, [1.0; 4]);
        let grid = TileGrid::new(70, 49);
        let counts = locate_active_blocks::<Color>(&grid, &input, &mut working);
        assert_eq!(counts.len(), grid.cell_count());
        assert_eq!(counts.iter().sum::<u32>(), 70 * 49);
        assert_eq!(working, input);
    }
}
