// tiling.rs — Tile geometry shared by the locator, the diffusion iterator and
// the WGSL kernels.
//
// Every tile is TILE_SIZE×TILE_SIZE pixels. The outer HALO ring of a tile is
// loaded but never written back; only the inner OUTPUT_SIZE×OUTPUT_SIZE region
// is "owned" by the tile:
//
//   ┌────────────── 32 ──────────────┐
//   │ halo (4)                       │
//   │   ┌────────── 24 ──────────┐   │
//   │   │   output region        │   │
//   │   │   (written back)       │   │
//   │   └────────────────────────┘   │
//   │                                │
//   └────────────────────────────────┘
//
// Each diffusion sub-iteration reads one ring of neighbors, so after
// SUB_ITERATIONS steps errors from the unrefreshed halo have crept exactly
// HALO pixels inward. HALO == SUB_ITERATIONS keeps the output region exact.
//
// Tile origins are expressed in output-pixel coordinates: tile (i, j) owns
// pixels [i*24, i*24+24) × [j*24, j*24+24) and loads
// [i*24-4, i*24+28) × [j*24-4, j*24+28), clamped to the image.

/// Tile edge length in pixels (both axes).
pub const TILE_SIZE: usize = 32;

/// Diffusion sub-iterations run per kernel launch.
pub const SUB_ITERATIONS: usize = 4;

/// Halo margin on each side of a tile.
pub const HALO: usize = SUB_ITERATIONS;

/// Edge length of the region a tile writes back.
pub const OUTPUT_SIZE: usize = TILE_SIZE - 2 * HALO;

/// Minimum number of iterations between two convergence checks.
pub const CONVERGENCE_CHECK_INTERVAL: usize = 25;

/// 3×3 diffusion kernel weight for the four diagonal neighbors.
pub const DIAGONAL_WEIGHT: f32 = 0.073235;

/// 3×3 diffusion kernel weight for the four axis-aligned neighbors.
pub const AXIAL_WEIGHT: f32 = 0.176765;

/// The eight neighbor offsets with their kernel weights.
pub const NEIGHBORS: [(isize, isize, f32); 8] = [
    (-1, -1, DIAGONAL_WEIGHT),
    (0, -1, AXIAL_WEIGHT),
    (1, -1, DIAGONAL_WEIGHT),
    (-1, 0, AXIAL_WEIGHT),
    (1, 0, AXIAL_WEIGHT),
    (-1, 1, DIAGONAL_WEIGHT),
    (0, 1, AXIAL_WEIGHT),
    (1, 1, DIAGONAL_WEIGHT),
];

/// Origin of an active tile, in output-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockCoord {
    pub x: u32,
    pub y: u32,
}

impl BlockCoord {
    /// Flatten a list of origins into `[x0, y0, x1, y1, ...]`, the layout the
    /// diffusion kernels read.
    pub fn flatten(blocks: &[BlockCoord]) -> Vec<u32> {
        blocks.iter().flat_map(|b| [b.x, b.y]).collect()
    }
}

/// The grid of tiles covering an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub image_width: usize,
    pub image_height: usize,
    /// Number of tile columns.
    pub cols: usize,
    /// Number of tile rows.
    pub rows: usize,
}

impl TileGrid {
    /// Grid for an image of the given size. Uses ceiling division so the
    /// output regions cover every pixel.
    pub fn new(image_width: usize, image_height: usize) -> Self {
        TileGrid {
            image_width,
            image_height,
            cols: image_width.div_ceil(OUTPUT_SIZE),
            rows: image_height.div_ceil(OUTPUT_SIZE),
        }
    }

    /// Total number of tiles.
    pub fn cell_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Origin (output-pixel coordinates) of the tile at grid cell (col, row).
    pub fn origin(&self, col: usize, row: usize) -> BlockCoord {
        debug_assert!(col < self.cols && row < self.rows);
        BlockCoord {
            x: (col * OUTPUT_SIZE) as u32,
            y: (row * OUTPUT_SIZE) as u32,
        }
    }

    /// Global pixel coordinate of tile pixel (tx, ty) for a tile at `origin`.
    /// May lie outside the image (negative or past the far edge).
    #[inline]
    pub fn global_coord(origin: BlockCoord, tx: usize, ty: usize) -> (isize, isize) {
        (
            origin.x as isize + tx as isize - HALO as isize,
            origin.y as isize + ty as isize - HALO as isize,
        )
    }

    /// `true` if the (possibly out-of-range) coordinate lies inside the image.
    #[inline]
    pub fn contains(&self, x: isize, y: isize) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.image_width && (y as usize) < self.image_height
    }

    /// Clamp a coordinate into the image (boundary-clamp addressing).
    #[inline]
    pub fn clamp(&self, x: isize, y: isize) -> (usize, usize) {
        (
            x.clamp(0, self.image_width as isize - 1) as usize,
            y.clamp(0, self.image_height as isize - 1) as usize,
        )
    }
}

/// `true` for tile pixels inside the written-back output region.
#[inline]
pub fn in_output_region(tx: usize, ty: usize) -> bool {
    (HALO..TILE_SIZE - HALO).contains(&tx) && (HALO..TILE_SIZE - HALO).contains(&ty)
}

/// `true` for tile pixels whose full 8-neighborhood lies inside the tile.
#[inline]
pub fn has_full_ring(tx: usize, ty: usize) -> bool {
    (1..TILE_SIZE - 1).contains(&tx) && (1..TILE_SIZE - 1).contains(&ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_constants() {
        assert_eq!(TILE_SIZE, 32);
        assert_eq!(HALO, SUB_ITERATIONS);
        assert_eq!(OUTPUT_SIZE, 24);
    }

    #[test]
    fn test_kernel_weights_sum_to_one() {
        let sum: f32 = NEIGHBORS.iter().map(|&(_, _, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-5, "kernel sum = {sum}");
    }

    #[test]
    fn test_grid_ceiling() {
        let grid = TileGrid::new(64, 64);
        // 64 / 24 = 2.67 → 3 tiles per axis.
        assert_eq!(grid.cols, 3);
        assert_eq!(grid.rows, 3);
        assert_eq!(grid.cell_count(), 9);

        let exact = TileGrid::new(48, 24);
        assert_eq!((exact.cols, exact.rows), (2, 1));
    }

    #[test]
    fn test_origin_and_global_coord() {
        let grid = TileGrid::new(100, 100);
        let o = grid.origin(2, 1);
        assert_eq!(o, BlockCoord { x: 48, y: 24 });
        // Tile pixel (HALO, HALO) is the origin itself.
        assert_eq!(TileGrid::global_coord(o, HALO, HALO), (48, 24));
        // Tile pixel (0, 0) lies in the halo, up and left of the origin.
        assert_eq!(TileGrid::global_coord(o, 0, 0), (44, 20));
    }

    #[test]
    fn test_clamp_and_contains() {
        let grid = TileGrid::new(10, 5);
        assert!(!grid.contains(-1, 0));
        assert!(!grid.contains(10, 0));
        assert!(grid.contains(9, 4));
        assert_eq!(grid.clamp(-3, 7), (0, 4));
    }

    #[test]
    fn test_regions() {
        assert!(in_output_region(HALO, HALO));
        assert!(!in_output_region(HALO - 1, HALO));
        assert!(!in_output_region(TILE_SIZE - HALO, HALO));
        assert!(has_full_ring(1, 1));
        assert!(!has_full_ring(0, 5));
        assert!(!has_full_ring(TILE_SIZE - 1, 5));
    }

    #[test]
    fn test_flatten_block_coords() {
        let blocks = [BlockCoord { x: 0, y: 24 }, BlockCoord { x: 48, y: 0 }];
        assert_eq!(BlockCoord::flatten(&blocks), vec![0, 24, 48, 0]);
    }
}
