// compaction.rs — Active block list construction and shrinking.
//
// Host side of the host/device ping-pong. After the locator pass the per-tile
// hole counts are read back and turned into a dense list of block origins;
// after every convergence check the per-block change flags are read back and
// the list is filtered. Both operations preserve row-major order, and the list
// only ever shrinks.

use crate::tiling::{BlockCoord, TileGrid};

/// Result of compacting the locator's per-tile counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveBlocks {
    /// Origins of tiles with at least one hole, row-major.
    pub blocks: Vec<BlockCoord>,
    /// Sum of all per-tile hole counts.
    pub pixels_to_inpaint: usize,
}

/// Build the active list from row-major per-tile hole counts.
///
/// # Panics
/// Panics if `counts` is shorter than the grid.
pub fn compact_active_blocks(counts: &[u32], grid: &TileGrid) -> ActiveBlocks {
    assert!(
        counts.len() >= grid.cell_count(),
        "{} counts for a grid of {} tiles",
        counts.len(),
        grid.cell_count()
    );

    let mut blocks = Vec::new();
    let mut pixels_to_inpaint = 0usize;
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let count = counts[row * grid.cols + col];
            if count > 0 {
                blocks.push(grid.origin(col, row));
                pixels_to_inpaint += count as usize;
            }
        }
    }
    ActiveBlocks {
        blocks,
        pixels_to_inpaint,
    }
}

/// Drop every block whose change flag is zero. `flags[i]` belongs to
/// `blocks[i]`.
///
/// # Panics
/// Panics if there are fewer flags than blocks.
pub fn retain_changing(blocks: &mut Vec<BlockCoord>, flags: &[u32]) {
    assert!(
        flags.len() >= blocks.len(),
        "{} flags for {} active blocks",
        flags.len(),
        blocks.len()
    );
    let mut i = 0;
    blocks.retain(|_| {
        let keep = flags[i] != 0;
        i += 1;
        keep
    });
}
