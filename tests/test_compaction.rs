// tests/test_compaction.rs — Locator + compactor integration tests.
//
// These run with `cargo test --test test_compaction`. They exercise the
// host half of the host/device ping-pong: per-tile hole counts from the
// locator, the dense active list built from them, and list shrinking after a
// convergence check.

use depth_inpaint::compaction::{compact_active_blocks, retain_changing};
use depth_inpaint::diffusion::{Color, DepthUnweighted, DepthWeighted};
use depth_inpaint::image::{Image, Rgba};
use depth_inpaint::locator::locate_active_blocks;
use depth_inpaint::tiling::{BlockCoord, TileGrid, OUTPUT_SIZE};

// ===== Locator =====

#[test]
fn locator_counts_holes_per_tile() {
    // 60×30 → 3×2 grid. One hole in tile (0,0), three in tile (2,1).
    let mut input = Image::filled(60, 30, 1.0f32);
    input.set(3, 3, 0.0);
    input.set(50, 25, 0.0);
    input.set(59, 29, 0.0);
    input.set(48, 24, 0.0);
    let grid = TileGrid::new(60, 30);
    let mut working = Image::new(60, 30);

    let counts = locate_active_blocks::<DepthUnweighted>(&grid, &input, &mut working);
    assert_eq!(counts, vec![1, 0, 0, 0, 0, 3]);
    // The locator also ingests the input into the working image.
    assert_eq!(working, input);
}

#[test]
fn locator_hole_test_depends_on_variant() {
    let mut input = Image::filled(24, 24, 2.0f32);
    input.set(0, 0, -1.0);
    input.set(1, 0, 0.0);
    let grid = TileGrid::new(24, 24);
    let mut working = Image::new(24, 24);

    let plain = locate_active_blocks::<DepthUnweighted>(&grid, &input, &mut working);
    let weighted = locate_active_blocks::<DepthWeighted>(&grid, &input, &mut working);
    assert_eq!(plain, vec![1]);
    assert_eq!(weighted, vec![2]);
}

#[test]
fn locator_rgba_uses_alpha() {
    let mut input: Image<Rgba> = Image::filled(30, 10, [0.5, 0.5, 0.5, 1.0]);
    input.set(2, 2, [0.0, 0.0, 0.0, 1.0]); // black but opaque: not a hole
    input.set(28, 9, [0.3, 0.3, 0.3, 0.0]);
    let grid = TileGrid::new(30, 10);
    let mut working = Image::new(30, 10);
    let counts = locate_active_blocks::<Color>(&grid, &input, &mut working);
    assert_eq!(counts, vec![0, 1]);
}

// ===== Compactor =====

#[test]
fn compaction_is_row_major_and_sums_counts() {
    let grid = TileGrid::new(72, 48); // 3×2
    let counts = [0, 4, 0, 7, 0, 1];
    let active = compact_active_blocks(&counts, &grid);
    assert_eq!(active.pixels_to_inpaint, 12);
    let s = OUTPUT_SIZE as u32;
    assert_eq!(
        active.blocks,
        vec![
            BlockCoord { x: s, y: 0 },
            BlockCoord { x: 0, y: s },
            BlockCoord { x: 2 * s, y: s },
        ]
    );
}

#[test]
fn compaction_of_complete_image_is_empty() {
    let grid = TileGrid::new(100, 100);
    let active = compact_active_blocks(&vec![0; grid.cell_count()], &grid);
    assert!(active.blocks.is_empty());
    assert_eq!(active.pixels_to_inpaint, 0);
}

#[test]
#[should_panic(expected = "counts for a grid")]
fn compaction_rejects_short_counts() {
    let grid = TileGrid::new(100, 100);
    compact_active_blocks(&[1, 2], &grid);
}

#[test]
fn locate_then_compact_then_shrink() {
    let mut input = Image::filled(96, 24, 3.0f32);
    for x in [5, 30, 55, 80] {
        input.set(x, 10, 0.0);
    }
    let grid = TileGrid::new(96, 24);
    let mut working = Image::new(96, 24);
    let counts = locate_active_blocks::<DepthUnweighted>(&grid, &input, &mut working);
    let mut active = compact_active_blocks(&counts, &grid);
    assert_eq!(active.blocks.len(), 4);
    assert_eq!(active.pixels_to_inpaint, 4);

    retain_changing(&mut active.blocks, &[0, 1, 1, 0]);
    assert_eq!(
        active.blocks,
        vec![BlockCoord { x: 24, y: 0 }, BlockCoord { x: 48, y: 0 }]
    );
    retain_changing(&mut active.blocks, &[0, 0]);
    assert!(active.blocks.is_empty());
}
