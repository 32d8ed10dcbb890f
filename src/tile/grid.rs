//! Tile grid construction.
//!
//! For every useful sample size the original image is partitioned into a
//! grid of non-overlapping tiles that together cover it exactly. Sample
//! sizes are powers of two starting at 1; a level is included while its
//! grid is larger than a single tile; beyond that the thumbnail itself
//! covers the viewport, so a 1x1 level would never be drawn.
//!
//! Grid dimensions are driven by the preferred tile size (typically half
//! the viewport per axis) capped by the decode footprint ceiling: the
//! number of columns is the sampled width divided by the preferred tile
//! width, rounded up, and tile edges are placed by proportional split so
//! cell sizes differ by at most one pixel.

use std::collections::BTreeMap;

use crate::geom::{ceil_div, IntRect, IntSize};

use super::{Tile, TileCoord};

/// Hard upper bound on grid levels; 2^20 sampling is far beyond any real
/// image and only guards against degenerate inputs.
const MAX_SAMPLE_SIZE: u32 = 1 << 20;

/// Build the per-sample-size tile grids for an image.
///
/// `image_size` is the displayed (orientation-applied) original size.
/// `preferred_tile_size` drives the cell count; `footprint_ceiling` caps
/// the decoded pixel size of any single tile, bounding decoder memory.
pub fn calculate_tile_grid_map(
    image_size: IntSize,
    preferred_tile_size: IntSize,
    footprint_ceiling: IntSize,
) -> BTreeMap<u32, Vec<Tile>> {
    let mut map = BTreeMap::new();
    if image_size.is_empty() || preferred_tile_size.is_empty() {
        return map;
    }

    let cell_width = preferred_tile_size.width.min(footprint_ceiling.width).max(1);
    let cell_height = preferred_tile_size
        .height
        .min(footprint_ceiling.height)
        .max(1);

    let mut sample_size = 1u32;
    while sample_size <= MAX_SAMPLE_SIZE {
        let sampled_width = ceil_div(image_size.width, sample_size as i32);
        let sampled_height = ceil_div(image_size.height, sample_size as i32);

        let cols = ceil_div(sampled_width, cell_width);
        let rows = ceil_div(sampled_height, cell_height);
        if cols <= 1 && rows <= 1 {
            break;
        }

        let mut tiles = Vec::with_capacity((cols * rows) as usize);
        for row in 0..rows {
            let top = proportional_edge(image_size.height, rows, row);
            let bottom = proportional_edge(image_size.height, rows, row + 1);
            for col in 0..cols {
                let left = proportional_edge(image_size.width, cols, col);
                let right = proportional_edge(image_size.width, cols, col + 1);
                tiles.push(Tile {
                    coord: TileCoord::new(col, row),
                    src_rect: IntRect::new(left, top, right, bottom),
                    sample_size,
                });
            }
        }
        map.insert(sample_size, tiles);

        sample_size *= 2;
    }

    map
}

/// Edge `i` of an `n`-way proportional split of `extent`.
#[inline]
fn proportional_edge(extent: i32, n: i32, i: i32) -> i32 {
    ((extent as i64 * i as i64) / n as i64) as i32
}

/// Summarize a grid map as `sample_size -> (cols, rows)`.
///
/// Useful for diagnostics and as the shape the tests assert against.
pub fn tile_grid_size_map(map: &BTreeMap<u32, Vec<Tile>>) -> BTreeMap<u32, (i32, i32)> {
    map.iter()
        .map(|(&sample_size, tiles)| {
            let dims = tiles
                .last()
                .map(|t| (t.coord.col + 1, t.coord.row + 1))
                .unwrap_or((0, 0));
            (sample_size, dims)
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const CEILING: IntSize = IntSize::new(4096, 4096);

    #[test]
    fn test_grid_fixture() {
        // A 6799x4882 image under a 500x500 viewport (preferred tile
        // 250x250) partitions into five levels.
        let map = calculate_tile_grid_map(
            IntSize::new(6799, 4882),
            IntSize::new(250, 250),
            CEILING,
        );
        let sizes = tile_grid_size_map(&map);

        let expected: BTreeMap<u32, (i32, i32)> = [
            (1, (28, 20)),
            (2, (14, 10)),
            (4, (7, 5)),
            (8, (4, 3)),
            (16, (2, 2)),
        ]
        .into_iter()
        .collect();
        assert_eq!(sizes, expected);
    }

    #[test]
    fn test_exact_coverage_no_gaps_no_overlaps() {
        let image = IntSize::new(6799, 4882);
        let map = calculate_tile_grid_map(image, IntSize::new(250, 250), CEILING);

        for (sample_size, tiles) in &map {
            // Total area matches the image exactly
            let total: i64 = tiles.iter().map(|t| t.src_rect.size().area()).sum();
            assert_eq!(
                total,
                image.area(),
                "sample size {sample_size} area mismatch"
            );

            // No two tiles overlap
            for (i, a) in tiles.iter().enumerate() {
                assert!(!a.src_rect.is_empty());
                assert!(a.src_rect.is_within(image));
                for b in &tiles[i + 1..] {
                    assert!(
                        !a.src_rect.overlaps(&b.src_rect),
                        "sample size {sample_size}: {} overlaps {}",
                        a.src_rect,
                        b.src_rect
                    );
                }
            }

            // Exact area + no overlaps + in bounds => exact cover
        }
    }

    #[test]
    fn test_rows_and_columns_align() {
        let map = calculate_tile_grid_map(
            IntSize::new(1000, 600),
            IntSize::new(250, 250),
            CEILING,
        );
        let tiles = &map[&1];

        // Tiles in the same row share top/bottom, adjacent columns abut
        let cols = tiles.iter().map(|t| t.coord.col).max().unwrap() + 1;
        for t in tiles {
            let right_neighbor = tiles
                .iter()
                .find(|o| o.coord.row == t.coord.row && o.coord.col == t.coord.col + 1);
            if let Some(n) = right_neighbor {
                assert_eq!(t.src_rect.right, n.src_rect.left);
                assert_eq!(t.src_rect.top, n.src_rect.top);
                assert_eq!(t.src_rect.bottom, n.src_rect.bottom);
            } else {
                assert_eq!(t.coord.col, cols - 1);
                assert_eq!(t.src_rect.right, 1000);
            }
        }
    }

    #[test]
    fn test_small_image_has_no_levels() {
        // Image fits a single preferred tile: nothing to subsample
        let map = calculate_tile_grid_map(
            IntSize::new(200, 150),
            IntSize::new(250, 250),
            CEILING,
        );
        assert!(map.is_empty());
    }

    #[test]
    fn test_no_one_by_one_level() {
        let map = calculate_tile_grid_map(
            IntSize::new(6799, 4882),
            IntSize::new(250, 250),
            CEILING,
        );
        for tiles in map.values() {
            let dims = tiles.last().map(|t| (t.coord.col + 1, t.coord.row + 1));
            assert_ne!(dims, Some((1, 1)));
        }
        // The coarsest level is the largest key
        assert_eq!(*map.keys().last().unwrap(), 16);
    }

    #[test]
    fn test_footprint_ceiling_caps_cell_size() {
        // Preferred tile larger than the ceiling: the ceiling wins
        let map = calculate_tile_grid_map(
            IntSize::new(10_000, 10_000),
            IntSize::new(8192, 8192),
            IntSize::new(2048, 2048),
        );
        let tiles = &map[&1];
        for t in tiles {
            assert!(t.src_rect.width() <= 2048);
            assert!(t.src_rect.height() <= 2048);
        }
    }

    #[test]
    fn test_wide_strip_image() {
        // A 30000x926 panorama: plenty of columns, single row at level 1
        let map = calculate_tile_grid_map(
            IntSize::new(30_000, 926),
            IntSize::new(250, 250),
            CEILING,
        );
        let sizes = tile_grid_size_map(&map);
        assert_eq!(sizes[&1], (120, 4));
        // Still terminates with a >1x1 coarsest level
        let (&max_sample, _) = map.iter().last().unwrap();
        let (cols, rows) = sizes[&max_sample];
        assert!(cols > 1 || rows > 1);
    }
}
