//! Seam removal between adjacent tiles.
//!
//! Stitching reads only *raw* (unstitched) grids, so the value written on a
//! shared edge is the same no matter which of the two tiles is generated
//! first, and neighbours that are already resident never need rewriting.
//!
//! - Shared edge sample: `0.5 * own + 0.5 * neighbour`.
//! - Shared corner: mean of the four tiles touching it, summed in a fixed
//!   order so every tile computes the bit-identical value.

use std::collections::HashMap;
use std::sync::Arc;

use terrastream_common::TileCoord;
use terrastream_elevation::ElevationGrid;

/// Lookup of raw grids around the tile being stitched.
pub trait RawNeighbors {
    fn raw(&self, coord: TileCoord) -> Option<&ElevationGrid>;
}

impl RawNeighbors for HashMap<TileCoord, Arc<ElevationGrid>> {
    fn raw(&self, coord: TileCoord) -> Option<&ElevationGrid> {
        self.get(&coord).map(Arc::as_ref)
    }
}

impl RawNeighbors for HashMap<TileCoord, ElevationGrid> {
    fn raw(&self, coord: TileCoord) -> Option<&ElevationGrid> {
        self.get(&coord)
    }
}

/// The eight tiles around `coord`.
pub(crate) fn neighbourhood(coord: TileCoord) -> [TileCoord; 8] {
    [
        coord.offset(-1, -1),
        coord.offset(0, -1),
        coord.offset(1, -1),
        coord.offset(-1, 0),
        coord.offset(1, 0),
        coord.offset(-1, 1),
        coord.offset(0, 1),
        coord.offset(1, 1),
    ]
}

/// Blend the border of `raw` with its neighbours' raw borders.
///
/// Sides whose neighbour is unavailable (or was generated at a different
/// resolution) keep their raw values.
pub fn stitch_edges(raw: &ElevationGrid, neighbors: &impl RawNeighbors) -> ElevationGrid {
    let coord = raw.coord();
    let res = raw.resolution();
    let last = res - 1;
    let mut out = raw.clone();

    let matching = |c: TileCoord| neighbors.raw(c).filter(|g| g.resolution() == res);

    if let Some(west) = matching(coord.offset(-1, 0)) {
        for j in 0..res {
            out.set(0, j, 0.5 * raw.get(0, j) + 0.5 * west.get(last, j));
        }
    }
    if let Some(east) = matching(coord.offset(1, 0)) {
        for j in 0..res {
            out.set(last, j, 0.5 * raw.get(last, j) + 0.5 * east.get(0, j));
        }
    }
    if let Some(south) = matching(coord.offset(0, -1)) {
        for i in 0..res {
            out.set(i, 0, 0.5 * raw.get(i, 0) + 0.5 * south.get(i, last));
        }
    }
    if let Some(north) = matching(coord.offset(0, 1)) {
        for i in 0..res {
            out.set(i, last, 0.5 * raw.get(i, last) + 0.5 * north.get(i, 0));
        }
    }

    // Each corner is the north-east corner of the tile `base` and touches
    // base, base+x, base+z and base+xz.
    for (i, j, base) in [
        (0, 0, coord.offset(-1, -1)),
        (last, 0, coord.offset(0, -1)),
        (0, last, coord.offset(-1, 0)),
        (last, last, coord),
    ] {
        let corner_samples = [
            (base, last, last),
            (base.offset(1, 0), 0, last),
            (base.offset(0, 1), last, 0),
            (base.offset(1, 1), 0, 0),
        ];
        let mut sum = 0.0f32;
        let mut count = 0u32;
        for (c, ci, cj) in corner_samples {
            let sample = if c == coord {
                Some(raw.get(ci, cj))
            } else {
                matching(c).map(|g| g.get(ci, cj))
            };
            if let Some(v) = sample {
                sum += v;
                count += 1;
            }
        }
        if count == 4 {
            out.set(i, j, sum * 0.25);
        } else if count > 1 {
            out.set(i, j, sum / count as f32);
        }
    }

    out
}
