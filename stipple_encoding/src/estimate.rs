// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conservative capacity bounds for the bump-allocated coarse outputs.
//!
//! The bump allocators hand out face and edge slots with no feedback to the
//! producer, so the host must provision both buffers from upper bounds on
//! what the coarse pass can emit. The bounds here are deliberately loose:
//! clamping one edge against one bin box yields at most five pieces, and a
//! bin only receives stored pieces when the edge's expanded bounding box
//! touches it or when an edge endpoint lies in the bin's row or column
//! (boundary shadows elsewhere always span their full side and become
//! counter increments instead).

use crate::config::GridInfo;
use crate::edge::Edge;
use crate::math::Box2;

/// Most pieces one edge can contribute to one bin.
const MAX_CLIP_PIECES: u32 = 5;

/// Upper bounds on coarse-pass output, in records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BumpEstimate {
    pub faces: u32,
    pub edges: u32,
}

/// Bin index range covered by a box, clamped to the grid.
fn bin_range(grid: &GridInfo, bbox: &Box2) -> (u32, u32, u32, u32) {
    let clamp_x = |v: f32| (v.max(0.0) as u32).min(grid.width_in_bins);
    let clamp_y = |v: f32| (v.max(0.0) as u32).min(grid.height_in_bins);
    let x0 = clamp_x((bbox.min.x / grid.bin_width as f32).floor());
    let y0 = clamp_y((bbox.min.y / grid.bin_height as f32).floor());
    let x1 = clamp_x((bbox.max.x / grid.bin_width as f32).ceil());
    let y1 = clamp_y((bbox.max.y / grid.bin_height as f32).ceil());
    (x0, y0, x1, y1)
}

impl BumpEstimate {
    /// Accounts for one shape. `bbox` is the shape's filter-expanded
    /// bounding box; `full_cover` marks whole-raster covers, which emit
    /// full-area faces and never store edges.
    pub fn add_shape(
        &mut self,
        grid: &GridInfo,
        edges: &[Edge],
        bbox: &Box2,
        full_cover: bool,
        filter_radius: f32,
    ) {
        // The coarse pass tests the filter-expanded bin against the (already
        // expanded) shape box, so a bin can participate when it lies within
        // one more radius of it.
        let (x0, y0, x1, y1) = bin_range(grid, &bbox.expanded(filter_radius));
        let bins = (x1 - x0) * (y1 - y0);
        self.faces = self.faces.saturating_add(bins);
        if full_cover {
            return;
        }
        // Tiles the coarse pass will process for this shape; every bin of
        // those tiles can receive boundary shadows from endpoint rows and
        // columns.
        let tiles_w = x1.div_ceil(grid.tile_in_bins) - x0 / grid.tile_in_bins;
        let tiles_h = y1.div_ceil(grid.tile_in_bins) - y0 / grid.tile_in_bins;
        let shadow_bins = 2 * grid.tile_in_bins * (tiles_w + tiles_h);
        for edge in edges {
            let mut edge_bbox = Box2::empty();
            edge_bbox.union_point(edge.p0);
            edge_bbox.union_point(edge.p1);
            let edge_bbox = edge_bbox.expanded(2.0 * filter_radius);
            let (ex0, ey0, ex1, ey1) = bin_range(grid, &edge_bbox);
            let touched = (ex1 - ex0) * (ey1 - ey0);
            self.edges = self
                .edges
                .saturating_add(MAX_CLIP_PIECES * touched)
                .saturating_add(MAX_CLIP_PIECES * shadow_bins);
        }
    }
}
