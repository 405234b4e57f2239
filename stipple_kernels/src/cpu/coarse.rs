// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Coarse binning kernel.
//!
//! One thread-group per (shape x tile), one thread per bin inside the tile.
//! Each bin clamps the shape's edges against its filter-expanded bounds,
//! summarizes full-side boundary runs as signed counters, classifies the
//! result and publishes a face record linked in front of the bin's head
//! pointer. The workgroup reduces its allocation needs with an exclusive
//! scan so the global bump counters see one add per group, not one per
//! thread. Groups never communicate; cross-group linking order is whatever
//! the allocation order happens to be, which the fine pass untangles.

use stipple_encoding::math::{Box2, Vec2};
use stipple_encoding::{
    BumpAllocators, ConfigUniform, EdgeSegment, FaceRecord, ShapeInfo, FACE_EVEN_ODD,
    FACE_FULL_AREA,
};

use super::clip::{clamp_edge, counter_area, piece_area, SIDE_MAX_X};
use super::CpuBinding;

/// Modeled in a compute-shader rendition as per-thread registers plus the
/// workgroup-shared edge staging area.
#[derive(Default)]
struct BinState {
    emit: bool,
    full: bool,
    counts: [i32; 4],
    edges: Vec<EdgeSegment>,
}

impl BinState {
    fn reset(&mut self) {
        self.emit = false;
        self.full = false;
        self.counts = [0; 4];
        self.edges.clear();
    }
}

fn coarse_main(
    config: &ConfigUniform,
    shapes: &[ShapeInfo],
    scene_edges: &[EdgeSegment],
    bin_heads: &mut [u32],
    faces: &mut [FaceRecord],
    bin_edges: &mut [EdgeSegment],
    bump: &mut BumpAllocators,
) {
    let tile = config.tile_in_bins;
    let n_threads = (tile * tile) as usize;
    let radius = config.filter_radius();
    let bin_w = config.bin_width as f32;
    let bin_h = config.bin_height as f32;
    let tile_w = bin_w * tile as f32;
    let tile_h = bin_h * tile as f32;
    let mut states: Vec<BinState> = (0..n_threads).map(|_| BinState::default()).collect();
    let mut face_offsets = vec![0u32; n_threads];
    let mut edge_offsets = vec![0u32; n_threads];

    for shape_ix in 0..config.n_shapes {
        let shape = shapes[shape_ix as usize];
        let shape_bbox = Box2::new(
            Vec2::new(shape.bbox[0], shape.bbox[1]),
            Vec2::new(shape.bbox[2], shape.bbox[3]),
        );
        let shape_edges =
            &scene_edges[shape.edge_ix as usize..(shape.edge_ix + shape.edge_count) as usize];
        let full_cover = shape.flags & FACE_FULL_AREA != 0;
        for tile_y in 0..config.height_in_tiles {
            for tile_x in 0..config.width_in_tiles {
                let tile_origin = Vec2::new(tile_x as f32 * tile_w, tile_y as f32 * tile_h);
                let tile_box = Box2::new(
                    tile_origin,
                    tile_origin + Vec2::new(tile_w, tile_h),
                )
                .expanded(radius);
                if !full_cover && !tile_box.intersects(&shape_bbox) {
                    continue;
                }
                for (local, state) in states.iter_mut().enumerate() {
                    state.reset();
                    let bin_x = tile_x * tile + local as u32 % tile;
                    let bin_y = tile_y * tile + local as u32 / tile;
                    if bin_x >= config.width_in_bins || bin_y >= config.height_in_bins {
                        continue;
                    }
                    let bin_origin = Vec2::new(bin_x as f32 * bin_w, bin_y as f32 * bin_h);
                    let clip = Box2::new(bin_origin, bin_origin + Vec2::new(bin_w, bin_h))
                        .expanded(radius);
                    if full_cover {
                        // Whole-raster cover: skip clipping, synthesize the
                        // counts of one positive wrap.
                        state.emit = true;
                        state.full = true;
                        state.counts = [-1, 1, 1, -1];
                        continue;
                    }
                    if !clip.intersects(&shape_bbox) {
                        continue;
                    }
                    let mut area = 0.0;
                    for segment in shape_edges {
                        let clipped = clamp_edge(segment, &clip);
                        for piece in &clipped.pieces {
                            area += piece_area(piece);
                        }
                        state.edges.extend_from_slice(&clipped.pieces);
                        for (total, count) in state.counts.iter_mut().zip(&clipped.counts) {
                            *total += count;
                        }
                    }
                    area += counter_area(&state.counts, &clip);
                    if state.edges.is_empty() {
                        // No stored geometry: the winding is uniform across
                        // the bin and equals the max-x counter (the only
                        // side lying to the right of every sample).
                        let winding = state.counts[SIDE_MAX_X];
                        debug_assert!(
                            (area - winding as f32 * clip.area()).abs()
                                <= 1e-2 * clip.area().max(1.0),
                            "counter area {area} inconsistent with uniform winding {winding}"
                        );
                        let covered = if shape.flags & FACE_EVEN_ODD != 0 {
                            winding & 1 != 0
                        } else {
                            winding != 0
                        };
                        if covered {
                            state.emit = true;
                            state.full = true;
                        }
                        // Uncovered with nothing stored: discarded, no
                        // record emitted.
                    } else {
                        state.emit = true;
                    }
                }

                // Exclusive scan over (face, edge) needs; one global bump
                // add per group per counter.
                let mut face_total = 0u32;
                let mut edge_total = 0u32;
                for (local, state) in states.iter().enumerate() {
                    face_offsets[local] = face_total;
                    edge_offsets[local] = edge_total;
                    if state.emit {
                        face_total += 1;
                        edge_total += state.edges.len() as u32;
                    }
                }
                if face_total == 0 {
                    continue;
                }
                let face_base = bump.faces;
                let edge_base = bump.edges;
                bump.faces += face_total;
                bump.edges += edge_total;
                if face_base + face_total > config.faces_size
                    || edge_base + edge_total > config.edges_size
                {
                    // Out of provisioned space: drop this group's output and
                    // let the counters keep growing so the host can report
                    // the size that would have been needed.
                    bump.failed = 1;
                    continue;
                }

                for (local, state) in states.iter().enumerate() {
                    if !state.emit {
                        continue;
                    }
                    let bin_x = tile_x * tile + local as u32 % tile;
                    let bin_y = tile_y * tile + local as u32 / tile;
                    let bin_ix = (bin_y * config.width_in_bins + bin_x) as usize;
                    let face_ix = face_base + face_offsets[local];
                    let edge_ix = edge_base + edge_offsets[local];
                    bin_edges[edge_ix as usize..edge_ix as usize + state.edges.len()]
                        .copy_from_slice(&state.edges);
                    // Atomic exchange on the bin head: the new face fronts
                    // the list.
                    let prev = bin_heads[bin_ix];
                    bin_heads[bin_ix] = face_ix;
                    let mut flags = shape.flags & !FACE_FULL_AREA;
                    if state.full {
                        flags |= FACE_FULL_AREA;
                    }
                    faces[face_ix as usize] = FaceRecord {
                        program: shape.program,
                        flags,
                        blend: shape.blend,
                        edge_ix,
                        edge_count: state.edges.len() as u32,
                        clip_counts: state.counts,
                        next: prev,
                    };
                }
            }
        }
    }
}

pub fn coarse(_n_wg: u32, resources: &[CpuBinding<'_>]) {
    let config = resources[0].as_typed();
    let shapes = resources[1].as_slice();
    let scene_edges = resources[2].as_slice();
    let mut bin_heads = resources[3].as_slice_mut();
    let mut faces = resources[4].as_slice_mut();
    let mut bin_edges = resources[5].as_slice_mut();
    let mut bump = resources[6].as_typed_mut();
    coarse_main(
        &config,
        &shapes,
        &scene_edges,
        &mut bin_heads,
        &mut faces,
        &mut bin_edges,
        &mut bump,
    );
}
