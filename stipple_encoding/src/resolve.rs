// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resolves a [`Scene`] into the flat buffers both kernels consume.

use std::collections::HashMap;

use peniko::{Compose, Fill};

use crate::color::pack_blend;
use crate::config::{ColorSpaceTag, FilterKind, RasterOptions, RenderConfig};
use crate::edge::{area, Edge};
use crate::estimate::BumpEstimate;
use crate::instruction::{compile, encode};
use crate::math::Box2;
use crate::program::NodeId;
use crate::record::{
    EdgeSegment, ShapeInfo, FACE_CONSTANT_COLOR, FACE_EVEN_ODD, FACE_FULL_AREA,
    FACE_NEEDS_CENTROID, FACE_NEEDS_FACE,
};
use crate::scene::Scene;

/// Resolved scene: the read-only device inputs for one dispatch batch.
pub struct Resolved {
    pub config: RenderConfig,
    /// All compiled programs, concatenated; shapes reference word offsets.
    pub programs: Vec<u32>,
    pub shapes: Vec<ShapeInfo>,
    pub scene_edges: Vec<EdgeSegment>,
}

/// Bounding box of a shape's real (non-fake-corner) edges.
fn shape_bbox(edges: &[Edge]) -> Box2 {
    let mut bbox = Box2::empty();
    for edge in edges.iter().filter(|e| !e.fake_corner) {
        bbox.union_point(edge.p0);
        bbox.union_point(edge.p1);
    }
    if bbox.is_empty() {
        for edge in edges {
            bbox.union_point(edge.p0);
            bbox.union_point(edge.p1);
        }
    }
    bbox
}

fn axis_aligned(edge: &Edge) -> bool {
    edge.p0.x == edge.p1.x || edge.p0.y == edge.p1.y
}

/// Whether a shape is an axis-aligned rectangle covering the whole raster
/// (including the filter margin), letting the coarse pass skip clipping for
/// every bin of every tile it touches.
fn is_full_cover(edges: &[Edge], bbox: &Box2, width: u32, height: u32, radius: f32) -> bool {
    if !edges.iter().all(axis_aligned) {
        return false;
    }
    let signed = area(edges);
    if signed <= 0.0 || (signed - bbox.area()).abs() > 1e-3 {
        return false;
    }
    bbox.min.x <= -radius
        && bbox.min.y <= -radius
        && bbox.max.x >= width as f32 + radius
        && bbox.max.y >= height as f32 + radius
}

/// Flattens the scene into device buffers and a sized [`RenderConfig`].
///
/// Programs are simplified first, then deduplicated by interned id, so equal
/// programs compile once and share one word range. Shapes that cannot
/// contribute (no edges, or fully transparent under a plain `SrcOver`) are
/// dropped here rather than binned and evaluated per pixel.
#[expect(clippy::too_many_arguments, reason = "one argument per render parameter")]
pub fn resolve(
    scene: &mut Scene,
    width: u32,
    height: u32,
    options: &RasterOptions,
    filter: FilterKind,
    filter_scale: f32,
    color_space: ColorSpaceTag,
    base_color: peniko::Color,
) -> Resolved {
    let radius = filter.radius() * filter_scale;
    let grid = crate::config::GridInfo::new(width, height, options);

    // Simplification interns new nodes; collect ids before borrowing the
    // arena immutably for compilation.
    let roots: Vec<NodeId> = scene.shapes().iter().map(|s| s.program).collect();
    let simplified: Vec<NodeId> = roots
        .into_iter()
        .map(|id| scene.programs_mut().simplified(id))
        .collect();

    let arena = scene.programs();
    let mut programs = Vec::new();
    let mut program_offsets: HashMap<NodeId, u32> = HashMap::new();
    let mut shapes = Vec::new();
    let mut scene_edges = Vec::new();
    let mut estimate = BumpEstimate::default();

    for (shape, &program_id) in scene.shapes().iter().zip(&simplified) {
        if shape.edges.is_empty() {
            continue;
        }
        let transparent = arena.is_transparent(program_id);
        if transparent && shape.blend.compose == Compose::SrcOver {
            continue;
        }
        let program = *program_offsets.entry(program_id).or_insert_with(|| {
            let words = encode(&compile(arena, program_id));
            let offset = programs.len() as u32;
            programs.extend(words);
            offset
        });

        let mut flags = 0;
        if shape.fill == Fill::EvenOdd {
            flags |= FACE_EVEN_ODD;
        }
        if arena.needs_centroid(program_id) {
            flags |= FACE_NEEDS_CENTROID;
        }
        if arena.needs_face(program_id) {
            flags |= FACE_NEEDS_FACE;
        }
        if arena.constant_color(program_id).is_some() {
            flags |= FACE_CONSTANT_COLOR;
        }
        let bbox = shape_bbox(&shape.edges);
        let full_cover = is_full_cover(&shape.edges, &bbox, width, height, radius);
        if full_cover {
            flags |= FACE_FULL_AREA;
        }
        let expanded = bbox.expanded(radius);
        estimate.add_shape(&grid, &shape.edges, &expanded, full_cover, radius);

        let edge_ix = scene_edges.len() as u32;
        scene_edges.extend(shape.edges.iter().map(EdgeSegment::from_edge));
        shapes.push(ShapeInfo {
            program,
            blend: pack_blend(shape.blend),
            flags,
            edge_ix,
            edge_count: shape.edges.len() as u32,
            bbox: [expanded.min.x, expanded.min.y, expanded.max.x, expanded.max.y],
        });
    }

    let config = RenderConfig::new(
        width,
        height,
        options,
        filter,
        filter_scale,
        color_space,
        base_color,
        shapes.len() as u32,
        scene_edges.len() as u32,
        programs.len() as u32,
        &estimate,
    );
    log::debug!(
        "resolved scene: {} shapes, {} edges, {} program words; provisioning {} faces, {} bin edges",
        shapes.len(),
        scene_edges.len(),
        programs.len(),
        config.buffer_sizes.faces.len(),
        config.buffer_sizes.bin_edges.len(),
    );
    Resolved {
        config,
        programs,
        shapes,
        scene_edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2;
    use peniko::kurbo::Point;
    use peniko::{BlendMode, Color, Fill};

    fn rect_points(x0: f64, y0: f64, x1: f64, y1: f64) -> [Point; 4] {
        [
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }

    fn resolve_default(scene: &mut Scene) -> Resolved {
        resolve(
            scene,
            64,
            64,
            &RasterOptions::default(),
            FilterKind::Box,
            1.0,
            ColorSpaceTag::Srgb,
            Color::TRANSPARENT,
        )
    }

    #[test]
    fn equal_programs_compile_once() {
        let mut scene = Scene::new();
        let red_a = scene.programs_mut().solid(Color::rgb8(255, 0, 0));
        let red_b = scene.programs_mut().solid(Color::rgb8(255, 0, 0));
        scene.fill_polygon(
            Fill::NonZero,
            BlendMode::default(),
            red_a,
            &rect_points(0.0, 0.0, 8.0, 8.0),
        );
        scene.fill_polygon(
            Fill::NonZero,
            BlendMode::default(),
            red_b,
            &rect_points(8.0, 8.0, 16.0, 16.0),
        );
        let resolved = resolve_default(&mut scene);
        assert_eq!(resolved.shapes.len(), 2);
        assert_eq!(resolved.shapes[0].program, resolved.shapes[1].program);
        // One solid program: push + return.
        assert_eq!(resolved.programs.len(), 6);
        assert!(resolved.shapes[0].flags & FACE_CONSTANT_COLOR != 0);
    }

    #[test]
    fn transparent_shapes_dropped() {
        let mut scene = Scene::new();
        let clear = scene.programs_mut().solid(Color::TRANSPARENT);
        scene.fill_polygon(
            Fill::NonZero,
            BlendMode::default(),
            clear,
            &rect_points(0.0, 0.0, 8.0, 8.0),
        );
        let resolved = resolve_default(&mut scene);
        assert!(resolved.shapes.is_empty());
    }

    #[test]
    fn full_cover_detection() {
        let edges = crate::edge::polygon_edges(&[
            Vec2::new(-1.0, -1.0),
            Vec2::new(65.0, -1.0),
            Vec2::new(65.0, 65.0),
            Vec2::new(-1.0, 65.0),
        ]);
        let bbox = shape_bbox(&edges);
        assert!(is_full_cover(&edges, &bbox, 64, 64, 0.5));
        // Clockwise winding (negative area) does not qualify.
        let cw: Vec<Edge> = edges.iter().map(Edge::reversed).collect();
        assert!(!is_full_cover(&cw, &bbox, 64, 64, 0.5));
        // A rect short of the filter margin does not qualify either.
        let tight = crate::edge::polygon_edges(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(64.0, 0.0),
            Vec2::new(64.0, 64.0),
            Vec2::new(0.0, 64.0),
        ]);
        let tight_bbox = shape_bbox(&tight);
        assert!(!is_full_cover(&tight, &tight_bbox, 64, 64, 0.5));
        assert!(is_full_cover(&tight, &tight_bbox, 64, 64, 0.0));
    }

    #[test]
    fn even_odd_flag_carried() {
        let mut scene = Scene::new();
        let red = scene.programs_mut().solid(Color::rgb8(255, 0, 0));
        scene.fill_polygon(
            Fill::EvenOdd,
            BlendMode::default(),
            red,
            &rect_points(0.0, 0.0, 8.0, 8.0),
        );
        let resolved = resolve_default(&mut scene);
        assert!(resolved.shapes[0].flags & FACE_EVEN_ODD != 0);
    }
}
