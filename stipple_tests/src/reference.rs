// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single-threaded, non-tiled reference rasterizer.
//!
//! Uses the same winding and color math as the pipeline but none of its
//! machinery: no binning, no clipping, no bytecode. Coverage comes from
//! supersampled whole-shape winding tests and shading from direct tree
//! evaluation, so agreement with the pipeline exercises the coarse/fine
//! handoff end to end.

use stipple::{ColorSpaceTag, FilterKind, RenderParams, Scene};
use stipple_encoding::color::{
    blend_mix_compose, color_from_peniko, linear_to_srgb, pack4x8unorm, premultiply, unpremultiply,
};
use stipple_encoding::math::{Box2, Vec2};
use stipple_encoding::{winding_number, EvalContext};

/// Sub-samples per pixel axis.
const SUBSAMPLES: u32 = 16;

fn tent(x: f32) -> f32 {
    (1.0 - x.abs()).max(0.0)
}

fn mitchell(x: f32) -> f32 {
    const B: f32 = 1.0 / 3.0;
    const C: f32 = 1.0 / 3.0;
    let x = x.abs();
    if x < 1.0 {
        ((12.0 - 9.0 * B - 6.0 * C) * x.powi(3)
            + (-18.0 + 12.0 * B + 6.0 * C) * x.powi(2)
            + (6.0 - 2.0 * B))
            / 6.0
    } else if x < 2.0 {
        ((-B - 6.0 * C) * x.powi(3)
            + (6.0 * B + 30.0 * C) * x.powi(2)
            + (-12.0 * B - 48.0 * C) * x
            + (8.0 * B + 24.0 * C))
            / 6.0
    } else {
        0.0
    }
}

fn weight(filter: FilterKind, scale: f32, dx: f32, dy: f32) -> f32 {
    let scale = scale.max(1e-3);
    let x = dx / scale;
    let y = dy / scale;
    match filter {
        FilterKind::Box => {
            if x.abs() <= 0.5 && y.abs() <= 0.5 {
                1.0
            } else {
                0.0
            }
        }
        FilterKind::Bilinear => tent(x) * tent(y),
        FilterKind::Mitchell => mitchell(x) * mitchell(y),
    }
}

fn covers(winding: i32, fill: peniko::Fill) -> bool {
    match fill {
        peniko::Fill::NonZero => winding != 0,
        peniko::Fill::EvenOdd => winding & 1 != 0,
    }
}

/// Renders a scene pixel by pixel, returning packed premultiplied RGBA8.
pub fn render_reference(scene: &Scene, params: &RenderParams) -> Vec<u32> {
    let width = params.width as usize;
    let height = params.height as usize;
    let radius = params.filter.radius() * params.filter_scale;
    let arena = scene.programs();
    let base = premultiply(color_from_peniko(params.base_color));
    let mut pixels = vec![0u32; width * height];
    let step = 1.0 / SUBSAMPLES as f32;
    let n = ((2.0 * radius) * SUBSAMPLES as f32).ceil().max(1.0) as u32;
    let bboxes: Vec<Box2> = scene
        .shapes()
        .iter()
        .map(|shape| {
            let mut bbox = Box2::empty();
            for edge in &shape.edges {
                bbox.union_point(edge.p0);
                bbox.union_point(edge.p1);
            }
            bbox
        })
        .collect();

    for py in 0..height {
        for px in 0..width {
            let center = Vec2::new(px as f32 + 0.5, py as f32 + 0.5);
            let mut acc = base;
            for (shape, bbox) in scene.shapes().iter().zip(&bboxes) {
                // Quick reject: the filter support sees none of the shape.
                let support = Box2::new(center, center).expanded(radius.max(0.5));
                if !support.intersects(bbox) && shape.blend.compose == peniko::Compose::SrcOver {
                    continue;
                }
                // Filtered coverage from whole-shape winding tests.
                let mut covered_weight = 0.0;
                let mut weight_sum = 0.0;
                let mut covered_pos = Vec2::ZERO;
                let mut covered_count = 0;
                for ky in 0..n {
                    let oy = (ky as f32 + 0.5) * step - radius;
                    for kx in 0..n {
                        let ox = (kx as f32 + 0.5) * step - radius;
                        let w = weight(params.filter, params.filter_scale, ox, oy);
                        if w == 0.0 {
                            continue;
                        }
                        weight_sum += w;
                        let q = center + Vec2::new(ox, oy);
                        if covers(winding_number(&shape.edges, q), shape.fill) {
                            covered_weight += w;
                            covered_pos = covered_pos + q;
                            covered_count += 1;
                        }
                    }
                }
                let coverage = if weight_sum > 0.0 {
                    (covered_weight / weight_sum).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                if coverage <= 0.0 && shape.blend.compose == peniko::Compose::SrcOver {
                    continue;
                }
                let mut ctx = EvalContext::at(center);
                ctx.winding = winding_number(&shape.edges, center);
                if coverage < 0.999 && covered_count > 0 {
                    ctx.centroid = covered_pos / covered_count as f32;
                }
                let color = arena.eval(shape.program, &ctx);
                let src = [color[0], color[1], color[2], color[3] * coverage];
                acc = blend_mix_compose(acc, src, shape.blend);
            }
            if params.color_space == ColorSpaceTag::LinearSrgb {
                let un = unpremultiply(acc);
                acc = [
                    linear_to_srgb(un[0]) * acc[3],
                    linear_to_srgb(un[1]) * acc[3],
                    linear_to_srgb(un[2]) * acc[3],
                    acc[3],
                ];
            }
            pixels[py * width + px] = pack4x8unorm(acc);
        }
    }
    pixels
}
