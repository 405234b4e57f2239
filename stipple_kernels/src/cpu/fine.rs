// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fine evaluation kernel.
//!
//! One thread-group per bin, one sample per pixel. The kernel walks the
//! bin's face list, resolves per-pixel coverage for each face, runs the
//! face's program (unless it is a known constant), and composites
//! back-to-front into the output image.
//!
//! Coverage comes from two paths. Under the box filter it is the exact
//! per-pixel area: every stored edge contributes a clamped trapezoid
//! integral per pixel row, on top of the winding backdrop carried by the
//! max-x clip counter. Wider filters re-derive coverage from a grid of
//! sub-samples convolved with the reconstruction kernel; the coarse pass
//! expanded each bin's clip bounds by the filter radius, so every sample the
//! kernel touches is covered by stored geometry.

use peniko::Compose;

use stipple_encoding::color::{
    blend_mix_compose, linear_to_srgb, pack4x8unorm, unpack4x8unorm, unpack_blend, unpremultiply,
    Color4,
};
use stipple_encoding::math::Vec2;
use stipple_encoding::{
    ConfigUniform, EdgeSegment, EvalContext, FaceRecord, FACE_NONE, OP_PUSH_COLOR,
};

use super::clip::SIDE_MAX_X;
use super::interp::eval_program;
use super::{filter, CpuBinding, CpuTexture};

/// Sub-samples per pixel axis for the wide-filter coverage path.
const SUBSAMPLES: u32 = 4;

/// Coverage above which a pixel counts as fully covered for centroid
/// purposes.
const FULL_COVERAGE: f32 = 0.999;

/// Mean of `clamp(x, 0, 1)` for `x` uniform over `[lo, hi]`.
fn clamped_mean(lo: f32, hi: f32) -> f32 {
    if hi - lo < 1e-6 {
        return (0.5 * (lo + hi)).clamp(0.0, 1.0);
    }
    let c0 = lo.clamp(0.0, 1.0);
    let c1 = hi.clamp(0.0, 1.0);
    let integral = 0.5 * (c1 * c1 - c0 * c0) + (hi.max(1.0) - 1.0) - (lo.max(1.0) - 1.0);
    integral / (hi - lo)
}

fn fill_rule_covers(winding: i32, even_odd: bool) -> bool {
    if even_odd {
        winding & 1 != 0
    } else {
        winding != 0
    }
}

/// Integer winding at `q`: the backdrop counter plus crossings of stored
/// edges lying to the right of the point, half-open in y.
fn winding_at(face: &FaceRecord, edges: &[EdgeSegment], q: Vec2) -> i32 {
    let mut winding = face.clip_counts[SIDE_MAX_X];
    for edge in edges {
        let p0 = edge.point0();
        let p1 = edge.point1();
        if p0.y == p1.y {
            continue;
        }
        let up = p1.y > p0.y;
        let crosses = if up {
            p0.y <= q.y && q.y < p1.y
        } else {
            p1.y <= q.y && q.y < p0.y
        };
        if !crosses {
            continue;
        }
        let x_cross = p0.x + (q.y - p0.y) * (p1.x - p0.x) / (p1.y - p0.y);
        if x_cross > q.x {
            winding += if up { 1 } else { -1 };
        }
    }
    winding
}

/// Exact per-pixel area coverage for the box filter.
fn coverage_area(
    face: &FaceRecord,
    edges: &[EdgeSegment],
    origin: Vec2,
    bin_w: usize,
    bin_h: usize,
    coverage: &mut [f32],
) {
    let backdrop = face.clip_counts[SIDE_MAX_X] as f32;
    for c in coverage.iter_mut() {
        *c = backdrop;
    }
    for edge in edges {
        let p0 = edge.point0();
        let p1 = edge.point1();
        if p0.y == p1.y {
            continue;
        }
        let y_min = p0.y.min(p1.y);
        let y_max = p0.y.max(p1.y);
        let sign = if p1.y > p0.y { 1.0 } else { -1.0 };
        let dxdy = (p1.x - p0.x) / (p1.y - p0.y);
        for yi in 0..bin_h {
            let row = origin.y + yi as f32;
            let y_lo = y_min.max(row);
            let y_hi = y_max.min(row + 1.0);
            if y_hi <= y_lo {
                continue;
            }
            let xa = p0.x + (y_lo - p0.y) * dxdy;
            let xb = p0.x + (y_hi - p0.y) * dxdy;
            let x_lo = xa.min(xb);
            let x_hi = xa.max(xb);
            let dy = (y_hi - y_lo) * sign;
            for xi in 0..bin_w {
                let px = origin.x + xi as f32;
                coverage[yi * bin_w + xi] += dy * clamped_mean(x_lo - px, x_hi - px);
            }
        }
    }
    if face.is_even_odd() {
        for c in coverage.iter_mut() {
            *c = (*c - 2.0 * (0.5 * *c).round()).abs();
        }
    } else {
        for c in coverage.iter_mut() {
            *c = c.abs().min(1.0);
        }
    }
}

/// Sub-sampled, kernel-weighted coverage for the wide filters.
#[expect(clippy::too_many_arguments, reason = "kernel-style parameter list")]
fn coverage_sampled(
    face: &FaceRecord,
    edges: &[EdgeSegment],
    origin: Vec2,
    bin_w: usize,
    bin_h: usize,
    config: &ConfigUniform,
    radius: f32,
    coverage: &mut [f32],
) {
    let even_odd = face.is_even_odd();
    let n = ((2.0 * radius) * SUBSAMPLES as f32).ceil().max(1.0) as u32;
    let step = 1.0 / SUBSAMPLES as f32;
    for yi in 0..bin_h {
        for xi in 0..bin_w {
            let center = origin + Vec2::new(xi as f32 + 0.5, yi as f32 + 0.5);
            let mut sum = 0.0;
            let mut weight_sum = 0.0;
            for ky in 0..n {
                let oy = (ky as f32 + 0.5) * step - radius;
                for kx in 0..n {
                    let ox = (kx as f32 + 0.5) * step - radius;
                    let weight = filter::weight(config.filter, config.filter_scale, ox, oy);
                    if weight == 0.0 {
                        continue;
                    }
                    weight_sum += weight;
                    let q = center + Vec2::new(ox, oy);
                    if fill_rule_covers(winding_at(face, edges, q), even_odd) {
                        sum += weight;
                    }
                }
            }
            coverage[yi * bin_w + xi] = if weight_sum > 0.0 {
                (sum / weight_sum).clamp(0.0, 1.0)
            } else {
                0.0
            };
        }
    }
}

/// Mean position of covered sub-samples within the pixel; the analytic
/// coverage-derived centroid handed to programs that ask for it.
fn covered_centroid(face: &FaceRecord, edges: &[EdgeSegment], center: Vec2) -> Vec2 {
    let even_odd = face.is_even_odd();
    let step = 1.0 / SUBSAMPLES as f32;
    let mut sum = Vec2::ZERO;
    let mut count = 0;
    for ky in 0..SUBSAMPLES {
        let oy = (ky as f32 + 0.5) * step - 0.5;
        for kx in 0..SUBSAMPLES {
            let ox = (kx as f32 + 0.5) * step - 0.5;
            let q = center + Vec2::new(ox, oy);
            if fill_rule_covers(winding_at(face, edges, q), even_odd) {
                sum = sum + q;
                count += 1;
            }
        }
    }
    if count == 0 {
        center
    } else {
        sum / count as f32
    }
}

fn read_constant(program: &[u32]) -> Color4 {
    debug_assert_eq!(
        program[0] & 0xff,
        OP_PUSH_COLOR,
        "constant-color face must start with a push"
    );
    [
        f32::from_bits(program[1]),
        f32::from_bits(program[2]),
        f32::from_bits(program[3]),
        f32::from_bits(program[4]),
    ]
}

/// sRGB-encodes a premultiplied color for write-out.
fn encode_srgb(c: Color4) -> Color4 {
    let un = unpremultiply(c);
    [
        linear_to_srgb(un[0]) * c[3],
        linear_to_srgb(un[1]) * c[3],
        linear_to_srgb(un[2]) * c[3],
        c[3],
    ]
}

fn fine_main(
    config: &ConfigUniform,
    programs: &[u32],
    faces: &[FaceRecord],
    bin_edges: &[EdgeSegment],
    bin_heads: &[u32],
    output: &mut CpuTexture,
) {
    let bin_w = config.bin_width as usize;
    let bin_h = config.bin_height as usize;
    let samples = bin_w * bin_h;
    let base = unpack4x8unorm(config.base_color);
    let radius = config.filter_radius();
    // The unit box filter has an exact analytic form; anything wider goes
    // through the sub-sampled path.
    let analytic = config.filter == 0 && config.filter_scale == 1.0;
    let mut rgba = vec![[0.0f32; 4]; samples];
    let mut coverage = vec![0.0f32; samples];
    let mut list: Vec<u32> = Vec::new();

    for bin_y in 0..config.height_in_bins {
        for bin_x in 0..config.width_in_bins {
            let bin_ix = (bin_y * config.width_in_bins + bin_x) as usize;
            let origin = Vec2::new(
                (bin_x * config.bin_width) as f32,
                (bin_y * config.bin_height) as f32,
            );
            rgba.fill(base);

            // The head fronts the last-linked face; buffer the list and
            // traverse it in reverse to restore back-to-front paint order.
            list.clear();
            let mut head = bin_heads[bin_ix];
            while head != FACE_NONE {
                let face = &faces[head as usize];
                list.push(head);
                head = face.next;
            }
            for &face_ix in list.iter().rev() {
                let face = &faces[face_ix as usize];
                let edges =
                    &bin_edges[face.edge_ix as usize..(face.edge_ix + face.edge_count) as usize];
                if face.is_full_area() {
                    coverage.fill(1.0);
                } else if analytic {
                    coverage_area(face, edges, origin, bin_w, bin_h, &mut coverage);
                } else {
                    coverage_sampled(
                        face,
                        edges,
                        origin,
                        bin_w,
                        bin_h,
                        config,
                        radius,
                        &mut coverage,
                    );
                }
                let Some(blend) = unpack_blend(face.blend) else {
                    panic!("invalid blend word in face record");
                };
                let constant = face
                    .is_constant_color()
                    .then(|| read_constant(&programs[face.program as usize..]));
                for yi in 0..bin_h {
                    for xi in 0..bin_w {
                        let i = yi * bin_w + xi;
                        let c = coverage[i];
                        // A zero-coverage pixel only matters to composes
                        // that act through the destination.
                        if c <= 0.0 && blend.compose == Compose::SrcOver {
                            continue;
                        }
                        let center = origin + Vec2::new(xi as f32 + 0.5, yi as f32 + 0.5);
                        let color = match constant {
                            Some(color) => color,
                            None => {
                                let mut ctx = EvalContext::at(center);
                                if face.needs_face() {
                                    ctx.winding = winding_at(face, edges, center);
                                }
                                if face.needs_centroid() && c < FULL_COVERAGE {
                                    ctx.centroid = covered_centroid(face, edges, center);
                                }
                                eval_program(&programs[face.program as usize..], 0, &ctx)
                            }
                        };
                        let src = [color[0], color[1], color[2], color[3] * c];
                        rgba[i] = blend_mix_compose(rgba[i], src, blend);
                    }
                }
            }

            // Write the bin, clipped to the raster.
            for yi in 0..bin_h {
                let py = bin_y as usize * bin_h + yi;
                if py >= config.target_height as usize {
                    break;
                }
                for xi in 0..bin_w {
                    let px = bin_x as usize * bin_w + xi;
                    if px >= config.target_width as usize {
                        break;
                    }
                    let mut color = rgba[yi * bin_w + xi];
                    if config.color_space == 1 {
                        color = encode_srgb(color);
                    }
                    output.pixels[py * output.width + px] = pack4x8unorm(color);
                }
            }
        }
    }
}

pub fn fine(_n_wg: u32, resources: &[CpuBinding<'_>]) {
    let config = resources[0].as_typed();
    let programs = resources[1].as_slice();
    let faces = resources[2].as_slice();
    let bin_edges = resources[3].as_slice();
    let bin_heads = resources[4].as_slice();
    let mut output = resources[5].as_tex_mut();
    fine_main(
        &config,
        &programs,
        &faces,
        &bin_edges,
        &bin_heads,
        &mut output,
    );
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use stipple_encoding::color::premultiply;
    use stipple_encoding::{FilterKind, FACE_CONSTANT_COLOR, FACE_EVEN_ODD, FACE_FULL_AREA};

    use super::*;

    fn test_config() -> ConfigUniform {
        ConfigUniform {
            target_width: 16,
            target_height: 16,
            bin_width: 16,
            bin_height: 16,
            tile_in_bins: 1,
            width_in_bins: 1,
            height_in_bins: 1,
            width_in_tiles: 1,
            height_in_tiles: 1,
            filter: FilterKind::Box.to_u32(),
            filter_scale: 1.0,
            color_space: 0,
            base_color: 0,
            n_shapes: 1,
            faces_size: 4,
            edges_size: 16,
        }
    }

    fn run_fine(
        config: &ConfigUniform,
        programs: &[u32],
        faces: &[FaceRecord],
        bin_edges: &[EdgeSegment],
        bin_heads: &[u32],
    ) -> CpuTexture {
        let config_bytes = bytemuck::bytes_of(config).to_vec();
        let program_bytes = bytemuck::cast_slice(programs).to_vec();
        let face_bytes = bytemuck::cast_slice(faces).to_vec();
        let edge_bytes = if bin_edges.is_empty() {
            vec![0u8; std::mem::size_of::<EdgeSegment>()]
        } else {
            bytemuck::cast_slice(bin_edges).to_vec()
        };
        let head_bytes = bytemuck::cast_slice(bin_heads).to_vec();
        let texture = RefCell::new(CpuTexture::new(
            config.target_width as usize,
            config.target_height as usize,
        ));
        fine(
            0,
            &[
                CpuBinding::Buffer(&config_bytes),
                CpuBinding::Buffer(&program_bytes),
                CpuBinding::Buffer(&face_bytes),
                CpuBinding::Buffer(&edge_bytes),
                CpuBinding::Buffer(&head_bytes),
                CpuBinding::Texture(&texture),
            ],
        );
        texture.into_inner()
    }

    fn solid_program(color: Color4) -> Vec<u32> {
        let mut words = vec![OP_PUSH_COLOR];
        words.extend(color.iter().map(|x| x.to_bits()));
        words.push(0); // return
        words
    }

    #[test]
    fn empty_bin_writes_base_color() {
        let config = test_config();
        let programs = solid_program([1.0, 0.0, 0.0, 1.0]);
        let out = run_fine(&config, &programs, &[FaceRecord::default()], &[], &[FACE_NONE]);
        assert!(out.pixels.iter().all(|&p| p == 0));
    }

    #[test]
    fn full_area_constant_fills_bin() {
        let config = test_config();
        let programs = solid_program([1.0, 0.0, 0.0, 1.0]);
        let face = FaceRecord {
            program: 0,
            flags: FACE_FULL_AREA | FACE_CONSTANT_COLOR,
            blend: 3,
            clip_counts: [-1, 1, 1, -1],
            next: FACE_NONE,
            ..Default::default()
        };
        let out = run_fine(&config, &programs, &[face], &[], &[0]);
        let expected = pack4x8unorm(premultiply([1.0, 0.0, 0.0, 1.0]));
        assert!(out.pixels.iter().all(|&p| p == expected));
    }

    #[test]
    fn stored_edge_splits_coverage() {
        // Backdrop 1 plus a downward edge at x = 8 cancels winding left of
        // it: right half covered, left half clear.
        let config = test_config();
        let programs = solid_program([0.0, 0.0, 1.0, 1.0]);
        let edge = EdgeSegment {
            p0: [8.0, 16.0],
            p1: [8.0, 0.0],
            flags: 0,
        };
        let face = FaceRecord {
            program: 0,
            flags: FACE_CONSTANT_COLOR,
            blend: 3,
            edge_ix: 0,
            edge_count: 1,
            clip_counts: [0, 0, 1, 0],
            next: FACE_NONE,
        };
        let out = run_fine(&config, &programs, &[face], &[edge], &[0]);
        let blue = pack4x8unorm(premultiply([0.0, 0.0, 1.0, 1.0]));
        for y in 0..16 {
            for x in 0..16 {
                let p = out.pixels[y * 16 + x];
                if x < 8 {
                    assert_eq!(p, 0, "pixel ({x}, {y}) should be clear");
                } else {
                    assert_eq!(p, blue, "pixel ({x}, {y}) should be blue");
                }
            }
        }
    }

    #[test]
    fn even_odd_backdrop_two_is_clear() {
        let config = test_config();
        let programs = solid_program([1.0, 1.0, 1.0, 1.0]);
        let face = FaceRecord {
            program: 0,
            flags: FACE_CONSTANT_COLOR | FACE_EVEN_ODD,
            blend: 3,
            clip_counts: [0, 0, 2, 0],
            next: FACE_NONE,
            ..Default::default()
        };
        let out = run_fine(&config, &programs, &[face], &[], &[0]);
        assert!(out.pixels.iter().all(|&p| p == 0));
    }

    #[test]
    fn faces_composite_back_to_front() {
        // Face 1 (red) was linked after face 0 (blue): the head is red and
        // red must paint on top.
        let config = test_config();
        let mut programs = solid_program([0.0, 0.0, 1.0, 1.0]);
        let red_offset = programs.len() as u32;
        programs.extend(solid_program([1.0, 0.0, 0.0, 1.0]));
        let blue_face = FaceRecord {
            program: 0,
            flags: FACE_FULL_AREA | FACE_CONSTANT_COLOR,
            blend: 3,
            clip_counts: [-1, 1, 1, -1],
            next: FACE_NONE,
            ..Default::default()
        };
        let red_face = FaceRecord {
            program: red_offset,
            next: 0,
            ..blue_face
        };
        let out = run_fine(&config, &programs, &[blue_face, red_face], &[], &[1]);
        let red = pack4x8unorm(premultiply([1.0, 0.0, 0.0, 1.0]));
        assert!(out.pixels.iter().all(|&p| p == red));
    }

    #[test]
    fn partial_coverage_blends_with_base() {
        // A half-covered column under the box filter: the edge sits at
        // x = 8.5, splitting pixel column 8 in half.
        let config = test_config();
        let programs = solid_program([1.0, 1.0, 1.0, 1.0]);
        let edge = EdgeSegment {
            p0: [8.5, 16.0],
            p1: [8.5, 0.0],
            flags: 0,
        };
        let face = FaceRecord {
            program: 0,
            flags: FACE_CONSTANT_COLOR,
            blend: 3,
            edge_ix: 0,
            edge_count: 1,
            clip_counts: [0, 0, 1, 0],
            next: FACE_NONE,
        };
        let out = run_fine(&config, &programs, &[face], &[edge], &[0]);
        let half = unpack4x8unorm(out.pixels[8]);
        assert!((half[3] - 0.5).abs() < 2.0 / 255.0, "alpha {}", half[3]);
        assert_eq!(out.pixels[7], 0);
        assert_eq!(out.pixels[9], pack4x8unorm([1.0, 1.0, 1.0, 1.0]));
    }
}
