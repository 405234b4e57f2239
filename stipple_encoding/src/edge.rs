// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Directed-edge geometry: exact area, centroid and winding primitives.
//!
//! Every later stage of the pipeline leans on the math in this module; the
//! coarse pass clips these edges into bins and the fine pass integrates them
//! into per-pixel coverage.

use smallvec::SmallVec;

use crate::math::{Vec2, COORD_EPSILON, LENGTH_SQUARED_EPSILON};

/// A directed polygon edge.
///
/// Closed regions are edge lists in which, up to a tolerance, every distinct
/// point has as many incoming as outgoing edges. Construction rejects
/// non-finite and degenerate endpoints; everything downstream relies on it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    pub p0: Vec2,
    pub p1: Vec2,
    /// Edge introduced by clipping that runs along a clip boundary. Excluded
    /// from bounds computations.
    pub fake_corner: bool,
}

impl Edge {
    pub fn new(p0: Vec2, p1: Vec2) -> Self {
        assert!(p0.is_finite() && p1.is_finite(), "non-finite edge endpoint");
        assert!(p0 != p1, "degenerate edge");
        Self {
            p0,
            p1,
            fake_corner: false,
        }
    }

    /// A corner edge fabricated by clipping.
    pub fn fake(p0: Vec2, p1: Vec2) -> Self {
        let mut edge = Self::new(p0, p1);
        edge.fake_corner = true;
        edge
    }

    pub fn delta(&self) -> Vec2 {
        self.p1 - self.p0
    }

    pub fn reversed(&self) -> Self {
        Self {
            p0: self.p1,
            p1: self.p0,
            fake_corner: self.fake_corner,
        }
    }

    /// Shoelace term of this edge: `0.5 * (x1 + x0) * (y1 - y0)`.
    ///
    /// The cancelled algebraic form, not the raw cross product; the partial
    /// cancellation keeps the sum stable when coordinates are large relative
    /// to the polygon.
    pub fn area_term(&self) -> f32 {
        0.5 * (self.p1.x + self.p0.x) * (self.p1.y - self.p0.y)
    }

    /// Line integral of the zero field along this edge.
    ///
    /// Sums to approximately zero over any closed edge list; used as a cheap
    /// closure check after clipping and editing passes.
    pub fn zero_integral(&self) -> f32 {
        (self.p1.x - self.p0.x) + (self.p1.y - self.p0.y)
    }
}

/// Signed area of a closed, consistently wound edge list.
pub fn area(edges: &[Edge]) -> f32 {
    edges.iter().map(Edge::area_term).sum()
}

/// Centroid of a closed edge list.
///
/// Accumulates the six-way polynomial per edge and normalizes by `6 * area`.
/// Undefined when the area is near zero; callers must guard (check
/// full-area/discard classification first), there is no runtime check here.
pub fn centroid(edges: &[Edge]) -> Vec2 {
    let mut cx = 0.0;
    let mut cy = 0.0;
    for e in edges {
        let cross = e.p0.x * e.p1.y - e.p1.x * e.p0.y;
        cx += (e.p0.x + e.p1.x) * cross;
        cy += (e.p0.y + e.p1.y) * cross;
    }
    let scale = 1.0 / (6.0 * area(edges));
    Vec2::new(cx * scale, cy * scale)
}

fn is_left(p0: Vec2, p1: Vec2, p: Vec2) -> f32 {
    (p1 - p0).cross(p - p0)
}

/// Winding number of `p` with respect to an edge list.
///
/// Crossing test with half-open vertical spans: an upward crossing with the
/// point strictly left of the edge counts +1, a downward crossing with the
/// point strictly right counts -1. Nonzero and even-odd fill rules are both
/// derived from the result.
pub fn winding_number(edges: &[Edge], p: Vec2) -> i32 {
    let mut wn = 0;
    for e in edges {
        if e.p0.y <= p.y {
            if e.p1.y > p.y && is_left(e.p0, e.p1, p) > 0.0 {
                wn += 1;
            }
        } else if e.p1.y <= p.y && is_left(e.p0, e.p1, p) < 0.0 {
            wn -= 1;
        }
    }
    wn
}

/// Distance from the origin to the segment `p0..p1`.
///
/// Projects the origin onto the carrying line; when the projection falls
/// inside the segment the perpendicular distance is returned, otherwise the
/// nearer endpoint distance.
pub fn closest_distance_to_origin(p0: Vec2, p1: Vec2) -> f32 {
    let d = p1 - p0;
    let len2 = d.length_squared();
    if len2 < LENGTH_SQUARED_EPSILON {
        return p0.length();
    }
    let t = -p0.dot(d) / len2;
    if t <= 0.0 {
        p0.length()
    } else if t >= 1.0 {
        p1.length()
    } else {
        (p0 + d * t).length()
    }
}

fn nearly_same_point(a: Vec2, b: Vec2) -> bool {
    (a.x - b.x).abs() <= COORD_EPSILON && (a.y - b.y).abs() <= COORD_EPSILON
}

/// Whether every distinct endpoint has matching in- and out-degree.
///
/// O(n^2); a reference/debug check, not part of the hot path.
pub fn degrees_balanced(edges: &[Edge]) -> bool {
    for e in edges {
        for p in [e.p0, e.p1] {
            let outs = edges.iter().filter(|o| nearly_same_point(o.p0, p)).count();
            let ins = edges.iter().filter(|o| nearly_same_point(o.p1, p)).count();
            if outs != ins {
                return false;
            }
        }
    }
    true
}

/// Removes exactly-reversed duplicate edge pairs.
///
/// O(n^2) reference/debug pass for merging polygon soup.
pub fn with_opposites_removed(edges: &[Edge]) -> Vec<Edge> {
    let mut removed = vec![false; edges.len()];
    for i in 0..edges.len() {
        if removed[i] {
            continue;
        }
        for j in (i + 1)..edges.len() {
            if removed[j] {
                continue;
            }
            if nearly_same_point(edges[i].p0, edges[j].p1)
                && nearly_same_point(edges[i].p1, edges[j].p0)
            {
                removed[i] = true;
                removed[j] = true;
                break;
            }
        }
    }
    edges
        .iter()
        .zip(&removed)
        .filter(|(_, r)| !**r)
        .map(|(e, _)| *e)
        .collect()
}

/// Collinearity tolerance for overlap cancellation, scaled by edge length.
const COLLINEAR_EPSILON: f32 = 1e-4;

struct Overlap {
    /// Remnants replacing the first edge.
    first: SmallVec<[Edge; 2]>,
    /// Remnants replacing the second edge.
    second: SmallVec<[Edge; 2]>,
}

fn cancel_overlap(a: Edge, b: Edge) -> Option<Overlap> {
    let da = a.delta();
    let db = b.delta();
    let la = da.length();
    // Opposite directions only; same-direction overlaps both contribute
    // area and cannot cancel.
    if da.dot(db) >= 0.0 {
        return None;
    }
    if da.cross(db).abs() > COLLINEAR_EPSILON * la * db.length() {
        return None;
    }
    if da.cross(b.p0 - a.p0).abs() > COLLINEAR_EPSILON * la * la {
        return None;
    }
    // 1-D interval overlap along a's direction.
    let u = da * (1.0 / la);
    let tb0 = (b.p0 - a.p0).dot(u);
    let tb1 = (b.p1 - a.p0).dot(u);
    debug_assert!(tb1 < tb0);
    let lo = tb1.max(0.0);
    let hi = tb0.min(la);
    if hi - lo <= COORD_EPSILON {
        return None;
    }
    let at = |t: f32| a.p0 + u * t;
    let mut first = SmallVec::new();
    let mut second = SmallVec::new();
    let mut push = |out: &mut SmallVec<[Edge; 2]>, p0: Vec2, p1: Vec2, fake: bool| {
        if !nearly_same_point(p0, p1) {
            let mut e = Edge::new(p0, p1);
            e.fake_corner = fake;
            out.push(e);
        }
    };
    // a keeps its portions outside [lo, hi].
    push(&mut first, a.p0, at(lo), a.fake_corner);
    push(&mut first, at(hi), a.p1, a.fake_corner);
    // b runs against u, from tb0 down to tb1; it keeps [hi, tb0] and [tb1, lo].
    push(&mut second, b.p0, at(hi), b.fake_corner);
    push(&mut second, at(lo), b.p1, b.fake_corner);
    Some(Overlap { first, second })
}

/// Splits and cancels collinear, opposite-direction overlapping portions.
///
/// Total signed area is preserved to within 1e-6 of the input. O(n^2)
/// reference/debug pass.
pub fn with_overlapping_removed(edges: &[Edge]) -> Vec<Edge> {
    let mut edges = edges.to_vec();
    let mut i = 0;
    while i < edges.len() {
        let mut changed = false;
        let mut j = i + 1;
        while j < edges.len() {
            if let Some(overlap) = cancel_overlap(edges[i], edges[j]) {
                edges.remove(j);
                edges.remove(i);
                edges.extend(overlap.first);
                edges.extend(overlap.second);
                changed = true;
                break;
            }
            j += 1;
        }
        if !changed {
            i += 1;
        }
    }
    edges
}

/// Builds the closed edge list of a polygon given its vertices in order.
///
/// Consecutive duplicate vertices are skipped.
pub fn polygon_edges(points: &[Vec2]) -> Vec<Edge> {
    let mut edges = Vec::with_capacity(points.len());
    for (i, &p0) in points.iter().enumerate() {
        let p1 = points[(i + 1) % points.len()];
        if p0 != p1 {
            edges.push(Edge::new(p0, p1));
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Edge> {
        polygon_edges(&[
            Vec2::new(x0, y0),
            Vec2::new(x1, y0),
            Vec2::new(x1, y1),
            Vec2::new(x0, y1),
        ])
    }

    #[test]
    fn area_of_ccw_square() {
        let edges = square(0.0, 0.0, 4.0, 4.0);
        assert!((area(&edges) - 16.0).abs() < 1e-6);
        assert!((area(&edges.iter().map(Edge::reversed).collect::<Vec<_>>()) + 16.0).abs() < 1e-6);
    }

    #[test]
    fn centroid_of_square() {
        let edges = square(1.0, 1.0, 3.0, 5.0);
        let c = centroid(&edges);
        assert!((c.x - 2.0).abs() < 1e-5);
        assert!((c.y - 3.0).abs() < 1e-5);
    }

    #[test]
    fn winding_inside_and_outside() {
        let edges = square(0.0, 0.0, 4.0, 4.0);
        assert_eq!(winding_number(&edges, Vec2::new(2.0, 2.0)), 1);
        assert_eq!(winding_number(&edges, Vec2::new(5.0, 5.0)), 0);
        let reversed: Vec<_> = edges.iter().map(Edge::reversed).collect();
        assert_eq!(winding_number(&reversed, Vec2::new(2.0, 2.0)), -1);
    }

    #[test]
    fn winding_of_double_wrap() {
        let mut edges = square(0.0, 0.0, 4.0, 4.0);
        edges.extend(square(1.0, 1.0, 3.0, 3.0));
        assert_eq!(winding_number(&edges, Vec2::new(2.0, 2.0)), 2);
        assert_eq!(winding_number(&edges, Vec2::new(0.5, 0.5)), 1);
    }

    #[test]
    fn closure_integral_of_closed_list() {
        let edges = square(0.0, 0.0, 7.0, 3.0);
        let total: f32 = edges.iter().map(Edge::zero_integral).sum();
        assert!(total.abs() < 1e-5);
        assert!(degrees_balanced(&edges));
    }

    #[test]
    fn open_list_is_unbalanced() {
        let mut edges = square(0.0, 0.0, 4.0, 4.0);
        edges.pop();
        assert!(!degrees_balanced(&edges));
    }

    #[test]
    fn closest_distance_cases() {
        // Perpendicular foot inside the segment.
        let d = closest_distance_to_origin(Vec2::new(-1.0, 2.0), Vec2::new(3.0, 2.0));
        assert!((d - 2.0).abs() < 1e-6);
        // Foot outside; nearer endpoint wins.
        let d = closest_distance_to_origin(Vec2::new(3.0, 4.0), Vec2::new(6.0, 8.0));
        assert!((d - 5.0).abs() < 1e-6);
        // Near-degenerate segment falls back to the endpoint.
        let p = Vec2::new(1.0, 0.0);
        let d = closest_distance_to_origin(p, Vec2::new(1.0, 1e-8));
        assert!((d - 1.0).abs() < 1e-6);
    }

    #[test]
    fn opposites_cancel() {
        let mut edges = square(0.0, 0.0, 4.0, 4.0);
        let dup = edges[1].reversed();
        edges.push(dup);
        let before = area(&edges);
        let cleaned = with_opposites_removed(&edges);
        // The reversed duplicate and its partner are both gone; the pair
        // contributed no net area, so the total is unchanged.
        assert_eq!(cleaned.len(), 3);
        assert!((area(&cleaned) - before).abs() < 1e-6);
    }

    #[test]
    fn overlap_removal_preserves_area() {
        // Two adjacent rectangles sharing the segment x = 2, y in [0, 4];
        // the shared boundary runs in opposite directions and cancels.
        let mut edges = square(0.0, 0.0, 2.0, 4.0);
        edges.extend(square(2.0, 0.0, 4.0, 4.0));
        let before = area(&edges);
        let cleaned = with_overlapping_removed(&edges);
        assert!((area(&cleaned) - before).abs() < 1e-6);
        // The shared segment is gone entirely.
        assert!(!cleaned
            .iter()
            .any(|e| (e.p0.x - 2.0).abs() < 1e-6 && (e.p1.x - 2.0).abs() < 1e-6));
    }

    #[test]
    fn partial_overlap_splits() {
        // Overlap covers only y in [1, 3] of the first edge.
        let a = Edge::new(Vec2::new(2.0, 0.0), Vec2::new(2.0, 4.0));
        let b = Edge::new(Vec2::new(2.0, 3.0), Vec2::new(2.0, 1.0));
        let cleaned = with_overlapping_removed(&[a, b]);
        let before = a.area_term() + b.area_term();
        let after: f32 = cleaned.iter().map(Edge::area_term).sum();
        assert!((after - before).abs() < 1e-6);
        // Remnants of a: [0, 1] and [3, 4].
        assert_eq!(cleaned.len(), 2);
    }

    #[test]
    #[should_panic(expected = "degenerate edge")]
    fn degenerate_edge_rejected() {
        let p = Vec2::new(1.0, 1.0);
        let _ = Edge::new(p, p);
    }
}
