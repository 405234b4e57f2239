// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GPU-visible record layouts for the coarse/fine handoff.
//!
//! These structs are bit-for-bit the buffer contents the kernels consume;
//! sizes are pinned so a layout change is a compile error.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use crate::edge::Edge;
use crate::math::Vec2;

/// Face flag: the program samples the coverage-derived centroid.
pub const FACE_NEEDS_CENTROID: u32 = 1;
/// Face flag: the program samples face-level data (the winding number).
pub const FACE_NEEDS_FACE: u32 = 2;
/// Face flag: the program is a single constant color; the fine pass reads it
/// without running the interpreter.
pub const FACE_CONSTANT_COLOR: u32 = 4;
/// Face flag: the face covers its whole bin; no edges were stored. On a
/// [`ShapeInfo`] the same bit marks a whole-raster cover, which lets the
/// coarse pass skip clipping for every bin of the tile.
pub const FACE_FULL_AREA: u32 = 8;
/// Face flag: even-odd fill rule (nonzero otherwise).
pub const FACE_EVEN_ODD: u32 = 16;

/// Linked-list terminator for bin head pointers and face `next` fields.
pub const FACE_NONE: u32 = !0;

/// Edge flag: boundary-running edge fabricated by clipping.
pub const EDGE_FAKE_CORNER: u32 = 1;

/// Wire form of a directed edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Zeroable, Pod)]
#[repr(C)]
pub struct EdgeSegment {
    pub p0: [f32; 2],
    pub p1: [f32; 2],
    pub flags: u32,
}

const_assert_eq!(std::mem::size_of::<EdgeSegment>(), 20);

impl EdgeSegment {
    pub fn from_edge(edge: &Edge) -> Self {
        Self {
            p0: edge.p0.to_array(),
            p1: edge.p1.to_array(),
            flags: if edge.fake_corner { EDGE_FAKE_CORNER } else { 0 },
        }
    }

    pub fn point0(&self) -> Vec2 {
        Vec2::from_array(self.p0)
    }

    pub fn point1(&self) -> Vec2 {
        Vec2::from_array(self.p1)
    }

    pub fn is_fake_corner(&self) -> bool {
        self.flags & EDGE_FAKE_CORNER != 0
    }
}

/// Per-shape, per-bin record emitted by the coarse pass.
///
/// The four `clip_counts` are the signed full-side traversal counts for the
/// min-x, min-y, max-x and max-y bin boundaries (net upward traversals for
/// the vertical sides, net rightward for the horizontal ones). They let the
/// fine pass reconstruct exact coverage for boundary-hugging geometry
/// without any stored edges.
#[derive(Clone, Copy, Debug, Default, Zeroable, Pod)]
#[repr(C)]
pub struct FaceRecord {
    /// Word offset of the shape's program in the program buffer.
    pub program: u32,
    /// `FACE_*` bits.
    pub flags: u32,
    /// Packed `mix << 8 | compose` word.
    pub blend: u32,
    /// First clipped edge in the bin edge buffer.
    pub edge_ix: u32,
    pub edge_count: u32,
    pub clip_counts: [i32; 4],
    /// Previous head of the bin's face list ([`FACE_NONE`] terminates).
    pub next: u32,
}

const_assert_eq!(std::mem::size_of::<FaceRecord>(), 40);

impl FaceRecord {
    pub fn needs_centroid(&self) -> bool {
        self.flags & FACE_NEEDS_CENTROID != 0
    }

    pub fn needs_face(&self) -> bool {
        self.flags & FACE_NEEDS_FACE != 0
    }

    pub fn is_constant_color(&self) -> bool {
        self.flags & FACE_CONSTANT_COLOR != 0
    }

    pub fn is_full_area(&self) -> bool {
        self.flags & FACE_FULL_AREA != 0
    }

    pub fn is_even_odd(&self) -> bool {
        self.flags & FACE_EVEN_ODD != 0
    }
}

/// Per-shape input record consumed by the coarse pass.
#[derive(Clone, Copy, Debug, Default, Zeroable, Pod)]
#[repr(C)]
pub struct ShapeInfo {
    /// Word offset of the compiled program.
    pub program: u32,
    /// Packed `mix << 8 | compose` word.
    pub blend: u32,
    /// `FACE_*` bits carried into every face this shape emits.
    pub flags: u32,
    /// First edge in the scene edge buffer.
    pub edge_ix: u32,
    pub edge_count: u32,
    /// Filter-expanded bounding box, `[x0, y0, x1, y1]`.
    pub bbox: [f32; 4],
}

const_assert_eq!(std::mem::size_of::<ShapeInfo>(), 36);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_accessors() {
        let face = FaceRecord {
            flags: FACE_CONSTANT_COLOR | FACE_EVEN_ODD,
            ..Default::default()
        };
        assert!(face.is_constant_color());
        assert!(face.is_even_odd());
        assert!(!face.is_full_area());
        assert!(!face.needs_centroid());
    }

    #[test]
    fn edge_segment_round_trip() {
        let edge = Edge::fake(Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0));
        let segment = EdgeSegment::from_edge(&edge);
        assert!(segment.is_fake_corner());
        assert_eq!(segment.point0(), edge.p0);
        assert_eq!(segment.point1(), edge.p1);
    }
}
