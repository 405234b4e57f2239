// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The shading-program tree.
//!
//! Programs are immutable trees of [`Node`]s held in a [`ProgramArena`].
//! Nodes are interned (hash-consed over bit-exact keys), so equal subtrees
//! share one [`NodeId`] and simplification rewrites are purely functional:
//! they only ever allocate new nodes and return new ids.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use peniko::{BlendMode, Fill};
use smallvec::SmallVec;

use crate::color::{
    apply_color_matrix, blend_mix_compose, color_from_peniko, convert_color, lerp, pack_blend,
    premultiply, unpremultiply, Color4, ColorSpaceConversion, ALPHA_EPSILON, TRANSPARENT,
};
use crate::math::{Vec2, LENGTH_SQUARED_EPSILON};

/// Index of an interned node in its [`ProgramArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// One operator of a shading program.
#[derive(Clone, Copy, Debug)]
pub enum Node {
    /// Constant color, unpremultiplied RGBA.
    Solid { color: Color4 },
    /// Interpolates between two sub-programs along the axis `p0..p1`.
    LinearBlend {
        p0: Vec2,
        p1: Vec2,
        zero: NodeId,
        one: NodeId,
    },
    /// Interpolates between two sub-programs by distance from `center`,
    /// mapping `radius0..radius1` onto the blend ratio.
    RadialBlend {
        center: Vec2,
        radius0: f32,
        radius1: f32,
        zero: NodeId,
        one: NodeId,
    },
    /// 4x4 color matrix plus translation applied to the input color.
    Filter {
        matrix: [f32; 16],
        translation: [f32; 4],
        input: NodeId,
    },
    /// Path-boolean split: selects a branch by the face winding under the
    /// fill rule at the evaluated position.
    PathSelect {
        fill: Fill,
        inside: NodeId,
        outside: NodeId,
    },
    /// Color-space conversion of the input color.
    ColorSpace {
        conversion: ColorSpaceConversion,
        input: NodeId,
    },
    /// Stack composition of two sub-programs with a compose operator and an
    /// optional mix mode.
    Blend {
        blend: BlendMode,
        source: NodeId,
        backdrop: NodeId,
    },
}

pub(crate) fn fill_to_u32(fill: Fill) -> u32 {
    match fill {
        Fill::NonZero => 0,
        Fill::EvenOdd => 1,
    }
}

impl Node {
    /// Canonical key: discriminant plus operand bit patterns plus child ids.
    /// Interning compares and hashes these words, so `-0.0` and `0.0` (and
    /// any NaN payloads) are distinct, which keeps rewrites conservative.
    fn write_key(&self, key: &mut SmallVec<[u32; 24]>) {
        match self {
            Self::Solid { color } => {
                key.push(0);
                key.extend(color.iter().map(|x| x.to_bits()));
            }
            Self::LinearBlend { p0, p1, zero, one } => {
                key.push(1);
                key.extend([p0.x, p0.y, p1.x, p1.y].iter().map(|x| x.to_bits()));
                key.push(zero.0);
                key.push(one.0);
            }
            Self::RadialBlend {
                center,
                radius0,
                radius1,
                zero,
                one,
            } => {
                key.push(2);
                key.extend(
                    [center.x, center.y, *radius0, *radius1]
                        .iter()
                        .map(|x| x.to_bits()),
                );
                key.push(zero.0);
                key.push(one.0);
            }
            Self::Filter {
                matrix,
                translation,
                input,
            } => {
                key.push(3);
                key.extend(matrix.iter().map(|x| x.to_bits()));
                key.extend(translation.iter().map(|x| x.to_bits()));
                key.push(input.0);
            }
            Self::PathSelect {
                fill,
                inside,
                outside,
            } => {
                key.push(4);
                key.push(fill_to_u32(*fill));
                key.push(inside.0);
                key.push(outside.0);
            }
            Self::ColorSpace { conversion, input } => {
                key.push(5);
                key.push(conversion.to_u32());
                key.push(input.0);
            }
            Self::Blend {
                blend,
                source,
                backdrop,
            } => {
                key.push(6);
                key.push(pack_blend(*blend));
                key.push(source.0);
                key.push(backdrop.0);
            }
        }
    }

    fn key(&self) -> SmallVec<[u32; 24]> {
        let mut key = SmallVec::new();
        self.write_key(&mut key);
        key
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Per-pixel evaluation context supplied to programs.
#[derive(Clone, Copy, Debug)]
pub struct EvalContext {
    /// Sample position in raster space.
    pub position: Vec2,
    /// Coverage-derived centroid; equals `position` when the face is fully
    /// covered or centroid data was not requested.
    pub centroid: Vec2,
    /// Face winding number at the sample, for path-boolean splits.
    pub winding: i32,
}

impl EvalContext {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            centroid: position,
            winding: 0,
        }
    }
}

/// Blend ratio for a linear axis, clamped to `[0, 1]`.
///
/// A degenerate axis resolves to 0 rather than propagating NaN.
pub fn linear_ratio(p0: Vec2, p1: Vec2, p: Vec2) -> f32 {
    let d = p1 - p0;
    let len2 = d.length_squared();
    if len2 < LENGTH_SQUARED_EPSILON {
        return 0.0;
    }
    ((p - p0).dot(d) / len2).clamp(0.0, 1.0)
}

/// Blend ratio for a radial ramp, clamped to `[0, 1]`.
///
/// Coincident radii degenerate to a hard circle edge at `radius1`.
pub fn radial_ratio(center: Vec2, radius0: f32, radius1: f32, p: Vec2) -> f32 {
    let denom = radius1 - radius0;
    let distance = p.distance(center);
    if denom.abs() < 1e-6 {
        return if distance >= radius1 { 1.0 } else { 0.0 };
    }
    ((distance - radius0) / denom).clamp(0.0, 1.0)
}

pub(crate) fn fill_selects_inside(fill: Fill, winding: i32) -> bool {
    match fill {
        Fill::NonZero => winding != 0,
        Fill::EvenOdd => winding & 1 != 0,
    }
}

/// Interning arena for shading-program nodes.
#[derive(Default)]
pub struct ProgramArena {
    nodes: Vec<Node>,
    interned: HashMap<Node, NodeId>,
    simplify_cache: HashMap<NodeId, NodeId>,
}

impl ProgramArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Interns a node, returning the existing id for an equal node.
    pub fn intern(&mut self, node: Node) -> NodeId {
        if let Some(&id) = self.interned.get(&node) {
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.interned.insert(node, id);
        id
    }

    pub fn solid(&mut self, color: peniko::Color) -> NodeId {
        self.solid_color(color_from_peniko(color))
    }

    pub fn solid_color(&mut self, color: Color4) -> NodeId {
        self.intern(Node::Solid { color })
    }

    pub fn linear_blend(&mut self, p0: Vec2, p1: Vec2, zero: NodeId, one: NodeId) -> NodeId {
        self.intern(Node::LinearBlend { p0, p1, zero, one })
    }

    pub fn radial_blend(
        &mut self,
        center: Vec2,
        radius0: f32,
        radius1: f32,
        zero: NodeId,
        one: NodeId,
    ) -> NodeId {
        self.intern(Node::RadialBlend {
            center,
            radius0,
            radius1,
            zero,
            one,
        })
    }

    pub fn filter(&mut self, matrix: [f32; 16], translation: [f32; 4], input: NodeId) -> NodeId {
        self.intern(Node::Filter {
            matrix,
            translation,
            input,
        })
    }

    pub fn path_select(&mut self, fill: Fill, inside: NodeId, outside: NodeId) -> NodeId {
        self.intern(Node::PathSelect {
            fill,
            inside,
            outside,
        })
    }

    pub fn color_space(&mut self, conversion: ColorSpaceConversion, input: NodeId) -> NodeId {
        self.intern(Node::ColorSpace { conversion, input })
    }

    pub fn blend(&mut self, blend: BlendMode, source: NodeId, backdrop: NodeId) -> NodeId {
        self.intern(Node::Blend {
            blend,
            source,
            backdrop,
        })
    }

    /// The constant color this program reduces to, if it is a constant.
    pub fn constant_color(&self, id: NodeId) -> Option<Color4> {
        match self.get(id) {
            Node::Solid { color } => Some(*color),
            _ => None,
        }
    }

    /// Whether the program contributes nothing anywhere.
    pub fn is_transparent(&self, id: NodeId) -> bool {
        match *self.get(id) {
            Node::Solid { color } => color[3] <= ALPHA_EPSILON,
            Node::LinearBlend { zero, one, .. } | Node::RadialBlend { zero, one, .. } => {
                self.is_transparent(zero) && self.is_transparent(one)
            }
            Node::Filter {
                matrix,
                translation,
                input,
            } => {
                // Output alpha must stay pinned at zero: no alpha translation
                // and no color-to-alpha terms.
                self.is_transparent(input)
                    && translation[3] == 0.0
                    && matrix[12] == 0.0
                    && matrix[13] == 0.0
                    && matrix[14] == 0.0
            }
            Node::PathSelect {
                inside, outside, ..
            } => self.is_transparent(inside) && self.is_transparent(outside),
            Node::ColorSpace { input, .. } => self.is_transparent(input),
            Node::Blend {
                blend,
                source,
                backdrop,
            } => match blend.compose {
                peniko::Compose::Clear => true,
                peniko::Compose::SrcIn | peniko::Compose::DestIn => {
                    self.is_transparent(source) || self.is_transparent(backdrop)
                }
                peniko::Compose::SrcOut | peniko::Compose::Copy => self.is_transparent(source),
                peniko::Compose::DestOut | peniko::Compose::Dest => self.is_transparent(backdrop),
                _ => self.is_transparent(source) && self.is_transparent(backdrop),
            },
        }
    }

    /// Whether the program is fully opaque everywhere.
    pub fn is_opaque(&self, id: NodeId) -> bool {
        match *self.get(id) {
            Node::Solid { color } => color[3] >= 1.0 - ALPHA_EPSILON,
            Node::LinearBlend { zero, one, .. } | Node::RadialBlend { zero, one, .. } => {
                self.is_opaque(zero) && self.is_opaque(one)
            }
            Node::Filter { .. } => false,
            Node::PathSelect {
                inside, outside, ..
            } => self.is_opaque(inside) && self.is_opaque(outside),
            Node::ColorSpace { input, .. } => self.is_opaque(input),
            Node::Blend {
                blend,
                source,
                backdrop,
            } => match blend.compose {
                peniko::Compose::SrcOver | peniko::Compose::DestOver => {
                    self.is_opaque(source) || self.is_opaque(backdrop)
                }
                peniko::Compose::Copy => self.is_opaque(source),
                peniko::Compose::Dest => self.is_opaque(backdrop),
                _ => false,
            },
        }
    }

    /// Whether evaluation wants the coverage-derived centroid.
    pub fn needs_centroid(&self, id: NodeId) -> bool {
        match *self.get(id) {
            Node::Solid { .. } => false,
            Node::LinearBlend { .. } | Node::RadialBlend { .. } => true,
            Node::Filter { input, .. } | Node::ColorSpace { input, .. } => {
                self.needs_centroid(input)
            }
            Node::PathSelect {
                inside, outside, ..
            } => self.needs_centroid(inside) || self.needs_centroid(outside),
            Node::Blend {
                source, backdrop, ..
            } => self.needs_centroid(source) || self.needs_centroid(backdrop),
        }
    }

    /// Whether evaluation wants face-level data (the winding number).
    pub fn needs_face(&self, id: NodeId) -> bool {
        match *self.get(id) {
            Node::Solid { .. } => false,
            Node::PathSelect { .. } => true,
            Node::LinearBlend { zero, one, .. } | Node::RadialBlend { zero, one, .. } => {
                self.needs_face(zero) || self.needs_face(one)
            }
            Node::Filter { input, .. } | Node::ColorSpace { input, .. } => self.needs_face(input),
            Node::Blend {
                source, backdrop, ..
            } => self.needs_face(source) || self.needs_face(backdrop),
        }
    }

    /// Algebraically simplified equivalent of `id`.
    ///
    /// Folds constants, collapses fully transparent subtrees and hoists
    /// path-boolean splits above unary operators when a branch is degenerate,
    /// shrinking the emitted program and the dynamic branches taken per pixel.
    pub fn simplified(&mut self, id: NodeId) -> NodeId {
        if let Some(&cached) = self.simplify_cache.get(&id) {
            return cached;
        }
        let simplified = self.simplify_node(id);
        let simplified = if !matches!(self.get(simplified), Node::Solid { .. })
            && self.is_transparent(simplified)
        {
            self.solid_color(TRANSPARENT)
        } else {
            simplified
        };
        self.simplify_cache.insert(id, simplified);
        simplified
    }

    fn simplify_node(&mut self, id: NodeId) -> NodeId {
        match *self.get(id) {
            Node::Solid { .. } => id,
            Node::LinearBlend { p0, p1, zero, one } => {
                let zero = self.simplified(zero);
                let one = self.simplified(one);
                if zero == one {
                    zero
                } else {
                    self.linear_blend(p0, p1, zero, one)
                }
            }
            Node::RadialBlend {
                center,
                radius0,
                radius1,
                zero,
                one,
            } => {
                let zero = self.simplified(zero);
                let one = self.simplified(one);
                if zero == one {
                    zero
                } else {
                    self.radial_blend(center, radius0, radius1, zero, one)
                }
            }
            Node::Filter {
                matrix,
                translation,
                input,
            } => {
                let input = self.simplified(input);
                if let Some(c) = self.constant_color(input) {
                    return self.solid_color(apply_color_matrix(c, &matrix, &translation));
                }
                if let Some((fill, inside, outside)) = self.hoistable_select(input) {
                    let inside = self.filter(matrix, translation, inside);
                    let outside = self.filter(matrix, translation, outside);
                    let inside = self.simplified(inside);
                    let outside = self.simplified(outside);
                    return self.path_select(fill, inside, outside);
                }
                self.filter(matrix, translation, input)
            }
            Node::ColorSpace { conversion, input } => {
                let input = self.simplified(input);
                if let Some(c) = self.constant_color(input) {
                    return self.solid_color(convert_color(c, conversion));
                }
                if let Some((fill, inside, outside)) = self.hoistable_select(input) {
                    let inside = self.color_space(conversion, inside);
                    let outside = self.color_space(conversion, outside);
                    let inside = self.simplified(inside);
                    let outside = self.simplified(outside);
                    return self.path_select(fill, inside, outside);
                }
                self.color_space(conversion, input)
            }
            Node::PathSelect {
                fill,
                inside,
                outside,
            } => {
                let inside = self.simplified(inside);
                let outside = self.simplified(outside);
                if inside == outside {
                    inside
                } else {
                    self.path_select(fill, inside, outside)
                }
            }
            Node::Blend {
                blend,
                source,
                backdrop,
            } => {
                let source = self.simplified(source);
                let backdrop = self.simplified(backdrop);
                if let (Some(cs), Some(cb)) =
                    (self.constant_color(source), self.constant_color(backdrop))
                {
                    let out = blend_mix_compose(premultiply(cb), cs, blend);
                    return self.solid_color(unpremultiply(out));
                }
                if blend.compose == peniko::Compose::SrcOver
                    && blend.mix == peniko::Mix::Normal
                    && self.is_transparent(source)
                {
                    return backdrop;
                }
                self.blend(blend, source, backdrop)
            }
        }
    }

    /// A path-boolean split with a degenerate branch, eligible for hoisting
    /// above a unary operator.
    fn hoistable_select(&self, id: NodeId) -> Option<(Fill, NodeId, NodeId)> {
        if let Node::PathSelect {
            fill,
            inside,
            outside,
        } = *self.get(id)
        {
            let degenerate = |arena: &Self, branch| {
                arena.constant_color(branch).is_some() || arena.is_transparent(branch)
            };
            if degenerate(self, inside) || degenerate(self, outside) {
                return Some((fill, inside, outside));
            }
        }
        None
    }

    /// Direct tree evaluation; the reference the compiled form is validated
    /// against.
    pub fn eval(&self, id: NodeId, ctx: &EvalContext) -> Color4 {
        match *self.get(id) {
            Node::Solid { color } => color,
            Node::LinearBlend { p0, p1, zero, one } => {
                let t = linear_ratio(p0, p1, ctx.centroid);
                if t <= 0.0 {
                    self.eval(zero, ctx)
                } else if t >= 1.0 {
                    self.eval(one, ctx)
                } else {
                    lerp(self.eval(zero, ctx), self.eval(one, ctx), t)
                }
            }
            Node::RadialBlend {
                center,
                radius0,
                radius1,
                zero,
                one,
            } => {
                let t = radial_ratio(center, radius0, radius1, ctx.centroid);
                if t <= 0.0 {
                    self.eval(zero, ctx)
                } else if t >= 1.0 {
                    self.eval(one, ctx)
                } else {
                    lerp(self.eval(zero, ctx), self.eval(one, ctx), t)
                }
            }
            Node::Filter {
                matrix,
                translation,
                input,
            } => apply_color_matrix(self.eval(input, ctx), &matrix, &translation),
            Node::PathSelect {
                fill,
                inside,
                outside,
            } => {
                if fill_selects_inside(fill, ctx.winding) {
                    self.eval(inside, ctx)
                } else {
                    self.eval(outside, ctx)
                }
            }
            Node::ColorSpace { conversion, input } => {
                convert_color(self.eval(input, ctx), conversion)
            }
            Node::Blend {
                blend,
                source,
                backdrop,
            } => {
                let cb = self.eval(backdrop, ctx);
                let cs = self.eval(source, ctx);
                unpremultiply(blend_mix_compose(premultiply(cb), cs, blend))
            }
        }
    }
}
