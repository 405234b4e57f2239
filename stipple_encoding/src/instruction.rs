// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flat bytecode form of shading programs.
//!
//! Compilation is a post-order fold over the tree: each node emits its
//! children, then its own operator. Combinators with short-circuit semantics
//! emit their children as subroutines behind a skip jump and reference them
//! through [`Location`] markers, which only become integer word offsets at
//! link time, so emission does not depend on buffer layout.
//!
//! The binary transport form is a sequence of little-endian 32-bit words:
//! the low byte of each instruction's first word is the opcode tag (the upper
//! bits are reserved and zero), followed by that opcode's fixed-arity
//! operand words: IEEE-754 bit patterns for floats, word offsets for
//! locations. Decoding dispatches on the tag through a closed match and
//! rejects anything outside the known set; a program that fails to decode
//! cannot be partially trusted and the error is fatal.

use thiserror::Error;

use crate::color::{pack_blend, unpack_blend, ColorSpaceConversion};
use crate::program::{fill_to_u32, Node, NodeId, ProgramArena};

pub const OP_RETURN: u32 = 0;
pub const OP_PUSH_COLOR: u32 = 1;
pub const OP_LINEAR_RATIO: u32 = 2;
pub const OP_RADIAL_RATIO: u32 = 3;
pub const OP_BLEND_STOPS: u32 = 4;
pub const OP_COLOR_MATRIX: u32 = 5;
pub const OP_PATH_SELECT: u32 = 6;
pub const OP_COMPOSE_BLEND: u32 = 7;
pub const OP_COLOR_SPACE: u32 = 8;
pub const OP_JUMP: u32 = 9;

/// Unresolved jump/call target handed out during emission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location(u32);

/// One bytecode instruction.
///
/// Generic over the location representation: [`Location`] markers while the
/// program is being emitted, resolved `u32` word offsets after linking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Instruction<L = u32> {
    /// Returns from a subroutine; at call depth zero, halts the program with
    /// the result on top of the stack.
    Return,
    /// Pushes a constant unpremultiplied color.
    PushColor { color: [f32; 4] },
    /// Computes the linear blend ratio at the evaluation position, pushes it
    /// on the ratio stack, calls `zero` when `t < 1` and `one` when `t > 0`,
    /// then jumps to the blend instruction. Pixels fully on one side of the
    /// ramp evaluate only that side's sub-program.
    LinearRatio {
        p0: [f32; 2],
        p1: [f32; 2],
        zero: L,
        one: L,
        blend: L,
    },
    /// Radial counterpart of [`Instruction::LinearRatio`].
    RadialRatio {
        center: [f32; 2],
        radius0: f32,
        radius1: f32,
        zero: L,
        one: L,
        blend: L,
    },
    /// Pops the blend ratio and the one or two colors the ratio instruction
    /// produced, pushes the interpolant.
    BlendStops,
    /// Pops one color, pushes `matrix * color + translation`.
    ColorMatrix {
        matrix: [f32; 16],
        translation: [f32; 4],
    },
    /// Calls `inside` or `outside` depending on the face winding under the
    /// fill rule (0 = nonzero, 1 = even-odd).
    PathSelect { fill: u32, inside: L, outside: L },
    /// Pops source then backdrop, pushes the mixed/composed result. The
    /// operand packs `mix << 8 | compose`.
    ComposeBlend { blend: u32 },
    /// Pops one color, pushes its color-space conversion.
    ColorSpace { conversion: u32 },
    /// Unconditional jump; skips subroutine bodies in the linear flow.
    Jump { target: L },
}

impl<L> Instruction<L> {
    /// Encoded size in 32-bit words.
    pub fn encoded_size(&self) -> u32 {
        match self {
            Self::Return | Self::BlendStops => 1,
            Self::PushColor { .. } => 5,
            Self::LinearRatio { .. } | Self::RadialRatio { .. } => 8,
            Self::ColorMatrix { .. } => 21,
            Self::PathSelect { .. } => 4,
            Self::ComposeBlend { .. } | Self::ColorSpace { .. } | Self::Jump { .. } => 2,
        }
    }

    fn map_locations<M>(self, f: impl Fn(L) -> M) -> Instruction<M> {
        match self {
            Self::Return => Instruction::Return,
            Self::PushColor { color } => Instruction::PushColor { color },
            Self::LinearRatio {
                p0,
                p1,
                zero,
                one,
                blend,
            } => Instruction::LinearRatio {
                p0,
                p1,
                zero: f(zero),
                one: f(one),
                blend: f(blend),
            },
            Self::RadialRatio {
                center,
                radius0,
                radius1,
                zero,
                one,
                blend,
            } => Instruction::RadialRatio {
                center,
                radius0,
                radius1,
                zero: f(zero),
                one: f(one),
                blend: f(blend),
            },
            Self::BlendStops => Instruction::BlendStops,
            Self::ColorMatrix {
                matrix,
                translation,
            } => Instruction::ColorMatrix {
                matrix,
                translation,
            },
            Self::PathSelect {
                fill,
                inside,
                outside,
            } => Instruction::PathSelect {
                fill,
                inside: f(inside),
                outside: f(outside),
            },
            Self::ComposeBlend { blend } => Instruction::ComposeBlend { blend },
            Self::ColorSpace { conversion } => Instruction::ColorSpace { conversion },
            Self::Jump { target } => Instruction::Jump { target: f(target) },
        }
    }
}

struct Emitter<'a> {
    arena: &'a ProgramArena,
    instructions: Vec<Instruction<Location>>,
    /// Marker id to instruction index, filled when the marker is placed.
    markers: Vec<u32>,
}

impl Emitter<'_> {
    fn new_marker(&mut self) -> Location {
        let loc = Location(self.markers.len() as u32);
        self.markers.push(u32::MAX);
        loc
    }

    fn place(&mut self, loc: Location) {
        debug_assert_eq!(self.markers[loc.0 as usize], u32::MAX, "marker placed twice");
        self.markers[loc.0 as usize] = self.instructions.len() as u32;
    }

    fn emit(&mut self, id: NodeId) {
        match *self.arena.get(id) {
            Node::Solid { color } => {
                self.instructions.push(Instruction::PushColor { color });
            }
            Node::LinearBlend { p0, p1, zero, one } => {
                let (l_zero, l_one, l_blend) = self.emit_blend_subroutines(zero, one);
                self.instructions.push(Instruction::LinearRatio {
                    p0: p0.to_array(),
                    p1: p1.to_array(),
                    zero: l_zero,
                    one: l_one,
                    blend: l_blend,
                });
                self.place(l_blend);
                self.instructions.push(Instruction::BlendStops);
            }
            Node::RadialBlend {
                center,
                radius0,
                radius1,
                zero,
                one,
            } => {
                let (l_zero, l_one, l_blend) = self.emit_blend_subroutines(zero, one);
                self.instructions.push(Instruction::RadialRatio {
                    center: center.to_array(),
                    radius0,
                    radius1,
                    zero: l_zero,
                    one: l_one,
                    blend: l_blend,
                });
                self.place(l_blend);
                self.instructions.push(Instruction::BlendStops);
            }
            Node::Filter {
                matrix,
                translation,
                input,
            } => {
                self.emit(input);
                self.instructions.push(Instruction::ColorMatrix {
                    matrix,
                    translation,
                });
            }
            Node::PathSelect {
                fill,
                inside,
                outside,
            } => {
                let l_inside = self.new_marker();
                let l_outside = self.new_marker();
                let l_select = self.new_marker();
                self.instructions.push(Instruction::Jump { target: l_select });
                self.place(l_inside);
                self.emit(inside);
                self.instructions.push(Instruction::Return);
                self.place(l_outside);
                self.emit(outside);
                self.instructions.push(Instruction::Return);
                self.place(l_select);
                self.instructions.push(Instruction::PathSelect {
                    fill: fill_to_u32(fill),
                    inside: l_inside,
                    outside: l_outside,
                });
            }
            Node::ColorSpace { conversion, input } => {
                self.emit(input);
                self.instructions.push(Instruction::ColorSpace {
                    conversion: conversion.to_u32(),
                });
            }
            Node::Blend {
                blend,
                source,
                backdrop,
            } => {
                self.emit(backdrop);
                self.emit(source);
                self.instructions.push(Instruction::ComposeBlend {
                    blend: pack_blend(blend),
                });
            }
        }
    }

    /// Emits the zero and one sub-programs of a two-stop blend as skipped
    /// subroutine bodies, returning their entry markers and the (unplaced)
    /// marker of the shared blend instruction.
    fn emit_blend_subroutines(&mut self, zero: NodeId, one: NodeId) -> (Location, Location, Location) {
        let l_zero = self.new_marker();
        let l_one = self.new_marker();
        let l_ratio = self.new_marker();
        let l_blend = self.new_marker();
        self.instructions.push(Instruction::Jump { target: l_ratio });
        self.place(l_zero);
        self.emit(zero);
        self.instructions.push(Instruction::Return);
        self.place(l_one);
        self.emit(one);
        self.instructions.push(Instruction::Return);
        self.place(l_ratio);
        (l_zero, l_one, l_blend)
    }
}

/// Compiles a program tree into linked, position-independent bytecode.
///
/// The returned instructions carry resolved word offsets; [`encode`] turns
/// them into the transport form without further fixups.
pub fn compile(arena: &ProgramArena, root: NodeId) -> Vec<Instruction> {
    let mut emitter = Emitter {
        arena,
        instructions: Vec::new(),
        markers: Vec::new(),
    };
    emitter.emit(root);
    emitter.instructions.push(Instruction::Return);
    // Link: markers resolve to the word offset of the instruction they mark.
    let mut offsets = Vec::with_capacity(emitter.instructions.len());
    let mut offset = 0;
    for instruction in &emitter.instructions {
        offsets.push(offset);
        offset += instruction.encoded_size();
    }
    let markers = emitter.markers;
    emitter
        .instructions
        .into_iter()
        .map(|instruction| {
            instruction.map_locations(|loc| {
                let index = markers[loc.0 as usize];
                debug_assert_ne!(index, u32::MAX, "unplaced marker");
                offsets[index as usize]
            })
        })
        .collect()
}

/// Total encoded size of a linked program, in words.
pub fn encoded_len(instructions: &[Instruction]) -> u32 {
    instructions.iter().map(Instruction::encoded_size).sum()
}

/// Serializes linked instructions to the 32-bit word transport form.
pub fn encode(instructions: &[Instruction]) -> Vec<u32> {
    let mut words = Vec::with_capacity(encoded_len(instructions) as usize);
    for instruction in instructions {
        match *instruction {
            Instruction::Return => words.push(OP_RETURN),
            Instruction::PushColor { color } => {
                words.push(OP_PUSH_COLOR);
                words.extend(color.iter().map(|x| x.to_bits()));
            }
            Instruction::LinearRatio {
                p0,
                p1,
                zero,
                one,
                blend,
            } => {
                words.push(OP_LINEAR_RATIO);
                words.extend([p0[0], p0[1], p1[0], p1[1]].iter().map(|x| x.to_bits()));
                words.extend([zero, one, blend]);
            }
            Instruction::RadialRatio {
                center,
                radius0,
                radius1,
                zero,
                one,
                blend,
            } => {
                words.push(OP_RADIAL_RATIO);
                words.extend(
                    [center[0], center[1], radius0, radius1]
                        .iter()
                        .map(|x| x.to_bits()),
                );
                words.extend([zero, one, blend]);
            }
            Instruction::BlendStops => words.push(OP_BLEND_STOPS),
            Instruction::ColorMatrix {
                matrix,
                translation,
            } => {
                words.push(OP_COLOR_MATRIX);
                words.extend(matrix.iter().map(|x| x.to_bits()));
                words.extend(translation.iter().map(|x| x.to_bits()));
            }
            Instruction::PathSelect {
                fill,
                inside,
                outside,
            } => {
                words.push(OP_PATH_SELECT);
                words.extend([fill, inside, outside]);
            }
            Instruction::ComposeBlend { blend } => {
                words.push(OP_COMPOSE_BLEND);
                words.push(blend);
            }
            Instruction::ColorSpace { conversion } => {
                words.push(OP_COLOR_SPACE);
                words.push(conversion);
            }
            Instruction::Jump { target } => {
                words.push(OP_JUMP);
                words.push(target);
            }
        }
    }
    words
}

/// Errors produced when decoding a program's transport form.
///
/// All of these are fatal: a program that decodes incorrectly cannot be
/// partially trusted and must not be dispatched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown opcode {opcode:#x} at word offset {offset}")]
    UnknownOpcode { opcode: u32, offset: u32 },
    #[error("truncated instruction at word offset {offset}")]
    Truncated { offset: u32 },
    #[error("jump target {target} out of bounds of a {len}-word program")]
    TargetOutOfBounds { target: u32, len: u32 },
    #[error("invalid operand at word offset {offset}")]
    InvalidOperand { offset: u32 },
}

/// Decodes a program's transport form back into instructions.
///
/// Validates opcode tags, operand ranges and jump/call targets.
pub fn decode(words: &[u32]) -> Result<Vec<Instruction>, DecodeError> {
    let len = words.len() as u32;
    let mut instructions = Vec::new();
    let mut offset = 0u32;
    let check_target = |target: u32| {
        if target >= len {
            Err(DecodeError::TargetOutOfBounds { target, len })
        } else {
            Ok(target)
        }
    };
    while offset < len {
        let opcode = words[offset as usize] & 0xff;
        let operands = &words[offset as usize + 1..];
        let take = |n: usize| {
            if operands.len() < n {
                Err(DecodeError::Truncated { offset })
            } else {
                Ok(&operands[..n])
            }
        };
        let instruction = match opcode {
            OP_RETURN => Instruction::Return,
            OP_PUSH_COLOR => {
                let w = take(4)?;
                Instruction::PushColor {
                    color: [
                        f32::from_bits(w[0]),
                        f32::from_bits(w[1]),
                        f32::from_bits(w[2]),
                        f32::from_bits(w[3]),
                    ],
                }
            }
            OP_LINEAR_RATIO => {
                let w = take(7)?;
                Instruction::LinearRatio {
                    p0: [f32::from_bits(w[0]), f32::from_bits(w[1])],
                    p1: [f32::from_bits(w[2]), f32::from_bits(w[3])],
                    zero: check_target(w[4])?,
                    one: check_target(w[5])?,
                    blend: check_target(w[6])?,
                }
            }
            OP_RADIAL_RATIO => {
                let w = take(7)?;
                Instruction::RadialRatio {
                    center: [f32::from_bits(w[0]), f32::from_bits(w[1])],
                    radius0: f32::from_bits(w[2]),
                    radius1: f32::from_bits(w[3]),
                    zero: check_target(w[4])?,
                    one: check_target(w[5])?,
                    blend: check_target(w[6])?,
                }
            }
            OP_BLEND_STOPS => Instruction::BlendStops,
            OP_COLOR_MATRIX => {
                let w = take(20)?;
                let mut matrix = [0.0; 16];
                for (m, word) in matrix.iter_mut().zip(w) {
                    *m = f32::from_bits(*word);
                }
                let mut translation = [0.0; 4];
                for (t, word) in translation.iter_mut().zip(&w[16..]) {
                    *t = f32::from_bits(*word);
                }
                Instruction::ColorMatrix {
                    matrix,
                    translation,
                }
            }
            OP_PATH_SELECT => {
                let w = take(3)?;
                if w[0] > 1 {
                    return Err(DecodeError::InvalidOperand { offset });
                }
                Instruction::PathSelect {
                    fill: w[0],
                    inside: check_target(w[1])?,
                    outside: check_target(w[2])?,
                }
            }
            OP_COMPOSE_BLEND => {
                let w = take(1)?;
                if unpack_blend(w[0]).is_none() {
                    return Err(DecodeError::InvalidOperand { offset });
                }
                Instruction::ComposeBlend { blend: w[0] }
            }
            OP_COLOR_SPACE => {
                let w = take(1)?;
                if ColorSpaceConversion::from_u32(w[0]).is_none() {
                    return Err(DecodeError::InvalidOperand { offset });
                }
                Instruction::ColorSpace { conversion: w[0] }
            }
            OP_JUMP => {
                let w = take(1)?;
                Instruction::Jump {
                    target: check_target(w[0])?,
                }
            }
            _ => {
                return Err(DecodeError::UnknownOpcode { opcode, offset });
            }
        };
        offset += instruction.encoded_size();
        instructions.push(instruction);
    }
    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::TRANSPARENT;
    use crate::math::Vec2;
    use peniko::{BlendMode, Compose, Fill, Mix};

    fn round_trip(arena: &ProgramArena, root: NodeId) -> Vec<Instruction> {
        let compiled = compile(arena, root);
        let words = encode(&compiled);
        let decoded = decode(&words).expect("compiled programs must decode");
        assert_eq!(decoded, compiled);
        compiled
    }

    #[test]
    fn solid_round_trip() {
        let mut arena = ProgramArena::new();
        let root = arena.solid_color([1.0, 0.0, 0.0, 1.0]);
        let compiled = round_trip(&arena, root);
        assert_eq!(compiled.len(), 2);
        assert!(matches!(compiled[1], Instruction::Return));
    }

    #[test]
    fn linear_blend_round_trip_and_layout() {
        let mut arena = ProgramArena::new();
        let red = arena.solid_color([1.0, 0.0, 0.0, 1.0]);
        let blue = arena.solid_color([0.0, 0.0, 1.0, 1.0]);
        let root = arena.linear_blend(Vec2::ZERO, Vec2::new(8.0, 0.0), red, blue);
        let compiled = round_trip(&arena, root);
        // Subroutine bodies are skipped by the leading jump; the ratio
        // instruction jumps on to its blend instruction.
        let Instruction::Jump { target } = compiled[0] else {
            panic!("expected leading jump");
        };
        let words = encode(&compiled);
        assert_eq!(words[0] & 0xff, OP_JUMP);
        assert_eq!(words[target as usize] & 0xff, OP_LINEAR_RATIO);
        let Instruction::LinearRatio { zero, one, blend, .. } = compiled[5] else {
            panic!("expected ratio after subroutines");
        };
        assert_eq!(words[zero as usize] & 0xff, OP_PUSH_COLOR);
        assert_eq!(words[one as usize] & 0xff, OP_PUSH_COLOR);
        assert_eq!(words[blend as usize] & 0xff, OP_BLEND_STOPS);
    }

    #[test]
    fn color_matrix_round_trip() {
        let mut arena = ProgramArena::new();
        let grey = arena.solid_color([0.5, 0.5, 0.5, 1.0]);
        let mut matrix = [0.0f32; 16];
        for i in 0..4 {
            matrix[i * 4 + i] = 0.5;
        }
        let root = arena.filter(matrix, [0.1, 0.2, 0.3, 0.0], grey);
        round_trip(&arena, root);
    }

    #[test]
    fn path_select_round_trip() {
        let mut arena = ProgramArena::new();
        let red = arena.solid_color([1.0, 0.0, 0.0, 1.0]);
        let clear = arena.solid_color(TRANSPARENT);
        let root = arena.path_select(Fill::EvenOdd, red, clear);
        let compiled = round_trip(&arena, root);
        assert!(compiled
            .iter()
            .any(|i| matches!(i, Instruction::PathSelect { fill: 1, .. })));
    }

    #[test]
    fn nested_blend_round_trip() {
        let mut arena = ProgramArena::new();
        let red = arena.solid_color([1.0, 0.0, 0.0, 0.5]);
        let blue = arena.solid_color([0.0, 0.0, 1.0, 1.0]);
        let grad = arena.radial_blend(Vec2::new(4.0, 4.0), 0.0, 4.0, red, blue);
        let conv = arena.color_space(crate::color::ColorSpaceConversion::SrgbToLinear, grad);
        let root = arena.blend(BlendMode::new(Mix::Multiply, Compose::SrcAtop), conv, blue);
        round_trip(&arena, root);
    }

    #[test]
    fn unknown_opcode_rejected() {
        let words = [0xB2u32, 0, 0];
        assert_eq!(
            decode(&words),
            Err(DecodeError::UnknownOpcode {
                opcode: 0xB2,
                offset: 0
            })
        );
    }

    #[test]
    fn truncated_program_rejected() {
        let mut arena = ProgramArena::new();
        let root = arena.solid_color([1.0, 0.0, 0.0, 1.0]);
        let words = encode(&compile(&arena, root));
        assert_eq!(
            decode(&words[..words.len() - 2]),
            Err(DecodeError::Truncated { offset: 0 })
        );
    }

    #[test]
    fn out_of_bounds_target_rejected() {
        let words = [OP_JUMP, 99, OP_RETURN];
        assert_eq!(
            decode(&words),
            Err(DecodeError::TargetOutOfBounds { target: 99, len: 3 })
        );
    }

    #[test]
    fn invalid_blend_operand_rejected() {
        let words = [OP_COMPOSE_BLEND, 0x0000_00ff, OP_RETURN];
        assert_eq!(decode(&words), Err(DecodeError::InvalidOperand { offset: 0 }));
    }
}
