// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stack-machine interpreter for compiled shading programs.
//!
//! Runs directly over the 32-bit word transport form, exactly as a device
//! kernel would. Call/return is structured: a ratio or select instruction
//! runs a subroutine to its `Return` before continuing, so the call depth
//! matches the source tree's nesting and total executed instructions are
//! bounded by the program length. The host validates programs by decoding
//! them before dispatch; an opcode reaching this interpreter unrecognized is
//! a fatal error, not a recoverable one.

use stipple_encoding::color::{
    apply_color_matrix, blend_mix_compose, convert_color, lerp, premultiply, unpack_blend,
    unpremultiply, Color4, ColorSpaceConversion,
};
use stipple_encoding::math::Vec2;
use stipple_encoding::{
    linear_ratio, radial_ratio, EvalContext, OP_BLEND_STOPS, OP_COLOR_MATRIX, OP_COLOR_SPACE,
    OP_COMPOSE_BLEND, OP_JUMP, OP_LINEAR_RATIO, OP_PATH_SELECT, OP_PUSH_COLOR, OP_RADIAL_RATIO,
    OP_RETURN,
};

/// Depth of the color and ratio stacks; bounds program nesting.
pub const STACK_DEPTH: usize = 16;

struct Machine<'a> {
    words: &'a [u32],
    ctx: &'a EvalContext,
    stack: [Color4; STACK_DEPTH],
    stack_len: usize,
    ratios: [f32; STACK_DEPTH],
    ratio_len: usize,
    /// Remaining instruction budget; each instruction executes at most once
    /// per evaluation, so the program length bounds it.
    fuel: usize,
}

impl Machine<'_> {
    fn word(&self, ix: u32) -> u32 {
        self.words[ix as usize]
    }

    fn float(&self, ix: u32) -> f32 {
        f32::from_bits(self.word(ix))
    }

    fn push(&mut self, color: Color4) {
        assert!(self.stack_len < STACK_DEPTH, "shading program stack overflow");
        self.stack[self.stack_len] = color;
        self.stack_len += 1;
    }

    fn pop(&mut self) -> Color4 {
        assert!(self.stack_len > 0, "shading program stack underflow");
        self.stack_len -= 1;
        self.stack[self.stack_len]
    }

    fn push_ratio(&mut self, t: f32) {
        assert!(self.ratio_len < STACK_DEPTH, "shading program ratio overflow");
        self.ratios[self.ratio_len] = t;
        self.ratio_len += 1;
    }

    fn pop_ratio(&mut self) -> f32 {
        assert!(self.ratio_len > 0, "shading program ratio underflow");
        self.ratio_len -= 1;
        self.ratios[self.ratio_len]
    }

    /// Runs one subroutine: executes from `pc` until its `Return`.
    fn run(&mut self, mut pc: u32) {
        loop {
            assert!(self.fuel > 0, "shading program exceeded instruction budget");
            self.fuel -= 1;
            let opcode = self.word(pc) & 0xff;
            match opcode {
                OP_RETURN => return,
                OP_PUSH_COLOR => {
                    let color = [
                        self.float(pc + 1),
                        self.float(pc + 2),
                        self.float(pc + 3),
                        self.float(pc + 4),
                    ];
                    self.push(color);
                    pc += 5;
                }
                OP_LINEAR_RATIO => {
                    let p0 = Vec2::new(self.float(pc + 1), self.float(pc + 2));
                    let p1 = Vec2::new(self.float(pc + 3), self.float(pc + 4));
                    let zero = self.word(pc + 5);
                    let one = self.word(pc + 6);
                    let blend = self.word(pc + 7);
                    let t = linear_ratio(p0, p1, self.ctx.centroid);
                    self.branch_stops(t, zero, one);
                    pc = blend;
                }
                OP_RADIAL_RATIO => {
                    let center = Vec2::new(self.float(pc + 1), self.float(pc + 2));
                    let radius0 = self.float(pc + 3);
                    let radius1 = self.float(pc + 4);
                    let zero = self.word(pc + 5);
                    let one = self.word(pc + 6);
                    let blend = self.word(pc + 7);
                    let t = radial_ratio(center, radius0, radius1, self.ctx.centroid);
                    self.branch_stops(t, zero, one);
                    pc = blend;
                }
                OP_BLEND_STOPS => {
                    let t = self.pop_ratio();
                    if t > 0.0 && t < 1.0 {
                        let one = self.pop();
                        let zero = self.pop();
                        self.push(lerp(zero, one, t));
                    }
                    // Otherwise the single evaluated side is already on top.
                    pc += 1;
                }
                OP_COLOR_MATRIX => {
                    let mut matrix = [0.0; 16];
                    for (i, m) in matrix.iter_mut().enumerate() {
                        *m = self.float(pc + 1 + i as u32);
                    }
                    let mut translation = [0.0; 4];
                    for (i, t) in translation.iter_mut().enumerate() {
                        *t = self.float(pc + 17 + i as u32);
                    }
                    let color = self.pop();
                    self.push(apply_color_matrix(color, &matrix, &translation));
                    pc += 21;
                }
                OP_PATH_SELECT => {
                    let fill = self.word(pc + 1);
                    let inside = self.word(pc + 2);
                    let outside = self.word(pc + 3);
                    let selected = if fill == 0 {
                        self.ctx.winding != 0
                    } else {
                        self.ctx.winding & 1 != 0
                    };
                    self.run(if selected { inside } else { outside });
                    pc += 4;
                }
                OP_COMPOSE_BLEND => {
                    let Some(blend) = unpack_blend(self.word(pc + 1)) else {
                        panic!("invalid blend word in shading program");
                    };
                    let source = self.pop();
                    let backdrop = self.pop();
                    let composed = blend_mix_compose(premultiply(backdrop), source, blend);
                    self.push(unpremultiply(composed));
                    pc += 2;
                }
                OP_COLOR_SPACE => {
                    let Some(conversion) = ColorSpaceConversion::from_u32(self.word(pc + 1))
                    else {
                        panic!("invalid color-space word in shading program");
                    };
                    let color = self.pop();
                    self.push(convert_color(color, conversion));
                    pc += 2;
                }
                OP_JUMP => {
                    pc = self.word(pc + 1);
                }
                _ => panic!("invalid shading program opcode {opcode:#x} at word {pc}"),
            }
        }
    }

    /// Ratio-instruction tail: publish `t`, evaluate the sides it selects.
    fn branch_stops(&mut self, t: f32, zero: u32, one: u32) {
        self.push_ratio(t);
        if t < 1.0 {
            self.run(zero);
        }
        if t > 0.0 {
            self.run(one);
        }
    }
}

/// Evaluates a compiled program at `entry` against a per-pixel context,
/// returning the unpremultiplied result color.
pub fn eval_program(words: &[u32], entry: u32, ctx: &EvalContext) -> Color4 {
    let mut machine = Machine {
        words,
        ctx,
        stack: [[0.0; 4]; STACK_DEPTH],
        stack_len: 0,
        ratios: [0.0; STACK_DEPTH],
        ratio_len: 0,
        fuel: words.len(),
    };
    machine.run(entry);
    let result = machine.pop();
    debug_assert_eq!(machine.stack_len, 0, "unbalanced shading program stack");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::{BlendMode, Compose, Fill, Mix};
    use stipple_encoding::{compile, encode, ProgramArena};

    fn assert_matches_tree(
        arena: &ProgramArena,
        root: stipple_encoding::NodeId,
        ctx: &EvalContext,
    ) {
        let words = encode(&compile(arena, root));
        let vm = eval_program(&words, 0, ctx);
        let tree = arena.eval(root, ctx);
        for i in 0..4 {
            assert!(
                (vm[i] - tree[i]).abs() < 1e-6,
                "vm {vm:?} != tree {tree:?}"
            );
        }
    }

    #[test]
    fn solid_color() {
        let mut arena = ProgramArena::new();
        let root = arena.solid_color([0.2, 0.4, 0.6, 0.8]);
        assert_matches_tree(&arena, root, &EvalContext::at(Vec2::ZERO));
    }

    #[test]
    fn linear_blend_short_circuits_and_interpolates() {
        let mut arena = ProgramArena::new();
        let red = arena.solid_color([1.0, 0.0, 0.0, 1.0]);
        let blue = arena.solid_color([0.0, 0.0, 1.0, 1.0]);
        let root = arena.linear_blend(Vec2::ZERO, Vec2::new(8.0, 0.0), red, blue);
        for x in [-2.0, 0.0, 2.0, 4.0, 7.0, 8.0, 11.0] {
            assert_matches_tree(&arena, root, &EvalContext::at(Vec2::new(x, 0.0)));
        }
    }

    #[test]
    fn radial_blend_matches_tree() {
        let mut arena = ProgramArena::new();
        let white = arena.solid_color([1.0, 1.0, 1.0, 1.0]);
        let clear = arena.solid_color([0.0, 0.0, 0.0, 0.0]);
        let root = arena.radial_blend(Vec2::new(4.0, 4.0), 1.0, 5.0, white, clear);
        for p in [
            Vec2::new(4.0, 4.0),
            Vec2::new(7.0, 4.0),
            Vec2::new(12.0, 4.0),
        ] {
            assert_matches_tree(&arena, root, &EvalContext::at(p));
        }
    }

    #[test]
    fn nested_operators_match_tree() {
        let mut arena = ProgramArena::new();
        let red = arena.solid_color([1.0, 0.0, 0.0, 0.5]);
        let green = arena.solid_color([0.0, 1.0, 0.0, 1.0]);
        let grad = arena.linear_blend(Vec2::ZERO, Vec2::new(4.0, 4.0), red, green);
        let mut matrix = [0.0; 16];
        for i in 0..4 {
            matrix[i * 4 + i] = 0.5;
        }
        matrix[15] = 1.0;
        let filtered = arena.filter(matrix, [0.25, 0.0, 0.0, 0.0], grad);
        let conv =
            arena.color_space(ColorSpaceConversion::LinearToSrgb, filtered);
        let select = arena.path_select(Fill::NonZero, conv, red);
        let root = arena.blend(
            BlendMode::new(Mix::Screen, Compose::SrcOver),
            select,
            green,
        );
        for winding in [0, 1, 2] {
            let mut ctx = EvalContext::at(Vec2::new(1.5, 2.5));
            ctx.winding = winding;
            assert_matches_tree(&arena, root, &ctx);
        }
    }

    #[test]
    fn centroid_drives_ratio() {
        let mut arena = ProgramArena::new();
        let black = arena.solid_color([0.0, 0.0, 0.0, 1.0]);
        let white = arena.solid_color([1.0, 1.0, 1.0, 1.0]);
        let root = arena.linear_blend(Vec2::ZERO, Vec2::new(1.0, 0.0), black, white);
        let words = encode(&compile(&arena, root));
        let mut ctx = EvalContext::at(Vec2::new(0.9, 0.0));
        ctx.centroid = Vec2::new(0.25, 0.0);
        let c = eval_program(&words, 0, &ctx);
        assert!((c[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "invalid shading program opcode")]
    fn unknown_opcode_is_fatal() {
        let words = [0x77, OP_RETURN];
        let _ = eval_program(&words, 0, &EvalContext::at(Vec2::ZERO));
    }
}
