// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Color algebra shared by tree evaluation, the bytecode interpreter and the
//! fine pass: mix/compose operators, color matrices and transfer functions.
//!
//! Mix operators follow the CSS compositing spec and act on unpremultiplied
//! color; Porter-Duff composition acts on premultiplied color. The fine pass
//! re-premultiplies between the two, see [`blend_mix_compose`].

use peniko::{BlendMode, Compose, Mix};

/// RGBA color as four `f32` components.
pub type Color4 = [f32; 4];

/// The fully transparent color.
pub const TRANSPARENT: Color4 = [0.0; 4];

/// Alpha below which a color is considered fully transparent.
pub const ALPHA_EPSILON: f32 = 1e-6;

pub fn color_from_peniko(color: peniko::Color) -> Color4 {
    [
        color.r as f32 * (1.0 / 255.0),
        color.g as f32 * (1.0 / 255.0),
        color.b as f32 * (1.0 / 255.0),
        color.a as f32 * (1.0 / 255.0),
    ]
}

pub fn premultiply(c: Color4) -> Color4 {
    [c[0] * c[3], c[1] * c[3], c[2] * c[3], c[3]]
}

/// Inverse of [`premultiply`], guarded against near-zero alpha.
pub fn unpremultiply(c: Color4) -> Color4 {
    if c[3] < ALPHA_EPSILON {
        return [0.0, 0.0, 0.0, c[3]];
    }
    let inv = 1.0 / c[3];
    [c[0] * inv, c[1] * inv, c[2] * inv, c[3]]
}

pub fn unpack4x8unorm(x: u32) -> Color4 {
    let mut result = [0.0; 4];
    for (i, channel) in result.iter_mut().enumerate() {
        *channel = ((x >> (i * 8)) & 0xff) as f32 * (1.0 / 255.0);
    }
    result
}

pub fn pack4x8unorm(x: Color4) -> u32 {
    let mut result = 0;
    for (i, channel) in x.iter().enumerate() {
        let byte = (channel.clamp(0.0, 1.0) * 255.0).round() as u32;
        result |= byte << (i * 8);
    }
    result
}

/// Componentwise interpolation between two colors.
pub fn lerp(c0: Color4, c1: Color4, t: f32) -> Color4 {
    let mut out = [0.0; 4];
    for i in 0..4 {
        out[i] = c0[i] + (c1[i] - c0[i]) * t;
    }
    out
}

/// Applies a 4x4 color matrix plus translation: `out = m * c + t`.
///
/// `matrix` is row-major; row `i` produces output component `i`.
pub fn apply_color_matrix(c: Color4, matrix: &[f32; 16], translation: &[f32; 4]) -> Color4 {
    let mut out = *translation;
    for row in 0..4 {
        let base = row * 4;
        out[row] += matrix[base] * c[0]
            + matrix[base + 1] * c[1]
            + matrix[base + 2] * c[2]
            + matrix[base + 3] * c[3];
    }
    out
}

/// Color-space conversion selector carried by `ColorSpace` nodes and by the
/// matching instruction operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorSpaceConversion {
    SrgbToLinear,
    LinearToSrgb,
}

impl ColorSpaceConversion {
    pub fn to_u32(self) -> u32 {
        match self {
            Self::SrgbToLinear => 0,
            Self::LinearToSrgb => 1,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::SrgbToLinear),
            1 => Some(Self::LinearToSrgb),
            _ => None,
        }
    }
}

pub fn srgb_to_linear(x: f32) -> f32 {
    if x <= 0.04045 {
        x * (1.0 / 12.92)
    } else {
        ((x + 0.055) * (1.0 / 1.055)).powf(2.4)
    }
}

pub fn linear_to_srgb(x: f32) -> f32 {
    if x <= 0.003_130_8 {
        x * 12.92
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

/// Converts the RGB channels of an unpremultiplied color; alpha is untouched.
pub fn convert_color(c: Color4, conversion: ColorSpaceConversion) -> Color4 {
    let f = match conversion {
        ColorSpaceConversion::SrgbToLinear => srgb_to_linear,
        ColorSpaceConversion::LinearToSrgb => linear_to_srgb,
    };
    [f(c[0]), f(c[1]), f(c[2]), c[3]]
}

// Separable mix operators, per channel on unpremultiplied color.

fn mix_multiply(cb: f32, cs: f32) -> f32 {
    cb * cs
}

fn mix_screen(cb: f32, cs: f32) -> f32 {
    cb + cs - cb * cs
}

fn mix_hard_light(cb: f32, cs: f32) -> f32 {
    if cs <= 0.5 {
        mix_multiply(cb, 2.0 * cs)
    } else {
        mix_screen(cb, 2.0 * cs - 1.0)
    }
}

fn mix_dodge(cb: f32, cs: f32) -> f32 {
    if cb == 0.0 {
        0.0
    } else if cs == 1.0 {
        1.0
    } else {
        (cb / (1.0 - cs)).min(1.0)
    }
}

fn mix_burn(cb: f32, cs: f32) -> f32 {
    if cb == 1.0 {
        1.0
    } else if cs == 0.0 {
        0.0
    } else {
        1.0 - ((1.0 - cb) / cs).min(1.0)
    }
}

fn mix_soft_light(cb: f32, cs: f32) -> f32 {
    let d = if cb <= 0.25 {
        ((16.0 * cb - 12.0) * cb + 4.0) * cb
    } else {
        cb.sqrt()
    };
    if cs <= 0.5 {
        cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
    } else {
        cb + (2.0 * cs - 1.0) * (d - cb)
    }
}

// Non-separable operators over whole RGB triples.

type Rgb = [f32; 3];

fn lum(c: Rgb) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn sat(c: Rgb) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn clip_color(mut c: Rgb) -> Rgb {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    if n < 0.0 {
        for channel in &mut c {
            *channel = l + ((*channel - l) * l) / (l - n);
        }
    }
    if x > 1.0 {
        for channel in &mut c {
            *channel = l + ((*channel - l) * (1.0 - l)) / (x - l);
        }
    }
    c
}

fn set_lum(mut c: Rgb, l: f32) -> Rgb {
    let d = l - lum(c);
    for channel in &mut c {
        *channel += d;
    }
    clip_color(c)
}

fn set_sat(c: Rgb, s: f32) -> Rgb {
    let mn = c[0].min(c[1]).min(c[2]);
    let mx = c[0].max(c[1]).max(c[2]);
    let range = mx - mn;
    if range == 0.0 {
        return [0.0; 3];
    }
    // Min channel to 0, max channel to s, the middle scaled proportionally.
    c.map(|channel| (channel - mn) * s / range)
}

/// Applies a mix operator to unpremultiplied source and backdrop RGB.
pub fn mix(cb: Rgb, cs: Rgb, mode: Mix) -> Rgb {
    match mode {
        Mix::Normal | Mix::Clip => cs,
        Mix::Multiply => [0, 1, 2].map(|i| mix_multiply(cb[i], cs[i])),
        Mix::Screen => [0, 1, 2].map(|i| mix_screen(cb[i], cs[i])),
        Mix::Overlay => [0, 1, 2].map(|i| mix_hard_light(cs[i], cb[i])),
        Mix::Darken => [0, 1, 2].map(|i| cb[i].min(cs[i])),
        Mix::Lighten => [0, 1, 2].map(|i| cb[i].max(cs[i])),
        Mix::ColorDodge => [0, 1, 2].map(|i| mix_dodge(cb[i], cs[i])),
        Mix::ColorBurn => [0, 1, 2].map(|i| mix_burn(cb[i], cs[i])),
        Mix::HardLight => [0, 1, 2].map(|i| mix_hard_light(cb[i], cs[i])),
        Mix::SoftLight => [0, 1, 2].map(|i| mix_soft_light(cb[i], cs[i])),
        Mix::Difference => [0, 1, 2].map(|i| (cb[i] - cs[i]).abs()),
        Mix::Exclusion => [0, 1, 2].map(|i| cb[i] + cs[i] - 2.0 * cb[i] * cs[i]),
        Mix::Hue => set_lum(set_sat(cs, sat(cb)), lum(cb)),
        Mix::Saturation => set_lum(set_sat(cb, sat(cs)), lum(cb)),
        Mix::Color => set_lum(cs, lum(cb)),
        Mix::Luminosity => set_lum(cb, lum(cs)),
    }
}

/// Porter-Duff composition over premultiplied color: `src * fa + bg * fb`.
pub fn compose(src: Color4, bg: Color4, mode: Compose) -> Color4 {
    let sa = src[3];
    let ba = bg[3];
    let (fa, fb) = match mode {
        Compose::Clear => (0.0, 0.0),
        Compose::Copy => (1.0, 0.0),
        Compose::Dest => (0.0, 1.0),
        Compose::SrcOver => (1.0, 1.0 - sa),
        Compose::DestOver => (1.0 - ba, 1.0),
        Compose::SrcIn => (ba, 0.0),
        Compose::DestIn => (0.0, sa),
        Compose::SrcOut => (1.0 - ba, 0.0),
        Compose::DestOut => (0.0, 1.0 - sa),
        Compose::SrcAtop => (ba, 1.0 - sa),
        Compose::DestAtop => (1.0 - ba, sa),
        Compose::Xor => (1.0 - ba, 1.0 - sa),
        Compose::Plus => (1.0, 1.0),
        Compose::PlusLighter => (1.0, 1.0),
    };
    let mut out = [0.0; 4];
    for i in 0..4 {
        out[i] = src[i] * fa + bg[i] * fb;
    }
    if matches!(mode, Compose::Plus | Compose::PlusLighter) {
        for channel in &mut out {
            *channel = channel.min(1.0);
        }
    }
    out
}

/// Full blend step: unpremultiplied mix weighted by backdrop alpha, then
/// premultiplied Porter-Duff composition.
///
/// `src` is unpremultiplied (the interpreter's output, with coverage already
/// folded into its alpha); `bg` and the result are premultiplied.
pub fn blend_mix_compose(bg: Color4, src: Color4, blend: BlendMode) -> Color4 {
    let sa = src[3];
    let mut cs = [src[0], src[1], src[2]];
    if !matches!(blend.mix, Mix::Normal | Mix::Clip) && bg[3] > ALPHA_EPSILON {
        let cb_full = unpremultiply(bg);
        let cb = [cb_full[0], cb_full[1], cb_full[2]];
        let mixed = mix(cb, cs, blend.mix);
        // The mixed color takes over proportionally to backdrop coverage.
        for i in 0..3 {
            cs[i] = (1.0 - bg[3]) * cs[i] + bg[3] * mixed[i];
        }
    }
    let src_premul = [cs[0] * sa, cs[1] * sa, cs[2] * sa, sa];
    compose(src_premul, bg, blend.compose)
}

/// Packs a blend mode into the wire word used by face records.
pub fn pack_blend(blend: BlendMode) -> u32 {
    ((blend.mix as u32) << 8) | blend.compose as u32
}

/// Decodes a packed blend word. Unknown mix or compose values are rejected.
pub fn unpack_blend(packed: u32) -> Option<BlendMode> {
    let mix = match packed >> 8 {
        0 => Mix::Normal,
        1 => Mix::Multiply,
        2 => Mix::Screen,
        3 => Mix::Overlay,
        4 => Mix::Darken,
        5 => Mix::Lighten,
        6 => Mix::ColorDodge,
        7 => Mix::ColorBurn,
        8 => Mix::HardLight,
        9 => Mix::SoftLight,
        10 => Mix::Difference,
        11 => Mix::Exclusion,
        12 => Mix::Hue,
        13 => Mix::Saturation,
        14 => Mix::Color,
        15 => Mix::Luminosity,
        128 => Mix::Clip,
        _ => return None,
    };
    let compose = match packed & 0xff {
        0 => Compose::Clear,
        1 => Compose::Copy,
        2 => Compose::Dest,
        3 => Compose::SrcOver,
        4 => Compose::DestOver,
        5 => Compose::SrcIn,
        6 => Compose::DestIn,
        7 => Compose::SrcOut,
        8 => Compose::DestOut,
        9 => Compose::SrcAtop,
        10 => Compose::DestAtop,
        11 => Compose::Xor,
        12 => Compose::Plus,
        13 => Compose::PlusLighter,
        _ => return None,
    };
    Some(BlendMode::new(mix, compose))
}
