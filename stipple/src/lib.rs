// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A tiled, two-phase compute rasterizer for 2D shading programs.
//!
//! Stipple turns a resolution-independent description of 2D shading (solid
//! colors, gradients, color-matrix filters, path-boolean composition,
//! compose/blend operators) plus polygon geometry into rasterized pixels.
//! Shading programs compile to a flat bytecode evaluated per covered pixel;
//! geometry runs through a coarse binning pass and a fine evaluation pass,
//! expressed as data-parallel compute kernels.
//!
//! This crate is the host side: it resolves a [`Scene`] into device buffers,
//! validates compiled programs, provisions the bump-allocated outputs and
//! runs the two kernel dispatches back to back.
//!
//! ```
//! use stipple::{peniko, RenderParams, Renderer, Scene};
//! use stipple::peniko::kurbo::Point;
//!
//! let mut scene = Scene::new();
//! let red = scene.programs_mut().solid(peniko::Color::rgb8(255, 0, 0));
//! scene.fill_polygon(
//!     peniko::Fill::NonZero,
//!     peniko::BlendMode::default(),
//!     red,
//!     &[
//!         Point::new(8.0, 8.0),
//!         Point::new(56.0, 8.0),
//!         Point::new(56.0, 56.0),
//!         Point::new(8.0, 56.0),
//!     ],
//! );
//! let mut renderer = Renderer::new(Default::default());
//! let mut texture = stipple::CpuTexture::new(64, 64);
//! let params = RenderParams::new(64, 64);
//! let stats = renderer
//!     .render_to_texture(&mut scene, &mut texture, &params)
//!     .expect("programs validate");
//! assert!(!stats.failed);
//! ```

#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]

mod render;

pub use peniko;

pub use stipple_encoding::{
    ColorSpaceTag, FilterKind, RasterOptions, Scene, Shape,
};
pub use stipple_kernels::CpuTexture;

use thiserror::Error;

/// Errors that can occur in stipple.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A compiled shading program failed validation.
    ///
    /// Programs are decoded in full before any dispatch; a program that does
    /// not decode cannot be partially trusted and nothing is rendered.
    #[error("compiled shading program failed validation")]
    Decode(#[from] stipple_encoding::DecodeError),
    /// The output texture does not match the render dimensions.
    #[error("output texture is {texture_width}x{texture_height} but the render target is {width}x{height}")]
    TextureSizeMismatch {
        texture_width: usize,
        texture_height: usize,
        width: u32,
        height: u32,
    },
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// Parameters for one render.
#[derive(Clone, Copy, Debug)]
pub struct RenderParams {
    /// Background color composited under every bin.
    pub base_color: peniko::Color,
    /// Width of the target in pixels.
    pub width: u32,
    /// Height of the target in pixels.
    pub height: u32,
    /// Reconstruction filter used for antialiased coverage.
    pub filter: FilterKind,
    /// Multiplier on the filter's unit radius.
    pub filter_scale: f32,
    /// Color space the scene's colors live in.
    pub color_space: ColorSpaceTag,
}

impl RenderParams {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            base_color: peniko::Color::TRANSPARENT,
            width,
            height,
            filter: FilterKind::Box,
            filter_scale: 1.0,
            color_space: ColorSpaceTag::Srgb,
        }
    }
}

/// Outcome of one render.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderStats {
    /// A bump allocator ran out of provisioned space; the output is
    /// degraded (some faces were dropped) but valid.
    pub failed: bool,
    /// Face records the coarse pass wanted; at most the provisioned
    /// capacity were written.
    pub faces: u32,
    /// Clipped edges the coarse pass wanted.
    pub edges: u32,
}

/// Renders scenes through the coarse/fine kernel pipeline.
pub struct Renderer {
    options: RasterOptions,
}

static_assertions::assert_impl_all!(Renderer: Send);

impl Renderer {
    pub fn new(options: RasterOptions) -> Self {
        Self { options }
    }

    /// Renders `scene` into `texture`.
    ///
    /// The two kernel dispatches run sequentially; the coarse pass fully
    /// completes before the fine pass consumes its output, which is the only
    /// ordering the pipeline relies on. On bump-allocator overflow the
    /// render completes with degraded output and [`RenderStats::failed`]
    /// set; the required capacities are reported in the stats.
    pub fn render_to_texture(
        &mut self,
        scene: &mut Scene,
        texture: &mut CpuTexture,
        params: &RenderParams,
    ) -> Result<RenderStats> {
        render::render_to_texture(&self.options, scene, texture, params)
    }
}
