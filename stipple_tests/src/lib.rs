// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared helpers for the stipple integration tests.

mod compare;
mod reference;

pub use compare::compare_images;
pub use reference::render_reference;

use peniko::kurbo::Point;
use stipple::{CpuTexture, RenderParams, Renderer, Scene};

/// Corner points of an axis-aligned rectangle, counterclockwise.
pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> [Point; 4] {
    [
        Point::new(x0, y0),
        Point::new(x1, y0),
        Point::new(x1, y1),
        Point::new(x0, y1),
    ]
}

/// Renders through the coarse/fine pipeline with the given options.
pub fn render_pipeline(
    scene: &mut Scene,
    params: &RenderParams,
    options: stipple::RasterOptions,
) -> CpuTexture {
    let mut renderer = Renderer::new(options);
    let mut texture = CpuTexture::new(params.width as usize, params.height as usize);
    let stats = renderer
        .render_to_texture(scene, &mut texture, params)
        .expect("scene programs must validate");
    assert!(!stats.failed, "bump allocators overflowed: {stats:?}");
    texture
}
