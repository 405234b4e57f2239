// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pinned end-to-end scenarios with exactly known outputs.

use stipple::peniko::{BlendMode, Color, Fill};
use stipple::{ColorSpaceTag, CpuTexture, FilterKind, RasterOptions, RenderParams, Renderer, Scene};
use stipple_tests::{rect, render_pipeline};

fn small_raster_options() -> RasterOptions {
    RasterOptions {
        bin_width: 8,
        bin_height: 8,
        tile_in_bins: 1,
    }
}

#[test]
fn red_square_covers_every_pixel() {
    // 8x8 raster, one bin, a single opaque red square over the whole
    // raster: every output pixel is premultiplied (1, 0, 0, 1).
    let mut scene = Scene::new();
    let red = scene.programs_mut().solid(Color::rgb8(255, 0, 0));
    scene.fill_polygon(
        Fill::NonZero,
        BlendMode::default(),
        red,
        &rect(0.0, 0.0, 8.0, 8.0),
    );
    let params = RenderParams::new(8, 8);
    let out = render_pipeline(&mut scene, &params, small_raster_options());
    let expected = 0xFF00_00FF; // RGBA8, red and alpha bytes set
    assert!(out.pixels.iter().all(|&p| p == expected));
}

#[test]
fn white_half_over_red_antialiases_only_the_shared_boundary() {
    let mut scene = Scene::new();
    let red = scene.programs_mut().solid(Color::rgb8(255, 0, 0));
    let white = scene.programs_mut().solid(Color::rgb8(255, 255, 255));
    // Both shapes overhang the raster by the filter radius so only the
    // shared boundary at x = 4 sees the reconstruction filter.
    scene.fill_polygon(
        Fill::NonZero,
        BlendMode::default(),
        red,
        &rect(-1.0, -1.0, 9.0, 9.0),
    );
    scene.fill_polygon(
        Fill::NonZero,
        BlendMode::default(),
        white,
        &rect(-1.0, -1.0, 4.0, 9.0),
    );
    let mut params = RenderParams::new(8, 8);
    params.filter = FilterKind::Bilinear;
    let out = render_pipeline(&mut scene, &params, small_raster_options());
    let white_px = 0xFFFF_FFFF;
    let red_px = 0xFF00_00FF;
    for y in 0..8 {
        for x in 0..8 {
            let p = out.pixels[y * 8 + x];
            match x {
                0..=2 => assert_eq!(p, white_px, "({x}, {y}) should be white"),
                5..=7 => assert_eq!(p, red_px, "({x}, {y}) should be red"),
                _ => {
                    // The columns adjacent to x = 4 blend white into red;
                    // red and alpha stay saturated, green/blue interpolate.
                    assert_eq!(p & 0xFF00_00FF, 0xFF00_00FF, "({x}, {y})");
                    let green = (p >> 8) & 0xff;
                    assert!(
                        green > 0 && green < 255,
                        "({x}, {y}) should be a blend, got {p:#010x}"
                    );
                }
            }
        }
    }
    // Symmetry of the tent filter around the boundary.
    let g3 = (out.pixels[3] >> 8) & 0xff;
    let g4 = (out.pixels[4] >> 8) & 0xff;
    assert_eq!(g3 + g4, 255, "tent weights should mirror");
}

#[test]
fn empty_scene_writes_base_color() {
    let mut scene = Scene::new();
    let mut params = RenderParams::new(8, 8);
    params.base_color = Color::rgba8(0, 128, 0, 255);
    let out = render_pipeline(&mut scene, &params, small_raster_options());
    assert!(out.pixels.iter().all(|&p| p == 0xFF00_8000));
}

#[test]
fn texture_size_mismatch_is_rejected() {
    let mut scene = Scene::new();
    let mut renderer = Renderer::new(RasterOptions::default());
    let mut texture = CpuTexture::new(4, 4);
    let params = RenderParams::new(8, 8);
    let err = renderer.render_to_texture(&mut scene, &mut texture, &params);
    assert!(matches!(err, Err(stipple::Error::TextureSizeMismatch { .. })));
}

#[test]
fn linear_scene_is_srgb_encoded_on_write() {
    let mut scene = Scene::new();
    let grey = scene.programs_mut().solid(Color::rgba8(55, 55, 55, 255));
    scene.fill_polygon(
        Fill::NonZero,
        BlendMode::default(),
        grey,
        &rect(0.0, 0.0, 8.0, 8.0),
    );
    let mut params = RenderParams::new(8, 8);
    params.color_space = ColorSpaceTag::LinearSrgb;
    let out = render_pipeline(&mut scene, &params, small_raster_options());
    let encoded = out.pixels[0] & 0xff;
    // linear 55/255 encodes to a brighter sRGB value.
    assert!(encoded > 100, "got {encoded}");
    assert_eq!(out.pixels[0] >> 24, 0xff);
}
