// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end behavior of the shading-program operators.

use stipple::peniko::{BlendMode, Color, Compose, Fill, Mix};
use stipple::{RasterOptions, RenderParams, Scene};
use stipple_encoding::color::unpack4x8unorm;
use stipple_encoding::math::Vec2;
use stipple_tests::{rect, render_pipeline, render_reference, compare_images};

fn options() -> RasterOptions {
    RasterOptions {
        bin_width: 8,
        bin_height: 8,
        tile_in_bins: 2,
    }
}

#[test]
fn linear_gradient_ramps_across_the_rect() {
    let mut scene = Scene::new();
    let programs = scene.programs_mut();
    let black = programs.solid(Color::rgb8(0, 0, 0));
    let white = programs.solid(Color::rgb8(255, 255, 255));
    let grad = programs.linear_blend(Vec2::new(0.0, 0.0), Vec2::new(32.0, 0.0), black, white);
    scene.fill_polygon(
        Fill::NonZero,
        BlendMode::default(),
        grad,
        &rect(0.0, 0.0, 32.0, 16.0),
    );
    let params = RenderParams::new(32, 16);
    let out = render_pipeline(&mut scene, &params, options());
    // Monotone ramp along x, constant along y.
    for x in 1..32 {
        let prev = out.pixels[x - 1] & 0xff;
        let here = out.pixels[x] & 0xff;
        assert!(here >= prev, "ramp must not decrease at x = {x}");
        assert_eq!(out.pixels[x], out.pixels[8 * 32 + x], "rows must agree");
    }
    // Ratio at a pixel center x + 0.5 over a 32-wide axis.
    let mid = unpack4x8unorm(out.pixels[16]);
    assert!((mid[0] - 16.5 / 32.0).abs() < 2.0 / 255.0);
}

#[test]
fn radial_gradient_is_radially_symmetric() {
    let mut scene = Scene::new();
    let programs = scene.programs_mut();
    let white = programs.solid(Color::rgb8(255, 255, 255));
    let black = programs.solid(Color::rgb8(0, 0, 0));
    let grad = programs.radial_blend(Vec2::new(16.0, 16.0), 2.0, 14.0, white, black);
    scene.fill_polygon(
        Fill::NonZero,
        BlendMode::default(),
        grad,
        &rect(0.0, 0.0, 32.0, 32.0),
    );
    let params = RenderParams::new(32, 32);
    let out = render_pipeline(&mut scene, &params, options());
    let sample = |x: usize, y: usize| unpack4x8unorm(out.pixels[y * 32 + x])[0];
    // Four mirror positions at equal distance agree.
    let quads = [
        sample(16 + 8, 16),
        sample(16 - 9, 16),
        sample(16, 16 + 8),
        sample(16, 16 - 9),
    ];
    for q in &quads[1..] {
        assert!((q - quads[0]).abs() < 2.0 / 255.0, "{quads:?}");
    }
    // Inside the inner radius it is pure white, outside the outer pure
    // black.
    assert!((sample(16, 16) - 1.0).abs() < 1.0 / 255.0);
    assert!(sample(1, 1) < 1.0 / 255.0);
}

#[test]
fn color_matrix_filter_applies_per_pixel() {
    // Swap red into green through a color matrix over a red gradient.
    let mut scene = Scene::new();
    let programs = scene.programs_mut();
    let red = programs.solid(Color::rgb8(255, 0, 0));
    let dark = programs.solid(Color::rgb8(0, 0, 0));
    let grad = programs.linear_blend(Vec2::new(0.0, 0.0), Vec2::new(16.0, 0.0), dark, red);
    let mut matrix = [0.0f32; 16];
    matrix[4] = 1.0; // green out = red in
    matrix[15] = 1.0; // alpha passthrough
    let filtered = programs.filter(matrix, [0.0; 4], grad);
    scene.fill_polygon(
        Fill::NonZero,
        BlendMode::default(),
        filtered,
        &rect(0.0, 0.0, 16.0, 8.0),
    );
    let params = RenderParams::new(16, 8);
    let out = render_pipeline(&mut scene, &params, options());
    let c = unpack4x8unorm(out.pixels[12]);
    assert!(c[0] < 1.0 / 255.0, "red must be zeroed");
    assert!((c[1] - 12.5 / 16.0).abs() < 2.0 / 255.0, "green carries the ramp");
    let expected = render_reference(&scene, &params);
    compare_images(&out.pixels, &expected, 16, 2).unwrap();
}

#[test]
fn path_select_splits_on_even_odd_winding() {
    // One shape, two overlapping contours, nonzero fill: covered
    // everywhere, but the program picks a branch by even-odd winding, so
    // the double-wound overlap renders the "outside" color.
    let mut scene = Scene::new();
    let programs = scene.programs_mut();
    let green = programs.solid(Color::rgb8(0, 255, 0));
    let purple = programs.solid(Color::rgb8(128, 0, 128));
    let select = programs.path_select(Fill::EvenOdd, green, purple);
    let mut points = Vec::new();
    let a = rect(0.0, 0.0, 20.0, 16.0);
    let b = rect(12.0, 0.0, 32.0, 16.0);
    points.extend(a);
    points.push(a[0]);
    points.extend(b);
    points.push(b[0]);
    scene.fill_polygon(Fill::NonZero, BlendMode::default(), select, &points);
    let params = RenderParams::new(32, 16);
    let out = render_pipeline(&mut scene, &params, options());
    let green_px = 0xFF00_FF00;
    assert_eq!(out.pixels[8 * 32 + 4], green_px, "single-wound region");
    assert_eq!(out.pixels[8 * 32 + 28], green_px, "single-wound region");
    let overlap = unpack4x8unorm(out.pixels[8 * 32 + 16]);
    assert!((overlap[0] - 128.0 / 255.0).abs() < 1.0 / 255.0, "overlap picks purple");
    assert!(overlap[1] < 1.0 / 255.0);
    let expected = render_reference(&scene, &params);
    compare_images(&out.pixels, &expected, 32, 4).unwrap();
}

#[test]
fn compose_blend_program_mixes_in_place() {
    // A program-level blend node: semi-transparent blue over yellow,
    // composed src-over inside the program, drawn over a white page.
    let mut scene = Scene::new();
    let programs = scene.programs_mut();
    let white = programs.solid(Color::rgb8(255, 255, 255));
    let yellow = programs.solid(Color::rgb8(255, 255, 0));
    let blue_half = programs.solid(Color::rgba8(0, 0, 255, 128));
    let mixed = programs.blend(
        BlendMode::new(Mix::Normal, Compose::SrcOver),
        blue_half,
        yellow,
    );
    scene.fill_polygon(
        Fill::NonZero,
        BlendMode::default(),
        white,
        &rect(0.0, 0.0, 16.0, 16.0),
    );
    scene.fill_polygon(
        Fill::NonZero,
        BlendMode::default(),
        mixed,
        &rect(4.0, 4.0, 12.0, 12.0),
    );
    let params = RenderParams::new(16, 16);
    let out = render_pipeline(&mut scene, &params, options());
    let c = unpack4x8unorm(out.pixels[8 * 16 + 8]);
    // Half blue over yellow: roughly (0.5, 0.5, 0.5).
    assert!((c[0] - 0.5).abs() < 3.0 / 255.0);
    assert!((c[1] - 0.5).abs() < 3.0 / 255.0);
    assert!((c[2] - 0.5).abs() < 3.0 / 255.0);
    assert!((c[3] - 1.0).abs() < 1.0 / 255.0);
}

#[test]
fn shape_level_mix_modes_match_reference() {
    let mut scene = Scene::new();
    let programs = scene.programs_mut();
    let grey = programs.solid(Color::rgb8(128, 128, 128));
    let rose = programs.solid(Color::rgba8(220, 80, 120, 200));
    scene.fill_polygon(
        Fill::NonZero,
        BlendMode::default(),
        grey,
        &rect(0.0, 0.0, 32.0, 32.0),
    );
    for (ix, mix) in [Mix::Screen, Mix::Darken, Mix::Difference, Mix::Luminosity]
        .iter()
        .enumerate()
    {
        scene.fill_polygon(
            Fill::NonZero,
            BlendMode::new(*mix, Compose::SrcOver),
            rose,
            &rect(ix as f64 * 8.0, 8.0, ix as f64 * 8.0 + 8.0, 24.0),
        );
    }
    let params = RenderParams::new(32, 32);
    let out = render_pipeline(&mut scene, &params, options());
    let expected = render_reference(&scene, &params);
    compare_images(&out.pixels, &expected, 32, 2).unwrap();
}
