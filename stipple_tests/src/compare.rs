// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use anyhow::{bail, Result};

/// Compares two packed RGBA8 images channelwise.
///
/// Fails listing the worst offender when any channel differs by more than
/// `tolerance` (in 8-bit steps).
pub fn compare_images(result: &[u32], expected: &[u32], width: usize, tolerance: u8) -> Result<()> {
    assert_eq!(result.len(), expected.len());
    let mut worst = 0u8;
    let mut worst_ix = 0;
    let mut failures = 0;
    for (ix, (&a, &b)) in result.iter().zip(expected).enumerate() {
        let mut diff = 0u8;
        for shift in [0, 8, 16, 24] {
            let ca = ((a >> shift) & 0xff) as i32;
            let cb = ((b >> shift) & 0xff) as i32;
            diff = diff.max(ca.abs_diff(cb).min(255) as u8);
        }
        if diff > tolerance {
            failures += 1;
            if diff > worst {
                worst = diff;
                worst_ix = ix;
            }
        }
    }
    if failures > 0 {
        bail!(
            "{failures} pixels differ beyond tolerance {tolerance}; worst at ({}, {}): {:#010x} vs {:#010x} (diff {worst})",
            worst_ix % width,
            worst_ix / width,
            result[worst_ix],
            expected[worst_ix],
        );
    }
    Ok(())
}
