// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Buffer provisioning and kernel dispatch.

use std::cell::RefCell;

use stipple_encoding::{
    decode, resolve, BumpAllocators, RasterOptions, Scene, WorkgroupSize, FACE_NONE,
};
use stipple_kernels::{coarse, fine, CpuBinding, CpuTexture};

use crate::{Error, RenderParams, RenderStats, Result};

/// Launches one compute kernel over a workgroup grid.
///
/// The grid is flattened to a single count; the kernels derive their own
/// geometry from the bound config. Each dispatch runs to completion before
/// the function returns, which models the driver-level pipeline barrier
/// between dependent dispatches.
fn dispatch(
    kernel: fn(u32, &[CpuBinding<'_>]),
    workgroups: WorkgroupSize,
    resources: &[CpuBinding<'_>],
) {
    let n_wg = workgroups.0 * workgroups.1 * workgroups.2;
    kernel(n_wg, resources);
}

pub(crate) fn render_to_texture(
    options: &RasterOptions,
    scene: &mut Scene,
    texture: &mut CpuTexture,
    params: &RenderParams,
) -> Result<RenderStats> {
    if texture.width != params.width as usize || texture.height != params.height as usize {
        return Err(Error::TextureSizeMismatch {
            texture_width: texture.width,
            texture_height: texture.height,
            width: params.width,
            height: params.height,
        });
    }
    let resolved = resolve(
        scene,
        params.width,
        params.height,
        options,
        params.filter,
        params.filter_scale,
        params.color_space,
        params.base_color,
    );
    // Decode the whole program buffer before anything is dispatched; a
    // program that fails here aborts the render rather than reaching the
    // interpreter.
    decode(&resolved.programs)?;

    let sizes = &resolved.config.buffer_sizes;
    let config_bytes = bytemuck::bytes_of(&resolved.config.gpu).to_vec();
    let shape_bytes = pad_buffer(bytemuck::cast_slice(&resolved.shapes), sizes.shapes.size_in_bytes());
    let scene_edge_bytes = pad_buffer(
        bytemuck::cast_slice(&resolved.scene_edges),
        sizes.scene_edges.size_in_bytes(),
    );
    let program_bytes = pad_buffer(
        bytemuck::cast_slice(&resolved.programs),
        sizes.programs.size_in_bytes(),
    );
    let bin_heads = RefCell::new(bytemuck::cast_slice(&vec![FACE_NONE; sizes.bin_heads.len() as usize]).to_vec());
    let faces = RefCell::new(vec![0u8; sizes.faces.size_in_bytes() as usize]);
    let bin_edges = RefCell::new(vec![0u8; sizes.bin_edges.size_in_bytes() as usize]);
    let bump = RefCell::new(vec![0u8; std::mem::size_of::<BumpAllocators>()]);

    dispatch(
        coarse,
        resolved.config.workgroup_counts.coarse,
        &[
            CpuBinding::Buffer(&config_bytes),
            CpuBinding::Buffer(&shape_bytes),
            CpuBinding::Buffer(&scene_edge_bytes),
            CpuBinding::BufferRW(&bin_heads),
            CpuBinding::BufferRW(&faces),
            CpuBinding::BufferRW(&bin_edges),
            CpuBinding::BufferRW(&bump),
        ],
    );

    let target = RefCell::new(std::mem::replace(texture, CpuTexture::new(0, 0)));
    dispatch(
        fine,
        resolved.config.workgroup_counts.fine,
        &[
            CpuBinding::Buffer(&config_bytes),
            CpuBinding::Buffer(&program_bytes),
            CpuBinding::BufferRW(&faces),
            CpuBinding::BufferRW(&bin_edges),
            CpuBinding::BufferRW(&bin_heads),
            CpuBinding::Texture(&target),
        ],
    );
    *texture = target.into_inner();

    // Host-visible readback of the bump counters.
    let bump: BumpAllocators = *bytemuck::from_bytes(&bump.borrow());
    if bump.failed != 0 {
        log::error!(
            "bump allocator overflow: needed {} faces / {} edges, provisioned {} / {}; output is degraded",
            bump.faces,
            bump.edges,
            resolved.config.gpu.faces_size,
            resolved.config.gpu.edges_size,
        );
    }
    Ok(RenderStats {
        failed: bump.failed != 0,
        faces: bump.faces,
        edges: bump.edges,
    })
}

/// Pads a buffer's bytes up to its provisioned size (buffers are never
/// zero-sized).
fn pad_buffer(bytes: &[u8], size: u32) -> Vec<u8> {
    let mut out = bytes.to_vec();
    out.resize(out.len().max(size as usize), 0);
    out
}
