// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use crate::color::{color_from_peniko, pack4x8unorm, premultiply};
use crate::estimate::BumpEstimate;
use crate::record::{EdgeSegment, FaceRecord, ShapeInfo};

/// Counters for dynamic allocation during the coarse dispatch.
///
/// The only mutable state shared between thread-groups; all access is via
/// atomic add/exchange. Capacity lives in [`ConfigUniform`], supplied by the
/// caller, never implicit process state.
#[derive(Clone, Copy, Debug, Default, Zeroable, Pod)]
#[repr(C)]
pub struct BumpAllocators {
    /// Nonzero when an allocation would have exceeded its buffer; the
    /// overflowing writes were skipped and the output is degraded.
    pub failed: u32,
    pub faces: u32,
    pub edges: u32,
}

/// Reconstruction filter used to resolve analytic coverage into samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterKind {
    /// Unit box; coverage is the exact pixel area.
    #[default]
    Box,
    /// Tent filter of radius 1.
    Bilinear,
    /// Mitchell-Netravali with B = C = 1/3, radius 2.
    Mitchell,
}

impl FilterKind {
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Box => 0,
            Self::Bilinear => 1,
            Self::Mitchell => 2,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Box),
            1 => Some(Self::Bilinear),
            2 => Some(Self::Mitchell),
            _ => None,
        }
    }

    /// Support radius at scale 1.
    pub fn radius(self) -> f32 {
        match self {
            Self::Box => 0.5,
            Self::Bilinear => 1.0,
            Self::Mitchell => 2.0,
        }
    }
}

/// Color space the scene's colors live in.
///
/// Selects the transfer encoding applied when writing the output image;
/// conversions inside a program use explicit color-space nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorSpaceTag {
    /// Colors are sRGB-encoded; written out unchanged.
    #[default]
    Srgb,
    /// Colors are linear; sRGB-encoded at write-out.
    LinearSrgb,
}

impl ColorSpaceTag {
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Srgb => 0,
            Self::LinearSrgb => 1,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Srgb),
            1 => Some(Self::LinearSrgb),
            _ => None,
        }
    }
}

/// Bin and tile dimensioning, in pixels and bins respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterOptions {
    /// Pixels per bin horizontally.
    pub bin_width: u32,
    /// Pixels per bin vertically.
    pub bin_height: u32,
    /// Bins per tile side; a tile is the square block of bins one coarse
    /// thread-group covers for one shape.
    pub tile_in_bins: u32,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            bin_width: 16,
            bin_height: 16,
            tile_in_bins: 16,
        }
    }
}

/// Grid dimensions derived from the raster size and [`RasterOptions`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GridInfo {
    pub bin_width: u32,
    pub bin_height: u32,
    pub tile_in_bins: u32,
    pub width_in_bins: u32,
    pub height_in_bins: u32,
    pub width_in_tiles: u32,
    pub height_in_tiles: u32,
}

impl GridInfo {
    pub fn new(width: u32, height: u32, options: &RasterOptions) -> Self {
        let width_in_bins = width.div_ceil(options.bin_width);
        let height_in_bins = height.div_ceil(options.bin_height);
        Self {
            bin_width: options.bin_width,
            bin_height: options.bin_height,
            tile_in_bins: options.tile_in_bins,
            width_in_bins,
            height_in_bins,
            width_in_tiles: width_in_bins.div_ceil(options.tile_in_bins),
            height_in_tiles: height_in_bins.div_ceil(options.tile_in_bins),
        }
    }

    pub fn n_bins(&self) -> u32 {
        self.width_in_bins * self.height_in_bins
    }
}

/// Uniform configuration consumed by both kernels.
///
/// One record per dispatch batch; must stay in sync with the kernel-side
/// readers in `stipple_kernels`.
#[derive(Clone, Copy, Debug, Default, Zeroable, Pod)]
#[repr(C)]
pub struct ConfigUniform {
    /// Width of the target in pixels.
    pub target_width: u32,
    /// Height of the target in pixels.
    pub target_height: u32,
    pub bin_width: u32,
    pub bin_height: u32,
    pub tile_in_bins: u32,
    pub width_in_bins: u32,
    pub height_in_bins: u32,
    pub width_in_tiles: u32,
    pub height_in_tiles: u32,
    /// [`FilterKind`] tag.
    pub filter: u32,
    /// Multiplier on the filter's unit radius.
    pub filter_scale: f32,
    /// [`ColorSpaceTag`] for the output encoding.
    pub color_space: u32,
    /// Premultiplied RGBA8 background color.
    pub base_color: u32,
    pub n_shapes: u32,
    /// Capacity of the face buffer, in records.
    pub faces_size: u32,
    /// Capacity of the bin edge buffer, in segments.
    pub edges_size: u32,
}

const_assert_eq!(std::mem::size_of::<ConfigUniform>(), 64);

impl ConfigUniform {
    /// Reconstruction-filter support radius in pixels.
    pub fn filter_radius(&self) -> f32 {
        FilterKind::from_u32(self.filter)
            .unwrap_or_default()
            .radius()
            * self.filter_scale
    }
}

/// Type alias for a workgroup grid size.
pub type WorkgroupSize = (u32, u32, u32);

/// Computed grid sizes for the two dispatches.
#[derive(Copy, Clone, Debug, Default)]
pub struct WorkgroupCounts {
    /// One group per (tile x, tile y, shape).
    pub coarse: WorkgroupSize,
    /// One group per bin.
    pub fine: WorkgroupSize,
}

impl WorkgroupCounts {
    pub fn new(grid: &GridInfo, n_shapes: u32) -> Self {
        Self {
            coarse: (grid.width_in_tiles, grid.height_in_tiles, n_shapes),
            fine: (grid.width_in_bins, grid.height_in_bins, 1),
        }
    }
}

/// Typed buffer size primitive.
#[derive(Copy, Clone, Eq, Default, Debug)]
pub struct BufferSize<T: Sized> {
    len: u32,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Sized> BufferSize<T> {
    /// Creates a buffer size from a number of elements. A zero request is
    /// rounded up to one element so bindings are never empty.
    pub const fn new(len: u32) -> Self {
        Self {
            len: if len > 0 { len } else { 1 },
            _phantom: std::marker::PhantomData,
        }
    }

    /// Number of elements.
    #[expect(clippy::len_without_is_empty, reason = "the buffer is never empty")]
    pub const fn len(self) -> u32 {
        self.len
    }

    /// Size in bytes.
    pub const fn size_in_bytes(self) -> u32 {
        std::mem::size_of::<T>() as u32 * self.len
    }
}

impl<T: Sized> PartialEq for BufferSize<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
    }
}

/// Computed sizes for every buffer of a dispatch batch.
#[derive(Copy, Clone, Debug, Default)]
pub struct BufferSizes {
    // Sized from resolved scene content.
    pub shapes: BufferSize<ShapeInfo>,
    pub scene_edges: BufferSize<EdgeSegment>,
    pub programs: BufferSize<u32>,
    pub bin_heads: BufferSize<u32>,
    pub bump: BufferSize<BumpAllocators>,
    // Bump-allocated buffers, sized by the conservative estimator.
    pub faces: BufferSize<FaceRecord>,
    pub bin_edges: BufferSize<EdgeSegment>,
}

impl BufferSizes {
    pub fn new(
        grid: &GridInfo,
        n_shapes: u32,
        n_scene_edges: u32,
        n_program_words: u32,
        estimate: &BumpEstimate,
    ) -> Self {
        Self {
            shapes: BufferSize::new(n_shapes),
            scene_edges: BufferSize::new(n_scene_edges),
            programs: BufferSize::new(n_program_words),
            bin_heads: BufferSize::new(grid.n_bins()),
            bump: BufferSize::new(1),
            faces: BufferSize::new(estimate.faces),
            bin_edges: BufferSize::new(estimate.edges),
        }
    }
}

/// Host-side configuration for one dispatch batch.
#[derive(Default)]
pub struct RenderConfig {
    /// Uniform record shared by both kernels.
    pub gpu: ConfigUniform,
    /// Workgroup counts for the two dispatches.
    pub workgroup_counts: WorkgroupCounts,
    /// Sizes of all buffer resources.
    pub buffer_sizes: BufferSizes,
}

impl RenderConfig {
    #[expect(clippy::too_many_arguments, reason = "one argument per config concern")]
    pub fn new(
        width: u32,
        height: u32,
        options: &RasterOptions,
        filter: FilterKind,
        filter_scale: f32,
        color_space: ColorSpaceTag,
        base_color: peniko::Color,
        n_shapes: u32,
        n_scene_edges: u32,
        n_program_words: u32,
        estimate: &BumpEstimate,
    ) -> Self {
        let grid = GridInfo::new(width, height, options);
        let buffer_sizes =
            BufferSizes::new(&grid, n_shapes, n_scene_edges, n_program_words, estimate);
        let workgroup_counts = WorkgroupCounts::new(&grid, n_shapes);
        Self {
            gpu: ConfigUniform {
                target_width: width,
                target_height: height,
                bin_width: grid.bin_width,
                bin_height: grid.bin_height,
                tile_in_bins: grid.tile_in_bins,
                width_in_bins: grid.width_in_bins,
                height_in_bins: grid.height_in_bins,
                width_in_tiles: grid.width_in_tiles,
                height_in_tiles: grid.height_in_tiles,
                filter: filter.to_u32(),
                filter_scale,
                color_space: color_space.to_u32(),
                base_color: pack4x8unorm(premultiply(color_from_peniko(base_color))),
                n_shapes,
                faces_size: buffer_sizes.faces.len(),
                edges_size: buffer_sizes.bin_edges.len(),
            },
            workgroup_counts,
            buffer_sizes,
        }
    }
}
