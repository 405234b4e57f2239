// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene encoding for the stipple rasterizer.
//!
//! This crate owns everything that crosses the host/device boundary: the
//! directed-edge geometry and its area/winding math, the shading-program tree
//! with its compiler and binary bytecode form, the GPU record layouts of the
//! coarse/fine handoff, and the configuration and capacity bookkeeping for a
//! dispatch batch.

#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]

pub mod color;
mod config;
mod edge;
mod estimate;
mod instruction;
pub mod math;
mod program;
mod record;
mod resolve;
mod scene;

pub use config::{
    BufferSize, BufferSizes, BumpAllocators, ColorSpaceTag, ConfigUniform, FilterKind, GridInfo,
    RasterOptions, RenderConfig, WorkgroupCounts, WorkgroupSize,
};
pub use edge::{
    area, centroid, closest_distance_to_origin, degrees_balanced, polygon_edges, winding_number,
    with_opposites_removed, with_overlapping_removed, Edge,
};
pub use estimate::BumpEstimate;
pub use instruction::{
    compile, decode, encode, encoded_len, DecodeError, Instruction, Location, OP_BLEND_STOPS,
    OP_COLOR_MATRIX, OP_COLOR_SPACE, OP_COMPOSE_BLEND, OP_JUMP, OP_LINEAR_RATIO, OP_PATH_SELECT,
    OP_PUSH_COLOR, OP_RADIAL_RATIO, OP_RETURN,
};
pub use program::{
    linear_ratio, radial_ratio, EvalContext, Node, NodeId, ProgramArena,
};
pub use record::{
    EdgeSegment, FaceRecord, ShapeInfo, EDGE_FAKE_CORNER, FACE_CONSTANT_COLOR, FACE_EVEN_ODD,
    FACE_FULL_AREA, FACE_NEEDS_CENTROID, FACE_NEEDS_FACE, FACE_NONE,
};
pub use resolve::{resolve, Resolved};
pub use scene::{Scene, Shape};
