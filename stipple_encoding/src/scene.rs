// Copyright 2026 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use peniko::kurbo;
use peniko::{BlendMode, Fill};

use crate::edge::{polygon_edges, Edge};
use crate::math::Vec2;
use crate::program::{NodeId, ProgramArena};

/// One filled region: closed edge list, shading program and compositing
/// state.
#[derive(Clone, Debug)]
pub struct Shape {
    pub edges: Vec<Edge>,
    pub program: NodeId,
    pub blend: BlendMode,
    pub fill: Fill,
}

/// The input to a render: an ordered shape list plus the program arena the
/// shapes' ids point into.
///
/// Geometry and programs are encoded once per frame by
/// [`resolve`](crate::resolve::resolve) and are read-only on the device side.
#[derive(Default)]
pub struct Scene {
    shapes: Vec<Shape>,
    arena: ProgramArena,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes all shapes, keeping the interned programs for reuse.
    pub fn reset(&mut self) {
        self.shapes.clear();
    }

    pub fn programs(&self) -> &ProgramArena {
        &self.arena
    }

    pub fn programs_mut(&mut self) -> &mut ProgramArena {
        &mut self.arena
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    /// Fills the closed polygon given by `points`, in paint order.
    pub fn fill_polygon(
        &mut self,
        fill: Fill,
        blend: impl Into<BlendMode>,
        program: NodeId,
        points: &[kurbo::Point],
    ) {
        let points: Vec<Vec2> = points.iter().map(|p| Vec2::from_kurbo(*p)).collect();
        self.fill_edges(fill, blend, program, polygon_edges(&points));
    }

    /// Fills a raw closed edge list.
    pub fn fill_edges(
        &mut self,
        fill: Fill,
        blend: impl Into<BlendMode>,
        program: NodeId,
        edges: Vec<Edge>,
    ) {
        self.shapes.push(Shape {
            edges,
            program,
            blend: blend.into(),
            fill,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::Color;

    #[test]
    fn shapes_keep_paint_order() {
        let mut scene = Scene::new();
        let red = scene.programs_mut().solid(Color::rgb8(255, 0, 0));
        let blue = scene.programs_mut().solid(Color::rgb8(0, 0, 255));
        scene.fill_polygon(
            Fill::NonZero,
            BlendMode::default(),
            red,
            &[
                kurbo::Point::new(0.0, 0.0),
                kurbo::Point::new(4.0, 0.0),
                kurbo::Point::new(4.0, 4.0),
                kurbo::Point::new(0.0, 4.0),
            ],
        );
        scene.fill_polygon(
            Fill::EvenOdd,
            BlendMode::default(),
            blue,
            &[
                kurbo::Point::new(1.0, 1.0),
                kurbo::Point::new(3.0, 1.0),
                kurbo::Point::new(3.0, 3.0),
                kurbo::Point::new(1.0, 3.0),
            ],
        );
        assert_eq!(scene.shapes().len(), 2);
        assert_eq!(scene.shapes()[0].program, red);
        assert_eq!(scene.shapes()[1].fill, Fill::EvenOdd);
        assert_eq!(scene.shapes()[0].edges.len(), 4);
        scene.reset();
        assert!(scene.shapes().is_empty());
        assert!(!scene.programs().is_empty());
    }
}
