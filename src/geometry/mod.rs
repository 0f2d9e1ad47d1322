//! Shapes and affine transformations.
//!
//! All shapes are unit-sized and centered on the origin; their actual size
//! and placement in the scene come from an associated [`Transformation`].
//! This keeps containment tests trivial and pushes all scaling and rotation
//! into one well-tested code path.

mod transformation;

pub use transformation::{RotationOrder, Transformation};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Canonical unit shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    /// A cube of side length 1 centered on the origin.
    Cube,
    /// A z-axis-aligned cylinder of radius 0.5 and height 1 centered on the
    /// origin.
    Cylinder,
    /// A sphere of radius 0.5 centered on the origin.
    Sphere,
    /// A single point at the origin. Has no volume; containment is always
    /// false.
    Point,
    /// A non-existent geometry. Containment is always false.
    None,
}

/// A unit shape with containment tests in its own local frame.
///
/// Positions passed to [`Geometry::contains`] must already be local to the
/// geometry, i.e. inside the cube spanning (-0.5, -0.5, -0.5) to
/// (0.5, 0.5, 0.5) when they are inside the shape at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub shape: Shape,
}

impl Geometry {
    pub fn new(shape: Shape) -> Self {
        Self { shape }
    }

    /// Whether a local position lies inside this unit shape.
    pub fn contains(&self, local: &Vector3<f64>) -> bool {
        if !Self::inside_unit_box(local) {
            return false;
        }
        match self.shape {
            Shape::Cube => true,
            // 0.25 = 0.5^2
            Shape::Cylinder => local.x * local.x + local.y * local.y <= 0.25,
            Shape::Sphere => local.norm_squared() <= 0.25,
            Shape::Point | Shape::None => false,
        }
    }

    /// Cheap rejection test against the unit bounding box shared by all
    /// shapes.
    pub fn inside_unit_box(local: &Vector3<f64>) -> bool {
        (-0.5..=0.5).contains(&local.x)
            && (-0.5..=0.5).contains(&local.y)
            && (-0.5..=0.5).contains(&local.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_contains_interior_and_surface() {
        let cube = Geometry::new(Shape::Cube);
        assert!(cube.contains(&Vector3::new(0.0, 0.0, 0.0)));
        assert!(cube.contains(&Vector3::new(0.5, -0.5, 0.5)));
        assert!(!cube.contains(&Vector3::new(0.51, 0.0, 0.0)));
    }

    #[test]
    fn cylinder_is_round_in_xy_only() {
        let cyl = Geometry::new(Shape::Cylinder);
        // Corner of the bounding box lies outside the circular cross section.
        assert!(!cyl.contains(&Vector3::new(0.45, 0.45, 0.0)));
        // On the axis, any height within the box is inside.
        assert!(cyl.contains(&Vector3::new(0.0, 0.0, 0.49)));
        assert!(cyl.contains(&Vector3::new(0.5, 0.0, 0.0)));
    }

    #[test]
    fn sphere_excludes_cylinder_edge() {
        let sphere = Geometry::new(Shape::Sphere);
        assert!(sphere.contains(&Vector3::new(0.0, 0.0, 0.5)));
        assert!(!sphere.contains(&Vector3::new(0.4, 0.0, 0.4)));
    }

    #[test]
    fn point_and_none_never_contain() {
        assert!(!Geometry::new(Shape::Point).contains(&Vector3::zeros()));
        assert!(!Geometry::new(Shape::None).contains(&Vector3::zeros()));
    }
}
