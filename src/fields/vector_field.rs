//! In-memory representation of a parsed flow field.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One wall face of a boundary cell.
///
/// Faces carry enough information to measure how far a query position has
/// strayed towards the mesh wall: a point on the face plane, the unit
/// normal, and the signed distance from the owning cell's centre to the
/// plane. A query position is on the wall side of the plane exactly when
/// its signed distance and `distance_to_centre` have opposite signs, so the
/// ratio of the two is the scale-free "how close to the wall" measure used
/// by the interpolator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub position: Vector3<f64>,
    pub normal: Vector3<f64>,
    pub distance_to_centre: f64,
}

impl Face {
    /// Signed distance from a position to this face plane, with the same
    /// sign convention as `distance_to_centre`.
    pub fn signed_distance(&self, position: &Vector3<f64>) -> f64 {
        self.normal.dot(&(position - self.position))
    }

    /// Fraction of the centre-to-wall distance still ahead of `position`.
    /// 1 at the cell centre, 0 on the wall plane, negative past the wall.
    pub fn wall_ratio(&self, position: &Vector3<f64>) -> f64 {
        self.signed_distance(position) / self.distance_to_centre
    }
}

/// A static spatial sampling of fluid velocity, immutable after load.
///
/// Cell centres and flow vectors are stored in local mesh coordinates;
/// placement in the scene is the job of the owning object's transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorField {
    pub cell_centres: Vec<Vector3<f64>>,
    pub flow: Vec<Vector3<f64>>,
    /// Whether the cell with the same index touches a wall patch.
    pub at_boundary: Vec<bool>,
    /// Wall faces per boundary cell index.
    pub boundary_faces: BTreeMap<usize, Vec<Face>>,
    /// Axis-aligned bounds of the cell centres, padded by one mean cell
    /// spacing so that near-wall queries still resolve, while queries well
    /// outside the mesh short-circuit to an out-of-field result.
    pub bounds_min: Vector3<f64>,
    pub bounds_max: Vector3<f64>,
}

impl VectorField {
    /// Assemble a field from parsed samples, deriving boundary flags and
    /// padded bounds.
    pub fn new(
        cell_centres: Vec<Vector3<f64>>,
        flow: Vec<Vector3<f64>>,
        boundary_faces: BTreeMap<usize, Vec<Face>>,
    ) -> Self {
        let at_boundary = (0..cell_centres.len())
            .map(|i| boundary_faces.contains_key(&i))
            .collect();
        let (bounds_min, bounds_max) = padded_bounds(&cell_centres);
        Self {
            cell_centres,
            flow,
            at_boundary,
            boundary_faces,
            bounds_min,
            bounds_max,
        }
    }

    pub fn len(&self) -> usize {
        self.cell_centres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_centres.is_empty()
    }

    /// Whether a local position lies within the padded bounding volume.
    pub fn in_bounds(&self, local: &Vector3<f64>) -> bool {
        (0..3).all(|i| local[i] >= self.bounds_min[i] && local[i] <= self.bounds_max[i])
    }

    /// Mean nearest-sample spacing estimate, derived from the bounding
    /// volume and the sample count.
    pub fn mean_spacing(&self) -> f64 {
        crate::fields::index::mean_spacing(&self.cell_centres)
    }
}

fn padded_bounds(points: &[Vector3<f64>]) -> (Vector3<f64>, Vector3<f64>) {
    if points.is_empty() {
        return (Vector3::zeros(), Vector3::zeros());
    }
    let mut min = points[0];
    let mut max = points[0];
    for p in points {
        min = min.inf(p);
        max = max.sup(p);
    }
    let pad = Vector3::repeat(crate::fields::index::mean_spacing(points));
    (min - pad, max + pad)
}
