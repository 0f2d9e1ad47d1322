//! Velocity interpolation over unstructured cell-centre samples.
//!
//! Two families are available: plain nearest-cell lookup, and a modified
//! Shepard scheme (inverse distance weighting with Franke–Little weights)
//! over the nine nearest cells. Interpolation never extrapolates: queries
//! outside the field's padded bounding volume, or past a wall face of a
//! boundary cell, yield [`FlowQuery::OutOfField`] and leave the fallback
//! policy to the caller.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::fields::index::SpatialIndex;
use crate::fields::vector_field::VectorField;

/// Number of neighbours considered by the modified Shepard scheme.
const SHEPARD_NEIGHBOURS: usize = 9;

/// Distance below which a query is treated as sitting exactly on a sample.
const EXACT_HIT_TOLERANCE: f64 = 1e-10;

/// Result of a flow query.
///
/// `OutOfField` is not an error. It marks a position the field cannot speak
/// for, and the calling object decides what that means (zero flow, an
/// analytical fallback, ...).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowQuery {
    Velocity(Vector3<f64>),
    OutOfField,
}

impl FlowQuery {
    /// The velocity, with out-of-field collapsed to a given fallback.
    pub fn unwrap_or(self, fallback: Vector3<f64>) -> Vector3<f64> {
        match self {
            FlowQuery::Velocity(v) => v,
            FlowQuery::OutOfField => fallback,
        }
    }

    pub fn is_out_of_field(&self) -> bool {
        matches!(self, FlowQuery::OutOfField)
    }
}

/// Selectable interpolation method, fixed per simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Velocity of the nearest cell centre.
    NearestNeighbor,
    /// Modified Shepard over the nearest cells, linear weight power.
    #[default]
    ModifiedShepardLinear,
    ModifiedShepardSquared,
    ModifiedShepardCubed,
    ModifiedShepardFourth,
}

impl Interpolation {
    fn shepard_power(self) -> Option<i32> {
        match self {
            Interpolation::NearestNeighbor => None,
            Interpolation::ModifiedShepardLinear => Some(1),
            Interpolation::ModifiedShepardSquared => Some(2),
            Interpolation::ModifiedShepardCubed => Some(3),
            Interpolation::ModifiedShepardFourth => Some(4),
        }
    }
}

/// Interpolate the flow at a position local to the field's mesh frame.
///
/// `index` must have been built over `field.cell_centres`. The result is a
/// local-frame velocity; mapping into the scene frame is the caller's job.
pub fn interpolate(
    field: &VectorField,
    index: &SpatialIndex,
    local: &Vector3<f64>,
    method: Interpolation,
) -> FlowQuery {
    if field.is_empty() || !field.in_bounds(local) {
        return FlowQuery::OutOfField;
    }
    match method.shepard_power() {
        None => nearest_neighbor(field, index, local),
        Some(power) => modified_shepard(field, index, local, power),
    }
}

fn nearest_neighbor(
    field: &VectorField,
    index: &SpatialIndex,
    local: &Vector3<f64>,
) -> FlowQuery {
    match index.nearest(local) {
        Some((id, _)) => FlowQuery::Velocity(field.flow[id]),
        None => FlowQuery::OutOfField,
    }
}

fn modified_shepard(
    field: &VectorField,
    index: &SpatialIndex,
    local: &Vector3<f64>,
    power: i32,
) -> FlowQuery {
    let neighbours = index.k_nearest(local, SHEPARD_NEIGHBOURS);
    let Some(&(closest_id, closest_distance)) = neighbours.first() else {
        return FlowQuery::OutOfField;
    };
    if closest_distance < EXACT_HIT_TOLERANCE {
        // Exactly on a sample; no weighting needed.
        return FlowQuery::Velocity(field.flow[closest_id]);
    }

    if field.at_boundary[closest_id] {
        return boundary_cell_flow(field, closest_id, local);
    }

    // Franke-Little weights: (1/d - 1/R)^p with R the distance of the
    // farthest neighbour, normalized to sum to 1. The weight of the
    // farthest neighbour vanishes, which keeps the interpolant continuous
    // as the neighbour set changes along a path.
    let radius = neighbours
        .iter()
        .map(|&(_, d)| d)
        .fold(0.0_f64, f64::max);
    let mut weight_sum = 0.0;
    let mut velocity = Vector3::zeros();
    for &(id, distance) in &neighbours {
        let weight = (1.0 / distance - 1.0 / radius).powi(power);
        weight_sum += weight;
        velocity += field.flow[id] * weight;
    }
    if weight_sum <= 0.0 {
        // All neighbours equidistant; fall back to the closest sample.
        return FlowQuery::Velocity(field.flow[closest_id]);
    }
    FlowQuery::Velocity(velocity / weight_sum)
}

/// Inside a boundary cell the flow is tapered linearly towards the wall:
/// the cell's sample velocity is scaled by the smallest remaining
/// centre-to-wall fraction. Past the wall there is no flow to report.
fn boundary_cell_flow(field: &VectorField, cell_id: usize, local: &Vector3<f64>) -> FlowQuery {
    let Some(faces) = field.boundary_faces.get(&cell_id) else {
        return FlowQuery::Velocity(field.flow[cell_id]);
    };
    let mut minimum_ratio = f64::INFINITY;
    for face in faces {
        minimum_ratio = minimum_ratio.min(face.wall_ratio(local));
    }
    if minimum_ratio < 0.0 {
        FlowQuery::OutOfField
    } else {
        FlowQuery::Velocity(field.flow[cell_id] * minimum_ratio.min(1.0))
    }
}
