//! Per-object flow queries against a placed vector field.
//!
//! A [`VectorFieldManager`] couples an immutable field with the owning
//! object's transformation. Queries arrive in global coordinates, are mapped
//! into the mesh frame, interpolated there, and the resulting velocity is
//! mapped back as a direction (rotation and scale, no translation).

use std::sync::Arc;

use nalgebra::Vector3;
use rayon::prelude::*;

use crate::fields::index::SpatialIndex;
use crate::fields::interpolation::{self, FlowQuery, Interpolation};
use crate::fields::vector_field::VectorField;
use crate::geometry::Transformation;

#[derive(Debug, Clone)]
pub struct VectorFieldManager {
    field: Arc<VectorField>,
    transformation: Transformation,
    index: SpatialIndex,
}

impl VectorFieldManager {
    pub fn new(field: Arc<VectorField>, transformation: Transformation) -> Self {
        let index = SpatialIndex::build(field.cell_centres.clone());
        Self {
            field,
            transformation,
            index,
        }
    }

    pub fn field(&self) -> &Arc<VectorField> {
        &self.field
    }

    pub fn cell_count(&self) -> usize {
        self.field.len()
    }

    /// Interpolated flow at a global position, as a global-frame velocity.
    pub fn flow_at(&self, position_global: &Vector3<f64>, method: Interpolation) -> FlowQuery {
        let local = self.transformation.apply_inverse_to_point(position_global);
        match interpolation::interpolate(&self.field, &self.index, &local, method) {
            FlowQuery::Velocity(local_flow) => {
                FlowQuery::Velocity(self.transformation.apply_to_direction(&local_flow))
            }
            FlowQuery::OutOfField => FlowQuery::OutOfField,
        }
    }

    /// Index of the cell centre nearest to a global position.
    pub fn closest_cell(&self, position_global: &Vector3<f64>) -> Option<usize> {
        let local = self.transformation.apply_inverse_to_point(position_global);
        self.index.nearest(&local).map(|(id, _)| id)
    }

    /// All cell ids whose centre lies within `radius` (in global units) of
    /// a global position. Used for sensor subscription range queries.
    pub fn cells_within_radius(&self, centre_global: &Vector3<f64>, radius: f64) -> Vec<usize> {
        let local = self.transformation.apply_inverse_to_point(centre_global);
        // A global ball maps to an ellipsoid in the mesh frame; widen the
        // local radius by the smallest scale component so the query never
        // misses a cell. Over-inclusion is harmless, containment is
        // re-checked by the caller.
        let min_scale = self
            .transformation
            .scaling()
            .iter()
            .fold(f64::INFINITY, |acc, &s| acc.min(s.abs()))
            .max(1e-12);
        let local_radius = radius / min_scale.min(1.0);
        self.index.within_radius(&local, local_radius)
    }

    /// Cell centre position in global coordinates.
    pub fn cell_centre_global(&self, cell_id: usize) -> Vector3<f64> {
        self.transformation
            .apply_to_point(&self.field.cell_centres[cell_id])
    }

    /// All cell centres transformed into global coordinates. This allocates
    /// a fresh vector on every call; bulk consumers should hold onto it.
    pub fn cell_centres_global(&self) -> Vec<Vector3<f64>> {
        self.field
            .cell_centres
            .par_iter()
            .map(|c| self.transformation.apply_to_point(c))
            .collect()
    }
}
