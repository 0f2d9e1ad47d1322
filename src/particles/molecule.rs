//! The particle data model.

use std::collections::BTreeMap;

use nalgebra::Vector3;

use crate::scene::{ObjectId, SceneManager};

/// Stable particle identifier, assigned by the [`super::MoleculeManager`]
/// when a staged insertion is committed.
pub type MoleculeId = u64;

/// A discrete particle advected through the scene.
#[derive(Debug, Clone)]
pub struct Molecule {
    /// Stable id; `u64::MAX` until the manager commits the insertion.
    pub id: MoleculeId,
    /// Position in the global frame.
    pub position: Vector3<f64>,
    /// Intrinsic drift velocity, added on top of the flow displacement.
    pub velocity: Vector3<f64>,
    /// The object whose flow currently governs this molecule. A tag, not
    /// ownership; reassigned by teleporting sensors.
    pub object_id: Option<ObjectId>,
    /// Nearest cell in the owning object's mesh, maintained on every
    /// position commit. `None` for meshless objects.
    pub cell_id: Option<usize>,
    /// Scalar attributes attached by sensors (e.g. a measured
    /// susceptibility sample).
    pub attributes: BTreeMap<String, f64>,
}

impl Molecule {
    pub const UNASSIGNED_ID: MoleculeId = MoleculeId::MAX;

    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>, object_id: Option<ObjectId>) -> Self {
        Self {
            id: Self::UNASSIGNED_ID,
            position,
            velocity,
            object_id,
            cell_id: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Commit a new position and refresh the nearest-cell tag against the
    /// owning object's mesh.
    pub fn commit_position(&mut self, new_position: Vector3<f64>, scene: &SceneManager) {
        self.position = new_position;
        self.refresh_cell(scene);
    }

    /// Re-resolve the nearest-cell tag, e.g. after a teleport changed the
    /// owning object.
    pub fn refresh_cell(&mut self, scene: &SceneManager) {
        if let Some(object_id) = self.object_id {
            if let Some(cell) = scene.closest_cell(object_id, &self.position) {
                self.cell_id = Some(cell);
            }
        }
    }

    pub fn set_attribute(&mut self, name: &str, value: f64) {
        self.attributes.insert(name.to_string(), value);
    }

    pub fn attribute(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).copied()
    }
}
