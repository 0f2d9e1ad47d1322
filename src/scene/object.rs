//! The flow-object capability interface.
//!
//! A flow object is a geometric region of the scene with an associated
//! velocity source: a meshed CFD field, an analytical profile, or nothing
//! at all (pumps). Objects expose their flow in global coordinates, named
//! inlet/outlet zones for stitching segments together, and react to
//! flow-rate changes arriving from upstream.

use std::fmt;
use std::path::Path;

use nalgebra::Vector3;

use crate::error::Result;
use crate::fields::{FieldStore, FlowQuery, Interpolation, VectorFieldManager};
use crate::geometry::{Geometry, Transformation};
use crate::kernel::{InitStage, NotificationStage, SimulationClock};

/// Index of an object in the scene's registration order.
pub type ObjectId = usize;

/// What a flow query should collapse to where the field cannot answer,
/// e.g. in the gap between the mesh wall and the bounding shape, or in a
/// region no object covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfFieldPolicy {
    /// No flow: the molecule freezes until a sensor acts on it.
    #[default]
    ZeroVelocity,
}

/// A downstream flow-rate change to be propagated by the scene:
/// (outlet name, new rate in ml/min).
pub type OutletRateChange = (String, f64);

/// Shared context handed to objects during the staged initialization.
pub struct ObjectInitContext<'a> {
    pub store: &'a mut FieldStore,
    pub interpolation: Interpolation,
    pub results_dir: &'a Path,
}

/// Capability interface of everything that occupies the scene.
pub trait FlowObject: fmt::Debug {
    /// Unique component name within the scene.
    fn name(&self) -> &str;

    fn object_id(&self) -> ObjectId;

    /// Called once by the scene when the object is registered.
    fn assign_id(&mut self, id: ObjectId);

    /// Placement of the object's local frame in the scene.
    fn transformation(&self) -> &Transformation;

    /// Whether fluid inside this object is currently moving.
    fn is_active(&self) -> bool;

    fn inlets(&self) -> &[String];

    fn outlets(&self) -> &[String];

    /// Staged initialization hook. Stages arrive in their fixed global
    /// order; objects act on the ones they care about.
    fn initialize(&mut self, _stage: InitStage, _ctx: &mut ObjectInitContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Flow velocity at a global position, in the global frame, with this
    /// object's out-of-field policy already applied. Inactive objects
    /// report zero flow.
    fn flow_at(&self, position_global: &Vector3<f64>, sim_time: f64) -> Vector3<f64>;

    /// The mesh-backed field manager, when there is one.
    fn field_manager(&self) -> Option<&VectorFieldManager>;

    /// Nearest mesh cell to a global position; `None` for meshless objects.
    fn closest_cell(&self, position_global: &Vector3<f64>) -> Option<usize> {
        self.field_manager().and_then(|m| m.closest_cell(position_global))
    }

    /// Bounding shape of this object in the scene, for position-to-object
    /// resolution.
    fn bounds(&self) -> Option<(Geometry, Transformation)>;

    /// Shape and placement of a named outlet zone (the region a teleporting
    /// sensor watches).
    fn outlet_area(&self, outlet: &str) -> Result<(Geometry, Transformation)>;

    /// Rigid frame whose origin sits on the outlet plane with +z pointing
    /// downstream. Offsets in this frame survive a teleport unchanged.
    fn outlet_frame(&self, outlet: &str) -> Result<Transformation>;

    /// Rigid frame whose origin sits on the inlet plane with +z pointing
    /// into the object. Counterpart of [`FlowObject::outlet_frame`].
    fn inlet_frame(&self, inlet: &str) -> Result<Transformation>;

    /// React to a changed inlet flow rate: update internal state, reload a
    /// differently sized field if needed, and report which outlet rates
    /// changed so the scene can continue the propagation.
    fn set_inlet_flow_rate(
        &mut self,
        store: &mut FieldStore,
        inlet: &str,
        rate_mlpmin: f64,
    ) -> Result<Vec<OutletRateChange>>;

    /// Seed this object's flow state from its configured rates during the
    /// flow-system setup stage. Returns outlet changes to propagate.
    fn prime_flow_system(&mut self, store: &mut FieldStore) -> Result<Vec<OutletRateChange>>;

    /// Per-base-step hook for self-actuating objects (pumps). Returns
    /// outlet changes to propagate.
    fn on_time_step(
        &mut self,
        _clock: &SimulationClock,
        _stage: NotificationStage,
    ) -> Vec<OutletRateChange> {
        Vec::new()
    }
}

/// Helper shared by mesh-backed objects: a flow query against the manager
/// with the out-of-field policy applied.
pub(crate) fn resolve_flow(
    manager: Option<&VectorFieldManager>,
    position_global: &Vector3<f64>,
    interpolation: Interpolation,
    policy: OutOfFieldPolicy,
) -> Vector3<f64> {
    let Some(manager) = manager else {
        return Vector3::zeros();
    };
    match manager.flow_at(position_global, interpolation) {
        FlowQuery::Velocity(v) => v,
        FlowQuery::OutOfField => match policy {
            OutOfFieldPolicy::ZeroVelocity => Vector3::zeros(),
        },
    }
}
