//! Mesh-backed straight tube.
//!
//! The underlying CFD mesh is longer than the usable tube: its first
//! segment (the inlet development zone) is where the numerical flow profile
//! has not yet settled into the analytical one, so the object shifts itself
//! along its axis to hide that segment. Each flow rate maps to its own
//! precomputed case; a rate change swaps the loaded field.

use log::warn;
use nalgebra::Vector3;

use crate::error::{Result, SimulationError};
use crate::fields::{FieldKey, FieldStore, Interpolation, VectorFieldManager};
use crate::geometry::{Geometry, Shape, Transformation};
use crate::kernel::InitStage;
use crate::scene::object::{
    resolve_flow, FlowObject, ObjectId, ObjectInitContext, OutOfFieldPolicy, OutletRateChange,
};

/// Construction parameters for a [`Tube`].
#[derive(Debug, Clone)]
pub struct TubeConfig {
    pub name: String,
    pub translation: Vector3<f64>,
    pub rotation: Vector3<f64>,
    pub scale: Vector3<f64>,
    /// Tube radius in m.
    pub radius: f64,
    /// Usable tube length in m.
    pub length: f64,
    /// Length of the inlet development zone cut off the mesh, in m.
    pub inlet_zone: f64,
    /// Length of the outlet teleport zone at the end of the tube, in m.
    pub outlet_zone: f64,
    /// Flow rate in ml/min.
    pub flow_rate_mlpmin: f64,
    /// Mesh resolution identifier of the precomputed cases.
    pub mesh_resolution: u32,
    /// Optional case variant suffix.
    pub variant: String,
    /// Length of the meshed geometry in m; must cover `length + inlet_zone`.
    pub mesh_length: f64,
    pub out_of_field_policy: OutOfFieldPolicy,
}

impl Default for TubeConfig {
    fn default() -> Self {
        Self {
            name: "tube".into(),
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            radius: 0.00075,
            length: 0.05,
            inlet_zone: 0.05,
            outlet_zone: 0.005,
            flow_rate_mlpmin: 5.0,
            mesh_resolution: 11,
            variant: String::new(),
            mesh_length: 0.15,
            out_of_field_policy: OutOfFieldPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct Tube {
    config: TubeConfig,
    object_id: ObjectId,
    /// Scene placement including the inlet-zone shift along the local axis.
    transformation: Transformation,
    manager: Option<VectorFieldManager>,
    interpolation: Interpolation,
    flow_rate_mlpmin: f64,
    is_active: bool,
    inlets: Vec<String>,
    outlets: Vec<String>,
}

impl Tube {
    pub fn new(config: TubeConfig) -> Self {
        let transformation =
            Transformation::new(config.translation, config.rotation, config.scale);
        let flow_rate = config.flow_rate_mlpmin;
        Self {
            config,
            object_id: usize::MAX,
            transformation,
            manager: None,
            interpolation: Interpolation::default(),
            flow_rate_mlpmin: flow_rate,
            is_active: flow_rate.abs() > 1e-20,
            inlets: vec!["inlet".to_string()],
            outlets: vec!["outlet".to_string()],
        }
    }

    pub fn flow_rate_mlpmin(&self) -> f64 {
        self.flow_rate_mlpmin
    }

    fn field_key(&self, flow_rate_mlpmin: f64) -> FieldKey {
        FieldKey::tube(
            self.config.radius,
            self.config.mesh_length,
            flow_rate_mlpmin,
            self.config.mesh_resolution,
            &self.config.variant,
        )
    }

    fn load_field(&mut self, store: &mut FieldStore) -> Result<()> {
        if !self.is_active {
            // An idle tube has no flow; loading an all-zero field would
            // only cost memory.
            return Ok(());
        }
        let key = self.field_key(self.flow_rate_mlpmin);
        let field = store.load(&key)?;
        if let Some(previous) = &self.manager {
            if previous.cell_count() != field.len() {
                return Err(SimulationError::GeometryMismatch {
                    key: key.to_string(),
                    reason: format!(
                        "reloaded mesh has {} cells, previous had {}",
                        field.len(),
                        previous.cell_count()
                    ),
                });
            }
        }
        self.manager = Some(VectorFieldManager::new(field, self.transformation.clone()));
        Ok(())
    }

    /// Frame with its origin on the tube axis at local height `z`, sharing
    /// the tube's orientation.
    fn axis_frame(&self, z: f64) -> Result<Transformation> {
        self.transformation
            .then_after(&Transformation::new(
                Vector3::new(0.0, 0.0, z),
                Vector3::zeros(),
                Vector3::new(1.0, 1.0, 1.0),
            ))
    }
}

impl FlowObject for Tube {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn object_id(&self) -> ObjectId {
        self.object_id
    }

    fn assign_id(&mut self, id: ObjectId) {
        self.object_id = id;
    }

    fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn inlets(&self) -> &[String] {
        &self.inlets
    }

    fn outlets(&self) -> &[String] {
        &self.outlets
    }

    fn initialize(&mut self, stage: InitStage, ctx: &mut ObjectInitContext<'_>) -> Result<()> {
        match stage {
            InitStage::CheckArguments => {
                self.interpolation = ctx.interpolation;
                if self.config.length + self.config.inlet_zone > self.config.mesh_length {
                    return Err(SimulationError::Configuration(format!(
                        "tube \"{}\": length {} m plus inlet zone {} m exceeds \
                         the meshed length of {} m",
                        self.config.name,
                        self.config.length,
                        self.config.inlet_zone,
                        self.config.mesh_length
                    )));
                }
                let scaling = self.transformation.scaling();
                if scaling.iter().any(|&s| !(0.999..=1.001).contains(&s)) {
                    warn!(
                        "tube \"{}\" is scaled by {:?}; the mesh already has \
                         an inherent scale from the flow computation",
                        self.config.name, scaling
                    );
                }
                // Shift along the local axis so the inlet development zone
                // of the mesh lies before the configured tube start.
                self.transformation = self.transformation.then_after(&Transformation::new(
                    Vector3::new(0.0, 0.0, -self.config.inlet_zone),
                    Vector3::zeros(),
                    Vector3::new(1.0, 1.0, 1.0),
                ))?;
            }
            InitStage::CreateDataStructures => {
                self.load_field(ctx.store)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn flow_at(&self, position_global: &Vector3<f64>, _sim_time: f64) -> Vector3<f64> {
        if !self.is_active {
            return Vector3::zeros();
        }
        resolve_flow(
            self.manager.as_ref(),
            position_global,
            self.interpolation,
            self.config.out_of_field_policy,
        )
    }

    fn field_manager(&self) -> Option<&VectorFieldManager> {
        if !self.is_active {
            return None;
        }
        self.manager.as_ref()
    }

    fn bounds(&self) -> Option<(Geometry, Transformation)> {
        // Cylinder covering the usable tube from the (shifted) inlet plane
        // to the outlet plane.
        let local = Transformation::new(
            Vector3::new(
                0.0,
                0.0,
                self.config.inlet_zone + self.config.length / 2.0,
            ),
            Vector3::zeros(),
            Vector3::new(
                self.config.radius * 2.0,
                self.config.radius * 2.0,
                self.config.length,
            ),
        );
        self.transformation
            .then_after(&local)
            .ok()
            .map(|t| (Geometry::new(Shape::Cylinder), t))
    }

    fn outlet_area(&self, outlet: &str) -> Result<(Geometry, Transformation)> {
        if outlet != "outlet" {
            return Err(SimulationError::Configuration(format!(
                "tube \"{}\" has no outlet named \"{outlet}\"",
                self.config.name
            )));
        }
        let local = Transformation::new(
            Vector3::new(
                0.0,
                0.0,
                self.config.inlet_zone + self.config.length - self.config.outlet_zone / 2.0,
            ),
            Vector3::zeros(),
            Vector3::new(
                self.config.radius * 2.0,
                self.config.radius * 2.0,
                self.config.outlet_zone,
            ),
        );
        Ok((
            Geometry::new(Shape::Cylinder),
            self.transformation.then_after(&local)?,
        ))
    }

    fn outlet_frame(&self, outlet: &str) -> Result<Transformation> {
        if outlet != "outlet" {
            return Err(SimulationError::Configuration(format!(
                "tube \"{}\" has no outlet named \"{outlet}\"",
                self.config.name
            )));
        }
        self.axis_frame(self.config.inlet_zone + self.config.length)
    }

    fn inlet_frame(&self, inlet: &str) -> Result<Transformation> {
        if inlet != "inlet" {
            return Err(SimulationError::Configuration(format!(
                "tube \"{}\" has no inlet named \"{inlet}\"",
                self.config.name
            )));
        }
        self.axis_frame(self.config.inlet_zone)
    }

    fn set_inlet_flow_rate(
        &mut self,
        store: &mut FieldStore,
        _inlet: &str,
        rate_mlpmin: f64,
    ) -> Result<Vec<OutletRateChange>> {
        self.flow_rate_mlpmin = rate_mlpmin;
        self.is_active = rate_mlpmin.abs() > 1e-20;
        if self.is_active {
            self.load_field(store)?;
        }
        Ok(vec![("outlet".to_string(), rate_mlpmin)])
    }

    fn prime_flow_system(&mut self, store: &mut FieldStore) -> Result<Vec<OutletRateChange>> {
        self.set_inlet_flow_rate(store, "inlet", self.config.flow_rate_mlpmin)
    }
}
