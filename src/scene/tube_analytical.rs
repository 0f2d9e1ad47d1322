//! Tube with an analytical Hagen-Poiseuille flow profile.
//!
//! Useful when no CFD case is available, and as a fast, exactly known flow
//! source in tests. The axial speed at radial distance r is
//! `2 * v_mean * (1 - (r / R)^2)`, the fully developed laminar profile.

use log::{debug, warn};
use nalgebra::Vector3;

use crate::error::{Result, SimulationError};
use crate::fields::{FieldStore, VectorFieldManager};
use crate::geometry::{Geometry, Shape, Transformation};
use crate::kernel::InitStage;
use crate::scene::object::{FlowObject, ObjectId, ObjectInitContext, OutletRateChange};

/// Construction parameters for an [`AnalyticalTube`].
#[derive(Debug, Clone)]
pub struct AnalyticalTubeConfig {
    pub name: String,
    pub translation: Vector3<f64>,
    pub rotation: Vector3<f64>,
    pub scale: Vector3<f64>,
    /// Tube radius in m.
    pub radius: f64,
    /// Tube length in m.
    pub length: f64,
    /// Length of the outlet teleport zone in m.
    pub outlet_zone: f64,
    /// Flow rate in ml/min.
    pub flow_rate_mlpmin: f64,
}

impl Default for AnalyticalTubeConfig {
    fn default() -> Self {
        Self {
            name: "analytical_tube".into(),
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            radius: 0.00075,
            length: 0.05,
            outlet_zone: 0.005,
            flow_rate_mlpmin: 5.0,
        }
    }
}

#[derive(Debug)]
pub struct AnalyticalTube {
    config: AnalyticalTubeConfig,
    object_id: ObjectId,
    transformation: Transformation,
    flow_rate_mlpmin: f64,
    /// Cross-section mean flow speed in m/s, derived from the rate.
    mean_speed: f64,
    inlets: Vec<String>,
    outlets: Vec<String>,
}

/// Convert millilitres per minute to cubic metres per second.
pub fn mlpmin_to_m3ps(mlpmin: f64) -> f64 {
    mlpmin * 1e-6 / 60.0
}

impl AnalyticalTube {
    pub fn new(config: AnalyticalTubeConfig) -> Self {
        let transformation =
            Transformation::new(config.translation, config.rotation, config.scale);
        let mean_speed = Self::mean_speed_for(config.radius, config.flow_rate_mlpmin);
        let flow_rate = config.flow_rate_mlpmin;
        Self {
            config,
            object_id: usize::MAX,
            transformation,
            flow_rate_mlpmin: flow_rate,
            mean_speed,
            inlets: vec!["inlet".to_string()],
            outlets: vec!["outlet".to_string()],
        }
    }

    fn mean_speed_for(radius: f64, flow_rate_mlpmin: f64) -> f64 {
        let cross_section = std::f64::consts::PI * radius * radius;
        mlpmin_to_m3ps(flow_rate_mlpmin) / cross_section
    }

    /// Mean flow speed in m/s; the peak speed on the axis is twice this.
    pub fn mean_speed(&self) -> f64 {
        self.mean_speed
    }

    fn axis_frame(&self, z: f64) -> Result<Transformation> {
        self.transformation.then_after(&Transformation::new(
            Vector3::new(0.0, 0.0, z),
            Vector3::zeros(),
            Vector3::new(1.0, 1.0, 1.0),
        ))
    }
}

impl FlowObject for AnalyticalTube {
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
        self.flow_rate_mlpmin.abs() > 1e-20
    }

    fn inlets(&self) -> &[String] {
        &self.inlets
    }

    fn outlets(&self) -> &[String] {
        &self.outlets
    }

    fn initialize(&mut self, stage: InitStage, _ctx: &mut ObjectInitContext<'_>) -> Result<()> {
        if stage == InitStage::CheckArguments {
            let scaling = self.transformation.scaling();
            if scaling.iter().any(|&s| !(0.999..=1.001).contains(&s)) {
                warn!(
                    "analytical tube \"{}\" is scaled by {:?}; its size is \
                     already expressed by radius and length",
                    self.config.name, scaling
                );
            }
        }
        Ok(())
    }

    fn flow_at(&self, position_global: &Vector3<f64>, _sim_time: f64) -> Vector3<f64> {
        if !self.is_active() {
            return Vector3::zeros();
        }
        let local = self.transformation.apply_inverse_to_point(position_global);
        let radial = (local.x * local.x + local.y * local.y).sqrt();
        let profile = 1.0 - (radial / self.config.radius).powi(2);
        let z_speed = (self.mean_speed * 2.0 * profile).max(0.0);
        // Only rotate the resulting flow; flow vectors have no position.
        self.transformation
            .apply_to_direction(&Vector3::new(0.0, 0.0, z_speed))
    }

    fn field_manager(&self) -> Option<&VectorFieldManager> {
        None
    }

    fn bounds(&self) -> Option<(Geometry, Transformation)> {
        let local = Transformation::new(
            Vector3::new(0.0, 0.0, self.config.length / 2.0),
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
                "analytical tube \"{}\" has no outlet named \"{outlet}\"",
                self.config.name
            )));
        }
        let local = Transformation::new(
            Vector3::new(
                0.0,
                0.0,
                self.config.length - self.config.outlet_zone / 2.0,
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
                "analytical tube \"{}\" has no outlet named \"{outlet}\"",
                self.config.name
            )));
        }
        self.axis_frame(self.config.length)
    }

    fn inlet_frame(&self, inlet: &str) -> Result<Transformation> {
        if inlet != "inlet" {
            return Err(SimulationError::Configuration(format!(
                "analytical tube \"{}\" has no inlet named \"{inlet}\"",
                self.config.name
            )));
        }
        self.axis_frame(0.0)
    }

    fn set_inlet_flow_rate(
        &mut self,
        _store: &mut FieldStore,
        _inlet: &str,
        rate_mlpmin: f64,
    ) -> Result<Vec<OutletRateChange>> {
        self.flow_rate_mlpmin = rate_mlpmin;
        self.mean_speed = Self::mean_speed_for(self.config.radius, rate_mlpmin);
        debug!(
            "analytical tube \"{}\": mean flow speed now {} m/s",
            self.config.name, self.mean_speed
        );
        Ok(vec![("outlet".to_string(), rate_mlpmin)])
    }

    fn prime_flow_system(&mut self, store: &mut FieldStore) -> Result<Vec<OutletRateChange>> {
        self.set_inlet_flow_rate(store, "inlet", self.config.flow_rate_mlpmin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tube() -> AnalyticalTube {
        AnalyticalTube::new(AnalyticalTubeConfig {
            radius: 0.001,
            length: 0.1,
            flow_rate_mlpmin: 9.42477796,
            ..Default::default()
        })
    }

    #[test]
    fn peak_speed_is_twice_the_mean() {
        let tube = tube();
        let on_axis = tube.flow_at(&Vector3::new(0.0, 0.0, 0.05), 0.0);
        assert!((on_axis.z - tube.mean_speed() * 2.0).abs() < 1e-12);
    }

    #[test]
    fn profile_vanishes_at_the_wall() {
        let tube = tube();
        let at_wall = tube.flow_at(&Vector3::new(0.001, 0.0, 0.05), 0.0);
        assert!(at_wall.norm() < 1e-12);
        let outside = tube.flow_at(&Vector3::new(0.002, 0.0, 0.05), 0.0);
        assert!(outside.norm() < 1e-12);
    }

    #[test]
    fn mean_speed_follows_the_flow_rate() {
        // 9.42477796 ml/min through a 1 mm radius cross section is
        // almost exactly 0.05 m/s mean speed.
        let tube = tube();
        assert!((tube.mean_speed() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn rotated_tube_flows_along_its_axis() {
        let mut config = AnalyticalTubeConfig {
            radius: 0.001,
            flow_rate_mlpmin: 9.42477796,
            ..Default::default()
        };
        // Rotate the local +z axis onto global +x.
        config.rotation = Vector3::new(0.0, std::f64::consts::FRAC_PI_2, 0.0);
        let tube = AnalyticalTube::new(config);
        let flow = tube.flow_at(&Vector3::new(0.05, 0.0, 0.0), 0.0);
        assert!(flow.x > 0.09);
        assert!(flow.y.abs() < 1e-12 && flow.z.abs() < 1e-12);
    }

    #[test]
    fn zero_rate_deactivates_the_tube() {
        let mut tube = tube();
        let mut store = FieldStore::new(std::env::temp_dir());
        let changes = tube.set_inlet_flow_rate(&mut store, "inlet", 0.0).unwrap();
        assert!(!tube.is_active());
        assert_eq!(changes, vec![("outlet".to_string(), 0.0)]);
        assert!(tube.flow_at(&Vector3::new(0.0, 0.0, 0.05), 0.0).norm() < 1e-20);
    }
}
