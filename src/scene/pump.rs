//! Meshless pump driving a chain of objects.
//!
//! A pump occupies no space and carries no flow field; molecules are never
//! inside it. Its only job is actuation: at each scheduled start time it
//! raises its outlet rate to the configured injection rate, and once the
//! configured volume has been pushed through it drops the rate back to
//! zero. Both transitions propagate downstream through the scene.

use log::info;
use nalgebra::Vector3;

use crate::error::{Result, SimulationError};
use crate::fields::{FieldStore, VectorFieldManager};
use crate::geometry::{Geometry, Transformation};
use crate::kernel::{NotificationStage, SimulationClock};
use crate::scene::object::{FlowObject, ObjectId, OutletRateChange};
use crate::scene::tube_analytical::mlpmin_to_m3ps;

/// Construction parameters for a [`Pump`].
#[derive(Debug, Clone)]
pub struct PumpConfig {
    pub name: String,
    /// Volume pushed per injection, in litres.
    pub injection_volume_l: f64,
    /// Rate while injecting, in ml/min.
    pub injection_rate_mlpmin: f64,
    /// Simulation times (s) at which injections start.
    pub schedule: Vec<f64>,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            name: "pump".into(),
            injection_volume_l: 0.001,
            injection_rate_mlpmin: 10.0,
            schedule: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Pump {
    config: PumpConfig,
    object_id: ObjectId,
    transformation: Transformation,
    /// Remaining scheduled start times, ascending.
    schedule: Vec<f64>,
    is_active: bool,
    /// Simulation time at which the running injection ends.
    t_end_injection: f64,
    inlets: Vec<String>,
    outlets: Vec<String>,
}

impl Pump {
    pub fn new(config: PumpConfig) -> Self {
        let mut schedule = config.schedule.clone();
        schedule.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        schedule.reverse(); // pop() yields the earliest
        Self {
            config,
            object_id: usize::MAX,
            transformation: Transformation::identity(),
            schedule,
            is_active: false,
            t_end_injection: 0.0,
            inlets: Vec::new(),
            outlets: vec!["outlet".to_string()],
        }
    }

    /// Duration of one injection in seconds.
    fn injection_duration(&self) -> f64 {
        // volume [l] / rate [l/s]
        self.config.injection_volume_l
            / (mlpmin_to_m3ps(self.config.injection_rate_mlpmin) * 1e3)
    }
}

impl FlowObject for Pump {
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

    fn flow_at(&self, _position_global: &Vector3<f64>, _sim_time: f64) -> Vector3<f64> {
        // Molecules are never inside a pump.
        Vector3::zeros()
    }

    fn field_manager(&self) -> Option<&VectorFieldManager> {
        None
    }

    fn bounds(&self) -> Option<(Geometry, Transformation)> {
        None
    }

    fn outlet_area(&self, _outlet: &str) -> Result<(Geometry, Transformation)> {
        Err(SimulationError::Configuration(format!(
            "pump \"{}\" defines no outlet area; teleport from the first \
             object carrying geometry instead",
            self.config.name
        )))
    }

    fn outlet_frame(&self, _outlet: &str) -> Result<Transformation> {
        Err(SimulationError::Configuration(format!(
            "pump \"{}\" defines no outlet frame",
            self.config.name
        )))
    }

    fn inlet_frame(&self, _inlet: &str) -> Result<Transformation> {
        Err(SimulationError::Configuration(format!(
            "pump \"{}\" has no inlets",
            self.config.name
        )))
    }

    fn set_inlet_flow_rate(
        &mut self,
        _store: &mut FieldStore,
        _inlet: &str,
        _rate_mlpmin: f64,
    ) -> Result<Vec<OutletRateChange>> {
        Err(SimulationError::Configuration(format!(
            "pump \"{}\" only has an outlet; nothing can feed its inlet",
            self.config.name
        )))
    }

    fn prime_flow_system(&mut self, _store: &mut FieldStore) -> Result<Vec<OutletRateChange>> {
        // Pumps start idle; the first scheduled injection activates them.
        Ok(Vec::new())
    }

    fn on_time_step(
        &mut self,
        clock: &SimulationClock,
        stage: NotificationStage,
    ) -> Vec<OutletRateChange> {
        if stage != NotificationStage::Actuation {
            return Vec::new();
        }
        let now = clock.sim_time;
        if self.is_active && now >= self.t_end_injection {
            self.is_active = false;
            info!("pump \"{}\": injection finished at t={now} s", self.config.name);
            return vec![("outlet".to_string(), 0.0)];
        }
        if !self.is_active {
            if let Some(&next_start) = self.schedule.last() {
                if now >= next_start {
                    self.schedule.pop();
                    self.is_active = true;
                    self.t_end_injection = now + self.injection_duration();
                    info!(
                        "pump \"{}\": injecting {} l at {} ml/min until t={} s",
                        self.config.name,
                        self.config.injection_volume_l,
                        self.config.injection_rate_mlpmin,
                        self.t_end_injection
                    );
                    return vec![(
                        "outlet".to_string(),
                        self.config.injection_rate_mlpmin,
                    )];
                }
            }
        }
        Vec::new()
    }
}
