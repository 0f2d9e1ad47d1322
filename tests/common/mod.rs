//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::path::Path;

use molcom_rs::fields::{FieldStore, VectorFieldManager};
use molcom_rs::prelude::*;
use molcom_rs::scene::{ObjectId, OutletRateChange};
use nalgebra::Vector3;

/// Flow growing linearly with z (dz/dt = rate * z), giving the integrators
/// a smoothly varying field with the known solution z(t) = z0 e^(rate t).
/// Nonlinear enough that the embedded error estimate is nonzero, which the
/// exactly integrable tube profiles never provide.
#[derive(Debug)]
pub struct ZGrowthFlow {
    name: String,
    id: ObjectId,
    rate: f64,
    transformation: Transformation,
    ports: Vec<String>,
}

impl ZGrowthFlow {
    pub fn new(name: &str, rate: f64) -> Self {
        Self {
            name: name.into(),
            id: 0,
            rate,
            transformation: Transformation::identity(),
            ports: Vec::new(),
        }
    }
}

impl FlowObject for ZGrowthFlow {
    fn name(&self) -> &str {
        &self.name
    }
    fn object_id(&self) -> ObjectId {
        self.id
    }
    fn assign_id(&mut self, id: ObjectId) {
        self.id = id;
    }
    fn transformation(&self) -> &Transformation {
        &self.transformation
    }
    fn is_active(&self) -> bool {
        true
    }
    fn inlets(&self) -> &[String] {
        &self.ports
    }
    fn outlets(&self) -> &[String] {
        &self.ports
    }
    fn flow_at(&self, position_global: &Vector3<f64>, _sim_time: f64) -> Vector3<f64> {
        Vector3::new(0.0, 0.0, self.rate * position_global.z)
    }
    fn field_manager(&self) -> Option<&VectorFieldManager> {
        None
    }
    fn bounds(&self) -> Option<(Geometry, Transformation)> {
        None
    }
    fn outlet_area(&self, outlet: &str) -> Result<(Geometry, Transformation)> {
        Err(SimulationError::Configuration(format!(
            "test flow \"{}\" has no outlet \"{outlet}\"",
            self.name
        )))
    }
    fn outlet_frame(&self, outlet: &str) -> Result<Transformation> {
        Err(SimulationError::Configuration(format!(
            "test flow \"{}\" has no outlet \"{outlet}\"",
            self.name
        )))
    }
    fn inlet_frame(&self, inlet: &str) -> Result<Transformation> {
        Err(SimulationError::Configuration(format!(
            "test flow \"{}\" has no inlet \"{inlet}\"",
            self.name
        )))
    }
    fn set_inlet_flow_rate(
        &mut self,
        _store: &mut FieldStore,
        _inlet: &str,
        _rate: f64,
    ) -> Result<Vec<OutletRateChange>> {
        Ok(Vec::new())
    }
    fn prime_flow_system(&mut self, _store: &mut FieldStore) -> Result<Vec<OutletRateChange>> {
        Ok(Vec::new())
    }
}

/// Peak (on-axis) flow speed of an analytical tube in m/s.
pub fn peak_speed(radius: f64, flow_rate_mlpmin: f64) -> f64 {
    let mean = flow_rate_mlpmin * 1e-6 / 60.0 / (std::f64::consts::PI * radius * radius);
    2.0 * mean
}

/// Flow rate in ml/min that yields the requested peak speed in m/s.
pub fn flow_rate_for_peak_speed(radius: f64, peak_mps: f64) -> f64 {
    peak_mps / 2.0 * std::f64::consts::PI * radius * radius * 60.0 * 1e6
}

/// Two collinear analytical tubes of `tube_length` each, stitched by a
/// teleporting sensor, with a point injector at the origin of the first
/// tube. The kernel still needs sensors and a time limit from the caller.
pub struct LinkedTubesSetup {
    pub radius: f64,
    pub tube_length: f64,
    pub flow_rate_mlpmin: f64,
    pub injection_amount: usize,
    pub base_delta_time: f64,
    pub sim_time_limit: f64,
    /// Use adaptive RKF sub-stepping instead of the fixed-step loop.
    pub use_adaptive: bool,
}

impl LinkedTubesSetup {
    pub fn build(&self, results_dir: &Path) -> SimulationKernel {
        let mut config = KernelConfig {
            sim_time_limit: self.sim_time_limit,
            base_delta_time: self.base_delta_time,
            results_dir: results_dir.to_path_buf(),
            cases_root: results_dir.join("cases"),
            ..Default::default()
        };
        if self.use_adaptive {
            config.use_adaptive_time_stepping = true;
            config.integration_method = Integration::RungeKuttaFehlberg45;
            config.adaptive_time_max_error_threshold = 1e-10;
        }
        let mut kernel = SimulationKernel::new(config);
        kernel.attach_object(Box::new(AnalyticalTube::new(AnalyticalTubeConfig {
            name: "tube_a".into(),
            radius: self.radius,
            length: self.tube_length,
            outlet_zone: 0.005,
            flow_rate_mlpmin: self.flow_rate_mlpmin,
            ..Default::default()
        })));
        kernel.attach_object(Box::new(AnalyticalTube::new(AnalyticalTubeConfig {
            name: "tube_b".into(),
            translation: Vector3::new(0.0, 0.0, self.tube_length),
            radius: self.radius,
            length: self.tube_length,
            outlet_zone: 0.005,
            flow_rate_mlpmin: self.flow_rate_mlpmin,
            ..Default::default()
        })));
        kernel.attach_sensor(Box::new(TeleportingSensor::new(TeleportingSensorConfig {
            name: "junction".into(),
            source_object: "tube_a".into(),
            target_object: "tube_b".into(),
            ..Default::default()
        })));
        kernel.attach_injector(
            Injector::new(InjectorConfig {
                name: "transmitter".into(),
                shape: Shape::Point,
                translation: Vector3::zeros(),
                attached_object: "tube_a".into(),
                injection_amount: self.injection_amount,
                ..Default::default()
            })
            .expect("injector config is valid"),
        );
        kernel
    }
}

/// Sum of the value column of a sensor CSV log.
pub fn sum_log_column(path: &Path) -> f64 {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    content
        .lines()
        .skip(1)
        .map(|line| {
            line.split(',')
                .nth(1)
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or_else(|| panic!("malformed log line \"{line}\""))
        })
        .sum()
}

/// Rows of (sim_time, value) from a sensor CSV log.
pub fn read_log_rows(path: &Path) -> Vec<(f64, f64)> {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    content
        .lines()
        .skip(1)
        .map(|line| {
            let mut parts = line.split(',');
            let t = parts.next().unwrap().parse().unwrap();
            let v = parts.next().unwrap().parse().unwrap();
            (t, v)
        })
        .collect()
}
