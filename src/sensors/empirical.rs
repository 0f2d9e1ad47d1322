//! Sensor reproducing empirically measured response curves.
//!
//! Real susceptometers do not react uniformly over their measurement
//! volume: the reading depends on where along the sensor axis a particle
//! sits. This sensor maps each molecule's axial position through a fitted
//! response curve (a generalized logistic density) and accumulates the
//! per-step sum as the relative susceptibility the instrument would report.
//!
//! Molecules are assumed to pass through the zone in positive local z
//! direction; rotate the sensor accordingly if they do not.

use nalgebra::Vector3;

use crate::error::Result;
use crate::geometry::Shape;
use crate::kernel::{InitStage, NotificationStage, SimulationClock};
use crate::output::SensorLog;
use crate::particles::Molecule;
use crate::sensors::{Sensor, SensorInitContext, SensorZone, StepContext};

/// Attribute under which the last response sample is attached to a
/// molecule.
const SUSCEPTIBILITY_ATTRIBUTE: &str = "susceptibility";

/// Fitted response-curve parameters of known instruments, or custom ones.
///
/// The parameters (shape, location, scale) feed a generalized logistic
/// density over the axial position in metres.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseCurve {
    /// MS2G susceptometer, fitted over a 25 mm sensor.
    Ms2g,
    /// Lab instrument characterized 2020-03-10, fitted over 35 mm.
    Erlangen,
    /// Explicit (shape, location, scale) parameters.
    Custom(f64, f64, f64),
}

impl ResponseCurve {
    fn parameters(&self) -> (f64, f64, f64) {
        match self {
            // Values from curve fitting against the measured response.
            ResponseCurve::Ms2g => (
                1.171_089_911_576_823_4,
                0.012_806_480_117_364_473,
                0.001_790_836_859_685_216_3,
            ),
            ResponseCurve::Erlangen => (
                1.152_187_485_266_317_4,
                0.017_531_424_609_419_782,
                0.003_804_701_283_874_202,
            ),
            ResponseCurve::Custom(shape, location, scale) => (*shape, *location, *scale),
        }
    }

    /// Generalized logistic probability density at `x`.
    pub fn density(&self, x: f64) -> f64 {
        let (shape, location, scale) = self.parameters();
        let y = (x - location) / scale;
        let e = (-y).exp();
        (shape / scale) * e / (1.0 + e).powf(shape + 1.0)
    }
}

/// Construction parameters for an [`EmpiricalSensor`].
#[derive(Debug, Clone)]
pub struct EmpiricalSensorConfig {
    pub name: String,
    pub shape: Shape,
    pub translation: Vector3<f64>,
    pub rotation: Vector3<f64>,
    pub scale: Vector3<f64>,
    pub response_curve: ResponseCurve,
    pub log_folder: String,
}

impl Default for EmpiricalSensorConfig {
    fn default() -> Self {
        Self {
            name: "empirical_sensor".into(),
            shape: Shape::Cylinder,
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            response_curve: ResponseCurve::Ms2g,
            log_folder: "sensor_data".into(),
        }
    }
}

#[derive(Debug)]
pub struct EmpiricalSensor {
    name: String,
    zone: SensorZone,
    response_curve: ResponseCurve,
    log_folder: String,
    /// Summed response of all molecules seen this base step, relative to
    /// the curve's peak response.
    relative_susceptibility: f64,
    log: Option<SensorLog>,
}

impl EmpiricalSensor {
    pub fn new(config: EmpiricalSensorConfig) -> Self {
        Self {
            name: config.name,
            zone: SensorZone::new(
                config.shape,
                config.translation,
                config.rotation,
                config.scale,
            ),
            response_curve: config.response_curve,
            log_folder: config.log_folder,
            relative_susceptibility: 0.0,
            log: None,
        }
    }

    pub fn current_susceptibility(&self) -> f64 {
        self.relative_susceptibility
    }
}

impl Sensor for EmpiricalSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn zone(&self) -> &SensorZone {
        &self.zone
    }

    fn zone_mut(&mut self) -> &mut SensorZone {
        &mut self.zone
    }

    fn initialize(&mut self, stage: InitStage, ctx: &mut SensorInitContext<'_>) -> Result<()> {
        match stage {
            InitStage::CreateFolders => {
                SensorLog::create_folder(ctx.results_dir, &self.log_folder)?;
            }
            InitStage::CreateFiles => {
                self.log = Some(SensorLog::create(
                    ctx.results_dir,
                    &self.log_folder,
                    &self.name,
                    &["rel_susceptibility"],
                )?);
            }
            _ => {}
        }
        Ok(())
    }

    fn on_after_move(&mut self, _ctx: &mut StepContext<'_>, molecule: &mut Molecule) -> Result<()> {
        if !self.zone.is_inside(&molecule.position) {
            return Ok(());
        }
        let local = self.zone.to_local(&molecule.position);
        // Unit-shape coordinates are centered on the origin; shift to
        // [0, 1] and scale to the physical sensor length along z.
        let axial_position = (local.z + 0.5) * self.zone.transformation().scaling().z;
        let sample = self.response_curve.density(axial_position);
        self.relative_susceptibility += sample;
        molecule.set_attribute(SUSCEPTIBILITY_ATTRIBUTE, sample);
        Ok(())
    }

    fn on_time_step(&mut self, clock: &SimulationClock, stage: NotificationStage) -> Result<()> {
        if stage != NotificationStage::Logging {
            return Ok(());
        }
        if let Some(log) = self.log.as_mut() {
            log.write_row(clock.sim_time, &[self.relative_susceptibility])?;
        }
        self.relative_susceptibility = 0.0;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(log) = self.log.as_mut() {
            log.finish()?;
        }
        Ok(())
    }
}
