//! Counting sensor.
//!
//! Tallies molecules *entering* its zone: a molecule counts when the
//! post-move evaluation sees it inside while the pre-move evaluation saw it
//! outside (or the molecule was just spawned). A molecule sitting in the
//! zone across several steps is counted once.

use std::collections::HashSet;

use log::debug;
use nalgebra::Vector3;

use crate::error::Result;
use crate::geometry::Shape;
use crate::kernel::{InitStage, NotificationStage, SimulationClock};
use crate::output::SensorLog;
use crate::particles::Molecule;
use crate::sensors::{Sensor, SensorInitContext, SensorZone, StepContext};

/// Construction parameters for a [`CountingSensor`].
#[derive(Debug, Clone)]
pub struct CountingSensorConfig {
    pub name: String,
    pub shape: Shape,
    pub translation: Vector3<f64>,
    pub rotation: Vector3<f64>,
    pub scale: Vector3<f64>,
    /// Log folder below the results directory.
    pub log_folder: String,
}

impl Default for CountingSensorConfig {
    fn default() -> Self {
        Self {
            name: "counting_sensor".into(),
            shape: Shape::Cube,
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            log_folder: "sensor_data".into(),
        }
    }
}

/// Tallies molecules entering its zone and flushes the tally to its log
/// once per base step.
#[derive(Debug)]
pub struct CountingSensor {
    name: String,
    zone: SensorZone,
    log_folder: String,
    /// Molecules that were already inside the zone before their move in
    /// the current base step.
    inside_before: HashSet<crate::particles::MoleculeId>,
    /// Entries observed in the current base step.
    count: u64,
    /// Running total across the whole run.
    cumulative_count: u64,
    log: Option<SensorLog>,
}

impl CountingSensor {
    pub fn new(config: CountingSensorConfig) -> Self {
        Self {
            name: config.name,
            zone: SensorZone::new(
                config.shape,
                config.translation,
                config.rotation,
                config.scale,
            ),
            log_folder: config.log_folder,
            inside_before: HashSet::new(),
            count: 0,
            cumulative_count: 0,
            log: None,
        }
    }

    /// Entries in the current (unflushed) base step.
    pub fn current_count(&self) -> u64 {
        self.count
    }

    /// Total count since the start of the run.
    pub fn cumulative_count(&self) -> u64 {
        self.cumulative_count
    }
}

impl Sensor for CountingSensor {
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
                    &["molecule_count"],
                )?);
            }
            _ => {}
        }
        Ok(())
    }

    fn on_before_move(&mut self, _ctx: &mut StepContext<'_>, molecule: &mut Molecule) -> Result<()> {
        if self.zone.is_inside(&molecule.position) {
            self.inside_before.insert(molecule.id);
        }
        Ok(())
    }

    fn on_after_move(&mut self, _ctx: &mut StepContext<'_>, molecule: &mut Molecule) -> Result<()> {
        if self.zone.is_inside(&molecule.position) && !self.inside_before.contains(&molecule.id) {
            self.count += 1;
            self.cumulative_count += 1;
        }
        Ok(())
    }

    fn on_time_step(&mut self, clock: &SimulationClock, stage: NotificationStage) -> Result<()> {
        if stage != NotificationStage::Logging {
            return Ok(());
        }
        debug!("sensor \"{}\": {} molecules entered", self.name, self.count);
        if let Some(log) = self.log.as_mut() {
            log.write_row(clock.sim_time, &[self.count as f64])?;
        }
        self.count = 0;
        self.inside_before.clear();
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(log) = self.log.as_mut() {
            log.finish()?;
        }
        Ok(())
    }
}
