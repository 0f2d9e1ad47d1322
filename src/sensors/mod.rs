//! Spatially scoped observers of particle movement.
//!
//! Sensors are passive: the kernel notifies each of them twice per molecule
//! per base step, once against the pre-move position and once against the
//! post-move position. Comparing the two lets a sensor distinguish entry,
//! exit, and pass-through without any state of its own. Sensors never touch
//! the live particle collection; destruction requests go through the staged
//! mutation log.
//!
//! Sensors are independent observers. A failing sensor hook is logged and
//! skipped; the step continues for the remaining sensors.

mod counting;
mod destructing;
mod empirical;
mod teleporting;

pub use counting::{CountingSensor, CountingSensorConfig};
pub use destructing::{DestructingSensor, DestructingSensorConfig};
pub use empirical::{EmpiricalSensor, EmpiricalSensorConfig, ResponseCurve};
pub use teleporting::{TeleportingSensor, TeleportingSensorConfig};

use std::fmt;
use std::path::Path;

use log::{debug, error};
use nalgebra::Vector3;

use crate::error::Result;
use crate::fields::FieldStore;
use crate::geometry::{Geometry, Shape, Transformation};
use crate::kernel::{InitStage, NotificationStage, SimulationClock};
use crate::particles::{Molecule, MutationLog};
use crate::scene::SceneManager;

/// Index of a sensor in its manager's registration order.
pub type SensorId = usize;

/// A sensor's spatial scope: shape, placement, and activation flag.
///
/// Composed into every sensor variant rather than inherited; the zone is
/// the whole shared surface between sensor behaviors and geometry.
#[derive(Debug, Clone)]
pub struct SensorZone {
    geometry: Geometry,
    transformation: Transformation,
    active: bool,
}

impl SensorZone {
    pub fn new(
        shape: Shape,
        translation: Vector3<f64>,
        rotation: Vector3<f64>,
        scale: Vector3<f64>,
    ) -> Self {
        Self {
            geometry: Geometry::new(shape),
            transformation: Transformation::new(translation, rotation, scale),
            active: true,
        }
    }

    /// Zone from an already composed geometry and placement, e.g. an
    /// object's outlet area.
    pub fn from_parts(geometry: Geometry, transformation: Transformation) -> Self {
        Self {
            geometry,
            transformation,
            active: true,
        }
    }

    /// Placeholder zone for sensors whose real geometry is resolved during
    /// initialization.
    pub fn unresolved() -> Self {
        Self {
            geometry: Geometry::new(Shape::None),
            transformation: Transformation::identity(),
            active: true,
        }
    }

    pub fn is_inside(&self, position_global: &Vector3<f64>) -> bool {
        let local = self.transformation.apply_inverse_to_point(position_global);
        self.geometry.contains(&local)
    }

    /// Global position mapped into the zone's unit-shape frame.
    pub fn to_local(&self, position_global: &Vector3<f64>) -> Vector3<f64> {
        self.transformation.apply_inverse_to_point(position_global)
    }

    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn turn_on(&mut self) {
        self.active = true;
    }

    pub fn turn_off(&mut self) {
        self.active = false;
    }

    /// Radius of a ball around the zone centre guaranteed to contain the
    /// whole zone. All unit shapes fit the unit cube, so the half-diagonal
    /// of the scaled cube bounds them.
    pub fn bounding_radius(&self) -> f64 {
        let s = self.transformation.scaling();
        ((s.x / 2.0).powi(2) + (s.y / 2.0).powi(2) + (s.z / 2.0).powi(2)).sqrt()
    }
}

/// Per-molecule notification context.
pub struct StepContext<'a> {
    pub scene: &'a SceneManager,
    pub staged: &'a mut MutationLog,
    pub sim_time: f64,
}

/// Context for the staged sensor initialization.
pub struct SensorInitContext<'a> {
    pub scene: &'a mut SceneManager,
    pub store: &'a mut FieldStore,
    pub results_dir: &'a Path,
}

/// Capability interface of all sensor variants.
pub trait Sensor: fmt::Debug {
    /// Unique component name.
    fn name(&self) -> &str;

    fn zone(&self) -> &SensorZone;

    fn zone_mut(&mut self) -> &mut SensorZone;

    fn initialize(&mut self, _stage: InitStage, _ctx: &mut SensorInitContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Evaluated against the pre-move position of each molecule.
    fn on_before_move(&mut self, _ctx: &mut StepContext<'_>, _molecule: &mut Molecule) -> Result<()> {
        Ok(())
    }

    /// Evaluated against the post-move position of each molecule.
    fn on_after_move(&mut self, _ctx: &mut StepContext<'_>, _molecule: &mut Molecule) -> Result<()> {
        Ok(())
    }

    /// Called once per base step per notification stage.
    fn on_time_step(
        &mut self,
        _clock: &SimulationClock,
        _stage: NotificationStage,
    ) -> Result<()> {
        Ok(())
    }

    /// Flush and release resources at the end of the run.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Owns all sensors and routes notifications to them.
///
/// When an object carries a mesh, the manager precomputes which sensors can
/// possibly see each mesh cell (a range query around the sensor followed by
/// an exact containment check of the cell centre). A molecule then only
/// notifies the sensors subscribed to its current cell. Objects without a
/// mesh fall back to notifying every sensor.
#[derive(Debug, Default)]
pub struct SensorManager {
    sensors: Vec<Box<dyn Sensor>>,
    /// Indexed by object id, then mesh cell id; holds sensor indices.
    /// Empty per-object tables disable subscription filtering.
    subscriptions: Vec<Vec<Vec<SensorId>>>,
}

impl SensorManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_sensor(&mut self, sensor: Box<dyn Sensor>) -> SensorId {
        debug!("registered sensor \"{}\"", sensor.name());
        self.sensors.push(sensor);
        self.sensors.len() - 1
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    /// Runtime access to a sensor, e.g. for `turn_on`/`turn_off`.
    pub fn sensor_mut(&mut self, name: &str) -> Option<&mut (dyn Sensor + '_)> {
        self.sensors
            .iter_mut()
            .find(|s| s.name() == name)
            .map(|s| s.as_mut() as &mut dyn Sensor)
    }

    /// Run one initialization stage over all sensors, wrapping failures
    /// with the failing sensor's name. The subscription table is built in
    /// its dedicated stage after all zones are resolved.
    pub fn initialize(&mut self, stage: InitStage, ctx: &mut SensorInitContext<'_>) -> Result<()> {
        for sensor in &mut self.sensors {
            sensor
                .initialize(stage, ctx)
                .map_err(|e| e.during_startup(stage, sensor.name()))?;
        }
        if stage == InitStage::RegisterSensors {
            debug!("{} sensors registered", self.sensors.len());
        }
        if stage == InitStage::CreateSensorSubscriptions {
            self.build_subscriptions(ctx.scene);
        }
        Ok(())
    }

    fn build_subscriptions(&mut self, scene: &SceneManager) {
        self.subscriptions.clear();
        for object in scene.objects() {
            let Some(manager) = object.field_manager() else {
                self.subscriptions.push(Vec::new());
                continue;
            };
            let mut table: Vec<Vec<SensorId>> = vec![Vec::new(); manager.cell_count()];
            for (sensor_id, sensor) in self.sensors.iter().enumerate() {
                let zone = sensor.zone();
                let centre = zone.transformation().translation();
                let candidates = manager.cells_within_radius(centre, zone.bounding_radius());
                debug!(
                    "subscribing sensor \"{}\" to object \"{}\": {} candidate \
                     cells of {}",
                    sensor.name(),
                    object.name(),
                    candidates.len(),
                    manager.cell_count()
                );
                for cell_id in candidates {
                    let cell_centre = manager.cell_centre_global(cell_id);
                    if zone.is_inside(&cell_centre) {
                        table[cell_id].push(sensor_id);
                    }
                }
            }
            self.subscriptions.push(table);
        }
    }

    /// Sensor indices to notify for a molecule, based on its current cell.
    fn relevant_sensors(&self, molecule: &Molecule) -> Vec<SensorId> {
        if let (Some(object_id), Some(cell_id)) = (molecule.object_id, molecule.cell_id) {
            if let Some(table) = self.subscriptions.get(object_id) {
                if !table.is_empty() {
                    return table.get(cell_id).cloned().unwrap_or_default();
                }
            }
        }
        (0..self.sensors.len()).collect()
    }

    pub fn notify_before_move(&mut self, ctx: &mut StepContext<'_>, molecule: &mut Molecule) {
        for id in self.relevant_sensors(molecule) {
            let sensor = &mut self.sensors[id];
            if !sensor.zone().is_active() {
                continue;
            }
            if let Err(err) = sensor.on_before_move(ctx, molecule) {
                error!("sensor \"{}\" failed in before-move hook: {err}", sensor.name());
            }
        }
    }

    pub fn notify_after_move(&mut self, ctx: &mut StepContext<'_>, molecule: &mut Molecule) {
        for id in self.relevant_sensors(molecule) {
            let sensor = &mut self.sensors[id];
            if !sensor.zone().is_active() {
                continue;
            }
            if let Err(err) = sensor.on_after_move(ctx, molecule) {
                error!("sensor \"{}\" failed in after-move hook: {err}", sensor.name());
            }
        }
    }

    pub fn notify_time_step(&mut self, clock: &SimulationClock, stage: NotificationStage) {
        for sensor in &mut self.sensors {
            if let Err(err) = sensor.on_time_step(clock, stage) {
                error!("sensor \"{}\" failed processing the time step: {err}", sensor.name());
            }
        }
    }

    pub fn finish_all(&mut self) -> Result<()> {
        for sensor in &mut self.sensors {
            sensor.finish()?;
        }
        Ok(())
    }
}
