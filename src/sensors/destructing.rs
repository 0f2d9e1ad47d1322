//! Destructing sensor.
//!
//! Removes molecules that enter its zone, e.g. to model absorption at the
//! end of a channel. Removal is staged through the mutation log and only
//! committed between steps; within the notification pass the collection
//! stays untouched.

use nalgebra::Vector3;

use crate::error::Result;
use crate::geometry::Shape;
use crate::particles::Molecule;
use crate::sensors::{Sensor, SensorZone, StepContext};

/// Construction parameters for a [`DestructingSensor`].
#[derive(Debug, Clone)]
pub struct DestructingSensorConfig {
    pub name: String,
    pub shape: Shape,
    pub translation: Vector3<f64>,
    pub rotation: Vector3<f64>,
    pub scale: Vector3<f64>,
}

impl Default for DestructingSensorConfig {
    fn default() -> Self {
        Self {
            name: "destructing_sensor".into(),
            shape: Shape::Cube,
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

#[derive(Debug)]
pub struct DestructingSensor {
    name: String,
    zone: SensorZone,
    destroyed: u64,
}

impl DestructingSensor {
    pub fn new(config: DestructingSensorConfig) -> Self {
        Self {
            name: config.name,
            zone: SensorZone::new(
                config.shape,
                config.translation,
                config.rotation,
                config.scale,
            ),
            destroyed: 0,
        }
    }

    /// Number of molecules this sensor has staged for destruction.
    pub fn destroyed_count(&self) -> u64 {
        self.destroyed
    }
}

impl Sensor for DestructingSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn zone(&self) -> &SensorZone {
        &self.zone
    }

    fn zone_mut(&mut self) -> &mut SensorZone {
        &mut self.zone
    }

    fn on_after_move(&mut self, ctx: &mut StepContext<'_>, molecule: &mut Molecule) -> Result<()> {
        if self.zone.is_inside(&molecule.position) {
            ctx.staged.stage_destroy(molecule.id);
            self.destroyed += 1;
        }
        Ok(())
    }
}
