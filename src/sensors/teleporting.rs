//! Teleporting sensor: the hand-off between flow-field segments.
//!
//! Independently meshed segments are stitched into one continuous channel
//! by watching the source object's outlet zone. A molecule that reaches the
//! zone is reassigned to the target object and its position is remapped by
//! composing the source outlet frame's inverse with the target inlet frame.
//! Offsets relative to the outlet plane are thereby preserved: a molecule
//! that penetrated 2 mm past the outlet reappears 2 mm past the inlet, so
//! particle spacing stays continuous across the junction. When the two
//! frames coincide in global space the remap is the identity.

use log::debug;

use crate::error::{Result, SimulationError};
use crate::geometry::Transformation;
use crate::kernel::InitStage;
use crate::particles::Molecule;
use crate::scene::ObjectId;
use crate::sensors::{Sensor, SensorInitContext, SensorZone, StepContext};

/// Construction parameters for a [`TeleportingSensor`].
#[derive(Debug, Clone)]
pub struct TeleportingSensorConfig {
    pub name: String,
    /// Component name of the source object.
    pub source_object: String,
    /// Outlet name within the source object.
    pub source_outlet: String,
    /// Component name of the target object.
    pub target_object: String,
    /// Inlet name within the target object.
    pub target_inlet: String,
}

impl Default for TeleportingSensorConfig {
    fn default() -> Self {
        Self {
            name: "teleporting_sensor".into(),
            source_object: String::new(),
            source_outlet: "outlet".into(),
            target_object: String::new(),
            target_inlet: "inlet".into(),
        }
    }
}

#[derive(Debug)]
pub struct TeleportingSensor {
    config: TeleportingSensorConfig,
    /// Zone and frames are resolved from the scene during initialization.
    zone: SensorZone,
    source_object: Option<ObjectId>,
    target_object: Option<ObjectId>,
    /// Maps a global position near the source outlet to the equivalent
    /// global position near the target inlet.
    remap: Option<Transformation>,
    teleported: u64,
}

impl TeleportingSensor {
    pub fn new(config: TeleportingSensorConfig) -> Self {
        Self {
            config,
            zone: SensorZone::unresolved(),
            source_object: None,
            target_object: None,
            remap: None,
            teleported: 0,
        }
    }

    pub fn teleported_count(&self) -> u64 {
        self.teleported
    }
}

impl Sensor for TeleportingSensor {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn zone(&self) -> &SensorZone {
        &self.zone
    }

    fn zone_mut(&mut self) -> &mut SensorZone {
        &mut self.zone
    }

    fn initialize(&mut self, stage: InitStage, ctx: &mut SensorInitContext<'_>) -> Result<()> {
        match stage {
            InitStage::CheckArguments => {
                if self.config.source_object.is_empty() || self.config.target_object.is_empty() {
                    return Err(SimulationError::Configuration(format!(
                        "teleporting sensor \"{}\" needs both a source and a \
                         target object",
                        self.config.name
                    )));
                }
            }
            InitStage::BuildScene => {
                let source = ctx.scene.object_id_by_name(&self.config.source_object)?;
                let target = ctx.scene.object_id_by_name(&self.config.target_object)?;
                self.source_object = Some(source);
                self.target_object = Some(target);

                let (geometry, transformation) = ctx
                    .scene
                    .object(source)
                    .ok_or_else(|| {
                        SimulationError::Configuration(format!(
                            "unknown object id {source} for teleporting sensor"
                        ))
                    })?
                    .outlet_area(&self.config.source_outlet)?;
                let was_active = self.zone.is_active();
                self.zone = SensorZone::from_parts(geometry, transformation);
                if !was_active {
                    self.zone.turn_off();
                }

                let outlet_frame =
                    ctx.scene.outlet_frame(source, &self.config.source_outlet)?;
                let inlet_frame = ctx.scene.inlet_frame(target, &self.config.target_inlet)?;
                self.remap = Some(inlet_frame.then_after(&Transformation::from_matrices(
                    outlet_frame
                        .matrix()
                        .try_inverse()
                        .ok_or_else(|| {
                            SimulationError::Configuration(
                                "outlet frame is not invertible".into(),
                            )
                        })?,
                    outlet_frame
                        .direction_matrix()
                        .try_inverse()
                        .ok_or_else(|| {
                            SimulationError::Configuration(
                                "outlet frame is not invertible".into(),
                            )
                        })?,
                )?)?);
            }
            InitStage::CreateTeleporters => {
                let (Some(source), Some(target)) = (self.source_object, self.target_object)
                else {
                    return Err(SimulationError::Configuration(format!(
                        "teleporting sensor \"{}\" was not linked during \
                         scene building",
                        self.config.name
                    )));
                };
                ctx.scene.add_interconnection(
                    source,
                    &self.config.source_outlet,
                    target,
                    &self.config.target_inlet,
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Teleports on the before-hook so that molecules that settled in the
    /// outlet zone at the end of the previous step are handed over before
    /// their next movement is predicted.
    fn on_before_move(&mut self, ctx: &mut StepContext<'_>, molecule: &mut Molecule) -> Result<()> {
        let (Some(source), Some(target), Some(remap)) =
            (self.source_object, self.target_object, self.remap.as_ref())
        else {
            return Ok(());
        };
        if molecule.object_id != Some(source) || !self.zone.is_inside(&molecule.position) {
            return Ok(());
        }
        molecule.object_id = Some(target);
        molecule.position = remap.apply_to_point(&molecule.position);
        molecule.refresh_cell(ctx.scene);
        self.teleported += 1;
        debug!(
            "\"{}\": teleported molecule {} into object {target}",
            self.config.name, molecule.id
        );
        Ok(())
    }
}
