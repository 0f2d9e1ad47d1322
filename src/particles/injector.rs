//! Particle injection.
//!
//! An injector spawns a fixed number of molecules inside its volume in
//! every base time step while turned on, or once when a burst is armed.
//! Switching is usually driven by an external schedule; within the core the
//! injector only exposes `turn_on`/`turn_off`/`inject_burst`.

use log::debug;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, SimulationError};
use crate::geometry::{Geometry, Shape, Transformation};
use crate::particles::manager::MutationLog;
use crate::particles::molecule::Molecule;
use crate::scene::ObjectId;

/// Construction parameters for an [`Injector`].
#[derive(Debug, Clone)]
pub struct InjectorConfig {
    pub name: String,
    pub shape: Shape,
    pub translation: Vector3<f64>,
    pub rotation: Vector3<f64>,
    pub scale: Vector3<f64>,
    /// Component name of the object newly spawned molecules belong to.
    pub attached_object: String,
    /// Number of molecules spawned per base step while turned on.
    pub injection_amount: usize,
    /// Independent RNG seed. `None` borrows the kernel's generator.
    pub seed: Option<u64>,
    /// Whether the injector starts turned on.
    pub turned_on: bool,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            name: "injector".into(),
            shape: Shape::Point,
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            attached_object: String::new(),
            injection_amount: 0,
            seed: None,
            turned_on: true,
        }
    }
}

/// Spawns molecules into the staged mutation log each base step.
#[derive(Debug)]
pub struct Injector {
    name: String,
    geometry: Geometry,
    transformation: Transformation,
    attached_object_name: String,
    attached_object: Option<ObjectId>,
    injection_amount: usize,
    turned_on: bool,
    burst_armed: bool,
    /// Present when the injector was configured with its own seed;
    /// otherwise the kernel's generator is used.
    own_rng: Option<StdRng>,
}

impl Injector {
    pub fn new(config: InjectorConfig) -> Result<Self> {
        if config.attached_object.is_empty() {
            return Err(SimulationError::Configuration(format!(
                "injector \"{}\" needs an attached object so spawned \
                 molecules pick up a flow field",
                config.name
            )));
        }
        Ok(Self {
            name: config.name,
            geometry: Geometry::new(config.shape),
            transformation: Transformation::new(
                config.translation,
                config.rotation,
                config.scale,
            ),
            attached_object_name: config.attached_object,
            attached_object: None,
            injection_amount: config.injection_amount,
            turned_on: config.turned_on,
            burst_armed: false,
            own_rng: config.seed.map(StdRng::seed_from_u64),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attached_object_name(&self) -> &str {
        &self.attached_object_name
    }

    /// Resolve the attached object name, done once during scene linking.
    pub fn attach(&mut self, object_id: ObjectId) {
        self.attached_object = Some(object_id);
    }

    pub fn turn_on(&mut self) {
        self.turned_on = true;
    }

    pub fn turn_off(&mut self) {
        self.turned_on = false;
    }

    /// Inject in the next base step only.
    pub fn inject_burst(&mut self) {
        self.burst_armed = true;
    }

    pub fn is_on(&self) -> bool {
        self.turned_on
    }

    /// Stage this step's spawns. `kernel_rng` is the kernel-owned generator,
    /// used unless this injector carries its own.
    pub fn spawn(&mut self, log: &mut MutationLog, kernel_rng: &mut StdRng) {
        if !self.turned_on && !self.burst_armed {
            return;
        }
        self.burst_armed = false;

        debug!("\"{}\": injecting {} molecules", self.name, self.injection_amount);
        let geometry = self.geometry;
        let points_local: Vec<Vector3<f64>> = {
            let rng = self.own_rng.as_mut().unwrap_or(kernel_rng);
            match geometry.shape {
                Shape::Point => vec![Vector3::zeros(); self.injection_amount],
                _ => random_points_in_geometry(&geometry, self.injection_amount, rng),
            }
        };
        for local in points_local {
            let global = self.transformation.apply_to_point(&local);
            log.stage_insert(Molecule::new(global, Vector3::zeros(), self.attached_object));
        }
    }
}

/// Uniformly distributed points inside a unit geometry, by rejection
/// sampling from its bounding box.
fn random_points_in_geometry(
    geometry: &Geometry,
    n: usize,
    rng: &mut StdRng,
) -> Vec<Vector3<f64>> {
    let mut points = Vec::with_capacity(n);
    while points.len() < n {
        let candidate = Vector3::new(
            rng.gen_range(-0.5..=0.5),
            rng.gen_range(-0.5..=0.5),
            rng.gen_range(-0.5..=0.5),
        );
        if geometry.shape == Shape::Cube || geometry.contains(&candidate) {
            points.push(candidate);
        }
    }
    points
}
