//! The simulation kernel: staged startup, the step loop, and component
//! notification.

mod clock;
mod config;

pub use clock::{SimulationClock, StepSizeController, StepVerdict};
pub use config::KernelConfig;

use std::fs;

use log::{debug, info, warn};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Result, SimulationError};
use crate::fields::FieldStore;
use crate::movement::MovementPredictor;
use crate::output::TraceWriter;
use crate::particles::{Injector, MoleculeId, MoleculeManager, MutationLog};
use crate::scene::{FlowObject, ObjectId, ObjectInitContext, SceneManager};
use crate::sensors::{Sensor, SensorInitContext, SensorManager, StepContext};

/// Ordered initialization stages.
///
/// Every component finishes a stage before any component enters the next
/// one, so cross-component references (teleporter targets, sensor
/// subscriptions, flow-rate links) always resolve against fully built
/// predecessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    CheckArguments,
    CreateFolders,
    CreateFiles,
    CreateDataStructures,
    BuildScene,
    CreateTeleporters,
    RegisterSensors,
    CreateSensorSubscriptions,
    SetUpFlowSystem,
}

impl InitStage {
    pub const ALL: [InitStage; 9] = [
        InitStage::CheckArguments,
        InitStage::CreateFolders,
        InitStage::CreateFiles,
        InitStage::CreateDataStructures,
        InitStage::BuildScene,
        InitStage::CreateTeleporters,
        InitStage::RegisterSensors,
        InitStage::CreateSensorSubscriptions,
        InitStage::SetUpFlowSystem,
    ];
}

/// Ordered notification stages within one committed base step.
///
/// Pumps actuate first so that spawning and logging already see the
/// updated flow state of the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStage {
    Actuation,
    Spawning,
    Logging,
}

impl NotificationStage {
    pub const ALL: [NotificationStage; 3] = [
        NotificationStage::Actuation,
        NotificationStage::Spawning,
        NotificationStage::Logging,
    ];
}

/// Relative/absolute closeness test for the sub-step grid, guarding the
/// "strictly less than" loop condition against accumulated rounding.
fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-10 * b.abs().max(a.abs()) + 1e-15
}

/// Owns all components and drives the simulation.
#[derive(Debug)]
pub struct SimulationKernel {
    config: KernelConfig,
    clock: SimulationClock,
    rng: StdRng,
    store: FieldStore,
    scene: SceneManager,
    predictor: MovementPredictor,
    controller: StepSizeController,
    molecules: MoleculeManager,
    staged: MutationLog,
    sensors: SensorManager,
    injectors: Vec<Injector>,
    trace: Option<TraceWriter>,
    initialized: bool,
    initial_state_notified: bool,
}

impl SimulationKernel {
    pub fn new(config: KernelConfig) -> Self {
        let clock = SimulationClock::new(config.base_delta_time, config.sim_time_limit);
        let controller = StepSizeController::new(
            config.base_delta_time,
            config.adaptive_time_max_error_threshold,
            config.adaptive_time_safety_factor,
            config.adaptive_time_corrections_limit,
            config.integration_method.order(),
        );
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            store: FieldStore::new(&config.cases_root),
            scene: SceneManager::new(),
            predictor: MovementPredictor::new(config.integration_method),
            controller,
            molecules: MoleculeManager::new(),
            staged: MutationLog::new(),
            sensors: SensorManager::new(),
            injectors: Vec::new(),
            trace: None,
            initialized: false,
            initial_state_notified: false,
            clock,
            config,
        }
    }

    // ----- component registration -------------------------------------

    pub fn attach_object(&mut self, object: Box<dyn FlowObject>) -> ObjectId {
        self.scene.add_object(object)
    }

    pub fn attach_sensor(&mut self, sensor: Box<dyn Sensor>) {
        self.sensors.register_sensor(sensor);
    }

    pub fn attach_injector(&mut self, injector: Injector) {
        self.injectors.push(injector);
    }

    pub fn attach_trace_writer(&mut self, trace: TraceWriter) {
        self.trace = Some(trace);
    }

    // ----- accessors ---------------------------------------------------

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn scene(&self) -> &SceneManager {
        &self.scene
    }

    pub fn molecules(&self) -> &MoleculeManager {
        &self.molecules
    }

    pub fn sensor_mut(&mut self, name: &str) -> Option<&mut (dyn Sensor + '_)> {
        self.sensors.sensor_mut(name)
    }

    pub fn injector_mut(&mut self, name: &str) -> Option<&mut Injector> {
        self.injectors.iter_mut().find(|i| i.name() == name)
    }

    /// Spawn a molecule directly, outside any injector. Staged like every
    /// other insertion and committed at the next commit point.
    pub fn spawn_molecule(&mut self, position: Vector3<f64>, object_id: Option<ObjectId>) {
        self.staged
            .stage_insert(crate::particles::Molecule::new(
                position,
                Vector3::zeros(),
                object_id,
            ));
    }

    // ----- initialization ----------------------------------------------

    /// Run all initialization stages in order. A failure aborts startup
    /// and names the failing component and stage.
    pub fn initialize(&mut self) -> Result<()> {
        for stage in InitStage::ALL {
            info!("running initialization stage {stage:?}");
            self.run_stage(stage)?;
        }
        self.initialized = true;
        Ok(())
    }

    fn run_stage(&mut self, stage: InitStage) -> Result<()> {
        // The kernel's own work per stage comes first, mirroring its
        // position at the head of the component order.
        match stage {
            InitStage::CheckArguments => {
                self.config
                    .validate()
                    .map_err(|e| e.during_startup(stage, "simulation_kernel"))?;
                if self.config.use_adaptive_time_stepping
                    && self.config.adaptive_time_max_error_threshold.is_infinite()
                {
                    warn!(
                        "adaptive time stepping is enabled but no error \
                         threshold is set; steps will never be rejected"
                    );
                }
            }
            InitStage::CreateFolders => {
                fs::create_dir_all(&self.config.results_dir)
                    .map_err(|e| {
                        SimulationError::Io(e).during_startup(stage, "simulation_kernel")
                    })?;
                if let Some(trace) = self.trace.as_mut() {
                    trace
                        .create_folder(&self.config.results_dir)
                        .map_err(|e| e.during_startup(stage, "trace_writer"))?;
                }
            }
            InitStage::BuildScene => {
                self.scene
                    .validate()
                    .map_err(|e| e.during_startup(stage, "scene_manager"))?;
                for injector in &mut self.injectors {
                    let object_id = self
                        .scene
                        .object_id_by_name(injector.attached_object_name())
                        .map_err(|e| e.during_startup(stage, injector.name()))?;
                    injector.attach(object_id);
                }
            }
            InitStage::SetUpFlowSystem => {
                self.scene.set_up_flow_system(&mut self.store)?;
            }
            _ => {}
        }

        let mut object_ctx = ObjectInitContext {
            store: &mut self.store,
            interpolation: self.config.interpolation_method,
            results_dir: &self.config.results_dir,
        };
        self.scene.initialize_objects(stage, &mut object_ctx)?;

        let mut sensor_ctx = SensorInitContext {
            scene: &mut self.scene,
            store: &mut self.store,
            results_dir: &self.config.results_dir,
        };
        self.sensors.initialize(stage, &mut sensor_ctx)?;
        Ok(())
    }

    // ----- simulation loop ----------------------------------------------

    /// Initialize (unless already done) and run until the time limit, then
    /// flush and close all sensor logs.
    pub fn run(&mut self) -> Result<()> {
        self.run_until(self.config.sim_time_limit)?;
        info!(
            "finalizing after {} base steps ({} sub-steps, {} degraded)",
            self.clock.elapsed_base_steps,
            self.clock.elapsed_sub_steps,
            self.clock.degraded_steps
        );
        self.sensors.finish_all()
    }

    /// Advance base steps until simulation time reaches `until` (bounded by
    /// the configured time limit). Sensor logs stay open, so the caller can
    /// reconfigure sensors and continue.
    pub fn run_until(&mut self, until: f64) -> Result<()> {
        if !self.initialized {
            info!("initializing components...");
            self.initialize()?;
        }
        let until = until.min(self.config.sim_time_limit);
        if !self.initial_state_notified {
            info!("starting simulation loop...");
            // Give all observers a look at the initial system at t = 0.
            self.notify_new_time_step()?;
            self.initial_state_notified = true;
        }
        while self.clock.sim_time < until && !is_close(self.clock.sim_time, until) {
            if self.config.use_adaptive_time_stepping {
                self.advance_base_step_adaptive()?;
            } else {
                self.advance_base_step_fixed()?;
            }
            self.clock.advance_base_step();
            debug!("new simulation time {}", self.clock.sim_time);
            self.notify_new_time_step()?;
        }
        Ok(())
    }

    /// One base step at the fixed base step size: per molecule, the
    /// before-hooks, one prediction, the position commit, and the
    /// after-hooks; staged mutations commit at the end.
    fn advance_base_step_fixed(&mut self) -> Result<()> {
        let dt = self.clock.base_delta_time;
        let sim_time = self.clock.sim_time;
        for id in self.molecules.ids() {
            let Some(molecule) = self.molecules.get(id) else {
                continue;
            };
            let mut molecule = molecule.clone();
            {
                let mut ctx = StepContext {
                    scene: &self.scene,
                    staged: &mut self.staged,
                    sim_time,
                };
                self.sensors.notify_before_move(&mut ctx, &mut molecule);
            }
            let prediction = self
                .predictor
                .predict(&self.scene, &molecule, sim_time, dt)?;
            molecule.commit_position(prediction.position, &self.scene);
            {
                let mut ctx = StepContext {
                    scene: &self.scene,
                    staged: &mut self.staged,
                    sim_time,
                };
                self.sensors.notify_after_move(&mut ctx, &mut molecule);
            }
            self.molecules.replace(molecule);
        }
        self.molecules.apply_changes(&mut self.staged);
        self.clock.elapsed_sub_steps += 1;
        Ok(())
    }

    /// One base step under adaptive sub-stepping.
    ///
    /// All molecules advance in lockstep: each sub-step proposes one step
    /// size from the shared controller, evaluates every molecule, and
    /// judges the worst error. A rejected sub-step shrinks the step size
    /// and re-evaluates every molecule; after the correction budget is
    /// spent the step is accepted with degraded accuracy. Sensor hooks
    /// stay on the base-step grid: all before-hooks run first, all
    /// after-hooks after the full base interval.
    fn advance_base_step_adaptive(&mut self) -> Result<()> {
        let base_start = self.clock.sim_time;
        let base_end = base_start + self.clock.base_delta_time;
        let ids: Vec<MoleculeId> = self.molecules.ids();

        for &id in &ids {
            let Some(molecule) = self.molecules.get(id) else {
                continue;
            };
            let mut molecule = molecule.clone();
            let mut ctx = StepContext {
                scene: &self.scene,
                staged: &mut self.staged,
                sim_time: base_start,
            };
            self.sensors.notify_before_move(&mut ctx, &mut molecule);
            self.molecules.replace(molecule);
        }

        let mut sub_time = base_start;
        let mut candidates: Vec<(MoleculeId, Vector3<f64>)> = Vec::with_capacity(ids.len());
        while sub_time < base_end && !is_close(sub_time, base_end) {
            let remaining = base_end - sub_time;
            let mut dt = self.controller.propose(remaining);
            let mut corrections: u32 = 0;
            loop {
                candidates.clear();
                let mut max_error: f64 = 0.0;
                for &id in &ids {
                    let Some(molecule) = self.molecules.get(id) else {
                        continue;
                    };
                    let prediction =
                        self.predictor.predict(&self.scene, molecule, sub_time, dt)?;
                    max_error = max_error.max(prediction.error);
                    candidates.push((id, prediction.position));
                }
                let verdict = self.controller.assess(max_error, dt);
                if verdict == StepVerdict::Accept {
                    break;
                }
                if corrections >= self.controller.corrections_limit() {
                    self.controller
                        .report_divergence(&mut self.clock, sub_time, max_error);
                    break;
                }
                corrections += 1;
                dt = self.controller.propose(remaining);
            }
            for (id, position) in candidates.drain(..) {
                let Some(molecule) = self.molecules.get(id) else {
                    continue;
                };
                let mut molecule = molecule.clone();
                molecule.commit_position(position, &self.scene);
                self.molecules.replace(molecule);
            }
            sub_time += dt;
            self.clock.elapsed_sub_steps += 1;
        }

        for &id in &ids {
            let Some(molecule) = self.molecules.get(id) else {
                continue;
            };
            let mut molecule = molecule.clone();
            let mut ctx = StepContext {
                scene: &self.scene,
                staged: &mut self.staged,
                sim_time: base_end,
            };
            self.sensors.notify_after_move(&mut ctx, &mut molecule);
            self.molecules.replace(molecule);
        }
        self.molecules.apply_changes(&mut self.staged);
        Ok(())
    }

    /// Notify all components of a committed base step, in the fixed stage
    /// order, then commit any staged spawns so they take part in the next
    /// step.
    fn notify_new_time_step(&mut self) -> Result<()> {
        for stage in NotificationStage::ALL {
            self.scene
                .notify_objects(&mut self.store, &self.clock, stage)?;
            if stage == NotificationStage::Spawning {
                for injector in &mut self.injectors {
                    injector.spawn(&mut self.staged, &mut self.rng);
                }
            }
            self.sensors.notify_time_step(&self.clock, stage);
            if stage == NotificationStage::Logging {
                if let Some(trace) = self.trace.as_ref() {
                    trace.write(&self.molecules, &self.clock)?;
                }
            }
        }
        self.molecules.apply_changes(&mut self.staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{AnalyticalTube, AnalyticalTubeConfig};

    fn test_config(tmp: &std::path::Path, limit: f64, base_dt: f64) -> KernelConfig {
        KernelConfig {
            sim_time_limit: limit,
            base_delta_time: base_dt,
            results_dir: tmp.join("results"),
            cases_root: tmp.join("cases"),
            ..Default::default()
        }
    }

    fn analytic_kernel(tmp: &std::path::Path, limit_steps: u64, base_dt: f64) -> SimulationKernel {
        let mut kernel =
            SimulationKernel::new(test_config(tmp, limit_steps as f64 * base_dt, base_dt));
        kernel.attach_object(Box::new(AnalyticalTube::new(AnalyticalTubeConfig {
            name: "tube".into(),
            radius: 0.001,
            length: 1.0,
            flow_rate_mlpmin: 9.42477796, // 0.05 m/s mean, 0.1 m/s peak
            ..Default::default()
        })));
        kernel
    }

    #[test]
    fn a_molecule_rides_the_axial_flow() {
        let tmp = tempfile::tempdir().unwrap();
        let mut kernel = analytic_kernel(tmp.path(), 10, 0.01);
        kernel.spawn_molecule(Vector3::new(0.0, 0.0, 0.0), Some(0));
        kernel.run().unwrap();

        assert_eq!(kernel.clock().elapsed_base_steps, 10);
        let molecule = kernel.molecules().get_all().next().unwrap();
        // 10 steps of 0.01 s at the 0.1 m/s peak speed.
        assert!((molecule.position.z - 0.01).abs() < 1e-9);
    }

    #[test]
    fn fixed_and_adaptive_agree_on_an_exactly_integrable_flow() {
        let run = |adaptive: bool| {
            let tmp = tempfile::tempdir().unwrap();
            let mut kernel = SimulationKernel::new(KernelConfig {
                use_adaptive_time_stepping: adaptive,
                integration_method: crate::movement::Integration::RungeKuttaFehlberg45,
                adaptive_time_max_error_threshold: 1e-9,
                ..test_config(tmp.path(), 0.05, 0.01)
            });
            kernel.attach_object(Box::new(AnalyticalTube::new(AnalyticalTubeConfig {
                name: "tube".into(),
                radius: 0.001,
                length: 1.0,
                flow_rate_mlpmin: 9.42477796,
                ..Default::default()
            })));
            kernel.spawn_molecule(Vector3::zeros(), Some(0));
            kernel.run().unwrap();
            let position = kernel
                .molecules()
                .get_all()
                .next()
                .unwrap()
                .position;
            position
        };
        let fixed = run(false);
        let adaptive = run(true);
        assert!((fixed - adaptive).norm() < 1e-9);
    }

    #[test]
    fn adaptive_counts_sub_steps_separately() {
        let tmp = tempfile::tempdir().unwrap();
        let mut kernel = SimulationKernel::new(KernelConfig {
            use_adaptive_time_stepping: true,
            integration_method: crate::movement::Integration::RungeKuttaFehlberg45,
            adaptive_time_max_error_threshold: 1e-9,
            ..test_config(tmp.path(), 0.02, 0.01)
        });
        kernel.attach_object(Box::new(AnalyticalTube::new(AnalyticalTubeConfig {
            name: "tube".into(),
            radius: 0.001,
            length: 1.0,
            flow_rate_mlpmin: 9.42477796,
            ..Default::default()
        })));
        kernel.spawn_molecule(Vector3::zeros(), Some(0));
        kernel.run().unwrap();
        assert_eq!(kernel.clock().elapsed_base_steps, 2);
        assert!(kernel.clock().elapsed_sub_steps >= 2);
    }

    #[test]
    fn startup_failure_names_stage_and_component() {
        let tmp = tempfile::tempdir().unwrap();
        let mut kernel = SimulationKernel::new(KernelConfig {
            use_adaptive_time_stepping: true,
            // RK4 has no error estimate, so this must fail CheckArguments.
            integration_method: crate::movement::Integration::RungeKutta4,
            ..test_config(tmp.path(), 1.0, 0.1)
        });
        let err = kernel.initialize().unwrap_err();
        match err {
            SimulationError::Startup { stage, component, .. } => {
                assert_eq!(stage, InitStage::CheckArguments);
                assert_eq!(component, "simulation_kernel");
            }
            other => panic!("expected a startup error, got {other:?}"),
        }
    }

    #[test]
    fn time_limit_zero_runs_no_steps() {
        let tmp = tempfile::tempdir().unwrap();
        let mut kernel = analytic_kernel(tmp.path(), 0, 0.01);
        kernel.run().unwrap();
        assert_eq!(kernel.clock().elapsed_base_steps, 0);
    }
}
