//! molcom-rs: macroscopic molecular communication simulator
//!
//! Simulates discrete particles ("molecules") advected through precomputed
//! fluid-flow fields, so that spatial sensors can count, destroy, measure,
//! or hand particles over between independently meshed flow segments.
//!
//! # Architecture
//!
//! The crate separates three concerns:
//!
//! 1. **Flow data** ([`fields`]) - loading, caching, and interpolating the
//!    static velocity fields a CFD solver produced per geometry.
//! 2. **Scene** ([`scene`], [`sensors`], [`particles`]) - the geometric
//!    world: flow objects and their interconnections, passive sensors, and
//!    the particle collection with staged mutation.
//! 3. **Numerics** ([`movement`], [`kernel`]) - position prediction with
//!    selectable integration methods and the step loop with optional
//!    adaptive, error-controlled sub-stepping.
//!
//! # Quick Start
//!
//! ```rust
//! use molcom_rs::prelude::*;
//! use nalgebra::Vector3;
//!
//! # fn main() -> std::result::Result<(), molcom_rs::SimulationError> {
//! // A 5 cm tube with a known analytical flow profile.
//! let mut kernel = SimulationKernel::new(KernelConfig {
//!     sim_time_limit: 0.1,
//!     base_delta_time: 0.005,
//!     results_dir: std::env::temp_dir().join("molcom-quickstart"),
//!     ..Default::default()
//! });
//! kernel.attach_object(Box::new(AnalyticalTube::new(AnalyticalTubeConfig {
//!     name: "tube".into(),
//!     radius: 0.00075,
//!     length: 0.05,
//!     flow_rate_mlpmin: 5.0,
//!     ..Default::default()
//! })));
//! kernel.spawn_molecule(Vector3::new(0.0, 0.0, 0.0), Some(0));
//! kernel.run()?;
//! assert_eq!(kernel.molecules().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fields;
pub mod geometry;
pub mod kernel;
pub mod movement;
pub mod output;
pub mod particles;
pub mod scene;
pub mod sensors;

pub use error::{Result, SimulationError};

pub mod prelude {
    //! Convenient imports for assembling a simulation.
    pub use crate::error::{Result, SimulationError};
    pub use crate::fields::{FieldKey, FieldStore, FlowQuery, Interpolation};
    pub use crate::geometry::{Geometry, Shape, Transformation};
    pub use crate::kernel::{
        InitStage, KernelConfig, NotificationStage, SimulationClock, SimulationKernel,
    };
    pub use crate::movement::{Integration, MovementPredictor};
    pub use crate::output::{TraceConfig, TraceWriter};
    pub use crate::particles::{Injector, InjectorConfig, Molecule, MoleculeManager};
    pub use crate::scene::{
        AnalyticalTube, AnalyticalTubeConfig, FlowObject, Pump, PumpConfig, SceneManager, Tube,
        TubeConfig, YPiece, YPieceConfig,
    };
    pub use crate::sensors::{
        CountingSensor, CountingSensorConfig, DestructingSensor, DestructingSensorConfig,
        EmpiricalSensor, EmpiricalSensorConfig, ResponseCurve, Sensor, SensorManager,
        TeleportingSensor, TeleportingSensorConfig,
    };
}
