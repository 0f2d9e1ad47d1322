//! Error taxonomy for the simulator.
//!
//! Startup problems (bad parameters, unreadable or mismatched flow fields)
//! are fatal and abort before the step loop begins. Per-step conditions are
//! deliberately *not* represented here: an adaptive step that exhausts its
//! correction budget is accepted with a warning, and an out-of-field flow
//! query is a sentinel value ([`crate::fields::FlowQuery::OutOfField`]), not
//! an error.

use std::path::PathBuf;

use thiserror::Error;

use crate::kernel::InitStage;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SimulationError>;

#[derive(Debug, Error)]
pub enum SimulationError {
    /// Missing or invalid construction parameters. Caught at startup.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A raw flow-field dataset or cache file could not be parsed.
    #[error("failed to parse flow field data at {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// No raw or cached dataset matches the requested geometry parameters,
    /// or a reloaded dataset no longer matches the mesh it replaces.
    #[error("geometry mismatch for field key \"{key}\": {reason}")]
    GeometryMismatch { key: String, reason: String },

    /// A component failed during one of the ordered initialization stages.
    /// Wraps the originating error so the failing component and stage are
    /// both visible.
    #[error("startup stage {stage:?} failed for component \"{component}\": {source}")]
    Startup {
        stage: InitStage,
        component: String,
        #[source]
        source: Box<SimulationError>,
    },

    /// The flow field produced a non-finite velocity. Always a bug in the
    /// input data or the interpolation setup, never recoverable mid-run.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimulationError {
    /// Wrap an error with the initialization stage and component in which
    /// it occurred.
    pub fn during_startup(self, stage: InitStage, component: &str) -> Self {
        SimulationError::Startup {
            stage,
            component: component.to_string(),
            source: Box::new(self),
        }
    }
}
