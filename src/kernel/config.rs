//! Typed kernel construction parameters.
//!
//! Configuration-file loading and inheritance live outside the core; this
//! struct is what such a loader ultimately produces. All fields carry
//! defaults so tests and examples can spell out only what they care about.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Result, SimulationError};
use crate::fields::Interpolation;
use crate::movement::Integration;

/// Kernel-level simulation parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Seed of the kernel-owned pseudo-random generator.
    pub seed: u64,
    /// Simulation end time in s.
    pub sim_time_limit: f64,
    /// Base time step in s. Adaptive sub-steps never exceed it, and all
    /// sensor evaluations and logging happen on this grid.
    pub base_delta_time: f64,
    /// Use the adaptive sub-stepping loop instead of fixed stepping.
    /// Requires an integration method with an embedded error estimate.
    pub use_adaptive_time_stepping: bool,
    /// Reject a sub-step whose error estimate exceeds this threshold.
    pub adaptive_time_max_error_threshold: f64,
    /// Safety factor applied to the optimal-step-size estimate, keeping
    /// the next step from landing right on the threshold.
    pub adaptive_time_safety_factor: f64,
    /// Retries within one sub-step before accepting it regardless.
    pub adaptive_time_corrections_limit: u32,
    pub integration_method: Integration,
    pub interpolation_method: Interpolation,
    /// Base directory for result files (sensor logs, particle traces).
    pub results_dir: PathBuf,
    /// Root directory of the CFD case exports.
    pub cases_root: PathBuf,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            sim_time_limit: 0.0,
            base_delta_time: 1.0,
            use_adaptive_time_stepping: false,
            adaptive_time_max_error_threshold: f64::INFINITY,
            adaptive_time_safety_factor: 0.85,
            adaptive_time_corrections_limit: 100,
            integration_method: Integration::default(),
            interpolation_method: Interpolation::default(),
            results_dir: PathBuf::from("results"),
            cases_root: PathBuf::from("cases"),
        }
    }
}

impl KernelConfig {
    /// Validate cross-field consistency. Called in the first init stage.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_delta_time > 0.0) {
            return Err(SimulationError::Configuration(format!(
                "base_delta_time must be positive, got {}",
                self.base_delta_time
            )));
        }
        if self.sim_time_limit < 0.0 {
            return Err(SimulationError::Configuration(format!(
                "sim_time_limit must not be negative, got {}",
                self.sim_time_limit
            )));
        }
        if !(0.0 < self.adaptive_time_safety_factor
            && self.adaptive_time_safety_factor <= 1.0)
        {
            return Err(SimulationError::Configuration(format!(
                "adaptive_time_safety_factor must be in (0, 1], got {}",
                self.adaptive_time_safety_factor
            )));
        }
        if !(self.adaptive_time_max_error_threshold > 0.0) {
            return Err(SimulationError::Configuration(format!(
                "adaptive_time_max_error_threshold must be positive (use \
                 infinity to never reject a step), got {}",
                self.adaptive_time_max_error_threshold
            )));
        }
        if self.use_adaptive_time_stepping
            && !self.integration_method.supports_time_step_control()
        {
            return Err(SimulationError::Configuration(format!(
                "adaptive time stepping needs an embedded integration \
                 method, got {:?}",
                self.integration_method
            )));
        }
        Ok(())
    }
}
