//! Movement prediction.
//!
//! The predictor advances one molecule by one candidate time step using a
//! selectable integration method. It is deliberately stateless: identical
//! inputs produce identical outputs, and all adaptation state (the running
//! step-size estimate) lives in the kernel's controller. The flow field is
//! sampled through the scene graph, which is what allows the Runge-Kutta
//! stages to evaluate velocities at off-grid sub-positions.

mod tableau;

pub use tableau::{EmbeddedSolution, EmbeddedTableau, RKF45, RKF45_STAGES};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::particles::Molecule;
use crate::scene::SceneManager;

/// Selectable integration method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Integration {
    /// One velocity sample per step, first-order accurate.
    Euler,
    /// Classical fourth-order Runge-Kutta, four samples per step.
    #[default]
    RungeKutta4,
    /// Embedded Fehlberg 4(5) pair, six samples per step plus an error
    /// estimate. Required for adaptive time stepping.
    RungeKuttaFehlberg45,
    /// The Fehlberg pair, but committing the lower-order solution.
    /// Only useful for validating the error estimate itself.
    RungeKuttaFehlberg4,
}

impl Integration {
    /// Whether the method produces the error estimate adaptive stepping
    /// needs.
    pub fn supports_time_step_control(self) -> bool {
        matches!(
            self,
            Integration::RungeKuttaFehlberg45 | Integration::RungeKuttaFehlberg4
        )
    }

    /// Order of the committed solution, used by the step-size controller.
    pub fn order(self) -> u32 {
        match self {
            Integration::Euler => 1,
            Integration::RungeKutta4 => 4,
            Integration::RungeKuttaFehlberg45 => 5,
            Integration::RungeKuttaFehlberg4 => 4,
        }
    }
}

/// Outcome of a single prediction.
#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    /// Predicted global position after the step.
    pub position: Vector3<f64>,
    /// Local error estimate; 0 for methods without an embedded pair.
    pub error: f64,
}

/// Predicts new molecule positions from the local flow.
#[derive(Debug, Clone)]
pub struct MovementPredictor {
    method: Integration,
}

impl MovementPredictor {
    pub fn new(method: Integration) -> Self {
        Self { method }
    }

    pub fn method(&self) -> Integration {
        self.method
    }

    /// Predict the position of `molecule` after `dt`, sampling the flow of
    /// its owning object. Molecules without an owning object only drift
    /// with their intrinsic velocity.
    pub fn predict(
        &self,
        scene: &SceneManager,
        molecule: &Molecule,
        sim_time: f64,
        dt: f64,
    ) -> Result<Prediction> {
        let position = molecule.position;
        let Some(object_id) = molecule.object_id else {
            return Ok(Prediction {
                position: position + molecule.velocity * dt,
                error: 0.0,
            });
        };

        let flow_at = |t: f64, p: &Vector3<f64>| scene.flow_at(object_id, p, t);

        let (mut new_position, error) = match self.method {
            Integration::Euler => {
                let k1 = flow_at(sim_time, &position)? * dt;
                (position + k1, 0.0)
            }
            Integration::RungeKutta4 => {
                let k1 = flow_at(sim_time, &position)? * dt;
                let k2 = flow_at(sim_time + dt / 2.0, &(position + k1 / 2.0))? * dt;
                let k3 = flow_at(sim_time + dt / 2.0, &(position + k2 / 2.0))? * dt;
                let k4 = flow_at(sim_time + dt, &(position + k3))? * dt;
                (
                    position + k1 / 6.0 + k2 / 3.0 + k3 / 3.0 + k4 / 6.0,
                    0.0,
                )
            }
            Integration::RungeKuttaFehlberg45 | Integration::RungeKuttaFehlberg4 => {
                let solution = RKF45.compute(flow_at, sim_time, &position, dt)?;
                let committed = if self.method == Integration::RungeKuttaFehlberg4 {
                    solution.low
                } else {
                    solution.high
                };
                (committed, solution.error)
            }
        };

        // Intrinsic drift applies after the field displacement.
        new_position += molecule.velocity * dt;
        Ok(Prediction {
            position: new_position,
            error,
        })
    }
}
