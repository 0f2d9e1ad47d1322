//! Simulation time bookkeeping and adaptive step-size control.

use log::warn;

/// Scalar simulation time plus step counters. Mutated only by the kernel.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    /// Current simulation time in s.
    pub sim_time: f64,
    /// Base time step in s.
    pub base_delta_time: f64,
    /// Simulation end time in s.
    pub sim_time_limit: f64,
    /// Completed base steps. Simulation time is derived from this count,
    /// not accumulated, so it cannot drift.
    pub elapsed_base_steps: u64,
    /// Completed sub-steps, counting every accepted adaptive sub-step.
    /// Equal to `elapsed_base_steps` under fixed stepping.
    pub elapsed_sub_steps: u64,
    /// Sub-steps accepted after the correction budget ran out, i.e. with
    /// degraded accuracy.
    pub degraded_steps: u64,
}

impl SimulationClock {
    pub fn new(base_delta_time: f64, sim_time_limit: f64) -> Self {
        Self {
            sim_time: 0.0,
            base_delta_time,
            sim_time_limit,
            elapsed_base_steps: 0,
            elapsed_sub_steps: 0,
            degraded_steps: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.sim_time >= self.sim_time_limit
    }

    /// Advance by one base step; time is recomputed from the step count.
    pub fn advance_base_step(&mut self) {
        self.elapsed_base_steps += 1;
        self.sim_time = self.elapsed_base_steps as f64 * self.base_delta_time;
    }
}

/// Whether a proposed sub-step survived the error check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepVerdict {
    Accept,
    Reject,
}

/// Bounds on the per-assessment step scale factor. Without them a single
/// wild error measurement could collapse the step size to a denormal or
/// balloon it past any usable range.
const MIN_SCALE_FACTOR: f64 = 0.1;
const MAX_SCALE_FACTOR: f64 = 4.0;

/// Shared adaptive step-size controller.
///
/// One instance is owned by the kernel and consulted for every sub-step;
/// all molecules advance with the same proposed step, which keeps them on a
/// single simulation-time grid. The running optimal-step estimate follows
/// the standard embedded-pair update: scale the tried step by
/// `(threshold / error)` raised to `1 / order` on acceptance (growth) or
/// `1 / (order + 1)` on rejection (shrink), damped by a safety factor and
/// clamped to [`MIN_SCALE_FACTOR`, `MAX_SCALE_FACTOR`].
#[derive(Debug, Clone)]
pub struct StepSizeController {
    base_delta_time: f64,
    max_error_threshold: f64,
    safety_factor: f64,
    corrections_limit: u32,
    /// Order of the integration method's committed solution.
    order: u32,
    /// Running estimate of the optimal step size; infinite until the first
    /// error measurement arrives.
    delta_time_opt: f64,
}

impl StepSizeController {
    pub fn new(
        base_delta_time: f64,
        max_error_threshold: f64,
        safety_factor: f64,
        corrections_limit: u32,
        order: u32,
    ) -> Self {
        Self {
            base_delta_time,
            max_error_threshold,
            safety_factor,
            corrections_limit,
            order,
            delta_time_opt: f64::INFINITY,
        }
    }

    pub fn corrections_limit(&self) -> u32 {
        self.corrections_limit
    }

    pub fn max_error_threshold(&self) -> f64 {
        self.max_error_threshold
    }

    /// Step size to try next: the running optimal estimate, clamped by the
    /// base step and by the remainder of the current base interval so a
    /// sub-step never overshoots the notification grid.
    pub fn propose(&self, remaining_in_base_step: f64) -> f64 {
        self.delta_time_opt
            .min(self.base_delta_time)
            .min(remaining_in_base_step.abs())
    }

    /// Judge a tried step against the error threshold and update the
    /// optimal-step estimate.
    pub fn assess(&mut self, error: f64, tried_dt: f64) -> StepVerdict {
        let verdict = if error > self.max_error_threshold {
            StepVerdict::Reject
        } else {
            StepVerdict::Accept
        };
        if error == 0.0 {
            self.delta_time_opt = f64::INFINITY;
            return verdict;
        }
        let exponent = if error >= self.max_error_threshold {
            1.0 / (self.order as f64 + 1.0)
        } else {
            1.0 / self.order as f64
        };
        let factor = (self.max_error_threshold / error)
            .powf(exponent)
            .clamp(MIN_SCALE_FACTOR, MAX_SCALE_FACTOR);
        self.delta_time_opt = self.safety_factor * tried_dt * factor;
        verdict
    }

    /// Report a sub-step that ran out of corrections. The step is accepted
    /// with degraded accuracy rather than aborting the run, and the
    /// optimal-step estimate starts over: an estimate that failed a whole
    /// correction budget carries no useful information for the next step.
    pub fn report_divergence(&mut self, clock: &mut SimulationClock, sub_time: f64, error: f64) {
        clock.degraded_steps += 1;
        self.delta_time_opt = f64::INFINITY;
        warn!(
            "correction limit ({}) exceeded at sub-step time {sub_time} s; \
             accepting step with error {error:e} above threshold {:e}",
            self.corrections_limit, self.max_error_threshold
        );
    }
}
