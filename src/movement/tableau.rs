//! Embedded Runge-Kutta tableaus.
//!
//! An embedded method evaluates one set of stages and combines them twice,
//! once with the higher-order weights and once with the lower-order ones.
//! The difference of the two solutions estimates the local truncation
//! error without any extra stage evaluations, which is what makes adaptive
//! step-size control affordable.

use nalgebra::Vector3;

use crate::error::Result;

/// Number of stages of the Fehlberg 4(5) pair.
pub const RKF45_STAGES: usize = 6;

/// Result of one embedded integration step.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedSolution {
    /// Higher-order solution, normally the one to keep.
    pub high: Vector3<f64>,
    /// Lower-order companion solution.
    pub low: Vector3<f64>,
    /// Euclidean norm of the difference, the local error estimate.
    pub error: f64,
}

/// Butcher tableau of an embedded Runge-Kutta pair with six stages.
///
/// `a` is the stage coupling matrix (strictly lower triangular), `c` the
/// stage time fractions, and `b_high`/`b_low` the combination weights of
/// the higher- and lower-order solution.
#[derive(Debug, Clone)]
pub struct EmbeddedTableau {
    pub a: [[f64; RKF45_STAGES]; RKF45_STAGES],
    pub b_high: [f64; RKF45_STAGES],
    pub b_low: [f64; RKF45_STAGES],
    pub c: [f64; RKF45_STAGES],
    /// Order of the higher-order member of the pair.
    pub order: u32,
}

/// The classic Fehlberg 4(5) coefficients.
pub const RKF45: EmbeddedTableau = EmbeddedTableau {
    a: [
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [1.0 / 4.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [3.0 / 32.0, 9.0 / 32.0, 0.0, 0.0, 0.0, 0.0],
        [1932.0 / 2197.0, -7200.0 / 2197.0, 7296.0 / 2197.0, 0.0, 0.0, 0.0],
        [439.0 / 216.0, -8.0, 3680.0 / 513.0, -845.0 / 4104.0, 0.0, 0.0],
        [-8.0 / 27.0, 2.0, -3544.0 / 2565.0, 1859.0 / 4104.0, -11.0 / 40.0, 0.0],
    ],
    b_high: [
        16.0 / 135.0,
        0.0,
        6656.0 / 12825.0,
        28561.0 / 56430.0,
        -9.0 / 50.0,
        2.0 / 55.0,
    ],
    b_low: [25.0 / 216.0, 0.0, 1408.0 / 2565.0, 2197.0 / 4104.0, -1.0 / 5.0, 0.0],
    c: [0.0, 1.0 / 4.0, 3.0 / 8.0, 12.0 / 13.0, 1.0, 1.0 / 2.0],
    order: 5,
};

impl EmbeddedTableau {
    /// Advance `y_old` by `dt` for dy/dt = f(t, y).
    ///
    /// `f` may fail (a flow lookup can reject NaN field data); the failure
    /// propagates out of the step unchanged.
    pub fn compute<F>(
        &self,
        mut f: F,
        t_old: f64,
        y_old: &Vector3<f64>,
        dt: f64,
    ) -> Result<EmbeddedSolution>
    where
        F: FnMut(f64, &Vector3<f64>) -> Result<Vector3<f64>>,
    {
        let mut k = [Vector3::zeros(); RKF45_STAGES];
        let mut high_sum = Vector3::zeros();
        let mut low_sum = Vector3::zeros();
        for i in 0..RKF45_STAGES {
            let mut stage_offset = Vector3::zeros();
            for j in 0..i {
                stage_offset += k[j] * self.a[i][j];
            }
            k[i] = f(t_old + self.c[i] * dt, &(y_old + stage_offset * dt))?;
            high_sum += k[i] * self.b_high[i];
            low_sum += k[i] * self.b_low[i];
        }
        let high = y_old + high_sum * dt;
        let low = y_old + low_sum * dt;
        Ok(EmbeddedSolution {
            high,
            low,
            error: (high - low).norm(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_fractions_are_consistent_with_the_coupling_matrix() {
        // Each c_i must equal the row sum of a_i, a standard consistency
        // condition for Runge-Kutta tableaus.
        for i in 0..RKF45_STAGES {
            let row_sum: f64 = RKF45.a[i].iter().sum();
            assert!(
                (row_sum - RKF45.c[i]).abs() < 1e-12,
                "row {i}: {row_sum} vs {}",
                RKF45.c[i]
            );
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let high: f64 = RKF45.b_high.iter().sum();
        let low: f64 = RKF45.b_low.iter().sum();
        assert!((high - 1.0).abs() < 1e-12);
        assert!((low - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_derivative_is_exact_with_zero_error() {
        let v = Vector3::new(0.1, -0.2, 0.3);
        let solution = RKF45
            .compute(|_, _| Ok(v), 0.0, &Vector3::zeros(), 2.0)
            .unwrap();
        assert!((solution.high - v * 2.0).norm() < 1e-14);
        assert!(solution.error < 1e-14);
    }

    #[test]
    fn linear_in_time_derivative_is_exact_for_both_orders() {
        // dy/dt = (t, 0, 0): y(1) = (0.5, 0, 0). Polynomials of degree 1
        // are integrated exactly by both members of the pair.
        let solution = RKF45
            .compute(
                |t, _| Ok(Vector3::new(t, 0.0, 0.0)),
                0.0,
                &Vector3::zeros(),
                1.0,
            )
            .unwrap();
        assert!((solution.high.x - 0.5).abs() < 1e-13);
        assert!((solution.low.x - 0.5).abs() < 1e-13);
    }

    #[test]
    fn error_estimate_shrinks_with_the_fifth_power_of_dt() {
        // For a smooth nonlinear field the error estimate of a 4(5) pair
        // scales like dt^5.
        let f = |_t: f64, y: &Vector3<f64>| Ok(Vector3::new(y.y * y.y, y.x, 1.0));
        let y0 = Vector3::new(0.3, 0.7, 0.0);
        let error_at = |dt: f64| RKF45.compute(f, 0.0, &y0, dt).unwrap().error;
        let ratio = error_at(0.2) / error_at(0.1);
        assert!(
            (16.0..64.0).contains(&ratio),
            "expected roughly 2^5 scaling, got {ratio}"
        );
    }
}
