//! L-stable third-order Rosenbrock integrator with an embedded error
//! estimate, after the ROS3 method of the KPP solver family.
//!
//! One LU factorisation per step serves all three stages; the step size
//! adapts to the embedded second-order error estimate and the integration
//! fails only when the step underflows or the linear solve degenerates.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

// ROS3 coefficients (L-stable, stiffly accurate embedded pair).
const GAMMA: f64 = 0.43586652150845899941601945119356;
const A21: f64 = 1.0;
const C21: f64 = -1.0156171083877702091975600115545;
const C31: f64 = 4.0759956452537699824805835358067;
const C32: f64 = 9.2076794298330791242156818474003;
const B1: f64 = 1.0;
const B2: f64 = 6.1697947043828245592553615689730;
const B3: f64 = -0.42772256543218573326238373806514;
const E1: f64 = 0.5;
const E2: f64 = -2.9079558716805469821718236208017;
const E3: f64 = 0.22354069897811569627360909276199;
// inverse of the embedded order + 1
const ERR_EXPONENT: f64 = -1.0 / 3.0;

const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 6.0;
const FAC_SAFE: f64 = 0.9;

/// Integration failure causes.
#[derive(Debug, Error)]
pub enum RosenbrockError {
    /// The controller pushed the step below the minimum without meeting the
    /// tolerance.
    #[error("step size underflow at t = {t:.3e} s (h = {h:.3e} s)")]
    StepUnderflow {
        /// Integration time reached.
        t: f64,
        /// Step size at failure.
        h: f64,
    },
    /// The stage matrix became singular.
    #[error("singular stage matrix at t = {t:.3e} s")]
    SingularMatrix {
        /// Integration time reached.
        t: f64,
    },
    /// The step budget was exhausted before reaching the end time.
    #[error("more than {max_steps} steps taken")]
    TooManySteps {
        /// The configured step budget.
        max_steps: usize,
    },
}

/// Tolerances and step-control limits.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance [molecules cm⁻³].
    pub atol: f64,
    /// Smallest admissible step [s].
    pub h_min: f64,
    /// Step budget per integration.
    pub max_steps: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            rtol: 1.0e-3,
            atol: 1.0e-2,
            h_min: 1.0e-8,
            max_steps: 10_000,
        }
    }
}

/// Counters reported by a successful integration.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
    /// Accepted steps.
    pub accepted: usize,
    /// Rejected steps.
    pub rejected: usize,
}

/// An autonomous ODE system with an analytic Jacobian.
pub trait OdeSystem {
    /// Dimension of the state vector.
    fn dim(&self) -> usize;

    /// Time derivative at `y`.
    fn rhs(&self, y: &[f64], dydt: &mut [f64]);

    /// Jacobian at `y`.
    fn jacobian(&self, y: &[f64], jac: &mut DMatrix<f64>);
}

/// Advance `y` over `t_end` seconds.
///
/// # Errors
///
/// See [`RosenbrockError`]; on error `y` holds the last accepted state.
pub fn integrate(
    system: &impl OdeSystem,
    y: &mut [f64],
    t_end: f64,
    options: &Options,
) -> Result<Stats, RosenbrockError> {
    let n = system.dim();
    debug_assert_eq!(y.len(), n);

    let mut stats = Stats::default();
    let mut t = 0.0;
    let mut h = (t_end / 100.0).max(options.h_min);

    let mut f0 = vec![0.0; n];
    let mut f1 = vec![0.0; n];
    let mut jac = DMatrix::zeros(n, n);
    let mut stage = DMatrix::zeros(n, n);
    let mut y_stage = vec![0.0; n];

    while t < t_end {
        if stats.accepted + stats.rejected > options.max_steps {
            return Err(RosenbrockError::TooManySteps {
                max_steps: options.max_steps,
            });
        }

        h = h.min(t_end - t);

        system.rhs(y, &mut f0);
        system.jacobian(y, &mut jac);

        // stage matrix I/(hγ) − J, one factorisation per step
        stage.copy_from(&jac);
        stage.neg_mut();
        let diag_shift = 1.0 / (h * GAMMA);
        for index in 0..n {
            stage[(index, index)] += diag_shift;
        }
        let lu = stage.clone().lu();

        let Some(k1) = lu.solve(&DVector::from_column_slice(&f0)) else {
            return Err(RosenbrockError::SingularMatrix { t });
        };

        for index in 0..n {
            y_stage[index] = A21.mul_add(k1[index], y[index]);
        }
        system.rhs(&y_stage, &mut f1);

        let mut rhs2 = DVector::from_column_slice(&f1);
        rhs2.axpy(C21 / h, &k1, 1.0);
        let Some(k2) = lu.solve(&rhs2) else {
            return Err(RosenbrockError::SingularMatrix { t });
        };

        // the third stage reuses the second stage's function value because
        // a31 = a21 and a32 = 0
        let mut rhs3 = DVector::from_column_slice(&f1);
        rhs3.axpy(C31 / h, &k1, 1.0);
        rhs3.axpy(C32 / h, &k2, 1.0);
        let Some(k3) = lu.solve(&rhs3) else {
            return Err(RosenbrockError::SingularMatrix { t });
        };

        // solution, embedded error and the weighted RMS error norm
        let mut err_sq = 0.0;
        let mut y_new = vec![0.0; n];
        let mut finite = true;
        for index in 0..n {
            let ynew =
                B3.mul_add(k3[index], B2.mul_add(k2[index], B1.mul_add(k1[index], y[index])));
            let yerr = E3.mul_add(k3[index], E2.mul_add(k2[index], E1 * k1[index]));

            let scale = options
                .atol
                .max(options.rtol * y[index].abs().max(ynew.abs()));
            err_sq += (yerr / scale).powi(2);
            finite &= ynew.is_finite();
            y_new[index] = ynew;
        }
        let err = (err_sq / n as f64).sqrt();

        if finite && err <= 1.0 {
            y.copy_from_slice(&y_new);
            t += h;
            stats.accepted += 1;

            h *= (FAC_SAFE * err.max(1.0e-10).powf(ERR_EXPONENT)).clamp(FAC_MIN, FAC_MAX);
        } else {
            stats.rejected += 1;

            let shrink = if finite {
                (FAC_SAFE * err.powf(ERR_EXPONENT)).clamp(FAC_MIN, FAC_SAFE)
            } else {
                FAC_MIN
            };
            h *= shrink;

            if h < options.h_min {
                return Err(RosenbrockError::StepUnderflow { t, h });
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    /// y' = −λ y, solved exactly by exp(−λ t).
    struct Decay {
        lambda: Vec<f64>,
    }

    impl OdeSystem for Decay {
        fn dim(&self) -> usize {
            self.lambda.len()
        }

        fn rhs(&self, y: &[f64], dydt: &mut [f64]) {
            for ((dy, &value), &lambda) in dydt.iter_mut().zip(y).zip(&self.lambda) {
                *dy = -lambda * value;
            }
        }

        fn jacobian(&self, _: &[f64], jac: &mut DMatrix<f64>) {
            jac.fill(0.0);
            for (index, &lambda) in self.lambda.iter().enumerate() {
                jac[(index, index)] = -lambda;
            }
        }
    }

    /// Robertson's stiff problem, the classic three-species benchmark.
    struct Robertson;

    impl OdeSystem for Robertson {
        fn dim(&self) -> usize {
            3
        }

        fn rhs(&self, y: &[f64], dydt: &mut [f64]) {
            dydt[0] = 1.0e4f64.mul_add(y[1] * y[2], -0.04 * y[0]);
            dydt[1] = (-3.0e7 * y[1]).mul_add(y[1], 0.04f64.mul_add(y[0], -1.0e4 * y[1] * y[2]));
            dydt[2] = 3.0e7 * y[1] * y[1];
        }

        fn jacobian(&self, y: &[f64], jac: &mut DMatrix<f64>) {
            jac.fill(0.0);
            jac[(0, 0)] = -0.04;
            jac[(0, 1)] = 1.0e4 * y[2];
            jac[(0, 2)] = 1.0e4 * y[1];
            jac[(1, 0)] = 0.04;
            jac[(1, 1)] = (-6.0e7f64).mul_add(y[1], -1.0e4 * y[2]);
            jac[(1, 2)] = -1.0e4 * y[1];
            jac[(2, 1)] = 6.0e7 * y[1];
        }
    }

    #[test]
    fn exponential_decay_with_stiff_spread() {
        // rates spread over six orders of magnitude
        let system = Decay {
            lambda: vec![1.0e-3, 1.0, 1.0e3],
        };
        let mut y = vec![1.0, 1.0, 1.0];

        let options = Options {
            rtol: 1.0e-6,
            atol: 1.0e-12,
            ..Options::default()
        };
        let stats = integrate(&system, &mut y, 1.0, &options).unwrap();

        assert!(stats.accepted > 0);
        assert_approx_eq!(f64, y[0], (-1.0e-3f64).exp(), epsilon = 1e-6);
        assert_approx_eq!(f64, y[1], (-1.0f64).exp(), epsilon = 1e-6);
        assert!(y[2].abs() < 1e-6);
    }

    #[test]
    fn robertson_mass_balance() {
        let mut y = vec![1.0, 0.0, 0.0];

        let options = Options {
            rtol: 1.0e-4,
            atol: 1.0e-10,
            ..Options::default()
        };
        integrate(&Robertson, &mut y, 100.0, &options).unwrap();

        // the system conserves total mass and keeps y1 tiny
        assert_approx_eq!(f64, y[0] + y[1] + y[2], 1.0, epsilon = 1e-6);
        assert!(y[1] < 1.0e-4);
        assert!(y[2] > 0.05);
    }

    #[test]
    fn budget_exhaustion_is_reported() {
        let system = Decay {
            lambda: vec![1.0e6],
        };
        let mut y = vec![1.0];

        let options = Options {
            rtol: 1.0e-10,
            atol: 1.0e-16,
            h_min: 1.0e-16,
            max_steps: 3,
        };

        assert!(matches!(
            integrate(&system, &mut y, 1.0e3, &options),
            Err(RosenbrockError::TooManySteps { .. })
        ));
    }
}
