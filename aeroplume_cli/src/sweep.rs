//! Parameter-sweep expansion.
//!
//! A sweep turns one base configuration into a finite, materialised list
//! of cases: the cartesian product of the swept scalar values, or — in
//! Monte-Carlo mode — `n_samples` uniform draws from the given intervals.

use aeroplume::config::CaseConfig;
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// One sweepable scalar: explicit values, or an interval to sample.
#[derive(Clone, Debug, PartialEq)]
pub enum SweepRange {
    /// Deterministic value list.
    Values(Vec<f64>),
    /// Monte-Carlo interval `[min, max]`.
    Interval(f64, f64),
}

/// The PARAMETER SWEEP section: which scalars vary and how.
#[derive(Clone, Debug, Default)]
pub struct SweepSpec {
    /// Sample intervals instead of walking value lists.
    pub monte_carlo: bool,
    /// Number of Monte-Carlo samples.
    pub n_samples: usize,
    /// Monte-Carlo seed.
    pub seed: u64,
    /// Flight-level temperature sweep [K].
    pub temperature: Option<SweepRange>,
    /// Flight-level pressure sweep [Pa].
    pub pressure: Option<SweepRange>,
    /// Relative-humidity sweep [%].
    pub rh_w: Option<SweepRange>,
}

impl SweepSpec {
    /// Whether any scalar is swept at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.pressure.is_none() && self.rh_w.is_none()
    }
}

fn apply(base: &CaseConfig, case: usize, values: &[(usize, f64)]) -> CaseConfig {
    let mut config = base.clone();
    config.simulation.case_name = format!("{}_{case:03}", base.simulation.case_name);

    for &(dimension, value) in values {
        match dimension {
            0 => config.met.temperature_k = value,
            1 => config.met.pressure_pa = value,
            _ => config.met.rh_w_percent = value,
        }
    }

    config
}

/// Expand `spec` against `base` into the materialised case list. With no
/// swept scalars the base case is returned alone, unrenamed.
#[must_use]
pub fn expand(base: &CaseConfig, spec: &SweepSpec) -> Vec<CaseConfig> {
    if spec.is_empty() {
        return vec![base.clone()];
    }

    let dimensions: Vec<(usize, &SweepRange)> = [&spec.temperature, &spec.pressure, &spec.rh_w]
        .into_iter()
        .enumerate()
        .filter_map(|(dimension, range)| range.as_ref().map(|range| (dimension, range)))
        .collect();

    if spec.monte_carlo {
        let mut rng = Pcg64::seed_from_u64(spec.seed);

        return (0..spec.n_samples.max(1))
            .map(|case| {
                let values: Vec<(usize, f64)> = dimensions
                    .iter()
                    .map(|&(dimension, range)| {
                        let value = match *range {
                            SweepRange::Interval(min, max) => {
                                if min < max {
                                    rng.gen_range(min..max)
                                } else {
                                    min
                                }
                            }
                            SweepRange::Values(ref values) => values[rng.gen_range(0..values.len())],
                        };
                        (dimension, value)
                    })
                    .collect();

                apply(base, case, &values)
            })
            .collect();
    }

    dimensions
        .iter()
        .map(|&(dimension, range)| match *range {
            SweepRange::Values(ref values) => values
                .iter()
                .map(|&value| (dimension, value))
                .collect::<Vec<_>>(),
            // an interval without Monte-Carlo collapses to its endpoints
            SweepRange::Interval(min, max) => vec![(dimension, min), (dimension, max)],
        })
        .multi_cartesian_product()
        .enumerate()
        .map(|(case, values)| apply(base, case, &values))
        .collect()
}
