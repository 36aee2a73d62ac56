//! Gas-phase and heterogeneous chemistry.
//!
//! The solver owns the reaction mechanism and the integrator tolerances;
//! all per-cell rate state (rate constants, photolysis rates,
//! heterogeneous rates) is threaded through as values, so cells can be
//! integrated concurrently without shared mutable state.

pub mod het;
pub mod mechanism;
pub mod rosenbrock;

pub use het::{AerosolSurfaces, PscState, SurfaceCategory, het_rates};
pub use mechanism::{CellEnv, Mechanism, N_HET};
pub use rosenbrock::{Options, RosenbrockError, Stats};

use crate::error::Result;
use crate::species::SpeciesTable;
use itertools::Itertools;
use nalgebra::DMatrix;

/// The chemistry context: mechanism plus integrator configuration.
pub struct ChemistrySolver {
    mechanism: Mechanism,
    options: Options,
}

/// One cell's kinetics as an autonomous ODE system.
struct CellSystem<'a> {
    mechanism: &'a Mechanism,
    rconst: &'a [f64],
}

impl rosenbrock::OdeSystem for CellSystem<'_> {
    fn dim(&self) -> usize {
        self.mechanism.n_variable()
    }

    fn rhs(&self, y: &[f64], dydt: &mut [f64]) {
        self.mechanism.derivative(self.rconst, y, dydt);
    }

    fn jacobian(&self, y: &[f64], jac: &mut DMatrix<f64>) {
        self.mechanism.jacobian(self.rconst, y, jac);
    }
}

impl ChemistrySolver {
    /// Build the solver against `species` with the given relative and
    /// absolute tolerances.
    ///
    /// # Errors
    ///
    /// Fails when a mechanism species is missing from the table.
    pub fn new(species: &SpeciesTable, rtol: f64, atol: f64) -> Result<Self> {
        Ok(Self {
            mechanism: Mechanism::build(species)?,
            options: Options {
                rtol,
                atol,
                ..Options::default()
            },
        })
    }

    /// The reaction mechanism.
    #[must_use]
    pub const fn mechanism(&self) -> &Mechanism {
        &self.mechanism
    }

    /// Evaluate rate constants for one cell; see
    /// [`Mechanism::rate_constants`].
    #[must_use]
    pub fn rate_constants(&self, env: &CellEnv, jrates: &[f64], het: &[f64]) -> Vec<f64> {
        self.mechanism.rate_constants(env, jrates, het)
    }

    /// Advance one cell's variable-species vector by `dt` seconds.
    ///
    /// # Errors
    ///
    /// Propagates the integrator failure; the caller decides whether to
    /// dump and abort.
    pub fn step(
        &self,
        var: &mut [f64],
        rconst: &[f64],
        dt: f64,
    ) -> std::result::Result<Stats, RosenbrockError> {
        let system = CellSystem {
            mechanism: &self.mechanism,
            rconst,
        };

        rosenbrock::integrate(&system, var, dt, &self.options)
    }
}

/// Render every rate constant and concentration for post-mortem analysis of
/// a failed integration.
#[must_use]
pub fn forensic_dump(species: &SpeciesTable, rconst: &[f64], var: &[f64]) -> String {
    let rates = rconst
        .iter()
        .enumerate()
        .map(|(index, k)| format!("RCONST[{index:3}] = {k:.6e}"))
        .join("\n");
    let concentrations = species
        .records()
        .iter()
        .zip(var)
        .map(|(record, value)| format!("{:8} = {value:.6e}", record.name))
        .join("\n");

    format!("{rates}\n{concentrations}")
}
