//! Reaction mechanism: rate laws, the reaction table and the derivative and
//! Jacobian of the variable-species vector.
//!
//! Rate-constant evaluation is a pure function of temperature, pressure,
//! air density and water; photolysis and heterogeneous rates are looked up
//! from the vectors threaded in by the caller.

use crate::error::{Error, Result};
use crate::species::SpeciesTable;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Fixed collision partners whose concentrations enter the rate constant
/// instead of the variable-species vector.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FixedReactant {
    /// Total air density.
    AirDens,
    /// Molecular oxygen, 20.95 % of air.
    O2,
    /// Molecular nitrogen, 78.08 % of air.
    N2,
    /// Molecular hydrogen at its free-troposphere mixing ratio.
    H2,
}

impl FixedReactant {
    /// Concentration [molecules cm⁻³] at air density `m`.
    #[must_use]
    pub fn concentration(self, m: f64) -> f64 {
        match self {
            Self::AirDens => m,
            Self::O2 => 0.2095 * m,
            Self::N2 => 0.7808 * m,
            Self::H2 => 5.3e-7 * m,
        }
    }
}

/// Arrhenius-family rate laws.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum RateLaw {
    /// k = a · (300/T)ⁿ · exp(−E/R / T).
    Arrhenius {
        /// Pre-exponential factor [cm³ molecule⁻¹ s⁻¹ or s⁻¹].
        a: f64,
        /// Temperature exponent on (300/T).
        n: f64,
        /// Activation temperature E/R [K].
        ea_over_r: f64,
    },
    /// Troe falloff between the low- and high-pressure limits.
    Troe {
        /// Low-pressure limit at 300 K [cm⁶ molecule⁻² s⁻¹].
        k0_300: f64,
        /// Temperature exponent of the low-pressure limit.
        n0: f64,
        /// High-pressure limit at 300 K [cm³ molecule⁻¹ s⁻¹].
        kinf_300: f64,
        /// Temperature exponent of the high-pressure limit.
        ninf: f64,
    },
    /// Thermal decomposition: the matching Troe association rate divided by
    /// the equilibrium constant `a_eq · exp(b_eq / T)`.
    TroeEquilibrium {
        /// Low-pressure limit of the association reaction at 300 K.
        k0_300: f64,
        /// Temperature exponent of the low-pressure limit.
        n0: f64,
        /// High-pressure limit of the association reaction at 300 K.
        kinf_300: f64,
        /// Temperature exponent of the high-pressure limit.
        ninf: f64,
        /// Equilibrium-constant prefactor [cm³ molecule⁻¹].
        a_eq: f64,
        /// Equilibrium-constant temperature coefficient [K].
        b_eq: f64,
    },
    /// OH + HNO3 with its pressure-dependent third channel.
    OhHno3,
    /// HO2 + HO2 with air-density and water-vapour enhancement.
    Ho2Ho2,
    /// OH + CO with its pressure-dependent enhancement.
    OhCo,
    /// First-order photolysis, indexed into the J-value vector.
    Photolysis {
        /// Position in the photolysis-rate vector.
        index: usize,
    },
    /// First-order heterogeneous loss, indexed into the per-cell
    /// heterogeneous rate vector.
    Heterogeneous {
        /// Position in the heterogeneous-rate vector.
        slot: usize,
    },
}

/// One reaction of the mechanism over variable-species indices.
#[derive(Clone, Debug)]
pub struct Reaction {
    /// Variable-species reactants; duplicated entries raise the order.
    pub reactants: Vec<usize>,
    /// Fixed collision partners folded into the rate constant.
    pub fixed: Vec<FixedReactant>,
    /// Products with stoichiometric coefficients.
    pub products: Vec<(usize, f64)>,
    /// Rate law of this reaction.
    pub rate: RateLaw,
}

/// Thermodynamic state entering the rate-constant update.
#[derive(Clone, Copy, Debug)]
pub struct CellEnv {
    /// Temperature [K].
    pub temperature: f64,
    /// Pressure [Pa].
    pub pressure: f64,
    /// Air number density [molecules cm⁻³].
    pub air_density: f64,
    /// Water vapour [molecules cm⁻³].
    pub h2o: f64,
}

fn troe(k0_300: f64, n0: f64, kinf_300: f64, ninf: f64, t: f64, m: f64) -> f64 {
    let k0 = k0_300 * (300.0 / t).powf(n0) * m;
    let kinf = kinf_300 * (300.0 / t).powf(ninf);
    let ratio = k0 / kinf;

    k0 / (1.0 + ratio) * 0.6f64.powf(1.0 / (1.0 + (ratio.log10()).powi(2)))
}

/// Number of slots in the heterogeneous-rate vector.
pub const N_HET: usize = 3;

/// Heterogeneous slot of N2O5 hydrolysis.
pub const HET_N2O5: usize = 0;
/// Heterogeneous slot of HO2 uptake.
pub const HET_HO2: usize = 1;
/// Heterogeneous slot of NO2 conversion on soot.
pub const HET_NO2: usize = 2;

/// The reaction mechanism resolved against a species table.
pub struct Mechanism {
    reactions: Vec<Reaction>,
    n_variable: usize,
    n_photolysis: usize,
}

struct Builder<'a> {
    species: &'a SpeciesTable,
    reactions: Vec<Reaction>,
}

impl Builder<'_> {
    fn index(&self, name: &str) -> Result<usize> {
        self.species
            .index_of(name)
            .ok_or_else(|| Error::InvalidInput(format!("mechanism species `{name}` not in table")))
    }

    fn add(
        &mut self,
        reactants: &[&str],
        fixed: &[FixedReactant],
        products: &[(&str, f64)],
        rate: RateLaw,
    ) -> Result<()> {
        let reactants = reactants
            .iter()
            .map(|name| self.index(name))
            .collect::<Result<_>>()?;
        let products = products
            .iter()
            .map(|&(name, nu)| Ok((self.index(name)?, nu)))
            .collect::<Result<_>>()?;

        self.reactions.push(Reaction {
            reactants,
            fixed: fixed.to_vec(),
            products,
            rate,
        });

        Ok(())
    }
}

impl Mechanism {
    /// Build the mechanism against `species`. All mechanism species must be
    /// present in the table as variable species.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a mechanism species is missing
    /// from the table.
    #[allow(clippy::too_many_lines)]
    pub fn build(species: &SpeciesTable) -> Result<Self> {
        use FixedReactant::{AirDens, H2, N2, O2};
        use RateLaw::{
            Arrhenius, Heterogeneous, Ho2Ho2, OhCo, OhHno3, Photolysis, Troe, TroeEquilibrium,
        };

        let mut b = Builder {
            species,
            reactions: Vec::new(),
        };

        // photolysis, in the J-table order
        b.add(&["O3"], &[], &[("O1D", 1.0)], Photolysis { index: 0 })?;
        b.add(&["O3"], &[], &[("O", 1.0)], Photolysis { index: 1 })?;
        b.add(&["NO2"], &[], &[("NO", 1.0), ("O", 1.0)], Photolysis { index: 2 })?;
        b.add(&["NO3"], &[], &[("NO", 1.0)], Photolysis { index: 3 })?;
        b.add(&["NO3"], &[], &[("NO2", 1.0), ("O", 1.0)], Photolysis { index: 4 })?;
        b.add(
            &["N2O5"],
            &[],
            &[("NO2", 1.0), ("NO3", 1.0)],
            Photolysis { index: 5 },
        )?;
        b.add(
            &["HNO3"],
            &[],
            &[("OH", 1.0), ("NO2", 1.0)],
            Photolysis { index: 6 },
        )?;
        b.add(
            &["HNO2"],
            &[],
            &[("OH", 1.0), ("NO", 1.0)],
            Photolysis { index: 7 },
        )?;
        b.add(&["H2O2"], &[], &[("OH", 2.0)], Photolysis { index: 8 })?;
        b.add(
            &["CH2O"],
            &[],
            &[("HO2", 2.0), ("CO", 1.0)],
            Photolysis { index: 9 },
        )?;
        b.add(&["CH2O"], &[], &[("CO", 1.0)], Photolysis { index: 10 })?;
        b.add(
            &["HNO4"],
            &[],
            &[("HO2", 1.0), ("NO2", 1.0)],
            Photolysis { index: 11 },
        )?;
        b.add(
            &["MP"],
            &[],
            &[("CH2O", 1.0), ("HO2", 1.0), ("OH", 1.0)],
            Photolysis { index: 12 },
        )?;

        // odd oxygen
        b.add(
            &["O1D"],
            &[N2],
            &[("O", 1.0)],
            Arrhenius { a: 2.15e-11, n: 0.0, ea_over_r: -110.0 },
        )?;
        b.add(
            &["O1D"],
            &[O2],
            &[("O", 1.0)],
            Arrhenius { a: 3.30e-11, n: 0.0, ea_over_r: -55.0 },
        )?;
        b.add(
            &["O1D", "H2O"],
            &[],
            &[("OH", 2.0)],
            Arrhenius { a: 1.63e-10, n: 0.0, ea_over_r: -60.0 },
        )?;
        b.add(
            &["O"],
            &[O2, AirDens],
            &[("O3", 1.0)],
            Arrhenius { a: 6.00e-34, n: 2.4, ea_over_r: 0.0 },
        )?;
        b.add(
            &["O", "O3"],
            &[],
            &[],
            Arrhenius { a: 8.00e-12, n: 0.0, ea_over_r: 2060.0 },
        )?;

        // NOx cycling
        b.add(
            &["NO", "O3"],
            &[],
            &[("NO2", 1.0)],
            Arrhenius { a: 3.00e-12, n: 0.0, ea_over_r: 1500.0 },
        )?;
        b.add(
            &["NO2", "O"],
            &[],
            &[("NO", 1.0)],
            Arrhenius { a: 5.10e-12, n: 0.0, ea_over_r: -210.0 },
        )?;
        b.add(
            &["NO2", "O3"],
            &[],
            &[("NO3", 1.0)],
            Arrhenius { a: 1.20e-13, n: 0.0, ea_over_r: 2450.0 },
        )?;
        b.add(
            &["NO", "NO3"],
            &[],
            &[("NO2", 2.0)],
            Arrhenius { a: 1.50e-11, n: 0.0, ea_over_r: -170.0 },
        )?;
        b.add(
            &["NO2", "NO3"],
            &[AirDens],
            &[("N2O5", 1.0)],
            Troe { k0_300: 2.0e-30, n0: 4.4, kinf_300: 1.4e-12, ninf: 0.7 },
        )?;
        b.add(
            &["N2O5"],
            &[AirDens],
            &[("NO2", 1.0), ("NO3", 1.0)],
            TroeEquilibrium {
                k0_300: 2.0e-30,
                n0: 4.4,
                kinf_300: 1.4e-12,
                ninf: 0.7,
                a_eq: 2.7e-27,
                b_eq: 11000.0,
            },
        )?;
        b.add(
            &["NO3", "HO2"],
            &[],
            &[("OH", 1.0), ("NO2", 1.0)],
            Arrhenius { a: 3.50e-12, n: 0.0, ea_over_r: 0.0 },
        )?;

        // nitrogen reservoirs
        b.add(
            &["OH", "NO2"],
            &[AirDens],
            &[("HNO3", 1.0)],
            Troe { k0_300: 1.8e-30, n0: 3.0, kinf_300: 2.8e-11, ninf: 0.0 },
        )?;
        b.add(&["OH", "HNO3"], &[], &[("NO3", 1.0), ("H2O", 1.0)], OhHno3)?;
        b.add(
            &["OH", "NO"],
            &[AirDens],
            &[("HNO2", 1.0)],
            Troe { k0_300: 7.0e-31, n0: 2.6, kinf_300: 3.6e-11, ninf: 0.1 },
        )?;
        b.add(
            &["OH", "HNO2"],
            &[],
            &[("NO2", 1.0), ("H2O", 1.0)],
            Arrhenius { a: 1.80e-11, n: 0.0, ea_over_r: 390.0 },
        )?;
        b.add(
            &["HO2", "NO2"],
            &[AirDens],
            &[("HNO4", 1.0)],
            Troe { k0_300: 1.9e-31, n0: 3.4, kinf_300: 4.0e-12, ninf: 0.3 },
        )?;
        b.add(
            &["HNO4"],
            &[AirDens],
            &[("HO2", 1.0), ("NO2", 1.0)],
            TroeEquilibrium {
                k0_300: 1.9e-31,
                n0: 3.4,
                kinf_300: 4.0e-12,
                ninf: 0.3,
                a_eq: 2.1e-27,
                b_eq: 10900.0,
            },
        )?;
        b.add(
            &["HNO4", "OH"],
            &[],
            &[("NO2", 1.0), ("H2O", 1.0)],
            Arrhenius { a: 1.30e-12, n: 0.0, ea_over_r: -380.0 },
        )?;

        // HOx
        b.add(
            &["HO2", "NO"],
            &[],
            &[("OH", 1.0), ("NO2", 1.0)],
            Arrhenius { a: 3.30e-12, n: 0.0, ea_over_r: -270.0 },
        )?;
        b.add(
            &["OH", "O3"],
            &[],
            &[("HO2", 1.0)],
            Arrhenius { a: 1.70e-12, n: 0.0, ea_over_r: 940.0 },
        )?;
        b.add(
            &["HO2", "O3"],
            &[],
            &[("OH", 1.0)],
            Arrhenius { a: 1.00e-14, n: 0.0, ea_over_r: 490.0 },
        )?;
        b.add(
            &["OH", "HO2"],
            &[],
            &[("H2O", 1.0)],
            Arrhenius { a: 4.80e-11, n: 0.0, ea_over_r: -250.0 },
        )?;
        b.add(
            &["OH", "H2O2"],
            &[],
            &[("HO2", 1.0), ("H2O", 1.0)],
            Arrhenius { a: 1.80e-12, n: 0.0, ea_over_r: 0.0 },
        )?;
        b.add(&["HO2", "HO2"], &[], &[("H2O2", 1.0)], Ho2Ho2)?;
        b.add(
            &["OH"],
            &[H2],
            &[("HO2", 1.0), ("H2O", 1.0)],
            Arrhenius { a: 2.80e-12, n: 0.0, ea_over_r: 1800.0 },
        )?;

        // carbon chain
        b.add(&["OH", "CO"], &[], &[("HO2", 1.0), ("CO2", 1.0)], OhCo)?;
        b.add(
            &["OH", "CH4"],
            &[],
            &[("MO2", 1.0), ("H2O", 1.0)],
            Arrhenius { a: 2.45e-12, n: 0.0, ea_over_r: 1775.0 },
        )?;
        b.add(
            &["MO2", "NO"],
            &[],
            &[("CH2O", 1.0), ("HO2", 1.0), ("NO2", 1.0)],
            Arrhenius { a: 2.80e-12, n: 0.0, ea_over_r: -300.0 },
        )?;
        b.add(
            &["MO2", "HO2"],
            &[],
            &[("MP", 1.0)],
            Arrhenius { a: 4.10e-13, n: 0.0, ea_over_r: -750.0 },
        )?;
        b.add(
            &["MO2", "MO2"],
            &[],
            &[("CH2O", 2.0), ("HO2", 2.0)],
            Arrhenius { a: 9.50e-14, n: 0.0, ea_over_r: -390.0 },
        )?;
        b.add(
            &["OH", "MP"],
            &[],
            &[("MO2", 1.0), ("H2O", 1.0)],
            Arrhenius { a: 2.66e-12, n: 0.0, ea_over_r: -200.0 },
        )?;
        b.add(
            &["OH", "CH2O"],
            &[],
            &[("HO2", 1.0), ("CO", 1.0), ("H2O", 1.0)],
            Arrhenius { a: 5.50e-12, n: 0.0, ea_over_r: -125.0 },
        )?;
        b.add(
            &["CH2O", "NO3"],
            &[],
            &[("HNO3", 1.0), ("HO2", 1.0), ("CO", 1.0)],
            Arrhenius { a: 5.80e-16, n: 0.0, ea_over_r: 0.0 },
        )?;

        // sulfur
        b.add(
            &["OH", "SO2"],
            &[AirDens],
            &[("SO4", 1.0), ("HO2", 1.0)],
            Troe { k0_300: 3.3e-31, n0: 4.3, kinf_300: 1.6e-12, ninf: 0.0 },
        )?;

        // N2O and atomic nitrogen
        b.add(
            &["O1D", "N2O"],
            &[],
            &[("NO", 2.0)],
            Arrhenius { a: 7.25e-11, n: 0.0, ea_over_r: -20.0 },
        )?;
        b.add(
            &["O1D", "N2O"],
            &[],
            &[],
            Arrhenius { a: 4.63e-11, n: 0.0, ea_over_r: -20.0 },
        )?;
        b.add(
            &["O1D", "CH4"],
            &[],
            &[("MO2", 1.0), ("OH", 1.0)],
            Arrhenius { a: 1.75e-10, n: 0.0, ea_over_r: 0.0 },
        )?;
        b.add(
            &["N"],
            &[O2],
            &[("NO", 1.0), ("O", 1.0)],
            Arrhenius { a: 1.50e-11, n: 0.0, ea_over_r: 3600.0 },
        )?;
        b.add(
            &["N", "NO"],
            &[],
            &[("O", 1.0)],
            Arrhenius { a: 2.10e-11, n: 0.0, ea_over_r: -100.0 },
        )?;

        // heterogeneous pathways, first order with per-cell rates
        b.add(
            &["N2O5"],
            &[],
            &[("HNO3", 2.0)],
            Heterogeneous { slot: HET_N2O5 },
        )?;
        b.add(
            &["HO2"],
            &[],
            &[("H2O2", 0.5)],
            Heterogeneous { slot: HET_HO2 },
        )?;
        b.add(
            &["NO2"],
            &[],
            &[("HNO2", 0.5), ("HNO3", 0.5)],
            Heterogeneous { slot: HET_NO2 },
        )?;

        let n_photolysis = b
            .reactions
            .iter()
            .filter_map(|reaction| match reaction.rate {
                Photolysis { index } => Some(index + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        Ok(Self {
            reactions: b.reactions,
            n_variable: species.n_variable(),
            n_photolysis,
        })
    }

    /// The reaction table.
    #[must_use]
    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    /// Number of reactions.
    #[must_use]
    pub fn n_reactions(&self) -> usize {
        self.reactions.len()
    }

    /// Length of the variable-species vector.
    #[must_use]
    pub const fn n_variable(&self) -> usize {
        self.n_variable
    }

    /// Number of photolysis entries the J-value vector must provide.
    #[must_use]
    pub const fn n_photolysis(&self) -> usize {
        self.n_photolysis
    }

    /// Evaluate every rate constant at `env`. Pure function: the result
    /// depends only on the arguments.
    ///
    /// # Panics
    ///
    /// Panics if `jrates` is shorter than [`Self::n_photolysis`] or `het`
    /// shorter than [`N_HET`].
    #[must_use]
    pub fn rate_constants(&self, env: &CellEnv, jrates: &[f64], het: &[f64]) -> Vec<f64> {
        assert!(jrates.len() >= self.n_photolysis);
        assert!(het.len() >= N_HET);

        let t = env.temperature;
        let m = env.air_density;

        self.reactions
            .iter()
            .map(|reaction| {
                let base = match reaction.rate {
                    RateLaw::Arrhenius { a, n, ea_over_r } => {
                        a * (300.0 / t).powf(n) * (-ea_over_r / t).exp()
                    }
                    RateLaw::Troe { k0_300, n0, kinf_300, ninf } => {
                        troe(k0_300, n0, kinf_300, ninf, t, m)
                    }
                    RateLaw::TroeEquilibrium {
                        k0_300,
                        n0,
                        kinf_300,
                        ninf,
                        a_eq,
                        b_eq,
                    } => troe(k0_300, n0, kinf_300, ninf, t, m) / (a_eq * (b_eq / t).exp()),
                    RateLaw::OhHno3 => {
                        let k2 = 2.7e-17 * (2199.0 / t).exp();
                        let k3m = 6.5e-34 * (1335.0 / t).exp() * m;
                        2.4e-14 * (460.0 / t).exp() + k3m / (1.0 + k3m / k2)
                    }
                    RateLaw::Ho2Ho2 => {
                        (3.0e-13 * (460.0 / t).exp() + 2.1e-33 * m * (920.0 / t).exp())
                            * 1.4e-21f64.mul_add(env.h2o * (2200.0 / t).exp(), 1.0)
                    }
                    RateLaw::OhCo => 1.5e-13 * (0.6_f64 / 101325.0).mul_add(env.pressure, 1.0),
                    RateLaw::Photolysis { index } => jrates[index],
                    RateLaw::Heterogeneous { slot } => het[slot],
                };

                reaction
                    .fixed
                    .iter()
                    .fold(base, |k, partner| k * partner.concentration(m))
            })
            .collect()
    }

    /// Time derivative of the variable-species vector given precomputed
    /// rate constants.
    pub fn derivative(&self, rconst: &[f64], var: &[f64], dvar: &mut [f64]) {
        dvar.fill(0.0);

        for (reaction, &k) in self.reactions.iter().zip(rconst) {
            let rate = reaction
                .reactants
                .iter()
                .fold(k, |rate, &index| rate * var[index]);

            for &index in &reaction.reactants {
                dvar[index] -= rate;
            }
            for &(index, nu) in &reaction.products {
                dvar[index] += nu * rate;
            }
        }
    }

    /// Analytic Jacobian ∂(dvar/dt)/∂var given precomputed rate constants.
    pub fn jacobian(&self, rconst: &[f64], var: &[f64], jac: &mut DMatrix<f64>) {
        jac.fill(0.0);

        for (reaction, &k) in self.reactions.iter().zip(rconst) {
            for (position, &with_respect_to) in reaction.reactants.iter().enumerate() {
                // ∂rate/∂c: the product over all other reactant occurrences
                let partial = reaction
                    .reactants
                    .iter()
                    .enumerate()
                    .filter(|&(other, _)| other != position)
                    .fold(k, |rate, (_, &index)| rate * var[index]);

                for &index in &reaction.reactants {
                    jac[(index, with_respect_to)] -= partial;
                }
                for &(index, nu) in &reaction.products {
                    jac[(index, with_respect_to)] += nu * partial;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    fn env() -> CellEnv {
        CellEnv {
            temperature: 220.0,
            pressure: 24000.0,
            air_density: 7.9e18,
            h2o: 5.0e13,
        }
    }

    #[test]
    fn rate_constants_are_positive_and_pure() {
        let species = SpeciesTable::builtin();
        let mechanism = Mechanism::build(&species).unwrap();

        let jrates = vec![1.0e-4; mechanism.n_photolysis()];
        let het = [1.0e-5; N_HET];

        let first = mechanism.rate_constants(&env(), &jrates, &het);
        let second = mechanism.rate_constants(&env(), &jrates, &het);

        assert_eq!(first.len(), mechanism.n_reactions());
        assert!(first.iter().all(|&k| k >= 0.0));
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn dark_rate_constants_zero_photolysis() {
        let species = SpeciesTable::builtin();
        let mechanism = Mechanism::build(&species).unwrap();

        let jrates = vec![0.0; mechanism.n_photolysis()];
        let rconst = mechanism.rate_constants(&env(), &jrates, &[0.0; N_HET]);

        let o3_photolysis = &mechanism.reactions()[0];
        assert!(matches!(o3_photolysis.rate, RateLaw::Photolysis { index: 0 }));
        assert_approx_eq!(f64, rconst[0], 0.0, ulps = 2);
    }

    #[test]
    fn derivative_conserves_nitrogen() {
        let species = SpeciesTable::builtin();
        let mechanism = Mechanism::build(&species).unwrap();

        let mut var = vec![0.0; mechanism.n_variable()];
        for (name, value) in [
            ("O3", 8.0e11),
            ("NO", 1.0e9),
            ("NO2", 2.0e9),
            ("NO3", 1.0e6),
            ("N2O5", 5.0e8),
            ("HNO3", 4.0e9),
            ("HNO2", 1.0e7),
            ("HNO4", 2.0e8),
            ("OH", 1.0e6),
            ("HO2", 5.0e6),
            ("H2O", 5.0e13),
            ("CO", 8.0e11),
            ("CH4", 4.0e13),
            ("N2O", 7.0e12),
            ("N", 1.0e2),
            ("SO2", 1.0e9),
        ] {
            var[species.index_of(name).unwrap()] = value;
        }

        let jrates = vec![1.0e-3; mechanism.n_photolysis()];
        let rconst = mechanism.rate_constants(&env(), &jrates, &[1.0e-5; N_HET]);

        let mut dvar = vec![0.0; mechanism.n_variable()];
        mechanism.derivative(&rconst, &var, &mut dvar);

        let noy: f64 = species
            .noy_weights()
            .iter()
            .map(|&(index, weight)| weight * dvar[index])
            .sum();
        let scale: f64 = species
            .noy_weights()
            .iter()
            .map(|&(index, weight)| (weight * var[index]).abs())
            .sum();

        // every reaction moves nitrogen between NOy members
        assert!(noy.abs() < 1e-10 * scale.max(1.0));
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let species = SpeciesTable::builtin();
        let mechanism = Mechanism::build(&species).unwrap();
        let n = mechanism.n_variable();

        let mut var = vec![0.0; n];
        for (name, value) in [
            ("O3", 8.0e11),
            ("NO", 1.0e9),
            ("NO2", 2.0e9),
            ("HO2", 5.0e6),
            ("OH", 1.0e6),
            ("CO", 8.0e11),
            ("H2O", 5.0e13),
        ] {
            var[species.index_of(name).unwrap()] = value;
        }

        let jrates = vec![1.0e-3; mechanism.n_photolysis()];
        let rconst = mechanism.rate_constants(&env(), &jrates, &[1.0e-5; N_HET]);

        let mut jac = DMatrix::zeros(n, n);
        mechanism.jacobian(&rconst, &var, &mut jac);

        let no = species.index_of("NO").unwrap();
        let o3 = species.index_of("O3").unwrap();

        let mut base = vec![0.0; n];
        mechanism.derivative(&rconst, &var, &mut base);

        let delta = var[o3] * 1.0e-6;
        let mut perturbed_var = var.clone();
        perturbed_var[o3] += delta;
        let mut perturbed = vec![0.0; n];
        mechanism.derivative(&rconst, &perturbed_var, &mut perturbed);

        let numeric = (perturbed[no] - base[no]) / delta;
        assert_approx_eq!(f64, jac[(no, o3)], numeric, epsilon = numeric.abs() * 1e-5);
    }
}
