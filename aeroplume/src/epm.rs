//! Early plume microphysics.
//!
//! Evolves a single Lagrangian parcel from engine exit through wake-vortex
//! break-up and converts engine emission indices into the initial plume
//! state: ice crystal number and radius, interstitial soot, gaseous and
//! liquid sulfate, the initial sectional distributions of both aerosol
//! populations and the plume cross-sectional area.

use crate::aerosol::BinGrid;
use crate::constants;
use crate::convert;
use crate::met::{MetProfile, psat_ice, psat_water};
use crate::plume::h2so4_gas_fraction;
use log::debug;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Immutable per-simulation engine and fuel description.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EngineSpec {
    /// CO2 emission index [kg per kg fuel].
    pub ei_co2: f64,
    /// H2O emission index [kg/kg].
    pub ei_h2o: f64,
    /// NOx emission index, as NO2 [kg/kg].
    pub ei_nox: f64,
    /// CO emission index [kg/kg].
    pub ei_co: f64,
    /// Unburned-hydrocarbon emission index [kg/kg].
    pub ei_uhc: f64,
    /// SO2 emission index [kg/kg].
    pub ei_so2: f64,
    /// Soot mass emission index [kg/kg].
    pub ei_soot: f64,
    /// Soot emission radius [m].
    pub soot_radius: f64,
    /// Fuel flow per engine [kg s⁻¹].
    pub fuel_flow: f64,
    /// Flight speed [m s⁻¹].
    pub speed: f64,
    /// Number of engines.
    pub n_engines: usize,
    /// Wake-vortex sinking depth [m].
    pub vortex_dz: f64,
    /// Fraction of emitted SO2 converted to SO4 in the early jet.
    pub so2_to_so4: f64,
    /// Engine exit cross-section per engine [m²].
    pub exit_area: f64,
}

impl Default for EngineSpec {
    fn default() -> Self {
        Self {
            ei_co2: 3.16,
            ei_h2o: 1.23,
            ei_nox: 15.1e-3,
            ei_co: 1.2e-3,
            ei_uhc: 0.6e-3,
            ei_so2: 1.2e-3,
            ei_soot: 0.05e-3,
            soot_radius: 20.0e-9,
            fuel_flow: 0.7,
            speed: 240.0,
            n_engines: 2,
            vortex_dz: 200.0,
            so2_to_so4: 0.02,
            exit_area: 1.0,
        }
    }
}

impl EngineSpec {
    /// Total fuel burn per metre of flight path [kg m⁻¹].
    #[must_use]
    pub fn fuel_per_metre(&self) -> f64 {
        self.fuel_flow * convert::f64_from_usize(self.n_engines) / self.speed
    }

    /// Soot particles emitted per kg of fuel.
    #[must_use]
    pub fn soot_per_fuel(&self) -> f64 {
        let particle_mass = constants::RHO_SOOT * 4.0 / 3.0 * PI * self.soot_radius.powi(3);
        self.ei_soot / particle_mass
    }
}

/// Plume state at the end of the vortex phase, in in-plume mean excess
/// quantities over the ambient.
#[derive(Clone, Debug)]
pub struct EpmOutput {
    /// Plume cross-sectional area [m²].
    pub area: f64,
    /// Ice crystal number density [cm⁻³].
    pub ice_number: f64,
    /// Ice crystal volume-mean radius [m].
    pub ice_radius: f64,
    /// Interstitial (unactivated) soot number density [cm⁻³].
    pub soot_number: f64,
    /// Gaseous water excess over ambient [molecules cm⁻³]; negative when
    /// deposition consumed ambient vapour.
    pub h2o_gas_excess: f64,
    /// Gaseous sulfate [molecules cm⁻³].
    pub so4_gas: f64,
    /// Liquid (condensed) sulfate [molecules cm⁻³].
    pub so4_liquid: f64,
    /// Initial liquid-population number density per LA bin [cm⁻³].
    pub liquid_bins: Vec<f64>,
    /// Initial solid-population number density per PA bin [cm⁻³].
    pub ice_bins: Vec<f64>,
}

// Schumann's bulk dilution ratio (plume mass per fuel mass) grows as t^0.8
// through the jet phase; the organised vortex flow then traps the exhaust
// until break-up.
const DILUTION_T0: f64 = 7000.0;
const JET_PHASE_END: f64 = 4.0;

fn dilution(t: f64) -> f64 {
    DILUTION_T0 * t.min(JET_PHASE_END).max(0.1).powf(0.8)
}

/// Net heat release per kg fuel reaching the plume [J kg⁻¹]: lower heating
/// value times (1 − propulsion efficiency).
const PLUME_HEAT: f64 = 43.2e6 * 0.7;
const CP_AIR: f64 = 1004.0;

/// Sinking speed of the wake vortex pair [m s⁻¹].
const VORTEX_SINK: f64 = 1.5;

/// Geometric standard deviations of the initial size distributions.
const GSD_ICE: f64 = 1.3;
const GSD_SOOT: f64 = 1.5;
const GSD_LIQUID: f64 = 1.6;

/// Median radius of fresh volatile sulfate droplets [m].
const R_LIQUID: f64 = 5.0e-9;

/// Advance the parcel from engine exit to vortex break-up and return the
/// initial plume state.
///
/// For `n_engines` ≠ 2 the number densities and size distributions are
/// scaled by `n_engines / 2` (same-wing plumes have merged) and the
/// cross-sectional area is doubled (cross-fuselage plumes have not).
#[must_use]
pub fn run(met: &MetProfile, engine: &EngineSpec, la_bins: &BinGrid, pa_bins: &BinGrid) -> EpmOutput {
    let t_amb = met.temperature();
    let p_amb = met.pressure();
    let rho_amb = p_amb * constants::M_AIR / (constants::R_GAS * t_amb);

    let n_amb_h2o = met.h2o_at(0.0);
    // molecules cm⁻³ of emitted water per unit (1/dilution)
    let h2o_per_fuel =
        constants::N_AVOGADRO / constants::M_H2O * engine.ei_h2o * rho_amb * 1.0e-6;
    let soot_per_fuel = engine.soot_per_fuel() * rho_amb * 1.0e-6;

    let t_breakup = if engine.vortex_dz > 0.0 {
        (engine.vortex_dz / VORTEX_SINK).max(JET_PHASE_END)
    } else {
        120.0
    };

    // sweep the mixing trajectory on a geometric time grid, tracking the
    // peak water supersaturation seen by the parcel
    let mut activated = 0.0f64;
    let n_steps = 200;
    let ratio = (t_breakup / 0.3).powf(1.0 / f64::from(n_steps));

    let mut time = 0.3;
    for _ in 0..=n_steps {
        let n = dilution(time);
        let t_plume = t_amb + PLUME_HEAT / (CP_AIR * n);
        let n_h2o = n_amb_h2o + h2o_per_fuel / n;
        let p_h2o = n_h2o * constants::K_B * t_plume * 1.0e6;

        let s_w = p_h2o / psat_water(t_plume);
        if s_w > 1.0 && t_plume < 235.0 {
            // droplet activation on soot cores; deeper supersaturation
            // activates a larger fraction
            activated = activated.max(1.0 - (-2.0 * (s_w - 1.0)).exp());
        }

        time *= ratio;
    }

    let n_end = dilution(t_breakup);
    let t_end = t_amb + PLUME_HEAT / (CP_AIR * n_end);
    let soot_total = soot_per_fuel / n_end;
    let n_h2o_end = n_amb_h2o + h2o_per_fuel / n_end;

    // freeze and deposit: everything above ice saturation goes to the
    // crystals formed on activated soot
    let n_sat_ice = psat_ice(t_end) / (constants::K_B * t_end) * 1.0e-6;
    let mut ice_number = activated * soot_total;
    let mut ice_radius = 0.0;
    let mut h2o_gas = n_h2o_end;

    if ice_number > 0.0 && n_h2o_end > n_sat_ice {
        let deposited = n_h2o_end - n_sat_ice;
        h2o_gas = n_sat_ice;

        let ice_mass = deposited * 1.0e6 * constants::M_H2O / constants::N_AVOGADRO;
        let crystal_mass = ice_mass / (ice_number * 1.0e6);
        ice_radius = (3.0 * crystal_mass / (4.0 * PI * constants::RHO_ICE)).cbrt();
    } else {
        ice_number = 0.0;
    }

    let soot_number = (1.0 - activated) * soot_total;

    // SO2 → SO4 conversion in the early jet, then vapour/liquid split at
    // the ambient temperature
    let so4_total = constants::N_AVOGADRO / constants::M_H2SO4
        * engine.ei_so2
        * engine.so2_to_so4
        * (constants::M_H2SO4 / 64.06e-3)
        * rho_amb
        * 1.0e-6
        / n_end;
    let gas_fraction = h2so4_gas_fraction(t_amb, so4_total);
    let so4_gas = gas_fraction * so4_total;
    let so4_liquid = (1.0 - gas_fraction) * so4_total;

    // volatile sulfate droplets, lognormal about the fresh-mode radius
    let liquid_weights = la_bins.lognormal_weights(R_LIQUID, GSD_LIQUID);
    let mean_volume: f64 = liquid_weights
        .iter()
        .zip(la_bins.volumes())
        .map(|(w, v)| w * v)
        .sum();
    let liquid_mass = so4_liquid * 1.0e6 * constants::M_H2SO4 / constants::N_AVOGADRO;
    let liquid_number = if mean_volume > 0.0 {
        liquid_mass / (constants::RHO_SULFATE * mean_volume) * 1.0e-6
    } else {
        0.0
    };

    let mut liquid_bins: Vec<f64> = liquid_weights
        .iter()
        .map(|w| w * liquid_number)
        .collect();

    let mut ice_bins = vec![0.0; pa_bins.nbin()];
    if ice_number > 0.0 {
        for (bin, weight) in pa_bins.lognormal_weights(ice_radius, GSD_ICE).iter().enumerate() {
            ice_bins[bin] += weight * ice_number;
        }
    }
    for (bin, weight) in pa_bins
        .lognormal_weights(engine.soot_radius, GSD_SOOT)
        .iter()
        .enumerate()
    {
        ice_bins[bin] += weight * soot_number;
    }

    // plume cross-section from the bulk dilution
    let mut area = n_end / rho_amb * engine.fuel_per_metre();
    area = area.max(engine.exit_area * convert::f64_from_usize(engine.n_engines));

    let mut scale = 1.0;
    if engine.n_engines != 2 {
        scale = convert::f64_from_usize(engine.n_engines) / 2.0;
        area *= 2.0;
    }
    for value in liquid_bins.iter_mut().chain(&mut ice_bins) {
        *value *= scale;
    }

    let output = EpmOutput {
        area,
        ice_number: ice_number * scale,
        ice_radius,
        soot_number: soot_number * scale,
        h2o_gas_excess: h2o_gas - n_amb_h2o,
        so4_gas: so4_gas * scale,
        so4_liquid: so4_liquid * scale,
        liquid_bins,
        ice_bins,
    };

    debug!(
        "EPM: area {:.0} m², ice {:.3e} cm⁻³ at {:.2e} m, soot {:.3e} cm⁻³",
        output.area, output.ice_number, output.ice_radius, output.soot_number
    );

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bins() -> (BinGrid, BinGrid) {
        (
            BinGrid::geometric(1.0e-9, 1.0e-6, 32),
            BinGrid::geometric(5.0e-9, 1.0e-4, 32),
        )
    }

    #[test]
    fn cold_supersaturated_plume_forms_ice() {
        let met = MetProfile::new(210.0, 24000.0, 1.2, 0.0);
        let (la, pa) = bins();
        let out = run(&met, &EngineSpec::default(), &la, &pa);

        assert!(out.ice_number > 1.0e4);
        assert!(out.ice_radius > 1.0e-8);
        assert!(out.area > 2.0 * 2.0 * EngineSpec::default().exit_area);

        // the sectional representation carries the crystal number
        let binned: f64 = out.ice_bins.iter().sum();
        assert!(binned >= out.ice_number);
    }

    #[test]
    fn warm_dry_plume_forms_no_ice() {
        let met = MetProfile::new(240.0, 24000.0, 0.3, 0.0);
        let (la, pa) = bins();
        let out = run(&met, &EngineSpec::default(), &la, &pa);

        assert!(out.ice_number == 0.0);
        assert!(out.soot_number > 0.0);
    }

    #[test]
    fn ice_number_non_decreasing_in_humidity() {
        let (la, pa) = bins();
        let engine = EngineSpec::default();

        let mut previous = -1.0;
        for rh in [0.4, 0.6, 0.8, 1.0, 1.2, 1.4] {
            let met = MetProfile::new(215.0, 24000.0, rh, 0.0);
            let out = run(&met, &engine, &la, &pa);

            assert!(out.ice_number >= previous);
            previous = out.ice_number;
        }
    }

    #[test]
    fn four_engine_scaling() {
        let met = MetProfile::new(210.0, 24000.0, 1.2, 0.0);
        let (la, pa) = bins();

        let twin = run(&met, &EngineSpec::default(), &la, &pa);
        let quad = run(
            &met,
            &EngineSpec {
                n_engines: 4,
                ..EngineSpec::default()
            },
            &la,
            &pa,
        );

        // same-wing plumes merge: twice the number density, twice the area
        assert!((quad.ice_number / twin.ice_number - 2.0).abs() < 1e-10);
        assert!(quad.area > twin.area);
    }

    #[test]
    fn sulfate_split_is_consistent() {
        let met = MetProfile::new(220.0, 24000.0, 0.6, 0.0);
        let (la, pa) = bins();
        let out = run(&met, &EngineSpec::default(), &la, &pa);

        assert!(out.so4_gas >= 0.0 && out.so4_liquid >= 0.0);
        assert!(out.so4_gas + out.so4_liquid > 0.0);

        // nearly all sulfuric acid is condensed at UT/LS temperatures
        assert!(out.so4_liquid > out.so4_gas);
    }
}
