//! Heterogeneous reaction rates from gamma-uptake theory.
//!
//! Each pathway gets a first-order rate k = γ · v̄/4 · SA summed over the
//! four surface categories, with v̄ the thermal speed of the gas and SA the
//! category's surface area density.

use super::mechanism::{HET_HO2, HET_N2O5, HET_NO2, N_HET};
use crate::constants;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Polar-stratospheric-cloud state, switching the solid-surface uptake
/// coefficients.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum PscState {
    /// No PSC present.
    #[default]
    None,
    /// Nitric-acid-trihydrate particles.
    Nat,
    /// Water-ice particles.
    Ice,
}

/// Radius and surface area density of one aerosol surface category.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct SurfaceCategory {
    /// Number-weighted particle radius [m].
    pub radius: f64,
    /// Surface area density [cm² cm⁻³].
    pub area: f64,
}

/// The four surface categories entering the heterogeneous update.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct AerosolSurfaces {
    /// Ice or NAT particles (contrail ice, PSC).
    pub ice_nat: SurfaceCategory,
    /// Stratospheric liquid binary/ternary aerosol.
    pub strat_liquid: SurfaceCategory,
    /// Tropospheric sulfate.
    pub trop_sulfate: SurfaceCategory,
    /// Soot.
    pub soot: SurfaceCategory,
}

/// Mean molecular speed [cm s⁻¹] of a gas with molar mass `molar_mass`
/// [kg mol⁻¹] at temperature `t` [K].
fn thermal_speed(molar_mass: f64, t: f64) -> f64 {
    (8.0 * constants::R_GAS * t / (PI * molar_mass)).sqrt() * 100.0
}

// Uptake coefficients per pathway and category. Slot order matches the
// mechanism's heterogeneous slots.
fn gamma(slot: usize, category: usize, psc: PscState) -> f64 {
    match (slot, category) {
        // N2O5 hydrolysis: efficient on liquid sulfate and ice, slower on
        // NAT and soot
        (HET_N2O5, 0) => match psc {
            PscState::Nat => 4.0e-4,
            _ => 2.0e-2,
        },
        (HET_N2O5, 1 | 2) => 1.0e-1,
        (HET_N2O5, 3) => 5.0e-3,
        // HO2 uptake
        (HET_HO2, 0) => 2.5e-2,
        (HET_HO2, 1 | 2) => 2.0e-1,
        (HET_HO2, 3) => 1.0e-2,
        // NO2 conversion on soot only
        (HET_NO2, 3) => 1.0e-4,
        _ => 0.0,
    }
}

// Molar masses of the gases taken up, in slot order.
const UPTAKE_MASS: [f64; N_HET] = [108.01e-3, 33.01e-3, 46.01e-3];

/// First-order heterogeneous rates [s⁻¹] per mechanism slot.
///
/// The rate vector is rebuilt from scratch on every call; `iwc` [kg m⁻³]
/// gates the ice category, so an ice surface left over in the inputs does
/// not react once the ice has evaporated.
#[must_use]
pub fn het_rates(surfaces: &AerosolSurfaces, t: f64, psc: PscState, iwc: f64) -> [f64; N_HET] {
    let categories = [
        surfaces.ice_nat,
        surfaces.strat_liquid,
        surfaces.trop_sulfate,
        surfaces.soot,
    ];

    let mut rates = [0.0; N_HET];

    for (slot, rate) in rates.iter_mut().enumerate() {
        let speed = thermal_speed(UPTAKE_MASS[slot], t);

        for (category, surface) in categories.iter().enumerate() {
            if surface.area <= 0.0 || surface.radius <= 0.0 {
                continue;
            }
            if category == 0 && iwc <= 0.0 && psc == PscState::None {
                continue;
            }

            *rate += gamma(slot, category, psc) * speed / 4.0 * surface.area;
        }
    }

    rates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surfaces() -> AerosolSurfaces {
        AerosolSurfaces {
            ice_nat: SurfaceCategory {
                radius: 2.0e-6,
                area: 1.0e-6,
            },
            strat_liquid: SurfaceCategory {
                radius: 1.0e-7,
                area: 1.0e-8,
            },
            trop_sulfate: SurfaceCategory {
                radius: 5.0e-8,
                area: 5.0e-8,
            },
            soot: SurfaceCategory {
                radius: 2.0e-8,
                area: 1.0e-9,
            },
        }
    }

    #[test]
    fn rates_scale_with_surface_area() {
        let base = het_rates(&surfaces(), 220.0, PscState::None, 1.0e-6);

        let mut doubled_surfaces = surfaces();
        doubled_surfaces.ice_nat.area *= 2.0;
        doubled_surfaces.strat_liquid.area *= 2.0;
        doubled_surfaces.trop_sulfate.area *= 2.0;
        doubled_surfaces.soot.area *= 2.0;
        let doubled = het_rates(&doubled_surfaces, 220.0, PscState::None, 1.0e-6);

        for (a, b) in base.iter().zip(&doubled) {
            assert!(*a > 0.0);
            assert!((b / a - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn ice_category_gated_by_iwc() {
        let with_ice = het_rates(&surfaces(), 220.0, PscState::None, 1.0e-6);
        let without_ice = het_rates(&surfaces(), 220.0, PscState::None, 0.0);

        assert!(with_ice[HET_N2O5] > without_ice[HET_N2O5]);

        // a PSC keeps the solid category active without plume ice
        let psc = het_rates(&surfaces(), 195.0, PscState::Ice, 0.0);
        assert!(psc[HET_N2O5] > without_ice[HET_N2O5]);
    }

    #[test]
    fn nat_slows_n2o5() {
        let ice = het_rates(&surfaces(), 195.0, PscState::Ice, 1.0e-6);
        let nat = het_rates(&surfaces(), 195.0, PscState::Nat, 1.0e-6);

        assert!(nat[HET_N2O5] < ice[HET_N2O5]);
        // HO2 uptake is insensitive to the solid phase
        assert!((nat[HET_HO2] - ice[HET_HO2]).abs() < 1e-15);
    }
}
