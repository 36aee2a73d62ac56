//! Physical constants in CGS-leaning atmospheric-chemistry units.

/// Boltzmann constant [J K⁻¹].
pub const K_B: f64 = 1.380649e-23;

/// Universal gas constant [J mol⁻¹ K⁻¹].
pub const R_GAS: f64 = 8.31446;

/// Avogadro constant [mol⁻¹].
pub const N_AVOGADRO: f64 = 6.02214076e23;

/// Standard gravity [m s⁻²].
pub const GRAVITY: f64 = 9.80665;

/// Molar mass of dry air [kg mol⁻¹].
pub const M_AIR: f64 = 28.9647e-3;

/// Molar mass of water [kg mol⁻¹].
pub const M_H2O: f64 = 18.015e-3;

/// Molar mass of sulfuric acid [kg mol⁻¹].
pub const M_H2SO4: f64 = 98.079e-3;

/// Density of liquid sulfate aerosol [kg m⁻³].
pub const RHO_SULFATE: f64 = 1.600e3;

/// Density of ice [kg m⁻³].
pub const RHO_ICE: f64 = 0.9167e3;

/// Density of soot [kg m⁻³].
pub const RHO_SOOT: f64 = 1.800e3;

/// Air number density at temperature `t` [K] and pressure `p` [Pa],
/// in molecules cm⁻³.
#[must_use]
pub fn air_number_density(t: f64, p: f64) -> f64 {
    p / (K_B * t) * 1.0e-6
}

/// Dynamic viscosity of air after Sutherland [kg m⁻¹ s⁻¹].
#[must_use]
pub fn air_viscosity(t: f64) -> f64 {
    1.458e-6 * t.powf(1.5) / (t + 110.4)
}

/// Mean free path of air molecules [m].
#[must_use]
pub fn mean_free_path(t: f64, p: f64) -> f64 {
    2.0 * air_viscosity(t) / (p * (8.0 * M_AIR / (std::f64::consts::PI * R_GAS * t)).sqrt())
}
