//! Imposed vertical temperature and moisture environment.

use crate::constants;
use crate::mesh::Mesh;
use serde::{Deserialize, Serialize};

/// Saturation vapour pressure of water over a plane liquid surface [Pa],
/// after Murphy and Koop (2005). Valid from 123 K to 332 K.
#[must_use]
pub fn psat_water(t: f64) -> f64 {
    (54.842763 - 6763.22 / t - 4.210 * t.ln()
        + 0.000367 * t
        + (0.0415 * (t - 218.8)).tanh()
            * (53.878 - 1331.22 / t - 9.44523 * t.ln() + 0.014025 * t))
        .exp()
}

/// Saturation vapour pressure of water over ice [Pa], after Murphy and Koop
/// (2005). Valid above 110 K.
#[must_use]
pub fn psat_ice(t: f64) -> f64 {
    (9.550426 - 5723.265 / t + 3.53068 * t.ln() - 0.00728332 * t).exp()
}

/// Vertical profile of the undisturbed environment, evaluated at the mesh's
/// cell rows. `y = 0` is flight level; temperature follows the imposed lapse
/// rate away from it.
#[derive(Clone, Deserialize, Serialize)]
pub struct MetProfile {
    temperature_k: f64,
    pressure_pa: f64,
    rh_w: f64,
    lapse_rate: f64,
}

impl MetProfile {
    /// Constructor. `temperature_k` and `pressure_pa` are the flight-level
    /// conditions, `rh_w` the relative humidity with respect to liquid water
    /// (fraction, not percent) and `lapse_rate` in K m⁻¹ (negative when
    /// temperature falls with altitude).
    ///
    /// # Panics
    ///
    /// Panics if temperature, pressure or humidity are not positive.
    #[must_use]
    pub fn new(temperature_k: f64, pressure_pa: f64, rh_w: f64, lapse_rate: f64) -> Self {
        assert!(temperature_k > 0.0);
        assert!(pressure_pa > 0.0);
        assert!(rh_w >= 0.0);

        Self {
            temperature_k,
            pressure_pa,
            rh_w,
            lapse_rate,
        }
    }

    /// Flight-level temperature [K].
    #[must_use]
    pub const fn temperature(&self) -> f64 {
        self.temperature_k
    }

    /// Flight-level pressure [Pa].
    #[must_use]
    pub const fn pressure(&self) -> f64 {
        self.pressure_pa
    }

    /// Relative humidity over liquid water at flight level (fraction).
    #[must_use]
    pub const fn rh_w(&self) -> f64 {
        self.rh_w
    }

    /// Relative humidity over ice at flight level (fraction).
    #[must_use]
    pub fn rh_i(&self) -> f64 {
        self.rh_w * psat_water(self.temperature_k) / psat_ice(self.temperature_k)
    }

    /// Temperature [K] at altitude offset `y` [m] from flight level.
    #[must_use]
    pub fn temperature_at(&self, y: f64) -> f64 {
        self.lapse_rate.mul_add(y, self.temperature_k)
    }

    /// Temperature [K] at the centre of cell row `j`.
    #[must_use]
    pub fn temperature_at_row(&self, mesh: &Mesh, j: usize) -> f64 {
        self.temperature_at(mesh.y()[j])
    }

    /// Ambient water vapour number density [molecules cm⁻³] at altitude
    /// offset `y` [m].
    #[must_use]
    pub fn h2o_at(&self, y: f64) -> f64 {
        let t = self.temperature_at(y);
        let p_h2o = self.rh_w * psat_water(t);
        p_h2o / (constants::K_B * t) * 1.0e-6
    }
}
