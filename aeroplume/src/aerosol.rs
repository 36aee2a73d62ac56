//! Sectional (binned) aerosol populations.
//!
//! A population discretises a size distribution into `nbin` geometrically
//! spaced radius intervals and tracks one 2-D number-density field per bin.
//! Two populations exist in a simulation: `LA` (liquid, sulfate-dominated)
//! and `PA` (solid, ice and soot).

use crate::constants;
use crate::convert;
use crate::mesh::Mesh;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Fixed radius discretisation: geometrically spaced bin centres with their
/// edges and single-particle volumes.
#[derive(Clone, Deserialize, Serialize)]
pub struct BinGrid {
    centres: Vec<f64>,
    edges: Vec<f64>,
    volumes: Vec<f64>,
}

impl BinGrid {
    /// Geometric bin grid from `r_min` to `r_max` [m] with `nbin` bins. Bin
    /// centres are the geometric means of their edges.
    ///
    /// # Panics
    ///
    /// Panics if `nbin` is zero or the radius limits are not ordered and
    /// positive.
    #[must_use]
    pub fn geometric(r_min: f64, r_max: f64, nbin: usize) -> Self {
        assert!(nbin > 0);
        assert!(r_min > 0.0 && r_min < r_max);

        let ratio = (r_max / r_min).powf(1.0 / convert::f64_from_usize(nbin));
        let edges: Vec<f64> = (0..=nbin)
            .map(|index| r_min * ratio.powi(i32::try_from(index).unwrap()))
            .collect();
        let centres: Vec<f64> = edges
            .windows(2)
            .map(|pair| (pair[0] * pair[1]).sqrt())
            .collect();
        let volumes = centres
            .iter()
            .map(|&radius| 4.0 / 3.0 * PI * radius.powi(3))
            .collect();

        Self {
            centres,
            edges,
            volumes,
        }
    }

    /// Number of bins.
    #[must_use]
    pub fn nbin(&self) -> usize {
        self.centres.len()
    }

    /// Bin-centre radii [m].
    #[must_use]
    pub fn centres(&self) -> &[f64] {
        &self.centres
    }

    /// Bin-edge radii [m], one more than the bin count.
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Single-particle volumes at the bin centres [m³].
    #[must_use]
    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    /// Bin index whose interval contains `radius`, or `None` outside the
    /// grid.
    #[must_use]
    pub fn index(&self, radius: f64) -> Option<usize> {
        if radius < self.edges[0] || radius >= *self.edges.last().unwrap() {
            return None;
        }

        let index = self
            .edges
            .binary_search_by(|edge| edge.partial_cmp(&radius).unwrap())
            .unwrap_or_else(|insertion| insertion);

        Some(index.saturating_sub(1).min(self.nbin() - 1))
    }

    /// Fractions of a lognormal number distribution with median radius
    /// `r_median` and geometric standard deviation `gsd` falling into each
    /// bin, renormalised so the in-grid fractions sum to one.
    #[must_use]
    pub fn lognormal_weights(&self, r_median: f64, gsd: f64) -> Vec<f64> {
        let sqrt2_ln_gsd = std::f64::consts::SQRT_2 * gsd.ln();
        let cdf = |radius: f64| 0.5 * (1.0 + erf((radius / r_median).ln() / sqrt2_ln_gsd));

        let mut weights: Vec<f64> = self
            .edges
            .windows(2)
            .map(|pair| cdf(pair[1]) - cdf(pair[0]))
            .collect();

        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            for weight in &mut weights {
                *weight /= total;
            }
        }

        weights
    }
}

/// Error function, Abramowitz & Stegun 7.1.26. Max absolute error 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / 0.3275911f64.mul_add(x, 1.0);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));

    sign * (1.0 - poly * (-x * x).exp())
}

/// A sectional aerosol population: one number-density field [cm⁻³] per bin.
#[derive(Clone)]
pub struct SectionalDistribution {
    bins: BinGrid,
    pdf: Vec<Array2<f64>>,
}

impl SectionalDistribution {
    /// Empty population on `mesh` over `bins`.
    #[must_use]
    pub fn new(bins: BinGrid, mesh: &Mesh) -> Self {
        let pdf = (0..bins.nbin()).map(|_| mesh.field()).collect();

        Self { bins, pdf }
    }

    /// The radius discretisation.
    #[must_use]
    pub const fn bins(&self) -> &BinGrid {
        &self.bins
    }

    /// Per-bin fields, indexed `[bin][j, i]`.
    #[must_use]
    pub fn pdf(&self) -> &[Array2<f64>] {
        &self.pdf
    }

    /// Mutable per-bin fields.
    pub fn pdf_mut(&mut self) -> &mut [Array2<f64>] {
        &mut self.pdf
    }

    /// Radius moment of order `k` per cell, Σ_i rᵢᵏ · pdfᵢ.
    #[must_use]
    pub fn moment_field(&self, k: i32) -> Array2<f64> {
        let mut moment = Array2::zeros(self.pdf[0].dim());

        for (radius, field) in self.bins.centres().iter().zip(&self.pdf) {
            moment.scaled_add(radius.powi(k), field);
        }

        moment
    }

    /// Radius moment of order `k` integrated over the mesh,
    /// Σ_i rᵢᵏ Σ_cells pdfᵢ · area.
    #[must_use]
    pub fn total_moment(&self, k: i32, mesh: &Mesh) -> f64 {
        self.bins
            .centres()
            .iter()
            .zip(&self.pdf)
            .map(|(radius, field)| radius.powi(k) * mesh.integrate(field))
            .sum()
    }

    /// Total particle number per cell [cm⁻³].
    #[must_use]
    pub fn number_field(&self) -> Array2<f64> {
        self.moment_field(0)
    }

    /// Surface area density per cell [m² cm⁻³], 4π M₂.
    #[must_use]
    pub fn surface_area_field(&self) -> Array2<f64> {
        let mut area = self.moment_field(2);
        area *= 4.0 * PI;
        area
    }

    /// Effective radius per cell [m], M₃ / M₂; zero where the population is
    /// empty.
    #[must_use]
    pub fn effective_radius_field(&self) -> Array2<f64> {
        let m2 = self.moment_field(2);
        let m3 = self.moment_field(3);

        let mut radius = Array2::zeros(m2.dim());
        for ((r, &m2), &m3) in radius.iter_mut().zip(&m2).zip(&m3) {
            if m2 > 0.0 {
                *r = m3 / m2;
            }
        }

        radius
    }

    /// Whether every bin field is identically zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pdf
            .iter()
            .all(|field| field.iter().all(|&value| value == 0.0))
    }

    /// Add `number` [cm⁻³] distributed lognormally over the bins to every
    /// cell where `mask` is positive, scaled by the mask value.
    pub fn add_lognormal(&mut self, mask: &Array2<f64>, number: f64, r_median: f64, gsd: f64) {
        let weights = self.bins.lognormal_weights(r_median, gsd);

        for (field, weight) in self.pdf.iter_mut().zip(weights) {
            field.scaled_add(number * weight, mask);
        }
    }
}

/// Cunningham slip-correction factor for a particle of radius `r` [m].
#[must_use]
pub fn slip_correction(r: f64, t: f64, p: f64) -> f64 {
    let knudsen = constants::mean_free_path(t, p) / r;
    knudsen.mul_add(1.257 + 0.4 * (-1.1 / knudsen).exp(), 1.0)
}

/// Stokes terminal settling velocity [m s⁻¹, positive downward] of a sphere
/// of radius `r` [m] and density `rho_p` [kg m⁻³].
#[must_use]
pub fn terminal_velocity(r: f64, rho_p: f64, t: f64, p: f64) -> f64 {
    2.0 * rho_p * constants::GRAVITY * r * r * slip_correction(r, t, p)
        / (9.0 * constants::air_viscosity(t))
}

/// Brownian diffusivity [m² s⁻¹] of a particle of radius `r` [m].
#[must_use]
pub fn particle_diffusivity(r: f64, t: f64, p: f64) -> f64 {
    constants::K_B * t * slip_correction(r, t, p) / (6.0 * PI * constants::air_viscosity(t) * r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn geometric_bins() {
        let bins = BinGrid::geometric(1.0e-9, 1.0e-6, 30);

        assert_eq!(bins.nbin(), 30);
        assert_eq!(bins.edges().len(), 31);
        assert_approx_eq!(f64, bins.edges()[0], 1.0e-9, ulps = 4);
        assert_approx_eq!(f64, bins.edges()[30], 1.0e-6, epsilon = 1e-14);

        // constant edge ratio
        let ratio = bins.edges()[1] / bins.edges()[0];
        for pair in bins.edges().windows(2) {
            assert_approx_eq!(f64, pair[1] / pair[0], ratio, ulps = 8);
        }

        assert_eq!(bins.index(5.0e-10), None);
        assert_eq!(bins.index(1.1e-9), Some(0));
        assert_eq!(bins.index(9.9e-7), Some(29));
        assert_eq!(bins.index(2.0e-6), None);
    }

    #[test]
    fn lognormal_weights_sum_to_one() {
        let bins = BinGrid::geometric(1.0e-9, 1.0e-5, 40);
        let weights = bins.lognormal_weights(5.0e-8, 1.6);

        let total: f64 = weights.iter().sum();
        assert_approx_eq!(f64, total, 1.0, epsilon = 1e-12);

        // the mode lands near the median radius
        let peak = weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(bins.index(5.0e-8), Some(peak));
    }

    #[test]
    fn moments_and_effective_radius() {
        let mesh = Mesh::new(4, 4, 400.0, 400.0);
        let bins = BinGrid::geometric(1.0e-8, 1.0e-5, 8);
        let mut population = SectionalDistribution::new(bins, &mesh);

        assert!(population.is_empty());

        population.pdf_mut()[3].fill(100.0);
        let r3 = population.bins().centres()[3];

        assert!(!population.is_empty());
        assert_approx_eq!(f64, population.number_field()[[0, 0]], 100.0, ulps = 4);
        assert_approx_eq!(
            f64,
            population.effective_radius_field()[[2, 2]],
            r3,
            ulps = 8
        );
        assert_approx_eq!(
            f64,
            population.total_moment(0, &mesh),
            100.0 * mesh.total_area(),
            epsilon = 1e-3
        );
    }

    #[test]
    fn settling_grows_with_radius() {
        let (t, p) = (220.0, 24000.0);

        let v_small = terminal_velocity(1.0e-8, 1000.0, t, p);
        let v_large = terminal_velocity(1.0e-5, 1000.0, t, p);

        assert!(v_small > 0.0);
        assert!(v_large > 100.0 * v_small);

        // slip correction exceeds unity and decays toward it for large r
        assert!(slip_correction(1.0e-8, t, p) > slip_correction(1.0e-4, t, p));
        assert!(slip_correction(1.0e-4, t, p) > 1.0);
    }
}
