//! Solar geometry and photolysis-rate lookup.

use crate::error::{Error, Result};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

/// Solar declination [rad] for a day of year (1-based).
#[must_use]
pub fn declination(day_of_year: u32) -> f64 {
    23.45f64.to_radians() * (2.0 * PI * (284.0 + f64::from(day_of_year)) / 365.0).sin()
}

/// Cosine of the solar zenith angle at `utc_hour` (fractional hours) for the
/// given day and position. Negative values mean the sun is below the
/// horizon.
#[must_use]
pub fn cos_sza(day_of_year: u32, latitude_deg: f64, longitude_deg: f64, utc_hour: f64) -> f64 {
    let phi = latitude_deg.to_radians();
    let delta = declination(day_of_year);
    let hour_angle = ((utc_hour + longitude_deg / 15.0 - 12.0) * 15.0).to_radians();

    phi.sin().mul_add(delta.sin(), phi.cos() * delta.cos() * hour_angle.cos())
}

/// Sunrise and sunset in fractional UTC hours, or `None` during polar day
/// and polar night.
#[must_use]
pub fn sun_times(day_of_year: u32, latitude_deg: f64, longitude_deg: f64) -> Option<(f64, f64)> {
    let phi = latitude_deg.to_radians();
    let delta = declination(day_of_year);

    let cos_h0 = -phi.tan() * delta.tan();
    if !(-1.0..=1.0).contains(&cos_h0) {
        return None;
    }

    let half_day = cos_h0.acos().to_degrees() / 15.0;
    let noon = 12.0 - longitude_deg / 15.0;

    Some((noon - half_day, noon + half_day))
}

/// Tabulated photolysis rates by cosine of solar zenith angle.
///
/// Each row holds one CSZA node and the J-value vector at that node; lookup
/// interpolates linearly between nodes and returns the zero vector whenever
/// the sun is below the horizon.
#[derive(Clone)]
pub struct PhotolysisTable {
    nodes: Vec<f64>,
    rates: Vec<Vec<f64>>,
}

// Peak J-values (overhead sun) and CSZA exponents of the builtin table, in
// the photolysis-index order of the mechanism.
const BUILTIN_RATES: &[(f64, f64)] = &[
    (3.0e-5, 2.0),  // O3 → O1D
    (4.5e-4, 0.6),  // O3 → O
    (9.0e-3, 0.8),  // NO2
    (2.2e-2, 0.3),  // NO3 → NO
    (1.8e-1, 0.3),  // NO3 → NO2
    (4.0e-5, 1.2),  // N2O5
    (7.0e-7, 1.8),  // HNO3
    (1.8e-3, 0.9),  // HNO2
    (7.5e-6, 1.3),  // H2O2
    (3.1e-5, 1.1),  // CH2O → H + HCO
    (4.5e-5, 1.0),  // CH2O → H2 + CO
    (5.5e-6, 1.3),  // HNO4
    (5.0e-6, 1.3),  // MP
];

impl PhotolysisTable {
    /// Builtin table covering the mechanism's photolysis reactions on a
    /// uniform CSZA grid.
    #[must_use]
    pub fn builtin() -> Self {
        let nodes: Vec<f64> = (1..=20).map(|index| f64::from(index) * 0.05).collect();
        let rates = nodes
            .iter()
            .map(|&node| {
                BUILTIN_RATES
                    .iter()
                    .map(|&(peak, exponent)| peak * node.powf(exponent))
                    .collect()
            })
            .collect();

        Self { nodes, rates }
    }

    /// Read a table from `dir/jrates.dat`: one row per CSZA node,
    /// whitespace-separated, the node first and the J-values after it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the file is missing, a value
    /// does not parse, rows have inconsistent lengths or the nodes are not
    /// strictly increasing.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join("jrates.dat");
        let content = fs::read_to_string(&path).map_err(|err| {
            Error::InvalidInput(format!("cannot read {}: {err}", path.display()))
        })?;

        let mut nodes = Vec::new();
        let mut rates: Vec<Vec<f64>> = Vec::new();

        for (lineno, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let values: Vec<f64> = trimmed
                .split_whitespace()
                .map(str::parse)
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| {
                    Error::InvalidInput(format!(
                        "{} line {}: not a numeric row",
                        path.display(),
                        lineno + 1
                    ))
                })?;
            if values.len() < 2 {
                return Err(Error::InvalidInput(format!(
                    "{} line {}: expected a CSZA node and at least one J-value",
                    path.display(),
                    lineno + 1
                )));
            }
            if let Some(previous) = rates.last() {
                if values.len() - 1 != previous.len() {
                    return Err(Error::InvalidInput(format!(
                        "{} line {}: inconsistent number of J-values",
                        path.display(),
                        lineno + 1
                    )));
                }
            }
            if nodes.last().is_some_and(|&last| values[0] <= last) {
                return Err(Error::InvalidInput(format!(
                    "{} line {}: CSZA nodes must increase",
                    path.display(),
                    lineno + 1
                )));
            }

            nodes.push(values[0]);
            rates.push(values[1..].to_vec());
        }

        if nodes.is_empty() {
            return Err(Error::InvalidInput(format!(
                "{}: empty photolysis table",
                path.display()
            )));
        }

        Ok(Self { nodes, rates })
    }

    /// Number of photolysis reactions per row.
    #[must_use]
    pub fn width(&self) -> usize {
        self.rates[0].len()
    }

    /// J-value vector at `csza`. Zero for a sun at or below the horizon;
    /// clamped to the outermost nodes beyond the tabulated range.
    #[must_use]
    pub fn lookup(&self, csza: f64) -> Vec<f64> {
        if csza <= 0.0 {
            return vec![0.0; self.width()];
        }

        if csza <= self.nodes[0] {
            return self.rates[0].clone();
        }
        if csza >= *self.nodes.last().unwrap() {
            return self.rates.last().unwrap().clone();
        }

        let upper = self.nodes.partition_point(|&node| node < csza);
        let lower = upper - 1;
        let fraction = (csza - self.nodes[lower]) / (self.nodes[upper] - self.nodes[lower]);

        self.rates[lower]
            .iter()
            .zip(&self.rates[upper])
            .map(|(a, b)| (b - a).mul_add(fraction, *a))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn zenith_angle_peaks_at_local_noon() {
        // day 81 is near equinox, declination close to zero
        let noon = cos_sza(81, 60.0, 0.0, 12.0);
        let morning = cos_sza(81, 60.0, 0.0, 8.0);
        let night = cos_sza(81, 60.0, 0.0, 0.0);

        assert!(noon > morning);
        assert!(night < 0.0);
        // cos(60°) at equinox noon
        assert!((noon - 0.5).abs() < 0.03);
    }

    #[test]
    fn sun_times_bracket_noon() {
        let (sunrise, sunset) = sun_times(81, 60.0, 0.0).unwrap();

        assert!(sunrise < 12.0 && sunset > 12.0);
        assert_approx_eq!(f64, sunrise + sunset, 24.0, epsilon = 1e-9);

        // polar night at high latitude in winter
        assert!(sun_times(355, 80.0, 0.0).is_none());
    }

    #[test]
    fn lookup_interpolates_and_zeroes_at_night() {
        let table = PhotolysisTable::builtin();

        assert_eq!(table.width(), BUILTIN_RATES.len());
        assert!(table.lookup(0.0).iter().all(|&j| j == 0.0));
        assert!(table.lookup(-0.3).iter().all(|&j| j == 0.0));

        let low = table.lookup(0.31);
        let high = table.lookup(0.89);
        for (a, b) in low.iter().zip(&high) {
            assert!(a < b);
        }

        // clamped at the top node
        let top = table.lookup(1.0);
        assert_approx_eq!(f64, top[2], BUILTIN_RATES[2].0, epsilon = 1e-12);
    }

    #[test]
    fn load_rejects_ragged_rows() {
        let dir = std::env::temp_dir().join("aeroplume-jrates-test");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("jrates.dat"), "0.1 1.0 2.0\n0.2 1.0\n").unwrap();

        assert!(PhotolysisTable::load(&dir).is_err());

        fs::write(dir.join("jrates.dat"), "0.1 1.0 2.0\n0.2 2.0 3.0\n").unwrap();
        let table = PhotolysisTable::load(&dir).unwrap();
        assert_eq!(table.width(), 2);

        fs::remove_dir_all(&dir).ok();
    }
}
