//! The undisturbed background: initial-condition profile and the
//! time-indexed ambient record against which plume excess is measured.

use crate::error::{Error, Result};
use crate::species::SpeciesTable;
use ndarray::Array2;
use std::fs;
use std::path::Path;

/// Bulk background aerosol moments carried alongside the gas phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct BulkAerosol {
    /// Number density [cm⁻³].
    pub number: f64,
    /// Effective radius [m].
    pub radius: f64,
    /// Surface area density [cm² cm⁻³].
    pub surface_area: f64,
}

/// One interpolated level of the ambient profile.
#[derive(Clone, Debug)]
pub struct AmbientSample {
    /// Volume mixing ratio per species table index (zero where the profile
    /// has no column).
    pub mixing_ratios: Vec<f64>,
    /// Bulk background aerosol.
    pub aerosol: BulkAerosol,
}

/// Vertical initial-condition profile keyed by pressure.
pub struct AmbientProfile {
    pressures: Vec<f64>,
    // per species table index: profile column, or None
    columns: Vec<Option<usize>>,
    aerosol_columns: [Option<usize>; 3],
    rows: Vec<Vec<f64>>,
    n_species: usize,
}

const AEROSOL_LABELS: [&str; 3] = ["AERO_N", "AERO_R", "AERO_SAD"];

impl AmbientProfile {
    /// Parse a whitespace-separated profile. The header names the columns:
    /// `PRESSURE` first, then species names (mixing ratios, mol/mol) and
    /// optionally `AERO_N`, `AERO_R`, `AERO_SAD`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] identifying the offending line for a
    /// missing file, malformed header, unknown species, ragged rows or
    /// non-monotonic pressures.
    pub fn load(path: &Path, species: &SpeciesTable) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| {
            Error::InvalidInput(format!("cannot read ambient file {}: {err}", path.display()))
        })?;

        Self::parse(&content, species)
            .map_err(|err| Error::InvalidInput(format!("{}: {err}", path.display())))
    }

    /// Parse from text; see [`Self::load`].
    ///
    /// # Errors
    ///
    /// As [`Self::load`], without the file-path prefix.
    pub fn parse(content: &str, species: &SpeciesTable) -> Result<Self> {
        let mut lines = content
            .lines()
            .enumerate()
            .map(|(lineno, line)| (lineno, line.trim()))
            .filter(|&(_, line)| !line.is_empty() && !line.starts_with('#'));

        let Some((_, header)) = lines.next() else {
            return Err(Error::InvalidInput("empty ambient profile".to_owned()));
        };

        let labels: Vec<&str> = header.split_whitespace().collect();
        if labels.first().copied() != Some("PRESSURE") {
            return Err(Error::InvalidInput(
                "ambient header must start with PRESSURE".to_owned(),
            ));
        }

        let mut columns = vec![None; species.len()];
        let mut aerosol_columns = [None; 3];
        for (column, &label) in labels.iter().enumerate().skip(1) {
            if let Some(position) = AEROSOL_LABELS.iter().position(|&name| name == label) {
                aerosol_columns[position] = Some(column - 1);
            } else if let Some(index) = species.index_of(label) {
                columns[index] = Some(column - 1);
            } else {
                return Err(Error::InvalidInput(format!(
                    "ambient header: unknown column `{label}`"
                )));
            }
        }

        let mut pressures = Vec::new();
        let mut rows = Vec::new();
        for (lineno, line) in lines {
            let values: Vec<f64> = line
                .split_whitespace()
                .map(str::parse)
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| {
                    Error::InvalidInput(format!("line {}: not a numeric row", lineno + 1))
                })?;
            if values.len() != labels.len() {
                return Err(Error::InvalidInput(format!(
                    "line {}: expected {} columns, got {}",
                    lineno + 1,
                    labels.len(),
                    values.len()
                )));
            }
            if pressures.last().is_some_and(|&last: &f64| values[0] >= last) {
                return Err(Error::InvalidInput(format!(
                    "line {}: pressures must decrease with altitude",
                    lineno + 1
                )));
            }

            pressures.push(values[0]);
            rows.push(values[1..].to_vec());
        }

        if pressures.is_empty() {
            return Err(Error::InvalidInput(
                "ambient profile has no data rows".to_owned(),
            ));
        }

        Ok(Self {
            pressures,
            columns,
            aerosol_columns,
            rows,
            n_species: species.len(),
        })
    }

    /// A clean upper-troposphere background usable without an input file.
    #[must_use]
    pub fn default_background(species: &SpeciesTable) -> Self {
        let entries = [
            ("O3", 1.0e-7),
            ("NO", 8.0e-11),
            ("NO2", 3.0e-11),
            ("HNO3", 2.0e-10),
            ("CO", 1.0e-7),
            ("CH4", 1.8e-6),
            ("CO2", 4.1e-4),
            ("N2O", 3.3e-7),
            ("H2O2", 5.0e-10),
            ("SO2", 2.0e-11),
            ("H2O", 6.0e-5),
        ];

        let mut columns = vec![None; species.len()];
        let mut row = Vec::new();
        for (column, &(name, value)) in entries.iter().enumerate() {
            columns[species.index_of(name).unwrap()] = Some(column);
            row.push(value);
        }

        // background sulfate layer
        let aerosol_columns = [Some(row.len()), Some(row.len() + 1), Some(row.len() + 2)];
        row.extend_from_slice(&[10.0, 8.0e-8, 1.0e-8]);

        // two bracketing levels with identical values
        Self {
            pressures: vec![40000.0, 15000.0],
            columns,
            aerosol_columns,
            rows: vec![row.clone(), row],
            n_species: species.len(),
        }
    }

    /// Interpolate the profile at `pressure` [Pa], clamped to the tabulated
    /// range.
    #[must_use]
    pub fn sample(&self, pressure: f64) -> AmbientSample {
        // pressures decrease with row index
        let (lower, upper, fraction) = if pressure >= self.pressures[0] {
            (0, 0, 0.0)
        } else if pressure <= *self.pressures.last().unwrap() {
            let last = self.pressures.len() - 1;
            (last, last, 0.0)
        } else {
            let upper = self.pressures.partition_point(|&level| level > pressure);
            let lower = upper - 1;
            let fraction =
                (pressure - self.pressures[lower]) / (self.pressures[upper] - self.pressures[lower]);
            (lower, upper, fraction)
        };

        let value_at = |column: usize| {
            let a = self.rows[lower][column];
            let b = self.rows[upper][column];
            (b - a).mul_add(fraction, a)
        };

        let mixing_ratios = self
            .columns
            .iter()
            .map(|column| column.map_or(0.0, value_at))
            .collect();

        let aerosol = BulkAerosol {
            number: self.aerosol_columns[0].map_or(0.0, value_at),
            radius: self.aerosol_columns[1].map_or(0.0, value_at),
            surface_area: self.aerosol_columns[2].map_or(0.0, value_at),
        };

        AmbientSample {
            mixing_ratios,
            aerosol,
        }
    }

    /// Number of species table entries the samples cover.
    #[must_use]
    pub const fn n_species(&self) -> usize {
        self.n_species
    }
}

/// Time-indexed background state: one row per time-grid point for every
/// species, the solar zenith cosine and the bulk aerosol moments.
pub struct AmbientRecord {
    species: Array2<f64>,
    csza: Vec<f64>,
    aerosol: BulkAerosol,
}

impl AmbientRecord {
    /// Allocate a record for `n_times` grid points, seeding every row with
    /// `initial` concentrations [molecules cm⁻³].
    ///
    /// # Panics
    ///
    /// Panics if `n_times` is zero.
    #[must_use]
    pub fn new(n_times: usize, initial: &[f64], aerosol: BulkAerosol) -> Self {
        assert!(n_times > 0);

        let mut species = Array2::zeros((n_times, initial.len()));
        for mut row in species.rows_mut() {
            for (target, &value) in row.iter_mut().zip(initial) {
                *target = value;
            }
        }

        Self {
            species,
            csza: vec![0.0; n_times],
            aerosol,
        }
    }

    /// Concentrations at time index `index`.
    #[must_use]
    pub fn row(&self, index: usize) -> Vec<f64> {
        self.species.row(index).to_vec()
    }

    /// Store the ambient concentrations for time index `index`.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not match the species dimension.
    pub fn set_row(&mut self, index: usize, values: &[f64]) {
        assert_eq!(values.len(), self.species.ncols());

        for (target, &value) in self.species.row_mut(index).iter_mut().zip(values) {
            *target = value;
        }
    }

    /// Solar zenith cosine at time index `index`.
    #[must_use]
    pub fn csza(&self, index: usize) -> f64 {
        self.csza[index]
    }

    /// Store the solar zenith cosine for time index `index`.
    pub fn set_csza(&mut self, index: usize, value: f64) {
        self.csza[index] = value;
    }

    /// Bulk background aerosol, constant over the run.
    #[must_use]
    pub const fn aerosol(&self) -> &BulkAerosol {
        &self.aerosol
    }

    /// Number of time grid points.
    #[must_use]
    pub fn n_times(&self) -> usize {
        self.csza.len()
    }

    /// The full species block, time × species.
    #[must_use]
    pub const fn species(&self) -> &Array2<f64> {
        &self.species
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    const PROFILE: &str = "\
# upper troposphere test profile
PRESSURE O3 NO AERO_N AERO_R AERO_SAD
30000.0  8.0e-8 1.0e-10 12.0 7.0e-8 2.0e-8
24000.0  1.0e-7 8.0e-11 10.0 8.0e-8 1.0e-8
18000.0  2.0e-7 6.0e-11  8.0 9.0e-8 0.5e-8
";

    #[test]
    fn parse_and_interpolate() {
        let species = SpeciesTable::builtin();
        let profile = AmbientProfile::parse(PROFILE, &species).unwrap();

        let sample = profile.sample(24000.0);
        assert_approx_eq!(
            f64,
            sample.mixing_ratios[species.index_of("O3").unwrap()],
            1.0e-7,
            ulps = 4
        );
        assert_approx_eq!(f64, sample.aerosol.number, 10.0, ulps = 4);

        // halfway between the two lower levels
        let sample = profile.sample(21000.0);
        assert_approx_eq!(
            f64,
            sample.mixing_ratios[species.index_of("O3").unwrap()],
            1.5e-7,
            epsilon = 1e-12
        );

        // clamped outside the range
        let sample = profile.sample(50000.0);
        assert_approx_eq!(
            f64,
            sample.mixing_ratios[species.index_of("O3").unwrap()],
            8.0e-8,
            ulps = 4
        );

        // species without a column default to zero
        assert_approx_eq!(
            f64,
            sample.mixing_ratios[species.index_of("PAN").unwrap()],
            0.0,
            ulps = 2
        );
    }

    #[test]
    fn parse_rejects_bad_input() {
        let species = SpeciesTable::builtin();

        // unknown column
        assert!(AmbientProfile::parse("PRESSURE WAT\n1000.0 1.0\n", &species).is_err());
        // ragged row
        assert!(AmbientProfile::parse("PRESSURE O3\n1000.0\n", &species).is_err());
        // increasing pressure
        assert!(
            AmbientProfile::parse("PRESSURE O3\n1000.0 1e-7\n2000.0 1e-7\n", &species).is_err()
        );
        // no header
        assert!(AmbientProfile::parse("", &species).is_err());
    }

    #[test]
    fn record_stores_time_series() {
        let species = SpeciesTable::builtin();
        let initial = vec![1.0; species.n_variable()];
        let mut record = AmbientRecord::new(5, &initial, BulkAerosol::default());

        assert_eq!(record.n_times(), 5);
        assert_approx_eq!(f64, record.row(3)[0], 1.0, ulps = 2);

        let mut updated = initial;
        updated[0] = 2.5;
        record.set_row(3, &updated);
        record.set_csza(3, 0.4);

        assert_approx_eq!(f64, record.row(3)[0], 2.5, ulps = 2);
        assert_approx_eq!(f64, record.row(2)[0], 1.0, ulps = 2);
        assert_approx_eq!(f64, record.csza(3), 0.4, ulps = 2);
    }
}
