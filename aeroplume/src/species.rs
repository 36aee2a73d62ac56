//! Chemical species metadata: the fixed ordered species set, molar masses,
//! the species-table file parser and reactive-nitrogen bookkeeping.

use crate::error::{Error, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::io::BufRead;

/// How a species participates in the simulation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Designation {
    /// Advanced by the chemistry integrator and transported.
    Variable,
    /// Held constant by the chemistry integrator.
    Fixed,
    /// Bulk condensed-phase reservoir attached to the aerosol.
    AerosolBulk,
}

/// One species: name, molar mass [kg mol⁻¹] and designation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Species {
    /// Upper-case species name, at most eight characters.
    pub name: String,
    /// Molar mass [kg mol⁻¹].
    pub molar_mass: f64,
    /// Role of this species.
    pub designation: Designation,
}

// The builtin ordering: 127 variable species first, then the 8 species the
// integrator holds fixed, then the condensed-phase reservoirs. Positions are
// the stable indices used in `varArray`/`fixArray`.
const BUILTIN: &[(&str, f64, Designation)] = &[
    ("CO2", 44.01e-3, Designation::Variable),
    ("PPN", 135.08e-3, Designation::Variable),
    ("BRNO2", 125.91e-3, Designation::Variable),
    ("IEPOX", 118.13e-3, Designation::Variable),
    ("PMNN", 147.09e-3, Designation::Variable),
    ("N2O", 44.01e-3, Designation::Variable),
    ("N", 14.01e-3, Designation::Variable),
    ("PAN", 121.05e-3, Designation::Variable),
    ("ALK4", 58.12e-3, Designation::Variable),
    ("MAP", 76.05e-3, Designation::Variable),
    ("MPN", 93.04e-3, Designation::Variable),
    ("CL2O2", 102.90e-3, Designation::Variable),
    ("ETP", 62.07e-3, Designation::Variable),
    ("HNO2", 47.01e-3, Designation::Variable),
    ("C3H8", 44.10e-3, Designation::Variable),
    ("RA3P", 76.09e-3, Designation::Variable),
    ("RB3P", 76.09e-3, Designation::Variable),
    ("OCLO", 67.45e-3, Designation::Variable),
    ("CLNO2", 81.46e-3, Designation::Variable),
    ("ISOP", 68.12e-3, Designation::Variable),
    ("HNO4", 79.01e-3, Designation::Variable),
    ("MAOP", 102.09e-3, Designation::Variable),
    ("MP", 48.04e-3, Designation::Variable),
    ("CLOO", 67.45e-3, Designation::Variable),
    ("RP", 90.08e-3, Designation::Variable),
    ("BRCL", 115.36e-3, Designation::Variable),
    ("PP", 92.10e-3, Designation::Variable),
    ("PRPN", 119.10e-3, Designation::Variable),
    ("SO4", 98.08e-3, Designation::Variable),
    ("BR2", 159.81e-3, Designation::Variable),
    ("ETHLN", 105.05e-3, Designation::Variable),
    ("MVKN", 149.10e-3, Designation::Variable),
    ("R4P", 90.12e-3, Designation::Variable),
    ("C2H6", 30.07e-3, Designation::Variable),
    ("RIP", 118.13e-3, Designation::Variable),
    ("VRP", 104.10e-3, Designation::Variable),
    ("ATOOH", 90.08e-3, Designation::Variable),
    ("IAP", 118.13e-3, Designation::Variable),
    ("DHMOB", 132.10e-3, Designation::Variable),
    ("MOBA", 114.10e-3, Designation::Variable),
    ("MRP", 120.10e-3, Designation::Variable),
    ("N2O5", 108.01e-3, Designation::Variable),
    ("ISNOHOO", 133.10e-3, Designation::Variable),
    ("ISNP", 147.10e-3, Designation::Variable),
    ("ISOPNB", 147.13e-3, Designation::Variable),
    ("IEPOXOO", 149.10e-3, Designation::Variable),
    ("MACRNO2", 149.10e-3, Designation::Variable),
    ("ROH", 60.10e-3, Designation::Variable),
    ("MOBAOO", 146.10e-3, Designation::Variable),
    ("DIBOO", 133.10e-3, Designation::Variable),
    ("PMN", 147.09e-3, Designation::Variable),
    ("ISNOOB", 147.10e-3, Designation::Variable),
    ("INPN", 147.10e-3, Designation::Variable),
    ("H", 1.008e-3, Designation::Variable),
    ("BRNO3", 141.91e-3, Designation::Variable),
    ("PRPE", 42.08e-3, Designation::Variable),
    ("MVKOO", 119.10e-3, Designation::Variable),
    ("CL2", 70.90e-3, Designation::Variable),
    ("ISOPND", 147.13e-3, Designation::Variable),
    ("HOBR", 96.91e-3, Designation::Variable),
    ("A3O2", 75.09e-3, Designation::Variable),
    ("PROPNN", 119.08e-3, Designation::Variable),
    ("GLYX", 58.04e-3, Designation::Variable),
    ("MAOPO2", 119.10e-3, Designation::Variable),
    ("CH4", 16.04e-3, Designation::Variable),
    ("GAOO", 90.00e-3, Designation::Variable),
    ("B3O2", 75.09e-3, Designation::Variable),
    ("ACET", 58.08e-3, Designation::Variable),
    ("MACRN", 149.10e-3, Designation::Variable),
    ("CH2OO", 46.03e-3, Designation::Variable),
    ("MGLYOO", 104.06e-3, Designation::Variable),
    ("VRO2", 119.10e-3, Designation::Variable),
    ("MGLOO", 104.06e-3, Designation::Variable),
    ("MACROO", 118.10e-3, Designation::Variable),
    ("PO2", 77.08e-3, Designation::Variable),
    ("CH3CHOO", 60.05e-3, Designation::Variable),
    ("MAN2", 148.10e-3, Designation::Variable),
    ("ISNOOA", 147.10e-3, Designation::Variable),
    ("H2O2", 34.01e-3, Designation::Variable),
    ("PRN1", 120.10e-3, Designation::Variable),
    ("ETO2", 61.06e-3, Designation::Variable),
    ("KO2", 103.10e-3, Designation::Variable),
    ("RCO3", 89.07e-3, Designation::Variable),
    ("HC5OO", 117.10e-3, Designation::Variable),
    ("GLYC", 60.05e-3, Designation::Variable),
    ("CLNO3", 97.46e-3, Designation::Variable),
    ("RIO2", 117.15e-3, Designation::Variable),
    ("R4N1", 102.10e-3, Designation::Variable),
    ("HOCL", 52.46e-3, Designation::Variable),
    ("ATO2", 89.07e-3, Designation::Variable),
    ("HNO3", 63.01e-3, Designation::Variable),
    ("ISN1", 146.10e-3, Designation::Variable),
    ("MAO3", 101.08e-3, Designation::Variable),
    ("MRO2", 119.10e-3, Designation::Variable),
    ("INO2", 131.10e-3, Designation::Variable),
    ("HAC", 74.08e-3, Designation::Variable),
    ("HC5", 100.10e-3, Designation::Variable),
    ("MGLY", 72.06e-3, Designation::Variable),
    ("ISOPNBO2", 178.10e-3, Designation::Variable),
    ("ISOPNDO2", 178.10e-3, Designation::Variable),
    ("R4O2", 89.12e-3, Designation::Variable),
    ("R4N2", 119.12e-3, Designation::Variable),
    ("BRO", 95.90e-3, Designation::Variable),
    ("RCHO", 58.08e-3, Designation::Variable),
    ("MEK", 72.11e-3, Designation::Variable),
    ("CLO", 51.45e-3, Designation::Variable),
    ("MACR", 70.09e-3, Designation::Variable),
    ("SO2", 64.06e-3, Designation::Variable),
    ("MVK", 70.09e-3, Designation::Variable),
    ("ALD2", 44.05e-3, Designation::Variable),
    ("MCO3", 75.04e-3, Designation::Variable),
    ("CH2O", 30.03e-3, Designation::Variable),
    ("H2O", 18.02e-3, Designation::Variable),
    ("BR", 79.90e-3, Designation::Variable),
    ("NO", 30.01e-3, Designation::Variable),
    ("NO3", 62.00e-3, Designation::Variable),
    ("CL", 35.45e-3, Designation::Variable),
    ("O", 16.00e-3, Designation::Variable),
    ("O1D", 16.00e-3, Designation::Variable),
    ("O3", 48.00e-3, Designation::Variable),
    ("HO2", 33.01e-3, Designation::Variable),
    ("NO2", 46.01e-3, Designation::Variable),
    ("OH", 17.01e-3, Designation::Variable),
    ("HBR", 80.91e-3, Designation::Variable),
    ("HCL", 36.46e-3, Designation::Variable),
    ("CO", 28.01e-3, Designation::Variable),
    ("MO2", 47.03e-3, Designation::Variable),
    ("ACTA", 60.05e-3, Designation::Fixed),
    ("EOH", 46.07e-3, Designation::Fixed),
    ("H2", 2.016e-3, Designation::Fixed),
    ("HCOOH", 46.03e-3, Designation::Fixed),
    ("MOH", 32.04e-3, Designation::Fixed),
    ("N2", 28.01e-3, Designation::Fixed),
    ("O2", 32.00e-3, Designation::Fixed),
    ("RCOOH", 74.08e-3, Designation::Fixed),
    ("SO4L", 98.08e-3, Designation::AerosolBulk),
    ("H2OL", 18.02e-3, Designation::AerosolBulk),
    ("HNO3L", 63.01e-3, Designation::AerosolBulk),
];

// Reactive nitrogen with the number of nitrogen atoms each molecule carries.
// N2O and N2O5 carry two.
const NOY: &[(&str, f64)] = &[
    ("NO", 1.0),
    ("NO2", 1.0),
    ("NO3", 1.0),
    ("HNO2", 1.0),
    ("HNO3", 1.0),
    ("HNO4", 1.0),
    ("N2O5", 2.0),
    ("PAN", 1.0),
    ("MPN", 1.0),
    ("N", 1.0),
    ("PROPNN", 1.0),
    ("BRNO3", 1.0),
    ("CLNO3", 1.0),
    ("BRNO2", 1.0),
    ("CLNO2", 1.0),
    ("N2O", 2.0),
    ("PPN", 1.0),
    ("PMN", 1.0),
    ("PMNN", 1.0),
    ("R4N1", 1.0),
    ("R4N2", 1.0),
    ("ISOPNB", 1.0),
    ("ISOPND", 1.0),
    ("MVKN", 1.0),
    ("MACRN", 1.0),
    ("ETHLN", 1.0),
    ("ISN1", 1.0),
    ("MAN2", 1.0),
    ("PRN1", 1.0),
    ("PRPN", 1.0),
];

/// The fixed ordered species set. Indices are stable across runs and are
/// used directly as positions into the variable- and fixed-species arrays.
#[derive(Clone)]
pub struct SpeciesTable {
    records: Vec<Species>,
    by_name: FxHashMap<String, usize>,
    n_variable: usize,
}

impl SpeciesTable {
    /// The builtin species set: 127 variable species, 8 fixed species and
    /// the condensed-phase reservoirs.
    #[must_use]
    pub fn builtin() -> Self {
        let records: Vec<Species> = BUILTIN
            .iter()
            .map(|&(name, molar_mass, designation)| Species {
                name: name.to_owned(),
                molar_mass,
                designation,
            })
            .collect();

        Self::from_records(records)
    }

    fn from_records(records: Vec<Species>) -> Self {
        let by_name = records
            .iter()
            .enumerate()
            .map(|(index, species)| (species.name.clone(), index))
            .collect();
        let n_variable = records
            .iter()
            .filter(|species| species.designation == Designation::Variable)
            .count();

        Self {
            records,
            by_name,
            n_variable,
        }
    }

    /// Parse a species table from `NAME INDEX` lines. Names must be known to
    /// the builtin set, indices must form a contiguous range starting at
    /// zero, and variable species must precede fixed ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the offending line when a line
    /// is malformed, a species is unknown, or the index set has gaps or
    /// duplicates.
    pub fn parse(reader: impl BufRead) -> Result<Self> {
        let builtin = Self::builtin();
        let mut entries: Vec<(String, usize)> = Vec::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| Error::InvalidInput(err.to_string()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut split = trimmed.split_whitespace();
            let (Some(name), Some(index)) = (split.next(), split.next()) else {
                return Err(Error::InvalidInput(format!(
                    "species table line {}: expected `NAME INDEX`, got `{trimmed}`",
                    lineno + 1
                )));
            };
            let index: usize = index.parse().map_err(|_| {
                Error::InvalidInput(format!(
                    "species table line {}: `{index}` is not an index",
                    lineno + 1
                ))
            })?;
            if builtin.index_of(name).is_none() {
                return Err(Error::InvalidInput(format!(
                    "species table line {}: unknown species `{name}`",
                    lineno + 1
                )));
            }

            entries.push((name.to_uppercase(), index));
        }

        entries.sort_by_key(|&(_, index)| index);

        for (position, &(ref name, index)) in entries.iter().enumerate() {
            if index != position {
                return Err(Error::InvalidInput(format!(
                    "species table: index {index} of `{name}` leaves a gap or duplicate at \
                     position {position}"
                )));
            }
        }

        let records = entries
            .into_iter()
            .map(|(name, _)| {
                let builtin_index = builtin.index_of(&name).unwrap();
                builtin.records[builtin_index].clone()
            })
            .collect();

        Ok(Self::from_records(records))
    }

    /// Index of `name`, or `None` if the species is not in the table.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(&name.to_uppercase()).copied()
    }

    /// All species in index order.
    #[must_use]
    pub fn records(&self) -> &[Species] {
        &self.records
    }

    /// Total number of species.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of variable species.
    #[must_use]
    pub const fn n_variable(&self) -> usize {
        self.n_variable
    }

    /// Reactive-nitrogen members as `(index, nitrogen count)` pairs.
    #[must_use]
    pub fn noy_weights(&self) -> Vec<(usize, f64)> {
        NOY.iter()
            .filter_map(|&(name, weight)| self.index_of(name).map(|index| (index, weight)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_layout() {
        let table = SpeciesTable::builtin();

        assert_eq!(table.n_variable(), 127);
        assert_eq!(table.len(), 138);

        // variable block precedes the fixed block
        assert!(table.index_of("NO").unwrap() < table.index_of("N2").unwrap());
        assert_eq!(table.index_of("CO2"), Some(0));
        assert_eq!(table.index_of("nonexistent"), None);

        // lookups are case-insensitive, the table stores upper case
        assert_eq!(table.index_of("o3"), table.index_of("O3"));
    }

    #[test]
    fn noy_weights_carry_double_nitrogen() {
        let table = SpeciesTable::builtin();
        let weights = table.noy_weights();

        let n2o5 = table.index_of("N2O5").unwrap();
        let no = table.index_of("NO").unwrap();

        assert!(weights.contains(&(n2o5, 2.0)));
        assert!(weights.contains(&(no, 1.0)));
    }

    #[test]
    fn parse_roundtrip() {
        let table = SpeciesTable::builtin();
        let text: String = table
            .records()
            .iter()
            .enumerate()
            .map(|(index, species)| format!("{:8} {index}\n", species.name))
            .collect();

        let parsed = SpeciesTable::parse(text.as_bytes()).unwrap();

        assert_eq!(parsed.len(), table.len());
        assert_eq!(parsed.index_of("OH"), table.index_of("OH"));
    }

    #[test]
    fn parse_rejects_gaps() {
        let result = SpeciesTable::parse("CO2 0\nO3 2\n".as_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn parse_rejects_unknown_names() {
        let result = SpeciesTable::parse("KRYPTON 0\n".as_bytes());
        assert!(result.is_err());
    }
}
