//! Menu-file parsing.
//!
//! The input configuration is a human-editable menu of seven sections
//! (SIMULATION, PARAMETER SWEEP, TRANSPORT, CHEMISTRY, AEROSOL,
//! METEOROLOGY, TIMESERIES). Each entry is a `label : value` line;
//! booleans are `T`/`F`; numeric ranges accept a space-separated list or a
//! `start:step:end` triple, and in Monte-Carlo mode a `min max` pair or
//! `min:max`. Parse errors identify the offending line.

use crate::sweep::{SweepRange, SweepSpec};
use aeroplume::config::CaseConfig;
use aeroplume::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

const SECTIONS: [&str; 7] = [
    "SIMULATION",
    "PARAMETER SWEEP",
    "TRANSPORT",
    "CHEMISTRY",
    "AEROSOL",
    "METEOROLOGY",
    "TIMESERIES",
];

/// A parsed menu: entries keyed by `(section, label)` with the line number
/// kept for error messages.
#[derive(Debug)]
pub struct Menu {
    entries: BTreeMap<(String, String), (String, usize)>,
}

impl Menu {
    /// Parse the raw menu text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the line for entries outside
    /// a section or lines that are neither a section header, a comment nor
    /// a `label : value` pair.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();
        let mut section: Option<&str> = None;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(&name) = SECTIONS.iter().find(|&&name| name == line.to_uppercase()) {
                section = Some(name);
                continue;
            }

            let Some((label, value)) = line.split_once(':') else {
                return Err(Error::InvalidInput(format!(
                    "menu line {}: expected `label : value` or a section header, got `{line}`",
                    lineno + 1
                )));
            };
            let Some(section) = section else {
                return Err(Error::InvalidInput(format!(
                    "menu line {}: entry `{label}` appears before any section header",
                    lineno + 1
                )));
            };

            entries.insert(
                (section.to_owned(), label.trim().to_uppercase()),
                (value.trim().to_owned(), lineno + 1),
            );
        }

        Ok(Self { entries })
    }

    fn get(&self, section: &str, label: &str) -> Option<&(String, usize)> {
        self.entries.get(&(section.to_owned(), label.to_owned()))
    }

    fn f64(&self, section: &str, label: &str, default: f64) -> Result<f64> {
        self.get(section, label).map_or(Ok(default), |(value, lineno)| {
            value.parse().map_err(|_| {
                Error::InvalidInput(format!(
                    "menu line {lineno}: `{label} : {value}` is not a number"
                ))
            })
        })
    }

    fn usize(&self, section: &str, label: &str, default: usize) -> Result<usize> {
        self.get(section, label).map_or(Ok(default), |(value, lineno)| {
            value.parse().map_err(|_| {
                Error::InvalidInput(format!(
                    "menu line {lineno}: `{label} : {value}` is not an integer"
                ))
            })
        })
    }

    fn bool(&self, section: &str, label: &str, default: bool) -> Result<bool> {
        self.get(section, label)
            .map_or(Ok(default), |(value, lineno)| match value.as_str() {
                "T" => Ok(true),
                "F" => Ok(false),
                other => Err(Error::InvalidInput(format!(
                    "menu line {lineno}: `{label} : {other}` must be T or F"
                ))),
            })
    }

    fn string(&self, section: &str, label: &str, default: &str) -> String {
        self.get(section, label)
            .map_or_else(|| default.to_owned(), |(value, _)| value.clone())
    }

    fn range(&self, section: &str, label: &str, monte_carlo: bool) -> Result<Option<SweepRange>> {
        let Some((value, lineno)) = self.get(section, label) else {
            return Ok(None);
        };

        parse_range(value, monte_carlo).map(Some).map_err(|reason| {
            Error::InvalidInput(format!("menu line {lineno}: `{label} : {value}`: {reason}"))
        })
    }
}

/// Parse a sweep range. Deterministic sweeps accept a space-separated
/// value list or a `start:step:end` triple; Monte-Carlo sweeps accept
/// `min max` or `min:max`.
fn parse_range(value: &str, monte_carlo: bool) -> std::result::Result<SweepRange, String> {
    let colon_parts: Vec<&str> = value.split(':').map(str::trim).collect();

    if monte_carlo {
        let pair: Vec<&str> = if colon_parts.len() == 2 {
            colon_parts
        } else {
            value.split_whitespace().collect()
        };
        if pair.len() != 2 {
            return Err("Monte-Carlo ranges need `min max` or `min:max`".to_owned());
        }

        let min: f64 = pair[0].parse().map_err(|_| "min is not a number".to_owned())?;
        let max: f64 = pair[1].parse().map_err(|_| "max is not a number".to_owned())?;
        if min > max {
            return Err(format!("empty interval: {min} > {max}"));
        }

        return Ok(SweepRange::Interval(min, max));
    }

    if colon_parts.len() == 3 {
        let start: f64 = colon_parts[0]
            .parse()
            .map_err(|_| "start is not a number".to_owned())?;
        let step: f64 = colon_parts[1]
            .parse()
            .map_err(|_| "step is not a number".to_owned())?;
        let end: f64 = colon_parts[2]
            .parse()
            .map_err(|_| "end is not a number".to_owned())?;
        if step <= 0.0 || end < start {
            return Err("triple must satisfy step > 0 and end >= start".to_owned());
        }

        let mut values = Vec::new();
        let mut current = start;
        while current <= end + 1e-9 * step {
            values.push(current);
            current += step;
        }
        return Ok(SweepRange::Values(values));
    }

    let values: Vec<f64> = value
        .split_whitespace()
        .map(|token| token.parse().map_err(|_| format!("`{token}` is not a number")))
        .collect::<std::result::Result<_, _>>()?;
    if values.is_empty() {
        return Err("empty value list".to_owned());
    }

    Ok(SweepRange::Values(values))
}

/// Extract the typed case configuration and the sweep specification from a
/// parsed menu. Absent entries keep their defaults.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] naming the offending line for any entry
/// that fails to parse.
pub fn case_from_menu(menu: &Menu) -> Result<(CaseConfig, SweepSpec)> {
    let mut config = CaseConfig::default();

    let sim = "SIMULATION";
    config.simulation.case_name = menu.string(sim, "CASE NAME", &config.simulation.case_name);
    config.simulation.t_init_h = menu.f64(sim, "TIME INIT", config.simulation.t_init_h)?;
    config.simulation.t_final_h = menu.f64(sim, "TIME FINAL", config.simulation.t_final_h)?;
    config.simulation.day_of_year = u32::try_from(
        menu.usize(sim, "DAY OF YEAR", config.simulation.day_of_year as usize)?,
    )
    .unwrap_or(81);
    config.simulation.latitude_deg = menu.f64(sim, "LATITUDE", config.simulation.latitude_deg)?;
    config.simulation.longitude_deg =
        menu.f64(sim, "LONGITUDE", config.simulation.longitude_deg)?;

    config.engine.ei_co2 = menu.f64(sim, "EI CO2", config.engine.ei_co2)?;
    config.engine.ei_h2o = menu.f64(sim, "EI H2O", config.engine.ei_h2o)?;
    config.engine.ei_nox = menu.f64(sim, "EI NOX", config.engine.ei_nox)?;
    config.engine.ei_co = menu.f64(sim, "EI CO", config.engine.ei_co)?;
    config.engine.ei_uhc = menu.f64(sim, "EI UHC", config.engine.ei_uhc)?;
    config.engine.ei_so2 = menu.f64(sim, "EI SO2", config.engine.ei_so2)?;
    config.engine.ei_soot = menu.f64(sim, "EI SOOT", config.engine.ei_soot)?;
    config.engine.soot_radius = menu.f64(sim, "SOOT RADIUS", config.engine.soot_radius)?;
    config.engine.fuel_flow = menu.f64(sim, "FUEL FLOW", config.engine.fuel_flow)?;
    config.engine.speed = menu.f64(sim, "FLIGHT SPEED", config.engine.speed)?;
    config.engine.n_engines = menu.usize(sim, "N ENGINES", config.engine.n_engines)?;
    config.engine.vortex_dz = menu.f64(sim, "VORTEX DZ", config.engine.vortex_dz)?;
    config.engine.so2_to_so4 = menu.f64(sim, "SO2 TO SO4", config.engine.so2_to_so4)?;

    let transport = "TRANSPORT";
    config.transport.enabled = menu.bool(transport, "TRANSPORT", config.transport.enabled)?;
    config.transport.timestep_s = menu.f64(transport, "TIMESTEP", config.transport.timestep_s)?;
    config.transport.nx = menu.usize(transport, "NX", config.transport.nx)?;
    config.transport.ny = menu.usize(transport, "NY", config.transport.ny)?;
    config.transport.xlim = menu.f64(transport, "XLIM", config.transport.xlim)?;
    config.transport.ylim = menu.f64(transport, "YLIM", config.transport.ylim)?;
    config.transport.dh = menu.f64(transport, "DIFF H", config.transport.dh)?;
    config.transport.dv = menu.f64(transport, "DIFF V", config.transport.dv)?;
    config.transport.vx = menu.f64(transport, "ADVECTION VX", config.transport.vx)?;
    config.transport.vy = menu.f64(transport, "ADVECTION VY", config.transport.vy)?;
    config.transport.fill_negative =
        menu.bool(transport, "FILL NEGATIVE", config.transport.fill_negative)?;
    config.transport.fill_floor = menu.f64(transport, "FILL VALUE", config.transport.fill_floor)?;

    let chemistry = "CHEMISTRY";
    config.chemistry.enabled = menu.bool(chemistry, "CHEMISTRY", config.chemistry.enabled)?;
    config.chemistry.per_ring = menu.bool(chemistry, "PER RING", config.chemistry.per_ring)?;
    config.chemistry.n_ring = menu.usize(chemistry, "N RING", config.chemistry.n_ring)?;
    config.chemistry.rtol = menu.f64(chemistry, "RTOL", config.chemistry.rtol)?;
    config.chemistry.atol = menu.f64(chemistry, "ATOL", config.chemistry.atol)?;
    config.chemistry.psc = menu.bool(chemistry, "PSC", config.chemistry.psc)?;

    let aerosol = "AEROSOL";
    config.aerosol.liquid_microphysics = menu.bool(
        aerosol,
        "LA MICROPHYSICS",
        config.aerosol.liquid_microphysics,
    )?;
    config.aerosol.solid_microphysics = menu.bool(
        aerosol,
        "PA MICROPHYSICS",
        config.aerosol.solid_microphysics,
    )?;
    config.aerosol.coagulation = menu.bool(aerosol, "COAGULATION", config.aerosol.coagulation)?;
    config.aerosol.settling = menu.bool(aerosol, "SETTLING", config.aerosol.settling)?;
    config.aerosol.growth = menu.bool(aerosol, "GROWTH", config.aerosol.growth)?;
    config.aerosol.liq_coag_dt =
        menu.f64(aerosol, "LIQ COAG TIMESTEP", config.aerosol.liq_coag_dt)?;
    config.aerosol.ice_coag_dt =
        menu.f64(aerosol, "ICE COAG TIMESTEP", config.aerosol.ice_coag_dt)?;
    config.aerosol.la_nbin = menu.usize(aerosol, "LA NBIN", config.aerosol.la_nbin)?;
    config.aerosol.la_r_min = menu.f64(aerosol, "LA RMIN", config.aerosol.la_r_min)?;
    config.aerosol.la_r_max = menu.f64(aerosol, "LA RMAX", config.aerosol.la_r_max)?;
    config.aerosol.pa_nbin = menu.usize(aerosol, "PA NBIN", config.aerosol.pa_nbin)?;
    config.aerosol.pa_r_min = menu.f64(aerosol, "PA RMIN", config.aerosol.pa_r_min)?;
    config.aerosol.pa_r_max = menu.f64(aerosol, "PA RMAX", config.aerosol.pa_r_max)?;
    config.aerosol.dissipation_rate =
        menu.f64(aerosol, "DISSIPATION RATE", config.aerosol.dissipation_rate)?;

    let met = "METEOROLOGY";
    config.met.temperature_k = menu.f64(met, "TEMPERATURE", config.met.temperature_k)?;
    config.met.pressure_pa = menu.f64(met, "PRESSURE", config.met.pressure_pa)?;
    config.met.rh_w_percent = menu.f64(met, "RH_W", config.met.rh_w_percent)?;
    config.met.lapse_rate = menu.f64(met, "LAPSE RATE", config.met.lapse_rate)?;

    let timeseries = "TIMESERIES";
    config.output.enabled = menu.bool(timeseries, "SAVE", config.output.enabled)?;
    config.output.save_dt = menu.f64(timeseries, "SAVE DT", config.output.save_dt)?;
    config.output.aerosol_save_dt =
        menu.f64(timeseries, "AEROSOL SAVE DT", config.output.aerosol_save_dt)?;
    config.output.ring_timeseries = menu.bool(
        timeseries,
        "RING TIMESERIES",
        config.output.ring_timeseries,
    )?;
    if let Some((value, _)) = menu.get(timeseries, "SPECIES") {
        config.output.species = value.split_whitespace().map(str::to_owned).collect();
    }
    config.output.directory = PathBuf::from(menu.string(
        timeseries,
        "OUTPUT DIR",
        &config.output.directory.display().to_string(),
    ));

    let sweep_section = "PARAMETER SWEEP";
    let monte_carlo = menu.bool(sweep_section, "MONTE CARLO", false)?;
    let sweep = SweepSpec {
        monte_carlo,
        n_samples: menu.usize(sweep_section, "N SAMPLES", 10)?,
        seed: menu.usize(sweep_section, "SEED", 0)? as u64,
        temperature: menu.range(sweep_section, "TEMPERATURE", monte_carlo)?,
        pressure: menu.range(sweep_section, "PRESSURE", monte_carlo)?,
        rh_w: menu.range(sweep_section, "RH_W", monte_carlo)?,
    };

    Ok((config, sweep))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MENU: &str = "\
SIMULATION
  CASE NAME : unit
  TIME INIT : 8.0
  TIME FINAL : 9.0
TRANSPORT
  NX : 16
  NY : 8
  FILL NEGATIVE : F
CHEMISTRY
  CHEMISTRY : F
METEOROLOGY
  TEMPERATURE : 215.0
  RH_W : 80.0
PARAMETER SWEEP
  MONTE CARLO : F
  TEMPERATURE : 210:5:220
TIMESERIES
  SAVE : F
";

    #[test]
    fn menu_roundtrip() {
        let menu = Menu::parse(MENU).unwrap();
        let (config, sweep) = case_from_menu(&menu).unwrap();

        assert_eq!(config.simulation.case_name, "unit");
        assert!((config.simulation.t_final_h - 9.0).abs() < 1e-12);
        assert_eq!(config.transport.nx, 16);
        assert!(!config.transport.fill_negative);
        assert!(!config.chemistry.enabled);
        assert!((config.met.temperature_k - 215.0).abs() < 1e-12);

        match sweep.temperature {
            Some(SweepRange::Values(ref values)) => {
                assert_eq!(values.len(), 3);
                assert!((values[1] - 215.0).abs() < 1e-9);
            }
            _ => panic!("expected a value sweep"),
        }
        assert!(sweep.pressure.is_none());
    }

    #[test]
    fn errors_cite_the_line() {
        let err = Menu::parse("SIMULATION\n  broken line without separator\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let menu = Menu::parse("TRANSPORT\n  NX : lots\n").unwrap();
        let err = case_from_menu(&menu).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err = Menu::parse("  ORPHAN : 1\n").unwrap_err();
        assert!(err.to_string().contains("before any section"));
    }

    #[test]
    fn boolean_values_are_t_or_f() {
        let menu = Menu::parse("CHEMISTRY\n  CHEMISTRY : yes\n").unwrap();
        assert!(case_from_menu(&menu).is_err());
    }

    #[test]
    fn monte_carlo_ranges() {
        assert!(matches!(
            parse_range("210 230", true),
            Ok(SweepRange::Interval(a, b)) if a == 210.0 && b == 230.0
        ));
        assert!(matches!(
            parse_range("210:230", true),
            Ok(SweepRange::Interval(..))
        ));
        assert!(parse_range("230 210", true).is_err());
        assert!(parse_range("210", true).is_err());

        match parse_range("1 2 3", false) {
            Ok(SweepRange::Values(values)) => assert_eq!(values, vec![1.0, 2.0, 3.0]),
            _ => panic!("expected values"),
        }
        assert!(parse_range("1:0:3", false).is_err());
    }
}
