//! Typed case configuration.
//!
//! One `CaseConfig` describes one core invocation; a parameter sweep is a
//! sequence of these. The CLI's menu parser produces them; defaults give a
//! small diffusion-only case.

use crate::epm::EngineSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// SIMULATION section: time window, geography and naming.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Case name used in output file stems.
    pub case_name: String,
    /// Simulation start [UTC hours].
    pub t_init_h: f64,
    /// Simulation end [UTC hours].
    pub t_final_h: f64,
    /// Day of year (1-based).
    pub day_of_year: u32,
    /// Latitude [degrees north].
    pub latitude_deg: f64,
    /// Longitude [degrees east].
    pub longitude_deg: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            case_name: "default".to_owned(),
            t_init_h: 8.0,
            t_final_h: 32.0,
            day_of_year: 81,
            latitude_deg: 60.0,
            longitude_deg: 0.0,
        }
    }
}

/// TRANSPORT section: mesh, operator coefficients and the negative-value
/// refill policy.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Master transport switch.
    pub enabled: bool,
    /// Transport timestep cap [s].
    pub timestep_s: f64,
    /// Cross-wind cell count.
    pub nx: usize,
    /// Vertical cell count.
    pub ny: usize,
    /// Cross-wind domain extent [m].
    pub xlim: f64,
    /// Vertical domain extent [m].
    pub ylim: f64,
    /// Horizontal diffusion coefficient [m² s⁻¹].
    pub dh: f64,
    /// Vertical diffusion coefficient [m² s⁻¹].
    pub dv: f64,
    /// Cross-wind advection velocity [m s⁻¹].
    pub vx: f64,
    /// Vertical advection velocity [m s⁻¹].
    pub vy: f64,
    /// Refill negative cells after the spectral step.
    pub fill_negative: bool,
    /// Refill floor value.
    pub fill_floor: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timestep_s: 600.0,
            nx: 64,
            ny: 32,
            xlim: 32000.0,
            ylim: 1600.0,
            dh: 15.0,
            dv: 0.15,
            vx: 0.0,
            vy: 0.0,
            fill_negative: true,
            fill_floor: 0.0,
        }
    }
}

/// CHEMISTRY section: integrator switches and tolerances.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChemistryConfig {
    /// Master chemistry switch.
    pub enabled: bool,
    /// Solve once per ring instead of once per cell.
    pub per_ring: bool,
    /// Number of rings for the per-ring mode.
    pub n_ring: usize,
    /// Relative tolerance of the stiff integrator.
    pub rtol: f64,
    /// Absolute tolerance of the stiff integrator [molecules cm⁻³].
    pub atol: f64,
    /// Polar stratospheric clouds present.
    pub psc: bool,
}

impl Default for ChemistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_ring: false,
            n_ring: 15,
            rtol: 1.0e-3,
            atol: 1.0e-2,
            psc: false,
        }
    }
}

/// AEROSOL section: population switches, bin grids and cadences.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AerosolConfig {
    /// Liquid-population microphysics switch.
    pub liquid_microphysics: bool,
    /// Solid-population microphysics switch.
    pub solid_microphysics: bool,
    /// Coagulation switch.
    pub coagulation: bool,
    /// Gravitational settling switch.
    pub settling: bool,
    /// Condensational ice growth switch.
    pub growth: bool,
    /// Liquid coagulation cadence [simulated s].
    pub liq_coag_dt: f64,
    /// Ice coagulation cadence [simulated s].
    pub ice_coag_dt: f64,
    /// Liquid bin count.
    pub la_nbin: usize,
    /// Liquid bin-range minimum radius [m].
    pub la_r_min: f64,
    /// Liquid bin-range maximum radius [m].
    pub la_r_max: f64,
    /// Solid bin count.
    pub pa_nbin: usize,
    /// Solid bin-range minimum radius [m].
    pub pa_r_min: f64,
    /// Solid bin-range maximum radius [m].
    pub pa_r_max: f64,
    /// Turbulent dissipation rate for the shear kernel [m² s⁻³].
    pub dissipation_rate: f64,
}

impl Default for AerosolConfig {
    fn default() -> Self {
        Self {
            liquid_microphysics: true,
            solid_microphysics: true,
            coagulation: true,
            settling: true,
            growth: true,
            liq_coag_dt: 3600.0,
            ice_coag_dt: 3600.0,
            la_nbin: 32,
            la_r_min: 1.0e-9,
            la_r_max: 1.0e-6,
            pa_nbin: 32,
            pa_r_min: 5.0e-9,
            pa_r_max: 1.0e-4,
            dissipation_rate: 1.0e-5,
        }
    }
}

/// METEOROLOGY section: the imposed environment.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MetConfig {
    /// Flight-level temperature [K].
    pub temperature_k: f64,
    /// Flight-level pressure [Pa].
    pub pressure_pa: f64,
    /// Relative humidity over liquid water [%].
    pub rh_w_percent: f64,
    /// Temperature lapse rate [K m⁻¹].
    pub lapse_rate: f64,
}

impl Default for MetConfig {
    fn default() -> Self {
        Self {
            temperature_k: 220.0,
            pressure_pa: 24000.0,
            rh_w_percent: 60.0,
            lapse_rate: -3.0e-3,
        }
    }
}

/// TIMESERIES section: snapshot cadences and content.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Master output switch.
    pub enabled: bool,
    /// Concentration-snapshot cadence [simulated s].
    pub save_dt: f64,
    /// Aerosol-snapshot cadence [simulated s].
    pub aerosol_save_dt: f64,
    /// Write per-ring time series.
    pub ring_timeseries: bool,
    /// Species written to concentration snapshots and time series.
    pub species: Vec<String>,
    /// Output directory.
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            save_dt: 3600.0,
            aerosol_save_dt: 3600.0,
            ring_timeseries: false,
            species: ["O3", "NO", "NO2", "HNO3", "SO4", "SO2", "H2O", "CO", "CO2"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            directory: PathBuf::from("."),
        }
    }
}

/// Complete configuration of one core invocation.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CaseConfig {
    /// SIMULATION section.
    pub simulation: SimulationConfig,
    /// TRANSPORT section.
    pub transport: TransportConfig,
    /// CHEMISTRY section.
    pub chemistry: ChemistryConfig,
    /// AEROSOL section.
    pub aerosol: AerosolConfig,
    /// METEOROLOGY section.
    pub met: MetConfig,
    /// Engine and fuel description.
    pub engine: EngineSpec,
    /// TIMESERIES section.
    pub output: OutputConfig,
}
