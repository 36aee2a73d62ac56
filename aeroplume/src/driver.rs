//! The time driver: time-grid construction, the operator-split step loop
//! and conservation diagnostics.
//!
//! Each step runs the subsystems in a fixed order: transport, SO4
//! partitioning, solar zenith update, photolysis lookup, chemistry (per
//! cell or per ring), coagulation when due, ice growth, diagnostics and
//! snapshots. The driver alone decides when cadenced subsystems fire; the
//! last step flushes everything still pending.

use crate::aerosol::{self, BinGrid};
use crate::ambient::{AmbientProfile, AmbientRecord};
use crate::chemistry::{
    AerosolSurfaces, CellEnv, ChemistrySolver, PscState, SurfaceCategory, forensic_dump, het_rates,
};
use crate::coagulation::{CoagulationKernel, KernelParams, coagulate};
use crate::config::CaseConfig;
use crate::constants;
use crate::epm::{self, EpmOutput};
use crate::error::{Error, Result};
use crate::mesh::{Mesh, Symmetry};
use crate::met::{MetProfile, psat_ice};
use crate::output::SnapshotWriter;
use crate::plume::PlumeState;
use crate::ring::RingCluster;
use crate::solar::{self, PhotolysisTable};
use crate::species::{Designation, SpeciesTable};
use crate::transport::{AdvectionDiffusion, SpectralSolver, refill_negative};
use log::{debug, error, info};
use ndarray::{Array1, Array2, Array3};
use rayon::prelude::*;
use std::f64::consts::PI;

/// Terminal status of one simulation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SimStatus {
    /// The simulation reached `tFinal`.
    Success,
    /// Generic failure before or during the loop.
    Failure,
    /// The stiff chemistry integrator failed; state was dumped.
    KppFail,
    /// A snapshot write failed; partial files are left on disk.
    SaveFail,
}

impl SimStatus {
    /// Process exit code of this status.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::KppFail => 2,
            Self::SaveFail => 3,
        }
    }
}

/// Conservation diagnostics of one step.
#[derive(Clone, Copy, Debug)]
pub struct MassCheck {
    /// Simulated time [s].
    pub time: f64,
    /// Emitted NOy column, Σ (field − ambient) · area, nitrogen-weighted.
    pub noy_emitted: f64,
    /// Emitted CO2 column.
    pub co2_emitted: f64,
    /// Fraction of the emitted NOy contained in the ring cluster, when one
    /// exists.
    pub ring_containment: Option<f64>,
}

/// Result of a completed (or aborted) simulation.
pub struct RunSummary {
    /// Terminal status.
    pub status: SimStatus,
    /// Steps completed (time-grid intervals).
    pub steps_completed: usize,
    /// Per-step conservation diagnostics.
    pub mass_checks: Vec<MassCheck>,
}

const TIME_EPS: f64 = 1.0e-6;

/// Build the simulation time grid.
///
/// The grid starts at `t_init`, ends at `t_final`, is strictly increasing,
/// never steps further than `dt_max` and lands exactly on every sunrise and
/// sunset crossing (given as seconds of day, repeated every 24 h) inside
/// the window.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when the window is empty or the step cap
/// is not positive.
pub fn build_time_grid(
    t_init: f64,
    t_final: f64,
    sun_times: Option<(f64, f64)>,
    dt_max: f64,
) -> Result<Vec<f64>> {
    if t_final <= t_init {
        return Err(Error::InvalidInput(format!(
            "empty simulation window: tFinal {t_final} <= tInit {t_init}"
        )));
    }
    if dt_max <= 0.0 {
        return Err(Error::InvalidInput(format!(
            "transport timestep must be positive, got {dt_max}"
        )));
    }

    let mut breakpoints = Vec::new();
    if let Some((sunrise, sunset)) = sun_times {
        for base in [sunrise, sunset] {
            let mut day = ((t_init - base) / 86400.0).floor();
            loop {
                let crossing = 86400.0f64.mul_add(day, base);
                if crossing > t_final - TIME_EPS {
                    break;
                }
                if crossing > t_init + TIME_EPS {
                    breakpoints.push(crossing);
                }
                day += 1.0;
            }
        }
    }
    breakpoints.sort_by(f64::total_cmp);

    let mut grid = vec![t_init];
    let mut current = t_init;
    let mut next_break = 0;

    while current < t_final - TIME_EPS {
        while next_break < breakpoints.len() && breakpoints[next_break] <= current + TIME_EPS {
            next_break += 1;
        }

        let mut next = (current + dt_max).min(t_final);
        if next_break < breakpoints.len() && breakpoints[next_break] <= next + TIME_EPS {
            next = breakpoints[next_break];
        }

        grid.push(next);
        current = next;
    }

    Ok(grid)
}

/// The coupled plume-evolution engine: owns every subsystem and advances
/// them in the fixed split order.
pub struct Driver {
    config: CaseConfig,
    species: SpeciesTable,
    mesh: Mesh,
    met: MetProfile,
    solver: SpectralSolver,
    chemistry: Option<ChemistrySolver>,
    photolysis: PhotolysisTable,
    la_kernel: CoagulationKernel,
    pa_kernel: CoagulationKernel,
    rings: Option<RingCluster>,
    state: PlumeState,
    ambient: AmbientRecord,
    time_grid: Vec<f64>,
    writer: Option<SnapshotWriter>,
    transported: Vec<bool>,
    settling_velocity: Vec<f64>,
    noy_weights: Vec<(usize, f64)>,
    idx_co2: usize,
    idx_h2o: usize,
    la_active: bool,
    pa_active: bool,
    ring_series: Option<Array3<f64>>,
    selected_indices: Vec<usize>,
}

impl Driver {
    /// Assemble a simulation: mesh, environment, early-plume
    /// initialisation, kernels, ambient record and the time grid.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, a mechanism species missing from the
    /// table, or a photolysis table narrower than the mechanism requires.
    #[allow(clippy::too_many_lines)]
    pub fn new(
        config: CaseConfig,
        species: SpeciesTable,
        profile: &AmbientProfile,
        photolysis: PhotolysisTable,
    ) -> Result<Self> {
        let met = MetProfile::new(
            config.met.temperature_k,
            config.met.pressure_pa,
            config.met.rh_w_percent / 100.0,
            config.met.lapse_rate,
        );
        let mesh = Mesh::new(
            config.transport.nx,
            config.transport.ny,
            config.transport.xlim,
            config.transport.ylim,
        );
        let solver = SpectralSolver::new(&mesh);

        let la_bins = BinGrid::geometric(
            config.aerosol.la_r_min,
            config.aerosol.la_r_max,
            config.aerosol.la_nbin,
        );
        let pa_bins = BinGrid::geometric(
            config.aerosol.pa_r_min,
            config.aerosol.pa_r_max,
            config.aerosol.pa_nbin,
        );

        let epm_out = epm::run(&met, &config.engine, &la_bins, &pa_bins);

        let la_kernel = CoagulationKernel::build(
            &la_bins,
            &KernelParams {
                temperature: met.temperature(),
                pressure: met.pressure(),
                particle_density: constants::RHO_SULFATE,
                dissipation_rate: config.aerosol.dissipation_rate,
            },
        );
        let pa_kernel = CoagulationKernel::build(
            &pa_bins,
            &KernelParams {
                temperature: met.temperature(),
                pressure: met.pressure(),
                particle_density: constants::RHO_ICE,
                dissipation_rate: config.aerosol.dissipation_rate,
            },
        );
        let settling_velocity = pa_bins
            .centres()
            .iter()
            .map(|&radius| {
                aerosol::terminal_velocity(
                    radius,
                    constants::RHO_ICE,
                    met.temperature(),
                    met.pressure(),
                )
            })
            .collect();

        let mut state = PlumeState::new(&mesh, &species, la_bins, pa_bins, &met);
        state.set_soot_radius(config.engine.soot_radius);

        // ambient initial conditions from the profile, water from the met
        let sample = profile.sample(met.pressure());
        let airdens = constants::air_number_density(met.temperature(), met.pressure());
        let mut initial = vec![0.0; species.len()];
        for (index, record) in species.records().iter().enumerate() {
            if record.designation == Designation::Variable {
                initial[index] = sample.mixing_ratios[index] * airdens;
            }
        }
        let idx_h2o = species
            .index_of("H2O")
            .ok_or_else(|| Error::InvalidInput("H2O missing from species table".to_owned()))?;
        let idx_co2 = species
            .index_of("CO2")
            .ok_or_else(|| Error::InvalidInput("CO2 missing from species table".to_owned()))?;
        initial[idx_h2o] = met.h2o_at(0.0);

        for (index, &value) in initial.iter().enumerate() {
            state.field_mut(index).fill(value);
        }

        // background liquid aerosol
        let background = sample.aerosol;
        if background.number > 0.0 {
            let ones = Array2::ones((mesh.ny(), mesh.nx()));
            state
                .liquid_mut()
                .add_lognormal(&ones, background.number, background.radius.max(1.0e-8), 1.6);
        }

        let transported = species
            .records()
            .iter()
            .map(|record| record.designation != Designation::Fixed)
            .collect();

        let time_grid = build_time_grid(
            config.simulation.t_init_h * 3600.0,
            config.simulation.t_final_h * 3600.0,
            solar::sun_times(
                config.simulation.day_of_year,
                config.simulation.latitude_deg,
                config.simulation.longitude_deg,
            )
            .map(|(sunrise, sunset)| (sunrise * 3600.0, sunset * 3600.0)),
            config.transport.timestep_s,
        )?;

        let chemistry = if config.chemistry.enabled {
            let chem = ChemistrySolver::new(&species, config.chemistry.rtol, config.chemistry.atol)?;
            if photolysis.width() < chem.mechanism().n_photolysis() {
                return Err(Error::InvalidInput(format!(
                    "photolysis table provides {} rates, mechanism needs {}",
                    photolysis.width(),
                    chem.mechanism().n_photolysis()
                )));
            }
            Some(chem)
        } else {
            None
        };

        let ambient = AmbientRecord::new(
            time_grid.len(),
            &initial[..species.n_variable()],
            background,
        );

        let writer = if config.output.enabled {
            Some(SnapshotWriter::new(
                &config.output.directory,
                &config.simulation.case_name,
            )?)
        } else {
            None
        };
        let selected_indices = config
            .output
            .species
            .iter()
            .filter_map(|name| species.index_of(name))
            .collect();
        let noy_weights = species.noy_weights();

        let mut driver = Self {
            config,
            species,
            mesh,
            met,
            solver,
            chemistry,
            photolysis,
            la_kernel,
            pa_kernel,
            rings: None,
            state,
            ambient,
            time_grid,
            writer,
            transported,
            settling_velocity,
            noy_weights,
            idx_co2,
            idx_h2o,
            la_active: false,
            pa_active: false,
            ring_series: None,
            selected_indices,
        };

        driver.inject(&epm_out)?;
        driver
            .state
            .partition_so4(&driver.mesh, &driver.met, &driver.species);

        driver.la_active =
            driver.config.aerosol.liquid_microphysics && !driver.state.liquid().is_empty();
        driver.pa_active =
            driver.config.aerosol.solid_microphysics && !driver.state.solid().is_empty();

        if driver.config.chemistry.per_ring {
            let kinematics = *driver.state.kinematics();
            driver.rings = Some(RingCluster::new(
                &driver.mesh,
                driver.config.chemistry.n_ring,
                kinematics.ax.max(driver.mesh.dx()),
                kinematics.ay.max(driver.mesh.dy()),
                epm_out.ice_number > 0.0,
            ));
        }
        if driver.config.output.ring_timeseries {
            if let Some(rings) = &driver.rings {
                driver.ring_series = Some(Array3::zeros((
                    driver.selected_indices.len(),
                    driver.time_grid.len(),
                    rings.n_rings(),
                )));
            }
        }

        Ok(driver)
    }

    /// Mean emitted excess concentration [molecules cm⁻³] over one plume
    /// area for an emission index `ei` [kg/kg] of a species with molar mass
    /// `molar_mass` [kg mol⁻¹].
    fn mean_excess(&self, ei: f64, molar_mass: f64) -> f64 {
        let per_metre =
            ei * self.config.engine.fuel_per_metre() * constants::N_AVOGADRO / molar_mass;
        per_metre / (self.state.kinematics().area * 1.0e6)
    }

    /// Apply the early-plume output as the t = 0 plume state.
    fn inject(&mut self, epm_out: &EpmOutput) -> Result<()> {
        {
            let kinematics = self.state.kinematics_mut();
            kinematics.area = epm_out.area;
            // wake plumes are wider than tall
            let aspect = 4.0;
            kinematics.ay = (epm_out.area / (PI * aspect)).sqrt();
            kinematics.ax = aspect * kinematics.ay;
        }

        let mask = self.state.gaussian_mask(&self.mesh)?;

        let engine = self.config.engine.clone();
        // NOx molecules are counted as NO2 by the emission index
        let no_fraction = 0.9;
        let entries = [
            ("CO2", self.mean_excess(engine.ei_co2, 44.01e-3)),
            ("NO", self.mean_excess(engine.ei_nox * no_fraction, 46.01e-3)),
            (
                "NO2",
                self.mean_excess(engine.ei_nox * (1.0 - no_fraction), 46.01e-3),
            ),
            ("CO", self.mean_excess(engine.ei_co, 28.01e-3)),
            (
                "SO2",
                self.mean_excess(engine.ei_so2 * (1.0 - engine.so2_to_so4), 64.06e-3),
            ),
            ("CH2O", self.mean_excess(engine.ei_uhc, 30.03e-3)),
            ("H2O", epm_out.h2o_gas_excess),
            ("SO4", epm_out.so4_gas),
            ("SO4L", epm_out.so4_liquid),
        ];

        for (name, mean) in entries {
            let index = self
                .species
                .index_of(name)
                .ok_or_else(|| Error::InvalidInput(format!("`{name}` missing from table")))?;
            self.state.field_mut(index).scaled_add(mean, &mask);
        }
        // deposition may have consumed ambient vapour near the core
        for value in self.state.field_mut(self.idx_h2o).iter_mut() {
            *value = value.max(0.0);
        }

        for (bin, &number) in epm_out.liquid_bins.iter().enumerate() {
            self.state.liquid_mut().pdf_mut()[bin].scaled_add(number, &mask);
        }
        for (bin, &number) in epm_out.ice_bins.iter().enumerate() {
            self.state.solid_mut().pdf_mut()[bin].scaled_add(number, &mask);
        }
        self.state.soot_mut().scaled_add(epm_out.soot_number, &mask);

        info!(
            "injected plume: area {:.0} m², ice {:.3e} cm⁻³",
            epm_out.area, epm_out.ice_number
        );

        Ok(())
    }

    /// The time grid [s].
    #[must_use]
    pub fn time_grid(&self) -> &[f64] {
        &self.time_grid
    }

    /// The mesh.
    #[must_use]
    pub const fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// The plume state.
    #[must_use]
    pub const fn state(&self) -> &PlumeState {
        &self.state
    }

    /// The species table.
    #[must_use]
    pub const fn species(&self) -> &SpeciesTable {
        &self.species
    }

    /// The ambient record.
    #[must_use]
    pub const fn ambient(&self) -> &AmbientRecord {
        &self.ambient
    }

    /// Run the simulation to `tFinal` or the first fatal error.
    #[allow(clippy::too_many_lines)]
    pub fn run(&mut self) -> RunSummary {
        let t0 = self.time_grid[0];
        let mut mass_checks = Vec::with_capacity(self.time_grid.len());

        let csza0 = self.csza_at(t0);
        self.ambient.set_csza(0, csza0);
        mass_checks.push(self.mass_check(0));
        self.record_ring_series(0);

        if let Err(err) = self.save_snapshots(t0, true, true) {
            error!("initial snapshot failed: {err}");
            return RunSummary {
                status: SimStatus::SaveFail,
                steps_completed: 0,
                mass_checks,
            };
        }

        let mut last_liq_coag = t0;
        let mut last_ice_coag = t0;
        let mut last_save = t0;
        let mut last_aero_save = t0;

        for step in 1..self.time_grid.len() {
            let t_now = self.time_grid[step];
            let dt = t_now - self.time_grid[step - 1];
            let last = step == self.time_grid.len() - 1;

            // 1. transport
            if self.config.transport.enabled {
                if let Err(err) = self.transport_step(dt) {
                    error!("transport failed: {err}");
                    return RunSummary {
                        status: SimStatus::Failure,
                        steps_completed: step - 1,
                        mass_checks,
                    };
                }
            }

            // 2. SO4 partitioning
            self.state
                .partition_so4(&self.mesh, &self.met, &self.species);

            // 3+4. solar zenith and photolysis
            let csza = self.csza_at(t_now);
            self.ambient.set_csza(step, csza);
            let jrates = self.photolysis.lookup(csza);

            // 5. chemistry
            if self.chemistry.is_some() {
                if let Err(err) = self.chemistry_step(step, dt, &jrates) {
                    error!("{err}");
                    return RunSummary {
                        status: SimStatus::KppFail,
                        steps_completed: step - 1,
                        mass_checks,
                    };
                }
            } else {
                let previous = self.ambient.row(step - 1);
                self.ambient.set_row(step, &previous);
            }

            // 6. coagulation, on its own cadence; the last step flushes
            if self.config.aerosol.coagulation {
                if self.la_active
                    && (t_now - last_liq_coag >= self.config.aerosol.liq_coag_dt - TIME_EPS || last)
                {
                    coagulate(
                        self.state.liquid_mut(),
                        &self.la_kernel,
                        &self.mesh,
                        t_now - last_liq_coag,
                        Symmetry::X,
                    );
                    last_liq_coag = t_now;
                }
                if self.pa_active
                    && (t_now - last_ice_coag >= self.config.aerosol.ice_coag_dt - TIME_EPS || last)
                {
                    coagulate(
                        self.state.solid_mut(),
                        &self.pa_kernel,
                        &self.mesh,
                        t_now - last_ice_coag,
                        Symmetry::X,
                    );
                    last_ice_coag = t_now;
                }
            }

            // 7. condensational ice growth
            if self.config.aerosol.growth && self.pa_active {
                ice_growth(&self.mesh, &self.met, &mut self.state, self.idx_h2o, dt);
            }

            // 8. diagnostics
            let check = self.mass_check(step);
            if let Some(first) = mass_checks.first() {
                let drift = (check.noy_emitted - first.noy_emitted).abs()
                    / first.noy_emitted.abs().max(f64::MIN_POSITIVE);
                if drift > 1.0e-6 && self.chemistry.is_none() {
                    debug!("NOy drift {drift:.3e} at t = {t_now:.0} s");
                }
            }
            mass_checks.push(check);
            self.record_ring_series(step);

            // 9. snapshots; the last step flushes
            let save_case = t_now - last_save >= self.config.output.save_dt - TIME_EPS || last;
            let save_aero =
                t_now - last_aero_save >= self.config.output.aerosol_save_dt - TIME_EPS || last;
            if let Err(err) = self.save_snapshots(t_now, save_case, save_aero) {
                error!("snapshot failed: {err}");
                return RunSummary {
                    status: SimStatus::SaveFail,
                    steps_completed: step,
                    mass_checks,
                };
            }
            if save_case {
                last_save = t_now;
            }
            if save_aero {
                last_aero_save = t_now;
            }

            let vx = self.config.transport.vx;
            let vy = self.config.transport.vy;
            let kinematics = self.state.kinematics_mut();
            kinematics.dtrav_x += vx * dt;
            kinematics.dtrav_y += vy * dt;
        }

        if let Err(err) = self.write_timeseries(&mass_checks) {
            error!("time series write failed: {err}");
            return RunSummary {
                status: SimStatus::SaveFail,
                steps_completed: self.time_grid.len() - 1,
                mass_checks,
            };
        }

        info!(
            "simulation finished after {} steps",
            self.time_grid.len() - 1
        );

        RunSummary {
            status: SimStatus::Success,
            steps_completed: self.time_grid.len() - 1,
            mass_checks,
        }
    }

    fn csza_at(&self, t_s: f64) -> f64 {
        let hour = (t_s / 3600.0).rem_euclid(24.0);
        solar::cos_sza(
            self.config.simulation.day_of_year,
            self.config.simulation.latitude_deg,
            self.config.simulation.longitude_deg,
            hour,
        )
    }

    fn transport_step(&mut self, dt: f64) -> Result<()> {
        let op = AdvectionDiffusion {
            vx: self.config.transport.vx,
            vy: self.config.transport.vy,
            dh: self.config.transport.dh,
            dv: self.config.transport.dv,
        };
        let fill = self
            .config
            .transport
            .fill_negative
            .then_some(self.config.transport.fill_floor);

        let solver = &self.solver;
        let transported = &self.transported;

        self.state
            .fields_mut()
            .par_iter_mut()
            .enumerate()
            .filter(|&(index, _)| transported[index])
            .map(|(_, field)| solve_one(solver, field, &op, dt, fill))
            .collect::<Result<Vec<_>>>()?;

        solve_one(solver, self.state.soot_mut(), &op, dt, fill)?;

        if self.la_active {
            self.state
                .liquid_mut()
                .pdf_mut()
                .par_iter_mut()
                .map(|field| solve_one(solver, field, &op, dt, fill))
                .collect::<Result<Vec<_>>>()?;
        }

        if self.pa_active {
            let settling = self.config.aerosol.settling;
            let velocities = &self.settling_velocity;
            self.state
                .solid_mut()
                .pdf_mut()
                .par_iter_mut()
                .enumerate()
                .map(|(bin, field)| {
                    let bin_op = if settling {
                        op.with_settling(velocities[bin])
                    } else {
                        op
                    };
                    solve_one(solver, field, &bin_op, dt, fill)
                })
                .collect::<Result<Vec<_>>>()?;
        }

        Ok(())
    }

    fn psc_state(&self) -> PscState {
        if self.config.chemistry.psc {
            if self.met.temperature() < 197.0 {
                PscState::Ice
            } else {
                PscState::Nat
            }
        } else {
            PscState::None
        }
    }

    #[allow(clippy::too_many_lines)]
    fn chemistry_step(&mut self, step: usize, dt: f64, jrates: &[f64]) -> Result<()> {
        let Some(solver) = self.chemistry.as_ref() else {
            return Ok(());
        };

        let nvar = self.species.n_variable();
        let psc = self.psc_state();
        let pressure = self.met.pressure();
        let background = *self.ambient.aerosol();
        let soot_radius = self.state.soot_radius();

        // ambient first, at the declared ambient temperature
        let ambient_pre = self.ambient.row(step - 1);
        let mut ambient_post = ambient_pre.clone();
        {
            let surfaces = AerosolSurfaces {
                trop_sulfate: SurfaceCategory {
                    radius: background.radius,
                    area: background.surface_area,
                },
                ..AerosolSurfaces::default()
            };
            let het = het_rates(&surfaces, self.met.temperature(), psc, 0.0);
            let env = CellEnv {
                temperature: self.met.temperature(),
                pressure,
                air_density: constants::air_number_density(self.met.temperature(), pressure),
                h2o: ambient_pre[self.idx_h2o],
            };
            let rconst = solver.rate_constants(&env, jrates, &het);

            solver.step(&mut ambient_post, &rconst, dt).map_err(|err| {
                error!(
                    "ambient chemistry failure:\n{}",
                    forensic_dump(&self.species, &rconst, &ambient_post)
                );
                Error::ChemistryFailed {
                    i: usize::MAX,
                    j: usize::MAX,
                    reason: err.to_string(),
                }
            })?;
        }
        self.ambient.set_row(step, &ambient_post);

        // per-cell surface data, computed once per step
        let solid_re = self.state.solid().effective_radius_field();
        let solid_sa = self.state.solid().surface_area_field();
        let liquid_re = self.state.liquid().effective_radius_field();
        let liquid_sa = self.state.liquid().surface_area_field();
        let soot = self.state.soot().clone();

        let cell_surfaces = move |j: usize, i: usize| AerosolSurfaces {
            ice_nat: SurfaceCategory {
                radius: solid_re[[j, i]],
                // m² cm⁻³ → cm² cm⁻³
                area: solid_sa[[j, i]] * 1.0e4,
            },
            strat_liquid: SurfaceCategory::default(),
            trop_sulfate: if liquid_sa[[j, i]] > 0.0 {
                // the liquid population carries any background sulfate
                SurfaceCategory {
                    radius: liquid_re[[j, i]],
                    area: liquid_sa[[j, i]] * 1.0e4,
                }
            } else {
                SurfaceCategory {
                    radius: background.radius,
                    area: background.surface_area,
                }
            },
            soot: SurfaceCategory {
                radius: soot_radius,
                area: 4.0 * PI * soot_radius * soot_radius * 1.0e4 * soot[[j, i]],
            },
        };

        if self.rings.is_some() {
            return self.chemistry_per_ring(
                step,
                dt,
                jrates,
                psc,
                &cell_surfaces,
                &ambient_pre,
                &ambient_post,
            );
        }

        // per-cell mode: every cell is independent, solved in parallel
        let (ny, nx) = (self.mesh.ny(), self.mesh.nx());
        let fields = self.state.fields();
        let met = &self.met;
        let mesh = &self.mesh;
        let species = &self.species;
        let state = &self.state;
        let idx_h2o = self.idx_h2o;

        let results: Result<Vec<(usize, Vec<f64>)>> = (0..ny * nx)
            .into_par_iter()
            .map(|cell| {
                let (j, i) = (cell / nx, cell % nx);

                let mut var: Vec<f64> = fields.iter().take(nvar).map(|f| f[[j, i]]).collect();

                let temperature = met.temperature_at_row(mesh, j);
                let env = CellEnv {
                    temperature,
                    pressure,
                    air_density: constants::air_number_density(temperature, pressure),
                    h2o: var[idx_h2o],
                };
                let het = het_rates(
                    &cell_surfaces(j, i),
                    temperature,
                    psc,
                    state.ice_water_content(j, i),
                );
                let rconst = solver.rate_constants(&env, jrates, &het);

                solver.step(&mut var, &rconst, dt).map_err(|err| {
                    error!(
                        "cell ({i}, {j}) chemistry failure:\n{}",
                        forensic_dump(species, &rconst, &var)
                    );
                    Error::ChemistryFailed {
                        i,
                        j,
                        reason: err.to_string(),
                    }
                })?;

                Ok((cell, var))
            })
            .collect();

        for (cell, var) in results? {
            let (j, i) = (cell / nx, cell % nx);
            for (index, value) in var.into_iter().enumerate() {
                self.state.field_mut(index)[[j, i]] = value;
            }
        }

        Ok(())
    }

    /// Per-ring chemistry: one solve per ring with area-weighted means,
    /// visited inner to outer, then the additive per-cell delta. Cells
    /// outside the outermost ring follow the ambient.
    #[allow(clippy::too_many_arguments)]
    fn chemistry_per_ring(
        &mut self,
        _step: usize,
        dt: f64,
        jrates: &[f64],
        psc: PscState,
        cell_surfaces: &dyn Fn(usize, usize) -> AerosolSurfaces,
        ambient_pre: &[f64],
        ambient_post: &[f64],
    ) -> Result<()> {
        let solver = self.chemistry.as_ref().expect("chemistry enabled");
        let rings = self.rings.as_ref().expect("ring cluster built");
        let nvar = self.species.n_variable();
        let pressure = self.met.pressure();

        let mut deltas: Vec<Vec<f64>> = Vec::with_capacity(rings.n_rings());

        for ring in 0..rings.n_rings() {
            let members = rings.cells(ring);
            let area = rings.area(ring);

            let mut var = vec![0.0; nvar];
            let mut temperature = 0.0;
            let mut surfaces = AerosolSurfaces::default();
            surfaces.soot.radius = self.state.soot_radius();
            let mut iwc = 0.0;

            for &(j, i) in members {
                let weight = self.mesh.area()[[j, i]] / area;
                for (value, field) in var.iter_mut().zip(self.state.fields().iter().take(nvar)) {
                    *value += weight * field[[j, i]];
                }
                temperature += weight * self.met.temperature_at_row(&self.mesh, j);

                let cell = cell_surfaces(j, i);
                surfaces.ice_nat.area += weight * cell.ice_nat.area;
                surfaces.ice_nat.radius += weight * cell.ice_nat.radius;
                surfaces.trop_sulfate.area += weight * cell.trop_sulfate.area;
                surfaces.trop_sulfate.radius += weight * cell.trop_sulfate.radius;
                surfaces.soot.area += weight * cell.soot.area;
                iwc += weight * self.state.ice_water_content(j, i);
            }

            let env = CellEnv {
                temperature,
                pressure,
                air_density: constants::air_number_density(temperature, pressure),
                h2o: var[self.idx_h2o],
            };
            let het = het_rates(&surfaces, temperature, psc, iwc);
            let rconst = solver.rate_constants(&env, jrates, &het);

            let pre = var.clone();
            solver.step(&mut var, &rconst, dt).map_err(|err| {
                error!(
                    "ring {ring} chemistry failure:\n{}",
                    forensic_dump(&self.species, &rconst, &var)
                );
                Error::ChemistryFailed {
                    i: ring,
                    j: 0,
                    reason: err.to_string(),
                }
            })?;

            deltas.push(var.iter().zip(&pre).map(|(post, pre)| post - pre).collect());
        }

        for (ring, delta) in deltas.iter().enumerate() {
            for (index, &change) in delta.iter().enumerate() {
                if change != 0.0 {
                    let cluster = self.rings.as_ref().expect("ring cluster built");
                    cluster.apply_delta(self.state.field_mut(index), ring, change);
                }
            }
        }

        // unclustered cells are residual ambient
        for index in 0..nvar {
            let change = ambient_post[index] - ambient_pre[index];
            if change == 0.0 {
                continue;
            }
            let cluster = self.rings.as_ref().expect("ring cluster built");
            let unmapped: Vec<(usize, usize)> = (0..self.mesh.ny())
                .flat_map(|j| (0..self.mesh.nx()).map(move |i| (j, i)))
                .filter(|&(j, i)| cluster.ring_of(j, i).is_none())
                .collect();
            let field = self.state.field_mut(index);
            for (j, i) in unmapped {
                field[[j, i]] += change;
            }
        }

        Ok(())
    }

    fn mass_check(&self, step: usize) -> MassCheck {
        let ambient_row = self.ambient.row(step);

        let mut noy_field = self.mesh.field();
        let mut ambient_noy = 0.0;
        for &(index, weight) in &self.noy_weights {
            noy_field.scaled_add(weight, self.state.field(index));
            ambient_noy += weight * ambient_row[index];
        }
        let noy_emitted = self.mesh.integrate(&noy_field) - ambient_noy * self.mesh.total_area();

        let co2_emitted = self.mesh.integrate(self.state.field(self.idx_co2))
            - ambient_row[self.idx_co2] * self.mesh.total_area();

        let ring_containment = self.rings.as_ref().map(|rings| {
            let mut contained = 0.0;
            for ring in 0..rings.n_rings() {
                for &(j, i) in rings.cells(ring) {
                    contained += (noy_field[[j, i]] - ambient_noy) * self.mesh.area()[[j, i]];
                }
            }
            if noy_emitted.abs() > 0.0 {
                contained / noy_emitted
            } else {
                0.0
            }
        });

        MassCheck {
            time: self.time_grid[step],
            noy_emitted,
            co2_emitted,
            ring_containment,
        }
    }

    fn record_ring_series(&mut self, step: usize) {
        let Some(rings) = self.rings.as_ref() else {
            return;
        };
        let Some(series) = self.ring_series.as_mut() else {
            return;
        };

        for (position, &index) in self.selected_indices.iter().enumerate() {
            let means = rings.ring_means(&self.state.fields()[index], &self.mesh);
            for (ring, &mean) in means.iter().enumerate() {
                series[[position, step, ring]] = mean;
            }
        }
    }

    fn save_snapshots(&self, t_now: f64, case: bool, aerosol: bool) -> Result<()> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };

        if case {
            writer.write_case(
                t_now,
                &self.mesh,
                &self.state,
                &self.species,
                &self.config.output.species,
            )?;
        }
        if aerosol {
            writer.write_aerosol(t_now, &self.mesh, &self.state)?;
        }

        Ok(())
    }

    fn write_timeseries(&self, mass_checks: &[MassCheck]) -> Result<()> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };

        let noy = Array1::from_iter(mass_checks.iter().map(|check| check.noy_emitted));
        let co2 = Array1::from_iter(mass_checks.iter().map(|check| check.co2_emitted));

        let names = &self.config.output.species;
        let ring_block = self
            .ring_series
            .as_ref()
            .map(|series| (names.as_slice(), series));

        writer.write_timeseries(
            &self.time_grid,
            &self.ambient,
            ring_block,
            &[("noy_emitted", noy), ("co2_emitted", co2)],
        )?;

        Ok(())
    }
}

fn solve_one(
    solver: &SpectralSolver,
    field: &mut Array2<f64>,
    op: &AdvectionDiffusion,
    dt: f64,
    fill: Option<f64>,
) -> Result<()> {
    solver.solve(field, op, dt)?;
    if let Some(floor) = fill {
        refill_negative(field, floor);
    }
    Ok(())
}

/// Diffusional ice growth: relax each cell's water vapour toward ice
/// saturation, moving the deposited (or evaporated) volume through the
/// solid bins by promotion and demotion so ice volume and vapour stay in
/// balance.
fn ice_growth(mesh: &Mesh, met: &MetProfile, state: &mut PlumeState, idx_h2o: usize, dt: f64) {
    let pressure = met.pressure();
    let nbin = state.solid().bins().nbin();
    let volumes = state.solid().bins().volumes().to_vec();
    let radii = state.solid().bins().centres().to_vec();

    let mut number = vec![0.0; nbin];

    for j in 0..mesh.ny() {
        let temperature = met.temperature_at_row(mesh, j);
        let n_sat = psat_ice(temperature) / (constants::K_B * temperature) * 1.0e-6;
        // vapour diffusivity in air
        let d_v = 2.11e-5 * (temperature / 273.15).powf(1.94) * (101325.0 / pressure);

        for i in 0..mesh.nx() {
            let mut m1 = 0.0;
            for (bin, field) in state.solid().pdf().iter().enumerate() {
                number[bin] = field[[j, i]];
                m1 += radii[bin] * number[bin];
            }
            if m1 <= 0.0 {
                continue;
            }

            let h2o = state.field(idx_h2o)[[j, i]];
            let excess = h2o - n_sat;
            if excess == 0.0 {
                continue;
            }

            let kappa = 4.0 * PI * d_v * m1 * 1.0e6;
            let transferred = excess * (1.0 - (-kappa * dt).exp());
            // molecules cm⁻³ → ice volume per cm³ of air
            let volume_budget =
                transferred.abs() * constants::M_H2O / constants::N_AVOGADRO / constants::RHO_ICE;

            let mut moved_volume = 0.0;
            let pdf = state.solid_mut().pdf_mut();

            if transferred > 0.0 {
                // deposition: promote, proportionally to r·n
                for bin in (0..nbin - 1).rev() {
                    if number[bin] <= 0.0 {
                        continue;
                    }
                    let share = volume_budget * radii[bin] * number[bin] / m1;
                    let movers = (share / (volumes[bin + 1] - volumes[bin])).min(number[bin]);

                    pdf[bin][[j, i]] -= movers;
                    pdf[bin + 1][[j, i]] += movers;
                    moved_volume += movers * (volumes[bin + 1] - volumes[bin]);
                }
            } else {
                // evaporation: demote; the smallest bin evaporates entirely
                for bin in 0..nbin {
                    if number[bin] <= 0.0 {
                        continue;
                    }
                    let share = volume_budget * radii[bin] * number[bin] / m1;

                    if bin == 0 {
                        let evaporating = (share / volumes[0]).min(number[0]);
                        pdf[0][[j, i]] -= evaporating;
                        moved_volume += evaporating * volumes[0];
                    } else {
                        let movers = (share / (volumes[bin] - volumes[bin - 1])).min(number[bin]);
                        pdf[bin][[j, i]] -= movers;
                        pdf[bin - 1][[j, i]] += movers;
                        moved_volume += movers * (volumes[bin] - volumes[bin - 1]);
                    }
                }
            }

            // return exactly what moved to (or from) the vapour
            let moved_molecules =
                moved_volume * constants::RHO_ICE * constants::N_AVOGADRO / constants::M_H2O;
            let signed = moved_molecules.copysign(transferred);
            state.field_mut(idx_h2o)[[j, i]] = (h2o - signed).max(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn time_grid_contains_sun_crossings() {
        // tInit 4 h, tFinal 20 h, sunrise 6 h, sunset 18 h
        let grid = build_time_grid(
            4.0 * 3600.0,
            20.0 * 3600.0,
            Some((6.0 * 3600.0, 18.0 * 3600.0)),
            600.0,
        )
        .unwrap();

        assert_approx_eq!(f64, grid[0], 14400.0, ulps = 2);
        assert_approx_eq!(f64, *grid.last().unwrap(), 72000.0, ulps = 2);
        assert!(grid.iter().any(|&t| t == 6.0 * 3600.0));
        assert!(grid.iter().any(|&t| t == 18.0 * 3600.0));

        for pair in grid.windows(2) {
            assert!(pair[1] > pair[0]);
            assert!(pair[1] - pair[0] <= 600.0 + 1e-9);
        }
    }

    #[test]
    fn time_grid_handles_offset_crossings() {
        // sunrise before tInit is shifted into the next day
        let grid = build_time_grid(
            8.0 * 3600.0,
            32.0 * 3600.0,
            Some((6.0 * 3600.0, 18.0 * 3600.0)),
            1800.0,
        )
        .unwrap();

        // sunset today, sunrise tomorrow
        assert!(grid.iter().any(|&t| t == 18.0 * 3600.0));
        assert!(grid.iter().any(|&t| t == 30.0 * 3600.0));
        assert!(!grid.iter().any(|&t| t == 6.0 * 3600.0));
    }

    #[test]
    fn time_grid_rejects_bad_windows() {
        assert!(build_time_grid(10.0, 10.0, None, 60.0).is_err());
        assert!(build_time_grid(0.0, 100.0, None, 0.0).is_err());
    }

    #[test]
    fn polar_night_grid_has_no_breakpoints() {
        let grid = build_time_grid(0.0, 7200.0, None, 600.0).unwrap();

        assert_eq!(grid.len(), 13);
        for (index, &t) in grid.iter().enumerate() {
            assert_approx_eq!(f64, t, index as f64 * 600.0, epsilon = 1e-9);
        }
    }
}
