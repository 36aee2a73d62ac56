//! End-to-end driver scenarios.

use aeroplume::ambient::AmbientProfile;
use aeroplume::config::CaseConfig;
use aeroplume::driver::{Driver, SimStatus};
use aeroplume::epm::EngineSpec;
use aeroplume::solar::PhotolysisTable;
use aeroplume::species::SpeciesTable;
use ndarray::Array2;

/// Transport-only configuration: chemistry, coagulation, growth, settling
/// and negative-value refill all off.
fn transport_only() -> CaseConfig {
    let mut config = CaseConfig::default();

    config.simulation.t_init_h = 8.0;
    config.simulation.t_final_h = 32.0;
    config.simulation.day_of_year = 81;
    config.simulation.latitude_deg = 60.0;

    config.met.temperature_k = 220.0;
    config.met.pressure_pa = 24000.0;
    config.met.rh_w_percent = 60.0;
    config.met.lapse_rate = 0.0;

    config.transport.nx = 32;
    config.transport.ny = 16;
    config.transport.xlim = 8000.0;
    config.transport.ylim = 800.0;
    config.transport.dh = 15.0;
    config.transport.dv = 0.15;
    config.transport.vx = 0.0;
    config.transport.vy = 0.0;
    config.transport.fill_negative = false;

    config.chemistry.enabled = false;
    config.aerosol.coagulation = false;
    config.aerosol.growth = false;
    config.aerosol.settling = false;
    config.output.enabled = false;

    config
}

fn peak(field: &Array2<f64>) -> f64 {
    field.iter().copied().fold(f64::MIN, f64::max)
}

#[test]
fn isothermal_diffusion_conserves_noy() {
    let config = transport_only();
    let species = SpeciesTable::builtin();
    let profile = AmbientProfile::default_background(&species);

    let mut driver = Driver::new(
        config,
        species.clone(),
        &profile,
        PhotolysisTable::builtin(),
    )
    .unwrap();

    let no2 = species.index_of("NO2").unwrap();
    let peak_initial = peak(driver.state().field(no2));

    let summary = driver.run();
    assert_eq!(summary.status, SimStatus::Success);

    // 24 h of pure diffusion leaves the emitted NOy column unchanged
    let first = summary.mass_checks.first().unwrap();
    let last = summary.mass_checks.last().unwrap();
    assert!(first.noy_emitted > 0.0);
    assert!(((last.noy_emitted - first.noy_emitted) / first.noy_emitted).abs() < 1e-8);
    assert!(((last.co2_emitted - first.co2_emitted) / first.co2_emitted).abs() < 1e-8);

    // the peak spreads out
    let peak_final = peak(driver.state().field(no2));
    assert!(peak_final < peak_initial);
}

#[test]
fn pure_advection_translates_the_centre_of_mass() {
    let mut config = transport_only();
    config.transport.nx = 8;
    config.transport.ny = 64;
    config.transport.xlim = 8000.0;
    config.transport.ylim = 20000.0;
    config.transport.dh = 0.0;
    config.transport.dv = 0.0;
    config.transport.vy = 0.1;

    let species = SpeciesTable::builtin();
    let profile = AmbientProfile::default_background(&species);

    let mut driver = Driver::new(
        config,
        species.clone(),
        &profile,
        PhotolysisTable::builtin(),
    )
    .unwrap();

    let summary = driver.run();
    assert_eq!(summary.status, SimStatus::Success);

    // centre of mass of the CO2 excess
    let co2 = species.index_of("CO2").unwrap();
    let ambient_co2 = driver.ambient().row(driver.ambient().n_times() - 1)
        [species.index_of("CO2").unwrap()];
    let field = driver.state().field(co2);
    let mesh = driver.mesh();

    let mut total = 0.0;
    let mut weighted = 0.0;
    for (j, &y) in mesh.y().iter().enumerate() {
        for i in 0..mesh.nx() {
            let excess = field[[j, i]] - ambient_co2;
            total += excess;
            weighted += excess * y;
        }
    }
    let centre = weighted / total;

    // 0.1 m/s for 24 h, within one cell height
    let expected = 0.1 * 24.0 * 3600.0;
    assert!((centre - expected).abs() < mesh.dy());

    // the displacement bookkeeping tracks the imposed velocity
    assert!((driver.state().kinematics().dtrav_y - expected).abs() < 1e-6);
}

#[test]
fn per_ring_and_per_cell_chemistry_agree_for_uniform_state() {
    // uniform background, no emissions, no aerosol anywhere
    let profile_text = "\
PRESSURE O3 NO NO2 HNO3 CO CH4 CO2 N2O H2O2 SO2 H2O
40000.0 1.0e-7 8.0e-11 3.0e-11 2.0e-10 1.0e-7 1.8e-6 4.1e-4 3.3e-7 5.0e-10 2.0e-11 6.0e-5
15000.0 1.0e-7 8.0e-11 3.0e-11 2.0e-10 1.0e-7 1.8e-6 4.1e-4 3.3e-7 5.0e-10 2.0e-11 6.0e-5
";

    let mut base = transport_only();
    base.transport.enabled = false;
    base.transport.nx = 4;
    base.transport.ny = 4;
    base.transport.xlim = 8000.0;
    base.transport.ylim = 8000.0;
    base.simulation.t_final_h = 8.0 + 2.0 * 600.0 / 3600.0;
    base.chemistry.enabled = true;
    base.engine = EngineSpec {
        ei_co2: 0.0,
        ei_h2o: 0.0,
        ei_nox: 0.0,
        ei_co: 0.0,
        ei_uhc: 0.0,
        ei_so2: 0.0,
        ei_soot: 0.0,
        ..EngineSpec::default()
    };

    let mut per_ring = base.clone();
    per_ring.chemistry.per_ring = true;
    per_ring.chemistry.n_ring = 1;

    let species = SpeciesTable::builtin();
    let profile = AmbientProfile::parse(profile_text, &species).unwrap();

    let mut cell_driver = Driver::new(
        base,
        species.clone(),
        &profile,
        PhotolysisTable::builtin(),
    )
    .unwrap();
    let mut ring_driver = Driver::new(
        per_ring,
        species.clone(),
        &profile,
        PhotolysisTable::builtin(),
    )
    .unwrap();

    assert_eq!(cell_driver.run().status, SimStatus::Success);
    assert_eq!(ring_driver.run().status, SimStatus::Success);

    for index in 0..species.n_variable() {
        let cell_field = cell_driver.state().field(index);
        let ring_field = ring_driver.state().field(index);

        for (a, b) in cell_field.iter().zip(ring_field) {
            let scale = a.abs().max(1.0);
            assert!(
                (a - b).abs() / scale < 1e-8,
                "species {index} differs: {a} vs {b}"
            );
        }
    }
}

#[test]
fn save_failure_aborts_with_save_fail() {
    let mut config = transport_only();
    config.simulation.t_final_h = 8.5;
    config.output.enabled = true;
    config.output.directory = "/proc/aeroplume-cannot-write-here".into();

    let species = SpeciesTable::builtin();
    let profile = AmbientProfile::default_background(&species);

    // directory creation already fails during assembly
    let result = Driver::new(config, species, &profile, PhotolysisTable::builtin());
    assert!(result.is_err());
}
