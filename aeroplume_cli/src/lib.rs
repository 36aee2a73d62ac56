#![allow(clippy::missing_errors_doc)]
#![allow(missing_docs)]

pub mod menu;
pub mod sweep;

use aeroplume::ambient::AmbientProfile;
use aeroplume::driver::{Driver, RunSummary, SimStatus};
use aeroplume::error::Error;
use aeroplume::solar::PhotolysisTable;
use anyhow::Result;
use aeroplume::species::SpeciesTable;
use clap::{Parser, ValueHint};
use git_version::git_version;
use log::info;
use prettytable::{Table, format, row};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    author,
    about,
    name = "aeroplume",
    version = git_version!(
        args = ["--always", "--dirty", "--long", "--tags"],
        cargo_prefix = "",
        fallback = "unknown"
    )
)]
pub struct Opts {
    /// Path to the run directory containing the input menu.
    #[arg(value_hint = ValueHint::DirPath)]
    pub run_dir: PathBuf,
    /// Menu file name inside the run directory.
    #[arg(default_value = "input.menu", long)]
    pub menu: String,
    /// Species table file name; the builtin table is used when absent.
    #[arg(default_value = "species.dat", long)]
    pub species: String,
    /// Ambient profile file name; a clean background is used when absent.
    #[arg(default_value = "ambient.dat", long)]
    pub ambient: String,
}

const fn status_label(status: SimStatus) -> &'static str {
    match status {
        SimStatus::Success => "success",
        SimStatus::Failure => "failure",
        SimStatus::KppFail => "chemistry failure",
        SimStatus::SaveFail => "save failure",
    }
}

fn summary_row(table: &mut Table, name: &str, summary: &RunSummary) {
    let first = summary.mass_checks.first();
    let last = summary.mass_checks.last();

    let drift = match (first, last) {
        (Some(first), Some(last)) if first.noy_emitted.abs() > 0.0 => format!(
            "{:.3e}",
            (last.noy_emitted - first.noy_emitted) / first.noy_emitted
        ),
        _ => "-".to_owned(),
    };
    let containment = last
        .and_then(|check| check.ring_containment)
        .map_or_else(|| "-".to_owned(), |fraction| format!("{fraction:.3}"));

    table.add_row(row![
        name,
        status_label(summary.status),
        summary.steps_completed,
        drift,
        containment
    ]);
}

fn try_run(opts: &Opts) -> Result<SimStatus> {
    let menu_path = opts.run_dir.join(&opts.menu);
    let text = fs::read_to_string(&menu_path).map_err(|err| {
        Error::InvalidInput(format!("cannot read menu {}: {err}", menu_path.display()))
    })?;

    let parsed = menu::Menu::parse(&text)?;
    let (mut base, sweep_spec) = menu::case_from_menu(&parsed)?;

    // relative output directories live inside the run directory
    if base.output.directory.is_relative() {
        base.output.directory = opts.run_dir.join(&base.output.directory);
    }

    let species = load_species(&opts.run_dir.join(&opts.species))?;
    let profile = load_profile(&opts.run_dir.join(&opts.ambient), &species)?;
    let photolysis = if opts.run_dir.join("jrates.dat").exists() {
        PhotolysisTable::load(&opts.run_dir)?
    } else {
        PhotolysisTable::builtin()
    };

    let cases = sweep::expand(&base, &sweep_spec);
    info!("{} case(s) to run", cases.len());

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.set_titles(row!["case", "status", "steps", "NOy drift", "ring frac"]);

    let mut status = SimStatus::Success;
    for case in cases {
        let name = case.simulation.case_name.clone();
        info!("running case `{name}`");

        let mut driver = Driver::new(case, species.clone(), &profile, photolysis.clone())?;
        let summary = driver.run();
        summary_row(&mut table, &name, &summary);

        if summary.status != SimStatus::Success {
            status = summary.status;
            break;
        }
    }

    table.printstd();

    Ok(status)
}

fn load_species(path: &Path) -> Result<SpeciesTable> {
    if path.exists() {
        let file = File::open(path).map_err(|err| {
            Error::InvalidInput(format!("cannot read species table {}: {err}", path.display()))
        })?;
        Ok(SpeciesTable::parse(BufReader::new(file))?)
    } else {
        Ok(SpeciesTable::builtin())
    }
}

fn load_profile(path: &Path, species: &SpeciesTable) -> Result<AmbientProfile> {
    if path.exists() {
        Ok(AmbientProfile::load(path, species)?)
    } else {
        Ok(AmbientProfile::default_background(species))
    }
}

/// Run the CLI and map the terminal status onto the process exit code:
/// 0 success, 1 generic failure, 2 chemistry failure, 3 save failure.
#[must_use]
pub fn run(opts: &Opts) -> ExitCode {
    match try_run(opts) {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(err) => {
            eprintln!("error: {err}");
            match err.downcast_ref::<Error>() {
                Some(Error::SaveFailed { .. }) => ExitCode::from(SimStatus::SaveFail.exit_code()),
                Some(Error::ChemistryFailed { .. }) => {
                    ExitCode::from(SimStatus::KppFail.exit_code())
                }
                _ => ExitCode::from(SimStatus::Failure.exit_code()),
            }
        }
    }
}
