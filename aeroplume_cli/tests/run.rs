use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;

const TINY_MENU: &str = "\
SIMULATION
  CASE NAME : smoke
  TIME INIT : 8.0
  TIME FINAL : 8.5
TRANSPORT
  TRANSPORT : T
  TIMESTEP : 600
  NX : 8
  NY : 8
  XLIM : 8000.0
  YLIM : 8000.0
CHEMISTRY
  CHEMISTRY : F
AEROSOL
  COAGULATION : F
  GROWTH : F
METEOROLOGY
  TEMPERATURE : 220.0
  PRESSURE : 24000.0
  RH_W : 60.0
  LAPSE RATE : 0.0
TIMESERIES
  SAVE : F
";

#[test]
fn transport_only_run_succeeds() {
    let dir = TempDir::new().unwrap();
    dir.child("input.menu").write_str(TINY_MENU).unwrap();

    Command::cargo_bin("aeroplume")
        .unwrap()
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("smoke"))
        .stdout(predicate::str::contains("success"));
}

#[test]
fn snapshots_are_written_when_enabled() {
    let dir = TempDir::new().unwrap();
    let menu = TINY_MENU.replace("SAVE : F", "SAVE : T\n  SAVE DT : 1800\n  OUTPUT DIR : out");
    dir.child("input.menu").write_str(&menu).unwrap();

    Command::cargo_bin("aeroplume")
        .unwrap()
        .arg(dir.path())
        .assert()
        .success();

    dir.child("out/ts_smoke.npz").assert(predicate::path::exists());
    let snapshots: Vec<_> = std::fs::read_dir(dir.child("out").path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with("APCEMM_Case_smoke")
        })
        .collect();
    assert!(!snapshots.is_empty());
}

#[test]
fn missing_menu_is_a_generic_failure() {
    let dir = TempDir::new().unwrap();

    Command::cargo_bin("aeroplume")
        .unwrap()
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot read menu"));
}

#[test]
fn malformed_menu_cites_the_line() {
    let dir = TempDir::new().unwrap();
    dir.child("input.menu")
        .write_str("TRANSPORT\n  NX : not-a-number\n")
        .unwrap();

    Command::cargo_bin("aeroplume")
        .unwrap()
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn sweep_runs_every_case() {
    let dir = TempDir::new().unwrap();
    let menu = format!("{TINY_MENU}PARAMETER SWEEP\n  TEMPERATURE : 215 225\n");
    dir.child("input.menu").write_str(&menu).unwrap();

    Command::cargo_bin("aeroplume")
        .unwrap()
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("smoke_000"))
        .stdout(predicate::str::contains("smoke_001"));
}
