//! Snapshot output.
//!
//! Snapshots are NumPy `.npz` containers: per-species concentration fields
//! (`APCEMM_Case_*`), per-bin aerosol fields (`ts_aerosol_*`) and the final
//! time-series container (`ts_*`) with ambient record, ring series and
//! diagnostic scalars. A failed write aborts the simulation; partial files
//! are left on disk for inspection.

use crate::ambient::AmbientRecord;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::plume::PlumeState;
use crate::species::SpeciesTable;
use ndarray::{Array1, Array2, Array3};
use ndarray_npy::NpzWriter;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Writer bound to an output directory and a case stem.
pub struct SnapshotWriter {
    directory: PathBuf,
    stem: String,
}

fn save_error(path: &Path, source: impl Into<anyhow::Error>) -> Error {
    Error::SaveFailed {
        path: path.display().to_string(),
        source: source.into(),
    }
}

impl SnapshotWriter {
    /// Create the writer and its output directory.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SaveFailed`] when the directory cannot be
    /// created.
    pub fn new(directory: &Path, stem: &str) -> Result<Self> {
        std::fs::create_dir_all(directory).map_err(|err| save_error(directory, err))?;

        Ok(Self {
            directory: directory.to_path_buf(),
            stem: stem.to_owned(),
        })
    }

    /// Write the concentration snapshot for simulated second `time_s`:
    /// coordinates plus one 2-D field per selected species.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SaveFailed`] on any I/O or encoding error.
    pub fn write_case(
        &self,
        time_s: f64,
        mesh: &Mesh,
        state: &PlumeState,
        species: &SpeciesTable,
        selected: &[String],
    ) -> Result<PathBuf> {
        let path = self.directory.join(format!(
            "APCEMM_Case_{}_{:06}.npz",
            self.stem, time_s as u64
        ));
        let mut npz = NpzWriter::new(File::create(&path).map_err(|err| save_error(&path, err))?);

        let write = |npz: &mut NpzWriter<File>, name: &str, array: &Array2<f64>| {
            npz.add_array(name, array).map_err(|err| save_error(&path, err))
        };

        npz.add_array("x", &Array1::from(mesh.x().to_vec()))
            .map_err(|err| save_error(&path, err))?;
        npz.add_array("y", &Array1::from(mesh.y().to_vec()))
            .map_err(|err| save_error(&path, err))?;

        for name in selected {
            if let Some(index) = species.index_of(name) {
                write(&mut npz, name, state.field(index))?;
            }
        }

        npz.finish().map_err(|err| save_error(&path, err))?;
        Ok(path)
    }

    /// Write the aerosol snapshot for simulated second `time_s`: bin-centre
    /// radii and the full bin × y × x blocks of both populations.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SaveFailed`] on any I/O or encoding error.
    pub fn write_aerosol(&self, time_s: f64, mesh: &Mesh, state: &PlumeState) -> Result<PathBuf> {
        let path = self.directory.join(format!(
            "ts_aerosol_{}_{:06}.npz",
            self.stem, time_s as u64
        ));
        let mut npz = NpzWriter::new(File::create(&path).map_err(|err| save_error(&path, err))?);

        let stack = |pdf: &[Array2<f64>]| {
            let mut block = Array3::zeros((pdf.len(), mesh.ny(), mesh.nx()));
            for (bin, field) in pdf.iter().enumerate() {
                block.index_axis_mut(ndarray::Axis(0), bin).assign(field);
            }
            block
        };

        npz.add_array(
            "la_radius",
            &Array1::from(state.liquid().bins().centres().to_vec()),
        )
        .map_err(|err| save_error(&path, err))?;
        npz.add_array(
            "pa_radius",
            &Array1::from(state.solid().bins().centres().to_vec()),
        )
        .map_err(|err| save_error(&path, err))?;
        npz.add_array("la_pdf", &stack(state.liquid().pdf()))
            .map_err(|err| save_error(&path, err))?;
        npz.add_array("pa_pdf", &stack(state.solid().pdf()))
            .map_err(|err| save_error(&path, err))?;

        npz.finish().map_err(|err| save_error(&path, err))?;
        Ok(path)
    }

    /// Write the end-of-run time-series container: the time grid, the
    /// ambient record, optional per-ring series and diagnostic scalars.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SaveFailed`] on any I/O or encoding error.
    pub fn write_timeseries(
        &self,
        time_grid: &[f64],
        ambient: &AmbientRecord,
        ring_series: Option<(&[String], &Array3<f64>)>,
        diagnostics: &[(&str, Array1<f64>)],
    ) -> Result<PathBuf> {
        let path = self.directory.join(format!("ts_{}.npz", self.stem));
        let mut npz = NpzWriter::new(File::create(&path).map_err(|err| save_error(&path, err))?);

        npz.add_array("time", &Array1::from(time_grid.to_vec()))
            .map_err(|err| save_error(&path, err))?;
        npz.add_array("ambient", ambient.species())
            .map_err(|err| save_error(&path, err))?;
        npz.add_array(
            "csza",
            &Array1::from_iter((0..ambient.n_times()).map(|index| ambient.csza(index))),
        )
        .map_err(|err| save_error(&path, err))?;

        if let Some((names, block)) = ring_series {
            // block is species × time × ring
            npz.add_array("ring_series", block)
                .map_err(|err| save_error(&path, err))?;
            for (position, name) in names.iter().enumerate() {
                npz.add_array(
                    format!("ring_species_{position}_{name}").as_str(),
                    &Array1::from(vec![position as f64]),
                )
                .map_err(|err| save_error(&path, err))?;
            }
        }

        for (name, values) in diagnostics {
            npz.add_array(*name, values)
                .map_err(|err| save_error(&path, err))?;
        }

        npz.finish().map_err(|err| save_error(&path, err))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aerosol::BinGrid;
    use crate::ambient::BulkAerosol;
    use crate::met::MetProfile;

    fn setup() -> (Mesh, SpeciesTable, PlumeState) {
        let mesh = Mesh::new(8, 8, 800.0, 800.0);
        let species = SpeciesTable::builtin();
        let met = MetProfile::new(220.0, 24000.0, 0.6, 0.0);
        let state = PlumeState::new(
            &mesh,
            &species,
            BinGrid::geometric(1.0e-9, 1.0e-6, 4),
            BinGrid::geometric(5.0e-9, 1.0e-4, 4),
            &met,
        );

        (mesh, species, state)
    }

    #[test]
    fn snapshots_land_on_disk() {
        let (mesh, species, state) = setup();
        let dir = std::env::temp_dir().join("aeroplume-output-test");
        let writer = SnapshotWriter::new(&dir, "unit").unwrap();

        let case = writer
            .write_case(3600.0, &mesh, &state, &species, &["O3".to_owned()])
            .unwrap();
        let aerosol = writer.write_aerosol(3600.0, &mesh, &state).unwrap();

        assert!(case.file_name().unwrap().to_str().unwrap().starts_with("APCEMM_Case_unit"));
        assert!(case.exists());
        assert!(aerosol.exists());

        let ambient = AmbientRecord::new(3, &vec![1.0; species.n_variable()], BulkAerosol::default());
        let ts = writer
            .write_timeseries(
                &[0.0, 600.0, 1200.0],
                &ambient,
                None,
                &[("noy_emitted", Array1::zeros(3))],
            )
            .unwrap();
        assert!(ts.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unwritable_directory_is_a_save_failure() {
        let (mesh, species, state) = setup();

        let writer = SnapshotWriter {
            directory: PathBuf::from("/nonexistent-root/nowhere"),
            stem: "unit".to_owned(),
        };

        assert!(matches!(
            writer.write_case(0.0, &mesh, &state, &species, &[]),
            Err(Error::SaveFailed { .. })
        ));
    }
}
