//! The mutable plume state: one scalar field per species, the two aerosol
//! populations and the plume kinematics.

use crate::aerosol::{BinGrid, SectionalDistribution};
use crate::constants;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::met::MetProfile;
use crate::species::SpeciesTable;
use ndarray::Array2;

/// Saturation vapour pressure of sulfuric acid [Pa], after Ayers et al.
#[must_use]
pub fn psat_h2so4(t: f64) -> f64 {
    (16.259 - 10156.0 / t).exp() * 101325.0
}

/// Gaseous mass fraction of total sulfate at temperature `t` [K] and total
/// sulfate `total` [molecules cm⁻³]: everything up to the saturation number
/// density stays in the gas phase.
#[must_use]
pub fn h2so4_gas_fraction(t: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 1.0;
    }

    let n_sat = psat_h2so4(t) / (constants::K_B * t) * 1.0e-6;
    (n_sat / total).min(1.0)
}

/// Plume kinematic state.
#[derive(Clone, Copy, Debug)]
pub struct Kinematics {
    /// Cross-sectional area [m²].
    pub area: f64,
    /// Horizontal semi-axis [m].
    pub ax: f64,
    /// Vertical semi-axis [m].
    pub ay: f64,
    /// Cumulative horizontal displacement [m].
    pub dtrav_x: f64,
    /// Cumulative vertical displacement [m].
    pub dtrav_y: f64,
    /// Plume temperature [K].
    pub temperature: f64,
    /// Plume pressure [Pa].
    pub pressure: f64,
}

/// The complete mutable plume state. Fields are indexed by species-table
/// position and mutated only by transport, chemistry, partitioning,
/// coagulation, growth and the t = 0 emission injection.
pub struct PlumeState {
    fields: Vec<Array2<f64>>,
    liquid: SectionalDistribution,
    solid: SectionalDistribution,
    soot: Array2<f64>,
    soot_radius: f64,
    kinematics: Kinematics,
}

impl PlumeState {
    /// Zero-initialised state over `mesh` with the given bin grids.
    #[must_use]
    pub fn new(
        mesh: &Mesh,
        species: &SpeciesTable,
        la_bins: BinGrid,
        pa_bins: BinGrid,
        met: &MetProfile,
    ) -> Self {
        let fields = (0..species.len()).map(|_| mesh.field()).collect();

        Self {
            fields,
            liquid: SectionalDistribution::new(la_bins, mesh),
            solid: SectionalDistribution::new(pa_bins, mesh),
            soot: mesh.field(),
            soot_radius: 20.0e-9,
            kinematics: Kinematics {
                area: 0.0,
                ax: 0.0,
                ay: 0.0,
                dtrav_x: 0.0,
                dtrav_y: 0.0,
                temperature: met.temperature(),
                pressure: met.pressure(),
            },
        }
    }

    /// Field of species-table entry `index`.
    #[must_use]
    pub fn field(&self, index: usize) -> &Array2<f64> {
        &self.fields[index]
    }

    /// Mutable field of species-table entry `index`.
    pub fn field_mut(&mut self, index: usize) -> &mut Array2<f64> {
        &mut self.fields[index]
    }

    /// All fields in species-table order.
    #[must_use]
    pub fn fields(&self) -> &[Array2<f64>] {
        &self.fields
    }

    /// Mutable view of all fields.
    pub fn fields_mut(&mut self) -> &mut [Array2<f64>] {
        &mut self.fields
    }

    /// The liquid (LA) population.
    #[must_use]
    pub const fn liquid(&self) -> &SectionalDistribution {
        &self.liquid
    }

    /// Mutable liquid population.
    pub fn liquid_mut(&mut self) -> &mut SectionalDistribution {
        &mut self.liquid
    }

    /// The solid (PA) population.
    #[must_use]
    pub const fn solid(&self) -> &SectionalDistribution {
        &self.solid
    }

    /// Mutable solid population.
    pub fn solid_mut(&mut self) -> &mut SectionalDistribution {
        &mut self.solid
    }

    /// Interstitial soot number density [cm⁻³].
    #[must_use]
    pub const fn soot(&self) -> &Array2<f64> {
        &self.soot
    }

    /// Mutable interstitial soot field.
    pub fn soot_mut(&mut self) -> &mut Array2<f64> {
        &mut self.soot
    }

    /// Soot particle radius [m].
    #[must_use]
    pub const fn soot_radius(&self) -> f64 {
        self.soot_radius
    }

    /// Set the soot particle radius [m].
    pub fn set_soot_radius(&mut self, radius: f64) {
        self.soot_radius = radius;
    }

    /// Plume kinematics.
    #[must_use]
    pub const fn kinematics(&self) -> &Kinematics {
        &self.kinematics
    }

    /// Mutable plume kinematics.
    pub fn kinematics_mut(&mut self) -> &mut Kinematics {
        &mut self.kinematics
    }

    /// Normalised Gaussian plume shape: a mask whose area integral equals
    /// the plume cross-section, so adding `mean · mask` deposits the
    /// in-plume mean `mean` over one plume area.
    ///
    /// # Errors
    ///
    /// Fails when the kinematic area or semi-axes have not been set.
    pub fn gaussian_mask(&self, mesh: &Mesh) -> Result<Array2<f64>> {
        let Kinematics { area, ax, ay, .. } = self.kinematics;
        if area <= 0.0 || ax <= 0.0 || ay <= 0.0 {
            return Err(Error::InvalidInput(
                "plume area and semi-axes must be set before injection".to_owned(),
            ));
        }

        // a plume narrower than one cell cannot be resolved; widen to the
        // cell size so the normalisation below stays well conditioned
        let ax = ax.max(mesh.dx());
        let ay = ay.max(mesh.dy());

        let mut mask = mesh.field();
        for (j, &y) in mesh.y().iter().enumerate() {
            for (i, &x) in mesh.x().iter().enumerate() {
                mask[[j, i]] = (-0.5 * ((x / ax).powi(2) + (y / ay).powi(2))).exp();
            }
        }

        let integral = mesh.integrate(&mask);
        mask *= area / integral;

        Ok(mask)
    }

    /// SO4 gas/liquid partitioning: for every cell, split the sulfate total
    /// by the gaseous fraction at the row temperature. Post-invariant:
    /// gas + liquid = total exactly.
    ///
    /// # Panics
    ///
    /// Panics if the species table lacks `SO4` or `SO4L`.
    pub fn partition_so4(&mut self, mesh: &Mesh, met: &MetProfile, species: &SpeciesTable) {
        let so4 = species.index_of("SO4").expect("SO4 in table");
        let so4l = species.index_of("SO4L").expect("SO4L in table");

        for j in 0..mesh.ny() {
            let temperature = met.temperature_at_row(mesh, j);

            for i in 0..mesh.nx() {
                let total = self.fields[so4][[j, i]] + self.fields[so4l][[j, i]];
                let gas_fraction = h2so4_gas_fraction(temperature, total);

                let gas = gas_fraction * total;
                self.fields[so4][[j, i]] = gas;
                self.fields[so4l][[j, i]] = total - gas;
            }
        }
    }

    /// Heterogeneous surface categories seen by cell `(j, i)`: plume ice
    /// and soot from the solid population, plume sulfate from the liquid
    /// one, the stratospheric background from the ambient bulk moments.
    #[must_use]
    pub fn ice_water_content(&self, j: usize, i: usize) -> f64 {
        let mut mass = 0.0;
        for (volume, field) in self
            .solid
            .bins()
            .volumes()
            .iter()
            .zip(self.solid.pdf())
        {
            // number cm⁻³ → mass per m³ of air
            mass += field[[j, i]] * 1.0e6 * volume * constants::RHO_ICE;
        }

        mass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    fn setup() -> (Mesh, MetProfile, SpeciesTable, PlumeState) {
        let mesh = Mesh::new(16, 16, 1600.0, 1600.0);
        let met = MetProfile::new(220.0, 24000.0, 0.6, 0.0);
        let species = SpeciesTable::builtin();
        let state = PlumeState::new(
            &mesh,
            &species,
            BinGrid::geometric(1.0e-9, 1.0e-6, 8),
            BinGrid::geometric(5.0e-9, 1.0e-4, 8),
            &met,
        );

        (mesh, met, species, state)
    }

    #[test]
    fn gaussian_mask_integrates_to_plume_area() {
        let (mesh, _, _, mut state) = setup();
        state.kinematics_mut().area = 5000.0;
        state.kinematics_mut().ax = 200.0;
        state.kinematics_mut().ay = 100.0;

        let mask = state.gaussian_mask(&mesh).unwrap();

        assert_approx_eq!(f64, mesh.integrate(&mask), 5000.0, epsilon = 1e-6);
        // peak at the plume centre
        let peak = mask.iter().copied().fold(f64::MIN, f64::max);
        assert!(mask[[8, 8]] >= peak * 0.99);
    }

    #[test]
    fn mask_requires_kinematics() {
        let (mesh, _, _, state) = setup();
        assert!(state.gaussian_mask(&mesh).is_err());
    }

    #[test]
    fn so4_partitioning_invariant() {
        let (mesh, met, species, mut state) = setup();
        let so4 = species.index_of("SO4").unwrap();
        let so4l = species.index_of("SO4L").unwrap();

        state.field_mut(so4).fill(3.0e9);
        state.field_mut(so4l)[[4, 4]] = 1.0e9;

        let total_before = state.field(so4) + state.field(so4l);
        state.partition_so4(&mesh, &met, &species);

        for j in 0..mesh.ny() {
            for i in 0..mesh.nx() {
                let total = state.field(so4)[[j, i]] + state.field(so4l)[[j, i]];
                let reference = total_before[[j, i]];

                assert!((total - reference).abs() / reference < 1e-12);
                assert!(state.field(so4)[[j, i]] >= 0.0);
                assert!(state.field(so4l)[[j, i]] >= 0.0);
            }
        }

        // cold UT/LS: almost everything condenses
        assert!(state.field(so4l)[[4, 4]] > state.field(so4)[[4, 4]]);
    }

    #[test]
    fn ice_water_content_tracks_solid_volume() {
        let (_, _, _, mut state) = setup();

        assert_approx_eq!(f64, state.ice_water_content(0, 0), 0.0, ulps = 2);

        state.solid_mut().pdf_mut()[5].fill(10.0);
        let iwc = state.ice_water_content(0, 0);
        assert!(iwc > 0.0);
    }
}
