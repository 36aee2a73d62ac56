//! Concentric-ring clustering of the mesh.
//!
//! Chemistry may be homogenised over nested elliptical annuli sharing the
//! plume centre and aspect ratio: each ring is solved once with its
//! area-weighted mean state and the resulting change is applied to every
//! member cell. The outermost ring is the residual ambient contained in the
//! mesh; cells beyond it stay unclustered.

use crate::convert;
use crate::mesh::Mesh;
use ndarray::Array2;

/// Factor between the contrail-core innermost ring and the standard one.
const CONTRAIL_CORE_SHRINK: f64 = 0.5;

/// Relative semi-axis change beyond which the ring map is rebuilt.
pub const REBUILD_THRESHOLD: f64 = 0.1;

/// A fixed partition of the mesh cells inside the outermost ellipse into
/// nested annular rings.
pub struct RingCluster {
    built_for: (f64, f64),
    semi_axes: Vec<(f64, f64)>,
    cells: Vec<Vec<(usize, usize)>>,
    areas: Vec<f64>,
    map: Array2<Option<usize>>,
}

impl RingCluster {
    /// Build `n_ring` rings with innermost semi-axes `(ax, ay)`, growing
    /// geometrically until the outermost ellipse touches the mesh boundary.
    /// `is_contrail` shrinks the innermost ring to resolve the dense core.
    ///
    /// # Panics
    ///
    /// Panics if `n_ring` is zero or the semi-axes are not positive.
    #[must_use]
    pub fn new(mesh: &Mesh, n_ring: usize, ax: f64, ay: f64, is_contrail: bool) -> Self {
        assert!(n_ring > 0);
        assert!(ax > 0.0 && ay > 0.0);

        let scale = if is_contrail { CONTRAIL_CORE_SHRINK } else { 1.0 };
        let (ax0, ay0) = (ax * scale, ay * scale);

        // outermost ellipse inscribed in the domain
        let half_x = mesh.x().last().unwrap().abs() + 0.5 * mesh.dx();
        let half_y = mesh.y().last().unwrap().abs() + 0.5 * mesh.dy();
        let growth = if n_ring > 1 {
            (half_x / ax0)
                .min(half_y / ay0)
                .max(1.0)
                .powf(1.0 / convert::f64_from_usize(n_ring - 1))
        } else {
            1.0
        };

        let semi_axes: Vec<(f64, f64)> = (0..n_ring)
            .map(|ring| {
                let factor = growth.powi(i32::try_from(ring).unwrap());
                (ax0 * factor, ay0 * factor)
            })
            .collect();

        let mut cells = vec![Vec::new(); n_ring];
        let mut areas = vec![0.0; n_ring];
        let mut map = Array2::from_elem((mesh.ny(), mesh.nx()), None);

        for (j, &y) in mesh.y().iter().enumerate() {
            for (i, &x) in mesh.x().iter().enumerate() {
                // the innermost ellipse containing the cell centre
                let ring = semi_axes
                    .iter()
                    .position(|&(rx, ry)| (x / rx).powi(2) + (y / ry).powi(2) <= 1.0);

                if let Some(ring) = ring {
                    cells[ring].push((j, i));
                    areas[ring] += mesh.area()[[j, i]];
                    map[[j, i]] = Some(ring);
                }
            }
        }

        Self {
            built_for: (ax, ay),
            semi_axes,
            cells,
            areas,
            map,
        }
    }

    /// Number of rings.
    #[must_use]
    pub fn n_rings(&self) -> usize {
        self.cells.len()
    }

    /// Semi-axes of ring `ring`'s outer ellipse.
    #[must_use]
    pub fn semi_axes(&self, ring: usize) -> (f64, f64) {
        self.semi_axes[ring]
    }

    /// Member cells of ring `ring` as `(j, i)` pairs.
    #[must_use]
    pub fn cells(&self, ring: usize) -> &[(usize, usize)] {
        &self.cells[ring]
    }

    /// Physical area of ring `ring`, the sum of its member cell areas.
    #[must_use]
    pub fn area(&self, ring: usize) -> f64 {
        self.areas[ring]
    }

    /// Ring owning cell `(j, i)`, or `None` outside the outermost ellipse.
    #[must_use]
    pub fn ring_of(&self, j: usize, i: usize) -> Option<usize> {
        self.map[[j, i]]
    }

    /// Area-weighted mean of `field` over each ring, inner to outer.
    #[must_use]
    pub fn ring_means(&self, field: &Array2<f64>, mesh: &Mesh) -> Vec<f64> {
        self.cells
            .iter()
            .zip(&self.areas)
            .map(|(members, &area)| {
                members
                    .iter()
                    .map(|&(j, i)| field[[j, i]] * mesh.area()[[j, i]])
                    .sum::<f64>()
                    / area
            })
            .collect()
    }

    /// Add `delta` to every member cell of ring `ring`. Per-ring chemistry
    /// applies its post − pre change this way.
    pub fn apply_delta(&self, field: &mut Array2<f64>, ring: usize, delta: f64) {
        for &(j, i) in &self.cells[ring] {
            field[[j, i]] += delta;
        }
    }

    /// Whether the map must be rebuilt because the plume semi-axes drifted
    /// from those the cluster was built for.
    #[must_use]
    pub fn needs_rebuild(&self, ax: f64, ay: f64) -> bool {
        let (built_ax, built_ay) = self.built_for;

        ((ax - built_ax) / built_ax).abs() > REBUILD_THRESHOLD
            || ((ay - built_ay) / built_ay).abs() > REBUILD_THRESHOLD
    }
}
