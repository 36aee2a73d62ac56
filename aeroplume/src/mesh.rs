//! Rectangular cross-stream mesh with fixed extents.

use crate::convert;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Mirror-symmetry convention of a scalar field on the mesh.
///
/// The plume centre sits at `(0, 0)`; coagulation and other per-cell loops
/// exploit evenness to reduce their work to one half or one quadrant.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Symmetry {
    /// Even in both `x` and `y`: one quadrant is computed, weight 4.
    Both,
    /// Even in `x` only: one half is computed, weight 2.
    X,
    /// Even in `y` only: one half is computed, weight 2.
    Y,
    /// No symmetry: every cell is computed.
    None,
}

impl Symmetry {
    /// Number of mirror images each computed cell stands for.
    #[must_use]
    pub const fn weight(self) -> usize {
        match self {
            Self::Both => 4,
            Self::X | Self::Y => 2,
            Self::None => 1,
        }
    }
}

/// Rectangular mesh of `nx` × `ny` cells with uniform spacing.
///
/// By convention `x` is the cross-wind horizontal coordinate and `y` the
/// vertical one; cell centres are placed symmetrically about the plume
/// centre at `(0, 0)`. Fields on the mesh are indexed `[j, i]` = `[y, x]`.
#[derive(Clone, Deserialize, Serialize)]
pub struct Mesh {
    nx: usize,
    ny: usize,
    dx: f64,
    dy: f64,
    x: Vec<f64>,
    y: Vec<f64>,
    area: Array2<f64>,
}

impl Mesh {
    /// Constructor. `xlim` and `ylim` are the full domain extents in metres.
    ///
    /// # Panics
    ///
    /// Panics if either cell count is zero or odd (mirror symmetry about the
    /// centre requires an even split), or if either extent is not positive.
    #[must_use]
    pub fn new(nx: usize, ny: usize, xlim: f64, ylim: f64) -> Self {
        // centred symmetry needs an even number of cells in each direction
        assert!(nx > 0 && nx % 2 == 0);
        assert!(ny > 0 && ny % 2 == 0);
        assert!(xlim > 0.0 && ylim > 0.0);

        let dx = xlim / convert::f64_from_usize(nx);
        let dy = ylim / convert::f64_from_usize(ny);
        let x = (0..nx)
            .map(|i| convert::f64_from_usize(i).mul_add(dx, 0.5f64.mul_add(dx, -0.5 * xlim)))
            .collect();
        let y = (0..ny)
            .map(|j| convert::f64_from_usize(j).mul_add(dy, 0.5f64.mul_add(dy, -0.5 * ylim)))
            .collect();

        Self {
            nx,
            ny,
            dx,
            dy,
            x,
            y,
            area: Array2::from_elem((ny, nx), dx * dy),
        }
    }

    /// Number of cells in the cross-wind direction.
    #[must_use]
    pub const fn nx(&self) -> usize {
        self.nx
    }

    /// Number of cells in the vertical direction.
    #[must_use]
    pub const fn ny(&self) -> usize {
        self.ny
    }

    /// Cell width [m].
    #[must_use]
    pub const fn dx(&self) -> f64 {
        self.dx
    }

    /// Cell height [m].
    #[must_use]
    pub const fn dy(&self) -> f64 {
        self.dy
    }

    /// Cross-wind cell-centre coordinates [m].
    #[must_use]
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// Vertical cell-centre coordinates [m].
    #[must_use]
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Per-cell area array [m²], fixed at construction.
    #[must_use]
    pub const fn area(&self) -> &Array2<f64> {
        &self.area
    }

    /// Total domain area [m²].
    #[must_use]
    pub fn total_area(&self) -> f64 {
        self.area.sum()
    }

    /// Allocate a zeroed scalar field with this mesh's shape.
    #[must_use]
    pub fn field(&self) -> Array2<f64> {
        Array2::zeros((self.ny, self.nx))
    }

    /// Integral of `field` times cell area, Σ c[j][i] · area[j][i].
    ///
    /// # Panics
    ///
    /// Panics if `field` does not have this mesh's shape.
    #[must_use]
    pub fn integrate(&self, field: &Array2<f64>) -> f64 {
        assert_eq!(field.dim(), (self.ny, self.nx));

        field
            .iter()
            .zip(&self.area)
            .map(|(c, a)| c * a)
            .sum()
    }

    /// Mirror partner of cell `i` across the `x = 0` axis.
    #[must_use]
    pub const fn mirror_x(&self, i: usize) -> usize {
        self.nx - 1 - i
    }

    /// Mirror partner of cell `j` across the `y = 0` axis.
    #[must_use]
    pub const fn mirror_y(&self, j: usize) -> usize {
        self.ny - 1 - j
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn centred_coordinates() {
        let mesh = Mesh::new(8, 4, 800.0, 200.0);

        assert_eq!(mesh.nx(), 8);
        assert_eq!(mesh.ny(), 4);
        assert_approx_eq!(f64, mesh.dx(), 100.0, ulps = 2);
        assert_approx_eq!(f64, mesh.dy(), 50.0, ulps = 2);

        // centres are symmetric about zero
        assert_approx_eq!(f64, mesh.x()[0], -350.0, ulps = 2);
        assert_approx_eq!(f64, mesh.x()[7], 350.0, ulps = 2);
        assert_approx_eq!(f64, mesh.y()[0], -75.0, ulps = 2);
        assert_approx_eq!(f64, mesh.y()[3], 75.0, ulps = 2);

        for i in 0..8 {
            assert_approx_eq!(f64, mesh.x()[i], -mesh.x()[mesh.mirror_x(i)], ulps = 2);
        }

        assert_approx_eq!(f64, mesh.total_area(), 800.0 * 200.0, ulps = 8);
    }

    #[test]
    fn field_integral() {
        let mesh = Mesh::new(4, 4, 400.0, 400.0);
        let mut field = mesh.field();
        field[[1, 2]] = 3.0;

        assert_approx_eq!(f64, mesh.integrate(&field), 3.0 * 100.0 * 100.0, ulps = 4);
    }
}
