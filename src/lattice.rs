//! discretized (t, x, y, z) lattice and its finite-difference stencils
//!
//! every field in the crate is a flat `Vec` indexed through [`Lattice::index`];
//! axis 0 is time, axes 1..4 are space.

use serde::{Deserialize, Serialize};

use crate::error::{FabricError, FabricResult};

/// largest number of points allowed along one axis
pub const MAX_RESOLUTION: usize = 512;

/// how stencils behave at the lattice edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// indices wrap around
    #[default]
    Periodic,
    /// first-order one-sided differences at the edges
    OneSided,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    pub shape: [usize; 4],
    pub spacing: [f64; 4],
    pub origin: [f64; 4],
    pub boundary: Boundary,
}

impl Lattice {
    pub fn new(shape: [usize; 4], spacing: [f64; 4], origin: [f64; 4], boundary: Boundary) -> FabricResult<Self> {
        for axis in 0..4 {
            let n = shape[axis];
            if n == 0 || n > MAX_RESOLUTION {
                return Err(FabricError::Lattice(format!(
                    "axis {axis} has {n} points, must be in 1..={MAX_RESOLUTION}"
                )));
            }
            let h = spacing[axis];
            if !h.is_finite() || h <= 0.0 {
                return Err(FabricError::Lattice(format!(
                    "axis {axis} spacing must be finite and > 0, got {h}"
                )));
            }
            if !origin[axis].is_finite() {
                return Err(FabricError::Lattice(format!("axis {axis} origin is not finite")));
            }
        }
        Ok(Self { shape, spacing, origin, boundary })
    }

    /// a single time slice with uniform spatial spacing
    pub fn spatial(shape: [usize; 3], spacing: f64, origin: [f64; 3], boundary: Boundary) -> FabricResult<Self> {
        Self::new(
            [1, shape[0], shape[1], shape[2]],
            [1.0, spacing, spacing, spacing],
            [0.0, origin[0], origin[1], origin[2]],
            boundary,
        )
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// number of points in one time slice
    pub fn spatial_len(&self) -> usize {
        self.shape[1] * self.shape[2] * self.shape[3]
    }

    /// flat offset between neighbours along each axis
    pub fn strides(&self) -> [usize; 4] {
        let [_, nx, ny, nz] = self.shape;
        [nx * ny * nz, 1, nx, nx * ny]
    }

    pub fn index(&self, it: usize, i: usize, j: usize, k: usize) -> usize {
        let [_, nx, ny, nz] = self.shape;
        i + nx * (j + ny * (k + nz * it))
    }

    /// inverse of [`Lattice::index`]: `[it, i, j, k]`
    pub fn coords(&self, idx: usize) -> [usize; 4] {
        let [_, nx, ny, nz] = self.shape;
        let i = idx % nx;
        let j = (idx / nx) % ny;
        let k = (idx / (nx * ny)) % nz;
        let it = idx / (nx * ny * nz);
        [it, i, j, k]
    }

    /// coordinates (x⁰, x¹, x², x³) of a lattice point
    pub fn position(&self, idx: usize) -> [f64; 4] {
        let c = self.coords(idx);
        let mut x = [0.0; 4];
        for axis in 0..4 {
            x[axis] = self.origin[axis] + c[axis] as f64 * self.spacing[axis];
        }
        x
    }

    /// true when `x` lies inside the lattice extent (half a cell of slack);
    /// axes with a single point do not constrain
    pub fn contains(&self, x: &[f64; 4]) -> bool {
        (0..4).all(|axis| {
            let n = self.shape[axis];
            if n < 2 {
                return true;
            }
            let f = (x[axis] - self.origin[axis]) / self.spacing[axis];
            f >= -0.5 && f < n as f64 - 0.5
        })
    }

    /// nearest lattice point to `x`, None outside the extent (see `contains`)
    pub fn nearest(&self, x: &[f64; 4]) -> Option<usize> {
        if !self.contains(x) {
            return None;
        }
        let mut c = [0usize; 4];
        for axis in 0..4 {
            let n = self.shape[axis];
            if n < 2 {
                continue;
            }
            let r = ((x[axis] - self.origin[axis]) / self.spacing[axis]).round() as i64;
            // round(-0.5) is -1
            c[axis] = r.clamp(0, n as i64 - 1) as usize;
        }
        Some(self.index(c[0], c[1], c[2], c[3]))
    }

    fn shift(&self, idx: usize, axis: usize, here: isize, target: isize) -> usize {
        let stride = self.strides()[axis] as isize;
        (idx as isize + (target - here) * stride) as usize
    }

    /// neighbour `offset` points away along `axis`
    pub fn neighbor(&self, idx: usize, axis: usize, offset: isize) -> Option<usize> {
        if self.boundary == Boundary::Periodic {
            return Some(self.wrapped_neighbor(idx, axis, offset));
        }
        let n = self.shape[axis] as isize;
        let here = self.coords(idx)[axis] as isize;
        let pos = here + offset;
        if pos < 0 || pos >= n {
            return None;
        }
        Some(self.shift(idx, axis, here, pos))
    }

    /// neighbour `offset` points away along `axis`, wrapping whatever the
    /// boundary
    pub fn wrapped_neighbor(&self, idx: usize, axis: usize, offset: isize) -> usize {
        let n = self.shape[axis] as isize;
        let here = self.coords(idx)[axis] as isize;
        self.shift(idx, axis, here, (here + offset).rem_euclid(n))
    }

    /// central ∂f/∂x^axis with periodic wrap on every lattice; antisymmetric
    /// as an operator, unlike `partial` on one-sided lattices
    pub fn periodic_partial<F: Fn(usize) -> f64>(&self, idx: usize, axis: usize, f: F) -> f64 {
        if self.shape[axis] < 2 {
            return 0.0;
        }
        let p = self.wrapped_neighbor(idx, axis, 1);
        let m = self.wrapped_neighbor(idx, axis, -1);
        (f(p) - f(m)) / (2.0 * self.spacing[axis])
    }

    /// ∂f/∂x^axis at `idx`, with `f` sampling the field by flat index
    pub fn partial<F: Fn(usize) -> f64>(&self, idx: usize, axis: usize, f: F) -> f64 {
        if self.shape[axis] < 2 {
            return 0.0;
        }
        let h = self.spacing[axis];
        match (self.neighbor(idx, axis, 1), self.neighbor(idx, axis, -1)) {
            (Some(p), Some(m)) => (f(p) - f(m)) / (2.0 * h),
            (Some(p), None) => (f(p) - f(idx)) / h,
            (None, Some(m)) => (f(idx) - f(m)) / h,
            (None, None) => 0.0,
        }
    }

    /// spatial Laplacian; one-sided edges reuse the centre value (zero flux)
    pub fn laplacian<F: Fn(usize) -> f64>(&self, idx: usize, f: F) -> f64 {
        let centre = f(idx);
        let mut lap = 0.0;
        for axis in 1..4 {
            if self.shape[axis] < 2 {
                continue;
            }
            let h = self.spacing[axis];
            let p = self.neighbor(idx, axis, 1).map_or(centre, &f);
            let m = self.neighbor(idx, axis, -1).map_or(centre, &f);
            lap += (p + m - 2.0 * centre) / (h * h);
        }
        lap
    }

    /// volume of one spatial cell
    pub fn cell_volume(&self) -> f64 {
        self.spacing[1] * self.spacing[2] * self.spacing[3]
    }

    /// spatial axes that carry more than one point
    pub fn active_spatial_axes(&self) -> impl Iterator<Item = usize> + '_ {
        (1..4).filter(move |&a| self.shape[a] > 1)
    }
}
