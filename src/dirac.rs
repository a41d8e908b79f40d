//! four-component spinor field under a Dirac Hamiltonian
//!
//! Hψ = −iħc αᵏ∂ₖψ + βmc²ψ + qφψ − qc αᵏAₖψ, with ∂ψ/∂t = −iHψ/ħ
//! integrated by classic fourth-order Runge–Kutta.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::config::Constants;
use crate::electromagnetism::PotentialField;
use crate::error::{FabricError, FabricResult};
use crate::lattice::Lattice;
use crate::sanitize::{sanitize_complex, NanPolicy};

pub type Spinor = [Complex64; 4];
pub type SpinorMatrix = [[Complex64; 4]; 4];

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

/// Pauli matrix σ_k, k in 0..3
fn pauli(k: usize) -> [[Complex64; 2]; 2] {
    match k {
        0 => [[ZERO, ONE], [ONE, ZERO]],
        1 => [[ZERO, -I], [I, ZERO]],
        _ => [[ONE, ZERO], [ZERO, -ONE]],
    }
}

/// αₖ = [[0, σₖ], [σₖ, 0]] in the Dirac representation
pub fn alpha(k: usize) -> SpinorMatrix {
    let s = pauli(k);
    let mut m = [[ZERO; 4]; 4];
    for r in 0..2 {
        for c in 0..2 {
            m[r][c + 2] = s[r][c];
            m[r + 2][c] = s[r][c];
        }
    }
    m
}

/// β = diag(1, 1, −1, −1)
pub fn beta() -> SpinorMatrix {
    let mut m = [[ZERO; 4]; 4];
    m[0][0] = ONE;
    m[1][1] = ONE;
    m[2][2] = -ONE;
    m[3][3] = -ONE;
    m
}

pub fn mat_mul(a: &SpinorMatrix, b: &SpinorMatrix) -> SpinorMatrix {
    let mut m = [[ZERO; 4]; 4];
    for r in 0..4 {
        for c in 0..4 {
            m[r][c] = (0..4).map(|k| a[r][k] * b[k][c]).sum();
        }
    }
    m
}

pub fn apply(m: &SpinorMatrix, s: &Spinor) -> Spinor {
    let mut out = [ZERO; 4];
    for r in 0..4 {
        out[r] = (0..4).map(|c| m[r][c] * s[c]).sum();
    }
    out
}

fn axpy(y: &mut Spinor, a: Complex64, x: &Spinor) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += a * xi;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinorField {
    pub psi: Vec<Spinor>,
    pub mass: f64,
    pub charge: f64,
}

impl SpinorField {
    /// uniform spin-up positive-energy rest state, normalized to 1
    pub fn rest(lattice: &Lattice, mass: f64, charge: f64) -> Self {
        let mut field = SpinorField {
            psi: vec![[ONE, ZERO, ZERO, ZERO]; lattice.len()],
            mass,
            charge,
        };
        field.normalize(lattice);
        field
    }

    /// gaussian packet carrying momentum `p` in the positive-energy free
    /// spinor u(p) with spin up, normalized to 1
    pub fn wave_packet(
        lattice: &Lattice,
        mass: f64,
        charge: f64,
        width: f64,
        centre: [f64; 3],
        p: [f64; 3],
        constants: &Constants,
    ) -> Self {
        let c = constants.c;
        let mc2 = mass * c * c;
        let p2 = p[0] * p[0] + p[1] * p[1] + p[2] * p[2];
        let energy = (p2 * c * c + mc2 * mc2).sqrt();
        let denom = energy + mc2;
        let lower = if denom > 0.0 {
            [
                Complex64::new(c * p[2] / denom, 0.0),
                Complex64::new(c * p[0] / denom, c * p[1] / denom),
            ]
        } else {
            [ZERO, ZERO]
        };
        let u = [ONE, ZERO, lower[0], lower[1]];
        let w2 = width * width;
        let psi = (0..lattice.len())
            .map(|idx| {
                let x = lattice.position(idx);
                let r = [x[1] - centre[0], x[2] - centre[1], x[3] - centre[2]];
                let r2 = r[0] * r[0] + r[1] * r[1] + r[2] * r[2];
                let phase = (p[0] * r[0] + p[1] * r[1] + p[2] * r[2]) / constants.hbar;
                let amp = Complex64::from_polar((-r2 / (4.0 * w2)).exp(), phase);
                let mut s = u;
                for z in s.iter_mut() {
                    *z *= amp;
                }
                s
            })
            .collect();
        let mut field = SpinorField { psi, mass, charge };
        field.normalize(lattice);
        field
    }

    /// ∂ₖψ at one point by periodic central differences on every lattice,
    /// which keeps H Hermitian
    fn partial(&self, lattice: &Lattice, idx: usize, axis: usize) -> Spinor {
        let mut d = [ZERO; 4];
        for (comp, z) in d.iter_mut().enumerate() {
            let re = lattice.periodic_partial(idx, axis, |p| self.psi[p][comp].re);
            let im = lattice.periodic_partial(idx, axis, |p| self.psi[p][comp].im);
            *z = Complex64::new(re, im);
        }
        d
    }

    /// Hψ at every lattice point
    pub fn hamiltonian(&self, lattice: &Lattice, potential: Option<&PotentialField>, constants: &Constants) -> Vec<Spinor> {
        let c = constants.c;
        let mc2 = self.mass * c * c;
        let alphas = [alpha(0), alpha(1), alpha(2)];
        let kinetic = Complex64::new(0.0, -constants.hbar * c);
        (0..lattice.len())
            .map(|idx| {
                let psi = &self.psi[idx];
                let mut h = [ZERO; 4];
                for axis in lattice.active_spatial_axes() {
                    let d = self.partial(lattice, idx, axis);
                    axpy(&mut h, kinetic, &apply(&alphas[axis - 1], &d));
                }
                // βmc²
                h[0] += mc2 * psi[0];
                h[1] += mc2 * psi[1];
                h[2] -= mc2 * psi[2];
                h[3] -= mc2 * psi[3];
                if let Some(pot) = potential {
                    let q = self.charge;
                    let phi = pot.scalar_potential(lattice, idx, c);
                    axpy(&mut h, Complex64::new(q * phi, 0.0), psi);
                    let a = pot.vector_potential(lattice, idx);
                    for k in 0..3 {
                        if a[k] != 0.0 {
                            axpy(&mut h, Complex64::new(-q * c * a[k], 0.0), &apply(&alphas[k], psi));
                        }
                    }
                }
                h
            })
            .collect()
    }

    /// ∂ψ/∂t = −iHψ/ħ
    fn rate(&self, lattice: &Lattice, potential: Option<&PotentialField>, constants: &Constants) -> Vec<Spinor> {
        let factor = Complex64::new(0.0, -1.0 / constants.hbar);
        let mut h = self.hamiltonian(lattice, potential, constants);
        for s in h.iter_mut() {
            for z in s.iter_mut() {
                *z *= factor;
            }
        }
        h
    }

    fn shifted(&self, k: &[Spinor], h: f64) -> SpinorField {
        let psi = self
            .psi
            .iter()
            .zip(k)
            .map(|(s, d)| {
                let mut out = *s;
                axpy(&mut out, Complex64::new(h, 0.0), d);
                out
            })
            .collect();
        SpinorField { psi, mass: self.mass, charge: self.charge }
    }

    pub fn step_rk4(
        &mut self,
        lattice: &Lattice,
        dt: f64,
        potential: Option<&PotentialField>,
        constants: &Constants,
        policy: NanPolicy,
    ) -> FabricResult<usize> {
        if self.psi.len() != lattice.len() {
            return Err(FabricError::ShapeMismatch { expected: lattice.len(), found: self.psi.len() });
        }
        let k1 = self.rate(lattice, potential, constants);
        let k2 = self.shifted(&k1, 0.5 * dt).rate(lattice, potential, constants);
        let k3 = self.shifted(&k2, 0.5 * dt).rate(lattice, potential, constants);
        let k4 = self.shifted(&k3, dt).rate(lattice, potential, constants);
        let w = dt / 6.0;
        for (idx, s) in self.psi.iter_mut().enumerate() {
            for comp in 0..4 {
                s[comp] += w * (k1[idx][comp] + 2.0 * k2[idx][comp] + 2.0 * k3[idx][comp] + k4[idx][comp]);
            }
        }
        sanitize_complex(&mut self.psi, policy, "spinor")
    }

    /// probability density ψ†ψ at one point
    pub fn density(&self, idx: usize) -> f64 {
        self.psi[idx].iter().map(|z| z.norm_sqr()).sum()
    }

    /// ⟨self|other⟩ = Σ ψ†χ dV
    pub fn inner(&self, other: &[Spinor], lattice: &Lattice) -> Complex64 {
        let sum: Complex64 = self
            .psi
            .iter()
            .zip(other)
            .flat_map(|(a, b)| a.iter().zip(b.iter()).map(|(x, y)| x.conj() * y))
            .sum();
        sum * lattice.cell_volume()
    }

    pub fn norm(&self, lattice: &Lattice) -> f64 {
        (0..self.psi.len()).map(|idx| self.density(idx)).sum::<f64>() * lattice.cell_volume()
    }

    /// rescale to unit norm; a zero field is left untouched
    pub fn normalize(&mut self, lattice: &Lattice) {
        let n = self.norm(lattice);
        if n <= 0.0 || !n.is_finite() {
            log::warn!("spinor normalize: norm is {n}, leaving field unchanged");
            return;
        }
        let s = 1.0 / n.sqrt();
        for spinor in self.psi.iter_mut() {
            for z in spinor.iter_mut() {
                *z *= s;
            }
        }
    }

    /// ⟨H⟩ = Re⟨ψ|Hψ⟩ / ⟨ψ|ψ⟩
    pub fn energy_expectation(&self, lattice: &Lattice, potential: Option<&PotentialField>, constants: &Constants) -> f64 {
        let norm = self.norm(lattice);
        if norm <= 0.0 {
            return 0.0;
        }
        let h = self.hamiltonian(lattice, potential, constants);
        self.inner(&h, lattice).re / norm
    }

    /// rest-mass density m ψ†ψ
    pub fn mass_density(&self) -> Vec<f64> {
        (0..self.psi.len()).map(|idx| self.mass * self.density(idx)).collect()
    }
}
