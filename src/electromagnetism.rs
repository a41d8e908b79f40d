//! electromagnetic field tensor F_{μν} and a four-potential on the lattice
//!
//! A_μ is covariant with A_0 = −φ/c, so that E_i = c F_{i0} and
//! B_z = F_{xy} (cyclic).

use serde::{Deserialize, Serialize};

use crate::curvature::Tensor2;
use crate::error::{FabricError, FabricResult};
use crate::lattice::Lattice;
use crate::metric::Metric;
use crate::relativity::{FourForce, FourVector, FourVelocity};
use crate::sanitize::{sanitize_slice, NanPolicy};

/// antisymmetric F_{μν}
pub type FieldTensor = Tensor2;

/// F_{μν} = ∂_μ A_ν − ∂_ν A_μ, with `da[μ][ν]` = ∂_μ A_ν
pub fn field_tensor_from_derivatives(da: &Tensor2) -> FieldTensor {
    let mut f = [[0.0; 4]; 4];
    for mu in 0..4 {
        for nu in (mu + 1)..4 {
            let v = da[mu][nu] - da[nu][mu];
            f[mu][nu] = v;
            f[nu][mu] = -v;
        }
    }
    f
}

pub fn electric(f: &FieldTensor, c: f64) -> [f64; 3] {
    [c * f[1][0], c * f[2][0], c * f[3][0]]
}

pub fn magnetic(f: &FieldTensor) -> [f64; 3] {
    [f[2][3], f[3][1], f[1][2]]
}

/// build F_{μν} from E and B
pub fn from_fields(e: [f64; 3], b: [f64; 3], c: f64) -> FieldTensor {
    let mut f = [[0.0; 4]; 4];
    for i in 0..3 {
        f[i + 1][0] = e[i] / c;
        f[0][i + 1] = -e[i] / c;
    }
    f[2][3] = b[0];
    f[3][2] = -b[0];
    f[3][1] = b[1];
    f[1][3] = -b[1];
    f[1][2] = b[2];
    f[2][1] = -b[2];
    f
}

/// F^{μν} = g^{μα} g^{νβ} F_{αβ}
pub fn raise_both(f: &FieldTensor, g_inv: &Metric) -> FieldTensor {
    let mut half = [[0.0; 4]; 4];
    for mu in 0..4 {
        for b in 0..4 {
            half[mu][b] = (0..4).map(|a| g_inv.g[mu][a] * f[a][b]).sum();
        }
    }
    let mut up = [[0.0; 4]; 4];
    for mu in 0..4 {
        for nu in 0..4 {
            up[mu][nu] = (0..4).map(|b| g_inv.g[nu][b] * half[mu][b]).sum();
        }
    }
    up
}

/// F^μ_ν = g^{μα} F_{αν}, the form entering the Lorentz force
pub fn mixed(f: &FieldTensor, g_inv: &Metric) -> FieldTensor {
    let mut m = [[0.0; 4]; 4];
    for mu in 0..4 {
        for nu in 0..4 {
            m[mu][nu] = (0..4).map(|a| g_inv.g[mu][a] * f[a][nu]).sum();
        }
    }
    m
}

/// F_{μν} F^{μν}; equals 2(B² − E²/c²) in flat space
pub fn invariant(f: &FieldTensor, g_inv: &Metric) -> f64 {
    let up = raise_both(f, g_inv);
    let mut s = 0.0;
    for mu in 0..4 {
        for nu in 0..4 {
            s += f[mu][nu] * up[mu][nu];
        }
    }
    s
}

/// F_{μν} *F^{μν} = −4 E·B / c in a locally flat frame
pub fn dual_invariant(f: &FieldTensor, c: f64) -> f64 {
    let e = electric(f, c);
    let b = magnetic(f);
    -4.0 * (e[0] * b[0] + e[1] * b[1] + e[2] * b[2]) / c
}

/// T^{μν} = F^{μα} F^ν_α − ¼ g^{μν} F_{αβ} F^{αβ}, with μ₀ = 1
pub fn stress_energy(f: &FieldTensor, g: &Metric, g_inv: &Metric) -> Tensor2 {
    let up = raise_both(f, g_inv);
    // F^ν_α = F^{νβ} g_{βα}
    let mut up_down = [[0.0; 4]; 4];
    for nu in 0..4 {
        for a in 0..4 {
            up_down[nu][a] = (0..4).map(|b| up[nu][b] * g.g[b][a]).sum();
        }
    }
    let inv = invariant(f, g_inv);
    let mut t = [[0.0; 4]; 4];
    for mu in 0..4 {
        for nu in 0..4 {
            let mut s = 0.0;
            for a in 0..4 {
                s += up[mu][a] * up_down[nu][a];
            }
            t[mu][nu] = s - 0.25 * g_inv.g[mu][nu] * inv;
        }
    }
    t
}

/// u = ½(E²/c² + B²)
pub fn energy_density(e: [f64; 3], b: [f64; 3], c: f64) -> f64 {
    let e2 = e[0] * e[0] + e[1] * e[1] + e[2] * e[2];
    let b2 = b[0] * b[0] + b[1] * b[1] + b[2] * b[2];
    0.5 * (e2 / (c * c) + b2)
}

/// four-force q F^μ_ν u^ν on a charge with four-velocity `u`
pub fn lorentz_force(f_mixed: &FieldTensor, u: &FourVelocity, charge: f64) -> FourForce {
    let ua = u.0.as_array();
    let mut out = [0.0; 4];
    for mu in 0..4 {
        out[mu] = charge * (0..4).map(|nu| f_mixed[mu][nu] * ua[nu]).sum::<f64>();
    }
    FourForce(FourVector::from_array(out))
}

/// four-potential on a spatial lattice: a radiation part evolved by the
/// wave equation plus a constant uniform background
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PotentialField {
    /// covariant A_μ of the radiation part
    pub a: Vec<[f64; 4]>,
    /// ∂A_μ/∂t
    pub a_dot: Vec<[f64; 4]>,
    pub uniform_e: [f64; 3],
    pub uniform_b: [f64; 3],
    /// point about which the uniform-field gauge potentials vanish
    pub centre: [f64; 3],
}

impl PotentialField {
    pub fn zeros(lattice: &Lattice) -> Self {
        let n = lattice.len();
        PotentialField {
            a: vec![[0.0; 4]; n],
            a_dot: vec![[0.0; 4]; n],
            uniform_e: [0.0; 3],
            uniform_b: [0.0; 3],
            centre: lattice_centre(lattice),
        }
    }

    /// uniform E and B, gauge φ = −E·x, A = ½ B × x about the lattice centre
    pub fn uniform(lattice: &Lattice, e: [f64; 3], b: [f64; 3]) -> Self {
        let mut field = Self::zeros(lattice);
        field.uniform_e = e;
        field.uniform_b = b;
        field
    }

    /// add a gaussian pulse to one covariant component of the radiation part
    pub fn add_pulse(&mut self, lattice: &Lattice, component: usize, amplitude: f64, width: f64, centre: [f64; 3]) {
        let w2 = width * width;
        for (idx, a) in self.a.iter_mut().enumerate() {
            let x = lattice.position(idx);
            let r2: f64 = (0..3).map(|i| (x[i + 1] - centre[i]).powi(2)).sum();
            a[component % 4] += amplitude * (-r2 / (2.0 * w2)).exp();
        }
    }

    pub fn has_radiation(&self) -> bool {
        self.a.iter().chain(self.a_dot.iter()).flatten().any(|v| *v != 0.0)
    }

    /// electrostatic potential φ at a lattice point
    pub fn scalar_potential(&self, lattice: &Lattice, idx: usize, c: f64) -> f64 {
        let x = lattice.position(idx);
        let e = self.uniform_e;
        let bg = -(0..3).map(|i| e[i] * (x[i + 1] - self.centre[i])).sum::<f64>();
        bg - c * self.a[idx][0]
    }

    /// vector potential A⃗ at a lattice point
    pub fn vector_potential(&self, lattice: &Lattice, idx: usize) -> [f64; 3] {
        let x = lattice.position(idx);
        let r = [x[1] - self.centre[0], x[2] - self.centre[1], x[3] - self.centre[2]];
        let b = self.uniform_b;
        let bxr = [b[1] * r[2] - b[2] * r[1], b[2] * r[0] - b[0] * r[2], b[0] * r[1] - b[1] * r[0]];
        let a = self.a[idx];
        [0.5 * bxr[0] + a[1], 0.5 * bxr[1] + a[2], 0.5 * bxr[2] + a[3]]
    }

    /// F_{μν} at every lattice point
    pub fn field_tensors(&self, lattice: &Lattice, c: f64) -> FabricResult<Vec<FieldTensor>> {
        if self.a.len() != lattice.len() {
            return Err(FabricError::ShapeMismatch { expected: lattice.len(), found: self.a.len() });
        }
        let background = from_fields(self.uniform_e, self.uniform_b, c);
        Ok((0..lattice.len())
            .map(|idx| {
                let mut da = [[0.0; 4]; 4];
                for nu in 0..4 {
                    // x⁰ = ct
                    da[0][nu] = self.a_dot[idx][nu] / c;
                }
                for axis in lattice.active_spatial_axes() {
                    for nu in 0..4 {
                        da[axis][nu] = lattice.partial(idx, axis, |p| self.a[p][nu]);
                    }
                }
                let mut f = field_tensor_from_derivatives(&da);
                for mu in 0..4 {
                    for nu in 0..4 {
                        f[mu][nu] += background[mu][nu];
                    }
                }
                f
            })
            .collect())
    }

    /// energy density ½(E²/c² + B²) at every point
    pub fn energy_density(&self, lattice: &Lattice, c: f64) -> FabricResult<Vec<f64>> {
        Ok(self
            .field_tensors(lattice, c)?
            .iter()
            .map(|f| energy_density(electric(f, c), magnetic(f), c))
            .collect())
    }

    /// one leapfrog step of □A_μ = 0 (Lorenz gauge, no sources); returns
    /// how many values were clamped
    pub fn step(&mut self, lattice: &Lattice, dt: f64, c: f64, policy: NanPolicy) -> FabricResult<usize> {
        let c2 = c * c;
        self.kick(lattice, 0.5 * dt * c2);
        for (a, a_dot) in self.a.iter_mut().zip(self.a_dot.iter()) {
            for mu in 0..4 {
                a[mu] += dt * a_dot[mu];
            }
        }
        self.kick(lattice, 0.5 * dt * c2);
        let clamped = sanitize_slice(self.a.as_flattened_mut(), policy, "four-potential")?
            + sanitize_slice(self.a_dot.as_flattened_mut(), policy, "four-potential rate")?;
        Ok(clamped)
    }

    fn kick(&mut self, lattice: &Lattice, factor: f64) {
        let lap: Vec<[f64; 4]> = (0..lattice.len())
            .map(|idx| {
                let mut l = [0.0; 4];
                for (mu, v) in l.iter_mut().enumerate() {
                    *v = lattice.laplacian(idx, |p| self.a[p][mu]);
                }
                l
            })
            .collect();
        for (a_dot, l) in self.a_dot.iter_mut().zip(lap) {
            for mu in 0..4 {
                a_dot[mu] += factor * l[mu];
            }
        }
    }
}

/// geometric centre of the spatial extent
pub fn lattice_centre(lattice: &Lattice) -> [f64; 3] {
    let mut c = [0.0; 3];
    for i in 0..3 {
        let axis = i + 1;
        c[i] = lattice.origin[axis] + 0.5 * (lattice.shape[axis] as f64 - 1.0) * lattice.spacing[axis];
    }
    c
}
