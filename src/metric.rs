//! metric tensors g_{μν} and the analytic spacetimes the fabric can sit in
//!
//! coordinates are (x⁰, x¹, x², x³) with x⁰ = ct, signature (-,+,+,+).

use nalgebra::{Matrix4, SymmetricEigen};
use serde::{Deserialize, Serialize};

use crate::curvature::{numeric_christoffel, Christoffel};
use crate::error::{FabricError, FabricResult};
use crate::lattice::Lattice;

/// step used by the default finite-difference connection
pub const DERIVATIVE_STEP: f64 = 1e-5;

const SYMMETRY_TOLERANCE: f64 = 1e-12;
const SIGNATURE_TOLERANCE: f64 = 1e-12;

/// a 4x4 symmetric metric tensor g_{μν} at a spacetime point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub g: [[f64; 4]; 4],
}

impl Default for Metric {
    fn default() -> Self {
        Self::minkowski()
    }
}

impl Metric {
    /// minkowski metric (flat spacetime)
    pub fn minkowski() -> Self {
        Self::diagonal([-1.0, 1.0, 1.0, 1.0])
    }

    pub fn diagonal(d: [f64; 4]) -> Self {
        let mut g = [[0.0; 4]; 4];
        for mu in 0..4 {
            g[mu][mu] = d[mu];
        }
        Metric { g }
    }

    /// validated constructor: finite and symmetric
    pub fn try_new(g: [[f64; 4]; 4]) -> FabricResult<Self> {
        for mu in 0..4 {
            for nu in 0..4 {
                if !g[mu][nu].is_finite() {
                    return Err(FabricError::InvalidMetric(format!("g[{mu}][{nu}] is not finite")));
                }
                if (g[mu][nu] - g[nu][mu]).abs() > SYMMETRY_TOLERANCE {
                    return Err(FabricError::InvalidMetric(format!(
                        "g[{mu}][{nu}] = {} differs from g[{nu}][{mu}] = {}",
                        g[mu][nu], g[nu][mu]
                    )));
                }
            }
        }
        Ok(Metric { g })
    }

    pub fn to_matrix(&self) -> Matrix4<f64> {
        Matrix4::from_fn(|r, c| self.g[r][c])
    }

    pub fn from_matrix(m: &Matrix4<f64>) -> Self {
        let mut g = [[0.0; 4]; 4];
        for mu in 0..4 {
            for nu in 0..4 {
                g[mu][nu] = m[(mu, nu)];
            }
        }
        Metric { g }
    }

    pub fn determinant(&self) -> f64 {
        self.to_matrix().determinant()
    }

    /// g^{μν}, or None when the metric is degenerate
    pub fn inverse(&self) -> Option<Metric> {
        let inv = self.to_matrix().try_inverse()?;
        let out = Metric::from_matrix(&inv);
        if out.g.iter().flatten().all(|v| v.is_finite()) {
            Some(out)
        } else {
            None
        }
    }

    /// signs of the eigenvalues in ascending order
    pub fn signature(&self) -> [i8; 4] {
        let eigen = SymmetricEigen::new(self.to_matrix());
        let mut values: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
        values.sort_by(|a, b| a.total_cmp(b));
        let mut sig = [0i8; 4];
        for (s, v) in sig.iter_mut().zip(values) {
            *s = if v > SIGNATURE_TOLERANCE {
                1
            } else if v < -SIGNATURE_TOLERANCE {
                -1
            } else {
                0
            };
        }
        sig
    }

    pub fn is_lorentzian(&self) -> bool {
        self.signature() == [-1, 1, 1, 1]
    }

    /// invariant volume element √(-g)
    pub fn volume_element(&self) -> Option<f64> {
        let det = self.determinant();
        if det >= 0.0 {
            None
        } else {
            Some((-det).sqrt())
        }
    }

    /// g_{μν} a^μ b^ν
    pub fn dot(&self, a: &[f64; 4], b: &[f64; 4]) -> f64 {
        let mut sum = 0.0;
        for mu in 0..4 {
            for nu in 0..4 {
                sum += self.g[mu][nu] * a[mu] * b[nu];
            }
        }
        sum
    }

    /// contract the second index: g_{μν} v^ν. applied to an inverse metric
    /// this raises an index instead.
    pub fn apply(&self, v: &[f64; 4]) -> [f64; 4] {
        let mut out = [0.0; 4];
        for mu in 0..4 {
            for nu in 0..4 {
                out[mu] += self.g[mu][nu] * v[nu];
            }
        }
        out
    }

    pub fn lower(&self, v: &[f64; 4]) -> [f64; 4] {
        self.apply(v)
    }

    pub fn raise(&self, v: &[f64; 4]) -> Option<[f64; 4]> {
        self.inverse().map(|inv| inv.apply(v))
    }

    /// g_{μν} + h_{μν}
    pub fn perturbed(&self, h: &[[f64; 4]; 4]) -> Metric {
        let mut g = self.g;
        for mu in 0..4 {
            for nu in 0..4 {
                g[mu][nu] += h[mu][nu];
            }
        }
        Metric { g }
    }

    /// weak-field perturbation for a Newtonian potential Φ:
    /// h = diag(-2Φ/c², -2Φ/c², -2Φ/c², -2Φ/c²)
    pub fn weak_field_perturbation(phi: f64, c: f64) -> [[f64; 4]; 4] {
        let eps = 2.0 * phi / (c * c);
        let mut h = [[0.0; 4]; 4];
        for mu in 0..4 {
            h[mu][mu] = -eps;
        }
        h
    }

    /// schwarzschild metric in spherical (ct, r, θ, φ)
    pub fn schwarzschild_spherical(r: f64, theta: f64, rs: f64) -> Self {
        // caller guards r <= rs; f is floored to keep g_rr finite
        let f = (1.0 - rs / r).max(1e-16);
        let s = theta.sin();
        Self::diagonal([-f, 1.0 / f, r * r, r * r * s * s])
    }
}

/// anything that can produce g_{μν}(x) at an arbitrary point
pub trait MetricModel {
    fn metric_at(&self, x: &[f64; 4]) -> Metric;

    /// Γ^λ_{μν}(x); finite differences of `metric_at` unless overridden
    fn christoffel_at(&self, x: &[f64; 4]) -> Christoffel {
        numeric_christoffel(self, x, DERIVATIVE_STEP)
    }
}

/// flat spacetime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Minkowski;

impl MetricModel for Minkowski {
    fn metric_at(&self, _x: &[f64; 4]) -> Metric {
        Metric::minkowski()
    }

    fn christoffel_at(&self, _x: &[f64; 4]) -> Christoffel {
        [[[0.0; 4]; 4]; 4]
    }
}

/// schwarzschild spacetime in (ct, r, θ, φ)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchwarzschildSpherical {
    /// schwarzschild radius 2GM/c²
    pub rs: f64,
}

impl MetricModel for SchwarzschildSpherical {
    fn metric_at(&self, x: &[f64; 4]) -> Metric {
        Metric::schwarzschild_spherical(x[1], x[2], self.rs)
    }

    fn christoffel_at(&self, x: &[f64; 4]) -> Christoffel {
        christoffel_symbols_spherical(x[1], x[2], self.rs)
    }
}

/// analytic christoffel symbols for schwarzschild in spherical coordinates
pub fn christoffel_symbols_spherical(r: f64, theta: f64, rs: f64) -> Christoffel {
    let mut gamma = [[[0.0; 4]; 4]; 4];
    let eps = 1e-16;
    if r <= 0.0 {
        return gamma;
    }
    let f = 1.0 - rs / r;
    let f_prime = rs / (r * r);
    let sin_theta = theta.sin();
    let cos_theta = theta.cos();

    if f.abs() > eps {
        gamma[0][0][1] = f_prime / (2.0 * f); // Γ^t_{tr}
        gamma[0][1][0] = gamma[0][0][1];
        gamma[1][0][0] = f * f_prime / 2.0; // Γ^r_{tt}
        gamma[1][1][1] = -f_prime / (2.0 * f); // Γ^r_{rr}
    }
    gamma[1][2][2] = -r * f; // Γ^r_{θθ}
    gamma[1][3][3] = -r * f * sin_theta * sin_theta; // Γ^r_{φφ}

    gamma[2][1][2] = 1.0 / r; // Γ^θ_{rθ}
    gamma[2][2][1] = gamma[2][1][2];
    gamma[2][3][3] = -sin_theta * cos_theta; // Γ^θ_{φφ}

    gamma[3][1][3] = 1.0 / r; // Γ^φ_{rφ}
    gamma[3][3][1] = gamma[3][1][3];
    // cotθ, zero at the poles
    gamma[3][2][3] = if sin_theta.abs() < eps { 0.0 } else { cos_theta / sin_theta };
    gamma[3][3][2] = gamma[3][2][3];
    gamma
}

/// schwarzschild spacetime in isotropic cartesian coordinates, centred at
/// `centre`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchwarzschildIsotropic {
    pub rs: f64,
    pub centre: [f64; 3],
}

impl MetricModel for SchwarzschildIsotropic {
    fn metric_at(&self, x: &[f64; 4]) -> Metric {
        let dx = x[1] - self.centre[0];
        let dy = x[2] - self.centre[1];
        let dz = x[3] - self.centre[2];
        let rho = (dx * dx + dy * dy + dz * dz).sqrt().max(1e-12);
        let q = self.rs / (4.0 * rho);
        let lapse = (1.0 - q) / (1.0 + q);
        let psi4 = (1.0 + q).powi(4);
        Metric::diagonal([-lapse * lapse, psi4, psi4, psi4])
    }
}

/// weak field of a softened point mass, Φ = -GM / √(r² + ε²)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeakPointMass {
    /// G·M
    pub gm: f64,
    pub centre: [f64; 3],
    pub softening: f64,
    pub c: f64,
}

impl WeakPointMass {
    pub fn potential(&self, x: &[f64; 4]) -> f64 {
        let dx = x[1] - self.centre[0];
        let dy = x[2] - self.centre[1];
        let dz = x[3] - self.centre[2];
        let r2 = dx * dx + dy * dy + dz * dz + self.softening * self.softening;
        -self.gm / r2.sqrt().max(1e-12)
    }
}

impl MetricModel for WeakPointMass {
    fn metric_at(&self, x: &[f64; 4]) -> Metric {
        Metric::minkowski().perturbed(&Metric::weak_field_perturbation(self.potential(x), self.c))
    }
}

/// spatially flat FLRW with power-law scale factor a = (x⁰ / t0)^exponent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerLawFlrw {
    pub t0: f64,
    pub exponent: f64,
}

impl PowerLawFlrw {
    pub fn scale_factor(&self, t: f64) -> f64 {
        (t / self.t0).max(1e-12).powf(self.exponent)
    }
}

impl MetricModel for PowerLawFlrw {
    fn metric_at(&self, x: &[f64; 4]) -> Metric {
        let a = self.scale_factor(x[0]);
        Metric::diagonal([-1.0, a * a, a * a, a * a])
    }
}

/// utility: select a metric model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricKind {
    Minkowski,
    SchwarzschildSpherical(SchwarzschildSpherical),
    SchwarzschildIsotropic(SchwarzschildIsotropic),
    WeakPointMass(WeakPointMass),
    PowerLawFlrw(PowerLawFlrw),
}

impl Default for MetricKind {
    fn default() -> Self {
        MetricKind::Minkowski
    }
}

fn check(ok: bool, what: &str) -> FabricResult<()> {
    if ok {
        Ok(())
    } else {
        Err(FabricError::Config(format!("background metric: {what}")))
    }
}

fn finite3(v: &[f64; 3]) -> bool {
    v.iter().all(|x| x.is_finite())
}

impl MetricKind {
    /// reject parameters that would sample a non-finite or degenerate metric
    pub fn validate(&self) -> FabricResult<()> {
        match self {
            MetricKind::Minkowski => Ok(()),
            MetricKind::SchwarzschildSpherical(m) => check(m.rs.is_finite() && m.rs >= 0.0, "rs must be finite and >= 0"),
            MetricKind::SchwarzschildIsotropic(m) => {
                check(m.rs.is_finite() && m.rs >= 0.0, "rs must be finite and >= 0")?;
                check(finite3(&m.centre), "centre must be finite")
            }
            MetricKind::WeakPointMass(m) => {
                check(m.gm.is_finite() && finite3(&m.centre), "gm and centre must be finite")?;
                check(m.softening.is_finite() && m.softening >= 0.0, "softening must be finite and >= 0")?;
                check(m.c.is_finite() && m.c > 0.0, "c must be finite and > 0")
            }
            MetricKind::PowerLawFlrw(m) => {
                check(m.t0.is_finite() && m.t0 > 0.0, "t0 must be finite and > 0")?;
                check(m.exponent.is_finite(), "exponent must be finite")
            }
        }
    }
}

impl MetricModel for MetricKind {
    fn metric_at(&self, x: &[f64; 4]) -> Metric {
        match self {
            MetricKind::Minkowski => Minkowski.metric_at(x),
            MetricKind::SchwarzschildSpherical(m) => m.metric_at(x),
            MetricKind::SchwarzschildIsotropic(m) => m.metric_at(x),
            MetricKind::WeakPointMass(m) => m.metric_at(x),
            MetricKind::PowerLawFlrw(m) => m.metric_at(x),
        }
    }

    fn christoffel_at(&self, x: &[f64; 4]) -> Christoffel {
        match self {
            MetricKind::Minkowski => Minkowski.christoffel_at(x),
            MetricKind::SchwarzschildSpherical(m) => m.christoffel_at(x),
            MetricKind::SchwarzschildIsotropic(m) => m.christoffel_at(x),
            MetricKind::WeakPointMass(m) => m.christoffel_at(x),
            MetricKind::PowerLawFlrw(m) => m.christoffel_at(x),
        }
    }
}

/// sample a model at every lattice point
pub fn metric_field<M: MetricModel + ?Sized>(lattice: &Lattice, model: &M) -> Vec<Metric> {
    (0..lattice.len()).map(|idx| model.metric_at(&lattice.position(idx))).collect()
}
