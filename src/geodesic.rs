//! charged test particles moving through a curved, electromagnetically
//! filled background
//!
//! du^μ/dτ = −Γ^μ_{νλ} u^ν u^λ + (q/m) F^μ_ν u^ν, dx^μ/dτ = u^μ

use serde::{Deserialize, Serialize};

use crate::curvature::{Christoffel, CurvatureField};
use crate::electromagnetism::{lorentz_force, mixed, FieldTensor};
use crate::error::{FabricError, FabricResult};
use crate::lattice::Lattice;
use crate::metric::{Metric, MetricKind, MetricModel};
use crate::relativity::{FourVector, FourVelocity};
use crate::sanitize::NanPolicy;

/// geometry and field a particle moves through
pub trait Background {
    fn metric(&self, x: &[f64; 4]) -> Metric;
    fn christoffel(&self, x: &[f64; 4]) -> Christoffel;
    /// F_{μν}, None where there is no field
    fn field_strength(&self, x: &[f64; 4]) -> Option<FieldTensor>;

    /// false when `x` lies outside the region the background describes
    fn contains(&self, _x: &[f64; 4]) -> bool {
        true
    }
}

/// closed-form metric plus an optional uniform field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticBackground {
    pub model: MetricKind,
    pub field: Option<FieldTensor>,
}

impl Background for AnalyticBackground {
    fn metric(&self, x: &[f64; 4]) -> Metric {
        self.model.metric_at(x)
    }

    fn christoffel(&self, x: &[f64; 4]) -> Christoffel {
        self.model.christoffel_at(x)
    }

    fn field_strength(&self, _x: &[f64; 4]) -> Option<FieldTensor> {
        self.field
    }
}

/// lattice-sampled geometry and field, looked up at the nearest point
pub struct LatticeBackground<'a> {
    pub lattice: &'a Lattice,
    pub curvature: &'a CurvatureField,
    pub fields: Option<&'a [FieldTensor]>,
}

impl Background for LatticeBackground<'_> {
    fn metric(&self, x: &[f64; 4]) -> Metric {
        match self.lattice.nearest(x) {
            Some(idx) => self.curvature.metrics[idx],
            None => Metric::minkowski(),
        }
    }

    fn christoffel(&self, x: &[f64; 4]) -> Christoffel {
        match self.lattice.nearest(x) {
            Some(idx) => self.curvature.christoffel[idx],
            None => [[[0.0; 4]; 4]; 4],
        }
    }

    fn field_strength(&self, x: &[f64; 4]) -> Option<FieldTensor> {
        let fields = self.fields?;
        self.lattice.nearest(x).map(|idx| fields[idx])
    }

    fn contains(&self, x: &[f64; 4]) -> bool {
        self.lattice.contains(x)
    }
}

/// position and four-velocity of a test particle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleState {
    pub x: FourVector,
    pub u: FourVelocity,
}

impl ParticleState {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.u.0.is_finite()
    }
}

/// du^μ/dτ at the state's position
pub fn charged_acceleration<B: Background + ?Sized>(background: &B, state: &ParticleState, q_over_m: f64) -> [f64; 4] {
    let x = state.x.as_array();
    let u = state.u.0.as_array();
    let gamma = background.christoffel(&x);
    let mut acc = [0.0; 4];
    for mu in 0..4 {
        let mut sum = 0.0;
        for nu in 0..4 {
            for lam in 0..4 {
                sum += gamma[mu][nu][lam] * u[nu] * u[lam];
            }
        }
        acc[mu] = -sum;
    }
    if q_over_m != 0.0 {
        if let Some(f) = background.field_strength(&x) {
            if let Some(g_inv) = background.metric(&x).inverse() {
                // force per unit rest mass
                let lorentz = lorentz_force(&mixed(&f, &g_inv), &state.u, q_over_m).0.as_array();
                for (a, l) in acc.iter_mut().zip(lorentz) {
                    *a += l;
                }
            }
        }
    }
    acc
}

fn derivative<B: Background + ?Sized>(background: &B, state: &ParticleState, q_over_m: f64) -> ([f64; 4], [f64; 4]) {
    (state.u.0.as_array(), charged_acceleration(background, state, q_over_m))
}

fn advance(state: &ParticleState, dx: &[f64; 4], du: &[f64; 4], h: f64) -> ParticleState {
    let x = state.x.as_array();
    let u = state.u.0.as_array();
    let mut nx = [0.0; 4];
    let mut nu = [0.0; 4];
    for mu in 0..4 {
        nx[mu] = x[mu] + h * dx[mu];
        nu[mu] = u[mu] + h * du[mu];
    }
    ParticleState {
        x: FourVector::from_array(nx),
        u: FourVelocity(FourVector::from_array(nu)),
    }
}

/// result of one integration step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeodesicStep {
    pub state: ParticleState,
    /// the step produced non-finite values and the previous state was kept
    pub clamped: bool,
}

/// one fourth-order Runge–Kutta step in proper time `dtau`, followed by
/// renormalisation to g_{μν}u^μu^ν = −c² while the velocity is timelike
pub fn rk4_step<B: Background + ?Sized>(
    background: &B,
    state: &ParticleState,
    q_over_m: f64,
    dtau: f64,
    c: f64,
    policy: NanPolicy,
) -> FabricResult<GeodesicStep> {
    let (k1x, k1u) = derivative(background, state, q_over_m);
    let s2 = advance(state, &k1x, &k1u, 0.5 * dtau);
    let (k2x, k2u) = derivative(background, &s2, q_over_m);
    let s3 = advance(state, &k2x, &k2u, 0.5 * dtau);
    let (k3x, k3u) = derivative(background, &s3, q_over_m);
    let s4 = advance(state, &k3x, &k3u, dtau);
    let (k4x, k4u) = derivative(background, &s4, q_over_m);

    let mut dx = [0.0; 4];
    let mut du = [0.0; 4];
    for mu in 0..4 {
        dx[mu] = (k1x[mu] + 2.0 * k2x[mu] + 2.0 * k3x[mu] + k4x[mu]) / 6.0;
        du[mu] = (k1u[mu] + 2.0 * k2u[mu] + 2.0 * k3u[mu] + k4u[mu]) / 6.0;
    }
    let mut next = advance(state, &dx, &du, dtau);

    if next.is_finite() {
        let g = background.metric(&next.x.as_array());
        let norm = next.u.0.interval2_metric(&g);
        if norm < -1e-12 * c * c {
            next.u = FourVelocity(next.u.0.scale((-c * c / norm).sqrt()));
        } else {
            log::debug!("geodesic: u = {:?} is not timelike (norm {norm:.3e}), skipping renormalisation", next.u.0);
        }
    }

    if !next.is_finite() {
        return match policy {
            NanPolicy::Reject => {
                log::error!("geodesic: non-finite state after step from {state:?}");
                Err(FabricError::NonFinite { context: "geodesic step".to_string(), count: 1 })
            }
            NanPolicy::Clamp => {
                log::warn!("geodesic: non-finite state, keeping previous {state:?}");
                Ok(GeodesicStep { state: *state, clamped: true })
            }
        };
    }
    Ok(GeodesicStep { state: next, clamped: false })
}

/// integrate `steps` proper-time steps, returning the trajectory including
/// the initial state
pub fn integrate<B: Background + ?Sized>(
    background: &B,
    state: &ParticleState,
    q_over_m: f64,
    dtau: f64,
    steps: usize,
    c: f64,
    policy: NanPolicy,
) -> FabricResult<Vec<ParticleState>> {
    let mut out = Vec::with_capacity(steps + 1);
    out.push(*state);
    let mut current = *state;
    for _ in 0..steps {
        current = rk4_step(background, &current, q_over_m, dtau, c, policy)?.state;
        out.push(current);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::electromagnetism::from_fields;
    use crate::lattice::Boundary;
    use crate::metric::{metric_field, SchwarzschildSpherical};

    fn flat(field: Option<FieldTensor>) -> AnalyticBackground {
        AnalyticBackground { model: MetricKind::Minkowski, field }
    }

    #[test]
    fn free_particle_moves_in_a_straight_line() {
        let c = 1.0;
        let u = FourVelocity::from_3velocity(0.3, -0.2, 0.1, c);
        let start = ParticleState { x: FourVector::new(0.0, 1.0, 2.0, 3.0), u };
        let path = integrate(&flat(None), &start, 0.0, 0.1, 50, c, NanPolicy::Reject).unwrap();
        let end = path.last().unwrap();
        let expected = start.x + u.0.scale(5.0);
        assert!((end.x - expected).spatial_norm() < 1e-9);
        assert!((end.x.t - expected.t).abs() < 1e-9);
        assert!((end.u.0 - u.0).spatial_norm() < 1e-12);
    }

    #[test]
    fn uniform_magnetic_field_gyrates() {
        let c = 1.0;
        let b = 1.0;
        let bg = flat(Some(from_fields([0.0; 3], [0.0, 0.0, b], c)));
        let u = FourVelocity::from_3velocity(0.5, 0.0, 0.0, c);
        let start = ParticleState { x: FourVector::new(0.0, 0.0, 0.0, 0.0), u };
        let period = 2.0 * std::f64::consts::PI / b;
        let steps = 1000;
        let path = integrate(&bg, &start, 1.0, period / steps as f64, steps, c, NanPolicy::Reject).unwrap();
        let speed0 = u.0.spatial_norm();
        for s in &path {
            assert!((s.u.0.spatial_norm() - speed0).abs() < 1e-9);
            assert!((s.u.norm2() + 1.0).abs() < 1e-9);
        }
        let end = path.last().unwrap();
        assert!((end.x - start.x).spatial_norm() < 1e-6);
        // radius u⊥/(qB/m)
        let max_y = path.iter().fold(0.0_f64, |m, s| m.max(s.x.y.abs()));
        assert!((max_y - 2.0 * speed0 / b).abs() < 1e-3);
    }

    #[test]
    fn electric_field_accelerates_charge() {
        let c = 1.0;
        let bg = flat(Some(from_fields([0.5, 0.0, 0.0], [0.0; 3], c)));
        let start = ParticleState { x: FourVector::default(), u: FourVelocity::rest(c) };
        let step = rk4_step(&bg, &start, 1.0, 0.1, c, NanPolicy::Reject).unwrap();
        assert!(step.state.u.0.x > 0.0);
        assert!(!step.clamped);
        let neg = rk4_step(&bg, &start, -1.0, 0.1, c, NanPolicy::Reject).unwrap();
        assert!(neg.state.u.0.x < 0.0);
    }

    #[test]
    fn schwarzschild_circular_orbit_keeps_radius() {
        let m = 1.0;
        let r = 20.0;
        let bg = AnalyticBackground {
            model: MetricKind::SchwarzschildSpherical(SchwarzschildSpherical { rs: 2.0 * m }),
            field: None,
        };
        let k = (1.0 - 3.0 * m / r).sqrt();
        let ut = 1.0 / k;
        let uphi = (m / (r * r * r)).sqrt() / k;
        let start = ParticleState {
            x: FourVector::new(0.0, r, std::f64::consts::FRAC_PI_2, 0.0),
            u: FourVelocity(FourVector::new(ut, 0.0, 0.0, uphi)),
        };
        let path = integrate(&bg, &start, 0.0, 0.5, 1000, 1.0, NanPolicy::Reject).unwrap();
        for s in &path {
            assert!((s.x.x - r).abs() < 1e-3, "r drifted to {}", s.x.x);
        }
        assert!(path.last().unwrap().x.z > 5.0);
    }

    struct Poisoned;

    impl Background for Poisoned {
        fn metric(&self, _x: &[f64; 4]) -> Metric {
            Metric::minkowski()
        }
        fn christoffel(&self, _x: &[f64; 4]) -> Christoffel {
            [[[f64::NAN; 4]; 4]; 4]
        }
        fn field_strength(&self, _x: &[f64; 4]) -> Option<FieldTensor> {
            None
        }
    }

    #[test]
    fn non_finite_step_follows_policy() {
        let start = ParticleState { x: FourVector::default(), u: FourVelocity::rest(1.0) };
        let kept = rk4_step(&Poisoned, &start, 0.0, 0.1, 1.0, NanPolicy::Clamp).unwrap();
        assert!(kept.clamped);
        assert_eq!(kept.state, start);
        assert!(rk4_step(&Poisoned, &start, 0.0, 0.1, 1.0, NanPolicy::Reject).is_err());
    }

    #[test]
    fn lattice_background_samples_nearest_point() {
        let lat = Lattice::spatial([4, 4, 4], 1.0, [0.0; 3], Boundary::OneSided).unwrap();
        let curvature = CurvatureField::compute(&lat, metric_field(&lat, &MetricKind::Minkowski), NanPolicy::Reject).unwrap();
        let mut fields = vec![[[0.0; 4]; 4]; lat.len()];
        let idx = lat.index(0, 1, 2, 3);
        fields[idx] = from_fields([1.0, 0.0, 0.0], [0.0; 3], 1.0);
        let bg = LatticeBackground { lattice: &lat, curvature: &curvature, fields: Some(&fields) };
        let f = bg.field_strength(&[0.0, 1.2, 1.9, 3.1]).unwrap();
        assert_eq!(f[1][0], 1.0);
        assert!(bg.contains(&[0.0, 1.0, 1.0, 1.0]));
        assert!(!bg.contains(&[0.0, 9.0, 1.0, 1.0]));
        assert_eq!(bg.metric(&[0.0, 9.0, 0.0, 0.0]), Metric::minkowski());
    }
}
