//! special-relativistic four-vectors used by particles and fields

use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::metric::Metric;

/// largest Lorentz factor a constructed four-velocity may carry
pub const MAX_GAMMA: f64 = 1e4;

/// four-vector for spacetime (ct, x, y, z)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FourVector {
    pub t: f64, // ct
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Sub for FourVector {
    type Output = FourVector;
    fn sub(self, rhs: FourVector) -> FourVector {
        FourVector {
            t: self.t - rhs.t,
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl Add for FourVector {
    type Output = FourVector;
    fn add(self, rhs: FourVector) -> FourVector {
        FourVector {
            t: self.t + rhs.t,
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl Neg for FourVector {
    type Output = FourVector;
    fn neg(self) -> FourVector {
        self.scale(-1.0)
    }
}

impl FourVector {
    pub fn new(t: f64, x: f64, y: f64, z: f64) -> Self {
        Self { t, x, y, z }
    }

    pub fn from_array(a: [f64; 4]) -> Self {
        Self { t: a[0], x: a[1], y: a[2], z: a[3] }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.t, self.x, self.y, self.z]
    }

    pub fn is_finite(&self) -> bool {
        self.t.is_finite() && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// euclidean length of the spatial part
    pub fn spatial_norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// general Lorentz boost by a 3D beta vector (beta = v / c).
    /// beta² is clamped just below 1.
    pub fn lorentz_boost_beta(&self, beta_x: f64, beta_y: f64, beta_z: f64) -> FourVector {
        let beta2 = beta_x * beta_x + beta_y * beta_y + beta_z * beta_z;
        if beta2 <= 0.0 {
            return *self;
        }
        let max_beta2 = 1.0 - 1e-12;
        let beta2 = if beta2 >= max_beta2 {
            log::warn!("lorentz_boost_beta: beta² = {beta2:.6} clamped below 1");
            max_beta2
        } else {
            beta2
        };
        let gamma = 1.0 / (1.0 - beta2).sqrt();

        let beta_dot_r = beta_x * self.x + beta_y * self.y + beta_z * self.z;

        // t is ct, so no factors of c appear
        let t_prime = gamma * (self.t - beta_dot_r);

        // r' = r + ((γ - 1)(β·r)/β² - γ t) β
        let factor = (gamma - 1.0) * beta_dot_r / beta2 - gamma * self.t;

        FourVector {
            t: t_prime,
            x: self.x + beta_x * factor,
            y: self.y + beta_y * factor,
            z: self.z + beta_z * factor,
        }
    }

    /// lorentz boost in x direction (beta = v/c)
    pub fn lorentz_boost_x(self, beta: f64) -> FourVector {
        self.lorentz_boost_beta(beta, 0.0, 0.0)
    }

    /// minkowski inner product (metric signature: -+++)
    pub fn minkowski_dot(self, other: FourVector) -> f64 {
        -self.t * other.t + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// inner product with an arbitrary metric
    pub fn metric_dot(self, other: FourVector, metric: &Metric) -> f64 {
        metric.dot(&self.as_array(), &other.as_array())
    }

    /// spacetime interval squared (s² = -c²t² + x² + y² + z²)
    pub fn interval2(self) -> f64 {
        self.minkowski_dot(self)
    }

    pub fn interval2_metric(self, metric: &Metric) -> f64 {
        self.metric_dot(self, metric)
    }

    pub fn scale(self, s: f64) -> FourVector {
        FourVector {
            t: self.t * s,
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
        }
    }
}

/// 4-velocity: derivative of the position four-vector wrt proper time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FourVelocity(pub FourVector);

impl FourVelocity {
    /// at rest: u = (c, 0, 0, 0)
    pub fn rest(c: f64) -> Self {
        FourVelocity(FourVector::new(c, 0.0, 0.0, 0.0))
    }

    /// construct from 3-velocity (vx, vy, vz) in the same units as c;
    /// speeds are clamped so that gamma stays below [`MAX_GAMMA`]
    pub fn from_3velocity(vx: f64, vy: f64, vz: f64, c: f64) -> FourVelocity {
        let v2 = vx * vx + vy * vy + vz * vz;
        let v2_max = c * c * (1.0 - 1.0 / (MAX_GAMMA * MAX_GAMMA));
        let scale = if v2 > v2_max {
            let s = (v2_max / v2).sqrt();
            log::warn!("from_3velocity: |v| = {:.6e} >= c, clamping to gamma = {MAX_GAMMA:.1e}", v2.sqrt());
            s
        } else {
            1.0
        };
        let (vx, vy, vz) = (vx * scale, vy * scale, vz * scale);
        let gamma = 1.0 / (1.0 - (v2 * scale * scale) / (c * c)).sqrt();
        FourVelocity(FourVector {
            t: gamma * c,
            x: gamma * vx,
            y: gamma * vy,
            z: gamma * vz,
        })
    }

    pub fn four_momentum(&self, mass: f64) -> FourVector {
        self.0.scale(mass)
    }

    /// 3-velocity dx/dt = c u^i / u^0
    pub fn three_velocity(&self, c: f64) -> (f64, f64, f64) {
        if self.0.t > 0.0 {
            let k = c / self.0.t;
            (self.0.x * k, self.0.y * k, self.0.z * k)
        } else {
            (0.0, 0.0, 0.0)
        }
    }

    /// Lorentz factor u^0 / c
    pub fn gamma(&self, c: f64) -> f64 {
        self.0.t / c
    }

    /// minkowski norm squared (-c² for a valid four-velocity)
    pub fn norm2(&self) -> f64 {
        self.0.minkowski_dot(self.0)
    }

    /// rescale so that g_μν u^μ u^ν = -c²; falls back to rest when the
    /// vector is not timelike under `metric`
    pub fn normalize_in(&self, metric: &Metric, c: f64) -> FourVelocity {
        let norm = self.0.interval2_metric(metric);
        let tol = c * c * 1e-12;
        if norm < -tol {
            FourVelocity(self.0.scale((-c * c / norm).sqrt()))
        } else {
            log::warn!("normalize: u = {:?} is not timelike (norm {norm:.3e}); resetting to rest", self.0);
            let g00 = metric.g[0][0];
            let t = if g00 < 0.0 { c / (-g00).sqrt() } else { c };
            FourVelocity(FourVector::new(t, 0.0, 0.0, 0.0))
        }
    }

    /// normalize against the Minkowski metric
    pub fn normalize(&self, c: f64) -> FourVelocity {
        self.normalize_in(&Metric::minkowski(), c)
    }
}

/// four-force: change in four-momentum per unit proper time
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FourForce(pub FourVector);

impl FourForce {
    /// project orthogonal to the four-velocity:
    /// F^μ - (F_ν u^ν) u^μ / (u_ν u^ν)
    pub fn orthogonal_to(self, u: FourVelocity, metric: &Metric) -> FourForce {
        let uu = u.0.interval2_metric(metric);
        if uu.abs() < 1e-300 {
            return self;
        }
        let dot = self.0.metric_dot(u.0, metric);
        FourForce(self.0 - u.0.scale(dot / uu))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minkowski_interval() {
        let c = 10.0;
        let v = FourVector { t: 1.0 * c, x: 3.0, y: 4.0, z: 0.0 };
        let s2 = v.interval2_metric(&Metric::minkowski());
        assert!((s2 + c * c - 25.0).abs() < 1e-9);
        assert!((v.interval2() - s2).abs() < 1e-12);
    }

    #[test]
    fn lorentz_boost_x() {
        let v = FourVector { t: 10.0, x: 5.0, y: 0.0, z: 0.0 };
        let beta = 0.6;
        let boosted = v.lorentz_boost_x(beta);
        let gamma = 1.0 / (1.0 - beta * beta).sqrt();
        assert!((boosted.t - gamma * (v.t - beta * v.x)).abs() < 1e-9);
        assert!((boosted.x - gamma * (v.x - beta * v.t)).abs() < 1e-9);
    }

    #[test]
    fn boost_preserves_interval() {
        let v = FourVector::new(3.0, 1.0, -2.0, 0.5);
        let b = v.lorentz_boost_beta(0.3, -0.2, 0.4);
        assert!((v.interval2() - b.interval2()).abs() < 1e-9);
        let back = b.lorentz_boost_beta(-0.3, 0.2, -0.4);
        assert!((back - v).spatial_norm() < 1e-9);
        assert!((back.t - v.t).abs() < 1e-9);
    }

    #[test]
    fn four_velocity_from_3velocity() {
        let c = 10.0;
        let vx = 6.0;
        let u = FourVelocity::from_3velocity(vx, 0.0, 0.0, c);
        let gamma = 1.0 / (1.0 - (vx * vx) / (c * c)).sqrt();
        assert!((u.0.t - gamma * c).abs() < 1e-9);
        assert!((u.0.x - gamma * vx).abs() < 1e-9);
        assert!((u.norm2() + c * c).abs() < 1e-9);
        let (wx, _, _) = u.three_velocity(c);
        assert!((wx - vx).abs() < 1e-9);
    }

    #[test]
    fn superluminal_speed_is_clamped() {
        let c = 1.0;
        for (vx, vy) in [(3.0, 4.0), (1.0, 0.0), (0.0, -2.0)] {
            let u = FourVelocity::from_3velocity(vx, vy, 0.0, c);
            let gamma = u.gamma(c);
            assert!(gamma.is_finite());
            assert!(gamma <= MAX_GAMMA * (1.0 + 1e-9), "gamma = {gamma}");
            assert!(gamma > 0.99 * MAX_GAMMA);
            assert!((u.norm2() + c * c).abs() < 1e-6, "norm2 = {}", u.norm2());
            // direction survives the clamp
            let (wx, wy, _) = u.three_velocity(c);
            assert!((wx * vy - wy * vx).abs() < 1e-9);
            assert!(wx * wx + wy * wy < c * c);
        }
    }

    #[test]
    fn normalize_fixes_scale() {
        let c = 1.0;
        let u = FourVelocity(FourVector::new(2.0, 0.5, 0.0, 0.0));
        let n = u.normalize(c);
        assert!((n.norm2() + 1.0).abs() < 1e-12);
        let spacelike = FourVelocity(FourVector::new(0.1, 1.0, 0.0, 0.0)).normalize(c);
        assert_eq!(spacelike, FourVelocity::rest(c));
    }

    #[test]
    fn orthogonal_force_has_no_component_along_u() {
        let c = 1.0;
        let m = Metric::minkowski();
        let u = FourVelocity::from_3velocity(0.4, 0.1, 0.0, c);
        let f = FourForce(FourVector::new(0.7, 1.0, -0.3, 0.2)).orthogonal_to(u, &m);
        assert!(f.0.metric_dot(u.0, &m).abs() < 1e-12);
    }
}
