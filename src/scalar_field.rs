//! real Klein–Gordon field on the spatial lattice
//!
//! ∂²φ/∂t² = c²∇²φ − (mc²/ħ)²φ, advanced with kick-drift-kick leapfrog.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::Constants;
use crate::error::{FabricError, FabricResult};
use crate::lattice::Lattice;
use crate::sanitize::{sanitize_slice, NanPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarField {
    pub phi: Vec<f64>,
    /// ∂φ/∂t
    pub pi: Vec<f64>,
    pub mass: f64,
}

impl ScalarField {
    pub fn uniform(lattice: &Lattice, value: f64, mass: f64) -> Self {
        ScalarField {
            phi: vec![value; lattice.len()],
            pi: vec![0.0; lattice.len()],
            mass,
        }
    }

    /// gaussian bump at rest
    pub fn gaussian(lattice: &Lattice, amplitude: f64, width: f64, centre: [f64; 3], mass: f64) -> Self {
        let w2 = width * width;
        let phi = (0..lattice.len())
            .map(|idx| {
                let x = lattice.position(idx);
                let r2: f64 = (0..3).map(|i| (x[i + 1] - centre[i]).powi(2)).sum();
                amplitude * (-r2 / (2.0 * w2)).exp()
            })
            .collect();
        ScalarField {
            phi,
            pi: vec![0.0; lattice.len()],
            mass,
        }
    }

    /// add uniform noise in [-amplitude, amplitude] from a seeded generator
    pub fn add_noise(&mut self, amplitude: f64, seed: u64) {
        if amplitude <= 0.0 {
            return;
        }
        let mut rng = StdRng::seed_from_u64(seed);
        for v in self.phi.iter_mut() {
            *v += rng.gen_range(-amplitude..=amplitude);
        }
    }

    /// (mc/ħ)², the mass term per unit c²
    fn mass_term(&self, constants: &Constants) -> f64 {
        let mu = self.mass * constants.c / constants.hbar;
        mu * mu
    }

    /// ∂²φ/∂t² at every point
    fn acceleration(&self, lattice: &Lattice, constants: &Constants) -> Vec<f64> {
        let c2 = constants.c * constants.c;
        let mu2 = self.mass_term(constants);
        (0..lattice.len())
            .map(|idx| c2 * (lattice.laplacian(idx, |p| self.phi[p]) - mu2 * self.phi[idx]))
            .collect()
    }

    /// one kick-drift-kick step; returns how many values were clamped
    pub fn step(&mut self, lattice: &Lattice, dt: f64, constants: &Constants, policy: NanPolicy) -> FabricResult<usize> {
        if self.phi.len() != lattice.len() || self.pi.len() != lattice.len() {
            return Err(FabricError::ShapeMismatch { expected: lattice.len(), found: self.phi.len() });
        }
        let acc = self.acceleration(lattice, constants);
        for (p, a) in self.pi.iter_mut().zip(&acc) {
            *p += 0.5 * dt * a;
        }
        for (f, p) in self.phi.iter_mut().zip(&self.pi) {
            *f += dt * p;
        }
        let acc = self.acceleration(lattice, constants);
        for (p, a) in self.pi.iter_mut().zip(&acc) {
            *p += 0.5 * dt * a;
        }
        let clamped = sanitize_slice(&mut self.phi, policy, "scalar phi")? + sanitize_slice(&mut self.pi, policy, "scalar pi")?;
        Ok(clamped)
    }

    /// ½π²/c² + ½|∇φ|² + ½(mc/ħ)²φ², with forward-difference gradients so
    /// the sum over a periodic lattice matches the leapfrog Laplacian
    pub fn energy_density(&self, lattice: &Lattice, idx: usize, constants: &Constants) -> f64 {
        let c2 = constants.c * constants.c;
        let phi = self.phi[idx];
        let grad2: f64 = lattice
            .active_spatial_axes()
            .filter_map(|axis| {
                let next = lattice.neighbor(idx, axis, 1)?;
                Some(((self.phi[next] - phi) / lattice.spacing[axis]).powi(2))
            })
            .sum();
        0.5 * self.pi[idx] * self.pi[idx] / c2 + 0.5 * grad2 + 0.5 * self.mass_term(constants) * phi * phi
    }

    pub fn energy_densities(&self, lattice: &Lattice, constants: &Constants) -> Vec<f64> {
        (0..lattice.len()).map(|idx| self.energy_density(lattice, idx, constants)).collect()
    }

    pub fn total_energy(&self, lattice: &Lattice, constants: &Constants) -> f64 {
        self.energy_densities(lattice, constants).iter().sum::<f64>() * lattice.cell_volume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Boundary;

    fn unit_constants() -> Constants {
        Constants { c: 1.0, g: 1.0, hbar: 1.0 }
    }

    #[test]
    fn uniform_field_oscillates_at_mass_frequency() {
        let lat = Lattice::spatial([4, 4, 4], 0.5, [0.0; 3], Boundary::Periodic).unwrap();
        let k = unit_constants();
        let m = 2.0;
        let mut field = ScalarField::uniform(&lat, 1.0, m);
        let dt = 0.001;
        let steps = 500;
        for _ in 0..steps {
            field.step(&lat, dt, &k, NanPolicy::Reject).unwrap();
        }
        let t = dt * steps as f64;
        for v in &field.phi {
            assert!((v - (m * t).cos()).abs() < 1e-5);
        }
    }

    #[test]
    fn gaussian_conserves_energy() {
        let lat = Lattice::spatial([24, 24, 1], 0.25, [0.0; 3], Boundary::Periodic).unwrap();
        let k = unit_constants();
        let mut field = ScalarField::gaussian(&lat, 1.0, 0.6, [3.0, 3.0, 0.0], 0.5);
        let e0 = field.total_energy(&lat, &k);
        for _ in 0..100 {
            field.step(&lat, 0.02, &k, NanPolicy::Reject).unwrap();
        }
        let e1 = field.total_energy(&lat, &k);
        assert!(((e1 - e0) / e0).abs() < 1e-2, "energy drifted from {e0} to {e1}");
    }

    #[test]
    fn noise_is_reproducible() {
        let lat = Lattice::spatial([8, 1, 1], 1.0, [0.0; 3], Boundary::Periodic).unwrap();
        let mut a = ScalarField::uniform(&lat, 0.0, 1.0);
        let mut b = ScalarField::uniform(&lat, 0.0, 1.0);
        a.add_noise(0.1, 42);
        b.add_noise(0.1, 42);
        assert_eq!(a.phi, b.phi);
        assert!(a.phi.iter().all(|v| v.abs() <= 0.1));
        assert!(a.phi.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn reject_policy_surfaces_nan() {
        let lat = Lattice::spatial([4, 1, 1], 1.0, [0.0; 3], Boundary::Periodic).unwrap();
        let mut field = ScalarField::uniform(&lat, 0.0, 1.0);
        field.phi[2] = f64::NAN;
        assert!(field.step(&lat, 0.1, &unit_constants(), NanPolicy::Reject).is_err());

        let mut field = ScalarField::uniform(&lat, 0.0, 1.0);
        field.phi[2] = f64::NAN;
        field.step(&lat, 0.1, &unit_constants(), NanPolicy::Clamp).unwrap();
        assert!(field.phi.iter().all(|v| v.is_finite()));
    }
}
