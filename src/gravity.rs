//! weak-field gravity sourced by the fields on the lattice
//!
//! the energy density of the fields is turned into a mass density
//! ρ = u/c², the Newtonian potential solves ∇²Φ = 4πGρ, and the metric is
//! the background plus diag(−2Φ/c², −2Φ/c², −2Φ/c², −2Φ/c²).
//!
//! - `Decoupled`: fields do not curve spacetime, the background is used as is
//! - `WeakField`: Jacobi relaxation of the Poisson equation on the lattice

use serde::{Deserialize, Serialize};

use crate::config::Constants;
use crate::error::{FabricError, FabricResult};
use crate::lattice::Lattice;
use crate::metric::Metric;

/// trait for gravity models
pub trait GravityModel {
    /// Newtonian potential sourced by `mass_density`, None when the fields
    /// do not gravitate. `previous` is a starting guess, usually the last
    /// step's potential.
    fn potential(
        &self,
        lattice: &Lattice,
        mass_density: &[f64],
        previous: Option<&[f64]>,
        constants: &Constants,
    ) -> FabricResult<Option<PoissonSolution>>;

    /// metric at every lattice point: the background plus the weak-field
    /// perturbation of the potential
    fn metrics(
        &self,
        lattice: &Lattice,
        background: &[Metric],
        mass_density: &[f64],
        constants: &Constants,
    ) -> FabricResult<Vec<Metric>> {
        match self.potential(lattice, mass_density, None, constants)? {
            Some(solution) => perturb_background(background, &solution.potential, constants.c),
            None => {
                if background.len() != lattice.len() {
                    return Err(FabricError::ShapeMismatch { expected: lattice.len(), found: background.len() });
                }
                Ok(background.to_vec())
            }
        }
    }
}

/// fields are test fields: the background metric is returned unchanged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decoupled;

impl GravityModel for Decoupled {
    fn potential(
        &self,
        _lattice: &Lattice,
        _mass_density: &[f64],
        _previous: Option<&[f64]>,
        _constants: &Constants,
    ) -> FabricResult<Option<PoissonSolution>> {
        Ok(None)
    }
}

/// linearised gravity from a Jacobi solve of the Poisson equation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeakFieldGravity {
    /// relative residual at which relaxation stops
    pub tolerance: f64,
    pub max_iter: usize,
}

impl Default for WeakFieldGravity {
    fn default() -> Self {
        WeakFieldGravity { tolerance: 1e-6, max_iter: 20_000 }
    }
}

impl GravityModel for WeakFieldGravity {
    fn potential(
        &self,
        lattice: &Lattice,
        mass_density: &[f64],
        previous: Option<&[f64]>,
        constants: &Constants,
    ) -> FabricResult<Option<PoissonSolution>> {
        solve_poisson(lattice, mass_density, previous, constants.g, self.tolerance, self.max_iter).map(Some)
    }
}

/// utility: select a gravity model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum GravityKind {
    Decoupled,
    WeakField(WeakFieldGravity),
}

impl Default for GravityKind {
    fn default() -> Self {
        GravityKind::Decoupled
    }
}

impl GravityModel for GravityKind {
    fn potential(
        &self,
        lattice: &Lattice,
        mass_density: &[f64],
        previous: Option<&[f64]>,
        constants: &Constants,
    ) -> FabricResult<Option<PoissonSolution>> {
        match self {
            GravityKind::Decoupled => Decoupled.potential(lattice, mass_density, previous, constants),
            GravityKind::WeakField(g) => g.potential(lattice, mass_density, previous, constants),
        }
    }
}

/// add the weak-field perturbation of `potential` to each background metric
pub fn perturb_background(background: &[Metric], potential: &[f64], c: f64) -> FabricResult<Vec<Metric>> {
    if potential.len() != background.len() {
        return Err(FabricError::ShapeMismatch { expected: background.len(), found: potential.len() });
    }
    Ok(background
        .iter()
        .zip(potential)
        .map(|(g, &phi)| g.perturbed(&Metric::weak_field_perturbation(phi, c)))
        .collect())
}

/// ρ = u / c²
pub fn mass_density(energy_density: &[f64], c: f64) -> Vec<f64> {
    let c2 = c * c;
    energy_density.iter().map(|u| u / c2).collect()
}

/// Minkowski plus the weak-field perturbation of `potential`
pub fn weak_field_metrics(lattice: &Lattice, potential: &[f64], c: f64) -> FabricResult<Vec<Metric>> {
    if potential.len() != lattice.len() {
        return Err(FabricError::ShapeMismatch { expected: lattice.len(), found: potential.len() });
    }
    perturb_background(&vec![Metric::minkowski(); lattice.len()], potential, c)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoissonSolution {
    pub potential: Vec<f64>,
    pub iterations: usize,
    /// max |∇²Φ − 4πGρ| relative to max |4πGρ|
    pub residual: f64,
    pub converged: bool,
}

const JACOBI_WEIGHT: f64 = 2.0 / 3.0;

/// solve ∇²Φ = 4πGρ by weighted Jacobi relaxation, starting from
/// `initial` when given and from zero otherwise. the mean of the source and
/// of the returned potential are removed.
pub fn solve_poisson(
    lattice: &Lattice,
    density: &[f64],
    initial: Option<&[f64]>,
    g: f64,
    tolerance: f64,
    max_iter: usize,
) -> FabricResult<PoissonSolution> {
    let n = lattice.len();
    if density.len() != n {
        return Err(FabricError::ShapeMismatch { expected: n, found: density.len() });
    }
    let four_pi_g = 4.0 * std::f64::consts::PI * g;
    let mean = density.iter().sum::<f64>() / n.max(1) as f64;
    let source: Vec<f64> = density.iter().map(|rho| four_pi_g * (rho - mean)).collect();
    let scale = source.iter().fold(0.0_f64, |m, v| m.max(v.abs()));

    let diag: f64 = lattice
        .active_spatial_axes()
        .map(|axis| 2.0 / (lattice.spacing[axis] * lattice.spacing[axis]))
        .sum();
    if scale == 0.0 || diag == 0.0 {
        return Ok(PoissonSolution { potential: vec![0.0; n], iterations: 0, residual: 0.0, converged: true });
    }
    let mut phi = match initial {
        Some(guess) if guess.len() != n => {
            return Err(FabricError::ShapeMismatch { expected: n, found: guess.len() });
        }
        // a non-finite guess would never relax
        Some(guess) if guess.iter().all(|v| v.is_finite()) => guess.to_vec(),
        _ => vec![0.0; n],
    };

    let mut residual = f64::INFINITY;
    let mut iterations = 0;
    while iterations < max_iter {
        let r: Vec<f64> = (0..n).map(|idx| lattice.laplacian(idx, |p| phi[p]) - source[idx]).collect();
        residual = r.iter().fold(0.0_f64, |m, v| m.max(v.abs())) / scale;
        if residual <= tolerance {
            break;
        }
        for (p, ri) in phi.iter_mut().zip(&r) {
            *p += JACOBI_WEIGHT * ri / diag;
        }
        iterations += 1;
    }
    let converged = residual <= tolerance;
    if converged {
        log::debug!("poisson: converged in {iterations} iterations, residual {residual:.3e}");
    } else {
        log::warn!("poisson: hit iteration cap {max_iter}, residual {residual:.3e} > {tolerance:.1e}");
    }

    let phi_mean = phi.iter().sum::<f64>() / n as f64;
    for p in phi.iter_mut() {
        *p -= phi_mean;
    }
    Ok(PoissonSolution { potential: phi, iterations, residual, converged })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Boundary;

    fn unit_constants() -> Constants {
        Constants { c: 1.0, g: 1.0, hbar: 1.0 }
    }

    #[test]
    fn sine_source_matches_discrete_eigenvalue() {
        let n = 16;
        let h = 0.25;
        let lat = Lattice::spatial([n, 1, 1], h, [0.0; 3], Boundary::Periodic).unwrap();
        let k = 2.0 * std::f64::consts::PI / (n as f64 * h);
        let rho: Vec<f64> = (0..n).map(|idx| (k * lat.position(idx)[1]).sin()).collect();
        let sol = solve_poisson(&lat, &rho, None, 1.0, 1e-10, 10_000).unwrap();
        assert!(sol.converged, "residual {}", sol.residual);
        let eig = -(2.0 - 2.0 * (k * h).cos()) / (h * h);
        let four_pi = 4.0 * std::f64::consts::PI;
        for idx in 0..n {
            let expected = four_pi * rho[idx] / eig;
            assert!((sol.potential[idx] - expected).abs() < 1e-8, "{} vs {}", sol.potential[idx], expected);
        }
    }

    #[test]
    fn uniform_density_has_flat_potential() {
        let lat = Lattice::spatial([4, 4, 4], 1.0, [0.0; 3], Boundary::Periodic).unwrap();
        let sol = solve_poisson(&lat, &vec![3.0; lat.len()], None, 1.0, 1e-8, 100).unwrap();
        assert_eq!(sol.iterations, 0);
        assert!(sol.potential.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn iteration_cap_is_reported() {
        let lat = Lattice::spatial([32, 1, 1], 0.1, [0.0; 3], Boundary::Periodic).unwrap();
        let mut rho = vec![0.0; lat.len()];
        rho[0] = 1.0;
        let sol = solve_poisson(&lat, &rho, None, 1.0, 1e-12, 3).unwrap();
        assert!(!sol.converged);
        assert_eq!(sol.iterations, 3);
    }

    #[test]
    fn warm_start_from_previous_solution() {
        let lat = Lattice::spatial([8, 8, 1], 0.5, [0.0; 3], Boundary::Periodic).unwrap();
        let mut rho = vec![0.0; lat.len()];
        rho[lat.index(0, 3, 3, 0)] = 1.0;
        let cold = solve_poisson(&lat, &rho, None, 1.0, 1e-8, 20_000).unwrap();
        assert!(cold.converged);
        assert!(cold.iterations > 10);

        // unchanged source: the previous potential already solves it
        let same = solve_poisson(&lat, &rho, Some(cold.potential.as_slice()), 1.0, 1e-7, 20_000).unwrap();
        assert_eq!(same.iterations, 0);
        for (a, b) in same.potential.iter().zip(&cold.potential) {
            assert!((a - b).abs() < 1e-12);
        }

        // slightly shifted source: fewer sweeps than from zero
        let mut moved = rho.clone();
        moved[lat.index(0, 3, 4, 0)] = 0.1;
        let from_zero = solve_poisson(&lat, &moved, None, 1.0, 1e-8, 20_000).unwrap();
        let warm = solve_poisson(&lat, &moved, Some(cold.potential.as_slice()), 1.0, 1e-8, 20_000).unwrap();
        assert!(warm.converged);
        assert!(warm.iterations < from_zero.iterations, "{} vs {}", warm.iterations, from_zero.iterations);
        for (a, b) in warm.potential.iter().zip(&from_zero.potential) {
            assert!((a - b).abs() < 1e-6);
        }

        assert!(solve_poisson(&lat, &rho, Some(&[0.0; 3][..]), 1.0, 1e-8, 10).is_err());
        let nan_guess = vec![f64::NAN; lat.len()];
        let reset = solve_poisson(&lat, &rho, Some(nan_guess.as_slice()), 1.0, 1e-8, 20_000).unwrap();
        assert_eq!(reset.iterations, cold.iterations);
    }

    #[test]
    fn overdensity_is_a_potential_well() {
        let lat = Lattice::spatial([9, 9, 1], 0.5, [0.0; 3], Boundary::Periodic).unwrap();
        let mut rho = vec![0.0; lat.len()];
        let centre = lat.index(0, 4, 4, 0);
        rho[centre] = 1.0;
        let metrics = WeakFieldGravity { tolerance: 1e-8, max_iter: 20_000 }
            .metrics(&lat, &vec![Metric::minkowski(); lat.len()], &rho, &unit_constants())
            .unwrap();
        // Φ < 0 at the mass: g_tt = −(1 + 2Φ) is less negative
        assert!(metrics[centre].g[0][0] > -1.0);
        assert!(metrics[centre].g[1][1] > 1.0);
        let corner = lat.index(0, 0, 0, 0);
        assert!(metrics[centre].g[0][0] > metrics[corner].g[0][0]);
    }

    #[test]
    fn decoupled_returns_background() {
        let lat = Lattice::spatial([2, 2, 1], 1.0, [0.0; 3], Boundary::Periodic).unwrap();
        let bg = vec![Metric::diagonal([-2.0, 1.0, 1.0, 1.0]); lat.len()];
        let out = GravityKind::Decoupled.metrics(&lat, &bg, &[1.0; 4], &unit_constants()).unwrap();
        assert_eq!(out, bg);
    }

    #[test]
    fn weak_field_metric_components() {
        let lat = Lattice::spatial([2, 1, 1], 1.0, [0.0; 3], Boundary::Periodic).unwrap();
        let metrics = weak_field_metrics(&lat, &[-0.01, 0.02], 1.0).unwrap();
        assert!((metrics[0].g[0][0] + 0.98).abs() < 1e-12);
        assert!((metrics[0].g[3][3] - 1.02).abs() < 1e-12);
        assert!((metrics[1].g[0][0] + 1.04).abs() < 1e-12);
        assert!(weak_field_metrics(&lat, &[0.0], 1.0).is_err());
    }

    #[test]
    fn gravity_kind_serde_tag() {
        let kind: GravityKind = serde_json::from_str(r#"{"model":"weak_field","tolerance":1e-7,"max_iter":50}"#).unwrap();
        assert_eq!(kind, GravityKind::WeakField(WeakFieldGravity { tolerance: 1e-7, max_iter: 50 }));
    }
}
