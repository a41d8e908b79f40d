//! connection and curvature: Γ → Riemann → Ricci → Einstein
//!
//! index conventions:
//!   Γ[λ][μ][ν]       = Γ^λ_{μν}
//!   R[ρ][σ][μ][ν]    = R^ρ_{σμν} = ∂_μΓ^ρ_{νσ} − ∂_νΓ^ρ_{μσ} + Γ^ρ_{μλ}Γ^λ_{νσ} − Γ^ρ_{νλ}Γ^λ_{μσ}
//!   Ric[σ][ν]        = R^ρ_{σρν}
//!   G[μ][ν]          = R_{μν} − ½ g_{μν} R

use serde::{Deserialize, Serialize};

use crate::error::{FabricError, FabricResult};
use crate::lattice::Lattice;
use crate::metric::{Metric, MetricModel};
use crate::sanitize::{sanitize_slice, FieldStats, NanPolicy};

pub type Christoffel = [[[f64; 4]; 4]; 4];
pub type Riemann = [[[[f64; 4]; 4]; 4]; 4];
pub type Tensor2 = [[f64; 4]; 4];

/// Γ^λ_{μν} = ½ g^{λσ} (∂_μ g_{σν} + ∂_ν g_{σμ} − ∂_σ g_{μν})
///
/// `dg[σ][μ][ν]` holds ∂_σ g_{μν}.
pub fn christoffel_from_derivatives(g_inv: &Metric, dg: &[Tensor2; 4]) -> Christoffel {
    let mut gamma = [[[0.0; 4]; 4]; 4];
    for lam in 0..4 {
        for mu in 0..4 {
            for nu in mu..4 {
                let mut sum = 0.0;
                for sig in 0..4 {
                    let ginv = g_inv.g[lam][sig];
                    if ginv == 0.0 {
                        continue;
                    }
                    sum += ginv * (dg[mu][sig][nu] + dg[nu][sig][mu] - dg[sig][mu][nu]);
                }
                gamma[lam][mu][nu] = 0.5 * sum;
                gamma[lam][nu][mu] = 0.5 * sum;
            }
        }
    }
    gamma
}

/// connection of any metric model by central differences of g with step `h`
pub fn numeric_christoffel<M: MetricModel + ?Sized>(model: &M, x: &[f64; 4], h: f64) -> Christoffel {
    let g_inv = match model.metric_at(x).inverse() {
        Some(inv) => inv,
        None => {
            log::warn!("numeric_christoffel: degenerate metric at {x:?}, returning zero connection");
            return [[[0.0; 4]; 4]; 4];
        }
    };
    let mut dg = [[[0.0; 4]; 4]; 4];
    for (axis, d) in dg.iter_mut().enumerate() {
        let mut xp = *x;
        let mut xm = *x;
        xp[axis] += h;
        xm[axis] -= h;
        let gp = model.metric_at(&xp);
        let gm = model.metric_at(&xm);
        for mu in 0..4 {
            for nu in 0..4 {
                d[mu][nu] = (gp.g[mu][nu] - gm.g[mu][nu]) / (2.0 * h);
            }
        }
    }
    christoffel_from_derivatives(&g_inv, &dg)
}

/// assemble R^ρ_{σμν} from Γ and its derivatives, `dgamma[α]` = ∂_α Γ
pub fn riemann_from_parts(gamma: &Christoffel, dgamma: &[Christoffel; 4]) -> Riemann {
    let mut r = [[[[0.0; 4]; 4]; 4]; 4];
    for rho in 0..4 {
        for sig in 0..4 {
            for mu in 0..4 {
                // antisymmetric in (μ, ν)
                for nu in (mu + 1)..4 {
                    let mut v = dgamma[mu][rho][nu][sig] - dgamma[nu][rho][mu][sig];
                    for lam in 0..4 {
                        v += gamma[rho][mu][lam] * gamma[lam][nu][sig] - gamma[rho][nu][lam] * gamma[lam][mu][sig];
                    }
                    r[rho][sig][mu][nu] = v;
                    r[rho][sig][nu][mu] = -v;
                }
            }
        }
    }
    r
}

/// Riemann tensor of a model at `x`, differencing its connection with step `h`
pub fn riemann_at<M: MetricModel + ?Sized>(model: &M, x: &[f64; 4], h: f64) -> Riemann {
    let gamma = model.christoffel_at(x);
    let mut dgamma = [[[[0.0; 4]; 4]; 4]; 4];
    for (axis, d) in dgamma.iter_mut().enumerate() {
        let mut xp = *x;
        let mut xm = *x;
        xp[axis] += h;
        xm[axis] -= h;
        let gp = model.christoffel_at(&xp);
        let gm = model.christoffel_at(&xm);
        for l in 0..4 {
            for m in 0..4 {
                for n in 0..4 {
                    d[l][m][n] = (gp[l][m][n] - gm[l][m][n]) / (2.0 * h);
                }
            }
        }
    }
    riemann_from_parts(&gamma, &dgamma)
}

/// R_{σν} = R^ρ_{σρν}
pub fn ricci_from_riemann(riemann: &Riemann) -> Tensor2 {
    let mut ric = [[0.0; 4]; 4];
    for sig in 0..4 {
        for nu in 0..4 {
            ric[sig][nu] = (0..4).map(|rho| riemann[rho][sig][rho][nu]).sum();
        }
    }
    ric
}

/// g^{μν} T_{μν}
pub fn trace(g_inv: &Metric, t: &Tensor2) -> f64 {
    let mut s = 0.0;
    for mu in 0..4 {
        for nu in 0..4 {
            s += g_inv.g[mu][nu] * t[mu][nu];
        }
    }
    s
}

/// R = g^{μν} R_{μν}
pub fn ricci_scalar(g_inv: &Metric, ricci: &Tensor2) -> f64 {
    trace(g_inv, ricci)
}

/// G_{μν} = R_{μν} − ½ g_{μν} R
pub fn einstein(g: &Metric, ricci: &Tensor2, scalar: f64) -> Tensor2 {
    let mut out = [[0.0; 4]; 4];
    for mu in 0..4 {
        for nu in 0..4 {
            out[mu][nu] = ricci[mu][nu] - 0.5 * g.g[mu][nu] * scalar;
        }
    }
    out
}

/// Kretschmann scalar R_{ρσμν} R^{ρσμν}
pub fn kretschmann(g: &Metric, g_inv: &Metric, riemann: &Riemann) -> f64 {
    // fully covariant
    let mut lower = [[[[0.0; 4]; 4]; 4]; 4];
    for rho in 0..4 {
        for a in 0..4 {
            let gr = g.g[rho][a];
            if gr == 0.0 {
                continue;
            }
            for s in 0..4 {
                for m in 0..4 {
                    for n in 0..4 {
                        lower[rho][s][m][n] += gr * riemann[a][s][m][n];
                    }
                }
            }
        }
    }
    // raise σ, μ, ν in turn
    let mut up = *riemann;
    for slot in 1..4 {
        let mut next = [[[[0.0; 4]; 4]; 4]; 4];
        for r in 0..4 {
            for s in 0..4 {
                for m in 0..4 {
                    for n in 0..4 {
                        let mut v = 0.0;
                        for b in 0..4 {
                            let (ix, src) = match slot {
                                1 => (s, up[r][b][m][n]),
                                2 => (m, up[r][s][b][n]),
                                _ => (n, up[r][s][m][b]),
                            };
                            v += g_inv.g[ix][b] * src;
                        }
                        next[r][s][m][n] = v;
                    }
                }
            }
        }
        up = next;
    }
    let mut k = 0.0;
    for r in 0..4 {
        for s in 0..4 {
            for m in 0..4 {
                for n in 0..4 {
                    k += lower[r][s][m][n] * up[r][s][m][n];
                }
            }
        }
    }
    k
}

/// summary of the curvature on a lattice
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CurvatureStats {
    pub ricci_scalar: FieldStats,
    pub einstein: FieldStats,
    pub kretschmann: FieldStats,
    pub degenerate_count: usize,
    pub non_lorentzian_count: usize,
}

/// derived tensors stored per lattice point
#[derive(Debug, Clone)]
pub struct CurvatureField {
    pub metrics: Vec<Metric>,
    pub inverse: Vec<Metric>,
    pub christoffel: Vec<Christoffel>,
    pub ricci: Vec<Tensor2>,
    pub ricci_scalar: Vec<f64>,
    pub einstein: Vec<Tensor2>,
    /// R_{abcd} R^{abcd}
    pub kretschmann: Vec<f64>,
    /// points whose metric could not be inverted
    pub degenerate_count: usize,
    /// invertible points without (-,+,+,+) signature, kept under `Clamp`
    pub non_lorentzian_count: usize,
}

impl CurvatureField {
    /// run the full pipeline over a metric sampled on `lattice`
    pub fn compute(lattice: &Lattice, metrics: Vec<Metric>, policy: NanPolicy) -> FabricResult<Self> {
        let n = lattice.len();
        if metrics.len() != n {
            return Err(FabricError::ShapeMismatch { expected: n, found: metrics.len() });
        }

        let mut inverse = Vec::with_capacity(n);
        let mut degenerate_count = 0usize;
        let mut non_lorentzian = 0usize;
        for (idx, g) in metrics.iter().enumerate() {
            match g.inverse() {
                Some(inv) => {
                    if !g.is_lorentzian() {
                        if policy == NanPolicy::Reject {
                            log::error!("curvature: metric at {idx} is not lorentzian");
                            return Err(FabricError::NonLorentzian { index: idx });
                        }
                        non_lorentzian += 1;
                    }
                    inverse.push(inv);
                }
                None => {
                    if policy == NanPolicy::Reject {
                        log::error!("curvature: metric at {idx} is degenerate");
                        return Err(FabricError::DegenerateMetric { index: idx });
                    }
                    degenerate_count += 1;
                    inverse.push(Metric::minkowski());
                }
            }
        }
        if degenerate_count > 0 {
            log::warn!("curvature: substituted minkowski inverse at {degenerate_count} degenerate points");
        }
        if non_lorentzian > 0 {
            log::warn!("curvature: {non_lorentzian} points have non-lorentzian signature");
        }

        let christoffel: Vec<Christoffel> = (0..n)
            .map(|idx| {
                let mut dg = [[[0.0; 4]; 4]; 4];
                for (axis, d) in dg.iter_mut().enumerate() {
                    for mu in 0..4 {
                        for nu in mu..4 {
                            let v = lattice.partial(idx, axis, |p| metrics[p].g[mu][nu]);
                            d[mu][nu] = v;
                            d[nu][mu] = v;
                        }
                    }
                }
                christoffel_from_derivatives(&inverse[idx], &dg)
            })
            .collect();

        let mut field = CurvatureField {
            metrics,
            inverse,
            christoffel,
            ricci: Vec::with_capacity(n),
            ricci_scalar: Vec::with_capacity(n),
            einstein: Vec::with_capacity(n),
            kretschmann: Vec::with_capacity(n),
            degenerate_count,
            non_lorentzian_count: non_lorentzian,
        };

        for idx in 0..n {
            let riemann = field.riemann(lattice, idx);
            let ric = ricci_from_riemann(&riemann);
            let scalar = ricci_scalar(&field.inverse[idx], &ric);
            field.einstein.push(einstein(&field.metrics[idx], &ric, scalar));
            field.kretschmann.push(kretschmann(&field.metrics[idx], &field.inverse[idx], &riemann));
            field.ricci.push(ric);
            field.ricci_scalar.push(scalar);
        }

        sanitize_slice(field.ricci.as_flattened_mut().as_flattened_mut(), policy, "ricci")?;
        sanitize_slice(&mut field.ricci_scalar, policy, "ricci scalar")?;
        sanitize_slice(field.einstein.as_flattened_mut().as_flattened_mut(), policy, "einstein")?;
        sanitize_slice(&mut field.kretschmann, policy, "kretschmann")?;

        let stats = field.stats();
        log::debug!(
            "curvature: |R| max={:.3e} avg={:.3e}, |G| max={:.3e} avg={:.3e}",
            stats.ricci_scalar.max,
            stats.ricci_scalar.mean,
            stats.einstein.max,
            stats.einstein.mean
        );
        Ok(field)
    }

    /// Riemann tensor at one point from the stored connection
    pub fn riemann(&self, lattice: &Lattice, idx: usize) -> Riemann {
        let mut dgamma = [[[[0.0; 4]; 4]; 4]; 4];
        for (axis, d) in dgamma.iter_mut().enumerate() {
            if lattice.shape[axis] < 2 {
                continue;
            }
            for l in 0..4 {
                for m in 0..4 {
                    for n in m..4 {
                        let v = lattice.partial(idx, axis, |p| self.christoffel[p][l][m][n]);
                        d[l][m][n] = v;
                        d[l][n][m] = v;
                    }
                }
            }
        }
        riemann_from_parts(&self.christoffel[idx], &dgamma)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn stats(&self) -> CurvatureStats {
        CurvatureStats {
            ricci_scalar: FieldStats::of(self.ricci_scalar.iter().copied()),
            einstein: FieldStats::of(self.einstein.iter().flatten().flatten().copied()),
            kretschmann: FieldStats::of(self.kretschmann.iter().copied()),
            degenerate_count: self.degenerate_count,
            non_lorentzian_count: self.non_lorentzian_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Boundary;
    use crate::metric::{metric_field, Minkowski, PowerLawFlrw, SchwarzschildIsotropic, SchwarzschildSpherical};

    fn max_abs2(t: &Tensor2) -> f64 {
        t.iter().flatten().fold(0.0, |m: f64, v| m.max(v.abs()))
    }

    #[test]
    fn flat_lattice_has_no_curvature() {
        let lat = Lattice::spatial([4, 4, 4], 0.5, [0.0; 3], Boundary::Periodic).unwrap();
        let field = CurvatureField::compute(&lat, metric_field(&lat, &Minkowski), NanPolicy::Reject).unwrap();
        for idx in 0..lat.len() {
            assert_eq!(max_abs2(&field.ricci[idx]), 0.0);
            assert_eq!(max_abs2(&field.einstein[idx]), 0.0);
            assert_eq!(field.ricci_scalar[idx], 0.0);
        }
        assert_eq!(field.degenerate_count, 0);
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let lat = Lattice::spatial([2, 2, 2], 1.0, [0.0; 3], Boundary::Periodic).unwrap();
        let err = CurvatureField::compute(&lat, vec![Metric::minkowski(); 3], NanPolicy::Clamp).unwrap_err();
        assert!(matches!(err, FabricError::ShapeMismatch { expected: 8, found: 3 }));
    }

    #[test]
    fn degenerate_metric_follows_policy() {
        let lat = Lattice::spatial([2, 1, 1], 1.0, [0.0; 3], Boundary::Periodic).unwrap();
        let mut metrics = vec![Metric::minkowski(); 2];
        metrics[1] = Metric::diagonal([0.0, 1.0, 1.0, 1.0]);
        let err = CurvatureField::compute(&lat, metrics.clone(), NanPolicy::Reject).unwrap_err();
        assert!(matches!(err, FabricError::DegenerateMetric { index: 1 }));
        let field = CurvatureField::compute(&lat, metrics, NanPolicy::Clamp).unwrap();
        assert_eq!(field.degenerate_count, 1);
        assert_eq!(field.inverse[1], Metric::minkowski());
    }

    #[test]
    fn euclidean_metric_rejected_as_non_lorentzian() {
        let lat = Lattice::spatial([1, 1, 1], 1.0, [0.0; 3], Boundary::Periodic).unwrap();
        let err = CurvatureField::compute(&lat, vec![Metric::diagonal([1.0; 4])], NanPolicy::Reject).unwrap_err();
        assert!(matches!(err, FabricError::NonLorentzian { index: 0 }));

        let field = CurvatureField::compute(&lat, vec![Metric::diagonal([1.0; 4])], NanPolicy::Clamp).unwrap();
        assert_eq!(field.non_lorentzian_count, 1);
        assert_eq!(field.degenerate_count, 0);
        assert_eq!(field.stats().non_lorentzian_count, 1);
    }

    #[test]
    fn flat_flrw_ricci_scalar_and_energy_density() {
        // a(t) = t: R = 6/t², G_tt = 3/t²
        let dt = 0.01;
        let lat = Lattice::new([5, 1, 1, 1], [dt, 1.0, 1.0, 1.0], [1.98, 0.0, 0.0, 0.0], Boundary::OneSided).unwrap();
        let model = PowerLawFlrw { t0: 1.0, exponent: 1.0 };
        let field = CurvatureField::compute(&lat, metric_field(&lat, &model), NanPolicy::Reject).unwrap();
        let idx = lat.index(2, 0, 0, 0);
        assert!((lat.position(idx)[0] - 2.0).abs() < 1e-12);
        assert!((field.ricci_scalar[idx] - 1.5).abs() < 1e-3, "R = {}", field.ricci_scalar[idx]);
        assert!((field.einstein[idx][0][0] - 0.75).abs() < 1e-3, "G_tt = {}", field.einstein[idx][0][0]);
        assert!(field.einstein[idx][0][1].abs() < 1e-9);
    }

    #[test]
    fn isotropic_schwarzschild_is_ricci_flat_but_curved() {
        let h = 0.05;
        let model = SchwarzschildIsotropic { rs: 2.0, centre: [0.0; 3] };
        let lat = Lattice::spatial([5, 5, 5], h, [10.0 - 2.0 * h, -2.0 * h, -2.0 * h], Boundary::OneSided).unwrap();
        let field = CurvatureField::compute(&lat, metric_field(&lat, &model), NanPolicy::Reject).unwrap();
        let idx = lat.index(0, 2, 2, 2);
        assert!(max_abs2(&field.ricci[idx]) < 1e-4, "ricci = {:?}", field.ricci[idx]);

        let riemann = field.riemann(&lat, idx);
        let max_riemann = riemann.iter().flatten().flatten().flatten().fold(0.0, |m: f64, v| m.max(v.abs()));
        assert!(max_riemann > 5e-4, "riemann max = {max_riemann}");

        // g^{μν} G_{μν} = −R
        let tr = trace(&field.inverse[idx], &field.einstein[idx]);
        assert!((tr + field.ricci_scalar[idx]).abs() < 1e-12);

        // areal radius r = ρ (1 + rs/4ρ)²
        let r = 10.0 * (1.0f64 + 2.0 / 40.0).powi(2);
        let expected = 12.0 * 4.0 / r.powi(6);
        let k = field.kretschmann[idx];
        assert!(((k - expected) / expected).abs() < 1e-2, "K = {k}, expected {expected}");
        assert!(field.stats().kretschmann.max >= k.abs());
    }

    #[test]
    fn schwarzschild_kretschmann_matches_closed_form() {
        let rs = 2.0;
        let r = 10.0;
        let model = SchwarzschildSpherical { rs };
        let x = [0.0, r, 1.0, 0.4];
        let riemann = riemann_at(&model, &x, 1e-4);
        let g = model.metric_at(&x);
        let g_inv = g.inverse().unwrap();
        let k = kretschmann(&g, &g_inv, &riemann);
        let expected = 12.0 * rs * rs / r.powi(6);
        assert!(((k - expected) / expected).abs() < 1e-4, "K = {k}, expected {expected}");

        let ric = ricci_from_riemann(&riemann);
        assert!(max_abs2(&ric) < 1e-6);
    }

    #[test]
    fn riemann_antisymmetric_in_last_pair() {
        let model = SchwarzschildSpherical { rs: 1.0 };
        let r = riemann_at(&model, &[0.0, 6.0, 0.8, 0.0], 1e-4);
        for a in 0..4 {
            for b in 0..4 {
                for m in 0..4 {
                    assert_eq!(r[a][b][m][m], 0.0);
                    for n in 0..4 {
                        assert_eq!(r[a][b][m][n], -r[a][b][n][m]);
                    }
                }
            }
        }
    }

    #[test]
    fn stats_report_maxima() {
        let lat = Lattice::spatial([2, 1, 1], 1.0, [0.0; 3], Boundary::Periodic).unwrap();
        let field = CurvatureField::compute(&lat, vec![Metric::minkowski(); 2], NanPolicy::Clamp).unwrap();
        let stats = field.stats();
        assert_eq!(stats.ricci_scalar.max, 0.0);
        assert_eq!(stats.degenerate_count, 0);
    }
}
