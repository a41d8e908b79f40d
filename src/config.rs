//! run configuration for a fabric simulation

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FabricError, FabricResult};
use crate::gravity::GravityKind;
use crate::lattice::{Boundary, Lattice, MAX_RESOLUTION};
use crate::metric::MetricKind;
use crate::sanitize::NanPolicy;

/// physical constants; c = ħ = 1 by default, with a weak G so that the
/// lattice fields stay in the |Φ| ≪ c² regime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constants {
    /// speed of light
    pub c: f64,
    /// Newton's constant
    pub g: f64,
    /// reduced Planck constant
    pub hbar: f64,
}

impl Default for Constants {
    fn default() -> Self {
        Self { c: 1.0, g: 1e-3, hbar: 1.0 }
    }
}

/// spatial lattice; time is advanced by stepping, not stored as an axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatticeConfig {
    pub shape: [usize; 3],
    pub spacing: f64,
    pub origin: [f64; 3],
    pub boundary: Boundary,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            shape: [16, 16, 16],
            spacing: 0.25,
            origin: [0.0; 3],
            boundary: Boundary::Periodic,
        }
    }
}

impl LatticeConfig {
    pub fn build(&self) -> FabricResult<Lattice> {
        Lattice::spatial(self.shape, self.spacing, self.origin, self.boundary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalarConfig {
    pub mass: f64,
    pub amplitude: f64,
    pub width: f64,
    /// gaussian centre; the lattice centre when absent
    pub centre: Option<[f64; 3]>,
    /// half-width of seeded uniform noise added to φ
    pub noise_amplitude: f64,
}

impl Default for ScalarConfig {
    fn default() -> Self {
        Self {
            mass: 1.0,
            amplitude: 0.1,
            width: 0.5,
            centre: None,
            noise_amplitude: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmConfig {
    pub uniform_e: [f64; 3],
    pub uniform_b: [f64; 3],
    /// evolve the radiation part of the four-potential
    pub evolve: bool,
    pub pulse_amplitude: f64,
    pub pulse_width: f64,
    /// covariant component (0..4) carrying the initial pulse
    pub pulse_component: usize,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            uniform_e: [0.0; 3],
            uniform_b: [0.0, 0.0, 0.1],
            evolve: true,
            pulse_amplitude: 0.0,
            pulse_width: 0.5,
            pulse_component: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiracConfig {
    pub enabled: bool,
    pub mass: f64,
    pub charge: f64,
    pub packet_width: f64,
    pub momentum: [f64; 3],
    pub centre: Option<[f64; 3]>,
}

impl Default for DiracConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mass: 1.0,
            charge: -1.0,
            packet_width: 0.5,
            momentum: [0.0; 3],
            centre: None,
        }
    }
}

/// a charged test particle, velocities in units of length per time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleConfig {
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub mass: f64,
    #[serde(default)]
    pub charge: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    pub lattice: LatticeConfig,
    pub constants: Constants,
    pub dt: f64,
    pub steps: usize,
    pub scalar: ScalarConfig,
    pub em: EmConfig,
    pub dirac: DiracConfig,
    pub gravity: GravityKind,
    pub background: MetricKind,
    pub particles: Vec<ParticleConfig>,
    pub nan_policy: NanPolicy,
    pub seed: u64,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            lattice: LatticeConfig::default(),
            constants: Constants::default(),
            dt: 0.05,
            steps: 10,
            scalar: ScalarConfig::default(),
            em: EmConfig::default(),
            dirac: DiracConfig::default(),
            gravity: GravityKind::WeakField(Default::default()),
            background: MetricKind::Minkowski,
            particles: vec![ParticleConfig {
                position: [2.0, 2.0, 2.0],
                velocity: [0.1, 0.0, 0.0],
                mass: 1.0,
                charge: 1.0,
            }],
            nan_policy: NanPolicy::Clamp,
            seed: 0,
        }
    }
}

fn finite_all(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

impl FabricConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> FabricResult<()> {
        let k = &self.constants;
        for (name, v) in [("c", k.c), ("g", k.g), ("hbar", k.hbar)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(FabricError::Config(format!("constant {name} must be finite and > 0, got {v}")));
            }
        }

        let lat = &self.lattice;
        for &n in &lat.shape {
            if n == 0 || n > MAX_RESOLUTION {
                return Err(FabricError::Config(format!(
                    "lattice shape {:?} must have every axis in 1..={MAX_RESOLUTION}",
                    lat.shape
                )));
            }
        }
        if !lat.spacing.is_finite() || lat.spacing <= 0.0 {
            return Err(FabricError::Config(format!("lattice spacing must be finite and > 0, got {}", lat.spacing)));
        }
        if !finite_all(&lat.origin) {
            return Err(FabricError::Config("lattice origin must be finite".to_string()));
        }

        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(FabricError::Config(format!("dt must be finite and > 0, got {}", self.dt)));
        }
        let cfl = lat.spacing / 3.0_f64.sqrt();
        if k.c * self.dt >= cfl {
            return Err(FabricError::Config(format!(
                "c·dt = {} violates the CFL limit spacing/√3 = {cfl}",
                k.c * self.dt
            )));
        }

        let s = &self.scalar;
        if !finite_all(&[s.mass, s.amplitude, s.width, s.noise_amplitude]) || s.mass < 0.0 || s.width <= 0.0 {
            return Err(FabricError::Config(format!(
                "scalar field needs finite values, mass >= 0 and width > 0, got mass {} width {}",
                s.mass, s.width
            )));
        }
        if s.noise_amplitude < 0.0 {
            return Err(FabricError::Config(format!("noise_amplitude must be >= 0, got {}", s.noise_amplitude)));
        }

        let em = &self.em;
        if !finite_all(&em.uniform_e) || !finite_all(&em.uniform_b) || !finite_all(&[em.pulse_amplitude, em.pulse_width]) {
            return Err(FabricError::Config("em field values must be finite".to_string()));
        }
        if em.pulse_width <= 0.0 || em.pulse_component > 3 {
            return Err(FabricError::Config(format!(
                "em pulse needs width > 0 and component in 0..4, got width {} component {}",
                em.pulse_width, em.pulse_component
            )));
        }

        let d = &self.dirac;
        if d.enabled {
            if !finite_all(&[d.mass, d.charge, d.packet_width]) || !finite_all(&d.momentum) {
                return Err(FabricError::Config("dirac field values must be finite".to_string()));
            }
            if d.mass < 0.0 || d.packet_width <= 0.0 {
                return Err(FabricError::Config(format!(
                    "dirac field needs mass >= 0 and packet_width > 0, got mass {} width {}",
                    d.mass, d.packet_width
                )));
            }
        }

        if let GravityKind::WeakField(w) = &self.gravity {
            if !w.tolerance.is_finite() || w.tolerance <= 0.0 || w.max_iter == 0 {
                return Err(FabricError::Config(format!(
                    "weak-field gravity needs tolerance > 0 and max_iter >= 1, got {} and {}",
                    w.tolerance, w.max_iter
                )));
            }
        }

        self.background.validate()?;

        let lattice = lat.build()?;
        for (i, p) in self.particles.iter().enumerate() {
            if !finite_all(&p.position) || !finite_all(&p.velocity) || !p.mass.is_finite() || !p.charge.is_finite() {
                return Err(FabricError::Config(format!("particle {i} has non-finite values")));
            }
            if p.mass <= 0.0 {
                return Err(FabricError::Config(format!("particle {i} mass must be > 0, got {}", p.mass)));
            }
            let v2: f64 = p.velocity.iter().map(|v| v * v).sum();
            if v2 >= k.c * k.c {
                return Err(FabricError::Config(format!("particle {i} speed {} is not below c", v2.sqrt())));
            }
            let x = [0.0, p.position[0], p.position[1], p.position[2]];
            if !lattice.contains(&x) {
                return Err(FabricError::Config(format!("particle {i} at {:?} is outside the lattice", p.position)));
            }
        }
        Ok(())
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> FabricResult<Self> {
        serde_json::from_str(json).map_err(|e| FabricError::Config(format!("JSON parse error: {e}")))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> FabricResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
