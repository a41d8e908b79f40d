//! the simulation loop tying fields, gravity, curvature and particles together
//!
//! one step advances the matter fields, turns their energy into a Newtonian
//! potential, perturbs the background metric with it, recomputes the
//! curvature tensors and then moves the test particles through the result.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{Constants, FabricConfig};
use crate::curvature::CurvatureField;
use crate::dirac::SpinorField;
use crate::dump::{
    create_dump_file, write_metric_field, write_scalar_field, write_snapshot_json, write_tensor2_field,
    FabricSnapshot, ParticleSnapshot,
};
use crate::ecs::{Charge, Dispatcher, GeodesicSystem, Mass, ParticleEvent, Position, StepContext, Velocity, World};
use crate::electromagnetism::{lattice_centre, FieldTensor, PotentialField};
use crate::error::FabricResult;
use crate::geodesic::{LatticeBackground, ParticleState};
use crate::gravity::{perturb_background, GravityModel};
use crate::lattice::Lattice;
use crate::metric::{metric_field, Metric};
use crate::relativity::{FourVector, FourVelocity};
use crate::sanitize::{sanitize_slice, FieldStats};
use crate::scalar_field::ScalarField;

/// gravity and curvature derived from one set of matter fields
struct Geometry {
    newtonian: Vec<f64>,
    curvature: CurvatureField,
    field_tensors: Vec<FieldTensor>,
    clamped: usize,
}

pub struct Fabric {
    config: FabricConfig,
    lattice: Lattice,
    /// sampled background metric, before the weak-field perturbation
    background: Vec<Metric>,
    scalar: ScalarField,
    potential: PotentialField,
    dirac: Option<SpinorField>,
    /// Newtonian potential Φ of the last gravity solve
    newtonian: Vec<f64>,
    curvature: CurvatureField,
    field_tensors: Vec<FieldTensor>,
    world: World,
    dispatcher: Dispatcher,
    step: usize,
    time: f64,
    clamped_values: usize,
    particles_removed: usize,
}

impl Fabric {
    pub fn new(config: FabricConfig) -> FabricResult<Self> {
        config.validate()?;
        let lattice = config.lattice.build()?;
        let constants = config.constants;
        let centre = lattice_centre(&lattice);

        let background = metric_field(&lattice, &config.background);

        let s = &config.scalar;
        let mut scalar = ScalarField::gaussian(&lattice, s.amplitude, s.width, s.centre.unwrap_or(centre), s.mass);
        if s.noise_amplitude > 0.0 {
            scalar.add_noise(s.noise_amplitude, config.seed);
        }

        let em = &config.em;
        let mut potential = PotentialField::uniform(&lattice, em.uniform_e, em.uniform_b);
        if em.pulse_amplitude != 0.0 {
            potential.add_pulse(&lattice, em.pulse_component, em.pulse_amplitude, em.pulse_width, centre);
        }

        let d = &config.dirac;
        let dirac = d.enabled.then(|| {
            SpinorField::wave_packet(
                &lattice,
                d.mass,
                d.charge,
                d.packet_width,
                d.centre.unwrap_or(centre),
                d.momentum,
                &constants,
            )
        });

        let mut world = World::new();
        world.register_component::<Position>();
        world.register_component::<Velocity>();
        world.register_component::<Mass>();
        world.register_component::<Charge>();
        for p in &config.particles {
            let e = world.create_entity();
            let [x, y, z] = p.position;
            let [vx, vy, vz] = p.velocity;
            world.add_component(e, Position(FourVector::new(0.0, x, y, z)))?;
            world.add_component(e, Velocity(FourVelocity::from_3velocity(vx, vy, vz, constants.c)))?;
            world.add_component(e, Mass(p.mass))?;
            world.add_component(e, Charge(p.charge))?;
        }

        let mut dispatcher = Dispatcher::new();
        dispatcher.add_system(GeodesicSystem);

        let n = lattice.len();
        let curvature = CurvatureField::compute(&lattice, background.clone(), config.nan_policy)?;
        let field_tensors = potential.field_tensors(&lattice, constants.c)?;

        let mut fabric = Fabric {
            config,
            lattice,
            background,
            scalar,
            potential,
            dirac,
            newtonian: vec![0.0; n],
            curvature,
            field_tensors,
            world,
            dispatcher,
            step: 0,
            time: 0.0,
            clamped_values: 0,
            particles_removed: 0,
        };
        let geometry = fabric.geometry(&fabric.scalar, &fabric.potential, fabric.dirac.as_ref())?;
        fabric.commit_geometry(geometry);
        log::info!(
            "fabric: lattice {:?}, {} particles, dirac {}",
            fabric.lattice.shape,
            fabric.world.entity_count(),
            if fabric.dirac.is_some() { "on" } else { "off" }
        );
        Ok(fabric)
    }

    /// mass density ρ = (u_scalar + u_em)/c² + m ψ†ψ
    pub fn mass_density(&self) -> FabricResult<Vec<f64>> {
        self.mass_density_of(&self.scalar, &self.potential, self.dirac.as_ref())
    }

    fn mass_density_of(
        &self,
        scalar: &ScalarField,
        potential: &PotentialField,
        dirac: Option<&SpinorField>,
    ) -> FabricResult<Vec<f64>> {
        let constants = &self.config.constants;
        let c2 = constants.c * constants.c;
        let us = scalar.energy_densities(&self.lattice, constants);
        let ue = potential.energy_density(&self.lattice, constants.c)?;
        let mut rho: Vec<f64> = us.iter().zip(&ue).map(|(us, ue)| (us + ue) / c2).collect();
        if let Some(dirac) = dirac {
            for (r, m) in rho.iter_mut().zip(dirac.mass_density()) {
                *r += m;
            }
        }
        Ok(rho)
    }

    /// energy density → Poisson → weak-field metric → curvature, for the
    /// given matter fields. the Poisson solve starts from the last potential.
    fn geometry(
        &self,
        scalar: &ScalarField,
        potential: &PotentialField,
        dirac: Option<&SpinorField>,
    ) -> FabricResult<Geometry> {
        let constants = self.config.constants;
        let policy = self.config.nan_policy;

        let mut rho = self.mass_density_of(scalar, potential, dirac)?;
        let clamped = sanitize_slice(&mut rho, policy, "mass density")?;

        let (newtonian, metrics) =
            match self.config.gravity.potential(&self.lattice, &rho, Some(self.newtonian.as_slice()), &constants)? {
                Some(solution) => {
                    let metrics = perturb_background(&self.background, &solution.potential, constants.c)?;
                    (solution.potential, metrics)
                }
                None => (vec![0.0; self.lattice.len()], self.background.clone()),
            };

        Ok(Geometry {
            newtonian,
            curvature: CurvatureField::compute(&self.lattice, metrics, policy)?,
            field_tensors: potential.field_tensors(&self.lattice, constants.c)?,
            clamped,
        })
    }

    fn commit_geometry(&mut self, geometry: Geometry) {
        self.newtonian = geometry.newtonian;
        self.curvature = geometry.curvature;
        self.field_tensors = geometry.field_tensors;
        self.clamped_values += geometry.clamped;
    }

    /// advance every field and particle by one `dt`. the fields are stepped
    /// on copies and committed only once every stage has succeeded, so an
    /// error under `NanPolicy::Reject` leaves the fabric at the previous step.
    pub fn step(&mut self) -> FabricResult<()> {
        let constants = self.config.constants;
        let dt = self.config.dt;
        let policy = self.config.nan_policy;

        let mut scalar = self.scalar.clone();
        let mut potential = self.potential.clone();
        let mut dirac = self.dirac.clone();
        let mut clamped = scalar.step(&self.lattice, dt, &constants, policy)?;
        if self.config.em.evolve && potential.has_radiation() {
            clamped += potential.step(&self.lattice, dt, constants.c, policy)?;
        }
        if let Some(dirac) = dirac.as_mut() {
            clamped += dirac.step_rk4(&self.lattice, dt, Some(&potential), &constants, policy)?;
        }
        let geometry = self.geometry(&scalar, &potential, dirac.as_ref())?;

        let background = LatticeBackground {
            lattice: &self.lattice,
            curvature: &geometry.curvature,
            fields: Some(geometry.field_tensors.as_slice()),
        };
        let ctx = StepContext { background: &background, dt, c: constants.c, policy };
        let events = self.dispatcher.run(&mut self.world, &ctx)?;

        self.scalar = scalar;
        self.potential = potential;
        self.dirac = dirac;
        self.commit_geometry(geometry);
        self.clamped_values += clamped;
        for event in events {
            match event {
                ParticleEvent::LeftLattice(entity) => {
                    if self.world.delete_entity(entity) {
                        self.particles_removed += 1;
                    }
                }
                ParticleEvent::Clamped(entity) => {
                    log::debug!("fabric: particle {entity:?} kept its previous state");
                    self.clamped_values += 1;
                }
            }
        }

        self.step += 1;
        self.time += dt;
        log::debug!(
            "fabric: step {} t={:.4} max|R|={:.3e} particles={}",
            self.step,
            self.time,
            self.curvature.stats().ricci_scalar.max,
            self.world.entity_count()
        );
        Ok(())
    }

    pub fn run(&mut self, steps: usize) -> FabricResult<()> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    pub fn constants(&self) -> &Constants {
        &self.config.constants
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn scalar(&self) -> &ScalarField {
        &self.scalar
    }

    pub fn potential(&self) -> &PotentialField {
        &self.potential
    }

    pub fn dirac(&self) -> Option<&SpinorField> {
        self.dirac.as_ref()
    }

    pub fn newtonian_potential(&self) -> &[f64] {
        &self.newtonian
    }

    pub fn curvature(&self) -> &CurvatureField {
        &self.curvature
    }

    pub fn field_tensors(&self) -> &[FieldTensor] {
        &self.field_tensors
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn step_count(&self) -> usize {
        self.step
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// particle states in creation order
    pub fn particles(&self) -> Vec<ParticleSnapshot> {
        self.world
            .entities_with::<Position>()
            .into_iter()
            .filter_map(|e| {
                let x = self.world.get_component::<Position>(e)?.0;
                let u = self.world.get_component::<Velocity>(e)?.0;
                let mass = self.world.get_component::<Mass>(e).map_or(0.0, |m| m.0);
                let charge = self.world.get_component::<Charge>(e).map_or(0.0, |q| q.0);
                Some(ParticleSnapshot { entity: e.0, state: ParticleState { x, u }, mass, charge })
            })
            .collect()
    }

    pub fn snapshot(&self) -> FabricResult<FabricSnapshot> {
        let constants = &self.config.constants;
        let em = self.potential.energy_density(&self.lattice, constants.c)?;
        let volume = self.lattice.cell_volume();
        let dirac_potential = Some(&self.potential);
        Ok(FabricSnapshot {
            step: self.step,
            time: self.time,
            particles: self.particles(),
            scalar: FieldStats::of(self.scalar.phi.iter().copied()),
            scalar_energy: self.scalar.total_energy(&self.lattice, constants),
            em_energy: em.iter().sum::<f64>() * volume,
            dirac_norm: self.dirac.as_ref().map(|d| d.norm(&self.lattice)),
            dirac_energy: self
                .dirac
                .as_ref()
                .map(|d| d.energy_expectation(&self.lattice, dirac_potential, constants)),
            newtonian_potential: FieldStats::of(self.newtonian.iter().copied()),
            curvature: self.curvature.stats(),
            clamped_values: self.clamped_values,
            particles_removed: self.particles_removed,
        })
    }

    /// write the metric, curvature and field dumps plus `snapshot.json`
    /// into `dir`, creating it if needed
    pub fn dump<P: AsRef<Path>>(&self, dir: P) -> FabricResult<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let lat = &self.lattice;
        let curv = &self.curvature;

        write_file(dir.join("metric.txt"), |out| write_metric_field(out, "metric", lat, &curv.metrics))?;
        write_file(dir.join("ricci.txt"), |out| write_tensor2_field(out, "ricci", lat, &curv.ricci))?;
        write_file(dir.join("einstein.txt"), |out| write_tensor2_field(out, "einstein", lat, &curv.einstein))?;
        write_file(dir.join("ricci_scalar.txt"), |out| {
            write_scalar_field(out, "ricci_scalar", lat, &curv.ricci_scalar)
        })?;
        write_file(dir.join("kretschmann.txt"), |out| {
            write_scalar_field(out, "kretschmann", lat, &curv.kretschmann)
        })?;
        write_file(dir.join("field_tensor.txt"), |out| {
            write_tensor2_field(out, "field_tensor", lat, &self.field_tensors)
        })?;
        write_file(dir.join("phi.txt"), |out| write_scalar_field(out, "phi", lat, &self.scalar.phi))?;
        write_file(dir.join("newtonian.txt"), |out| write_scalar_field(out, "newtonian", lat, &self.newtonian))?;

        write_snapshot_json(dir.join("snapshot.json"), &self.snapshot()?)?;
        log::info!("fabric: dumped step {} to {}", self.step, dir.display());
        Ok(())
    }
}

fn write_file<F>(path: PathBuf, write: F) -> FabricResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> FabricResult<()>,
{
    let mut out = create_dump_file(path)?;
    write(&mut out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LatticeConfig, ParticleConfig};
    use crate::gravity::GravityKind;
    use crate::error::FabricError;
    use crate::lattice::Boundary;
    use crate::sanitize::NanPolicy;
    use num_complex::Complex64;

    fn small_config() -> FabricConfig {
        FabricConfig {
            lattice: LatticeConfig { shape: [8, 8, 8], spacing: 0.25, origin: [0.0; 3], boundary: Boundary::Periodic },
            particles: vec![ParticleConfig { position: [1.0, 1.0, 1.0], velocity: [0.1, 0.0, 0.0], mass: 1.0, charge: 1.0 }],
            ..FabricConfig::default()
        }
    }

    /// no matter, no fields, no gravity
    fn empty_config() -> FabricConfig {
        let mut config = small_config();
        config.scalar.amplitude = 0.0;
        config.em.uniform_b = [0.0; 3];
        config.dirac.enabled = false;
        config.gravity = GravityKind::Decoupled;
        config
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = small_config();
        config.dt = 1.0;
        assert!(Fabric::new(config).is_err());
    }

    #[test]
    fn run_advances_time_and_keeps_dirac_norm() {
        let mut fabric = Fabric::new(small_config()).unwrap();
        fabric.run(3).unwrap();
        assert_eq!(fabric.step_count(), 3);
        assert!((fabric.time() - 0.15).abs() < 1e-12);
        let snap = fabric.snapshot().unwrap();
        assert_eq!(snap.particles.len(), 1);
        assert!((snap.particles[0].state.x.t - 0.15).abs() < 1e-4);
        assert!((snap.dirac_norm.unwrap() - 1.0).abs() < 1e-3);
        assert_eq!(snap.clamped_values, 0);
        assert_eq!(snap.curvature.ricci_scalar.nan_count, 0);
    }

    #[test]
    fn matter_sources_a_potential_well() {
        let fabric = Fabric::new(small_config()).unwrap();
        let phi = fabric.newtonian_potential();
        let centre = fabric.lattice().index(0, 4, 4, 4);
        let corner = fabric.lattice().index(0, 0, 0, 0);
        assert!(phi[centre] < phi[corner]);
        assert!(fabric.curvature().metrics[centre].g[0][0] > -1.0);
    }

    #[test]
    fn empty_fabric_stays_flat_and_particles_move_straight() {
        let mut fabric = Fabric::new(empty_config()).unwrap();
        fabric.run(4).unwrap();
        let stats = fabric.curvature().stats();
        assert_eq!(stats.ricci_scalar.max, 0.0);
        assert!(fabric.newtonian_potential().iter().all(|p| *p == 0.0));
        let p = &fabric.particles()[0];
        assert!((p.state.x.x - (1.0 + 0.1 * 0.2)).abs() < 1e-9);
        assert!((p.state.x.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejected_step_leaves_the_fabric_unchanged() {
        let mut config = small_config();
        config.nan_policy = NanPolicy::Reject;
        let mut fabric = Fabric::new(config).unwrap();
        fabric.step().unwrap();

        let phi = fabric.scalar().phi.clone();
        let newtonian = fabric.newtonian_potential().to_vec();
        let x = fabric.particles()[0].state.x;
        fabric.dirac.as_mut().unwrap().psi[0][0] = Complex64::new(f64::NAN, 0.0);

        let err = fabric.step().unwrap_err();
        assert!(matches!(err, FabricError::NonFinite { .. }));
        assert_eq!(fabric.step_count(), 1);
        assert!((fabric.time() - fabric.config().dt).abs() < 1e-15);
        assert_eq!(fabric.scalar().phi, phi);
        assert_eq!(fabric.newtonian_potential(), newtonian.as_slice());
        assert_eq!(fabric.particles()[0].state.x, x);
        assert!(fabric.dirac().unwrap().psi[0][0].re.is_nan());
        assert!(fabric.dirac().unwrap().psi[1][0].is_finite());
    }

    #[test]
    fn particles_leaving_the_lattice_are_removed() {
        let mut config = empty_config();
        config.lattice.boundary = Boundary::OneSided;
        config.particles = vec![
            ParticleConfig { position: [1.8, 1.0, 1.0], velocity: [0.9, 0.0, 0.0], mass: 1.0, charge: 0.0 },
            ParticleConfig { position: [1.0, 1.0, 1.0], velocity: [0.0; 3], mass: 1.0, charge: 0.0 },
        ];
        let mut fabric = Fabric::new(config).unwrap();
        fabric.run(4).unwrap();
        assert_eq!(fabric.world().entity_count(), 1);
        let snap = fabric.snapshot().unwrap();
        assert_eq!(snap.particles_removed, 1);
        assert_eq!(snap.particles[0].entity, 1);
    }

    #[test]
    fn dump_writes_every_file() {
        let dir = std::env::temp_dir().join(format!("fabric-dump-{}", std::process::id()));
        let mut fabric = Fabric::new(empty_config()).unwrap();
        fabric.step().unwrap();
        fabric.dump(&dir).unwrap();
        let names = [
            "metric.txt",
            "ricci.txt",
            "einstein.txt",
            "ricci_scalar.txt",
            "kretschmann.txt",
            "field_tensor.txt",
            "phi.txt",
            "newtonian.txt",
        ];
        for name in names {
            let text = std::fs::read_to_string(dir.join(name)).unwrap();
            assert!(text.starts_with(&format!("# {}", name.trim_end_matches(".txt"))));
            assert!(text.lines().count() > 512);
        }
        let json = std::fs::read_to_string(dir.join("snapshot.json")).unwrap();
        let snap: FabricSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap.step, 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
