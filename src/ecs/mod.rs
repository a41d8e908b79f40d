//! ECS core traits and types for the particle side of the fabric

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};

use crate::error::{FabricError, FabricResult};
use crate::geodesic::{rk4_step, Background, ParticleState};
use crate::relativity::{FourVector, FourVelocity};
use crate::sanitize::NanPolicy;

pub mod scheduler;

pub use scheduler::{Dispatcher, EventQueue, ParticleEvent, Scheduler};

/// advances every particle one coordinate step through the background
pub struct GeodesicSystem;

impl System for GeodesicSystem {
    fn run(&mut self, world: &mut World, ctx: &StepContext<'_>, events: &mut EventQueue) -> FabricResult<()> {
        // integrate everyone first so a rejected step leaves the world as it was
        let mut moved = Vec::new();
        for entity in world.entities_with::<Position>() {
            let (Some(pos), Some(vel), Some(mass)) = (
                world.get_component::<Position>(entity),
                world.get_component::<Velocity>(entity),
                world.get_component::<Mass>(entity),
            ) else {
                continue;
            };
            let charge = world.get_component::<Charge>(entity).map_or(0.0, |q| q.0);
            let state = ParticleState { x: pos.0, u: vel.0 };
            let q_over_m = if mass.0 > 0.0 { charge / mass.0 } else { 0.0 };

            // x⁰ = ct advances by c·dt, and dx⁰/dτ = u⁰
            let gamma = vel.0.gamma(ctx.c);
            let dtau = if gamma > 0.0 { ctx.dt / gamma } else { ctx.dt };

            let step = rk4_step(ctx.background, &state, q_over_m, dtau, ctx.c, ctx.policy)?;
            moved.push((entity, step));
        }

        for (entity, step) in moved {
            if step.clamped {
                events.push(ParticleEvent::Clamped(entity));
            }
            if let Some(p) = world.get_component_mut::<Position>(entity) {
                p.0 = step.state.x;
            }
            if let Some(v) = world.get_component_mut::<Velocity>(entity) {
                v.0 = step.state.u;
            }
            if !ctx.background.contains(&step.state.x.as_array()) {
                log::info!("particle {entity:?} left the lattice at {:?}", step.state.x);
                events.push(ParticleEvent::LeftLattice(entity));
            }
        }
        Ok(())
    }
}

/// unique identifier for an entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(pub u32);

/// trait for all components.
pub trait Component: Send + Sync {}

/// spacetime position (ct, x, y, z)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position(pub FourVector);
impl Component for Position {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity(pub FourVelocity);
impl Component for Velocity {}

/// rest mass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mass(pub f64);
impl Component for Mass {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Charge(pub f64);
impl Component for Charge {}

/// what a system sees of the rest of the simulation during one step
pub struct StepContext<'a> {
    pub background: &'a dyn Background,
    /// coordinate-time step
    pub dt: f64,
    pub c: f64,
    pub policy: NanPolicy,
}

/// trait for all systems.
pub trait System {
    fn run(&mut self, world: &mut World, ctx: &StepContext<'_>, events: &mut EventQueue) -> FabricResult<()>;
}

/// type-erased per-component storage
trait Storage: Send + Sync {
    fn remove(&mut self, entity: Entity) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component + 'static> Storage for HashMap<Entity, T> {
    fn remove(&mut self, entity: Entity) -> bool {
        HashMap::remove(self, &entity).is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// the world struct holds all entities and components.
#[derive(Default)]
pub struct World {
    next_entity: u32,
    alive_entities: HashSet<Entity>,
    components: HashMap<TypeId, Box<dyn Storage>>,
}

impl World {
    /// create a new, empty world
    pub fn new() -> Self {
        log::debug!("ecs: world created");
        Self::default()
    }

    /// create a new entity and return its id
    pub fn create_entity(&mut self) -> Entity {
        let entity = Entity(self.next_entity);
        self.next_entity += 1;
        self.alive_entities.insert(entity);
        log::debug!("ecs: entity {entity:?} created");
        entity
    }

    /// delete an entity and remove its components; false if it was not alive
    pub fn delete_entity(&mut self, entity: Entity) -> bool {
        if !self.alive_entities.remove(&entity) {
            return false;
        }
        let removed = self.components.values_mut().map(|s| s.remove(entity)).filter(|r| *r).count();
        log::debug!("ecs: entity {entity:?} deleted with {removed} components");
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.alive_entities.contains(&entity)
    }

    pub fn entity_count(&self) -> usize {
        self.alive_entities.len()
    }

    /// register a component type
    pub fn register_component<T: Component + 'static>(&mut self) {
        let type_id = TypeId::of::<T>();
        if !self.components.contains_key(&type_id) {
            self.components.insert(type_id, Box::new(HashMap::<Entity, T>::new()));
            log::debug!("ecs: registered component type {}", std::any::type_name::<T>());
        }
    }

    fn storage<T: Component + 'static>(&self) -> Option<&HashMap<Entity, T>> {
        self.components
            .get(&TypeId::of::<T>())
            .and_then(|s| s.as_any().downcast_ref::<HashMap<Entity, T>>())
    }

    fn storage_mut<T: Component + 'static>(&mut self) -> Option<&mut HashMap<Entity, T>> {
        self.components
            .get_mut(&TypeId::of::<T>())
            .and_then(|s| s.as_any_mut().downcast_mut::<HashMap<Entity, T>>())
    }

    /// add (or replace) a component on a live entity
    pub fn add_component<T: Component + 'static>(&mut self, entity: Entity, component: T) -> FabricResult<()> {
        if !self.is_alive(entity) {
            return Err(FabricError::Ecs(format!("entity {entity:?} is not alive")));
        }
        let storage = self.storage_mut::<T>().ok_or_else(|| {
            FabricError::Ecs(format!("component type {} not registered", std::any::type_name::<T>()))
        })?;
        storage.insert(entity, component);
        Ok(())
    }

    /// get a component for an entity
    pub fn get_component<T: Component + 'static>(&self, entity: Entity) -> Option<&T> {
        self.storage::<T>().and_then(|map| map.get(&entity))
    }

    pub fn get_component_mut<T: Component + 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        self.storage_mut::<T>().and_then(|map| map.get_mut(&entity))
    }

    pub fn remove_component<T: Component + 'static>(&mut self, entity: Entity) -> Option<T> {
        self.storage_mut::<T>().and_then(|map| map.remove(&entity))
    }

    /// live entities carrying a `T`, in creation order
    pub fn entities_with<T: Component + 'static>(&self) -> Vec<Entity> {
        let mut out: Vec<Entity> = self
            .storage::<T>()
            .map(|map| map.keys().copied().filter(|e| self.is_alive(*e)).collect())
            .unwrap_or_default();
        out.sort();
        out
    }
}
