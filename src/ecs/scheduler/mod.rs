//! ecs scheduler and dispatcher
//!
//! runs systems in order and collects the events they raise

use super::{Entity, StepContext, System, World};
use crate::error::FabricResult;

/// something a system noticed about a particle during a step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticleEvent {
    /// the particle moved outside the region the background describes
    LeftLattice(Entity),
    /// a non-finite step was discarded and the previous state kept
    Clamped(Entity),
}

impl ParticleEvent {
    pub fn entity(&self) -> Entity {
        match self {
            ParticleEvent::LeftLattice(e) | ParticleEvent::Clamped(e) => *e,
        }
    }
}

/// event queue for ecs events
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<ParticleEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, event: ParticleEvent) {
        self.events.push(event);
    }
    pub fn len(&self) -> usize {
        self.events.len()
    }
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
    pub fn drain(&mut self) -> Vec<ParticleEvent> {
        std::mem::take(&mut self.events)
    }
}

/// scheduler: runs systems in order
#[derive(Default)]
pub struct Scheduler {
    systems: Vec<Box<dyn System>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_system<S: System + 'static>(&mut self, system: S) {
        self.systems.push(Box::new(system));
    }
    pub fn len(&self) -> usize {
        self.systems.len()
    }
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
    /// stops at the first system that fails
    pub fn run(&mut self, world: &mut World, ctx: &StepContext<'_>, events: &mut EventQueue) -> FabricResult<()> {
        for sys in self.systems.iter_mut() {
            sys.run(world, ctx, events)?;
        }
        Ok(())
    }
}

/// dispatcher: runs systems and hands back the events they raised
#[derive(Default)]
pub struct Dispatcher {
    scheduler: Scheduler,
    event_queue: EventQueue,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_system<S: System + 'static>(&mut self, system: S) {
        self.scheduler.add_system(system);
    }
    pub fn push_event(&mut self, event: ParticleEvent) {
        self.event_queue.push(event);
    }
    pub fn run(&mut self, world: &mut World, ctx: &StepContext<'_>) -> FabricResult<Vec<ParticleEvent>> {
        if let Err(e) = self.scheduler.run(world, ctx, &mut self.event_queue) {
            self.event_queue.drain();
            return Err(e);
        }
        let events = self.event_queue.drain();
        if !events.is_empty() {
            log::debug!("dispatcher: {} particle events", events.len());
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesic::AnalyticBackground;
    use crate::metric::MetricKind;
    use crate::sanitize::NanPolicy;

    struct Flagger;

    impl System for Flagger {
        fn run(&mut self, world: &mut World, _ctx: &StepContext<'_>, events: &mut EventQueue) -> FabricResult<()> {
            let e = world.create_entity();
            events.push(ParticleEvent::Clamped(e));
            Ok(())
        }
    }

    #[test]
    fn dispatcher_drains_events_each_run() {
        let bg = AnalyticBackground { model: MetricKind::Minkowski, field: None };
        let ctx = StepContext { background: &bg, dt: 0.1, c: 1.0, policy: NanPolicy::Clamp };
        let mut world = World::new();
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_system(Flagger);
        dispatcher.add_system(Flagger);
        dispatcher.push_event(ParticleEvent::LeftLattice(Entity(99)));
        let events = dispatcher.run(&mut world, &ctx).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].entity(), Entity(99));
        assert_eq!(dispatcher.run(&mut world, &ctx).unwrap().len(), 2);
        assert_eq!(world.entity_count(), 4);
    }
}
