//! The scene model: actors, components, transforms and lights.
//!
//! A [`Scene`] is a flat list of [`Actor`]s plus the lights that illuminate
//! them. Each frame, [`Scene::update`] runs in a fixed order:
//!
//! 1. every actor, in insertion order, starts any new components and then
//!    updates all of them in component order
//! 2. structural changes queued by scripts ([`SceneCommand`]) are applied
//! 3. dirty transforms are resolved into model matrices
//! 4. lights that follow an actor pick up its world position
//!
//! Actors are never reparented; there is no hierarchy.
//!
//! # Example
//!
//! ```ignore
//! let mut scene = Scene::new();
//! let spinner = scene.add_actor(
//!     Actor::new("cube", ActorKind::Mesh)
//!         .with_component(MeshComponent::new(cube, material))
//!         .with_component(ScriptComponent::from_fn(|ctx| {
//!             ctx.transform.rotate(Vector3::new(0.0, ctx.time.delta, 0.0));
//!             Ok(())
//!         })),
//! );
//! ```

mod actor;
mod camera;
mod component;
mod light;
mod transform;

pub use actor::{Actor, ActorKind};
pub use camera::{CameraComponent, Projection};
pub use component::{
    Component, ComponentKind, MeshComponent, ResizeContext, Script, ScriptComponent, ScriptContext,
};
pub use light::{Light, LightKind, ShadowConfig, ShadowMap};
pub use transform::Transform;

use std::cmp::Reverse;

use crate::debug::DebugContext;
use crate::error::Result;

/// Stable identifier of an actor within its scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub(crate) u32);

impl ActorId {
    pub(crate) const UNASSIGNED: ActorId = ActorId(u32::MAX);
}

/// Host clock reading for one frame, in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    pub time: f32,
    pub delta: f32,
}

impl FrameTime {
    pub fn new(time: f32, delta: f32) -> Self {
        Self { time, delta }
    }
}

/// Structural scene changes, applied after the update sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneCommand {
    RemoveActor(ActorId),
    /// Removes the component at `index` as counted when the command was queued.
    RemoveComponent { actor: ActorId, index: usize },
}

/// Per-frame state shared by every actor during the update sweep.
pub struct FrameContext<'a> {
    pub time: FrameTime,
    pub debug: &'a mut DebugContext,
    pub lights: &'a mut [Light],
    pub commands: &'a mut Vec<SceneCommand>,
}

/// Actors plus lights.
#[derive(Debug, Default)]
pub struct Scene {
    actors: Vec<Actor>,
    lights: Vec<Light>,
    next_id: u32,
    size: Option<(u32, u32)>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an actor and returns its id. If the viewport size is already
    /// known, the actor's components receive it right away.
    pub fn add_actor(&mut self, mut actor: Actor) -> ActorId {
        let id = ActorId(self.next_id);
        self.next_id += 1;
        actor.id = id;
        if let Some((w, h)) = self.size {
            actor.set_size(w, h);
        }
        log::debug!("added actor '{}' as {:?}", actor.name, id);
        self.actors.push(actor);
        id
    }

    pub fn remove_actor(&mut self, id: ActorId) -> Option<Actor> {
        let index = self.actors.iter().position(|a| a.id == id)?;
        Some(self.actors.remove(index))
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.iter().find(|a| a.id == id)
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.iter_mut().find(|a| a.id == id)
    }

    pub fn find(&self, name: &str) -> Option<&Actor> {
        self.actors.iter().find(|a| a.name == name)
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub(crate) fn actors_mut(&mut self) -> &mut [Actor] {
        &mut self.actors
    }

    /// Adds a light and returns its index.
    pub fn add_light(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut [Light] {
        &mut self.lights
    }

    /// Splits the scene for rendering. Actors are mutable for camera
    /// targets and post-process chains; lights for their shadow maps.
    pub(crate) fn split_mut(&mut self) -> (&mut [Actor], &mut [Light]) {
        (&mut self.actors, &mut self.lights)
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Runs one update sweep. See the module docs for the order.
    pub fn update(&mut self, time: FrameTime, debug: &mut DebugContext) -> Result<()> {
        let mut commands = Vec::new();
        {
            let mut frame = FrameContext {
                time,
                debug,
                lights: &mut self.lights,
                commands: &mut commands,
            };
            for actor in &mut self.actors {
                actor.update(&mut frame)?;
            }
        }
        self.apply(commands);
        self.resolve_transforms();
        Ok(())
    }

    fn apply(&mut self, mut commands: Vec<SceneCommand>) {
        // Grouped per actor with higher component indices first, so removals
        // don't shift each other and duplicates end up adjacent.
        commands.sort_by_key(|c| match *c {
            SceneCommand::RemoveActor(id) => (0, id, Reverse(0)),
            SceneCommand::RemoveComponent { actor, index } => (1, actor, Reverse(index)),
        });
        commands.dedup();

        for command in commands {
            match command {
                SceneCommand::RemoveActor(id) => {
                    if let Some(actor) = self.remove_actor(id) {
                        log::debug!("removed actor '{}'", actor.name);
                    }
                }
                SceneCommand::RemoveComponent { actor, index } => {
                    if let Some(actor) = self.actor_mut(actor) {
                        actor.remove_component(index);
                    }
                }
            }
        }
    }

    /// Resolves dirty transforms, then moves following lights.
    pub fn resolve_transforms(&mut self) {
        for actor in &mut self.actors {
            actor.transform.resolve();
        }
        for light in &mut self.lights {
            let Some(id) = light.follow else { continue };
            if let Some(actor) = self.actors.iter().find(|a| a.id == id) {
                light.position = actor.transform.matrix().position();
            }
        }
    }

    /// Forwards a viewport change to every component.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.size = Some((width, height));
        for actor in &mut self.actors {
            actor.set_size(width, height);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::math::Vector3;

    struct Counter {
        starts: Rc<Cell<u32>>,
        updates: Rc<Cell<u32>>,
    }

    impl Script for Counter {
        fn start(&mut self, _ctx: &mut ScriptContext) -> Result<()> {
            assert_eq!(self.updates.get(), 0, "start must precede update");
            self.starts.set(self.starts.get() + 1);
            Ok(())
        }

        fn update(&mut self, _ctx: &mut ScriptContext) -> Result<()> {
            self.updates.set(self.updates.get() + 1);
            Ok(())
        }
    }

    fn counted() -> (Actor, Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let starts = Rc::new(Cell::new(0));
        let updates = Rc::new(Cell::new(0));
        let actor = Actor::new("counted", ActorKind::None).with_component(ScriptComponent::new(Counter {
            starts: starts.clone(),
            updates: updates.clone(),
        }));
        (actor, starts, updates)
    }

    #[test]
    fn start_runs_once_before_first_update() {
        let (actor, starts, updates) = counted();
        let mut scene = Scene::new();
        scene.add_actor(actor);
        let mut debug = DebugContext::default();

        for frame in 0..3 {
            scene.update(FrameTime::new(frame as f32, 1.0), &mut debug).unwrap();
        }
        assert_eq!(starts.get(), 1);
        assert_eq!(updates.get(), 3);
    }

    #[test]
    fn transforms_resolve_after_updates() {
        let mut scene = Scene::new();
        let seen = Rc::new(Cell::new(Vector3::ZERO));
        let seen_in_script = seen.clone();
        let id = scene.add_actor(Actor::new("mover", ActorKind::Mesh).with_component(
            ScriptComponent::from_fn(move |ctx| {
                seen_in_script.set(ctx.transform.matrix().position());
                ctx.transform.translate(Vector3::X);
                Ok(())
            }),
        ));
        let mut debug = DebugContext::default();

        scene.update(FrameTime::default(), &mut debug).unwrap();
        assert_eq!(seen.get(), Vector3::ZERO);
        assert_eq!(scene.actor(id).unwrap().transform.matrix().position(), Vector3::X);

        scene.update(FrameTime::default(), &mut debug).unwrap();
        assert_eq!(seen.get(), Vector3::X);
    }

    #[test]
    fn removals_are_deferred_until_after_the_sweep() {
        let mut scene = Scene::new();
        let (victim, _, victim_updates) = counted();
        let victim_id = scene.add_actor(victim);
        scene.add_actor(Actor::new("reaper", ActorKind::None).with_component(
            ScriptComponent::from_fn(move |ctx| {
                ctx.defer(SceneCommand::RemoveActor(victim_id));
                ctx.defer(SceneCommand::RemoveComponent {
                    actor: ctx.actor,
                    index: 0,
                });
                Ok(())
            }),
        ));
        let mut debug = DebugContext::default();

        scene.update(FrameTime::default(), &mut debug).unwrap();
        assert_eq!(victim_updates.get(), 1);
        assert!(scene.actor(victim_id).is_none());
        assert!(scene.find("reaper").unwrap().components().is_empty());
    }

    #[test]
    fn duplicate_removals_apply_once_per_actor() {
        let mut scene = Scene::new();
        let a = scene.add_actor(
            Actor::new("a", ActorKind::None)
                .with_component(ScriptComponent::from_fn(|_| Ok(())))
                .with_component(ScriptComponent::from_fn(|_| Ok(()))),
        );
        let b = scene.add_actor(
            Actor::new("b", ActorKind::None).with_component(ScriptComponent::from_fn(|_| Ok(()))),
        );
        scene.add_actor(Actor::new("reaper", ActorKind::None).with_component(
            ScriptComponent::from_fn(move |ctx| {
                ctx.defer(SceneCommand::RemoveComponent { actor: a, index: 0 });
                ctx.defer(SceneCommand::RemoveComponent { actor: b, index: 0 });
                ctx.defer(SceneCommand::RemoveComponent { actor: a, index: 0 });
                Ok(())
            }),
        ));
        let mut debug = DebugContext::default();

        scene.update(FrameTime::default(), &mut debug).unwrap();
        assert_eq!(scene.actor(a).unwrap().components().len(), 1);
        assert!(scene.actor(b).unwrap().components().is_empty());
    }

    #[test]
    fn script_errors_abort_the_update() {
        let mut scene = Scene::new();
        scene.add_actor(Actor::new("broken", ActorKind::None).with_component(
            ScriptComponent::from_fn(|ctx| {
                Err(crate::Error::Script {
                    actor: ctx.name.to_string(),
                    message: "boom".into(),
                })
            }),
        ));
        let mut debug = DebugContext::default();
        let err = scene.update(FrameTime::default(), &mut debug).unwrap_err();
        assert_eq!(err.to_string(), "script 'broken' failed: boom");
    }

    #[test]
    fn following_light_tracks_actor() {
        let mut scene = Scene::new();
        let id = scene.add_actor(
            Actor::new("lamp", ActorKind::Light)
                .with_transform(Transform::new().with_position(Vector3::new(1.0, 5.0, 2.0))),
        );
        scene.add_light(Light::point(Vector3::ZERO).following(id));
        scene.resolve_transforms();
        assert_eq!(scene.lights()[0].position, Vector3::new(1.0, 5.0, 2.0));
    }

    #[test]
    fn resize_reaches_cameras_added_later() {
        let mut scene = Scene::new();
        scene.set_size(800, 600);
        let id = scene.add_actor(
            Actor::new("eye", ActorKind::Camera)
                .with_component(CameraComponent::new(Projection::default())),
        );
        assert_eq!(scene.actor(id).unwrap().camera().unwrap().viewport(), (800, 600));
    }
}
