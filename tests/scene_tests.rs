//! Scene Lifecycle Tests
//!
//! Tests for:
//! - Component start hooks running exactly once
//! - Update order across actors and components
//! - Viewport changes reaching scripts and cameras
//! - Indexed geometry draw counts through the backend

use std::cell::RefCell;
use std::rc::Rc;

use umbra::backend::Command;
use umbra::geometry::{GeometryDesc, VertexAttribute};
use umbra::material::FallbackTextures;
use umbra::scene::{FrameContext, FrameTime, ResizeContext};
use umbra::{
    Actor, ActorKind, CameraComponent, DebugContext, Engine, Geometry, GpuBackend, HeadlessBackend,
    Material, MaterialDesc, Matrix4, Projection, RendererSettings, Scene, Script, ScriptComponent,
    ScriptContext, Vector3,
};

#[derive(Default)]
struct Journal {
    entries: Rc<RefCell<Vec<String>>>,
}

struct Logged {
    name: &'static str,
    journal: Rc<RefCell<Vec<String>>>,
}

impl Script for Logged {
    fn start(&mut self, _ctx: &mut ScriptContext) -> umbra::Result<()> {
        self.journal.borrow_mut().push(format!("{}.start", self.name));
        Ok(())
    }

    fn update(&mut self, _ctx: &mut ScriptContext) -> umbra::Result<()> {
        self.journal.borrow_mut().push(format!("{}.update", self.name));
        Ok(())
    }

    fn set_size(&mut self, ctx: &ResizeContext) {
        self.journal
            .borrow_mut()
            .push(format!("{}.size {}x{}", self.name, ctx.width, ctx.height));
    }
}

impl Journal {
    fn script(&self, name: &'static str) -> ScriptComponent {
        ScriptComponent::new(Logged {
            name,
            journal: self.entries.clone(),
        })
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }
}

#[test]
fn start_twice_runs_hook_once() {
    let journal = Journal::default();
    let mut actor = Actor::new("solo", ActorKind::None).with_component(journal.script("a"));
    let mut debug = DebugContext::new();
    let mut commands = Vec::new();
    let mut frame = FrameContext {
        time: FrameTime::default(),
        debug: &mut debug,
        lights: &mut [],
        commands: &mut commands,
    };

    actor.start(&mut frame).unwrap();
    actor.start(&mut frame).unwrap();

    assert_eq!(journal.take(), ["a.start"]);
    assert!(actor.components()[0].is_started());
}

#[test]
fn starts_precede_updates_within_an_actor() {
    let journal = Journal::default();
    let mut scene = Scene::new();
    scene.add_actor(
        Actor::new("first", ActorKind::None)
            .with_component(journal.script("a"))
            .with_component(journal.script("b")),
    );
    scene.add_actor(Actor::new("second", ActorKind::None).with_component(journal.script("c")));
    let mut debug = DebugContext::new();

    scene.update(FrameTime::new(0.0, 0.016), &mut debug).unwrap();
    assert_eq!(
        journal.take(),
        ["a.start", "b.start", "a.update", "b.update", "c.start", "c.update"]
    );

    scene.update(FrameTime::new(0.016, 0.016), &mut debug).unwrap();
    assert_eq!(journal.take(), ["a.update", "b.update", "c.update"]);
}

#[test]
fn component_added_later_starts_on_next_update() {
    let journal = Journal::default();
    let mut scene = Scene::new();
    let id = scene.add_actor(Actor::new("grows", ActorKind::None).with_component(journal.script("a")));
    let mut debug = DebugContext::new();
    scene.update(FrameTime::default(), &mut debug).unwrap();
    journal.take();

    scene.actor_mut(id).unwrap().add_component(journal.script("b"));
    scene.update(FrameTime::default(), &mut debug).unwrap();
    assert_eq!(journal.take(), ["b.start", "a.update", "b.update"]);
}

#[test]
fn resize_reaches_scripts_and_cameras() {
    let journal = Journal::default();
    let mut engine = Engine::new(HeadlessBackend::new(16, 16), RendererSettings::default()).unwrap();
    let camera = engine.scene_mut().add_actor(
        Actor::new("eye", ActorKind::Camera)
            .with_component(CameraComponent::new(Projection::default()))
            .with_component(journal.script("s")),
    );
    journal.take();

    engine.resize(640, 480);
    assert_eq!(journal.take(), ["s.size 640x480"]);
    let viewport = engine.scene().actor(camera).and_then(Actor::camera).unwrap().viewport();
    assert_eq!(viewport, (640, 480));
}

#[test]
fn script_moves_are_visible_next_frame() {
    let mut engine = Engine::new(HeadlessBackend::new(16, 16), RendererSettings::default()).unwrap();
    let id = engine.scene_mut().add_actor(
        Actor::new("walker", ActorKind::None).with_component(ScriptComponent::from_fn(|ctx| {
            ctx.transform.translate(Vector3::new(1.0, 0.0, 0.0));
            Ok(())
        })),
    );

    engine.frame(0.0, 0.016).unwrap();
    engine.frame(0.016, 0.016).unwrap();
    let model = engine.scene().actor(id).unwrap().transform.matrix();
    assert!(model.abs_diff_eq(&Matrix4::translation(Vector3::new(2.0, 0.0, 0.0)), 1e-6));
}

#[test]
fn indexed_quad_draws_six_vertices() {
    let geometry = Geometry::new(
        GeometryDesc::new("quad")
            .attribute(
                VertexAttribute::Position,
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            )
            .indices(vec![0, 1, 2, 0, 2, 3]),
    )
    .unwrap();
    assert_eq!(geometry.vertex_count(), 4);

    let mut backend = HeadlessBackend::new(4, 4);
    let fallback = FallbackTextures::new(&mut backend).unwrap();
    let material = Material::new(&mut backend, &MaterialDesc::new("vs", "fs")).unwrap();
    material.bind(&mut backend, &fallback).unwrap();
    geometry.draw(&mut backend).unwrap();
    geometry.draw(&mut backend).unwrap();

    let uploads = backend
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::CreateVertexArray { .. }))
        .count();
    assert_eq!(uploads, 1);
    let Some(Command::Draw(call)) = backend.commands().last() else {
        panic!("expected a draw");
    };
    assert_eq!((call.count, call.indexed), (6, true));
    assert_eq!(backend.surface_size(), (4, 4));
}
