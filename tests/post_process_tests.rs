//! Post-Process Chain Tests
//!
//! Tests for:
//! - Pass i sampling pass i - 1's output through uSceneTexture
//! - The last pass rendering to the screen (or the camera's own target)
//! - Chain targets following the camera viewport

use std::cell::RefCell;
use std::rc::Rc;

use umbra::backend::{Command, FramebufferId, ProgramId, TextureId, UniformBinding};
use umbra::{
    Actor, ActorKind, CameraComponent, DebugContext, Geometry, HeadlessBackend, Material,
    MaterialDesc, MeshComponent, PostProcessChain, Projection, RenderTarget, Renderer,
    RendererSettings, Scene,
};

fn two_pass_scene(backend: &mut HeadlessBackend, with_target: bool) -> Scene {
    let chain = PostProcessChain::from_descs(
        backend,
        &[
            MaterialDesc::new("blur.vs", "blur.fs").label("blur"),
            MaterialDesc::new("tone.vs", "tone.fs").label("tone"),
        ],
    )
    .unwrap();
    let mut camera = CameraComponent::new(Projection::default()).with_post_process(chain);
    if with_target {
        camera = camera.with_target(RenderTarget::color(backend, "Capture").unwrap());
    }

    let material = MaterialDesc::new("mesh.vs", "mesh.fs").reserved_uniforms();
    let material = Rc::new(RefCell::new(Material::new(backend, &material).unwrap()));

    let mut scene = Scene::new();
    scene.add_actor(
        Actor::new("cube", ActorKind::Mesh)
            .with_component(MeshComponent::new(Rc::new(Geometry::cube()), material)),
    );
    scene.add_actor(Actor::new("camera", ActorKind::Camera).with_component(camera));
    scene.set_size(40, 30);
    scene.resolve_transforms();
    scene
}

fn chain(scene: &Scene) -> &PostProcessChain {
    scene
        .find("camera")
        .and_then(Actor::camera)
        .and_then(CameraComponent::post_process)
        .unwrap()
}

fn scene_texture(backend: &HeadlessBackend, program: ProgramId) -> Option<TextureId> {
    match backend.uniform(program, "uSceneTexture") {
        Some(UniformBinding::Texture2D(texture)) => Some(texture),
        _ => None,
    }
}

/// Framebuffer bound when each draw with `program` was issued.
fn draw_targets(backend: &HeadlessBackend, program: ProgramId) -> Vec<Option<FramebufferId>> {
    let mut bound = None;
    let mut current = None;
    let mut targets = Vec::new();
    for command in backend.commands() {
        match command {
            Command::BindFramebuffer(fb) => bound = *fb,
            Command::UseProgram(p) => current = Some(*p),
            Command::Draw(_) if current == Some(program) => targets.push(bound),
            _ => {}
        }
    }
    targets
}

#[test]
fn second_pass_samples_first_pass_target() {
    let mut backend = HeadlessBackend::new(40, 30);
    let mut scene = two_pass_scene(&mut backend, false);
    let mut renderer = Renderer::new(&mut backend, RendererSettings::default()).unwrap();
    renderer.render(&mut backend, &mut scene, &mut DebugContext::new()).unwrap();

    let chain = chain(&scene);
    let first = chain.passes()[0].material().program();
    let second = chain.passes()[1].material().program();
    let intermediate = chain.pass_target(0).unwrap();

    assert_eq!(scene_texture(&backend, first), chain.input().color_texture());
    assert_eq!(scene_texture(&backend, second), intermediate.color_texture());
    assert_eq!(draw_targets(&backend, first), [Some(intermediate.framebuffer())]);
    assert_eq!(draw_targets(&backend, second), [None]);
}

#[test]
fn color_pass_renders_into_chain_input() {
    let mut backend = HeadlessBackend::new(40, 30);
    let mut scene = two_pass_scene(&mut backend, false);
    let mut renderer = Renderer::new(&mut backend, RendererSettings::default()).unwrap();
    let mut debug = DebugContext::new();
    renderer.render(&mut backend, &mut scene, &mut debug).unwrap();

    let chain = chain(&scene);
    let binds: Vec<_> = backend
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::BindFramebuffer(fb) => Some(*fb),
            _ => None,
        })
        .collect();
    assert_eq!(
        binds,
        [
            Some(chain.input().framebuffer()),
            Some(chain.pass_target(0).unwrap().framebuffer()),
            None,
        ]
    );
    assert_eq!(chain.input().size(), (40, 30));
    assert_eq!(debug.stats().post_passes, 2);
}

#[test]
fn last_pass_writes_camera_target_when_present() {
    let mut backend = HeadlessBackend::new(40, 30);
    let mut scene = two_pass_scene(&mut backend, true);
    let mut renderer = Renderer::new(&mut backend, RendererSettings::default()).unwrap();
    renderer.render(&mut backend, &mut scene, &mut DebugContext::new()).unwrap();

    let camera = scene.find("camera").and_then(Actor::camera).unwrap();
    let capture = camera.target().unwrap();
    let second = camera.post_process().unwrap().passes()[1].material().program();
    assert_eq!(draw_targets(&backend, second), [Some(capture.framebuffer())]);
}

#[test]
fn chain_targets_follow_viewport() {
    let mut backend = HeadlessBackend::new(40, 30);
    let mut scene = two_pass_scene(&mut backend, false);
    let mut renderer = Renderer::new(&mut backend, RendererSettings::default()).unwrap();
    renderer.render(&mut backend, &mut scene, &mut DebugContext::new()).unwrap();

    scene.set_size(80, 60);
    renderer.render(&mut backend, &mut scene, &mut DebugContext::new()).unwrap();

    let chain = chain(&scene);
    assert_eq!(chain.input().size(), (80, 60));
    assert_eq!(chain.pass_target(0).unwrap().size(), (80, 60));
}
