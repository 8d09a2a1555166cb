//! Shadow Mapping Tests
//!
//! Tests for:
//! - Depth rendered from a directional light into its shadow map
//! - Projective lookup of world points through the light's texture matrix
//! - Lit/shadowed classification with a depth bias
//! - Shadow uniforms bound for the color pass

use std::cell::RefCell;
use std::rc::Rc;

use umbra::backend::UniformBinding;
use umbra::renderer::shadow::{self, is_shadow};
use umbra::{
    Actor, ActorKind, CameraComponent, DebugContext, Geometry, HeadlessBackend, Light, Material,
    MaterialDesc, MeshComponent, Projection, Renderer, RendererSettings, Scene, ShadowConfig,
    ShadowMap, Transform, UniformKind, Vector3,
};

const BIAS: f32 = 0.005;

fn lit_material(backend: &mut HeadlessBackend) -> Rc<RefCell<Material>> {
    let desc = MaterialDesc::new("lit.vs", "lit.fs")
        .label("lit")
        .reserved_uniforms()
        .uniform(shadow::shadow_matrix_uniform(0), UniformKind::Matrix4)
        .uniform(shadow::shadow_map_uniform(0), UniformKind::Texture2D);
    Rc::new(RefCell::new(Material::new(backend, &desc).unwrap()))
}

/// Light at (4, 4, 4) aimed at the origin, a floor at y = -1 and a unit cube
/// hovering between the light and the floor's center.
fn shadow_scene(backend: &mut HeadlessBackend) -> Scene {
    let material = lit_material(backend);
    let mut scene = Scene::new();

    scene.add_actor(
        Actor::new("floor", ActorKind::Mesh)
            .with_transform(Transform::new().with_position(Vector3::new(0.0, -1.0, 0.0)))
            .with_component(MeshComponent::new(Rc::new(Geometry::plane(12.0)), material.clone())),
    );
    scene.add_actor(
        Actor::new("cube", ActorKind::Mesh)
            .with_transform(Transform::new().with_position(Vector3::new(1.5, 0.5, 1.5)))
            .with_component(MeshComponent::new(Rc::new(Geometry::cube()), material)),
    );

    let mut eye = Transform::new();
    eye.look_at(Vector3::new(0.0, 6.0, 10.0), Vector3::ZERO);
    scene.add_actor(
        Actor::new("camera", ActorKind::Camera)
            .with_transform(eye)
            .with_component(CameraComponent::new(Projection::default())),
    );

    let config = ShadowConfig::default()
        .map_size(512)
        .half_size(4.0)
        .clip(0.1, 20.0)
        .bias(BIAS);
    let shadow = ShadowMap::new(backend, config).unwrap();
    scene.add_light(Light::directional(Vector3::new(4.0, 4.0, 4.0), Vector3::ZERO).with_shadow(shadow));

    scene.set_size(64, 64);
    scene.resolve_transforms();
    scene
}

fn render(backend: &mut HeadlessBackend, scene: &mut Scene) -> DebugContext {
    let mut renderer = Renderer::new(backend, RendererSettings::default()).unwrap();
    let mut debug = DebugContext::new();
    renderer.render(backend, scene, &mut debug).unwrap();
    debug
}

// ============================================================================
// Shadow map contents
// ============================================================================

#[test]
fn shadow_map_matches_configured_size() {
    let mut backend = HeadlessBackend::new(64, 64);
    let mut scene = shadow_scene(&mut backend);
    render(&mut backend, &mut scene);

    let depth = scene.lights()[0].shadow.as_ref().unwrap().target().depth_texture().unwrap();
    let image = backend.depth_image(depth).unwrap();
    assert_eq!((image.width, image.height), (512, 512));
    assert!(image.covered_texels() > 0);
}

#[test]
fn point_behind_cube_is_shadowed() {
    let mut backend = HeadlessBackend::new(64, 64);
    let mut scene = shadow_scene(&mut backend);
    render(&mut backend, &mut scene);

    let light = &scene.lights()[0];
    let depth = light.shadow.as_ref().unwrap().target().depth_texture().unwrap();
    let image = backend.depth_image(depth).unwrap();
    let texture_matrix = light.texture_matrix().unwrap();

    assert_eq!(is_shadow(&texture_matrix, &image, Vector3::new(0.0, -1.0, 0.0), BIAS), 1.0);
}

#[test]
fn point_outside_silhouette_is_lit() {
    let mut backend = HeadlessBackend::new(64, 64);
    let mut scene = shadow_scene(&mut backend);
    render(&mut backend, &mut scene);

    let light = &scene.lights()[0];
    let depth = light.shadow.as_ref().unwrap().target().depth_texture().unwrap();
    let image = backend.depth_image(depth).unwrap();
    let texture_matrix = light.texture_matrix().unwrap();

    assert_eq!(is_shadow(&texture_matrix, &image, Vector3::new(-3.0, -1.0, 2.0), BIAS), 0.0);
}

#[test]
fn point_outside_light_frustum_is_lit() {
    let mut backend = HeadlessBackend::new(64, 64);
    let mut scene = shadow_scene(&mut backend);
    render(&mut backend, &mut scene);

    let light = &scene.lights()[0];
    let depth = light.shadow.as_ref().unwrap().target().depth_texture().unwrap();
    let image = backend.depth_image(depth).unwrap();
    let texture_matrix = light.texture_matrix().unwrap();

    let far_away = Vector3::new(40.0, -1.0, -40.0);
    let p = texture_matrix.transform_point(far_away);
    assert!(!(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y));
    assert_eq!(is_shadow(&texture_matrix, &image, far_away, BIAS), 0.0);
}

#[test]
fn non_caster_leaves_no_shadow() {
    let mut backend = HeadlessBackend::new(64, 64);
    let mut scene = shadow_scene(&mut backend);
    let cube = scene.find("cube").unwrap().id();
    scene.remove_actor(cube);
    let material = lit_material(&mut backend);
    scene.add_actor(
        Actor::new("ghost", ActorKind::Mesh)
            .with_transform(Transform::new().with_position(Vector3::new(1.5, 0.5, 1.5)))
            .with_component(MeshComponent::new(Rc::new(Geometry::cube()), material).cast_shadow(false)),
    );
    scene.resolve_transforms();
    render(&mut backend, &mut scene);

    let light = &scene.lights()[0];
    let depth = light.shadow.as_ref().unwrap().target().depth_texture().unwrap();
    let image = backend.depth_image(depth).unwrap();
    let texture_matrix = light.texture_matrix().unwrap();
    assert_eq!(is_shadow(&texture_matrix, &image, Vector3::new(0.0, -1.0, 0.0), BIAS), 0.0);
}

// ============================================================================
// Color pass bindings
// ============================================================================

#[test]
fn color_pass_receives_texture_matrix_and_map() {
    let mut backend = HeadlessBackend::new(64, 64);
    let mut scene = shadow_scene(&mut backend);
    let debug = render(&mut backend, &mut scene);

    let light = &scene.lights()[0];
    let depth = light.shadow.as_ref().unwrap().target().depth_texture().unwrap();
    let floor = scene.find("floor").unwrap();
    let program = floor.meshes().next().unwrap().material.borrow().program();

    assert_eq!(
        backend.uniform(program, "uShadowMatrices[0]"),
        Some(UniformBinding::Matrix4(light.texture_matrix().unwrap()))
    );
    assert_eq!(
        backend.uniform(program, "uShadowMaps[0]"),
        Some(UniformBinding::Texture2D(depth))
    );
    assert_eq!(debug.stats().shadow_passes, 1);
    assert_eq!(debug.stats().color_passes, 1);
}

// ============================================================================
// Perspective (point light) shadows
// ============================================================================

/// Point light at (3, 6, 3) looking at the origin with a cube halfway along
/// its view axis. Only the cube writes depth.
fn point_light_scene(backend: &mut HeadlessBackend) -> Scene {
    let material = lit_material(backend);
    let mut scene = Scene::new();

    scene.add_actor(
        Actor::new("floor", ActorKind::Mesh)
            .with_transform(Transform::new().with_position(Vector3::new(0.0, -1.0, 0.0)))
            .with_component(
                MeshComponent::new(Rc::new(Geometry::plane(12.0)), material.clone()).cast_shadow(false),
            ),
    );
    scene.add_actor(
        Actor::new("cube", ActorKind::Mesh)
            .with_transform(Transform::new().with_position(Vector3::new(1.5, 3.0, 1.5)))
            .with_component(MeshComponent::new(Rc::new(Geometry::cube()), material)),
    );

    let config = ShadowConfig::default().map_size(256).clip(0.1, 20.0).bias(BIAS);
    let shadow = ShadowMap::new(backend, config).unwrap();
    scene.add_light(Light::point(Vector3::new(3.0, 6.0, 3.0)).with_shadow(shadow));

    scene.set_size(64, 64);
    scene.resolve_transforms();
    scene
}

#[test]
fn point_light_shadows_floor_behind_cube() {
    let mut backend = HeadlessBackend::new(64, 64);
    let mut scene = point_light_scene(&mut backend);
    render(&mut backend, &mut scene);

    let light = &scene.lights()[0];
    let depth = light.shadow.as_ref().unwrap().target().depth_texture().unwrap();
    let image = backend.depth_image(depth).unwrap();
    let texture_matrix = light.texture_matrix().unwrap();

    assert!(image.covered_texels() > 0);
    // On the ray from the light through the cube's center.
    assert_eq!(is_shadow(&texture_matrix, &image, Vector3::new(-0.5, -1.0, -0.5), BIAS), 1.0);
    assert_eq!(is_shadow(&texture_matrix, &image, Vector3::new(-4.0, -1.0, 3.0), BIAS), 0.0);
}

#[test]
fn point_behind_point_light_is_lit() {
    let mut backend = HeadlessBackend::new(64, 64);
    let mut scene = point_light_scene(&mut backend);
    render(&mut backend, &mut scene);

    let light = &scene.lights()[0];
    let depth = light.shadow.as_ref().unwrap().target().depth_texture().unwrap();
    let image = backend.depth_image(depth).unwrap();
    let texture_matrix = light.texture_matrix().unwrap();

    // Mirrors the cube through the light: projects onto the cube's texels
    // after the divide.
    let behind = Vector3::new(4.0, 8.0, 4.0);
    let mirrored = texture_matrix.transform_point(behind);
    assert!((mirrored.x - 0.5).abs() < 1e-3 && (mirrored.y - 0.5).abs() < 1e-3);
    assert_eq!(is_shadow(&texture_matrix, &image, behind, BIAS), 0.0);

    // Beyond the far plane along the same axis.
    let far = Vector3::new(-7.0, -14.0, -7.0);
    assert_eq!(is_shadow(&texture_matrix, &image, far, BIAS), 0.0);
}
