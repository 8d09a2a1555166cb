use std::cell::RefCell;
use std::rc::Rc;

use umbra::renderer::{light_color_uniform, light_position_uniform, shadow};
use umbra::{
    Actor, ActorKind, AppConfig, CameraComponent, Geometry, GpuBackend, Light, Material,
    MaterialDesc, MeshComponent, PostProcessChain, Projection, ScriptComponent, ShadowConfig, ShadowMap,
    Transform, UniformKind, Vector3, run,
};

const PHONG: &str = include_str!("shaders/phong_shadow.wgsl");
const VIGNETTE: &str = include_str!("shaders/vignette.wgsl");
const PASSTHROUGH: &str = include_str!("shaders/passthrough.wgsl");

fn lit_material(
    backend: &mut dyn GpuBackend,
    label: &str,
    color: Vector3,
) -> umbra::Result<Rc<RefCell<Material>>> {
    let desc = MaterialDesc::new(PHONG, PHONG)
        .label(label)
        .reserved_uniforms()
        .uniform(shadow::shadow_matrix_uniform(0), UniformKind::Matrix4)
        .uniform(shadow::shadow_map_uniform(0), UniformKind::Texture2D)
        .uniform(light_position_uniform(0), UniformKind::Vector3)
        .uniform(light_color_uniform(0), UniformKind::Vector3)
        .uniform("uColor", UniformKind::Vector3);
    let mut material = Material::new(backend, &desc)?;
    material.set_vector3("uColor", color)?;
    Ok(Rc::new(RefCell::new(material)))
}

fn main() -> umbra::Result<()> {
    run(AppConfig::new().title("Umbra").size(1280, 720), |engine| {
        let (backend, scene) = engine.parts_mut();

        let floor = lit_material(backend, "Floor", Vector3::new(0.8, 0.8, 0.75))?;
        scene.add_actor(
            Actor::new("floor", ActorKind::Mesh)
                .with_transform(Transform::new().with_position(Vector3::new(0.0, -1.0, 0.0)))
                .with_component(MeshComponent::new(Rc::new(Geometry::plane(12.0)), floor).cast_shadow(false)),
        );

        let cube_material = lit_material(backend, "Cube", Vector3::new(0.9, 0.35, 0.2))?;
        scene.add_actor(
            Actor::new("cube", ActorKind::Mesh)
                .with_transform(Transform::new().with_position(Vector3::new(0.0, 0.5, 0.0)))
                .with_component(MeshComponent::new(Rc::new(Geometry::cube()), cube_material))
                .with_component(ScriptComponent::from_fn(|ctx| {
                    ctx.transform.rotate(Vector3::new(0.0, ctx.time.delta * 0.8, 0.0));
                    ctx.debug.watch("cube.yaw", ctx.transform.rotation().y);
                    Ok(())
                })),
        );

        let sphere = lit_material(backend, "Sphere", Vector3::new(0.3, 0.5, 0.9))?;
        scene.add_actor(
            Actor::new("sphere", ActorKind::Mesh)
                .with_transform(Transform::new().with_position(Vector3::new(-2.5, 0.0, 1.0)))
                .with_component(MeshComponent::new(Rc::new(Geometry::sphere(32, 16)), sphere)),
        );

        let mut chain = PostProcessChain::from_descs(
            backend,
            &[
                MaterialDesc::new(VIGNETTE, VIGNETTE)
                    .label("Vignette")
                    .uniform("uResolution", UniformKind::Vector3)
                    .uniform("uStrength", UniformKind::Float),
                MaterialDesc::new(PASSTHROUGH, PASSTHROUGH).label("Present"),
            ],
        )?;
        chain.passes_mut()[0].material_mut().set_float("uStrength", 0.35)?;

        let mut eye = Transform::new();
        eye.look_at(Vector3::new(6.0, 5.0, 8.0), Vector3::ZERO);
        scene.add_actor(
            Actor::new("camera", ActorKind::Camera)
                .with_transform(eye)
                .with_component(CameraComponent::new(Projection::default()).with_post_process(chain)),
        );

        let shadow = ShadowMap::new(backend, ShadowConfig::default().map_size(2048).half_size(8.0))?;
        scene.add_light(
            Light::directional(Vector3::new(4.0, 8.0, 4.0), Vector3::ZERO)
                .with_intensity(1.2)
                .with_shadow(shadow),
        );
        Ok(())
    })
}
