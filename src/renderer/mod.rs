//! The multi-pass frame renderer.
//!
//! Each call to [`Renderer::render`] runs, strictly in this order:
//!
//! 1. one **shadow pass** per shadow-casting light, rendering depth from the
//!    light's camera into its shadow map
//! 2. one **color pass** per camera, binding every shadow map and its texture
//!    matrix to materials that declare them
//! 3. each camera's **post-process chain**, pass by pass
//!
//! The backend is stateful, so every pass rebinds its framebuffer, viewport,
//! program and uniforms instead of relying on what an earlier pass left bound.
//!
//! # Uniforms filled per draw
//!
//! | Name                      | Kind      | Pass   |
//! |---------------------------|-----------|--------|
//! | reserved matrices         | see [`ReservedUniform`](crate::material::ReservedUniform) | both |
//! | `uShadowMatrices[i]`      | Matrix4   | color  |
//! | `uShadowMaps[i]`          | Texture2D | color  |
//! | `uLightPositions[i]`      | Vector3   | color  |
//! | `uLightColors[i]`         | Vector3   | color  |
//!
//! `i` counts shadow-casting lights for the shadow uniforms and all lights for
//! the light uniforms. Undeclared names are skipped.

mod post_process;
pub mod shadow;

pub use post_process::{PostProcessChain, PostProcessPass, RESOLUTION, SCENE_TEXTURE};

use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::{ClearOps, GpuBackend, TextureId};
use crate::debug::DebugContext;
use crate::error::Result;
use crate::geometry::Geometry;
use crate::material::{
    FallbackTextures, Material, MaterialDesc, ReservedUniform, RenderState, UniformKind,
};
use crate::math::{Matrix4, Vector3};
use crate::scene::{Actor, CameraComponent, Light, Scene};

const DEPTH_SHADER: &str = include_str!("../shaders/depth.wgsl");

pub fn light_position_uniform(index: usize) -> String {
    format!("uLightPositions[{index}]")
}

pub fn light_color_uniform(index: usize) -> String {
    format!("uLightColors[{index}]")
}

/// Renderer configuration.
#[derive(Clone, Debug)]
pub struct RendererSettings {
    /// Clear color for cameras that don't set their own.
    pub clear_color: [f32; 4],
    /// Vertex source of the shadow-pass material.
    pub depth_vertex: String,
    /// Fragment source of the shadow-pass material.
    pub depth_fragment: String,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.1, 0.1, 0.12, 1.0],
            depth_vertex: DEPTH_SHADER.to_string(),
            depth_fragment: DEPTH_SHADER.to_string(),
        }
    }
}

impl RendererSettings {
    pub fn clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn depth_shader(mut self, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.depth_vertex = vertex.into();
        self.depth_fragment = fragment.into();
        self
    }
}

/// A mesh snapshot taken before the passes run.
struct DrawItem {
    geometry: Rc<Geometry>,
    material: Rc<RefCell<Material>>,
    shadow_material: Option<Rc<RefCell<Material>>>,
    cast_shadow: bool,
    model: Matrix4,
}

/// A finished shadow map, as seen by the color pass.
struct ShadowBinding {
    texture_matrix: Matrix4,
    depth: Option<TextureId>,
}

struct LightBinding {
    position: Vector3,
    radiance: Vector3,
}

/// Camera-side matrices shared by every draw of a pass.
#[derive(Clone, Copy)]
struct PassMatrices {
    view: Matrix4,
    projection: Matrix4,
    eye: Vector3,
}

/// Runs the shadow, color and post-process passes over a [`Scene`].
#[derive(Debug)]
pub struct Renderer {
    settings: RendererSettings,
    fallback: FallbackTextures,
    depth_material: Material,
    quad: Geometry,
}

impl Renderer {
    /// Creates placeholder textures, the shadow-pass material and the
    /// full-screen quad used by post-process passes.
    pub fn new(backend: &mut dyn GpuBackend, settings: RendererSettings) -> Result<Self> {
        let fallback = FallbackTextures::new(backend)?;
        let depth_desc = MaterialDesc::new(settings.depth_vertex.clone(), settings.depth_fragment.clone())
            .label("Shadow Depth")
            .uniform(ReservedUniform::ModelMatrix.name(), UniformKind::Matrix4)
            .uniform(ReservedUniform::ViewMatrix.name(), UniformKind::Matrix4)
            .uniform(ReservedUniform::ProjectionMatrix.name(), UniformKind::Matrix4)
            .state(RenderState::default());
        let depth_material = Material::new(backend, &depth_desc)?;
        let quad = Geometry::fullscreen_quad();
        quad.upload(backend)?;
        log::info!("renderer ready");
        Ok(Self {
            settings,
            fallback,
            depth_material,
            quad,
        })
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn fallback_textures(&self) -> &FallbackTextures {
        &self.fallback
    }

    /// Renders one frame. Transforms must already be resolved.
    pub fn render(
        &mut self,
        backend: &mut dyn GpuBackend,
        scene: &mut Scene,
        debug: &mut DebugContext,
    ) -> Result<()> {
        backend.begin_frame()?;

        let items = collect_draw_items(scene.actors());
        let (actors, lights) = scene.split_mut();

        let lit: Vec<LightBinding> = lights
            .iter()
            .map(|l| LightBinding {
                position: l.position,
                radiance: l.radiance(),
            })
            .collect();
        let shadows = self.shadow_passes(backend, &items, lights, debug)?;

        for actor in actors.iter_mut() {
            let world = actor.transform.matrix();
            if let Some(camera) = actor.camera_mut() {
                self.color_pass(backend, &items, &shadows, &lit, world, camera, debug)?;
            }
        }

        backend.end_frame()?;
        Ok(())
    }

    fn shadow_passes(
        &mut self,
        backend: &mut dyn GpuBackend,
        items: &[DrawItem],
        lights: &mut [Light],
        debug: &mut DebugContext,
    ) -> Result<Vec<ShadowBinding>> {
        let mut shadows = Vec::new();
        for light in lights.iter_mut().filter(|l| l.casts_shadows()) {
            let texture_matrix = light.texture_matrix()?;
            let matrices = PassMatrices {
                view: light.view_matrix()?,
                projection: light.projection_matrix(),
                eye: light.position,
            };
            let Some(shadow) = light.shadow.as_mut() else {
                continue;
            };
            let size = shadow.config.map_size;
            let target = shadow.target_mut();
            target.resize(backend, size, size)?;
            target.bind(backend)?;
            backend.clear(ClearOps::depth_only())?;

            for item in items.iter().filter(|i| i.cast_shadow) {
                match &item.shadow_material {
                    Some(material) => draw_item(
                        backend,
                        &self.fallback,
                        &mut material.borrow_mut(),
                        item,
                        &matrices,
                    )?,
                    None => draw_item(backend, &self.fallback, &mut self.depth_material, item, &matrices)?,
                }
                debug.stats_mut().draw_calls += 1;
            }

            debug.stats_mut().shadow_passes += 1;
            shadows.push(ShadowBinding {
                texture_matrix,
                depth: target.depth_texture(),
            });
        }
        Ok(shadows)
    }

    #[allow(clippy::too_many_arguments)]
    fn color_pass(
        &mut self,
        backend: &mut dyn GpuBackend,
        items: &[DrawItem],
        shadows: &[ShadowBinding],
        lights: &[LightBinding],
        camera_world: Matrix4,
        camera: &mut CameraComponent,
        debug: &mut DebugContext,
    ) -> Result<()> {
        let (width, height) = camera.viewport();
        let clear = camera.clear_color.unwrap_or(self.settings.clear_color);
        let matrices = PassMatrices {
            view: camera_world.inverse()?,
            projection: camera.projection_matrix(),
            eye: camera_world.position(),
        };

        let (mut target, mut chain) = camera.outputs_mut();
        match (chain.as_deref_mut(), target.as_deref_mut()) {
            (Some(chain), output) => {
                if let Some(output) = output {
                    output.resize(backend, width, height)?;
                }
                chain.resize(backend, width, height)?;
                chain.input().bind(backend)?;
            }
            (None, Some(target)) => {
                target.resize(backend, width, height)?;
                target.bind(backend)?;
            }
            (None, None) => {
                backend.bind_framebuffer(None)?;
                backend.set_viewport(width, height);
            }
        }
        backend.clear(ClearOps::color_and_depth(clear))?;

        for item in items {
            let mut material = item.material.borrow_mut();
            for (i, shadow) in shadows.iter().enumerate() {
                let matrix = shadow::shadow_matrix_uniform(i);
                if material.has_uniform(&matrix) {
                    material.set_matrix4(&matrix, shadow.texture_matrix)?;
                }
                let map = shadow::shadow_map_uniform(i);
                if material.has_uniform(&map) {
                    material.set_texture(&map, shadow.depth)?;
                }
            }
            for (i, light) in lights.iter().enumerate() {
                let position = light_position_uniform(i);
                if material.has_uniform(&position) {
                    material.set_vector3(&position, light.position)?;
                }
                let color = light_color_uniform(i);
                if material.has_uniform(&color) {
                    material.set_vector3(&color, light.radiance)?;
                }
            }
            draw_item(backend, &self.fallback, &mut material, item, &matrices)?;
            debug.stats_mut().draw_calls += 1;
        }
        debug.stats_mut().color_passes += 1;

        if let Some(chain) = chain {
            let passes = chain.run(
                backend,
                &self.quad,
                &self.fallback,
                target.as_deref(),
                (width, height),
            )?;
            let stats = debug.stats_mut();
            stats.post_passes += passes;
            stats.draw_calls += passes;
        }
        Ok(())
    }
}

fn collect_draw_items(actors: &[Actor]) -> Vec<DrawItem> {
    actors
        .iter()
        .flat_map(|actor| {
            let model = actor.transform.matrix();
            actor.meshes().filter(|m| m.visible).map(move |mesh| DrawItem {
                geometry: mesh.geometry.clone(),
                material: mesh.material.clone(),
                shadow_material: mesh.shadow_material.clone(),
                cast_shadow: mesh.cast_shadow,
                model,
            })
        })
        .collect()
}

/// Fills reserved uniforms, binds the material and draws the geometry.
fn draw_item(
    backend: &mut dyn GpuBackend,
    fallback: &FallbackTextures,
    material: &mut Material,
    item: &DrawItem,
    pass: &PassMatrices,
) -> Result<()> {
    let normal = if material.has_reserved(ReservedUniform::NormalMatrix) {
        item.model.inverse()?.transpose()
    } else {
        Matrix4::IDENTITY
    };
    material.update_uniforms(&item.model, &pass.view, &pass.projection, &normal, pass.eye)?;
    material.bind(backend, fallback)?;
    item.geometry.draw(backend)?;
    Ok(())
}
