//! # Umbra
//!
//! **A small retained-mode 3D engine with shadow mapping and post-processing.**
//!
//! A [`Scene`] holds [`Actor`]s, each with a [`Transform`] and a list of
//! components: meshes, cameras and scripts. Every frame the [`Engine`] updates
//! the scene, then the [`Renderer`] runs one shadow pass per shadow-casting
//! light, one color pass per camera and each camera's post-process chain.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use umbra::*;
//!
//! fn main() -> umbra::Result<()> {
//!     run(AppConfig::new().title("Cube"), |engine| {
//!         let (backend, scene) = engine.parts_mut();
//!         let shader = include_str!("shaders/phong_shadow.wgsl");
//!         let material = Material::new(
//!             backend,
//!             &MaterialDesc::new(shader, shader).reserved_uniforms(),
//!         )?;
//!         scene.add_actor(
//!             Actor::new("cube", ActorKind::Mesh).with_component(MeshComponent::new(
//!                 Rc::new(Geometry::cube()),
//!                 Rc::new(RefCell::new(material)),
//!             )),
//!         );
//!         Ok(())
//!     })
//! }
//! ```
//!
//! The renderer only talks to the [`GpuBackend`] trait. [`WgpuBackend`] draws
//! to a window; [`HeadlessBackend`] records commands and rasterizes depth on
//! the CPU, which is what the tests use.

mod app;
pub mod backend;
mod debug;
mod engine;
pub mod error;
pub mod geometry;
mod gpu;
pub mod loader;
mod logging;
pub mod material;
pub mod math;
mod render_target;
pub mod renderer;
pub mod scene;
pub mod skinning;

pub use app::{AppConfig, run};
pub use backend::{DepthImage, GpuBackend, HeadlessBackend, TextureId, WgpuBackend};
pub use debug::{DebugContext, FrameStats};
pub use engine::Engine;
pub use error::{BackendError, ConfigError, Error, LoadError, MathError, Result};
pub use geometry::{Geometry, GeometryDesc, PrimitiveKind, VertexAttribute};
pub use gpu::GpuContext;
pub use logging::{LoggingConfig, init_logging};
pub use material::{
    BlendMode, CullFace, Material, MaterialDesc, RenderState, ReservedUniform, UniformKind,
    UniformValue,
};
pub use math::{Matrix4, Vector3};
pub use render_target::RenderTarget;
pub use renderer::{PostProcessChain, PostProcessPass, Renderer, RendererSettings};
pub use scene::{
    Actor, ActorId, ActorKind, CameraComponent, Component, Light, LightKind, MeshComponent,
    Projection, Scene, SceneCommand, Script, ScriptComponent, ScriptContext, ShadowConfig,
    ShadowMap, Transform,
};
pub use skinning::{Bone, Skeleton};
