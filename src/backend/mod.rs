//! The GPU backend contract.
//!
//! The renderer never talks to a graphics API directly. Every program, vertex
//! array, texture, framebuffer and draw goes through [`GpuBackend`], a small
//! stateful, single-threaded interface in the spirit of classic immediate-mode
//! APIs:
//!
//! ```text
//! bind_framebuffer ─▶ set_viewport ─▶ clear ─▶ use_program ─▶ set_render_state
//!                                              │
//!                                              └▶ set_uniform* ─▶ draw
//! ```
//!
//! The backend keeps the "currently bound" framebuffer and program, so callers
//! must rebind everything they rely on instead of assuming prior state.
//!
//! Two implementations ship with the crate:
//!
//! - [`HeadlessBackend`] records every command and rasterizes depth on the CPU.
//!   Tests and tools use it to inspect shadow maps without a GPU.
//! - [`WgpuBackend`] drives a real device through wgpu.

mod headless;
mod wgpu_backend;

pub use headless::{Command, DepthImage, HeadlessBackend};
pub use wgpu_backend::WgpuBackend;

use crate::error::BackendError;
use crate::geometry::{PrimitiveKind, VertexAttribute};
use crate::material::{RenderState, UniformDecl};
use crate::math::{Matrix4, Vector3};

/// Handle to a compiled shader program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub(crate) u32);

/// Handle to an uploaded vertex array (attribute buffers plus indices).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexArrayId(pub(crate) u32);

/// Handle to a 2D texture or cube map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

/// Handle to a framebuffer. `None` in [`GpuBackend::bind_framebuffer`] is the screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferId(pub(crate) u32);

/// Pixel storage of a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Depth32,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32)
    }
}

/// Shape of a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    Cube,
}

/// Parameters for [`GpuBackend::create_texture`].
#[derive(Clone, Copy, Debug)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub kind: TextureKind,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 texels. Cube maps expect six faces back to back
    /// in +X, −X, +Y, −Y, +Z, −Z order.
    pub data: Option<&'a [u8]>,
}

/// One attribute stream of a vertex array.
#[derive(Clone, Copy, Debug)]
pub struct AttributeData<'a> {
    pub attribute: VertexAttribute,
    pub data: &'a [f32],
}

/// Parameters for [`GpuBackend::create_vertex_array`].
#[derive(Clone, Copy, Debug)]
pub struct VertexArrayDesc<'a> {
    pub attributes: &'a [AttributeData<'a>],
    pub indices: Option<&'a [u32]>,
    pub vertex_count: u32,
}

/// A single draw request against the currently bound program and target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCall {
    pub vertex_array: VertexArrayId,
    pub primitive: PrimitiveKind,
    /// Number of indices (indexed draws) or vertices (array draws).
    pub count: u32,
    pub indexed: bool,
}

/// A uniform value as handed to the backend.
///
/// Texture uniforms always carry a concrete handle; null textures are
/// replaced with placeholders before they reach the backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformBinding {
    Float(f32),
    Vector3(Vector3),
    Matrix4(Matrix4),
    Texture2D(TextureId),
    CubeMap(TextureId),
}

/// Clear request for the bound target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearOps {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
}

impl ClearOps {
    pub fn color_and_depth(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: Some(1.0),
        }
    }

    pub fn depth_only() -> Self {
        Self {
            color: None,
            depth: Some(1.0),
        }
    }
}

/// The graphics API seen by the renderer.
pub trait GpuBackend {
    /// Compiles and links a program. `uniforms` lists every uniform in
    /// declaration order; backends that pack uniforms use this order.
    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
        uniforms: &[UniformDecl],
    ) -> Result<ProgramId, BackendError>;

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> Result<VertexArrayId, BackendError>;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, BackendError>;

    /// Reallocates a texture at a new size. Contents are discarded.
    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) -> Result<(), BackendError>;

    fn create_framebuffer(
        &mut self,
        color: Option<TextureId>,
        depth: Option<TextureId>,
    ) -> Result<FramebufferId, BackendError>;

    /// Binds a framebuffer; `None` binds the screen.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<(), BackendError>;

    fn set_viewport(&mut self, width: u32, height: u32);

    fn clear(&mut self, ops: ClearOps) -> Result<(), BackendError>;

    fn use_program(&mut self, program: ProgramId) -> Result<(), BackendError>;

    fn set_render_state(&mut self, state: RenderState);

    /// Sets a uniform on the program in use. Unknown names are ignored.
    fn set_uniform(&mut self, name: &str, value: UniformBinding) -> Result<(), BackendError>;

    fn draw(&mut self, call: &DrawCall) -> Result<(), BackendError>;

    /// Resizes the screen surface.
    fn resize_surface(&mut self, width: u32, height: u32);

    fn surface_size(&self) -> (u32, u32);

    fn begin_frame(&mut self) -> Result<(), BackendError>;

    fn end_frame(&mut self) -> Result<(), BackendError>;

    /// Most recent error recorded by the backend, if any.
    fn last_error(&self) -> Option<String>;
}
