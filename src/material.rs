//! Materials: a compiled program, its uniform table, and per-draw render state.
//!
//! A [`Material`] is created from a [`MaterialDesc`] listing every uniform the
//! shader declares. Uniforms fall into two groups:
//!
//! - **Reserved uniforms** ([`ReservedUniform`]) are written by the renderer
//!   before every draw through [`Material::update_uniforms`]. They live in a
//!   fixed, enum-indexed table and are only populated when declared.
//! - **User uniforms** (light parameters, textures, tint colors) are written by
//!   scripts through [`Material::set_uniform`] and live in an overflow map.
//!
//! # Example
//!
//! ```ignore
//! let desc = MaterialDesc::new(PHONG_VS, PHONG_FS)
//!     .label("floor")
//!     .uniform("uModelMatrix", UniformKind::Matrix4)
//!     .uniform("uViewMatrix", UniformKind::Matrix4)
//!     .uniform("uProjectionMatrix", UniformKind::Matrix4)
//!     .uniform("uColor", UniformKind::Vector3)
//!     .uniform("uDiffuseMap", UniformKind::Texture2D);
//! let mut material = Material::new(backend, &desc)?;
//! material.set_uniform("uColor", UniformValue::Vector3(Vector3::new(0.8, 0.8, 0.8)))?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::backend::{
    GpuBackend, ProgramId, TextureDesc, TextureFormat, TextureId, TextureKind, UniformBinding,
};
use crate::error::{BackendError, ConfigError, MathError, Result};
use crate::math::{Matrix4, Vector3};

/// Semantic type of a uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vector3,
    Matrix4,
    Texture2D,
    CubeMap,
}

impl UniformKind {
    pub fn name(self) -> &'static str {
        match self {
            UniformKind::Float => "float",
            UniformKind::Vector3 => "vec3",
            UniformKind::Matrix4 => "mat4",
            UniformKind::Texture2D => "sampler2D",
            UniformKind::CubeMap => "samplerCube",
        }
    }

    pub fn is_texture(self) -> bool {
        matches!(self, UniformKind::Texture2D | UniformKind::CubeMap)
    }

    fn default_value(self) -> UniformValue {
        match self {
            UniformKind::Float => UniformValue::Float(0.0),
            UniformKind::Vector3 => UniformValue::Vector3(Vector3::ZERO),
            UniformKind::Matrix4 => UniformValue::Matrix4(Matrix4::IDENTITY),
            UniformKind::Texture2D => UniformValue::Texture2D(None),
            UniformKind::CubeMap => UniformValue::CubeMap(None),
        }
    }
}

impl FromStr for UniformKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "float" | "f" => Ok(UniformKind::Float),
            "vec3" | "v3" => Ok(UniformKind::Vector3),
            "mat4" | "m4" => Ok(UniformKind::Matrix4),
            "sampler2D" | "t" => Ok(UniformKind::Texture2D),
            "samplerCube" | "tc" => Ok(UniformKind::CubeMap),
            other => Err(ConfigError::UnknownUniformKind(other.to_string())),
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A uniform value. Texture slots may be empty; empty slots bind a placeholder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vector3(Vector3),
    Matrix4(Matrix4),
    Texture2D(Option<TextureId>),
    CubeMap(Option<TextureId>),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vector3(_) => UniformKind::Vector3,
            UniformValue::Matrix4(_) => UniformKind::Matrix4,
            UniformValue::Texture2D(_) => UniformKind::Texture2D,
            UniformValue::CubeMap(_) => UniformKind::CubeMap,
        }
    }

    fn to_binding(self, fallback: &FallbackTextures) -> UniformBinding {
        match self {
            UniformValue::Float(v) => UniformBinding::Float(v),
            UniformValue::Vector3(v) => UniformBinding::Vector3(v),
            UniformValue::Matrix4(m) => UniformBinding::Matrix4(m),
            UniformValue::Texture2D(t) => UniformBinding::Texture2D(t.unwrap_or(fallback.texture_2d)),
            UniformValue::CubeMap(t) => UniformBinding::CubeMap(t.unwrap_or(fallback.cube_map)),
        }
    }
}

/// One declared uniform.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformDecl {
    pub name: String,
    pub kind: UniformKind,
}

impl UniformDecl {
    pub fn new(name: impl Into<String>, kind: UniformKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Parses a declaration from a type name such as `"mat4"` or `"sampler2D"`.
    pub fn parse(name: impl Into<String>, kind: &str) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(name, kind.parse()?))
    }
}

/// Uniform names the renderer fills in before every draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReservedUniform {
    ModelMatrix,
    ViewMatrix,
    ProjectionMatrix,
    NormalMatrix,
    CameraPosition,
    InvModelMatrix,
}

impl ReservedUniform {
    pub const COUNT: usize = 6;

    pub const ALL: [ReservedUniform; Self::COUNT] = [
        ReservedUniform::ModelMatrix,
        ReservedUniform::ViewMatrix,
        ReservedUniform::ProjectionMatrix,
        ReservedUniform::NormalMatrix,
        ReservedUniform::CameraPosition,
        ReservedUniform::InvModelMatrix,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReservedUniform::ModelMatrix => "uModelMatrix",
            ReservedUniform::ViewMatrix => "uViewMatrix",
            ReservedUniform::ProjectionMatrix => "uProjectionMatrix",
            ReservedUniform::NormalMatrix => "uNormalMatrix",
            ReservedUniform::CameraPosition => "uCameraPosition",
            ReservedUniform::InvModelMatrix => "uInvModelMatrix",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }

    pub fn kind(self) -> UniformKind {
        match self {
            ReservedUniform::CameraPosition => UniformKind::Vector3,
            _ => UniformKind::Matrix4,
        }
    }
}

/// Which faces are discarded before rasterization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CullFace {
    None,
    Front,
    #[default]
    Back,
    FrontAndBack,
}

impl FromStr for CullFace {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(CullFace::None),
            "front" => Ok(CullFace::Front),
            "back" => Ok(CullFace::Back),
            "front_and_back" => Ok(CullFace::FrontAndBack),
            other => Err(ConfigError::UnknownCullFace(other.to_string())),
        }
    }
}

/// How fragment output combines with the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    None,
    /// `src * a + dst * (1 - a)`
    Alpha,
    Additive,
    Multiply,
}

impl FromStr for BlendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(BlendMode::None),
            "alpha" | "normal" => Ok(BlendMode::Alpha),
            "additive" => Ok(BlendMode::Additive),
            "multiply" => Ok(BlendMode::Multiply),
            other => Err(ConfigError::UnknownBlendMode(other.to_string())),
        }
    }
}

/// Per-draw fixed-function state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull_face: CullFace,
    pub blend: BlendMode,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            cull_face: CullFace::Back,
            blend: BlendMode::None,
        }
    }
}

impl RenderState {
    /// State for full-screen passes: no depth, no culling.
    pub fn fullscreen() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            cull_face: CullFace::None,
            blend: BlendMode::None,
        }
    }
}

/// Everything needed to build a [`Material`].
#[derive(Clone, Debug)]
pub struct MaterialDesc {
    pub label: String,
    pub vertex_source: String,
    pub fragment_source: String,
    pub uniforms: Vec<UniformDecl>,
    pub state: RenderState,
}

impl MaterialDesc {
    pub fn new(vertex_source: impl Into<String>, fragment_source: impl Into<String>) -> Self {
        Self {
            label: "material".to_string(),
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
            uniforms: Vec::new(),
            state: RenderState::default(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn uniform(mut self, name: impl Into<String>, kind: UniformKind) -> Self {
        self.uniforms.push(UniformDecl::new(name, kind));
        self
    }

    /// Declares all six reserved uniforms.
    pub fn reserved_uniforms(mut self) -> Self {
        for r in ReservedUniform::ALL {
            self.uniforms.push(UniformDecl::new(r.name(), r.kind()));
        }
        self
    }

    pub fn state(mut self, state: RenderState) -> Self {
        self.state = state;
        self
    }
}

/// 1×1 opaque placeholders bound in place of empty texture slots.
#[derive(Clone, Copy, Debug)]
pub struct FallbackTextures {
    pub texture_2d: TextureId,
    pub cube_map: TextureId,
}

impl FallbackTextures {
    pub fn new(backend: &mut dyn GpuBackend) -> std::result::Result<Self, BackendError> {
        const WHITE: [u8; 4] = [255, 255, 255, 255];
        let texture_2d = backend.create_texture(&TextureDesc {
            label: "Placeholder Texture",
            kind: TextureKind::D2,
            format: TextureFormat::Rgba8,
            width: 1,
            height: 1,
            data: Some(&WHITE),
        })?;
        let faces = WHITE.repeat(6);
        let cube_map = backend.create_texture(&TextureDesc {
            label: "Placeholder Cube Map",
            kind: TextureKind::Cube,
            format: TextureFormat::Rgba8,
            width: 1,
            height: 1,
            data: Some(&faces),
        })?;
        Ok(Self {
            texture_2d,
            cube_map,
        })
    }
}

/// A compiled program plus its uniform table and render state.
#[derive(Debug)]
pub struct Material {
    label: String,
    program: ProgramId,
    decls: Vec<UniformDecl>,
    reserved: [Option<UniformValue>; ReservedUniform::COUNT],
    uniforms: HashMap<String, UniformValue>,
    /// Render state applied on every bind.
    pub state: RenderState,
}

impl Material {
    /// Validates the uniform declarations and compiles the program.
    ///
    /// A compile failure leaves nothing installed; the error carries the
    /// backend diagnostic.
    pub fn new(backend: &mut dyn GpuBackend, desc: &MaterialDesc) -> Result<Self> {
        let mut reserved = [None; ReservedUniform::COUNT];
        let mut uniforms = HashMap::new();

        for decl in &desc.uniforms {
            let duplicate = match ReservedUniform::from_name(&decl.name) {
                Some(slot) => {
                    if decl.kind != slot.kind() {
                        return Err(ConfigError::UniformTypeMismatch {
                            name: decl.name.clone(),
                            expected: slot.kind().name(),
                            actual: decl.kind.name(),
                        }
                        .into());
                    }
                    reserved[slot as usize]
                        .replace(decl.kind.default_value())
                        .is_some()
                }
                None => uniforms
                    .insert(decl.name.clone(), decl.kind.default_value())
                    .is_some(),
            };
            if duplicate {
                return Err(ConfigError::DuplicateUniform(decl.name.clone()).into());
            }
        }

        let program =
            backend.compile_program(&desc.vertex_source, &desc.fragment_source, &desc.uniforms)?;
        log::debug!(
            "compiled material '{}' ({} uniforms) as {:?}",
            desc.label,
            desc.uniforms.len(),
            program
        );

        Ok(Self {
            label: desc.label.clone(),
            program,
            decls: desc.uniforms.clone(),
            reserved,
            uniforms,
            state: desc.state,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn declarations(&self) -> &[UniformDecl] {
        &self.decls
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        match ReservedUniform::from_name(name) {
            Some(slot) => self.reserved[slot as usize].is_some(),
            None => self.uniforms.contains_key(name),
        }
    }

    pub fn has_reserved(&self, slot: ReservedUniform) -> bool {
        self.reserved[slot as usize].is_some()
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        match ReservedUniform::from_name(name) {
            Some(slot) => self.reserved[slot as usize],
            None => self.uniforms.get(name).copied(),
        }
    }

    /// Writes a declared uniform. The value must match the declared kind.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> std::result::Result<(), ConfigError> {
        let slot = match ReservedUniform::from_name(name) {
            Some(r) => self.reserved[r as usize].as_mut(),
            None => self.uniforms.get_mut(name),
        };
        let Some(slot) = slot else {
            return Err(ConfigError::UnknownUniform(name.to_string()));
        };
        if slot.kind() != value.kind() {
            return Err(ConfigError::UniformTypeMismatch {
                name: name.to_string(),
                expected: slot.kind().name(),
                actual: value.kind().name(),
            });
        }
        *slot = value;
        Ok(())
    }

    pub fn set_float(&mut self, name: &str, value: f32) -> std::result::Result<(), ConfigError> {
        self.set_uniform(name, UniformValue::Float(value))
    }

    pub fn set_vector3(&mut self, name: &str, value: Vector3) -> std::result::Result<(), ConfigError> {
        self.set_uniform(name, UniformValue::Vector3(value))
    }

    pub fn set_matrix4(&mut self, name: &str, value: Matrix4) -> std::result::Result<(), ConfigError> {
        self.set_uniform(name, UniformValue::Matrix4(value))
    }

    pub fn set_texture(&mut self, name: &str, texture: Option<TextureId>) -> std::result::Result<(), ConfigError> {
        self.set_uniform(name, UniformValue::Texture2D(texture))
    }

    pub fn set_cube_map(&mut self, name: &str, texture: Option<TextureId>) -> std::result::Result<(), ConfigError> {
        self.set_uniform(name, UniformValue::CubeMap(texture))
    }

    /// Fills the reserved slots this material declares; others are skipped.
    ///
    /// `uInvModelMatrix` is only computed when declared, and fails for a
    /// singular model matrix.
    pub fn update_uniforms(
        &mut self,
        model: &Matrix4,
        view: &Matrix4,
        projection: &Matrix4,
        normal: &Matrix4,
        camera_position: Vector3,
    ) -> std::result::Result<(), MathError> {
        for slot in ReservedUniform::ALL {
            let Some(entry) = self.reserved[slot as usize].as_mut() else {
                continue;
            };
            *entry = match slot {
                ReservedUniform::ModelMatrix => UniformValue::Matrix4(*model),
                ReservedUniform::ViewMatrix => UniformValue::Matrix4(*view),
                ReservedUniform::ProjectionMatrix => UniformValue::Matrix4(*projection),
                ReservedUniform::NormalMatrix => UniformValue::Matrix4(*normal),
                ReservedUniform::CameraPosition => UniformValue::Vector3(camera_position),
                ReservedUniform::InvModelMatrix => UniformValue::Matrix4(model.inverse()?),
            };
        }
        Ok(())
    }

    /// Makes this material current: program, render state, then every uniform
    /// in declaration order.
    pub fn bind(
        &self,
        backend: &mut dyn GpuBackend,
        fallback: &FallbackTextures,
    ) -> std::result::Result<(), BackendError> {
        backend.use_program(self.program)?;
        backend.set_render_state(self.state);
        for decl in &self.decls {
            if let Some(value) = self.uniform(&decl.name) {
                backend.set_uniform(&decl.name, value.to_binding(fallback))?;
            }
        }
        Ok(())
    }
}
