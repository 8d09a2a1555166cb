//! Error types.
//!
//! Every fallible engine operation returns [`Result<T>`]. The umbrella
//! [`Error`] groups the failure classes the frame loop can hit:
//!
//! - [`MathError`]: numeric failures such as inverting a singular matrix
//! - [`ConfigError`]: invalid material, geometry or render-target setup
//! - [`BackendError`]: the GPU backend refused a request (shader compile, missing resource)
//!
//! None of these are retried. A frame that fails is abandoned and the error
//! surfaces from [`Engine::frame`](crate::Engine::frame).

use thiserror::Error;

/// Numeric failures in the math core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    /// The matrix determinant is exactly zero.
    #[error("singular matrix: determinant is zero")]
    SingularMatrix,
}

/// Invalid configuration detected at construction or first use.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown blend mode '{0}'")]
    UnknownBlendMode(String),

    #[error("unknown face culling mode '{0}'")]
    UnknownCullFace(String),

    #[error("unknown uniform type '{0}'")]
    UnknownUniformKind(String),

    #[error("unknown primitive kind '{0}'")]
    UnknownPrimitive(String),

    #[error("unknown vertex attribute '{0}'")]
    UnknownAttribute(String),

    /// A uniform was written that the material never declared.
    #[error("material has no uniform named '{0}'")]
    UnknownUniform(String),

    /// A uniform was written with a value of the wrong semantic type.
    #[error("uniform '{name}' expects {expected}, got {actual}")]
    UniformTypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("uniform '{0}' is declared more than once")]
    DuplicateUniform(String),

    /// Geometry was built without the mandatory position attribute.
    #[error("geometry has no position attribute")]
    MissingPositions,

    #[error("attribute {attribute} has {len} floats, not a multiple of {components}")]
    RaggedAttribute {
        attribute: &'static str,
        len: usize,
        components: usize,
    },

    #[error("attribute {attribute} has {actual} vertices, position has {expected}")]
    AttributeLengthMismatch {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    /// Render targets are at least 1×1.
    #[error("invalid render target size {width}x{height}")]
    InvalidTargetSize { width: u32, height: u32 },

    #[error("bone {bone} references parent {parent}, which does not precede it")]
    InvalidBoneParent { bone: usize, parent: usize },

    #[error("post-process chain needs at least one pass")]
    EmptyPostProcessChain,
}

/// Failures reported by a [`GpuBackend`](crate::backend::GpuBackend).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Shader compilation or linking failed; carries the backend diagnostic.
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),

    #[error("unknown program handle {0}")]
    UnknownProgram(u32),

    #[error("unknown texture handle {0}")]
    UnknownTexture(u32),

    #[error("unknown framebuffer handle {0}")]
    UnknownFramebuffer(u32),

    #[error("unknown vertex array handle {0}")]
    UnknownVertexArray(u32),

    #[error("draw issued without a program in use")]
    NoProgram,

    #[error("surface unavailable: {0}")]
    Surface(String),

    #[error("backend error: {0}")]
    Other(String),
}

/// Errors raised by the asset loader.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("unknown asset format '{0}'")]
    UnknownFormat(String),
}

/// The main error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Math(#[from] MathError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Load(#[from] LoadError),

    /// A script hook reported a failure.
    #[error("script '{actor}' failed: {message}")]
    Script { actor: String, message: String },

    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
