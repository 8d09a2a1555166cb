use crate::backend::GpuBackend;
use crate::error::{MathError, Result};
use crate::math::{Matrix4, Vector3};
use crate::render_target::RenderTarget;
use crate::renderer::shadow;

use super::ActorId;

/// Shadow map parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowConfig {
    /// Shadow map resolution (square).
    pub map_size: u32,
    /// Half extent of the orthographic frustum of directional lights.
    pub half_size: f32,
    /// Vertical field of view of point-light shadow cameras, in radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Depth offset subtracted before comparing against the stored depth.
    pub bias: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            map_size: 1024,
            half_size: 10.0,
            fov_y: std::f32::consts::FRAC_PI_2,
            near: 0.1,
            far: 50.0,
            bias: 0.005,
        }
    }
}

impl ShadowConfig {
    pub fn map_size(mut self, size: u32) -> Self {
        self.map_size = size;
        self
    }

    pub fn half_size(mut self, half_size: f32) -> Self {
        self.half_size = half_size;
        self
    }

    pub fn fov_y(mut self, fov_y: f32) -> Self {
        self.fov_y = fov_y;
        self
    }

    pub fn clip(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    pub fn bias(mut self, bias: f32) -> Self {
        self.bias = bias;
        self
    }
}

/// The two light shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    /// Parallel rays from `position` toward `target`; shadows use an
    /// orthographic camera.
    Directional,
    /// Rays from `position`; shadows use a perspective camera aimed at `target`.
    Point,
}

/// A depth render target plus the camera that renders into it.
#[derive(Debug)]
pub struct ShadowMap {
    pub config: ShadowConfig,
    target: RenderTarget,
}

impl ShadowMap {
    pub fn new(backend: &mut dyn GpuBackend, config: ShadowConfig) -> Result<Self> {
        Ok(Self {
            config,
            target: RenderTarget::depth(backend, "Shadow Map")?,
        })
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut RenderTarget {
        &mut self.target
    }
}

/// A light source.
#[derive(Debug)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vector3,
    pub intensity: f32,
    pub position: Vector3,
    /// Point the light (and its shadow camera) faces.
    pub target: Vector3,
    /// Actor whose world position the light follows, if any.
    pub follow: Option<ActorId>,
    pub shadow: Option<ShadowMap>,
}

impl Light {
    /// A directional light placed at `position` shining toward `target`.
    pub fn directional(position: Vector3, target: Vector3) -> Self {
        Self {
            kind: LightKind::Directional,
            color: Vector3::ONE,
            intensity: 1.0,
            position,
            target,
            follow: None,
            shadow: None,
        }
    }

    pub fn point(position: Vector3) -> Self {
        Self {
            kind: LightKind::Point,
            color: Vector3::ONE,
            intensity: 1.0,
            position,
            target: Vector3::ZERO,
            follow: None,
            shadow: None,
        }
    }

    pub fn with_color(mut self, color: Vector3) -> Self {
        self.color = color;
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_target(mut self, target: Vector3) -> Self {
        self.target = target;
        self
    }

    pub fn with_shadow(mut self, shadow: ShadowMap) -> Self {
        self.shadow = Some(shadow);
        self
    }

    /// Makes the light track an actor's world position every frame.
    pub fn following(mut self, actor: ActorId) -> Self {
        self.follow = Some(actor);
        self
    }

    pub fn casts_shadows(&self) -> bool {
        self.shadow.is_some()
    }

    /// Unit vector from the light toward its target.
    pub fn direction(&self) -> Vector3 {
        (self.target - self.position).normalize_or_zero()
    }

    /// Color scaled by intensity.
    pub fn radiance(&self) -> Vector3 {
        self.color * self.intensity
    }

    /// Camera-to-world matrix of the shadow camera.
    pub fn world_matrix(&self) -> Matrix4 {
        Matrix4::look_at(self.position, self.target, Vector3::Y)
    }

    pub fn view_matrix(&self) -> std::result::Result<Matrix4, MathError> {
        self.world_matrix().inverse()
    }

    /// Shadow camera projection. Lights without a shadow map use defaults.
    pub fn projection_matrix(&self) -> Matrix4 {
        let config = self.shadow.as_ref().map(|s| s.config).unwrap_or_default();
        match self.kind {
            LightKind::Directional => {
                let h = config.half_size;
                Matrix4::orthographic(-h, h, -h, h, config.near, config.far)
            }
            LightKind::Point => Matrix4::perspective(config.fov_y, 1.0, config.near, config.far),
        }
    }

    /// World space to shadow-map `(u, v, depth)`: `bias × P × inverse(world)`.
    pub fn texture_matrix(&self) -> std::result::Result<Matrix4, MathError> {
        shadow::texture_matrix(&self.projection_matrix(), &self.world_matrix())
    }
}
