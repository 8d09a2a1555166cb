use crate::math::Matrix4;
use crate::render_target::RenderTarget;
use crate::renderer::PostProcessChain;

/// Projection of a camera. The aspect ratio comes from the viewport.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective { fov_y: f32, near: f32, far: f32 },
    /// `half_height` is half the visible height; the width follows the aspect.
    Orthographic { half_height: f32, near: f32, far: f32 },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: 60f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Projection {
    pub fn matrix(&self, aspect: f32) -> Matrix4 {
        match *self {
            Projection::Perspective { fov_y, near, far } => Matrix4::perspective(fov_y, aspect, near, far),
            Projection::Orthographic {
                half_height,
                near,
                far,
            } => {
                let half_width = half_height * aspect;
                Matrix4::orthographic(-half_width, half_width, -half_height, half_height, near, far)
            }
        }
    }
}

/// Renders the scene from its actor's point of view.
///
/// The view matrix is the inverse of the actor's model matrix, so the camera
/// looks down the actor's local −Z. Output goes to the post-process chain's
/// input when a chain is attached, otherwise to `target`, otherwise to the
/// screen.
pub struct CameraComponent {
    pub projection: Projection,
    /// Clear color of the color pass; `None` keeps the renderer default.
    pub clear_color: Option<[f32; 4]>,
    viewport: (u32, u32),
    target: Option<RenderTarget>,
    post: Option<PostProcessChain>,
}

impl CameraComponent {
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            clear_color: None,
            viewport: (1, 1),
            target: None,
            post: None,
        }
    }

    pub fn perspective(fov_y: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Perspective { fov_y, near, far })
    }

    /// Renders into an off-screen target instead of the screen.
    pub fn with_target(mut self, target: RenderTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_post_process(mut self, chain: PostProcessChain) -> Self {
        self.post = Some(chain);
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = Some(color);
        self
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
    }

    pub fn aspect(&self) -> f32 {
        self.viewport.0 as f32 / self.viewport.1 as f32
    }

    pub fn projection_matrix(&self) -> Matrix4 {
        self.projection.matrix(self.aspect())
    }

    pub fn target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }

    pub fn post_process(&self) -> Option<&PostProcessChain> {
        self.post.as_ref()
    }

    pub(crate) fn outputs_mut(&mut self) -> (Option<&mut RenderTarget>, Option<&mut PostProcessChain>) {
        (self.target.as_mut(), self.post.as_mut())
    }
}

impl std::fmt::Debug for CameraComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraComponent")
            .field("projection", &self.projection)
            .field("viewport", &self.viewport)
            .field("has_target", &self.target.is_some())
            .field("post_passes", &self.post.as_ref().map_or(0, PostProcessChain::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3;

    #[test]
    fn orthographic_width_follows_aspect() {
        let mut camera = CameraComponent::new(Projection::Orthographic {
            half_height: 2.0,
            near: 0.1,
            far: 10.0,
        });
        camera.set_viewport(200, 100);
        let p = camera.projection_matrix().transform_point(Vector3::new(4.0, 2.0, -1.0));
        assert!((p.x - 1.0).abs() < 1e-5 && (p.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_viewport_is_clamped() {
        let mut camera = CameraComponent::new(Projection::default());
        camera.set_viewport(0, 0);
        assert_eq!(camera.viewport(), (1, 1));
        assert!(camera.aspect().is_finite());
    }
}
