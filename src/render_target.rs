//! Off-screen render targets.

use crate::backend::{
    FramebufferId, GpuBackend, TextureDesc, TextureFormat, TextureId, TextureKind,
};
use crate::error::{ConfigError, Result};

/// A framebuffer with an optional color texture and an optional depth texture.
///
/// Targets are created at 1×1 and resized when the viewport they serve
/// changes. Both textures can be sampled afterwards: the color texture as a
/// post-process input, the depth texture as a shadow map.
///
/// # Fields
///
/// * `label` - Debug label, also used for the texture labels
/// * `framebuffer` - Backend framebuffer with the attachments below
/// * `color` - Rgba8 color attachment, if any
/// * `depth` - Depth32 depth attachment, if any
#[derive(Debug)]
pub struct RenderTarget {
    label: String,
    framebuffer: FramebufferId,
    color: Option<TextureId>,
    depth: Option<TextureId>,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// A color-only target, used between post-process passes.
    pub fn color(backend: &mut dyn GpuBackend, label: &str) -> Result<Self> {
        Self::new(backend, label, true, false)
    }

    /// A depth-only target, used for shadow maps.
    pub fn depth(backend: &mut dyn GpuBackend, label: &str) -> Result<Self> {
        Self::new(backend, label, false, true)
    }

    /// A color target with a depth buffer, used for scene rendering.
    pub fn color_depth(backend: &mut dyn GpuBackend, label: &str) -> Result<Self> {
        Self::new(backend, label, true, true)
    }

    fn new(backend: &mut dyn GpuBackend, label: &str, with_color: bool, with_depth: bool) -> Result<Self> {
        let mut texture = |format: TextureFormat, suffix: &str| {
            backend.create_texture(&TextureDesc {
                label: &format!("{label} {suffix}"),
                kind: TextureKind::D2,
                format,
                width: 1,
                height: 1,
                data: None,
            })
        };
        let color = with_color
            .then(|| texture(TextureFormat::Rgba8, "Color"))
            .transpose()?;
        let depth = with_depth
            .then(|| texture(TextureFormat::Depth32, "Depth"))
            .transpose()?;
        let framebuffer = backend.create_framebuffer(color, depth)?;

        Ok(Self {
            label: label.to_string(),
            framebuffer,
            color,
            depth,
            width: 1,
            height: 1,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }

    pub fn color_texture(&self) -> Option<TextureId> {
        self.color
    }

    pub fn depth_texture(&self) -> Option<TextureId> {
        self.depth
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Reallocates the attachments at a new size. Same size is a no-op;
    /// zero in either dimension is rejected.
    pub fn resize(&mut self, backend: &mut dyn GpuBackend, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidTargetSize { width, height }.into());
        }
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        for texture in self.color.iter().chain(self.depth.iter()) {
            backend.resize_texture(*texture, width, height)?;
        }
        log::debug!(
            "resized render target '{}' {}x{} -> {}x{}",
            self.label,
            self.width,
            self.height,
            width,
            height
        );
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Binds the framebuffer and sets the viewport to cover it.
    pub fn bind(&self, backend: &mut dyn GpuBackend) -> Result<()> {
        backend.bind_framebuffer(Some(self.framebuffer))?;
        backend.set_viewport(self.width, self.height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::error::Error;

    #[test]
    fn starts_at_one_by_one() {
        let mut backend = HeadlessBackend::new(64, 64);
        let target = RenderTarget::color_depth(&mut backend, "scene").unwrap();
        assert_eq!(target.size(), (1, 1));
        let color = target.color_texture().unwrap();
        assert_eq!(backend.texture_size(color), Some((1, 1)));
        assert_eq!(
            backend.framebuffer_attachments(target.framebuffer()),
            Some((Some(color), target.depth_texture()))
        );
    }

    #[test]
    fn depth_only_target_has_no_color() {
        let mut backend = HeadlessBackend::new(64, 64);
        let target = RenderTarget::depth(&mut backend, "shadow").unwrap();
        assert!(target.color_texture().is_none());
        assert!(target.depth_texture().is_some());
    }

    #[test]
    fn resize_reallocates_textures() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut target = RenderTarget::color_depth(&mut backend, "scene").unwrap();
        target.resize(&mut backend, 320, 200).unwrap();
        assert_eq!(target.size(), (320, 200));
        assert_eq!(backend.texture_size(target.depth_texture().unwrap()), Some((320, 200)));
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut backend = HeadlessBackend::new(64, 64);
        let mut target = RenderTarget::color(&mut backend, "post").unwrap();
        assert!(matches!(
            target.resize(&mut backend, 0, 10),
            Err(Error::Config(ConfigError::InvalidTargetSize { width: 0, height: 10 }))
        ));
        assert_eq!(target.size(), (1, 1));
    }
}
