//! Chained full-screen passes.
//!
//! A [`PostProcessChain`] owns a color+depth input target that its camera
//! renders into, and one color target per pass except the last. Pass `i`
//! samples the output of pass `i - 1` (pass 0 samples the input) through the
//! `uSceneTexture` uniform. The last pass writes to the camera's own target
//! when it has one, otherwise to the screen.
//!
//! Pass shaders run over [`Geometry::fullscreen_quad`], which provides
//! `aPosition` in NDC and `aUv` with `(0, 0)` at the top-left.

use crate::backend::{ClearOps, GpuBackend, TextureId};
use crate::error::{ConfigError, Result};
use crate::geometry::Geometry;
use crate::material::{FallbackTextures, Material, MaterialDesc, RenderState, UniformKind};
use crate::math::Vector3;
use crate::render_target::RenderTarget;

/// Input texture of every post-process pass.
pub const SCENE_TEXTURE: &str = "uSceneTexture";
/// Optional `(width, height, 0)` of the pass output, set when declared.
pub const RESOLUTION: &str = "uResolution";

/// One full-screen material.
#[derive(Debug)]
pub struct PostProcessPass {
    material: Material,
}

impl PostProcessPass {
    /// Compiles the pass material. `uSceneTexture` is declared automatically
    /// if the description leaves it out, and depth and culling are turned off.
    pub fn new(backend: &mut dyn GpuBackend, desc: &MaterialDesc) -> Result<Self> {
        let mut desc = desc.clone();
        if !desc.uniforms.iter().any(|u| u.name == SCENE_TEXTURE) {
            desc = desc.uniform(SCENE_TEXTURE, UniformKind::Texture2D);
        }
        desc.state = RenderState {
            blend: desc.state.blend,
            ..RenderState::fullscreen()
        };
        Ok(Self {
            material: Material::new(backend, &desc)?,
        })
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    /// For setting the pass's own uniforms.
    pub fn material_mut(&mut self) -> &mut Material {
        &mut self.material
    }

    fn run(
        &mut self,
        backend: &mut dyn GpuBackend,
        quad: &Geometry,
        fallback: &FallbackTextures,
        source: Option<TextureId>,
        (width, height): (u32, u32),
    ) -> Result<()> {
        self.material.set_texture(SCENE_TEXTURE, source)?;
        if self.material.has_uniform(RESOLUTION) {
            self.material
                .set_vector3(RESOLUTION, Vector3::new(width as f32, height as f32, 0.0))?;
        }
        self.material.bind(backend, fallback)?;
        quad.draw(backend)?;
        Ok(())
    }
}

/// An ordered, non-empty list of passes plus their intermediate targets.
#[derive(Debug)]
pub struct PostProcessChain {
    input: RenderTarget,
    passes: Vec<PostProcessPass>,
    targets: Vec<RenderTarget>,
}

impl PostProcessChain {
    pub fn new(backend: &mut dyn GpuBackend, passes: Vec<PostProcessPass>) -> Result<Self> {
        if passes.is_empty() {
            return Err(ConfigError::EmptyPostProcessChain.into());
        }
        let input = RenderTarget::color_depth(backend, "Post Input")?;
        let targets = (0..passes.len() - 1)
            .map(|i| RenderTarget::color(backend, &format!("Post Pass {i}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            input,
            passes,
            targets,
        })
    }

    /// Builds a chain from material descriptions, one pass each.
    pub fn from_descs(backend: &mut dyn GpuBackend, descs: &[MaterialDesc]) -> Result<Self> {
        let passes = descs
            .iter()
            .map(|d| PostProcessPass::new(backend, d))
            .collect::<Result<Vec<_>>>()?;
        Self::new(backend, passes)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Where the camera's color pass renders.
    pub fn input(&self) -> &RenderTarget {
        &self.input
    }

    pub fn passes(&self) -> &[PostProcessPass] {
        &self.passes
    }

    pub fn passes_mut(&mut self) -> &mut [PostProcessPass] {
        &mut self.passes
    }

    /// Output target of pass `index`, or `None` for the last pass.
    pub fn pass_target(&self, index: usize) -> Option<&RenderTarget> {
        self.targets.get(index)
    }

    /// Resizes the input and every intermediate target.
    pub fn resize(&mut self, backend: &mut dyn GpuBackend, width: u32, height: u32) -> Result<()> {
        self.input.resize(backend, width, height)?;
        for target in &mut self.targets {
            target.resize(backend, width, height)?;
        }
        Ok(())
    }

    /// Runs every pass in order. Returns the number of passes run.
    pub(crate) fn run(
        &mut self,
        backend: &mut dyn GpuBackend,
        quad: &Geometry,
        fallback: &FallbackTextures,
        output: Option<&RenderTarget>,
        size: (u32, u32),
    ) -> Result<u32> {
        let last = self.passes.len() - 1;
        let mut source = self.input.color_texture();
        for (i, pass) in self.passes.iter_mut().enumerate() {
            let target = if i < last { self.targets.get(i) } else { output };
            match target {
                Some(target) => target.bind(backend)?,
                None => {
                    backend.bind_framebuffer(None)?;
                    backend.set_viewport(size.0, size.1);
                }
            }
            backend.clear(ClearOps {
                color: Some([0.0, 0.0, 0.0, 1.0]),
                depth: None,
            })?;
            pass.run(backend, quad, fallback, source, size)?;
            source = target.and_then(RenderTarget::color_texture);
        }
        Ok(self.passes.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::error::Error;

    fn desc(label: &str) -> MaterialDesc {
        MaterialDesc::new("vs", "fs").label(label)
    }

    #[test]
    fn empty_chain_is_rejected() {
        let mut backend = HeadlessBackend::new(4, 4);
        let err = PostProcessChain::new(&mut backend, Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::EmptyPostProcessChain)));
    }

    #[test]
    fn scene_texture_is_declared_once() {
        let mut backend = HeadlessBackend::new(4, 4);
        let explicit = desc("explicit").uniform(SCENE_TEXTURE, UniformKind::Texture2D);
        let pass = PostProcessPass::new(&mut backend, &explicit).unwrap();
        assert_eq!(pass.material().declarations().len(), 1);

        let implicit = PostProcessPass::new(&mut backend, &desc("implicit")).unwrap();
        assert!(implicit.material().has_uniform(SCENE_TEXTURE));
        assert!(!implicit.material().state.depth_test);
    }

    #[test]
    fn intermediate_targets_exclude_the_last_pass() {
        let mut backend = HeadlessBackend::new(4, 4);
        let chain =
            PostProcessChain::from_descs(&mut backend, &[desc("a"), desc("b"), desc("c")]).unwrap();
        assert_eq!(chain.len(), 3);
        assert!(chain.pass_target(1).is_some());
        assert!(chain.pass_target(2).is_none());
        assert!(chain.input().depth_texture().is_some());
    }
}
