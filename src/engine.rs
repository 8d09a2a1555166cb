use crate::backend::GpuBackend;
use crate::debug::DebugContext;
use crate::error::Result;
use crate::renderer::{Renderer, RendererSettings};
use crate::scene::{FrameTime, Scene};

/// Owns everything a frame needs: the backend, the scene, the renderer and
/// the debug context.
///
/// The host calls [`Engine::frame`] once per refresh and [`Engine::resize`]
/// when the drawable size changes. A failed frame is logged and returned;
/// nothing is retried.
pub struct Engine<B: GpuBackend> {
    backend: B,
    scene: Scene,
    renderer: Renderer,
    debug: DebugContext,
}

impl<B: GpuBackend> Engine<B> {
    pub fn new(mut backend: B, settings: RendererSettings) -> Result<Self> {
        let renderer = Renderer::new(&mut backend, settings)?;
        let mut scene = Scene::new();
        let (width, height) = backend.surface_size();
        scene.set_size(width, height);
        Ok(Self {
            backend,
            scene,
            renderer,
            debug: DebugContext::new(),
        })
    }

    /// Updates the scene, then renders it.
    pub fn frame(&mut self, time: f32, delta: f32) -> Result<()> {
        self.debug.begin_frame(delta);
        let result = self
            .scene
            .update(FrameTime::new(time, delta), &mut self.debug)
            .and_then(|()| {
                self.renderer
                    .render(&mut self.backend, &mut self.scene, &mut self.debug)
            });
        if let Err(err) = &result {
            log::error!("frame {} failed: {err}", self.debug.stats().frame);
        }
        result
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        log::debug!("viewport resized to {width}x{height}");
        self.backend.resize_surface(width, height);
        self.scene.set_size(width, height);
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Backend and scene together, for building resources while populating
    /// the scene.
    pub fn parts_mut(&mut self) -> (&mut B, &mut Scene) {
        (&mut self.backend, &mut self.scene)
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn debug(&self) -> &DebugContext {
        &self.debug
    }
}
