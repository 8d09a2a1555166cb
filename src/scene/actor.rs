use crate::error::Result;

use super::camera::CameraComponent;
use super::component::{Component, MeshComponent, ResizeContext, ScriptContext};
use super::transform::Transform;
use super::{ActorId, FrameContext};

/// Tag describing what an actor represents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ActorKind {
    Mesh,
    Camera,
    Light,
    Projector,
    #[default]
    None,
}

/// A named entity: one transform and an ordered list of components.
///
/// Component order is update order.
#[derive(Debug)]
pub struct Actor {
    pub(crate) id: ActorId,
    pub name: String,
    pub kind: ActorKind,
    pub transform: Transform,
    components: Vec<Component>,
}

impl Actor {
    pub fn new(name: impl Into<String>, kind: ActorKind) -> Self {
        Self {
            id: ActorId::UNASSIGNED,
            name: name.into(),
            kind,
            transform: Transform::new(),
            components: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_component(mut self, component: impl Into<Component>) -> Self {
        self.components.push(component.into());
        self
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn add_component(&mut self, component: impl Into<Component>) -> usize {
        self.components.push(component.into());
        self.components.len() - 1
    }

    /// Removes a component by index. Out-of-range indices are ignored.
    pub fn remove_component(&mut self, index: usize) -> Option<Component> {
        (index < self.components.len()).then(|| self.components.remove(index))
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn meshes(&self) -> impl Iterator<Item = &MeshComponent> {
        self.components.iter().filter_map(Component::as_mesh)
    }

    pub fn camera(&self) -> Option<&CameraComponent> {
        self.components.iter().find_map(Component::as_camera)
    }

    pub fn camera_mut(&mut self) -> Option<&mut CameraComponent> {
        self.components.iter_mut().find_map(Component::as_camera_mut)
    }

    /// Runs every pending start hook. Components that already started are
    /// skipped, so calling this twice runs each hook once.
    pub fn start(&mut self, frame: &mut FrameContext) -> Result<()> {
        let mut ctx = ScriptContext {
            actor: self.id,
            name: &self.name,
            transform: &mut self.transform,
            time: frame.time,
            debug: &mut *frame.debug,
            lights: &mut *frame.lights,
            commands: &mut *frame.commands,
        };
        for component in &mut self.components {
            component.start(&mut ctx)?;
        }
        Ok(())
    }

    /// Starts anything new, then updates every component in order.
    pub fn update(&mut self, frame: &mut FrameContext) -> Result<()> {
        self.start(frame)?;
        let mut ctx = ScriptContext {
            actor: self.id,
            name: &self.name,
            transform: &mut self.transform,
            time: frame.time,
            debug: &mut *frame.debug,
            lights: &mut *frame.lights,
            commands: &mut *frame.commands,
        };
        for component in &mut self.components {
            component.update(&mut ctx)?;
        }
        Ok(())
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        let ctx = ResizeContext { width, height };
        for component in &mut self.components {
            component.set_size(&ctx);
        }
    }
}
