use std::cell::RefCell;
use std::rc::Rc;

use crate::debug::DebugContext;
use crate::error::Result;
use crate::geometry::Geometry;
use crate::material::Material;

use super::camera::CameraComponent;
use super::light::Light;
use super::transform::Transform;
use super::{ActorId, FrameTime, SceneCommand};

/// What a lifecycle hook may touch while it runs.
///
/// Hooks never hold a reference back to their actor. Structural changes
/// (removing actors or components) go through [`ScriptContext::defer`] and
/// are applied after the update sweep.
pub struct ScriptContext<'a> {
    pub actor: ActorId,
    pub name: &'a str,
    pub transform: &'a mut Transform,
    pub time: FrameTime,
    pub debug: &'a mut DebugContext,
    pub lights: &'a mut [Light],
    pub(crate) commands: &'a mut Vec<SceneCommand>,
}

impl ScriptContext<'_> {
    /// Queues a structural change for after the update sweep.
    pub fn defer(&mut self, command: SceneCommand) {
        self.commands.push(command);
    }
}

/// Passed to `set_size` hooks on viewport change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeContext {
    pub width: u32,
    pub height: u32,
}

/// User behavior attached to an actor.
pub trait Script {
    /// Runs once, the first frame the owning actor is updated.
    fn start(&mut self, _ctx: &mut ScriptContext) -> Result<()> {
        Ok(())
    }

    /// Runs every frame, after every component of the actor has started.
    fn update(&mut self, ctx: &mut ScriptContext) -> Result<()>;

    fn set_size(&mut self, _ctx: &ResizeContext) {}
}

struct FnScript<F>(F);

impl<F> Script for FnScript<F>
where
    F: FnMut(&mut ScriptContext) -> Result<()>,
{
    fn update(&mut self, ctx: &mut ScriptContext) -> Result<()> {
        (self.0)(ctx)
    }
}

/// Boxed [`Script`].
pub struct ScriptComponent {
    script: Box<dyn Script>,
}

impl ScriptComponent {
    pub fn new(script: impl Script + 'static) -> Self {
        Self {
            script: Box::new(script),
        }
    }

    /// A script with only an update hook.
    pub fn from_fn(f: impl FnMut(&mut ScriptContext) -> Result<()> + 'static) -> Self {
        Self::new(FnScript(f))
    }
}

/// Draws shared geometry with a shared material.
#[derive(Debug)]
pub struct MeshComponent {
    pub geometry: Rc<Geometry>,
    pub material: Rc<RefCell<Material>>,
    /// Replaces the renderer's depth material in shadow passes.
    pub shadow_material: Option<Rc<RefCell<Material>>>,
    pub cast_shadow: bool,
    pub visible: bool,
}

impl MeshComponent {
    pub fn new(geometry: Rc<Geometry>, material: Rc<RefCell<Material>>) -> Self {
        Self {
            geometry,
            material,
            shadow_material: None,
            cast_shadow: true,
            visible: true,
        }
    }

    pub fn with_shadow_material(mut self, material: Rc<RefCell<Material>>) -> Self {
        self.shadow_material = Some(material);
        self
    }

    pub fn cast_shadow(mut self, cast: bool) -> Self {
        self.cast_shadow = cast;
        self
    }
}

/// The closed set of component behaviors.
pub enum ComponentKind {
    Mesh(MeshComponent),
    Script(ScriptComponent),
    Camera(CameraComponent),
}

/// A behavior slot on an actor with its lifecycle flag.
pub struct Component {
    started: bool,
    pub kind: ComponentKind,
}

impl Component {
    pub fn new(kind: ComponentKind) -> Self {
        Self { started: false, kind }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Runs the start hook unless it already ran.
    pub fn start(&mut self, ctx: &mut ScriptContext) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        match &mut self.kind {
            ComponentKind::Script(s) => s.script.start(ctx),
            ComponentKind::Mesh(_) | ComponentKind::Camera(_) => Ok(()),
        }
    }

    pub fn update(&mut self, ctx: &mut ScriptContext) -> Result<()> {
        match &mut self.kind {
            ComponentKind::Script(s) => s.script.update(ctx),
            ComponentKind::Mesh(_) | ComponentKind::Camera(_) => Ok(()),
        }
    }

    pub fn set_size(&mut self, ctx: &ResizeContext) {
        match &mut self.kind {
            ComponentKind::Script(s) => s.script.set_size(ctx),
            ComponentKind::Camera(c) => c.set_viewport(ctx.width, ctx.height),
            ComponentKind::Mesh(_) => {}
        }
    }

    pub fn as_mesh(&self) -> Option<&MeshComponent> {
        match &self.kind {
            ComponentKind::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_camera(&self) -> Option<&CameraComponent> {
        match &self.kind {
            ComponentKind::Camera(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_camera_mut(&mut self) -> Option<&mut CameraComponent> {
        match &mut self.kind {
            ComponentKind::Camera(c) => Some(c),
            _ => None,
        }
    }
}

impl From<MeshComponent> for Component {
    fn from(mesh: MeshComponent) -> Self {
        Component::new(ComponentKind::Mesh(mesh))
    }
}

impl From<ScriptComponent> for Component {
    fn from(script: ScriptComponent) -> Self {
        Component::new(ComponentKind::Script(script))
    }
}

impl From<CameraComponent> for Component {
    fn from(camera: CameraComponent) -> Self {
        Component::new(ComponentKind::Camera(camera))
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            ComponentKind::Mesh(_) => "Mesh",
            ComponentKind::Script(_) => "Script",
            ComponentKind::Camera(_) => "Camera",
        };
        f.debug_struct("Component")
            .field("kind", &kind)
            .field("started", &self.started)
            .finish()
    }
}
