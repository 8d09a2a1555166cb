//! A CPU backend that records commands and rasterizes depth.
//!
//! [`HeadlessBackend`] keeps a log of every call made against it, which tests
//! read back to check pass ordering and uniform binding. Shader sources are
//! not executed. Instead, triangle draws into a framebuffer with a depth
//! attachment are rasterized with fixed-function semantics:
//!
//! - positions come from the `aPosition` stream of the vertex array
//! - clip space is `uProjectionMatrix * uViewMatrix * uModelMatrix`, read from
//!   the uniforms set on the current program (missing ones are identity)
//! - triangles with a vertex behind the eye (`w <= 0`) are dropped
//! - counter-clockwise triangles in NDC are front faces
//! - depth is tested with "less" and written when the render state allows
//!
//! That is enough to produce real shadow maps and inspect them with
//! [`HeadlessBackend::depth_image`].

use std::collections::HashMap;

use glam::{Vec2, Vec3, Vec4};

use super::{
    ClearOps, DrawCall, FramebufferId, GpuBackend, ProgramId, TextureDesc, TextureFormat, TextureId,
    TextureKind, UniformBinding, VertexArrayDesc, VertexArrayId,
};
use crate::error::BackendError;
use crate::geometry::{PrimitiveKind, VertexAttribute};
use crate::material::{CullFace, RenderState, UniformDecl};
use crate::math::Matrix4;

/// One recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CompileProgram {
        program: ProgramId,
        uniforms: usize,
    },
    CreateVertexArray {
        vertex_array: VertexArrayId,
        vertex_count: u32,
    },
    CreateTexture {
        texture: TextureId,
        kind: TextureKind,
        format: TextureFormat,
        width: u32,
        height: u32,
    },
    ResizeTexture {
        texture: TextureId,
        width: u32,
        height: u32,
    },
    CreateFramebuffer {
        framebuffer: FramebufferId,
        color: Option<TextureId>,
        depth: Option<TextureId>,
    },
    BindFramebuffer(Option<FramebufferId>),
    SetViewport {
        width: u32,
        height: u32,
    },
    Clear(ClearOps),
    UseProgram(ProgramId),
    SetRenderState(RenderState),
    SetUniform {
        program: ProgramId,
        name: String,
        value: UniformBinding,
    },
    Draw(DrawCall),
    BeginFrame,
    EndFrame,
}

/// A snapshot of a depth texture, row 0 at the top.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl DepthImage {
    pub fn at(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    /// Nearest-texel lookup. `(0, 0)` is the top-left corner; coordinates are
    /// clamped to the edge.
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        let x = ((u * self.width as f32).floor() as i64).clamp(0, self.width as i64 - 1);
        let y = ((v * self.height as f32).floor() as i64).clamp(0, self.height as i64 - 1);
        self.at(x as u32, y as u32)
    }

    /// Number of texels closer than the cleared far plane.
    pub fn covered_texels(&self) -> usize {
        self.data.iter().filter(|&&d| d < 1.0).count()
    }
}

struct ProgramRecord {
    decls: Vec<UniformDecl>,
    values: HashMap<String, UniformBinding>,
}

struct VertexArrayRecord {
    positions: Vec<Vec3>,
    indices: Option<Vec<u32>>,
}

struct TextureRecord {
    kind: TextureKind,
    format: TextureFormat,
    width: u32,
    height: u32,
    depth: Vec<f32>,
    rgba: Vec<u8>,
}

impl TextureRecord {
    fn allocate(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        let texels = (width * height) as usize;
        match self.format {
            TextureFormat::Depth32 => self.depth = vec![1.0; texels],
            TextureFormat::Rgba8 => {
                let faces = if self.kind == TextureKind::Cube { 6 } else { 1 };
                self.rgba = vec![0; texels * 4 * faces];
            }
        }
    }
}

#[derive(Clone, Copy)]
struct FramebufferRecord {
    color: Option<TextureId>,
    depth: Option<TextureId>,
}

/// Command-recording backend with a depth rasterizer.
pub struct HeadlessBackend {
    commands: Vec<Command>,
    programs: Vec<ProgramRecord>,
    vertex_arrays: Vec<VertexArrayRecord>,
    textures: Vec<TextureRecord>,
    framebuffers: Vec<FramebufferRecord>,
    bound_framebuffer: Option<FramebufferId>,
    current_program: Option<ProgramId>,
    state: RenderState,
    viewport: (u32, u32),
    surface: (u32, u32),
    frames: u64,
    last_error: Option<String>,
}

impl HeadlessBackend {
    /// Creates a backend whose screen is `width`×`height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            commands: Vec::new(),
            programs: Vec::new(),
            vertex_arrays: Vec::new(),
            textures: Vec::new(),
            framebuffers: Vec::new(),
            bound_framebuffer: None,
            current_program: None,
            state: RenderState::default(),
            viewport: (width, height),
            surface: (width, height),
            frames: 0,
            last_error: None,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound_framebuffer
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures
            .get(texture.0 as usize)
            .map(|t| (t.width, t.height))
    }

    /// Attachments of a framebuffer as `(color, depth)`.
    pub fn framebuffer_attachments(
        &self,
        framebuffer: FramebufferId,
    ) -> Option<(Option<TextureId>, Option<TextureId>)> {
        self.framebuffers
            .get(framebuffer.0 as usize)
            .map(|f| (f.color, f.depth))
    }

    /// Copies out the contents of a depth texture.
    pub fn depth_image(&self, texture: TextureId) -> Option<DepthImage> {
        let record = self.textures.get(texture.0 as usize)?;
        if !record.format.is_depth() {
            return None;
        }
        Some(DepthImage {
            width: record.width,
            height: record.height,
            data: record.depth.clone(),
        })
    }

    /// RGBA8 texels of a color texture (all faces for a cube map).
    pub fn color_data(&self, texture: TextureId) -> Option<&[u8]> {
        let record = self.textures.get(texture.0 as usize)?;
        (record.format == TextureFormat::Rgba8).then_some(record.rgba.as_slice())
    }

    /// Last value set for `name` on `program`.
    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformBinding> {
        self.programs
            .get(program.0 as usize)
            .and_then(|p| p.values.get(name).copied())
    }

    fn fail(&mut self, err: BackendError) -> BackendError {
        self.last_error = Some(err.to_string());
        err
    }

    fn texture_mut(&mut self, texture: TextureId) -> Result<&mut TextureRecord, BackendError> {
        if (texture.0 as usize) >= self.textures.len() {
            return Err(self.fail(BackendError::UnknownTexture(texture.0)));
        }
        Ok(&mut self.textures[texture.0 as usize])
    }

    fn matrix_uniform(&self, program: ProgramId, name: &str) -> Matrix4 {
        match self.uniform(program, name) {
            Some(UniformBinding::Matrix4(m)) => m,
            _ => Matrix4::IDENTITY,
        }
    }

    fn rasterize(&mut self, program: ProgramId, call: &DrawCall) -> Result<(), BackendError> {
        let triangles = matches!(call.primitive, PrimitiveKind::Triangles | PrimitiveKind::TriangleStrip);
        if !triangles || self.state.cull_face == CullFace::FrontAndBack {
            return Ok(());
        }
        if !self.state.depth_test && !self.state.depth_write {
            return Ok(());
        }
        let Some(fb) = self.bound_framebuffer else {
            return Ok(());
        };
        let Some(depth_id) = self.framebuffers[fb.0 as usize].depth else {
            return Ok(());
        };

        let mvp = Matrix4::multiply_matrices(&[
            self.matrix_uniform(program, "uProjectionMatrix"),
            self.matrix_uniform(program, "uViewMatrix"),
            self.matrix_uniform(program, "uModelMatrix"),
        ]);

        let va = &self.vertex_arrays[call.vertex_array.0 as usize];
        let element = |i: usize| -> Option<Vec3> {
            let index = match &va.indices {
                Some(indices) if call.indexed => *indices.get(i)? as usize,
                _ => i,
            };
            va.positions.get(index).copied()
        };
        let count = call.count as usize;
        let mut clip = Vec::with_capacity(count);
        match call.primitive {
            PrimitiveKind::TriangleStrip => {
                for i in 0..count.saturating_sub(2) {
                    // Odd strip triangles swap two corners to keep winding.
                    let (a, b) = if i % 2 == 0 { (i, i + 1) } else { (i + 1, i) };
                    for j in [a, b, i + 2] {
                        clip.push(element(j));
                    }
                }
            }
            _ => {
                for i in 0..count - count % 3 {
                    clip.push(element(i));
                }
            }
        }
        let clip: Vec<Vec4> = clip
            .into_iter()
            .map(|p| p.map_or(Vec4::ZERO, |p| mvp * p.extend(1.0)))
            .collect();

        let state = self.state;
        let target = &mut self.textures[depth_id.0 as usize];
        let (width, height) = (target.width, target.height);
        let mut drawn = 0usize;

        for tri in clip.chunks_exact(3) {
            if tri.iter().any(|v| v.w <= 0.0) {
                continue;
            }
            let ndc: [Vec3; 3] = [tri[0].truncate() / tri[0].w, tri[1].truncate() / tri[1].w, tri[2].truncate() / tri[2].w];
            let area = (ndc[1].x - ndc[0].x) * (ndc[2].y - ndc[0].y)
                - (ndc[2].x - ndc[0].x) * (ndc[1].y - ndc[0].y);
            if area == 0.0 {
                continue;
            }
            let front = area > 0.0;
            match state.cull_face {
                CullFace::Back if !front => continue,
                CullFace::Front if front => continue,
                _ => {}
            }

            let screen: [Vec2; 3] = ndc.map(|p| {
                Vec2::new((p.x * 0.5 + 0.5) * width as f32, (0.5 - p.y * 0.5) * height as f32)
            });
            let edge = |a: Vec2, b: Vec2, p: Vec2| (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
            let total = edge(screen[0], screen[1], screen[2]);

            let min = screen[0].min(screen[1]).min(screen[2]);
            let max = screen[0].max(screen[1]).max(screen[2]);
            let x0 = (min.x.floor().max(0.0)) as u32;
            let y0 = (min.y.floor().max(0.0)) as u32;
            let x1 = (max.x.ceil().min(width as f32)) as u32;
            let y1 = (max.y.ceil().min(height as f32)) as u32;

            for y in y0..y1 {
                for x in x0..x1 {
                    let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                    let w0 = edge(screen[1], screen[2], p) / total;
                    let w1 = edge(screen[2], screen[0], p) / total;
                    let w2 = edge(screen[0], screen[1], p) / total;
                    if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                        continue;
                    }
                    let z = w0 * ndc[0].z + w1 * ndc[1].z + w2 * ndc[2].z;
                    if !(0.0..=1.0).contains(&z) {
                        continue;
                    }
                    let texel = &mut target.depth[(y * width + x) as usize];
                    if state.depth_test && z >= *texel {
                        continue;
                    }
                    if state.depth_write {
                        *texel = z;
                    }
                    drawn += 1;
                }
            }
        }

        log::trace!("rasterized {} depth texels into {:?}", drawn, depth_id);
        Ok(())
    }
}

impl GpuBackend for HeadlessBackend {
    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
        uniforms: &[UniformDecl],
    ) -> Result<ProgramId, BackendError> {
        if vertex_source.trim().is_empty() {
            return Err(self.fail(BackendError::ShaderCompile("vertex shader source is empty".into())));
        }
        if fragment_source.trim().is_empty() {
            return Err(self.fail(BackendError::ShaderCompile("fragment shader source is empty".into())));
        }
        let program = ProgramId(self.programs.len() as u32);
        self.programs.push(ProgramRecord {
            decls: uniforms.to_vec(),
            values: HashMap::new(),
        });
        self.commands.push(Command::CompileProgram {
            program,
            uniforms: uniforms.len(),
        });
        Ok(program)
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> Result<VertexArrayId, BackendError> {
        let positions = desc
            .attributes
            .iter()
            .find(|a| a.attribute == VertexAttribute::Position)
            .map(|a| {
                a.data
                    .chunks_exact(3)
                    .map(|p| Vec3::new(p[0], p[1], p[2]))
                    .collect()
            })
            .unwrap_or_default();
        let vertex_array = VertexArrayId(self.vertex_arrays.len() as u32);
        self.vertex_arrays.push(VertexArrayRecord {
            positions,
            indices: desc.indices.map(<[u32]>::to_vec),
        });
        self.commands.push(Command::CreateVertexArray {
            vertex_array,
            vertex_count: desc.vertex_count,
        });
        Ok(vertex_array)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, BackendError> {
        let texture = TextureId(self.textures.len() as u32);
        let mut record = TextureRecord {
            kind: desc.kind,
            format: desc.format,
            width: 0,
            height: 0,
            depth: Vec::new(),
            rgba: Vec::new(),
        };
        record.allocate(desc.width, desc.height);
        if let (TextureFormat::Rgba8, Some(data)) = (desc.format, desc.data) {
            let n = record.rgba.len().min(data.len());
            record.rgba[..n].copy_from_slice(&data[..n]);
        }
        self.textures.push(record);
        self.commands.push(Command::CreateTexture {
            texture,
            kind: desc.kind,
            format: desc.format,
            width: desc.width,
            height: desc.height,
        });
        Ok(texture)
    }

    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) -> Result<(), BackendError> {
        self.texture_mut(texture)?.allocate(width, height);
        self.commands.push(Command::ResizeTexture {
            texture,
            width,
            height,
        });
        Ok(())
    }

    fn create_framebuffer(
        &mut self,
        color: Option<TextureId>,
        depth: Option<TextureId>,
    ) -> Result<FramebufferId, BackendError> {
        for texture in color.iter().chain(depth.iter()) {
            self.texture_mut(*texture)?;
        }
        let framebuffer = FramebufferId(self.framebuffers.len() as u32);
        self.framebuffers.push(FramebufferRecord { color, depth });
        self.commands.push(Command::CreateFramebuffer {
            framebuffer,
            color,
            depth,
        });
        Ok(framebuffer)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<(), BackendError> {
        if let Some(fb) = framebuffer {
            if fb.0 as usize >= self.framebuffers.len() {
                return Err(self.fail(BackendError::UnknownFramebuffer(fb.0)));
            }
        }
        self.bound_framebuffer = framebuffer;
        self.commands.push(Command::BindFramebuffer(framebuffer));
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.commands.push(Command::SetViewport { width, height });
    }

    fn clear(&mut self, ops: ClearOps) -> Result<(), BackendError> {
        if let Some(fb) = self.bound_framebuffer {
            let record = self.framebuffers[fb.0 as usize];
            if let (Some(depth), Some(texture)) = (ops.depth, record.depth) {
                self.texture_mut(texture)?.depth.fill(depth);
            }
            if let (Some(color), Some(texture)) = (ops.color, record.color) {
                let texel = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
                for chunk in self.texture_mut(texture)?.rgba.chunks_exact_mut(4) {
                    chunk.copy_from_slice(&texel);
                }
            }
        }
        self.commands.push(Command::Clear(ops));
        Ok(())
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), BackendError> {
        if program.0 as usize >= self.programs.len() {
            return Err(self.fail(BackendError::UnknownProgram(program.0)));
        }
        self.current_program = Some(program);
        self.commands.push(Command::UseProgram(program));
        Ok(())
    }

    fn set_render_state(&mut self, state: RenderState) {
        self.state = state;
        self.commands.push(Command::SetRenderState(state));
    }

    fn set_uniform(&mut self, name: &str, value: UniformBinding) -> Result<(), BackendError> {
        let Some(program) = self.current_program else {
            return Err(self.fail(BackendError::NoProgram));
        };
        let record = &mut self.programs[program.0 as usize];
        if !record.decls.iter().any(|d| d.name == name) {
            return Ok(());
        }
        record.values.insert(name.to_string(), value);
        self.commands.push(Command::SetUniform {
            program,
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), BackendError> {
        let Some(program) = self.current_program else {
            return Err(self.fail(BackendError::NoProgram));
        };
        if call.vertex_array.0 as usize >= self.vertex_arrays.len() {
            return Err(self.fail(BackendError::UnknownVertexArray(call.vertex_array.0)));
        }
        self.commands.push(Command::Draw(*call));
        self.rasterize(program, call)
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface = (width, height);
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        self.commands.push(Command::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        self.frames += 1;
        self.commands.push(Command::EndFrame);
        Ok(())
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}
