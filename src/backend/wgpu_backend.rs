//! The backend contract over wgpu.
//!
//! wgpu records work into render passes, while [`GpuBackend`] is a bind/clear/draw
//! state machine. This module bridges the two:
//!
//! - Draws are queued against the currently bound framebuffer and submitted as
//!   one render pass when the binding changes or the frame ends. A `clear`
//!   issued before the first queued draw becomes the pass load op.
//! - Every draw snapshots the program's uniform values into its own buffer and
//!   bind group, so later `set_uniform` calls never affect queued draws.
//! - Pipelines are built lazily and cached per program, render state, target
//!   formats, primitive and vertex layout.
//!
//! # Shader Interface
//!
//! Programs are WGSL with entry points `vs` and `fs`. Group 0 carries:
//!
//! | Binding      | Contents |
//! |--------------|----------|
//! | 0            | Uniform struct with every non-texture uniform, in declaration order |
//! | 1 + 2k       | The k-th texture uniform (`texture_2d<f32>` or `texture_cube<f32>`, unfilterable) |
//! | 2 + 2k       | Its non-filtering sampler |
//!
//! Struct members follow WGSL layout: `f32` aligns to 4, `vec3<f32>` to 16
//! (12 bytes), `mat4x4<f32>` to 16 (64 bytes). Consecutive declarations such
//! as `uShadowMatrices[0]`, `uShadowMatrices[1]` pack like a WGSL array.
//!
//! Vertex attributes are bound one buffer per stream, at the locations listed
//! in [`crate::geometry`].

use std::collections::HashMap;
use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{
    ClearOps, DrawCall, FramebufferId, GpuBackend, ProgramId, TextureDesc, TextureFormat, TextureId,
    TextureKind, UniformBinding, VertexArrayDesc, VertexArrayId,
};
use crate::error::BackendError;
use crate::geometry::{PrimitiveKind, VertexAttribute};
use crate::gpu::{DEPTH_FORMAT, GpuContext};
use crate::material::{BlendMode, CullFace, RenderState, UniformDecl, UniformKind};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Where a declared uniform lives in the program's bind group.
enum UniformSlot {
    Buffer { offset: usize },
    Texture { binding: u32 },
}

struct Program {
    label: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    slots: HashMap<String, UniformSlot>,
    uniform_size: usize,
    values: HashMap<String, UniformBinding>,
}

struct VertexArray {
    buffers: Vec<(VertexAttribute, wgpu::Buffer)>,
    index_buffer: Option<wgpu::Buffer>,
}

struct Texture {
    kind: TextureKind,
    format: TextureFormat,
    label: String,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

#[derive(Clone, Copy)]
struct Framebuffer {
    color: Option<TextureId>,
    depth: Option<TextureId>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    state: RenderState,
    color: Option<wgpu::TextureFormat>,
    depth: Option<wgpu::TextureFormat>,
    primitive: PrimitiveKind,
    attributes: Vec<VertexAttribute>,
}

struct QueuedDraw {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    vertex_array: VertexArrayId,
    call: DrawCall,
    viewport: (u32, u32),
}

#[derive(Default)]
struct PendingPass {
    clear: Option<ClearOps>,
    draws: Vec<QueuedDraw>,
}

impl PendingPass {
    fn is_empty(&self) -> bool {
        self.clear.is_none() && self.draws.is_empty()
    }
}

/// [`GpuBackend`] implementation driving a window surface through wgpu.
pub struct WgpuBackend {
    gpu: GpuContext,
    sampler: wgpu::Sampler,
    programs: Vec<Program>,
    vertex_arrays: Vec<VertexArray>,
    textures: Vec<Texture>,
    framebuffers: Vec<Framebuffer>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    frame: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
    target: Option<FramebufferId>,
    pass: PendingPass,
    current_program: Option<ProgramId>,
    state: RenderState,
    viewport: (u32, u32),
    last_error: Option<String>,
}

impl WgpuBackend {
    pub fn new(window: Arc<Window>) -> Result<Self, BackendError> {
        let gpu = GpuContext::new(window)?;
        Ok(Self::from_context(gpu))
    }

    pub fn from_context(gpu: GpuContext) -> Self {
        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Uniform Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let viewport = (gpu.width(), gpu.height());

        Self {
            gpu,
            sampler,
            programs: Vec::new(),
            vertex_arrays: Vec::new(),
            textures: Vec::new(),
            framebuffers: Vec::new(),
            pipelines: HashMap::new(),
            frame: None,
            target: None,
            pass: PendingPass::default(),
            current_program: None,
            state: RenderState::default(),
            viewport,
            last_error: None,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.gpu
    }

    fn fail(&mut self, err: BackendError) -> BackendError {
        log::error!("{err}");
        self.last_error = Some(err.to_string());
        err
    }

    fn compile_module(&self, label: &str, stage: &str, source: &str) -> Result<wgpu::ShaderModule, BackendError> {
        if source.trim().is_empty() {
            return Err(BackendError::ShaderCompile(format!("{stage} shader source is empty")));
        }
        self.gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let info = pollster::block_on(module.get_compilation_info());
        let scope_error = pollster::block_on(self.gpu.device.pop_error_scope());

        let diagnostics: Vec<String> = info
            .messages
            .iter()
            .filter(|m| m.message_type == wgpu::CompilationMessageType::Error)
            .map(|m| match &m.location {
                Some(loc) => format!("{}:{}: {}", loc.line_number, loc.line_position, m.message),
                None => m.message.clone(),
            })
            .collect();
        if !diagnostics.is_empty() {
            return Err(BackendError::ShaderCompile(format!(
                "{stage} shader: {}",
                diagnostics.join("; ")
            )));
        }
        if let Some(err) = scope_error {
            return Err(BackendError::ShaderCompile(format!("{stage} shader: {err}")));
        }
        Ok(module)
    }

    fn color_format(&self, texture: TextureId) -> wgpu::TextureFormat {
        match self.textures[texture.0 as usize].format {
            TextureFormat::Rgba8 => COLOR_FORMAT,
            TextureFormat::Depth32 => DEPTH_FORMAT,
        }
    }

    /// Color and depth formats of the bound target.
    fn target_formats(&self) -> (Option<wgpu::TextureFormat>, Option<wgpu::TextureFormat>) {
        match self.target {
            None => (Some(self.gpu.config.format), Some(DEPTH_FORMAT)),
            Some(fb) => {
                let fb = self.framebuffers[fb.0 as usize];
                (
                    fb.color.map(|t| self.color_format(t)),
                    fb.depth.map(|_| DEPTH_FORMAT),
                )
            }
        }
    }

    fn pipeline(&mut self, key: PipelineKey) -> wgpu::RenderPipeline {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return pipeline.clone();
        }
        let pipeline = self.build_pipeline(&key);
        log::debug!(
            "built pipeline for '{}' ({} cached)",
            self.programs[key.program.0 as usize].label,
            self.pipelines.len() + 1
        );
        self.pipelines.insert(key, pipeline.clone());
        pipeline
    }

    fn build_pipeline(&self, key: &PipelineKey) -> wgpu::RenderPipeline {
        let program = &self.programs[key.program.0 as usize];

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
            .attributes
            .iter()
            .map(|a| {
                [wgpu::VertexAttribute {
                    format: match a.components() {
                        2 => wgpu::VertexFormat::Float32x2,
                        3 => wgpu::VertexFormat::Float32x3,
                        _ => wgpu::VertexFormat::Float32x4,
                    },
                    offset: 0,
                    shader_location: a.location(),
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = key
            .attributes
            .iter()
            .zip(&attributes)
            .map(|(a, attrs)| wgpu::VertexBufferLayout {
                array_stride: (a.components() * std::mem::size_of::<f32>()) as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        let blend = match key.state.blend {
            BlendMode::None => wgpu::BlendState::REPLACE,
            BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
            BlendMode::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
            BlendMode::Multiply => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::Dst,
                    dst_factor: wgpu::BlendFactor::Zero,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent::OVER,
            },
        };
        let color_targets = key.color.map(|format| {
            [Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })]
        });

        let topology = match key.primitive {
            PrimitiveKind::Triangles => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveKind::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
            PrimitiveKind::Lines => wgpu::PrimitiveTopology::LineList,
            PrimitiveKind::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            PrimitiveKind::Points => wgpu::PrimitiveTopology::PointList,
        };
        let strip_index_format = match key.primitive {
            PrimitiveKind::TriangleStrip | PrimitiveKind::LineStrip => Some(wgpu::IndexFormat::Uint32),
            _ => None,
        };
        let cull_mode = match key.state.cull_face {
            CullFace::Front => Some(wgpu::Face::Front),
            CullFace::Back => Some(wgpu::Face::Back),
            CullFace::None | CullFace::FrontAndBack => None,
        };

        self.gpu
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&program.label),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: Some("vs"),
                    buffers: &buffers,
                    compilation_options: Default::default(),
                },
                fragment: color_targets.as_ref().map(|targets| wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: Some("fs"),
                    targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode,
                    ..Default::default()
                },
                depth_stencil: key.depth.map(|format| wgpu::DepthStencilState {
                    format,
                    depth_write_enabled: key.state.depth_write,
                    depth_compare: if key.state.depth_test {
                        wgpu::CompareFunction::Less
                    } else {
                        wgpu::CompareFunction::Always
                    },
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
    }

    /// Snapshots the current program's uniforms into a bind group.
    fn uniform_bind_group(&self, program_id: ProgramId) -> Result<wgpu::BindGroup, BackendError> {
        let program = &self.programs[program_id.0 as usize];
        let mut bytes = vec![0u8; program.uniform_size];
        let mut texture_views = Vec::new();

        for (name, slot) in &program.slots {
            let Some(value) = program.values.get(name) else {
                continue;
            };
            match (slot, value) {
                (UniformSlot::Buffer { offset }, UniformBinding::Float(v)) => {
                    bytes[*offset..*offset + 4].copy_from_slice(bytemuck::bytes_of(v));
                }
                (UniformSlot::Buffer { offset }, UniformBinding::Vector3(v)) => {
                    bytes[*offset..*offset + 12].copy_from_slice(bytemuck::cast_slice(&v.to_array()));
                }
                (UniformSlot::Buffer { offset }, UniformBinding::Matrix4(m)) => {
                    bytes[*offset..*offset + 64].copy_from_slice(bytemuck::cast_slice(&m.to_cols_array()));
                }
                (
                    UniformSlot::Texture { binding },
                    UniformBinding::Texture2D(t) | UniformBinding::CubeMap(t),
                ) => {
                    let texture = self
                        .textures
                        .get(t.0 as usize)
                        .ok_or(BackendError::UnknownTexture(t.0))?;
                    texture_views.push((*binding, &texture.view));
                }
                _ => {}
            }
        }

        // Unset texture slots would leave holes in the bind group.
        let expected = program
            .slots
            .values()
            .filter(|s| matches!(s, UniformSlot::Texture { .. }))
            .count();
        if texture_views.len() != expected {
            return Err(BackendError::Other(format!(
                "program '{}' has unbound texture uniforms",
                program.label
            )));
        }

        let buffer = self
            .gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Uniform Snapshot"),
                contents: &bytes,
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }];
        for (binding, view) in &texture_views {
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: binding + 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }

        Ok(self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.label),
            layout: &program.bind_group_layout,
            entries: &entries,
        }))
    }

    /// Views of the bound target as `(color, depth)`.
    fn target_views(&self) -> Result<(Option<wgpu::TextureView>, Option<wgpu::TextureView>), BackendError> {
        match self.target {
            None => {
                let (_, view) = self
                    .frame
                    .as_ref()
                    .ok_or_else(|| BackendError::Surface("no frame in progress".into()))?;
                Ok((Some(view.clone()), Some(self.gpu.depth_view.clone())))
            }
            Some(fb) => {
                let fb = self.framebuffers[fb.0 as usize];
                let view = |t: TextureId| self.textures[t.0 as usize].view.clone();
                Ok((fb.color.map(view), fb.depth.map(view)))
            }
        }
    }

    /// Submits the queued pass for the bound target.
    fn flush(&mut self) -> Result<(), BackendError> {
        if self.pass.is_empty() {
            return Ok(());
        }
        let pass = std::mem::take(&mut self.pass);
        let (color_view, depth_view) = self.target_views()?;
        let clear = pass.clear.unwrap_or(ClearOps {
            color: None,
            depth: None,
        });

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Pass Encoder"),
            });
        {
            let color_attachments = [color_view.as_ref().map(|view| wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: match clear.color {
                        Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })];
            let color_attachments: &[Option<wgpu::RenderPassColorAttachment>] = if color_view.is_some() {
                &color_attachments
            } else {
                &[]
            };

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Umbra Pass"),
                color_attachments,
                depth_stencil_attachment: depth_view.as_ref().map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: match clear.depth {
                                Some(d) => wgpu::LoadOp::Clear(d),
                                None => wgpu::LoadOp::Load,
                            },
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &pass.draws {
                let va = &self.vertex_arrays[draw.vertex_array.0 as usize];
                render_pass.set_pipeline(&draw.pipeline);
                render_pass.set_bind_group(0, &draw.bind_group, &[]);
                render_pass.set_viewport(
                    0.0,
                    0.0,
                    draw.viewport.0 as f32,
                    draw.viewport.1 as f32,
                    0.0,
                    1.0,
                );
                for (slot, (_, buffer)) in va.buffers.iter().enumerate() {
                    render_pass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
                match (&va.index_buffer, draw.call.indexed) {
                    (Some(indices), true) => {
                        render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                        render_pass.draw_indexed(0..draw.call.count, 0, 0..1);
                    }
                    _ => render_pass.draw(0..draw.call.count, 0..1),
                }
            }
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Size of the bound target, used to clamp the viewport.
    fn target_size(&self) -> (u32, u32) {
        match self.target {
            None => (self.gpu.width(), self.gpu.height()),
            Some(fb) => {
                let fb = self.framebuffers[fb.0 as usize];
                fb.color
                    .or(fb.depth)
                    .map(|t| {
                        let size = self.textures[t.0 as usize].texture.size();
                        (size.width, size.height)
                    })
                    .unwrap_or((1, 1))
            }
        }
    }
}

impl GpuBackend for WgpuBackend {
    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
        uniforms: &[UniformDecl],
    ) -> Result<ProgramId, BackendError> {
        let label = format!("Program {}", self.programs.len());
        let vertex = self
            .compile_module(&label, "vertex", vertex_source)
            .map_err(|e| self.fail(e))?;
        let fragment = self
            .compile_module(&label, "fragment", fragment_source)
            .map_err(|e| self.fail(e))?;

        let mut slots = HashMap::new();
        let mut offset = 0usize;
        let mut layout_entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        let mut next_binding = 1u32;

        for decl in uniforms {
            let slot = match decl.kind {
                UniformKind::Float => {
                    let slot = UniformSlot::Buffer { offset };
                    offset += 4;
                    slot
                }
                UniformKind::Vector3 | UniformKind::Matrix4 => {
                    offset = offset.next_multiple_of(16);
                    let slot = UniformSlot::Buffer { offset };
                    offset += if decl.kind == UniformKind::Vector3 { 12 } else { 64 };
                    slot
                }
                UniformKind::Texture2D | UniformKind::CubeMap => {
                    let binding = next_binding;
                    next_binding += 2;
                    layout_entries.push(wgpu::BindGroupLayoutEntry {
                        binding,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: if decl.kind == UniformKind::CubeMap {
                                wgpu::TextureViewDimension::Cube
                            } else {
                                wgpu::TextureViewDimension::D2
                            },
                            multisampled: false,
                        },
                        count: None,
                    });
                    layout_entries.push(wgpu::BindGroupLayoutEntry {
                        binding: binding + 1,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                        count: None,
                    });
                    UniformSlot::Texture { binding }
                }
            };
            slots.insert(decl.name.clone(), slot);
        }
        let uniform_size = offset.next_multiple_of(16).max(16);

        let device = &self.gpu.device;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&label),
            entries: &layout_entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let program = ProgramId(self.programs.len() as u32);
        self.programs.push(Program {
            label,
            vertex,
            fragment,
            bind_group_layout,
            pipeline_layout,
            slots,
            uniform_size,
            values: HashMap::new(),
        });
        Ok(program)
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> Result<VertexArrayId, BackendError> {
        let device = &self.gpu.device;
        let buffers = desc
            .attributes
            .iter()
            .map(|a| {
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(a.attribute.name()),
                    contents: bytemuck::cast_slice(a.data),
                    usage: wgpu::BufferUsages::VERTEX,
                });
                (a.attribute, buffer)
            })
            .collect();
        let index_buffer = desc.indices.map(|indices| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });

        let id = VertexArrayId(self.vertex_arrays.len() as u32);
        self.vertex_arrays.push(VertexArray {
            buffers,
            index_buffer,
        });
        Ok(id)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, BackendError> {
        let (texture, view) = allocate_texture(&self.gpu, desc.label, desc.kind, desc.format, desc.width, desc.height, desc.data);
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(Texture {
            kind: desc.kind,
            format: desc.format,
            label: desc.label.to_string(),
            texture,
            view,
        });
        Ok(id)
    }

    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) -> Result<(), BackendError> {
        let Some(record) = self.textures.get(texture.0 as usize) else {
            return Err(self.fail(BackendError::UnknownTexture(texture.0)));
        };
        let (new_texture, view) = allocate_texture(&self.gpu, &record.label, record.kind, record.format, width, height, None);
        let record = &mut self.textures[texture.0 as usize];
        record.texture = new_texture;
        record.view = view;
        Ok(())
    }

    fn create_framebuffer(
        &mut self,
        color: Option<TextureId>,
        depth: Option<TextureId>,
    ) -> Result<FramebufferId, BackendError> {
        for texture in color.iter().chain(depth.iter()) {
            if texture.0 as usize >= self.textures.len() {
                return Err(self.fail(BackendError::UnknownTexture(texture.0)));
            }
        }
        let id = FramebufferId(self.framebuffers.len() as u32);
        self.framebuffers.push(Framebuffer { color, depth });
        Ok(id)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<(), BackendError> {
        if let Some(fb) = framebuffer {
            if fb.0 as usize >= self.framebuffers.len() {
                return Err(self.fail(BackendError::UnknownFramebuffer(fb.0)));
            }
        }
        self.flush()?;
        self.target = framebuffer;
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn clear(&mut self, ops: ClearOps) -> Result<(), BackendError> {
        if !self.pass.draws.is_empty() {
            self.flush()?;
        }
        let pending = self.pass.clear.get_or_insert(ClearOps {
            color: None,
            depth: None,
        });
        pending.color = ops.color.or(pending.color);
        pending.depth = ops.depth.or(pending.depth);
        Ok(())
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), BackendError> {
        if program.0 as usize >= self.programs.len() {
            return Err(self.fail(BackendError::UnknownProgram(program.0)));
        }
        self.current_program = Some(program);
        Ok(())
    }

    fn set_render_state(&mut self, state: RenderState) {
        self.state = state;
    }

    fn set_uniform(&mut self, name: &str, value: UniformBinding) -> Result<(), BackendError> {
        let Some(program) = self.current_program else {
            return Err(self.fail(BackendError::NoProgram));
        };
        let program = &mut self.programs[program.0 as usize];
        if program.slots.contains_key(name) {
            program.values.insert(name.to_string(), value);
        }
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), BackendError> {
        let Some(program) = self.current_program else {
            return Err(self.fail(BackendError::NoProgram));
        };
        let Some(va) = self.vertex_arrays.get(call.vertex_array.0 as usize) else {
            return Err(self.fail(BackendError::UnknownVertexArray(call.vertex_array.0)));
        };
        if self.state.cull_face == CullFace::FrontAndBack || call.count == 0 {
            return Ok(());
        }

        let attributes = va.buffers.iter().map(|(a, _)| *a).collect();
        let (color, depth) = self.target_formats();
        let pipeline = self.pipeline(PipelineKey {
            program,
            state: self.state,
            color,
            depth,
            primitive: call.primitive,
            attributes,
        });
        let bind_group = self.uniform_bind_group(program).map_err(|e| self.fail(e))?;

        let (tw, th) = self.target_size();
        let viewport = (self.viewport.0.clamp(1, tw), self.viewport.1.clamp(1, th));
        self.pass.draws.push(QueuedDraw {
            pipeline,
            bind_group,
            vertex_array: call.vertex_array,
            call: *call,
            viewport,
        });
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.gpu.width(), self.gpu.height())
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        let frame = match self.gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost, reconfiguring");
                self.gpu.surface.configure(&self.gpu.device, &self.gpu.config);
                self.gpu
                    .surface
                    .get_current_texture()
                    .map_err(|e| self.fail(BackendError::Surface(e.to_string())))?
            }
            Err(e) => return Err(self.fail(BackendError::Surface(e.to_string()))),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some((frame, view));
        self.target = None;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        let flushed = self.flush();
        if let Some((frame, _)) = self.frame.take() {
            frame.present();
        }
        flushed.map_err(|e| self.fail(e))
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

fn allocate_texture(
    gpu: &GpuContext,
    label: &str,
    kind: TextureKind,
    format: TextureFormat,
    width: u32,
    height: u32,
    data: Option<&[u8]>,
) -> (wgpu::Texture, wgpu::TextureView) {
    let layers = if kind == TextureKind::Cube { 6 } else { 1 };
    let desc = wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: layers,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: match format {
            TextureFormat::Rgba8 => COLOR_FORMAT,
            TextureFormat::Depth32 => DEPTH_FORMAT,
        },
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    };
    let texture = match (format, data) {
        (TextureFormat::Rgba8, Some(data)) => gpu.device.create_texture_with_data(
            &gpu.queue,
            &desc,
            wgpu::util::TextureDataOrder::LayerMajor,
            data,
        ),
        _ => gpu.device.create_texture(&desc),
    };
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        dimension: Some(if kind == TextureKind::Cube {
            wgpu::TextureViewDimension::Cube
        } else {
            wgpu::TextureViewDimension::D2
        }),
        ..Default::default()
    });
    log::debug!("allocated texture '{label}' {width}x{height}");
    (texture, view)
}
