//! [`Renderer`] backed by wgpu.
//!
//! Target storage is allocated lazily and keyed by [`TargetId`]: the first draw
//! into (or sample from) a target at a new size or format recreates its
//! textures. Pipelines are built on demand for each combination of program,
//! color format, blending, write masks, and stencil test, and cached.
//!
//! Every draw is recorded into its own command encoder and submitted
//! immediately, so draws execute in call order.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use glam::Mat4;
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{
    Blending, ClearBuffers, CompareFunction, FullscreenDraw, RenderState, Renderer, SceneMaterial,
    StencilOp, StencilState,
};
use crate::camera::CameraView;
use crate::config::RendererConfig;
use crate::error::GpuError;
use crate::gpu::GpuContext;
use crate::render_target::{FilterMode, RenderTarget, TargetFormat, TargetId};
use crate::scene::{Drawable, Scene, Vertex};
use crate::shader::{FULLSCREEN_PRELUDE, SCENE_SHADER, ShaderProgram};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Maps OpenGL clip-space depth (-1..1) onto wgpu's (0..1).
#[rustfmt::skip]
const OPENGL_TO_WGPU: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
]);

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ModelUniform {
    model: [[f32; 4]; 4],
    color: [f32; 4],
}

/// A texture and its default view.
struct Attachment {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl Attachment {
    fn new(
        device: &wgpu::Device,
        label: &str,
        (width, height): (u32, u32),
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// GPU storage behind a [`RenderTarget`].
struct GpuTarget {
    size: (u32, u32),
    format: wgpu::TextureFormat,
    filter: FilterMode,
    color: Attachment,
    depth_stencil: Option<Attachment>,
}

impl GpuTarget {
    fn new(
        device: &wgpu::Device,
        label: &str,
        size: (u32, u32),
        format: wgpu::TextureFormat,
        depth_stencil: bool,
        filter: FilterMode,
    ) -> Self {
        let color = Attachment::new(
            device,
            label,
            size,
            format,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
        );
        let depth_stencil = depth_stencil.then(|| {
            Attachment::new(
                device,
                &format!("{label} Depth/Stencil"),
                size,
                DEPTH_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            )
        });
        Self {
            size,
            format,
            filter,
            color,
            depth_stencil,
        }
    }

    fn matches(&self, target: &RenderTarget) -> bool {
        let options = target.options();
        self.size == target.size()
            && self.format == color_format(options.format)
            && self.filter == options.mag_filter
            && self.depth_stencil.is_some() == options.depth_stencil
    }

    fn destination(&self) -> Destination<'_> {
        Destination {
            color: &self.color.view,
            depth_stencil: self.depth_stencil.as_ref().map(|a| &a.view),
            format: self.format,
        }
    }
}

/// Attachments a single draw renders into.
struct Destination<'a> {
    color: &'a wgpu::TextureView,
    depth_stencil: Option<&'a wgpu::TextureView>,
    format: wgpu::TextureFormat,
}

/// Shader module and layouts shared by every pipeline of one fullscreen program.
struct FullscreenProgram {
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

impl FullscreenProgram {
    fn new(device: &wgpu::Device, program: &ShaderProgram) -> Self {
        let source = format!("{FULLSCREEN_PRELUDE}\n{}", program.source());
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.name()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let mut entries = vec![
            // Uniform block
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            // Sampler
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        entries.extend((0..program.textures().len()).map(|i| wgpu::BindGroupLayoutEntry {
            binding: 2 + i as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(program.name()),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(program.name()),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            module,
            bind_group_layout,
            pipeline_layout,
        }
    }
}

/// Resources shared by every scene pipeline.
struct ScenePrograms {
    module: wgpu::ShaderModule,
    camera_layout: wgpu::BindGroupLayout,
    model_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

impl ScenePrograms {
    fn new(device: &wgpu::Device) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(SCENE_SHADER.into()),
        });
        let uniform_layout = |label: &str| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            })
        };
        let camera_layout = uniform_layout("Scene Camera Layout");
        let model_layout = uniform_layout("Scene Model Layout");
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&camera_layout, &model_layout],
            push_constant_ranges: &[],
        });
        Self {
            module,
            camera_layout,
            model_layout,
            pipeline_layout,
        }
    }
}

/// Buffers for one drawable of a scene draw.
struct MeshDraw {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
    bind_group: wgpu::BindGroup,
}

impl MeshDraw {
    fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        world: Mat4,
        drawable: &Drawable,
    ) -> Self {
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&drawable.mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: bytemuck::cast_slice(&drawable.mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let model = ModelUniform {
            model: world.to_cols_array_2d(),
            color: drawable.color.to_array(),
        };
        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Model Uniforms"),
            contents: bytemuck::cast_slice(&[model]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&drawable.name),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        });
        Self {
            vertices,
            indices,
            index_count: drawable.mesh.indices.len() as u32,
            bind_group,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum PipelineProgram {
    Fullscreen(&'static str),
    Scene(SceneMaterial),
}

/// Everything a cached pipeline depends on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: PipelineProgram,
    format: wgpu::TextureFormat,
    depth_stencil: bool,
    blending: Blending,
    color_write: bool,
    depth_write: bool,
    /// Stencil state with the reference zeroed; the reference is dynamic.
    stencil: StencilState,
}

struct PipelineSource<'a> {
    label: &'a str,
    module: &'a wgpu::ShaderModule,
    layout: &'a wgpu::PipelineLayout,
    fragment_entry: &'a str,
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
    depth_compare: wgpu::CompareFunction,
}

/// Draws passes and scenes with wgpu, into a window surface or headless.
///
/// Call [`present`](Self::present) once per frame after the composer has
/// rendered; the surface texture is acquired by the first draw to the display.
pub struct WgpuRenderer {
    gpu: GpuContext,
    state: RenderState,
    targets: HashMap<TargetId, GpuTarget>,
    /// Display of a headless context.
    offscreen: Option<GpuTarget>,
    frame: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
    screen_depth: Option<((u32, u32), Attachment)>,
    programs: HashMap<&'static str, FullscreenProgram>,
    scene: ScenePrograms,
    pipelines: HashMap<PipelineKey, Rc<wgpu::RenderPipeline>>,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    /// Bound to texture slots a draw leaves empty.
    fallback: Attachment,
}

impl WgpuRenderer {
    /// Creates a renderer presenting to `window`.
    pub fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self, GpuError> {
        Ok(Self::from_context(GpuContext::new(window, config)?))
    }

    /// Creates a renderer whose display is an off-screen texture.
    pub fn headless(config: &RendererConfig) -> Result<Self, GpuError> {
        Ok(Self::from_context(GpuContext::headless(config)?))
    }

    pub fn from_context(gpu: GpuContext) -> Self {
        let device = &gpu.device;
        let sampler = |label: &str, filter: wgpu::FilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let linear_sampler = sampler("Linear Sampler", wgpu::FilterMode::Linear);
        let nearest_sampler = sampler("Nearest Sampler", wgpu::FilterMode::Nearest);
        let fallback = Attachment::new(
            device,
            "Fallback Texture",
            (1, 1),
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let scene = ScenePrograms::new(device);

        Self {
            gpu,
            state: RenderState::default(),
            targets: HashMap::new(),
            offscreen: None,
            frame: None,
            screen_depth: None,
            programs: HashMap::new(),
            scene,
            pipelines: HashMap::new(),
            linear_sampler,
            nearest_sampler,
            fallback,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Resizes the display. Render targets keep their own sizes.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.frame = None;
        self.gpu.resize(width, height);
    }

    /// Presents the current surface texture, if one was drawn to this frame.
    pub fn present(&mut self) {
        if let Some((frame, view)) = self.frame.take() {
            drop(view);
            frame.present();
        }
    }

    /// Number of render targets with live GPU storage.
    pub fn allocated_targets(&self) -> usize {
        self.targets.len()
    }

    fn ensure_target(&mut self, target: &RenderTarget) {
        let stale = self
            .targets
            .get(&target.id())
            .is_none_or(|gpu| !gpu.matches(target));
        if stale {
            let (width, height) = target.size();
            log::debug!("allocating {} ({width}x{height})", target.label());
            let options = target.options();
            let storage = GpuTarget::new(
                &self.gpu.device,
                target.label(),
                target.size(),
                color_format(options.format),
                options.depth_stencil,
                options.mag_filter,
            );
            self.targets.insert(target.id(), storage);
        }
    }

    fn ensure_display(&mut self) -> bool {
        let size = (self.gpu.width(), self.gpu.height());
        if self.gpu.is_headless() {
            if self.offscreen.as_ref().is_none_or(|display| display.size != size) {
                self.offscreen = Some(GpuTarget::new(
                    &self.gpu.device,
                    "Headless Display",
                    size,
                    self.gpu.format(),
                    true,
                    FilterMode::Linear,
                ));
            }
            return true;
        }

        if self.frame.is_none() && !self.acquire_frame() {
            return false;
        }
        if self.screen_depth.as_ref().is_none_or(|(s, _)| *s != size) {
            let depth = Attachment::new(
                &self.gpu.device,
                "Display Depth/Stencil",
                size,
                DEPTH_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            );
            self.screen_depth = Some((size, depth));
        }
        true
    }

    fn acquire_frame(&mut self) -> bool {
        let Some(surface) = &self.gpu.surface else {
            return false;
        };
        match surface.get_current_texture() {
            Ok(frame) => {
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                self.frame = Some((frame, view));
                true
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost, reconfiguring");
                self.gpu.reconfigure();
                false
            }
            Err(err) => {
                log::error!("failed to acquire surface texture: {err}");
                false
            }
        }
    }

    /// Allocates whatever `target` needs; false when the display is unavailable.
    fn prepare(&mut self, target: Option<&RenderTarget>) -> bool {
        match target {
            Some(target) => {
                self.ensure_target(target);
                true
            }
            None => self.ensure_display(),
        }
    }

    fn destination(&self, target: Option<&RenderTarget>) -> Option<Destination<'_>> {
        match target {
            Some(target) => self.targets.get(&target.id()).map(GpuTarget::destination),
            None if self.gpu.is_headless() => self.offscreen.as_ref().map(GpuTarget::destination),
            None => {
                let (_, view) = self.frame.as_ref()?;
                Some(Destination {
                    color: view,
                    depth_stencil: self.screen_depth.as_ref().map(|(_, depth)| &depth.view),
                    format: self.gpu.format(),
                })
            }
        }
    }

    fn display_texture(&self) -> Option<&wgpu::Texture> {
        if self.gpu.is_headless() {
            self.offscreen.as_ref().map(|display| &display.color.texture)
        } else {
            self.frame.as_ref().map(|(frame, _)| &frame.texture)
        }
    }

    fn pipeline_key(
        &self,
        program: PipelineProgram,
        destination: &Destination<'_>,
        blending: Blending,
        color_write: bool,
        depth_write: bool,
    ) -> PipelineKey {
        let depth_stencil = destination.depth_stencil.is_some();
        let stencil = if depth_stencil && self.state.stencil.enabled {
            StencilState {
                reference: 0,
                ..self.state.stencil
            }
        } else {
            StencilState::default()
        };
        PipelineKey {
            program,
            format: destination.format,
            depth_stencil,
            blending,
            color_write,
            depth_write: depth_stencil && depth_write,
            stencil,
        }
    }

    fn fullscreen_pipeline(
        &mut self,
        program: &'static ShaderProgram,
        key: PipelineKey,
    ) -> Rc<wgpu::RenderPipeline> {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Rc::clone(pipeline);
        }
        let device = &self.gpu.device;
        let resources = self
            .programs
            .entry(program.name())
            .or_insert_with(|| FullscreenProgram::new(device, program));
        let pipeline = Rc::new(build_pipeline(
            device,
            &PipelineSource {
                label: program.name(),
                module: &resources.module,
                layout: &resources.pipeline_layout,
                fragment_entry: "fs",
                buffers: &[],
                depth_compare: wgpu::CompareFunction::Always,
            },
            &key,
        ));
        log::debug!("built pipeline {key:?}");
        self.pipelines.insert(key, Rc::clone(&pipeline));
        pipeline
    }

    fn scene_pipeline(
        &mut self,
        material: SceneMaterial,
        key: PipelineKey,
    ) -> Rc<wgpu::RenderPipeline> {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Rc::clone(pipeline);
        }
        let fragment_entry = match material {
            SceneMaterial::Depth => "fs_depth",
            SceneMaterial::Standard | SceneMaterial::StencilOnly => "fs_standard",
        };
        let pipeline = Rc::new(build_pipeline(
            &self.gpu.device,
            &PipelineSource {
                label: "Scene Pipeline",
                module: &self.scene.module,
                layout: &self.scene.pipeline_layout,
                fragment_entry,
                buffers: &[Vertex::LAYOUT],
                depth_compare: wgpu::CompareFunction::LessEqual,
            },
            &key,
        ));
        log::debug!("built pipeline {key:?}");
        self.pipelines.insert(key, Rc::clone(&pipeline));
        pipeline
    }

    /// Attachments a draw requested with `clear` actually clears.
    fn draw_clears(&self, clear: bool) -> ClearBuffers {
        if self.state.clears(clear) {
            self.masked_clears(ClearBuffers::ALL)
        } else {
            ClearBuffers::NONE
        }
    }

    /// Clears honor the color and depth write masks.
    fn masked_clears(&self, buffers: ClearBuffers) -> ClearBuffers {
        ClearBuffers {
            color: buffers.color && self.state.color_write,
            depth: buffers.depth && self.state.depth_write,
            stencil: buffers.stencil,
        }
    }

    /// Records one render pass into `destination` and submits it.
    fn encode(
        &self,
        label: &str,
        destination: &Destination<'_>,
        clears: ClearBuffers,
        record: impl FnOnce(&mut wgpu::RenderPass<'_>),
    ) {
        let color = self.state.clear_color;
        let color_load = if clears.color {
            wgpu::LoadOp::Clear(wgpu::Color {
                r: color.x as f64,
                g: color.y as f64,
                b: color.z as f64,
                a: self.state.clear_alpha as f64,
            })
        } else {
            wgpu::LoadOp::Load
        };
        let depth_stencil_attachment =
            destination
                .depth_stencil
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: if clears.depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: if clears.stencil {
                            wgpu::LoadOp::Clear(self.state.clear_stencil)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                });

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(label),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: destination.color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if destination.depth_stencil.is_some() {
                pass.set_stencil_reference(self.state.stencil.reference);
            }
            record(&mut pass);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl Renderer for WgpuRenderer {
    fn size(&self) -> (u32, u32) {
        (self.gpu.width(), self.gpu.height())
    }

    fn state(&self) -> &RenderState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RenderState {
        &mut self.state
    }

    fn render_scene(
        &mut self,
        scene: &Scene,
        camera: &CameraView,
        target: Option<&RenderTarget>,
        clear: bool,
        material: SceneMaterial,
    ) {
        if !self.prepare(target) {
            return;
        }
        let Some(key) = self.destination(target).map(|destination| {
            let color_write = self.state.color_write && material != SceneMaterial::StencilOnly;
            self.pipeline_key(
                PipelineProgram::Scene(material),
                &destination,
                Blending::Replace,
                color_write,
                self.state.depth_write,
            )
        }) else {
            return;
        };
        let pipeline = self.scene_pipeline(material, key);

        let device = &self.gpu.device;
        let camera_uniform = CameraUniform {
            view_proj: (OPENGL_TO_WGPU * camera.view_projection()).to_cols_array_2d(),
        };
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Camera Uniforms"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let camera_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Camera Bind Group"),
            layout: &self.scene.camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });
        let meshes: Vec<MeshDraw> = scene
            .visible()
            .into_iter()
            .filter(|(_, drawable)| !drawable.mesh.is_empty())
            .map(|(world, drawable)| MeshDraw::new(device, &self.scene.model_layout, world, drawable))
            .collect();

        let Some(destination) = self.destination(target) else {
            return;
        };
        self.encode(&scene.name, &destination, self.draw_clears(clear), |pass| {
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &camera_group, &[]);
            for mesh in &meshes {
                pass.set_bind_group(1, &mesh.bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        });
    }

    fn draw_fullscreen(
        &mut self,
        draw: &FullscreenDraw<'_>,
        target: Option<&RenderTarget>,
        clear: bool,
    ) {
        let program = draw.program;
        if let Some(target) =
            target.filter(|target| draw.textures.iter().any(|t| t.target.id() == target.id()))
        {
            log::warn!(
                "{}: {} is both sampled and drawn to, skipping",
                program.name(),
                target.label()
            );
            return;
        }
        for binding in draw.textures {
            self.ensure_target(binding.target);
        }
        if !self.prepare(target) {
            return;
        }
        let Some(key) = self.destination(target).map(|destination| {
            self.pipeline_key(
                PipelineProgram::Fullscreen(program.name()),
                &destination,
                draw.blending,
                self.state.color_write,
                false,
            )
        }) else {
            return;
        };
        let pipeline = self.fullscreen_pipeline(program, key);
        let Some(resources) = self.programs.get(program.name()) else {
            return;
        };

        let device = &self.gpu.device;
        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fullscreen Uniforms"),
            contents: bytemuck::cast_slice(&program.pack(draw.uniforms)),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let sampler = match draw.textures.first().map(|t| t.target.options().mag_filter) {
            Some(FilterMode::Nearest) => &self.nearest_sampler,
            _ => &self.linear_sampler,
        };
        let views: Vec<&wgpu::TextureView> = program
            .textures()
            .iter()
            .map(|slot| {
                draw.texture(slot)
                    .and_then(|target| self.targets.get(&target.id()))
                    .map_or(&self.fallback.view, |storage| &storage.color.view)
            })
            .collect();

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ];
        entries.extend(views.iter().enumerate().map(|(i, view)| wgpu::BindGroupEntry {
            binding: 2 + i as u32,
            resource: wgpu::BindingResource::TextureView(view),
        }));
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.name()),
            layout: &resources.bind_group_layout,
            entries: &entries,
        });

        let Some(destination) = self.destination(target) else {
            return;
        };
        self.encode(program.name(), &destination, self.draw_clears(clear), |pass| {
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        });
    }

    fn clear_target(&mut self, target: Option<&RenderTarget>, buffers: ClearBuffers) {
        if !self.prepare(target) {
            return;
        }
        let clears = self.masked_clears(buffers);
        if !clears.any() {
            return;
        }
        let Some(destination) = self.destination(target) else {
            return;
        };
        self.encode("Clear", &destination, clears, |_| {});
    }

    fn copy_framebuffer_to_texture(&mut self, (x, y): (u32, u32), target: &RenderTarget) {
        self.ensure_target(target);
        if !self.ensure_display() {
            return;
        }
        if !self.gpu.config.usage.contains(wgpu::TextureUsages::COPY_SRC) {
            log::warn!("display cannot be copied from on this surface");
            return;
        }
        let (Some(source), Some(storage)) =
            (self.display_texture(), self.targets.get(&target.id()))
        else {
            return;
        };
        if source.format().remove_srgb_suffix() != storage.format.remove_srgb_suffix() {
            log::warn!(
                "cannot copy {:?} display into {} ({:?})",
                source.format(),
                target.label(),
                storage.format
            );
            return;
        }

        let width = target.width().min(self.gpu.width().saturating_sub(x));
        let height = target.height().min(self.gpu.height().saturating_sub(y));
        if width == 0 || height == 0 {
            return;
        }

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Framebuffer Copy"),
            });
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: source,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &storage.color.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    fn release_target(&mut self, id: TargetId) {
        if let Some(storage) = self.targets.remove(&id) {
            log::debug!("released target {} ({}x{})", id.get(), storage.size.0, storage.size.1);
            storage.color.texture.destroy();
            if let Some(depth) = storage.depth_stencil {
                depth.texture.destroy();
            }
        }
    }
}

fn color_format(format: TargetFormat) -> wgpu::TextureFormat {
    match format {
        TargetFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    source: &PipelineSource<'_>,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let write_mask = if key.color_write {
        wgpu::ColorWrites::ALL
    } else {
        wgpu::ColorWrites::empty()
    };
    let depth_stencil = key.depth_stencil.then(|| wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: key.depth_write,
        depth_compare: source.depth_compare,
        stencil: stencil_state(&key.stencil),
        bias: wgpu::DepthBiasState::default(),
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(source.label),
        layout: Some(source.layout),
        vertex: wgpu::VertexState {
            module: source.module,
            entry_point: Some("vs"),
            buffers: source.buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: source.module,
            entry_point: Some(source.fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.format,
                blend: Some(blend_state(key.blending)),
                write_mask,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn blend_state(blending: Blending) -> wgpu::BlendState {
    match blending {
        Blending::Replace => wgpu::BlendState::REPLACE,
        Blending::Additive => wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        },
    }
}

fn stencil_state(stencil: &StencilState) -> wgpu::StencilState {
    if !stencil.enabled {
        return wgpu::StencilState::default();
    }
    let face = wgpu::StencilFaceState {
        compare: compare_function(stencil.func),
        fail_op: stencil_operation(stencil.fail),
        depth_fail_op: stencil_operation(stencil.depth_fail),
        pass_op: stencil_operation(stencil.pass),
    };
    wgpu::StencilState {
        front: face,
        back: face,
        read_mask: stencil.read_mask,
        write_mask: stencil.write_mask,
    }
}

fn compare_function(func: CompareFunction) -> wgpu::CompareFunction {
    match func {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::Increment => wgpu::StencilOperation::IncrementClamp,
        StencilOp::Decrement => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
    }
}
