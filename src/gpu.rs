// gpu.rs — wgpu renderer: textured unwarp sphere plus egui instructions overlay

use crate::error::RenderError;
use crate::render::{PlatformCapabilities, Renderer, VideoFrame, VideoSource};
use glam::{Mat4, Vec3};
use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::window::Window;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
}

#[derive(Debug, Clone, Copy)]
struct Camera {
    position: Vec3,
    target: Vec3,
    fov_deg: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl Camera {
    /// `None` while position and target coincide (no view direction).
    fn view_proj(&self) -> Option<Mat4> {
        if (self.target - self.position).length_squared() < 1e-8 {
            return None;
        }
        let view = Mat4::look_at_rh(self.position, self.target, Vec3::Y);
        let proj = Mat4::perspective_rh(
            self.fov_deg.clamp(1.0, 179.0).to_radians(),
            self.aspect.max(1e-3),
            self.near,
            self.far,
        );
        Some(proj * view)
    }
}

/// Surface and adapter found at startup.
pub struct GpuContext {
    surface: wgpu::Surface,
    adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Looks for a GPU able to present to `window`. Returns the capabilities
    /// either way; the context only when one was found.
    pub async fn probe(window: &Window) -> (PlatformCapabilities, Option<Self>) {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = match unsafe { instance.create_surface(window) } {
            Ok(surface) => surface,
            Err(e) => return (PlatformCapabilities::unavailable(e.to_string()), None),
        };

        let Some(adapter) = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
        else {
            return (
                PlatformCapabilities::unavailable("no compatible GPU adapter"),
                None,
            );
        };

        let info = adapter.get_info();
        let max_texture_dimension = adapter.limits().max_texture_dimension_2d;
        log::info!(
            "using adapter {} ({:?}), max texture {}",
            info.name,
            info.backend,
            max_texture_dimension
        );
        let capabilities = PlatformCapabilities::available(
            info.name,
            format!("{:?}", info.backend),
            max_texture_dimension,
        );
        (capabilities, Some(Self { surface, adapter }))
    }
}

pub struct SphereBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

/// Index into the renderer's frame textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTextureId(usize);

struct FrameTexture {
    texture: wgpu::Texture,
    size: (u32, u32),
    bind_group: wgpu::BindGroup,
}

pub struct GpuRenderer {
    window: Arc<Window>,
    surface: wgpu::Surface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,
    render_pipeline: wgpu::RenderPipeline,
    depth_view: wgpu::TextureView,

    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    textures: Vec<FrameTexture>,

    camera: Camera,
    camera_buffer: wgpu::Buffer,

    overlay_opacity: Option<f32>,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl GpuRenderer {
    pub async fn new(window: Arc<Window>, gpu: GpuContext) -> Result<Self, RenderError> {
        let GpuContext { surface, adapter } = gpu;
        let size = window.inner_size();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    label: None,
                },
                None,
            )
            .await
            .map_err(|e| RenderError::new(format!("device request failed: {e}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| RenderError::new("surface reports no formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo, // one tick per display refresh
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);
        let depth_view = create_depth_view(&device, &config);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let camera = Camera {
            position: Vec3::new(0.0, 0.0, 1.0),
            target: Vec3::ZERO,
            fov_deg: 75.0,
            aspect: config.width as f32 / config.height as f32,
            near: 1.0,
            far: 1000.0,
        };
        let camera_uniform = CameraUniform {
            view_proj: camera.view_proj().unwrap_or(Mat4::IDENTITY).to_cols_array_2d(),
        };
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("frame_bind_group_layout"),
        });

        let shader = device.create_shader_module(wgpu::include_wgsl!("shader_unwarp.wgsl"));
        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Unwarp Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Unwarp Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[Vertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                // sphere triangles wind CCW seen from the center; from outside
                // only the far wall's inner face shows
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let egui_ctx = egui::Context::default();
        let mut egui_state = egui_winit::State::new(window.as_ref());
        egui_state.set_pixels_per_point(window.scale_factor() as f32);
        let egui_renderer = egui_wgpu::Renderer::new(&device, config.format, None, 1);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            render_pipeline,
            depth_view,
            bind_group_layout,
            sampler,
            textures: Vec::new(),
            camera,
            camera_buffer,
            overlay_opacity: None,
            egui_ctx,
            egui_state,
            egui_renderer,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_view = create_depth_view(&self.device, &self.config);
            self.egui_state
                .set_pixels_per_point(self.window.scale_factor() as f32);
        }
    }

    fn create_frame_texture(&self, width: u32, height: u32) -> FrameTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            label: Some("warped_frame_texture"),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
            label: Some("frame_bind_group"),
        });
        FrameTexture {
            texture,
            size: (width, height),
            bind_group,
        }
    }

    fn write_frame(&self, slot: &FrameTexture, width: u32, height: u32, pixels: &[u8]) {
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &slot.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn draw_overlay(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let Some(opacity) = self.overlay_opacity else {
            return;
        };
        let alpha = (opacity.clamp(0.0, 1.0) * 255.0) as u8;
        let title = crate::i18n::tr("instructions.title");
        let lines = [
            crate::i18n::tr("instructions.drag"),
            crate::i18n::tr("instructions.zoom"),
        ];

        let raw_input = self.egui_state.take_egui_input(&self.window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            egui::Area::new("instructions")
                .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
                .interactable(false)
                .show(ctx, |ui| {
                    egui::Frame::none()
                        .fill(egui::Color32::from_black_alpha(alpha / 3 * 2))
                        .rounding(8.0)
                        .inner_margin(egui::Margin::same(16.0))
                        .show(ui, |ui| {
                            let text = egui::Color32::from_white_alpha(alpha);
                            ui.label(egui::RichText::new(&title).heading().color(text));
                            for line in &lines {
                                ui.label(egui::RichText::new(line).color(text));
                            }
                        });
                });
        });

        self.egui_state
            .handle_platform_output(&self.window, &self.egui_ctx, full_output.platform_output);
        let clipped_primitives = self.egui_ctx.tessellate(full_output.shapes);
        let screen_descriptor = egui_wgpu::renderer::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        for (id, delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, delta);
        }
        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            encoder,
            &clipped_primitives,
            &screen_descriptor,
        );
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Overlay Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            self.egui_renderer
                .render(&mut render_pass, &clipped_primitives, &screen_descriptor);
        }
        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }
}

fn create_depth_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

impl Renderer for GpuRenderer {
    type Mesh = SphereBuffers;
    type Texture = FrameTextureId;

    fn create_mesh(
        &mut self,
        positions: &[[f32; 3]],
        normals: &[[f32; 3]],
        uvs: &[[f32; 2]],
        indices: &[u32],
    ) -> Result<SphereBuffers, RenderError> {
        if positions.len() != normals.len() || positions.len() != uvs.len() {
            return Err(RenderError::new("mesh attribute arrays differ in length"));
        }
        let vertices: Vec<Vertex> = positions
            .iter()
            .zip(normals)
            .zip(uvs)
            .map(|((&position, &normal), &uv)| Vertex {
                position,
                normal,
                uv,
            })
            .collect();

        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Index Buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Ok(SphereBuffers {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    fn create_texture_from_video(
        &mut self,
        video: &mut dyn VideoSource,
    ) -> Result<FrameTextureId, RenderError> {
        let slot = match video.current_frame() {
            Some(frame) => {
                let slot = self.create_frame_texture(frame.width, frame.height);
                self.write_frame(&slot, frame.width, frame.height, frame.pixels);
                slot
            }
            None => {
                // dark placeholder until the first frame is decoded
                let slot = self.create_frame_texture(2, 2);
                self.write_frame(&slot, 2, 2, &[16u8, 16, 16, 255].repeat(4));
                slot
            }
        };
        self.textures.push(slot);
        Ok(FrameTextureId(self.textures.len() - 1))
    }

    fn mark_texture_dirty(&mut self, texture: &FrameTextureId, frame: VideoFrame<'_>) {
        let expected = (frame.width as usize) * (frame.height as usize) * 4;
        if frame.pixels.len() != expected {
            log::warn!(
                "dropping frame: {} bytes for {}x{}",
                frame.pixels.len(),
                frame.width,
                frame.height
            );
            return;
        }
        let Some(slot) = self.textures.get(texture.0) else {
            log::warn!("unknown texture {:?}", texture);
            return;
        };
        if slot.size != (frame.width, frame.height) {
            log::debug!("frame size changed to {}x{}", frame.width, frame.height);
            let replacement = self.create_frame_texture(frame.width, frame.height);
            self.textures[texture.0] = replacement;
        }
        let slot = &self.textures[texture.0];
        self.write_frame(slot, frame.width, frame.height, frame.pixels);
    }

    fn set_camera_projection(&mut self, fov_degrees: f32, aspect: f32, near: f32, far: f32) {
        self.camera.fov_deg = fov_degrees;
        self.camera.aspect = aspect;
        self.camera.near = near;
        self.camera.far = far;
    }

    fn set_camera_position(&mut self, position: Vec3) {
        self.camera.position = position;
    }

    fn set_camera_look_at(&mut self, target: Vec3) {
        self.camera.target = target;
    }

    fn show_overlay(&mut self, opacity: f32) {
        self.overlay_opacity = Some(opacity);
    }

    fn hide_overlay(&mut self) {
        self.overlay_opacity = None;
    }

    fn render_frame(
        &mut self,
        mesh: &SphereBuffers,
        texture: &FrameTextureId,
    ) -> Result<(), RenderError> {
        if let Some(view_proj) = self.camera.view_proj() {
            let uniform = CameraUniform {
                view_proj: view_proj.to_cols_array_2d(),
            };
            self.queue
                .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[uniform]));
        }

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Err(RenderError::new("surface lost; reconfigured"));
            }
            Err(e) => return Err(RenderError::new(e.to_string())),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let Some(slot) = self.textures.get(texture.0) else {
            return Err(RenderError::new(format!("unknown texture {:?}", texture)));
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Unwarp Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: true,
                    }),
                    stencil_ops: None,
                }),
            });

            render_pass.set_pipeline(&self.render_pipeline);
            render_pass.set_bind_group(0, &slot.bind_group, &[]);
            render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }

        self.draw_overlay(&mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}
