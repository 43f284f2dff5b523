//! Render compositor: scene pass into surface A, then the feedback ->
//! glitch -> copy stage chain over the ping-pong pair.
//!
//! Per frame, strictly ordered:
//! 1. scene -> A (cleared wholesale)
//! 2. feedback reads {current = A, previous = B} -> temporary T
//! 3. glitch reads T -> swapchain frame
//! 4. copy reads T -> B (next frame's feedback history)
//! 5. T dropped
//!
//! A and B are never read and written inside one pass; T exists to keep it
//! that way. Only B survives across frames. If the stage stack or the
//! surfaces are missing the scene is drawn straight to the frame instead.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::atlas::{AtlasImage, GlyphAtlas};
use crate::camera::CameraPose;
use crate::cue::{CueGpu, LetterInstance, LyricCue};
use crate::params::{CompositorConfig, LayoutConfig, TimelineConfig};
use crate::spectrum::SpectrumFrame;

/// Scene uniform buffer (camera view-projection)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SceneUniforms {
    pub view_proj: [[f32; 4]; 4],
}

/// Shared uniform layout of every pipeline stage: one stage-specific scalar
/// (feedback amount or glitch intensity) plus time and audio level
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct StageParams {
    pub param: f32,
    pub time: f32,
    pub audio_level: f32,
    pub _pad: f32,
}

/// WGSL sources for the three post-processing stages
pub struct StageSources {
    pub feedback: String,
    pub glitch: String,
    pub copy: String,
}

/// Offscreen color target with fixed dimensions
pub struct RenderSurface {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl RenderSurface {
    fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
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
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
            width,
            height,
        }
    }
}

/// The persistent ping-pong pair
struct PingPong {
    a: RenderSurface,
    b: RenderSurface,
}

/// One parameterized fullscreen transform
pub struct PipelineStage {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    uniforms: wgpu::Buffer,
    dual_input: bool,
}

impl PipelineStage {
    fn new(
        device: &wgpu::Device,
        label: &str,
        source: &str,
        format: wgpu::TextureFormat,
        dual_input: bool,
    ) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
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
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
        ];
        if dual_input {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        });

        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&[StageParams {
                param: 0.0,
                time: 0.0,
                audio_level: 0.0,
                _pad: 0.0,
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            layout,
            uniforms,
            dual_input,
        }
    }

    fn write_params(&self, queue: &wgpu::Queue, param: f32, time: f32, audio_level: f32) {
        queue.write_buffer(
            &self.uniforms,
            0,
            bytemuck::cast_slice(&[StageParams {
                param,
                time,
                audio_level,
                _pad: 0.0,
            }]),
        );
    }

    /// Run the stage as a fullscreen triangle over `target`
    fn encode(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        inputs: &[&wgpu::TextureView],
        sampler: &wgpu::Sampler,
        target: &wgpu::TextureView,
    ) {
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: self.uniforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(inputs[0]),
            },
        ];
        if self.dual_input {
            entries.push(wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(inputs[1]),
            });
        }

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.layout,
            entries: &entries,
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

struct Stages {
    feedback: PipelineStage,
    glitch: PipelineStage,
    copy: PipelineStage,
}

/// Compositor owning the wgpu device, the swapchain, the stage chain, and
/// the ping-pong surfaces
pub struct Compositor {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    config: CompositorConfig,

    scene_pipeline: wgpu::RenderPipeline,
    scene_uniforms: wgpu::Buffer,
    scene_bind_group: wgpu::BindGroup,
    atlas: GlyphAtlas,

    sampler: wgpu::Sampler,
    ping: Option<PingPong>,
    stages: Option<Stages>,
}

impl Compositor {
    pub async fn new(
        window: std::sync::Arc<winit::window::Window>,
        atlas_image: AtlasImage,
        sources: StageSources,
        config: CompositorConfig,
    ) -> Result<Self, String> {
        config.validate()?;

        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| format!("Failed to create surface: {}", e))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or("Failed to find suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Main Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| format!("Failed to request device: {}", e))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Stage Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let atlas = GlyphAtlas::new(&device, &queue, atlas_image);

        // Scene pipeline: instanced glyph quads
        let scene_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/scene.wgsl").into()),
        });

        let scene_uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Uniform Buffer"),
            contents: bytemuck::cast_slice(&[SceneUniforms {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let scene_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Scene Bind Group Layout"),
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
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                ],
            });

        let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &scene_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: scene_uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&atlas.view),
                },
            ],
        });

        let scene_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Scene Pipeline Layout"),
                bind_group_layouts: &[&scene_bind_group_layout],
                push_constant_ranges: &[],
            });

        let instance_stride = std::mem::size_of::<LetterInstance>() as wgpu::BufferAddress;
        let scene_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Pipeline"),
            layout: Some(&scene_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &scene_shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: instance_stride,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &[
                        wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x4,
                        },
                        wgpu::VertexAttribute {
                            offset: 16,
                            shader_location: 1,
                            format: wgpu::VertexFormat::Float32x4,
                        },
                        wgpu::VertexAttribute {
                            offset: 32,
                            shader_location: 2,
                            format: wgpu::VertexFormat::Float32x4,
                        },
                        wgpu::VertexAttribute {
                            offset: 48,
                            shader_location: 3,
                            format: wgpu::VertexFormat::Float32x4,
                        },
                        wgpu::VertexAttribute {
                            offset: 64,
                            shader_location: 4,
                            format: wgpu::VertexFormat::Float32x4,
                        },
                        wgpu::VertexAttribute {
                            offset: 80,
                            shader_location: 5,
                            format: wgpu::VertexFormat::Float32x4,
                        },
                    ],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &scene_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let stages = Stages {
            feedback: PipelineStage::new(
                &device,
                "Feedback Stage",
                &sources.feedback,
                surface_format,
                true,
            ),
            glitch: PipelineStage::new(
                &device,
                "Glitch Stage",
                &sources.glitch,
                surface_format,
                false,
            ),
            copy: PipelineStage::new(&device, "Copy Stage", &sources.copy, surface_format, false),
        };

        let (pw, ph) = scaled_extent(size.width, size.height, config.resolution_scale);
        let ping = PingPong {
            a: RenderSurface::new(&device, "Surface A", pw, ph, surface_format),
            b: RenderSurface::new(&device, "Surface B", pw, ph, surface_format),
        };

        Ok(Self {
            surface,
            device,
            queue,
            surface_config,
            config,
            scene_pipeline,
            scene_uniforms,
            scene_bind_group,
            atlas,
            sampler,
            ping: Some(ping),
            stages: Some(stages),
        })
    }

    pub fn atlas_image(&self) -> &AtlasImage {
        &self.atlas.image
    }

    /// Reconfigure the swapchain and reallocate both persistent surfaces
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface_config.width = width.max(1);
        self.surface_config.height = height.max(1);
        self.surface.configure(&self.device, &self.surface_config);

        let (pw, ph) = scaled_extent(width, height, self.config.resolution_scale);
        let format = self.surface_config.format;
        self.ping = Some(PingPong {
            a: RenderSurface::new(&self.device, "Surface A", pw, ph, format),
            b: RenderSurface::new(&self.device, "Surface B", pw, ph, format),
        });
    }

    /// Render one frame
    #[allow(clippy::too_many_arguments)]
    pub fn composite(
        &self,
        cues: &mut [LyricCue],
        timeline: &TimelineConfig,
        layout: &LayoutConfig,
        now_ms: u64,
        pose: &CameraPose,
        frame: &SpectrumFrame,
        time_s: f32,
    ) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let frame_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.queue.write_buffer(
            &self.scene_uniforms,
            0,
            bytemuck::cast_slice(&[SceneUniforms {
                view_proj: pose.view_proj.to_cols_array_2d(),
            }]),
        );

        // Populate per-cue instance buffers
        for cue in cues.iter_mut() {
            if !cue.state.is_displayable() || cue.letters.is_empty() {
                continue;
            }
            let alpha = cue.fade_alpha(now_ms, timeline.fade_in_ms, timeline.fade_out_ms);
            // Band energies brighten the phrase color, one band per channel
            let tint = [frame.bass * 0.3, frame.mid * 0.3, frame.treble * 0.3];
            let instances =
                letter_instances(cue, alpha, tint, &self.atlas.image, layout.letter_size);
            self.ensure_cue_gpu(cue, instances.len() as u32);
            if let Some(gpu) = &cue.gpu {
                self.queue
                    .write_buffer(&gpu.instances, 0, bytemuck::cast_slice(&instances));
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Composite Encoder"),
            });

        match (&self.ping, &self.stages) {
            (Some(ping), Some(stages)) => {
                // 1. Scene into A
                self.encode_scene_pass(&mut encoder, cues, &ping.a.view);

                // 2. Feedback {A, B} -> T
                let temp = RenderSurface::new(
                    &self.device,
                    "Surface T",
                    ping.b.width,
                    ping.b.height,
                    self.surface_config.format,
                );
                stages.feedback.write_params(
                    &self.queue,
                    self.config.feedback_amount(frame.level),
                    time_s,
                    frame.level,
                );
                stages.feedback.encode(
                    &self.device,
                    &mut encoder,
                    "Feedback Pass",
                    &[&ping.a.view, &ping.b.view],
                    &self.sampler,
                    &temp.view,
                );

                // 3. Glitch T -> display
                stages.glitch.write_params(
                    &self.queue,
                    self.config.glitch_amount(frame.level, frame.bass),
                    time_s,
                    frame.level,
                );
                stages.glitch.encode(
                    &self.device,
                    &mut encoder,
                    "Glitch Pass",
                    &[&temp.view],
                    &self.sampler,
                    &frame_view,
                );

                // 4. Copy T -> B
                stages.copy.encode(
                    &self.device,
                    &mut encoder,
                    "Copy Pass",
                    &[&temp.view],
                    &self.sampler,
                    &ping.b.view,
                );

                self.queue.submit(std::iter::once(encoder.finish()));
                // 5. T dropped here, after the submit that uses it
                drop(temp);
            }
            _ => {
                // Degraded: raw scene straight to the display surface
                self.encode_scene_pass(&mut encoder, cues, &frame_view);
                self.queue.submit(std::iter::once(encoder.finish()));
            }
        }

        output.present();
        Ok(())
    }

    fn encode_scene_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        cues: &[LyricCue],
        target: &wgpu::TextureView,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.scene_pipeline);
        pass.set_bind_group(0, &self.scene_bind_group, &[]);

        for cue in cues {
            if !cue.state.is_displayable() || cue.letters.is_empty() {
                continue;
            }
            if let Some(gpu) = &cue.gpu {
                pass.set_vertex_buffer(0, gpu.instances.slice(..));
                pass.draw(0..6, 0..cue.letters.len() as u32);
            }
        }
    }

    /// Create or grow a cue's instance buffer to hold `count` letters
    fn ensure_cue_gpu(&self, cue: &mut LyricCue, count: u32) {
        let needs = match &cue.gpu {
            Some(gpu) => gpu.capacity < count,
            None => true,
        };
        if needs && count > 0 {
            let size = count as u64 * std::mem::size_of::<LetterInstance>() as u64;
            let instances = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Cue Instance Buffer"),
                size,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            cue.gpu = Some(CueGpu {
                instances,
                capacity: count,
            });
        }
    }
}

/// Offscreen dimensions: floor(window x resolution scale), at least 1x1
pub fn scaled_extent(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let w = (width as f32 * scale).floor() as u32;
    let h = (height as f32 * scale).floor() as u32;
    (w.max(1), h.max(1))
}

/// Build one frame's instances for a cue, back-to-front for alpha blending
pub fn letter_instances(
    cue: &LyricCue,
    alpha: f32,
    tint: [f32; 3],
    atlas: &AtlasImage,
    letter_size: f32,
) -> Vec<LetterInstance> {
    let group = Mat4::from_rotation_translation(cue.orientation, cue.position);
    let color = [
        (cue.color[0] + tint[0]).min(1.0),
        (cue.color[1] + tint[1]).min(1.0),
        (cue.color[2] + tint[2]).min(1.0),
        alpha,
    ];

    let mut depth_sorted: Vec<(f32, LetterInstance)> = cue
        .letters
        .iter()
        .map(|letter| {
            let size = letter.scale * letter_size;
            let local = Mat4::from_scale_rotation_translation(
                Vec3::splat(size),
                letter.rotation,
                letter.position,
            );
            let world_z = (group * letter.position.extend(1.0)).z;
            let instance = LetterInstance {
                model: (group * local).to_cols_array_2d(),
                uv_rect: atlas.glyph(letter.ch).uv_rect,
                color,
            };
            (world_z, instance)
        })
        .collect();

    depth_sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    depth_sorted.into_iter().map(|(_, i)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue::{ActivationState, LetterElement};
    use glam::Quat;

    #[test]
    fn test_scaled_extent_floors_and_clamps() {
        assert_eq!(scaled_extent(1280, 720, 1.0), (1280, 720));
        assert_eq!(scaled_extent(1280, 720, 0.5), (640, 360));
        assert_eq!(scaled_extent(1279, 719, 0.5), (639, 359));
        assert_eq!(scaled_extent(1, 1, 0.1), (1, 1));
    }

    fn test_cue(letter_zs: &[f32]) -> LyricCue {
        let letters = letter_zs
            .iter()
            .enumerate()
            .map(|(i, &z)| LetterElement {
                ch: 'A',
                cue_index: 0,
                slot: Vec3::new(i as f32 * 10.0, 0.0, 0.0),
                position: Vec3::new(i as f32 * 10.0, 0.0, z),
                rotation: Quat::IDENTITY,
                scale: 1.0,
                rate: 0.1,
                bob_amp: 10.0,
            })
            .collect();

        LyricCue {
            id: 0,
            text: "AAA".to_string(),
            start_ms: 0,
            end_ms: 1000,
            color: [0.5, 0.25, 1.0],
            stack_offset: None,
            state: ActivationState::Active,
            position: Vec3::new(0.0, 0.0, -100.0),
            target: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            orientation_target: Quat::IDENTITY,
            layout_scale: 1.0,
            letters,
            gpu: None,
        }
    }

    #[test]
    fn test_letter_instances_sorted_back_to_front() {
        let cue = test_cue(&[5.0, -20.0, 0.0]);
        let atlas = AtlasImage::placeholder_atlas();
        let instances = letter_instances(&cue, 1.0, [0.0; 3], &atlas, 50.0);

        assert_eq!(instances.len(), 3);
        let zs: Vec<f32> = instances.iter().map(|i| i.model[3][2]).collect();
        for pair in zs.windows(2) {
            assert!(pair[0] <= pair[1], "instances not back-to-front: {:?}", zs);
        }
    }

    #[test]
    fn test_letter_instances_carry_fade_alpha_and_color() {
        let cue = test_cue(&[0.0]);
        let atlas = AtlasImage::placeholder_atlas();
        let instances = letter_instances(&cue, 0.25, [0.0; 3], &atlas, 50.0);

        assert_eq!(instances[0].color, [0.5, 0.25, 1.0, 0.25]);
    }

    #[test]
    fn test_band_tint_brightens_and_saturates() {
        let cue = test_cue(&[0.0]);
        let atlas = AtlasImage::placeholder_atlas();
        let instances = letter_instances(&cue, 1.0, [0.3, 0.3, 0.3], &atlas, 50.0);

        // Each channel lifts by its band, clamped at full brightness
        assert_eq!(instances[0].color, [0.8, 0.55, 1.0, 1.0]);
    }

    #[test]
    fn test_letter_instance_scale_lands_in_model() {
        let mut cue = test_cue(&[0.0]);
        cue.letters[0].scale = 2.0;
        let atlas = AtlasImage::placeholder_atlas();
        let instances = letter_instances(&cue, 1.0, [0.0; 3], &atlas, 50.0);

        // Column 0 of the model carries the X basis: length = world size
        let x_basis = instances[0].model[0];
        let len = (x_basis[0] * x_basis[0] + x_basis[1] * x_basis[1] + x_basis[2] * x_basis[2])
            .sqrt();
        assert!((len - 100.0).abs() < 1e-3);
    }

    /// CPU reference of the feedback blend contract: amount 0 returns the
    /// current frame exactly, amount 1 converges on the previous frame
    fn blend_reference(current: [f32; 4], previous: [f32; 4], amount: f32) -> [f32; 4] {
        let t = amount.clamp(0.0, 1.0);
        let mut out = [0.0; 4];
        for i in 0..4 {
            out[i] = current[i] + (previous[i] - current[i]) * t;
        }
        // RGB split terms also vanish at 0 and track `previous` at 1
        out[0] += (previous[0] - out[0]) * 0.4 * t;
        out[2] += (previous[2] - out[2]) * 0.4 * t;
        out
    }

    #[test]
    fn test_feedback_blend_identity_at_zero() {
        let current = [0.3, 0.6, 0.9, 1.0];
        let previous = [0.8, 0.1, 0.4, 1.0];
        assert_eq!(blend_reference(current, previous, 0.0), current);
    }

    #[test]
    fn test_feedback_blend_converges_to_previous() {
        let current = [0.3, 0.6, 0.9, 1.0];
        let previous = [0.8, 0.1, 0.4, 1.0];
        let out = blend_reference(current, previous, 1.0);
        for i in 0..4 {
            assert!((out[i] - previous[i]).abs() < 1e-6);
        }
    }
}
