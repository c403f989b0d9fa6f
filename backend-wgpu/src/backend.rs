//! [`GpuBackend`] on top of wgpu
//!
//! Geometry renders into an offscreen RGBA8 target. `present` blits that target to the window
//! surface when one is attached; without a surface the backend runs headless.
//!
//! Backends created with [`WgpuBackend::sibling`] share the device and the texture table, so
//! rendering contexts built on them can share one texture store.

use std::cell::RefCell;
use std::num::NonZeroU64;
use std::rc::Rc;

use anyhow::{Context, Result};
use hashbrown::HashMap;

use sheen_core::config::DisplayConfig;
use sheen_core::{
    BlendMode, DepthMode, DrawBatch, Flash, FrameParams, GpuBackend, GpuError, GpuTexture,
    MipData, Screenshot, TextureDesc, TextureDomain, TextureFilter, TexturePass, ViewState,
    Viewport,
};

use crate::buffer::GrowableBuffer;
use crate::capture::read_texture_pixels;
use crate::frame::{
    DrawOp, FlashUniform, FrameOp, FrameRecorder, ViewUniform, flash_blend_constant, segments,
};
use crate::pipeline::{DEPTH_FORMAT, PipelineCache, PipelineKey};
use crate::texture::TextureManager;

/// Color format of the offscreen render target
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Texture bound to each pass
type TextureSet = [Option<GpuTexture>; TexturePass::COUNT];

/// Offscreen color and depth attachments
struct RenderTarget {
    color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Render Target Color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Render Target Depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        Self {
            color_view: color_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            color_texture,
            width,
            height,
        }
    }
}

/// Window surface and the pipeline copying the render target onto it
struct SurfaceTarget {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

/// Fullscreen pass scaling the scene and adding fog
struct FlashPass {
    pipeline: wgpu::RenderPipeline,
    uniform: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl FlashPass {
    fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Flash Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(size_of::<FlashUniform>() as u64),
                },
                count: None,
            }],
        });
        let uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Flash Uniform"),
            size: size_of::<FlashUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Flash Bind Group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            }],
        });

        Self {
            pipeline: create_flash_pipeline(device, &layout),
            uniform,
            bind_group,
        }
    }
}

/// Bind group layouts shared by every pipeline
struct BindGroupLayouts {
    view: wgpu::BindGroupLayout,
    textures: wgpu::BindGroupLayout,
    sampler: wgpu::BindGroupLayout,
}

/// wgpu implementation of [`GpuBackend`]
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: RenderTarget,
    surface: Option<SurfaceTarget>,

    /// Shared with sibling backends
    textures: Rc<RefCell<TextureManager>>,
    domain: TextureDomain,
    pipelines: PipelineCache,
    layouts: BindGroupLayouts,
    texture_bind_groups: HashMap<TextureSet, wgpu::BindGroup>,
    /// Nearest, linear
    samplers: [wgpu::BindGroup; 2],
    blit_sampler: wgpu::Sampler,
    flash_pass: FlashPass,

    vertex_buffer: GrowableBuffer,
    index_buffer: GrowableBuffer,
    view_buffer: GrowableBuffer,
    view_bind_group: wgpu::BindGroup,
    view_alignment: u64,

    recorder: FrameRecorder,
    bound: TextureSet,
    blend: BlendMode,
    depth: DepthMode,
    filter: TextureFilter,
    view: ViewState,
    brightness: f32,
    clear_color: wgpu::Color,
    flash: Flash,
    /// Color still has to be cleared this frame
    needs_clear: bool,
    /// Reported by `display_modes`; the render target size when empty
    display_modes: Vec<(u32, u32)>,
}

impl WgpuBackend {
    /// Create a backend on an existing device with a `width` x `height` render target.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let textures = Rc::new(RefCell::new(TextureManager::new(&device, &queue)));
        Self::with_textures(device, queue, textures, TextureDomain::unique(), width, height)
    }

    /// Create another backend on this backend's device, with its own render target.
    ///
    /// Both backends resolve the same texture handles and report the same texture domain.
    pub fn sibling(&self, width: u32, height: u32) -> Self {
        Self::with_textures(
            self.device.clone(),
            self.queue.clone(),
            Rc::clone(&self.textures),
            self.domain,
            width,
            height,
        )
    }

    fn with_textures(
        device: wgpu::Device,
        queue: wgpu::Queue,
        textures: Rc<RefCell<TextureManager>>,
        domain: TextureDomain,
        width: u32,
        height: u32,
    ) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let layouts = create_bind_group_layouts(&device);
        let pipelines = PipelineCache::new(
            &device,
            &[&layouts.view, &layouts.textures, &layouts.sampler],
            TARGET_FORMAT,
        );
        let samplers = [
            create_sampler_bind_group(
                &device,
                &layouts.sampler,
                wgpu::FilterMode::Nearest,
                "Sampler Nearest",
            ),
            create_sampler_bind_group(
                &device,
                &layouts.sampler,
                wgpu::FilterMode::Linear,
                "Sampler Linear",
            ),
        ];
        let blit_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blit Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let vertex_buffer =
            GrowableBuffer::new(&device, wgpu::BufferUsages::VERTEX, "Batch Vertices");
        let index_buffer = GrowableBuffer::new(&device, wgpu::BufferUsages::INDEX, "Batch Indices");
        let view_buffer = GrowableBuffer::new(&device, wgpu::BufferUsages::UNIFORM, "View Uniforms");
        let view_bind_group = create_view_bind_group(&device, &layouts.view, &view_buffer);
        let view_alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let flash_pass = FlashPass::new(&device);

        let target = RenderTarget::new(&device, width, height);

        tracing::info!("wgpu backend initialized: {}x{}", width, height);

        Self {
            view: ViewState {
                viewport: Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: width as f32,
                    height: height as f32,
                },
                fov: 90.0,
                z_near: 0.5,
                z_far: 32760.0,
            },
            device,
            queue,
            target,
            surface: None,
            textures,
            domain,
            pipelines,
            layouts,
            texture_bind_groups: HashMap::new(),
            samplers,
            blit_sampler,
            flash_pass,
            vertex_buffer,
            index_buffer,
            view_buffer,
            view_bind_group,
            view_alignment,
            recorder: FrameRecorder::default(),
            bound: [None; TexturePass::COUNT],
            blend: BlendMode::default(),
            depth: DepthMode::default(),
            filter: TextureFilter::default(),
            brightness: 0.5,
            clear_color: wgpu::Color::BLACK,
            flash: Flash::NONE,
            needs_clear: true,
            display_modes: Vec::new(),
        }
    }

    /// Create a backend without a window, on the default adapter.
    pub fn headless(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("Failed to find suitable GPU adapter")?;

        tracing::info!("Using GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Sheen Device"),
            required_features: adapter.features() & wgpu::Features::TEXTURE_COMPRESSION_BC,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: Default::default(),
            trace: wgpu::Trace::Off,
        }))
        .context("Failed to create GPU device")?;

        Ok(Self::new(device, queue, width, height))
    }

    /// Present to `surface` from now on. The surface is configured with `config`.
    pub fn attach_surface(
        &mut self,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    ) {
        surface.configure(&self.device, &config);

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Blit Bind Group Layout"),
                entries: &[
                    texture_entry(0),
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });
        let pipeline = create_blit_pipeline(&self.device, &layout, config.format);
        let bind_group = self.create_blit_bind_group(&layout);

        tracing::info!(
            "Surface attached: {}x{}, format: {:?}",
            config.width,
            config.height,
            config.format
        );
        self.surface = Some(SurfaceTarget {
            surface,
            config,
            pipeline,
            layout,
            bind_group,
        });
    }

    /// Resize the window surface. The render target keeps its size.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(target) = &mut self.surface {
            target.config.width = width;
            target.config.height = height;
            target.surface.configure(&self.device, &target.config);
            tracing::debug!("Surface resized to {}x{}", width, height);
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn render_target_size(&self) -> (u32, u32) {
        (self.target.width, self.target.height)
    }

    /// Number of live core textures, counted across siblings
    pub fn texture_count(&self) -> usize {
        self.textures.borrow().len()
    }

    /// Set the resolutions `getres` offers. Window systems know the monitor's modes; wgpu does not.
    pub fn set_display_modes(&mut self, modes: Vec<(u32, u32)>) {
        self.display_modes = modes;
    }

    /// Number of pipelines created so far
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn texture_bind_group(&mut self, set: TextureSet) -> wgpu::BindGroup {
        if let Some(bind_group) = self.texture_bind_groups.get(&set) {
            return bind_group.clone();
        }
        let textures = self.textures.borrow();
        let entries: Vec<wgpu::BindGroupEntry> = set
            .iter()
            .enumerate()
            .map(|(binding, texture)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(textures.view(*texture)),
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Pass Textures"),
            layout: &self.layouts.textures,
            entries: &entries,
        });
        drop(entries);
        drop(textures);
        self.texture_bind_groups.insert(set, bind_group.clone());
        bind_group
    }

    /// Drop cached bind groups naming textures a sibling released.
    fn prune_texture_bind_groups(&mut self) {
        let textures = self.textures.borrow();
        self.texture_bind_groups.retain(|set, _| {
            set.iter()
                .flatten()
                .all(|texture| textures.contains(*texture))
        });
    }

    fn create_blit_bind_group(&self, layout: &wgpu::BindGroupLayout) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.target.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.blit_sampler),
                },
            ],
        })
    }

    /// Upload staged data and replay recorded ops into render passes.
    fn execute(&mut self) {
        if self.recorder.is_empty() && !self.needs_clear {
            return;
        }

        self.vertex_buffer
            .upload(&self.device, &self.queue, &self.recorder.vertices);
        self.index_buffer.upload(
            &self.device,
            &self.queue,
            bytemuck::cast_slice(&self.recorder.indices),
        );
        if self
            .view_buffer
            .upload(&self.device, &self.queue, &self.recorder.views)
        {
            self.view_bind_group =
                create_view_bind_group(&self.device, &self.layouts.view, &self.view_buffer);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Batch Encoder"),
            });

        let ops = &self.recorder.ops;
        for segment in segments(ops, self.needs_clear) {
            let color_load = if self.needs_clear {
                wgpu::LoadOp::Clear(self.clear_color)
            } else {
                wgpu::LoadOp::Load
            };
            let depth_load = if segment.clear_depth {
                wgpu::LoadOp::Clear(1.0)
            } else {
                wgpu::LoadOp::Load
            };
            self.encode_pass(&mut encoder, &ops[segment.ops], color_load, depth_load);
            self.needs_clear = false;
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.recorder.clear();
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        ops: &[FrameOp],
        color_load: wgpu::LoadOp<wgpu::Color>,
        depth_load: wgpu::LoadOp<f32>,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Batch Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.target.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let mut bound_pipeline = None;
        let mut bound_view = None;
        let mut bound_linear = None;
        let mut bound_viewport = None;

        pass.set_index_buffer(
            self.index_buffer.buffer().slice(..),
            wgpu::IndexFormat::Uint32,
        );

        for op in ops {
            let draw = match op {
                FrameOp::Draw(draw) => draw,
                FrameOp::Flash => {
                    pass.set_pipeline(&self.flash_pass.pipeline);
                    pass.set_bind_group(0, &self.flash_pass.bind_group, &[]);
                    pass.set_blend_constant(flash_blend_constant(&self.flash));
                    pass.set_viewport(
                        0.0,
                        0.0,
                        self.target.width as f32,
                        self.target.height as f32,
                        0.0,
                        1.0,
                    );
                    pass.draw(0..3, 0..1);
                    bound_pipeline = None;
                    bound_view = None;
                    bound_linear = None;
                    bound_viewport = None;
                    continue;
                }
                FrameOp::ClearDepth => continue,
            };

            if bound_pipeline != Some(draw.key) {
                let Some(pipeline) = self.pipelines.get(&draw.key) else {
                    tracing::warn!("Missing pipeline for {:?}, skipping draw", draw.key);
                    continue;
                };
                pass.set_pipeline(pipeline);
                bound_pipeline = Some(draw.key);
            }
            if bound_view != Some(draw.view_offset) {
                pass.set_bind_group(0, &self.view_bind_group, &[draw.view_offset]);
                bound_view = Some(draw.view_offset);
            }
            if bound_linear != Some(draw.linear) {
                pass.set_bind_group(2, &self.samplers[draw.linear as usize], &[]);
                bound_linear = Some(draw.linear);
            }
            if bound_viewport != Some(draw.viewport) {
                let vp = clamp_viewport(draw.viewport, self.target.width, self.target.height);
                pass.set_viewport(vp.x, vp.y, vp.width, vp.height, 0.0, 1.0);
                bound_viewport = Some(draw.viewport);
            }
            pass.set_bind_group(1, &draw.textures, &[]);
            pass.set_vertex_buffer(0, self.vertex_buffer.buffer().slice(draw.vertices.clone()));
            pass.draw_indexed(draw.indices.clone(), 0, 0..1);
        }
    }

    fn present_surface(&self) -> Result<(), GpuError> {
        let Some(target) = &self.surface else {
            tracing::trace!("No surface attached, skipping present");
            return Ok(());
        };

        let frame = target
            .surface
            .get_current_texture()
            .map_err(|e| GpuError::Device(format!("failed to acquire surface texture: {e}")))?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Blit Encoder"),
            });
        {
            let mut blit_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Blit Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            blit_pass.set_pipeline(&target.pipeline);
            blit_pass.set_bind_group(0, &target.bind_group, &[]);
            blit_pass.draw(0..3, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

impl GpuBackend for WgpuBackend {
    fn texture_domain(&self) -> TextureDomain {
        self.domain
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        mips: &[MipData],
    ) -> Result<GpuTexture, GpuError> {
        self.textures
            .borrow_mut()
            .create(&self.device, &self.queue, desc, mips)
    }

    fn update_texture(&mut self, texture: GpuTexture, mips: &[MipData]) -> Result<(), GpuError> {
        // Recorded draws must sample the old contents
        self.execute();
        self.textures.borrow().update(&self.queue, texture, mips)
    }

    fn release_texture(&mut self, texture: GpuTexture) {
        let released = self.textures.borrow_mut().release(texture);
        if released {
            // Recorded draws keep their bind groups, and with them the texture
            self.texture_bind_groups
                .retain(|set, _| !set.contains(&Some(texture)));
            for slot in &mut self.bound {
                if *slot == Some(texture) {
                    *slot = None;
                }
            }
        }
    }

    fn bind_texture(&mut self, pass: TexturePass, texture: Option<GpuTexture>) {
        self.bound[pass as usize] = texture;
    }

    fn set_blend_mode(&mut self, mode: BlendMode) -> Result<(), GpuError> {
        self.blend = mode;
        Ok(())
    }

    fn set_depth_mode(&mut self, mode: DepthMode) -> Result<(), GpuError> {
        self.depth = mode;
        Ok(())
    }

    fn set_filter(&mut self, filter: TextureFilter) -> Result<(), GpuError> {
        self.filter = filter;
        Ok(())
    }

    fn set_view(&mut self, view: &ViewState) -> Result<(), GpuError> {
        self.view = *view;
        self.recorder.invalidate_view();
        Ok(())
    }

    fn draw(&mut self, batch: &DrawBatch<'_>) -> Result<(), GpuError> {
        if batch.indices.is_empty() {
            return Ok(());
        }

        let key = PipelineKey {
            layout: batch.layout,
            blend: self.blend,
            depth: self.depth,
        };
        self.pipelines.prepare(&self.device, key);
        let textures = self.texture_bind_group(self.bound);

        let uniform = ViewUniform::new(&self.view, self.brightness);
        let view_offset = self.recorder.view_offset(&uniform, self.view_alignment);
        let (vertices, indices) = self.recorder.push_geometry(batch.vertices, batch.indices);

        self.recorder.ops.push(FrameOp::Draw(DrawOp {
            key,
            textures,
            linear: self.filter == TextureFilter::Linear,
            view_offset,
            viewport: self.view.viewport,
            vertices,
            indices,
        }));
        Ok(())
    }

    fn begin_frame(&mut self, params: &FrameParams) -> Result<(), GpuError> {
        self.recorder.clear();
        self.needs_clear = true;
        let [r, g, b, a] = params.clear_color.to_array().map(f64::from);
        self.clear_color = wgpu::Color { r, g, b, a };
        self.flash = params.flash;
        if self.flash.is_active() {
            self.queue.write_buffer(
                &self.flash_pass.uniform,
                0,
                bytemuck::bytes_of(&FlashUniform::new(&self.flash)),
            );
        }
        self.prune_texture_bind_groups();
        Ok(())
    }

    fn clear_depth(&mut self) -> Result<(), GpuError> {
        self.recorder.ops.push(FrameOp::ClearDepth);
        Ok(())
    }

    fn end_scene(&mut self) -> Result<(), GpuError> {
        if self.flash.is_active() {
            self.recorder.ops.push(FrameOp::Flash);
        }
        self.recorder.ops.push(FrameOp::ClearDepth);
        Ok(())
    }

    fn submit(&mut self) -> Result<(), GpuError> {
        self.execute();
        Ok(())
    }

    fn present(&mut self) -> Result<(), GpuError> {
        self.present_surface()
    }

    fn set_brightness(&mut self, brightness: f32) {
        self.brightness = brightness;
        self.recorder.invalidate_view();
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::ResourceCreation(format!(
                "invalid render target size {}x{}",
                width, height
            )));
        }
        self.execute();
        self.target = RenderTarget::new(&self.device, width, height);
        if let Some(mut surface) = self.surface.take() {
            surface.bind_group = self.create_blit_bind_group(&surface.layout);
            self.surface = Some(surface);
        }
        self.needs_clear = true;
        tracing::debug!("Render target resized to {}x{}", width, height);
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<Screenshot, GpuError> {
        self.execute();
        let (width, height) = (self.target.width, self.target.height);
        let pixels = read_texture_pixels(
            &self.device,
            &self.queue,
            &self.target.color_texture,
            width,
            height,
        )?;
        Ok(Screenshot {
            width,
            height,
            pixels,
        })
    }

    fn display_modes(&self) -> Vec<(u32, u32)> {
        if self.display_modes.is_empty() {
            vec![(self.target.width, self.target.height)]
        } else {
            self.display_modes.clone()
        }
    }
}

/// Surface configuration for `display`, or `None` if the surface supports no formats.
///
/// Prefers an sRGB format. `vsync` selects between FIFO-style and immediate presentation.
pub fn surface_configuration(
    caps: &wgpu::SurfaceCapabilities,
    display: &DisplayConfig,
) -> Option<wgpu::SurfaceConfiguration> {
    let format = caps
        .formats
        .iter()
        .find(|f| f.is_srgb())
        .or(caps.formats.first())
        .copied()?;

    Some(wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: display.width.max(1),
        height: display.height.max(1),
        present_mode: if display.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        },
        alpha_mode: caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto),
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    })
}

/// Clamp a viewport to the render target; wgpu rejects viewports outside it.
pub(crate) fn clamp_viewport(viewport: Viewport, width: u32, height: u32) -> Viewport {
    let (w, h) = (width as f32, height as f32);
    let x = viewport.x.clamp(0.0, w);
    let y = viewport.y.clamp(0.0, h);
    Viewport {
        x,
        y,
        width: viewport.width.clamp(0.0, w - x),
        height: viewport.height.clamp(0.0, h - y),
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn create_bind_group_layouts(device: &wgpu::Device) -> BindGroupLayouts {
    let view = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("View Bind Group Layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: NonZeroU64::new(size_of::<ViewUniform>() as u64),
            },
            count: None,
        }],
    });

    let texture_entries: Vec<_> = (0..TexturePass::COUNT as u32).map(texture_entry).collect();
    let textures = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Pass Textures Layout"),
        entries: &texture_entries,
    });

    let sampler = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Sampler Bind Group Layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        }],
    });

    BindGroupLayouts {
        view,
        textures,
        sampler,
    }
}

fn create_sampler_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    filter: wgpu::FilterMode,
    label: &str,
) -> wgpu::BindGroup {
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: filter,
        ..Default::default()
    });
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Sampler Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Sampler(&sampler),
        }],
    })
}

fn create_view_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &GrowableBuffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("View Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: buffer.buffer(),
                offset: 0,
                size: NonZeroU64::new(size_of::<ViewUniform>() as u64),
            }),
        }],
    })
}

fn create_blit_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Blit Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/blit.wgsl").into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Blit Pipeline Layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Blit Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_blit"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_blit"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn create_flash_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Flash Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/flash.wgsl").into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Flash Pipeline Layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    // target * constant + fog, alpha kept
    let blend = wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::Constant,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::Zero,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Flash Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_flash"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_flash"),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
