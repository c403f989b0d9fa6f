//! Render pipeline cache
//!
//! One pipeline per vertex layout, blend mode and depth mode. Filtering is a sampler choice and
//! never needs its own pipeline.

use hashbrown::HashMap;

use sheen_core::{BlendMode, DepthMode, Topology, VertexLayout};

/// Depth buffer format of the render target
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Key for pipeline cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub layout: VertexLayout,
    pub blend: BlendMode,
    pub depth: DepthMode,
}

const SURFACE_ATTRIBUTES: [wgpu::VertexAttribute; 8] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x2,
    2 => Float32x2,
    3 => Float32x2,
    4 => Float32x2,
    5 => Float32x2,
    6 => Uint32,
    7 => Uint32,
];

const GOURAUD_ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x2,
    2 => Float32x4,
    3 => Float32x4,
    4 => Uint32,
];

const TILE_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x2,
    2 => Float32x4,
    3 => Uint32,
];

const COLOR_ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x4,
    2 => Uint32,
];

/// Vertex buffer layout matching the core's vertex structs
pub(crate) fn vertex_buffer_layout(layout: VertexLayout) -> wgpu::VertexBufferLayout<'static> {
    let attributes: &'static [wgpu::VertexAttribute] = match layout {
        VertexLayout::Surface => &SURFACE_ATTRIBUTES,
        VertexLayout::Gouraud => &GOURAUD_ATTRIBUTES,
        VertexLayout::Tile => &TILE_ATTRIBUTES,
        VertexLayout::Line | VertexLayout::Point => &COLOR_ATTRIBUTES,
    };
    wgpu::VertexBufferLayout {
        array_stride: layout.stride() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }
}

/// Vertex and fragment entry points of a layout
pub(crate) fn entry_points(layout: VertexLayout) -> (&'static str, &'static str) {
    match layout {
        VertexLayout::Surface => ("vs_surface", "fs_surface"),
        VertexLayout::Gouraud => ("vs_gouraud", "fs_textured"),
        VertexLayout::Tile => ("vs_tile", "fs_textured"),
        VertexLayout::Line => ("vs_line", "fs_color"),
        VertexLayout::Point => ("vs_point", "fs_color"),
    }
}

pub(crate) fn topology(layout: VertexLayout) -> wgpu::PrimitiveTopology {
    match layout.topology() {
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Topology::LineList => wgpu::PrimitiveTopology::LineList,
    }
}

/// Blend state and color write mask of a blend mode
pub(crate) fn blend_state(mode: BlendMode) -> (Option<wgpu::BlendState>, wgpu::ColorWrites) {
    use wgpu::{BlendComponent, BlendFactor, BlendOperation, BlendState};

    let color = |src_factor, dst_factor| {
        Some(BlendState {
            color: BlendComponent {
                src_factor,
                dst_factor,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent::OVER,
        })
    };

    match mode {
        BlendMode::Opaque | BlendMode::Masked => (None, wgpu::ColorWrites::ALL),
        BlendMode::Translucent => (
            color(BlendFactor::One, BlendFactor::OneMinusSrc),
            wgpu::ColorWrites::ALL,
        ),
        BlendMode::Modulated => (
            color(BlendFactor::Dst, BlendFactor::Src),
            wgpu::ColorWrites::ALL,
        ),
        BlendMode::Highlighted => (
            color(BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
            wgpu::ColorWrites::ALL,
        ),
        BlendMode::AlphaBlend => (Some(BlendState::ALPHA_BLENDING), wgpu::ColorWrites::ALL),
        BlendMode::Invisible => (None, wgpu::ColorWrites::empty()),
    }
}

pub(crate) fn depth_state(mode: DepthMode) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: mode == DepthMode::TestWrite,
        depth_compare: wgpu::CompareFunction::LessEqual,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

/// Cache for render pipelines, created on first use and kept for the device's lifetime
pub struct PipelineCache {
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    shader: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    target_format: wgpu::TextureFormat,
}

impl PipelineCache {
    pub fn new(
        device: &wgpu::Device,
        bind_group_layouts: &[&wgpu::BindGroupLayout],
        target_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Sheen Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/sheen.wgsl").into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sheen Pipeline Layout"),
            bind_group_layouts,
            push_constant_ranges: &[],
        });

        Self {
            pipelines: HashMap::new(),
            shader,
            layout,
            target_format,
        }
    }

    /// Create the pipeline for `key` if it does not exist yet.
    pub(crate) fn prepare(&mut self, device: &wgpu::Device, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        tracing::debug!(
            "Creating pipeline: layout={}, blend={:?}, depth={:?}",
            key.layout.name(),
            key.blend,
            key.depth
        );
        let pipeline = self.create(device, key);
        self.pipelines.insert(key, pipeline);
    }

    pub(crate) fn get(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    fn create(&self, device: &wgpu::Device, key: PipelineKey) -> wgpu::RenderPipeline {
        let (vs, fs) = entry_points(key.layout);
        let (blend, write_mask) = blend_state(key.blend);

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!(
                "Pipeline {} {:?} {:?}",
                key.layout.name(),
                key.blend,
                key.depth
            )),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some(vs),
                buffers: &[vertex_buffer_layout(key.layout)],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some(fs),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.target_format,
                    blend,
                    write_mask,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: topology(key.layout),
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // Engine geometry arrives in either winding
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(depth_state(key.depth)),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        })
    }
}
