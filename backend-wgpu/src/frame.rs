//! Per-submission recording
//!
//! Draws are recorded on the CPU as the core flushes them and replayed into render passes at
//! submission. A depth clear ends the current render pass; the next one starts with a cleared
//! depth buffer and the color kept. Ending the scene records a flash over everything drawn so
//! far, followed by a depth clear.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use sheen_core::{Flash, ViewState, Viewport};

use crate::buffer::align_to;
use crate::pipeline::PipelineKey;

/// View uniform, laid out like the shader's `View`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct ViewUniform {
    pub proj: [[f32; 4]; 4],
    pub viewport: [f32; 4],
    pub brightness: f32,
    pub _pad: [f32; 3],
}

impl ViewUniform {
    pub fn new(view: &ViewState, brightness: f32) -> Self {
        let vp = view.viewport;
        Self {
            proj: view.projection_matrix().to_cols_array_2d(),
            viewport: [vp.x, vp.y, vp.width, vp.height],
            brightness,
            _pad: [0.0; 3],
        }
    }
}

/// Fog added by the flash pass, laid out like the shader's `FlashFog`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct FlashUniform {
    pub color: [f32; 4],
}

impl FlashUniform {
    pub fn new(flash: &Flash) -> Self {
        Self {
            color: flash.fog.max(Vec3::ZERO).extend(0.0).to_array(),
        }
    }
}

/// Blend constant scaling the scene under a flash
pub(crate) fn flash_blend_constant(flash: &Flash) -> wgpu::Color {
    let factor = flash.scene_factor();
    wgpu::Color {
        r: factor.x as f64,
        g: factor.y as f64,
        b: factor.z as f64,
        a: 1.0,
    }
}

pub(crate) struct DrawOp {
    pub key: PipelineKey,
    pub textures: wgpu::BindGroup,
    pub linear: bool,
    pub view_offset: u32,
    pub viewport: Viewport,
    /// Byte range in the vertex buffer
    pub vertices: Range<u64>,
    /// Element range in the index buffer
    pub indices: Range<u32>,
}

pub(crate) enum FrameOp {
    Draw(DrawOp),
    /// Apply the frame's flash to the whole target
    Flash,
    ClearDepth,
}

/// A run of draws sharing one render pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub ops: Range<usize>,
    pub clear_depth: bool,
}

/// Split recorded ops into render passes at depth clears.
///
/// Consecutive clears collapse. A trailing segment with no draws is kept when it still has to
/// clear depth.
pub(crate) fn segments(ops: &[FrameOp], clear_first: bool) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut clear_depth = clear_first;
    for (i, op) in ops.iter().enumerate() {
        if let FrameOp::ClearDepth = op {
            if i > start {
                segments.push(Segment {
                    ops: start..i,
                    clear_depth,
                });
            }
            start = i + 1;
            clear_depth = true;
        }
    }
    if ops.len() > start || clear_depth {
        segments.push(Segment {
            ops: start..ops.len(),
            clear_depth,
        });
    }
    segments
}

/// CPU staging of everything drawn since the last submission
#[derive(Default)]
pub(crate) struct FrameRecorder {
    pub ops: Vec<FrameOp>,
    pub vertices: Vec<u8>,
    pub indices: Vec<u32>,
    pub views: Vec<u8>,
    /// Offset of the current view in `views`, pushed on first use
    view_offset: Option<u32>,
}

impl FrameRecorder {
    /// Offset of `view` in the view buffer, appending it if the view changed.
    pub fn view_offset(&mut self, view: &ViewUniform, alignment: u64) -> u32 {
        if let Some(offset) = self.view_offset {
            return offset;
        }
        let offset = align_to(self.views.len() as u64, alignment);
        self.views.resize(offset as usize, 0);
        self.views.extend_from_slice(bytemuck::bytes_of(view));
        self.view_offset = Some(offset as u32);
        offset as u32
    }

    /// The next draw pushes a new view uniform.
    pub fn invalidate_view(&mut self) {
        self.view_offset = None;
    }

    /// Stage vertex and index data. Returns (vertex byte range, index element range).
    pub fn push_geometry(&mut self, vertices: &[u8], indices: &[u32]) -> (Range<u64>, Range<u32>) {
        // Vertex buffer offsets must be 4-byte aligned
        let vertex_start = align_to(self.vertices.len() as u64, 4);
        self.vertices.resize(vertex_start as usize, 0);
        self.vertices.extend_from_slice(vertices);
        let index_start = self.indices.len() as u32;
        self.indices.extend_from_slice(indices);
        (
            vertex_start..self.vertices.len() as u64,
            index_start..self.indices.len() as u32,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
        self.vertices.clear();
        self.indices.clear();
        self.views.clear();
        self.view_offset = None;
    }
}
