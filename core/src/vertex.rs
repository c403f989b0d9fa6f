//! Batch vertex layouts
//!
//! Every primitive kind writes one of these `#[repr(C)]` vertex types into the batch. A batch
//! generation holds a single layout; switching layout flushes.

use bytemuck::{Pod, Zeroable};

/// Number of texture coordinate sets on a complex surface vertex
pub const SURFACE_TEXCOORDS: usize = 5;

/// Primitive topology of a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    TriangleList,
    LineList,
}

/// Vertex layout descriptor shared by the batch and the backend pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// Multi-pass world surfaces
    Surface,
    /// Lit meshes, decals and shadows
    Gouraud,
    /// Screen-space textured quads
    Tile,
    /// Camera-space lines
    Line,
    /// Screen-space untextured quads
    Point,
}

impl VertexLayout {
    /// All layouts, in pipeline index order
    pub const ALL: [VertexLayout; 5] = [
        VertexLayout::Surface,
        VertexLayout::Gouraud,
        VertexLayout::Tile,
        VertexLayout::Line,
        VertexLayout::Point,
    ];

    /// Stride in bytes
    pub const fn stride(self) -> u32 {
        match self {
            VertexLayout::Surface => size_of::<SurfaceVertex>() as u32,
            VertexLayout::Gouraud => size_of::<GouraudVertex>() as u32,
            VertexLayout::Tile => size_of::<TileVertex>() as u32,
            VertexLayout::Line => size_of::<LineVertex>() as u32,
            VertexLayout::Point => size_of::<PointVertex>() as u32,
        }
    }

    pub const fn topology(self) -> Topology {
        match self {
            VertexLayout::Line => Topology::LineList,
            _ => Topology::TriangleList,
        }
    }

    /// Whether vertex positions are in screen pixels rather than camera space
    pub const fn screen_space(self) -> bool {
        matches!(self, VertexLayout::Tile | VertexLayout::Point)
    }

    pub const fn name(self) -> &'static str {
        match self {
            VertexLayout::Surface => "surface",
            VertexLayout::Gouraud => "gouraud",
            VertexLayout::Tile => "tile",
            VertexLayout::Line => "line",
            VertexLayout::Point => "point",
        }
    }
}

/// A vertex type that can be written into a batch.
///
/// Implementors must be 4-byte aligned with a size that is a multiple of 4.
pub trait BatchVertex: Pod {
    const LAYOUT: VertexLayout;
}

/// Complex surface vertex: position, one texcoord set per surface pass, enabled pass mask
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SurfaceVertex {
    pub pos: [f32; 3],
    /// Diffuse, light, detail, fog, macro
    pub tex: [[f32; 2]; SURFACE_TEXCOORDS],
    /// Bit per [`TexturePass`](crate::texture_cache::TexturePass) that is bound for this vertex
    pub passes: u32,
    pub flags: u32,
}

/// Gouraud polygon vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GouraudVertex {
    pub pos: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
    pub fog: [f32; 4],
    pub flags: u32,
}

/// Tile corner: `pos` is pixel x, pixel y, camera-space z
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct TileVertex {
    pub pos: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
    pub flags: u32,
}

/// Line endpoint in camera space
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub pos: [f32; 3],
    pub color: [f32; 4],
    pub flags: u32,
}

/// Point quad corner: pixel x, pixel y, camera-space z
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PointVertex {
    pub pos: [f32; 3],
    pub color: [f32; 4],
    pub flags: u32,
}

impl BatchVertex for SurfaceVertex {
    const LAYOUT: VertexLayout = VertexLayout::Surface;
}

impl BatchVertex for GouraudVertex {
    const LAYOUT: VertexLayout = VertexLayout::Gouraud;
}

impl BatchVertex for TileVertex {
    const LAYOUT: VertexLayout = VertexLayout::Tile;
}

impl BatchVertex for LineVertex {
    const LAYOUT: VertexLayout = VertexLayout::Line;
}

impl BatchVertex for PointVertex {
    const LAYOUT: VertexLayout = VertexLayout::Point;
}

/// Largest stride of any layout, in 4-byte words
pub const MAX_STRIDE_WORDS: usize = {
    let mut max = 0;
    let mut i = 0;
    while i < VertexLayout::ALL.len() {
        let words = VertexLayout::ALL[i].stride() as usize / 4;
        if words > max {
            max = words;
        }
        i += 1;
    }
    max
};
