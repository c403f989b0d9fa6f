//! Deferred geometry batching
//!
//! [`BatchAccumulator`] collects vertices and indices from any number of draw calls and submits
//! them as one [`DrawBatch`] when something forces a flush: a state change, a texture change, a
//! depth clear, the end of the frame, or running out of room. Capacity is fixed at construction.
//! A full buffer costs an extra draw call, never a reallocation.

use crate::error::RenderError;
use crate::gpu::{DrawBatch, GpuBackend};
use crate::vertex::{BatchVertex, MAX_STRIDE_WORDS, Topology, VertexLayout};

/// Default vertex capacity of one batch
pub const DEFAULT_VERTEX_CAPACITY: u32 = 20_000;

/// Default index capacity of one batch
pub const DEFAULT_INDEX_CAPACITY: u32 = 60_000;

/// How appended vertices are connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPattern {
    /// Convex fan of N points around the first vertex, N - 2 triangles
    Fan(u32),
    /// Four-corner fan, two triangles
    Quad,
    /// N / 2 independent line segments
    Lines(u32),
    /// N vertices indexed in order, read as the layout's topology
    List(u32),
}

impl IndexPattern {
    pub fn vertex_count(self) -> u32 {
        match self {
            IndexPattern::Fan(n) | IndexPattern::Lines(n) | IndexPattern::List(n) => n,
            IndexPattern::Quad => 4,
        }
    }

    /// Index count, saturating at `u32::MAX` so oversized fans fail the capacity check.
    pub fn index_count(self) -> u32 {
        match self {
            IndexPattern::Fan(n) => n.saturating_sub(2).saturating_mul(3),
            IndexPattern::Quad => 6,
            IndexPattern::Lines(n) | IndexPattern::List(n) => n,
        }
    }

    fn validate(self, topology: Topology) -> Result<(), RenderError> {
        match self {
            IndexPattern::List(0) => Err(RenderError::InvalidPrimitive(
                "index list needs at least one vertex".to_string(),
            )),
            IndexPattern::List(n) if topology == Topology::TriangleList && n % 3 != 0 => {
                Err(RenderError::InvalidPrimitive(format!(
                    "triangle list needs a multiple of 3 vertices, got {n}"
                )))
            }
            IndexPattern::List(n) if topology == Topology::LineList && n % 2 != 0 => {
                Err(RenderError::InvalidPrimitive(format!(
                    "line list needs an even vertex count, got {n}"
                )))
            }
            IndexPattern::Fan(n) if n < 3 => Err(RenderError::InvalidPrimitive(format!(
                "fan needs at least 3 points, got {n}"
            ))),
            IndexPattern::Lines(n) if n == 0 || n % 2 != 0 => Err(RenderError::InvalidPrimitive(
                format!("line list needs an even, non-zero point count, got {n}"),
            )),
            _ => Ok(()),
        }
    }

    /// Write indices for vertices starting at `base`.
    fn write(self, base: u32, out: &mut [u32]) {
        match self {
            IndexPattern::Fan(_) | IndexPattern::Quad => {
                for (i, tri) in out.chunks_exact_mut(3).enumerate() {
                    let i = i as u32;
                    tri.copy_from_slice(&[base, base + i + 1, base + i + 2]);
                }
            }
            IndexPattern::Lines(_) | IndexPattern::List(_) => {
                for (i, index) in out.iter_mut().enumerate() {
                    *index = base + i as u32;
                }
            }
        }
    }
}

/// Why a batch was flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum FlushReason {
    /// Requested by the caller
    Explicit,
    /// No room left for the next append
    Capacity,
    /// Next append uses a different vertex layout
    Layout,
    /// Blend, depth or filter state changed
    State,
    /// A pass binding changed
    Texture,
    /// A bound texture is about to be rewritten or released
    TextureUpdate,
    /// Viewport or projection changed
    View,
    /// Depth buffer about to be cleared
    DepthClear,
    /// Scene finished, overlays follow
    EndScene,
    /// Terminal flush of a frame
    EndFrame,
}

impl FlushReason {
    pub const COUNT: usize = 10;

    pub const ALL: [FlushReason; Self::COUNT] = [
        FlushReason::Explicit,
        FlushReason::Capacity,
        FlushReason::Layout,
        FlushReason::State,
        FlushReason::Texture,
        FlushReason::TextureUpdate,
        FlushReason::View,
        FlushReason::DepthClear,
        FlushReason::EndScene,
        FlushReason::EndFrame,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FlushReason::Explicit => "explicit",
            FlushReason::Capacity => "capacity",
            FlushReason::Layout => "layout",
            FlushReason::State => "state",
            FlushReason::Texture => "texture",
            FlushReason::TextureUpdate => "texture-update",
            FlushReason::View => "view",
            FlushReason::DepthClear => "depth-clear",
            FlushReason::EndScene => "end-scene",
            FlushReason::EndFrame => "end-frame",
        }
    }
}

/// Cursor state of the batch currently being filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingBatch {
    pub vertex_cursor: u32,
    pub index_cursor: u32,
    /// Indices already submitted from this generation
    pub drawn_index_count: u32,
    pub vertex_capacity: u32,
    pub index_capacity: u32,
}

impl PendingBatch {
    fn remaining_vertices(&self) -> u32 {
        self.vertex_capacity - self.vertex_cursor
    }

    fn remaining_indices(&self) -> u32 {
        self.index_capacity - self.index_cursor
    }
}

/// Draw counters since the last [`BatchAccumulator::new_frame`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub draw_calls: u32,
    pub vertices: u32,
    pub indices: u32,
    /// Batch generations started, one per buffer reset
    pub generations: u32,
    pub flushes: [u32; FlushReason::COUNT],
}

impl BatchStats {
    pub fn flushes_for(&self, reason: FlushReason) -> u32 {
        self.flushes[reason as usize]
    }
}

/// Fixed-capacity vertex/index accumulator.
pub struct BatchAccumulator {
    /// Vertex storage in 4-byte words so any layout can be cast in place
    words: Vec<u32>,
    indices: Vec<u32>,
    layout: Option<VertexLayout>,
    pending: PendingBatch,
    /// Buffer was drawn; reset on the next append
    clear_pending: bool,
    stats: BatchStats,
}

impl BatchAccumulator {
    /// Create an accumulator holding at most `vertex_capacity` vertices of any layout and
    /// `index_capacity` indices.
    pub fn new(vertex_capacity: u32, index_capacity: u32) -> Self {
        tracing::debug!(
            "Creating batch: {} vertices, {} indices",
            vertex_capacity,
            index_capacity
        );
        Self {
            words: vec![0; vertex_capacity as usize * MAX_STRIDE_WORDS],
            indices: vec![0; index_capacity as usize],
            layout: None,
            pending: PendingBatch {
                vertex_cursor: 0,
                index_cursor: 0,
                drawn_index_count: 0,
                vertex_capacity,
                index_capacity,
            },
            clear_pending: false,
            stats: BatchStats::default(),
        }
    }

    /// Reserve vertex slots for one primitive and generate its indices.
    ///
    /// Flushes first when the layout changes or the primitive does not fit in the remaining
    /// space. The returned slots are zeroed and must be filled before the next flush.
    pub fn append<V: BatchVertex, G: GpuBackend + ?Sized>(
        &mut self,
        gpu: &mut G,
        pattern: IndexPattern,
    ) -> Result<&mut [V], RenderError> {
        pattern.validate(V::LAYOUT.topology())?;
        let vertex_count = pattern.vertex_count();
        let index_count = pattern.index_count();

        if vertex_count > self.pending.vertex_capacity
            || index_count > self.pending.index_capacity
        {
            return Err(RenderError::CapacityExhaustion {
                requested_vertices: vertex_count,
                requested_indices: index_count,
                vertex_capacity: self.pending.vertex_capacity,
                index_capacity: self.pending.index_capacity,
            });
        }

        if self.layout != Some(V::LAYOUT) {
            self.flush(gpu, FlushReason::Layout)?;
        }
        if self.clear_pending {
            self.reset();
        }
        if vertex_count > self.pending.remaining_vertices()
            || index_count > self.pending.remaining_indices()
        {
            self.flush(gpu, FlushReason::Capacity)?;
            self.reset();
        }
        self.layout = Some(V::LAYOUT);

        let base = self.pending.vertex_cursor;
        let first_index = self.pending.index_cursor as usize;
        pattern.write(
            base,
            &mut self.indices[first_index..first_index + index_count as usize],
        );

        let stride_words = (V::LAYOUT.stride() / 4) as usize;
        let start = base as usize * stride_words;
        let end = start + vertex_count as usize * stride_words;
        self.pending.vertex_cursor += vertex_count;
        self.pending.index_cursor += index_count;

        let slots = &mut self.words[start..end];
        slots.fill(0);
        bytemuck::try_cast_slice_mut(slots)
            .map_err(|e| RenderError::InvalidPrimitive(format!("vertex cast failed: {e}")))
    }

    /// Draw everything appended since the last flush as one draw call.
    ///
    /// Returns `false` without touching the GPU when nothing is pending.
    pub fn flush<G: GpuBackend + ?Sized>(
        &mut self,
        gpu: &mut G,
        reason: FlushReason,
    ) -> Result<bool, RenderError> {
        let Some(layout) = self.layout.filter(|_| !self.is_empty()) else {
            return Ok(false);
        };

        let stride_words = (layout.stride() / 4) as usize;
        let vertex_words = self.pending.vertex_cursor as usize * stride_words;
        let indices = &self.indices
            [self.pending.drawn_index_count as usize..self.pending.index_cursor as usize];
        let batch = DrawBatch {
            layout,
            vertices: bytemuck::cast_slice(&self.words[..vertex_words]),
            indices,
        };
        gpu.draw(&batch)?;

        tracing::trace!(
            "Flushed {} batch ({}): {} vertices, {} indices",
            layout.name(),
            reason.name(),
            batch.vertex_count(),
            indices.len()
        );

        self.stats.draw_calls += 1;
        self.stats.vertices += self.pending.vertex_cursor;
        self.stats.indices += indices.len() as u32;
        self.stats.flushes[reason as usize] += 1;

        self.pending.drawn_index_count = self.pending.index_cursor;
        self.clear_pending = true;
        Ok(true)
    }

    /// Discard pending geometry and start the frame's first generation.
    pub fn new_frame(&mut self) {
        if !self.is_empty() {
            tracing::warn!(
                "Discarding {} undrawn indices at frame start",
                self.pending.index_cursor - self.pending.drawn_index_count
            );
        }
        self.stats = BatchStats::default();
        self.reset();
    }

    /// Whether nothing is waiting to be drawn.
    pub fn is_empty(&self) -> bool {
        self.clear_pending || self.pending.index_cursor == self.pending.drawn_index_count
    }

    pub fn pending(&self) -> PendingBatch {
        self.pending
    }

    pub fn layout(&self) -> Option<VertexLayout> {
        self.layout
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    fn reset(&mut self) {
        self.pending.vertex_cursor = 0;
        self.pending.index_cursor = 0;
        self.pending.drawn_index_count = 0;
        self.clear_pending = false;
        self.stats.generations += 1;
    }
}

#[cfg(test)]
mod tests;
