//! Per-frame counters

use std::fmt;

use crate::batch::{BatchStats, FlushReason};
use crate::state::StateStats;
use crate::texture_cache::CacheStats;

/// Counters of one completed frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub batch: BatchStats,
    pub cache: CacheStats,
    pub state: StateStats,
}

impl FrameStats {
    pub fn draw_calls(&self) -> u32 {
        self.batch.draw_calls
    }

    /// Blend, depth and filter calls emitted
    pub fn state_changes(&self) -> u32 {
        self.state.blend_changes + self.state.depth_changes + self.state.filter_changes
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "frame {}: {} draws, {} vertices, {} indices, {} generations",
            self.frame,
            self.batch.draw_calls,
            self.batch.vertices,
            self.batch.indices,
            self.batch.generations
        )?;
        write!(f, "flushes:")?;
        for reason in FlushReason::ALL {
            let count = self.batch.flushes_for(reason);
            if count > 0 {
                write!(f, " {}={}", reason.name(), count)?;
            }
        }
        writeln!(f)?;
        writeln!(
            f,
            "state: {} blend, {} depth, {} filter, {} view",
            self.state.blend_changes,
            self.state.depth_changes,
            self.state.filter_changes,
            self.state.view_changes
        )?;
        write!(
            f,
            "textures: {} binds ({} redundant, {} uncached), {} converted, {} updated, {} evicted, {} failed",
            self.cache.binds,
            self.cache.redundant_binds,
            self.cache.not_cached,
            self.cache.conversions,
            self.cache.updates,
            self.cache.evictions,
            self.cache.failures
        )
    }
}
