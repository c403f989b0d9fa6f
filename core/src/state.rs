//! Render state coordination
//!
//! [`StateCoordinator`] owns the blend, depth and filter state the GPU currently has. Requested
//! poly flags are first reduced to effective flags, then diffed against the last emitted set.
//! Only a change in a bit that matters flushes the batch, and only the state calls whose bits
//! changed are emitted.

use serde::{Deserialize, Serialize};

use crate::batch::{BatchAccumulator, FlushReason};
use crate::error::RenderError;
use crate::flags::PolyFlags;
use crate::gpu::{BlendMode, DepthMode, GpuBackend, TextureFilter, ViewState};

/// Diagnostic override of texture filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOverride {
    /// Follow each polygon's no-smooth flag
    #[default]
    Auto,
    /// Always nearest
    Nearest,
    /// Always linear
    Linear,
}

impl FilterOverride {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "auto" => Some(FilterOverride::Auto),
            "nearest" | "point" => Some(FilterOverride::Nearest),
            "linear" | "smooth" => Some(FilterOverride::Linear),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterOverride::Auto => "auto",
            FilterOverride::Nearest => "nearest",
            FilterOverride::Linear => "linear",
        }
    }
}

impl std::fmt::Display for FilterOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// GPU state last emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStateSnapshot {
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub filter: TextureFilter,
}

/// State call counters since the last [`StateCoordinator::reset_stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateStats {
    pub blend_changes: u32,
    pub depth_changes: u32,
    pub filter_changes: u32,
    pub view_changes: u32,
}

/// Apply backend precedence rules to requested flags.
///
/// - invisible excludes every other blend bit
/// - translucent excludes masked
/// - polygons that are neither translucent nor modulated write depth
pub fn effective_flags(requested: PolyFlags, filter: FilterOverride) -> PolyFlags {
    let mut flags = requested;
    if flags.contains(PolyFlags::INVISIBLE) {
        flags.remove(PolyFlags::BLEND_BITS.difference(PolyFlags::INVISIBLE));
    }
    if flags.contains(PolyFlags::TRANSLUCENT) {
        flags.remove(PolyFlags::MASKED);
    }
    if !flags.intersects(PolyFlags::TRANSLUCENT | PolyFlags::MODULATED) {
        flags.insert(PolyFlags::OCCLUDE);
    }
    match filter {
        FilterOverride::Auto => {}
        FilterOverride::Nearest => flags.insert(PolyFlags::NO_SMOOTH),
        FilterOverride::Linear => flags.remove(PolyFlags::NO_SMOOTH),
    }
    flags
}

/// Diffs requested state against emitted state and emits the minimum.
pub struct StateCoordinator {
    /// Effective flags of the last successful emission
    current: PolyFlags,
    snapshot: RenderStateSnapshot,
    /// GPU state unknown; next apply emits everything
    stale: bool,
    view: Option<ViewState>,
    filter: FilterOverride,
    stats: StateStats,
}

impl StateCoordinator {
    pub fn new(filter: FilterOverride) -> Self {
        Self {
            current: PolyFlags::empty(),
            snapshot: RenderStateSnapshot::default(),
            stale: true,
            view: None,
            filter,
            stats: StateStats::default(),
        }
    }

    /// Bring GPU state in line with `requested`, flushing first when it changes.
    ///
    /// Returns the effective flags the following geometry is drawn with.
    pub fn apply<G: GpuBackend + ?Sized>(
        &mut self,
        requested: PolyFlags,
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<PolyFlags, RenderError> {
        let effective = effective_flags(requested, self.filter);
        let changed = (self.current ^ effective) & PolyFlags::RELEVANT;

        if !self.stale && changed.is_empty() {
            self.current = effective;
            return Ok(effective);
        }

        batch.flush(gpu, FlushReason::State)?;
        if let Err(e) = self.emit(effective, changed, gpu) {
            self.stale = true;
            return Err(e.into());
        }

        self.current = effective;
        self.stale = false;
        Ok(effective)
    }

    fn emit<G: GpuBackend + ?Sized>(
        &mut self,
        effective: PolyFlags,
        changed: PolyFlags,
        gpu: &mut G,
    ) -> Result<(), crate::error::GpuError> {
        if self.stale || changed.intersects(PolyFlags::BLEND_BITS) {
            let blend = BlendMode::from_flags(effective);
            gpu.set_blend_mode(blend)?;
            self.snapshot.blend = blend;
            self.stats.blend_changes += 1;
        }
        if self.stale || changed.contains(PolyFlags::OCCLUDE) {
            let depth = DepthMode::from_flags(effective);
            gpu.set_depth_mode(depth)?;
            self.snapshot.depth = depth;
            self.stats.depth_changes += 1;
        }
        if self.stale || changed.contains(PolyFlags::NO_SMOOTH) {
            let filter = TextureFilter::from_flags(effective);
            gpu.set_filter(filter)?;
            self.snapshot.filter = filter;
            self.stats.filter_changes += 1;
        }
        Ok(())
    }

    /// Set viewport and projection, flushing first when either changed.
    pub fn apply_view<G: GpuBackend + ?Sized>(
        &mut self,
        view: ViewState,
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<(), RenderError> {
        if self.view == Some(view) {
            return Ok(());
        }
        batch.flush(gpu, FlushReason::View)?;
        self.view = None;
        gpu.set_view(&view)?;
        self.view = Some(view);
        self.stats.view_changes += 1;
        Ok(())
    }

    /// Change the filter override. Takes effect on the next [`apply`](Self::apply).
    pub fn set_filter_override(&mut self, filter: FilterOverride) {
        self.filter = filter;
    }

    pub fn filter_override(&self) -> FilterOverride {
        self.filter
    }

    /// Resend the view on the next [`apply_view`](Self::apply_view).
    pub fn invalidate_view(&mut self) {
        self.view = None;
    }

    /// Forget emitted state so the next apply resends everything.
    pub fn mark_stale(&mut self) {
        self.stale = true;
        self.view = None;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn current_flags(&self) -> PolyFlags {
        self.current
    }

    pub fn snapshot(&self) -> RenderStateSnapshot {
        self.snapshot
    }

    pub fn view(&self) -> Option<ViewState> {
        self.view
    }

    pub fn stats(&self) -> StateStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = StateStats::default();
    }
}
