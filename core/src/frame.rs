//! Frame bracketing
//!
//! A frame is the only window in which geometry may be queued. `end_frame` always drains the
//! batch, so nothing queued in one frame survives into the next.
//!
//! A frame draws the scene first and overlays (the HUD) after `end_scene`, which applies the
//! frame's flash to the scene only.

use crate::batch::{BatchAccumulator, FlushReason};
use crate::error::RenderError;
use crate::gpu::{FrameParams, GpuBackend};
use crate::state::StateCoordinator;
use crate::texture_cache::TextureCache;

/// Frame lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    InFrame,
}

/// Tracks the frame state machine and pending device resets.
#[derive(Debug, Default)]
pub struct FrameCoordinator {
    state: FrameState,
    /// Device was reset since the last frame started
    reset_pending: bool,
    /// `end_scene` ran this frame
    scene_ended: bool,
    frame_index: u64,
}

impl FrameCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle -> InFrame. Resets the batch and, after a device reset, invalidates bindings.
    ///
    /// Takes the texture store for the frame, so fails while another context sharing it is in
    /// a frame.
    pub fn begin_frame<G: GpuBackend + ?Sized>(
        &mut self,
        params: &FrameParams,
        batch: &mut BatchAccumulator,
        state: &mut StateCoordinator,
        cache: &mut TextureCache,
        gpu: &mut G,
    ) -> Result<(), RenderError> {
        self.require(FrameState::Idle, "begin_frame")?;
        cache.begin_frame()?;
        if let Err(e) = gpu.begin_frame(params) {
            cache.end_frame();
            return Err(e.into());
        }

        if self.reset_pending {
            tracing::debug!("Device reset detected, resending all state");
            state.mark_stale();
            cache.mark_stale();
            self.reset_pending = false;
        }
        batch.new_frame();
        self.scene_ended = false;
        self.state = FrameState::InFrame;
        Ok(())
    }

    /// InFrame -> Idle. Draws whatever is pending, submits, and presents if asked.
    pub fn end_frame<G: GpuBackend + ?Sized>(
        &mut self,
        present: bool,
        batch: &mut BatchAccumulator,
        cache: &mut TextureCache,
        gpu: &mut G,
    ) -> Result<(), RenderError> {
        self.require(FrameState::InFrame, "end_frame")?;
        self.state = FrameState::Idle;
        self.frame_index += 1;
        cache.end_frame();

        batch.flush(gpu, FlushReason::EndFrame)?;
        gpu.submit()?;
        if present {
            gpu.present()?;
        }
        Ok(())
    }

    /// Clear depth mid-frame. Pending geometry is drawn first so the clear only affects what
    /// follows.
    pub fn clear_depth<G: GpuBackend + ?Sized>(
        &mut self,
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<(), RenderError> {
        self.require(FrameState::InFrame, "clear_depth")?;
        batch.flush(gpu, FlushReason::DepthClear)?;
        gpu.clear_depth()?;
        Ok(())
    }

    /// Finish the scene: draw it, apply the flash and clear depth for overlays.
    ///
    /// Only the first call of a frame does anything. Returns whether this call ended the scene.
    pub fn end_scene<G: GpuBackend + ?Sized>(
        &mut self,
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<bool, RenderError> {
        self.require(FrameState::InFrame, "end_scene")?;
        if self.scene_ended {
            return Ok(false);
        }
        batch.flush(gpu, FlushReason::EndScene)?;
        gpu.end_scene()?;
        self.scene_ended = true;
        Ok(true)
    }

    /// Whether overlays are being drawn.
    pub fn scene_ended(&self) -> bool {
        self.scene_ended
    }

    /// Record an external device reset. Handled at the next `begin_frame`.
    pub fn notify_device_reset(&mut self) {
        self.reset_pending = true;
    }

    /// Fail with an ordering violation unless in `expected` state.
    pub fn require(&self, expected: FrameState, operation: &'static str) -> Result<(), RenderError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RenderError::OrderingViolation {
                operation,
                state: self.state,
            })
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn in_frame(&self) -> bool {
        self.state == FrameState::InFrame
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    /// Frames completed so far
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}
