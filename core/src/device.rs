//! Rendering context facade
//!
//! [`RenderDevice`] wires the texture cache, batch, state and frame coordinators to one backend
//! and one texture converter. Engines talk to this type only.

use crate::batch::{BatchAccumulator, FlushReason};
use crate::config::RendererConfig;
use crate::converter::{TextureConverter, TextureInfo};
use crate::error::RenderError;
use crate::flags::PolyFlags;
use crate::frame::{FrameCoordinator, FrameState};
use crate::gpu::{FrameParams, GpuBackend, Screenshot, ViewState, Viewport};
use crate::primitive::{Pipeline, Primitive};
use crate::state::StateCoordinator;
use crate::stats::FrameStats;
use crate::texture_cache::{CacheOutcome, SharedTextureStore, TextureCache};

/// Upper bound on the resolution list reported to the player
pub const MAX_RESOLUTIONS: usize = 16;

/// One rendering context.
pub struct RenderDevice<G: GpuBackend, C: TextureConverter> {
    gpu: G,
    converter: C,
    config: RendererConfig,
    cache: TextureCache,
    batch: BatchAccumulator,
    state: StateCoordinator,
    frame: FrameCoordinator,
    brightness: f32,
    last_frame: FrameStats,
}

impl<G: GpuBackend, C: TextureConverter> RenderDevice<G, C> {
    /// Create a context with a texture store of its own.
    pub fn new(gpu: G, converter: C, config: RendererConfig) -> Self {
        let cache = TextureCache::local(gpu.texture_domain());
        Self::with_cache(gpu, converter, config, cache)
    }

    /// Create a context using `store`, which other contexts may share.
    ///
    /// Fails when `store` holds textures of a backend whose handles `gpu` cannot resolve.
    pub fn with_store(
        gpu: G,
        converter: C,
        config: RendererConfig,
        store: SharedTextureStore,
    ) -> Result<Self, RenderError> {
        let cache = TextureCache::new(store, gpu.texture_domain())?;
        Ok(Self::with_cache(gpu, converter, config, cache))
    }

    fn with_cache(mut gpu: G, converter: C, config: RendererConfig, cache: TextureCache) -> Self {
        let brightness = config.display.brightness;
        gpu.set_brightness(brightness);
        tracing::info!(
            "Render device ready: batch {}v/{}i, filter {:?}",
            config.batch.vertex_capacity,
            config.batch.index_capacity,
            config.texture.filter
        );

        Self {
            cache,
            batch: BatchAccumulator::new(
                config.batch.vertex_capacity,
                config.batch.index_capacity,
            ),
            state: StateCoordinator::new(config.texture.filter),
            frame: FrameCoordinator::new(),
            gpu,
            converter,
            config,
            brightness,
            last_frame: FrameStats::default(),
        }
    }

    /// Create another context with the same configuration.
    ///
    /// It shares this context's texture store when `texture.shared_store` is set and `gpu` is on
    /// the same device as this context's backend. Otherwise it gets a store of its own.
    pub fn sibling(&self, gpu: G, converter: C) -> Self {
        let config = self.config.clone();
        if !config.texture.shared_store {
            return Self::new(gpu, converter, config);
        }
        if gpu.texture_domain() != self.cache.domain() {
            tracing::warn!(
                "Sibling backend cannot resolve this context's textures, not sharing the store"
            );
            return Self::new(gpu, converter, config);
        }
        let cache = match TextureCache::new(self.cache.store().clone(), gpu.texture_domain()) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!("Cannot share texture store: {}", e);
                TextureCache::local(gpu.texture_domain())
            }
        };
        Self::with_cache(gpu, converter, config, cache)
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Start a frame cleared to black, without flash.
    pub fn begin_frame(&mut self) -> Result<(), RenderError> {
        self.begin_frame_with(FrameParams::default())
    }

    /// Start a frame with an explicit clear color and flash.
    pub fn begin_frame_with(&mut self, params: FrameParams) -> Result<(), RenderError> {
        self.cache.reset_stats();
        self.state.reset_stats();
        self.frame.begin_frame(
            &params,
            &mut self.batch,
            &mut self.state,
            &mut self.cache,
            &mut self.gpu,
        )
    }

    /// Finish the scene. Draws after this are overlays: the flash does not tint them and they
    /// start from a cleared depth buffer.
    pub fn end_scene(&mut self) -> Result<bool, RenderError> {
        self.frame.end_scene(&mut self.batch, &mut self.gpu)
    }

    pub fn end_frame(&mut self, present: bool) -> Result<(), RenderError> {
        self.frame
            .end_frame(present, &mut self.batch, &mut self.cache, &mut self.gpu)?;

        self.last_frame = FrameStats {
            frame: self.frame.frame_index(),
            batch: self.batch.stats(),
            cache: self.cache.stats(),
            state: self.state.stats(),
        };
        tracing::trace!("{}", self.last_frame);
        Ok(())
    }

    pub fn clear_depth(&mut self) -> Result<(), RenderError> {
        self.frame.clear_depth(&mut self.batch, &mut self.gpu)
    }

    /// Set the viewport and projection for the following draws.
    pub fn set_view(&mut self, view: ViewState) -> Result<(), RenderError> {
        self.frame.require(FrameState::InFrame, "set_view")?;
        self.state.apply_view(view, &mut self.batch, &mut self.gpu)
    }

    /// View covering `viewport` with the configured field of view and planes.
    pub fn view_for(&self, viewport: Viewport) -> ViewState {
        ViewState {
            viewport,
            fov: self.config.view.fov,
            z_near: self.config.view.z_near,
            z_far: self.config.view.effective_z_far(),
        }
    }

    /// Queue one primitive.
    pub fn draw(&mut self, primitive: &Primitive<'_>) -> Result<(), RenderError> {
        self.frame.require(FrameState::InFrame, "draw")?;
        Pipeline {
            cache: &mut self.cache,
            batch: &mut self.batch,
            state: &mut self.state,
            gpu: &mut self.gpu,
            converter: &mut self.converter,
        }
        .submit(primitive)
    }

    /// Draw everything queued so far.
    pub fn flush(&mut self) -> Result<bool, RenderError> {
        self.frame.require(FrameState::InFrame, "flush")?;
        self.batch.flush(&mut self.gpu, FlushReason::Explicit)
    }

    // ========================================================================
    // Textures
    // ========================================================================

    /// Convert a texture ahead of its first draw. Returns `None` when precaching is disabled.
    pub fn precache_texture(
        &mut self,
        info: &TextureInfo<'_>,
        poly_flags: PolyFlags,
    ) -> Result<Option<CacheOutcome>, RenderError> {
        if !self.config.texture.precache {
            return Ok(None);
        }
        self.cache
            .ensure_cached(
                info,
                poly_flags,
                &mut self.converter,
                &mut self.batch,
                &mut self.gpu,
            )
            .map(Some)
    }

    /// Release every cached texture.
    pub fn flush_textures(&mut self) -> Result<(), RenderError> {
        self.cache.flush_all(&mut self.batch, &mut self.gpu)
    }

    /// Change output brightness. Cached textures are rebuilt on next use.
    pub fn set_brightness(&mut self, brightness: f32) -> Result<(), RenderError> {
        let brightness = brightness.clamp(0.0, 1.0);
        if brightness == self.brightness {
            return Ok(());
        }
        self.flush_textures()?;
        self.gpu.set_brightness(brightness);
        self.brightness = brightness;
        tracing::debug!("Brightness set to {}", brightness);
        Ok(())
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    // ========================================================================
    // Device lifecycle
    // ========================================================================

    /// The backend lost its device. Drops pending geometry and every cached texture; all state
    /// is resent from the next frame on.
    pub fn device_reset(&mut self) -> Result<(), RenderError> {
        self.frame.require(FrameState::Idle, "device_reset")?;
        tracing::info!("Device reset, invalidating texture cache");
        self.batch.new_frame();
        self.cache.flush_all(&mut self.batch, &mut self.gpu)?;
        self.state.mark_stale();
        self.frame.notify_device_reset();
        Ok(())
    }

    /// Resize the render target. The view is resent on next use.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.frame.require(FrameState::Idle, "resize")?;
        self.gpu.resize(width, height)?;
        self.state.invalidate_view();
        self.config.display.width = width;
        self.config.display.height = height;
        Ok(())
    }

    /// Read back the render target as RGBA8. Pending geometry is drawn first.
    pub fn read_pixels(&mut self) -> Result<Screenshot, RenderError> {
        if self.frame.in_frame() {
            self.batch.flush(&mut self.gpu, FlushReason::Explicit)?;
        }
        Ok(self.gpu.read_pixels()?)
    }

    /// Display resolutions to offer the player, smallest first.
    ///
    /// Refresh-rate duplicates collapse to one entry and only the largest
    /// [`MAX_RESOLUTIONS`] survive. A backend without a mode list reports the configured size.
    pub fn resolutions(&self) -> Vec<(u32, u32)> {
        let mut modes = self.gpu.display_modes();
        modes.retain(|&(w, h)| w > 0 && h > 0);
        if modes.is_empty() {
            modes.push((self.config.display.width, self.config.display.height));
        }
        modes.sort_unstable();
        modes.dedup();
        let skip = modes.len().saturating_sub(MAX_RESOLUTIONS);
        modes.drain(..skip);
        modes
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Counters of the last completed frame
    pub fn stats(&self) -> FrameStats {
        self.last_frame
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn frame_state(&self) -> FrameState {
        self.frame.state()
    }

    pub fn cache(&self) -> &TextureCache {
        &self.cache
    }

    pub fn state(&self) -> &StateCoordinator {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut StateCoordinator {
        &mut self.state
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    pub fn converter_mut(&mut self) -> &mut C {
        &mut self.converter
    }
}
