//! Integration tests for the rendering context
//!
//! Drives whole frames through the cache, batch, state and frame coordinators against a
//! recording backend.

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3, Vec4};

    use crate::batch::{BatchAccumulator, FlushReason, IndexPattern};
    use crate::config::RendererConfig;
    use crate::converter::TextureInfo;
    use crate::device::RenderDevice;
    use crate::error::RenderError;
    use crate::flags::PolyFlags;
    use crate::frame::{FrameCoordinator, FrameState};
    use crate::gpu::{
        BlendMode, Flash, FrameParams, GpuBackend, GpuTexture, ViewState, Viewport,
    };
    use crate::primitive::{GouraudPoint, GouraudPolygon, Primitive, Tile};
    use crate::state::{FilterOverride, StateCoordinator};
    use crate::test_utils::{FakeConverter, GpuCall, RecordingGpu, texture_info};
    use crate::texture_cache::{CacheOutcome, TextureCache, TexturePass};
    use crate::vertex::GouraudVertex;

    use std::rc::Rc;

    type TestDevice = RenderDevice<RecordingGpu, FakeConverter>;

    fn device() -> TestDevice {
        device_with(RendererConfig::default())
    }

    fn device_with(config: RendererConfig) -> TestDevice {
        RenderDevice::new(RecordingGpu::new(), FakeConverter::new(), config)
    }

    fn tile<'a>(texture: &'a TextureInfo<'a>, flags: PolyFlags) -> Primitive<'a> {
        Primitive::Tile(Tile {
            texture,
            rect: Vec4::new(0.0, 0.0, 16.0, 16.0),
            uv_rect: Vec4::new(0.0, 0.0, 64.0, 64.0),
            z: 0.0,
            color: Vec3::ONE,
            flags,
        })
    }

    fn fan_points(count: usize) -> Vec<GouraudPoint> {
        (0..count)
            .map(|i| GouraudPoint {
                pos: Vec3::new(i as f32, 0.0, 1.0),
                uv: Vec2::ZERO,
                light: Vec3::ONE,
                fog: Vec4::ZERO,
            })
            .collect()
    }

    fn fan(points: &[GouraudPoint]) -> Primitive<'_> {
        Primitive::GouraudPolygon(GouraudPolygon {
            texture: None,
            points,
            flags: PolyFlags::empty(),
        })
    }

    fn view(width: f32) -> ViewState {
        ViewState {
            viewport: Viewport {
                x: 0.0,
                y: 0.0,
                width,
                height: 480.0,
            },
            fov: 90.0,
            z_near: 0.5,
            z_far: 32760.0,
        }
    }

    // ============================================================================
    // Component Pipeline
    // ============================================================================

    /// A state change flushes pending geometry under the texture it was queued with; a later
    /// bind on an empty batch flushes nothing.
    #[test]
    fn test_state_change_splits_batch_at_texture_boundary() {
        let mut gpu = RecordingGpu::new();
        let mut converter = FakeConverter::new();
        let mut cache = TextureCache::local(gpu.texture_domain());
        let mut batch = BatchAccumulator::new(64, 64);
        let mut state = StateCoordinator::new(FilterOverride::Auto);
        let mut frame = FrameCoordinator::new();

        for id in [5, 7] {
            let outcome = cache
                .ensure_cached(
                    &texture_info(id),
                    PolyFlags::empty(),
                    &mut converter,
                    &mut batch,
                    &mut gpu,
                )
                .unwrap();
            assert_eq!(outcome, CacheOutcome::Created);
        }
        let handle_5 = GpuTexture(1);
        let handle_7 = GpuTexture(2);

        frame
            .begin_frame(
                &FrameParams::default(),
                &mut batch,
                &mut state,
                &mut cache,
                &mut gpu,
            )
            .unwrap();

        cache
            .bind(5, TexturePass::Diffuse, None, &mut batch, &mut gpu)
            .unwrap();
        batch
            .append::<GouraudVertex, _>(&mut gpu, IndexPattern::Fan(4))
            .unwrap();

        state
            .apply(PolyFlags::TRANSLUCENT, &mut batch, &mut gpu)
            .unwrap();
        assert_eq!(gpu.draw_count(), 1);

        cache
            .bind(7, TexturePass::Diffuse, None, &mut batch, &mut gpu)
            .unwrap();
        assert_eq!(gpu.draw_count(), 1);
        assert_eq!(batch.stats().flushes_for(FlushReason::Texture), 0);

        batch
            .append::<GouraudVertex, _>(&mut gpu, IndexPattern::Fan(3))
            .unwrap();
        frame
            .end_frame(false, &mut batch, &mut cache, &mut gpu)
            .unwrap();

        let draws = gpu.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(draws[0].diffuse, Some(handle_5));
        assert_eq!(draws[1].indices, vec![0, 1, 2]);
        assert_eq!(draws[1].diffuse, Some(handle_7));
        assert_eq!(draws[1].blend, BlendMode::Translucent);
    }

    // ============================================================================
    // Batching
    // ============================================================================

    #[test]
    fn test_overflow_by_one_vertex_flushes_then_appends() {
        let mut config = RendererConfig::default();
        config.batch.vertex_capacity = 6;
        config.batch.index_capacity = 12;
        let mut device = device_with(config);
        let quad = fan_points(4);
        let triangle = fan_points(3);

        device.begin_frame().unwrap();
        device.draw(&fan(&quad)).unwrap();
        device.draw(&fan(&triangle)).unwrap();
        device.end_frame(false).unwrap();

        let draws = device.gpu().draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].vertex_count, 4);
        assert_eq!(draws[1].vertex_count, 3);
        assert_eq!(draws[1].indices, vec![0, 1, 2]);

        let stats = device.stats();
        assert_eq!(stats.batch.flushes_for(FlushReason::Capacity), 1);
        assert_eq!(stats.batch.flushes_for(FlushReason::EndFrame), 1);
        assert_eq!(stats.draw_calls(), 2);
    }

    #[test]
    fn test_primitive_larger_than_batch_is_rejected() {
        let mut config = RendererConfig::default();
        config.batch.vertex_capacity = 6;
        config.batch.index_capacity = 12;
        let mut device = device_with(config);
        let points = fan_points(7);

        device.begin_frame().unwrap();
        let err = device.draw(&fan(&points)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::CapacityExhaustion {
                requested_vertices: 7,
                vertex_capacity: 6,
                ..
            }
        ));
    }

    #[test]
    fn test_repeated_state_emits_once() {
        let mut device = device();
        let texture = texture_info(5);

        device.begin_frame().unwrap();
        for _ in 0..10 {
            device.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        }
        device.end_frame(true).unwrap();

        let gpu = device.gpu();
        assert_eq!(gpu.draw_count(), 1);
        assert_eq!(gpu.state_calls(), 3);
        assert_eq!(gpu.binds(), 1);
        assert_eq!(gpu.count(|c| *c == GpuCall::Present), 1);
        assert_eq!(device.stats().cache.redundant_binds, 9);
    }

    // ============================================================================
    // Frame Ordering
    // ============================================================================

    #[test]
    fn test_ordering_violations() {
        let mut device = device();
        let points = fan_points(3);

        assert!(matches!(
            device.draw(&fan(&points)),
            Err(RenderError::OrderingViolation {
                operation: "draw",
                state: FrameState::Idle
            })
        ));
        assert!(device.end_frame(false).is_err());
        assert!(device.clear_depth().is_err());
        assert!(matches!(
            device.set_view(view(640.0)),
            Err(RenderError::OrderingViolation {
                operation: "set_view",
                state: FrameState::Idle
            })
        ));
        assert!(matches!(
            device.flush(),
            Err(RenderError::OrderingViolation {
                operation: "flush",
                state: FrameState::Idle
            })
        ));
        assert!(device.end_scene().is_err());
        assert_eq!(device.gpu().count(|c| matches!(c, GpuCall::SetView(_))), 0);
        assert_eq!(device.gpu().draw_count(), 0);

        device.begin_frame().unwrap();
        assert!(matches!(
            device.begin_frame(),
            Err(RenderError::OrderingViolation {
                state: FrameState::InFrame,
                ..
            })
        ));
        assert!(device.device_reset().is_err());
        assert!(device.resize(8, 8).is_err());
        device.end_frame(false).unwrap();
        assert_eq!(device.frame_state(), FrameState::Idle);
    }

    #[test]
    fn test_depth_clear_splits_batch() {
        let mut device = device();
        let points = fan_points(3);

        device.begin_frame().unwrap();
        device.draw(&fan(&points)).unwrap();
        device.clear_depth().unwrap();
        device.draw(&fan(&points)).unwrap();
        device.end_frame(false).unwrap();

        let calls = &device.gpu().calls;
        let clear = calls.iter().position(|c| *c == GpuCall::ClearDepth).unwrap();
        let draws: Vec<_> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, GpuCall::Draw(_)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(draws.len(), 2);
        assert!(draws[0] < clear && clear < draws[1]);
    }

    // ============================================================================
    // Texture Lifetime
    // ============================================================================

    #[test]
    fn test_flush_textures_forces_reconversion() {
        let mut device = device();
        let texture = texture_info(5);

        device.begin_frame().unwrap();
        device.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        device.end_frame(false).unwrap();

        device.exec("flush").unwrap();
        assert_eq!(device.gpu().live_textures(), 0);

        device.begin_frame().unwrap();
        device.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        device.end_frame(false).unwrap();

        assert_eq!(device.converter().conversions_of(5), 2);
        let draws = device.gpu().draws();
        assert_eq!(draws[1].diffuse, Some(GpuTexture(2)));
    }

    #[test]
    fn test_masked_request_recreates_texture() {
        let mut device = device();
        let texture = texture_info(5);

        device.begin_frame().unwrap();
        device.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        device.draw(&tile(&texture, PolyFlags::MASKED)).unwrap();
        device.draw(&tile(&texture, PolyFlags::MASKED)).unwrap();
        device.end_frame(false).unwrap();

        assert_eq!(device.converter().conversions_of(5), 2);
        assert!(device.cache().metadata(5).unwrap().masked);
        let draws = device.gpu().draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[1].blend, BlendMode::Masked);
        assert_eq!(draws[1].diffuse, Some(GpuTexture(2)));
    }

    #[test]
    fn test_precache_outside_frame() {
        let mut device = device();
        let texture = texture_info(5);

        let outcome = device
            .precache_texture(&texture, PolyFlags::empty())
            .unwrap();
        assert_eq!(outcome, Some(CacheOutcome::Created));
        assert_eq!(device.gpu().draw_count(), 0);

        device.begin_frame().unwrap();
        device.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        device.end_frame(false).unwrap();
        assert_eq!(device.converter().conversions_of(5), 1);
    }

    #[test]
    fn test_precache_disabled() {
        let mut config = RendererConfig::default();
        config.texture.precache = false;
        let mut device = device_with(config);

        let outcome = device
            .precache_texture(&texture_info(5), PolyFlags::empty())
            .unwrap();
        assert_eq!(outcome, None);
        assert!(device.converter().converted.is_empty());
    }

    #[test]
    fn test_device_reset_resends_everything() {
        let mut device = device();
        let texture = texture_info(5);

        device.begin_frame().unwrap();
        device.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        device.end_frame(false).unwrap();

        device.device_reset().unwrap();
        assert_eq!(device.gpu().live_textures(), 0);
        device.gpu_mut().clear();

        device.begin_frame().unwrap();
        device.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        device.end_frame(false).unwrap();

        let gpu = device.gpu();
        assert_eq!(gpu.state_calls(), 3);
        assert!(
            gpu.calls
                .contains(&GpuCall::BindTexture(TexturePass::Diffuse, Some(GpuTexture(2))))
        );
        assert_eq!(device.converter().conversions_of(5), 2);
    }

    #[test]
    fn test_shared_store_between_contexts() {
        let mut first = device();
        let mut second = first.sibling(first.gpu().on_same_device(), FakeConverter::new());
        let texture = texture_info(5);
        assert!(Rc::ptr_eq(first.cache().store(), second.cache().store()));

        first
            .precache_texture(&texture, PolyFlags::empty())
            .unwrap();

        second.begin_frame().unwrap();
        second.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        second.end_frame(false).unwrap();
        assert_eq!(second.converter().conversions_of(5), 0);
        assert_eq!(second.gpu().draws()[0].diffuse, Some(GpuTexture(1)));

        // Releasing in one context invalidates the other's binding
        first.flush_textures().unwrap();

        second.begin_frame().unwrap();
        second.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        second.end_frame(false).unwrap();
        assert_eq!(second.converter().conversions_of(5), 1);
        assert_eq!(second.gpu().draws()[1].diffuse, Some(GpuTexture(2)));
    }

    /// Backends on different devices number their textures independently, so a sibling on
    /// another device must not see the first context's handles.
    #[test]
    fn test_sibling_on_other_device_gets_own_store() {
        let mut first = device();
        let mut second = first.sibling(RecordingGpu::new(), FakeConverter::new());
        let texture = texture_info(5);
        assert!(!Rc::ptr_eq(first.cache().store(), second.cache().store()));

        first
            .precache_texture(&texture, PolyFlags::empty())
            .unwrap();
        second.begin_frame().unwrap();
        second.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        second.end_frame(false).unwrap();
        assert_eq!(second.converter().conversions_of(5), 1);
        // Both backends issued handle 1; each draw names its own backend's texture
        assert_eq!(second.gpu().draws()[0].diffuse, Some(GpuTexture(1)));
        assert!(second.gpu().is_live(GpuTexture(1)));

        first.flush_textures().unwrap();
        assert!(!first.gpu().is_live(GpuTexture(1)));
        assert!(second.gpu().is_live(GpuTexture(1)));
        assert!(second.cache().store().borrow().contains(5));
    }

    #[test]
    fn test_store_rejects_backend_from_other_device() {
        let first = device();
        let result = TestDevice::with_store(
            RecordingGpu::new(),
            FakeConverter::new(),
            RendererConfig::default(),
            first.cache().store().clone(),
        );
        assert!(matches!(
            result,
            Err(RenderError::TextureDomainMismatch { .. })
        ));
    }

    #[test]
    fn test_shared_store_renders_one_frame_at_a_time() {
        let mut first = device();
        let mut second = first.sibling(first.gpu().on_same_device(), FakeConverter::new());
        let texture = texture_info(5);

        first.begin_frame().unwrap();
        assert!(matches!(
            second.begin_frame(),
            Err(RenderError::StoreInUse {
                operation: "begin_frame"
            })
        ));
        assert_eq!(second.frame_state(), FrameState::Idle);
        assert!(matches!(
            second.precache_texture(&texture, PolyFlags::empty()),
            Err(RenderError::StoreInUse { .. })
        ));
        assert!(matches!(
            second.flush_textures(),
            Err(RenderError::StoreInUse { .. })
        ));
        first.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        first.end_frame(false).unwrap();

        second.begin_frame().unwrap();
        second.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        second.end_frame(false).unwrap();
        assert_eq!(second.converter().conversions_of(5), 0);
    }

    #[test]
    fn test_dropping_context_in_frame_releases_store() {
        let mut first = device();
        let mut second = first.sibling(first.gpu().on_same_device(), FakeConverter::new());
        first.begin_frame().unwrap();
        drop(first);
        second.begin_frame().unwrap();
        second.end_frame(false).unwrap();
    }

    #[test]
    fn test_unshared_sibling_has_own_store() {
        let mut config = RendererConfig::default();
        config.texture.shared_store = false;
        let mut first = device_with(config);
        let mut second = first.sibling(RecordingGpu::new(), FakeConverter::new());
        let texture = texture_info(5);

        first
            .precache_texture(&texture, PolyFlags::empty())
            .unwrap();
        second
            .precache_texture(&texture, PolyFlags::empty())
            .unwrap();
        assert_eq!(second.converter().conversions_of(5), 1);
    }

    // ============================================================================
    // View and Lifecycle
    // ============================================================================

    #[test]
    fn test_view_resent_after_resize() {
        let mut device = device();

        device.begin_frame().unwrap();
        device.set_view(view(640.0)).unwrap();
        device.set_view(view(640.0)).unwrap();
        device.end_frame(false).unwrap();
        assert_eq!(device.gpu().count(|c| matches!(c, GpuCall::SetView(_))), 1);

        device.resize(800, 600).unwrap();
        assert_eq!(device.config().display.width, 800);

        device.begin_frame().unwrap();
        device.set_view(view(640.0)).unwrap();
        device.end_frame(false).unwrap();
        assert_eq!(device.gpu().count(|c| matches!(c, GpuCall::SetView(_))), 2);
        assert_eq!(device.gpu().size, (800, 600));
    }

    #[test]
    fn test_read_pixels_flushes_pending_geometry() {
        let mut device = device();
        let points = fan_points(3);

        device.begin_frame().unwrap();
        device.draw(&fan(&points)).unwrap();
        let shot = device.read_pixels().unwrap();
        assert_eq!(device.gpu().draw_count(), 1);
        assert_eq!((shot.width, shot.height), (4, 2));
        assert_eq!(shot.pixels.len(), 4 * 2 * 4);
        device.end_frame(false).unwrap();
        assert_eq!(device.gpu().draw_count(), 1);
    }

    // ============================================================================
    // Commands
    // ============================================================================

    #[test]
    fn test_brightness_command_flushes_cache() {
        let mut device = device();
        device
            .precache_texture(&texture_info(5), PolyFlags::empty())
            .unwrap();

        let reply = device.exec("brightness 0.8").unwrap();
        assert_eq!(reply.as_deref(), Some("brightness 0.80"));
        assert_eq!(device.gpu().live_textures(), 0);
        assert!(device.gpu().calls.contains(&GpuCall::SetBrightness(0.8)));

        // Same value again changes nothing
        device.gpu_mut().clear();
        device.exec("brightness 0.8").unwrap();
        assert!(device.gpu().calls.is_empty());
    }

    #[test]
    fn test_filter_command_changes_emitted_filter() {
        let mut device = device();
        let texture = texture_info(5);

        assert_eq!(device.exec("filter nearest").unwrap().as_deref(), Some("filter nearest"));
        device.begin_frame().unwrap();
        device.draw(&tile(&texture, PolyFlags::empty())).unwrap();
        device.end_frame(false).unwrap();

        assert!(
            device
                .gpu()
                .calls
                .contains(&GpuCall::SetFilter(crate::gpu::TextureFilter::Nearest))
        );
        assert_eq!(device.exec("filter").unwrap().as_deref(), Some("filter nearest"));
    }

    #[test]
    fn test_stats_and_unknown_commands() {
        let mut device = device();
        let points = fan_points(3);
        device.begin_frame().unwrap();
        device.draw(&fan(&points)).unwrap();
        device.end_frame(false).unwrap();

        let stats = device.exec("stats").unwrap().unwrap();
        assert!(stats.contains("1 draws"));
        assert!(stats.contains("end-frame=1"));
        assert_eq!(device.exec("wireframe on").unwrap(), None);
    }

    #[test]
    fn test_getres_lists_largest_modes_ascending() {
        let mut device = device();
        let mut modes: Vec<(u32, u32)> = (1..=20).map(|i| (i * 100, i * 75)).collect();
        // Refresh-rate variants report the same size twice
        modes.push((2000, 1500));
        modes.push((0, 0));
        modes.reverse();
        device.gpu_mut().modes = modes;

        let reply = device.exec("getres").unwrap().unwrap();
        let listed: Vec<&str> = reply.split(' ').collect();
        assert_eq!(listed.len(), 16);
        assert_eq!(listed[0], "500x375");
        assert_eq!(listed[15], "2000x1500");
    }

    #[test]
    fn test_getres_without_mode_list_reports_configured_size() {
        let mut device = device();
        assert_eq!(device.exec("getres").unwrap().unwrap(), "1024x768");
    }

    // ============================================================================
    // Scene and Overlay
    // ============================================================================

    /// Scene geometry is drawn before the flash is applied; overlay geometry after it.
    #[test]
    fn test_end_scene_separates_scene_from_overlay() {
        let mut device = device();
        let points = fan_points(3);
        let params = FrameParams {
            clear_color: Vec4::new(0.1, 0.2, 0.3, 1.0),
            flash: Flash {
                scale: Vec3::splat(0.25),
                fog: Vec3::new(0.5, 0.0, 0.0),
            },
        };

        device.begin_frame_with(params).unwrap();
        device.draw(&fan(&points)).unwrap();
        assert!(device.end_scene().unwrap());
        assert!(!device.end_scene().unwrap());
        device.draw(&fan(&points)).unwrap();
        device.end_frame(false).unwrap();

        let calls = &device.gpu().calls;
        assert!(calls.contains(&GpuCall::BeginFrame(params)));
        let scene_end = calls
            .iter()
            .position(|c| *c == GpuCall::EndScene)
            .unwrap();
        let draws: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, GpuCall::Draw(_)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(draws.len(), 2);
        assert!(draws[0] < scene_end && scene_end < draws[1]);
        assert_eq!(device.gpu().count(|c| *c == GpuCall::EndScene), 1);
        assert_eq!(device.stats().batch.flushes_for(FlushReason::EndScene), 1);

        // The next frame starts a new scene
        device.begin_frame().unwrap();
        assert!(device.end_scene().unwrap());
        device.end_frame(false).unwrap();
    }
}
