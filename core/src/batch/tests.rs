//! Tests for batch accumulation

use super::*;
use crate::test_utils::RecordingGpu;
use crate::vertex::{GouraudVertex, LineVertex};

fn append_fan(batch: &mut BatchAccumulator, gpu: &mut RecordingGpu, points: u32, tag: f32) {
    let slots = batch
        .append::<GouraudVertex, _>(gpu, IndexPattern::Fan(points))
        .unwrap();
    for (i, v) in slots.iter_mut().enumerate() {
        v.pos = [tag, i as f32, 0.0];
    }
}

fn drawn_tags(gpu: &RecordingGpu) -> Vec<(f32, f32)> {
    gpu.draws()
        .iter()
        .flat_map(|draw| {
            draw.vertices_as::<GouraudVertex>()
                .into_iter()
                .map(|v| (v.pos[0], v.pos[1]))
                .collect::<Vec<_>>()
        })
        .collect()
}

#[test]
fn test_fan_indices_share_pivot() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(64, 64);
    append_fan(&mut batch, &mut gpu, 5, 0.0);
    batch.flush(&mut gpu, FlushReason::Explicit).unwrap();

    let draws = gpu.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].indices, vec![0, 1, 2, 0, 2, 3, 0, 3, 4]);
    assert_eq!(draws[0].vertex_count, 5);
}

#[test]
fn test_second_fan_offsets_indices() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(64, 64);
    append_fan(&mut batch, &mut gpu, 3, 0.0);
    append_fan(&mut batch, &mut gpu, 4, 1.0);
    batch.flush(&mut gpu, FlushReason::Explicit).unwrap();

    assert_eq!(gpu.draws()[0].indices, vec![0, 1, 2, 3, 4, 5, 3, 5, 6]);
}

#[test]
fn test_flush_empty_is_noop() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(64, 64);
    assert!(!batch.flush(&mut gpu, FlushReason::Explicit).unwrap());
    assert!(gpu.calls.is_empty());
}

#[test]
fn test_double_flush_draws_once() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(64, 64);
    append_fan(&mut batch, &mut gpu, 3, 0.0);
    assert!(batch.flush(&mut gpu, FlushReason::Explicit).unwrap());
    assert!(!batch.flush(&mut gpu, FlushReason::Explicit).unwrap());
    assert_eq!(gpu.draw_count(), 1);
}

#[test]
fn test_reset_deferred_until_next_append() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(64, 64);
    append_fan(&mut batch, &mut gpu, 4, 0.0);
    batch.flush(&mut gpu, FlushReason::Explicit).unwrap();

    // Cursors still describe the drawn generation
    assert_eq!(batch.pending().vertex_cursor, 4);
    assert!(batch.is_empty());

    append_fan(&mut batch, &mut gpu, 3, 1.0);
    assert_eq!(batch.pending().vertex_cursor, 3);
    assert_eq!(batch.pending().drawn_index_count, 0);
}

#[test]
fn test_overflow_by_one_vertex_draws_twice() {
    let mut gpu = RecordingGpu::new();
    // 4 fans of 3 = 12 vertices, one more than fits
    let mut batch = BatchAccumulator::new(11, 1000);
    for tag in 0..4 {
        append_fan(&mut batch, &mut gpu, 3, tag as f32);
    }
    batch.flush(&mut gpu, FlushReason::EndFrame).unwrap();

    let draws = gpu.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].vertex_count, 9);
    assert_eq!(draws[1].vertex_count, 3);
    assert_eq!(batch.stats().flushes_for(FlushReason::Capacity), 1);

    let mut expected = Vec::new();
    for tag in 0..4 {
        for i in 0..3 {
            expected.push((tag as f32, i as f32));
        }
    }
    assert_eq!(drawn_tags(&gpu), expected);
}

#[test]
fn test_index_capacity_also_bounds_batch() {
    let mut gpu = RecordingGpu::new();
    // Two 4-point fans need 12 indices
    let mut batch = BatchAccumulator::new(100, 10);
    append_fan(&mut batch, &mut gpu, 4, 0.0);
    append_fan(&mut batch, &mut gpu, 4, 1.0);
    assert_eq!(gpu.draw_count(), 1);
    assert_eq!(batch.pending().index_cursor, 6);
}

#[test]
fn test_oversized_primitive_is_capacity_exhaustion() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(8, 100);
    let err = batch
        .append::<GouraudVertex, _>(&mut gpu, IndexPattern::Fan(9))
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::CapacityExhaustion {
            requested_vertices: 9,
            vertex_capacity: 8,
            ..
        }
    ));
    assert!(gpu.calls.is_empty());
}

#[test]
fn test_huge_fan_is_capacity_exhaustion() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(64, 64);
    let err = batch
        .append::<GouraudVertex, _>(&mut gpu, IndexPattern::Fan(u32::MAX / 2))
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::CapacityExhaustion {
            requested_indices: u32::MAX,
            ..
        }
    ));
    assert!(gpu.calls.is_empty());
}

#[test]
fn test_exactly_full_fits() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(8, 100);
    append_fan(&mut batch, &mut gpu, 8, 0.0);
    assert_eq!(gpu.draw_count(), 0);
    assert_eq!(batch.pending().vertex_cursor, 8);
}

#[test]
fn test_layout_change_flushes() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(64, 64);
    append_fan(&mut batch, &mut gpu, 3, 0.0);
    batch
        .append::<LineVertex, _>(&mut gpu, IndexPattern::Lines(2))
        .unwrap();

    let draws = gpu.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].layout, VertexLayout::Gouraud);
    assert_eq!(batch.layout(), Some(VertexLayout::Line));
    assert_eq!(batch.pending().vertex_cursor, 2);
}

#[test]
fn test_line_indices_in_order() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(64, 64);
    batch
        .append::<LineVertex, _>(&mut gpu, IndexPattern::Lines(2))
        .unwrap();
    batch
        .append::<LineVertex, _>(&mut gpu, IndexPattern::Lines(2))
        .unwrap();
    batch.flush(&mut gpu, FlushReason::Explicit).unwrap();
    assert_eq!(gpu.draws()[0].indices, vec![0, 1, 2, 3]);
}

#[test]
fn test_list_indices_in_order() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(64, 64);
    append_fan(&mut batch, &mut gpu, 3, 0.0);
    batch
        .append::<GouraudVertex, _>(&mut gpu, IndexPattern::List(6))
        .unwrap();
    batch.flush(&mut gpu, FlushReason::Explicit).unwrap();

    let draws = gpu.draws();
    assert_eq!(draws[0].indices, vec![0, 1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(draws[0].vertex_count, 9);
}

#[test]
fn test_list_must_match_topology() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(64, 64);
    assert!(matches!(
        batch.append::<GouraudVertex, _>(&mut gpu, IndexPattern::List(0)),
        Err(RenderError::InvalidPrimitive(_))
    ));
    assert!(matches!(
        batch.append::<GouraudVertex, _>(&mut gpu, IndexPattern::List(4)),
        Err(RenderError::InvalidPrimitive(_))
    ));
    assert!(matches!(
        batch.append::<LineVertex, _>(&mut gpu, IndexPattern::List(3)),
        Err(RenderError::InvalidPrimitive(_))
    ));
    assert!(
        batch
            .append::<LineVertex, _>(&mut gpu, IndexPattern::List(4))
            .is_ok()
    );
}

#[test]
fn test_degenerate_patterns_rejected() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(64, 64);
    assert!(matches!(
        batch.append::<GouraudVertex, _>(&mut gpu, IndexPattern::Fan(2)),
        Err(RenderError::InvalidPrimitive(_))
    ));
    assert!(matches!(
        batch.append::<LineVertex, _>(&mut gpu, IndexPattern::Lines(3)),
        Err(RenderError::InvalidPrimitive(_))
    ));
}

#[test]
fn test_new_frame_discards_and_resets_stats() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(64, 64);
    append_fan(&mut batch, &mut gpu, 3, 0.0);
    batch.flush(&mut gpu, FlushReason::Explicit).unwrap();
    append_fan(&mut batch, &mut gpu, 3, 1.0);

    batch.new_frame();
    assert!(batch.is_empty());
    assert_eq!(batch.stats().draw_calls, 0);
    assert!(!batch.flush(&mut gpu, FlushReason::EndFrame).unwrap());
}

#[test]
fn test_slots_are_zeroed() {
    let mut gpu = RecordingGpu::new();
    let mut batch = BatchAccumulator::new(4, 64);
    append_fan(&mut batch, &mut gpu, 4, 7.0);
    batch.flush(&mut gpu, FlushReason::Explicit).unwrap();

    let slots = batch
        .append::<GouraudVertex, _>(&mut gpu, IndexPattern::Quad)
        .unwrap();
    assert!(slots.iter().all(|v| *v == GouraudVertex::default()));
}
