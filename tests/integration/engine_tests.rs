//! Viewer engine integration tests.
//!
//! Tests verify:
//! - Opening: metadata fetch, metadata from options, fatal errors
//! - Render pass: visible tiles drawn, absent tiles requested, eviction
//! - Zoom clamping and the debounced level switch
//! - Load races: completions for released slots are discarded
//! - Tile failures revert the slot and are retried on the next pass
//! - Repaint coalescing

use std::time::Duration;

use approx::assert_relative_eq;
use tokio::sync::mpsc;
use tokio::time::sleep;

use zoomify_viewer::config::{DOUBLE_TAP_ZOOM, TOOLBAR_ZOOM_STEP, ZOOM_STEP};
use zoomify_viewer::error::{LoadError, MetadataError, ViewerError};
use zoomify_viewer::render::Color;
use zoomify_viewer::{InputEvent, Point, SlotState, TileKey, Viewer, ViewerOptions};

use super::test_utils::{
    tile_url, DrawOp, MockHandles, MockTileSource, RecordingSurface, MOCK_BASE,
};

type MockViewer = Viewer<MockTileSource, RecordingSurface>;

/// 4000x3000 image on an 800x600 canvas: fits at level 2 (1000x750), scale 0.8.
async fn open_large(options: ViewerOptions, source: MockTileSource) -> (MockViewer, MockHandles) {
    let handles = source.handles();
    let viewer = Viewer::open(options, source, RecordingSurface::new(800, 600))
        .await
        .unwrap();
    (viewer, handles)
}

// =============================================================================
// Opening
// =============================================================================

#[tokio::test]
async fn test_open_fetches_metadata_and_fits() {
    let (viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;

    assert_eq!(viewer.pyramid().level_count(), 5);
    assert_eq!(viewer.level(), 2);
    assert_relative_eq!(viewer.viewport().scale, 0.8, epsilon = 1e-12);
    assert_eq!(viewer.viewport().offset, Point::new(0.0, 0.0));
    assert!(viewer.repaint_pending(), "open schedules the first repaint");
    assert!(!viewer.level_check_pending());
}

#[tokio::test]
async fn test_open_with_supplied_metadata_skips_fetch() {
    let source = MockTileSource::without_properties(256);
    let options = ViewerOptions::default().with_image_size(1000, 680, 256);
    let viewer = Viewer::open(options, source, RecordingSurface::new(800, 600))
        .await
        .unwrap();

    assert_eq!(viewer.pyramid().finest().image_width, 1000);
    assert_eq!(viewer.pyramid().level_count(), 3);
}

#[tokio::test]
async fn test_missing_metadata_is_invalid() {
    let result = Viewer::open(
        ViewerOptions::default(),
        MockTileSource::without_properties(256),
        RecordingSurface::new(800, 600),
    )
    .await;

    assert!(matches!(
        result,
        Err(ViewerError::InvalidMetadata(MetadataError::Fetch(
            LoadError::NotFound(_)
        )))
    ));
}

#[tokio::test]
async fn test_malformed_metadata_is_invalid() {
    let source = MockTileSource::with_properties(r#"<IMAGE_PROPERTIES WIDTH="4000" HEIGHT="3000" />"#);
    let result = Viewer::open(ViewerOptions::default(), source, RecordingSurface::new(800, 600)).await;
    assert!(matches!(
        result,
        Err(ViewerError::InvalidMetadata(MetadataError::MissingAttribute("TILESIZE")))
    ));

    let source =
        MockTileSource::with_properties(r#"<IMAGE_PROPERTIES WIDTH="abc" HEIGHT="3000" TILESIZE="256" />"#);
    let result = Viewer::open(ViewerOptions::default(), source, RecordingSurface::new(800, 600)).await;
    assert!(matches!(
        result,
        Err(ViewerError::InvalidMetadata(MetadataError::InvalidAttribute { name: "WIDTH", .. }))
    ));
}

#[tokio::test]
async fn test_surface_without_2d_is_rejected() {
    let source = MockTileSource::new(4000, 3000, 256);
    let handles = source.handles();
    let result = Viewer::open(
        ViewerOptions::default(),
        source,
        RecordingSurface::without_2d(800, 600),
    )
    .await;

    assert!(matches!(result, Err(ViewerError::UnsupportedSurface { .. })));
    assert!(handles.loads().is_empty());
}

#[tokio::test]
async fn test_invalid_options_rejected() {
    let options = ViewerOptions::default().with_tile_extension("");
    let result = Viewer::open(
        options,
        MockTileSource::new(4000, 3000, 256),
        RecordingSurface::new(800, 600),
    )
    .await;
    assert!(matches!(result, Err(ViewerError::InvalidOptions(_))));
}

// =============================================================================
// Render Pass
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_settle_loads_and_draws_visible_tiles() {
    let (mut viewer, handles) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;

    viewer.settle().await;

    // Level 2 is 1000x750: 4x3 tiles, all visible
    assert_eq!(handles.loads().len(), 12);
    assert_eq!(viewer.cache().resident_count(2), 12);

    let drawn = viewer.surface().drawn_urls();
    let pyramid = viewer.pyramid().clone();
    assert!(drawn.contains(&tile_url(&pyramid, 2, 0, 0)));
    assert!(drawn.contains(&tile_url(&pyramid, 2, 3, 2)));

    let stats = viewer.stats();
    assert_eq!(stats.visible.len(), 12);
    assert_eq!(stats.loading, 0);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn test_tile_urls_follow_zoomify_layout() {
    let (mut viewer, handles) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;
    viewer.settle().await;

    let loads = handles.loads();
    assert!(loads.contains(&format!("{}/TileGroup0/2-0-0.jpg", MOCK_BASE)));
    assert!(loads.contains(&format!("{}/TileGroup0/2-3-2.jpg", MOCK_BASE)));
}

#[tokio::test(start_paused = true)]
async fn test_render_clears_then_draws_tiles_in_place() {
    let (mut viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;
    viewer.settle().await;

    viewer.surface_mut().take_ops();
    let pass = viewer.render();
    assert_eq!(pass.drawn, 12);
    assert_eq!(pass.requested, 0);

    let ops = viewer.surface().ops();
    assert!(matches!(ops[0], DrawOp::Clear(_)));

    // Tile (1, 1) starts at image pixel 256 -> canvas 204.8 at scale 0.8
    let url = tile_url(viewer.pyramid(), 2, 1, 1);
    let dest = ops
        .iter()
        .find_map(|op| match op {
            DrawOp::Image { url: u, dest } if *u == url => Some(*dest),
            _ => None,
        })
        .unwrap();
    assert_relative_eq!(dest.x, 204.8, epsilon = 1e-9);
    assert_relative_eq!(dest.y, 204.8, epsilon = 1e-9);
    assert_relative_eq!(dest.width, 204.8, epsilon = 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_background_fills_instead_of_clearing() {
    let options = ViewerOptions::default().with_background(Color::BLACK);
    let (mut viewer, _) = open_large(options, MockTileSource::new(4000, 3000, 256)).await;
    viewer.render();

    assert!(matches!(
        viewer.surface().ops()[0],
        DrawOp::Fill(_, Color::BLACK)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_debug_overlay_outlines_visible_tiles() {
    let options = ViewerOptions::default().with_debug(true);
    let (mut viewer, _) = open_large(options, MockTileSource::new(4000, 3000, 256)).await;
    viewer.render();

    let strokes = viewer
        .surface()
        .ops()
        .iter()
        .filter(|op| matches!(op, DrawOp::Stroke(_)))
        .count();
    assert_eq!(strokes, 12);
}

#[tokio::test(start_paused = true)]
async fn test_thumbnail_drawn_under_tiles_and_released_on_drop() {
    let options = ViewerOptions::default().with_thumbnail(true);
    let (mut viewer, handles) = open_large(options, MockTileSource::new(4000, 3000, 256)).await;
    assert!(viewer.has_thumbnail());
    viewer.settle().await;

    viewer.surface_mut().take_ops();
    viewer.render();
    let drawn = viewer.surface().drawn_urls();
    let thumbnail = format!("{}/TileGroup0/0-0-0.jpg", MOCK_BASE);
    assert_eq!(drawn[0], thumbnail, "thumbnail is drawn first");
    assert_eq!(drawn.len(), 13);

    let released_before = handles.released();
    drop(viewer);
    // 12 resident tiles plus the thumbnail
    assert_eq!(handles.released(), released_before + 13);
}

#[tokio::test(start_paused = true)]
async fn test_thumbnail_failure_is_not_fatal() {
    let source = MockTileSource::new(4000, 3000, 256);
    source
        .handles()
        .fail_url(format!("{}/TileGroup0/0-0-0.jpg", MOCK_BASE));
    let options = ViewerOptions::default().with_thumbnail(true);
    let (viewer, _) = open_large(options, source).await;
    assert!(!viewer.has_thumbnail());
}

#[tokio::test(start_paused = true)]
async fn test_cache_tracks_visible_rectangle_after_pan() {
    let (mut viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;

    // Zoom to native resolution around the top-left corner
    for _ in 0..4 {
        viewer.zoom(2.0, Some(Point::new(0.0, 0.0)));
        viewer.flush_level_check();
    }
    assert_eq!(viewer.level(), 4);
    viewer.settle().await;

    let before = viewer.stats().visible;
    viewer.handle_event(InputEvent::Pan {
        dx: -1500.0,
        dy: -1000.0,
    });
    viewer.settle().await;

    let stats = viewer.stats();
    assert_ne!(stats.visible, before);
    for (x, y) in viewer.cache().occupied(4) {
        assert!(stats.visible.contains(x, y), "tile ({}, {}) outside view", x, y);
    }
    assert_eq!(viewer.cache().resident_count(4), stats.visible.len());
}

// =============================================================================
// Zoom and Level Switching
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_zoom_at_native_bound_triggers_nothing() {
    // 600x400 on 800x600 fits at the finest level, scale 1
    let source = MockTileSource::new(600, 400, 256);
    let mut viewer = Viewer::open(ViewerOptions::default(), source, RecordingSurface::new(800, 600))
        .await
        .unwrap();
    viewer.settle().await;
    assert_eq!(viewer.level(), viewer.pyramid().finest_level());
    assert_eq!(viewer.viewport().scale, 1.0);

    let before = *viewer.viewport();
    assert!(!viewer.zoom(1.2, None));
    assert_eq!(*viewer.viewport(), before);
    assert!(!viewer.repaint_pending());
    assert!(!viewer.level_check_pending());
}

#[tokio::test(start_paused = true)]
async fn test_zoom_keeps_anchor_point_on_screen() {
    let (mut viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;

    let anchor = Point::new(200.0, 150.0);
    let under = viewer.viewport().canvas_to_image(anchor);
    assert!(viewer.zoom(1.5, Some(anchor)));

    let after = viewer.viewport().image_to_canvas(under);
    assert_relative_eq!(after.x, anchor.x, epsilon = 1e-9);
    assert_relative_eq!(after.y, anchor.y, epsilon = 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_level_check_waits_for_quiet_window() {
    let (mut viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;
    viewer.settle().await;

    let (tx, rx) = mpsc::channel(8);
    let script = async move {
        tx.send(InputEvent::zoom(1.5)).await.unwrap();
        sleep(Duration::from_millis(150)).await;
        tx.send(InputEvent::zoom(1.1)).await.unwrap();
        sleep(Duration::from_millis(150)).await;
    };
    tokio::join!(viewer.run(rx), script);

    // 300ms after the first zoom but only 150ms after the second
    assert_eq!(viewer.level(), 2);
    assert!(viewer.level_check_pending());

    let apparent = viewer.viewport().scale * 1000.0;
    assert_relative_eq!(apparent, 1320.0, epsilon = 1e-9);

    viewer.settle().await;
    assert_eq!(viewer.level(), 3);
    assert_relative_eq!(viewer.viewport().scale, 0.66, epsilon = 1e-12);
    assert_relative_eq!(viewer.viewport().scale * 2000.0, apparent, epsilon = 1e-9);

    assert_eq!(viewer.cache().resident_count(2), 0, "old level is cleared");
    assert!(viewer.cache().resident_count(3) > 0);
}

#[tokio::test(start_paused = true)]
async fn test_level_switch_during_pinch_keeps_apparent_zoom() {
    let (mut viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;
    viewer.settle().await;

    let (tx, rx) = mpsc::channel(8);
    let script = async move {
        tx.send(InputEvent::zoom(1.5)).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        tx.send(InputEvent::PinchStart { x: 400.0, y: 300.0 })
            .await
            .unwrap();
        // The level check fires while the fingers are still down
        sleep(Duration::from_millis(250)).await;
        tx.send(InputEvent::Pinch { ratio: 1.0 }).await.unwrap();
        sleep(Duration::from_millis(10)).await;
    };
    tokio::join!(viewer.run(rx), script);

    assert_eq!(viewer.level(), 3);
    let apparent = viewer.viewport().scale * 2000.0;
    assert_relative_eq!(apparent, 1200.0, epsilon = 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_zoom_out_switches_to_coarser_level() {
    let (mut viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;

    // 0.8 -> 0.4 on level 2, then renormalized to level 1 at 0.8
    assert!(viewer.zoom_out(2.0));
    viewer.settle().await;
    assert_eq!(viewer.level(), 1);
    assert_relative_eq!(viewer.viewport().scale, 0.8, epsilon = 1e-12);
}

#[tokio::test(start_paused = true)]
async fn test_pinch_gesture_is_relative_and_checks_level_on_release() {
    let (mut viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;
    viewer.settle().await;

    viewer.handle_event(InputEvent::PinchStart { x: 400.0, y: 300.0 });
    for ratio in [1.1, 1.3, 1.5] {
        viewer.handle_event(InputEvent::Pinch { ratio });
    }
    assert_relative_eq!(viewer.viewport().scale, 1.2, epsilon = 1e-12);
    assert!(!viewer.level_check_pending());

    // Drag events during a pinch are ignored
    let offset = viewer.viewport().offset;
    viewer.handle_event(InputEvent::Drag { dx: 50.0, dy: 50.0 });
    assert_eq!(viewer.viewport().offset, offset);

    viewer.handle_event(InputEvent::Release);
    assert!(viewer.level_check_pending());

    viewer.settle().await;
    assert_eq!(viewer.level(), 3);
    assert_relative_eq!(viewer.viewport().scale, 0.6, epsilon = 1e-12);
}

#[tokio::test(start_paused = true)]
async fn test_zoom_steps() {
    let (mut viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;

    assert!(viewer.zoom_in(TOOLBAR_ZOOM_STEP));
    assert_relative_eq!(viewer.viewport().scale, 0.96, epsilon = 1e-12);
    assert!(viewer.zoom_out(TOOLBAR_ZOOM_STEP));
    assert_relative_eq!(viewer.viewport().scale, 0.8, epsilon = 1e-12);

    viewer.handle_event(InputEvent::zoom_at(DOUBLE_TAP_ZOOM, 0.0, 0.0));
    assert_relative_eq!(viewer.viewport().scale, 1.6, epsilon = 1e-12);
    assert!(viewer.zoom_in(ZOOM_STEP));
    assert_relative_eq!(viewer.viewport().scale, 1.76, epsilon = 1e-12);
    assert!(viewer.level_check_pending());
}

#[tokio::test(start_paused = true)]
async fn test_drag_uses_cumulative_delta_and_device_ratio() {
    let source = MockTileSource::new(4000, 3000, 256);
    let surface = RecordingSurface::new(800, 600).with_ratio(2.0);
    let mut viewer = Viewer::open(ViewerOptions::default(), source, surface)
        .await
        .unwrap();
    assert_eq!(viewer.viewport().device_ratio, 2.0);

    let start = viewer.viewport().offset;
    viewer.handle_event(InputEvent::DragStart { x: 100.0, y: 100.0 });
    viewer.handle_event(InputEvent::Drag { dx: 5.0, dy: 0.0 });
    viewer.handle_event(InputEvent::Drag { dx: 10.0, dy: -4.0 });
    assert_eq!(
        viewer.viewport().offset,
        Point::new(start.x + 20.0, start.y - 8.0)
    );
    viewer.handle_event(InputEvent::Release);
    assert!(viewer.viewport().offset != start);
    assert!(!viewer.level_check_pending(), "drag release does not check the level");
}

#[tokio::test(start_paused = true)]
async fn test_resize_resets_view() {
    let (mut viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;
    viewer.zoom(1.5, None);
    viewer.settle().await;

    viewer.handle_event(InputEvent::Resize {
        width: 1600,
        height: 1200,
    });
    assert_eq!(viewer.viewport().width, 1600.0);
    assert_eq!(viewer.level(), 3);
    assert_relative_eq!(viewer.viewport().scale, 0.8, epsilon = 1e-12);
    assert_eq!(viewer.cache().resident_count(3), 0, "reset drops cached tiles");
}

#[tokio::test(start_paused = true)]
async fn test_reset_requests_fitted_view_immediately() {
    let (mut viewer, handles) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;
    viewer.zoom(1.5, None);
    viewer.settle().await;

    viewer.handle_event(InputEvent::Reset);
    // Loads are in flight before any repaint has fired
    assert!(viewer.repaint_pending());
    assert_eq!(viewer.stats().visible.len(), 12);
    assert_eq!(viewer.cache().loading_count(2), 12);

    let before = handles.loads().len();
    viewer.settle().await;
    assert_eq!(handles.loads().len(), before + 12, "no second request per tile");
    assert_eq!(viewer.cache().resident_count(2), 12);
}

#[tokio::test(start_paused = true)]
async fn test_reset_returns_to_fit() {
    let (mut viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;
    viewer.zoom(1.5, Some(Point::new(10.0, 10.0)));
    viewer.settle().await;
    assert_eq!(viewer.level(), 3);

    viewer.handle_event(InputEvent::Reset);
    assert_eq!(viewer.level(), 2);
    assert_relative_eq!(viewer.viewport().scale, 0.8, epsilon = 1e-12);
    assert_eq!(viewer.cache().resident_count(3), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reload_rebuilds_pyramid() {
    let (mut viewer, handles) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;
    viewer.settle().await;
    let released = handles.released();

    viewer.reload(1000, 680, 256).await.unwrap();
    assert_eq!(viewer.pyramid().level_count(), 3);
    assert_eq!(handles.released(), released + 12);
    assert_eq!(viewer.level(), 2);

    assert!(matches!(
        viewer.reload(0, 680, 256).await,
        Err(ViewerError::InvalidMetadata(_))
    ));
    assert_eq!(viewer.pyramid().level_count(), 3, "failed reload keeps pyramid");
}

// =============================================================================
// Load Races and Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_loads_for_left_level_are_discarded() {
    let (mut viewer, handles) = open_large(
        ViewerOptions::default(),
        MockTileSource::gated(4000, 3000, 256),
    )
    .await;

    // Opening already issued the 12 loads of the fitted view
    assert_eq!(viewer.cache().loading_count(2), 12);
    assert_eq!(viewer.render().requested, 0);

    // Level changes while the 12 loads are still in flight
    viewer.zoom(1.5, None);
    assert!(viewer.flush_level_check());
    assert_eq!(viewer.level(), 3);
    assert_eq!(viewer.cache().loading_count(2), 0);

    handles.open_gate_fully();
    viewer.settle().await;

    assert_eq!(viewer.cache().resident_count(2), 0);
    assert!(viewer.cache().resident_count(3) > 0);
    // Every level-2 image was handed back on arrival
    assert!(handles.released() >= 12);
    for x in 0..4 {
        for y in 0..3 {
            assert_eq!(viewer.cache().state(TileKey::new(2, x, y)), SlotState::Absent);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_tile_is_absent_and_requested_again() {
    let source = MockTileSource::new(4000, 3000, 256);
    let handles = source.handles();
    let pyramid = zoomify_viewer::Pyramid::build(4000, 3000, 256).unwrap();
    let failing = tile_url(&pyramid, 2, 1, 1);
    handles.fail_url(failing.clone());

    let (mut viewer, _) = open_large(ViewerOptions::default(), source).await;
    viewer.settle().await;

    let key = TileKey::new(2, 1, 1);
    assert_eq!(viewer.cache().state(key), SlotState::Absent);
    assert_eq!(viewer.cache().resident_count(2), 11);
    let attempts = handles.load_count(&failing);
    assert!(attempts >= 1);

    // Other tiles still render
    let drawn = viewer.surface().drawn_urls();
    assert!(drawn.contains(&tile_url(&pyramid, 2, 0, 0)));
    assert!(!drawn.contains(&failing));

    handles.heal_url(&failing);
    viewer.handle_event(InputEvent::Pan { dx: 0.0, dy: 0.0 });
    viewer.settle().await;

    assert_eq!(handles.load_count(&failing), attempts + 1);
    assert_eq!(viewer.cache().state(key), SlotState::Resident);
    assert!(viewer.surface().drawn_urls().contains(&failing));
}

// =============================================================================
// Repaint Coalescing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_burst_of_completions_renders_once() {
    let (mut viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;

    viewer.settle().await;
    // Loads issued by the reset all land before the debounced repaint
    assert_eq!(viewer.stats().renders, 1);
}

#[tokio::test(start_paused = true)]
async fn test_frame_requests_merge_into_one_render() {
    let (mut viewer, _) = open_large(
        ViewerOptions::default(),
        MockTileSource::new(4000, 3000, 256),
    )
    .await;
    viewer.settle().await;
    let renders = viewer.stats().renders;

    for _ in 0..5 {
        viewer.handle_event(InputEvent::Pan { dx: 3.0, dy: 0.0 });
    }
    assert!(viewer.repaint_pending());
    viewer.settle().await;
    assert_eq!(viewer.stats().renders, renders + 1);
}
