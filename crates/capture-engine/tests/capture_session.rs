mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use glimpse_capture_engine::{CaptureEvent, CaptureRequest, CaptureSessionManager};
use glimpse_common::error::GlimpseError;
use glimpse_platform_core::NullPreview;
use support::{CountingPreview, FakeDisplayMedia, FakeHost, SCREEN};

struct Setup {
    host: Arc<FakeHost>,
    media: Arc<FakeDisplayMedia>,
    preview: Arc<CountingPreview>,
    manager: CaptureSessionManager,
}

fn setup() -> Setup {
    let host = FakeHost::new();
    let media = FakeDisplayMedia::new(host.clone());
    let preview = Arc::new(CountingPreview::default());
    let manager = CaptureSessionManager::new(host.clone(), media.clone(), preview.clone());
    Setup {
        host,
        media,
        preview,
        manager,
    }
}

#[tokio::test]
async fn start_resolves_the_selected_source_and_attaches_preview() {
    let mut s = setup();
    let stream = s
        .manager
        .start_capture(CaptureRequest::source(SCREEN))
        .await
        .unwrap();

    assert_eq!(s.host.selection.current().as_deref(), Some(SCREEN));
    assert_eq!(stream.video_track().unwrap().label(), "Built-in display");
    assert!(s.manager.is_capturing());
    assert_eq!(s.preview.attached.load(Ordering::SeqCst), 1);
    assert_eq!(s.media.requested.lock()[0].frame_rate, Some(60.0));
}

#[tokio::test]
async fn unknown_source_is_denied() {
    let mut s = setup();
    let err = s
        .manager
        .start_capture(CaptureRequest::source("window:7:0"))
        .await
        .unwrap_err();

    assert!(matches!(err, GlimpseError::CaptureDenied { .. }));
    assert!(!s.manager.is_capturing());
    assert_eq!(s.preview.attached.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn unanswered_picker_times_out_as_denied() {
    let s = setup();
    s.media.hang.store(true, Ordering::SeqCst);
    let mut manager = s.manager.with_picker_timeout(Duration::from_secs(5));

    let err = manager
        .start_capture(CaptureRequest::source(SCREEN))
        .await
        .unwrap_err();
    assert!(err.is_user_cancelled());
    assert!(!manager.is_capturing());
}

#[tokio::test]
async fn stop_is_idempotent_and_detaches_preview() {
    let mut s = setup();
    let stream = s
        .manager
        .start_capture(CaptureRequest::source(SCREEN))
        .await
        .unwrap();

    s.manager.stop_capture();
    s.manager.stop_capture();

    assert!(!stream.is_active());
    assert!(!s.manager.is_capturing());
    assert_eq!(s.preview.detached.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn new_capture_supersedes_the_live_one() {
    let mut s = setup();
    let first = s
        .manager
        .start_capture(CaptureRequest::source(SCREEN))
        .await
        .unwrap();
    let second = s
        .manager
        .start_capture(CaptureRequest::source("window:42:0"))
        .await
        .unwrap();

    assert!(!first.is_active());
    assert!(second.is_active());
    assert_eq!(s.manager.stream().unwrap().id(), second.id());
    assert_eq!(s.preview.attached.load(Ordering::SeqCst), 2);
    assert_eq!(s.preview.detached.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn changing_the_selection_leaves_the_live_session_alone() {
    let mut s = setup();
    let stream = s
        .manager
        .start_capture(CaptureRequest::source(SCREEN))
        .await
        .unwrap();

    s.host.selection.set("window:42:0");

    assert!(stream.is_active());
    assert_eq!(stream.video_track().unwrap().label(), "Built-in display");
}

#[tokio::test]
async fn invalid_frame_rates_fall_back_to_sixty() {
    let mut s = setup();
    assert_eq!(s.manager.set_frame_rate(Some(0.0)), 60.0);
    assert_eq!(s.manager.set_frame_rate(None), 60.0);
    assert_eq!(s.manager.set_frame_rate(Some(-5.0)), 60.0);
    assert_eq!(s.manager.set_frame_rate(Some(24.0)), 24.0);

    s.manager
        .start_capture(CaptureRequest::source(SCREEN))
        .await
        .unwrap();
    assert_eq!(s.media.requested.lock()[0].frame_rate, Some(24.0));
}

#[tokio::test]
async fn frame_rate_is_applied_to_the_live_track() {
    let mut s = setup();
    let mut events = s.manager.subscribe();
    let stream = s
        .manager
        .start_capture(CaptureRequest::source(SCREEN))
        .await
        .unwrap();

    s.manager.set_frame_rate(Some(15.0));

    let source = s.media.last_source().unwrap();
    assert_eq!(source.applied.lock().as_slice(), [15.0]);
    assert_eq!(stream.video_track().unwrap().settings().frame_rate, 15.0);

    assert!(matches!(events.try_recv(), Ok(CaptureEvent::Started { .. })));
    assert_eq!(
        events.try_recv().unwrap(),
        CaptureEvent::FrameRateChanged {
            fps: 15.0,
            applied_live: true
        }
    );
}

#[tokio::test]
async fn rejected_live_frame_rate_still_updates_the_target() {
    let mut s = setup();
    s.media.reject_constraints.store(true, Ordering::SeqCst);
    let stream = s
        .manager
        .start_capture(CaptureRequest::source(SCREEN))
        .await
        .unwrap();
    let mut events = s.manager.subscribe();

    assert_eq!(s.manager.set_frame_rate(Some(30.0)), 30.0);
    assert_eq!(s.manager.frame_rate(), 30.0);
    assert_eq!(stream.video_track().unwrap().settings().frame_rate, 60.0);
    assert_eq!(
        events.try_recv().unwrap(),
        CaptureEvent::FrameRateChanged {
            fps: 30.0,
            applied_live: false
        }
    );

    s.manager.stop_capture();
    s.media.reject_constraints.store(false, Ordering::SeqCst);
    s.manager
        .start_capture(CaptureRequest::source(SCREEN))
        .await
        .unwrap();
    assert_eq!(s.media.requested.lock().last().unwrap().frame_rate, Some(30.0));
}

#[tokio::test]
async fn request_frame_rate_replaces_the_target() {
    let mut s = setup();
    s.manager
        .start_capture(CaptureRequest {
            source_id: Some(SCREEN.into()),
            frame_rate: Some(0.0),
        })
        .await
        .unwrap();
    assert_eq!(s.manager.frame_rate(), 60.0);

    s.manager
        .start_capture(CaptureRequest {
            source_id: None,
            frame_rate: Some(12.0),
        })
        .await
        .unwrap();
    assert_eq!(s.manager.frame_rate(), 12.0);
    assert_eq!(s.host.selection.current().as_deref(), Some(SCREEN));
}

#[tokio::test]
async fn capture_runs_without_a_preview_surface() {
    let host = FakeHost::new();
    let media = FakeDisplayMedia::new(host.clone());
    let mut manager = CaptureSessionManager::new(host, media.clone(), Arc::new(NullPreview));

    manager
        .start_capture(CaptureRequest::source(SCREEN))
        .await
        .unwrap();
    assert!(manager.is_capturing());

    manager.stop_capture();
    assert!(!manager.is_capturing());
    assert!(media.last_source().unwrap().stopped.load(Ordering::SeqCst));
}
