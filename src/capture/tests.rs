use super::*;
use crate::camera::{MockCameraHardware, SessionController, SessionState};
use crate::config::CaptureConfig;
use crate::error::{CameraError, CaptureError};
use crate::events::{CameraEvent, EventBus, EventFilter, EventReceiver};
use crate::surface::SurfaceTarget;
use bytes::Bytes;
use chrono::{Local, TimeZone, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

fn create_test_frame(data: &'static [u8]) -> CapturedFrame {
    CapturedFrame {
        request_id: Uuid::new_v4(),
        captured_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap(),
        data: Bytes::from_static(data),
    }
}

fn location_path(location: &str) -> PathBuf {
    PathBuf::from(location.strip_prefix("file://").unwrap())
}

/// Controller already previewing, with events drained
async fn previewing_controller(
    sink: Arc<dyn ImageSink>,
) -> (SessionController, MockCameraHardware, EventReceiver) {
    let hardware = MockCameraHardware::new();
    let bus = EventBus::new(32);
    let mut events = bus.subscribe_filtered(EventFilter::All, "capture-test");

    let controller = SessionController::builder()
        .hardware(Arc::new(hardware.clone()))
        .events(Arc::new(bus))
        .image_sink(sink)
        .build()
        .unwrap();

    controller
        .surface()
        .on_available(SurfaceTarget::new(1), 1920, 1080);
    assert!(controller.wait_for_state(SessionState::PreviewActive).await);
    controller.flush().await;
    events.drain();

    (controller, hardware, events)
}

#[tokio::test]
async fn test_file_sink_names_and_writes_capture() {
    let dir = tempfile::tempdir().unwrap();
    let sink = FileImageSink::new(dir.path().join("stills"), "IMG_");
    let frame = create_test_frame(b"\xFF\xD8jpeg\xFF\xD9");

    let location = sink.persist(&frame).await.unwrap();
    assert!(location.starts_with("file://"));

    let path = location_path(&location);
    let expected = format!(
        "IMG_{}.jpg",
        frame
            .captured_at
            .with_timezone(&Local)
            .format("%Y%m%d_%H%M%S")
    );
    assert_eq!(path.file_name().unwrap().to_string_lossy(), expected);
    assert_eq!(std::fs::read(&path).unwrap(), frame.data.to_vec());
}

#[tokio::test]
async fn test_file_sink_suffixes_same_second_captures() {
    let dir = tempfile::tempdir().unwrap();
    let sink = FileImageSink::new(dir.path(), "IMG_");
    let frame = create_test_frame(b"\xFF\xD8a\xFF\xD9");

    let first = location_path(&sink.persist(&frame).await.unwrap());
    let second = location_path(&sink.persist(&frame).await.unwrap());
    let third = location_path(&sink.persist(&frame).await.unwrap());

    assert_ne!(first, second);
    let second_name = second.file_stem().unwrap().to_string_lossy().to_string();
    let third_name = third.file_stem().unwrap().to_string_lossy().to_string();
    assert!(second_name.ends_with("_1"));
    assert!(third_name.ends_with("_2"));
}

#[tokio::test]
async fn test_file_sink_rejects_empty_image() {
    let dir = tempfile::tempdir().unwrap();
    let sink = FileImageSink::new(dir.path(), "IMG_");

    let result = sink.persist(&create_test_frame(b"")).await;
    assert!(matches!(result, Err(CameraError::SinkFailure { .. })));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_file_sink_from_config() {
    let config = CaptureConfig {
        path: "/tmp/previewcam-captures".to_string(),
        file_prefix: "SNAP_".to_string(),
    };
    let sink = FileImageSink::from_config(&config);
    assert_eq!(sink.directory(), PathBuf::from("/tmp/previewcam-captures").as_path());
}

#[tokio::test]
async fn test_memory_sink_failure_and_recovery() {
    let sink = MemoryImageSink::new();
    let frame = create_test_frame(b"\xFF\xD8\xFF\xD9");

    sink.fail_with("disk full");
    assert!(matches!(
        sink.persist(&frame).await,
        Err(CameraError::SinkFailure { .. })
    ));
    assert!(sink.is_empty());

    sink.recover();
    let location = sink.persist(&frame).await.unwrap();
    assert_eq!(location, format!("memory://{}", frame.request_id));
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn test_coordinator_tracks_outcomes() {
    let sink = MemoryImageSink::new();
    let mut coordinator = CaptureCoordinator::new(Arc::new(sink.clone()));

    let request = coordinator.begin();
    assert_eq!(coordinator.in_flight().map(|r| r.id), Some(request.id));

    let frame = CapturedFrame {
        request_id: request.id,
        captured_at: Utc::now(),
        data: Bytes::from_static(b"\xFF\xD8\xFF\xD9"),
    };
    let outcome = coordinator.deliver(frame).await;
    assert_eq!(outcome.as_ref().unwrap().size_bytes, 4);
    coordinator.finish(&request, &outcome);

    let failed = coordinator.begin();
    coordinator.finish(&failed, &Err(CameraError::hardware("shutter stuck")));

    assert!(coordinator.in_flight().is_none());
    assert_eq!(
        *coordinator.stats(),
        CaptureStats {
            completed: 1,
            failed: 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_capture_to_file_sink_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FileImageSink::new(dir.path(), "IMG_"));
    let (controller, hardware, mut events) = previewing_controller(sink).await;

    let image = controller.capture().await.unwrap();
    let path = location_path(&image.location);
    assert!(path.exists());
    assert_eq!(std::fs::read(&path).unwrap().len(), image.size_bytes);

    controller.flush().await;
    assert_eq!(
        events.drain(),
        vec![CameraEvent::PictureSaved {
            location: image.location
        }]
    );
    assert!(hardware.stats().previewing);
    assert_eq!(controller.state(), SessionState::PreviewActive);
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_reports_error_and_resumes_preview() {
    let sink = MemoryImageSink::new();
    let (controller, hardware, mut events) =
        previewing_controller(Arc::new(sink.clone())).await;

    sink.fail_with("storage unavailable");
    let result = controller.capture().await;
    assert!(matches!(result, Err(CaptureError::Sink { .. })));

    controller.flush().await;
    let delivered = events.drain();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].is_error());

    assert_eq!(controller.state(), SessionState::PreviewActive);
    assert!(hardware.stats().previewing);
    assert_eq!(controller.status().captures_completed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_hardware_capture_failure_resumes_preview() {
    let sink = MemoryImageSink::new();
    let (controller, hardware, mut events) =
        previewing_controller(Arc::new(sink.clone())).await;

    hardware.fail_next_capture(CameraError::hardware("shutter stuck"));
    let result = controller.capture().await;
    assert!(matches!(result, Err(CaptureError::Hardware { .. })));

    controller.flush().await;
    assert_eq!(
        events.drain(),
        vec![CameraEvent::Error {
            message: "Camera hardware error: shutter stuck".to_string()
        }]
    );
    assert!(sink.is_empty());
    assert_eq!(controller.state(), SessionState::PreviewActive);

    // the next capture goes through
    assert!(controller.capture().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_empty_still_is_a_hardware_failure() {
    let sink = MemoryImageSink::new();
    let (controller, hardware, mut events) =
        previewing_controller(Arc::new(sink.clone())).await;

    hardware.set_image(Bytes::new());
    let result = controller.capture().await;
    assert!(matches!(result, Err(CaptureError::Hardware { .. })));
    assert!(sink.is_empty());

    controller.flush().await;
    assert_eq!(events.drain().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_take_picture_reports_through_events() {
    let sink = MemoryImageSink::new();
    let (controller, _hardware, mut events) =
        previewing_controller(Arc::new(sink.clone())).await;

    controller.take_picture();
    controller.take_picture();
    controller.flush().await;

    let delivered = events.drain();
    assert_eq!(delivered.len(), 2);
    assert!(delivered
        .iter()
        .all(|e| matches!(e, CameraEvent::PictureSaved { .. })));
    assert_eq!(sink.len(), 2);
    assert_eq!(controller.status().captures_completed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_preview_resume_after_capture_leaves_session_open() {
    let sink = MemoryImageSink::new();
    let (controller, hardware, mut events) =
        previewing_controller(Arc::new(sink.clone())).await;

    hardware.fail_next_preview_start(CameraError::hardware("repeating request rejected"));
    let image = controller.capture().await.unwrap();

    controller.flush().await;
    assert_eq!(
        events.drain(),
        vec![
            CameraEvent::PictureSaved {
                location: image.location
            },
            CameraEvent::Error {
                message: "Camera hardware error: repeating request rejected".to_string()
            },
        ]
    );
    assert_eq!(controller.state(), SessionState::Open);
    assert!(controller.status().has_handle);
    assert_eq!(sink.len(), 1);

    controller.restart_preview();
    controller.flush().await;
    assert_eq!(controller.state(), SessionState::PreviewActive);
    assert!(hardware.stats().previewing);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_capture_releases_camera() {
    let sink = MemoryImageSink::new();
    let (controller, hardware, mut events) =
        previewing_controller(Arc::new(sink.clone())).await;

    hardware.fail_next_capture(CameraError::Disconnected);
    let result = controller.capture().await;
    assert!(matches!(result, Err(CaptureError::Hardware { .. })));

    controller.flush().await;
    assert_eq!(
        events.drain(),
        vec![CameraEvent::Error {
            message: "Camera disconnected".to_string()
        }]
    );
    assert_eq!(controller.state(), SessionState::Closed);
    assert!(!controller.status().has_handle);
    assert_eq!(hardware.stats().live_handles, 0);
    assert!(sink.is_empty());
}
