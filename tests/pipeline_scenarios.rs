//! End-to-end pipeline scenarios
//!
//! Drives the whole intake, normalize, remove, preview flow with scripted
//! removal capabilities and checks the published state, the notifications
//! and the preview store after each run.

mod common;

use bgtify::config::DEFAULT_FALLBACK_MESSAGE;
use bgtify::{
    Admission, FailureStage, IntakeOutcome, IntakeRejection, MediaType, NotificationLevel, Phase,
    Pipeline, PipelineState, RunOutcome, RunReport, SourceFile,
};
use common::{
    bmp_file, camera_config, encoded_image, jpeg_file, png_file, recording_notifier,
    CameraTranscoder, Outcome, ScriptedRemover, RESULT_BYTES,
};
use image::ImageFormat;
use std::sync::Arc;

fn completed(outcome: IntakeOutcome) -> RunReport {
    match outcome {
        IntakeOutcome::Completed(report) => report,
        other => panic!("Expected a completed run, got {other:?}"),
    }
}

#[tokio::test]
async fn test_supported_file_passes_through_and_populates_state() {
    let remover = Arc::new(ScriptedRemover::succeeding());
    let notifier = recording_notifier();
    let pipeline = Pipeline::builder(remover.clone())
        .notifier(notifier.clone())
        .build()
        .unwrap();

    let source = png_file("photo.png");
    let report = completed(pipeline.handle_drop(vec![source.clone()]).await);
    assert_eq!(
        report.outcome,
        RunOutcome::Succeeded {
            derived_name: "photo".to_string()
        }
    );

    // Handed over untouched, same payload allocation
    let received = remover.received();
    assert_eq!(received.len(), 1);
    assert!(!received[0].is_transcoded());
    assert!(Arc::ptr_eq(&received[0].payload(), &source.payload()));

    let state = pipeline.state();
    assert_eq!(state.phase(), Phase::Populated);
    assert!(!state.is_loading);
    assert_eq!(state.derived_name.as_deref(), Some("photo"));

    let previews = pipeline.previews();
    let original = previews
        .resolve(state.original_preview_url.as_deref().unwrap())
        .unwrap();
    let result = previews
        .resolve(state.result_preview_url.as_deref().unwrap())
        .unwrap();
    assert_eq!(original.bytes.as_ref(), source.bytes());
    assert_eq!(original.media_type, MediaType::Png);
    assert_eq!(result.bytes.as_ref(), RESULT_BYTES);
    assert_eq!(result.media_type, MediaType::Png);

    assert_eq!(
        notifier.messages(NotificationLevel::Info),
        vec!["Processing 0 of 1"]
    );
    assert_eq!(
        notifier.messages(NotificationLevel::Success),
        vec!["Congratulations!"]
    );
    assert!(notifier.messages(NotificationLevel::Error).is_empty());
}

#[tokio::test]
async fn test_camera_format_is_transcoded_to_jpeg() {
    let remover = Arc::new(ScriptedRemover::succeeding());
    let transcoder = Arc::new(CameraTranscoder::new());
    let pipeline = Pipeline::builder(remover.clone())
        .config(camera_config())
        .transcoder(transcoder.clone())
        .build()
        .unwrap();

    let source = SourceFile::new("photo.heic", MediaType::Heic, vec![0u8; 64]);
    let report = completed(pipeline.handle_drop(vec![source]).await);
    assert!(report.succeeded());

    let calls = transcoder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].max_width, 1000);
    assert_eq!(calls[0].max_height, 1000);
    assert_eq!(calls[0].quality, 80);

    let received = remover.received();
    assert!(received[0].is_transcoded());
    assert_eq!(received[0].media_type(), &MediaType::Jpeg);

    // Same terminal shape as a pass-through run
    let state = pipeline.state();
    assert_eq!(state.phase(), Phase::Populated);
    assert_eq!(state.derived_name.as_deref(), Some("photo"));
    let original = pipeline
        .previews()
        .resolve(state.original_preview_url.as_deref().unwrap())
        .unwrap();
    assert_eq!(original.media_type, MediaType::Jpeg);
}

#[tokio::test]
async fn test_bundled_transcoder_bounds_large_bitmap() {
    let remover = Arc::new(ScriptedRemover::succeeding());
    let pipeline = Pipeline::builder(remover.clone()).build().unwrap();

    let report = completed(
        pipeline
            .handle_drop(vec![bmp_file("scan.final.bmp", 2400, 1200)])
            .await,
    );
    assert!(report.succeeded());

    let received = remover.received();
    assert_eq!(received[0].media_type(), &MediaType::Jpeg);
    let decoded = image::load_from_memory_with_format(received[0].bytes(), ImageFormat::Jpeg)
        .unwrap();
    assert_eq!((decoded.width(), decoded.height()), (1000, 500));

    assert_eq!(pipeline.state().derived_name.as_deref(), Some("scan.final"));
}

#[tokio::test]
async fn test_removal_failure_surfaces_description() {
    let notifier = recording_notifier();
    let pipeline = Pipeline::builder(Arc::new(ScriptedRemover::new(Outcome::FailWith(
        "network error".to_string(),
    ))))
    .notifier(notifier.clone())
    .build()
    .unwrap();

    let report = completed(pipeline.handle_drop(vec![jpeg_file("photo.jpg")]).await);
    assert_eq!(
        report.outcome,
        RunOutcome::Failed {
            stage: FailureStage::Removal,
            message: "network error".to_string()
        }
    );

    assert_eq!(pipeline.state(), PipelineState::idle());
    assert_eq!(
        notifier.messages(NotificationLevel::Error),
        vec!["network error"]
    );
    assert_eq!(pipeline.previews().live_count(), 0);
}

#[tokio::test]
async fn test_undescribed_failure_uses_fallback() {
    let notifier = recording_notifier();
    let pipeline = Pipeline::builder(Arc::new(ScriptedRemover::new(Outcome::FailSilently)))
        .notifier(notifier.clone())
        .build()
        .unwrap();

    pipeline.handle_drop(vec![jpeg_file("photo.jpg")]).await;

    assert_eq!(pipeline.state(), PipelineState::idle());
    assert_eq!(
        notifier.messages(NotificationLevel::Error),
        vec![DEFAULT_FALLBACK_MESSAGE]
    );
    assert_eq!(
        DEFAULT_FALLBACK_MESSAGE,
        "Something went wrong, please try again"
    );
}

#[tokio::test]
async fn test_second_run_replaces_first_previews() {
    let pipeline = Pipeline::builder(Arc::new(ScriptedRemover::succeeding()))
        .build()
        .unwrap();

    pipeline.handle_drop(vec![png_file("first.png")]).await;
    let first = pipeline.state();
    let first_urls: Vec<String> = first.preview_urls().map(String::from).collect();
    assert_eq!(first_urls.len(), 2);

    pipeline.handle_drop(vec![jpeg_file("second.jpg")]).await;
    let second = pipeline.state();
    assert_eq!(second.derived_name.as_deref(), Some("second"));

    for url in &first_urls {
        assert!(!pipeline.previews().is_live(url), "stale preview {url} still live");
        assert!(second.preview_urls().all(|current| current != url.as_str()));
    }
    assert_eq!(pipeline.previews().live_count(), 2);
}

#[tokio::test]
async fn test_loading_is_published_before_any_stage_completes() {
    let remover = Arc::new(ScriptedRemover::succeeding());
    let pipeline = Pipeline::builder(remover.clone()).build().unwrap();
    let mut states = pipeline.subscribe();

    let ticket = match pipeline.admit(vec![png_file("photo.png")]) {
        Admission::Started(ticket) => ticket,
        other => panic!("Expected the drop to be admitted, got {other:?}"),
    };

    // Nothing has run yet, but the state is already loading
    assert!(remover.received().is_empty());
    assert_eq!(pipeline.state(), PipelineState::loading());
    assert!(states.borrow_and_update().is_loading);

    let report = pipeline.run(ticket).await;
    assert!(report.succeeded());
    assert!(states.has_changed().unwrap());
    assert_eq!(states.borrow_and_update().phase(), Phase::Populated);
}

#[tokio::test]
async fn test_rejected_intake_leaves_state_untouched() {
    let remover = Arc::new(ScriptedRemover::succeeding());
    let notifier = recording_notifier();
    let pipeline = Pipeline::builder(remover.clone())
        .notifier(notifier.clone())
        .build()
        .unwrap();
    let states = pipeline.subscribe();

    let outcome = pipeline.handle_drop(Vec::new()).await;
    assert!(matches!(outcome, IntakeOutcome::Ignored(IntakeRejection::NoFiles)));

    let outcome = pipeline
        .handle_drop(vec![png_file("a.png"), png_file("b.png")])
        .await;
    assert!(matches!(
        outcome,
        IntakeOutcome::Ignored(IntakeRejection::TooManyFiles(2))
    ));

    let text = SourceFile::new("notes.txt", MediaType::parse("text/plain"), b"hi".to_vec());
    let outcome = pipeline.handle_drop(vec![text]).await;
    assert!(matches!(
        outcome,
        IntakeOutcome::Ignored(IntakeRejection::UnsupportedMediaType(_))
    ));

    assert_eq!(pipeline.state(), PipelineState::idle());
    assert!(!states.has_changed().unwrap());
    assert!(remover.received().is_empty());
    assert!(notifier.notifications().is_empty());
}

#[tokio::test]
async fn test_reset_returns_to_idle_and_is_idempotent() {
    let pipeline = Pipeline::builder(Arc::new(ScriptedRemover::succeeding()))
        .build()
        .unwrap();

    assert!(!pipeline.reset());
    assert_eq!(pipeline.state(), PipelineState::idle());

    pipeline.handle_drop(vec![png_file("photo.png")]).await;
    assert!(pipeline.download().is_some());

    assert!(pipeline.reset());
    assert_eq!(pipeline.state(), PipelineState::idle());
    assert_eq!(pipeline.previews().live_count(), 0);
    assert!(pipeline.download().is_none());

    assert!(!pipeline.reset());
    assert_eq!(pipeline.state(), PipelineState::idle());
}

#[tokio::test]
async fn test_download_is_named_after_source() {
    let pipeline = Pipeline::builder(Arc::new(ScriptedRemover::succeeding()))
        .build()
        .unwrap();
    pipeline
        .handle_drop(vec![SourceFile::new(
            "holiday.2024.jpeg",
            MediaType::Jpeg,
            encoded_image(4, 4, ImageFormat::Jpeg),
        )])
        .await;

    let download = pipeline.download().unwrap();
    assert_eq!(download.file_name, "holiday.2024.png");
    assert_eq!(download.media_type, MediaType::Png);
    assert_eq!(download.bytes.as_ref(), RESULT_BYTES);

    let dir = tempfile::tempdir().unwrap();
    let path = download.save_in(dir.path()).await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), RESULT_BYTES);
}

#[tokio::test]
async fn test_outcome_does_not_depend_on_progress() {
    let remover = ScriptedRemover::succeeding().with_events(Vec::new());
    let notifier = recording_notifier();
    let pipeline = Pipeline::builder(Arc::new(remover))
        .notifier(notifier.clone())
        .build()
        .unwrap();

    let report = completed(pipeline.handle_drop(vec![png_file("photo.png")]).await);
    assert!(report.succeeded());
    assert_eq!(pipeline.state().phase(), Phase::Populated);
    assert!(notifier.notifications().is_empty());
}
