//! Record → classify → stop → load → play, and the playback edge cases.

mod common;

use common::{feed_level, finish_playback, next_event, HarnessBuilder};
use std::sync::atomic::Ordering;
use std::time::Duration;
use voicecheck::audio::{Classification, PlaybackError, PlaybackState, SessionEvent};
use voicecheck::session::SessionError;

#[tokio::test]
async fn test_end_to_end_scenario() {
    let h = HarnessBuilder::new().build();
    let mut events = h.session.subscribe();

    h.session.start_recording().await.unwrap();
    for (i, level) in [10.0, 40.0, 76.0, 90.0, 20.0].iter().enumerate() {
        feed_level(&h.feed, *level, i as u64 * 100);
    }

    let mut classifications = Vec::new();
    for _ in 0..5 {
        let reading = next_event(&mut events, |event| match event {
            SessionEvent::Level(reading) => Some(reading),
            _ => None,
        })
        .await;
        classifications.push(reading.classification);
    }
    assert_eq!(
        classifications,
        vec![
            Classification::Silence,
            Classification::Silence,
            Classification::Medium,
            Classification::Speech,
            Classification::Silence,
        ]
    );

    let completed = h.session.stop_recording().await.unwrap();
    assert!(completed.size_bytes > 0);
    assert!(completed.file_path.starts_with(h.dir.path()));

    let loaded = h.session.load(&completed.file_path).await.unwrap();
    assert_eq!(loaded.state, PlaybackState::Loaded);
    assert_eq!(loaded.duration_ms, 1_000);

    h.session.play().await.unwrap();
    assert_eq!(h.session.status().await.playback, PlaybackState::Playing);

    assert!(finish_playback(&h.completion));
    let finished = next_event(&mut events, |event| match event {
        SessionEvent::PlaybackFinished { file_path } => Some(file_path),
        _ => None,
    })
    .await;
    assert_eq!(finished, completed.file_path);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut extra_completions = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::PlaybackFinished { .. }) {
            extra_completions += 1;
        }
    }
    assert_eq!(extra_completions, 0);
    assert!(!finish_playback(&h.completion));

    let status = h.session.status().await;
    assert_eq!(status.playback, PlaybackState::Idle);
    assert!(status.loaded_source.is_none());
    assert_eq!(h.stops.load(Ordering::SeqCst), 1);

    // completion destroyed the session; stopping afterwards is a no-op
    h.session.stop_playback().await.unwrap();
    assert_eq!(h.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_play_while_playing_is_rejected() {
    let h = HarnessBuilder::new().build();

    h.session.start_recording().await.unwrap();
    let completed = h.session.stop_recording().await.unwrap();
    h.session.load(&completed.file_path).await.unwrap();
    h.session.play().await.unwrap();

    let err = h.session.play().await.unwrap_err();
    assert_eq!(err, SessionError::Playback(PlaybackError::AlreadyPlaying));
    assert_eq!(h.session.status().await.playback, PlaybackState::Playing);
}

#[tokio::test]
async fn test_load_missing_source() {
    let h = HarnessBuilder::new().build();
    let missing = h.dir.path().join("never-recorded.wav");

    let err = h.session.load(&missing).await.unwrap_err();
    assert_eq!(
        err,
        SessionError::Playback(PlaybackError::SourceMissing { path: missing })
    );
    assert_eq!(h.session.status().await.playback, PlaybackState::Idle);
    assert_eq!(h.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_load_zero_length_source() {
    let h = HarnessBuilder::new().build();
    let empty = h.dir.path().join("empty.wav");
    std::fs::write(&empty, b"").unwrap();

    let err = h.session.load(&empty).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Playback(PlaybackError::SourceMissing { .. })
    ));
}

#[tokio::test]
async fn test_backend_load_failure() {
    let h = HarnessBuilder::new().failing_player().build();
    let clip = h.dir.path().join("clip.wav");
    std::fs::write(&clip, [1u8; 64]).unwrap();

    let err = h.session.load(&clip).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Playback(PlaybackError::LoadFailed { .. })
    ));
    assert_eq!(h.session.status().await.playback, PlaybackState::Idle);
}

#[tokio::test]
async fn test_play_without_load() {
    let h = HarnessBuilder::new().build();

    let err = h.session.play().await.unwrap_err();
    assert_eq!(err, SessionError::Playback(PlaybackError::NotLoaded));
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let h = HarnessBuilder::new().build();
    let mut events = h.session.subscribe();

    h.session.stop_playback().await.unwrap();

    h.session.start_recording().await.unwrap();
    let completed = h.session.stop_recording().await.unwrap();
    h.session.load(&completed.file_path).await.unwrap();
    h.session.play().await.unwrap();

    h.session.stop_playback().await.unwrap();
    h.session.stop_playback().await.unwrap();

    assert_eq!(h.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.session.status().await.playback, PlaybackState::Idle);

    // the stopped player can no longer complete
    assert!(!finish_playback(&h.completion));
    tokio::time::sleep(Duration::from_millis(20)).await;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, SessionEvent::PlaybackFinished { .. }));
    }
}

#[tokio::test]
async fn test_playback_refused_while_recording() {
    let h = HarnessBuilder::new().build();

    h.session.start_recording().await.unwrap();
    let first = h.session.stop_recording().await.unwrap();
    h.session.start_recording().await.unwrap();

    let err = h.session.load(&first.file_path).await.unwrap_err();
    assert_eq!(err, SessionError::RecordingInProgress);
    assert_eq!(h.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_recording_stops_playback_first() {
    let h = HarnessBuilder::new().build();

    h.session.start_recording().await.unwrap();
    let completed = h.session.stop_recording().await.unwrap();
    h.session.load(&completed.file_path).await.unwrap();
    h.session.play().await.unwrap();

    h.session.start_recording().await.unwrap();

    let status = h.session.status().await;
    assert_eq!(status.playback, PlaybackState::Idle);
    assert_eq!(h.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_load_last_recording() {
    let h = HarnessBuilder::new().build();

    let err = h.session.load_last_recording().await.unwrap_err();
    assert_eq!(err, SessionError::NoRecording);

    h.session.start_recording().await.unwrap();
    let completed = h.session.stop_recording().await.unwrap();

    let loaded = h.session.load_last_recording().await.unwrap();
    assert_eq!(loaded.source_file_path, completed.file_path);
}

#[tokio::test]
async fn test_discard_removes_recording() {
    let h = HarnessBuilder::new().build();

    h.session.start_recording().await.unwrap();
    let completed = h.session.stop_recording().await.unwrap();
    assert!(completed.file_path.exists());

    h.session.discard(&completed).await.unwrap();
    assert!(!completed.file_path.exists());
}

#[tokio::test]
async fn test_failed_discard_is_logged() {
    let h = HarnessBuilder::new().build();

    h.session.start_recording().await.unwrap();
    let completed = h.session.stop_recording().await.unwrap();
    h.session.discard(&completed).await.unwrap();

    assert!(h.session.discard(&completed).await.is_err());
    assert!(h
        .session
        .diagnostics()
        .snapshot()
        .iter()
        .any(|e| e.is_error && e.message.contains("Failed to delete recording")));
}
