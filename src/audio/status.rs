//! Observable session state shared with the UI layer.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use super::level_monitor::{Classification, LevelReading};
use super::playback_controller::PlaybackState;
use super::recording_controller::{CompletedRecording, RecordingSession, RecordingState};

const EVENT_CAPACITY: usize = 256;

/// Pushed to subscribers as the pipeline runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Level(LevelReading),
    RecordingState(RecordingState),
    PlaybackState(PlaybackState),
    PlaybackFinished { file_path: PathBuf },
    SustainedSilence { duration_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub recording: RecordingState,
    pub playback: PlaybackState,
    pub level: f32,
    pub classification: Classification,
    pub active_recording: Option<RecordingSession>,
    pub last_recording: Option<CompletedRecording>,
    pub loaded_source: Option<PathBuf>,
    pub last_error: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            recording: RecordingState::Idle,
            playback: PlaybackState::Idle,
            level: 0.0,
            classification: Classification::Silence,
            active_recording: None,
            last_recording: None,
            loaded_source: None,
            last_error: None,
        }
    }
}

/// Thread-safe handle for sharing status between the controllers and readers.
#[derive(Clone)]
pub struct SessionStatusHandle {
    inner: Arc<Mutex<SessionStatus>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SessionStatusHandle {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(SessionStatus::default())),
            events,
        }
    }
}

impl SessionStatusHandle {
    pub async fn get(&self) -> SessionStatus {
        self.inner.lock().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub async fn set_recording_state(&self, state: RecordingState) {
        let mut status = self.inner.lock().await;
        if status.recording == state {
            return;
        }
        status.recording = state;
        if state == RecordingState::Idle {
            status.active_recording = None;
        }
        self.publish(SessionEvent::RecordingState(state));
    }

    /// Return a recording stuck in `Preparing` to `Idle` without awaiting.
    ///
    /// Used when a start is abandoned mid-flight. Falls back to a spawned
    /// task when the status lock is contended.
    pub fn abandon_preparing(&self) {
        let reset = |status: &mut SessionStatus, events: &broadcast::Sender<SessionEvent>| {
            if status.recording == RecordingState::Preparing {
                status.recording = RecordingState::Idle;
                status.active_recording = None;
                let _ = events.send(SessionEvent::RecordingState(RecordingState::Idle));
            }
        };

        if let Ok(mut status) = self.inner.try_lock() {
            reset(&mut status, &self.events);
            return;
        }

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let handle = self.clone();
            runtime.spawn(async move {
                let mut status = handle.inner.lock().await;
                reset(&mut status, &handle.events);
            });
        }
    }

    pub async fn begin_recording(&self, session: RecordingSession) {
        let mut status = self.inner.lock().await;
        status.recording = RecordingState::Active;
        status.active_recording = Some(session);
        status.level = 0.0;
        status.classification = Classification::Silence;
        status.last_error = None;
        self.publish(SessionEvent::RecordingState(RecordingState::Active));
    }

    pub async fn complete_recording(&self, completed: CompletedRecording) {
        let mut status = self.inner.lock().await;
        status.last_recording = Some(completed);
    }

    pub async fn set_level(&self, reading: LevelReading) {
        let mut status = self.inner.lock().await;
        status.level = reading.normalized;
        status.classification = reading.classification;
        self.publish(SessionEvent::Level(reading));
    }

    pub async fn set_playback_state(&self, state: PlaybackState) {
        let mut status = self.inner.lock().await;
        if status.playback == state {
            return;
        }
        status.playback = state;
        if state == PlaybackState::Idle {
            status.loaded_source = None;
        }
        self.publish(SessionEvent::PlaybackState(state));
    }

    pub async fn set_loaded_source(&self, path: PathBuf) {
        self.inner.lock().await.loaded_source = Some(path);
    }

    pub async fn set_error(&self, error: String) {
        self.inner.lock().await.last_error = Some(error);
    }
}
