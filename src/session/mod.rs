//! Voice session facade.
//!
//! Bundles the gate, both controllers, the diagnostic log and the observable
//! status into the single surface the UI layer talks to. All dependencies are
//! injected via `SessionParts`, no concrete platform types are hardcoded.
//!
//! Operations that touch both controllers run one at a time under `op_lock`,
//! so a playback request can never slip in while a recording is starting.
//! `teardown` cancels a pending start before it queues for the lock.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

use crate::audio::{
    AudioRouting, AudioSessionGate, CaptureBackend, CompletedRecording, FileStore,
    PermissionProvider, PermissionState, PlaybackBackend, PlaybackController, PlaybackError,
    PlaybackSession, RecorderConfig, RecordingController, RecordingError, RecordingSession,
    RecordingState, RoutingOptions, SessionEvent, SessionStatus, SessionStatusHandle, Settings,
    SettingsError,
};
use crate::diagnostics::{DiagnosticEvent, DiagnosticLog};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("a recording is in progress; stop it before playing")]
    RecordingInProgress,
    #[error("no completed recording is available")]
    NoRecording,
}

/// Platform collaborators for one session.
pub struct SessionParts {
    pub permissions: Box<dyn PermissionProvider>,
    pub routing: Box<dyn AudioRouting>,
    pub routing_options: RoutingOptions,
    pub capture: Arc<dyn CaptureBackend>,
    pub playback: Arc<dyn PlaybackBackend>,
    pub store: Arc<dyn FileStore>,
    pub recorder: RecorderConfig,
}

pub struct VoiceSession {
    gate: Arc<AudioSessionGate>,
    recorder: RecordingController,
    player: PlaybackController,
    store: Arc<dyn FileStore>,
    status: SessionStatusHandle,
    log: DiagnosticLog,
    settings: Settings,
    op_lock: Mutex<()>,
}

impl VoiceSession {
    pub fn new(parts: SessionParts, settings: Settings) -> Result<Self, SessionError> {
        settings.validate()?;

        let log = DiagnosticLog::new();
        let status = SessionStatusHandle::default();
        let gate = Arc::new(AudioSessionGate::new(
            parts.permissions,
            parts.routing,
            parts.routing_options,
            log.clone(),
        ));

        let recorder = RecordingController::new(
            Arc::clone(&gate),
            parts.capture,
            Arc::clone(&parts.store),
            status.clone(),
            log.clone(),
            parts.recorder,
        );
        let player = PlaybackController::new(
            Arc::clone(&gate),
            parts.playback,
            Arc::clone(&parts.store),
            status.clone(),
            log.clone(),
        );

        Ok(Self {
            gate,
            recorder,
            player,
            store: parts.store,
            status,
            log,
            settings,
            op_lock: Mutex::new(()),
        })
    }

    pub async fn request_permission(&self) -> PermissionState {
        self.gate.request_permission().await
    }

    /// Stops any playback, then starts recording with this session's settings.
    pub async fn start_recording(&self) -> Result<RecordingSession, SessionError> {
        let epoch = self.recorder.epoch();
        let _op = self.op_lock.lock().await;
        self.player.stop().await?;
        Ok(self.recorder.start_at(self.settings, epoch).await?)
    }

    pub async fn stop_recording(&self) -> Result<CompletedRecording, SessionError> {
        let _op = self.op_lock.lock().await;
        Ok(self.recorder.stop().await?)
    }

    pub async fn load(&self, path: impl AsRef<Path>) -> Result<PlaybackSession, SessionError> {
        let _op = self.op_lock.lock().await;
        self.ensure_not_recording().await?;
        Ok(self.player.load(path).await?)
    }

    pub async fn load_last_recording(&self) -> Result<PlaybackSession, SessionError> {
        let last = self.status.get().await.last_recording;
        match last {
            Some(recording) => self.load(&recording.file_path).await,
            None => {
                self.log.error("Playback requested but no recording has completed");
                Err(SessionError::NoRecording)
            }
        }
    }

    pub async fn play(&self) -> Result<(), SessionError> {
        let _op = self.op_lock.lock().await;
        self.ensure_not_recording().await?;
        Ok(self.player.play().await?)
    }

    pub async fn stop_playback(&self) -> Result<(), SessionError> {
        let _op = self.op_lock.lock().await;
        Ok(self.player.stop().await?)
    }

    /// Release both controllers. Resolves only once the microphone and the
    /// output device are no longer held.
    pub async fn teardown(&self) -> Result<(), SessionError> {
        self.recorder.cancel_pending();
        let _op = self.op_lock.lock().await;
        let recording = self.recorder.teardown().await;
        let playback = self.player.stop().await;
        recording?;
        playback?;
        Ok(())
    }

    /// Remove a recording from durable storage.
    pub async fn discard(&self, recording: &CompletedRecording) -> anyhow::Result<()> {
        if let Err(e) = self.store.remove(&recording.file_path).await {
            self.log.error(format!(
                "Failed to delete recording {:?}: {e:#}",
                recording.file_path
            ));
            return Err(e);
        }
        self.log
            .info(format!("Deleted recording {:?}", recording.file_path));
        Ok(())
    }

    pub async fn status(&self) -> SessionStatus {
        self.status.get().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.status.subscribe()
    }

    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.log.subscribe()
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.log
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn gate(&self) -> &AudioSessionGate {
        &self.gate
    }

    async fn ensure_not_recording(&self) -> Result<(), SessionError> {
        if self.recorder.state().await != RecordingState::Idle {
            let err = SessionError::RecordingInProgress;
            self.log.error(err.to_string());
            return Err(err);
        }
        Ok(())
    }
}
