//! Recording lifecycle: `Idle → Preparing → Active → Finalizing → Idle`.
//!
//! Every operation runs under one async lock, so a `stop` issued while `start`
//! is still resolving waits for it. The controller owns at most one capture
//! resource and releases it before allocating another.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::capture::{CaptureBackend, CaptureHandle, CaptureRequest};
use super::file_store::FileStore;
use super::format::EncodingConfig;
use super::level_monitor::{LevelMonitor, LevelSample, Settings, SettingsError};
use super::session_gate::{AudioRoutingMode, AudioSessionGate, PermissionState, RoutingError};
use super::status::{SessionEvent, SessionStatusHandle};
use crate::diagnostics::DiagnosticLog;

/// How long `stop` waits for queued level samples to drain.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Preparing,
    Active,
    Finalizing,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Preparing => "preparing",
            RecordingState::Active => "active",
            RecordingState::Finalizing => "finalizing",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSession {
    pub id: String,
    pub file_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub state: RecordingState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRecording {
    pub id: String,
    pub file_path: PathBuf,
    pub duration_ms: u64,
    pub size_bytes: u64,
}

impl CompletedRecording {
    /// The file was finalized but holds no audio.
    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }

    pub fn ensure_usable(&self) -> Result<&Self, RecordingError> {
        if self.is_empty() {
            return Err(RecordingError::EmptyRecording {
                path: self.file_path.clone(),
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordingError {
    #[error("microphone permission has not been granted")]
    PermissionDenied,
    #[error(transparent)]
    RoutingFailed(#[from] RoutingError),
    #[error("could not allocate a recording resource: {0}")]
    AllocationFailed(String),
    #[error("invalid level settings: {0}")]
    InvalidSettings(#[from] SettingsError),
    #[error("recording could not be finalized: {0}")]
    FinalizeFailed(String),
    #[error("recording {path:?} is empty")]
    EmptyRecording { path: PathBuf },
    #[error("recording produced no output file")]
    MissingOutput,
    #[error("no recording is active")]
    NoActiveRecording,
    #[error("recording start was cancelled by teardown")]
    Cancelled,
}

/// Static recorder setup, resolved from configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub directory: PathBuf,
    pub format: EncodingConfig,
    pub log_every_n_samples: u64,
}

struct ActiveRecording {
    session: RecordingSession,
    handle: Box<dyn CaptureHandle>,
    pump: JoinHandle<()>,
    started: Instant,
}

pub struct RecordingController {
    gate: Arc<AudioSessionGate>,
    backend: Arc<dyn CaptureBackend>,
    store: Arc<dyn FileStore>,
    status: SessionStatusHandle,
    log: DiagnosticLog,
    config: RecorderConfig,
    active: Mutex<Option<ActiveRecording>>,
    // Bumped by teardown; a start that observes a bump gives up.
    teardown_epoch: AtomicU64,
    sequence: AtomicU64,
}

impl RecordingController {
    pub fn new(
        gate: Arc<AudioSessionGate>,
        backend: Arc<dyn CaptureBackend>,
        store: Arc<dyn FileStore>,
        status: SessionStatusHandle,
        log: DiagnosticLog,
        config: RecorderConfig,
    ) -> Self {
        Self {
            gate,
            backend,
            store,
            status,
            log,
            config,
            active: Mutex::new(None),
            teardown_epoch: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> RecordingState {
        self.status.get().await.recording
    }

    /// Teardown generation. A start begun at this value is cancelled by any
    /// later teardown.
    pub fn epoch(&self) -> u64 {
        self.teardown_epoch.load(Ordering::SeqCst)
    }

    /// Cancel every start that began before this call without waiting for it.
    pub fn cancel_pending(&self) {
        self.teardown_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Start a new recording with a snapshot of `settings`.
    ///
    /// Any recording still held is finished and released first.
    pub async fn start(&self, settings: Settings) -> Result<RecordingSession, RecordingError> {
        self.start_at(settings, self.epoch()).await
    }

    /// Like `start`, but cancelled by any teardown after `epoch` was read.
    pub async fn start_at(
        &self,
        settings: Settings,
        epoch: u64,
    ) -> Result<RecordingSession, RecordingError> {
        let mut active = self.active.lock().await;

        if self.epoch() != epoch {
            return self.fail_start(RecordingError::Cancelled).await;
        }

        if let Some(previous) = active.take() {
            info!("Superseding active recording {}", previous.session.id);
            self.status.set_recording_state(RecordingState::Finalizing).await;
            match self.release(previous).await {
                Ok(_) => self.log.info("Previous recording released before restart"),
                Err(e) => self
                    .log
                    .error(format!("Previous recording failed to release cleanly: {e}")),
            }
            self.status.set_recording_state(RecordingState::Idle).await;
        }

        if let Err(e) = settings.validate() {
            return self.fail_start(e.into()).await;
        }

        if self.gate.request_permission().await != PermissionState::Granted {
            return self.fail_start(RecordingError::PermissionDenied).await;
        }

        if self.epoch() != epoch {
            return self.fail_start(RecordingError::Cancelled).await;
        }

        self.status.set_recording_state(RecordingState::Preparing).await;
        // Dropped before `active` is unlocked, so no other start can be preparing.
        let _preparing = PreparingGuard {
            status: &self.status,
        };

        if let Err(e) = self.gate.set_routing_mode(AudioRoutingMode::Record).await {
            return self.fail_start(e.into()).await;
        }

        if let Err(e) = self.store.ensure_dir(&self.config.directory).await {
            return self
                .fail_start(RecordingError::AllocationFailed(e.to_string()))
                .await;
        }

        let id = Uuid::new_v4().to_string();
        let file_path = self.next_path();
        let (sample_tx, sample_rx) = mpsc::unbounded_channel();

        let request = CaptureRequest {
            path: file_path.clone(),
            format: self.config.format,
            sample_interval: Duration::from_millis(settings.sample_interval_ms),
            samples: sample_tx,
            log: self.log.clone(),
        };

        let handle = match self.backend.open(request).await {
            Ok(handle) => handle,
            Err(e) => {
                return self
                    .fail_start(RecordingError::AllocationFailed(format!("{e:#}")))
                    .await;
            }
        };

        let monitor = LevelMonitor::new(settings, self.config.log_every_n_samples);
        let pump = spawn_level_pump(
            sample_rx,
            monitor,
            self.status.clone(),
            self.log.clone(),
            id.clone(),
        );

        let session = RecordingSession {
            id,
            file_path,
            started_at: Utc::now(),
            state: RecordingState::Active,
        };
        let recording = ActiveRecording {
            session: session.clone(),
            handle,
            pump,
            started: Instant::now(),
        };

        if self.epoch() != epoch {
            if let Err(e) = self.release(recording).await {
                warn!("Cancelled recording failed to release cleanly: {}", e);
            }
            return self.fail_start(RecordingError::Cancelled).await;
        }

        *active = Some(recording);
        self.status.begin_recording(session.clone()).await;
        self.log.info(format!(
            "Recording {} started: {:?}",
            session.id, session.file_path
        ));

        Ok(session)
    }

    /// Finalize the active recording and switch routing to playback.
    ///
    /// An empty file is still returned (with `size_bytes == 0`) and reported
    /// through an error diagnostic.
    pub async fn stop(&self) -> Result<CompletedRecording, RecordingError> {
        let mut active = self.active.lock().await;
        let Some(recording) = active.take() else {
            let err = RecordingError::NoActiveRecording;
            self.log.error(format!("Stop requested: {err}"));
            return Err(err);
        };

        self.status.set_recording_state(RecordingState::Finalizing).await;

        let id = recording.session.id.clone();
        let duration_ms = recording.started.elapsed().as_millis() as u64;
        let output = self.release(recording).await;

        let result = self.inspect_output(id, duration_ms, output).await;
        self.status.set_recording_state(RecordingState::Idle).await;

        match &result {
            Ok(completed) => self.status.complete_recording(completed.clone()).await,
            Err(e) => {
                self.status.set_error(e.to_string()).await;
                self.log.error(format!("Recording stop failed: {e}"));
            }
        }

        result
    }

    /// Stop and release whatever is held, waiting for the release to finish.
    /// Also cancels a `start` that is still pending.
    pub async fn teardown(&self) -> Result<(), RecordingError> {
        self.cancel_pending();
        let mut active = self.active.lock().await;

        let Some(recording) = active.take() else {
            return Ok(());
        };

        self.status.set_recording_state(RecordingState::Finalizing).await;
        let id = recording.session.id.clone();
        let released = self.release(recording).await;
        self.status.set_recording_state(RecordingState::Idle).await;

        match released {
            Ok(_) => {
                self.log.info(format!("Recording {id} released on teardown"));
                Ok(())
            }
            Err(e) => {
                let err = RecordingError::FinalizeFailed(e.to_string());
                self.log.error(format!("Recording {id} teardown failed: {err}"));
                Err(err)
            }
        }
    }

    async fn inspect_output(
        &self,
        id: String,
        duration_ms: u64,
        output: anyhow::Result<Option<PathBuf>>,
    ) -> Result<CompletedRecording, RecordingError> {
        let reference = output.map_err(|e| RecordingError::FinalizeFailed(format!("{e:#}")))?;

        self.gate.set_routing_mode(AudioRoutingMode::Playback).await?;

        let file_path = reference.ok_or(RecordingError::MissingOutput)?;
        let size_bytes = self
            .store
            .size(&file_path)
            .await
            .map_err(|e| RecordingError::FinalizeFailed(e.to_string()))?
            .ok_or(RecordingError::MissingOutput)?;

        let completed = CompletedRecording {
            id,
            file_path,
            duration_ms,
            size_bytes,
        };

        if completed.is_empty() {
            self.log.error(format!(
                "Recording {:?} is empty (no audio was captured)",
                completed.file_path
            ));
        } else {
            self.log.info(format!(
                "Recording saved: {:?} ({} bytes, {} ms)",
                completed.file_path, completed.size_bytes, completed.duration_ms
            ));
        }

        Ok(completed)
    }

    async fn release(&self, recording: ActiveRecording) -> anyhow::Result<Option<PathBuf>> {
        let ActiveRecording {
            session,
            handle,
            mut pump,
            ..
        } = recording;

        let output = handle.finish().await;

        // The backend dropped its sample sender in `finish`; let queued samples drain.
        if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, &mut pump)
            .await
            .is_err()
        {
            warn!(
                "Level pump for recording {} did not drain, aborting",
                session.id
            );
            pump.abort();
        }

        debug!("Recording {} resources released", session.id);
        output
    }

    async fn fail_start(&self, err: RecordingError) -> Result<RecordingSession, RecordingError> {
        self.status.set_recording_state(RecordingState::Idle).await;
        self.status.set_error(err.to_string()).await;
        self.log.error(format!("Recording start failed: {err}"));
        Err(err)
    }

    fn next_path(&self) -> PathBuf {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S-%3f");
        let filename = format!(
            "recording-{}-{:03}.{}",
            timestamp, sequence, self.config.format.extension
        );
        self.config.directory.join(filename)
    }
}

/// Puts the status back to `Idle` if a start future is dropped while
/// `Preparing`. A no-op once the start has settled either way.
struct PreparingGuard<'a> {
    status: &'a SessionStatusHandle,
}

impl Drop for PreparingGuard<'_> {
    fn drop(&mut self) {
        self.status.abandon_preparing();
    }
}

fn spawn_level_pump(
    mut samples: mpsc::UnboundedReceiver<LevelSample>,
    mut monitor: LevelMonitor,
    status: SessionStatusHandle,
    log: DiagnosticLog,
    recording_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(sample) = samples.recv().await {
            let update = match monitor.process(&sample) {
                Ok(update) => update,
                Err(e) => {
                    log.error(format!("Dropped level sample: {e}"));
                    continue;
                }
            };

            let reading = update.reading;
            status.set_level(reading).await;

            if update.log {
                log.info(format!(
                    "Level {:.1} ({}) at {} ms",
                    reading.normalized,
                    reading.classification.as_str(),
                    reading.timestamp_ms
                ));
            }

            if let Some(duration_ms) = update.sustained_silence_ms {
                log.info(format!("Sustained silence for {duration_ms} ms"));
                status.publish(SessionEvent::SustainedSilence { duration_ms });
            }
        }

        debug!("Level pump for recording {} finished", recording_id);
    })
}
