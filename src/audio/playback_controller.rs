//! Playback lifecycle: `Idle → Loading → Loaded → Playing → Idle`.
//!
//! Holds at most one loaded recording. Natural end-of-media is pushed from a
//! watcher task, so the controller returns to Idle even if nobody polls it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::file_store::FileStore;
use super::player::{PlaybackBackend, PlaybackHandle};
use super::session_gate::{AudioRoutingMode, AudioSessionGate, RoutingError};
use super::status::{SessionEvent, SessionStatusHandle};
use crate::diagnostics::DiagnosticLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Loading,
    Loaded,
    Playing,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Loaded => "loaded",
            PlaybackState::Playing => "playing",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub source_file_path: PathBuf,
    pub state: PlaybackState,
    pub duration_ms: u64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("no completed recording exists at {path:?}")]
    SourceMissing { path: PathBuf },
    #[error("playback is already running")]
    AlreadyPlaying,
    #[error("nothing is loaded for playback")]
    NotLoaded,
    #[error("could not load {path:?} for playback: {reason}")]
    LoadFailed { path: PathBuf, reason: String },
    #[error("playback could not start: {0}")]
    StartFailed(String),
    #[error(transparent)]
    RoutingFailed(#[from] RoutingError),
    #[error("playback resource could not be released: {0}")]
    ReleaseFailed(String),
}

struct LoadedPlayback {
    session: PlaybackSession,
    handle: Box<dyn PlaybackHandle>,
    watcher: Option<JoinHandle<()>>,
    generation: u64,
}

pub struct PlaybackController {
    gate: Arc<AudioSessionGate>,
    backend: Arc<dyn PlaybackBackend>,
    store: Arc<dyn FileStore>,
    status: SessionStatusHandle,
    log: DiagnosticLog,
    current: Arc<Mutex<Option<LoadedPlayback>>>,
    generation: AtomicU64,
}

impl PlaybackController {
    pub fn new(
        gate: Arc<AudioSessionGate>,
        backend: Arc<dyn PlaybackBackend>,
        store: Arc<dyn FileStore>,
        status: SessionStatusHandle,
        log: DiagnosticLog,
    ) -> Self {
        Self {
            gate,
            backend,
            store,
            status,
            log,
            current: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> PlaybackState {
        self.status.get().await.playback
    }

    /// Load a finished recording, releasing anything loaded or playing first.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<PlaybackSession, PlaybackError> {
        let path = path.as_ref().to_path_buf();
        let mut current = self.current.lock().await;

        if let Some(previous) = current.take() {
            info!(
                "Releasing {:?} before loading {:?}",
                previous.session.source_file_path, path
            );
            if let Err(e) = self.release(previous).await {
                self.log.error(format!("Previous playback failed to release: {e}"));
            }
        }

        self.status.set_playback_state(PlaybackState::Loading).await;

        match self.store.size(&path).await {
            Ok(Some(size)) if size > 0 => {}
            Ok(_) => return self.fail_load(PlaybackError::SourceMissing { path }).await,
            Err(e) => {
                let reason = e.to_string();
                return self.fail_load(PlaybackError::LoadFailed { path, reason }).await;
            }
        }

        let handle = match self.backend.load(&path).await {
            Ok(handle) => handle,
            Err(e) => {
                let reason = format!("{e:#}");
                return self.fail_load(PlaybackError::LoadFailed { path, reason }).await;
            }
        };

        let session = PlaybackSession {
            source_file_path: path.clone(),
            state: PlaybackState::Loaded,
            duration_ms: handle.duration_ms(),
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *current = Some(LoadedPlayback {
            session: session.clone(),
            handle,
            watcher: None,
            generation,
        });

        self.status.set_loaded_source(path.clone()).await;
        self.status.set_playback_state(PlaybackState::Loaded).await;
        self.log.info(format!(
            "Loaded {:?} for playback ({} ms)",
            path, session.duration_ms
        ));

        Ok(session)
    }

    /// Start the loaded recording. Calling this while already playing is an error.
    pub async fn play(&self) -> Result<(), PlaybackError> {
        let mut current = self.current.lock().await;

        let state = current.as_ref().map(|loaded| loaded.session.state);
        match state {
            None => return self.reject(PlaybackError::NotLoaded),
            Some(PlaybackState::Playing) => return self.reject(PlaybackError::AlreadyPlaying),
            Some(_) => {}
        }

        if let Err(e) = self.gate.set_routing_mode(AudioRoutingMode::Playback).await {
            return self.reject(e.into());
        }

        let started = match current.as_mut() {
            Some(loaded) => loaded.handle.play().await,
            None => return self.reject(PlaybackError::NotLoaded),
        };

        let done = match started {
            Ok(done) => done,
            Err(e) => {
                if let Some(failed) = current.take() {
                    if let Err(release_err) = self.release(failed).await {
                        debug!("Release after failed start also failed: {}", release_err);
                    }
                }
                self.status.set_playback_state(PlaybackState::Idle).await;
                return self.reject(PlaybackError::StartFailed(format!("{e:#}")));
            }
        };

        let Some(loaded) = current.as_mut() else {
            return self.reject(PlaybackError::NotLoaded);
        };
        loaded.session.state = PlaybackState::Playing;
        loaded.watcher = Some(self.spawn_watcher(
            done,
            loaded.generation,
            loaded.session.source_file_path.clone(),
        ));
        let path = loaded.session.source_file_path.clone();

        self.status.set_playback_state(PlaybackState::Playing).await;
        self.log.info(format!("Playback of {:?} started", path));
        Ok(())
    }

    /// Release the loaded recording early. Idempotent when nothing is loaded.
    pub async fn stop(&self) -> Result<(), PlaybackError> {
        let mut current = self.current.lock().await;
        let Some(loaded) = current.take() else {
            return Ok(());
        };

        let path = loaded.session.source_file_path.clone();
        let released = self.release(loaded).await;
        self.status.set_playback_state(PlaybackState::Idle).await;

        match released {
            Ok(()) => {
                self.log.info(format!("Playback of {:?} stopped", path));
                Ok(())
            }
            Err(e) => {
                let err = PlaybackError::ReleaseFailed(e.to_string());
                self.log.error(format!("Playback of {:?} stop failed: {err}", path));
                Err(err)
            }
        }
    }

    fn spawn_watcher(
        &self,
        done: oneshot::Receiver<()>,
        generation: u64,
        path: PathBuf,
    ) -> JoinHandle<()> {
        let current = Arc::clone(&self.current);
        let status = self.status.clone();
        let log = self.log.clone();

        tokio::spawn(async move {
            // Dropped without firing means the player was stopped early.
            if done.await.is_err() {
                return;
            }

            let mut slot = current.lock().await;
            let ours = slot
                .as_ref()
                .map(|loaded| loaded.generation == generation)
                .unwrap_or(false);
            if !ours {
                return;
            }

            if let Some(finished) = slot.take() {
                if let Err(e) = finished.handle.stop().await {
                    log.error(format!("Playback of {:?} failed to release: {e}", path));
                }
            }

            status.set_playback_state(PlaybackState::Idle).await;
            log.info(format!("Playback of {:?} finished", path));
            status.publish(SessionEvent::PlaybackFinished { file_path: path });
        })
    }

    async fn release(&self, loaded: LoadedPlayback) -> anyhow::Result<()> {
        if let Some(watcher) = loaded.watcher {
            watcher.abort();
        }
        loaded.handle.stop().await
    }

    async fn fail_load(&self, err: PlaybackError) -> Result<PlaybackSession, PlaybackError> {
        self.status.set_playback_state(PlaybackState::Idle).await;
        self.status.set_error(err.to_string()).await;
        self.log.error(format!("Playback load failed: {err}"));
        Err(err)
    }

    fn reject(&self, err: PlaybackError) -> Result<(), PlaybackError> {
        self.log.error(format!("Playback request rejected: {err}"));
        Err(err)
    }
}
