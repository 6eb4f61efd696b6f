//! In-memory stand-ins for the platform seams.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc, oneshot};

use voicecheck::audio::{
    format_for, AudioRouting, AudioRoutingMode, CaptureBackend, CaptureHandle, CaptureRequest,
    FsFileStore, LevelSample, PermissionProvider, Platform, PlaybackBackend, PlaybackHandle,
    RecorderConfig, RoutingOptions, SessionEvent, Settings,
};
use voicecheck::session::{SessionParts, VoiceSession};

pub struct FakePermissions {
    pub grant: bool,
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
}

#[async_trait]
impl PermissionProvider for FakePermissions {
    async fn request_permission(&self) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.grant)
    }
}

/// Records every switch; refuses switches into `fail_on`.
#[derive(Default)]
pub struct FakeRouting {
    pub applied: Arc<Mutex<Vec<AudioRoutingMode>>>,
    pub fail_on: Option<AudioRoutingMode>,
}

#[async_trait]
impl AudioRouting for FakeRouting {
    async fn apply(&self, mode: AudioRoutingMode, _options: &RoutingOptions) -> Result<()> {
        if self.fail_on == Some(mode) {
            bail!("route to {mode} rejected by host");
        }
        self.applied.lock().unwrap().push(mode);
        Ok(())
    }
}

type SampleFeed = Arc<Mutex<Option<mpsc::UnboundedSender<LevelSample>>>>;

/// What a fake capture handle produces when finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FinishOutcome {
    File,
    NoFile,
    Fail,
}

/// Capture backend whose level samples are injected by the test.
pub struct FakeCapture {
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
    feed: SampleFeed,
    open_delay: Duration,
    output_bytes: usize,
    fail_open: bool,
    outcome: FinishOutcome,
}

impl FakeCapture {
    pub fn new(output_bytes: usize) -> Self {
        Self {
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
            feed: Arc::new(Mutex::new(None)),
            open_delay: Duration::ZERO,
            output_bytes,
            fail_open: false,
            outcome: FinishOutcome::File,
        }
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn finishing_with(mut self, outcome: FinishOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn feed_handle(&self) -> SampleFeed {
        Arc::clone(&self.feed)
    }
}

#[async_trait]
impl CaptureBackend for FakeCapture {
    async fn open(&self, request: CaptureRequest) -> Result<Box<dyn CaptureHandle>> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self.fail_open {
            bail!("input device busy");
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.feed.lock().unwrap() = Some(request.samples);

        Ok(Box::new(FakeCaptureHandle {
            path: request.path,
            feed: Arc::clone(&self.feed),
            released: Arc::clone(&self.released),
            output_bytes: self.output_bytes,
            outcome: self.outcome,
        }))
    }
}

struct FakeCaptureHandle {
    path: PathBuf,
    feed: SampleFeed,
    released: Arc<AtomicUsize>,
    output_bytes: usize,
    outcome: FinishOutcome,
}

#[async_trait]
impl CaptureHandle for FakeCaptureHandle {
    async fn finish(self: Box<Self>) -> Result<Option<PathBuf>> {
        self.feed.lock().unwrap().take();
        self.released.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            FinishOutcome::File => {
                std::fs::write(&self.path, vec![0u8; self.output_bytes])?;
                Ok(Some(self.path.clone()))
            }
            FinishOutcome::NoFile => Ok(None),
            FinishOutcome::Fail => bail!("encoder flush failed"),
        }
    }
}

/// Sends a sample for `level` on the 0..=100 scale into the active recording.
pub fn feed_level(feed: &SampleFeed, level: f32, timestamp_ms: u64) {
    let raw = level * 1.6 - 160.0;
    let guard = feed.lock().unwrap();
    let sender = guard.as_ref().expect("no recording is active");
    sender
        .send(LevelSample::new(raw, timestamp_ms))
        .expect("level pump is gone");
}

pub fn feed_raw(feed: &SampleFeed, raw_decibels: f32, timestamp_ms: u64) {
    let guard = feed.lock().unwrap();
    let sender = guard.as_ref().expect("no recording is active");
    sender
        .send(LevelSample::new(raw_decibels, timestamp_ms))
        .expect("level pump is gone");
}

type CompletionSlot = Arc<Mutex<Option<oneshot::Sender<()>>>>;

/// Player that only finishes when the test says so.
pub struct FakePlayer {
    pub loads: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    completion: CompletionSlot,
    pub fail_load: bool,
    pub stop_delay: Duration,
}

impl FakePlayer {
    pub fn new() -> Self {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            completion: Arc::new(Mutex::new(None)),
            fail_load: false,
            stop_delay: Duration::ZERO,
        }
    }

    pub fn completion_handle(&self) -> CompletionSlot {
        Arc::clone(&self.completion)
    }
}

/// Resolves the end-of-media signal of whatever is playing.
pub fn finish_playback(slot: &CompletionSlot) -> bool {
    match slot.lock().unwrap().take() {
        Some(done) => done.send(()).is_ok(),
        None => false,
    }
}

#[async_trait]
impl PlaybackBackend for FakePlayer {
    async fn load(&self, path: &Path) -> Result<Box<dyn PlaybackHandle>> {
        if self.fail_load {
            bail!("decoder unavailable for {:?}", path);
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePlayback {
            completion: Arc::clone(&self.completion),
            stops: Arc::clone(&self.stops),
            stop_delay: self.stop_delay,
        }))
    }
}

struct FakePlayback {
    completion: CompletionSlot,
    stops: Arc<AtomicUsize>,
    stop_delay: Duration,
}

#[async_trait]
impl PlaybackHandle for FakePlayback {
    async fn play(&mut self) -> Result<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        *self.completion.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn stop(self: Box<Self>) -> Result<()> {
        if !self.stop_delay.is_zero() {
            tokio::time::sleep(self.stop_delay).await;
        }
        self.completion.lock().unwrap().take();
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn duration_ms(&self) -> u64 {
        1_000
    }
}

/// A session wired to fakes, writing into its own temp directory.
pub struct Harness {
    pub session: VoiceSession,
    pub dir: TempDir,
    pub permission_calls: Arc<AtomicUsize>,
    pub routing: Arc<Mutex<Vec<AudioRoutingMode>>>,
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
    pub feed: SampleFeed,
    pub loads: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub completion: CompletionSlot,
}

pub struct HarnessBuilder {
    grant: bool,
    permission_delay: Duration,
    routing_fails_on: Option<AudioRoutingMode>,
    capture: FakeCapture,
    player: FakePlayer,
    settings: Settings,
    log_every: u64,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            grant: true,
            permission_delay: Duration::ZERO,
            routing_fails_on: None,
            capture: FakeCapture::new(4_096),
            player: FakePlayer::new(),
            settings: Settings::default(),
            log_every: 1,
        }
    }

    pub fn deny_permission(mut self) -> Self {
        self.grant = false;
        self
    }

    pub fn permission_delay(mut self, delay: Duration) -> Self {
        self.permission_delay = delay;
        self
    }

    pub fn routing_fails_on(mut self, mode: AudioRoutingMode) -> Self {
        self.routing_fails_on = Some(mode);
        self
    }

    pub fn slow_player_stop(mut self, delay: Duration) -> Self {
        self.player.stop_delay = delay;
        self
    }

    pub fn capture(mut self, capture: FakeCapture) -> Self {
        self.capture = capture;
        self
    }

    pub fn failing_player(mut self) -> Self {
        self.player.fail_load = true;
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn log_every(mut self, n: u64) -> Self {
        self.log_every = n;
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let permission_calls = Arc::new(AtomicUsize::new(0));
        let routing = FakeRouting {
            fail_on: self.routing_fails_on,
            ..FakeRouting::default()
        };
        let applied = Arc::clone(&routing.applied);

        let opened = Arc::clone(&self.capture.opened);
        let released = Arc::clone(&self.capture.released);
        let feed = self.capture.feed_handle();
        let loads = Arc::clone(&self.player.loads);
        let stops = Arc::clone(&self.player.stops);
        let completion = self.player.completion_handle();

        let parts = SessionParts {
            permissions: Box::new(FakePermissions {
                grant: self.grant,
                calls: Arc::clone(&permission_calls),
                delay: self.permission_delay,
            }),
            routing: Box::new(routing),
            routing_options: RoutingOptions::default(),
            capture: Arc::new(self.capture),
            playback: Arc::new(self.player),
            store: Arc::new(FsFileStore),
            recorder: RecorderConfig {
                directory: dir.path().join("recordings"),
                format: format_for(Platform::Linux),
                log_every_n_samples: self.log_every,
            },
        };

        Harness {
            session: VoiceSession::new(parts, self.settings).unwrap(),
            dir,
            permission_calls,
            routing: applied,
            opened,
            released,
            feed,
            loads,
            stops,
            completion,
        }
    }
}

/// Next event matching `pick`, failing the test after two seconds.
pub async fn next_event<T>(
    events: &mut broadcast::Receiver<SessionEvent>,
    mut pick: impl FnMut(SessionEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(found) = pick(event) {
                        return found;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}
