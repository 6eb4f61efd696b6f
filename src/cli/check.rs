//! CLI handler for the record → classify → play back scenario.
//!
//! This module handles terminal presentation. The pipeline itself lives in
//! `session`; this only drives it and renders what it reports.

use crate::app;
use crate::audio::{Classification, LevelReading, PermissionState, SessionEvent};
use crate::config::Config;
use crate::session::VoiceSession;
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::args::CheckCliArgs;

pub async fn handle_check_command(args: CheckCliArgs) -> Result<()> {
    let config = Config::load()?;
    let session = app::build_session(&config, true)?;

    let result = run_check(&session, &args, &config).await;

    if let Err(e) = session.teardown().await {
        warn!("Teardown failed: {}", e);
    }

    let errors = session.diagnostics().error_count();
    if errors > 0 {
        println!("\n{} diagnostic error(s):", errors);
        for event in session.diagnostics().snapshot().iter().filter(|e| e.is_error) {
            println!("  {}", event.message);
        }
    }

    result
}

async fn run_check(session: &VoiceSession, args: &CheckCliArgs, config: &Config) -> Result<()> {
    if session.request_permission().await != PermissionState::Granted {
        bail!("Microphone access was not granted");
    }

    let mut events = session.subscribe();
    let recording = session.start_recording().await?;
    println!("Recording to {}", recording.file_path.display());
    println!(
        "Speak now ({}s max{}), Ctrl+C to stop early",
        args.seconds,
        if args.stop_on_silence {
            ", stops on silence"
        } else {
            ""
        }
    );

    let meter = create_level_meter();
    let mut tally = LevelTally::default();
    let mut interrupted = false;
    let deadline = Instant::now() + Duration::from_secs(args.seconds);

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Level(reading)) => {
                    tally.record(&reading);
                    meter.set_position(reading.normalized.round() as u64);
                    meter.set_message(reading.classification.as_str());
                }
                Ok(SessionEvent::SustainedSilence { duration_ms }) if args.stop_on_silence => {
                    debug!("Stopping after {}ms of silence", duration_ms);
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!("Level meter skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    }

    meter.finish_and_clear();
    let completed = session.stop_recording().await?;

    println!(
        "Recorded {:.1}s, {} bytes",
        completed.duration_ms as f64 / 1000.0,
        completed.size_bytes
    );
    println!("{}", tally.summary());

    completed.ensure_usable().context("Nothing to play back")?;

    if args.no_playback || interrupted {
        return Ok(());
    }

    let mut events = session.subscribe();
    let loaded = session.load(&completed.file_path).await?;
    println!("Playing back ({:.1}s)...", loaded.duration_ms as f64 / 1000.0);
    session.play().await?;

    let finished = wait_for_playback(session, &mut events).await?;

    if finished && config.recording.delete_after_playback {
        session.discard(&completed).await?;
        println!("Deleted {}", completed.file_path.display());
    } else {
        println!("Saved {}", completed.file_path.display());
    }

    Ok(())
}

/// Waits for natural completion. Returns `false` when interrupted.
async fn wait_for_playback(
    session: &VoiceSession,
    events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
) -> Result<bool> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                session.stop_playback().await?;
                return Ok(false);
            }
            event = events.recv() => match event {
                Ok(SessionEvent::PlaybackFinished { .. }) => return Ok(true),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(false),
            }
        }
    }
}

fn create_level_meter() -> ProgressBar {
    let pb = ProgressBar::new(100);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3} {msg}")
    {
        pb.set_style(style.progress_chars("━╸━"));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[derive(Debug, Default)]
struct LevelTally {
    silence: usize,
    medium: usize,
    speech: usize,
    peak: f32,
}

impl LevelTally {
    fn record(&mut self, reading: &LevelReading) {
        match reading.classification {
            Classification::Silence => self.silence += 1,
            Classification::Medium => self.medium += 1,
            Classification::Speech => self.speech += 1,
        }
        self.peak = self.peak.max(reading.normalized);
    }

    fn total(&self) -> usize {
        self.silence + self.medium + self.speech
    }

    fn summary(&self) -> String {
        if self.total() == 0 {
            return "No level samples received".to_string();
        }
        let verdict = if self.speech > 0 {
            "speech detected"
        } else {
            "no speech detected, check the microphone"
        };
        format!(
            "Levels: {} silence, {} medium, {} speech (peak {:.0}): {}",
            self.silence, self.medium, self.speech, self.peak, verdict
        )
    }
}
