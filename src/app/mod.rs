use crate::api::ApiServer;
use crate::audio::{
    format_for, CpalCaptureBackend, CpalPlaybackBackend, FsFileStore, Platform, RecorderConfig,
};
use crate::config::Config;
use crate::platform::{DevicePermissionProvider, HostRouting};
use crate::session::{SessionParts, VoiceSession};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

/// Wires the desktop backends into a session configured from `config`.
///
/// `interactive` enables the permission prompt (when the config allows it).
pub fn build_session(config: &Config, interactive: bool) -> Result<VoiceSession> {
    let platform = Platform::current();
    let format = format_for(platform);
    let directory = config.recordings_dir()?;

    info!(
        "Recording {} ({} Hz, {} ch) into {:?} on {}",
        format.extension,
        format.sample_rate,
        format.channels,
        directory,
        platform.as_str()
    );

    let parts = SessionParts {
        permissions: Box::new(DevicePermissionProvider::new(
            interactive && config.permission.prompt,
        )),
        routing: Box::new(HostRouting::new()),
        routing_options: config.routing,
        capture: Arc::new(CpalCaptureBackend::new()),
        playback: Arc::new(CpalPlaybackBackend::new()),
        store: Arc::new(FsFileStore),
        recorder: RecorderConfig {
            directory,
            format,
            log_every_n_samples: config.recording.log_every_n_samples,
        },
    };

    VoiceSession::new(parts, config.levels).context("Failed to create voice session")
}

pub async fn run_service() -> Result<()> {
    info!("Starting voicecheck service");

    let config = Config::load()?;
    let session = Arc::new(build_session(&config, false)?);

    let api_server = ApiServer::new(Arc::clone(&session), &config);
    let server = tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("API server failed: {}", e);
        }
    });

    info!("voicecheck is ready!");
    info!(
        "Try: curl -X POST http://127.0.0.1:{}/recording/start",
        config.api.port
    );

    tokio::select! {
        _ = server => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    if let Err(e) = session.teardown().await {
        error!("Teardown failed: {}", e);
    }

    Ok(())
}
