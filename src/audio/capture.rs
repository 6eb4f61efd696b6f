//! Capture backend abstraction.
//!
//! A backend allocates one platform recording resource per `open` call. The
//! returned handle is the only way to release it, and `finish` consumes the
//! handle, so a resource can never be released twice.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use super::format::EncodingConfig;
use super::level_monitor::LevelSample;
use crate::diagnostics::DiagnosticLog;

pub struct CaptureRequest {
    /// Destination the finalized recording is written to.
    pub path: PathBuf,
    pub format: EncodingConfig,
    /// Nominal level-metering cadence. Delivery timing is best effort.
    pub sample_interval: Duration,
    /// Level samples go here. The backend must drop every clone once the
    /// resource is finished so the receiving side can drain and exit.
    pub samples: mpsc::UnboundedSender<LevelSample>,
    /// For failures raised inside platform callbacks.
    pub log: DiagnosticLog,
}

#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn open(&self, request: CaptureRequest) -> Result<Box<dyn CaptureHandle>>;
}

#[async_trait]
pub trait CaptureHandle: Send {
    /// Stop capturing, finalize the file and release the device.
    ///
    /// Returns the file reference the platform produced, if any.
    async fn finish(self: Box<Self>) -> Result<Option<PathBuf>>;
}
