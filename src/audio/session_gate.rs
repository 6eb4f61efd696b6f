//! Microphone permission and process-wide audio routing.
//!
//! Routing is process-wide platform state. Create exactly one
//! `AudioSessionGate` per process and share it; its recorded mode is the only
//! source of truth for which routing is applied. The gate never cancels active
//! sessions on a switch: callers must stop recording/playback first.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::diagnostics::DiagnosticLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Unknown,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionState::Unknown => "unknown",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioRoutingMode {
    Record,
    Playback,
}

impl AudioRoutingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioRoutingMode::Record => "record",
            AudioRoutingMode::Playback => "playback",
        }
    }
}

impl fmt::Display for AudioRoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags handed to the platform alongside the routing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingOptions {
    pub allow_mix_with_others: bool,
    pub duck_others: bool,
    pub persist_in_background: bool,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self {
            allow_mix_with_others: false,
            duck_others: true,
            persist_in_background: false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoutingError {
    #[error("failed to switch audio routing to {mode}: {reason}")]
    SwitchFailed {
        mode: AudioRoutingMode,
        reason: String,
    },
}

/// Platform prompt for microphone access.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// `Ok(true)` when the user granted access.
    async fn request_permission(&self) -> Result<bool>;
}

/// Platform audio routing switch.
#[async_trait]
pub trait AudioRouting: Send + Sync {
    async fn apply(&self, mode: AudioRoutingMode, options: &RoutingOptions) -> Result<()>;
}

pub struct AudioSessionGate {
    permissions: Box<dyn PermissionProvider>,
    routing: Box<dyn AudioRouting>,
    options: RoutingOptions,
    // Both locks are held across the platform call so concurrent callers queue
    // behind an in-flight prompt or switch instead of racing it.
    permission: Mutex<PermissionState>,
    mode: Mutex<Option<AudioRoutingMode>>,
    log: DiagnosticLog,
}

impl AudioSessionGate {
    pub fn new(
        permissions: Box<dyn PermissionProvider>,
        routing: Box<dyn AudioRouting>,
        options: RoutingOptions,
        log: DiagnosticLog,
    ) -> Self {
        Self {
            permissions,
            routing,
            options,
            permission: Mutex::new(PermissionState::Unknown),
            mode: Mutex::new(None),
            log,
        }
    }

    /// Prompts at most once per gate; later calls return the cached answer.
    /// Provider errors resolve to `Denied`.
    pub async fn request_permission(&self) -> PermissionState {
        let mut state = self.permission.lock().await;
        if *state != PermissionState::Unknown {
            return *state;
        }

        *state = match self.permissions.request_permission().await {
            Ok(true) => {
                self.log.info("Microphone permission granted");
                PermissionState::Granted
            }
            Ok(false) => {
                self.log.error("Microphone permission denied");
                PermissionState::Denied
            }
            Err(e) => {
                self.log
                    .error(format!("Microphone permission request failed: {e}"));
                PermissionState::Denied
            }
        };

        *state
    }

    pub async fn permission(&self) -> PermissionState {
        *self.permission.lock().await
    }

    /// Applies `mode` unless it is already active. Resolves only once the
    /// platform has finished switching.
    pub async fn set_routing_mode(&self, mode: AudioRoutingMode) -> Result<(), RoutingError> {
        let mut current = self.mode.lock().await;
        if *current == Some(mode) {
            debug!("Audio routing already in {} mode", mode);
            return Ok(());
        }

        match self.routing.apply(mode, &self.options).await {
            Ok(()) => {
                *current = Some(mode);
                info!("Audio routing switched to {} mode", mode);
                self.log.info(format!("Audio routing set to {mode}"));
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                self.log
                    .error(format!("Audio routing switch to {mode} failed: {reason}"));
                Err(RoutingError::SwitchFailed { mode, reason })
            }
        }
    }

    pub async fn routing_mode(&self) -> Option<AudioRoutingMode> {
        *self.mode.lock().await
    }

    pub fn options(&self) -> &RoutingOptions {
        &self.options
    }
}
