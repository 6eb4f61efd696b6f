//! Desktop implementations of the permission and routing seams.
//!
//! Desktop hosts have no OS-level microphone prompt or audio-session category,
//! so permission means "an input device exists and the user agreed", and a
//! routing switch checks that the device the mode needs is present.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::io::{self, IsTerminal};
use tracing::{debug, info, warn};

use crate::audio::{AudioRouting, AudioRoutingMode, PermissionProvider, RoutingOptions};

pub struct DevicePermissionProvider {
    prompt: bool,
}

impl DevicePermissionProvider {
    pub fn new(prompt: bool) -> Self {
        Self { prompt }
    }
}

#[async_trait]
impl PermissionProvider for DevicePermissionProvider {
    async fn request_permission(&self) -> Result<bool> {
        let device = tokio::task::spawn_blocking(default_device_name_for(AudioRoutingMode::Record))
            .await
            .context("Device probe task failed")??;

        let Some(name) = device else {
            warn!("No microphone found, treating permission as denied");
            return Ok(false);
        };

        if !self.prompt || !io::stdin().is_terminal() {
            debug!("Granting microphone access to {} without prompting", name);
            return Ok(true);
        }

        let prompt = format!("Allow voicecheck to use the microphone \"{name}\"?");
        let granted = tokio::task::spawn_blocking(move || {
            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .default(true)
                .interact()
        })
        .await
        .context("Permission prompt task failed")?
        .context("Failed to read permission answer")?;

        info!("Microphone permission {}", if granted { "granted" } else { "denied" });
        Ok(granted)
    }
}

/// Validates device availability per mode; the host mixer owns actual routing.
#[derive(Debug, Default)]
pub struct HostRouting;

impl HostRouting {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioRouting for HostRouting {
    async fn apply(&self, mode: AudioRoutingMode, options: &RoutingOptions) -> Result<()> {
        let device = tokio::task::spawn_blocking(default_device_name_for(mode))
            .await
            .context("Device probe task failed")??;

        match device {
            Some(name) => {
                debug!(
                    "Routing for {} via {} (mix_with_others={}, duck_others={}, background={})",
                    mode,
                    name,
                    options.allow_mix_with_others,
                    options.duck_others,
                    options.persist_in_background
                );
                Ok(())
            }
            None => bail!("No {} device available", device_kind(mode)),
        }
    }
}

fn device_kind(mode: AudioRoutingMode) -> &'static str {
    match mode {
        AudioRoutingMode::Record => "input",
        AudioRoutingMode::Playback => "output",
    }
}

fn default_device_name_for(mode: AudioRoutingMode) -> impl FnOnce() -> Result<Option<String>> {
    move || {
        let host = cpal::default_host();
        let device = match mode {
            AudioRoutingMode::Record => host.default_input_device(),
            AudioRoutingMode::Playback => host.default_output_device(),
        };
        Ok(device.map(|d| d.name().unwrap_or_else(|_| "unknown".to_string())))
    }
}
