//! Per-platform recording format table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Macos,
    Windows,
    Ios,
    Android,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Macos
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Macos => "macos",
            Platform::Windows => "windows",
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }

    pub fn all() -> [Platform; 5] {
        [
            Platform::Linux,
            Platform::Macos,
            Platform::Windows,
            Platform::Ios,
            Platform::Android,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Wav,
    M4a,
    ThreeGp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodingConfig {
    pub container: Container,
    pub extension: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl EncodingConfig {
    pub fn is_wav(&self) -> bool {
        self.container == Container::Wav
    }
}

pub fn format_for(platform: Platform) -> EncodingConfig {
    match platform {
        Platform::Linux | Platform::Windows => EncodingConfig {
            container: Container::Wav,
            extension: "wav",
            sample_rate: 16_000,
            channels: 1,
            bits_per_sample: 16,
        },
        Platform::Macos => EncodingConfig {
            container: Container::Wav,
            extension: "wav",
            sample_rate: 44_100,
            channels: 1,
            bits_per_sample: 16,
        },
        Platform::Ios => EncodingConfig {
            container: Container::M4a,
            extension: "m4a",
            sample_rate: 44_100,
            channels: 1,
            bits_per_sample: 16,
        },
        Platform::Android => EncodingConfig {
            container: Container::ThreeGp,
            extension: "3gp",
            sample_rate: 16_000,
            channels: 1,
            bits_per_sample: 16,
        },
    }
}
