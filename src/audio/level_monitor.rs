//! Loudness normalization and voice-activity classification.
//!
//! The per-sample primitives (`normalize`, `classify`, `on_sample`) are pure and
//! keep no history. `SilenceTracker` and `LevelMonitor` layer the stateful
//! concerns (debouncing, log subsampling) on top of them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest decibel value a platform meter reports.
pub const DB_FLOOR: f32 = -160.0;

/// Top of the normalized scale.
pub const LEVEL_MAX: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Silence,
    Medium,
    Speech,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Silence => "silence",
            Classification::Medium => "medium",
            Classification::Speech => "speech",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettingsError {
    #[error("{name} must be within 0..=100 (got {value})")]
    ThresholdOutOfRange { name: &'static str, value: f32 },
    #[error("silence_threshold ({silence}) must be lower than speech_threshold ({speech})")]
    ThresholdsOutOfOrder { silence: f32, speech: f32 },
    #[error("sample_interval_ms must be greater than zero")]
    ZeroSampleInterval,
}

/// Level thresholds and sampling cadence for one recording session.
///
/// Snapshotted when a recording starts and never mutated while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub silence_threshold: f32,
    pub speech_threshold: f32,
    /// Consumed by `SilenceTracker`, not by per-sample classification.
    pub silence_duration_ms: u64,
    pub sample_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            silence_threshold: 75.0,
            speech_threshold: 78.0,
            silence_duration_ms: 1500,
            sample_interval_ms: 100,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, value) in [
            ("silence_threshold", self.silence_threshold),
            ("speech_threshold", self.speech_threshold),
        ] {
            if !(0.0..=LEVEL_MAX).contains(&value) {
                return Err(SettingsError::ThresholdOutOfRange { name, value });
            }
        }

        if self.silence_threshold >= self.speech_threshold {
            return Err(SettingsError::ThresholdsOutOfOrder {
                silence: self.silence_threshold,
                speech: self.speech_threshold,
            });
        }

        if self.sample_interval_ms == 0 {
            return Err(SettingsError::ZeroSampleInterval);
        }

        Ok(())
    }
}

/// One raw meter reading delivered by the capture backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSample {
    pub raw_decibels: f32,
    /// Milliseconds since the recording started.
    pub timestamp_ms: u64,
}

impl LevelSample {
    pub fn new(raw_decibels: f32, timestamp_ms: u64) -> Self {
        Self {
            raw_decibels,
            timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelReading {
    pub normalized: f32,
    pub classification: Classification,
    pub timestamp_ms: u64,
}

#[derive(Debug, Error, PartialEq)]
pub enum LevelError {
    #[error("invalid level sample at {timestamp_ms}ms: {raw_decibels} dB")]
    InvalidSample { raw_decibels: f32, timestamp_ms: u64 },
}

/// Maps `[-160, 0]` dB onto `[0, 100]`, clamping anything outside.
pub fn normalize(raw_db: f32) -> f32 {
    ((raw_db - DB_FLOOR) / -DB_FLOOR * LEVEL_MAX).clamp(0.0, LEVEL_MAX)
}

/// Strict comparisons: a value sitting exactly on a threshold belongs to the lower tier.
pub fn classify(normalized: f32, settings: &Settings) -> Classification {
    if normalized > settings.speech_threshold {
        Classification::Speech
    } else if normalized > settings.silence_threshold {
        Classification::Medium
    } else {
        Classification::Silence
    }
}

pub fn on_sample(sample: &LevelSample, settings: &Settings) -> Result<LevelReading, LevelError> {
    if !sample.raw_decibels.is_finite() {
        return Err(LevelError::InvalidSample {
            raw_decibels: sample.raw_decibels,
            timestamp_ms: sample.timestamp_ms,
        });
    }

    let normalized = normalize(sample.raw_decibels);
    Ok(LevelReading {
        normalized,
        classification: classify(normalized, settings),
        timestamp_ms: sample.timestamp_ms,
    })
}

/// Reports a silent stretch once it has lasted `silence_duration_ms`.
#[derive(Debug, Clone)]
pub struct SilenceTracker {
    silence_duration_ms: u64,
    silent_since: Option<u64>,
    reported: bool,
}

impl SilenceTracker {
    pub fn new(silence_duration_ms: u64) -> Self {
        Self {
            silence_duration_ms,
            silent_since: None,
            reported: false,
        }
    }

    /// Returns the silent duration the first time it crosses the limit; `None` otherwise.
    pub fn observe(&mut self, reading: &LevelReading) -> Option<u64> {
        if reading.classification != Classification::Silence {
            self.silent_since = None;
            self.reported = false;
            return None;
        }

        let since = *self.silent_since.get_or_insert(reading.timestamp_ms);
        let elapsed = reading.timestamp_ms.saturating_sub(since);

        if !self.reported && elapsed >= self.silence_duration_ms {
            self.reported = true;
            return Some(elapsed);
        }

        None
    }
}

/// Outcome of feeding one sample through `LevelMonitor::process`.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorUpdate {
    pub reading: LevelReading,
    /// Set when this sample should produce a diagnostic line.
    pub log: bool,
    pub sustained_silence_ms: Option<u64>,
}

/// Per-session wrapper around `on_sample`.
#[derive(Debug, Clone)]
pub struct LevelMonitor {
    settings: Settings,
    silence: SilenceTracker,
    log_every: u64,
    samples_seen: u64,
    last_classification: Option<Classification>,
}

impl LevelMonitor {
    pub fn new(settings: Settings, log_every: u64) -> Self {
        Self {
            settings,
            silence: SilenceTracker::new(settings.silence_duration_ms),
            log_every: log_every.max(1),
            samples_seen: 0,
            last_classification: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn process(&mut self, sample: &LevelSample) -> Result<MonitorUpdate, LevelError> {
        let reading = on_sample(sample, &self.settings)?;

        let changed = self.last_classification != Some(reading.classification);
        let log = changed || self.samples_seen % self.log_every == 0;
        self.samples_seen += 1;
        self.last_classification = Some(reading.classification);

        let sustained_silence_ms = self.silence.observe(&reading);

        Ok(MonitorUpdate {
            reading,
            log,
            sustained_silence_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds(silence: f32, speech: f32) -> Settings {
        Settings {
            silence_threshold: silence,
            speech_threshold: speech,
            ..Settings::default()
        }
    }

    fn raw_for(level: f32) -> f32 {
        level / LEVEL_MAX * -DB_FLOOR + DB_FLOOR
    }

    #[test]
    fn test_normalize_endpoints() {
        assert_eq!(normalize(-160.0), 0.0);
        assert_eq!(normalize(0.0), 100.0);
        assert_eq!(normalize(-80.0), 50.0);
    }

    #[test]
    fn test_normalize_stays_in_bounds() {
        let mut raw = -200.0f32;
        while raw <= 20.0 {
            let level = normalize(raw);
            assert!((0.0..=100.0).contains(&level), "{raw} -> {level}");
            raw += 0.5;
        }
        assert_eq!(normalize(-200.0), 0.0);
        assert_eq!(normalize(20.0), 100.0);
    }

    #[test]
    fn test_classify_boundaries_use_lower_tier() {
        let settings = thresholds(75.0, 78.0);
        assert_eq!(classify(75.0, &settings), Classification::Silence);
        assert_eq!(classify(75.01, &settings), Classification::Medium);
        assert_eq!(classify(78.0, &settings), Classification::Medium);
        assert_eq!(classify(78.01, &settings), Classification::Speech);
        assert_eq!(classify(0.0, &settings), Classification::Silence);
        assert_eq!(classify(100.0, &settings), Classification::Speech);
    }

    #[test]
    fn test_on_sample_rejects_non_finite() {
        let settings = Settings::default();
        let err = on_sample(&LevelSample::new(f32::NAN, 5), &settings).unwrap_err();
        assert!(matches!(err, LevelError::InvalidSample { timestamp_ms: 5, .. }));
        assert!(on_sample(&LevelSample::new(f32::NEG_INFINITY, 0), &settings).is_err());
    }

    #[test]
    fn test_on_sample_has_no_memory() {
        let settings = thresholds(75.0, 78.0);
        let loud = LevelSample::new(raw_for(90.0), 0);
        let quiet = LevelSample::new(raw_for(10.0), 100);

        let first = on_sample(&quiet, &settings).unwrap();
        on_sample(&loud, &settings).unwrap();
        let again = on_sample(&quiet, &settings).unwrap();
        assert_eq!(first.classification, again.classification);
        assert_eq!(first.normalized, again.normalized);
    }

    #[test]
    fn test_settings_validation() {
        assert!(Settings::default().validate().is_ok());
        assert_eq!(
            thresholds(80.0, 78.0).validate(),
            Err(SettingsError::ThresholdsOutOfOrder {
                silence: 80.0,
                speech: 78.0
            })
        );
        assert!(matches!(
            thresholds(10.0, 120.0).validate(),
            Err(SettingsError::ThresholdOutOfRange {
                name: "speech_threshold",
                ..
            })
        ));
        let settings = Settings {
            sample_interval_ms: 0,
            ..Settings::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::ZeroSampleInterval));
    }

    #[test]
    fn test_silence_tracker_reports_once_per_stretch() {
        let settings = Settings {
            silence_duration_ms: 300,
            ..Settings::default()
        };
        let mut tracker = SilenceTracker::new(settings.silence_duration_ms);
        let reading = |level: f32, ts: u64| on_sample(&LevelSample::new(raw_for(level), ts), &settings).unwrap();

        assert_eq!(tracker.observe(&reading(10.0, 0)), None);
        assert_eq!(tracker.observe(&reading(10.0, 100)), None);
        assert_eq!(tracker.observe(&reading(10.0, 200)), None);
        assert_eq!(tracker.observe(&reading(10.0, 300)), Some(300));
        assert_eq!(tracker.observe(&reading(10.0, 400)), None);

        // speech resets the stretch
        assert_eq!(tracker.observe(&reading(95.0, 500)), None);
        assert_eq!(tracker.observe(&reading(10.0, 600)), None);
        assert_eq!(tracker.observe(&reading(10.0, 900)), Some(300));
    }

    #[test]
    fn test_monitor_logs_on_change_and_cadence() {
        let settings = thresholds(75.0, 78.0);
        let mut monitor = LevelMonitor::new(settings, 3);
        let logs: Vec<bool> = [10.0, 10.0, 10.0, 10.0, 90.0, 90.0]
            .iter()
            .enumerate()
            .map(|(i, level)| {
                monitor
                    .process(&LevelSample::new(raw_for(*level), i as u64 * 100))
                    .unwrap()
                    .log
            })
            .collect();

        assert_eq!(logs, vec![true, false, false, true, true, false]);
    }

    #[test]
    fn test_classification_as_str() {
        assert_eq!(Classification::Silence.as_str(), "silence");
        assert_eq!(Classification::Medium.as_str(), "medium");
        assert_eq!(Classification::Speech.as_str(), "speech");
    }
}
