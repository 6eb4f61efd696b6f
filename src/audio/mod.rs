pub mod capture;
pub mod file_store;
pub mod format;
pub mod level_monitor;
pub mod mic_source;
pub mod playback_controller;
pub mod player;
pub mod recording_controller;
pub mod resample;
pub mod session_gate;
pub mod status;

pub use capture::{CaptureBackend, CaptureHandle, CaptureRequest};
pub use file_store::{FileStore, FsFileStore};
pub use format::{format_for, Container, EncodingConfig, Platform};
pub use level_monitor::{
    classify, normalize, on_sample, Classification, LevelMonitor, LevelReading, LevelSample,
    Settings, SettingsError, SilenceTracker,
};
pub use mic_source::CpalCaptureBackend;
pub use playback_controller::{PlaybackController, PlaybackError, PlaybackSession, PlaybackState};
pub use player::{CpalPlaybackBackend, PlaybackBackend, PlaybackHandle};
pub use recording_controller::{
    CompletedRecording, RecorderConfig, RecordingController, RecordingError, RecordingSession,
    RecordingState,
};
pub use session_gate::{
    AudioRouting, AudioRoutingMode, AudioSessionGate, PermissionProvider, PermissionState,
    RoutingError, RoutingOptions,
};
pub use status::{SessionEvent, SessionStatus, SessionStatusHandle};
