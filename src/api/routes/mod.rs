//! API route modules.

pub mod diagnostics;
pub mod playback;
pub mod recording;

use crate::session::VoiceSession;
use std::sync::Arc;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct ApiState {
    pub session: Arc<VoiceSession>,
}
