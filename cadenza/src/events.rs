//! Event types for Cadenza

use crate::playback::PlaybackState;
use std::path::PathBuf;

/// Notifications emitted by a player handle.
///
/// Events are queued on a bounded channel and drained with
/// [`CadenzaPlayer::poll_events`](crate::player::CadenzaPlayer::poll_events).
/// The output thread never blocks on a full queue; events that do not fit are dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    TrackLoaded {
        path: PathBuf,
        duration: f64,
    },
    /// The last decoded frame was played; the handle is now Stopped
    TrackFinished,
    SeekCompleted {
        requested: f64,
        actual: f64,
    },
    /// A device period found the ring buffer short; telemetry only
    BufferUnderrun {
        total: u64,
    },
    DecodeFailed {
        error: String,
    },
    DeviceLost {
        error: String,
    },
}
