//! Player handle: the public face of one playback pipeline.

use crate::controller::PlaybackController;
use crate::decoder::Track;
use crate::error::Result;
use crate::events::PlayerEvent;
use crate::playback::{PlaybackState, PlayerStats};
use crate::system::{AudioSystem, HandleRegistration};
use std::path::Path;

/// A player handle.
///
/// Owns at most one loaded track and the threads that play it. All methods
/// take `&self` and may be called from any thread; commands are serialized
/// per handle, while getters read lock-free snapshots and never wait on a
/// command in progress.
///
/// Commands return as soon as they are accepted. `play` starts the decode
/// and output threads and returns; the audio itself is produced on those
/// threads.
///
/// Dropping the handle stops playback, joins its threads and releases its
/// registration with the [`AudioSystem`].
pub struct CadenzaPlayer {
    controller: PlaybackController,
    _registration: HandleRegistration,
}

impl CadenzaPlayer {
    /// Create an idle player on `system`.
    ///
    /// # Errors
    ///
    /// Fails with [`InitError::NotInitialized`](crate::error::InitError::NotInitialized)
    /// once the system has been closed.
    pub fn new(system: &AudioSystem) -> Result<Self> {
        let registration = system.register_handle()?;
        Ok(Self {
            controller: PlaybackController::new(
                system.backend(),
                system.opener(),
                system.config().clone(),
            ),
            _registration: registration,
        })
    }

    /// Open a media file and prime it for playback.
    ///
    /// Accepted in every state; a track that is already playing is stopped
    /// and released first. The file is opened without holding the command
    /// lock, so other commands and getters stay responsive meanwhile. On
    /// success the player is `Loaded`.
    ///
    /// # Errors
    ///
    /// Decode failures (missing file, unsupported or corrupt media) and
    /// device format queries that fail. The player is left in `Error` with no
    /// threads running.
    ///
    /// [`CadenzaError::Cancelled`](crate::error::CadenzaError::Cancelled) when
    /// a `stop` or another `load` arrived before the file finished opening.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        self.controller.load(path.as_ref())
    }

    /// Start playback of the loaded track. Valid only while `Loaded`.
    pub fn play(&self) -> Result<()> {
        self.controller.play()
    }

    /// Valid only while `Playing`.
    pub fn pause(&self) -> Result<()> {
        self.controller.pause()
    }

    /// Valid only while `Paused`.
    pub fn resume(&self) -> Result<()> {
        self.controller.resume()
    }

    /// Stop playback and rewind to 0. Valid while `Playing` or `Paused`, or
    /// while a `load` is still opening its file, which it cancels.
    pub fn stop(&self) -> Result<()> {
        self.controller.stop()
    }

    /// Set the volume in percent, clamped to `[0, 100]`. Returns the stored value.
    pub fn set_volume(&self, percent: i32) -> u8 {
        self.controller.set_volume(percent)
    }

    pub fn volume(&self) -> u8 {
        self.controller.volume()
    }

    pub fn status(&self) -> PlaybackState {
        self.controller.state()
    }

    /// Seek to `seconds`.
    ///
    /// The target is clamped to `[0, duration]`. Seeking while not playing or
    /// paused is accepted and ignored. [`CadenzaPlayer::position`] reports the
    /// target immediately and switches to the position the decoder actually
    /// landed on once the seek completes.
    pub fn set_position(&self, seconds: f64) -> Result<()> {
        self.controller.set_position(seconds)
    }

    /// Playback position in seconds.
    pub fn position(&self) -> f64 {
        self.controller.position()
    }

    /// Authoritative track duration in seconds; 0 when nothing is loaded.
    pub fn duration(&self) -> f64 {
        self.controller.duration()
    }

    /// Duration measured by the decoder, in seconds.
    pub fn media_duration(&self) -> Option<f64> {
        self.controller.track().map(|track| track.media_duration())
    }

    /// Length recorded in the file's metadata, in seconds.
    pub fn song_length(&self) -> Option<f64> {
        self.controller.track().and_then(|track| track.song_length())
    }

    pub fn track(&self) -> Option<Track> {
        self.controller.track()
    }

    pub fn stats(&self) -> PlayerStats {
        self.controller.stats()
    }

    /// Drain queued events without blocking.
    pub fn poll_events(&self) -> Vec<PlayerEvent> {
        self.controller.poll_events()
    }
}

impl Drop for CadenzaPlayer {
    fn drop(&mut self) {
        self.controller.shutdown();
    }
}
