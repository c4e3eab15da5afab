//! Playback state and position tracking.
//!
//! This module provides the lock-free pieces of state that caller threads and
//! the output thread share:
//! - [`PlaybackState`]: the player state machine's states
//! - [`AtomicPlaybackState`]: a state cell that only changes by compare-and-swap
//! - [`PlaybackClock`]: playback position derived from frames emitted to the device
//! - [`PlayerStats`]: telemetry snapshot (underruns, buffered frames)

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

/// Current state of a player handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PlaybackState {
    /// No track has been loaded yet
    Idle = 0,
    /// A track is open and primed but not playing
    Loaded = 1,
    /// The output thread is consuming decoded audio
    Playing = 2,
    /// The device stream is alive but emits silence; position is frozen
    Paused = 3,
    /// Playback ended (by `stop` or end of stream); position is 0
    Stopped = 4,
    /// Load failed, decoding failed, or the device was lost
    Error = 5,
}

impl PlaybackState {
    /// Integer code used across the foreign-call surface.
    pub fn code(self) -> i32 {
        self as u8 as i32
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Idle),
            1 => Some(Self::Loaded),
            2 => Some(Self::Playing),
            3 => Some(Self::Paused),
            4 => Some(Self::Stopped),
            5 => Some(Self::Error),
            _ => None,
        }
    }

    /// States in which a decode thread and output stream exist.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Playback state stored as a single atomic byte.
///
/// Every transition is one compare-and-swap, so the output thread always
/// observes a whole state and never needs the command lock.
#[derive(Debug)]
pub struct AtomicPlaybackState(AtomicU8);

impl AtomicPlaybackState {
    pub fn new(state: PlaybackState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> PlaybackState {
        PlaybackState::from_code(self.0.load(Ordering::Acquire)).unwrap_or(PlaybackState::Error)
    }

    pub fn store(&self, state: PlaybackState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`. On failure returns the state actually observed.
    pub fn transition(
        &self,
        from: PlaybackState,
        to: PlaybackState,
    ) -> Result<(), PlaybackState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|observed| PlaybackState::from_code(observed).unwrap_or(PlaybackState::Error))
    }
}

/// Playback position in device frames.
///
/// The output thread advances it by the number of decoded frames it actually
/// wrote to the device; seeks overwrite it. Readers convert to seconds and
/// clamp to `[0, duration]`.
#[derive(Debug)]
pub struct PlaybackClock {
    frames: AtomicU64,
    sample_rate: AtomicU32,
    duration_bits: AtomicU64,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate: AtomicU32::new(0),
            duration_bits: AtomicU64::new(0f64.to_bits()),
        }
    }
}

impl PlaybackClock {
    /// Prepare for a new track played at `sample_rate` and lasting `duration` seconds.
    pub fn configure(&self, sample_rate: u32, duration: f64) {
        self.frames.store(0, Ordering::Release);
        self.sample_rate.store(sample_rate, Ordering::Release);
        self.duration_bits
            .store(duration.max(0.0).to_bits(), Ordering::Release);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub fn duration(&self) -> f64 {
        f64::from_bits(self.duration_bits.load(Ordering::Acquire))
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Add `frames` to a position last read as `observed`.
    ///
    /// Fails, leaving the clock untouched, when a seek or reset stored a new
    /// position after `observed` was read.
    pub fn advance_from(&self, observed: u64, frames: usize) -> bool {
        self.frames
            .compare_exchange(
                observed,
                observed + frames as u64,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn reset(&self) {
        self.frames.store(0, Ordering::Release);
    }

    /// Clamp `seconds` into `[0, duration]`.
    pub fn clamp(&self, seconds: f64) -> f64 {
        if seconds.is_nan() {
            return 0.0;
        }
        seconds.clamp(0.0, self.duration())
    }

    /// Jump to `seconds` (clamped). Returns the stored position in seconds.
    pub fn seek_to(&self, seconds: f64) -> f64 {
        let seconds = self.clamp(seconds);
        let frames = (seconds * self.sample_rate() as f64).round() as u64;
        self.frames.store(frames, Ordering::Release);
        seconds
    }

    /// Current position in seconds, clamped to `[0, duration]`.
    pub fn position(&self) -> f64 {
        let rate = self.sample_rate();
        if rate == 0 {
            return 0.0;
        }
        self.clamp(self.frames() as f64 / rate as f64)
    }
}

/// Telemetry snapshot for a player handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStats {
    /// Device periods that found the ring buffer short while playing
    pub underruns: u64,
    /// Decoded frames waiting in the ring buffer
    pub buffered_frames: usize,
    /// Position in device frames
    pub frames_emitted: u64,
}
