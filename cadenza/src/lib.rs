//! # Cadenza
//!
//! An embeddable audio playback engine with a small, thread-safe control
//! surface and an optional C ABI.
//!
//! Cadenza owns a loaded track, decodes it on a background thread, streams
//! the samples to an output device through a lock-free ring buffer, and keeps
//! the reported position consistent while callers play, pause, seek and stop
//! from any thread.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cadenza::*;
//!
//! // Bring up the process-wide audio system on the default device
//! let audio = system::initialize()?;
//!
//! // Create a player handle and load a track
//! let player = CadenzaPlayer::new(&audio)?;
//! player.load("song.mp3")?;
//! println!("{:.1}s long", player.duration());
//!
//! player.set_volume(80);
//! player.play()?;
//! player.set_position(30.0)?;
//!
//! // Poll for events
//! for event in player.poll_events() {
//!     if let PlayerEvent::TrackFinished = event {
//!         println!("Done");
//!     }
//! }
//!
//! drop(player);
//! system::cleanup()?;
//! # Ok::<(), CadenzaError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`AudioSystem`]**: process-wide state; owns the output backend and configuration
//! - **[`CadenzaPlayer`]**: a player handle, one loaded track at a time
//! - **[`MediaDecoder`](decoder::MediaDecoder)**: pull-based decoder (Symphonia by default)
//! - **[`AudioBackend`](output::AudioBackend)**: output device abstraction (cpal or [`VirtualOutput`])
//! - **[`PlayerEvent`]**: notifications (state changes, end of track, underruns, errors)
//!
//! ## Architecture
//!
//! Each playing handle runs three kinds of threads:
//!
//! 1. **Caller threads**: issue commands; serialized per handle by a command lock
//! 2. **Decode thread**: decodes, converts to the device format and fills the ring buffer
//! 3. **Output thread**: owns the device stream; its callback drains the ring buffer,
//!    applies volume and advances the playback clock
//!
//! Playback state, volume and position are atomics, so the device callback
//! never takes a lock and getters never block.
//!
//! ## Features
//!
//! - `ffi` (default): exports the C surface in `ffi` (the
//!   crate is always built as both `rlib` and `cdylib`)

pub mod config;
mod controller;
pub mod decoder;
pub mod error;
pub mod events;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod output;
pub mod playback;
pub mod player;
pub mod ring_buffer;
pub mod system;
pub mod volume;
mod worker;

pub use config::CadenzaConfig;
pub use decoder::{ResamplerType, Track, TrackSpec};
pub use error::{CadenzaError, DecodeError, InitError, Result};
pub use events::PlayerEvent;
pub use output::{AudioBackend, CpalBackend, DeviceSpec, VirtualOutput};
pub use playback::{PlaybackState, PlayerStats};
pub use player::CadenzaPlayer;
pub use system::AudioSystem;
pub use volume::{MAX_VOLUME, VolumeCurve};
