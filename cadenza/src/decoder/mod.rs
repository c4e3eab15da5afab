//! Media decoding.
//!
//! A [`MediaDecoder`] is a pull-based source of decoded audio for one track:
//! it knows the track's metadata, can seek by time, and hands out
//! [`DecodedFrame`]s until the end of the stream. Decoders are created by a
//! [`DecoderOpener`]; the engine ships [`SymphoniaOpener`], and embedders can
//! bring their own opener for formats Symphonia does not cover.
//!
//! [`FrameConverter`] adapts decoded frames to the output device's channel
//! layout and sample rate before they enter the ring buffer.

mod converter;
mod symphonia_decoder;
mod tags;

use crate::error::DecodeError;
pub use converter::{FrameConverter, ResamplerType, remix_channels};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
pub use symphonia_decoder::{SymphoniaDecoder, SymphoniaOpener};
pub use tags::read_song_length;

/// Sample format of a track as stored in the media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSpec {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Bits per coded sample, when the container reports it
    pub bits_per_sample: Option<u32>,
}

/// Immutable description of a loaded track.
///
/// Cheap to clone; all clones share one allocation.
#[derive(Debug, Clone)]
pub struct Track {
    inner: Arc<TrackInner>,
}

#[derive(Debug)]
struct TrackInner {
    path: PathBuf,
    codec: String,
    spec: TrackSpec,
    media_duration: f64,
    song_length: Option<f64>,
}

impl Track {
    pub fn new(
        path: impl Into<PathBuf>,
        codec: impl Into<String>,
        spec: TrackSpec,
        media_duration: f64,
        song_length: Option<f64>,
    ) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                path: path.into(),
                codec: codec.into(),
                spec,
                media_duration: media_duration.max(0.0),
                song_length,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn codec(&self) -> &str {
        &self.inner.codec
    }

    pub fn spec(&self) -> TrackSpec {
        self.inner.spec
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.spec.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.spec.channels
    }

    /// Duration measured by the decoder from the container, in seconds.
    pub fn media_duration(&self) -> f64 {
        self.inner.media_duration
    }

    /// Length reported by the file's metadata, in seconds.
    ///
    /// May legitimately differ from [`Track::media_duration`] (VBR estimates,
    /// stale tag values), and is `None` when the metadata could not be read.
    pub fn song_length(&self) -> Option<f64> {
        self.inner.song_length
    }
}

/// One chunk of decoded audio: interleaved `f32` samples for a run of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Interleaved samples, `frames() * channels` long
    pub samples: Vec<f32>,
    /// Channel count of `samples`
    pub channels: u16,
    /// Track time of the first frame, in seconds
    pub timestamp: f64,
}

impl DecodedFrame {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Pull-based decoder for one open track.
pub trait MediaDecoder: Send {
    fn track(&self) -> &Track;

    /// Decoder-measured duration in seconds.
    fn duration(&self) -> f64 {
        self.track().media_duration()
    }

    /// Seek to `seconds`. Returns the track time of the first frame the next
    /// call to [`MediaDecoder::next_frame`] will produce, which may differ from
    /// the request when the format only supports coarse seeking.
    fn seek(&mut self, seconds: f64) -> Result<f64, DecodeError>;

    /// Decode the next chunk. `Ok(None)` marks the end of the stream.
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError>;
}

/// Cancellation flag for a track that is being opened.
///
/// Openers poll it between expensive steps (probing, scanning packets) and
/// give up with [`DecodeError::Cancelled`] once it is set. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(DecodeError::Cancelled)` once the token is cancelled.
    pub fn check(&self) -> Result<(), DecodeError> {
        if self.is_cancelled() {
            Err(DecodeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Opens media sources into decoders.
///
/// Implementations must validate that the source is decodable before
/// returning success, and should check `cancel` between slow steps.
pub trait DecoderOpener: Send + Sync {
    fn open(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<Box<dyn MediaDecoder>, DecodeError>;
}
