use crate::decoder::{
    CancelToken, DecodedFrame, DecoderOpener, MediaDecoder, Track, TrackSpec, read_song_length,
};
use crate::error::DecodeError;
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer,
        codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions},
        errors::Error,
        formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
        io::MediaSourceStream,
        meta::MetadataOptions,
        probe::Hint,
        units::{Time, TimeBase},
    },
    default::{get_codecs, get_probe},
};

// A decode error on a single packet is recoverable; this many in a row is not.
const MAX_DECODE_RETRIES: usize = 3;

/// Default opener backed by Symphonia (WAV, FLAC, MP3, OGG/Vorbis, ...).
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaOpener;

impl DecoderOpener for SymphoniaOpener {
    fn open(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<Box<dyn MediaDecoder>, DecodeError> {
        Ok(Box::new(SymphoniaDecoder::open_with_cancel(path, cancel)?))
    }
}

/// Streaming decoder for one track of a media file.
pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track: Track,
    track_id: u32,
    time_base: Option<TimeBase>,
    /// Frames to drop from the next decoded packets after an accurate seek
    skip_frames: u64,
    /// First frame decoded while validating the file
    primed: Option<DecodedFrame>,
}

fn map_error(error: Error) -> DecodeError {
    match error {
        Error::IoError(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            DecodeError::Corrupt(format!("unexpected end of file: {}", e))
        }
        Error::IoError(e) => DecodeError::IoFailure(e),
        Error::Unsupported(what) => DecodeError::UnsupportedFormat(what.to_string()),
        Error::DecodeError(what) => DecodeError::Corrupt(what.to_string()),
        Error::LimitError(what) => DecodeError::Corrupt(format!("limit exceeded: {}", what)),
        Error::SeekError(kind) => DecodeError::Corrupt(format!("seek failed: {:?}", kind)),
        Error::ResetRequired => DecodeError::Corrupt("decoder reset required".to_string()),
    }
}

fn probe(path: &Path) -> Result<Box<dyn FormatReader>, DecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(map_error)?;

    Ok(probed.format)
}

fn ts_to_seconds(ts: u64, time_base: Option<TimeBase>, sample_rate: u32) -> f64 {
    match time_base {
        Some(tb) => {
            let time = tb.calc_time(ts);
            time.seconds as f64 + time.frac
        }
        None => ts as f64 / sample_rate.max(1) as f64,
    }
}

/// Sum packet durations over a second pass of the file. Used when the
/// container does not carry a frame count (e.g. MP3 without a Xing header).
fn measure_duration(
    path: &Path,
    track_id: u32,
    cancel: &CancelToken,
) -> Result<u64, DecodeError> {
    let mut format = probe(path)?;
    let mut total = 0u64;
    loop {
        cancel.check()?;
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => total += packet.dur(),
            Ok(_) => continue,
            Err(Error::IoError(_)) => break,
            Err(Error::ResetRequired) => continue,
            Err(e) => return Err(map_error(e)),
        }
    }
    Ok(total)
}

impl SymphoniaDecoder {
    /// Open `path`, select its first decodable track, and decode the first
    /// packet to make sure the stream is really playable.
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        Self::open_with_cancel(path, &CancelToken::new())
    }

    /// [`SymphoniaDecoder::open`], giving up between steps once `cancel` is set.
    pub fn open_with_cancel(path: &Path, cancel: &CancelToken) -> Result<Self, DecodeError> {
        let format = probe(path)?;
        cancel.check()?;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::UnsupportedFormat("no audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| DecodeError::Corrupt("sample rate not found".to_string()))?;

        let decoder = get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(map_error)?;

        let codec = get_codecs()
            .get_codec(params.codec)
            .map(|descriptor| descriptor.short_name.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let n_frames = match params.n_frames {
            Some(frames) => frames,
            None => {
                log::debug!(
                    "{} carries no frame count, measuring packet durations",
                    path.display()
                );
                measure_duration(path, track_id, cancel)?
            }
        };
        let media_duration = ts_to_seconds(n_frames, params.time_base, sample_rate);

        let mut this = Self {
            format,
            decoder,
            // Channel count is refined from the first decoded packet below.
            track: Track::new(
                path,
                codec.clone(),
                TrackSpec {
                    sample_rate,
                    channels: params.channels.map(|c| c.count() as u16).unwrap_or(0),
                    bits_per_sample: params.bits_per_sample,
                },
                media_duration,
                None,
            ),
            track_id,
            time_base: params.time_base,
            skip_frames: 0,
            primed: None,
        };

        cancel.check()?;
        let first = this
            .decode_next()?
            .ok_or_else(|| DecodeError::Corrupt("no decodable audio".to_string()))?;

        cancel.check()?;
        let song_length = read_song_length(path);
        this.track = Track::new(
            path,
            codec,
            TrackSpec {
                sample_rate,
                channels: first.channels,
                bits_per_sample: params.bits_per_sample,
            },
            media_duration,
            song_length,
        );
        this.primed = Some(first);

        log::info!(
            "Opened {} ({}, {} Hz, {} ch, {:.2}s)",
            path.display(),
            this.track.codec(),
            sample_rate,
            this.track.channels(),
            media_duration
        );

        Ok(this)
    }

    fn decode_next(&mut self) -> Result<Option<DecodedFrame>, DecodeError> {
        let sample_rate = self.track.sample_rate();
        let mut decode_errors = 0;

        loop {
            // Read the next packet from the container
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(Error::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(map_error(e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(Error::DecodeError(what)) => {
                    decode_errors += 1;
                    if decode_errors > MAX_DECODE_RETRIES {
                        return Err(DecodeError::Corrupt(what.to_string()));
                    }
                    log::warn!("Skipping undecodable packet: {}", what);
                    continue;
                }
                Err(Error::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(map_error(e)),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            let frames = decoded.frames();
            if frames == 0 || channels == 0 {
                continue;
            }

            // Always convert to f32
            let mut tmp = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            tmp.copy_interleaved_ref(decoded);

            let skip = (self.skip_frames as usize).min(frames);
            self.skip_frames -= skip as u64;
            if skip == frames {
                continue;
            }

            let samples = tmp.samples()[skip * channels..frames * channels].to_vec();
            let timestamp = ts_to_seconds(packet.ts() + skip as u64, self.time_base, sample_rate);

            return Ok(Some(DecodedFrame {
                samples,
                channels: channels as u16,
                timestamp,
            }));
        }
    }
}

impl MediaDecoder for SymphoniaDecoder {
    fn track(&self) -> &Track {
        &self.track
    }

    fn seek(&mut self, seconds: f64) -> Result<f64, DecodeError> {
        let duration = self.track.media_duration();
        let mut target = seconds.clamp(0.0, duration);
        // Some readers can only seek to just before the end
        if duration - target < 0.001 {
            target = (duration - 0.001).max(0.0);
        }

        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(target),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(map_error)?;

        self.decoder.reset();
        self.primed = None;
        self.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);

        let actual = ts_to_seconds(seeked.required_ts, self.time_base, self.track.sample_rate());
        log::debug!(
            "Seek to {:.3}s landed at ts {} (required {}), reporting {:.3}s",
            seconds,
            seeked.actual_ts,
            seeked.required_ts,
            actual
        );
        Ok(actual)
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError> {
        if let Some(frame) = self.primed.take() {
            return Ok(Some(frame));
        }
        self.decode_next()
    }
}
