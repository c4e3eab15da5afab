use crate::decoder::DecodedFrame;
use crate::error::{DecodeError, Result};
use rubato::{
    FastFixedIn, PolynomialDegree, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

/// Type of resampler algorithm to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResamplerType {
    /// Fast polynomial resampler - lower quality but cheaper
    #[default]
    Fast,
    /// Sinc interpolation resampler - higher quality but slower
    Sinc,
}

enum ResamplerImpl {
    Fast(FastFixedIn<f32>),
    Sinc(SincFixedIn<f32>),
}

impl ResamplerImpl {
    fn process(
        &mut self,
        input: &[Vec<f32>],
    ) -> std::result::Result<Vec<Vec<f32>>, rubato::ResampleError> {
        match self {
            Self::Fast(r) => r.process(input, None),
            Self::Sinc(r) => r.process(input, None),
        }
    }

    fn process_partial(
        &mut self,
        input: Option<&[Vec<f32>]>,
    ) -> std::result::Result<Vec<Vec<f32>>, rubato::ResampleError> {
        match self {
            Self::Fast(r) => r.process_partial(input, None),
            Self::Sinc(r) => r.process_partial(input, None),
        }
    }

    fn input_frames_next(&self) -> usize {
        match self {
            Self::Fast(r) => r.input_frames_next(),
            Self::Sinc(r) => r.input_frames_next(),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Fast(r) => r.reset(),
            Self::Sinc(r) => r.reset(),
        }
    }
}

fn conversion_error(message: String) -> crate::error::CadenzaError {
    DecodeError::Corrupt(message).into()
}

/// Remix interleaved `samples` from `in_channels` to `out_channels`.
///
/// Mono fans out to every output channel, anything to mono is averaged, and
/// other layouts keep the leading channels and pad missing ones with silence.
pub fn remix_channels(samples: &[f32], in_channels: usize, out_channels: usize) -> Vec<f32> {
    if in_channels == 0 || out_channels == 0 {
        return Vec::new();
    }
    if in_channels == out_channels {
        return samples.to_vec();
    }

    let frames = samples.len() / in_channels;
    let mut out = Vec::with_capacity(frames * out_channels);
    for frame in samples.chunks_exact(in_channels) {
        if in_channels == 1 {
            out.extend(std::iter::repeat_n(frame[0], out_channels));
        } else if out_channels == 1 {
            let sum: f32 = frame.iter().sum();
            out.push(sum / in_channels as f32);
        } else {
            for ch in 0..out_channels {
                out.push(frame.get(ch).copied().unwrap_or(0.0));
            }
        }
    }
    out
}

/// Converts decoded frames into the output device's layout.
///
/// Runs on the decode thread: remixes channels, then streams the audio
/// through a fixed-input rubato resampler when the file and device rates
/// differ. Input that does not fill a whole resampler chunk is held until the
/// next frame arrives or [`FrameConverter::finish`] is called.
pub struct FrameConverter {
    resampler: Option<ResamplerImpl>,
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: usize,
    /// Planar input waiting for a full resampler chunk
    pending: Vec<Vec<f32>>,
}

impl FrameConverter {
    /// # Arguments
    /// * `source_sample_rate` - Sample rate of the decoded track
    /// * `target_sample_rate` - Sample rate of the output device
    /// * `channels` - Channel count of the output device
    /// * `chunk_frames` - Fixed resampler input size in frames
    /// * `resampler_type` - Resampler algorithm
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_frames: usize,
        resampler_type: ResamplerType,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(conversion_error(
                "Sample rates must be greater than 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(conversion_error(
                "Channel count must be greater than 0".to_string(),
            ));
        }
        if chunk_frames == 0 {
            return Err(conversion_error(
                "Resampler chunk must be greater than 0".to_string(),
            ));
        }

        let channels = channels as usize;
        let resampler = if source_sample_rate == target_sample_rate {
            None
        } else {
            // target/source (output/input)
            let ratio = target_sample_rate as f64 / source_sample_rate as f64;
            log::info!(
                "Creating {:?} resampler: {} Hz -> {} Hz (chunk: {} frames)",
                resampler_type,
                source_sample_rate,
                target_sample_rate,
                chunk_frames
            );
            let resampler = match resampler_type {
                ResamplerType::Fast => {
                    let fast = FastFixedIn::new(
                        ratio,
                        1.0, // the ratio never changes during playback
                        PolynomialDegree::Septic,
                        chunk_frames,
                        channels,
                    )
                    .map_err(|e| {
                        conversion_error(format!("Failed to create fast resampler: {}", e))
                    })?;
                    ResamplerImpl::Fast(fast)
                }
                ResamplerType::Sinc => {
                    let params = SincInterpolationParameters {
                        sinc_len: 256,
                        f_cutoff: 0.95,
                        interpolation: SincInterpolationType::Linear,
                        oversampling_factor: 256,
                        window: WindowFunction::BlackmanHarris2,
                    };
                    let sinc = SincFixedIn::new(ratio, 1.0, params, chunk_frames, channels)
                        .map_err(|e| {
                            conversion_error(format!("Failed to create sinc resampler: {}", e))
                        })?;
                    ResamplerImpl::Sinc(sinc)
                }
            };
            Some(resampler)
        };

        Ok(Self {
            resampler,
            source_sample_rate,
            target_sample_rate,
            channels,
            pending: vec![Vec::new(); channels],
        })
    }

    /// Convert `frame` and append the device-layout samples to `out`.
    pub fn push(&mut self, frame: &DecodedFrame, out: &mut Vec<f32>) -> Result<()> {
        let remixed = remix_channels(&frame.samples, frame.channels as usize, self.channels);
        let Some(resampler) = self.resampler.as_mut() else {
            out.extend_from_slice(&remixed);
            return Ok(());
        };

        // De-interleave into the pending planar buffers
        for interleaved in remixed.chunks_exact(self.channels) {
            for (ch, sample) in interleaved.iter().enumerate() {
                self.pending[ch].push(*sample);
            }
        }

        loop {
            let needed = resampler.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|plane| plane.drain(..needed).collect())
                .collect();
            let waves = resampler
                .process(&chunk)
                .map_err(|e| conversion_error(format!("Streaming resampling error: {}", e)))?;
            interleave_into(&waves, out);
        }
        Ok(())
    }

    /// Flush held input at the end of the stream.
    pub fn finish(&mut self, out: &mut Vec<f32>) -> Result<()> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(());
        };
        if self.pending[0].is_empty() {
            return Ok(());
        }
        let waves = resampler
            .process_partial(Some(self.pending.as_slice()))
            .map_err(|e| conversion_error(format!("Streaming resampling error: {}", e)))?;
        for plane in self.pending.iter_mut() {
            plane.clear();
        }
        interleave_into(&waves, out);
        Ok(())
    }

    /// Drop held input and resampler history, e.g. after a seek.
    pub fn reset(&mut self) {
        for plane in self.pending.iter_mut() {
            plane.clear();
        }
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    pub fn is_resampling(&self) -> bool {
        self.resampler.is_some()
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }
}

fn interleave_into(waves: &[Vec<f32>], out: &mut Vec<f32>) {
    let Some(first) = waves.first() else {
        return;
    };
    let frames = first.len();
    out.reserve(frames * waves.len());
    for frame_idx in 0..frames {
        for wave in waves {
            out.push(wave.get(frame_idx).copied().unwrap_or(0.0));
        }
    }
}
