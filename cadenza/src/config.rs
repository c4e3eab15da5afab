//! Configuration for Cadenza

use crate::decoder::ResamplerType;
use crate::volume::VolumeCurve;
use std::time::Duration;

/// Bounds applied to [`CadenzaConfig::ring_buffer_duration`] when the ring is sized.
pub const MIN_RING_BUFFER_DURATION: Duration = Duration::from_millis(100);
pub const MAX_RING_BUFFER_DURATION: Duration = Duration::from_millis(500);

/// Engine-wide settings shared by every player handle created from one
/// [`AudioSystem`](crate::system::AudioSystem).
#[derive(Debug, Clone)]
pub struct CadenzaConfig {
    /// Amount of decoded audio the ring buffer holds between decoder and device
    pub ring_buffer_duration: Duration,
    /// Frames per resampler input chunk
    pub block_size: usize,
    /// Volume (0-100) a freshly created handle starts with
    pub initial_volume: u8,
    /// Mapping from volume percentage to gain
    pub volume_curve: VolumeCurve,
    /// Resampler used when the file rate differs from the device rate
    pub resampler: ResamplerType,
    /// How long the decode thread backs off when the ring is full or it is idle
    pub decode_poll_interval: Duration,
    /// Capacity of the per-handle event queue
    pub event_capacity: usize,
}

impl Default for CadenzaConfig {
    fn default() -> Self {
        Self {
            ring_buffer_duration: Duration::from_millis(250),
            block_size: 1024,
            initial_volume: 100,
            volume_curve: VolumeCurve::Linear,
            resampler: ResamplerType::Fast,
            decode_poll_interval: Duration::from_millis(5),
            event_capacity: 256,
        }
    }
}

impl CadenzaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ring_buffer_duration(mut self, duration: Duration) -> Self {
        self.ring_buffer_duration = duration;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn initial_volume(mut self, volume: u8) -> Self {
        self.initial_volume = volume.min(100);
        self
    }

    pub fn volume_curve(mut self, curve: VolumeCurve) -> Self {
        self.volume_curve = curve;
        self
    }

    pub fn resampler(mut self, resampler: ResamplerType) -> Self {
        self.resampler = resampler;
        self
    }

    pub fn decode_poll_interval(mut self, interval: Duration) -> Self {
        self.decode_poll_interval = interval;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Ring capacity in frames for a device running at `sample_rate`.
    pub fn ring_capacity_frames(&self, sample_rate: u32) -> usize {
        let duration = self
            .ring_buffer_duration
            .clamp(MIN_RING_BUFFER_DURATION, MAX_RING_BUFFER_DURATION);
        ((duration.as_secs_f64() * sample_rate as f64).ceil() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_capacity_is_clamped_to_sane_window() {
        let tiny = CadenzaConfig::new().ring_buffer_duration(Duration::from_millis(1));
        assert_eq!(tiny.ring_capacity_frames(48_000), 4_800);

        let huge = CadenzaConfig::new().ring_buffer_duration(Duration::from_secs(10));
        assert_eq!(huge.ring_capacity_frames(48_000), 24_000);

        let default = CadenzaConfig::default();
        assert_eq!(default.ring_capacity_frames(8_000), 2_000);
    }

    #[test]
    fn builder_clamps_initial_volume() {
        let config = CadenzaConfig::new().initial_volume(250);
        assert_eq!(config.initial_volume, 100);
    }
}
