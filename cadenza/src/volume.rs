//! Volume control.
//!
//! Volume is stored as an integer percentage in an atomic so the output thread
//! can read the latest committed value on every tick without taking a lock.
//! Gain is applied when samples are written to the device, never at decode
//! time, so a change is audible on the next device period.

use std::sync::atomic::{AtomicU8, Ordering};

pub const MAX_VOLUME: u8 = 100;

/// How a volume percentage maps to a gain multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VolumeCurve {
    /// gain = percent / 100
    #[default]
    Linear,
    /// 0% is silence, 1-100% maps onto -60 dB..0 dB
    Logarithmic,
}

impl VolumeCurve {
    /// Gain multiplier for `level` (0-100).
    ///
    /// Logarithmic: `gain = 10^((level - 100) * 0.6 / 20)`, so 50% is -30 dB
    /// and 100% is unity.
    pub fn gain(self, level: u8) -> f32 {
        let level = level.min(MAX_VOLUME);
        if level == 0 {
            return 0.0;
        }
        match self {
            Self::Linear => level as f32 / MAX_VOLUME as f32,
            Self::Logarithmic => {
                let db = (level as f32 - 100.0) * 0.6;
                10.0_f32.powf(db / 20.0)
            }
        }
    }
}

/// Clamp an arbitrary caller-supplied percentage into `0..=100`.
pub fn clamp_percent(percent: i32) -> u8 {
    percent.clamp(0, MAX_VOLUME as i32) as u8
}

/// Lock-free volume shared between caller threads and the output thread.
#[derive(Debug)]
pub struct AtomicVolume {
    level: AtomicU8,
    curve: VolumeCurve,
}

impl AtomicVolume {
    pub fn new(level: u8, curve: VolumeCurve) -> Self {
        Self {
            level: AtomicU8::new(level.min(MAX_VOLUME)),
            curve,
        }
    }

    /// Store a new level, clamped to 0-100, and return the stored value.
    pub fn set(&self, percent: i32) -> u8 {
        let level = clamp_percent(percent);
        self.level.store(level, Ordering::Release);
        level
    }

    pub fn level(&self) -> u8 {
        self.level.load(Ordering::Acquire)
    }

    pub fn gain(&self) -> f32 {
        self.curve.gain(self.level())
    }

    /// Multiply `buffer` in place by the current gain.
    pub fn apply(&self, buffer: &mut [f32]) {
        let gain = self.gain();
        if gain == 0.0 {
            buffer.fill(0.0);
        } else if gain != 1.0 {
            for sample in buffer.iter_mut() {
                *sample *= gain;
            }
        }
    }
}
