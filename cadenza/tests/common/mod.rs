#![allow(dead_code)]

use cadenza::{
    AudioSystem, CadenzaConfig, CadenzaPlayer, PlaybackState, PlayerEvent, VirtualOutput,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const RATE: u32 = 8_000;
/// One simulated device period (50 ms at 8 kHz)
pub const BLOCK: usize = 400;
pub const AMPLITUDE: f32 = 0.5;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}

/// Write a 16-bit PCM sine tone.
pub fn write_sine_wav(path: &Path, sample_rate: u32, channels: u16, seconds: f64) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (seconds * sample_rate as f64).round() as u64;
    for n in 0..frames {
        let t = n as f64 / sample_rate as f64;
        let value = (t * 440.0 * std::f64::consts::TAU).sin() * AMPLITUDE as f64;
        let value = (value * i16::MAX as f64) as i16;
        for _ in 0..channels {
            writer.write_sample(value).unwrap();
        }
    }
    writer.finalize().unwrap();
}

pub fn write_garbage(path: &Path) {
    std::fs::write(path, b"this is definitely not a media container".repeat(64)).unwrap();
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// A player on a headless 8 kHz device plus a scratch directory for media.
pub struct Rig {
    pub device: VirtualOutput,
    pub system: AudioSystem,
    pub player: CadenzaPlayer,
    pub dir: TempDir,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_device(VirtualOutput::new(RATE, 1))
    }

    pub fn with_device(device: VirtualOutput) -> Self {
        init_logging();
        let system = AudioSystem::new(CadenzaConfig::default(), Arc::new(device.clone()));
        let player = CadenzaPlayer::new(&system).unwrap();
        Self {
            device,
            system,
            player,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Write a mono sine track of `seconds` at the device rate.
    pub fn track(&self, name: &str, seconds: f64) -> PathBuf {
        let path = self.dir.path().join(name);
        write_sine_wav(&path, RATE, 1, seconds);
        path
    }

    fn total_frames(&self) -> u64 {
        (self.player.duration() * self.device.spec().sample_rate as f64).round() as u64
    }

    /// Run one device period once the decode thread has caught up, so the
    /// period is served entirely from decoded audio.
    pub fn tick(&self, frames: usize) -> Vec<f32> {
        let total = self.total_frames();
        wait_until(Duration::from_secs(2), || {
            let stats = self.player.stats();
            stats.buffered_frames >= frames
                || stats.frames_emitted + stats.buffered_frames as u64 >= total
        });
        self.device.tick(frames)
    }

    /// Tick `seconds` of audio in [`BLOCK`] periods.
    pub fn play_for(&self, seconds: f64) -> Vec<f32> {
        let periods = (seconds * RATE as f64 / BLOCK as f64).round() as usize;
        let mut out = Vec::new();
        for _ in 0..periods {
            out.extend(self.tick(BLOCK));
        }
        out
    }

    /// Seek and keep the device ticking (silently) until the seek completes.
    /// Returns the position the decoder landed on.
    pub fn seek(&self, seconds: f64) -> f64 {
        self.player.set_position(seconds).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            for event in self.player.poll_events() {
                if let PlayerEvent::SeekCompleted { actual, .. } = event {
                    return actual;
                }
            }
            assert!(Instant::now() < deadline, "seek to {} never completed", seconds);
            // Single-frame ticks let the output side service the flush
            self.device.tick(1);
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Tick until the player leaves Playing.
    pub fn play_to_end(&self) -> PlaybackState {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.player.status() == PlaybackState::Playing && Instant::now() < deadline {
            self.tick(BLOCK);
            if self.player.stats().buffered_frames == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        self.player.status()
    }
}

pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |max, s| max.max(s.abs()))
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} +/- {}, got {}",
        expected,
        tolerance,
        actual
    );
}
