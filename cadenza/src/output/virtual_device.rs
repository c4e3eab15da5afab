use crate::error::{CadenzaError, Result};
use crate::output::{AudioBackend, DeviceSpec, ErrorCallback, OutputStream, RenderCallback};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A headless output device driven by the embedder.
///
/// Nothing plays until [`VirtualOutput::tick`] is called; each tick runs the
/// render callback of every open stream once and returns the mixed samples.
/// This gives hosts without audio hardware (CI, servers, tests) a
/// deterministic clock. Clones share the same device.
#[derive(Clone)]
pub struct VirtualOutput {
    inner: Arc<VirtualInner>,
}

struct VirtualInner {
    spec: DeviceSpec,
    streams: Mutex<Vec<VirtualSlot>>,
    next_id: AtomicU64,
    opened: AtomicU64,
}

struct VirtualSlot {
    id: u64,
    render: RenderCallback,
    on_error: ErrorCallback,
}

struct VirtualStream {
    inner: Arc<VirtualInner>,
    id: u64,
}

impl OutputStream for VirtualStream {
    fn play(&self) -> Result<()> {
        Ok(())
    }
}

impl Drop for VirtualStream {
    fn drop(&mut self) {
        self.inner.slots().retain(|slot| slot.id != self.id);
    }
}

impl VirtualInner {
    fn slots(&self) -> MutexGuard<'_, Vec<VirtualSlot>> {
        // A panicking render callback must not take the device down with it
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl VirtualOutput {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            inner: Arc::new(VirtualInner {
                spec: DeviceSpec {
                    sample_rate,
                    channels: channels.max(1),
                },
                streams: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                opened: AtomicU64::new(0),
            }),
        }
    }

    pub fn spec(&self) -> DeviceSpec {
        self.inner.spec
    }

    /// Run one device period of `frames` frames. Returns interleaved samples;
    /// silence when no stream is open.
    pub fn tick(&self, frames: usize) -> Vec<f32> {
        let len = frames * self.inner.spec.channels as usize;
        let mut mix = vec![0.0f32; len];
        let mut scratch = vec![0.0f32; len];

        let mut slots = self.inner.slots();
        for slot in slots.iter_mut() {
            scratch.fill(0.0);
            (slot.render)(&mut scratch);
            for (out, sample) in mix.iter_mut().zip(scratch.iter()) {
                *out += *sample;
            }
        }
        mix
    }

    /// Run enough periods of `block` frames to cover `duration`.
    pub fn advance(&self, duration: Duration, block: usize) -> Vec<f32> {
        let block = block.max(1);
        let total = (duration.as_secs_f64() * self.inner.spec.sample_rate as f64).round() as usize;
        let mut out = Vec::with_capacity(total * self.inner.spec.channels as usize);
        let mut remaining = total;
        while remaining > 0 {
            let frames = remaining.min(block);
            out.extend(self.tick(frames));
            remaining -= frames;
        }
        out
    }

    /// Whether any stream is currently open on this device.
    pub fn is_open(&self) -> bool {
        !self.inner.slots().is_empty()
    }

    /// Number of streams opened over the device's lifetime.
    pub fn streams_opened(&self) -> u64 {
        self.inner.opened.load(Ordering::Acquire)
    }

    /// Simulate a device failure: every open stream's error callback fires.
    pub fn fail(&self, message: &str) {
        let mut slots = self.inner.slots();
        for slot in slots.iter_mut() {
            (slot.on_error)(message.to_string());
        }
    }
}

impl AudioBackend for VirtualOutput {
    fn name(&self) -> &str {
        "virtual"
    }

    fn device_spec(&self) -> Result<DeviceSpec> {
        Ok(self.inner.spec)
    }

    fn open_stream(
        &self,
        spec: DeviceSpec,
        render: RenderCallback,
        on_error: ErrorCallback,
    ) -> Result<Box<dyn OutputStream>> {
        if spec != self.inner.spec {
            return Err(CadenzaError::Device(format!(
                "Virtual device runs at {} Hz / {} ch, stream requested {} Hz / {} ch",
                self.inner.spec.sample_rate,
                self.inner.spec.channels,
                spec.sample_rate,
                spec.channels
            )));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        self.inner.slots().push(VirtualSlot {
            id,
            render,
            on_error,
        });
        self.inner.opened.fetch_add(1, Ordering::AcqRel);

        Ok(Box::new(VirtualStream {
            inner: self.inner.clone(),
            id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn tick_without_streams_is_silent() {
        let device = VirtualOutput::new(8_000, 2);
        assert_eq!(device.tick(4), vec![0.0; 8]);
        assert!(!device.is_open());
    }

    #[test]
    fn tick_runs_render_and_drop_closes() {
        let device = VirtualOutput::new(8_000, 1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let stream = device
            .open_stream(
                device.spec(),
                Box::new(move |out: &mut [f32]| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    out.fill(0.5);
                }),
                Box::new(|_| {}),
            )
            .unwrap();

        assert!(device.is_open());
        assert_eq!(device.tick(3), vec![0.5; 3]);
        assert_eq!(device.advance(Duration::from_millis(1), 4).len(), 8);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        drop(stream);
        assert!(!device.is_open());
        assert_eq!(device.streams_opened(), 1);
    }

    #[test]
    fn fail_reaches_error_callback() {
        let device = VirtualOutput::new(8_000, 1);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let _stream = device
            .open_stream(
                device.spec(),
                Box::new(|_: &mut [f32]| {}),
                Box::new(move |e| sink.lock().unwrap().push(e)),
            )
            .unwrap();

        device.fail("unplugged");
        assert_eq!(*errors.lock().unwrap(), vec!["unplugged".to_string()]);
    }

    #[test]
    fn rejects_mismatched_spec() {
        let device = VirtualOutput::new(8_000, 1);
        let spec = DeviceSpec {
            sample_rate: 44_100,
            channels: 2,
        };
        assert!(
            device
                .open_stream(spec, Box::new(|_: &mut [f32]| {}), Box::new(|_| {}))
                .is_err()
        );
    }
}
