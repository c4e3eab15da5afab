//! Audio output.
//!
//! The output side is split in three:
//! - [`AudioBackend`]: opens device streams (cpal for real hardware,
//!   [`VirtualOutput`] for headless hosts and tests)
//! - [`Renderer`]: the per-tick logic that drains the ring buffer, applies
//!   volume, advances the playback clock and detects underruns/end of stream
//! - [`OutputSink`]: a dedicated thread that owns the device stream for its
//!   whole life, so the stream never crosses threads

mod cpal_backend;
mod virtual_device;

pub use cpal_backend::CpalBackend;
pub use virtual_device::VirtualOutput;

use crate::controller::Shared;
use crate::error::{CadenzaError, Result};
use crate::events::PlayerEvent;
use crate::playback::PlaybackState;
use crate::ring_buffer::RingConsumer;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Sample rate and channel layout of an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Called once per device period with an interleaved `f32` buffer to fill.
pub type RenderCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Called when the device reports a stream error.
pub type ErrorCallback = Box<dyn FnMut(String) + Send + 'static>;

/// A running device stream. Dropping it stops the device.
pub trait OutputStream {
    fn play(&self) -> Result<()>;
}

/// Source of output streams.
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Format the backend's device runs at.
    fn device_spec(&self) -> Result<DeviceSpec>;

    /// Open a stream at `spec` that pulls audio from `render`.
    ///
    /// Called on the output thread; the returned stream stays on that thread.
    fn open_stream(
        &self,
        spec: DeviceSpec,
        render: RenderCallback,
        on_error: ErrorCallback,
    ) -> Result<Box<dyn OutputStream>>;
}

/// What the output thread should do after a device period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Playback ended on its own (end of stream, decode failure); close the stream
    Release,
}

/// Per-tick consumer of the ring buffer.
pub struct Renderer {
    consumer: RingConsumer,
    shared: Arc<Shared>,
    released: bool,
}

impl Renderer {
    pub(crate) fn new(consumer: RingConsumer, shared: Arc<Shared>) -> Self {
        Self {
            consumer,
            shared,
            released: false,
        }
    }

    /// Fill one device period.
    pub fn render(&mut self, out: &mut [f32]) -> TickOutcome {
        self.consumer.service_flush();

        // Read before the seek check so a seek landing mid-tick wins
        let observed = self.shared.clock.frames();
        let channels = self.consumer.channels();
        let wanted = out.len() / channels;
        let state = self.shared.state.load();
        if state != PlaybackState::Playing
            || self.shared.seek_in_progress()
            || self.consumer.flush_pending()
        {
            out.fill(0.0);
            return self.outcome(state);
        }

        let frames = self.consumer.pop_frames(out);
        let written = frames * channels;
        if frames > 0 {
            self.shared.volume.apply(&mut out[..written]);
            if !self.shared.clock.advance_from(observed, frames) {
                log::trace!("Position moved during the period, dropping {} frames", frames);
            }
        }
        out[written..].fill(0.0);

        if frames < wanted {
            if self.shared.decode_finished() {
                if self.consumer.buffered_frames() == 0 {
                    self.finish_track();
                }
            } else {
                let total = self.shared.record_underrun();
                self.shared.emit(PlayerEvent::BufferUnderrun { total });
            }
        }
        self.outcome(self.shared.state.load())
    }

    fn outcome(&mut self, state: PlaybackState) -> TickOutcome {
        let ended = matches!(
            state,
            PlaybackState::Stopped | PlaybackState::Error | PlaybackState::Idle
        );
        if !ended || self.released {
            return TickOutcome::Continue;
        }
        self.released = true;
        TickOutcome::Release
    }

    fn finish_track(&self) {
        if self
            .shared
            .state
            .transition(PlaybackState::Playing, PlaybackState::Stopped)
            .is_ok()
        {
            self.shared.clock.reset();
            self.shared.emit(PlayerEvent::StateChanged {
                from: PlaybackState::Playing,
                to: PlaybackState::Stopped,
            });
            self.shared.emit(PlayerEvent::TrackFinished);
            log::info!("Track finished");
        }
    }
}

enum SinkMessage {
    Shutdown,
    Release,
    DeviceLost(String),
}

/// Owns the output thread and, through it, the device stream.
///
/// The stream is created when the sink starts and lives until [`OutputSink::stop`],
/// the end of playback, or device loss. Pausing does not tear it down; the
/// renderer just emits silence.
pub struct OutputSink {
    messages: Sender<SinkMessage>,
    thread: Option<JoinHandle<()>>,
}

impl OutputSink {
    pub(crate) fn start(
        backend: Arc<dyn AudioBackend>,
        spec: DeviceSpec,
        mut renderer: Renderer,
        shared: Arc<Shared>,
    ) -> Result<Self> {
        let (messages, inbox) = unbounded::<SinkMessage>();
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        let device_messages = messages.clone();
        let render_messages = messages.clone();
        let thread = std::thread::Builder::new()
            .name("cadenza-output".to_string())
            .spawn(move || {
                let render: RenderCallback = Box::new(move |out: &mut [f32]| {
                    if renderer.render(out) == TickOutcome::Release {
                        let _ = render_messages.send(SinkMessage::Release);
                    }
                });
                let on_error: ErrorCallback = Box::new(move |error: String| {
                    on_device_error(&shared, &error);
                    let _ = device_messages.send(SinkMessage::DeviceLost(error));
                });

                let stream = match backend
                    .open_stream(spec, render, on_error)
                    .and_then(|stream| stream.play().map(|_| stream))
                {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                wait_for_close(&inbox);
                drop(stream);
                log::debug!("Output thread exiting");
            })
            .map_err(|e| CadenzaError::Thread(format!("Failed to spawn output thread: {}", e)))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| CadenzaError::Thread("Output thread exited during startup".to_string()))?;

        let mut sink = Self {
            messages,
            thread: Some(thread),
        };
        if let Err(e) = ready {
            sink.stop();
            return Err(e);
        }
        Ok(sink)
    }

    /// Stop the device stream and join the output thread.
    pub fn stop(&mut self) {
        let _ = self.messages.send(SinkMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Output thread panicked");
            }
        }
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        self.stop();
    }
}

fn wait_for_close(inbox: &Receiver<SinkMessage>) {
    match inbox.recv() {
        Ok(SinkMessage::Shutdown) | Err(_) => {}
        Ok(SinkMessage::Release) => log::debug!("Playback ended, closing output stream"),
        Ok(SinkMessage::DeviceLost(error)) => {
            log::error!("Output device lost, halting output thread: {}", error);
        }
    }
}

fn on_device_error(shared: &Shared, error: &str) {
    for from in [PlaybackState::Playing, PlaybackState::Paused] {
        if shared.state.transition(from, PlaybackState::Error).is_ok() {
            shared.emit(PlayerEvent::StateChanged {
                from,
                to: PlaybackState::Error,
            });
            break;
        }
    }
    shared.emit(PlayerEvent::DeviceLost {
        error: error.to_string(),
    });
}
