//! Decode thread.
//!
//! Owns the decoder, the format converter and the producer end of the ring.
//! Decodes ahead of the output thread until the ring is full, then backs off
//! for the configured poll interval. Between frames it checks the cancel flag,
//! the playback state and its command channel, so `stop` never waits on a
//! long decode and the thread exits on its own once playback has ended.

use crate::controller::Shared;
use crate::decoder::{FrameConverter, MediaDecoder};
use crate::error::{CadenzaError, DecodeError, Result};
use crate::events::PlayerEvent;
use crate::playback::PlaybackState;
use crate::ring_buffer::RingProducer;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Commands sent from the controller to the decode thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DecodeCommand {
    /// Seek to an already clamped position in seconds
    Seek(f64),
    Shutdown,
}

enum Step {
    Continue,
    Exit,
}

pub(crate) struct DecodeWorker {
    decoder: Box<dyn MediaDecoder>,
    converter: FrameConverter,
    producer: RingProducer,
    shared: Arc<Shared>,
    poll_interval: Duration,
    /// Converted samples not yet accepted by the ring
    pending: Vec<f32>,
    pending_offset: usize,
    /// The decoder returned end of stream and the converter was drained
    input_exhausted: bool,
}

impl DecodeWorker {
    pub(crate) fn new(
        decoder: Box<dyn MediaDecoder>,
        converter: FrameConverter,
        producer: RingProducer,
        shared: Arc<Shared>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            decoder,
            converter,
            producer,
            shared,
            poll_interval,
            pending: Vec::new(),
            pending_offset: 0,
            input_exhausted: false,
        }
    }

    /// Convert the first decoded frame and push it into the ring, so playback
    /// can start the moment the output stream opens.
    pub(crate) fn prime(&mut self) -> std::result::Result<(), DecodeError> {
        self.decode_one().map_err(|e| match e {
            CadenzaError::Decode(e) => e,
            other => DecodeError::Corrupt(other.to_string()),
        })?;
        self.push_pending();
        Ok(())
    }

    pub(crate) fn spawn(self, commands: Receiver<DecodeCommand>) -> Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("cadenza-decode".to_string())
            .spawn(move || self.run(commands))
            .map_err(|e| CadenzaError::Thread(format!("Failed to spawn decode thread: {}", e)))
    }

    fn run(mut self, commands: Receiver<DecodeCommand>) {
        log::debug!("Decode thread started for {}", self.decoder.track().path().display());

        loop {
            if self.should_exit() {
                break;
            }

            match commands.try_recv() {
                Ok(command) => {
                    if let Step::Exit = self.handle(command) {
                        break;
                    }
                    continue;
                }
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            if self.shared.decode_finished() {
                // Nothing left to decode; stay around for seeks until the tail plays out
                match commands.recv_timeout(self.poll_interval) {
                    Ok(command) => {
                        if let Step::Exit = self.handle(command) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                continue;
            }

            if let Step::Exit = self.fill() {
                break;
            }
        }

        log::debug!("Decode thread exiting");
    }

    /// Torn down, or playback ended on its own (end of stream, failure, device loss).
    fn should_exit(&self) -> bool {
        self.shared.is_cancelled() || !self.shared.state.load().is_active()
    }

    fn handle(&mut self, command: DecodeCommand) -> Step {
        match command {
            DecodeCommand::Shutdown => Step::Exit,
            DecodeCommand::Seek(seconds) => match self.seek(seconds) {
                Ok(()) => Step::Continue,
                Err(e) => {
                    self.fail(e);
                    Step::Exit
                }
            },
        }
    }

    /// Decode and push until the ring is full or the stream ends.
    fn fill(&mut self) -> Step {
        if self.has_pending() {
            if self.push_pending() == 0 {
                // Ring full or a flush is pending
                std::thread::sleep(self.poll_interval);
            }
            return Step::Continue;
        }

        if self.input_exhausted {
            self.shared.set_decode_finished(true);
            log::debug!("Decoder reached end of stream");
            return Step::Continue;
        }

        match self.decode_one() {
            Ok(()) => {
                self.push_pending();
                Step::Continue
            }
            Err(e) => {
                self.fail(e);
                Step::Exit
            }
        }
    }

    fn decode_one(&mut self) -> Result<()> {
        self.pending.clear();
        self.pending_offset = 0;
        match self.decoder.next_frame()? {
            Some(frame) => self.converter.push(&frame, &mut self.pending),
            None => {
                self.input_exhausted = true;
                self.converter.finish(&mut self.pending)
            }
        }
    }

    fn has_pending(&self) -> bool {
        self.pending_offset < self.pending.len()
    }

    fn push_pending(&mut self) -> usize {
        let written = self
            .producer
            .push_frames(&self.pending[self.pending_offset..]);
        self.pending_offset += written;
        written
    }

    fn seek(&mut self, requested: f64) -> Result<()> {
        let actual = self.decoder.seek(requested)?;

        self.converter.reset();
        self.pending.clear();
        self.pending_offset = 0;
        self.input_exhausted = false;
        self.shared.set_decode_finished(false);

        // Stale audio is dropped by the output thread; wait for it to happen
        self.producer.request_flush();
        while self.producer.flush_pending() {
            if self.should_exit() {
                return Ok(());
            }
            std::thread::sleep(self.poll_interval);
        }

        self.shared.finish_seek(actual);
        self.shared.emit(PlayerEvent::SeekCompleted { requested, actual });
        log::debug!("Seek to {:.3}s completed at {:.3}s", requested, actual);
        Ok(())
    }

    fn fail(&self, error: CadenzaError) {
        log::error!("Decoding failed: {}", error);
        for from in [PlaybackState::Playing, PlaybackState::Paused] {
            if self
                .shared
                .state
                .transition(from, PlaybackState::Error)
                .is_ok()
            {
                self.shared.emit(PlayerEvent::StateChanged {
                    from,
                    to: PlaybackState::Error,
                });
                break;
            }
        }
        self.shared.emit(PlayerEvent::DecodeFailed {
            error: error.to_string(),
        });
    }
}
