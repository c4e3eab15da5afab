//! Playback controller: the per-handle state machine.
//!
//! Commands from caller threads are serialized by the pipeline lock. The
//! state itself lives in an [`AtomicPlaybackState`] so the output and decode
//! threads can read it (and make their own transitions to Stopped or Error)
//! without ever touching that lock. When they do, both threads exit on their
//! own; the next command joins them and empties the pipeline.
//!
//! Opening a track is the one slow command. It runs outside the lock with a
//! [`CancelToken`] parked in the pipeline, so `stop` and a newer `load` can
//! cancel it instead of waiting.

use crate::config::CadenzaConfig;
use crate::decoder::{CancelToken, DecoderOpener, FrameConverter, Track};
use crate::error::{CadenzaError, Result};
use crate::events::PlayerEvent;
use crate::output::{AudioBackend, DeviceSpec, OutputSink, Renderer};
use crate::playback::{AtomicPlaybackState, PlaybackClock, PlaybackState, PlayerStats};
use crate::ring_buffer::{RingConsumer, RingMonitor, sample_ring};
use crate::volume::AtomicVolume;
use crate::worker::{DecodeCommand, DecodeWorker};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// State shared by the controller, the decode thread and the output thread.
pub(crate) struct Shared {
    pub(crate) state: AtomicPlaybackState,
    pub(crate) clock: PlaybackClock,
    pub(crate) volume: AtomicVolume,
    underruns: AtomicU64,
    pending_seeks: AtomicUsize,
    decode_finished: AtomicBool,
    cancel: AtomicBool,
    events: Sender<PlayerEvent>,
}

impl Shared {
    fn new(config: &CadenzaConfig, events: Sender<PlayerEvent>) -> Self {
        Self {
            state: AtomicPlaybackState::new(PlaybackState::Idle),
            clock: PlaybackClock::default(),
            volume: AtomicVolume::new(config.initial_volume, config.volume_curve),
            underruns: AtomicU64::new(0),
            pending_seeks: AtomicUsize::new(0),
            decode_finished: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            events,
        }
    }

    /// Queue an event. Never blocks; drops the event when the queue is full.
    pub(crate) fn emit(&self, event: PlayerEvent) {
        let _ = self.events.try_send(event);
    }

    pub(crate) fn seek_in_progress(&self) -> bool {
        self.pending_seeks.load(Ordering::Acquire) > 0
    }

    fn begin_seek(&self) {
        self.pending_seeks.fetch_add(1, Ordering::AcqRel);
    }

    /// Complete one seek. The last outstanding seek moves the clock to the
    /// position the decoder actually landed on.
    pub(crate) fn finish_seek(&self, actual: f64) {
        if self.pending_seeks.load(Ordering::Acquire) == 1 {
            self.clock.seek_to(actual);
        }
        let _ = self
            .pending_seeks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub(crate) fn decode_finished(&self) -> bool {
        self.decode_finished.load(Ordering::Acquire)
    }

    pub(crate) fn set_decode_finished(&self, finished: bool) {
        self.decode_finished.store(finished, Ordering::Release);
    }

    /// Count one underrun. Returns the running total.
    pub(crate) fn record_underrun(&self) -> u64 {
        self.underruns.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn reset_pipeline_flags(&self) {
        self.underruns.store(0, Ordering::Release);
        self.pending_seeks.store(0, Ordering::Release);
        self.decode_finished.store(false, Ordering::Release);
        self.cancel.store(false, Ordering::Release);
    }

    fn set_state(&self, to: PlaybackState) {
        let from = self.state.load();
        self.state.store(to);
        if from != to {
            log::debug!("Player state {} -> {}", from, to);
            self.emit(PlayerEvent::StateChanged { from, to });
        }
    }

    fn transition(
        &self,
        operation: &'static str,
        from: PlaybackState,
        to: PlaybackState,
    ) -> Result<()> {
        self.state
            .transition(from, to)
            .map_err(|observed| CadenzaError::invalid_state(operation, observed))?;
        log::debug!("Player state {} -> {}", from, to);
        self.emit(PlayerEvent::StateChanged { from, to });
        Ok(())
    }
}

/// Resources of one load-to-unload cycle.
enum Pipeline {
    Empty,
    /// A load is opening its track outside the command lock
    Loading { cancel: CancelToken },
    /// Loaded and primed; no threads yet
    Ready {
        worker: DecodeWorker,
        consumer: RingConsumer,
        spec: DeviceSpec,
    },
    Running {
        sink: OutputSink,
        decode_thread: JoinHandle<()>,
        commands: Sender<DecodeCommand>,
    },
}

/// Snapshot of the loaded track, readable without the command lock.
#[derive(Clone)]
struct Loaded {
    track: Track,
    monitor: RingMonitor,
}

pub(crate) struct PlaybackController {
    shared: Arc<Shared>,
    events: Receiver<PlayerEvent>,
    backend: Arc<dyn AudioBackend>,
    opener: Arc<dyn DecoderOpener>,
    config: CadenzaConfig,
    pipeline: Mutex<Pipeline>,
    loaded: Mutex<Option<Loaded>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PlaybackController {
    pub(crate) fn new(
        backend: Arc<dyn AudioBackend>,
        opener: Arc<dyn DecoderOpener>,
        config: CadenzaConfig,
    ) -> Self {
        let (tx, rx) = bounded(config.event_capacity.max(1));
        Self {
            shared: Arc::new(Shared::new(&config, tx)),
            events: rx,
            backend,
            opener,
            config,
            pipeline: Mutex::new(Pipeline::Empty),
            loaded: Mutex::new(None),
        }
    }

    /// Tear down the current pipeline and open `path`.
    ///
    /// A `stop` or a newer `load` that arrives while the track is opening
    /// cancels this one, which then returns [`CadenzaError::Cancelled`].
    pub(crate) fn load(&self, path: &Path) -> Result<()> {
        let cancel = CancelToken::new();
        {
            let mut pipeline = lock(&self.pipeline);
            let previous = self.shared.state.load();
            self.shared.set_state(interim_state(previous));
            self.teardown(&mut pipeline);
            *lock(&self.loaded) = None;
            self.shared.clock.configure(0, 0.0);
            *pipeline = Pipeline::Loading {
                cancel: cancel.clone(),
            };
        }

        let opened = self.open_pipeline(path, &cancel);

        let mut pipeline = lock(&self.pipeline);
        if cancel.is_cancelled() {
            log::info!("Load of {} cancelled", path.display());
            return Err(CadenzaError::Cancelled("load"));
        }

        match opened {
            Ok((ready, loaded)) => {
                let duration = loaded.track.media_duration();
                if let Pipeline::Ready { spec, .. } = &ready {
                    self.shared.clock.configure(spec.sample_rate, duration);
                }
                self.shared.reset_pipeline_flags();
                *pipeline = ready;
                *lock(&self.loaded) = Some(loaded);
                self.shared.set_state(PlaybackState::Loaded);
                self.shared.emit(PlayerEvent::TrackLoaded {
                    path: path.to_path_buf(),
                    duration,
                });
                log::info!("Loaded {} ({:.2}s)", path.display(), duration);
                Ok(())
            }
            Err(e) => {
                *pipeline = Pipeline::Empty;
                self.shared.set_state(PlaybackState::Error);
                log::error!("Failed to load {}: {}", path.display(), e);
                Err(e)
            }
        }
    }

    /// Runs without the command lock, so it must not write to `shared`.
    fn open_pipeline(&self, path: &Path, cancel: &CancelToken) -> Result<(Pipeline, Loaded)> {
        let decoder = self.opener.open(path, cancel)?;
        let track = decoder.track().clone();
        let spec = self.backend.device_spec()?;

        let converter = FrameConverter::new(
            track.sample_rate(),
            spec.sample_rate,
            spec.channels,
            self.config.block_size,
            self.config.resampler,
        )?;
        let (producer, consumer) =
            sample_ring(self.config.ring_capacity_frames(spec.sample_rate), spec.channels);
        let monitor = producer.monitor();

        let mut worker = DecodeWorker::new(
            decoder,
            converter,
            producer,
            self.shared.clone(),
            self.config.decode_poll_interval,
        );
        worker.prime()?;

        Ok((
            Pipeline::Ready {
                worker,
                consumer,
                spec,
            },
            Loaded { track, monitor },
        ))
    }

    pub(crate) fn play(&self) -> Result<()> {
        let mut pipeline = lock(&self.pipeline);
        self.reap(&mut pipeline);
        let state = self.shared.state.load();
        if state != PlaybackState::Loaded {
            return Err(CadenzaError::invalid_state("play", state));
        }
        let Pipeline::Ready {
            worker,
            consumer,
            spec,
        } = std::mem::replace(&mut *pipeline, Pipeline::Empty)
        else {
            return Err(CadenzaError::invalid_state("play", state));
        };

        // The renderer emits silence until the state below says Playing
        let renderer = Renderer::new(consumer, self.shared.clone());
        let mut sink = match OutputSink::start(
            self.backend.clone(),
            spec,
            renderer,
            self.shared.clone(),
        ) {
            Ok(sink) => sink,
            Err(e) => {
                self.shared.set_state(PlaybackState::Error);
                log::error!("Failed to start output: {}", e);
                return Err(e);
            }
        };

        self.shared
            .transition("play", PlaybackState::Loaded, PlaybackState::Playing)?;

        let (commands, inbox) = unbounded();
        let decode_thread = match worker.spawn(inbox) {
            Ok(handle) => handle,
            Err(e) => {
                sink.stop();
                self.shared.set_state(PlaybackState::Error);
                log::error!("Failed to start decoding: {}", e);
                return Err(e);
            }
        };

        *pipeline = Pipeline::Running {
            sink,
            decode_thread,
            commands,
        };
        log::info!("Playback started on {} output", self.backend.name());
        Ok(())
    }

    pub(crate) fn pause(&self) -> Result<()> {
        let mut pipeline = lock(&self.pipeline);
        self.reap(&mut pipeline);
        self.shared
            .transition("pause", PlaybackState::Playing, PlaybackState::Paused)
    }

    pub(crate) fn resume(&self) -> Result<()> {
        let mut pipeline = lock(&self.pipeline);
        self.reap(&mut pipeline);
        self.shared
            .transition("resume", PlaybackState::Paused, PlaybackState::Playing)
    }

    /// Stop playback, or cancel a load that is still opening its track.
    pub(crate) fn stop(&self) -> Result<()> {
        let mut pipeline = lock(&self.pipeline);
        if let Pipeline::Loading { cancel } = &*pipeline {
            cancel.cancel();
            *pipeline = Pipeline::Empty;
            self.shared.set_state(PlaybackState::Stopped);
            self.shared.clock.reset();
            log::info!("Load cancelled by stop");
            return Ok(());
        }

        self.reap(&mut pipeline);
        let state = self.shared.state.load();
        if !state.is_active() {
            return Err(CadenzaError::invalid_state("stop", state));
        }
        self.shared
            .transition("stop", state, PlaybackState::Stopped)?;
        self.teardown(&mut pipeline);
        self.shared.clock.reset();
        log::info!("Playback stopped");
        Ok(())
    }

    /// Seek to `seconds`, clamped to the track. A no-op unless playing or paused.
    pub(crate) fn set_position(&self, seconds: f64) -> Result<()> {
        let mut pipeline = lock(&self.pipeline);
        self.reap(&mut pipeline);
        let state = self.shared.state.load();
        let Pipeline::Running { commands, .. } = &*pipeline else {
            log::debug!("Ignoring seek while {}", state);
            return Ok(());
        };
        if !state.is_active() {
            log::debug!("Ignoring seek while {}", state);
            return Ok(());
        }

        self.shared.begin_seek();
        let target = self.shared.clock.seek_to(seconds);
        if commands.send(DecodeCommand::Seek(target)).is_err() {
            self.shared.finish_seek(target);
            return Err(CadenzaError::Thread("Decode thread is not running".to_string()));
        }
        log::debug!("Seek requested: {:.3}s (clamped to {:.3}s)", seconds, target);
        Ok(())
    }

    pub(crate) fn set_volume(&self, percent: i32) -> u8 {
        self.shared.volume.set(percent)
    }

    pub(crate) fn volume(&self) -> u8 {
        self.shared.volume.level()
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.shared.state.load()
    }

    pub(crate) fn position(&self) -> f64 {
        self.shared.clock.position()
    }

    pub(crate) fn duration(&self) -> f64 {
        self.shared.clock.duration()
    }

    pub(crate) fn track(&self) -> Option<Track> {
        lock(&self.loaded).as_ref().map(|loaded| loaded.track.clone())
    }

    pub(crate) fn stats(&self) -> PlayerStats {
        let buffered_frames = lock(&self.loaded)
            .as_ref()
            .map(|loaded| loaded.monitor.buffered_frames())
            .unwrap_or(0);
        PlayerStats {
            underruns: self.shared.underruns.load(Ordering::Acquire),
            buffered_frames,
            frames_emitted: self.shared.clock.frames(),
        }
    }

    pub(crate) fn poll_events(&self) -> Vec<PlayerEvent> {
        self.events.try_iter().collect()
    }

    /// Cancel and join the threads of the current pipeline, if any.
    fn teardown(&self, pipeline: &mut Pipeline) {
        match std::mem::replace(pipeline, Pipeline::Empty) {
            Pipeline::Empty => {}
            Pipeline::Loading { cancel } => {
                cancel.cancel();
                log::debug!("Cancelled load in progress");
            }
            Pipeline::Ready { .. } => log::debug!("Released loaded track"),
            Pipeline::Running {
                mut sink,
                decode_thread,
                commands,
            } => {
                self.shared.cancel.store(true, Ordering::Release);
                let _ = commands.send(DecodeCommand::Shutdown);
                join_decode_thread(decode_thread);
                sink.stop();
                log::debug!("Pipeline torn down");
            }
        }
    }

    /// Join the threads of a pipeline whose playback ended on its own
    /// (end of stream, decode failure, device loss).
    fn reap(&self, pipeline: &mut Pipeline) {
        if matches!(pipeline, Pipeline::Running { .. }) && !self.shared.state.load().is_active() {
            self.teardown(pipeline);
        }
    }

    /// Release everything and return to Idle.
    pub(crate) fn shutdown(&self) {
        let mut pipeline = lock(&self.pipeline);
        self.teardown(&mut pipeline);
        *lock(&self.loaded) = None;
        self.shared.clock.configure(0, 0.0);
        self.shared.set_state(PlaybackState::Idle);
    }
}

/// State reported while a new track opens; the previous pipeline is gone.
fn interim_state(previous: PlaybackState) -> PlaybackState {
    match previous {
        PlaybackState::Playing | PlaybackState::Paused => PlaybackState::Stopped,
        PlaybackState::Loaded => PlaybackState::Idle,
        other => other,
    }
}

fn join_decode_thread(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("Decode thread panicked");
    }
}
