//! Process-wide audio subsystem.
//!
//! An [`AudioSystem`] owns the output backend, the decoder opener and the
//! configuration shared by every player handle. It can be used directly
//! (handy for tests and for hosts that want more than one system) or through
//! the global lifecycle functions:
//!
//! ```no_run
//! use cadenza::{CadenzaPlayer, system};
//!
//! let audio = system::initialize()?;
//! let player = CadenzaPlayer::new(&audio)?;
//! player.load("song.mp3")?;
//! player.play()?;
//! // ...
//! drop(player);
//! system::cleanup()?;
//! # Ok::<(), cadenza::CadenzaError>(())
//! ```

use crate::config::CadenzaConfig;
use crate::decoder::{DecoderOpener, SymphoniaOpener};
use crate::error::{CadenzaError, InitError, Result};
use crate::output::{AudioBackend, CpalBackend};
use std::sync::{Arc, Mutex, MutexGuard};

static GLOBAL: Mutex<Option<AudioSystem>> = Mutex::new(None);

#[derive(Debug, Default)]
struct Registry {
    active_handles: usize,
    closed: bool,
}

struct SystemInner {
    backend: Arc<dyn AudioBackend>,
    opener: Arc<dyn DecoderOpener>,
    config: CadenzaConfig,
    registry: Mutex<Registry>,
}

/// Shared audio subsystem. Cheap to clone.
#[derive(Clone)]
pub struct AudioSystem {
    inner: Arc<SystemInner>,
}

impl AudioSystem {
    /// Create a system that decodes with Symphonia and plays through `backend`.
    pub fn new(config: CadenzaConfig, backend: Arc<dyn AudioBackend>) -> Self {
        Self::with_opener(config, backend, Arc::new(SymphoniaOpener))
    }

    /// Create a system with a custom decoder opener.
    pub fn with_opener(
        config: CadenzaConfig,
        backend: Arc<dyn AudioBackend>,
        opener: Arc<dyn DecoderOpener>,
    ) -> Self {
        log::info!(
            "Audio system created ({} backend, {:?} ring buffer)",
            backend.name(),
            config.ring_buffer_duration
        );
        Self {
            inner: Arc::new(SystemInner {
                backend,
                opener,
                config,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Create a system on the host's default output device.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::NoOutputDevice`] when the host has no output
    /// device, or [`InitError::Backend`] when it cannot report a format.
    pub fn with_default_output(config: CadenzaConfig) -> Result<Self> {
        let backend = CpalBackend::new()?;
        Ok(Self::new(config, Arc::new(backend)))
    }

    pub fn config(&self) -> &CadenzaConfig {
        &self.inner.config
    }

    pub fn backend_name(&self) -> &str {
        self.inner.backend.name()
    }

    /// Number of player handles created from this system that are still alive.
    pub fn active_handles(&self) -> usize {
        self.registry().active_handles
    }

    pub fn is_closed(&self) -> bool {
        self.registry().closed
    }

    /// Close the system. Fails while handles are alive.
    pub fn close(&self) -> Result<()> {
        let mut registry = self.registry();
        if registry.active_handles > 0 {
            return Err(CadenzaError::HandlesActive(registry.active_handles));
        }
        registry.closed = true;
        Ok(())
    }

    pub(crate) fn backend(&self) -> Arc<dyn AudioBackend> {
        self.inner.backend.clone()
    }

    pub(crate) fn opener(&self) -> Arc<dyn DecoderOpener> {
        self.inner.opener.clone()
    }

    pub(crate) fn register_handle(&self) -> Result<HandleRegistration> {
        let mut registry = self.registry();
        if registry.closed {
            return Err(InitError::NotInitialized.into());
        }
        registry.active_handles += 1;
        Ok(HandleRegistration {
            system: self.clone(),
        })
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Counts a live handle against its system until dropped.
pub(crate) struct HandleRegistration {
    system: AudioSystem,
}

impl Drop for HandleRegistration {
    fn drop(&mut self) {
        let mut registry = self.system.registry();
        registry.active_handles = registry.active_handles.saturating_sub(1);
    }
}

fn global_slot() -> MutexGuard<'static, Option<AudioSystem>> {
    GLOBAL
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Initialize the global audio system on the default output device.
///
/// # Errors
///
/// Fails with [`InitError::AlreadyInitialized`] if called twice without
/// [`cleanup`], and with [`InitError::NoOutputDevice`] when there is no device.
pub fn initialize() -> Result<AudioSystem> {
    let mut slot = global_slot();
    if slot.is_some() {
        return Err(InitError::AlreadyInitialized.into());
    }
    let system = AudioSystem::with_default_output(CadenzaConfig::default())?;
    *slot = Some(system.clone());
    Ok(system)
}

/// Initialize the global audio system with an explicit configuration and backend.
pub fn initialize_with(
    config: CadenzaConfig,
    backend: Arc<dyn AudioBackend>,
) -> Result<AudioSystem> {
    let mut slot = global_slot();
    if slot.is_some() {
        return Err(InitError::AlreadyInitialized.into());
    }
    let system = AudioSystem::new(config, backend);
    *slot = Some(system.clone());
    Ok(system)
}

/// Release the global audio system.
///
/// # Errors
///
/// Fails with [`InitError::NotInitialized`] when there is nothing to release
/// and with [`CadenzaError::HandlesActive`] while player handles are alive.
pub fn cleanup() -> Result<()> {
    let mut slot = global_slot();
    let system = slot.as_ref().ok_or(InitError::NotInitialized)?;
    system.close()?;
    *slot = None;
    log::info!("Audio system cleaned up");
    Ok(())
}

/// The initialized global audio system.
pub fn global() -> Result<AudioSystem> {
    global_slot()
        .clone()
        .ok_or_else(|| InitError::NotInitialized.into())
}
