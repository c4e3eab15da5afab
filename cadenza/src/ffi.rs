//! C-compatible surface.
//!
//! Handles are opaque pointers created by [`music_player_new`] and released
//! with [`music_player_free`]. Commands return [`CADENZA_OK`] or one of the
//! negative status codes below; `float` getters return `-1.0` when the value
//! is unavailable. `set_position` takes whole seconds.

use crate::error::CadenzaError;
use crate::player::CadenzaPlayer;
use crate::system;
use std::ffi::{CStr, c_char, c_float, c_int};
use std::path::Path;

pub const CADENZA_OK: c_int = 0;
pub const CADENZA_ERR_NULL_HANDLE: c_int = -1;
pub const CADENZA_ERR_INVALID_ARGUMENT: c_int = -2;
pub const CADENZA_ERR_INIT: c_int = -3;
pub const CADENZA_ERR_DECODE: c_int = -4;
pub const CADENZA_ERR_INVALID_STATE: c_int = -5;
pub const CADENZA_ERR_DEVICE: c_int = -6;
pub const CADENZA_ERR_HANDLES_ACTIVE: c_int = -7;
pub const CADENZA_ERR_INTERNAL: c_int = -8;
pub const CADENZA_ERR_CANCELLED: c_int = -9;

fn error_code(error: &CadenzaError) -> c_int {
    match error {
        CadenzaError::Init(_) => CADENZA_ERR_INIT,
        CadenzaError::Decode(_) => CADENZA_ERR_DECODE,
        CadenzaError::InvalidState { .. } => CADENZA_ERR_INVALID_STATE,
        CadenzaError::Device(_) => CADENZA_ERR_DEVICE,
        CadenzaError::HandlesActive(_) => CADENZA_ERR_HANDLES_ACTIVE,
        CadenzaError::Cancelled(_) => CADENZA_ERR_CANCELLED,
        CadenzaError::Io(_) | CadenzaError::Thread(_) => CADENZA_ERR_INTERNAL,
    }
}

fn status(result: crate::error::Result<()>) -> c_int {
    match result {
        Ok(()) => CADENZA_OK,
        Err(e) => {
            log::debug!("FFI call failed: {}", e);
            error_code(&e)
        }
    }
}

/// # Safety
///
/// `handle` must be null or a pointer returned by [`music_player_new`] that
/// has not been freed.
unsafe fn player<'a>(handle: *const CadenzaPlayer) -> Option<&'a CadenzaPlayer> {
    unsafe { handle.as_ref() }
}

fn with_player(
    handle: *const CadenzaPlayer,
    f: impl FnOnce(&CadenzaPlayer) -> c_int,
) -> c_int {
    // SAFETY: every exported function documents the handle contract
    match unsafe { player(handle) } {
        Some(player) => f(player),
        None => CADENZA_ERR_NULL_HANDLE,
    }
}

fn read_seconds(
    handle: *const CadenzaPlayer,
    f: impl FnOnce(&CadenzaPlayer) -> Option<f64>,
) -> c_float {
    // SAFETY: every exported function documents the handle contract
    unsafe { player(handle) }
        .and_then(f)
        .map_or(-1.0, |seconds| seconds as c_float)
}

/// Initialize the process-wide audio system on the default output device.
#[unsafe(no_mangle)]
pub extern "C" fn initialize_music_player() -> c_int {
    status(system::initialize().map(|_| ()))
}

/// Release the process-wide audio system. Fails while handles are alive.
#[unsafe(no_mangle)]
pub extern "C" fn cleanup_music_player() -> c_int {
    status(system::cleanup())
}

/// Create a player handle. Returns null if the system is not initialized.
#[unsafe(no_mangle)]
pub extern "C" fn music_player_new() -> *mut CadenzaPlayer {
    match system::global().and_then(|audio| CadenzaPlayer::new(&audio)) {
        Ok(player) => Box::into_raw(Box::new(player)),
        Err(e) => {
            log::error!("Failed to create player: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// Stop playback and free a handle.
///
/// # Safety
///
/// `handle` must be null or a pointer returned by [`music_player_new`]; it
/// must not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn music_player_free(handle: *mut CadenzaPlayer) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle) });
    }
}

/// Load a track from a NUL-terminated UTF-8 path.
///
/// # Safety
///
/// `handle` as for [`music_player_free`]; `path` must be null or a valid
/// NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn load_music(handle: *mut CadenzaPlayer, path: *const c_char) -> c_int {
    if path.is_null() {
        return CADENZA_ERR_INVALID_ARGUMENT;
    }
    let Ok(path) = unsafe { CStr::from_ptr(path) }.to_str() else {
        return CADENZA_ERR_INVALID_ARGUMENT;
    };
    with_player(handle, |player| status(player.load(Path::new(path))))
}

/// Tag-derived length in seconds, or -1.0.
///
/// # Safety
///
/// `handle` as for [`music_player_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn get_song_length(handle: *mut CadenzaPlayer) -> c_float {
    read_seconds(handle, |player| player.song_length())
}

/// Decoder-measured duration in seconds, or -1.0.
///
/// # Safety
///
/// `handle` as for [`music_player_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn get_media_duration(handle: *mut CadenzaPlayer) -> c_float {
    read_seconds(handle, |player| player.media_duration())
}

/// # Safety
///
/// `handle` as for [`music_player_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn play_music(handle: *mut CadenzaPlayer) -> c_int {
    with_player(handle, |player| status(player.play()))
}

/// # Safety
///
/// `handle` as for [`music_player_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pause_music(handle: *mut CadenzaPlayer) -> c_int {
    with_player(handle, |player| status(player.pause()))
}

/// # Safety
///
/// `handle` as for [`music_player_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn resume_music(handle: *mut CadenzaPlayer) -> c_int {
    with_player(handle, |player| status(player.resume()))
}

/// # Safety
///
/// `handle` as for [`music_player_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stop_music(handle: *mut CadenzaPlayer) -> c_int {
    with_player(handle, |player| status(player.stop()))
}

/// Set the volume in percent; out-of-range values are clamped.
///
/// # Safety
///
/// `handle` as for [`music_player_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn set_volume(handle: *mut CadenzaPlayer, percent: c_int) -> c_int {
    with_player(handle, |player| {
        player.set_volume(percent);
        CADENZA_OK
    })
}

/// Volume in percent, or a negative status code.
///
/// # Safety
///
/// `handle` as for [`music_player_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn get_volume(handle: *mut CadenzaPlayer) -> c_int {
    with_player(handle, |player| player.volume() as c_int)
}

/// `PlaybackState` code (Idle=0, Loaded=1, Playing=2, Paused=3, Stopped=4,
/// Error=5), or a negative status code.
///
/// # Safety
///
/// `handle` as for [`music_player_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn get_status(handle: *mut CadenzaPlayer) -> c_int {
    with_player(handle, |player| player.status().code())
}

/// Position in seconds, or -1.0.
///
/// # Safety
///
/// `handle` as for [`music_player_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn get_position(handle: *mut CadenzaPlayer) -> c_float {
    read_seconds(handle, |player| Some(player.position()))
}

/// Seek to `seconds` whole seconds, clamped to the track.
///
/// # Safety
///
/// `handle` as for [`music_player_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn set_position(handle: *mut CadenzaPlayer, seconds: c_int) -> c_int {
    with_player(handle, |player| status(player.set_position(seconds as f64)))
}

/// Authoritative duration in seconds, or -1.0 when nothing is loaded.
///
/// # Safety
///
/// `handle` as for [`music_player_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn get_duration(handle: *mut CadenzaPlayer) -> c_float {
    read_seconds(handle, |player| player.track().map(|_| player.duration()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CadenzaConfig;
    use crate::output::VirtualOutput;
    use crate::playback::PlaybackState;
    use crate::test_support::write_sine_wav;
    use std::ffi::CString;
    use std::sync::Arc;

    #[test]
    fn null_handles_are_rejected() {
        let null = std::ptr::null_mut();
        unsafe {
            assert_eq!(play_music(null), CADENZA_ERR_NULL_HANDLE);
            assert_eq!(get_status(null), CADENZA_ERR_NULL_HANDLE);
            assert_eq!(get_position(null), -1.0);
            assert_eq!(get_duration(null), -1.0);
            assert_eq!(load_music(null, std::ptr::null()), CADENZA_ERR_INVALID_ARGUMENT);
            music_player_free(null);
        }
    }

    #[test]
    fn seconds_getters_return_c_float() {
        let getters: [unsafe extern "C" fn(*mut CadenzaPlayer) -> c_float; 4] = [
            get_song_length,
            get_media_duration,
            get_position,
            get_duration,
        ];
        for getter in getters {
            assert_eq!(unsafe { getter(std::ptr::null_mut()) }, -1.0f32);
        }
    }

    #[test]
    fn cancelled_loads_have_their_own_code() {
        assert_eq!(
            error_code(&CadenzaError::Cancelled("load")),
            CADENZA_ERR_CANCELLED
        );
    }

    #[test]
    fn handle_lifecycle_through_c_surface() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 8_000, 1, 2.0);
        let c_path = CString::new(path.to_str().unwrap()).unwrap();

        system::initialize_with(
            CadenzaConfig::default(),
            Arc::new(VirtualOutput::new(8_000, 1)),
        )
        .unwrap();

        let handle = music_player_new();
        assert!(!handle.is_null());
        unsafe {
            assert_eq!(get_status(handle), PlaybackState::Idle.code());
            assert_eq!(get_duration(handle), -1.0);
            assert_eq!(pause_music(handle), CADENZA_ERR_INVALID_STATE);

            assert_eq!(load_music(handle, c_path.as_ptr()), CADENZA_OK);
            assert_eq!(get_status(handle), PlaybackState::Loaded.code());
            assert!((get_media_duration(handle) - 2.0).abs() < 0.01);
            assert!((get_duration(handle) - 2.0).abs() < 0.01);

            assert_eq!(set_volume(handle, 150), CADENZA_OK);
            assert_eq!(get_volume(handle), 100);
            assert_eq!(set_volume(handle, -3), CADENZA_OK);
            assert_eq!(get_volume(handle), 0);

            assert_eq!(play_music(handle), CADENZA_OK);
            assert_eq!(get_status(handle), PlaybackState::Playing.code());
            assert_eq!(set_position(handle, 1), CADENZA_OK);
            assert!((get_position(handle) - 1.0).abs() < 0.01);
            assert_eq!(pause_music(handle), CADENZA_OK);
            assert_eq!(resume_music(handle), CADENZA_OK);
            assert_eq!(stop_music(handle), CADENZA_OK);
            assert_eq!(get_status(handle), PlaybackState::Stopped.code());
            assert_eq!(get_position(handle), 0.0);

            assert_eq!(cleanup_music_player(), CADENZA_ERR_HANDLES_ACTIVE);
            music_player_free(handle);
        }
        assert_eq!(cleanup_music_player(), CADENZA_OK);
        assert!(music_player_new().is_null());
        assert_eq!(cleanup_music_player(), CADENZA_ERR_INIT);
    }
}
