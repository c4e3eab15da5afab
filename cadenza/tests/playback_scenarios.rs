mod common;

use cadenza::{CadenzaError, DecodeError, PlaybackState, PlayerEvent, VirtualOutput};
use common::*;
use std::time::Duration;

#[test]
fn thirty_second_track_plays_seeks_and_finishes() {
    let rig = Rig::new();
    let path = rig.track("thirty.wav", 30.0);

    rig.player.load(&path).unwrap();
    assert_eq!(rig.player.status(), PlaybackState::Loaded);
    assert_close(rig.player.duration(), 30.0, 1e-6);

    rig.player.play().unwrap();
    assert_eq!(rig.player.status(), PlaybackState::Playing);

    let mut last = rig.player.position();
    for _ in 0..200 {
        rig.tick(BLOCK);
        let position = rig.player.position();
        assert!(position >= last, "position went backwards: {} -> {}", last, position);
        last = position;
    }
    assert_close(rig.player.position(), 10.0, 0.01);

    let landed = rig.seek(25.0);
    assert_close(landed, 25.0, 0.01);
    assert_close(rig.player.position(), 25.0, 0.01);

    assert_eq!(rig.play_to_end(), PlaybackState::Stopped);
    assert_eq!(rig.player.position(), 0.0);
    assert!(wait_until(Duration::from_secs(2), || !rig.device.is_open()));

    let events = rig.player.poll_events();
    assert!(events.contains(&PlayerEvent::TrackFinished));
    assert!(events.contains(&PlayerEvent::StateChanged {
        from: PlaybackState::Playing,
        to: PlaybackState::Stopped,
    }));
}

#[test]
fn finished_track_releases_the_device() {
    let rig = Rig::new();
    let path = rig.track("short.wav", 0.5);
    rig.player.load(&path).unwrap();
    rig.player.play().unwrap();

    assert_eq!(rig.play_to_end(), PlaybackState::Stopped);
    assert!(wait_until(Duration::from_secs(2), || !rig.device.is_open()));
    assert_eq!(peak(&rig.device.tick(BLOCK)), 0.0);
    assert_eq!(rig.player.position(), 0.0);
    assert!(rig.player.stop().unwrap_err().is_invalid_state());
    assert!(rig.player.play().unwrap_err().is_invalid_state());
    assert!(rig.player.track().is_some());

    rig.player.load(&path).unwrap();
    rig.player.play().unwrap();
    rig.play_for(0.25);
    assert_close(rig.player.position(), 0.25, 0.01);
    assert_eq!(rig.device.streams_opened(), 2);
}

#[test]
fn load_reports_events_and_durations() {
    let rig = Rig::new();
    let path = rig.track("tone.wav", 3.0);
    rig.player.load(&path).unwrap();

    assert_close(rig.player.media_duration().unwrap(), 3.0, 1e-6);
    let song_length = rig.player.song_length().expect("wav properties carry a length");
    assert_close(song_length, 3.0, 0.5);

    let track = rig.player.track().unwrap();
    assert_eq!(track.sample_rate(), RATE);
    assert_eq!(track.channels(), 1);

    let events = rig.player.poll_events();
    assert_eq!(events[0], PlayerEvent::StateChanged {
        from: PlaybackState::Idle,
        to: PlaybackState::Loaded,
    });
    assert!(matches!(
        &events[1],
        PlayerEvent::TrackLoaded { path: loaded, .. } if loaded == &path
    ));
}

#[test]
fn pause_freezes_position_and_silences_output() {
    let rig = Rig::new();
    rig.player.load(rig.track("tone.wav", 5.0)).unwrap();
    rig.player.play().unwrap();

    rig.play_for(1.0);
    rig.player.pause().unwrap();
    assert_eq!(rig.player.status(), PlaybackState::Paused);
    let frozen = rig.player.position();
    assert_close(frozen, 1.0, 0.01);

    let paused_output = rig.play_for(1.0);
    assert_eq!(peak(&paused_output), 0.0);
    assert_eq!(rig.player.position(), frozen);

    rig.player.resume().unwrap();
    let resumed_output = rig.play_for(0.5);
    assert!(peak(&resumed_output) > 0.4);
    assert_close(rig.player.position(), 1.5, 0.01);
}

#[test]
fn volume_is_applied_and_clamped() {
    let rig = Rig::new();
    rig.player.load(rig.track("tone.wav", 5.0)).unwrap();
    rig.player.play().unwrap();

    let full = peak(&rig.play_for(0.5));
    assert_close(full as f64, AMPLITUDE as f64, 0.01);

    assert_eq!(rig.player.set_volume(50), 50);
    assert_eq!(rig.player.volume(), 50);
    let half = peak(&rig.play_for(0.5));
    assert_close(half as f64, full as f64 / 2.0, 0.01);

    assert_eq!(rig.player.set_volume(0), 0);
    assert_eq!(peak(&rig.play_for(0.25)), 0.0);

    assert_eq!(rig.player.set_volume(250), 100);
    assert_eq!(rig.player.set_volume(-20), 0);
    assert_eq!(rig.player.volume(), 0);
}

#[test]
fn stop_rewinds_and_allows_a_fresh_cycle() {
    let rig = Rig::new();
    let path = rig.track("tone.wav", 4.0);
    rig.player.load(&path).unwrap();
    rig.player.play().unwrap();
    rig.play_for(1.0);
    assert!(rig.device.is_open());

    rig.player.stop().unwrap();
    assert_eq!(rig.player.status(), PlaybackState::Stopped);
    assert_eq!(rig.player.position(), 0.0);
    assert!(!rig.device.is_open());

    rig.player.load(&path).unwrap();
    assert_eq!(rig.player.status(), PlaybackState::Loaded);
    rig.player.play().unwrap();
    rig.play_for(0.5);
    assert_close(rig.player.position(), 0.5, 0.01);
    assert_eq!(rig.device.streams_opened(), 2);
}

#[test]
fn loading_while_playing_replaces_the_pipeline() {
    let rig = Rig::new();
    rig.player.load(rig.track("first.wav", 4.0)).unwrap();
    rig.player.play().unwrap();
    rig.play_for(1.0);

    rig.player.poll_events();
    rig.player.load(rig.track("second.wav", 2.0)).unwrap();
    assert_eq!(rig.player.status(), PlaybackState::Loaded);
    // The old pipeline is stopped before the new track opens
    let events = rig.player.poll_events();
    assert_eq!(events[0], PlayerEvent::StateChanged {
        from: PlaybackState::Playing,
        to: PlaybackState::Stopped,
    });
    assert_eq!(events[1], PlayerEvent::StateChanged {
        from: PlaybackState::Stopped,
        to: PlaybackState::Loaded,
    });
    assert_eq!(rig.player.position(), 0.0);
    assert_close(rig.player.duration(), 2.0, 1e-6);
    assert!(!rig.device.is_open());
}

#[test]
fn corrupt_file_moves_to_error_without_threads() {
    let rig = Rig::new();
    let path = rig.dir.path().join("broken.wav");
    write_garbage(&path);

    let err = rig.player.load(&path).unwrap_err();
    assert!(matches!(err, CadenzaError::Decode(_)), "got {:?}", err);
    assert_eq!(rig.player.status(), PlaybackState::Error);
    assert_eq!(rig.device.streams_opened(), 0);
    assert!(rig.player.play().unwrap_err().is_invalid_state());

    // A good file recovers the handle
    rig.player.load(rig.track("tone.wav", 1.0)).unwrap();
    assert_eq!(rig.player.status(), PlaybackState::Loaded);
}

#[test]
fn missing_file_is_an_io_failure() {
    let rig = Rig::new();
    let err = rig
        .player
        .load(rig.dir.path().join("does-not-exist.mp3"))
        .unwrap_err();
    assert!(matches!(err, CadenzaError::Decode(DecodeError::IoFailure(_))));
    assert_eq!(rig.player.status(), PlaybackState::Error);
    assert!(rig.player.track().is_none());
    assert_eq!(rig.player.duration(), 0.0);
    assert!(!rig.device.is_open());
}

#[test]
fn invalid_transitions_are_rejected_without_side_effects() {
    let rig = Rig::new();
    for result in [
        rig.player.play(),
        rig.player.pause(),
        rig.player.resume(),
        rig.player.stop(),
    ] {
        assert!(result.unwrap_err().is_invalid_state());
    }
    assert_eq!(rig.player.status(), PlaybackState::Idle);

    // Seeking outside playback is accepted and ignored
    rig.player.set_position(3.0).unwrap();
    assert_eq!(rig.player.position(), 0.0);

    rig.player.load(rig.track("tone.wav", 2.0)).unwrap();
    assert!(rig.player.resume().unwrap_err().is_invalid_state());
    assert!(rig.player.stop().unwrap_err().is_invalid_state());
    rig.player.set_position(1.0).unwrap();
    assert_eq!(rig.player.position(), 0.0);
    assert_eq!(rig.player.status(), PlaybackState::Loaded);

    rig.player.play().unwrap();
    assert!(rig.player.play().unwrap_err().is_invalid_state());
    assert!(rig.player.resume().unwrap_err().is_invalid_state());
    assert_eq!(rig.player.status(), PlaybackState::Playing);
}

#[test]
fn seek_targets_are_clamped() {
    let rig = Rig::new();
    rig.player.load(rig.track("tone.wav", 6.0)).unwrap();
    rig.player.play().unwrap();
    rig.play_for(0.5);

    rig.seek(-4.0);
    assert_close(rig.player.position(), 0.0, 0.01);

    rig.seek(3.0);
    rig.player.pause().unwrap();
    rig.seek(1.0);
    assert_eq!(rig.player.status(), PlaybackState::Paused);
    assert_close(rig.player.position(), 1.0, 0.01);

    rig.player.resume().unwrap();
    rig.play_for(0.5);
    assert_close(rig.player.position(), 1.5, 0.01);

    rig.player.set_position(60.0).unwrap();
    assert!(rig.player.position() <= rig.player.duration());
}

#[test]
fn output_is_converted_to_device_format() {
    let rig = Rig::with_device(VirtualOutput::new(RATE * 2, 2));
    rig.player.load(rig.track("mono-8k.wav", 3.0)).unwrap();
    rig.player.play().unwrap();

    let mut output = Vec::new();
    for _ in 0..20 {
        output.extend(rig.tick(BLOCK));
    }
    // 20 periods of 400 frames at 16 kHz
    assert_close(rig.player.position(), 0.5, 0.01);
    assert!(peak(&output) > 0.3);
    for frame in output.chunks_exact(2) {
        assert_eq!(frame[0], frame[1]);
    }
}

#[test]
fn device_loss_moves_to_error() {
    let rig = Rig::new();
    rig.player.load(rig.track("tone.wav", 5.0)).unwrap();
    rig.player.play().unwrap();
    rig.play_for(0.25);
    rig.player.poll_events();

    rig.device.fail("device unplugged");
    assert_eq!(rig.player.status(), PlaybackState::Error);
    assert!(wait_until(Duration::from_secs(2), || !rig.device.is_open()));

    let events = rig.player.poll_events();
    assert!(events.iter().any(|event| matches!(
        event,
        PlayerEvent::DeviceLost { error } if error == "device unplugged"
    )));
    assert!(rig.player.pause().unwrap_err().is_invalid_state());
}

#[test]
fn dropping_the_player_releases_everything() {
    let rig = Rig::new();
    rig.player.load(rig.track("tone.wav", 5.0)).unwrap();
    rig.player.play().unwrap();
    rig.play_for(0.25);
    assert_eq!(rig.system.active_handles(), 1);

    let Rig {
        device,
        system,
        player,
        dir: _dir,
    } = rig;
    drop(player);
    assert!(!device.is_open());
    assert_eq!(system.active_handles(), 0);
    system.close().unwrap();
}
