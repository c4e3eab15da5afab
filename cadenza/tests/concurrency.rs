//! One player handle shared by several caller threads while the device keeps
//! ticking in the background.

mod common;

use cadenza::PlaybackState;
use common::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const ROUNDS: usize = 15;

#[test]
fn concurrent_commands_leave_a_consistent_handle() {
    let rig = Rig::new();
    let long = rig.track("long.wav", 2.0);
    let short = rig.track("short.wav", 1.0);
    let afterwards = rig.track("afterwards.wav", 1.0);
    let Rig {
        device,
        system,
        player,
        dir: _dir,
    } = rig;
    let player = Arc::new(player);
    let done = Arc::new(AtomicBool::new(false));

    let ticker = {
        let device = device.clone();
        let done = done.clone();
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                device.tick(BLOCK / 4);
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let reader = {
        let player = player.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut slowest = Duration::ZERO;
            while !done.load(Ordering::Acquire) {
                let started = Instant::now();
                let position = player.position();
                player.status();
                player.volume();
                player.stats();
                slowest = slowest.max(started.elapsed());
                assert!((0.0..=2.0).contains(&position), "position {}", position);
                thread::sleep(Duration::from_micros(200));
            }
            slowest
        })
    };

    let callers: Vec<_> = [long.clone(), short, long]
        .into_iter()
        .enumerate()
        .map(|(id, path)| {
            let player = player.clone();
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    let _ = player.load(&path);
                    let _ = player.play();
                    let _ = player.set_position((round % 4) as f64 * 0.5);
                    if (round + id) % 2 == 0 {
                        let _ = player.pause();
                        let _ = player.set_volume((round * 10) as i32);
                        let _ = player.resume();
                    }
                    let _ = player.stop();
                }
            })
        })
        .collect();

    for caller in callers {
        caller.join().unwrap();
    }
    done.store(true, Ordering::Release);
    ticker.join().unwrap();
    let slowest = reader.join().unwrap();
    assert!(
        slowest < Duration::from_millis(250),
        "a getter waited {:?}",
        slowest
    );

    // Every caller ends on stop, so nothing is left playing
    let state = player.status();
    assert!(
        matches!(state, PlaybackState::Stopped | PlaybackState::Loaded),
        "ended in {}",
        state
    );
    assert!(wait_until(Duration::from_secs(2), || !device.is_open()));

    // The handle still works after the storm
    player.load(&afterwards).unwrap();
    player.play().unwrap();
    assert!(device.is_open());
    player.stop().unwrap();
    assert!(!device.is_open());

    let player = Arc::try_unwrap(player).unwrap_or_else(|_| panic!("player still shared"));
    assert_eq!(system.active_handles(), 1);
    drop(player);
    assert_eq!(system.active_handles(), 0);
    system.close().unwrap();
}
