use anyhow::{Context, Result, bail};
use cadenza::{CadenzaPlayer, PlaybackState, PlayerEvent, system};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Play one media file on the default output device
#[derive(Parser, Debug)]
#[command(name = "cadenza-demo")]
#[command(version)]
pub struct Options {
    /// Media file to play
    pub path: PathBuf,

    /// Volume in percent; out-of-range values are clamped
    #[arg(long, allow_negative_numbers = true)]
    pub volume: Option<i32>,

    /// Seek to this position (seconds) right after playback starts
    #[arg(long)]
    pub seek: Option<f64>,
}

pub fn run(options: Options) -> Result<()> {
    let audio = system::initialize().context("Failed to initialize audio")?;
    log::info!("Audio system ready ({} backend)", audio.backend_name());

    let player = CadenzaPlayer::new(&audio)?;
    player
        .load(&options.path)
        .with_context(|| format!("Failed to load {}", options.path.display()))?;

    log::info!(
        "Duration: {:.2}s (decoder), song length: {}",
        player.media_duration().unwrap_or_default(),
        player
            .song_length()
            .map(|s| format!("{:.2}s", s))
            .unwrap_or_else(|| "unknown".to_string())
    );

    if let Some(volume) = options.volume {
        let applied = player.set_volume(volume);
        log::info!("Volume set to {}%", applied);
    }

    player.play()?;
    if let Some(seek) = options.seek {
        log::info!("Seeking to {:.1}s", seek);
        player.set_position(seek)?;
    }

    loop {
        std::thread::sleep(Duration::from_secs(1));

        for event in player.poll_events() {
            match event {
                PlayerEvent::BufferUnderrun { total } => log::warn!("Underrun #{}", total),
                PlayerEvent::DecodeFailed { error } => log::error!("Decode failed: {}", error),
                PlayerEvent::DeviceLost { error } => log::error!("Device lost: {}", error),
                PlayerEvent::SeekCompleted { actual, .. } => {
                    log::info!("Seek landed at {:.2}s", actual)
                }
                _ => log::debug!("{:?}", event),
            }
        }

        match player.status() {
            PlaybackState::Playing => {
                println!("{:>7.2}s / {:.2}s", player.position(), player.duration());
            }
            PlaybackState::Stopped => {
                log::info!("Track finished");
                break;
            }
            PlaybackState::Error => bail!("Playback failed"),
            other => log::debug!("Player is {}", other),
        }
    }

    drop(player);
    system::cleanup()?;
    Ok(())
}
