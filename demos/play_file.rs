//! Plays an audio file on the default output device.
//!
//! ```text
//! cargo run --example play_file -- path/to/file.wav [start-seconds]
//! ```

use anyhow::{Context, Result, bail};
use petalplay::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1) else {
        bail!("usage: {} <file> [start-seconds]", args[0]);
    };
    let start = match args.get(2) {
        Some(arg) => arg
            .parse::<f64>()
            .with_context(|| format!("invalid start position {:?}", arg))?,
        None => 0.0,
    };

    let player = Player::new(
        Arc::new(SymphoniaDecoder::new()),
        Arc::new(CpalOutput::new()?),
        Arc::new(MonotonicClock::new()),
        Arc::new(LogFacade::new()),
        PlayerConfig::default(),
    )?;

    let info = player
        .load(path)
        .with_context(|| format!("failed to load {}", path))?;
    println!(
        "{}: {:.1}s, {} Hz, {} channels",
        path, info.duration, info.sample_rate, info.channels
    );

    if start > 0.0 {
        player.seek(start)?;
    }
    player.play()?;

    loop {
        thread::sleep(Duration::from_millis(500));

        for event in player.poll_events() {
            if let PlayerEvent::PumpFailed(err) = &event {
                eprintln!("playback failed: {}", err);
            }
        }

        match player.state() {
            PlaybackState::Playing => {
                println!("{:6.1}s / {:.1}s", player.current_time(), player.duration());
            }
            PlaybackState::Error(err) => bail!("player entered error state: {}", err),
            _ => break,
        }
    }

    println!("Done");
    Ok(())
}
