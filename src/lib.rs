//! # petalplay
//!
//! A small playback core for local audio files. The [`Player`] owns the
//! playback state machine and a background pump that moves decoded audio to
//! an output device; everything platform specific sits behind four
//! capabilities injected at construction:
//!
//! - [`AudioDecoder`] turns a source into interleaved `f32` frames
//!   ([`SymphoniaDecoder`] by default)
//! - [`AudioOutput`] accepts frames for the device ([`CpalOutput`])
//! - [`Clock`] drives the reported position ([`MonotonicClock`])
//! - [`Logger`] receives diagnostics ([`LogFacade`] forwards to `log`)
//!
//! ## Quick Start
//!
//! ```no_run
//! use petalplay::*;
//! use std::sync::Arc;
//!
//! let player = Player::new(
//!     Arc::new(SymphoniaDecoder::new()),
//!     Arc::new(CpalOutput::new()?),
//!     Arc::new(MonotonicClock::new()),
//!     Arc::new(LogFacade::new()),
//!     PlayerConfig::default(),
//! )?;
//!
//! let info = player.load("audio.wav")?;
//! println!("{} Hz, {} channels", info.sample_rate, info.channels);
//! player.play()?;
//!
//! // Poll for events
//! for event in player.poll_events() {
//!     if let PlayerEvent::PumpFailed(err) = event {
//!         eprintln!("playback failed: {}", err);
//!     }
//! }
//! # Ok::<(), CoreError>(())
//! ```

pub mod audio_data;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod output;
pub mod player;

pub use audio_data::{AudioDecoder, DecodeHandle, StreamInfo, SymphoniaDecoder};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::PlayerConfig;
pub use error::{CoreError, ErrorKind, Result};
pub use events::PlayerEvent;
pub use logging::{LogFacade, LogLevel, Logger, NullLogger};
pub use output::{AudioOutput, CpalOutput};
pub use player::{PlaybackState, Player};
