//! Event types for petalplay

use crate::audio_data::StreamInfo;
use crate::error::CoreError;
use crate::player::PlaybackState;

/// Notifications queued by the player, drained with `Player::poll_events`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// A source was opened and the output configured for it.
    Loaded(StreamInfo),
    StateChanged {
        old: PlaybackState,
        new: PlaybackState,
    },
    /// The decoder ran dry while playing.
    EndOfStream,
    /// The pump gave up after a decode or delivery failure.
    PumpFailed(CoreError),
}

impl PlayerEvent {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::PumpFailed(_)
                | Self::StateChanged {
                    new: PlaybackState::Error(_),
                    ..
                }
        )
    }

    /// The state entered, for `StateChanged` events.
    pub fn state(&self) -> Option<&PlaybackState> {
        match self {
            Self::StateChanged { new, .. } => Some(new),
            _ => None,
        }
    }
}
