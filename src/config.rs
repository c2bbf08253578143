//! Configuration for the player

use crate::error::{CoreError, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Frames requested from the decoder per pump iteration
    pub frames_per_block: usize,
    /// Frame count handed to `AudioOutput::configure` as buffer hint
    pub buffer_size_hint: usize,
    /// Cooling-off delay before the pump surfaces a decode/delivery failure
    pub error_backoff: Duration,
    /// Sleep between delivery attempts when the output accepted nothing
    pub retry_interval: Duration,
    /// Capacity of the event queue drained by `Player::poll_events`
    pub event_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            frames_per_block: 1024,
            buffer_size_hint: 2048,
            error_backoff: Duration::from_millis(100),
            retry_interval: Duration::from_millis(2),
            event_capacity: 64,
        }
    }
}

impl PlayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_per_block(mut self, frames: usize) -> Self {
        self.frames_per_block = frames;
        self
    }

    pub fn buffer_size_hint(mut self, frames: usize) -> Self {
        self.buffer_size_hint = frames;
        self
    }

    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.frames_per_block == 0 {
            return Err(CoreError::InvalidArgument(
                "frames_per_block must be greater than zero".into(),
            ));
        }
        if self.buffer_size_hint == 0 {
            return Err(CoreError::InvalidArgument(
                "buffer_size_hint must be greater than zero".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(CoreError::InvalidArgument(
                "event_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_are_valid() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frames_per_block, 1024);
        assert_eq!(config.error_backoff, Duration::from_millis(100));
    }

    #[test]
    fn builder_overrides_fields() {
        let config = PlayerConfig::new()
            .frames_per_block(256)
            .buffer_size_hint(512)
            .error_backoff(Duration::ZERO)
            .retry_interval(Duration::from_micros(100))
            .event_capacity(8);

        assert_eq!(config.frames_per_block, 256);
        assert_eq!(config.buffer_size_hint, 512);
        assert_eq!(config.error_backoff, Duration::ZERO);
        assert_eq!(config.retry_interval, Duration::from_micros(100));
        assert_eq!(config.event_capacity, 8);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let err = PlayerConfig::new().frames_per_block(0).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(PlayerConfig::new().buffer_size_hint(0).validate().is_err());
        assert!(PlayerConfig::new().event_capacity(0).validate().is_err());
    }
}
