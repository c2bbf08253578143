//! Audio-output capability

mod cpal_output;

pub use cpal_output::CpalOutput;

use crate::error::Result;

/// Sink that renders interleaved f32 PCM on an audio device.
///
/// Lifecycle: [`configure`](AudioOutput::configure) first, then any number of
/// [`start`](AudioOutput::start)/[`stop`](AudioOutput::stop) cycles.
/// `configure` is never called while started.
///
/// # Real-time contract
///
/// [`deliver`](AudioOutput::deliver) may run on a real-time constrained
/// thread. It must complete in bounded time: no heap allocation, no blocking
/// syscalls, no lock that a non-real-time caller can hold. When the sink
/// cannot take everything it returns how many frames it did take; callers
/// keep the remainder and offer it again.
pub trait AudioOutput: Send + Sync {
    /// Prepares the sink for `sample_rate` Hz, `channels` interleaved
    /// channels and roughly `buffer_size_hint` frames of device buffering.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero rate/channel count/hint, `InvalidState`
    /// when called while started.
    fn configure(&self, sample_rate: u32, channels: u16, buffer_size_hint: usize) -> Result<()>;

    /// Begins rendering.
    ///
    /// # Errors
    ///
    /// `InvalidState` when not configured, `Io` when the device is not
    /// available.
    fn start(&self) -> Result<()>;

    /// Stops rendering. Idempotent and infallible; backend problems are
    /// logged by the implementation.
    fn stop(&self);

    /// Queues the first `frame_count` frames of `buffer` and returns how many
    /// frames were accepted (possibly fewer, possibly zero).
    fn deliver(&self, buffer: &[f32], frame_count: usize) -> Result<usize>;

    /// Drops audio that was accepted by `deliver` but not rendered yet.
    fn flush(&self) {}
}
