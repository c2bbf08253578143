//! Decoder capability and the stream metadata it reports

mod symphonia_decoder;

pub use symphonia_decoder::SymphoniaDecoder;

use crate::error::Result;
use uuid::Uuid;

/// Opaque token for one open decode session.
///
/// Unique per [`AudioDecoder::open`] call and invalidated by the matching
/// [`AudioDecoder::close`]. Using it afterwards yields `InvalidState`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DecodeHandle(Uuid);

impl DecodeHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DecodeHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DecodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DecodeHandle({})", self.0)
    }
}

/// Format of a decoded stream, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    /// Total length in seconds. `f64::INFINITY` when the stream does not
    /// declare a length.
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Bit depth of the source material. Decoded PCM is always f32.
    pub bit_depth: Option<u16>,
}

impl StreamInfo {
    pub fn new(duration: f64, sample_rate: u32, channels: u16) -> Self {
        Self {
            duration,
            sample_rate,
            channels,
            bit_depth: None,
        }
    }

    pub fn with_bit_depth(mut self, bits: u16) -> Self {
        self.bit_depth = Some(bits);
        self
    }

    pub fn has_finite_duration(&self) -> bool {
        self.duration.is_finite()
    }

    /// Interleaved sample count for `frames` frames.
    pub fn samples_for(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }
}

/// Produces interleaved f32 PCM from a media source.
///
/// PetalPlay ships [`SymphoniaDecoder`]; hosts can bring their own backend
/// (platform media frameworks, hardware decoders) by implementing this trait.
///
/// Calls for different handles may run concurrently. Calls sharing one handle
/// are never issued concurrently by the player.
///
/// # Example
///
/// ```ignore
/// use petalplay::audio_data::{AudioDecoder, DecodeHandle, StreamInfo};
/// use petalplay::error::Result;
///
/// struct Silence;
///
/// impl AudioDecoder for Silence {
///     fn open(&self, source: &str) -> Result<DecodeHandle> { todo!() }
///     fn read(&self, handle: DecodeHandle, buffer: &mut [f32], max_frames: usize) -> Result<usize> { todo!() }
///     fn seek(&self, handle: DecodeHandle, seconds: f64) -> Result<()> { todo!() }
///     fn info(&self, handle: DecodeHandle) -> Result<StreamInfo> { todo!() }
///     fn close(&self, handle: DecodeHandle) {}
/// }
/// ```
pub trait AudioDecoder: Send + Sync {
    /// Opens `source` and returns a fresh handle.
    ///
    /// # Errors
    ///
    /// `NotFound` when the source does not exist, `Unsupported` when the
    /// container or codec is not handled, `Decode` for malformed content and
    /// `Io` for any other lower-layer failure.
    fn open(&self, source: &str) -> Result<DecodeHandle>;

    /// Decodes up to `max_frames` frames into `buffer`, which must hold at
    /// least `max_frames * channels` samples. Returns the number of frames
    /// written; `0` means end of stream.
    fn read(&self, handle: DecodeHandle, buffer: &mut [f32], max_frames: usize) -> Result<usize>;

    /// Repositions the stream to `seconds` from the start.
    fn seek(&self, handle: DecodeHandle, seconds: f64) -> Result<()>;

    /// Stream format captured at open time. Performs no I/O.
    fn info(&self, handle: DecodeHandle) -> Result<StreamInfo>;

    /// Releases the session. Unknown or already closed handles are ignored.
    fn close(&self, handle: DecodeHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique() {
        let a = DecodeHandle::new();
        let b = DecodeHandle::new();
        assert_ne!(a, b);
        let copied = a;
        assert_eq!(a, copied);
        assert!(a.to_string().starts_with("DecodeHandle("));
    }

    #[test]
    fn stream_info_helpers() {
        let info = StreamInfo::new(10.0, 44100, 2).with_bit_depth(16);
        assert_eq!(info.bit_depth, Some(16));
        assert_eq!(info.samples_for(512), 1024);
        assert!(info.has_finite_duration());
        assert!(!StreamInfo::new(f64::INFINITY, 48000, 1).has_finite_duration());
    }
}
