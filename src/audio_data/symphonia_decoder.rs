use crate::{
    audio_data::{AudioDecoder, DecodeHandle, StreamInfo},
    error::{CoreError, Result},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use symphonia::{
    core::{
        audio::SampleBuffer,
        codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions},
        errors::{Error, SeekErrorKind},
        formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
        io::MediaSourceStream,
        meta::MetadataOptions,
        probe::Hint,
        units::{Time, TimeBase},
    },
    default::{get_codecs, get_probe},
};

/// Default decoder backed by Symphonia.
///
/// Handles every format enabled in the `symphonia` build (WAV, FLAC, OGG
/// Vorbis, ... with default features) and decodes on demand, packet by
/// packet, into f32 PCM.
///
/// # Examples
///
/// ```ignore
/// use petalplay::audio_data::{AudioDecoder, SymphoniaDecoder};
///
/// let decoder = SymphoniaDecoder::new();
/// let handle = decoder.open("path/to/audio.flac")?;
/// let info = decoder.info(handle)?;
/// ```
#[derive(Default)]
pub struct SymphoniaDecoder {
    sessions: Mutex<HashMap<DecodeHandle, Arc<Mutex<DecodeSession>>>>,
}

struct DecodeSession {
    source: PacketSource,
    queue: SampleQueue,
    info: StreamInfo,
}

/// Container and codec state for one track.
struct PacketSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    channels: usize,
    // Frames to drop after an accurate seek landed before the target
    skip_frames: u64,
}

/// Decoded samples not yet handed out by `read`.
#[derive(Default)]
struct SampleQueue {
    samples: Vec<f32>,
    pos: usize,
    finished: bool,
    // Raised after some frames were already returned; reported next call
    deferred: Option<CoreError>,
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions that are open and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    fn session(&self, handle: DecodeHandle) -> Result<Arc<Mutex<DecodeSession>>> {
        self.sessions
            .lock()
            .get(&handle)
            .cloned()
            .ok_or_else(|| CoreError::InvalidState(format!("{} is not open", handle)))
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn open(&self, source: &str) -> Result<DecodeHandle> {
        let file = File::open(source).map_err(CoreError::from)?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = Path::new(source).extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(map_error)?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| CoreError::Unsupported("No decodable audio track found".into()))?;

        let params = &track.codec_params;

        let sample_rate = params
            .sample_rate
            .filter(|rate| *rate > 0)
            .ok_or_else(|| CoreError::Decode("Sample rate not found".into()))?;

        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .filter(|count| *count > 0)
            .ok_or_else(|| CoreError::Decode("Channel count not found".into()))?;

        let duration = params
            .n_frames
            .map(|frames| frames as f64 / sample_rate as f64)
            .unwrap_or(f64::INFINITY);

        let mut info = StreamInfo::new(duration, sample_rate, channels);
        if let Some(bits) = params.bits_per_sample {
            info = info.with_bit_depth(bits as u16);
        }

        let decoder = get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(map_error)?;

        let session = DecodeSession {
            source: PacketSource {
                track_id: track.id,
                time_base: params.time_base,
                channels: channels as usize,
                format,
                decoder,
                skip_frames: 0,
            },
            queue: SampleQueue::default(),
            info,
        };

        let handle = DecodeHandle::new();
        log::debug!(
            "Opened {} as {}: {} Hz, {} ch, {:.3}s",
            source,
            handle,
            sample_rate,
            channels,
            duration
        );

        self.sessions
            .lock()
            .insert(handle, Arc::new(Mutex::new(session)));
        Ok(handle)
    }

    fn read(&self, handle: DecodeHandle, buffer: &mut [f32], max_frames: usize) -> Result<usize> {
        let session = self.session(handle)?;
        let mut session = session.lock();

        let wanted = session.info.samples_for(max_frames);
        if buffer.len() < wanted {
            return Err(CoreError::InvalidArgument(format!(
                "Buffer holds {} samples, {} frames need {}",
                buffer.len(),
                max_frames,
                wanted
            )));
        }

        let channels = session.source.channels;
        let DecodeSession { source, queue, .. } = &mut *session;
        let written = queue.fill(&mut buffer[..wanted], |out| source.decode_into(out))?;
        Ok(written / channels)
    }

    fn seek(&self, handle: DecodeHandle, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(CoreError::InvalidArgument(format!(
                "Cannot seek to {}s",
                seconds
            )));
        }

        let session = self.session(handle)?;
        let mut session = session.lock();
        let sample_rate = session.info.sample_rate;
        let source = &mut session.source;

        let seeked = source
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(seconds),
                    track_id: Some(source.track_id),
                },
            )
            .map_err(map_error)?;

        source.decoder.reset();

        let lead_in = seeked.required_ts.saturating_sub(seeked.actual_ts);
        source.skip_frames = match source.time_base {
            Some(tb) => {
                let time = tb.calc_time(lead_in);
                ((time.seconds as f64 + time.frac) * sample_rate as f64).round() as u64
            }
            None => lead_in,
        };
        let skip_frames = source.skip_frames;
        session.queue = SampleQueue::default();

        log::debug!(
            "{} seeked to {:.3}s (skipping {} frames)",
            handle,
            seconds,
            skip_frames
        );
        Ok(())
    }

    fn info(&self, handle: DecodeHandle) -> Result<StreamInfo> {
        let session = self.session(handle)?;
        let info = session.lock().info;
        Ok(info)
    }

    fn close(&self, handle: DecodeHandle) {
        if self.sessions.lock().remove(&handle).is_some() {
            log::debug!("Closed {}", handle);
        }
    }
}

impl SampleQueue {
    /// Copies queued samples into `out`, calling `refill` whenever the queue
    /// runs dry. `refill` appends to the emptied queue and returns `false` at
    /// end of stream. Returns the number of samples written.
    fn fill(
        &mut self,
        out: &mut [f32],
        mut refill: impl FnMut(&mut Vec<f32>) -> Result<bool>,
    ) -> Result<usize> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }

        let mut written = 0;
        while written < out.len() {
            let available = self.samples.len() - self.pos;
            if available > 0 {
                let n = available.min(out.len() - written);
                out[written..written + n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
                self.pos += n;
                written += n;
                continue;
            }

            if self.finished {
                break;
            }

            self.samples.clear();
            self.pos = 0;
            match refill(&mut self.samples) {
                Ok(true) => {}
                Ok(false) => self.finished = true,
                Err(err) if written > 0 => {
                    self.deferred = Some(err);
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(written)
    }
}

impl PacketSource {
    /// Appends the next decoded packet to `out`. Returns `false` at end of
    /// stream.
    fn decode_into(&mut self, out: &mut Vec<f32>) -> Result<bool> {
        let channels = self.channels;

        loop {
            // Read the next packet from the container
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(Error::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(map_error(e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // also EOF in some formats
                Err(Error::IoError(_)) => return Ok(false),
                Err(Error::DecodeError(what)) => {
                    log::warn!("Skipping corrupt packet: {}", what);
                    continue;
                }
                Err(e) => return Err(map_error(e)),
            };

            let spec = *decoded.spec();
            if spec.channels.count() != channels {
                return Err(CoreError::Decode(format!(
                    "Channel count changed mid-stream ({} -> {})",
                    channels,
                    spec.channels.count()
                )));
            }
            if decoded.frames() == 0 {
                continue;
            }

            let mut tmp = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            tmp.copy_interleaved_ref(decoded);
            let samples = tmp.samples();

            let skip = (self.skip_frames as usize * channels).min(samples.len());
            self.skip_frames -= (skip / channels) as u64;
            out.extend_from_slice(&samples[skip..]);

            if !out.is_empty() {
                return Ok(true);
            }
        }
    }
}

fn map_error(err: Error) -> CoreError {
    match err {
        Error::IoError(e) => CoreError::from(e),
        Error::Unsupported(what) => CoreError::Unsupported(what.to_string()),
        Error::DecodeError(what) => CoreError::Decode(what.to_string()),
        Error::SeekError(SeekErrorKind::Unseekable | SeekErrorKind::ForwardOnly) => {
            CoreError::Unsupported("Stream is not seekable".into())
        }
        Error::SeekError(SeekErrorKind::OutOfRange) => {
            CoreError::InvalidArgument("Seek position out of range".into())
        }
        other => CoreError::Decode(other.to_string()),
    }
}
