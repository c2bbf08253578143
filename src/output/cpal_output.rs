use crate::error::{CoreError, Result};
use crate::output::AudioOutput;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Sender, bounded, unbounded};
use parking_lot::Mutex;
use ringbuf::{
    HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// Ring capacity in device buffers; gives the pump headroom between wakeups
const RING_BUFFERS: usize = 2;

#[derive(Debug, Clone, Copy)]
struct StreamSettings {
    sample_rate: u32,
    channels: u16,
    buffer_size_hint: usize,
}

enum OutputCommand {
    Configure {
        settings: StreamSettings,
        consumer: RingConsumer,
        reply: Sender<Result<()>>,
    },
    Start {
        reply: Sender<Result<()>>,
    },
    /// Fire-and-forget; commands are handled in order, so a later `Start`
    /// or `Configure` still sees the stream paused.
    Stop,
    Shutdown,
}

/// Output backed by the default cpal device.
///
/// `cpal::Stream` is not `Send` on every platform, so the stream lives on a
/// dedicated worker thread and control calls are forwarded to it over a
/// channel. Audio travels through a lock-free ring buffer: `deliver` pushes
/// into it and the device callback pops from it, filling gaps with silence.
pub struct CpalOutput {
    commands: Sender<OutputCommand>,
    worker: Option<JoinHandle<()>>,
    producer: Mutex<Option<RingProducer>>,
    channels: AtomicU16,
    started: AtomicBool,
    clear_flag: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicUsize>,
}

impl CpalOutput {
    pub fn new() -> Result<Self> {
        let (commands, command_rx) = unbounded::<OutputCommand>();
        let clear_flag = Arc::new(AtomicBool::new(false));
        let frames_rendered = Arc::new(AtomicUsize::new(0));

        let worker_clear_flag = clear_flag.clone();
        let worker_frames_rendered = frames_rendered.clone();
        let worker = thread::Builder::new()
            .name("petalplay-output".to_string())
            .spawn(move || {
                let mut worker = OutputWorker::new(worker_clear_flag, worker_frames_rendered);
                for command in command_rx.iter() {
                    if !worker.handle(command) {
                        break;
                    }
                }
                log::debug!("Output worker exiting");
            })
            .map_err(CoreError::io)?;

        Ok(Self {
            commands,
            worker: Some(worker),
            producer: Mutex::new(None),
            channels: AtomicU16::new(0),
            started: AtomicBool::new(false),
            clear_flag,
            frames_rendered,
        })
    }

    /// Check if the device stream is currently running
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Number of frames the device callback took from the ring buffer
    pub fn frames_rendered(&self) -> usize {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> OutputCommand) -> Result<T> {
        let (reply, reply_rx) = bounded(1);
        self.commands
            .send(make(reply))
            .map_err(|_| CoreError::io_msg("Output worker is not running"))?;
        reply_rx
            .recv()
            .map_err(|_| CoreError::io_msg("Output worker dropped the request"))
    }
}

impl AudioOutput for CpalOutput {
    fn configure(&self, sample_rate: u32, channels: u16, buffer_size_hint: usize) -> Result<()> {
        if sample_rate == 0 || channels == 0 || buffer_size_hint == 0 {
            return Err(CoreError::InvalidArgument(format!(
                "Cannot configure output for {} Hz, {} channels, {} frames",
                sample_rate, channels, buffer_size_hint
            )));
        }
        if self.is_started() {
            return Err(CoreError::InvalidState(
                "Output must be stopped before it is reconfigured".into(),
            ));
        }

        let capacity = buffer_size_hint * channels as usize * RING_BUFFERS;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        *self.producer.lock() = Some(producer);
        self.channels.store(channels, Ordering::Release);

        let settings = StreamSettings {
            sample_rate,
            channels,
            buffer_size_hint,
        };
        self.request(|reply| OutputCommand::Configure {
            settings,
            consumer,
            reply,
        })?
    }

    fn start(&self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }
        self.request(|reply| OutputCommand::Start { reply })??;
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        if self.commands.send(OutputCommand::Stop).is_err() {
            log::warn!("Failed to stop output stream: worker is not running");
        }
    }

    fn deliver(&self, buffer: &[f32], frame_count: usize) -> Result<usize> {
        let channels = self.channels.load(Ordering::Acquire) as usize;
        if channels == 0 {
            return Err(CoreError::InvalidState("Output is not configured".into()));
        }

        let samples = frame_count * channels;
        if buffer.len() < samples {
            return Err(CoreError::InvalidArgument(format!(
                "Buffer holds {} samples, {} frames need {}",
                buffer.len(),
                frame_count,
                samples
            )));
        }

        // Only `configure` contends for the producer; report no progress
        // instead of waiting on it.
        let Some(mut producer) = self.producer.try_lock() else {
            return Ok(0);
        };
        let Some(producer) = producer.as_mut() else {
            return Err(CoreError::InvalidState("Output is not configured".into()));
        };

        // Whole frames only so channels never shift
        let room = producer.vacant_len() / channels * channels;
        let pushed = producer.push_slice(&buffer[..samples.min(room)]);
        Ok(pushed / channels)
    }

    fn flush(&self) {
        self.clear_flag.store(true, Ordering::Release);
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.commands.send(OutputCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Owns the device stream on the worker thread.
struct OutputWorker {
    settings: Option<StreamSettings>,
    consumer: Option<RingConsumer>,
    stream: Option<cpal::Stream>,
    clear_flag: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicUsize>,
}

impl OutputWorker {
    fn new(clear_flag: Arc<AtomicBool>, frames_rendered: Arc<AtomicUsize>) -> Self {
        Self {
            settings: None,
            consumer: None,
            stream: None,
            clear_flag,
            frames_rendered,
        }
    }

    /// Returns `false` once the worker should exit.
    fn handle(&mut self, command: OutputCommand) -> bool {
        match command {
            OutputCommand::Configure {
                settings,
                consumer,
                reply,
            } => {
                // Dropping the old stream closes it
                self.stream = None;
                self.settings = Some(settings);
                self.consumer = Some(consumer);
                log::debug!(
                    "Output configured: {} Hz, {} ch, {} frame buffer",
                    settings.sample_rate,
                    settings.channels,
                    settings.buffer_size_hint
                );
                let _ = reply.send(Ok(()));
            }
            OutputCommand::Start { reply } => {
                let _ = reply.send(self.start());
            }
            OutputCommand::Stop => {
                if let Some(stream) = &self.stream {
                    if let Err(e) = stream.pause() {
                        log::warn!("Failed to pause output stream: {}", e);
                    }
                }
            }
            OutputCommand::Shutdown => {
                self.stream = None;
                return false;
            }
        }
        true
    }

    fn start(&mut self) -> Result<()> {
        let settings = self
            .settings
            .ok_or_else(|| CoreError::InvalidState("Output is not configured".into()))?;

        if self.stream.is_none() {
            let consumer = self.consumer.take().ok_or_else(|| {
                CoreError::InvalidState("Output must be reconfigured after a failed start".into())
            })?;
            self.stream = Some(self.open_stream(settings, consumer)?);
        }

        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| CoreError::io_msg(format!("Failed to start stream: {}", e)))?;
        }
        Ok(())
    }

    fn open_stream(&self, settings: StreamSettings, consumer: RingConsumer) -> Result<cpal::Stream> {
        // Get the default audio device
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| CoreError::io_msg("No default output device available"))?;

        let config = cpal::StreamConfig {
            channels: settings.channels,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(settings.buffer_size_hint as u32),
        };

        let default_config = device
            .default_output_config()
            .map_err(|e| CoreError::io_msg(format!("Failed to get default config: {}", e)))?;

        log::info!(
            "Opening output on {} ({:?}, {} Hz, {} ch)",
            device.name().unwrap_or_else(|_| "unknown device".to_string()),
            default_config.sample_format(),
            settings.sample_rate,
            settings.channels
        );

        let clear_flag = self.clear_flag.clone();
        let frames_rendered = self.frames_rendered.clone();
        let channels = settings.channels;

        match default_config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, consumer, clear_flag, frames_rendered, channels)
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, consumer, clear_flag, frames_rendered, channels)
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &config, consumer, clear_flag, frames_rendered, channels)
            }
            other => Err(CoreError::io_msg(format!(
                "Unsupported device sample format {:?}",
                other
            ))),
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: RingConsumer,
    clear_flag: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicUsize>,
    channels: u16,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = channels as usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if clear_flag.swap(false, Ordering::AcqRel) {
                    while consumer.try_pop().is_some() {}
                }

                let mut filled = 0;
                for sample in data.iter_mut() {
                    *sample = match consumer.try_pop() {
                        Some(value) => {
                            filled += 1;
                            T::from_sample(value)
                        }
                        // underrun: silence
                        None => T::from_sample(0.0f32),
                    };
                }

                frames_rendered.fetch_add(filled / channels, Ordering::Relaxed);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| CoreError::io_msg(format!("Failed to build stream: {}", e)))?;

    // Some backends start streams on creation
    if let Err(e) = stream.pause() {
        log::debug!("Could not pause freshly built stream: {}", e);
    }

    Ok(stream)
}
