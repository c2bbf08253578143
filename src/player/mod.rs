//! Playback orchestration
//!
//! [`Player`] composes the four capabilities into a playback service. All
//! mutable state lives behind one mutex that is only ever held to read or
//! update that state: decoder `open`/`read`/`seek`/`close` and output
//! `configure`/`start` always run with it released, so queries stay
//! responsive while a backend blocks.
//!
//! Two narrower locks complement it. Each session's [`SessionIo`] serializes
//! decoder calls on its handle and the pump's deliveries (a caller's `seek`
//! never overlaps the pump's `read`, and no block decoded before a seek or
//! close reaches the output after it). The output gate orders `configure`
//! and `start` so the output is never reconfigured while started.

mod pump;
mod session;


use crate::audio_data::{AudioDecoder, DecodeHandle, StreamInfo};
use crate::clock::Clock;
use crate::config::PlayerConfig;
use crate::error::{CoreError, ErrorKind, Result};
use crate::events::PlayerEvent;
use crate::logging::Logger;
use crate::output::AudioOutput;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use pump::PumpBuffer;
use session::{Session, SessionIo};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Lifecycle state of a [`Player`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Nothing loaded.
    #[default]
    Stopped,
    Playing,
    Paused,
    /// Reserved for streaming sources; never entered by the current player.
    Buffering,
    /// The last operation or the pump failed. Recover with `load`.
    Error(CoreError),
}

impl PlaybackState {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn error(&self) -> Option<&CoreError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

struct Shared {
    state: PlaybackState,
    session: Option<Session>,
    next_id: u64,
    /// Id of the most recent `load` or `stop`. A `load` whose id is no longer
    /// current when it finishes has been superseded.
    latest_request: u64,
    pump_running: bool,
    pump_thread: Option<JoinHandle<()>>,
}

impl Shared {
    fn next_request(&mut self) -> u64 {
        self.next_id += 1;
        self.latest_request = self.next_id;
        self.next_id
    }

    fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }
}

pub(crate) struct Inner {
    decoder: Arc<dyn AudioDecoder>,
    output: Arc<dyn AudioOutput>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    config: PlayerConfig,
    shared: Mutex<Shared>,
    output_gate: Mutex<()>,
    pump_buffer: Mutex<PumpBuffer>,
    events_tx: Sender<PlayerEvent>,
    events_rx: Receiver<PlayerEvent>,
}

/// Playback service over injected capabilities.
///
/// Every method takes `&self` and may be called from any thread; wrap the
/// player in an `Arc` to share it. Dropping the player stops playback and
/// joins the pump.
///
/// # Example
///
/// ```no_run
/// use petalplay::*;
/// use std::sync::Arc;
///
/// let player = Player::new(
///     Arc::new(SymphoniaDecoder::new()),
///     Arc::new(CpalOutput::new()?),
///     Arc::new(MonotonicClock::new()),
///     Arc::new(LogFacade::new()),
///     PlayerConfig::default(),
/// )?;
///
/// player.load("music/track.flac")?;
/// player.play()?;
/// player.seek(30.0)?;
/// println!("{:.1}s / {:.1}s", player.current_time(), player.duration());
/// player.stop();
/// # Ok::<(), CoreError>(())
/// ```
pub struct Player {
    inner: Arc<Inner>,
}

impl Player {
    pub fn new(
        decoder: Arc<dyn AudioDecoder>,
        output: Arc<dyn AudioOutput>,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
        config: PlayerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = crossbeam_channel::bounded(config.event_capacity);

        Ok(Self {
            inner: Arc::new(Inner {
                decoder,
                output,
                clock,
                logger,
                config,
                shared: Mutex::new(Shared {
                    state: PlaybackState::Stopped,
                    session: None,
                    next_id: 0,
                    latest_request: 0,
                    pump_running: false,
                    pump_thread: None,
                }),
                output_gate: Mutex::new(()),
                pump_buffer: Mutex::new(PumpBuffer::default()),
                events_tx,
                events_rx,
            }),
        })
    }

    /// Replaces whatever is loaded with `source` and leaves it paused at 0.
    ///
    /// # Errors
    ///
    /// Decoder and output failures (`NotFound`, `Unsupported`, `Decode`,
    /// `Io`, ...) are returned and also recorded as the `Error` state.
    /// `InvalidState` when a concurrent `load` or `stop` overtook this one.
    pub fn load(&self, source: &str) -> Result<StreamInfo> {
        let inner = &self.inner;

        let (request, previous) = {
            let mut shared = inner.shared.lock();
            let request = shared.next_request();
            let previous = inner.take_session(&mut shared);
            inner.set_state(&mut shared, PlaybackState::Stopped);
            (request, previous)
        };
        if let Some(io) = previous {
            io.close(inner.decoder.as_ref());
        }

        let opened = inner.open_source(source);

        let mut shared = inner.shared.lock();
        let superseded = shared.latest_request != request;

        let (handle, info) = match opened {
            Ok(opened) if !superseded => opened,
            Ok((handle, _)) => {
                drop(shared);
                inner.decoder.close(handle);
                return Err(CoreError::InvalidState(format!(
                    "Loading {} was superseded",
                    source
                )));
            }
            Err(err) => {
                if !superseded {
                    inner.set_state(&mut shared, PlaybackState::Error(err.clone()));
                }
                drop(shared);
                inner
                    .logger
                    .error(&|| format!("Failed to load {}: {}", source, err));
                return Err(err);
            }
        };

        shared.session = Some(Session::new(request, handle, info));
        inner.emit(PlayerEvent::Loaded(info));
        inner.set_state(&mut shared, PlaybackState::Paused);
        drop(shared);

        inner.logger.info(&|| {
            format!(
                "Loaded {}: {:.3}s, {} Hz, {} ch",
                source, info.duration, info.sample_rate, info.channels
            )
        });
        Ok(info)
    }

    /// Starts or resumes playback. A no-op while already playing.
    ///
    /// # Errors
    ///
    /// `InvalidState` without a loaded source. Output start failures are
    /// returned and recorded as the `Error` state.
    pub fn play(&self) -> Result<()> {
        let inner = &self.inner;
        let _gate = inner.output_gate.lock();

        let session_id = {
            let shared = inner.shared.lock();
            match (&shared.state, &shared.session) {
                (PlaybackState::Playing, _) => return Ok(()),
                (_, Some(session)) => session.id,
                (_, None) => {
                    return Err(CoreError::InvalidState("No source loaded".into()));
                }
            }
        };

        let started = inner.output.start();

        let mut shared = inner.shared.lock();
        if shared.session_id() != Some(session_id) {
            // stopped or replaced while the device was starting
            drop(shared);
            if started.is_ok() {
                inner.output.stop();
            }
            return Err(CoreError::InvalidState(
                "Source was unloaded while starting playback".into(),
            ));
        }

        if let Err(err) = started {
            let io = inner.fail(&mut shared, err.clone());
            drop(shared);
            if let Some(io) = io {
                io.close(inner.decoder.as_ref());
            }
            inner
                .logger
                .error(&|| format!("Failed to start output: {}", err));
            return Err(err);
        }

        let now = inner.clock.now();
        if let Some(session) = shared.session.as_mut() {
            session.epoch = now;
        }
        inner.set_state(&mut shared, PlaybackState::Playing);

        let finished_pump = match inner.ensure_pump(&mut shared) {
            Ok(finished) => finished,
            Err(err) => {
                let io = inner.fail(&mut shared, err.clone());
                drop(shared);
                if let Some(io) = io {
                    io.close(inner.decoder.as_ref());
                }
                return Err(err);
            }
        };
        drop(shared);

        if let Some(pump) = finished_pump {
            let _ = pump.join();
        }
        Ok(())
    }

    /// Pauses playback, keeping the position. A no-op unless playing.
    pub fn pause(&self) {
        let inner = &self.inner;
        let mut shared = inner.shared.lock();
        if shared.state != PlaybackState::Playing {
            return;
        }

        let now = inner.clock.now();
        if let Some(session) = shared.session.as_mut() {
            session.position = session.position_at(now);
        }
        inner.output.stop();
        inner.set_state(&mut shared, PlaybackState::Paused);
    }

    /// Stops playback and unloads the source. Idempotent, and cancels a `load`
    /// that is still opening its source.
    ///
    /// When this returns the decoder handle has been closed. The pump may
    /// still be finishing a delivery but will not read again.
    pub fn stop(&self) {
        let inner = &self.inner;
        let io = {
            let mut shared = inner.shared.lock();
            // also cancels a `load` still opening its source
            shared.next_request();
            if shared.state == PlaybackState::Stopped {
                return;
            }
            let io = inner.take_session(&mut shared);
            inner.set_state(&mut shared, PlaybackState::Stopped);
            io
        };

        if let Some(io) = io {
            io.close(inner.decoder.as_ref());
        }
    }

    /// Moves to `seconds` from the start. Never changes a healthy state.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a non-finite or out of range target,
    /// `InvalidState` without a loaded source, `Unsupported` when the source
    /// cannot seek. `Decode`/`Io` failures from the decoder are also recorded
    /// as the `Error` state.
    pub fn seek(&self, seconds: f64) -> Result<()> {
        let inner = &self.inner;
        if !seconds.is_finite() {
            return Err(CoreError::InvalidArgument(format!(
                "Seek target {} is not finite",
                seconds
            )));
        }

        let (session_id, io) = {
            let shared = inner.shared.lock();
            let session = shared
                .session
                .as_ref()
                .ok_or_else(|| CoreError::InvalidState("No source loaded".into()))?;
            if seconds < 0.0 || seconds > session.info.duration {
                return Err(CoreError::InvalidArgument(format!(
                    "Seek target {:.3}s outside 0..={:.3}s",
                    seconds, session.info.duration
                )));
            }
            (session.id, session.io.clone())
        };

        let result = io.reposition(|handle| {
            inner.decoder.seek(handle, seconds)?;
            // Queued audio predates the new position. Flushed before the
            // session lock is released so no post-seek block is cleared.
            inner.output.flush();
            Ok(())
        });

        let mut shared = inner.shared.lock();
        let current = shared.session_id() == Some(session_id);

        match result {
            Ok(()) if current => {
                let playing = shared.state == PlaybackState::Playing;
                let now = inner.clock.now();
                if let Some(session) = shared.session.as_mut() {
                    session.position = seconds;
                    if playing {
                        session.epoch = now;
                    }
                }
                drop(shared);
                inner.logger.debug(&|| format!("Seeked to {:.3}s", seconds));
                Ok(())
            }
            Ok(()) => Err(CoreError::InvalidState(
                "Source was unloaded during seek".into(),
            )),
            Err(err) => {
                let fatal = current
                    && !matches!(
                        err.kind(),
                        ErrorKind::InvalidArgument | ErrorKind::Unsupported
                    );
                if fatal {
                    let io = inner.fail(&mut shared, err.clone());
                    drop(shared);
                    if let Some(io) = io {
                        io.close(inner.decoder.as_ref());
                    }
                    inner.logger.error(&|| format!("Seek failed: {}", err));
                } else {
                    drop(shared);
                    inner
                        .logger
                        .warn(&|| format!("Seek to {:.3}s rejected: {}", seconds, err));
                }
                Err(err)
            }
        }
    }

    /// Playback position in seconds. 0 when stopped or failed.
    pub fn current_time(&self) -> f64 {
        let inner = &self.inner;
        let shared = inner.shared.lock();
        match (&shared.state, &shared.session) {
            (PlaybackState::Playing, Some(session)) => session.position_at(inner.clock.now()),
            (PlaybackState::Paused | PlaybackState::Buffering, Some(session)) => session.position,
            _ => 0.0,
        }
    }

    /// Length of the loaded source in seconds, 0 when nothing is loaded.
    pub fn duration(&self) -> f64 {
        self.inner
            .shared
            .lock()
            .session
            .as_ref()
            .map_or(0.0, |s| s.info.duration)
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.shared.lock().state.clone()
    }

    /// Format of the loaded source.
    pub fn info(&self) -> Option<StreamInfo> {
        self.inner.shared.lock().session.as_ref().map(|s| s.info)
    }

    /// Drains queued events, oldest first.
    pub fn poll_events(&self) -> Vec<PlayerEvent> {
        self.inner.events_rx.try_iter().collect()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
        let pump = self.inner.shared.lock().pump_thread.take();
        if let Some(pump) = pump {
            let _ = pump.join();
        }
    }
}

impl Inner {
    /// Opens `source` and configures the output for it. Runs without the
    /// state lock; closes the handle again if configuration fails.
    fn open_source(&self, source: &str) -> Result<(DecodeHandle, StreamInfo)> {
        let handle = self.decoder.open(source)?;

        let prepared = self.decoder.info(handle).and_then(|info| {
            let _gate = self.output_gate.lock();
            self.output
                .configure(info.sample_rate, info.channels, self.config.buffer_size_hint)
                .map(|()| info)
        });

        match prepared {
            Ok(info) => Ok((handle, info)),
            Err(err) => {
                self.decoder.close(handle);
                Err(err)
            }
        }
    }

    /// Detaches the session, silencing the output if it was playing. The
    /// returned session must be closed once the state lock is released.
    fn take_session(&self, shared: &mut Shared) -> Option<Arc<SessionIo>> {
        if shared.state == PlaybackState::Playing {
            self.output.stop();
        }
        shared.session.take().map(|session| session.io)
    }

    /// Records an unrecoverable failure.
    fn fail(&self, shared: &mut Shared, err: CoreError) -> Option<Arc<SessionIo>> {
        let io = self.take_session(shared);
        self.set_state(shared, PlaybackState::Error(err));
        io
    }

    fn set_state(&self, shared: &mut Shared, new: PlaybackState) {
        if shared.state == new {
            // same category; keep the newest error cause
            shared.state = new;
            return;
        }
        let old = std::mem::replace(&mut shared.state, new.clone());
        self.logger
            .debug(&|| format!("State {:?} -> {:?}", old, new));
        self.emit(PlayerEvent::StateChanged { old, new });
    }

    fn emit(&self, event: PlayerEvent) {
        if let Err(TrySendError::Full(event)) = self.events_tx.try_send(event) {
            self.logger
                .debug(&|| format!("Event queue full, dropping {:?}", event));
        }
    }

    /// Starts the pump unless one is running. Returns the handle of a
    /// previous, already exited pump to be joined outside the lock.
    fn ensure_pump(self: &Arc<Self>, shared: &mut Shared) -> Result<Option<JoinHandle<()>>> {
        if shared.pump_running {
            return Ok(None);
        }

        let inner = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("petalplay-pump".to_string())
            .spawn(move || pump::run(inner))
            .map_err(CoreError::io)?;

        shared.pump_running = true;
        Ok(shared.pump_thread.replace(handle))
    }
}
