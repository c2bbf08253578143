//! Background decode-and-deliver loop

use super::session::SessionIo;
use super::{Inner, PlaybackState};
use crate::error::{CoreError, ErrorKind};
use crate::events::PlayerEvent;
use std::sync::Arc;
use std::thread;

/// Scratch space reused across pumps so a block decoded before a pause is
/// still delivered after the matching resume.
#[derive(Default)]
pub(crate) struct PumpBuffer {
    block: Vec<f32>,
    pending: Option<Pending>,
}

/// Decoded frames in `block` not yet accepted by the output.
struct Pending {
    session_id: u64,
    /// Seek revision the block was decoded at
    revision: u64,
    channels: usize,
    delivered: usize,
    frames: usize,
}

/// Consistent view of the session taken under the state lock.
struct Snapshot {
    session_id: u64,
    channels: usize,
    io: Arc<SessionIo>,
}

enum Step {
    Continue,
    /// Output is full, back off before offering the block again
    Idle,
    EndOfStream,
    Failed(CoreError),
}

pub(crate) fn run(inner: Arc<Inner>) {
    // Held for the whole run: a pump started right after this one exits
    // waits here instead of racing for the pending block.
    let mut buffer = inner.pump_buffer.lock();
    let buffer = &mut *buffer;
    inner.logger.debug(&|| "Pump started".to_string());

    while let Some(snapshot) = inner.pump_snapshot() {
        let step = if buffer.pending_matches(&snapshot) {
            deliver_pending(&inner, buffer, &snapshot)
        } else {
            decode_block(&inner, buffer, &snapshot)
        };

        match step {
            Step::Continue => {}
            Step::Idle => thread::sleep(inner.config.retry_interval),
            Step::EndOfStream => inner.finish_stream(snapshot.session_id),
            Step::Failed(err) => {
                inner
                    .logger
                    .warn(&|| format!("Pump failure, backing off: {}", err));
                thread::sleep(inner.config.error_backoff);
                inner.fail_pump(snapshot.session_id, err);
            }
        }
    }

    inner.logger.debug(&|| "Pump stopped".to_string());
}

impl PumpBuffer {
    fn pending_matches(&self, snapshot: &Snapshot) -> bool {
        self.pending.as_ref().is_some_and(|p| {
            p.session_id == snapshot.session_id && p.channels == snapshot.channels
        })
    }
}

fn decode_block(inner: &Inner, buffer: &mut PumpBuffer, snapshot: &Snapshot) -> Step {
    // Whatever was pending belongs to an older session
    buffer.pending = None;

    let max_frames = inner.config.frames_per_block;
    let samples = max_frames * snapshot.channels;
    if buffer.block.len() < samples {
        buffer.block.resize(samples, 0.0);
    }

    let block = &mut buffer.block[..samples];
    let read = snapshot.io.with_open(|handle, revision| {
        inner
            .decoder
            .read(handle, block, max_frames)
            .map(|frames| (frames, revision))
    });

    match read {
        Ok((0, _)) => Step::EndOfStream,
        Ok((frames, revision)) => {
            // Not delivered yet: the next snapshot checks that no reload
            // happened while the decoder was busy.
            buffer.pending = Some(Pending {
                session_id: snapshot.session_id,
                revision,
                channels: snapshot.channels,
                delivered: 0,
                frames: frames.min(max_frames),
            });
            Step::Continue
        }
        // Closed under us by stop/load; the next snapshot sees it
        Err(err) if err.kind() == ErrorKind::InvalidState && snapshot.io.is_closed() => {
            Step::Continue
        }
        Err(err) => Step::Failed(err),
    }
}

fn deliver_pending(inner: &Inner, buffer: &mut PumpBuffer, snapshot: &Snapshot) -> Step {
    let Some(pending) = buffer.pending.as_mut() else {
        return Step::Continue;
    };

    let remaining = pending.frames - pending.delivered;
    let start = pending.delivered * pending.channels;
    let end = pending.frames * pending.channels;
    let samples = &buffer.block[start..end];
    let decoded_at = pending.revision;

    // Under the session lock so a seek or close cannot slip in between the
    // revision check and the output taking the frames.
    let delivered = snapshot.io.with_open(|_, revision| {
        if revision != decoded_at {
            return Ok(None);
        }
        inner.output.deliver(samples, remaining).map(Some)
    });

    match delivered {
        // Decoded before a seek
        Ok(None) => {
            buffer.pending = None;
            Step::Continue
        }
        Ok(Some(0)) => Step::Idle,
        Ok(Some(accepted)) => {
            pending.delivered += accepted.min(remaining);
            if pending.delivered == pending.frames {
                buffer.pending = None;
            }
            Step::Continue
        }
        Err(err) if err.kind() == ErrorKind::InvalidState && snapshot.io.is_closed() => {
            buffer.pending = None;
            Step::Continue
        }
        Err(err) => Step::Failed(err),
    }
}

impl Inner {
    /// Returns what the next iteration works on, or marks the pump as gone
    /// when playback is no longer active.
    fn pump_snapshot(&self) -> Option<Snapshot> {
        let mut shared = self.shared.lock();
        let snapshot = match (&shared.state, &shared.session) {
            (PlaybackState::Playing, Some(session)) => Some(Snapshot {
                session_id: session.id,
                channels: session.info.channels as usize,
                io: Arc::clone(&session.io),
            }),
            _ => None,
        };
        if snapshot.is_none() {
            shared.pump_running = false;
        }
        snapshot
    }

    fn finish_stream(&self, session_id: u64) {
        let io = {
            let mut shared = self.shared.lock();
            if shared.state != PlaybackState::Playing || shared.session_id() != Some(session_id) {
                return;
            }
            let io = self.take_session(&mut shared);
            self.emit(PlayerEvent::EndOfStream);
            self.set_state(&mut shared, PlaybackState::Stopped);
            io
        };

        if let Some(io) = io {
            io.close(self.decoder.as_ref());
        }
        self.logger.info(&|| "Reached end of stream".to_string());
    }

    fn fail_pump(&self, session_id: u64, err: CoreError) {
        let io = {
            let mut shared = self.shared.lock();
            if shared.state != PlaybackState::Playing || shared.session_id() != Some(session_id) {
                // paused, stopped or reloaded during the back-off
                return;
            }
            self.emit(PlayerEvent::PumpFailed(err.clone()));
            self.fail(&mut shared, err.clone())
        };

        if let Some(io) = io {
            io.close(self.decoder.as_ref());
        }
        self.logger.error(&|| format!("Playback failed: {}", err));
    }
}
