use crate::audio_data::{AudioDecoder, DecodeHandle, StreamInfo};
use crate::clock::elapsed_secs;
use crate::error::{CoreError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// The loaded source as seen by the player.
pub(crate) struct Session {
    /// Unique per successful load; lets the pump and slow callers detect that
    /// the session they started with has been replaced.
    pub id: u64,
    pub info: StreamInfo,
    /// Last known position in seconds
    pub position: f64,
    /// Clock reading at the latest transition into Playing
    pub epoch: u64,
    pub io: Arc<SessionIo>,
}

impl Session {
    pub fn new(id: u64, handle: DecodeHandle, info: StreamInfo) -> Self {
        Self {
            id,
            info,
            position: 0.0,
            epoch: 0,
            io: Arc::new(SessionIo::new(handle)),
        }
    }

    /// Position while playing, `now` being a fresh clock reading.
    pub fn position_at(&self, now: u64) -> f64 {
        let position = self.position + elapsed_secs(self.epoch, now);
        if self.info.has_finite_duration() {
            position.min(self.info.duration)
        } else {
            position
        }
    }
}

/// Serializes decoder calls for one handle and closes it exactly once.
///
/// Also owns the seek revision: it changes inside the same critical section
/// as the decoder seek, so every block read through [`with_open`] is tagged
/// with the position it was actually decoded from.
///
/// Held across `read`/`seek`/`close` and the pump's `deliver`, never while
/// the player's state lock is held.
///
/// [`with_open`]: SessionIo::with_open
pub(crate) struct SessionIo {
    handle: DecodeHandle,
    state: Mutex<IoState>,
}

struct IoState {
    closed: bool,
    revision: u64,
}

impl SessionIo {
    fn new(handle: DecodeHandle) -> Self {
        Self {
            handle,
            state: Mutex::new(IoState {
                closed: false,
                revision: 0,
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Runs `op` with the handle and the current seek revision unless the
    /// session was closed.
    pub fn with_open<R>(&self, op: impl FnOnce(DecodeHandle, u64) -> Result<R>) -> Result<R> {
        let state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        op(self.handle, state.revision)
    }

    /// Runs a seek and moves to a new revision if it succeeds.
    pub fn reposition(&self, op: impl FnOnce(DecodeHandle) -> Result<()>) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        op(self.handle)?;
        state.revision += 1;
        Ok(())
    }

    /// Closes the handle, waiting for an in-flight decoder call to finish.
    pub fn close(&self, decoder: &dyn AudioDecoder) {
        let mut state = self.state.lock();
        if !state.closed {
            decoder.close(self.handle);
            state.closed = true;
        }
    }

    fn closed_error(&self) -> CoreError {
        CoreError::InvalidState(format!("{} was already closed", self.handle))
    }
}
