//! Connection state of a converter link
//!
//! A session tracks:
//! - Connection state (disconnected, connecting, connected)
//! - Link generation (bumped whenever a link is opened or torn down)
//! - Request ID counter for callers that do not pick their own IDs

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::debug;
use z397_types::ConnectionState;

use crate::error::{Error, Result};

/// Session state holder
///
/// Thread-safe and can be cloned cheaply (Arc internally). Every transition
/// that opens or drops a link bumps the generation, so a task holding an
/// older generation can tell that the link it serves is gone.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Current link generation
    generation: AtomicU64,

    /// Next request ID handed out by `next_request_id`
    request_counter: AtomicU8,

    /// Current connection state
    state: parking_lot::RwLock<ConnectionState>,
}

impl Session {
    /// Create a new disconnected session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                generation: AtomicU64::new(0),
                request_counter: AtomicU8::new(0),
                state: parking_lot::RwLock::new(ConnectionState::Disconnected),
            }),
        }
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Get current link generation
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Disconnected → Connecting
    ///
    /// Returns the generation of the link being opened.
    pub fn begin_connect(&self) -> Result<u64> {
        let mut state = self.inner.state.write();

        if *state != ConnectionState::Disconnected {
            return Err(Error::InvalidSessionState(format!(
                "Cannot connect from state: {}",
                *state
            )));
        }

        *state = ConnectionState::Connecting;
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(generation, "Session connecting");

        Ok(generation)
    }

    /// Connecting → Connected, for the link opened as `generation`
    pub fn connected(&self, generation: u64) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != ConnectionState::Connecting || self.generation() != generation {
            return Err(Error::InvalidSessionState(format!(
                "Link {} cannot become connected from state: {}",
                generation, *state
            )));
        }

        *state = ConnectionState::Connected;
        debug!(generation, "Session connected");

        Ok(())
    }

    /// Connected → Disconnected, on request of the caller
    ///
    /// Returns the generation of the link being retired.
    pub fn begin_disconnect(&self) -> Result<u64> {
        let mut state = self.inner.state.write();

        if *state != ConnectionState::Connected {
            return Err(Error::InvalidSessionState(format!(
                "Cannot disconnect from state: {}",
                *state
            )));
        }

        *state = ConnectionState::Disconnected;
        let retired = self.inner.generation.fetch_add(1, Ordering::AcqRel);
        debug!(generation = retired, "Session disconnecting");

        Ok(retired)
    }

    /// Drop the link opened as `generation`
    ///
    /// Returns `false` if that link is already gone, in which case nothing
    /// changes.
    pub fn close(&self, generation: u64) -> bool {
        let mut state = self.inner.state.write();

        if *state == ConnectionState::Disconnected || self.generation() != generation {
            return false;
        }

        *state = ConnectionState::Disconnected;
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        debug!(generation, "Session closed");

        true
    }

    /// Drop whatever link exists, from any state
    ///
    /// Returns the generation of the retired link, or `None` if the session
    /// was already disconnected.
    pub fn force_close(&self) -> Option<u64> {
        let mut state = self.inner.state.write();

        if *state == ConnectionState::Disconnected {
            return None;
        }

        *state = ConnectionState::Disconnected;
        let retired = self.inner.generation.fetch_add(1, Ordering::AcqRel);
        debug!(generation = retired, "Session force-closed");

        Some(retired)
    }

    /// Get next request ID
    ///
    /// Starts at 0 and wraps after 255.
    pub fn next_request_id(&self) -> u8 {
        self.inner.request_counter.fetch_add(1, Ordering::AcqRel)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
