//! Outstanding requests keyed by wire ID
//!
//! Replies carry the ID of the request they answer and may arrive in any
//! order. Each entry owns a timer task that rejects the request if no reply
//! comes in time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use z397_core::Reply;
use z397_types::{CommandKind, Response};

use crate::error::{Error, Result};

struct Pending {
    command: CommandKind,
    tx: oneshot::Sender<Result<Response>>,
    timer: JoinHandle<()>,
    seq: u64,
}

/// Shared table of pending requests
///
/// Can be cloned cheaply (Arc internally). The lock is never held across an
/// await point.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    pending: Mutex<HashMap<u8, Pending>>,
    seq: AtomicU64,
}

/// Caller side of a pending request
#[derive(Debug)]
pub struct PendingHandle {
    id: u8,
    command: CommandKind,
    rx: oneshot::Receiver<Result<Response>>,
}

impl PendingHandle {
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Wait for the reply, timeout or cancellation
    pub async fn wait(self) -> Result<Response> {
        self.rx.await.unwrap_or_else(|_| {
            Err(Error::ConnectionLost(format!(
                "request {} ({}) was dropped",
                self.id, self.command
            )))
        })
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and start its timer
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `IdOutOfRange` if `id` does not fit the wire
    /// - `IdCollision` if a request with the same ID is pending
    pub fn submit(&self, id: u32, command: CommandKind, deadline: Duration) -> Result<PendingHandle> {
        let id = u8::try_from(id).map_err(|_| Error::IdOutOfRange(id))?;

        let mut pending = self.inner.pending.lock();
        if pending.contains_key(&id) {
            return Err(Error::IdCollision(id));
        }

        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let registry = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            registry.expire(id, seq);
        });

        pending.insert(
            id,
            Pending {
                command,
                tx,
                timer,
                seq,
            },
        );

        trace!(id, command = command.name(), "Request registered");

        Ok(PendingHandle { id, command, rx })
    }

    fn take(&self, id: u8) -> Option<Pending> {
        let entry = self.inner.pending.lock().remove(&id)?;
        entry.timer.abort();
        Some(entry)
    }

    /// Resolve the request with a parsed reply
    ///
    /// A reply of another kind than the request rejects it with
    /// `UnexpectedResponse`. Returns `false` if nothing with that ID is
    /// pending; the reply is dropped.
    pub fn complete(&self, id: u8, reply: Reply) -> bool {
        let Some(entry) = self.take(id) else {
            debug!(id, command = reply.command.name(), "Dropping reply with no pending request");
            return false;
        };

        let result = if reply.command == entry.command {
            Ok(Response {
                id: u32::from(id),
                addr: reply.addr,
                command: entry.command,
                data: reply.data,
            })
        } else {
            warn!(
                id,
                expected = entry.command.name(),
                actual = reply.command.name(),
                "Reply does not match request"
            );
            Err(Error::UnexpectedResponse {
                id,
                expected: entry.command,
                actual: reply.command,
            })
        };

        // Receiver may be gone if the caller stopped waiting
        let _ = entry.tx.send(result);
        true
    }

    /// Reject the request
    ///
    /// Returns `false` if nothing with that ID is pending.
    pub fn fail(&self, id: u8, error: Error) -> bool {
        match self.take(id) {
            Some(entry) => {
                debug!(id, command = entry.command.name(), error = %error, "Request failed");
                let _ = entry.tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Forget the request without resolving it
    pub fn discard(&self, id: u8) {
        self.take(id);
    }

    /// Reject every pending request
    ///
    /// Returns the number of requests rejected.
    pub fn cancel_all(&self, error: impl Fn() -> Error) -> usize {
        let drained: Vec<(u8, Pending)> = self.inner.pending.lock().drain().collect();

        for (id, entry) in &drained {
            trace!(id, command = entry.command.name(), "Cancelling request");
            entry.timer.abort();
        }

        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.tx.send(Err(error()));
        }

        if count > 0 {
            debug!(count, "Cancelled pending requests");
        }
        count
    }

    fn expire(&self, id: u8, seq: u64) {
        let entry = {
            let mut pending = self.inner.pending.lock();
            // The ID may have been completed and reused since this timer started
            if pending.get(&id).map(|entry| entry.seq) == Some(seq) {
                pending.remove(&id)
            } else {
                None
            }
        };

        if let Some(entry) = entry {
            warn!(id, command = entry.command.name(), "Request timed out");
            let _ = entry.tx.send(Err(Error::RequestTimeout {
                id,
                command: entry.command,
            }));
        }
    }

    pub fn is_pending(&self, id: u8) -> bool {
        self.inner.pending.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("pending", &self.len()).finish()
    }
}
