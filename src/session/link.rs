//! Connection state shared by the session, its tasks and handler outboxes.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use crate::codec;
use crate::error::{Result, SessionError};
use crate::protocol::MessageFamily;

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Work for the I/O task of the live connection.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// One encoded message.
    Text(String),
    /// Perform the close handshake, then acknowledge.
    Close(oneshot::Sender<()>),
}

/// Flags and the outbound queue of the current connection.
pub(crate) struct Link {
    pub(crate) session_id: Uuid,
    connected: AtomicBool,
    shutting_down: AtomicBool,
    reconnect_attempts: AtomicU32,
    /// Serial of the live connection, 0 when none.
    current: AtomicU64,
    next_serial: AtomicU64,
    /// Bumped by every `disconnect()`; retry chains started under an older
    /// epoch stop.
    epoch: AtomicU64,
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
}

impl Link {
    pub(crate) fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            connected: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            current: AtomicU64::new(0),
            next_serial: AtomicU64::new(1),
            epoch: AtomicU64::new(0),
            outbound: Mutex::new(None),
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Returns `true` if shutdown had already begun.
    pub(crate) fn begin_shutdown(&self) -> bool {
        self.shutting_down.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Acquire)
    }

    /// Count one more reconnect attempt and return the new total.
    pub(crate) fn next_attempt(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Make `tx` the outbound queue of a fresh connection and return its
    /// serial. Resets the reconnect counter.
    ///
    /// Returns `None` if the session is shutting down or `epoch` was
    /// superseded by a disconnect. Checked under the same lock as
    /// [`detach`](Self::detach).
    pub(crate) fn install(&self, tx: mpsc::UnboundedSender<Outbound>, epoch: u64) -> Option<u64> {
        let mut outbound = lock(&self.outbound);
        if self.is_shutting_down() || self.epoch() != epoch {
            return None;
        }
        let serial = self.next_serial.fetch_add(1, Ordering::AcqRel);
        *outbound = Some(tx);
        self.current.store(serial, Ordering::Release);
        self.reconnect_attempts.store(0, Ordering::Release);
        self.connected.store(true, Ordering::Release);
        Some(serial)
    }

    /// Mark connection `serial` as lost. Returns `false` if it was already
    /// replaced or intentionally disconnected.
    pub(crate) fn release(&self, serial: u64) -> bool {
        if self
            .current
            .compare_exchange(serial, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.connected.store(false, Ordering::Release);
        lock(&self.outbound).take();
        true
    }

    /// Detach the live connection for an intentional disconnect.
    ///
    /// Returns whether a connection was live and its outbound queue.
    pub(crate) fn detach(&self) -> (bool, Option<mpsc::UnboundedSender<Outbound>>) {
        let mut outbound = lock(&self.outbound);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.current.store(0, Ordering::Release);
        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        (was_connected, outbound.take())
    }

    /// Queue an encoded message on the live connection.
    pub(crate) fn push(&self, text: String) -> Result<()> {
        if self.is_shutting_down() {
            return Err(SessionError::ShuttingDown);
        }
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        match lock(&self.outbound).as_ref() {
            Some(tx) => tx
                .send(Outbound::Text(text))
                .map_err(|_| SessionError::NotConnected),
            None => Err(SessionError::NotConnected),
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("session_id", &self.session_id)
            .field("connected", &self.is_connected())
            .field("shutting_down", &self.is_shutting_down())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

// ── Outbox ──────────────────────────────────────────────────────────

/// Typed send handle for one message family.
///
/// Sends succeed only while the session is connected; they queue the encoded
/// message for the I/O task and return without waiting for the socket.
pub struct Outbox<F> {
    link: Arc<Link>,
    _family: PhantomData<fn(F)>,
}

impl<F: MessageFamily> Outbox<F> {
    pub(crate) fn new(link: Arc<Link>) -> Self {
        Self {
            link,
            _family: PhantomData,
        }
    }

    /// Encode and queue a message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] while disconnected,
    /// [`SessionError::ShuttingDown`] after `close()` began, or
    /// [`SessionError::Serialization`] if encoding fails.
    pub fn send(&self, message: &F::Outgoing) -> Result<()> {
        if !self.link.is_connected() && !self.link.is_shutting_down() {
            debug!(?message, "not connected, message not sent");
            return Err(SessionError::NotConnected);
        }
        let text = codec::encode::<F>(message)?;
        debug!(?message, "queueing message");
        self.link.push(text)
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }
}

impl<F> Clone for Outbox<F> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
            _family: PhantomData,
        }
    }
}

impl<F> fmt::Debug for Outbox<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox").field("link", &self.link).finish()
    }
}
