//! Connection manager shared by the game-room and matchmaking clients.
//!
//! A [`Session`] owns one connection lineage to a server: it builds fresh
//! transports through a [`Connector`], retries failed connects and abnormal
//! closes with a fixed delay under a bounded attempt budget, and runs a
//! [`SessionHandler`] on a serial dispatcher task.
//!
//! Three kinds of task run per session:
//!
//! - the **I/O task** of the live connection, which owns the [`Transport`],
//!   writes queued messages and feeds received frames through the codec;
//! - the **dispatcher**, which runs every handler callback in order;
//! - at most one **reconnect timer**, which sleeps out the reconnect delay.
//!
//! Handlers never run on the I/O task.

mod dispatcher;
mod link;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use url::Url;
use uuid::Uuid;

use crate::codec::{self, FrameAssembler};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::event::SessionEvent;
use crate::protocol::MessageFamily;
use crate::transport::{Connector, Transport, TransportFrame, NORMAL_CLOSURE};

pub use dispatcher::{HandlerContext, HandlerEvent, SessionHandler};
pub use link::Outbox;

use dispatcher::{dispatch_loop, DispatchHandle};
use link::{lock, Link, Outbound};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Close reason recorded for intentional disconnects.
const CLIENT_DISCONNECT: &str = "client disconnect";

// ── Reconnect timer ─────────────────────────────────────────────────

/// Sleeps out reconnect delays on a spawned task, one pending at a time.
#[derive(Debug, Default)]
struct ReconnectTimer {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectTimer {
    /// Wait `delay`. Returns `false` if the timer was cancelled or replaced.
    async fn wait(&self, delay: Duration) -> bool {
        let (fired_tx, fired_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = fired_tx.send(());
        });
        let previous = lock(&self.pending).replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        fired_rx.await.is_ok()
    }

    /// Cancel the pending wait. Returns `true` if one was still sleeping.
    fn cancel(&self) -> bool {
        match lock(&self.pending).take() {
            Some(task) => {
                let sleeping = !task.is_finished();
                task.abort();
                sleeping
            }
            None => false,
        }
    }
}

// ── Shared state ────────────────────────────────────────────────────

struct Inner<F: MessageFamily, L> {
    url: Url,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    link: Arc<Link>,
    dispatch: DispatchHandle<F::Incoming, L>,
    /// Held by a whole connect/retry chain so attempts never overlap.
    connect_lock: tokio::sync::Mutex<()>,
    timer: ReconnectTimer,
    io_task: Mutex<Option<JoinHandle<()>>>,
    retry_task: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl<F, L> Inner<F, L>
where
    F: MessageFamily,
    L: Send + 'static,
{
    /// Run a connect chain: an optional delayed first attempt, then retries
    /// while the budget allows. Resolves once with the chain's outcome.
    fn establish(self: Arc<Self>, mut retry: bool, epoch: u64) -> BoxFuture<Result<()>> {
        Box::pin(async move {
            let _chain = self.connect_lock.lock().await;
            loop {
                if self.link.is_shutting_down() {
                    return Err(SessionError::ShuttingDown);
                }
                if self.link.epoch() != epoch {
                    return Err(SessionError::Cancelled);
                }
                if self.link.is_connected() {
                    return Ok(());
                }

                if retry {
                    let attempt = self.link.next_attempt();
                    info!(
                        attempt,
                        max = self.config.max_reconnect_attempts,
                        delay_ms = self.config.reconnect_delay.as_millis() as u64,
                        "scheduling reconnect"
                    );
                    if !self.timer.wait(self.config.reconnect_delay).await {
                        debug!("reconnect timer cancelled");
                        return Err(self.stop_reason());
                    }
                    if self.link.is_shutting_down() || self.link.epoch() != epoch {
                        return Err(self.stop_reason());
                    }
                }

                let err = match self.attempt(epoch).await {
                    Ok(()) => return Ok(()),
                    Err(err @ (SessionError::Cancelled | SessionError::ShuttingDown)) => {
                        return Err(err)
                    }
                    Err(err) => err,
                };

                warn!(url = %self.url, error = %err, "connect attempt failed");
                let retryable = err.is_transport();
                let reason = err.to_string();
                self.dispatch.dispatch(SessionEvent::Error(Arc::new(err)));

                let attempts = self.link.reconnect_attempts();
                if retryable && self.may_retry(attempts) {
                    retry = true;
                    continue;
                }
                return Err(SessionError::ConnectFailed { attempts, reason });
            }
        })
    }

    /// One connect attempt bounded by the connect timeout.
    async fn attempt(self: &Arc<Self>, epoch: u64) -> Result<()> {
        debug!(url = %self.url, "connecting");
        let connect = self.connector.connect(self.url.as_str());
        let mut transport = match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(SessionError::Timeout),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let Some(serial) = self.link.install(tx, epoch) else {
            debug!("connect superseded, dropping fresh transport");
            let _ = tokio::time::timeout(self.config.disconnect_timeout, transport.close()).await;
            return Err(self.stop_reason());
        };
        info!(url = %self.url, "connected");
        // Connected is queued before the I/O task can queue any message.
        self.dispatch.dispatch(SessionEvent::Connected);

        let task = tokio::spawn(
            Arc::clone(self)
                .io_loop(transport, rx, serial)
                .instrument(self.span.clone()),
        );
        let previous = lock(&self.io_task).replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    /// Multiplex outbound messages and inbound frames for one connection.
    async fn io_loop(
        self: Arc<Self>,
        mut transport: Box<dyn Transport>,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        serial: u64,
    ) {
        debug!(serial, "io task started");
        let mut assembler = FrameAssembler::new();

        let lost = loop {
            tokio::select! {
                cmd = outbound.recv() => match cmd {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = transport.send(text).await {
                            error!(error = %e, "transport send failed");
                            let reason = e.to_string();
                            self.dispatch.dispatch(SessionEvent::Error(Arc::new(e)));
                            break Some((None, reason));
                        }
                    }
                    Some(Outbound::Close(ack)) => {
                        debug!("closing transport");
                        if let Err(e) = transport.close().await {
                            debug!(error = %e, "close handshake failed");
                        }
                        let _ = ack.send(());
                        break None;
                    }
                    // Link detached without a close request.
                    None => {
                        let _ = transport.close().await;
                        break None;
                    }
                },

                incoming = transport.recv() => match incoming {
                    Some(Ok(TransportFrame::Text { data, last })) => {
                        if let Some(text) = assembler.push(&data, last) {
                            if let Some(message) = codec::decode::<F>(&text) {
                                self.dispatch.dispatch(SessionEvent::Message(message));
                            }
                        }
                    }
                    Some(Ok(TransportFrame::Close { code, reason })) => {
                        info!(code, %reason, "server closed connection");
                        break Some((Some(code), reason));
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "transport receive failed");
                        let reason = e.to_string();
                        self.dispatch.dispatch(SessionEvent::Error(Arc::new(e)));
                        break Some((None, reason));
                    }
                    None => {
                        info!("transport stream ended");
                        break Some((None, String::new()));
                    }
                },
            }
        };

        if let Some((code, reason)) = lost {
            self.connection_lost(serial, code, reason);
        }
        debug!(serial, "io task exited");
    }

    /// Handle the loss of connection `serial`: notify, then maybe start a
    /// background retry chain.
    fn connection_lost(self: &Arc<Self>, serial: u64, code: Option<u16>, reason: String) {
        if !self.link.release(serial) {
            debug!(serial, "stale connection closed");
            return;
        }

        let attempts = self.link.reconnect_attempts();
        let reconnecting = code != Some(NORMAL_CLOSURE) && self.may_retry(attempts);
        info!(?code, %reason, reconnecting, "connection lost");
        self.dispatch.dispatch(SessionEvent::Closed {
            code,
            reason,
            reconnecting,
        });
        if !reconnecting {
            return;
        }

        let inner = Arc::clone(self);
        let chain = Arc::clone(self).establish(true, self.link.epoch());
        let task = tokio::spawn(
            async move {
                match chain.await {
                    Ok(()) => info!("reconnected"),
                    Err(err @ SessionError::ConnectFailed { .. }) => {
                        error!(error = %err, "reconnect budget exhausted");
                        inner.dispatch.dispatch(SessionEvent::Error(Arc::new(err)));
                    }
                    Err(err) => debug!(error = %err, "reconnect stopped"),
                }
            }
            .instrument(self.span.clone()),
        );
        let previous = lock(&self.retry_task).replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn disconnect(&self) {
        let (was_connected, sender) = self.link.detach();
        if self.timer.cancel() {
            debug!("pending reconnect cancelled");
        }
        let retry = lock(&self.retry_task).take();
        if let Some(retry) = retry {
            retry.abort();
        }

        if let Some(sender) = sender {
            let (ack_tx, ack_rx) = oneshot::channel();
            if sender.send(Outbound::Close(ack_tx)).is_ok() {
                match tokio::time::timeout(self.config.disconnect_timeout, ack_rx).await {
                    Ok(_) => debug!("close handshake finished"),
                    Err(_) => {
                        warn!("close handshake timed out; aborting io task");
                        self.abort_io();
                    }
                }
            }
        }

        if was_connected {
            info!("disconnected");
            self.dispatch.dispatch(SessionEvent::Closed {
                code: Some(NORMAL_CLOSURE),
                reason: CLIENT_DISCONNECT.to_string(),
                reconnecting: false,
            });
        }
    }

    fn may_retry(&self, attempts: u32) -> bool {
        self.config.auto_reconnect
            && !self.link.is_shutting_down()
            && attempts < self.config.max_reconnect_attempts
    }

    fn stop_reason(&self) -> SessionError {
        if self.link.is_shutting_down() {
            SessionError::ShuttingDown
        } else {
            SessionError::Cancelled
        }
    }

    fn abort_io(&self) {
        let task = lock(&self.io_task).take();
        if let Some(task) = task {
            task.abort();
        }
    }

    fn abort_all(&self) {
        self.timer.cancel();
        let retry = lock(&self.retry_task).take();
        if let Some(retry) = retry {
            retry.abort();
        }
        self.abort_io();
    }
}

// ── Session handle ──────────────────────────────────────────────────

/// A reconnecting connection to one server, driving handler `H`.
///
/// Must be created inside a Tokio runtime: the dispatcher task is spawned
/// immediately.
pub struct Session<H: SessionHandler> {
    inner: Arc<Inner<H::Family, H::Local>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<H: SessionHandler> Session<H> {
    /// Create a disconnected session. Call [`connect`](Self::connect) to
    /// open the first transport.
    pub fn new(url: Url, config: SessionConfig, connector: Arc<dyn Connector>, handler: H) -> Self {
        let session_id = Uuid::new_v4();
        let span = info_span!(
            "session",
            %session_id,
            family = <H::Family as MessageFamily>::NAME,
        );
        let link = Arc::new(Link::new(session_id));
        let (dispatch, rx) = DispatchHandle::new(Arc::clone(&link));
        let ctx = HandlerContext::new(Outbox::new(Arc::clone(&link)), dispatch.clone());
        let worker = tokio::spawn(dispatch_loop(handler, rx, ctx).instrument(span.clone()));

        let inner = Arc::new(Inner {
            url,
            config,
            connector,
            link,
            dispatch,
            connect_lock: tokio::sync::Mutex::new(()),
            timer: ReconnectTimer::default(),
            io_task: Mutex::new(None),
            retry_task: Mutex::new(None),
            span,
        });

        Self {
            inner,
            dispatcher: Mutex::new(Some(worker)),
        }
    }

    /// Connect, retrying under the reconnect budget.
    ///
    /// Resolves once, with the outcome of the whole retry chain. Returns
    /// immediately if already connected.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ConnectFailed`] when every attempt failed, or at
    ///   once when the connector fails with a non-transport error
    /// - [`SessionError::Cancelled`] if `disconnect()` interrupted the chain
    /// - [`SessionError::ShuttingDown`] after `close()`
    pub async fn connect(&self) -> Result<()> {
        if self.inner.link.is_shutting_down() {
            return Err(SessionError::ShuttingDown);
        }
        if self.inner.link.is_connected() {
            return Ok(());
        }
        let epoch = self.inner.link.epoch();
        Arc::clone(&self.inner)
            .establish(false, epoch)
            .instrument(self.inner.span.clone())
            .await
    }

    /// Close the live transport with a normal closure.
    ///
    /// Waits at most the configured disconnect timeout for the handshake and
    /// cancels any pending reconnect. Always leaves the session disconnected.
    pub async fn disconnect(&self) {
        self.inner
            .disconnect()
            .instrument(self.inner.span.clone())
            .await;
    }

    /// Shut the session down: refuse new work, disconnect, stop every task.
    ///
    /// Bounded by the close and drain timeouts. Idempotent.
    pub async fn close(&self) {
        let span = self.inner.span.clone();
        async {
            if self.inner.link.begin_shutdown() {
                return;
            }
            info!("closing session");

            if tokio::time::timeout(self.inner.config.close_timeout, self.inner.disconnect())
                .await
                .is_err()
            {
                warn!("disconnect did not finish within close timeout");
            }
            self.inner.abort_all();

            self.inner.dispatch.stop();
            let worker = lock(&self.dispatcher).take();
            if let Some(mut worker) = worker {
                match tokio::time::timeout(self.inner.config.drain_timeout, &mut worker).await {
                    Ok(Ok(())) => debug!("dispatcher drained"),
                    Ok(Err(join_err)) => warn!("dispatcher terminated with join error: {join_err}"),
                    Err(_) => {
                        warn!("dispatcher did not drain within timeout; aborting");
                        worker.abort();
                    }
                }
            }
            info!("session closed");
        }
        .instrument(span)
        .await;
    }

    /// Queue local work for the handler. Returns `false` if refused.
    pub fn dispatch_local(&self, local: H::Local) -> bool {
        self.inner.dispatch.dispatch(SessionEvent::Local(local))
    }

    /// Typed send handle for this session.
    pub fn outbox(&self) -> Outbox<H::Family> {
        Outbox::new(Arc::clone(&self.inner.link))
    }

    /// Encode and queue a message.
    ///
    /// # Errors
    ///
    /// See [`Outbox::send`].
    pub fn send(&self, message: &<H::Family as MessageFamily>::Outgoing) -> Result<()> {
        let _entered = self.inner.span.enter();
        self.outbox().send(message)
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.link.session_id
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn is_connected(&self) -> bool {
        self.inner.link.is_connected()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.link.is_shutting_down()
    }

    /// Reconnect attempts spent since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.link.reconnect_attempts()
    }
}

impl<H: SessionHandler> std::fmt::Debug for Session<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.inner.url.as_str())
            .field("link", &self.inner.link)
            .finish()
    }
}

impl<H: SessionHandler> Drop for Session<H> {
    fn drop(&mut self) {
        // No executor is available here; abort instead of closing gracefully.
        self.inner.abort_all();
        let worker = lock(&self.dispatcher).take();
        if let Some(worker) = worker {
            worker.abort();
        }
    }
}
