//! Serial event dispatcher.
//!
//! Every lifecycle notification, decoded message and piece of deferred local
//! work for a session runs on one worker task, in the order it was queued.
//! Handlers therefore never race each other and never run on the receive
//! path. Once the session starts closing, new work is refused; work already
//! queued drains until an internal stop marker is reached.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use super::link::{Link, Outbox};
use crate::error::Result;
use crate::event::SessionEvent;
use crate::protocol::MessageFamily;

/// Event type delivered to handler `H`.
pub type HandlerEvent<H> = SessionEvent<
    <<H as SessionHandler>::Family as MessageFamily>::Incoming,
    <H as SessionHandler>::Local,
>;

/// Application logic attached to a session.
///
/// `handle` is only ever called from the session's dispatcher task, one event
/// at a time, so implementations may own their state without locking.
pub trait SessionHandler: Send + Sized + 'static {
    /// Protocol spoken by the session.
    type Family: MessageFamily;
    /// Local work the handler schedules for itself.
    type Local: fmt::Debug + Send + 'static;

    fn handle(
        &mut self,
        event: HandlerEvent<Self>,
        ctx: &HandlerContext<Self::Family, Self::Local>,
    );
}

/// Queue entry for the worker.
pub(crate) enum Job<E> {
    Run(E),
    Stop,
}

/// Cloneable handle that queues events on a session's dispatcher.
pub(crate) struct DispatchHandle<M, L> {
    tx: mpsc::UnboundedSender<Job<SessionEvent<M, L>>>,
    link: Arc<Link>,
}

impl<M, L> Clone for DispatchHandle<M, L> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            link: Arc::clone(&self.link),
        }
    }
}

impl<M, L> DispatchHandle<M, L>
where
    M: Send + 'static,
    L: Send + 'static,
{
    pub(crate) fn new(link: Arc<Link>) -> (Self, mpsc::UnboundedReceiver<Job<SessionEvent<M, L>>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, link }, rx)
    }

    /// Queue an event. Returns `false` if it was refused because the session
    /// is shutting down or the worker is gone.
    pub(crate) fn dispatch(&self, event: SessionEvent<M, L>) -> bool {
        if self.link.is_shutting_down() {
            debug!(kind = event.kind(), "session shutting down, event dropped");
            return false;
        }
        if self.tx.send(Job::Run(event)).is_err() {
            debug!("dispatcher gone, event dropped");
            return false;
        }
        true
    }

    /// Queue `event` after `delay` from a timer task.
    pub(crate) fn dispatch_after(&self, delay: Duration, event: SessionEvent<M, L>) {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handle.dispatch(event);
        });
    }

    /// Queue the stop marker, bypassing the shutdown gate.
    pub(crate) fn stop(&self) {
        let _ = self.tx.send(Job::Stop);
    }
}

// ── HandlerContext ──────────────────────────────────────────────────

/// What a handler may do while handling an event: send on the session and
/// schedule local work for itself.
pub struct HandlerContext<F: MessageFamily, L> {
    outbox: Outbox<F>,
    dispatch: DispatchHandle<F::Incoming, L>,
}

impl<F, L> HandlerContext<F, L>
where
    F: MessageFamily,
    L: Send + 'static,
{
    pub(crate) fn new(outbox: Outbox<F>, dispatch: DispatchHandle<F::Incoming, L>) -> Self {
        Self { outbox, dispatch }
    }

    /// Encode and queue a message on the live connection.
    ///
    /// # Errors
    ///
    /// See [`Outbox::send`].
    pub fn send(&self, message: &F::Outgoing) -> Result<()> {
        self.outbox.send(message)
    }

    pub fn outbox(&self) -> &Outbox<F> {
        &self.outbox
    }

    pub fn is_connected(&self) -> bool {
        self.outbox.is_connected()
    }

    pub fn session_id(&self) -> Uuid {
        self.dispatch.link.session_id
    }

    /// Deliver `local` back to this handler after `delay`.
    ///
    /// Dropped silently if the session is closing when the delay expires.
    pub fn schedule(&self, delay: Duration, local: L) {
        self.dispatch
            .dispatch_after(delay, SessionEvent::Local(local));
    }
}

/// Worker loop: run each queued event through the handler until stopped.
pub(crate) async fn dispatch_loop<H: SessionHandler>(
    mut handler: H,
    mut rx: mpsc::UnboundedReceiver<Job<HandlerEvent<H>>>,
    ctx: HandlerContext<H::Family, H::Local>,
) {
    debug!("dispatcher started");
    while let Some(job) = rx.recv().await {
        match job {
            Job::Run(event) => {
                trace!(kind = event.kind(), "dispatching event");
                handler.handle(event, &ctx);
            }
            Job::Stop => break,
        }
    }
    debug!("dispatcher exited");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::protocol::{GameRoom, RoomEvent};
    use std::sync::Mutex as StdMutex;

    struct Recorder {
        seen: Arc<StdMutex<Vec<String>>>,
    }

    impl SessionHandler for Recorder {
        type Family = GameRoom;
        type Local = u32;

        fn handle(&mut self, event: HandlerEvent<Self>, ctx: &HandlerContext<GameRoom, u32>) {
            let label = match event {
                SessionEvent::Local(n) => {
                    if n == 1 {
                        ctx.schedule(Duration::from_millis(50), 2);
                    }
                    format!("local:{n}")
                }
                other => other.kind().to_string(),
            };
            self.seen.lock().unwrap().push(label);
        }
    }

    fn start() -> (
        DispatchHandle<RoomEvent, u32>,
        Arc<Link>,
        tokio::task::JoinHandle<()>,
        Arc<StdMutex<Vec<String>>>,
    ) {
        let link = Arc::new(Link::new(Uuid::new_v4()));
        let (dispatch, rx) = DispatchHandle::new(Arc::clone(&link));
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let ctx = HandlerContext::new(Outbox::new(Arc::clone(&link)), dispatch.clone());
        let task = tokio::spawn(dispatch_loop(
            Recorder {
                seen: Arc::clone(&seen),
            },
            rx,
            ctx,
        ));
        (dispatch, link, task, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn events_run_in_arrival_order() {
        let (dispatch, _link, task, seen) = start();
        dispatch.dispatch(SessionEvent::Connected);
        dispatch.dispatch(SessionEvent::Message(RoomEvent::TimerUpdate { timer: 3 }));
        dispatch.dispatch(SessionEvent::Local(1));
        tokio::time::sleep(Duration::from_millis(100)).await;
        dispatch.stop();
        task.await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["connected", "message", "local:1", "local:2"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_refuses_new_work_but_drains_queued() {
        let (dispatch, link, task, seen) = start();
        assert!(dispatch.dispatch(SessionEvent::Connected));
        link.begin_shutdown();
        assert!(!dispatch.dispatch(SessionEvent::Local(7)));
        dispatch.stop();
        task.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["connected"]);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_work_is_dropped_after_shutdown() {
        let (dispatch, link, task, seen) = start();
        dispatch.dispatch(SessionEvent::Local(1));
        tokio::time::sleep(Duration::from_millis(10)).await;
        link.begin_shutdown();
        tokio::time::sleep(Duration::from_millis(100)).await;
        dispatch.stop();
        task.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["local:1"]);
    }
}
