//! Transport Session
//!
//! Owns the single logical connection to the event endpoint and drives the
//! reconnect state machine. Transport errors never escape: they are logged,
//! recorded in `ConnectionInfo::last_error` and retried after the policy's
//! delay. Only `stop()` ends the session.

use arc_swap::ArcSwap;
use order_core::Channel;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::{
    ConnectionInfo, ConnectionObserver, ConnectionState, Connector, ControlFrame, ControlSender,
    FrameSink, Identity, InboundFrame, LinkEvent, LinkId, ReconnectPolicy, SendError,
};

/// Frame-received callback. Exactly one is registered at a time.
pub type FrameHandler = Arc<dyn Fn(InboundFrame) + Send + Sync>;

/// Mutable session state, guarded by one lock
struct SessionInner {
    state: ConnectionState,
    identity: Option<Identity>,
    /// Bumped on every start/stop so a superseded driver task stops touching state
    generation: u64,
    link: Option<(LinkId, Arc<dyn FrameSink>)>,
    next_link: u64,
    retry_count: u32,
    last_error: Option<String>,
    task: Option<JoinHandle<()>>,
}

pub struct Session {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    inner: Mutex<SessionInner>,
    /// Lock-free snapshot for readers (`is_connected`, UI indicators)
    info: ArcSwap<ConnectionInfo>,
    state_tx: watch::Sender<ConnectionState>,
    frame_handler: RwLock<Option<FrameHandler>>,
    observer: RwLock<Option<Weak<dyn ConnectionObserver>>>,
}

impl Session {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Session {
            connector,
            policy,
            inner: Mutex::new(SessionInner {
                state: ConnectionState::Disconnected,
                identity: None,
                generation: 0,
                link: None,
                next_link: 0,
                retry_count: 0,
                last_error: None,
                task: None,
            }),
            info: ArcSwap::from_pointee(ConnectionInfo::default()),
            state_tx,
            frame_handler: RwLock::new(None),
            observer: RwLock::new(None),
        }
    }

    /// Register the frame-received callback. The latest registration wins.
    pub fn on_frame(&self, handler: impl Fn(InboundFrame) + Send + Sync + 'static) {
        *self.frame_handler.write() = Some(Arc::new(handler));
    }

    /// Register the lifecycle observer (the subscription registry).
    ///
    /// Held weakly: the registry owns a strong reference back to the session.
    pub fn set_observer(&self, observer: Weak<dyn ConnectionObserver>) {
        *self.observer.write() = Some(observer);
    }

    pub fn state(&self) -> ConnectionState {
        self.info.load().state
    }

    pub fn info(&self) -> ConnectionInfo {
        self.info.load().as_ref().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver that observes every state transition
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Begin connecting for `identity`.
    ///
    /// No-op if the session is already active for the same identity. A
    /// different identity tears down the current connection first. Must be
    /// called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>, identity: Identity) {
        let (generation, torn_down) = {
            let mut inner = self.inner.lock();
            if inner.state.is_active() && inner.identity.as_ref() == Some(&identity) {
                tracing::debug!(user = %identity.user_id, "Session already active, start ignored");
                return;
            }

            let torn_down = if inner.state.is_active() {
                tracing::info!("Identity changed, restarting session");
                Some(self.teardown(&mut inner))
            } else {
                None
            };

            inner.generation += 1;
            inner.identity = Some(identity.clone());
            inner.retry_count = 0;
            inner.last_error = None;
            self.set_state(&mut inner, ConnectionState::Connecting);

            (inner.generation, torn_down)
        };

        // The old link is fully retired before the new driver can connect
        if let Some(sink) = torn_down {
            self.notify_disconnected();
            if let Some(sink) = sink {
                sink.close();
            }
        }

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        let session = Arc::clone(self);
        inner.task = Some(tokio::spawn(async move {
            session.run(identity, generation).await;
        }));
    }

    /// Identity of the running session, if any
    pub fn active_identity(&self) -> Option<Identity> {
        let inner = self.inner.lock();
        if inner.state.is_active() {
            inner.identity.clone()
        } else {
            None
        }
    }

    /// Tear down the connection and cancel any pending reconnect. Idempotent.
    pub fn stop(&self) {
        let torn_down = {
            let mut inner = self.inner.lock();
            if !inner.state.is_active() {
                return;
            }
            let sink = self.teardown(&mut inner);
            inner.generation += 1;
            inner.identity = None;
            inner.retry_count = 0;
            self.set_state(&mut inner, ConnectionState::Disconnected);
            sink
        };

        tracing::info!("Session stopped");
        self.notify_disconnected();
        if let Some(sink) = torn_down {
            sink.close();
        }
    }

    fn teardown(&self, inner: &mut SessionInner) -> Option<Arc<dyn FrameSink>> {
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.link.take().map(|(_, sink)| sink)
    }

    async fn run(self: Arc<Self>, identity: Identity, generation: u64) {
        loop {
            match self.connector.connect(&identity).await {
                Ok(link) => {
                    let mut events = link.events;
                    let Some(link_id) = self.enter_connected(generation, Arc::clone(&link.sink))
                    else {
                        link.sink.close();
                        return;
                    };

                    // Re-subscription has completed; inbound frames may now flow
                    let reason = loop {
                        match events.recv().await {
                            Some(LinkEvent::Frame(frame)) => self.dispatch(frame),
                            Some(LinkEvent::Error(e)) => break Some(e),
                            Some(LinkEvent::Closed) | None => break None,
                        }
                    };

                    tracing::warn!(
                        link = %link_id,
                        error = reason.as_deref().unwrap_or("closed by remote"),
                        "Connection lost"
                    );
                    link.sink.close();
                    if !self.enter_reconnecting(generation, reason) {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(user = %identity.user_id, "Connect failed: {}", e);
                    if !self.enter_reconnecting(generation, Some(e.to_string())) {
                        return;
                    }
                }
            }

            let attempt = self.inner.lock().retry_count;
            let delay = self.policy.delay_for(attempt);
            tracing::info!(attempt, ?delay, "Reconnecting after delay");
            tokio::time::sleep(delay).await;

            {
                let mut inner = self.inner.lock();
                if inner.generation != generation {
                    return;
                }
                self.set_state(&mut inner, ConnectionState::Connecting);
            }
        }
    }

    /// Transition into `Connected` and notify the observer synchronously.
    /// Returns `None` if this driver has been superseded.
    fn enter_connected(&self, generation: u64, sink: Arc<dyn FrameSink>) -> Option<LinkId> {
        let link_id = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return None;
            }
            inner.next_link += 1;
            let link_id = LinkId(inner.next_link);
            inner.link = Some((link_id, sink));
            inner.retry_count = 0;
            self.set_state(&mut inner, ConnectionState::Connected);
            link_id
        };

        tracing::info!(link = %link_id, "Connected");
        if let Some(observer) = self.observer() {
            observer.on_connected(link_id);
        }
        Some(link_id)
    }

    fn enter_reconnecting(&self, generation: u64, error: Option<String>) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return false;
            }
            inner.link = None;
            inner.retry_count = inner.retry_count.saturating_add(1);
            if error.is_some() {
                inner.last_error = error;
            }
            self.set_state(&mut inner, ConnectionState::Reconnecting);
        }

        self.notify_disconnected();
        true
    }

    fn dispatch(&self, frame: InboundFrame) {
        let handler = self.frame_handler.read().clone();
        match handler {
            Some(handler) => handler(frame),
            None => tracing::trace!(destination = %frame.destination, "No frame handler registered"),
        }
    }

    fn observer(&self) -> Option<Arc<dyn ConnectionObserver>> {
        self.observer.read().as_ref().and_then(Weak::upgrade)
    }

    fn notify_disconnected(&self) {
        if let Some(observer) = self.observer() {
            observer.on_disconnected();
        }
    }

    fn set_state(&self, inner: &mut SessionInner, state: ConnectionState) {
        inner.state = state;
        self.info.store(Arc::new(ConnectionInfo {
            state,
            retry_count: inner.retry_count,
            last_error: inner.last_error.clone(),
        }));
        self.state_tx.send_replace(state);
    }

    fn send(&self, frame: ControlFrame) -> Result<LinkId, SendError> {
        let (link_id, sink) = {
            let inner = self.inner.lock();
            if !inner.state.is_connected() {
                return Err(SendError::NotConnected);
            }
            let (link_id, sink) = inner.link.as_ref().ok_or(SendError::NotConnected)?;
            (*link_id, Arc::clone(sink))
        };

        sink.send(frame)?;
        Ok(link_id)
    }
}

impl ControlSender for Session {
    fn send_subscribe(&self, channel: &Channel) -> Result<LinkId, SendError> {
        self.send(ControlFrame::Subscribe(channel.clone()))
    }

    fn send_unsubscribe(&self, channel: &Channel) -> Result<LinkId, SendError> {
        self.send(ControlFrame::Unsubscribe(channel.clone()))
    }
}
