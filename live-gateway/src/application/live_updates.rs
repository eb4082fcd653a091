//! Live Updates Context
//!
//! One handle that owns the session, registry, normalizer and bus and wires
//! them together. Construct it once at application start and pass clones to
//! whatever needs live order updates.

use chrono::Utc;
use order_core::{Channel, OrderUpdate, Timestamp};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::watch;

use super::registry::{SubscriptionHandle, SubscriptionRegistry};
use super::session::Session;
use crate::config::LiveConfigFile;
use crate::domain::{
    ConnectError, ConnectionInfo, ConnectionObserver, ConnectionState, Connector, FrameNormalizer,
    Identity, InboundFrame, NormalizedUpdate, ReconnectPolicy,
};
use crate::infrastructure::{OrderUpdateNormalizer, StompConnector};
use crate::presentation::{Delivery, ListenerFilter, ListenerId, UpdateBus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid order id {order_id:?}: {reason}")]
pub struct InvalidOrderId {
    pub order_id: String,
    pub reason: &'static str,
}

struct LiveInner {
    session: Arc<Session>,
    registry: Arc<SubscriptionRegistry>,
    bus: Arc<UpdateBus>,
}

impl Drop for LiveInner {
    fn drop(&mut self) {
        self.session.stop();
    }
}

/// Shared entry point for live order updates
///
/// Cloning is cheap; all clones share one connection. The session stops
/// when the last clone is dropped.
#[derive(Clone)]
pub struct LiveUpdates {
    inner: Arc<LiveInner>,
}

impl LiveUpdates {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy, history_capacity: usize) -> Self {
        Self::with_normalizer(
            connector,
            policy,
            history_capacity,
            Arc::new(OrderUpdateNormalizer::new()),
        )
    }

    /// Build from configuration with a caller-supplied transport
    pub fn from_config(config: &LiveConfigFile, connector: Arc<dyn Connector>) -> Self {
        Self::new(connector, config.reconnect.to_policy(), config.history.capacity)
    }

    /// Build from configuration over STOMP/WebSocket
    pub fn websocket(config: &LiveConfigFile) -> Result<Self, ConnectError> {
        let connector = StompConnector::from_config(&config.endpoint)?;
        Ok(Self::from_config(config, Arc::new(connector)))
    }

    pub fn with_normalizer(
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
        history_capacity: usize,
        normalizer: Arc<dyn FrameNormalizer>,
    ) -> Self {
        let session = Arc::new(Session::new(connector, policy));
        let registry = Arc::new(SubscriptionRegistry::new(session.clone()));
        let bus = Arc::new(UpdateBus::new(history_capacity));

        let observer: Arc<dyn ConnectionObserver> = registry.clone();
        session.set_observer(Arc::downgrade(&observer));

        let wanted = Arc::downgrade(&registry);
        let sink = Arc::clone(&bus);
        session.on_frame(move |frame| handle_frame(&*normalizer, &wanted, &sink, frame));

        LiveUpdates {
            inner: Arc::new(LiveInner {
                session,
                registry,
                bus,
            }),
        }
    }

    /// Start the session for `identity` and pin its user channel.
    ///
    /// A session running for another identity is stopped first, so nothing
    /// for the new user is ever sent on the old user's connection.
    pub fn login(&self, identity: Identity) {
        tracing::info!(user = %identity.user_id, "Login");
        if let Some(current) = self.inner.session.active_identity() {
            if current != identity {
                tracing::info!(previous = %current.user_id, "Switching identity");
                self.inner.session.stop();
            }
        }
        self.inner.registry.pin_user(&identity.user_id);
        self.inner.session.start(identity);
    }

    /// Stop the session and release the user channel.
    ///
    /// Order subscriptions held by consumers survive and are re-sent on the
    /// next login.
    pub fn logout(&self) {
        tracing::info!("Logout");
        self.inner.session.stop();
        self.inner.registry.unpin_user();
    }

    pub fn subscribe_order(&self, order_id: &str) -> Result<SubscriptionHandle, InvalidOrderId> {
        let channel = Channel::order(order_id).map_err(|reason| InvalidOrderId {
            order_id: order_id.to_string(),
            reason,
        })?;
        Ok(self.subscribe(channel))
    }

    pub fn subscribe(&self, channel: Channel) -> SubscriptionHandle {
        self.inner.registry.subscribe(channel)
    }

    /// Idempotent
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.inner.registry.unsubscribe(handle);
    }

    pub fn add_listener<F>(&self, filter: ListenerFilter, callback: F) -> ListenerId
    where
        F: Fn(&Delivery) + Send + Sync + 'static,
    {
        self.inner.bus.add_listener(filter, callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.bus.remove_listener(id)
    }

    pub fn receiver(
        &self,
        filter: ListenerFilter,
        capacity: usize,
    ) -> (ListenerId, crossbeam_channel::Receiver<Delivery>) {
        self.inner.bus.receiver(filter, capacity)
    }

    pub fn history(&self, channel: Option<&Channel>) -> Vec<OrderUpdate> {
        self.inner.bus.history(channel)
    }

    pub fn recent(&self, since: Timestamp) -> Vec<OrderUpdate> {
        self.inner.bus.recent(since)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.is_connected()
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        self.inner.session.info()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.session.watch_state()
    }

    /// Channels with at least one listener, sorted
    pub fn channels(&self) -> Vec<Channel> {
        self.inner.registry.channels()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub fn bus(&self) -> &UpdateBus {
        &self.inner.bus
    }
}

/// Frame path: normalize, drop anything nobody wants, publish the rest
fn handle_frame(
    normalizer: &dyn FrameNormalizer,
    registry: &Weak<SubscriptionRegistry>,
    bus: &UpdateBus,
    frame: InboundFrame,
) {
    let NormalizedUpdate { channel, update } = match normalizer.normalize(&frame, Utc::now()) {
        Ok(normalized) => normalized,
        Err(reason) => {
            tracing::warn!(destination = %frame.destination, %reason, "Dropping frame");
            return;
        }
    };

    let Some(registry) = registry.upgrade() else {
        return;
    };
    if !registry.is_wanted(&channel) {
        tracing::debug!(channel = %channel, order_id = %update.order_id, "Frame for released channel");
        return;
    }

    bus.publish(channel, update);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ControlFrame;
    use crate::infrastructure::memory_pair;
    use std::time::Duration;

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn live() -> (LiveUpdates, crate::infrastructure::MemoryServer) {
        let (connector, server) = memory_pair();
        let live = LiveUpdates::new(
            Arc::new(connector),
            ReconnectPolicy::Fixed(Duration::from_secs(5)),
            200,
        );
        (live, server)
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_subscribes_user_channel() {
        let (live, server) = live();
        live.login(Identity::new("u1"));
        settle().await;

        assert!(live.is_connected());
        assert_eq!(
            server.sent(),
            vec![ControlFrame::Subscribe(Channel::user("u1").unwrap())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_order_id() {
        let (live, _server) = live();
        let err = live.subscribe_order("").unwrap_err();
        assert_eq!(err.order_id, "");
        assert!(live.subscribe_order("a/b").is_err());
        assert!(live.channels().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_for_released_channel_is_dropped() {
        let (live, server) = live();
        live.login(Identity::new("u1"));
        let handle = live.subscribe_order("5").unwrap();
        settle().await;

        assert!(server.push("/topic/order/5", r#"{"orderId":"5","status":"READY"}"#));
        settle().await;
        live.unsubscribe(&handle);
        assert!(server.push("/topic/order/5", r#"{"orderId":"5","status":"COMPLETED"}"#));
        settle().await;

        let history = live.history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, order_core::OrderStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_clone_stops_session() {
        let (live, server) = live();
        let other = live.clone();
        live.login(Identity::new("u1"));
        settle().await;

        drop(live);
        assert!(other.is_connected());
        drop(other);
        settle().await;
        assert!(!server.is_live());
    }
}
