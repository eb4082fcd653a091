//! Subscription Registry
//!
//! Translates local interest in channels into subscribe/unsubscribe frames.
//! Each channel is ref-counted: the first listener triggers a subscribe, the
//! last one leaving triggers an unsubscribe. After every reconnect all wanted
//! channels are re-subscribed, since server-side subscriptions do not survive
//! the connection.

use order_core::Channel;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{ConnectionObserver, ControlSender, LinkId};

/// Opaque registration returned by `subscribe`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    channel: Channel,
}

impl SubscriptionHandle {
    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

struct ChannelEntry {
    ref_count: usize,
    /// Link the subscribe frame went out on; `None` while pending
    subscribed_on: Option<LinkId>,
}

struct RegistryState {
    channels: HashMap<Channel, ChannelEntry>,
    handles: HashMap<u64, Channel>,
    next_handle: u64,
    /// Implicit per-user channel held for the lifetime of the identity
    pinned: Option<SubscriptionHandle>,
}

pub struct SubscriptionRegistry {
    sender: Arc<dyn ControlSender>,
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    pub fn new(sender: Arc<dyn ControlSender>) -> Self {
        SubscriptionRegistry {
            sender,
            state: Mutex::new(RegistryState {
                channels: HashMap::new(),
                handles: HashMap::new(),
                next_handle: 1,
                pinned: None,
            }),
        }
    }

    /// Register interest in `channel`.
    ///
    /// Sends a subscribe frame on the 0 → 1 transition if connected;
    /// otherwise the channel stays pending until the next connect.
    pub fn subscribe(&self, channel: Channel) -> SubscriptionHandle {
        let mut state = self.state.lock();
        let id = state.next_handle;
        state.next_handle += 1;
        state.handles.insert(id, channel.clone());

        let entry = state
            .channels
            .entry(channel.clone())
            .or_insert(ChannelEntry {
                ref_count: 0,
                subscribed_on: None,
            });
        entry.ref_count += 1;

        if entry.ref_count == 1 {
            match self.sender.send_subscribe(&channel) {
                Ok(link) => {
                    entry.subscribed_on = Some(link);
                    tracing::debug!(channel = %channel, link = %link, "Subscribed");
                }
                Err(e) => {
                    tracing::debug!(channel = %channel, "Subscribe deferred until connected: {}", e);
                }
            }
        }

        SubscriptionHandle { id, channel }
    }

    /// Release a registration. Unknown or already released handles are ignored.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut state = self.state.lock();
        let Some(channel) = state.handles.remove(&handle.id) else {
            tracing::trace!(channel = %handle.channel, "Handle already released");
            return;
        };
        if state.pinned.as_ref().is_some_and(|pinned| pinned.id == handle.id) {
            state.pinned = None;
        }

        let Some(entry) = state.channels.get_mut(&channel) else {
            return;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count > 0 {
            return;
        }

        let was_subscribed = entry.subscribed_on.is_some();
        state.channels.remove(&channel);

        if was_subscribed {
            match self.sender.send_unsubscribe(&channel) {
                Ok(_) => tracing::debug!(channel = %channel, "Unsubscribed"),
                Err(e) => tracing::debug!(channel = %channel, "Unsubscribe not sent: {}", e),
            }
        }
    }

    /// Pin `user/{user_id}` so UI churn never drops it. Replaces any previous pin.
    pub fn pin_user(&self, user_id: &str) -> Option<SubscriptionHandle> {
        let channel = match Channel::user(user_id) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(user = %user_id, "Cannot pin user channel: {}", e);
                return None;
            }
        };

        let current = self.state.lock().pinned.clone();
        if let Some(current) = current {
            if current.channel == channel {
                return Some(current);
            }
            self.unsubscribe(&current);
        }

        let handle = self.subscribe(channel);
        self.state.lock().pinned = Some(handle.clone());
        Some(handle)
    }

    /// Release the user pin, if any
    pub fn unpin_user(&self) {
        let pinned = self.state.lock().pinned.take();
        if let Some(handle) = pinned {
            self.unsubscribe(&handle);
        }
    }

    pub fn ref_count(&self, channel: &Channel) -> usize {
        self.state
            .lock()
            .channels
            .get(channel)
            .map_or(0, |entry| entry.ref_count)
    }

    pub fn is_wanted(&self, channel: &Channel) -> bool {
        self.ref_count(channel) > 0
    }

    /// Whether a subscribe frame for `channel` went out on the current link
    pub fn is_server_subscribed(&self, channel: &Channel) -> bool {
        self.state
            .lock()
            .channels
            .get(channel)
            .is_some_and(|entry| entry.subscribed_on.is_some())
    }

    /// Channels with at least one listener, sorted by name
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.state.lock().channels.keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Wanted channels not yet subscribed on the current link
    pub fn pending(&self) -> Vec<Channel> {
        let mut pending: Vec<Channel> = self
            .state
            .lock()
            .channels
            .iter()
            .filter(|(_, entry)| entry.subscribed_on.is_none())
            .map(|(channel, _)| channel.clone())
            .collect();
        pending.sort();
        pending
    }
}

impl ConnectionObserver for SubscriptionRegistry {
    fn on_connected(&self, link: LinkId) {
        let mut state = self.state.lock();
        let mut sent = 0usize;

        for (channel, entry) in state.channels.iter_mut() {
            // A concurrent subscribe may already have used this link
            if entry.subscribed_on == Some(link) {
                continue;
            }
            match self.sender.send_subscribe(channel) {
                Ok(on) => {
                    entry.subscribed_on = Some(on);
                    sent += 1;
                }
                Err(e) => {
                    entry.subscribed_on = None;
                    tracing::warn!(channel = %channel, "Re-subscribe failed: {}", e);
                }
            }
        }

        tracing::info!(link = %link, channels = sent, "Re-subscribed channels");
    }

    fn on_disconnected(&self) {
        let mut state = self.state.lock();
        for entry in state.channels.values_mut() {
            entry.subscribed_on = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ControlFrame, SendError};

    /// Records frames; connected state toggled by the test
    struct RecordingSender {
        link: Mutex<Option<LinkId>>,
        sent: Mutex<Vec<ControlFrame>>,
    }

    impl RecordingSender {
        fn new() -> Arc<Self> {
            Arc::new(RecordingSender {
                link: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn connect(&self, link: u64) {
            *self.link.lock() = Some(LinkId(link));
        }

        fn disconnect(&self) {
            *self.link.lock() = None;
        }

        fn sent(&self) -> Vec<ControlFrame> {
            self.sent.lock().clone()
        }

        fn record(&self, frame: ControlFrame) -> Result<LinkId, SendError> {
            let link = (*self.link.lock()).ok_or(SendError::NotConnected)?;
            self.sent.lock().push(frame);
            Ok(link)
        }
    }

    impl ControlSender for RecordingSender {
        fn send_subscribe(&self, channel: &Channel) -> Result<LinkId, SendError> {
            self.record(ControlFrame::Subscribe(channel.clone()))
        }

        fn send_unsubscribe(&self, channel: &Channel) -> Result<LinkId, SendError> {
            self.record(ControlFrame::Unsubscribe(channel.clone()))
        }
    }

    fn order(id: &str) -> Channel {
        Channel::order(id).unwrap()
    }

    #[test]
    fn test_subscribe_sends_once_per_first_listener() {
        let sender = RecordingSender::new();
        sender.connect(1);
        let registry = SubscriptionRegistry::new(sender.clone());

        let a = registry.subscribe(order("42"));
        let b = registry.subscribe(order("42"));
        let c = registry.subscribe(order("42"));
        assert_eq!(registry.ref_count(&order("42")), 3);
        assert_eq!(sender.sent(), vec![ControlFrame::Subscribe(order("42"))]);

        registry.unsubscribe(&a);
        registry.unsubscribe(&b);
        assert_eq!(sender.sent().len(), 1);

        registry.unsubscribe(&c);
        assert_eq!(
            sender.sent(),
            vec![
                ControlFrame::Subscribe(order("42")),
                ControlFrame::Unsubscribe(order("42")),
            ]
        );
        assert!(!registry.is_wanted(&order("42")));
    }

    #[test]
    fn test_unsubscribe_twice_is_noop() {
        let sender = RecordingSender::new();
        sender.connect(1);
        let registry = SubscriptionRegistry::new(sender.clone());

        let keep = registry.subscribe(order("1"));
        let dup = registry.subscribe(order("1"));
        registry.unsubscribe(&dup);
        registry.unsubscribe(&dup);
        registry.unsubscribe(&dup.clone());

        assert_eq!(registry.ref_count(&order("1")), 1);
        assert_eq!(sender.sent().len(), 1);

        registry.unsubscribe(&keep);
        registry.unsubscribe(&keep);
        assert_eq!(sender.sent().len(), 2);
    }

    #[test]
    fn test_pending_until_connected() {
        let sender = RecordingSender::new();
        let registry = SubscriptionRegistry::new(sender.clone());

        registry.subscribe(order("1"));
        registry.subscribe(order("2"));
        assert!(sender.sent().is_empty());
        assert_eq!(registry.pending(), vec![order("1"), order("2")]);

        sender.connect(1);
        registry.on_connected(LinkId(1));

        let mut sent = sender.sent();
        sent.sort_by(|a, b| a.channel().cmp(b.channel()));
        assert_eq!(
            sent,
            vec![
                ControlFrame::Subscribe(order("1")),
                ControlFrame::Subscribe(order("2")),
            ]
        );
        assert!(registry.pending().is_empty());
        assert!(registry.is_server_subscribed(&order("1")));
    }

    #[test]
    fn test_reconnect_resubscribes_only_wanted_channels() {
        let sender = RecordingSender::new();
        sender.connect(1);
        let registry = SubscriptionRegistry::new(sender.clone());

        let keep = registry.subscribe(order("1"));
        let gone = registry.subscribe(order("2"));
        registry.unsubscribe(&gone);

        sender.disconnect();
        registry.on_disconnected();
        assert!(!registry.is_server_subscribed(&order("1")));

        let before = sender.sent().len();
        sender.connect(2);
        registry.on_connected(LinkId(2));

        assert_eq!(
            sender.sent()[before..].to_vec(),
            vec![ControlFrame::Subscribe(order("1"))]
        );
        registry.unsubscribe(&keep);
    }

    #[test]
    fn test_no_frames_while_disconnected() {
        let sender = RecordingSender::new();
        sender.connect(1);
        let registry = SubscriptionRegistry::new(sender.clone());
        let handle = registry.subscribe(order("1"));

        sender.disconnect();
        registry.on_disconnected();
        registry.unsubscribe(&handle);
        registry.subscribe(order("3"));

        assert_eq!(sender.sent(), vec![ControlFrame::Subscribe(order("1"))]);
    }

    #[test]
    fn test_on_connected_skips_channel_already_sent_on_link() {
        let sender = RecordingSender::new();
        let registry = SubscriptionRegistry::new(sender.clone());

        // Session became Connected; a UI subscribe wins the race to the registry
        sender.connect(7);
        registry.subscribe(order("9"));
        registry.on_connected(LinkId(7));

        assert_eq!(sender.sent(), vec![ControlFrame::Subscribe(order("9"))]);
    }

    #[test]
    fn test_pinned_user_channel_survives_listener_churn() {
        let sender = RecordingSender::new();
        sender.connect(1);
        let registry = SubscriptionRegistry::new(sender.clone());
        let user = Channel::user("u1").unwrap();

        registry.pin_user("u1");
        let ui = registry.subscribe(user.clone());
        registry.unsubscribe(&ui);
        assert!(registry.is_wanted(&user));
        assert_eq!(sender.sent(), vec![ControlFrame::Subscribe(user.clone())]);

        // Pinning the same user again does not add a reference
        registry.pin_user("u1");
        assert_eq!(registry.ref_count(&user), 1);

        registry.unpin_user();
        assert!(!registry.is_wanted(&user));
        assert_eq!(sender.sent().last(), Some(&ControlFrame::Unsubscribe(user)));
    }
}
