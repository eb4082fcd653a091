//! Update Fan-out Bus
//!
//! Central sink for normalized updates. Appends to a bounded history and
//! notifies every listener registered for the update's channel plus every
//! listener on the `All` stream, in registration order.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use order_core::{Channel, OrderUpdate, Timestamp};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which updates a listener receives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListenerFilter {
    All,
    Channel(Channel),
}

impl ListenerFilter {
    pub fn matches(&self, channel: &Channel) -> bool {
        match self {
            ListenerFilter::All => true,
            ListenerFilter::Channel(wanted) => wanted == channel,
        }
    }
}

impl From<Channel> for ListenerFilter {
    fn from(channel: Channel) -> Self {
        ListenerFilter::Channel(channel)
    }
}

/// One update as seen by listeners: the update plus its channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: Channel,
    pub update: OrderUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

pub type Callback = Arc<dyn Fn(&Delivery) + Send + Sync>;

#[derive(Clone)]
enum Target {
    Callback(Callback),
    Channel(Sender<Delivery>),
}

struct Listener {
    id: ListenerId,
    filter: ListenerFilter,
    target: Target,
}

struct BusState {
    history: VecDeque<Delivery>,
    listeners: Vec<Listener>,
}

pub struct UpdateBus {
    capacity: usize,
    state: Mutex<BusState>,
    /// Serializes publishers so per-channel order holds across threads
    publish_lock: Mutex<()>,
    next_id: AtomicU64,
}

impl UpdateBus {
    /// Bus keeping at most `capacity` updates of history (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        UpdateBus {
            capacity,
            state: Mutex::new(BusState {
                history: VecDeque::with_capacity(capacity),
                listeners: Vec::new(),
            }),
            publish_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append to history, then notify matching listeners.
    ///
    /// Listeners run on the publishing thread with no bus state locked, so
    /// they may add or remove listeners and read history. They must not
    /// publish.
    pub fn publish(&self, channel: Channel, update: OrderUpdate) {
        let _order = self.publish_lock.lock();
        let delivery = Delivery { channel, update };

        let targets: Vec<(ListenerId, Target)> = {
            let mut state = self.state.lock();
            if state.history.len() == self.capacity {
                state.history.pop_front();
            }
            state.history.push_back(delivery.clone());

            state
                .listeners
                .iter()
                .filter(|l| l.filter.matches(&delivery.channel))
                .map(|l| (l.id, l.target.clone()))
                .collect()
        };

        tracing::trace!(
            channel = %delivery.channel,
            order_id = %delivery.update.order_id,
            status = %delivery.update.status,
            listeners = targets.len(),
            "Publishing update"
        );

        let mut disconnected = Vec::new();
        for (id, target) in targets {
            match target {
                Target::Callback(callback) => callback(&delivery),
                Target::Channel(tx) => match tx.try_send(delivery.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(listener = %id, channel = %delivery.channel, "Receiver full, dropping update");
                    }
                    Err(TrySendError::Disconnected(_)) => disconnected.push(id),
                },
            }
        }

        if !disconnected.is_empty() {
            let mut state = self.state.lock();
            state.listeners.retain(|l| !disconnected.contains(&l.id));
            tracing::debug!(count = disconnected.len(), "Removed dropped receivers");
        }
    }

    /// Register a callback; it sees updates published from now on
    pub fn add_listener<F>(&self, filter: ListenerFilter, callback: F) -> ListenerId
    where
        F: Fn(&Delivery) + Send + Sync + 'static,
    {
        self.register(filter, Target::Callback(Arc::new(callback)))
    }

    /// Channel-backed listener for consumers on other threads.
    ///
    /// Updates that do not fit in `capacity` are dropped. Dropping the
    /// receiver unregisters it on the next matching publish.
    pub fn receiver(&self, filter: ListenerFilter, capacity: usize) -> (ListenerId, Receiver<Delivery>) {
        let (tx, rx) = bounded(capacity.max(1));
        let id = self.register(filter, Target::Channel(tx));
        (id, rx)
    }

    fn register(&self, filter: ListenerFilter, target: Target) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.state.lock().listeners.push(Listener { id, filter, target });
        id
    }

    /// False if the listener was already gone
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|l| l.id != id);
        state.listeners.len() != before
    }

    /// Snapshot of buffered updates, oldest first, optionally for one channel
    pub fn history(&self, channel: Option<&Channel>) -> Vec<OrderUpdate> {
        self.state
            .lock()
            .history
            .iter()
            .filter(|d| channel.is_none_or(|c| *c == d.channel))
            .map(|d| d.update.clone())
            .collect()
    }

    /// Buffered updates with `timestamp >= since`, in arrival order
    pub fn recent(&self, since: Timestamp) -> Vec<OrderUpdate> {
        self.state
            .lock()
            .history
            .iter()
            .filter(|d| d.update.timestamp >= since)
            .map(|d| d.update.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use order_core::OrderStatus;

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_714_000_000 + secs, 0).unwrap()
    }

    fn order(id: &str) -> Channel {
        Channel::order(id).unwrap()
    }

    fn update(id: &str, status: OrderStatus, secs: i64) -> OrderUpdate {
        OrderUpdate::new(id, status, at(secs))
    }

    fn statuses(updates: &[OrderUpdate]) -> Vec<OrderStatus> {
        updates.iter().map(|u| u.status).collect()
    }

    #[test]
    fn test_history_replay_for_late_listener() {
        let bus = UpdateBus::new(200);
        bus.publish(order("7"), update("7", OrderStatus::Received, 0));
        bus.publish(order("7"), update("7", OrderStatus::Preparing, 1));

        let history = bus.history(Some(&order("7")));
        assert_eq!(
            statuses(&history),
            vec![OrderStatus::Received, OrderStatus::Preparing]
        );
    }

    #[test]
    fn test_history_evicts_oldest() {
        let bus = UpdateBus::new(3);
        for (i, status) in OrderStatus::ALL.iter().take(5).enumerate() {
            bus.publish(order("1"), update("1", *status, i as i64));
        }

        assert_eq!(bus.len(), 3);
        assert_eq!(
            statuses(&bus.history(None)),
            vec![OrderStatus::Preparing, OrderStatus::Ready, OrderStatus::OutForDelivery]
        );
    }

    #[test]
    fn test_history_filter_and_snapshot() {
        let bus = UpdateBus::new(10);
        bus.publish(order("1"), update("1", OrderStatus::Received, 0));
        bus.publish(order("2"), update("2", OrderStatus::Received, 1));
        bus.publish(Channel::user("u1").unwrap(), update("1", OrderStatus::Ready, 2));

        let snapshot = bus.history(Some(&order("1")));
        bus.publish(order("1"), update("1", OrderStatus::Completed, 3));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(bus.history(Some(&order("1"))).len(), 2);
        assert_eq!(bus.history(Some(&order("2"))).len(), 1);
        assert_eq!(bus.history(None).len(), 4);
    }

    #[test]
    fn test_listeners_by_channel_and_all_in_registration_order() {
        let bus = UpdateBus::new(10);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        bus.add_listener(ListenerFilter::All, move |d| {
            log.lock().push(format!("all:{}", d.channel))
        });
        let log = Arc::clone(&seen);
        bus.add_listener(order("1").into(), move |d| {
            log.lock().push(format!("one:{}", d.channel))
        });
        let log = Arc::clone(&seen);
        bus.add_listener(order("2").into(), move |d| {
            log.lock().push(format!("two:{}", d.channel))
        });

        bus.publish(order("1"), update("1", OrderStatus::Ready, 0));
        bus.publish(order("3"), update("3", OrderStatus::Ready, 1));

        assert_eq!(
            *seen.lock(),
            vec!["all:order/1", "one:order/1", "all:order/3"]
        );
    }

    #[test]
    fn test_remove_listener() {
        let bus = UpdateBus::new(10);
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = bus.add_listener(ListenerFilter::All, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(order("1"), update("1", OrderStatus::Ready, 0));
        assert!(bus.remove_listener(id));
        assert!(!bus.remove_listener(id));
        bus.publish(order("1"), update("1", OrderStatus::Completed, 1));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_per_channel_order_preserved() {
        let bus = UpdateBus::new(5);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        bus.add_listener(order("X").into(), move |d| log.lock().push(d.update.timestamp));

        // More than the history capacity: live delivery is unaffected by eviction
        for i in 0..50 {
            bus.publish(order("X"), update("X", OrderStatus::Preparing, i));
            bus.publish(order("Y"), update("Y", OrderStatus::Preparing, i));
        }

        let expected: Vec<Timestamp> = (0..50).map(at).collect();
        assert_eq!(*seen.lock(), expected);
    }

    #[test]
    fn test_listener_may_unregister_itself() {
        let bus = Arc::new(UpdateBus::new(10));
        let seen = Arc::new(AtomicU64::new(0));
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&bus);
        let own_id = Arc::clone(&slot);
        let counter = Arc::clone(&seen);
        let id = bus.add_listener(ListenerFilter::All, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let (Some(bus), Some(id)) = (weak.upgrade(), *own_id.lock()) {
                bus.remove_listener(id);
            }
        });
        *slot.lock() = Some(id);

        bus.publish(order("1"), update("1", OrderStatus::Ready, 0));
        bus.publish(order("1"), update("1", OrderStatus::Completed, 1));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_receiver_delivers_across_threads() {
        let bus = UpdateBus::new(10);
        let (_, rx) = bus.receiver(order("1").into(), 8);

        let handle = std::thread::spawn(move || rx.recv().unwrap());
        bus.publish(order("2"), update("2", OrderStatus::Ready, 0));
        bus.publish(order("1"), update("1", OrderStatus::Ready, 1));

        let delivery = handle.join().unwrap();
        assert_eq!(delivery.channel, order("1"));
        assert_eq!(delivery.update.order_id, "1");
    }

    #[test]
    fn test_full_receiver_drops_and_dropped_receiver_unregisters() {
        let bus = UpdateBus::new(10);
        let (_, rx) = bus.receiver(ListenerFilter::All, 1);

        bus.publish(order("1"), update("1", OrderStatus::Received, 0));
        bus.publish(order("1"), update("1", OrderStatus::Ready, 1));
        assert_eq!(rx.try_iter().count(), 1);

        drop(rx);
        assert_eq!(bus.listener_count(), 1);
        bus.publish(order("1"), update("1", OrderStatus::Completed, 2));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_recent() {
        let bus = UpdateBus::new(10);
        let base = at(0);
        bus.publish(order("1"), update("1", OrderStatus::Received, 0));
        bus.publish(order("1"), update("1", OrderStatus::Preparing, 300));
        bus.publish(order("2"), update("2", OrderStatus::Ready, 600));

        let recent = bus.recent(base + Duration::seconds(300));
        assert_eq!(
            statuses(&recent),
            vec![OrderStatus::Preparing, OrderStatus::Ready]
        );
        assert!(bus.recent(base + Duration::seconds(601)).is_empty());
    }
}
