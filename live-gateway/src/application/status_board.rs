use order_core::{OrderStatus, OrderUpdate, Timestamp};
use std::collections::HashMap;

/// Result of applying a pushed update to the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Older than the status already known for the order; ignored
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Known {
    status: OrderStatus,
    timestamp: Timestamp,
}

/// Latest known status per order, reconciling fetched and pushed state
///
/// The bus delivers duplicates and late arrivals as they come. The board
/// keeps the newest status by timestamp so a `PREPARING` that arrives after
/// a known `READY` does not regress the view. It knows nothing about which
/// transitions are legal.
#[derive(Debug, Default)]
pub struct OrderStatusBoard {
    orders: HashMap<String, Known>,
}

impl OrderStatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record state fetched out of band (e.g. a REST order list)
    pub fn seed(&mut self, order_id: impl Into<String>, status: OrderStatus, timestamp: Timestamp) -> ApplyOutcome {
        self.merge(order_id.into(), Known { status, timestamp })
    }

    /// Apply a pushed update unless it is older than what is known
    pub fn apply(&mut self, update: &OrderUpdate) -> ApplyOutcome {
        self.merge(
            update.order_id.clone(),
            Known {
                status: update.status,
                timestamp: update.timestamp,
            },
        )
    }

    fn merge(&mut self, order_id: String, incoming: Known) -> ApplyOutcome {
        match self.orders.get_mut(&order_id) {
            Some(known) if incoming.timestamp < known.timestamp => {
                tracing::debug!(
                    order_id = %order_id,
                    known = %known.status,
                    incoming = %incoming.status,
                    "Ignoring stale status"
                );
                ApplyOutcome::Stale
            }
            Some(known) => {
                *known = incoming;
                ApplyOutcome::Applied
            }
            None => {
                self.orders.insert(order_id, incoming);
                ApplyOutcome::Applied
            }
        }
    }

    pub fn status(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders.get(order_id).map(|known| known.status)
    }

    /// Orders not yet completed or cancelled, sorted by id
    pub fn active_orders(&self) -> Vec<(String, OrderStatus)> {
        let mut active: Vec<(String, OrderStatus)> = self
            .orders
            .iter()
            .filter(|(_, known)| !known.status.is_terminal())
            .map(|(id, known)| (id.clone(), known.status))
            .collect();
        active.sort_by(|a, b| a.0.cmp(&b.0));
        active
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_714_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_late_update_does_not_regress() {
        let mut board = OrderStatusBoard::new();
        board.seed("7", OrderStatus::Ready, at(10));

        let late = OrderUpdate::new("7", OrderStatus::Preparing, at(5));
        assert_eq!(board.apply(&late), ApplyOutcome::Stale);
        assert_eq!(board.status("7"), Some(OrderStatus::Ready));

        let next = OrderUpdate::new("7", OrderStatus::Completed, at(20));
        assert_eq!(board.apply(&next), ApplyOutcome::Applied);
        assert_eq!(board.status("7"), Some(OrderStatus::Completed));
    }

    #[test]
    fn test_equal_timestamp_latest_arrival_wins() {
        let mut board = OrderStatusBoard::new();
        board.apply(&OrderUpdate::new("1", OrderStatus::Preparing, at(0)));
        let outcome = board.apply(&OrderUpdate::new("1", OrderStatus::Ready, at(0)));

        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(board.status("1"), Some(OrderStatus::Ready));
    }

    #[test]
    fn test_active_orders_excludes_terminal() {
        let mut board = OrderStatusBoard::new();
        board.seed("3", OrderStatus::Pending, at(0));
        board.seed("1", OrderStatus::OutForDelivery, at(0));
        board.seed("2", OrderStatus::Cancelled, at(0));
        board.seed("4", OrderStatus::Completed, at(0));

        assert_eq!(
            board.active_orders(),
            vec![
                ("1".to_string(), OrderStatus::OutForDelivery),
                ("3".to_string(), OrderStatus::Pending),
            ]
        );
        assert_eq!(board.len(), 4);
        assert_eq!(board.status("9"), None);
    }
}
