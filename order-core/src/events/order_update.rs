use crate::value_objects::{OrderStatus, Timestamp};
use serde::{Deserialize, Serialize};

/// Normalized order status notification
///
/// Timestamps are non-decreasing within one order's stream in the common
/// case, but nothing enforces it: duplicates and late arrivals are delivered
/// as they come. Consumers that must not regress a status compare
/// `timestamp` themselves (see `OrderStatusBoard` in the gateway crate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub order_id: String,
    pub status: OrderStatus,
    pub timestamp: Timestamp,
}

impl OrderUpdate {
    pub fn new(order_id: impl Into<String>, status: OrderStatus, timestamp: Timestamp) -> Self {
        OrderUpdate {
            order_id: order_id.into(),
            status,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_serializes_with_wire_field_names() {
        let ts = chrono::Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let update = OrderUpdate::new("7", OrderStatus::OutForDelivery, ts);
        let json = serde_json::to_value(&update).unwrap();

        assert_eq!(json["orderId"], "7");
        assert_eq!(json["status"], "OUT_FOR_DELIVERY");
    }
}
