use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle status as pushed by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order placed, payment not yet confirmed
    Pending,
    /// Vendor has received the order
    Received,
    /// Vendor is preparing the order
    Preparing,
    /// Ready for pickup
    Ready,
    /// Handed to a courier
    OutForDelivery,
    /// Picked up or delivered
    Completed,
    /// Cancelled by the student or vendor
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Received,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::OutForDelivery,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Received => "RECEIVED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Returns true if no further updates are expected for the order
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = &'static str;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let upper = value.trim().to_uppercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == upper)
            .ok_or("Invalid order status")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(OrderStatus::try_from("READY"), Ok(OrderStatus::Ready));
        assert_eq!(OrderStatus::try_from("preparing"), Ok(OrderStatus::Preparing));
        assert_eq!(
            OrderStatus::try_from("Out_For_Delivery"),
            Ok(OrderStatus::OutForDelivery)
        );
        assert!(OrderStatus::try_from("shipped").is_err());
        assert!(OrderStatus::try_from("").is_err());
    }

    #[test]
    fn test_display_matches_wire_name() {
        for status in OrderStatus::ALL {
            assert_eq!(OrderStatus::try_from(status.to_string().as_str()), Ok(status));
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Ready.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }
}
