use chrono::{DateTime, TimeZone, Utc};
use order_core::{Channel, OrderStatus, OrderUpdate, Timestamp};
use serde_json::Value;

use crate::domain::{FrameNormalizer, InboundFrame, NormalizedUpdate, RejectReason};

/// Normalizer for the backend's order status payload
///
/// Payload format:
/// ```json
/// {"orderId": "42", "status": "PREPARING", "timestamp": 1714000000000}
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderUpdateNormalizer;

impl OrderUpdateNormalizer {
    pub fn new() -> Self {
        OrderUpdateNormalizer
    }
}

impl FrameNormalizer for OrderUpdateNormalizer {
    fn normalize(
        &self,
        frame: &InboundFrame,
        received_at: Timestamp,
    ) -> Result<NormalizedUpdate, RejectReason> {
        let channel = Channel::from_destination(&frame.destination)
            .ok_or_else(|| RejectReason::UnroutableDestination(frame.destination.clone()))?;

        let payload: Value = serde_json::from_str(&frame.body)
            .map_err(|e| RejectReason::InvalidJson(e.to_string()))?;

        let order_id = match payload.get("orderId") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => return Err(RejectReason::MissingOrderId),
        };

        let status = match payload.get("status") {
            Some(Value::String(raw)) => OrderStatus::try_from(raw.as_str())
                .map_err(|_| RejectReason::UnknownStatus(raw.clone()))?,
            Some(Value::Null) | None => return Err(RejectReason::MissingStatus),
            Some(other) => return Err(RejectReason::UnknownStatus(other.to_string())),
        };

        let timestamp = match payload.get("timestamp") {
            Some(Value::Null) | None => received_at,
            Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
                tracing::debug!(
                    order_id = %order_id,
                    timestamp = %raw,
                    "Unparseable timestamp, using receipt time"
                );
                received_at
            }),
        };

        Ok(NormalizedUpdate {
            channel,
            update: OrderUpdate::new(order_id, status, timestamp),
        })
    }
}

/// Epoch milliseconds or an RFC 3339 string
fn parse_timestamp(raw: &Value) -> Option<Timestamp> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}
