use serde::{Deserialize, Serialize};
use std::fmt;

const USER_PREFIX: &str = "user/";
const ORDER_PREFIX: &str = "order/";
const USER_TOPIC: &str = "/topic/orders/";
const ORDER_TOPIC: &str = "/topic/order/";

/// Logical topic carrying order updates
///
/// Local name is `user/{id}` or `order/{id}`; the server-side destination
/// is `/topic/orders/{id}` or `/topic/order/{id}` respectively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Channel {
    /// Every order of one user, implicit for the logged-in identity
    User(String),
    /// A single order
    Order(String),
}

impl Channel {
    pub fn user(user_id: impl Into<String>) -> Result<Self, &'static str> {
        Ok(Channel::User(validate_id(user_id.into())?))
    }

    pub fn order(order_id: impl Into<String>) -> Result<Self, &'static str> {
        Ok(Channel::Order(validate_id(order_id.into())?))
    }

    pub fn id(&self) -> &str {
        match self {
            Channel::User(id) | Channel::Order(id) => id,
        }
    }

    /// Local channel name (`user/42`, `order/7`)
    pub fn name(&self) -> String {
        match self {
            Channel::User(id) => format!("{}{}", USER_PREFIX, id),
            Channel::Order(id) => format!("{}{}", ORDER_PREFIX, id),
        }
    }

    /// Server destination the channel is subscribed on
    pub fn destination(&self) -> String {
        match self {
            Channel::User(id) => format!("{}{}", USER_TOPIC, id),
            Channel::Order(id) => format!("{}{}", ORDER_TOPIC, id),
        }
    }

    /// Map a server destination back to its channel
    pub fn from_destination(destination: &str) -> Option<Self> {
        if let Some(id) = destination.strip_prefix(USER_TOPIC) {
            Channel::user(id).ok()
        } else if let Some(id) = destination.strip_prefix(ORDER_TOPIC) {
            Channel::order(id).ok()
        } else {
            None
        }
    }
}

fn validate_id(id: String) -> Result<String, &'static str> {
    if id.is_empty() {
        return Err("Channel id cannot be empty");
    }
    if id.contains('/') || id.chars().any(char::is_whitespace) {
        return Err("Channel id must not contain '/' or whitespace");
    }
    Ok(id)
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::User(id) => write!(f, "{}{}", USER_PREFIX, id),
            Channel::Order(id) => write!(f, "{}{}", ORDER_PREFIX, id),
        }
    }
}

impl TryFrom<&str> for Channel {
    type Error = &'static str;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if let Some(id) = value.strip_prefix(USER_PREFIX) {
            Channel::user(id)
        } else if let Some(id) = value.strip_prefix(ORDER_PREFIX) {
            Channel::order(id)
        } else {
            Err("Channel name must start with user/ or order/")
        }
    }
}

impl TryFrom<String> for Channel {
    type Error = &'static str;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Channel::try_from(value.as_str())
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_destinations() {
        let user = Channel::user("u1").unwrap();
        assert_eq!(user.name(), "user/u1");
        assert_eq!(user.destination(), "/topic/orders/u1");

        let order = Channel::order("42").unwrap();
        assert_eq!(order.name(), "order/42");
        assert_eq!(order.to_string(), "order/42");
        assert_eq!(order.destination(), "/topic/order/42");
    }

    #[test]
    fn test_from_destination() {
        assert_eq!(
            Channel::from_destination("/topic/orders/u1"),
            Some(Channel::User("u1".to_string()))
        );
        assert_eq!(
            Channel::from_destination("/topic/order/42"),
            Some(Channel::Order("42".to_string()))
        );
        assert_eq!(Channel::from_destination("/topic/vendor/9"), None);
        assert_eq!(Channel::from_destination("/topic/order/"), None);
    }

    #[test]
    fn test_parse_name() {
        assert_eq!(
            Channel::try_from("order/42"),
            Ok(Channel::Order("42".to_string()))
        );
        assert!(Channel::try_from("orders/42").is_err());
        assert!(Channel::try_from("order/").is_err());
        assert!(Channel::try_from("order/4/2").is_err());
    }
}
