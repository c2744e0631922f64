//! Bus messages.

use serde::Serialize;

use super::error::BusError;

/// One message on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
    /// Keep as the topic's last known value for late subscribers.
    pub retain: bool,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }

    /// A message with a JSON-encoded payload.
    pub fn json<T: Serialize + ?Sized>(topic: impl Into<String>, value: &T) -> Result<Self, BusError> {
        Ok(Self::new(topic, serde_json::to_string(value)?))
    }

    pub fn retained(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_json_message() {
        let msg = BusMessage::json("wien/abfahrten/4205", &json!({"ok": true}))
            .unwrap()
            .retained(true);

        assert_eq!(msg.topic, "wien/abfahrten/4205");
        assert_eq!(msg.payload, r#"{"ok":true}"#);
        assert!(msg.retain);
    }

    #[test]
    fn not_retained_by_default() {
        assert!(!BusMessage::new("t", "p").retain);
    }
}
