//! The wire protocol: JSON arrays in, JSON arrays out.

use nostr_core::{Event, Filter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded frame from the client: `["REQ", sub_id, filter, ...]`,
/// `["EVENT", event]`, or `["CLOSE", sub_id]`.
#[derive(Debug, Clone)]
pub enum ClientFrame {
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    Event(Event),
    Close {
        subscription_id: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl ClientFrame {
    /// A REQ may carry several filters (clients OR them together); this
    /// parses the whole raw frame in one pass.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| FrameError::Malformed(format!("invalid json: {e}")))?;
        let items = value
            .as_array()
            .ok_or_else(|| FrameError::Malformed("frame is not a json array".to_string()))?;
        let tag = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| FrameError::Malformed("missing frame tag".to_string()))?;

        match tag {
            "REQ" => {
                let subscription_id = items
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| FrameError::Malformed("REQ missing subscription id".to_string()))?
                    .to_string();
                if items.len() < 3 {
                    return Err(FrameError::Malformed("REQ missing filter".to_string()));
                }
                let filters = items[2..]
                    .iter()
                    .map(|v| {
                        serde_json::from_value(v.clone())
                            .map_err(|e| FrameError::Malformed(format!("invalid filter: {e}")))
                    })
                    .collect::<Result<Vec<Filter>, _>>()?;
                Ok(ClientFrame::Req {
                    subscription_id,
                    filters,
                })
            }
            "EVENT" => {
                let event_value = items
                    .get(1)
                    .ok_or_else(|| FrameError::Malformed("EVENT missing payload".to_string()))?;
                let event: Event = serde_json::from_value(event_value.clone())
                    .map_err(|e| FrameError::Malformed(format!("invalid event: {e}")))?;
                Ok(ClientFrame::Event(event))
            }
            "CLOSE" => {
                let subscription_id = items
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| FrameError::Malformed("CLOSE missing subscription id".to_string()))?
                    .to_string();
                Ok(ClientFrame::Close { subscription_id })
            }
            other => Err(FrameError::Malformed(format!("unknown frame tag: {other}"))),
        }
    }
}

/// A frame sent to the client: `["EVENT", sub_id, event]`,
/// `["OK", id, accepted, message]`, `["EOSE", sub_id]`, `["NOTICE", text]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Event(String, String, Event),
    Ok(String, String, bool, String),
    Eose(String, String),
    Notice(String, String),
}

impl ServerFrame {
    pub fn event(subscription_id: impl Into<String>, event: Event) -> Self {
        ServerFrame::Event("EVENT".to_string(), subscription_id.into(), event)
    }

    pub fn ok(event_id: impl Into<String>, accepted: bool, message: impl Into<String>) -> Self {
        ServerFrame::Ok("OK".to_string(), event_id.into(), accepted, message.into())
    }

    pub fn eose(subscription_id: impl Into<String>) -> Self {
        ServerFrame::Eose("EOSE".to_string(), subscription_id.into())
    }

    pub fn notice(text: impl Into<String>) -> Self {
        ServerFrame::Notice("NOTICE".to_string(), text.into())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            ServerFrame::Event(tag, sub_id, event) => {
                serde_json::to_string(&(tag, sub_id, event))
            }
            ServerFrame::Ok(tag, id, accepted, message) => {
                serde_json::to_string(&(tag, id, accepted, message))
            }
            ServerFrame::Eose(tag, sub_id) => serde_json::to_string(&(tag, sub_id)),
            ServerFrame::Notice(tag, text) => serde_json::to_string(&(tag, text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_close_frame() {
        let frame = ClientFrame::parse(r#"["CLOSE","sub1"]"#).unwrap();
        assert!(matches!(frame, ClientFrame::Close { subscription_id } if subscription_id == "sub1"));
    }

    #[test]
    fn parses_req_with_multiple_filters() {
        let frame = ClientFrame::parse(r#"["REQ","sub1",{"kinds":[1]},{"kinds":[2]}]"#).unwrap();
        match frame {
            ClientFrame::Req { filters, .. } => assert_eq!(filters.len(), 2),
            _ => panic!("expected REQ"),
        }
    }

    #[test]
    fn rejects_non_array_frame() {
        assert!(ClientFrame::parse(r#"{"not":"an array"}"#).is_err());
    }

    #[test]
    fn rejects_unknown_tag() {
        assert!(ClientFrame::parse(r#"["BOGUS","x"]"#).is_err());
    }

    #[test]
    fn ok_frame_serializes_as_four_element_array() {
        let json = ServerFrame::ok("e1", true, "").to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, serde_json::json!(["OK", "e1", true, ""]));
    }

    #[test]
    fn eose_frame_serializes_as_two_element_array() {
        let json = ServerFrame::eose("sub1").to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, serde_json::json!(["EOSE", "sub1"]));
    }
}
