//! Wire protocol between the engine and client views.
//!
//! # Message Types
//!
//! Outbound (server → client):
//! - `render`: full view definition sent once per mount
//! - `update`: changed data-container properties
//! - `children`: per-node child lists after reconciliation
//! - `events`: DOM-event subscription map
//! - `stream` / `patch`: incremental column updates
//!
//! Inbound (client → server):
//! - `change`: a single data-container property edited on the client
//! - `dom_event`: `{node, data: {type, ...payload}}`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::children::{ChildEntry, ChildHandle};
use crate::events::{DomEvent, EventMap};
use crate::template::AttrBinding;
use crate::value::{Changes, Value};

/// Full view definition sent when a view is mounted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderMessage {
    pub view: ChildHandle,
    pub data_model: String,
    pub attrs: BTreeMap<String, Vec<AttrBinding>>,
    /// node → [(attribute, method)]
    pub callbacks: BTreeMap<String, Vec<(String, String)>>,
    pub child_templates: BTreeMap<String, Option<String>>,
    pub child_names: BTreeMap<String, Vec<String>>,
    pub data: Changes,
    pub events: EventMap,
    /// Escaped client template.
    pub html: String,
    pub nodes: Vec<String>,
    pub scripts: BTreeMap<String, Vec<String>>,
    pub children: BTreeMap<String, Vec<ChildEntry>>,
}

/// Message sent from the engine to one client view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Render(Box<RenderMessage>),

    /// Property → new value for the view's data container.
    Update { properties: Changes },

    /// Complete node → child list map.
    Children {
        children: BTreeMap<String, Vec<ChildEntry>>,
        #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
        child_names: BTreeMap<String, Vec<String>>,
    },

    /// DOM-event subscriptions: node → event → declared.
    Events { events: EventMap },

    /// Rows appended to a column-oriented property.
    Stream {
        property: String,
        data: Changes,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        rollover: Option<usize>,
    },

    /// In-place edits of a column-oriented property.
    Patch { property: String, patches: Changes },
}

impl OutboundMessage {
    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"update","properties":{}}"#.to_string())
    }

    /// Parse from JSON string
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }

    /// Properties of an `update` message.
    pub fn properties(&self) -> Option<&Changes> {
        match self {
            Self::Update { properties } => Some(properties),
            _ => None,
        }
    }
}

/// Message received from one client view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Change {
        attr: String,
        #[serde(default)]
        old: Value,
        new: Value,
    },
    DomEvent(DomEvent),
}

impl InboundMessage {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_serialization() {
        let mut properties = Changes::new();
        properties.insert("value".into(), json!(3));
        let msg = OutboundMessage::Update { properties };

        let json = msg.to_json();
        assert!(json.contains(r#""type":"update""#));
        assert!(json.contains(r#""value":3"#));
        assert_eq!(OutboundMessage::from_json(&json), Some(msg));
    }

    #[test]
    fn test_stream_omits_missing_rollover() {
        let msg = OutboundMessage::Stream {
            property: "data".into(),
            data: Changes::new(),
            rollover: None,
        };
        assert!(!msg.to_json().contains("rollover"));
    }

    #[test]
    fn test_parse_change() {
        let msg = InboundMessage::from_json(r#"{"type":"change","attr":"value","new":5}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Change {
                attr: "value".into(),
                old: Value::Null,
                new: json!(5)
            }
        );
    }

    #[test]
    fn test_parse_dom_event() {
        let msg = InboundMessage::from_json(
            r#"{"type":"dom_event","node":"button","data":{"type":"click","x":10}}"#,
        )
        .unwrap();
        let InboundMessage::DomEvent(event) = msg else {
            panic!("expected dom event");
        };
        assert_eq!(event.node, "button");
        assert_eq!(event.event_type(), "click");
        assert_eq!(event.data.payload["x"], json!(10));
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        assert!(InboundMessage::from_json(r#"{"type":"bogus"}"#).is_err());
    }
}
