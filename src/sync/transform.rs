//! Rename and value-transform table between state keys and client properties.
//!
//! Outbound: `key → rename → property`, value passed through the key's
//! outbound transform. A key renamed to `None` is never exposed to clients.
//! Inbound: `property → inverse rename → key`, value passed through the
//! key's inbound transform.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::value::{Changes, Value};

pub type ValueTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

#[derive(Clone, Default)]
pub struct Transforms {
    rename: FxHashMap<String, Option<String>>,
    outbound: FxHashMap<String, ValueTransform>,
    inbound: FxHashMap<String, ValueTransform>,
}

impl fmt::Debug for Transforms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transforms")
            .field("rename", &self.rename)
            .field("outbound", &self.outbound.keys().collect::<Vec<_>>())
            .field("inbound", &self.inbound.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Transforms {
    pub fn rename(&mut self, key: impl Into<String>, property: Option<String>) {
        self.rename.insert(key.into(), property);
    }

    pub fn outbound(&mut self, key: impl Into<String>, f: ValueTransform) {
        self.outbound.insert(key.into(), f);
    }

    pub fn inbound(&mut self, key: impl Into<String>, f: ValueTransform) {
        self.inbound.insert(key.into(), f);
    }

    /// Keys mentioned by any rename or transform entry.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rename
            .keys()
            .chain(self.outbound.keys())
            .chain(self.inbound.keys())
            .map(String::as_str)
    }

    /// Client property for `key`, or `None` when the key is dropped.
    pub fn property_name<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        match self.rename.get(key) {
            Some(Some(renamed)) => Some(renamed),
            Some(None) => None,
            None => Some(key),
        }
    }

    #[inline]
    pub fn is_exposed(&self, key: &str) -> bool {
        self.property_name(key).is_some()
    }

    /// State key for a client property.
    pub fn param_name<'a>(&'a self, property: &'a str) -> &'a str {
        self.rename
            .iter()
            .find(|(_, renamed)| renamed.as_deref() == Some(property))
            .map_or(property, |(key, _)| key.as_str())
    }

    /// Map key/value pairs to an outbound property message.
    pub fn to_properties<'a, I>(&self, changes: I) -> Changes
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let mut msg = Changes::new();
        for (key, value) in changes {
            let Some(property) = self.property_name(key) else {
                continue;
            };
            let value = match self.outbound.get(key) {
                Some(f) => f(value.clone()),
                None => value.clone(),
            };
            msg.insert(property.to_string(), value);
        }
        msg
    }

    /// Map an inbound property message back to state keys.
    pub fn to_params(&self, properties: Changes) -> Changes {
        let mut params = Changes::new();
        for (property, value) in properties {
            let key = self.param_name(&property).to_string();
            let value = match self.inbound.get(&key) {
                Some(f) => f(value),
                None => value,
            };
            params.insert(key, value);
        }
        params
    }
}
