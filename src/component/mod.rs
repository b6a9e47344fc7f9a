//! Component types and live component instances.
//!
//! A [`ComponentType`] is built once from a template and a list of declared
//! keys, and is immutable afterwards. Every [`Component`] created from it owns
//! its authoritative state and the views it is mounted in.
//!
//! # Module Structure
//!
//! - `builder` - validation and construction of [`ComponentType`]
//! - `instance` - [`Component`]: state, change cycles, mount / release

mod builder;
mod instance;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rustc_hash::FxHashMap;

pub use builder::ComponentTypeBuilder;
pub use instance::Component;

use crate::error::UsageError;
use crate::events::EventCallback;
use crate::schema::{DataModel, ParamSpec};
use crate::sync::Transforms;
use crate::template::TemplateBinding;
use crate::utils::suggest::close_matches;

/// Server-side method callable from the client.
pub type Method = EventCallback;

// ============================================================================
// Child slots
// ============================================================================

/// How a child slot renders its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildSlotKind {
    /// Each entry is a mounted component.
    #[default]
    Model,
    /// Each entry is a mounted component wrapped in a per-slot template.
    Template,
    /// Entries are inserted as opaque content.
    Literal,
}

impl FromStr for ChildSlotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(Self::Model),
            "template" => Ok(Self::Template),
            "literal" => Ok(Self::Literal),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ChildSlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Model => "model",
            Self::Template => "template",
            Self::Literal => "literal",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSlot {
    pub node: String,
    pub param: String,
    pub kind: ChildSlotKind,
    pub template: Option<String>,
}

/// Template attribute bound to a method, e.g. `onclick="${_click}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineCallback {
    pub node: String,
    pub attr: String,
    pub method: String,
}

impl InlineCallback {
    /// Whether this callback fires for `event`.
    pub fn fires_on(&self, event: &str) -> bool {
        self.attr == event || self.attr.strip_prefix("on") == Some(event)
    }
}

// ============================================================================
// ComponentType
// ============================================================================

/// Immutable definition shared by every instance of a component.
pub struct ComponentType {
    pub(crate) name: String,
    pub(crate) template: String,
    /// Client HTML: ids suffixed, slot placeholders removed.
    pub(crate) html: String,
    pub(crate) params: Vec<ParamSpec>,
    /// Named nodes and attribute bindings (refs are state keys only).
    pub(crate) binding: TemplateBinding,
    /// state key → slot
    pub(crate) slots: BTreeMap<String, ChildSlot>,
    pub(crate) data_model: Arc<DataModel>,
    pub(crate) dom_events: BTreeMap<String, Vec<String>>,
    pub(crate) inline_callbacks: Vec<InlineCallback>,
    pub(crate) methods: Vec<(String, Method)>,
    /// (node, event) → convention method name
    pub(crate) handlers: FxHashMap<(String, String), String>,
    pub(crate) transforms: Transforms,
    pub(crate) scripts: BTreeMap<String, Vec<String>>,
    pub(crate) data_param: Option<String>,
    pub(crate) selection_param: Option<String>,
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("nodes", &self.binding.nodes)
            .field("data_model", &self.data_model.name())
            .field("slots", &self.slots)
            .field("methods", &self.method_names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ComponentType {
    pub fn builder(name: impl Into<String>) -> ComponentTypeBuilder {
        ComponentTypeBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn nodes(&self) -> &[String] {
        &self.binding.nodes
    }

    pub fn binding(&self) -> &TemplateBinding {
        &self.binding
    }

    pub fn child_slots(&self) -> impl Iterator<Item = &ChildSlot> {
        self.slots.values()
    }

    pub fn child_slot(&self, key: &str) -> Option<&ChildSlot> {
        self.slots.get(key)
    }

    pub fn data_model(&self) -> &Arc<DataModel> {
        &self.data_model
    }

    pub fn dom_events(&self) -> &BTreeMap<String, Vec<String>> {
        &self.dom_events
    }

    pub fn inline_callbacks(&self) -> &[InlineCallback] {
        &self.inline_callbacks
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|(n, _)| n.as_str())
    }

    /// Convention method registered for `(node, event)`.
    pub fn convention_handler(&self, node: &str, event: &str) -> Option<&str> {
        self.handlers
            .get(&(node.to_string(), event.to_string()))
            .map(String::as_str)
    }

    pub fn scripts(&self) -> &BTreeMap<String, Vec<String>> {
        &self.scripts
    }

    pub fn transforms(&self) -> &Transforms {
        &self.transforms
    }

    pub fn data_param(&self) -> Option<&str> {
        self.data_param.as_deref()
    }

    pub fn selection_param(&self) -> Option<&str> {
        self.selection_param.as_deref()
    }

    pub(crate) fn unknown_param(&self, name: &str) -> UsageError {
        UsageError::UnknownParameter {
            owner: self.name.clone(),
            name: name.to_string(),
            suggestions: close_matches(name, self.params.iter().map(|p| p.name.as_str())),
        }
    }

    /// Declaration of `name`, or a usage error with suggestions.
    pub(crate) fn require_param(&self, name: &str) -> Result<&ParamSpec, UsageError> {
        self.param(name).ok_or_else(|| self.unknown_param(name))
    }
}
