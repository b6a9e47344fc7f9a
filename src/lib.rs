//! htmlsync - bidirectional data binding between server-side components and
//! browser DOM templates.
//!
//! # Module Structure
//!
//! - `template` - template binder: named nodes, attribute bindings, child slots
//! - `schema` - declared keys and the client data model
//! - `component` - component types and live instances
//! - `sync` - change propagation, echo suppression, watchers and links
//! - `children` - child reconciliation for model / template / literal slots
//! - `events` - DOM-event dispatch
//! - `data` - stream / patch / select on column-oriented data
//! - `document` - mounted roots, change cycles and the task queue
//! - `actor` - tokio actor driving one session document
//! - `channel` - wire protocol and the transport seam

#[macro_use]
pub mod logger;

pub mod actor;
pub mod channel;
pub mod children;
pub mod component;
pub mod config;
pub mod data;
pub mod document;
pub mod error;
pub mod events;
pub mod ids;
pub mod schema;
pub mod sync;
pub mod template;
pub mod utils;
pub mod value;
pub mod view;

pub use channel::{Channel, ChannelKind, MemoryChannel, OutboundMessage};
pub use children::{ChildList, Renderable};
pub use component::{Component, ComponentType};
pub use data::{Patchable, Selectable, Streamable};
pub use document::Document;
pub use error::{Result, SyncError};
pub use events::DomEvent;
pub use schema::{ParamKind, ParamSpec};
pub use sync::{ChangeEvent, Link, StateValue, SyncContext};
