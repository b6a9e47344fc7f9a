//! Session driver.
//!
//! A session document only makes progress when something drains its task
//! queue. [`SessionActor`] owns that loop for one session:
//!
//! ```text
//! mpsc::Receiver<SessionMsg> ──► SessionActor ──► Component::handle_message
//!                                      │
//!                                      └─(sleep until next deadline)─► Document::run_pending
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types accepted by the actor
//! - `session` - The actor event loop

pub mod messages;
pub mod session;

pub use messages::SessionMsg;
pub use session::SessionActor;
