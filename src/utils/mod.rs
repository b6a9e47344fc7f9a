//! Utility modules shared by the template binder and the sync engine.

pub mod html;
pub mod suggest;
