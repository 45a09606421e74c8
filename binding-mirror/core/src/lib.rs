//! Core types for mirroring cluster role bindings into an external security
//! console.
//!
//! Watch events are turned into [`Notification`]s, queued, and handed to a
//! [`Reconciler`]. Role bindings are reduced to a [`ParsedGrant`]: the
//! distinguished-name groups a binding grants, and the common names that key
//! the console's collections and groups.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod grant;
mod notification;
mod reconciler;

pub use self::{
    grant::{Action, Classification, MembershipDiff, ParsedGrant},
    notification::Notification,
    reconciler::Reconciler,
};
