//! Reconcilers that apply role binding notifications.
//!
//! [`ConsoleReconciler`] mirrors devOps role bindings into the security
//! console and keeps a recovery record of each binding so that deletions can
//! be reconciled after the object is gone. [`LogReconciler`] only logs, and
//! handles every kind that is not mirrored.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod console;
mod log;
mod record;
mod registry;

#[cfg(test)]
mod tests;

pub use self::{
    console::ConsoleReconciler,
    log::LogReconciler,
    registry::{ConsoleSettings, ReconcilerName, Registry, UnknownReconciler},
};
