//! Process wiring for the role binding mirror.
//!
//! Each enabled resource kind gets a watch [`Cache`] that turns watch events
//! into queued notifications, and a [`Worker`] that hands them to a
//! [`Dispatcher`] once the cache has synced.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod args;
mod cache;
mod config;
mod dispatch;
mod metrics;
mod worker;

pub use self::{
    args::Args,
    cache::Cache,
    config::{Config, ConfigError, Resources},
    dispatch::Dispatcher,
    metrics::ReconcileMetrics,
    worker::Worker,
};
