//! # moho-service
//!
//! The packet cache service runtime. One service instance owns three
//! threads — a feeder pulling packets off the pub/sub broadcast, a drainer
//! pushing them through the sanitizer into the capped collection, and a
//! reply handler serving data and sensor queries — all sharing a single
//! collection behind one mutex.
//!
//! ## Crate structure
//!
//! - [`config`] — TOML-loadable configuration with resolved defaults
//! - [`transport`] — the capability traits the core consumes
//! - [`memory`] — in-process loopback transport backing tests and
//!   single-process wiring
//! - [`service`] — the reply dispatcher and the service runtime
//! - [`client`] — typed requestor for the cache's reply surface

pub mod client;
pub mod config;
pub mod memory;
pub mod service;
pub mod transport;

pub use client::CacheClient;
pub use config::{ServiceConfig, ServiceConfigInput, ZapLevel};
pub use memory::{loopback_replier, LoopbackBroadcast, LoopbackEndpoint};
pub use service::{CacheHandler, CacheService};
