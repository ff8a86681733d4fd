//! wmibeat - polls an instrumentation provider and publishes one event per tick.
//!
//! This library provides:
//! - `provider` - provider session/result/row contract, scalar values, in-memory provider
//! - `collector` - query building, result walking, class and namespace aggregation
//! - `event` - the published event model
//! - `sink` - event sinks (JSON lines, memory)
//! - `poller` - the fixed-period poll loop
//! - `config` - YAML configuration
//! - `util` - helper utilities

pub mod collector;
pub mod config;
pub mod event;
pub mod poller;
pub mod provider;
pub mod sink;
pub mod util;
