//! Poll-and-aggregate pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Collector                           │
//! │  ┌───────────────────────┐   ┌────────────────────────────┐  │
//! │  │   collect_class       │   │   collect_namespace        │  │
//! │  │   - build_class_query │   │   - connect_namespace      │  │
//! │  │   - title / index key │   │   - build_namespace_query  │  │
//! │  │   - ordered list      │   │   - sanitize_metric_name   │  │
//! │  └───────────┬───────────┘   └─────────────┬──────────────┘  │
//! │              └──────────────┬──────────────┘                 │
//! │                      ┌──────▼──────┐                         │
//! │                      │  walk_rows  │ (row/field isolation)   │
//! │                      └──────┬──────┘                         │
//! └─────────────────────────────┼────────────────────────────────┘
//!                               │
//!                      ┌────────▼────────┐
//!                      │ Session (trait) │
//!                      └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use wmibeat::collector::Collector;
//! use wmibeat::config::{BeatConfig, ClassQuery};
//! use wmibeat::provider::{MockProvider, Provider, DEFAULT_NAMESPACE};
//! use wmibeat::provider::mock::mock_row;
//!
//! let provider = MockProvider::new().with_rows(
//!     DEFAULT_NAMESPACE,
//!     "Win32_Fan",
//!     vec![mock_row(&[("Name", "Fan1")])],
//! );
//! let config = BeatConfig {
//!     classes: vec![ClassQuery::new("Win32_Fan", &["Name"]).with_title("Name")],
//!     ..BeatConfig::default()
//! };
//!
//! let collector = Collector::new(&config);
//! let session = provider.connect().unwrap();
//! let (wmi, report) = collector.poll(&*session);
//! assert!(wmi.contains_key("Win32_Fan"));
//! assert_eq!(report.classes, 1);
//! ```

pub mod class;
#[allow(clippy::module_inception)]
mod collector;
pub mod namespace;
pub mod queries;
pub mod walker;

pub use class::{ClassCollection, collect_class};
pub use collector::{Collector, TickReport};
pub use namespace::{NamespaceCollection, collect_namespace, sanitize_metric_name};
pub use queries::{build_class_query, build_namespace_query};
