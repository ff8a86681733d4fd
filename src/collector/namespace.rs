//! Namespace aggregation: rows flattened into individually named metrics.
//!
//! Each row becomes one metric named
//! `<namespace>_<class>_<name field 1>_<name field 2>...` with spaces and `#`
//! removed, whose value is the string form of the value field. One counter per
//! CPU core thus turns into one metric per core.

use tracing::info;

use super::queries::build_namespace_query;
use super::walker::{walk_metric_row, walk_rows};
use crate::config::NamespaceQuery;
use crate::provider::{ProviderError, Session};

/// Result of collecting one namespace entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceCollection {
    /// `(sanitized name, value)` in row order. Names may repeat.
    pub metrics: Vec<(String, String)>,
    /// Rows skipped because fetching or reading them failed.
    pub dropped: usize,
}

/// Removes every space and `#` from a synthesized metric name.
pub fn sanitize_metric_name(raw: &str) -> String {
    raw.chars().filter(|c| *c != ' ' && *c != '#').collect()
}

/// Opens the entry's namespace from `root`, queries it and flattens its rows.
///
/// The namespace session is released before returning, whatever the outcome.
pub fn collect_namespace(
    root: &dyn Session,
    ns: &NamespaceQuery,
) -> Result<NamespaceCollection, ProviderError> {
    let session = root.connect_namespace(&ns.path())?;

    let fields = ns.projected_fields();
    let query = build_namespace_query(ns);
    info!("query: {}", query);

    let results = session.execute(&query)?;
    let prefix = format!("{}_{}", ns.namespace, ns.class);
    let scope = format!("namespace `{}` class `{}`", ns.namespace, ns.class);

    let walked = walk_rows(&*results, &scope, |row| {
        walk_metric_row(row, &prefix, &fields, &ns.value_field)
    })?;

    let metrics = walked
        .rows
        .into_iter()
        .map(|(_, reading)| (sanitize_metric_name(&reading.name), reading.value))
        .collect();

    Ok(NamespaceCollection {
        metrics,
        dropped: walked.dropped,
    })
}
