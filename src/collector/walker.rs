//! Walking result sets row by row and field by field.
//!
//! Failures are contained at the narrowest level:
//! - a field that cannot be read drops the whole row (remaining fields are not read)
//! - a row that cannot be fetched is skipped
//! - only a failed `count` aborts the walk
//!
//! Each row handle is released before the next one is fetched.

use tracing::{error, trace};

use crate::event::RowValues;
use crate::provider::{ProviderError, ResultRow, ResultSet};

/// First field read that failed within a row.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFailure {
    pub field: String,
    pub error: ProviderError,
}

/// Values of one successfully walked class row.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkedRow {
    pub values: RowValues,
    /// String form of the title field, if one is configured.
    pub title: Option<String>,
}

/// One flattened namespace reading, before sanitization.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReading {
    pub name: String,
    pub value: String,
}

/// Rows collected from one result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Walked<T> {
    /// `(row index, item)` for every row that walked cleanly, in result order.
    pub rows: Vec<(usize, T)>,
    /// Rows skipped because fetching or reading them failed.
    pub dropped: usize,
}

/// Reads `fields` from `row` in order.
///
/// Stops at the first failing field; values read before it are discarded.
pub fn walk_class_row(
    row: &dyn ResultRow,
    fields: &[String],
    title_field: Option<&str>,
) -> Result<WalkedRow, FieldFailure> {
    let mut values = RowValues::new();
    let mut title = None;

    for name in fields {
        let value = read_field(row, name)?;
        if title_field == Some(name.as_str()) {
            title = Some(value.to_string_form());
        }
        values.insert(name.as_str(), value);
    }

    Ok(WalkedRow { values, title })
}

/// Reads `fields` from `row`, appending `_<value>` to `prefix` for every field
/// except `value_field`, whose value becomes the reading's value.
pub fn walk_metric_row(
    row: &dyn ResultRow,
    prefix: &str,
    fields: &[String],
    value_field: &str,
) -> Result<MetricReading, FieldFailure> {
    let mut name = prefix.to_string();
    let mut value = String::new();

    for field in fields {
        let read = read_field(row, field)?.to_string_form();
        if field == value_field {
            value = read;
        } else {
            name.push('_');
            name.push_str(&read);
        }
    }

    Ok(MetricReading { name, value })
}

/// Walks all rows of `results`, passing each one to `visit`.
///
/// `scope` names the class or namespace in log messages. Returns an error
/// only when the row count cannot be read.
pub fn walk_rows<T, F>(
    results: &dyn ResultSet,
    scope: &str,
    mut visit: F,
) -> Result<Walked<T>, ProviderError>
where
    F: FnMut(&dyn ResultRow) -> Result<T, FieldFailure>,
{
    let count = results.count()?;
    trace!("{}: {} rows", scope, count);

    let mut walked = Walked {
        rows: Vec::new(),
        dropped: 0,
    };

    for index in 0..count {
        let row = match results.row_at(index) {
            Ok(row) => row,
            Err(e) => {
                error!("{}: skipping row {}: {}", scope, index, e);
                walked.dropped += 1;
                continue;
            }
        };

        match visit(&*row) {
            Ok(item) => walked.rows.push((index, item)),
            Err(failure) => {
                error!(
                    "{}: dropping row {} at field {}: {}",
                    scope, index, failure.field, failure.error
                );
                walked.dropped += 1;
            }
        }
    }

    Ok(walked)
}

fn read_field(row: &dyn ResultRow, name: &str) -> Result<crate::provider::Value, FieldFailure> {
    row.field(name).map_err(|error| FieldFailure {
        field: name.to_string(),
        error,
    })
}
