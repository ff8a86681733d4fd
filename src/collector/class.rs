//! Class aggregation: all rows of one class folded into a [`ClassValue`].

use std::collections::BTreeMap;

use tracing::info;

use super::queries::build_class_query;
use super::walker::{Walked, WalkedRow, walk_class_row, walk_rows};
use crate::config::ClassQuery;
use crate::event::ClassValue;
use crate::provider::{ProviderError, Session};

/// Result of collecting one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassCollection {
    pub value: ClassValue,
    /// Rows skipped because fetching or reading them failed.
    pub dropped: usize,
}

/// Queries `class` on `session` and aggregates its rows.
///
/// Returns an error when the query cannot be executed or its row count read;
/// the caller leaves the class out of the event in that case.
pub fn collect_class(
    session: &dyn Session,
    class: &ClassQuery,
) -> Result<ClassCollection, ProviderError> {
    let query = build_class_query(class);
    info!("query: {}", query);

    let results = session.execute(&query)?;
    let scope = format!("class `{}`", class.class);
    let title_field = class.title_field.as_deref();

    let walked = walk_rows(&*results, &scope, |row| {
        walk_class_row(row, &class.fields, title_field)
    })?;

    Ok(ClassCollection {
        dropped: walked.dropped,
        value: aggregate_rows(walked, title_field.is_some()),
    })
}

/// Folds walked rows into a keyed map (when titled) or an ordered list.
///
/// Keyed rows use their title, or their row index when the title is empty.
/// A later row with the same key replaces the earlier one.
pub fn aggregate_rows(walked: Walked<WalkedRow>, titled: bool) -> ClassValue {
    if !titled {
        return ClassValue::Rows(walked.rows.into_iter().map(|(_, row)| row.values).collect());
    }

    let mut keyed = BTreeMap::new();
    for (index, row) in walked.rows {
        let key = match row.title {
            Some(title) if !title.is_empty() => title,
            _ => index.to_string(),
        };
        keyed.insert(key, row.values);
    }
    ClassValue::Keyed(keyed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RowValues;
    use crate::provider::mock::mock_row;
    use crate::provider::{DEFAULT_NAMESPACE, MockProvider, Provider, Value};

    fn fan_provider(rows: Vec<crate::provider::mock::MockRow>) -> MockProvider {
        MockProvider::new().with_rows(DEFAULT_NAMESPACE, "Fan", rows)
    }

    fn fan(name: &str, rpm: i64) -> crate::provider::mock::MockRow {
        mock_row(&[("Name", Value::from(name)), ("RPM", Value::from(rpm))])
    }

    fn row_values(name: &str, rpm: i64) -> RowValues {
        vec![("Name", Value::from(name)), ("RPM", Value::from(rpm))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_titled_class_is_keyed_by_title() {
        let provider = fan_provider(vec![fan("Fan1", 1200), fan("Fan2", 900)]);
        let session = provider.connect().unwrap();
        let class = ClassQuery::new("Fan", &["Name", "RPM"]).with_title("Name");

        let collection = collect_class(&*session, &class).unwrap();
        assert_eq!(collection.dropped, 0);
        assert_eq!(
            collection.value,
            ClassValue::Keyed(BTreeMap::from([
                ("Fan1".to_string(), row_values("Fan1", 1200)),
                ("Fan2".to_string(), row_values("Fan2", 900)),
            ]))
        );
    }

    #[test]
    fn test_duplicate_titles_keep_last_row() {
        let provider = fan_provider(vec![fan("Fan", 1), fan("Other", 2), fan("Fan", 3)]);
        let session = provider.connect().unwrap();
        let class = ClassQuery::new("Fan", &["Name", "RPM"]).with_title("Name");

        let collection = collect_class(&*session, &class).unwrap();
        let ClassValue::Keyed(keyed) = collection.value else {
            panic!("expected keyed value");
        };
        assert_eq!(keyed.len(), 2);
        assert_eq!(keyed["Fan"], row_values("Fan", 3));
    }

    #[test]
    fn test_empty_title_uses_row_index() {
        let provider = fan_provider(vec![
            fan("A", 1),
            fan("B", 2),
            fan("C", 3),
            fan("", 4),
            mock_row(&[("Name", Value::Null), ("RPM", Value::from(5))]),
        ]);
        let session = provider.connect().unwrap();
        let class = ClassQuery::new("Fan", &["Name", "RPM"]).with_title("Name");

        let ClassValue::Keyed(keyed) = collect_class(&*session, &class).unwrap().value else {
            panic!("expected keyed value");
        };
        assert_eq!(keyed["3"], row_values("", 4));
        assert_eq!(keyed["4"].get("RPM"), Some(&Value::from(5)));
        assert!(keyed.contains_key("A"));
    }

    #[test]
    fn test_untitled_class_is_ordered_list() {
        let provider = fan_provider(vec![fan("Fan1", 1200), fan("Fan2", 900), fan("Fan3", 600)])
            .fail_field("Fan", 1, "RPM");
        let session = provider.connect().unwrap();
        let class = ClassQuery::new("Fan", &["Name", "RPM"]);

        let collection = collect_class(&*session, &class).unwrap();
        assert_eq!(collection.dropped, 1);
        assert_eq!(
            collection.value,
            ClassValue::Rows(vec![row_values("Fan1", 1200), row_values("Fan3", 600)])
        );
    }

    #[test]
    fn test_failed_row_contributes_nothing() {
        let provider = fan_provider(vec![fan("Fan1", 1200), fan("Fan2", 900)])
            .fail_field("Fan", 0, "RPM")
            .fail_row("Fan", 1);
        let session = provider.connect().unwrap();
        let class = ClassQuery::new("Fan", &["Name", "RPM"]).with_title("Name");

        let collection = collect_class(&*session, &class).unwrap();
        assert_eq!(collection.dropped, 2);
        assert!(collection.value.is_empty());
    }

    #[test]
    fn test_query_failures_skip_class() {
        let provider = fan_provider(vec![fan("Fan1", 1200)]).fail_execute("Fan");
        let session = provider.connect().unwrap();
        let class = ClassQuery::new("Fan", &["Name"]);
        assert!(matches!(
            collect_class(&*session, &class),
            Err(ProviderError::Query { .. })
        ));

        let provider = fan_provider(vec![fan("Fan1", 1200)]).fail_count("Fan");
        let session = provider.connect().unwrap();
        assert!(matches!(
            collect_class(&*session, &class),
            Err(ProviderError::Count(_))
        ));
    }
}
