//! Query builders for class and namespace entries.
//!
//! Field, class and filter text is taken verbatim from the configuration;
//! nothing is quoted or validated.

use crate::config::{ClassQuery, NamespaceQuery};

/// Builds `SELECT <fields> FROM <class>[ WHERE <clause>]`.
pub fn build_select(fields: &[String], class: &str, where_clause: Option<&str>) -> String {
    let mut query = format!("SELECT {} FROM {}", fields.join(","), class);
    if let Some(clause) = where_clause {
        query.push_str(" WHERE ");
        query.push_str(clause);
    }
    query
}

/// Builds the query for a class entry.
pub fn build_class_query(class: &ClassQuery) -> String {
    build_select(&class.fields, &class.class, class.where_clause.as_deref())
}

/// Builds the query for a namespace entry; the value field is always projected last.
pub fn build_namespace_query(ns: &NamespaceQuery) -> String {
    build_select(&ns.projected_fields(), &ns.class, ns.where_clause.as_deref())
}
