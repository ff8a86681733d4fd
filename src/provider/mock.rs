//! In-memory instrumentation provider for testing and fixture-driven runs.
//!
//! `MockProvider` stores a tree of namespace path -> class -> rows and answers
//! the same `SELECT <fields> FROM <class> [WHERE ...]` queries the collector
//! builds. Only projected fields are readable from a row, like on the real
//! provider. Individual calls can be made to fail, and a [`HandleTracker`]
//! records every session, result set and row that is opened or released.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Deserialize;

use super::{DEFAULT_NAMESPACE, Provider, ProviderError, ResultRow, ResultSet, Session, Value};

/// Field values of one stored row.
pub type MockRow = HashMap<String, Value>;

const INJECTED: &str = "injected failure";

/// Builds a [`MockRow`] from `(field, value)` pairs.
pub fn mock_row<V: Into<Value> + Clone>(fields: &[(&str, V)]) -> MockRow {
    fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone().into()))
        .collect()
}

/// Counts provider handles that are currently open.
///
/// Cloned trackers share the same counters.
#[derive(Debug, Clone, Default)]
pub struct HandleTracker {
    live: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl HandleTracker {
    /// Number of handles acquired and not yet released.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Total number of handles acquired so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> Handle {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Handle {
            tracker: self.clone(),
        }
    }
}

/// Releases its slot in the tracker when dropped.
struct Handle {
    tracker: HandleTracker,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.tracker.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
struct Faults {
    connect: bool,
    namespaces: HashSet<String>,
    execute: HashSet<String>,
    count: HashSet<String>,
    rows: HashSet<(String, usize)>,
    fields: HashSet<(String, usize, String)>,
}

#[derive(Debug, Clone, Default)]
struct MockData {
    namespaces: HashMap<String, HashMap<String, Vec<MockRow>>>,
    faults: Faults,
}

/// On-disk fixture layout: `{"namespaces": {"root\\cimv2": {"Win32_Fan": [{...}]}}}`.
#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    namespaces: HashMap<String, HashMap<String, Vec<MockRow>>>,
}

/// In-memory provider.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    data: Arc<MockData>,
    tracker: HandleTracker,
    executed: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    /// Creates an empty provider with no namespaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads provider contents from a JSON fixture file.
    pub fn from_fixture(path: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_fixture_str(&content).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid fixture {:?}: {}", path, e),
            )
        })
    }

    /// Parses provider contents from JSON fixture text.
    pub fn from_fixture_str(content: &str) -> serde_json::Result<Self> {
        let fixture: Fixture = serde_json::from_str(content)?;
        Ok(Self {
            data: Arc::new(MockData {
                namespaces: fixture.namespaces,
                faults: Faults::default(),
            }),
            ..Self::default()
        })
    }

    /// Appends rows to `class` in the namespace at `path`.
    pub fn with_rows(mut self, path: &str, class: &str, rows: Vec<MockRow>) -> Self {
        Arc::make_mut(&mut self.data)
            .namespaces
            .entry(path.to_string())
            .or_default()
            .entry(class.to_string())
            .or_default()
            .extend(rows);
        self
    }

    /// Makes `connect` fail.
    pub fn fail_connect(mut self) -> Self {
        self.faults_mut().connect = true;
        self
    }

    /// Makes `connect_namespace` fail for `path`.
    pub fn fail_namespace(mut self, path: &str) -> Self {
        self.faults_mut().namespaces.insert(path.to_string());
        self
    }

    /// Makes `execute` fail for queries over `class`.
    pub fn fail_execute(mut self, class: &str) -> Self {
        self.faults_mut().execute.insert(class.to_string());
        self
    }

    /// Makes `count` fail for result sets over `class`.
    pub fn fail_count(mut self, class: &str) -> Self {
        self.faults_mut().count.insert(class.to_string());
        self
    }

    /// Makes `row_at(index)` fail for result sets over `class`.
    pub fn fail_row(mut self, class: &str, index: usize) -> Self {
        self.faults_mut().rows.insert((class.to_string(), index));
        self
    }

    /// Makes reading `field` fail on row `index` of result sets over `class`.
    pub fn fail_field(mut self, class: &str, index: usize, field: &str) -> Self {
        self.faults_mut()
            .fields
            .insert((class.to_string(), index, field.to_string()));
        self
    }

    /// Returns the handle tracker shared by all sessions of this provider.
    pub fn tracker(&self) -> HandleTracker {
        self.tracker.clone()
    }

    /// Returns every query executed so far, in order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }

    fn faults_mut(&mut self) -> &mut Faults {
        &mut Arc::make_mut(&mut self.data).faults
    }

    fn open_session(&self, path: &str) -> MockSession {
        MockSession {
            data: Arc::clone(&self.data),
            path: path.to_string(),
            tracker: self.tracker.clone(),
            executed: Arc::clone(&self.executed),
            _handle: self.tracker.acquire(),
        }
    }
}

impl Provider for MockProvider {
    fn connect(&self) -> Result<Box<dyn Session>, ProviderError> {
        if self.data.faults.connect {
            return Err(ProviderError::Connect(INJECTED.to_string()));
        }
        Ok(Box::new(self.open_session(DEFAULT_NAMESPACE)))
    }
}

struct MockSession {
    data: Arc<MockData>,
    path: String,
    tracker: HandleTracker,
    executed: Arc<Mutex<Vec<String>>>,
    _handle: Handle,
}

impl Session for MockSession {
    fn connect_namespace(&self, path: &str) -> Result<Box<dyn Session>, ProviderError> {
        let message = if self.data.faults.namespaces.contains(path) {
            Some(INJECTED)
        } else if !self.data.namespaces.contains_key(path) {
            Some("invalid namespace")
        } else {
            None
        };
        if let Some(message) = message {
            return Err(ProviderError::Namespace {
                path: path.to_string(),
                message: message.to_string(),
            });
        }

        Ok(Box::new(MockSession {
            data: Arc::clone(&self.data),
            path: path.to_string(),
            tracker: self.tracker.clone(),
            executed: Arc::clone(&self.executed),
            _handle: self.tracker.acquire(),
        }))
    }

    fn execute(&self, query: &str) -> Result<Box<dyn ResultSet + '_>, ProviderError> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(query.to_string());
        }

        let query_error = |message: &str| ProviderError::Query {
            query: query.to_string(),
            message: message.to_string(),
        };

        let select = parse_select(query).ok_or_else(|| query_error("invalid query"))?;
        if self.data.faults.execute.contains(&select.class) {
            return Err(query_error(INJECTED));
        }

        let rows = self
            .data
            .namespaces
            .get(&self.path)
            .and_then(|classes| classes.get(&select.class))
            .ok_or_else(|| query_error("invalid class"))?;

        let conditions = match &select.filter {
            Some(filter) => {
                parse_filter(filter).ok_or_else(|| query_error("unsupported WHERE clause"))?
            }
            None => Vec::new(),
        };

        let matching = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| conditions.iter().all(|c| c.matches(row)))
            .map(|(i, _)| i)
            .collect();

        Ok(Box::new(MockResultSet {
            rows: rows.as_slice(),
            matching,
            fields: select.fields,
            class: select.class,
            faults: &self.data.faults,
            tracker: self.tracker.clone(),
            _handle: self.tracker.acquire(),
        }))
    }
}

struct MockResultSet<'a> {
    rows: &'a [MockRow],
    matching: Vec<usize>,
    fields: Vec<String>,
    class: String,
    faults: &'a Faults,
    tracker: HandleTracker,
    _handle: Handle,
}

impl ResultSet for MockResultSet<'_> {
    fn count(&self) -> Result<usize, ProviderError> {
        if self.faults.count.contains(&self.class) {
            return Err(ProviderError::Count(INJECTED.to_string()));
        }
        Ok(self.matching.len())
    }

    fn row_at(&self, index: usize) -> Result<Box<dyn ResultRow + '_>, ProviderError> {
        let row_error = |message: &str| ProviderError::Row {
            index,
            message: message.to_string(),
        };

        if self.faults.rows.contains(&(self.class.clone(), index)) {
            return Err(row_error(INJECTED));
        }
        let row = self
            .matching
            .get(index)
            .and_then(|&i| self.rows.get(i))
            .ok_or_else(|| row_error("index out of range"))?;

        Ok(Box::new(MockResultRow {
            row,
            index,
            fields: &self.fields,
            class: &self.class,
            faults: self.faults,
            _handle: self.tracker.acquire(),
        }))
    }
}

struct MockResultRow<'a> {
    row: &'a MockRow,
    index: usize,
    fields: &'a [String],
    class: &'a str,
    faults: &'a Faults,
    _handle: Handle,
}

impl ResultRow for MockResultRow<'_> {
    fn field(&self, name: &str) -> Result<Value, ProviderError> {
        let field_error = |message: &str| ProviderError::Field {
            name: name.to_string(),
            message: message.to_string(),
        };

        if !self.fields.iter().any(|f| f == name) {
            return Err(field_error("not selected"));
        }
        let key = (self.class.to_string(), self.index, name.to_string());
        if self.faults.fields.contains(&key) {
            return Err(field_error(INJECTED));
        }
        self.row
            .get(name)
            .cloned()
            .ok_or_else(|| field_error("not found"))
    }
}

#[derive(Debug, PartialEq)]
struct SelectQuery {
    fields: Vec<String>,
    class: String,
    filter: Option<String>,
}

/// Finds `needle` in `haystack` ignoring ASCII case.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_uppercase()
        .find(&needle.to_ascii_uppercase())
}

/// Parses `SELECT a,b FROM Class [WHERE ...]`.
fn parse_select(query: &str) -> Option<SelectQuery> {
    let query = query.trim();
    if find_ignore_case(query, "SELECT ") != Some(0) {
        return None;
    }
    let rest = &query["SELECT ".len()..];

    let from = find_ignore_case(rest, " FROM ")?;
    let fields: Vec<String> = rest[..from]
        .split(',')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    if fields.is_empty() {
        return None;
    }

    let source = rest[from + " FROM ".len()..].trim();
    let (class, filter) = match find_ignore_case(source, " WHERE ") {
        Some(pos) => (
            source[..pos].trim(),
            Some(source[pos + " WHERE ".len()..].trim().to_string()),
        ),
        None => (source, None),
    };
    if class.is_empty() || class.contains(char::is_whitespace) {
        return None;
    }

    Some(SelectQuery {
        fields,
        class: class.to_string(),
        filter,
    })
}

#[derive(Debug, PartialEq)]
struct Condition {
    field: String,
    literal: String,
    negated: bool,
}

impl Condition {
    fn matches(&self, row: &MockRow) -> bool {
        let equal = row
            .get(&self.field)
            .is_some_and(|v| v.to_string_form() == self.literal);
        equal != self.negated
    }
}

/// Parses `Field = 'x' AND Other <> 3`. Only equality tests joined by AND are supported.
fn parse_filter(filter: &str) -> Option<Vec<Condition>> {
    let mut conditions = Vec::new();
    let mut rest = filter;
    loop {
        let (part, next) = match find_ignore_case(rest, " AND ") {
            Some(pos) => (&rest[..pos], Some(&rest[pos + " AND ".len()..])),
            None => (rest, None),
        };
        conditions.push(parse_condition(part)?);
        match next {
            Some(next) => rest = next,
            None => break,
        }
    }
    Some(conditions)
}

fn parse_condition(part: &str) -> Option<Condition> {
    let (field, literal, negated) = if let Some((f, l)) = part.split_once("<>") {
        (f, l, true)
    } else if let Some((f, l)) = part.split_once("!=") {
        (f, l, true)
    } else {
        let (f, l) = part.split_once('=')?;
        (f, l, false)
    };

    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    let literal = literal.trim();
    let literal = literal
        .strip_prefix('\'')
        .and_then(|l| l.strip_suffix('\''))
        .or_else(|| literal.strip_prefix('"').and_then(|l| l.strip_suffix('"')))
        .unwrap_or(literal);

    Some(Condition {
        field: field.to_string(),
        literal: literal.to_string(),
        negated,
    })
}
