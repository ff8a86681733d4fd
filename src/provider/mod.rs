//! Instrumentation provider abstraction.
//!
//! The collector talks to the instrumentation backend only through the
//! traits in this module. Every handle (session, result set, row) is an owned
//! value whose `Drop` releases the underlying provider resource, so an early
//! return on any error path releases everything acquired so far.
//!
//! ```text
//! Provider::connect()        -> Session     (root namespace)
//! Session::connect_namespace -> Session     (independent lifetime)
//! Session::execute           -> ResultSet   (borrows the session)
//! ResultSet::count / row_at  -> ResultRow   (borrows the result set)
//! ResultRow::field           -> Value       (owned copy)
//! ```

pub mod mock;
mod value;

pub use mock::{HandleTracker, MockProvider};
pub use value::Value;

/// Namespace opened by [`Provider::connect`].
pub const DEFAULT_NAMESPACE: &str = "root\\cimv2";

/// Error type for provider calls.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Root session could not be created.
    Connect(String),
    /// Namespace-scoped session could not be created.
    Namespace { path: String, message: String },
    /// Query execution failed.
    Query { query: String, message: String },
    /// Result count could not be read.
    Count(String),
    /// Row could not be fetched by index.
    Row { index: usize, message: String },
    /// Named field could not be read from a row.
    Field { name: String, message: String },
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Connect(msg) => write!(f, "connect failed: {}", msg),
            ProviderError::Namespace { path, message } => {
                write!(f, "cannot connect to namespace {}: {}", path, message)
            }
            ProviderError::Query { query, message } => {
                write!(f, "query `{}` failed: {}", query, message)
            }
            ProviderError::Count(msg) => write!(f, "cannot read result count: {}", msg),
            ProviderError::Row { index, message } => {
                write!(f, "cannot fetch row {}: {}", index, message)
            }
            ProviderError::Field { name, message } => {
                write!(f, "cannot read field {}: {}", name, message)
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// Entry point to the instrumentation backend.
pub trait Provider {
    /// Opens a session on the default namespace.
    fn connect(&self) -> Result<Box<dyn Session>, ProviderError>;
}

/// An open connection to one provider namespace.
///
/// Dropping the session releases it.
pub trait Session {
    /// Opens a separate session scoped to `path` (e.g. `root\OpenHardwareMonitor`).
    ///
    /// The returned session does not borrow `self` and may outlive it.
    fn connect_namespace(&self, path: &str) -> Result<Box<dyn Session>, ProviderError>;

    /// Executes a query and returns its result set.
    fn execute(&self, query: &str) -> Result<Box<dyn ResultSet + '_>, ProviderError>;
}

/// Rows produced by one query.
pub trait ResultSet {
    /// Number of rows in the result set.
    fn count(&self) -> Result<usize, ProviderError>;

    /// Fetches the row at `index` (zero-based).
    fn row_at(&self, index: usize) -> Result<Box<dyn ResultRow + '_>, ProviderError>;
}

/// One row of a result set. Valid until dropped.
pub trait ResultRow {
    /// Reads a field by name.
    fn field(&self, name: &str) -> Result<Value, ProviderError>;
}
