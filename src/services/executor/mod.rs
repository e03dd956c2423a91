// Backend executors.
//
// Executors are registered with the engine and polled in registration
// order; the first one whose `accept` returns true serves the statement.

pub mod sqlite;

pub use sqlite::SqliteQueryExecutor;

use crate::api::middleware::AppError;
use crate::models::{QueryResultWithSchema, QueryStatement};

/// A backend capable of executing planned statements
#[async_trait::async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executor name, for routing logs
    fn name(&self) -> &'static str;

    /// Whether this executor can serve the statement
    fn accept(&self, statement: &QueryStatement) -> bool;

    /// Run the statement and produce the result payload plus schema.
    /// May block on the backend; must not hold any engine lock.
    async fn execute(&self, statement: &QueryStatement)
        -> Result<QueryResultWithSchema, AppError>;
}
