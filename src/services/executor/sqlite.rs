use std::path::Path;
use std::sync::Arc;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::api::middleware::AppError;
use crate::models::{QueryColumn, QueryResultWithSchema, QueryStatement};
use crate::services::executor::QueryExecutor;

/// Reference executor running statements against a local SQLite database.
/// Uses tokio::Mutex for async-friendly locking.
pub struct SqliteQueryExecutor {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteQueryExecutor {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, AppError> {
        // Handle SQLite URL format (sqlite:./path or sqlite://path)
        let path_str = db_path.as_ref().to_string_lossy();
        let clean_path: &str = if path_str.starts_with("sqlite:") {
            path_str.trim_start_matches("sqlite:").trim_start_matches("//")
        } else {
            path_str.as_ref()
        };

        let conn = Connection::open(clean_path)
            .map_err(|e| AppError::Internal(format!("failed to open database: {}", e)))?;
        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("failed to open database: {}", e)))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
        match value {
            ValueRef::Null => serde_json::Value::Null,
            ValueRef::Integer(v) => serde_json::Value::Number(serde_json::Number::from(v)),
            ValueRef::Real(v) => serde_json::Number::from_f64(v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueRef::Text(text) => {
                serde_json::Value::String(String::from_utf8_lossy(text).to_string())
            }
            ValueRef::Blob(_) => serde_json::Value::Null,
        }
    }
}

#[async_trait::async_trait]
impl QueryExecutor for SqliteQueryExecutor {
    fn name(&self) -> &'static str {
        "SQLITE"
    }

    fn accept(&self, statement: &QueryStatement) -> bool {
        !statement.is_explain
    }

    async fn execute(
        &self,
        statement: &QueryStatement,
    ) -> Result<QueryResultWithSchema, AppError> {
        let conn = self.conn.lock().await;

        let mut stmt = conn
            .prepare(&statement.sql)
            .map_err(|e| AppError::Execution(format!("{}. SQL: {}", e, statement.sql)))?;

        let column_names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        let mut rows = stmt
            .query([])
            .map_err(|e| AppError::Execution(format!("{}. SQL: {}", e, statement.sql)))?;

        let mut result_list = Vec::new();
        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => {
                    return Err(AppError::Execution(format!(
                        "{}. SQL: {}",
                        e, statement.sql
                    )))
                }
            };

            let mut row_obj = serde_json::Map::new();
            for (idx, column_name) in column_names.iter().enumerate() {
                let value = row
                    .get_ref(idx)
                    .map(Self::value_to_json)
                    .unwrap_or(serde_json::Value::Null);
                row_obj.insert(column_name.clone(), value);
            }
            result_list.push(serde_json::Value::Object(row_obj));
        }

        let columns = column_names.into_iter().map(QueryColumn::new).collect();

        Ok(QueryResultWithSchema::new(columns, result_list).with_sql(statement.sql.clone()))
    }
}
