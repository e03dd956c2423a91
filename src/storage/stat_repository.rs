use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection, Result as SqliteResult};
use tokio::sync::Mutex;

use crate::api::middleware::AppError;
use crate::models::{ItemUseReq, ItemUseResp, QueryStat};

/// Sink and read path for query statistics. `create_record` is only ever
/// called from the asynchronous flush task.
#[async_trait::async_trait]
pub trait StatRepository: Send + Sync {
    async fn create_record(&self, stat: QueryStat) -> Result<(), AppError>;

    /// Per-dimension/metric use counts aggregated from the stored records
    async fn get_stat_info(&self, filter: &ItemUseReq) -> Result<Vec<ItemUseResp>, AppError>;

    async fn get_raw_stat_info(&self, filter: &ItemUseReq) -> Result<Vec<QueryStat>, AppError>;
}

/// SQLite-backed statistics store.
/// Uses tokio::Mutex for async-friendly locking.
pub struct SqliteStatRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStatRepository {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        // Handle SQLite URL format (sqlite:./path or sqlite://path)
        let path_str = db_path.as_ref().to_string_lossy();
        let clean_path: &str = if path_str.starts_with("sqlite:") {
            path_str.trim_start_matches("sqlite:").trim_start_matches("//")
        } else {
            path_str.as_ref()
        };

        let conn = Connection::open(clean_path)?;
        let repository = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        repository.init_schema().await?;
        Ok(repository)
    }

    pub async fn in_memory() -> SqliteResult<Self> {
        let repository = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        repository.init_schema().await?;
        Ok(repository)
    }

    async fn init_schema(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS query_stat (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trace_id TEXT NOT NULL,
                model_id INTEGER NOT NULL,
                user_name TEXT NOT NULL,
                query_type TEXT NOT NULL,
                query_text TEXT NOT NULL,
                query_text_md5 TEXT NOT NULL,
                start_time_ms INTEGER NOT NULL,
                elapsed_ms INTEGER NOT NULL,
                query_state TEXT NOT NULL,
                native_query INTEGER NOT NULL DEFAULT 0,
                group_by_cols TEXT,
                agg_cols TEXT,
                order_by_cols TEXT,
                filter_cols TEXT,
                use_result_cache INTEGER NOT NULL DEFAULT 0,
                use_sql_cache INTEGER NOT NULL DEFAULT 0,
                result_cache_key TEXT,
                dimensions TEXT,
                metrics TEXT
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_query_stat_model_time \
             ON query_stat(model_id, start_time_ms)",
            [],
        )?;

        Ok(())
    }

    fn filter_clause(filter: &ItemUseReq) -> String {
        let mut conditions = Vec::new();
        if let Some(model_id) = filter.model_id {
            conditions.push(format!("model_id = {}", model_id));
        }
        if let Some(start_time_ms) = filter.start_time_ms {
            conditions.push(format!("start_time_ms >= {}", start_time_ms));
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }

    fn decode_names(encoded: &str) -> Vec<String> {
        serde_json::from_str(encoded).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl StatRepository for SqliteStatRepository {
    async fn create_record(&self, stat: QueryStat) -> Result<(), AppError> {
        let conn = self.conn.lock().await;

        conn.execute(
            r#"
            INSERT INTO query_stat (
                trace_id, model_id, user_name, query_type, query_text,
                query_text_md5, start_time_ms, elapsed_ms, query_state,
                native_query, group_by_cols, agg_cols, order_by_cols,
                filter_cols, use_result_cache, use_sql_cache,
                result_cache_key, dimensions, metrics
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
            params![
                stat.trace_id,
                stat.model_id,
                stat.user,
                stat.query_type,
                stat.query_text,
                stat.query_text_md5,
                stat.start_time_ms,
                stat.elapsed_ms,
                stat.query_state,
                stat.native_query,
                stat.group_by_cols,
                stat.agg_cols,
                stat.order_by_cols,
                stat.filter_cols,
                stat.use_result_cache,
                stat.use_sql_cache,
                stat.result_cache_key,
                stat.dimensions,
                stat.metrics,
            ],
        )
        .map_err(|e| AppError::Internal(format!("failed to store query stat: {}", e)))?;

        Ok(())
    }

    async fn get_stat_info(&self, filter: &ItemUseReq) -> Result<Vec<ItemUseResp>, AppError> {
        let records = self.get_raw_stat_info(filter).await?;

        let mut counts: HashMap<(i64, String, &'static str), u64> = HashMap::new();
        for record in &records {
            for name in Self::decode_names(&record.dimensions) {
                *counts
                    .entry((record.model_id, name, "dimension"))
                    .or_insert(0) += 1;
            }
            for name in Self::decode_names(&record.metrics) {
                *counts.entry((record.model_id, name, "metric")).or_insert(0) += 1;
            }
        }

        let mut stat_infos: Vec<ItemUseResp> = counts
            .into_iter()
            .map(|((model_id, biz_name, item_type), use_count)| ItemUseResp {
                model_id,
                biz_name,
                item_type: item_type.to_string(),
                use_count,
            })
            .collect();
        stat_infos.sort_by(|a, b| {
            b.use_count
                .cmp(&a.use_count)
                .then_with(|| a.biz_name.cmp(&b.biz_name))
        });
        Ok(stat_infos)
    }

    async fn get_raw_stat_info(&self, filter: &ItemUseReq) -> Result<Vec<QueryStat>, AppError> {
        let conn = self.conn.lock().await;

        let sql = format!(
            "SELECT trace_id, model_id, user_name, query_type, query_text, \
             query_text_md5, start_time_ms, elapsed_ms, query_state, native_query, \
             group_by_cols, agg_cols, order_by_cols, filter_cols, use_result_cache, \
             use_sql_cache, result_cache_key, dimensions, metrics \
             FROM query_stat{} ORDER BY start_time_ms DESC",
            Self::filter_clause(filter)
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("failed to read query stats: {}", e)))?;

        let records = stmt
            .query_map([], |row| {
                Ok(QueryStat {
                    trace_id: row.get(0)?,
                    model_id: row.get(1)?,
                    user: row.get(2)?,
                    query_type: row.get(3)?,
                    query_text: row.get(4)?,
                    query_text_md5: row.get(5)?,
                    start_time_ms: row.get(6)?,
                    elapsed_ms: row.get(7)?,
                    query_state: row.get(8)?,
                    native_query: row.get(9)?,
                    group_by_cols: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
                    agg_cols: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                    order_by_cols: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
                    filter_cols: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
                    use_result_cache: row.get(14)?,
                    use_sql_cache: row.get(15)?,
                    result_cache_key: row.get(16)?,
                    dimensions: row.get::<_, Option<String>>(17)?.unwrap_or_default(),
                    metrics: row.get::<_, Option<String>>(18)?.unwrap_or_default(),
                })
            })
            .map_err(|e| AppError::Internal(format!("failed to read query stats: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("failed to read query stats: {}", e)))?;

        Ok(records)
    }
}
