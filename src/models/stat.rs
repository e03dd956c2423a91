use serde::{Deserialize, Serialize};

/// Per-query telemetry record flushed asynchronously after the response.
///
/// The JSON-encoded list fields (`group_by_cols`, `dimensions`, ...) mirror
/// what the statistics store persists as text columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStat {
    pub trace_id: String,
    pub model_id: i64,
    pub user: String,
    pub query_type: String,
    /// Canonical textual form of the originating request
    pub query_text: String,
    pub query_text_md5: String,
    pub start_time_ms: i64,
    pub elapsed_ms: i64,
    pub query_state: String,
    pub native_query: bool,
    pub group_by_cols: String,
    pub agg_cols: String,
    pub order_by_cols: String,
    pub filter_cols: String,
    pub use_result_cache: bool,
    pub use_sql_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_cache_key: Option<String>,
    /// Resolved dimension names actually used by the query, JSON-encoded
    pub dimensions: String,
    /// Resolved metric names actually used by the query, JSON-encoded
    pub metrics: String,
}
