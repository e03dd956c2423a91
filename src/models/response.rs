use serde::{Deserialize, Serialize};

/// Column descriptor attached to a result payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryColumn {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
}

impl QueryColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: None,
        }
    }
}

/// Result payload plus its schema; this is the value cached between requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultWithSchema {
    pub columns: Vec<QueryColumn>,
    pub result_list: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl QueryResultWithSchema {
    pub fn new(columns: Vec<QueryColumn>, result_list: Vec<serde_json::Value>) -> Self {
        Self {
            columns,
            result_list,
            sql: None,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.result_list.is_empty()
    }
}

/// Response to an explain-only request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainResp {
    pub sql: String,
}

/// Aggregated use count for one dimension or metric
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUseResp {
    pub model_id: i64,
    pub biz_name: String,
    /// `dimension` or `metric`
    pub item_type: String,
    pub use_count: u64,
}
