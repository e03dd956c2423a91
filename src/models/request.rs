use serde::{Deserialize, Serialize};

/// Fallback user name recorded in statistics when the caller is anonymous
pub const DEFAULT_USER_NAME: &str = "Admin";

/// Calling identity attached to a query request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub name: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Build a user from an optional display name (e.g. a request header)
    pub fn from_optional_name(name: Option<String>) -> Self {
        Self {
            name: name.unwrap_or_default(),
        }
    }

    /// Name used for statistics; empty names normalize to a fixed sentinel
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            DEFAULT_USER_NAME
        } else {
            &self.name
        }
    }
}

/// Raw-SQL query request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySqlReq {
    pub model_id: i64,
    pub sql: String,
}

impl QuerySqlReq {
    /// Canonical textual form used for statistics and fingerprints
    pub fn command_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn command_md5(&self) -> String {
        format!("{:x}", md5::compute(self.command_text()))
    }
}

/// Aggregation function applied to a metric column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggOperator {
    Sum,
    Avg,
    Count,
    Max,
    Min,
    CountDistinct,
}

impl AggOperator {
    /// Render the aggregation over a column, e.g. `sum(pv)`
    pub fn apply(&self, column: &str) -> String {
        match self {
            AggOperator::Sum => format!("sum({})", column),
            AggOperator::Avg => format!("avg({})", column),
            AggOperator::Count => format!("count({})", column),
            AggOperator::Max => format!("max({})", column),
            AggOperator::Min => format!("min({})", column),
            AggOperator::CountDistinct => format!("count(DISTINCT {})", column),
        }
    }
}

/// Metric plus the aggregation applied to it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregator {
    pub column: String,
    pub func: AggOperator,
    /// Caller-facing label; result columns are re-labeled to this after execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilterOperator {
    #[serde(rename = "EQ")]
    Eq,
    #[serde(rename = "NE")]
    Ne,
    #[serde(rename = "GT")]
    Gt,
    #[serde(rename = "GTE")]
    Gte,
    #[serde(rename = "LT")]
    Lt,
    #[serde(rename = "LTE")]
    Lte,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "IN")]
    In,
}

impl FilterOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Gte => ">=",
            FilterOperator::Lt => "<",
            FilterOperator::Lte => "<=",
            FilterOperator::Like => "LIKE",
            FilterOperator::In => "IN",
        }
    }
}

/// Whether a filter applies before or after aggregation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterRelation {
    #[default]
    Filter,
    Having,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub biz_name: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub relation: FilterRelation,
}

impl Filter {
    pub fn like(biz_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            biz_name: biz_name.into(),
            operator: FilterOperator::Like,
            value: serde_json::Value::String(value.into()),
            relation: FilterRelation::Filter,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub column: String,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateMode {
    Recent,
    Between,
}

/// Date-range descriptor resolved against the reserved partition-date column
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateConf {
    pub date_mode: DateMode,
    #[serde(default = "default_date_unit")]
    pub unit: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

fn default_date_unit() -> i64 {
    1
}

impl DateConf {
    pub fn recent(unit: i64) -> Self {
        Self {
            date_mode: DateMode::Recent,
            unit,
            start_date: None,
            end_date: None,
        }
    }
}

/// Per-request cache directive; absence means caching is disabled
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheInfo {
    pub cache: bool,
}

/// Structured query request: groups, aggregators, filters, date range
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStructReq {
    pub model_id: i64,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub aggregators: Vec<Aggregator>,
    #[serde(default)]
    pub dimension_filters: Vec<Filter>,
    #[serde(default)]
    pub metric_filters: Vec<Filter>,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_info: Option<DateConf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_info: Option<CacheInfo>,
    #[serde(default)]
    pub native_query: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl QueryStructReq {
    pub fn new(model_id: i64) -> Self {
        Self {
            model_id,
            groups: Vec::new(),
            aggregators: Vec::new(),
            dimension_filters: Vec::new(),
            metric_filters: Vec::new(),
            orders: Vec::new(),
            date_info: None,
            cache_info: None,
            native_query: false,
            limit: None,
        }
    }

    /// Canonical textual form; serde field order makes this independent of
    /// how the caller ordered fields on the wire
    pub fn command_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn command_md5(&self) -> String {
        format!("{:x}", md5::compute(self.command_text()))
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.cache_info.map(|c| c.cache).unwrap_or(false)
    }
}

/// Several structured requests answered as one combined statement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMultiStructReq {
    pub query_struct_reqs: Vec<QueryStructReq>,
}

impl QueryMultiStructReq {
    pub fn command_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn command_md5(&self) -> String {
        format!("{:x}", md5::compute(self.command_text()))
    }

    pub fn first(&self) -> Option<&QueryStructReq> {
        self.query_struct_reqs.first()
    }
}

/// Lookup of the values a dimension takes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDimValueReq {
    pub model_id: i64,
    pub dimension_biz_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Explain-only request wrapping either query flavor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "queryType", content = "queryReq")]
pub enum ExplainSqlReq {
    #[serde(rename = "SQL")]
    Sql(QuerySqlReq),
    #[serde(rename = "STRUCT")]
    Struct(QueryStructReq),
}

/// Filter for the item-use statistics report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUseReq {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<i64>,
    /// Only records started at or after this epoch-millisecond timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_name_sentinel() {
        assert_eq!(User::new("alice").display_name(), "alice");
        assert_eq!(User::new("").display_name(), "Admin");
        assert_eq!(User::new("   ").display_name(), "Admin");
        assert_eq!(User::from_optional_name(None).display_name(), "Admin");
    }

    #[test]
    fn test_command_md5_deterministic() {
        let mut req = QueryStructReq::new(1);
        req.groups = vec!["city".to_string()];
        let other = req.clone();

        assert_eq!(req.command_md5(), other.command_md5());

        let mut changed = req.clone();
        changed.groups = vec!["country".to_string()];
        assert_ne!(req.command_md5(), changed.command_md5());
    }

    #[test]
    fn test_command_md5_ignores_wire_field_order() {
        let a: QueryStructReq =
            serde_json::from_str(r#"{"modelId": 7, "groups": ["city"], "nativeQuery": false}"#)
                .unwrap();
        let b: QueryStructReq =
            serde_json::from_str(r#"{"nativeQuery": false, "groups": ["city"], "modelId": 7}"#)
                .unwrap();
        assert_eq!(a.command_md5(), b.command_md5());
    }

    #[test]
    fn test_cache_directive_absent_means_disabled() {
        let req = QueryStructReq::new(1);
        assert!(!req.is_cache_enabled());

        let mut enabled = QueryStructReq::new(1);
        enabled.cache_info = Some(CacheInfo { cache: true });
        assert!(enabled.is_cache_enabled());

        let mut disabled = QueryStructReq::new(1);
        disabled.cache_info = Some(CacheInfo { cache: false });
        assert!(!disabled.is_cache_enabled());
    }

    #[test]
    fn test_explain_req_deserialization() {
        let json = r#"{"queryType": "SQL", "queryReq": {"modelId": 3, "sql": "select a from t"}}"#;
        let req: ExplainSqlReq = serde_json::from_str(json).unwrap();
        match req {
            ExplainSqlReq::Sql(sql_req) => {
                assert_eq!(sql_req.model_id, 3);
                assert_eq!(sql_req.sql, "select a from t");
            }
            _ => panic!("expected SQL explain request"),
        }
    }
}
