use crate::api::middleware::AppError;
use crate::models::{
    AggOperator, DateConf, DateMode, Filter, FilterOperator, ModelSchema, QueryDimValueReq,
    QuerySqlReq, QueryStatement, QueryStructReq, QueryType,
};
use crate::validation::SqlValidator;
use chrono::{Duration, Utc};

/// Reserved partition-date column targeted by date-range descriptors.
/// Carries the system prefix, so correction never surfaces it in a select list.
pub const SYS_DATE_FIELD: &str = "sys_imp_date";

/// Translates boundary requests into statements.
///
/// Structured requests are rendered into SQL over the model's table;
/// raw-SQL requests are validated and passed through. Every statement the
/// engine plans originates here.
pub struct QueryReqConverter;

impl QueryReqConverter {
    /// Convert a raw-SQL request, requiring a schema for the target model
    pub fn convert_sql_req(
        &self,
        req: &QuerySqlReq,
        schemas: &[ModelSchema],
    ) -> Result<QueryStatement, AppError> {
        schemas
            .iter()
            .find(|schema| schema.model_id == req.model_id)
            .ok_or_else(|| {
                AppError::Conversion(format!("no schema found for model {}", req.model_id))
            })?;

        SqlValidator::validate_select_only(&req.sql)?;

        Ok(QueryStatement::new(
            req.model_id,
            req.sql.clone(),
            QueryType::Sql,
        ))
    }

    /// Convert a structured request by rendering SQL over the model's table
    pub fn convert_struct_req(
        &self,
        req: &QueryStructReq,
        schema: &ModelSchema,
    ) -> Result<QueryStatement, AppError> {
        let sql = self.render_sql(req, schema)?;
        Ok(QueryStatement::new(req.model_id, sql, QueryType::Struct))
    }

    fn render_sql(&self, req: &QueryStructReq, schema: &ModelSchema) -> Result<String, AppError> {
        let aggregated = !req.native_query && !req.aggregators.is_empty();

        let mut select_items: Vec<String> = req.groups.clone();
        for aggregator in &req.aggregators {
            if aggregated {
                select_items.push(format!(
                    "{} AS {}",
                    aggregator.func.apply(&aggregator.column),
                    aggregator.column
                ));
            } else {
                select_items.push(aggregator.column.clone());
            }
        }
        if select_items.is_empty() {
            return Err(AppError::Conversion(
                "structured request selects no fields".to_string(),
            ));
        }

        let mut sql = format!(
            "SELECT {} FROM {}",
            select_items.join(", "),
            schema.table_name
        );

        let mut conditions: Vec<String> = Vec::new();
        for filter in &req.dimension_filters {
            conditions.push(Self::render_condition(&filter.biz_name, filter)?);
        }
        if !aggregated {
            // without aggregation, metric filters are plain row filters
            for filter in &req.metric_filters {
                conditions.push(Self::render_condition(&filter.biz_name, filter)?);
            }
        }
        if let Some(date_info) = &req.date_info {
            conditions.push(Self::render_date_range(date_info)?);
        }
        if !conditions.is_empty() {
            sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
        }

        if aggregated && !req.groups.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", req.groups.join(", ")));
        }

        if aggregated && !req.metric_filters.is_empty() {
            let mut havings: Vec<String> = Vec::new();
            for filter in &req.metric_filters {
                let func = req
                    .aggregators
                    .iter()
                    .find(|aggregator| aggregator.column == filter.biz_name)
                    .map(|aggregator| aggregator.func)
                    .unwrap_or(AggOperator::Sum);
                havings.push(Self::render_condition(&func.apply(&filter.biz_name), filter)?);
            }
            sql.push_str(&format!(" HAVING {}", havings.join(" AND ")));
        }

        if !req.orders.is_empty() {
            let orders: Vec<String> = req
                .orders
                .iter()
                .map(|order| format!("{} {}", order.column, order.direction.as_sql()))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        if let Some(limit) = req.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        Ok(sql)
    }

    fn render_condition(column_expr: &str, filter: &Filter) -> Result<String, AppError> {
        match filter.operator {
            FilterOperator::Like => {
                let value = Self::render_plain_string(&filter.value)?;
                Ok(format!("{} LIKE '%{}%'", column_expr, value))
            }
            FilterOperator::In => {
                let items = match &filter.value {
                    serde_json::Value::Array(items) => items
                        .iter()
                        .map(Self::render_value)
                        .collect::<Result<Vec<_>, _>>()?,
                    other => vec![Self::render_value(other)?],
                };
                Ok(format!("{} IN ({})", column_expr, items.join(", ")))
            }
            _ => Ok(format!(
                "{} {} {}",
                column_expr,
                filter.operator.as_sql(),
                Self::render_value(&filter.value)?
            )),
        }
    }

    fn render_value(value: &serde_json::Value) -> Result<String, AppError> {
        match value {
            serde_json::Value::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::Bool(b) => Ok(b.to_string()),
            _ => Err(AppError::Conversion(format!(
                "unsupported filter value: {}",
                value
            ))),
        }
    }

    fn render_plain_string(value: &serde_json::Value) -> Result<String, AppError> {
        match value {
            serde_json::Value::String(s) => Ok(s.replace('\'', "''")),
            other => Err(AppError::Conversion(format!(
                "LIKE filter requires a string value, got: {}",
                other
            ))),
        }
    }

    fn render_date_range(date_info: &DateConf) -> Result<String, AppError> {
        let (start, end) = match date_info.date_mode {
            DateMode::Recent => {
                let today = Utc::now().date_naive();
                let start = today - Duration::days(date_info.unit.max(1));
                (start.format("%Y-%m-%d").to_string(), today.format("%Y-%m-%d").to_string())
            }
            DateMode::Between => {
                let start = date_info.start_date.clone().ok_or_else(|| {
                    AppError::Conversion("BETWEEN date range requires startDate".to_string())
                })?;
                let end = date_info.end_date.clone().ok_or_else(|| {
                    AppError::Conversion("BETWEEN date range requires endDate".to_string())
                })?;
                (start, end)
            }
        };
        Ok(format!(
            "({} >= '{}' AND {} <= '{}')",
            SYS_DATE_FIELD, start, SYS_DATE_FIELD, end
        ))
    }

    /// Build the structured request answering a dimension-value lookup:
    /// group by the requested dimension, optionally LIKE-filter on the
    /// supplied value, over the most recent date unit, with no aggregators
    pub fn generate_dim_value_struct(req: &QueryDimValueReq) -> QueryStructReq {
        let mut struct_req = QueryStructReq::new(req.model_id);
        struct_req.groups = vec![req.dimension_biz_name.clone()];

        if let Some(value) = &req.value {
            struct_req.dimension_filters =
                vec![Filter::like(req.dimension_biz_name.clone(), value.clone())];
        }

        struct_req.date_info = Some(DateConf::recent(1));
        struct_req
    }
}
