use std::collections::HashMap;

use crate::api::middleware::AppError;
use crate::models::{
    QueryMultiStructReq, QueryResultWithSchema, QueryStatement, QueryType,
};
use crate::services::result_cache::ResultCache;
use crate::validation::select_helper;

/// Helpers shared by the orchestration paths: union of planned statements,
/// result relabeling, and the cache write-back rule.
pub struct QueryUtils;

impl QueryUtils {
    /// Union precondition: the sub-statement must carry parseable SQL.
    /// Reports the offending sub-statement index.
    pub fn check_sql_parse(statement: &QueryStatement, index: usize) -> Result<(), AppError> {
        if statement.sql.trim().is_empty() {
            return Err(AppError::Union(format!(
                "sub-statement {} has empty SQL",
                index
            )));
        }
        select_helper::parse_query(&statement.sql).map_err(|e| {
            AppError::Union(format!("sub-statement {} failed to parse: {}", index, e))
        })?;
        Ok(())
    }

    /// Merge independently planned statements into one combined statement.
    /// All sub-statements must share projection arity; the first mismatch
    /// aborts the union.
    pub fn union_statements(
        statements: &[QueryStatement],
    ) -> Result<QueryStatement, AppError> {
        if statements.is_empty() {
            return Err(AppError::Union(
                "no statements to union".to_string(),
            ));
        }

        let mut expected_arity: Option<usize> = None;
        for (index, statement) in statements.iter().enumerate() {
            Self::check_sql_parse(statement, index)?;

            let arity = select_helper::projection_arity(&statement.sql).map_err(|e| {
                AppError::Union(format!("sub-statement {} failed to parse: {}", index, e))
            })?;
            match expected_arity {
                None => expected_arity = Some(arity),
                Some(expected) if expected != arity => {
                    return Err(AppError::Union(format!(
                        "sub-statement {} selects {} columns, expected {}",
                        index, arity, expected
                    )));
                }
                Some(_) => {}
            }
        }

        let sql = statements
            .iter()
            .map(|statement| statement.sql.as_str())
            .collect::<Vec<_>>()
            .join(" UNION ALL ");

        Ok(QueryStatement::new(
            statements[0].model_id,
            sql,
            QueryType::Struct,
        ))
    }

    /// Re-label result columns with the caller-facing aggregator aliases
    /// from the original requests, renaming row keys to match
    pub fn fill_item_name_info(
        result: &mut QueryResultWithSchema,
        multi_req: &QueryMultiStructReq,
    ) {
        let mut aliases: HashMap<&str, &str> = HashMap::new();
        for req in &multi_req.query_struct_reqs {
            for aggregator in &req.aggregators {
                if let Some(alias) = &aggregator.alias {
                    aliases.insert(aggregator.column.as_str(), alias.as_str());
                }
            }
        }
        if aliases.is_empty() {
            return;
        }

        for column in &mut result.columns {
            if let Some(alias) = aliases.get(column.name.as_str()) {
                column.name = alias.to_string();
            }
        }

        for row in &mut result.result_list {
            if let serde_json::Value::Object(obj) = row {
                let renamed: serde_json::Map<String, serde_json::Value> = obj
                    .iter()
                    .map(|(key, value)| {
                        let key = aliases
                            .get(key.as_str())
                            .map(|alias| alias.to_string())
                            .unwrap_or_else(|| key.clone());
                        (key, value.clone())
                    })
                    .collect();
                *obj = renamed;
            }
        }
    }

    /// Store a successful result under its fingerprint key; empty results
    /// are not worth a cache slot
    pub fn cache_result_logic(cache: &ResultCache, key: &str, result: &QueryResultWithSchema) {
        if result.is_empty() {
            tracing::debug!("skipping cache store for empty result, key: {}", key);
            return;
        }
        cache.put(key, result);
    }
}
