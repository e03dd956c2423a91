use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::{
    ExplainResp, ExplainSqlReq, ItemUseReq, ItemUseResp, QueryDimValueReq, QueryMultiStructReq,
    QueryResultWithSchema, QuerySqlReq, QueryStructReq, TaskStatus, User,
};
use crate::services::converter::QueryReqConverter;
use crate::services::query_utils::QueryUtils;
use crate::services::result_cache::ResultCache;
use crate::services::semantic_engine::SemanticQueryEngine;
use crate::services::stat_service::{StatContext, StatService};

/// Orchestrates a request end to end: statistics init, planning,
/// cache check, routing/execution, cache store, asynchronous stat flush.
///
/// Within one request those steps run strictly in that order; across
/// requests nothing is ordered. Failed requests still finalize their
/// statistics context before the error propagates.
pub struct QueryService {
    engine: Arc<SemanticQueryEngine>,
    cache: Arc<ResultCache>,
    stats: Arc<StatService>,
    cache_enable: bool,
}

impl QueryService {
    pub fn new(
        engine: Arc<SemanticQueryEngine>,
        cache: Arc<ResultCache>,
        stats: Arc<StatService>,
        cache_enable: bool,
    ) -> Self {
        Self {
            engine,
            cache,
            stats,
            cache_enable,
        }
    }

    /// Execute a raw-SQL request. SQL requests carry no cache directive and
    /// bypass the result cache entirely.
    pub async fn query_by_sql(
        &self,
        req: &QuerySqlReq,
        user: &User,
    ) -> Result<QueryResultWithSchema, AppError> {
        let context = self.stats.init_sql_stat(req, user).await;

        match self.execute_sql_query(req).await {
            Ok(result) => {
                self.stats.finalize(&context, TaskStatus::Success);
                Ok(result)
            }
            Err(e) => {
                tracing::warn!("exception in query_by_sql: {}", e);
                self.stats.finalize(&context, TaskStatus::Error);
                Err(e)
            }
        }
    }

    async fn execute_sql_query(
        &self,
        req: &QuerySqlReq,
    ) -> Result<QueryResultWithSchema, AppError> {
        let mut statement = self.engine.plan_sql(req).await?;
        self.engine.execute(&mut statement).await
    }

    /// Execute a structured request with the full cache discipline
    pub async fn query_by_struct(
        &self,
        req: &QueryStructReq,
        user: &User,
    ) -> Result<Option<QueryResultWithSchema>, AppError> {
        tracing::info!(model_id = req.model_id, "handling struct query");
        let context = self.stats.init_struct_stat(req, user);
        let cache_key = ResultCache::generate_key(req.model_id, &req.command_md5());
        let is_cache = self.is_cache(req);

        if is_cache {
            if let Some(result) = self.query_by_cache(&cache_key, &context) {
                self.stats.finalize(&context, TaskStatus::Success);
                return Ok(Some(result));
            }
        }
        context.set_use_result_cache(false);

        match self.execute_struct_query(req, is_cache, &cache_key).await {
            Ok(result) => {
                self.stats.finalize(&context, TaskStatus::Success);
                Ok(result)
            }
            Err(e) => {
                tracing::warn!("exception in query_by_struct: {}", e);
                self.stats.finalize(&context, TaskStatus::Error);
                Err(e)
            }
        }
    }

    async fn execute_struct_query(
        &self,
        req: &QueryStructReq,
        is_cache: bool,
        cache_key: &str,
    ) -> Result<Option<QueryResultWithSchema>, AppError> {
        let mut statement = self.engine.plan_struct(req).await?;

        let executor = match self.engine.route(&statement) {
            Some(executor) => executor,
            None => {
                tracing::info!(model_id = req.model_id, "no executor accepts this statement");
                return Ok(None);
            }
        };
        statement.mark_routed();

        let result = self.engine.execute_with(&executor, &mut statement).await?;
        if is_cache {
            QueryUtils::cache_result_logic(&self.cache, cache_key, &result);
        }
        Ok(Some(result))
    }

    /// Execute several structured requests as one combined statement
    pub async fn query_by_multi_struct(
        &self,
        req: &QueryMultiStructReq,
        user: &User,
    ) -> Result<Option<QueryResultWithSchema>, AppError> {
        let first = req.first().ok_or_else(|| {
            AppError::Validation("multi-struct request contains no queries".to_string())
        })?;

        let context = self.stats.init_struct_stat(first, user);
        let cache_key = ResultCache::generate_key(first.model_id, &req.command_md5());
        let is_cache = self.cache_enable && first.is_cache_enabled();

        if is_cache {
            if let Some(result) = self.query_by_cache(&cache_key, &context) {
                self.stats.finalize(&context, TaskStatus::Success);
                return Ok(Some(result));
            }
        }
        context.set_use_result_cache(false);

        match self
            .execute_multi_struct_query(req, is_cache, &cache_key)
            .await
        {
            Ok(result) => {
                self.stats.finalize(&context, TaskStatus::Success);
                Ok(result)
            }
            Err(e) => {
                tracing::warn!("exception in query_by_multi_struct: {}", e);
                self.stats.finalize(&context, TaskStatus::Error);
                Err(e)
            }
        }
    }

    async fn execute_multi_struct_query(
        &self,
        req: &QueryMultiStructReq,
        is_cache: bool,
        cache_key: &str,
    ) -> Result<Option<QueryResultWithSchema>, AppError> {
        let planned = futures::future::try_join_all(
            req.query_struct_reqs
                .iter()
                .map(|sub_req| self.engine.plan_struct(sub_req)),
        )
        .await?;

        for (index, statement) in planned.iter().enumerate() {
            QueryUtils::check_sql_parse(statement, index)?;
        }

        let mut combined = QueryUtils::union_statements(&planned)?;
        tracing::info!("multi-struct union statement: {}", combined.sql);

        let executor = match self.engine.route(&combined) {
            Some(executor) => executor,
            None => return Ok(None),
        };
        combined.mark_routed();

        let mut result = self.engine.execute_with(&executor, &mut combined).await?;
        QueryUtils::fill_item_name_info(&mut result, req);
        if is_cache {
            QueryUtils::cache_result_logic(&self.cache, cache_key, &result);
        }
        Ok(Some(result))
    }

    /// Look up the values a dimension takes by building a structured
    /// request and following the struct path
    pub async fn query_dim_value(
        &self,
        req: &QueryDimValueReq,
        user: &User,
    ) -> Result<Option<QueryResultWithSchema>, AppError> {
        let struct_req = QueryReqConverter::generate_dim_value_struct(req);
        self.query_by_struct(&struct_req, user).await
    }

    /// Plan without executing; returns the corrected SQL
    pub async fn explain(&self, req: &ExplainSqlReq) -> Result<ExplainResp, AppError> {
        let statement = match req {
            ExplainSqlReq::Sql(sql_req) => self.engine.plan_sql(sql_req).await?,
            ExplainSqlReq::Struct(struct_req) => self.engine.plan_struct(struct_req).await?,
        }
        .into_explain();

        Ok(ExplainResp {
            sql: statement.sql,
        })
    }

    pub async fn get_stat_info(&self, req: &ItemUseReq) -> Result<Vec<ItemUseResp>, AppError> {
        self.stats.get_stat_info(req).await
    }

    fn query_by_cache(&self, key: &str, context: &StatContext) -> Option<QueryResultWithSchema> {
        let result = self.cache.get(key)?;
        tracing::info!("serving struct query from cache, key: {}", key);
        context.update_result_cache_key(key);
        Some(result)
    }

    /// Caching requires the global switch and the per-request directive;
    /// a missing directive means disabled
    fn is_cache(&self, req: &QueryStructReq) -> bool {
        if !self.cache_enable {
            return false;
        }
        req.is_cache_enabled()
    }
}
