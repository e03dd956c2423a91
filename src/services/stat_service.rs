use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::api::middleware::AppError;
use crate::models::{
    ItemUseReq, ItemUseResp, QueryStat, QuerySqlReq, QueryStructReq, QueryType, TaskStatus, User,
};
use crate::services::schema_provider::SchemaProvider;
use crate::storage::stat_repository::StatRepository;
use crate::validation::select_helper;

/// Request-scoped statistics context.
///
/// One context exists per in-flight request and is passed explicitly
/// through the request's call chain, never stored in ambient thread state.
/// Finalizing takes the record out, so later code on the same worker can
/// only observe an empty context.
pub struct StatContext {
    inner: Mutex<Option<QueryStat>>,
}

impl StatContext {
    fn new(stat: QueryStat) -> Self {
        Self {
            inner: Mutex::new(Some(stat)),
        }
    }

    /// Record that a cache hit served this request
    pub fn update_result_cache_key(&self, key: &str) {
        let mut guard = self.inner.lock().unwrap();
        match guard.as_mut() {
            Some(stat) => stat.result_cache_key = Some(key.to_string()),
            None => tracing::debug!("stat context already finalized, dropping cache key"),
        }
    }

    pub fn set_use_result_cache(&self, used: bool) {
        if let Some(stat) = self.inner.lock().unwrap().as_mut() {
            stat.use_result_cache = used;
        }
    }

    /// Copy of the record while the context is still attached
    pub fn snapshot(&self) -> Option<QueryStat> {
        self.inner.lock().unwrap().clone()
    }

    fn take(&self) -> Option<QueryStat> {
        self.inner.lock().unwrap().take()
    }
}

/// Builds statistics contexts and flushes them to the repository without
/// blocking the request path.
pub struct StatService {
    repository: Arc<dyn StatRepository>,
    schema_provider: Arc<dyn SchemaProvider>,
}

impl StatService {
    pub fn new(
        repository: Arc<dyn StatRepository>,
        schema_provider: Arc<dyn SchemaProvider>,
    ) -> Self {
        Self {
            repository,
            schema_provider,
        }
    }

    /// Initialize the context for a raw-SQL request. Dimension and metric
    /// names are resolved by intersecting the fields referenced in the SQL
    /// with the model schema.
    pub async fn init_sql_stat(&self, req: &QuerySqlReq, user: &User) -> StatContext {
        let all_fields = select_helper::get_all_fields(&req.sql);

        let (dimensions, metrics) = match self
            .schema_provider
            .fetch_single_model_schema(req.model_id)
            .await
        {
            Some(schema) => (
                schema.matching_dimensions(&all_fields),
                schema.matching_metrics(&all_fields),
            ),
            None => (Vec::new(), Vec::new()),
        };

        let stat = QueryStat {
            trace_id: Uuid::new_v4().to_string(),
            model_id: req.model_id,
            user: user.display_name().to_string(),
            query_type: QueryType::Sql.as_str().to_string(),
            query_text: req.command_text(),
            query_text_md5: req.command_md5(),
            start_time_ms: Utc::now().timestamp_millis(),
            use_result_cache: true,
            use_sql_cache: true,
            dimensions: serde_json::to_string(&dimensions).unwrap_or_default(),
            metrics: serde_json::to_string(&metrics).unwrap_or_default(),
            ..Default::default()
        };

        StatContext::new(stat)
    }

    /// Initialize the context for a structured request; groups and
    /// aggregator columns are the resolved dimension/metric names
    pub fn init_struct_stat(&self, req: &QueryStructReq, user: &User) -> StatContext {
        let metrics: Vec<&str> = req
            .aggregators
            .iter()
            .map(|aggregator| aggregator.column.as_str())
            .collect();
        let filter_cols: Vec<&str> = req
            .dimension_filters
            .iter()
            .map(|filter| filter.biz_name.as_str())
            .collect();

        let stat = QueryStat {
            trace_id: Uuid::new_v4().to_string(),
            model_id: req.model_id,
            user: user.display_name().to_string(),
            query_type: QueryType::Struct.as_str().to_string(),
            query_text: req.command_text(),
            query_text_md5: req.command_md5(),
            start_time_ms: Utc::now().timestamp_millis(),
            native_query: req.native_query,
            group_by_cols: serde_json::to_string(&req.groups).unwrap_or_default(),
            agg_cols: serde_json::to_string(&req.aggregators).unwrap_or_default(),
            order_by_cols: serde_json::to_string(&req.orders).unwrap_or_default(),
            filter_cols: serde_json::to_string(&filter_cols).unwrap_or_default(),
            use_result_cache: true,
            use_sql_cache: true,
            dimensions: serde_json::to_string(&req.groups).unwrap_or_default(),
            metrics: serde_json::to_string(&metrics).unwrap_or_default(),
            ..Default::default()
        };

        StatContext::new(stat)
    }

    /// Finalize the context: compute elapsed time and terminal status, then
    /// hand the record to a detached persistence task. Returns before the
    /// flush completes; a persistence failure is logged and swallowed. The
    /// context is cleared here, before the flush lands.
    pub fn finalize(&self, context: &StatContext, status: TaskStatus) {
        let mut stat = match context.take() {
            Some(stat) => stat,
            None => {
                tracing::warn!("finalize called on an already-cleared stat context");
                return;
            }
        };

        stat.elapsed_ms = Utc::now().timestamp_millis() - stat.start_time_ms;
        stat.query_state = status.as_str().to_string();
        tracing::info!(
            trace_id = %stat.trace_id,
            model_id = stat.model_id,
            state = %stat.query_state,
            elapsed_ms = stat.elapsed_ms,
            "query stat finalized"
        );

        let repository = Arc::clone(&self.repository);
        tokio::spawn(async move {
            if let Err(e) = repository.create_record(stat).await {
                tracing::warn!("failed to persist query stat: {}", e);
            }
        });
    }

    pub async fn get_stat_info(&self, filter: &ItemUseReq) -> Result<Vec<ItemUseResp>, AppError> {
        self.repository.get_stat_info(filter).await
    }

    pub async fn get_raw_stat_info(&self, filter: &ItemUseReq) -> Result<Vec<QueryStat>, AppError> {
        self.repository.get_raw_stat_info(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelSchema, SchemaItem};
    use crate::services::schema_provider::StaticSchemaProvider;
    use std::time::{Duration, Instant};

    /// Repository stub that records after an artificial delay
    struct SlowRepository {
        records: Arc<Mutex<Vec<QueryStat>>>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl StatRepository for SlowRepository {
        async fn create_record(&self, stat: QueryStat) -> Result<(), AppError> {
            tokio::time::sleep(self.delay).await;
            self.records.lock().unwrap().push(stat);
            Ok(())
        }

        async fn get_stat_info(&self, _: &ItemUseReq) -> Result<Vec<ItemUseResp>, AppError> {
            Ok(Vec::new())
        }

        async fn get_raw_stat_info(&self, _: &ItemUseReq) -> Result<Vec<QueryStat>, AppError> {
            Ok(self.records.lock().unwrap().clone())
        }
    }

    fn service_with(
        delay: Duration,
    ) -> (StatService, Arc<Mutex<Vec<QueryStat>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let repository = Arc::new(SlowRepository {
            records: Arc::clone(&records),
            delay,
        });
        let provider = StaticSchemaProvider::new();
        provider.register(ModelSchema {
            model_id: 1,
            name: "songs".to_string(),
            table_name: "t_songs".to_string(),
            dimensions: vec![SchemaItem::new("singer_name", "Singer")],
            metrics: vec![SchemaItem::new("play_count", "Plays")],
        });
        (
            StatService::new(repository, Arc::new(provider)),
            records,
        )
    }

    fn struct_req() -> QueryStructReq {
        let mut req = QueryStructReq::new(1);
        req.groups = vec!["singer_name".to_string()];
        req
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_finalize_returns_before_flush_completes() {
        let (service, records) = service_with(Duration::from_millis(200));
        let context = service.init_struct_stat(&struct_req(), &User::new("alice"));

        let started = Instant::now();
        service.finalize(&context, TaskStatus::Success);
        assert!(started.elapsed() < Duration::from_millis(100));

        // not yet flushed, and the context is already cleared
        assert!(records.lock().unwrap().is_empty());
        assert!(context.snapshot().is_none());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let flushed = records.lock().unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].query_state, "SUCCESS");
        assert_eq!(flushed[0].user, "alice");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_contexts_are_isolated_between_requests() {
        let (service, _) = service_with(Duration::from_millis(0));
        let first = service.init_struct_stat(&struct_req(), &User::new("alice"));
        let second = service.init_struct_stat(&struct_req(), &User::new("bob"));

        first.update_result_cache_key("1_abc");

        assert_eq!(
            first.snapshot().unwrap().result_cache_key,
            Some("1_abc".to_string())
        );
        assert!(second.snapshot().unwrap().result_cache_key.is_none());
        assert_ne!(
            first.snapshot().unwrap().trace_id,
            second.snapshot().unwrap().trace_id
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cleared_context_ignores_late_updates() {
        let (service, records) = service_with(Duration::from_millis(0));
        let context = service.init_struct_stat(&struct_req(), &User::new("alice"));

        service.finalize(&context, TaskStatus::Error);
        // double finalize and post-finalize updates are no-ops
        service.finalize(&context, TaskStatus::Success);
        context.update_result_cache_key("1_abc");

        tokio::time::sleep(Duration::from_millis(100)).await;
        let flushed = records.lock().unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].query_state, "ERROR");
        assert!(flushed[0].result_cache_key.is_none());
    }

    #[tokio::test]
    async fn test_sql_stat_resolves_fields_from_schema() {
        let (service, _) = service_with(Duration::from_millis(0));
        let req = QuerySqlReq {
            model_id: 1,
            sql: "select singer_name from t_songs order by play_count desc".to_string(),
        };

        let context = service.init_sql_stat(&req, &User::new("")).await;
        let stat = context.snapshot().unwrap();

        assert_eq!(stat.user, "Admin");
        assert_eq!(stat.query_type, "SQL");
        assert_eq!(stat.dimensions, r#"["singer_name"]"#);
        assert_eq!(stat.metrics, r#"["play_count"]"#);
    }
}
