use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::correction::CorrectionPipeline;
use crate::models::{
    QueryResultWithSchema, QuerySqlReq, QueryStatement, QueryStructReq, SchemaFilterReq,
};
use crate::services::converter::QueryReqConverter;
use crate::services::executor::QueryExecutor;
use crate::services::schema_provider::SchemaProvider;

/// Plans statements and dispatches them to backend executors.
///
/// Planning is conversion followed by correction. Routing picks the first
/// registered executor that accepts the statement; registration order is
/// the tie-break, so routing is reproducible.
pub struct SemanticQueryEngine {
    schema_provider: Arc<dyn SchemaProvider>,
    converter: QueryReqConverter,
    pipeline: CorrectionPipeline,
    executors: Vec<Arc<dyn QueryExecutor>>,
}

impl SemanticQueryEngine {
    pub fn new(
        schema_provider: Arc<dyn SchemaProvider>,
        executors: Vec<Arc<dyn QueryExecutor>>,
    ) -> Self {
        Self {
            schema_provider,
            converter: QueryReqConverter,
            pipeline: CorrectionPipeline::standard(),
            executors,
        }
    }

    pub fn with_pipeline(mut self, pipeline: CorrectionPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Plan a structured request: convert against the model schema, then
    /// run the correction pipeline
    pub async fn plan_struct(&self, req: &QueryStructReq) -> Result<QueryStatement, AppError> {
        let schema = self
            .schema_provider
            .fetch_single_model_schema(req.model_id)
            .await
            .ok_or_else(|| {
                AppError::Conversion(format!("no schema found for model {}", req.model_id))
            })?;

        let mut statement = self.converter.convert_struct_req(req, &schema)?;
        self.pipeline.apply(&mut statement);
        Ok(statement)
    }

    /// Plan a raw-SQL request
    pub async fn plan_sql(&self, req: &QuerySqlReq) -> Result<QueryStatement, AppError> {
        let filter = SchemaFilterReq {
            model_ids: vec![req.model_id],
        };
        let schemas = self.schema_provider.fetch_model_schema(&filter).await?;

        let mut statement = self.converter.convert_sql_req(req, &schemas)?;
        self.pipeline.apply(&mut statement);
        Ok(statement)
    }

    /// Select the executor serving this statement, if any. `None` means
    /// nothing to execute, not an error.
    pub fn route(&self, statement: &QueryStatement) -> Option<Arc<dyn QueryExecutor>> {
        self.executors
            .iter()
            .find(|executor| executor.accept(statement))
            .cloned()
    }

    /// Route and execute in one step; used where an unroutable statement
    /// is a failure rather than an empty result
    pub async fn execute(
        &self,
        statement: &mut QueryStatement,
    ) -> Result<QueryResultWithSchema, AppError> {
        let executor = self.route(statement).ok_or_else(|| {
            AppError::Execution("no executor accepts this statement".to_string())
        })?;
        statement.mark_routed();
        self.execute_with(&executor, statement).await
    }

    /// Dispatch an already-routed statement to its executor
    pub async fn execute_with(
        &self,
        executor: &Arc<dyn QueryExecutor>,
        statement: &mut QueryStatement,
    ) -> Result<QueryResultWithSchema, AppError> {
        statement.mark_executing();
        tracing::debug!(
            executor = executor.name(),
            "executing statement: {}",
            statement.sql
        );

        match executor.execute(statement).await {
            Ok(result) => {
                statement.mark_succeeded();
                Ok(result)
            }
            Err(e) => {
                statement.mark_failed();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueryColumn, QueryState, QueryType, SchemaItem, ModelSchema};
    use crate::services::schema_provider::StaticSchemaProvider;

    struct StubExecutor {
        name: &'static str,
        accepts: bool,
    }

    #[async_trait::async_trait]
    impl QueryExecutor for StubExecutor {
        fn name(&self) -> &'static str {
            self.name
        }

        fn accept(&self, _statement: &QueryStatement) -> bool {
            self.accepts
        }

        async fn execute(
            &self,
            _statement: &QueryStatement,
        ) -> Result<QueryResultWithSchema, AppError> {
            Ok(QueryResultWithSchema::new(
                vec![QueryColumn::new("a")],
                vec![serde_json::json!({"a": 1})],
            ))
        }
    }

    fn provider_with_model() -> Arc<StaticSchemaProvider> {
        let provider = StaticSchemaProvider::new();
        provider.register(ModelSchema {
            model_id: 1,
            name: "visits".to_string(),
            table_name: "t_visits".to_string(),
            dimensions: vec![SchemaItem::new("city", "City")],
            metrics: vec![SchemaItem::new("pv", "Page Views")],
        });
        Arc::new(provider)
    }

    #[tokio::test]
    async fn test_route_first_match_in_registration_order() {
        let engine = SemanticQueryEngine::new(
            provider_with_model(),
            vec![
                Arc::new(StubExecutor {
                    name: "first",
                    accepts: true,
                }),
                Arc::new(StubExecutor {
                    name: "second",
                    accepts: true,
                }),
            ],
        );

        let statement = QueryStatement::new(1, "SELECT a FROM t".to_string(), QueryType::Sql);
        let executor = engine.route(&statement).unwrap();
        assert_eq!(executor.name(), "first");
    }

    #[tokio::test]
    async fn test_route_none_when_no_executor_accepts() {
        let engine = SemanticQueryEngine::new(
            provider_with_model(),
            vec![Arc::new(StubExecutor {
                name: "declines",
                accepts: false,
            })],
        );

        let statement = QueryStatement::new(1, "SELECT a FROM t".to_string(), QueryType::Sql);
        assert!(engine.route(&statement).is_none());
    }

    #[tokio::test]
    async fn test_plan_struct_converts_and_corrects() {
        let engine = SemanticQueryEngine::new(provider_with_model(), vec![]);
        let mut req = QueryStructReq::new(1);
        req.groups = vec!["city".to_string()];

        let statement = engine.plan_struct(&req).await.unwrap();
        assert_eq!(statement.sql, "SELECT city FROM t_visits");
        assert_eq!(statement.state, QueryState::Planned);
    }

    #[tokio::test]
    async fn test_plan_struct_unknown_model_is_conversion_error() {
        let engine = SemanticQueryEngine::new(provider_with_model(), vec![]);
        let req = QueryStructReq::new(42);

        let result = engine.plan_struct(&req).await;
        assert!(matches!(result, Err(AppError::Conversion(_))));
    }

    #[tokio::test]
    async fn test_execute_marks_state_machine() {
        let engine = SemanticQueryEngine::new(
            provider_with_model(),
            vec![Arc::new(StubExecutor {
                name: "ok",
                accepts: true,
            })],
        );

        let mut statement = QueryStatement::new(1, "SELECT a FROM t".to_string(), QueryType::Sql);
        let result = engine.execute(&mut statement).await.unwrap();

        assert_eq!(statement.state, QueryState::Succeeded);
        assert_eq!(result.result_list.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_without_executor_is_execution_error() {
        let engine = SemanticQueryEngine::new(provider_with_model(), vec![]);
        let mut statement = QueryStatement::new(1, "SELECT a FROM t".to_string(), QueryType::Sql);

        let result = engine.execute(&mut statement).await;
        assert!(matches!(result, Err(AppError::Execution(_))));
    }
}
