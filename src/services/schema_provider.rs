use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::api::middleware::AppError;
use crate::models::{ModelSchema, SchemaFilterReq};

/// Source of model metadata consumed by converters and the statistics
/// context. Implementations must tolerate concurrent readers.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn fetch_model_schema(
        &self,
        filter: &SchemaFilterReq,
    ) -> Result<Vec<ModelSchema>, AppError>;

    async fn fetch_single_model_schema(&self, model_id: i64) -> Option<ModelSchema>;
}

/// In-memory schema registry, optionally seeded from a JSON file
pub struct StaticSchemaProvider {
    models: RwLock<HashMap<i64, ModelSchema>>,
}

impl StaticSchemaProvider {
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Load schemas from a JSON file containing an array of model schemas
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            AppError::Internal(format!(
                "failed to read models file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let schemas: Vec<ModelSchema> = serde_json::from_str(&content)
            .map_err(|e| AppError::Internal(format!("failed to parse models file: {}", e)))?;

        let provider = Self::new();
        for schema in schemas {
            provider.register(schema);
        }
        Ok(provider)
    }

    pub fn register(&self, schema: ModelSchema) {
        self.models
            .write()
            .unwrap()
            .insert(schema.model_id, schema);
    }
}

impl Default for StaticSchemaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn fetch_model_schema(
        &self,
        filter: &SchemaFilterReq,
    ) -> Result<Vec<ModelSchema>, AppError> {
        let models = self.models.read().unwrap();
        Ok(filter
            .model_ids
            .iter()
            .filter_map(|model_id| models.get(model_id).cloned())
            .collect())
    }

    async fn fetch_single_model_schema(&self, model_id: i64) -> Option<ModelSchema> {
        self.models.read().unwrap().get(&model_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SchemaItem;

    fn sample_schema(model_id: i64) -> ModelSchema {
        ModelSchema {
            model_id,
            name: format!("model-{}", model_id),
            table_name: format!("t_{}", model_id),
            dimensions: vec![SchemaItem::new("city", "City")],
            metrics: vec![SchemaItem::new("pv", "Page Views")],
        }
    }

    #[tokio::test]
    async fn test_fetch_single_schema() {
        let provider = StaticSchemaProvider::new();
        provider.register(sample_schema(1));

        assert!(provider.fetch_single_model_schema(1).await.is_some());
        assert!(provider.fetch_single_model_schema(2).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_filtered_schemas() {
        let provider = StaticSchemaProvider::new();
        provider.register(sample_schema(1));
        provider.register(sample_schema(2));

        let filter = SchemaFilterReq {
            model_ids: vec![1, 3],
        };
        let schemas = provider.fetch_model_schema(&filter).await.unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].model_id, 1);
    }
}
