use serde::{Deserialize, Serialize};

/// A dimension or metric exposed by a model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaItem {
    /// Physical/business column name referenced in SQL
    pub biz_name: String,
    /// Display name
    pub name: String,
}

impl SchemaItem {
    pub fn new(biz_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            biz_name: biz_name.into(),
            name: name.into(),
        }
    }
}

/// Snapshot of a model's queryable surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSchema {
    pub model_id: i64,
    pub name: String,
    /// Table the rendered SQL selects from
    pub table_name: String,
    #[serde(default)]
    pub dimensions: Vec<SchemaItem>,
    #[serde(default)]
    pub metrics: Vec<SchemaItem>,
}

impl ModelSchema {
    /// Intersect field names referenced in a query with this schema's dimensions
    pub fn matching_dimensions(&self, fields: &[String]) -> Vec<String> {
        Self::matching(&self.dimensions, fields)
    }

    /// Intersect field names referenced in a query with this schema's metrics
    pub fn matching_metrics(&self, fields: &[String]) -> Vec<String> {
        Self::matching(&self.metrics, fields)
    }

    fn matching(items: &[SchemaItem], fields: &[String]) -> Vec<String> {
        fields
            .iter()
            .filter(|field| items.iter().any(|item| &item.biz_name == *field))
            .cloned()
            .collect()
    }
}

/// Filter for a batched schema fetch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaFilterReq {
    pub model_ids: Vec<i64>,
}
