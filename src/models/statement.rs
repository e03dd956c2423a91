use serde::{Deserialize, Serialize};

/// Which conversion path produced a statement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    Sql,
    Struct,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Sql => "SQL",
            QueryType::Struct => "STRUCT",
        }
    }
}

/// Lifecycle of a statement inside the routing/execution engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryState {
    Planned,
    Routed,
    Executing,
    Succeeded,
    Failed,
}

/// Terminal status recorded in the statistics context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Success,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Error => "ERROR",
        }
    }
}

/// Canonical internal statement built from any request type.
///
/// Created by a converter, mutated in place by the correction pipeline,
/// then dispatched to whichever executor claims it. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatement {
    pub model_id: i64,
    pub sql: String,
    pub query_type: QueryType,
    pub is_explain: bool,
    pub state: QueryState,
}

impl QueryStatement {
    pub fn new(model_id: i64, sql: String, query_type: QueryType) -> Self {
        Self {
            model_id,
            sql,
            query_type,
            is_explain: false,
            state: QueryState::Planned,
        }
    }

    pub fn into_explain(mut self) -> Self {
        self.is_explain = true;
        self
    }

    pub fn mark_routed(&mut self) {
        self.state = QueryState::Routed;
    }

    pub fn mark_executing(&mut self) {
        self.state = QueryState::Executing;
    }

    pub fn mark_succeeded(&mut self) {
        self.state = QueryState::Succeeded;
    }

    pub fn mark_failed(&mut self) {
        self.state = QueryState::Failed;
    }
}
