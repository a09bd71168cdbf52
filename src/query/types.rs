use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one search for the life of a client session. Generated on the
/// source node and used to address the result collector from the polling path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct QueryKey(pub String);

impl QueryKey {
    /// Generates a new random UUID v4-based key.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for QueryKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to the index a query runs against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSourceRef {
    pub uuid: Uuid,
    pub name: String,
}

/// Reference to an extraction pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PipelineRef {
    pub uuid: Uuid,
    pub name: String,
}

/// A bound query parameter, referenced from term values as `${key}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

/// Comparison applied by a leaf term.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Condition {
    Equals,
    Contains,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
}

/// Boolean expression tree over named index fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExpressionNode {
    And(Vec<ExpressionNode>),
    Or(Vec<ExpressionNode>),
    Not(Box<ExpressionNode>),
    Term {
        field: String,
        condition: Condition,
        value: String,
    },
}

impl ExpressionNode {
    pub fn term(field: impl Into<String>, condition: Condition, value: impl Into<String>) -> Self {
        Self::Term {
            field: field.into(),
            condition,
            value: value.into(),
        }
    }
}

/// Immutable description of one search. Created by the client and read-only
/// for the life of the search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub data_source: DataSourceRef,
    pub expression: ExpressionNode,
    pub params: Vec<Param>,
}

impl Query {
    pub fn new(data_source: DataSourceRef, expression: ExpressionNode) -> Self {
        Self {
            data_source,
            expression,
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Param>) -> Self {
        self.params = params;
        self
    }
}
