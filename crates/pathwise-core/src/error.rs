use pathwise_graph::GraphError;

use crate::gateway::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("skill graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    #[error("invalid performance: {0}")]
    InvalidPerformance(String),

    #[error("invalid goal: {0}")]
    InvalidGoal(String),

    #[error("invalid insight: {0}")]
    InvalidInsight(String),

    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("catalog parse error: {0}")]
    CatalogParse(#[from] toml::de::Error),

    #[error("path invariant violated: {0}")]
    PathInvariant(String),

    #[error("learning path for {0} has no remaining activities")]
    PathFinished(String),

    #[error("developer not enrolled: {0}")]
    NotEnrolled(String),

    #[error("developer already enrolled: {0}")]
    AlreadyEnrolled(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl EngineError {
    /// Map graph lookups that failed on an unknown id to `UnknownSkill`.
    pub(crate) fn from_graph(err: GraphError) -> Self {
        match err {
            GraphError::UnknownSkill(id) => Self::UnknownSkill(id),
            other => Self::Graph(other),
        }
    }
}
