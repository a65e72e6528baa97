use thiserror::Error;

use urverk_graph::GraphError;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scenario parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("scenario validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("invalid scenario: {0}")]
    Invalid(String),
}
