use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("model '{name}' already exists under '{parent}'")]
    NameConflict { parent: String, name: String },

    #[error("model not found: {0}")]
    NotFound(String),

    #[error("bad connection: {0}")]
    BadConnection(String),
}
