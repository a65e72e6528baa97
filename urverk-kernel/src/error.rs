use thiserror::Error;

use urverk_core::error::ValueError;
use urverk_graph::GraphError;
use urverk_loader::LoadError;

/// Raised by model code: a bad input type, an impossible state, anything the
/// dynamics itself considers fatal for the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ModellingError(pub String);

impl ModellingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<ValueError> for ModellingError {
    fn from(err: ValueError) -> Self {
        Self(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Load(#[from] LoadError),

    /// A catalogue name referenced by the scenario does not resolve.
    #[error("scenario binding error: {0}")]
    Binding(String),

    #[error("model '{model}' failed: {source}")]
    Modelling {
        model: String,
        source: ModellingError,
    },

    #[error("synchronous request cycle through '{0}'")]
    RoutingCycle(String),

    /// Scheduler invariant violated; this should not occur and aborts the
    /// host with a diagnostic.
    #[error("scheduler invariant violated: {0}")]
    InternalInvariant(String),
}

impl KernelError {
    /// Errors that end the run but still allow a partial summary: the
    /// current bag is abandoned and `finish` runs best-effort.
    pub fn is_run_failure(&self) -> bool {
        matches!(
            self,
            KernelError::Modelling { .. } | KernelError::RoutingCycle(_)
        )
    }
}
