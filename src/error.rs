use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<Option<usize>>,
        actual: Vec<Option<usize>>,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Layer name '{0}' is used by more than one layer in the model")]
    DuplicateLayerName(String),

    #[error("Layer '{0}' has not been built; give it `in_channels` or call it on a node first")]
    NotBuilt(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Unknown node reference {layer}[{index}]")]
    UnknownNode { layer: String, index: usize },

    /// Raised for operations that need a static graph on a dynamic model.
    #[error("{operation} is not supported for dynamic models: no static graph exists")]
    NoStaticGraph { operation: &'static str },

    #[error("Model file {path} contains no weights; load it with load_weights = false")]
    MissingWeights { path: String },

    #[error("Model file {path} contains no model structure")]
    MissingConfig { path: String },

    #[error("State dict mismatch: {0}")]
    StateDict(String),

    #[error("Invalid model file: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Config error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraphError {
    /// True for errors raised when a model lacks what an operation needs at
    /// run time (no static graph, no weights, no structure).
    pub fn is_runtime(&self) -> bool {
        matches!(
            self,
            GraphError::NoStaticGraph { .. }
                | GraphError::MissingWeights { .. }
                | GraphError::MissingConfig { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_classification() {
        assert!(GraphError::NoStaticGraph { operation: "save" }.is_runtime());
        assert!(GraphError::MissingWeights { path: "a".into() }.is_runtime());
        assert!(GraphError::MissingConfig { path: "a".into() }.is_runtime());
        assert!(!GraphError::InvalidParameter("x".into()).is_runtime());
    }

    #[test]
    fn messages_name_the_operation() {
        let err = GraphError::NoStaticGraph { operation: "Model::config" };
        assert!(err.to_string().contains("Model::config"));
    }
}
