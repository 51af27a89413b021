use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid projection: {0}")]
    Invalid(String),

    #[error("invalid column path '{path}': {reason}")]
    Path { path: String, reason: String },
}
