use thiserror::Error;

use crate::wikipedia::WikipediaError;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Upstream producer error: {0}")]
    Upstream(String),

    #[error("Graph invariant violated: {0}")]
    Integrity(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<WikipediaError> for GraphError {
    fn from(e: WikipediaError) -> Self {
        match e {
            WikipediaError::ArticleNotFound { title } => {
                GraphError::NotFound(format!("Wikipedia article '{}'", title))
            }
            other => GraphError::Upstream(other.to_string()),
        }
    }
}
