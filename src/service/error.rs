use std::path::PathBuf;

use thiserror::Error;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{operation}: transport error: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation}: request failed with status {status}: {body}")]
    HttpStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{operation}: unexpected response payload: {source}")]
    Parse {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("event stream error: {0}")]
    Stream(String),

    #[error("failed to read {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("vector store {id} finished indexing with status '{status}'")]
    VectorStoreNotReady { id: String, status: String },
}

impl ServiceError {
    pub fn transport(operation: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Transport { operation, source }
    }

    pub fn parse(operation: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| Self::Parse { operation, source }
    }
}
