use thiserror::Error;

/// Errors from a call to the chat backend.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request to backend failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend responded with status {0}")]
    Status(reqwest::StatusCode),

    #[error("could not decode backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors from the local key-value storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage entry '{key}' is not accessible: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not determine a data directory")]
    NoDataDir,
}
