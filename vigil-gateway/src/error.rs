use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),

    #[error("server error: {0}")]
    Server(String),

    /// Rejected client input (bad `k`, blank query). Maps to HTTP 400.
    #[error("{0}")]
    InvalidArgument(String),

    /// The query itself could not be embedded.
    #[error("query embedding failed: {source}")]
    Embedding {
        #[from]
        source: vigil_embed::EmbedError,
    },
}
