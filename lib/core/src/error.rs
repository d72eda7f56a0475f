use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid interaction: {0}")]
    InvalidInteraction(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Item is already being processed: {0}")]
    ConcurrentProcessingConflict(String),

    #[error("Input matrix not found: {0}")]
    MatrixNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<cosim_similarity::RegistryError> for Error {
    fn from(e: cosim_similarity::RegistryError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
