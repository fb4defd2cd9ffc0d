use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document is not an object: {0}")]
    NotAnObject(String),

    #[error("Invalid field path: {0}")]
    InvalidPath(String),

    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
