
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FacetbaseError {
    #[error("Syntax error: {message}")]
    Syntax { message: String, position: Option<usize> },
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Type mismatch: {0}")]
    Type(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

impl FacetbaseError {
    pub(crate) fn syntax(message: impl Into<String>, position: Option<usize>) -> Self {
        Self::Syntax { message: message.into(), position }
    }
}

pub type Result<T> = std::result::Result<T, FacetbaseError>;
