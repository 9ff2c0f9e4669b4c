use thiserror::Error;

/// Errors raised while turning IIIF request components into typed values.
///
/// The HTTP layer maps [`IiifError::InvalidArgument`] to 400 Bad Request and
/// [`IiifError::UnsupportedFormat`] to 415 Unsupported Media Type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IiifError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
}

impl IiifError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
