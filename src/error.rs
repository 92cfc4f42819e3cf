use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrderServiceError {
    #[error("IOError: {source:?}")]
    IOError {
        #[from]
        source: std::io::Error,
    },
    // from serde_json::Error
    #[error("JsonError: {source:?}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },
    // from httparse::Error
    #[error("HeaderParseError: {source:?}")]
    HeaderParseError {
        #[from]
        source: httparse::Error,
    },
    // from std::num::ParseIntError
    #[error("ParseIntError: {source:?}")]
    ParseIntError {
        #[from]
        source: std::num::ParseIntError,
    },
    #[error("ReadTimeout: {details:?}")]
    ReadTimeout { details: String },
    #[error("RequestLineTooLong")]
    RequestLineTooLong,
    #[error("HeadTooLarge")]
    HeadTooLarge,
    #[error("PayloadTooLarge: {length}")]
    PayloadTooLarge { length: usize },
    #[error("EmptyRequest")]
    EmptyRequest,
    #[error("IncompleteRequestLine: {line:?}")]
    IncompleteRequestLine { line: String },
}

impl OrderServiceError {
    /// Connections that end this way are closed without a response and without noise.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            OrderServiceError::EmptyRequest | OrderServiceError::IncompleteRequestLine { .. }
        )
    }
}
