//! Reader error types
//!
//! Open-time errors are terminal for a session; render errors only affect
//! the page that was requested.

use thiserror::Error;

/// Errors raised while opening a source
#[derive(Debug, Error)]
pub enum OpenError {
    /// No extractor claims the file extension
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Container structure could not be parsed
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// Container parsed but yielded no page after filtering
    #[error("No readable pages in {0}")]
    NoReadablePages(String),

    /// Extraction workspace could not be created or written
    #[error("Temp storage failure: {0}")]
    TempStorageFailure(String),

    /// IO error while reading the source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Open did not finish in time
    #[error("Open timed out after {0} seconds")]
    Timeout(u64),
}

/// Errors raised while rendering a single page
#[derive(Debug, Error)]
pub enum RenderError {
    /// Index outside `0..page_count`
    #[error("Page index {index} out of range (page count {page_count})")]
    IndexOutOfRange { index: i64, page_count: usize },

    /// Page bytes are not a decodable image
    #[error("Decode failure on page {index}: {reason}")]
    DecodeFailure { index: usize, reason: String },

    /// Extracted page could not be read back from the workspace
    #[error("Temp storage failure: {0}")]
    TempStorageFailure(String),

    /// Reader was closed
    #[error("Reader is closed")]
    Closed,

    /// Reader was never opened
    #[error("Reader is not open")]
    NotOpen,

    /// Render did not finish in time
    #[error("Render timed out after {0} seconds")]
    Timeout(u64),

    /// IO error while reading page bytes
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Shorthand for a decode failure on `index`
    pub fn decode(index: usize, reason: impl std::fmt::Display) -> Self {
        RenderError::DecodeFailure {
            index,
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for open operations
pub type OpenResult<T> = std::result::Result<T, OpenError>;

/// Result type alias for render operations
pub type RenderResult<T> = std::result::Result<T, RenderError>;

impl From<mupdf::Error> for OpenError {
    fn from(err: mupdf::Error) -> Self {
        OpenError::CorruptArchive(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RenderError::IndexOutOfRange {
            index: -1,
            page_count: 3,
        };
        assert_eq!(err.to_string(), "Page index -1 out of range (page count 3)");

        let err = OpenError::UnsupportedFormat("docx".into());
        assert_eq!(err.to_string(), "Unsupported format: docx");
    }
}
