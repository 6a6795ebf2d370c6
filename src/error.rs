//! Error types for the content removal engine.
//!
//! Errors are split by how the engine reacts to them: invalid input aborts an
//! operation, while element and toolkit failures are isolated, logged and
//! recorded in the edit report so the rest of a batch still goes through.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for engine operations.
pub type UnmarkResult<T> = Result<T, UnmarkError>;

/// Error type for all engine operations.
#[derive(Debug)]
pub enum UnmarkError {
    /// Error occurred while reading or writing files
    Io { path: PathBuf, source: io::Error },

    /// Malformed targets, overlays or out-of-range page indices.
    /// The only kind that aborts a whole operation.
    InvalidInput { parameter: String, reason: String },

    /// A single removal target or overlay element could not be matched,
    /// resolved or rendered
    ElementProcessing { element: String, reason: String },

    /// The PDF toolkit failed on an operation (corrupt object, unreadable stream)
    Toolkit {
        operation: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Document-level processing error
    PdfProcessing {
        message: String,
        page: Option<usize>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A signature could not be turned into a stream pattern
    Pattern { signature: String, reason: String },
}

impl UnmarkError {
    /// Shorthand for an input validation failure.
    pub fn invalid_input(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a per-element failure.
    pub fn element(element: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ElementProcessing {
            element: element.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a toolkit failure without an underlying source.
    pub fn toolkit(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Toolkit {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error must abort the surrounding operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::Io { .. })
    }
}

impl fmt::Display for UnmarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "IO error for path '{}': {}", path.display(), source)
            }
            Self::InvalidInput { parameter, reason } => {
                write!(f, "Invalid input for '{}': {}", parameter, reason)
            }
            Self::ElementProcessing { element, reason } => {
                write!(f, "Element '{}' could not be processed: {}", element, reason)
            }
            Self::Toolkit {
                operation, message, ..
            } => {
                write!(f, "Toolkit error during {}: {}", operation, message)
            }
            Self::PdfProcessing { message, page, .. } => {
                if let Some(p) = page {
                    write!(f, "PDF processing error on page {}: {}", p, message)
                } else {
                    write!(f, "PDF processing error: {}", message)
                }
            }
            Self::Pattern { signature, reason } => {
                write!(f, "Pattern error for signature '{}': {}", signature, reason)
            }
        }
    }
}

impl std::error::Error for UnmarkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::PdfProcessing { source, .. } | Self::Toolkit { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl From<io::Error> for UnmarkError {
    fn from(err: io::Error) -> Self {
        Self::Toolkit {
            operation: "std::io".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<regex::Error> for UnmarkError {
    fn from(err: regex::Error) -> Self {
        Self::Pattern {
            signature: "<unknown>".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for UnmarkError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput {
            parameter: "json".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<lopdf::Error> for UnmarkError {
    fn from(err: lopdf::Error) -> Self {
        Self::Toolkit {
            operation: "lopdf".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<crate::content::ContentError> for UnmarkError {
    fn from(err: crate::content::ContentError) -> Self {
        Self::Pattern {
            signature: err.signature().to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for UnmarkError {
    fn from(err: anyhow::Error) -> Self {
        Self::Toolkit {
            operation: "anyhow".to_string(),
            message: err.to_string(),
            source: None,
        }
    }
}
