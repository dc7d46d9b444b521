use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KmnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Syntax error at {path}:{line}:{column}: {message}")]
    Syntax {
        path: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Cannot reconstruct KMN from `{construct}`: {message}")]
    Reconstruction { construct: String, message: String },

    #[error("Invalid compiler configuration: {0}")]
    Configuration(String),

    #[error("Keyboard \"{name}\" cannot be converted to LDML: {reason}")]
    UnsupportedKeyboard { name: String, reason: String },

    #[error("LDML XML error: {0}")]
    Xml(String),

    #[error("Touch layout JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KmnError {
    pub fn reconstruction(construct: impl Into<String>, message: impl Into<String>) -> Self {
        KmnError::Reconstruction {
            construct: construct.into(),
            message: message.into(),
        }
    }

    /// Wraps any displayable XML library error.
    pub fn xml<E: fmt::Display>(err: E) -> Self {
        KmnError::Xml(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KmnError>;

/// Non-fatal diagnostics produced while generating either target format.
///
/// Every construct a generator drops is reported here, so callers can audit the
/// lossy boundary between KMN, LDML and the touch layout without a logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    SkippedRule { line: usize, reason: String },
    DroppedModifier { line: usize, modifier: String },
    DuplicateKeyRule { line: usize, key_id: String },
    UnplacedKey { key_id: String },
    DroppedElement { line: usize, element: String },
    DroppedStore { name: String, reason: String },
    LookupMiss { key_id: String },
    FlickNotFound { flick_id: String, key_id: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SkippedRule { line, reason } => {
                write!(f, "line {}: rule skipped: {}", line, reason)
            }
            Warning::DroppedModifier { line, modifier } => {
                write!(f, "line {}: modifier {} has no LDML equivalent and was dropped", line, modifier)
            }
            Warning::DuplicateKeyRule { line, key_id } => {
                write!(f, "line {}: key {} already has an output, later rule ignored", line, key_id)
            }
            Warning::UnplacedKey { key_id } => {
                write!(f, "key {} has no position in the hardware form and is left off the layers", key_id)
            }
            Warning::DroppedElement { line, element } => {
                write!(f, "line {}: {} has no LDML equivalent and was dropped", line, element)
            }
            Warning::DroppedStore { name, reason } => {
                write!(f, "store {} dropped: {}", name, reason)
            }
            Warning::LookupMiss { key_id } => {
                write!(f, "key {} is not defined in the key bag", key_id)
            }
            Warning::FlickNotFound { flick_id, key_id } => {
                write!(f, "flick {} referenced by key {} is not defined", flick_id, key_id)
            }
        }
    }
}
