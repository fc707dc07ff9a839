#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_PARSE: &str = "MACRO001";
pub const ERR_MISSING_FACTORY_METADATA: &str = "MACRO002";
pub const ERR_AMBIGUOUS_MACRO: &str = "MACRO003";
pub const ERR_AWAIT_IN_MACRO: &str = "MACRO004";
pub const ERR_OVERLAPPING_EDIT: &str = "MACRO005";
pub const ERR_INVALID_EDIT: &str = "MACRO006";
pub const ERR_CONFIG: &str = "MACRO007";

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORM ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum TransformError {
    /// Source did not parse. Hosts treat the file as unchanged.
    #[error("failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    /// A factory call was recognized but the factory registry has no entry for it.
    #[error("[nuxt] No factory function found for `{name}` in file `{file}`. This is a bug.")]
    MissingFactoryMetadata { name: String, file: String },

    #[error("multiple `{macro_name}` calls are not supported in `{file}`")]
    AmbiguousMacro { macro_name: String, file: String },

    #[error("await in `{macro_name}` is not supported in `{file}`")]
    AwaitInMacro { macro_name: String, file: String },

    #[error("edit {start}..{end} overlaps an existing edit {other_start}..{other_end}")]
    OverlappingEdit {
        start: usize,
        end: usize,
        other_start: usize,
        other_end: usize,
    },

    #[error("edit {start}..{end} is outside the source or splits a character (len {len})")]
    InvalidEdit { start: usize, end: usize, len: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TransformError {
    pub fn code(&self) -> &'static str {
        match self {
            TransformError::Parse { .. } => ERR_PARSE,
            TransformError::MissingFactoryMetadata { .. } => ERR_MISSING_FACTORY_METADATA,
            TransformError::AmbiguousMacro { .. } => ERR_AMBIGUOUS_MACRO,
            TransformError::AwaitInMacro { .. } => ERR_AWAIT_IN_MACRO,
            TransformError::OverlappingEdit { .. } => ERR_OVERLAPPING_EDIT,
            TransformError::InvalidEdit { .. } => ERR_INVALID_EDIT,
            TransformError::Config(_) => ERR_CONFIG,
        }
    }

    pub fn file(&self) -> Option<&str> {
        match self {
            TransformError::Parse { file, .. }
            | TransformError::MissingFactoryMetadata { file, .. }
            | TransformError::AmbiguousMacro { file, .. }
            | TransformError::AwaitInMacro { file, .. } => Some(file),
            _ => None,
        }
    }

    /// Parse failures are skippable. Everything else must reach the host.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransformError::Parse { .. })
    }
}

impl From<serde_json::Error> for TransformError {
    fn from(err: serde_json::Error) -> Self {
        TransformError::Config(err.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR (host-facing)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CompilerError {
    pub code: String,
    pub error_type: String,
    pub message: String,
    pub file: Option<String>,
    pub hints: Vec<String>,
}

impl CompilerError {
    pub fn new(code: &str, message: &str, file: Option<&str>) -> Self {
        Self::with_hints(code, message, file, vec![])
    }

    pub fn with_hints(code: &str, message: &str, file: Option<&str>, hints: Vec<String>) -> Self {
        CompilerError {
            code: code.to_string(),
            error_type: error_type(code).to_string(),
            message: message.to_string(),
            file: file.map(str::to_string),
            hints,
        }
    }
}

fn error_type(code: &str) -> &'static str {
    match code {
        ERR_PARSE => "PARSE_FAILURE",
        ERR_MISSING_FACTORY_METADATA | ERR_OVERLAPPING_EDIT | ERR_INVALID_EDIT => {
            "INTERNAL_INVARIANT_VIOLATION"
        }
        ERR_AMBIGUOUS_MACRO | ERR_AWAIT_IN_MACRO => "MACRO_USAGE",
        ERR_CONFIG => "CONFIGURATION",
        _ => "UNKNOWN",
    }
}

impl From<&TransformError> for CompilerError {
    fn from(err: &TransformError) -> Self {
        let hints = match err {
            TransformError::AmbiguousMacro { macro_name, .. } => {
                vec![format!("Merge all `{macro_name}` calls into a single call.")]
            }
            TransformError::AwaitInMacro { .. } => {
                vec!["Move the awaited value into the page component instead.".to_string()]
            }
            _ => vec![],
        };
        CompilerError::with_hints(err.code(), &err.to_string(), err.file(), hints)
    }
}
