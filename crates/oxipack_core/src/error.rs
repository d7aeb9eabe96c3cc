use std::path::PathBuf;
use thiserror::Error;

use crate::types::FileKind;

/// Failure to turn a specifier into a file on disk.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("cannot find module '{specifier}'")]
    NotFound { specifier: String },

    #[error("ambiguous exports for '{specifier}' in {}: {reason}", .manifest.display())]
    Ambiguous { specifier: String, manifest: PathBuf, reason: String },
}

impl ResolutionError {
    pub fn not_found(specifier: impl Into<String>) -> Self {
        Self::NotFound { specifier: specifier.into() }
    }
}

/// Failure inside a transform stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("syntax error{}: {message}", line_suffix(.line))]
    SyntaxError { message: String, line: Option<u32> },

    #[error("unsupported feature: {feature}")]
    UnsupportedFeature { feature: String },
}

impl TransformError {
    pub fn syntax(message: impl Into<String>, line: Option<u32>) -> Self {
        Self::SyntaxError { message: message.into(), line }
    }

    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature { feature: feature.into() }
    }
}

fn line_suffix(line: &Option<u32>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

/// Invalid build configuration, detected before any module is loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("stage '{later}' must run before '{earlier}'")]
    StageOrder { earlier: String, later: String },

    #[error("more than one transform rule for {kind} files")]
    DuplicateRule { kind: FileKind },

    #[error("unknown transform stage '{0}'")]
    UnknownStage(String),

    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
