use oxipack_core::{ConfigError, ResolutionError, TransformError};
use std::path::PathBuf;
use thiserror::Error;

/// Why a build stopped. A failed build writes nothing.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("cannot resolve '{specifier}' imported by {}: {source}", .importer.display())]
    ResolutionFailed {
        importer: PathBuf,
        specifier: String,
        #[source]
        source: ResolutionError,
    },

    #[error("failed to transform {}: {source}", .path.display())]
    TransformFailed {
        path: PathBuf,
        #[source]
        source: TransformError,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Short name of the error kind, for reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildError::ResolutionFailed { .. } => "ResolutionFailed",
            BuildError::TransformFailed { .. } => "TransformFailed",
            BuildError::Config(_) => "Config",
            BuildError::Io { .. } => "Io",
        }
    }

    /// The file the error is about, when there is one.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            BuildError::ResolutionFailed { importer, .. } => Some(importer),
            BuildError::TransformFailed { path, .. } | BuildError::Io { path, .. } => Some(path),
            BuildError::Config(_) => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io { path: path.into(), source }
    }
}
