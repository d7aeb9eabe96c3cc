//! Core utilities for oxipack.
//!
//! This crate provides the pieces shared by the transform and bundle crates:
//! - The error taxonomy (resolution, transform and configuration errors)
//! - File kinds and import specifiers
//! - The read-only [`ResolutionConfig`] and the module resolver
//! - Scanning transformed code for static import specifiers

mod config;
mod constants;
mod error;
mod exports;
mod parser;
mod resolver;
mod types;

// Re-export public API
pub use config::ResolutionConfig;
pub use constants::{
    DEFAULT_CONDITION_NAMES, DEFAULT_EXTENSIONS, DEFAULT_MAIN_FIELDS, IMPLICIT_CONDITIONS,
    MANIFEST_FILE,
};
pub use error::{ConfigError, ResolutionError, TransformError};
pub use parser::{scan_imports, source_type_for};
pub use resolver::{ResolveCache, resolve};
pub use types::{FileKind, SpecKind, Specifier};
