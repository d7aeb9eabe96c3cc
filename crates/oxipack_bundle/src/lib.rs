//! Module graph construction and bundle emission for oxipack.
//!
//! A build resolves every static import reachable from one entry module,
//! runs each file through its transform chain exactly once and writes a
//! single script in which each module becomes a factory in a private
//! registry. Dependencies are emitted before their dependents and the whole
//! bundle sits inside one function scope.
//!
//! # Examples
//!
//! ```no_run
//! use oxipack_bundle::{Config, SourceMapFidelity, run_build};
//! use std::io::{BufWriter, Write};
//! use std::path::PathBuf;
//!
//! # fn main() -> anyhow::Result<()> {
//! let cfg = Config {
//!     entry: Some(PathBuf::from("src/main.ts")),
//!     out: Some(PathBuf::from("dist/bundle.js")),
//!     sourcemap: Some(SourceMapFidelity::LineColumn),
//!     ..Default::default()
//! };
//!
//! let report = run_build(&cfg)?;
//!
//! let mut stdout = BufWriter::new(std::io::stdout());
//! oxipack_bundle::print_cycle_warnings(&mut stdout, &report.warnings)?;
//! oxipack_bundle::print_build_summary(&mut stdout, &report)?;
//! stdout.flush()?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod emitter;
mod error;
mod graph;
mod linker;
mod reporter;
mod sourcemap;

// Re-export public API
pub use builder::{BuildReport, bundle, run_build};
pub use config::{BuildSettings, Config, Preset, SourceMapFidelity, WrapStrategy};
pub use emitter::{BundleOutput, emit};
pub use error::BuildError;
pub use graph::{
    CyclicGraphWarning, ModuleGraph, ModuleId, ModuleRecord, ResolverContext, VisitState,
    build_graph,
};
pub use reporter::{print_build_error, print_build_summary, print_cycle_warnings};
pub use sourcemap::SourceMap;
