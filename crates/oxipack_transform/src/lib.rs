//! Per-file-kind transform chains for oxipack.
//!
//! A [`TransformRegistry`] maps each [`FileKind`](oxipack_core::FileKind) to
//! one [`TransformRule`]: an ordered chain of [`TransformStage`]s plus the
//! [`TransformOptions`] passed to every stage of that chain. Chains run left
//! to right and end in an ES module the bundler can link.
//!
//! Built-in stages:
//! - `script`: validates JavaScript
//! - `typescript`: strips types with the oxc transformer
//! - `component-preprocess`: transpiles `<script lang="ts">` blocks in components
//! - `component-compile`: compiles a single-file component to an ES module
//! - `stylesheet`: turns CSS into an injecting module or an extracted asset
//! - `json`: exposes a JSON document as the default export

mod compile;
mod json;
mod mapping;
mod options;
mod preprocess;
mod registry;
mod script;
mod sfc;
mod stylesheet;
mod typescript;

// Re-export public API
pub use compile::ComponentCompileStage;
pub use json::JsonStage;
pub use mapping::{LineMappings, Mapping};
pub use options::TransformOptions;
pub use preprocess::ComponentPreprocessStage;
pub use registry::{
    RuleSpec, StageContext, StagePhase, TransformRegistry, TransformRule, TransformStage,
    Transformed, stage_by_name,
};
pub use script::ScriptStage;
pub use stylesheet::StylesheetStage;
pub use typescript::{TypeScriptStage, transpile};
