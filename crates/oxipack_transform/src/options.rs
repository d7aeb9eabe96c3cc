use serde::{Deserialize, Serialize};

/// Switches passed by value into every stage of a transform chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformOptions {
    /// Write styles to a separate stylesheet asset instead of injecting them at runtime
    pub emit_stylesheet: bool,
    /// Inject runtime prop checks into compiled components
    pub development_assertions: bool,
    /// Generate the class-based `new Component({ target, props })` shape
    pub legacy_component_api: bool,
}
