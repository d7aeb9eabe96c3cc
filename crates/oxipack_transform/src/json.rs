use oxipack_core::TransformError;
use serde_json::Value;

use crate::registry::{StageContext, StagePhase, TransformStage, Transformed};

/// Exposes a JSON document as the module's default export.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStage;

impl TransformStage for JsonStage {
    fn name(&self) -> &'static str {
        "json"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Emit
    }

    fn apply(&self, _ctx: &StageContext<'_>, input: Transformed) -> Result<Transformed, TransformError> {
        let value: Value = serde_json::from_str(&input.code)
            .map_err(|e| TransformError::syntax(e.to_string(), Some(e.line() as u32)))?;
        // Key order is preserved, so the output stays stable across builds
        let literal = serde_json::to_string(&value)
            .map_err(|e| TransformError::syntax(e.to_string(), None))?;
        Ok(Transformed {
            code: format!("export default {literal};\n"),
            mappings: None,
            stylesheet: input.stylesheet,
        })
    }
}
