use log::debug;
use oxipack_core::TransformError;
use std::path::Path;

use crate::registry::{StageContext, StagePhase, TransformStage, Transformed};

/// Turns a stylesheet into a module. With `emit_stylesheet` the CSS leaves
/// the chain as an extracted asset; otherwise the module injects it into the
/// document when evaluated.
#[derive(Debug, Clone, Copy, Default)]
pub struct StylesheetStage;

impl TransformStage for StylesheetStage {
    fn name(&self) -> &'static str {
        "stylesheet"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Emit
    }

    fn apply(&self, ctx: &StageContext<'_>, input: Transformed) -> Result<Transformed, TransformError> {
        let css = input.code.trim().to_string();
        if ctx.options.emit_stylesheet {
            debug!("Extracting stylesheet {}", ctx.path.display());
            return Ok(Transformed {
                code: "export default undefined;\n".to_string(),
                mappings: None,
                stylesheet: Some(css),
            });
        }

        let mut code = inject_style(&style_id(ctx.path), &css);
        code.push_str("export default __css;\n");
        Ok(Transformed { code, mappings: None, stylesheet: input.stylesheet })
    }
}

/// Statements that append `css` to the document head once, under element id `id`.
/// Declares `__css` holding the stylesheet text.
pub(crate) fn inject_style(id: &str, css: &str) -> String {
    let literal = serde_json::to_string(css).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "const __css = {literal};\n\
         if (typeof document !== \"undefined\" && !document.getElementById(\"{id}\")) {{\n\
         \tconst style = document.createElement(\"style\");\n\
         \tstyle.id = \"{id}\";\n\
         \tstyle.textContent = __css;\n\
         \tdocument.head.appendChild(style);\n\
         }}\n"
    )
}

/// Stable element id for a file's injected styles.
pub(crate) fn style_id(path: &Path) -> String {
    // FNV-1a
    let mut hash: u32 = 0x811c_9dc5;
    for byte in path.to_string_lossy().bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    format!("oxipack-{hash:08x}")
}
