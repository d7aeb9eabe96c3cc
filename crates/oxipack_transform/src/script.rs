use log::trace;
use oxc_allocator::Allocator;
use oxc_parser::{Parser as OxcParser, ParserReturn};
use oxipack_core::{TransformError, source_type_for};

use crate::{
    registry::{StageContext, StagePhase, TransformStage, Transformed},
    typescript::transpile_as,
};

/// Checks that a JavaScript file parses and passes it through untouched.
/// JSX files are compiled to plain JavaScript instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptStage;

impl TransformStage for ScriptStage {
    fn name(&self) -> &'static str {
        "script"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Transpile
    }

    fn apply(&self, ctx: &StageContext<'_>, input: Transformed) -> Result<Transformed, TransformError> {
        let source_type = source_type_for(ctx.path);
        if source_type.is_jsx() {
            let (code, mappings) = transpile_as(ctx.path, &input.code, source_type, false)?;
            let mappings = match (mappings, &input.mappings) {
                (Some(later), Some(earlier)) => Some(later.compose(earlier)),
                _ => None,
            };
            trace!("Compiled JSX in {}", ctx.path.display());
            return Ok(Transformed { code, mappings, stylesheet: input.stylesheet });
        }

        let allocator = Allocator::default();
        let ParserReturn { errors, .. } =
            OxcParser::new(&allocator, &input.code, source_type).parse();
        if let Some(err) = errors.first() {
            return Err(TransformError::syntax(err.to_string(), None));
        }
        trace!("Validated script {}", ctx.path.display());
        Ok(input)
    }
}
