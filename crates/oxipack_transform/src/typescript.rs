use log::{debug, trace};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::{Parser as OxcParser, ParserReturn};
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions as OxcTransformOptions, Transformer};
use oxipack_core::{TransformError, source_type_for};
use std::path::Path;

use crate::{
    mapping::{LineMappings, Mapping},
    registry::{StageContext, StagePhase, TransformStage, Transformed},
};

/// Strips TypeScript syntax, leaving an ES module.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeScriptStage;

impl TransformStage for TypeScriptStage {
    fn name(&self) -> &'static str {
        "typescript"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Transpile
    }

    fn apply(&self, ctx: &StageContext<'_>, input: Transformed) -> Result<Transformed, TransformError> {
        let (code, mappings) = transpile(ctx.path, &input.code, false)?;
        let mappings = match (mappings, &input.mappings) {
            (Some(later), Some(earlier)) => Some(later.compose(earlier)),
            _ => None,
        };
        Ok(Transformed { code, mappings, stylesheet: input.stylesheet })
    }
}

/// Transpile TypeScript `source` to JavaScript.
///
/// With `only_remove_type_imports`, value imports are kept even when the
/// script itself never uses them (component markup may).
pub fn transpile(
    path: &Path,
    source: &str,
    only_remove_type_imports: bool,
) -> Result<(String, Option<LineMappings>), TransformError> {
    transpile_as(path, source, source_type_for(path).with_typescript(true), only_remove_type_imports)
}

/// Run the oxc transformer over `source` parsed as `source_type`. JSX is
/// compiled to calls into the automatic `react/jsx-runtime`.
pub(crate) fn transpile_as(
    path: &Path,
    source: &str,
    source_type: SourceType,
    only_remove_type_imports: bool,
) -> Result<(String, Option<LineMappings>), TransformError> {
    trace!("Transpiling {}", path.display());
    let allocator = Allocator::default();
    let ParserReturn { mut program, errors, .. } =
        OxcParser::new(&allocator, source, source_type).parse();
    if let Some(err) = errors.first() {
        return Err(TransformError::syntax(err.to_string(), None));
    }

    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();

    let mut options = OxcTransformOptions::default();
    options.typescript.only_remove_type_imports = only_remove_type_imports;
    let ret = Transformer::new(&allocator, path, &options).build_with_scoping(scoping, &mut program);
    if let Some(err) = ret.errors.first() {
        return Err(TransformError::unsupported(err.to_string()));
    }

    let codegen = Codegen::new()
        .with_options(CodegenOptions {
            source_map_path: Some(path.to_path_buf()),
            ..CodegenOptions::default()
        })
        .build(&program);

    let mappings = codegen.map.map(|map| {
        LineMappings::from_mappings(map.get_tokens().map(|token| Mapping {
            gen_line: token.get_dst_line(),
            gen_col: token.get_dst_col(),
            src_line: token.get_src_line(),
            src_col: token.get_src_col(),
        }))
    });
    debug!("Transpiled {} ({} bytes)", path.display(), codegen.code.len());
    Ok((codegen.code, mappings))
}
