use log::debug;
use oxipack_core::TransformError;

use crate::{
    registry::{StageContext, StagePhase, TransformStage, Transformed},
    sfc::{self, Block},
    typescript::transpile,
};

/// Rewrites embedded sub-languages of a component into plain JavaScript and
/// CSS, so the compile stage only ever sees the base syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentPreprocessStage;

impl TransformStage for ComponentPreprocessStage {
    fn name(&self) -> &'static str {
        "component-preprocess"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Preprocess
    }

    fn apply(&self, ctx: &StageContext<'_>, input: Transformed) -> Result<Transformed, TransformError> {
        let parsed = sfc::split(&input.code)?;

        if let Some(style) = &parsed.style
            && let Some(lang) = style.lang()
            && lang != "css"
        {
            return Err(TransformError::unsupported(format!("<style lang=\"{lang}\">")));
        }

        let mut code = input.code.clone();
        let mut rewritten = 0;
        // Back to front, so earlier offsets stay valid
        for block in parsed.scripts().into_iter().rev() {
            match block.lang() {
                None | Some("js" | "javascript") => {}
                Some("ts" | "typescript") => {
                    let virtual_path = ctx.path.with_extension("svelte.ts");
                    let (js, _) = transpile(&virtual_path, &block.content, true).map_err(|e| {
                        shift_line(e, sfc::line_of(&input.code, block.content_start) - 1)
                    })?;
                    code.replace_range(block.start..block.end, &plain_script(block, &js));
                    rewritten += 1;
                }
                Some(other) => {
                    return Err(TransformError::unsupported(format!("<script lang=\"{other}\">")));
                }
            }
        }

        if rewritten == 0 {
            return Ok(input);
        }
        debug!("Preprocessed {} script block(s) in {}", rewritten, ctx.path.display());
        // Block sizes changed, so positions no longer line up with the original
        Ok(Transformed { code, mappings: None, stylesheet: input.stylesheet })
    }
}

fn plain_script(block: &Block, js: &str) -> String {
    let mut tag = String::from("<script");
    for (name, value) in block.attrs.iter().filter(|(n, _)| n != "lang") {
        match value {
            Some(v) => tag.push_str(&format!(" {name}=\"{v}\"")),
            None => tag.push_str(&format!(" {name}")),
        }
    }
    format!("{tag}>\n{js}</script>")
}

fn shift_line(err: TransformError, offset: u32) -> TransformError {
    match err {
        TransformError::SyntaxError { message, line } => {
            TransformError::SyntaxError { message, line: line.map(|l| l + offset) }
        }
        other => other,
    }
}
