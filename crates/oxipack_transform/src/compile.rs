//! Compiling a single-file component into an ES module.
//!
//! The component keeps its script semantics: imports are hoisted to module
//! scope, the module-context script stays at module level, and the instance
//! script runs once per created component with `export let` declarations
//! turned into props. Markup renders to an HTML string with every `{expr}`
//! escaped. Reactivity, logic blocks and directives are not compiled and are
//! reported as unsupported instead of being silently dropped.

use log::debug;
use oxc_allocator::Allocator;
use oxc_ast::ast::{Declaration, Statement, VariableDeclarationKind};
use oxc_parser::{Parser as OxcParser, ParserReturn};
use oxc_span::{GetSpan, SourceType, Span};
use oxipack_core::TransformError;
use std::path::Path;

use crate::{
    options::TransformOptions,
    registry::{StageContext, StagePhase, TransformStage, Transformed},
    sfc::{self, Block},
    stylesheet::{inject_style, style_id},
};

const PROPS: &str = "__props";

const RUNES: &[&str] =
    &["$state(", "$state.raw(", "$derived(", "$effect(", "$props(", "$bindable(", "$inspect("];

const DIRECTIVES: &[&str] =
    &["on", "bind", "use", "transition", "in", "out", "animate", "class", "style", "let"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentCompileStage;

impl TransformStage for ComponentCompileStage {
    fn name(&self) -> &'static str {
        "component-compile"
    }

    fn phase(&self) -> StagePhase {
        StagePhase::Compile
    }

    fn apply(&self, ctx: &StageContext<'_>, input: Transformed) -> Result<Transformed, TransformError> {
        let parsed = sfc::split(&input.code)?;
        for block in parsed.scripts() {
            if let Some(lang) = block.lang()
                && !matches!(lang, "js" | "javascript")
            {
                return Err(TransformError::unsupported(format!(
                    "<script lang=\"{lang}\"> without the component-preprocess stage"
                )));
            }
        }
        if let Some(lang) = parsed.style.as_ref().and_then(Block::lang)
            && lang != "css"
        {
            return Err(TransformError::unsupported(format!("<style lang=\"{lang}\">")));
        }

        let name = component_name(ctx.path);
        let module_script = match &parsed.module_script {
            Some(block) => {
                validate_module_script(block, sfc::line_of(&input.code, block.content_start))?;
                block.content.trim().to_string()
            }
            None => String::new(),
        };
        let instance = match &parsed.instance_script {
            Some(block) => {
                analyze_instance(&block.content, sfc::line_of(&input.code, block.content_start))?
            }
            None => Instance::default(),
        };
        let template = compile_markup(&parsed.markup, parsed.markup_line)?;

        let mut code = String::new();
        for import in &instance.imports {
            code.push_str(import);
            code.push('\n');
        }
        if !module_script.is_empty() {
            code.push_str(&module_script);
            code.push('\n');
        }

        let mut stylesheet = input.stylesheet;
        let css = parsed.style.as_ref().map(|b| b.content.trim()).unwrap_or_default();
        if !css.is_empty() {
            if ctx.options.emit_stylesheet {
                stylesheet = Some(css.to_string());
            } else {
                code.push_str(&inject_style(&style_id(ctx.path), css));
            }
        }

        code.push_str(
            "function __escape(value) {\n\
             \treturn String(value ?? \"\").replace(/[&<>\"']/g, (c) => \"&#\" + c.charCodeAt(0) + \";\");\n\
             }\n",
        );
        code.push_str(&instance_function(&name, &instance, &template, ctx.options));
        code.push_str(&component_api(&name, ctx.options));

        debug!(
            "Compiled component {} as {} ({} prop(s))",
            ctx.path.display(),
            name,
            instance.props.len()
        );
        Ok(Transformed { code, mappings: None, stylesheet })
    }
}

#[derive(Debug, Default)]
struct Instance {
    imports: Vec<String>,
    body: String,
    props: Vec<Prop>,
}

#[derive(Debug)]
struct Prop {
    name: String,
    has_default: bool,
}

fn validate_module_script(block: &Block, line: u32) -> Result<(), TransformError> {
    let allocator = Allocator::default();
    let ParserReturn { errors, .. } =
        OxcParser::new(&allocator, &block.content, SourceType::mjs()).parse();
    match errors.first() {
        Some(err) => Err(TransformError::syntax(err.to_string(), Some(line))),
        None => Ok(()),
    }
}

fn analyze_instance(code: &str, line: u32) -> Result<Instance, TransformError> {
    if let Some(rune) = RUNES.iter().find(|r| code.contains(*r)) {
        return Err(TransformError::unsupported(format!(
            "runes ({})",
            rune.trim_end_matches('(')
        )));
    }

    let allocator = Allocator::default();
    let ParserReturn { program, errors, .. } =
        OxcParser::new(&allocator, code, SourceType::mjs()).parse();
    if let Some(err) = errors.first() {
        return Err(TransformError::syntax(err.to_string(), Some(line)));
    }

    let mut instance = Instance::default();
    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(_) => instance.imports.push(slice(code, stmt.span()).to_string()),
            Statement::ExportNamedDeclaration(export) => match &export.declaration {
                Some(Declaration::VariableDeclaration(decl))
                    if decl.kind == VariableDeclarationKind::Let =>
                {
                    for declarator in &decl.declarations {
                        let Some(id) = declarator.id.get_binding_identifier() else {
                            return Err(TransformError::unsupported("destructured props"));
                        };
                        let name = id.name.to_string();
                        let fallback = declarator.init.as_ref().map(|init| slice(code, init.span()));
                        instance.body.push_str(&format!(
                            "\tlet {name} = {PROPS}.{name} !== undefined ? {PROPS}.{name} : {};\n",
                            fallback.unwrap_or("undefined")
                        ));
                        instance.props.push(Prop { name, has_default: fallback.is_some() });
                    }
                }
                _ => {
                    return Err(TransformError::unsupported(
                        "exports other than `export let` in an instance script",
                    ));
                }
            },
            Statement::ExportDefaultDeclaration(_) | Statement::ExportAllDeclaration(_) => {
                return Err(TransformError::unsupported(
                    "exports other than `export let` in an instance script",
                ));
            }
            Statement::LabeledStatement(labeled) if labeled.label.name.as_str() == "$" => {
                return Err(TransformError::unsupported("reactive `$:` statements"));
            }
            _ => {
                instance.body.push('\t');
                instance.body.push_str(slice(code, stmt.span()));
                instance.body.push('\n');
            }
        }
    }
    Ok(instance)
}

fn slice(code: &str, span: Span) -> &str {
    &code[span.start as usize..span.end as usize]
}

fn instance_function(name: &str, instance: &Instance, template: &str, options: TransformOptions) -> String {
    let mut out = format!("function __instance({PROPS}) {{\n");
    if options.development_assertions {
        for prop in instance.props.iter().filter(|p| !p.has_default) {
            out.push_str(&format!(
                "\tif (!(\"{prop}\" in {PROPS})) console.warn(\"<{name}> was created without expected prop '{prop}'\");\n",
                prop = prop.name
            ));
        }
    }
    out.push_str(&instance.body);
    out.push_str(&format!("\treturn () => `{template}`;\n}}\n"));
    out
}

fn component_api(name: &str, options: TransformOptions) -> String {
    if options.legacy_component_api {
        let target_check = if options.development_assertions {
            "\t\tif (!options || !options.target) throw new Error(\"'target' is a required option\");\n"
        } else {
            ""
        };
        format!(
            "export default class {name} {{\n\
             \tconstructor(options) {{\n\
             {target_check}\
             \t\tthis.$$target = options.target;\n\
             \t\tthis.$$props = options.props || {{}};\n\
             \t\tthis.$$render();\n\
             \t}}\n\
             \t$$render() {{\n\
             \t\tthis.$$target.innerHTML = __instance(this.$$props)();\n\
             \t}}\n\
             \t$set(props) {{\n\
             \t\tthis.$$props = Object.assign({{}}, this.$$props, props);\n\
             \t\tthis.$$render();\n\
             \t}}\n\
             \t$destroy() {{\n\
             \t\tthis.$$target.innerHTML = \"\";\n\
             \t}}\n\
             }}\n"
        )
    } else {
        let target_check = if options.development_assertions {
            "\tif (!target) throw new Error(\"'target' is a required option\");\n"
        } else {
            ""
        };
        format!(
            "export default function {name}(target, props = {{}}) {{\n\
             {target_check}\
             \tconst render = __instance(props);\n\
             \ttarget.innerHTML = render();\n\
             \treturn {{\n\
             \t\tdestroy() {{\n\
             \t\t\ttarget.innerHTML = \"\";\n\
             \t\t}}\n\
             \t}};\n\
             }}\n"
        )
    }
}

/// PascalCase identifier from the file name, e.g. `my-button.svelte` -> `MyButton`.
fn component_name(path: &Path) -> String {
    let stem = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .unwrap_or_default();
    let mut name: String = stem
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if name.is_empty() {
        name = "Component".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Markup as the body of a JavaScript template literal.
fn compile_markup(markup: &str, first_line: u32) -> Result<String, TransformError> {
    let lead = markup.find(|c: char| !c.is_whitespace()).unwrap_or(0);
    let line_at = |offset: usize| first_line + markup[lead..offset.max(lead)].matches('\n').count() as u32;

    let bytes = markup.as_bytes();
    let mut out = String::with_capacity(markup.len());
    let mut text_start = 0;
    let mut in_tag = false;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                push_text(&mut out, &markup[text_start..i]);
                let close = closing_brace(markup, i).ok_or_else(|| {
                    TransformError::syntax("unclosed `{` in markup", Some(line_at(i)))
                })?;
                let inner = markup[i + 1..close].trim();
                let expr = compile_expression_tag(inner, line_at(i))?;
                if in_tag && quote.is_none() {
                    if i == 0 || bytes[i - 1] != b'=' {
                        return Err(TransformError::unsupported(format!(
                            "attribute shorthand and spread (`{{{inner}}}`)"
                        )));
                    }
                    out.push('"');
                    out.push_str(&expr);
                    out.push('"');
                } else {
                    out.push_str(&expr);
                }
                i = close + 1;
                text_start = i;
                continue;
            }
            b'<' if !in_tag && bytes.get(i + 1).is_some_and(u8::is_ascii_alphabetic) => {
                check_element(&markup[i + 1..])?;
                in_tag = true;
            }
            q @ (b'"' | b'\'') if in_tag => match quote {
                None => quote = Some(q),
                Some(open) if open == q => quote = None,
                Some(_) => {}
            },
            b'>' if in_tag && quote.is_none() => in_tag = false,
            b if in_tag && quote.is_none() && b.is_ascii_whitespace() => check_attribute(&markup[i + 1..])?,
            _ => {}
        }
        i += 1;
    }
    push_text(&mut out, &markup[text_start..]);
    Ok(out.trim().to_string())
}

fn compile_expression_tag(inner: &str, line: u32) -> Result<String, TransformError> {
    let keyword: &str = inner.split(char::is_whitespace).next().unwrap_or_default();
    match inner.chars().next() {
        None => return Err(TransformError::syntax("empty `{}` in markup", Some(line))),
        Some('#' | ':' | '/') => {
            return Err(TransformError::unsupported(format!("{{{keyword}}} blocks")));
        }
        Some('@') if keyword == "@html" => {
            let expr = inner["@html".len()..].trim();
            validate_expression(expr, line)?;
            return Ok(format!("${{({expr}) ?? \"\"}}"));
        }
        Some('@') => return Err(TransformError::unsupported(format!("{{{keyword}}} tags"))),
        Some(_) => {}
    }
    validate_expression(inner, line)?;
    Ok(format!("${{__escape({inner})}}"))
}

fn validate_expression(expr: &str, line: u32) -> Result<(), TransformError> {
    let allocator = Allocator::default();
    OxcParser::new(&allocator, expr, SourceType::mjs())
        .parse_expression()
        .map(|_| ())
        .map_err(|errors| {
            let detail = errors.first().map(|e| e.to_string()).unwrap_or_default();
            TransformError::syntax(format!("invalid expression `{expr}`: {detail}"), Some(line))
        })
}

fn check_element(rest: &str) -> Result<(), TransformError> {
    let name: &str = rest
        .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .next()
        .unwrap_or_default();
    if name.starts_with(|c: char| c.is_ascii_uppercase()) || name.contains([':', '.']) {
        return Err(TransformError::unsupported(format!("component and special elements (<{name}>)")));
    }
    Ok(())
}

fn check_attribute(rest: &str) -> Result<(), TransformError> {
    let name: &str = rest
        .split(|c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/'))
        .next()
        .unwrap_or_default();
    if let Some((prefix, _)) = name.split_once(':')
        && DIRECTIVES.contains(&prefix)
    {
        return Err(TransformError::unsupported(format!("`{prefix}:` directives")));
    }
    Ok(())
}

fn closing_brace(markup: &str, open: usize) -> Option<usize> {
    let bytes = markup.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn push_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            _ => out.push(ch),
        }
    }
}
