use log::{debug, trace};
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::{Parser as OxcParser, ParserReturn};
use oxc_span::SourceType;
use std::path::Path;

use crate::{
    error::TransformError,
    types::{SpecKind, Specifier},
};

/// Scan transformed module code for the specifiers it imports.
///
/// `code` is the output of a transform chain and is always parsed as an ES
/// module. Type-only imports and re-exports are skipped since they never
/// reach the bundle.
pub fn scan_imports(file: &Path, code: &str) -> Result<Vec<Specifier>, TransformError> {
    trace!("Scanning imports in: {}", file.display());
    let allocator = Allocator::default();
    let ParserReturn { program, errors, .. } =
        OxcParser::new(&allocator, code, SourceType::mjs()).parse();

    if let Some(err) = errors.first() {
        return Err(TransformError::syntax(err.to_string(), None));
    }

    let mut specs: Vec<Specifier> = Vec::new();

    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                // Skip type-only imports (import type { Foo } from 'bar')
                if decl.import_kind.is_type() {
                    trace!("Skipping type-only import declaration in {}", file.display());
                    continue;
                }
                let req = decl.source.value.to_string();
                trace!("Found static import: '{}' in {}", req, file.display());
                specs.push(Specifier { request: req, kind: SpecKind::Static });
            }
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(source) = &decl.source
                    && !decl.export_kind.is_type()
                {
                    trace!("Found re-export: '{}' in {}", source.value, file.display());
                    specs.push(Specifier { request: source.value.to_string(), kind: SpecKind::Static });
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                if !decl.export_kind.is_type() {
                    trace!("Found star re-export: '{}' in {}", decl.source.value, file.display());
                    specs.push(Specifier {
                        request: decl.source.value.to_string(),
                        kind: SpecKind::Static,
                    });
                }
            }
            Statement::ExpressionStatement(es) => {
                extract_dynamic_imports(&es.expression, &mut specs);
            }
            Statement::VariableDeclaration(vd) => {
                for decl in &vd.declarations {
                    if let Some(init) = &decl.init {
                        extract_dynamic_imports(init, &mut specs);
                    }
                }
            }
            _ => {}
        }
    }

    debug!("Found {} import specifiers in {}", specs.len(), file.display());
    Ok(specs)
}

fn extract_dynamic_imports(expr: &Expression, specs: &mut Vec<Specifier>) {
    match expr {
        Expression::ImportExpression(ie) => {
            if let Expression::StringLiteral(sl) = &ie.source {
                trace!("Found dynamic import(): '{}'", sl.value);
                specs.push(Specifier { request: sl.value.to_string(), kind: SpecKind::Dynamic });
            }
        }
        Expression::CallExpression(ce) => {
            for arg in &ce.arguments {
                if let Some(arg_expr) = arg.as_expression() {
                    extract_dynamic_imports(arg_expr, specs);
                }
            }
            extract_dynamic_imports(&ce.callee, specs);
        }
        Expression::StaticMemberExpression(me) => {
            // import('./x').then(...)
            extract_dynamic_imports(&me.object, specs);
        }
        Expression::AwaitExpression(ae) => {
            extract_dynamic_imports(&ae.argument, specs);
        }
        Expression::ArrayExpression(ae) => {
            for elem in &ae.elements {
                if let Some(expr) = elem.as_expression() {
                    extract_dynamic_imports(expr, specs);
                }
            }
        }
        Expression::ConditionalExpression(ce) => {
            extract_dynamic_imports(&ce.consequent, specs);
            extract_dynamic_imports(&ce.alternate, specs);
        }
        Expression::ParenthesizedExpression(pe) => {
            extract_dynamic_imports(&pe.expression, specs);
        }
        _ => {}
    }
}

/// Parser settings for an original source file, chosen by extension.
pub fn source_type_for(path: &Path) -> SourceType {
    let ext = path.extension().and_then(|e| e.to_str());

    SourceType::default()
        .with_module(true)
        .with_jsx(matches!(ext, Some("tsx") | Some("jsx")))
        .with_typescript(matches!(ext, Some("ts") | Some("tsx") | Some("mts") | Some("cts")))
}
