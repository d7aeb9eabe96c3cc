//! Rewriting a module's ES syntax into the bundle's registry calls.
//!
//! `import` declarations bind the imported module's `exports` object and
//! every reference to an imported name reads through it, so imports stay
//! live. `export` declarations become getters registered with `__export`.
//! Every rewritten statement keeps its line count, so line mappings of the
//! module body stay valid inside the bundle.

use log::trace;
use oxc_allocator::Allocator;
use oxc_ast::{
    AstKind,
    ast::{
        BindingIdentifier, Declaration, ExportAllDeclaration, ExportDefaultDeclaration, ExportDefaultDeclarationKind,
        ExportNamedDeclaration, ImportDeclaration, ImportDeclarationSpecifier, Statement,
    },
};
use oxc_parser::{Parser as OxcParser, ParserReturn};
use oxc_semantic::{Semantic, SemanticBuilder, SymbolId};
use oxc_span::{GetSpan, SourceType, Span};
use oxipack_core::TransformError;
use std::collections::{BTreeSet, HashMap};

use crate::graph::ModuleId;

const DEFAULT_BINDING: &str = "__default";

/// A module body ready to be placed inside a factory function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkedModule {
    /// Exported name and the expression it reads, in declaration order
    pub(crate) exports: Vec<(String, String)>,
    pub(crate) body: String,
    /// Body lines touched by an edit; their columns no longer match the source
    pub(crate) edited_lines: BTreeSet<u32>,
}

impl LinkedModule {
    /// The `__export(...)` call for this module, or an empty string.
    pub(crate) fn export_call(&self) -> String {
        if self.exports.is_empty() {
            return String::new();
        }
        let getters: Vec<String> = self
            .exports
            .iter()
            .map(|(name, expr)| format!("{}: () => {expr}", property_key(name)))
            .collect();
        format!("__export(exports, {{ {} }});", getters.join(", "))
    }
}

pub(crate) fn link(
    code: &str,
    targets: &HashMap<String, ModuleId>,
) -> Result<LinkedModule, TransformError> {
    let allocator = Allocator::default();
    let ParserReturn { program, errors, .. } =
        OxcParser::new(&allocator, code, SourceType::mjs()).parse();
    if let Some(err) = errors.first() {
        return Err(TransformError::syntax(err.to_string(), None));
    }

    let semantic = SemanticBuilder::new().build(&program).semantic;

    let mut linker = Linker {
        targets,
        edits: Vec::new(),
        exports: Vec::new(),
        imported: Vec::new(),
        bindings: 0,
        imports: 0,
    };
    // Imports are hoisted, so their bindings are known before any export list is read
    for stmt in &program.body {
        if let Statement::ImportDeclaration(decl) = stmt {
            linker.import(decl)?;
        }
    }
    for stmt in &program.body {
        match stmt {
            Statement::ExportNamedDeclaration(decl) => linker.export_named(decl)?,
            Statement::ExportDefaultDeclaration(decl) => linker.export_default(decl),
            Statement::ExportAllDeclaration(decl) => linker.export_all(decl)?,
            _ => {}
        }
    }
    linker.rewrite_references(&semantic);
    trace!("Linked module with {} edit(s), {} export(s)", linker.edits.len(), linker.exports.len());

    let (body, edited_lines) = apply_edits(code, linker.edits);
    Ok(LinkedModule { exports: linker.exports, body, edited_lines })
}

struct Edit {
    start: u32,
    end: u32,
    text: String,
}

/// A local name bound by an import and the member expression it reads.
struct ImportedBinding {
    symbol: SymbolId,
    local: String,
    expr: String,
}

struct Linker<'t> {
    targets: &'t HashMap<String, ModuleId>,
    edits: Vec<Edit>,
    exports: Vec<(String, String)>,
    imported: Vec<ImportedBinding>,
    bindings: usize,
    imports: usize,
}

impl Linker<'_> {
    fn import(&mut self, decl: &ImportDeclaration) -> Result<(), TransformError> {
        if decl.import_kind.is_type() {
            self.replace(decl.span, String::new());
            return Ok(());
        }
        let require = format!("__require({})", self.target(&decl.source.value)?);

        let namespace = decl.specifiers.iter().flatten().find_map(|specifier| match specifier {
            ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => Some(s.local.name.to_string()),
            _ => None,
        });
        let mut named = Vec::new();
        for specifier in decl.specifiers.iter().flatten() {
            match specifier {
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(_) => {}
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    named.push((&s.local, "default".to_string()));
                }
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    if !s.import_kind.is_type() {
                        named.push((&s.local, s.imported.name().to_string()));
                    }
                }
            }
        }

        let text = match namespace {
            Some(ns) => {
                self.bind_imports(&ns, named);
                format!("const {ns} = {require};")
            }
            None if named.is_empty() => format!("{require};"),
            None => {
                let object = format!("__import{}", self.imports);
                self.imports += 1;
                self.bind_imports(&object, named);
                format!("const {object} = {require};")
            }
        };
        self.replace(decl.span, text);
        Ok(())
    }

    fn export_named(&mut self, decl: &ExportNamedDeclaration) -> Result<(), TransformError> {
        if decl.export_kind.is_type() {
            self.replace(decl.span, String::new());
            return Ok(());
        }

        if let Some(source) = &decl.source {
            let id = self.target(&source.value)?;
            let binding = self.binding();
            self.replace(decl.span, format!("const {binding} = __require({id});"));
            for spec in decl.specifiers.iter().filter(|s| !s.export_kind.is_type()) {
                let local = spec.local.name();
                self.exports.push((spec.exported.name().to_string(), format!("{binding}{}", member(local.as_str()))));
            }
            return Ok(());
        }

        match &decl.declaration {
            Some(declaration) => {
                let names = declared_names(declaration)?;
                if names.is_empty() {
                    // Type-level declaration with nothing to export at runtime
                    self.replace(decl.span, String::new());
                    return Ok(());
                }
                self.replace(Span::new(decl.span.start, declaration.span().start), String::new());
                self.exports.extend(names.into_iter().map(|n| (n.clone(), n)));
            }
            None => {
                self.replace(decl.span, String::new());
                for spec in decl.specifiers.iter().filter(|s| !s.export_kind.is_type()) {
                    let expr = self.local_expr(spec.local.name().as_str());
                    self.exports.push((spec.exported.name().to_string(), expr));
                }
            }
        }
        Ok(())
    }

    fn export_default(&mut self, decl: &ExportDefaultDeclaration) {
        let inner = decl.declaration.span();
        let prefix = Span::new(decl.span.start, inner.start);
        let named = match &decl.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(func) => Some(func.id.as_ref()),
            ExportDefaultDeclarationKind::ClassDeclaration(class) => Some(class.id.as_ref()),
            ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                self.replace(decl.span, String::new());
                return;
            }
            _ => None,
        };

        match named {
            // `export default function name() {}` keeps its hoisted declaration
            Some(Some(id)) => {
                self.replace(prefix, String::new());
                self.exports.push(("default".to_string(), id.name.to_string()));
            }
            Some(None) => {
                self.replace(prefix, format!("const {DEFAULT_BINDING} = "));
                self.replace(Span::new(inner.end, inner.end), ";".to_string());
                self.exports.push(("default".to_string(), DEFAULT_BINDING.to_string()));
            }
            None => {
                self.replace(prefix, format!("const {DEFAULT_BINDING} = "));
                self.exports.push(("default".to_string(), DEFAULT_BINDING.to_string()));
            }
        }
    }

    fn export_all(&mut self, decl: &ExportAllDeclaration) -> Result<(), TransformError> {
        if decl.export_kind.is_type() {
            self.replace(decl.span, String::new());
            return Ok(());
        }
        let id = self.target(&decl.source.value)?;
        match &decl.exported {
            Some(name) => {
                let binding = self.binding();
                self.replace(decl.span, format!("const {binding} = __require({id});"));
                self.exports.push((name.name().to_string(), binding));
            }
            None => self.replace(decl.span, format!("__reexport(exports, __require({id}));")),
        }
        Ok(())
    }

    fn bind_imports(&mut self, object: &str, named: Vec<(&BindingIdentifier, String)>) {
        for (local, imported) in named {
            let Some(symbol) = local.symbol_id.get() else { continue };
            self.imported.push(ImportedBinding {
                symbol,
                local: local.name.to_string(),
                expr: format!("{object}{}", member(&imported)),
            });
        }
    }

    /// Expression reading `name`: an imported binding reads through its module.
    fn local_expr(&self, name: &str) -> String {
        self.imported
            .iter()
            .find(|b| b.local == name)
            .map_or_else(|| name.to_string(), |b| b.expr.clone())
    }

    /// Replace every read of an imported binding with its member expression.
    fn rewrite_references(&mut self, semantic: &Semantic) {
        let nodes = semantic.nodes();
        let scoping = semantic.scoping();
        for binding in &self.imported {
            for &reference_id in scoping.get_resolved_reference_ids(binding.symbol) {
                let node_id = scoping.get_reference(reference_id).node_id();
                let span = nodes.kind(node_id).span();
                let text = match nodes.parent_kind(node_id) {
                    // export lists are already removed and read through `local_expr`
                    AstKind::ExportSpecifier(_) => continue,
                    AstKind::ObjectProperty(prop) if prop.shorthand => {
                        format!("{}: {}", binding.local, binding.expr)
                    }
                    // a bare call keeps `this` undefined
                    AstKind::CallExpression(call) if call.callee.span() == span => {
                        format!("(0, {})", binding.expr)
                    }
                    _ => binding.expr.clone(),
                };
                self.edits.push(Edit { start: span.start, end: span.end, text });
            }
        }
    }

    fn target(&self, request: &str) -> Result<ModuleId, TransformError> {
        self.targets.get(request).copied().ok_or_else(|| {
            TransformError::unsupported(format!("import of '{request}' that was never resolved"))
        })
    }

    fn binding(&mut self) -> String {
        let name = format!("__from{}", self.bindings);
        self.bindings += 1;
        name
    }

    fn replace(&mut self, span: Span, text: String) {
        self.edits.push(Edit { start: span.start, end: span.end, text });
    }
}

fn declared_names(declaration: &Declaration) -> Result<Vec<String>, TransformError> {
    let names = match declaration {
        Declaration::VariableDeclaration(decl) => decl
            .declarations
            .iter()
            .map(|d| {
                d.id.get_binding_identifier()
                    .map(|id| id.name.to_string())
                    .ok_or_else(|| TransformError::unsupported("destructuring in export declarations"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Declaration::FunctionDeclaration(func) => {
            func.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        _ => Vec::new(),
    };
    Ok(names)
}

/// Apply non-overlapping edits, padding each replacement with the newlines it removed.
/// Also returns the output lines each edit spans.
fn apply_edits(code: &str, mut edits: Vec<Edit>) -> (String, BTreeSet<u32>) {
    edits.sort_by_key(|e| (e.start, e.end));
    let mut out = String::with_capacity(code.len());
    let mut edited = BTreeSet::new();
    let mut line = 0u32;
    let mut cursor = 0usize;
    for edit in edits {
        let (start, end) = (edit.start as usize, edit.end as usize);
        line += code[cursor..start].matches('\n').count() as u32;
        out.push_str(&code[cursor..start]);
        let removed = code[start..end].matches('\n').count();
        let added = edit.text.matches('\n').count();
        let spanned = removed.max(added) as u32;
        edited.extend(line..=line + spanned);
        out.push_str(&edit.text);
        out.push_str(&"\n".repeat(removed.saturating_sub(added)));
        line += spanned;
        cursor = end;
    }
    out.push_str(&code[cursor..]);
    (out, edited)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        serde_json::to_string(name).unwrap_or_else(|_| format!("\"{name}\""))
    }
}

fn member(name: &str) -> String {
    if is_identifier(name) { format!(".{name}") } else { format!("[{}]", property_key(name)) }
}
