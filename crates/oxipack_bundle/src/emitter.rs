use log::{debug, info};
use oxipack_transform::LineMappings;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::{
    config::{SourceMapFidelity, WrapStrategy},
    error::BuildError,
    graph::{ModuleGraph, ModuleId, ModuleRecord},
    linker::{LinkedModule, link},
    sourcemap::{SourceMap, SourceMapBuilder},
};

/// Module registry and helpers shared by every factory in the bundle.
const RUNTIME: &str = "\
const __modules = {};
const __cache = {};
function __require(id) {
\tconst cached = __cache[id];
\tif (cached) return cached;
\tconst exports = (__cache[id] = {});
\t__modules[id](exports, __require);
\treturn exports;
}
function __export(exports, getters) {
\tfor (const name in getters) {
\t\tObject.defineProperty(exports, name, { enumerable: true, get: getters[name] });
\t}
}
function __reexport(exports, source) {
\tfor (const name in source) {
\t\tif (name !== \"default\" && !Object.prototype.hasOwnProperty.call(exports, name)) {
\t\t\tObject.defineProperty(exports, name, { enumerable: true, get: () => source[name] });
\t\t}
\t}
}
";

#[derive(Debug, Clone)]
pub struct BundleOutput {
    /// Module ids in emission order
    pub order: Vec<ModuleId>,
    pub wrap: WrapStrategy,
    pub fidelity: SourceMapFidelity,
    pub code: String,
    pub source_map: Option<SourceMap>,
    /// Stylesheets extracted by the transform chains, in emission order
    pub stylesheet: Option<String>,
}

/// Write the graph out as one script. Dependencies are emitted before their dependents.
pub fn emit(
    graph: &ModuleGraph,
    wrap: WrapStrategy,
    fidelity: SourceMapFidelity,
) -> Result<BundleOutput, BuildError> {
    let order = graph.order().to_vec();
    info!("Emitting {} modules", order.len());

    let linked: Vec<(&ModuleRecord, LinkedModule)> = order
        .par_iter()
        .filter_map(|id| graph.get(*id))
        .map(|record| {
            link(&record.transformed.code, &record.targets)
                .map(|linked| (record, linked))
                .map_err(|source| BuildError::TransformFailed { path: record.path.clone(), source })
        })
        .collect::<Result<_, _>>()?;

    let root = common_root(linked.iter().map(|(record, _)| record.path.as_path()));
    let mut writer = Writer::default();
    let mut map = SourceMapBuilder::default();

    match wrap {
        WrapStrategy::IsolatedScope => {
            writer.push("(function () {\n'use strict';\n");
            writer.push(RUNTIME);
            for (record, module) in &linked {
                let name = display_name(&record.path, root.as_deref());
                writer.push(&format!("// {name}\n"));
                writer.push(&format!("__modules[{}] = function (exports, __require) {{", record.id));
                let export_call = module.export_call();
                if !export_call.is_empty() {
                    writer.push(" ");
                    writer.push(&export_call);
                }
                writer.push("\n");

                let body_start = writer.line;
                writer.push(&module.body);
                if !module.body.ends_with('\n') {
                    writer.push("\n");
                }
                writer.push("};\n");

                if fidelity != SourceMapFidelity::None {
                    let source = map.add_source(&name, &record.source);
                    let segments = module_segments(
                        record.transformed.mappings.as_ref(),
                        &module.body,
                        &module.edited_lines,
                        fidelity,
                    );
                    for (gen_line, gen_col, src_line, src_col) in segments {
                        map.add_segment(body_start + gen_line, gen_col, source, src_line, src_col);
                    }
                }
            }
            writer.push(&format!("__require({});\n}})();\n", graph.entry()));
        }
    }

    let mut code = writer.code;
    let source_map = match fidelity {
        SourceMapFidelity::None => None,
        SourceMapFidelity::Line => {
            let map = map.build(None);
            code.push_str(&map.inline_comment());
            code.push('\n');
            Some(map)
        }
        SourceMapFidelity::LineColumn => Some(map.build(None)),
    };

    let sheets: Vec<&str> = linked
        .iter()
        .filter_map(|(record, _)| record.transformed.stylesheet.as_deref())
        .collect();
    let stylesheet = (!sheets.is_empty()).then(|| sheets.join("\n"));

    debug!("Bundle is {} bytes", code.len());
    Ok(BundleOutput { order, wrap, fidelity, code, source_map, stylesheet })
}

#[derive(Default)]
struct Writer {
    code: String,
    /// Zero-based line the next push starts on
    line: u32,
}

impl Writer {
    fn push(&mut self, text: &str) {
        self.line += text.matches('\n').count() as u32;
        self.code.push_str(text);
    }
}

/// Segments `(gen_line, gen_col, src_line, src_col)` for one module body,
/// relative to the first body line. Lines in `edited` only keep a line segment.
fn module_segments(
    mappings: Option<&LineMappings>,
    body: &str,
    edited: &BTreeSet<u32>,
    fidelity: SourceMapFidelity,
) -> Vec<(u32, u32, u32, u32)> {
    let Some(mappings) = mappings else {
        // Positions are unknown, so only the start of the module is mapped
        return vec![(0, 0, 0, 0)];
    };
    match fidelity {
        SourceMapFidelity::None => Vec::new(),
        SourceMapFidelity::Line => (0..body.lines().count() as u32)
            .filter_map(|line| mappings.on_line(line).first().map(|m| (line, 0, m.src_line, 0)))
            .collect(),
        SourceMapFidelity::LineColumn => {
            let mut segments = Vec::with_capacity(mappings.len());
            for m in mappings.iter() {
                if !edited.contains(&m.gen_line) {
                    segments.push((m.gen_line, m.gen_col, m.src_line, m.src_col));
                } else if segments.last().is_none_or(|s| s.0 != m.gen_line) {
                    segments.push((m.gen_line, 0, m.src_line, 0));
                }
            }
            segments
        }
    }
}

/// Deepest directory containing every path.
fn common_root<'p>(paths: impl Iterator<Item = &'p Path>) -> Option<PathBuf> {
    let mut root: Option<PathBuf> = None;
    for path in paths {
        let dir = path.parent().unwrap_or(path);
        root = Some(match root {
            None => dir.to_path_buf(),
            Some(current) => current
                .components()
                .zip(dir.components())
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }
    root
}

fn display_name(path: &Path, root: Option<&Path>) -> String {
    root.and_then(|r| path.strip_prefix(r).ok())
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ResolverContext, build_graph};
    use oxc_allocator::Allocator;
    use oxc_ast::ast::Statement;
    use oxc_parser::Parser as OxcParser;
    use oxc_span::SourceType;
    use oxipack_core::ResolutionConfig;
    use oxipack_transform::{Mapping, TransformOptions, TransformRegistry};
    use std::{fs, sync::Arc};
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, path: &str, content: &str) -> PathBuf {
        let file_path = dir.join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }

    fn graph_for(entry: &Path, options: TransformOptions) -> ModuleGraph {
        let resolver = ResolverContext::new(Arc::new(ResolutionConfig::default()));
        let registry = TransformRegistry::with_defaults(options);
        build_graph(entry, &resolver, &registry).unwrap()
    }

    fn three_modules(root: &Path) -> PathBuf {
        create_test_file(root, "src/math.js", "export function double(n) {\n  return n * 2;\n}\n");
        create_test_file(
            root,
            "src/format.ts",
            "import { double } from './math';\nexport const label = (n: number): string => `n=${double(n)}`;\n",
        );
        create_test_file(
            root,
            "src/main.ts",
            "import { label } from './format';\nimport { double } from './math.js';\nconsole.log(label(double(1)));\n",
        )
    }

    fn assert_single_statement(code: &str) {
        let allocator = Allocator::default();
        let ret = OxcParser::new(&allocator, code, SourceType::cjs()).parse();
        assert!(ret.errors.is_empty(), "bundle does not parse: {:?}\n{code}", ret.errors);
        assert_eq!(ret.program.body.len(), 1, "bundle declares top-level names:\n{code}");
        assert!(matches!(ret.program.body[0], Statement::ExpressionStatement(_)));
    }

    #[test]
    fn test_three_module_bundle() {
        let temp_dir = TempDir::new().unwrap();
        let entry = three_modules(temp_dir.path());
        let graph = graph_for(&entry, TransformOptions::default());

        let output = emit(&graph, WrapStrategy::IsolatedScope, SourceMapFidelity::None).unwrap();
        assert_single_statement(&output.code);
        assert!(output.code.starts_with("(function () {\n'use strict';\n"));
        assert!(output.code.trim_end().ends_with("__require(0);\n})();"));
        assert!(output.source_map.is_none());
        assert!(!output.code.contains("sourceMappingURL"));

        // math (2) before format (1) before main (0)
        assert_eq!(output.order, vec![ModuleId(2), ModuleId(1), ModuleId(0)]);
        let math = output.code.find("__modules[2] =").unwrap();
        let format = output.code.find("__modules[1] =").unwrap();
        let main = output.code.find("__modules[0] =").unwrap();
        assert!(math < format && format < main);
        assert!(output.code.contains("// math.js\n"));
        assert!(output.code.contains("__export(exports, { double: () => double });"));
        assert!(!output.code.contains(": number"));
    }

    #[test]
    fn test_line_source_map_is_inlined() {
        let temp_dir = TempDir::new().unwrap();
        let entry = three_modules(temp_dir.path());
        let graph = graph_for(&entry, TransformOptions::default());

        let output = emit(&graph, WrapStrategy::IsolatedScope, SourceMapFidelity::Line).unwrap();
        assert!(output.code.contains("//# sourceMappingURL=data:application/json;charset=utf-8;base64,"));
        assert_single_statement(&output.code);
        let map = output.source_map.unwrap();
        assert_eq!(map.sources, vec!["math.js", "format.ts", "main.ts"]);
        assert!(map.sources_content[0].contains("return n * 2;"));
        // no column information in line mode
        assert!(!map.mappings.contains(','));
    }

    #[test]
    fn test_full_source_map_is_separate() {
        let temp_dir = TempDir::new().unwrap();
        let entry = three_modules(temp_dir.path());
        let graph = graph_for(&entry, TransformOptions::default());

        let output = emit(&graph, WrapStrategy::IsolatedScope, SourceMapFidelity::LineColumn).unwrap();
        assert!(!output.code.contains("sourceMappingURL"));
        let map = output.source_map.unwrap();
        assert!(map.mappings.contains(','));
        assert!(map.mappings.split(';').count() <= output.code.lines().count());
    }

    #[test]
    fn test_stylesheets_collected_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(root, "a.css", "a { color: red; }");
        create_test_file(root, "Widget.svelte", "<p>w</p>\n<style>p { margin: 0; }</style>");
        let entry = create_test_file(root, "main.js", "import './a.css';\nimport W from './Widget.svelte';\nW(document.body);\n");
        let options = TransformOptions { emit_stylesheet: true, ..Default::default() };
        let graph = graph_for(&entry, options);

        let output = emit(&graph, WrapStrategy::IsolatedScope, SourceMapFidelity::None).unwrap();
        assert_eq!(output.stylesheet.as_deref(), Some("a { color: red; }\np { margin: 0; }"));
        assert!(!output.code.contains("createElement(\"style\")"));
        assert_single_statement(&output.code);
    }

    #[test]
    fn test_mutated_export_is_read_live() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(root, "counter.js", "export let count = 0;\nexport function inc() {\n  count++;\n}\n");
        let entry = create_test_file(
            root,
            "main.js",
            "import { count, inc } from './counter.js';\nimport * as ns from './counter.js';\ninc();\nconsole.log('named', count, 'ns', ns.count);\n",
        );
        let graph = graph_for(&entry, TransformOptions::default());

        let output = emit(&graph, WrapStrategy::IsolatedScope, SourceMapFidelity::None).unwrap();
        assert_single_statement(&output.code);
        // the exporter registers a getter, the importer reads through the exports object
        assert!(output.code.contains("__export(exports, { count: () => count, inc: () => inc });"));
        assert!(output.code.contains("const __import0 = __require(1);\nconst ns = __require(1);\n(0, __import0.inc)();\n"));
        assert!(output.code.contains("console.log('named', __import0.count, 'ns', ns.count);"));
        assert!(!output.code.contains("const { count"));
    }

    #[test]
    fn test_cycle_still_emits() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let entry = create_test_file(root, "main.js", "import { a } from './a.js';\nconsole.log(a);\n");
        create_test_file(root, "a.js", "import { b } from './b.js';\nexport const a = () => b;\n");
        create_test_file(root, "b.js", "import { a } from './a.js';\nexport const b = () => a;\n");
        let graph = graph_for(&entry, TransformOptions::default());
        assert_eq!(graph.warnings.len(), 1);

        let output = emit(&graph, WrapStrategy::IsolatedScope, SourceMapFidelity::None).unwrap();
        assert_eq!(output.order.len(), 3);
        assert_single_statement(&output.code);
    }

    #[test]
    fn test_module_segments() {
        let mappings = LineMappings::from_mappings(vec![
            Mapping { gen_line: 0, gen_col: 0, src_line: 3, src_col: 0 },
            Mapping { gen_line: 0, gen_col: 6, src_line: 3, src_col: 8 },
            Mapping { gen_line: 2, gen_col: 2, src_line: 5, src_col: 2 },
        ]);
        let body = "let a;\n\n  a();\n";
        let untouched = BTreeSet::new();
        assert_eq!(
            module_segments(Some(&mappings), body, &untouched, SourceMapFidelity::Line),
            vec![(0, 0, 3, 0), (2, 0, 5, 0)]
        );
        assert_eq!(
            module_segments(Some(&mappings), body, &untouched, SourceMapFidelity::LineColumn),
            vec![(0, 0, 3, 0), (0, 6, 3, 8), (2, 2, 5, 2)]
        );
        assert_eq!(
            module_segments(None, body, &untouched, SourceMapFidelity::Line),
            vec![(0, 0, 0, 0)]
        );
    }

    #[test]
    fn test_edited_lines_drop_columns() {
        let mappings = LineMappings::from_mappings(vec![
            Mapping { gen_line: 0, gen_col: 0, src_line: 0, src_col: 0 },
            Mapping { gen_line: 0, gen_col: 9, src_line: 0, src_col: 9 },
            Mapping { gen_line: 1, gen_col: 0, src_line: 1, src_col: 0 },
            Mapping { gen_line: 1, gen_col: 12, src_line: 1, src_col: 12 },
        ]);
        let body = "const __import0 = __require(1);\nconsole.log(__import0.a, b);\n";
        let edited = BTreeSet::from([0, 1]);
        assert_eq!(
            module_segments(Some(&mappings), body, &edited, SourceMapFidelity::LineColumn),
            vec![(0, 0, 0, 0), (1, 0, 1, 0)]
        );
        let only_first = BTreeSet::from([0]);
        assert_eq!(
            module_segments(Some(&mappings), body, &only_first, SourceMapFidelity::LineColumn),
            vec![(0, 0, 0, 0), (1, 0, 1, 0), (1, 12, 1, 12)]
        );
    }

    #[test]
    fn test_common_root() {
        let paths = [Path::new("/p/src/a.js"), Path::new("/p/src/lib/b.js"), Path::new("/p/node_modules/x/i.js")];
        assert_eq!(common_root(paths.into_iter()), Some(PathBuf::from("/p")));
        assert_eq!(display_name(Path::new("/p/src/a.js"), Some(Path::new("/p"))), "src/a.js");
    }
}
