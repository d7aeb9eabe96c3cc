use dashmap::DashMap;
use log::{debug, info, trace, warn};
use oxipack_core::{
    FileKind, ResolutionConfig, ResolutionError, ResolveCache, SpecKind, Specifier,
    TransformError, resolve, scan_imports,
};
use oxipack_transform::{TransformRegistry, Transformed};
use rayon::prelude::*;
use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::error::BuildError;

/// Position of a module in discovery order. The entry is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub usize);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitState {
    Unvisited,
    InProgress,
    Done,
}

#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub id: ModuleId,
    /// Canonical absolute path, unique within a graph
    pub path: PathBuf,
    pub source: String,
    pub kind: FileKind,
    /// Specifiers found in the transformed code, in source order
    pub specifiers: Vec<Specifier>,
    pub transformed: Transformed,
    /// Static dependencies in first-import order, without duplicates
    pub dependencies: Vec<ModuleId>,
    /// Module each static specifier resolved to
    pub targets: HashMap<String, ModuleId>,
    pub state: VisitState,
}

/// An import chain leading back to a module that was still being visited.
/// Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclicGraphWarning {
    /// Paths along the cycle; the first path is repeated at the end
    pub cycle: Vec<PathBuf>,
}

impl fmt::Display for CyclicGraphWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.cycle.iter().map(|p| p.display().to_string()).collect();
        write!(f, "circular import: {}", parts.join(" -> "))
    }
}

#[derive(Debug, Clone)]
pub struct ModuleGraph {
    modules: Vec<ModuleRecord>,
    order: Vec<ModuleId>,
    pub warnings: Vec<CyclicGraphWarning>,
}

impl ModuleGraph {
    pub fn entry(&self) -> ModuleId {
        ModuleId(0)
    }

    pub fn get(&self, id: ModuleId) -> Option<&ModuleRecord> {
        self.modules.get(id.0)
    }

    /// Records indexed by id.
    pub fn modules(&self) -> &[ModuleRecord] {
        &self.modules
    }

    /// Dependencies before dependents; the entry comes last.
    pub fn order(&self) -> &[ModuleId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn find(&self, path: &Path) -> Option<&ModuleRecord> {
        self.modules.iter().find(|m| m.path == path)
    }
}

/// Resolver settings and memo shared by every lookup of one build.
#[derive(Debug)]
pub struct ResolverContext {
    pub config: Arc<ResolutionConfig>,
    pub cache: ResolveCache,
}

impl ResolverContext {
    pub fn new(config: Arc<ResolutionConfig>) -> Self {
        Self { config, cache: DashMap::new() }
    }
}

/// A file after phase one: read, transformed, scanned and with its static
/// specifiers resolved. Failures are kept so phase two can report the first
/// one in walk order.
struct Loaded {
    outcome: Result<LoadedModule, LoadFailure>,
}

struct LoadedModule {
    source: String,
    kind: FileKind,
    transformed: Transformed,
    specifiers: Vec<Specifier>,
    edges: Vec<(String, Result<PathBuf, ResolutionError>)>,
}

enum LoadFailure {
    Io(std::io::Error),
    Transform(TransformError),
}

/// Load and link every module reachable from `entry` through static imports.
pub fn build_graph(
    entry: &Path,
    resolver: &ResolverContext,
    registry: &TransformRegistry,
) -> Result<ModuleGraph, BuildError> {
    let entry = entry.canonicalize().map_err(|e| BuildError::io(entry, e))?;
    info!("Building module graph from {}", entry.display());

    let loaded = load_all(&entry, resolver, registry);
    debug!("Loaded {} modules", loaded.len());

    let graph = Walker::new(loaded, resolver, registry).walk(entry)?;
    info!(
        "Module graph has {} modules and {} cycle(s)",
        graph.len(),
        graph.warnings.len()
    );
    Ok(graph)
}

/// Phase one: breadth-wise parallel loading. A path is loaded by whichever
/// worker claims it first, so each file is transformed exactly once.
fn load_all(
    entry: &Path,
    resolver: &ResolverContext,
    registry: &TransformRegistry,
) -> DashMap<PathBuf, Loaded> {
    let claimed: DashMap<PathBuf, ()> = DashMap::new();
    let loaded: DashMap<PathBuf, Loaded> = DashMap::new();
    claimed.insert(entry.to_path_buf(), ());

    let mut frontier = vec![entry.to_path_buf()];
    while !frontier.is_empty() {
        trace!("Loading frontier of {} modules", frontier.len());
        frontier = frontier
            .par_iter()
            .flat_map_iter(|path| {
                let module = load_module(path, resolver, registry);
                let discovered: Vec<PathBuf> = match &module.outcome {
                    Ok(m) => m
                        .edges
                        .iter()
                        .filter_map(|(_, r)| r.as_ref().ok())
                        .filter(|p| claimed.insert((*p).clone(), ()).is_none())
                        .cloned()
                        .collect(),
                    Err(_) => Vec::new(),
                };
                loaded.insert(path.clone(), module);
                discovered
            })
            .collect();
    }
    loaded
}

fn load_module(path: &Path, resolver: &ResolverContext, registry: &TransformRegistry) -> Loaded {
    let kind = FileKind::from_path(path);
    debug!("Loading {} module {}", kind, path.display());

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => return Loaded { outcome: Err(LoadFailure::Io(e)) },
    };
    let transformed = match registry.transform(kind, path, &source) {
        Ok(t) => t,
        Err(e) => return Loaded { outcome: Err(LoadFailure::Transform(e)) },
    };
    let specifiers = match scan_imports(path, &transformed.code) {
        Ok(s) => s,
        Err(e) => return Loaded { outcome: Err(LoadFailure::Transform(e)) },
    };

    let edges = specifiers
        .iter()
        .filter(|s| s.kind == SpecKind::Static)
        .map(|s| (s.request.clone(), resolve(path, &s.request, &resolver.config, &resolver.cache)))
        .collect();

    Loaded { outcome: Ok(LoadedModule { source, kind, transformed, specifiers, edges }) }
}

/// Phase two: deterministic depth-first walk over the loaded modules.
struct Walker<'a> {
    loaded: HashMap<PathBuf, Loaded>,
    resolver: &'a ResolverContext,
    registry: &'a TransformRegistry,
    ids: HashMap<PathBuf, ModuleId>,
    modules: Vec<ModuleRecord>,
    edges: Vec<Vec<(String, Result<PathBuf, ResolutionError>)>>,
    order: Vec<ModuleId>,
    warnings: Vec<CyclicGraphWarning>,
}

impl<'a> Walker<'a> {
    fn new(
        loaded: DashMap<PathBuf, Loaded>,
        resolver: &'a ResolverContext,
        registry: &'a TransformRegistry,
    ) -> Self {
        Self {
            loaded: loaded.into_iter().collect(),
            resolver,
            registry,
            ids: HashMap::new(),
            modules: Vec::new(),
            edges: Vec::new(),
            order: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn walk(mut self, entry: PathBuf) -> Result<ModuleGraph, BuildError> {
        let entry_id = self.discover(entry)?;
        self.modules[entry_id.0].state = VisitState::InProgress;
        let mut stack: Vec<(ModuleId, usize)> = vec![(entry_id, 0)];

        while let Some((id, next_edge)) = stack.last_mut() {
            let id = *id;
            let Some((request, target)) = self.edges[id.0].get(*next_edge).cloned() else {
                self.modules[id.0].state = VisitState::Done;
                self.order.push(id);
                stack.pop();
                continue;
            };
            *next_edge += 1;

            let path = target.map_err(|source| BuildError::ResolutionFailed {
                importer: self.modules[id.0].path.clone(),
                specifier: request.clone(),
                source,
            })?;

            let dep = match self.ids.get(&path) {
                Some(&dep) => dep,
                None => self.discover(path)?,
            };
            self.link(id, &request, dep);

            match self.modules[dep.0].state {
                VisitState::Unvisited => {
                    trace!("Entering {}", self.modules[dep.0].path.display());
                    self.modules[dep.0].state = VisitState::InProgress;
                    stack.push((dep, 0));
                }
                VisitState::InProgress => {
                    let start = stack.iter().position(|(m, _)| *m == dep).unwrap_or(0);
                    let mut cycle: Vec<PathBuf> =
                        stack[start..].iter().map(|(m, _)| self.modules[m.0].path.clone()).collect();
                    cycle.push(self.modules[dep.0].path.clone());
                    let warning = CyclicGraphWarning { cycle };
                    warn!("{}", warning);
                    self.warnings.push(warning);
                }
                VisitState::Done => {}
            }
        }

        Ok(ModuleGraph { modules: self.modules, order: self.order, warnings: self.warnings })
    }

    /// Assign the next id to `path` and surface its load failure, if any.
    fn discover(&mut self, path: PathBuf) -> Result<ModuleId, BuildError> {
        let loaded = match self.loaded.remove(&path) {
            Some(loaded) => loaded,
            None => load_module(&path, self.resolver, self.registry),
        };
        let module = match loaded.outcome {
            Ok(module) => module,
            Err(LoadFailure::Io(source)) => return Err(BuildError::io(path, source)),
            Err(LoadFailure::Transform(source)) => {
                return Err(BuildError::TransformFailed { path, source });
            }
        };

        let id = ModuleId(self.modules.len());
        trace!("Assigned id {} to {}", id, path.display());
        self.ids.insert(path.clone(), id);
        self.edges.push(module.edges);
        self.modules.push(ModuleRecord {
            id,
            path,
            source: module.source,
            kind: module.kind,
            specifiers: module.specifiers,
            transformed: module.transformed,
            dependencies: Vec::new(),
            targets: HashMap::new(),
            state: VisitState::Unvisited,
        });
        Ok(id)
    }

    fn link(&mut self, from: ModuleId, request: &str, to: ModuleId) {
        let record = &mut self.modules[from.0];
        record.targets.insert(request.to_string(), to);
        if !record.dependencies.contains(&to) {
            record.dependencies.push(to);
        }
    }
}
