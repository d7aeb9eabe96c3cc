use log::{debug, info, trace};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    config::{BuildSettings, Config, SourceMapFidelity},
    emitter::{BundleOutput, emit},
    error::BuildError,
    graph::{CyclicGraphWarning, ModuleGraph, ResolverContext, build_graph},
};

/// What a successful build wrote.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub out: PathBuf,
    /// Every file written, bundle first
    pub files: Vec<PathBuf>,
    pub modules: usize,
    pub warnings: Vec<CyclicGraphWarning>,
    /// Size of the bundle file
    pub bytes: usize,
}

/// Build the graph and emit the bundle without touching the output directory.
pub fn bundle(settings: &BuildSettings) -> Result<(ModuleGraph, BundleOutput), BuildError> {
    let resolver = ResolverContext::new(settings.resolution.clone());
    let graph = build_graph(&settings.entry, &resolver, &settings.registry)?;
    let output = emit(&graph, settings.wrap, settings.sourcemap)?;
    Ok((graph, output))
}

pub fn run_build(cfg: &Config) -> Result<BuildReport, BuildError> {
    info!("Starting build");
    let settings = cfg.settings()?;
    info!("Bundling {} into {}", settings.entry.display(), settings.out.display());

    let (graph, output) = bundle(&settings)?;
    let files = write_outputs(&settings.out, output)?;
    let bytes = fs::metadata(&settings.out).map(|m| m.len() as usize).unwrap_or_default();

    info!("Wrote {} file(s)", files.len());
    Ok(BuildReport {
        out: settings.out,
        files,
        modules: graph.len(),
        warnings: graph.warnings,
        bytes,
    })
}

/// Everything is rendered and staged before any destination is touched, so a
/// failure leaves no partial output.
fn write_outputs(out: &Path, output: BundleOutput) -> Result<Vec<PathBuf>, BuildError> {
    let file_name = out
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bundle.js".to_string());

    let mut code = output.code;
    let mut pending: Vec<(PathBuf, String)> = Vec::new();

    if output.fidelity == SourceMapFidelity::LineColumn
        && let Some(mut map) = output.source_map
    {
        map.file = Some(file_name.clone());
        code.push_str(&format!("//# sourceMappingURL={file_name}.map\n"));
        pending.push((out.with_file_name(format!("{file_name}.map")), map.to_json()));
    }
    if let Some(css) = output.stylesheet {
        pending.push((out.with_extension("css"), css));
    }
    pending.insert(0, (out.to_path_buf(), code));

    if let Some(parent) = out.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }

    // Stage every file next to its destination, then move them all into place
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(pending.len());
    for (path, content) in pending {
        let temp = staging_path(&path);
        debug!("Writing {} ({} bytes)", temp.display(), content.len());
        if let Err(e) = fs::write(&temp, content) {
            discard(staged.iter().map(|(temp, _)| temp));
            return Err(BuildError::io(&temp, e));
        }
        staged.push((temp, path));
    }

    let mut files: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for (index, (temp, path)) in staged.iter().enumerate() {
        trace!("Moving {} to {}", temp.display(), path.display());
        if let Err(e) = fs::rename(temp, path) {
            discard(staged[index..].iter().map(|(temp, _)| temp));
            discard(files.iter());
            return Err(BuildError::io(path, e));
        }
        files.push(path.clone());
    }
    Ok(files)
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{name}.oxipack-tmp"))
}

fn discard<'p>(paths: impl Iterator<Item = &'p PathBuf>) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            debug!("Could not remove {}: {}", path.display(), e);
        }
    }
}
