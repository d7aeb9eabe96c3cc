use dashmap::DashMap;
use log::{debug, trace, warn};
use path_clean::clean;
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    config::ResolutionConfig,
    constants::{INDEX_BASENAME, MANIFEST_FILE},
    error::ResolutionError,
    exports::resolve_exports,
};

/// Memoised resolutions keyed by (importing file, specifier). Failures are cached too.
pub type ResolveCache = DashMap<(PathBuf, String), Result<PathBuf, ResolutionError>>;

/// Resolve `request`, as written in `from_file`, to a canonical absolute path.
pub fn resolve(
    from_file: &Path,
    request: &str,
    cfg: &ResolutionConfig,
    cache: &ResolveCache,
) -> Result<PathBuf, ResolutionError> {
    let key = (from_file.to_path_buf(), request.to_string());
    if let Some(v) = cache.get(&key) {
        trace!("Cache hit for resolve: '{}' from {}", request, from_file.display());
        return v.clone();
    }
    trace!("Resolving: '{}' from {}", request, from_file.display());

    let base = from_file.parent().unwrap_or_else(|| Path::new("/"));
    let resolved = if is_path_like(request) {
        trace!("Resolving as path: '{}'", request);
        let candidate = clean(base.join(request));
        resolve_file(&candidate, cfg).ok_or_else(|| ResolutionError::not_found(request))
    } else {
        trace!("Resolving as package: '{}'", request);
        resolve_package_from_dir(base, request, cfg)
    };

    match &resolved {
        Ok(path) => debug!("Resolved '{}' from {} to {}", request, from_file.display(), path.display()),
        Err(e) => debug!("Failed to resolve '{}' from {}: {}", request, from_file.display(), e),
    }
    cache.insert(key, resolved.clone());
    resolved
}

fn is_path_like(request: &str) -> bool {
    request.starts_with("./") || request.starts_with("../") || request.starts_with('/')
        || request == "." || request == ".."
}

fn resolve_file(p: &Path, cfg: &ResolutionConfig) -> Option<PathBuf> {
    // Try exact path first
    if p.is_file() {
        return Some(canonical(p));
    }

    // Try adding extensions, first match wins
    for ext in cfg.normalized_extensions() {
        let candidate = PathBuf::from(format!("{}{}", p.display(), ext));
        if candidate.is_file() {
            return Some(canonical(&candidate));
        }
    }

    // Try index files
    if p.is_dir() {
        for ext in cfg.normalized_extensions() {
            let candidate = p.join(format!("{INDEX_BASENAME}{ext}"));
            if candidate.is_file() {
                return Some(canonical(&candidate));
            }
        }
    }

    None
}

fn canonical(p: &Path) -> PathBuf {
    p.canonicalize().unwrap_or_else(|_| p.to_path_buf())
}

/// Splits `@scope/name/sub/path` into (`@scope/name`, `sub/path`).
fn split_package_request(request: &str) -> (&str, &str) {
    let mut slashes = request.match_indices('/').map(|(i, _)| i);
    let name_end = if request.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    match name_end {
        Some(i) => (&request[..i], &request[i + 1..]),
        None => (request, ""),
    }
}

fn resolve_package_from_dir(
    start_dir: &Path,
    request: &str,
    cfg: &ResolutionConfig,
) -> Result<PathBuf, ResolutionError> {
    let (name, subpath) = split_package_request(request);
    trace!("Walking up from {:?} to find node_modules for '{}'", start_dir, name);

    // The nearest node_modules holding the package decides, even if the subpath is missing
    for dir in start_dir.ancestors() {
        let pkg_dir = dir.join("node_modules").join(name);
        if pkg_dir.is_dir() {
            trace!("Checking package at: {:?}", pkg_dir);
            return resolve_package(&pkg_dir, request, subpath, cfg);
        }
    }

    Err(ResolutionError::not_found(request))
}

fn resolve_package(
    pkg_dir: &Path,
    request: &str,
    subpath: &str,
    cfg: &ResolutionConfig,
) -> Result<PathBuf, ResolutionError> {
    let manifest_path = pkg_dir.join(MANIFEST_FILE);
    let manifest = read_manifest(&manifest_path);

    if let Some(exports) = manifest.as_ref().and_then(|m| m.get("exports")) {
        let export_subpath =
            if subpath.is_empty() { ".".to_string() } else { format!("./{subpath}") };
        return match resolve_exports(exports, &export_subpath, cfg) {
            Ok(Some(target)) => {
                trace!("exports mapped '{}' to '{}'", export_subpath, target);
                resolve_file(&clean(pkg_dir.join(&target)), cfg)
                    .ok_or_else(|| ResolutionError::not_found(request))
            }
            Ok(None) => Err(ResolutionError::not_found(request)),
            Err(ambiguity) => Err(ResolutionError::Ambiguous {
                specifier: request.to_string(),
                manifest: manifest_path,
                reason: ambiguity.0,
            }),
        };
    }

    if !subpath.is_empty() {
        return resolve_file(&clean(pkg_dir.join(subpath)), cfg)
            .ok_or_else(|| ResolutionError::not_found(request));
    }

    if let Some(manifest) = &manifest {
        for field in &cfg.main_fields {
            // Object-valued fields (e.g. a `browser` replacement map) do not name an entry point
            if let Some(entry) = manifest.get(field).and_then(|v| v.as_str()) {
                if let Some(resolved) = resolve_file(&clean(pkg_dir.join(entry)), cfg) {
                    trace!("Main field '{}' selected {:?}", field, resolved);
                    return Ok(resolved);
                }
            }
        }
    }

    // Fallback to index files
    resolve_file(pkg_dir, cfg).ok_or_else(|| ResolutionError::not_found(request))
}

fn read_manifest(path: &Path) -> Option<Value> {
    let txt = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Value>(&txt) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring unparsable manifest {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, path: &str, content: &str) -> PathBuf {
        let file_path = dir.join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }

    fn canon(p: &Path) -> PathBuf {
        p.canonicalize().unwrap()
    }

    #[test]
    fn test_relative_with_extension_priority() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let main = create_test_file(root, "src/main.ts", "");
        let svelte = create_test_file(root, "src/App.svelte", "");
        create_test_file(root, "src/App.js", "");

        let cfg = ResolutionConfig::new(&[".svelte", ".js"], &[], &[]);
        let cache = ResolveCache::new();
        assert_eq!(resolve(&main, "./App", &cfg, &cache).unwrap(), canon(&svelte));

        let cfg = ResolutionConfig::new(&[".js", ".svelte"], &[], &[]);
        let cache = ResolveCache::new();
        assert_eq!(
            resolve(&main, "./App", &cfg, &cache).unwrap(),
            canon(&root.join("src/App.js"))
        );
    }

    #[test]
    fn test_exact_file_wins_over_extensions() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let main = create_test_file(root, "main.js", "");
        let exact = create_test_file(root, "App.svelte", "");

        let cache = ResolveCache::new();
        let resolved = resolve(&main, "./App.svelte", &ResolutionConfig::default(), &cache);
        assert_eq!(resolved.unwrap(), canon(&exact));
    }

    #[test]
    fn test_parent_dir_and_index() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let main = create_test_file(root, "src/app/main.js", "");
        let index = create_test_file(root, "src/lib/index.ts", "");

        let cache = ResolveCache::new();
        let resolved = resolve(&main, "../lib", &ResolutionConfig::default(), &cache);
        assert_eq!(resolved.unwrap(), canon(&index));
    }

    #[test]
    fn test_relative_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let main = create_test_file(temp_dir.path(), "main.js", "");
        let cache = ResolveCache::new();

        let err = resolve(&main, "./missing", &ResolutionConfig::default(), &cache).unwrap_err();
        assert_eq!(err, ResolutionError::NotFound { specifier: "./missing".into() });
        // Failures are memoised as well
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_resolution_is_deterministic_and_cached() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let main = create_test_file(root, "main.js", "");
        create_test_file(root, "util.js", "");

        let cfg = ResolutionConfig::default();
        let cache = ResolveCache::new();
        let first = resolve(&main, "./util", &cfg, &cache).unwrap();
        let second = resolve(&main, "./util", &cfg, &cache).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);

        let fresh = resolve(&main, "./util", &cfg, &ResolveCache::new()).unwrap();
        assert_eq!(first, fresh);
    }

    #[test]
    fn test_package_main_field_priority() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let main = create_test_file(root, "src/main.js", "");
        create_test_file(
            root,
            "node_modules/widgets/package.json",
            r#"{ "main": "dist/index.cjs", "module": "dist/index.mjs", "svelte": "src/index.js" }"#,
        );
        create_test_file(root, "node_modules/widgets/dist/index.cjs", "");
        create_test_file(root, "node_modules/widgets/dist/index.mjs", "");
        let svelte_entry = create_test_file(root, "node_modules/widgets/src/index.js", "");

        let cfg = ResolutionConfig::new(&[".js"], &[], &["svelte", "browser", "module", "main"]);
        let cache = ResolveCache::new();
        assert_eq!(resolve(&main, "widgets", &cfg, &cache).unwrap(), canon(&svelte_entry));

        let cfg = ResolutionConfig::new(&[".js"], &[], &["module", "main"]);
        let cache = ResolveCache::new();
        assert_eq!(
            resolve(&main, "widgets", &cfg, &cache).unwrap(),
            canon(&root.join("node_modules/widgets/dist/index.mjs"))
        );
    }

    #[test]
    fn test_browser_replacement_map_is_not_an_entry() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let main = create_test_file(root, "main.js", "");
        create_test_file(
            root,
            "node_modules/pkg/package.json",
            r#"{ "browser": { "./node.js": "./browser.js" }, "main": "main.js" }"#,
        );
        let entry = create_test_file(root, "node_modules/pkg/main.js", "");

        let cache = ResolveCache::new();
        assert_eq!(
            resolve(&main, "pkg", &ResolutionConfig::default(), &cache).unwrap(),
            canon(&entry)
        );
    }

    #[test]
    fn test_package_conditional_exports() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let main = create_test_file(root, "src/main.ts", "");
        create_test_file(
            root,
            "node_modules/svelte/package.json",
            r#"{
                "main": "index.js",
                "exports": {
                    ".": { "types": "./types.d.ts", "browser": "./src/client.js", "default": "./src/server.js" },
                    "./store": { "default": "./src/store.js" }
                }
            }"#,
        );
        let client = create_test_file(root, "node_modules/svelte/src/client.js", "");
        let server = create_test_file(root, "node_modules/svelte/src/server.js", "");
        let store = create_test_file(root, "node_modules/svelte/src/store.js", "");

        let browser_cfg = ResolutionConfig::new(&[".js"], &["svelte", "browser"], &["main"]);
        let cache = ResolveCache::new();
        assert_eq!(resolve(&main, "svelte", &browser_cfg, &cache).unwrap(), canon(&client));
        assert_eq!(resolve(&main, "svelte/store", &browser_cfg, &cache).unwrap(), canon(&store));

        let plain_cfg = ResolutionConfig::new(&[".js"], &[], &["main"]);
        let cache = ResolveCache::new();
        assert_eq!(resolve(&main, "svelte", &plain_cfg, &cache).unwrap(), canon(&server));

        let err = resolve(&main, "svelte/internal", &browser_cfg, &cache).unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound { .. }));
    }

    #[test]
    fn test_scoped_package_in_parent_node_modules() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let main = create_test_file(root, "packages/app/src/main.js", "");
        create_test_file(
            root,
            "node_modules/@ui/button/package.json",
            r#"{ "module": "./button.js" }"#,
        );
        let button = create_test_file(root, "node_modules/@ui/button/button.js", "");
        let helper = create_test_file(root, "node_modules/@ui/button/lib/helper.js", "");

        let cache = ResolveCache::new();
        let cfg = ResolutionConfig::default();
        assert_eq!(resolve(&main, "@ui/button", &cfg, &cache).unwrap(), canon(&button));
        assert_eq!(resolve(&main, "@ui/button/lib/helper", &cfg, &cache).unwrap(), canon(&helper));
    }

    #[test]
    fn test_ambiguous_exports() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let main = create_test_file(root, "main.js", "");
        create_test_file(
            root,
            "node_modules/odd/package.json",
            r#"{ "exports": { ".": "./a.js", "import": "./b.js" } }"#,
        );
        create_test_file(root, "node_modules/odd/a.js", "");

        let cache = ResolveCache::new();
        let err = resolve(&main, "odd", &ResolutionConfig::default(), &cache).unwrap_err();
        match err {
            ResolutionError::Ambiguous { specifier, manifest, .. } => {
                assert_eq!(specifier, "odd");
                assert!(manifest.ends_with("node_modules/odd/package.json"));
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_package() {
        let temp_dir = TempDir::new().unwrap();
        let main = create_test_file(temp_dir.path(), "main.js", "");
        let cache = ResolveCache::new();
        let err = resolve(&main, "nope", &ResolutionConfig::default(), &cache).unwrap_err();
        assert_eq!(err, ResolutionError::not_found("nope"));
    }

    #[test]
    fn test_split_package_request() {
        assert_eq!(split_package_request("svelte"), ("svelte", ""));
        assert_eq!(split_package_request("svelte/store"), ("svelte", "store"));
        assert_eq!(split_package_request("@ui/button"), ("@ui/button", ""));
        assert_eq!(split_package_request("@ui/button/lib/x"), ("@ui/button", "lib/x"));
    }
}
