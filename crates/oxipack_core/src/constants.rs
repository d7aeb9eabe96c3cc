//! Defaults for module resolution.
//!
//! Extensions are written with their leading dot, the way bundler configs
//! spell them (`.svelte`, `.ts`).

/// Extensions tried, in order, when a specifier does not name an existing file
pub const DEFAULT_EXTENSIONS: &[&str] = &[".mjs", ".js", ".ts", ".svelte", ".json"];

/// Manifest fields consulted for a package's root entry point
pub const DEFAULT_MAIN_FIELDS: &[&str] = &["browser", "module", "main"];

/// Conditions accepted in a manifest's conditional `exports`
pub const DEFAULT_CONDITION_NAMES: &[&str] = &["browser"];

/// Conditions that are always active: every specifier comes from a static
/// `import`, and `default` is the catch-all.
pub const IMPLICIT_CONDITIONS: &[&str] = &["import", "default"];

pub const MANIFEST_FILE: &str = "package.json";

/// Base name probed inside directories
pub(crate) const INDEX_BASENAME: &str = "index";
