use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub request: String,
    pub kind: SpecKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecKind {
    /// `import ... from`, `export ... from`, `export * from`
    Static,
    /// `import(...)`, recorded but never followed
    Dynamic,
}

/// The kind of a source file, detected from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Script,
    TypeScript,
    Component,
    Stylesheet,
    Json,
    Unknown,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("js" | "mjs" | "cjs" | "jsx") => FileKind::Script,
            Some("ts" | "mts" | "cts" | "tsx") => FileKind::TypeScript,
            Some("svelte") => FileKind::Component,
            Some("css") => FileKind::Stylesheet,
            Some("json") => FileKind::Json,
            _ => FileKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Script => "script",
            FileKind::TypeScript => "typescript",
            FileKind::Component => "component",
            FileKind::Stylesheet => "stylesheet",
            FileKind::Json => "json",
            FileKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_from_extension() {
        assert_eq!(FileKind::from_path(Path::new("/a/main.ts")), FileKind::TypeScript);
        assert_eq!(FileKind::from_path(Path::new("/a/App.svelte")), FileKind::Component);
        assert_eq!(FileKind::from_path(Path::new("/a/util.mjs")), FileKind::Script);
        assert_eq!(FileKind::from_path(Path::new("/a/theme.css")), FileKind::Stylesheet);
        assert_eq!(FileKind::from_path(Path::new("/a/data.json")), FileKind::Json);
        assert_eq!(FileKind::from_path(Path::new("/a/README")), FileKind::Unknown);
        assert_eq!(FileKind::from_path(Path::new("/a/logo.png")), FileKind::Unknown);
    }
}
