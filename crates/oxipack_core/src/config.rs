use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONDITION_NAMES, DEFAULT_EXTENSIONS, DEFAULT_MAIN_FIELDS, IMPLICIT_CONDITIONS,
};

/// How specifiers are turned into files. Fixed before a build starts and
/// shared read-only by every resolver call of that build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolutionConfig {
    /// Extensions appended to extensionless specifiers, in priority order
    pub extensions: Vec<String>,
    /// Conditions accepted in conditional `exports`, in addition to `import` and `default`
    pub condition_names: Vec<String>,
    /// Manifest fields naming a package's entry point, in priority order
    pub main_fields: Vec<String>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS, DEFAULT_CONDITION_NAMES, DEFAULT_MAIN_FIELDS)
    }
}

impl ResolutionConfig {
    pub fn new(extensions: &[&str], condition_names: &[&str], main_fields: &[&str]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| normalize_extension(e)).collect(),
            condition_names: condition_names.iter().map(|c| c.to_string()).collect(),
            main_fields: main_fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Extensions with a guaranteed leading dot, so user-supplied `ts` and `.ts` behave alike.
    pub fn normalized_extensions(&self) -> impl Iterator<Item = String> + '_ {
        self.extensions.iter().map(|e| normalize_extension(e))
    }

    pub fn accepts_condition(&self, condition: &str) -> bool {
        IMPLICIT_CONDITIONS.contains(&condition) || self.condition_names.iter().any(|c| c == condition)
    }
}

fn normalize_extension(ext: &str) -> String {
    if ext.starts_with('.') { ext.to_string() } else { format!(".{ext}") }
}
