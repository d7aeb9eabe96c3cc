use log::{debug, trace};
use oxipack_core::{ConfigError, FileKind, TransformError};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, path::Path, sync::Arc};

use crate::{
    compile::ComponentCompileStage, json::JsonStage, mapping::LineMappings,
    options::TransformOptions, preprocess::ComponentPreprocessStage, script::ScriptStage,
    stylesheet::StylesheetStage, typescript::TypeScriptStage,
};

/// Where a stage sits in a chain. A preprocess stage must never follow a compile stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StagePhase {
    Preprocess,
    Compile,
    Transpile,
    Emit,
}

/// Output of a stage, and input of the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    pub code: String,
    /// Positions in `code` mapped back to the original file, when known
    pub mappings: Option<LineMappings>,
    /// Stylesheet extracted by the chain instead of being injected
    pub stylesheet: Option<String>,
}

impl Transformed {
    /// The untouched source file, entering the first stage.
    pub fn source(code: &str) -> Self {
        Self { code: code.to_string(), mappings: Some(LineMappings::identity(code)), stylesheet: None }
    }
}

pub struct StageContext<'a> {
    pub path: &'a Path,
    pub options: TransformOptions,
}

/// One step of a transform chain. Stages are pure: the same input and
/// options always give the same output.
pub trait TransformStage: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn phase(&self) -> StagePhase;

    fn apply(&self, ctx: &StageContext<'_>, input: Transformed) -> Result<Transformed, TransformError>;
}

/// Look up a built-in stage by the name used in config files.
pub fn stage_by_name(name: &str) -> Result<Arc<dyn TransformStage>, ConfigError> {
    builtin_stage(name).ok_or_else(|| ConfigError::UnknownStage(name.to_string()))
}

fn builtin_stage(name: &str) -> Option<Arc<dyn TransformStage>> {
    let stage: Arc<dyn TransformStage> = match name {
        "script" => Arc::new(ScriptStage),
        "typescript" => Arc::new(TypeScriptStage),
        "component-preprocess" => Arc::new(ComponentPreprocessStage),
        "component-compile" => Arc::new(ComponentCompileStage),
        "stylesheet" => Arc::new(StylesheetStage),
        "json" => Arc::new(JsonStage),
        _ => return None,
    };
    Some(stage)
}

#[derive(Debug, Clone)]
pub struct TransformRule {
    kind: FileKind,
    stages: Vec<Arc<dyn TransformStage>>,
    options: TransformOptions,
}

impl TransformRule {
    pub fn new(
        kind: FileKind,
        stages: Vec<Arc<dyn TransformStage>>,
        options: TransformOptions,
    ) -> Result<Self, ConfigError> {
        let mut compile_stage: Option<&'static str> = None;
        for stage in &stages {
            match stage.phase() {
                StagePhase::Compile => compile_stage = Some(stage.name()),
                StagePhase::Preprocess => {
                    if let Some(earlier) = compile_stage {
                        return Err(ConfigError::StageOrder {
                            earlier: earlier.to_string(),
                            later: stage.name().to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(Self { kind, stages, options })
    }

    pub fn from_names(
        kind: FileKind,
        names: &[&str],
        options: TransformOptions,
    ) -> Result<Self, ConfigError> {
        let stages = names.iter().map(|n| stage_by_name(n)).collect::<Result<Vec<_>, _>>()?;
        Self::new(kind, stages, options)
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn options(&self) -> TransformOptions {
        self.options
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    fn run(
        &self,
        path: &Path,
        source: &str,
        options: TransformOptions,
    ) -> Result<Transformed, TransformError> {
        let ctx = StageContext { path, options };
        let mut current = Transformed::source(source);
        for stage in &self.stages {
            trace!("Running stage '{}' on {}", stage.name(), path.display());
            current = stage.apply(&ctx, current)?;
        }
        Ok(current)
    }
}

/// A rule as written in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    pub kind: FileKind,
    pub stages: Vec<String>,
    /// Falls back to the build-wide options when absent
    #[serde(default)]
    pub options: Option<TransformOptions>,
}

impl RuleSpec {
    pub fn into_rule(&self, defaults: TransformOptions) -> Result<TransformRule, ConfigError> {
        let names: Vec<&str> = self.stages.iter().map(String::as_str).collect();
        TransformRule::from_names(self.kind, &names, self.options.unwrap_or(defaults))
    }
}

/// At most one rule per file kind; lookup is by kind only, so it is deterministic.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    rules: BTreeMap<FileKind, TransformRule>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules for every known file kind, all sharing `options`.
    pub fn with_defaults(options: TransformOptions) -> Self {
        let defaults: [(FileKind, &[&str]); 5] = [
            (FileKind::Script, &["script"]),
            (FileKind::TypeScript, &["typescript"]),
            (FileKind::Component, &["component-preprocess", "component-compile"]),
            (FileKind::Stylesheet, &["stylesheet"]),
            (FileKind::Json, &["json"]),
        ];
        let mut rules = BTreeMap::new();
        for (kind, names) in defaults {
            let stages = names.iter().filter_map(|n| builtin_stage(n)).collect();
            rules.insert(kind, TransformRule { kind, stages, options });
        }
        Self { rules }
    }

    pub fn add_rule(&mut self, rule: TransformRule) -> Result<(), ConfigError> {
        if self.rules.contains_key(&rule.kind) {
            return Err(ConfigError::DuplicateRule { kind: rule.kind });
        }
        debug!("Registered {} rule: {:?}", rule.kind, rule.stage_names());
        self.rules.insert(rule.kind, rule);
        Ok(())
    }

    /// Replace the rule for the rule's kind, returning the previous one.
    pub fn set_rule(&mut self, rule: TransformRule) -> Option<TransformRule> {
        self.rules.insert(rule.kind, rule)
    }

    pub fn rule_for(&self, kind: FileKind) -> Option<&TransformRule> {
        self.rules.get(&kind)
    }

    /// Run the chain registered for `kind` with the rule's own options.
    pub fn transform(
        &self,
        kind: FileKind,
        path: &Path,
        source: &str,
    ) -> Result<Transformed, TransformError> {
        let rule = self.require_rule(kind, path)?;
        rule.run(path, source, rule.options)
    }

    /// Run the chain registered for `kind` with explicit options.
    pub fn transform_with(
        &self,
        kind: FileKind,
        path: &Path,
        source: &str,
        options: TransformOptions,
    ) -> Result<Transformed, TransformError> {
        self.require_rule(kind, path)?.run(path, source, options)
    }

    fn require_rule(&self, kind: FileKind, path: &Path) -> Result<&TransformRule, TransformError> {
        self.rules.get(&kind).ok_or_else(|| {
            TransformError::unsupported(format!(
                "no transform rule for {} files ({})",
                kind,
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Upper;

    impl TransformStage for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn phase(&self) -> StagePhase {
            StagePhase::Transpile
        }

        fn apply(&self, _ctx: &StageContext<'_>, input: Transformed) -> Result<Transformed, TransformError> {
            Ok(Transformed { code: input.code.to_uppercase(), ..input })
        }
    }

    #[derive(Debug)]
    struct Suffix(&'static str);

    impl TransformStage for Suffix {
        fn name(&self) -> &'static str {
            "suffix"
        }

        fn phase(&self) -> StagePhase {
            StagePhase::Emit
        }

        fn apply(&self, _ctx: &StageContext<'_>, input: Transformed) -> Result<Transformed, TransformError> {
            Ok(Transformed { code: format!("{}{}", input.code, self.0), ..input })
        }
    }

    #[test]
    fn test_chain_runs_left_to_right() {
        let rule = TransformRule::new(
            FileKind::Script,
            vec![Arc::new(Upper), Arc::new(Suffix("-done"))],
            TransformOptions::default(),
        )
        .unwrap();
        let mut registry = TransformRegistry::new();
        registry.add_rule(rule).unwrap();

        let out = registry.transform(FileKind::Script, Path::new("/a.js"), "abc").unwrap();
        assert_eq!(out.code, "ABC-done");
    }

    #[test]
    fn test_preprocess_after_compile_rejected() {
        let err = TransformRule::from_names(
            FileKind::Component,
            &["component-compile", "component-preprocess"],
            TransformOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::StageOrder { .. }));

        let ok = TransformRule::from_names(
            FileKind::Component,
            &["component-preprocess", "component-compile"],
            TransformOptions::default(),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unknown_stage_name() {
        let err = stage_by_name("sass").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStage(name) if name == "sass"));
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let mut registry = TransformRegistry::with_defaults(TransformOptions::default());
        let rule =
            TransformRule::from_names(FileKind::Json, &["json"], TransformOptions::default()).unwrap();
        assert!(matches!(registry.add_rule(rule.clone()), Err(ConfigError::DuplicateRule { .. })));
        assert!(registry.set_rule(rule).is_some());
    }

    #[test]
    fn test_missing_rule_is_unsupported() {
        let registry = TransformRegistry::new();
        let err = registry.transform(FileKind::Script, Path::new("/a.js"), "").unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedFeature { .. }));

        let registry = TransformRegistry::with_defaults(TransformOptions::default());
        let err = registry.transform(FileKind::Unknown, Path::new("/logo.png"), "").unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedFeature { feature } if feature.contains("unknown")));
    }

    #[test]
    fn test_default_rules() {
        let registry = TransformRegistry::with_defaults(TransformOptions::default());
        assert_eq!(
            registry.rule_for(FileKind::Component).unwrap().stage_names(),
            vec!["component-preprocess", "component-compile"]
        );
        assert_eq!(registry.rule_for(FileKind::TypeScript).unwrap().stage_names(), vec!["typescript"]);
    }

    #[test]
    fn test_rule_spec_from_json() {
        let spec: RuleSpec = serde_json::from_str(
            r#"{ "kind": "component", "stages": ["component-compile"], "options": { "legacyComponentApi": true } }"#,
        )
        .unwrap();
        let rule = spec.into_rule(TransformOptions::default()).unwrap();
        assert_eq!(rule.kind(), FileKind::Component);
        assert!(rule.options().legacy_component_api);
    }

    #[test]
    fn test_transform_with_overrides_rule_options() {
        let registry = TransformRegistry::with_defaults(TransformOptions::default());
        let source = "<script>export let name;</script><p>{name}</p>";
        let plain = registry.transform(FileKind::Component, Path::new("/App.svelte"), source).unwrap();
        let dev = registry
            .transform_with(
                FileKind::Component,
                Path::new("/App.svelte"),
                source,
                TransformOptions { development_assertions: true, ..Default::default() },
            )
            .unwrap();
        assert!(!plain.code.contains("was created without expected prop"));
        assert!(dev.code.contains("was created without expected prop 'name'"));
    }
}
