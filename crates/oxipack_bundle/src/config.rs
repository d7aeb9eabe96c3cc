use clap::{Parser, ValueEnum};
use log::{debug, trace};
use oxipack_core::{ConfigError, ResolutionConfig};
use oxipack_transform::{RuleSpec, TransformOptions, TransformRegistry};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::error::BuildError;

/// How the bundle is wrapped so nothing leaks into the global scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum WrapStrategy {
    /// One immediately-invoked function around the whole bundle
    #[default]
    #[value(name = "iife", alias = "isolated-scope")]
    #[serde(rename = "iife", alias = "isolated-scope")]
    IsolatedScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMapFidelity {
    #[default]
    None,
    /// One segment per output line, inlined into the bundle
    Line,
    /// Every mapped token, written next to the bundle
    #[value(name = "full")]
    #[serde(rename = "full")]
    LineColumn,
}

/// Settings of the bundler configurations this tool replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    Rollup,
    Webpack,
    WebpackLegacy,
}

impl Preset {
    pub fn resolution(self) -> ResolutionConfig {
        const CONDITIONS: &[&str] = &["svelte", "browser"];
        match self {
            // `extensions` replaces the resolver defaults; `browser: true` selects the browser field
            Preset::Rollup => {
                ResolutionConfig::new(&[".svelte"], CONDITIONS, &["browser", "module", "main"])
            }
            Preset::Webpack | Preset::WebpackLegacy => ResolutionConfig::new(
                &[".mjs", ".js", ".svelte", ".ts"],
                CONDITIONS,
                &["svelte", "browser", "module", "main"],
            ),
        }
    }

    pub fn sourcemap(self) -> SourceMapFidelity {
        match self {
            Preset::Webpack => SourceMapFidelity::Line,
            Preset::Rollup | Preset::WebpackLegacy => SourceMapFidelity::None,
        }
    }

    pub fn legacy_component_api(self) -> bool {
        matches!(self, Preset::Rollup | Preset::WebpackLegacy)
    }
}

#[derive(Debug, Clone, Default, Parser, Deserialize)]
#[command(name = "build")]
#[command(about = "Bundle an entry module into a single browser script")]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Entry module of the bundle
    #[arg(long)]
    pub entry: Option<PathBuf>,

    /// Bundle file to write
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Wrapping of the bundle
    #[arg(long, value_enum)]
    pub format: Option<WrapStrategy>,

    /// Source map to produce
    #[arg(long, value_enum)]
    pub sourcemap: Option<SourceMapFidelity>,

    /// Start from the settings of a known bundler configuration
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// JSON file with build settings (command-line flags win)
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Inject development assertions into compiled components
    #[arg(long)]
    pub dev: bool,

    /// Write stylesheets to a separate .css file instead of injecting them
    #[arg(long)]
    pub emit_css: bool,

    /// Compile components to the class-based component API
    #[arg(long)]
    pub legacy_component_api: bool,

    #[clap(skip)]
    pub resolution: Option<ResolutionConfig>,

    #[clap(skip)]
    pub rules: Vec<RuleSpec>,
}

/// Everything a build needs, with presets, config file and flags applied.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub entry: PathBuf,
    pub out: PathBuf,
    pub wrap: WrapStrategy,
    pub sourcemap: SourceMapFidelity,
    pub options: TransformOptions,
    pub resolution: Arc<ResolutionConfig>,
    pub registry: Arc<TransformRegistry>,
}

impl Config {
    /// Read a JSON config file. Relative paths in it are taken from the file's directory.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        debug!("Reading config file: {}", path.display());
        let content = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let mut cfg: Config = serde_json::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        cfg.entry = cfg.entry.map(|p| base.join(p));
        cfg.out = cfg.out.map(|p| base.join(p));
        trace!("Config file values: {:?}", cfg);
        Ok(cfg)
    }

    /// Apply the config file (if any) and the preset underneath these values.
    pub fn settings(&self) -> Result<BuildSettings, BuildError> {
        let merged = match &self.config {
            Some(path) => self.clone().over(Config::from_file(path)?),
            None => self.clone(),
        };
        merged.finalize()
    }

    /// `self` wins wherever it has a value.
    fn over(self, file: Config) -> Config {
        Config {
            entry: self.entry.or(file.entry),
            out: self.out.or(file.out),
            format: self.format.or(file.format),
            sourcemap: self.sourcemap.or(file.sourcemap),
            preset: self.preset.or(file.preset),
            config: self.config,
            dev: self.dev || file.dev,
            emit_css: self.emit_css || file.emit_css,
            legacy_component_api: self.legacy_component_api || file.legacy_component_api,
            resolution: self.resolution.or(file.resolution),
            rules: if self.rules.is_empty() { file.rules } else { self.rules },
        }
    }

    fn finalize(self) -> Result<BuildSettings, BuildError> {
        let entry = self.entry.ok_or(ConfigError::Missing("entry"))?;
        let out = self.out.ok_or(ConfigError::Missing("out"))?;
        let preset = self.preset;

        let options = TransformOptions {
            emit_stylesheet: self.emit_css,
            development_assertions: self.dev,
            legacy_component_api: self.legacy_component_api
                || preset.is_some_and(Preset::legacy_component_api),
        };

        let mut registry = TransformRegistry::with_defaults(options);
        let mut seen = BTreeSet::new();
        for spec in &self.rules {
            if !seen.insert(spec.kind) {
                return Err(ConfigError::DuplicateRule { kind: spec.kind }.into());
            }
            registry.set_rule(spec.into_rule(options)?);
        }

        let resolution = self
            .resolution
            .or_else(|| preset.map(Preset::resolution))
            .unwrap_or_default();
        let sourcemap = self
            .sourcemap
            .or_else(|| preset.map(Preset::sourcemap))
            .unwrap_or_default();

        debug!(
            "Build settings: preset={:?}, sourcemap={:?}, options={:?}",
            preset, sourcemap, options
        );
        Ok(BuildSettings {
            entry,
            out,
            wrap: self.format.unwrap_or_default(),
            sourcemap,
            options,
            resolution: Arc::new(resolution),
            registry: Arc::new(registry),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxipack_core::FileKind;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["build"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_flags() {
        let cfg = parse(&[
            "--entry",
            "src/main.ts",
            "--out",
            "dist/bundle.js",
            "--format",
            "isolated-scope",
            "--sourcemap",
            "full",
            "--preset",
            "webpack-legacy",
            "--dev",
        ]);
        assert_eq!(cfg.format, Some(WrapStrategy::IsolatedScope));
        assert_eq!(cfg.sourcemap, Some(SourceMapFidelity::LineColumn));
        assert_eq!(cfg.preset, Some(Preset::WebpackLegacy));
        assert!(cfg.dev);
        assert!(!cfg.emit_css);
    }

    #[test]
    fn test_presets() {
        let settings = parse(&["--entry", "a.ts", "--out", "b.js", "--preset", "rollup"]).settings().unwrap();
        assert_eq!(settings.resolution.extensions, vec![".svelte"]);
        assert_eq!(settings.resolution.main_fields, vec!["browser", "module", "main"]);
        assert_eq!(settings.resolution.condition_names, vec!["svelte", "browser"]);
        assert_eq!(settings.sourcemap, SourceMapFidelity::None);
        assert!(settings.options.legacy_component_api);

        let settings = parse(&["--entry", "a.ts", "--out", "b.js", "--preset", "webpack"]).settings().unwrap();
        assert_eq!(settings.resolution.extensions, vec![".mjs", ".js", ".svelte", ".ts"]);
        assert_eq!(settings.resolution.main_fields, vec!["svelte", "browser", "module", "main"]);
        assert_eq!(settings.sourcemap, SourceMapFidelity::Line);
        assert!(!settings.options.legacy_component_api);

        let settings =
            parse(&["--entry", "a.ts", "--out", "b.js", "--preset", "webpack-legacy"]).settings().unwrap();
        assert_eq!(settings.sourcemap, SourceMapFidelity::None);
        assert!(settings.options.legacy_component_api);
    }

    #[test]
    fn test_flags_override_preset() {
        let settings = parse(&["--entry", "a.ts", "--out", "b.js", "--preset", "webpack", "--sourcemap", "none"])
            .settings()
            .unwrap();
        assert_eq!(settings.sourcemap, SourceMapFidelity::None);
    }

    #[test]
    fn test_defaults_without_preset() {
        let settings = parse(&["--entry", "a.ts", "--out", "b.js"]).settings().unwrap();
        assert_eq!(*settings.resolution, ResolutionConfig::default());
        assert_eq!(settings.wrap, WrapStrategy::IsolatedScope);
        assert_eq!(settings.sourcemap, SourceMapFidelity::None);
        assert_eq!(settings.options, TransformOptions::default());
    }

    #[test]
    fn test_missing_entry() {
        let err = parse(&["--out", "b.js"]).settings().unwrap_err();
        assert!(matches!(err, BuildError::Config(ConfigError::Missing("entry"))));
    }

    #[test]
    fn test_config_file_under_flags() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("oxipack.json");
        fs::write(
            &file,
            r#"{
                "entry": "src/main.ts",
                "out": "dist/app.js",
                "preset": "webpack",
                "sourcemap": "full",
                "emitCss": true,
                "resolution": { "extensions": [".ts", ".js"], "conditionNames": ["custom"] },
                "rules": [{ "kind": "json", "stages": ["script"] }]
            }"#,
        )
        .unwrap();

        let cli = parse(&["--config", file.to_str().unwrap(), "--out", "elsewhere.js"]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.entry, temp_dir.path().join("src/main.ts"));
        assert_eq!(settings.out, PathBuf::from("elsewhere.js"));
        assert_eq!(settings.sourcemap, SourceMapFidelity::LineColumn);
        assert!(settings.options.emit_stylesheet);
        assert_eq!(settings.resolution.extensions, vec![".ts", ".js"]);
        assert_eq!(settings.resolution.condition_names, vec!["custom"]);
        assert_eq!(settings.registry.rule_for(FileKind::Json).unwrap().stage_names(), vec!["script"]);
    }

    #[test]
    fn test_config_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        let missing = parse(&["--config", temp_dir.path().join("nope.json").to_str().unwrap()]);
        assert!(matches!(missing.settings().unwrap_err(), BuildError::Config(ConfigError::Read { .. })));

        let file = temp_dir.path().join("bad.json");
        fs::write(&file, r#"{ "entry": 3 }"#).unwrap();
        let bad = parse(&["--config", file.to_str().unwrap()]);
        assert!(matches!(bad.settings().unwrap_err(), BuildError::Config(ConfigError::Parse { .. })));

        let file = temp_dir.path().join("dup.json");
        fs::write(
            &file,
            r#"{ "entry": "a.js", "out": "b.js", "rules": [{ "kind": "json", "stages": ["json"] }, { "kind": "json", "stages": ["script"] }] }"#,
        )
        .unwrap();
        let dup = parse(&["--config", file.to_str().unwrap()]);
        assert!(matches!(dup.settings().unwrap_err(), BuildError::Config(ConfigError::DuplicateRule { .. })));

        let file = temp_dir.path().join("order.json");
        fs::write(
            &file,
            r#"{ "entry": "a.js", "out": "b.js", "rules": [{ "kind": "component", "stages": ["component-compile", "component-preprocess"] }] }"#,
        )
        .unwrap();
        let order = parse(&["--config", file.to_str().unwrap()]);
        assert!(matches!(order.settings().unwrap_err(), BuildError::Config(ConfigError::StageOrder { .. })));
    }
}
