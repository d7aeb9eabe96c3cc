//! Evaluation of a manifest's `exports` field.
//!
//! Supported shapes:
//! - `"exports": "./index.js"` (root shorthand)
//! - `"exports": { ".": ..., "./feature": ..., "./utils/*": ... }` (subpath map)
//! - `"exports": { "svelte": ..., "browser": ..., "default": ... }` (root conditions)
//! - nested condition objects and fallback arrays
//!
//! A condition is taken only when the build accepts it. Among accepted
//! conditions the first declared one wins, and `default` is used only when no
//! narrower condition matched.

use log::trace;
use serde_json::{Map, Value};

use crate::config::ResolutionConfig;

/// The manifest declares exports that cannot be resolved to a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Ambiguity(pub(crate) String);

/// Resolve `subpath` (`"."` for the package root, `"./x"` otherwise) against `exports`.
///
/// Returns the package-relative target (starting with `./`), `None` when the
/// exports do not expose the subpath.
pub(crate) fn resolve_exports(
    exports: &Value,
    subpath: &str,
    cfg: &ResolutionConfig,
) -> Result<Option<String>, Ambiguity> {
    match exports {
        Value::String(_) | Value::Array(_) => {
            if subpath == "." {
                resolve_target(exports, cfg)
            } else {
                Ok(None)
            }
        }
        Value::Object(obj) => {
            let subpath_keys = obj.keys().filter(|k| k.starts_with('.')).count();
            if subpath_keys > 0 && subpath_keys < obj.len() {
                return Err(Ambiguity(
                    "exports mixes subpath keys with condition names".to_string(),
                ));
            }

            if subpath_keys == 0 {
                trace!("exports object holds root conditions");
                return if subpath == "." { resolve_target(exports, cfg) } else { Ok(None) };
            }

            if let Some(target) = obj.get(subpath) {
                return resolve_target(target, cfg);
            }

            resolve_pattern(obj, subpath, cfg)
        }
        _ => Ok(None),
    }
}

fn resolve_pattern(
    obj: &Map<String, Value>,
    subpath: &str,
    cfg: &ResolutionConfig,
) -> Result<Option<String>, Ambiguity> {
    let mut best: Option<(&str, &Value, &str)> = None;

    for (key, value) in obj {
        if key.matches('*').count() != 1 {
            continue;
        }
        let Some(star) = match_pattern(key, subpath) else {
            continue;
        };
        // Longest key is the most specific pattern
        if best.is_none_or(|(k, _, _)| key.len() > k.len()) {
            best = Some((key, value, star));
        }
    }

    let Some((key, value, star)) = best else {
        return Ok(None);
    };
    trace!("Subpath '{}' matched exports pattern '{}'", subpath, key);

    Ok(resolve_target(value, cfg)?.and_then(|target| {
        if target.matches('*').count() != 1 {
            return None;
        }
        validate_target(&target.replace('*', star))
    }))
}

/// Matches `./features/*` against `./features/foo`, returning `foo`.
fn match_pattern<'s>(pattern: &str, subpath: &'s str) -> Option<&'s str> {
    let (prefix, suffix) = pattern.split_once('*')?;
    if subpath.len() < prefix.len() + suffix.len() {
        return None;
    }
    let star = subpath.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if star.is_empty() { None } else { Some(star) }
}

fn resolve_target(target: &Value, cfg: &ResolutionConfig) -> Result<Option<String>, Ambiguity> {
    match target {
        Value::String(s) => Ok(validate_target(s)),
        Value::Array(items) => {
            let unconditional: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            if unconditional.len() > 1 {
                return Err(Ambiguity(format!(
                    "conflicting unconditional exports: {}",
                    unconditional.join(", ")
                )));
            }
            for item in items {
                if let Some(found) = resolve_target(item, cfg)? {
                    return Ok(Some(found));
                }
            }
            Ok(None)
        }
        Value::Object(conditions) => resolve_conditions(conditions, cfg),
        _ => Ok(None),
    }
}

fn resolve_conditions(
    conditions: &Map<String, Value>,
    cfg: &ResolutionConfig,
) -> Result<Option<String>, Ambiguity> {
    let mut catch_all = None;

    for (condition, target) in conditions {
        if condition == "default" {
            catch_all = Some(target);
            continue;
        }
        if !cfg.accepts_condition(condition) {
            trace!("Skipping inactive condition '{}'", condition);
            continue;
        }
        if let Some(found) = resolve_target(target, cfg)? {
            trace!("Condition '{}' selected {}", condition, found);
            return Ok(Some(found));
        }
    }

    match catch_all {
        Some(target) => resolve_target(target, cfg),
        None => Ok(None),
    }
}

/// Targets must stay inside the package.
fn validate_target(target: &str) -> Option<String> {
    if !target.starts_with("./") || target.split('/').any(|segment| segment == "..") {
        return None;
    }
    Some(target.to_string())
}
