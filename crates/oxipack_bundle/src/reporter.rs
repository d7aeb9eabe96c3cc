use std::{
    env,
    io::{self, Write},
    path::{Component, Path, PathBuf},
};

use colored::Colorize;
use log::{debug, trace};

use crate::{builder::BuildReport, error::BuildError, graph::CyclicGraphWarning};

/// Show a path relative to the current working directory so terminals can link it
fn display_path(path: &Path) -> String {
    let Ok(cwd) = env::current_dir() else {
        debug!("Failed to get current directory");
        return path.display().to_string();
    };
    match make_relative(path, &cwd) {
        Some(rel) => {
            trace!("Relativized {:?} to {:?}", path, rel);
            rel.to_string_lossy().to_string()
        }
        None => path.display().to_string(),
    }
}

/// Create a relative path from `base` to `target`
fn make_relative(target: &Path, base: &Path) -> Option<PathBuf> {
    if !target.is_absolute() {
        return Some(target.to_path_buf());
    }
    if target.components().next() != base.components().next() {
        return None;
    }

    let target_parts: Vec<Component> = target.components().collect();
    let base_parts: Vec<Component> = base.components().collect();
    let common = target_parts.iter().zip(&base_parts).take_while(|(t, b)| t == b).count();

    let mut result = PathBuf::new();
    for _ in &base_parts[common..] {
        result.push("..");
    }
    for component in &target_parts[common..] {
        if let Component::Normal(p) = component {
            result.push(p);
        }
    }

    if result.as_os_str().is_empty() { Some(PathBuf::from(".")) } else { Some(result) }
}

pub fn print_build_summary<W: Write>(writer: &mut W, report: &BuildReport) -> io::Result<()> {
    debug!("Printing summary for {} files", report.files.len());
    writeln!(
        writer,
        "{} Bundled {} modules into {} ({} bytes)",
        "✓".green().bold(),
        report.modules.to_string().cyan(),
        display_path(&report.out).blue(),
        report.bytes.to_string().cyan()
    )?;
    for extra in report.files.iter().skip(1) {
        writeln!(writer, "{}  {}", "└──".dimmed(), display_path(extra))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn print_cycle_warnings<W: Write>(
    writer: &mut W,
    warnings: &[CyclicGraphWarning],
) -> io::Result<()> {
    if warnings.is_empty() {
        return Ok(());
    }
    debug!("Printing {} cycle warnings", warnings.len());
    writeln!(
        writer,
        "{} {} circular import(s), modules in a cycle may see partial exports\n",
        "⚠".yellow().bold(),
        warnings.len().to_string().yellow()
    )?;
    let arrow = format!(" {} ", "→".dimmed());
    for warning in warnings {
        let chain: Vec<String> = warning.cycle.iter().map(|p| display_path(p)).collect();
        writeln!(writer, "{}  {}", "↻".yellow(), chain.join(arrow.as_str()))?;
    }
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

pub fn print_build_error<W: Write>(writer: &mut W, err: &BuildError) -> io::Result<()> {
    writeln!(writer, "{} {} {}", "✗".red().bold(), err.kind().red().bold(), err)?;
    if let Some(path) = err.path() {
        writeln!(writer, "{}  {}", "└──".dimmed(), display_path(path).blue())?;
    }
    writer.flush()?;
    Ok(())
}
