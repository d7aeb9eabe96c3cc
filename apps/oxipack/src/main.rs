use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, info};
use oxipack_bundle::Config;
use std::io::{BufWriter, Write};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "oxipack")]
#[command(about = "Bundle TypeScript, JavaScript and single-file components for the browser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Bundle an entry module and everything it imports into one script
    Build(Config),
}

fn main() -> Result<()> {
    env_logger::init();

    // stdio is blocked by LineWriter, use a BufWriter to reduce syscalls.
    // See https://github.com/rust-lang/rust/issues/60673
    let mut stdout = BufWriter::new(std::io::stdout());

    let cli = Cli::parse();
    debug!("Parsed CLI arguments: {:?}", cli.command);

    let start = Instant::now();

    match cli.command {
        Commands::Build(cfg) => {
            let num_threads = rayon::current_num_threads();
            info!("Running build (using {} threads)", num_threads);
            debug!("Config: entry={:?}, out={:?}, config={:?}", cfg.entry, cfg.out, cfg.config);

            let report = match oxipack_bundle::run_build(&cfg) {
                Ok(report) => report,
                Err(err) => {
                    let mut stderr = std::io::stderr();
                    oxipack_bundle::print_build_error(&mut stderr, &err)?;
                    // Non-zero exit to fail CI
                    std::process::exit(1);
                }
            };
            debug!("Build wrote {} files", report.files.len());

            let elapsed_ms = start.elapsed().as_millis();

            oxipack_bundle::print_cycle_warnings(&mut stdout, &report.warnings)?;
            oxipack_bundle::print_build_summary(&mut stdout, &report)?;
            writeln!(
                stdout,
                "\n{} Finished in {}ms on {} modules (using {} threads).",
                "●".bright_blue(),
                elapsed_ms.to_string().cyan(),
                report.modules.to_string().cyan(),
                num_threads.to_string().cyan()
            )?;
            stdout.flush()?;

            Ok(())
        }
    }
}
