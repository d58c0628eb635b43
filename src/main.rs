//! Wattmark CLI - source-level energy instrumentation

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wattmark::batch::{self, BatchOptions, FileStatus};
use wattmark::{ui, Engine, PointType, Registry};

#[derive(Parser)]
#[command(name = "wattmark")]
#[command(version)]
#[command(about = "Source-level energy instrumentation for multi-language codebases")]
#[command(long_about = r#"
Wattmark splices measurement checkpoints into source code so an external
runtime can correlate energy and timing samples with the functions, loops
and classes that caused them:
  • Structural analysis via tree-sitter (python, javascript, rust, go)
  • Byte-exact insertion that never reformats surrounding code
  • Safe re-runs: already-instrumented files are detected and skipped

Example usage:
  wattmark analyze src/handler.py
  wattmark instrument src/handler.py > instrumented.py
  wattmark instrument src/ --write --exclude "**/vendor/**"
  wattmark languages
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory of language config overrides (<lang>.toml + <lang>.scm pairs)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert measurement checkpoints into files or directory trees
    Instrument {
        /// Files or directories to instrument
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Rewrite files in place (required for directories)
        #[arg(short, long)]
        write: bool,

        /// Force a language id instead of detecting by extension
        #[arg(short, long)]
        language: Option<String>,

        /// Glob patterns to skip
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Worker threads (0 = one per CPU)
        #[arg(short, long, default_value = "0")]
        jobs: usize,

        /// Exit non-zero when any file fails instead of falling back
        #[arg(long)]
        strict: bool,
    },

    /// Report instrumentation points without modifying anything
    Analyze {
        /// File to analyze
        path: PathBuf,

        /// Force a language id instead of detecting by extension
        #[arg(short, long)]
        language: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List configured languages, extensions and point types
    Languages,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut registry = Registry::builtin().context("loading built-in language configs")?;
    if let Some(dir) = &cli.config_dir {
        let loaded = registry
            .load_dir(dir)
            .with_context(|| format!("loading configs from {}", dir.display()))?;
        tracing::debug!(loaded, dir = %dir.display(), "merged config overrides");
    }

    match cli.command {
        Commands::Instrument {
            paths,
            write,
            language,
            exclude,
            jobs,
            strict,
        } => cmd_instrument(&registry, paths, write, language, exclude, jobs, strict),
        Commands::Analyze {
            path,
            language,
            format,
        } => cmd_analyze(&registry, &path, language.as_deref(), &format),
        Commands::Languages => cmd_languages(&registry),
    }
}

fn cmd_instrument(
    registry: &Registry,
    paths: Vec<PathBuf>,
    write: bool,
    language: Option<String>,
    excludes: Vec<String>,
    jobs: usize,
    strict: bool,
) -> anyhow::Result<()> {
    if !write {
        if paths.len() == 1 && !paths[0].is_dir() {
            return instrument_to_stdout(registry, &paths[0], language.as_deref(), strict);
        }
        anyhow::bail!(
            "instrumenting directories or multiple paths modifies files; pass --write \
             (a single file without --write prints to stdout)"
        );
    }

    let options = BatchOptions {
        write: true,
        language,
        excludes,
        jobs,
    };

    ui::banner("Wattmark instrumentation");
    ui::info(
        "Targets",
        &paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    );

    let spinner = ui::Spinner::new("Scanning sources");
    let files = batch::collect_files(&paths, registry, options.language.as_deref(), &options.excludes)?;
    if files.is_empty() {
        spinner.finish_and_clear();
        ui::warn("No instrumentable files found");
        return Ok(());
    }
    spinner.finish_with_message(&format!("{} files to instrument", files.len()));

    let progress = ui::FileProgress::new(files.len());
    let summary = batch::run(registry, &files, &options, |report| {
        let path = report.path.display().to_string();
        progress.suspended(|| match &report.status {
            FileStatus::Instrumented { points, .. } => ui::file_instrumented(&path, *points),
            FileStatus::Unchanged => ui::file_unchanged(&path),
            FileStatus::AlreadyInstrumented => ui::file_skipped(&path, "already instrumented"),
            FileStatus::Failed(reason) => ui::file_failed(&path, reason),
        });
        progress.file_done(&path);
    });

    progress.finish_with_summary(
        summary.elapsed,
        summary.instrumented,
        summary.checkpoints,
        summary.failures,
    );

    ui::section("Summary");
    let mut table = ui::TableBuilder::new();
    table.add_row("Files scanned", &summary.files.to_string());
    table.add_row("Instrumented", &summary.instrumented.to_string());
    table.add_row("Checkpoints", &summary.checkpoints.to_string());
    table.add_row("Degraded placements", &summary.dropped_points.to_string());
    table.add_row("Already instrumented", &summary.already_instrumented.to_string());
    table.add_row("Unchanged", &summary.unchanged.to_string());
    table.add_row("Failures", &summary.failures.to_string());
    println!("{}", table.build());

    if summary.failures > 0 {
        ui::warn(&format!(
            "{} file(s) failed and were left untouched",
            summary.failures
        ));
        if strict {
            anyhow::bail!("{} file(s) failed", summary.failures);
        }
    }
    Ok(())
}

/// Single-file pipe mode: instrumented source on stdout. On failure the
/// original source is emitted instead so downstream tooling always
/// receives valid code.
fn instrument_to_stdout(
    registry: &Registry,
    path: &Path,
    language: Option<&str>,
    strict: bool,
) -> anyhow::Result<()> {
    let source =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut engine = Engine::new(registry);

    let resolved = match language {
        Some(l) => Ok(l.to_string()),
        None => engine.language_for(path).map(str::to_string),
    };
    let outcome = resolved.and_then(|lang| engine.instrument_source(&source, &lang));

    match outcome {
        Ok(out) => {
            tracing::debug!(
                points = out.points.len(),
                skipped = out.skipped,
                "instrumented to stdout"
            );
            print!("{}", out.source);
            Ok(())
        }
        Err(e) => {
            ui::error(&format!("{}: {} (emitting original source)", path.display(), e));
            print!("{}", source);
            if strict {
                anyhow::bail!("instrumentation failed for {}", path.display());
            }
            Ok(())
        }
    }
}

fn cmd_analyze(
    registry: &Registry,
    path: &Path,
    language: Option<&str>,
    format: &str,
) -> anyhow::Result<()> {
    let mut engine = Engine::new(registry);
    let analysis = match language {
        Some(lang) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            engine.analyze_source(&source, lang)?
        }
        None => engine.analyze_file(path)?,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&analysis)?),
        "text" => {
            ui::banner(&format!("Analysis: {}", path.display()));
            ui::info("Language", &analysis.language);
            if analysis.is_empty() {
                ui::warn("No instrumentation points found");
            } else {
                println!("{}", ui::points_table(&analysis));
                ui::section("Counts");
                ui::summary_row("total", &analysis.points.len().to_string());
                for point_type in PointType::all() {
                    let count = analysis.count_of(*point_type);
                    if count > 0 {
                        ui::summary_row(point_type.as_str(), &count.to_string());
                    }
                }
            }
        }
        other => anyhow::bail!("unknown format {:?} (expected text or json)", other),
    }
    Ok(())
}

fn cmd_languages(registry: &Registry) -> anyhow::Result<()> {
    ui::banner("Configured languages");
    println!("{}", ui::languages_table(registry));
    Ok(())
}
