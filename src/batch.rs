//! Batch runner - walks trees and fans files out to worker threads
//!
//! Instrumenting a file is a pure function of its contents and the shared
//! read-only registry, so the pool is plain channel fan-out: paths go in,
//! reports come out, one engine per worker. Per-file failures are reported
//! and counted, never fatal to the batch; the failed file is left exactly
//! as it was.

use crate::config::Registry;
use crate::engine::Engine;
use crate::{Error, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Workers are capped even on very wide machines; instrumentation is
/// short-lived per file and the walk itself is single-threaded.
const MAX_WORKERS: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Rewrite files in place; false reports without touching anything
    pub write: bool,
    /// Restrict to one language id instead of per-file detection
    pub language: Option<String>,
    /// Glob patterns excluded from the walk
    pub excludes: Vec<String>,
    /// Worker threads; 0 picks one per available CPU
    pub jobs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Instrumented { points: usize, skipped: usize },
    /// Nothing to instrument; the file is valid input and untouched
    Unchanged,
    /// The runtime import is already present
    AlreadyInstrumented,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub files: usize,
    pub instrumented: usize,
    pub checkpoints: usize,
    pub dropped_points: usize,
    pub unchanged: usize,
    pub already_instrumented: usize,
    pub failures: usize,
    pub elapsed: Duration,
}

/// Walk `paths` and keep the files the registry can handle, sorted.
///
/// Respects .gitignore and skips hidden entries. With a `language`
/// restriction only that language's extensions survive; otherwise any
/// extension some config claims.
pub fn collect_files(
    paths: &[PathBuf],
    registry: &Registry,
    language: Option<&str>,
    excludes: &[String],
) -> Result<Vec<PathBuf>> {
    let Some((first, rest)) = paths.split_first() else {
        return Ok(Vec::new());
    };

    let mut patterns = Vec::with_capacity(excludes.len());
    for raw in excludes {
        let pattern = glob::Pattern::new(raw)
            .map_err(|e| Error::Config(format!("invalid exclude pattern {:?}: {}", raw, e)))?;
        patterns.push(pattern);
    }

    let mut builder = WalkBuilder::new(first);
    for path in rest {
        builder.add(path);
    }

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if patterns.iter().any(|p| p.matches_path(path)) {
            continue;
        }
        match language {
            Some(lang) => {
                if registry.language_for_path(path) != Some(lang) {
                    continue;
                }
            }
            None => {
                if registry.language_for_path(path).is_none() {
                    continue;
                }
            }
        }
        files.push(path.to_path_buf());
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Instrument `files` across a worker pool, invoking `on_report` on the
/// calling thread as each file finishes.
pub fn run<F>(
    registry: &Registry,
    files: &[PathBuf],
    options: &BatchOptions,
    mut on_report: F,
) -> BatchSummary
where
    F: FnMut(&FileReport),
{
    let start = Instant::now();
    let mut summary = BatchSummary {
        files: files.len(),
        ..Default::default()
    };
    if files.is_empty() {
        summary.elapsed = start.elapsed();
        return summary;
    }

    let jobs = worker_count(options.jobs, files.len());
    let (work_tx, work_rx) = crossbeam::channel::unbounded::<PathBuf>();
    let (report_tx, report_rx) = crossbeam::channel::unbounded::<FileReport>();
    for file in files {
        if work_tx.send(file.clone()).is_err() {
            break;
        }
    }
    drop(work_tx);

    std::thread::scope(|scope| {
        for _ in 0..jobs {
            let work_rx = work_rx.clone();
            let report_tx = report_tx.clone();
            scope.spawn(move || {
                let mut engine = Engine::new(registry);
                while let Ok(path) = work_rx.recv() {
                    let report = process_file(&mut engine, &path, options.write);
                    if report_tx.send(report).is_err() {
                        break;
                    }
                }
            });
        }
        drop(report_tx);

        for report in report_rx.iter() {
            tally(&mut summary, &report);
            on_report(&report);
        }
    });

    summary.elapsed = start.elapsed();
    summary
}

fn process_file(engine: &mut Engine<'_>, path: &Path, write: bool) -> FileReport {
    let status = match engine.instrument_file(path) {
        Ok(out) if out.points.is_empty() && !out.import_added => FileStatus::Unchanged,
        Ok(out) => {
            if write {
                match std::fs::write(path, &out.source) {
                    Ok(()) => FileStatus::Instrumented {
                        points: out.points.len(),
                        skipped: out.skipped,
                    },
                    Err(e) => {
                        tracing::error!(path = %path.display(), error = %e, "failed to write instrumented file");
                        FileStatus::Failed(e.to_string())
                    }
                }
            } else {
                FileStatus::Instrumented {
                    points: out.points.len(),
                    skipped: out.skipped,
                }
            }
        }
        Err(Error::AlreadyInstrumented) => FileStatus::AlreadyInstrumented,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "instrumentation failed; file left untouched");
            FileStatus::Failed(e.to_string())
        }
    };
    FileReport {
        path: path.to_path_buf(),
        status,
    }
}

fn tally(summary: &mut BatchSummary, report: &FileReport) {
    match &report.status {
        FileStatus::Instrumented { points, skipped } => {
            summary.instrumented += 1;
            summary.checkpoints += points;
            summary.dropped_points += skipped;
        }
        FileStatus::Unchanged => summary.unchanged += 1,
        FileStatus::AlreadyInstrumented => summary.already_instrumented += 1,
        FileStatus::Failed(_) => summary.failures += 1,
    }
}

fn worker_count(requested: usize, files: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let jobs = if requested == 0 { available } else { requested };
    jobs.min(files.max(1)).min(MAX_WORKERS).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Registry;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, rel: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_collect_keeps_supported_extensions_sorted() {
        let registry = Registry::builtin().unwrap();
        let dir = TempDir::new().unwrap();
        write_file(&dir, "zeta.py", "x = 1\n");
        write_file(&dir, "alpha.js", "var x = 1;\n");
        write_file(&dir, "notes.txt", "not code\n");
        write_file(&dir, "nested/beta.py", "y = 2\n");

        let files =
            collect_files(&[dir.path().to_path_buf()], &registry, None, &[]).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["alpha.js", "nested/beta.py", "zeta.py"]);
    }

    #[test]
    fn test_collect_language_restriction() {
        let registry = Registry::builtin().unwrap();
        let dir = TempDir::new().unwrap();
        write_file(&dir, "a.py", "x = 1\n");
        write_file(&dir, "b.js", "var x = 1;\n");

        let files = collect_files(
            &[dir.path().to_path_buf()],
            &registry,
            Some("python"),
            &[],
        )
        .unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.py"));
    }

    #[test]
    fn test_collect_applies_exclude_globs() {
        let registry = Registry::builtin().unwrap();
        let dir = TempDir::new().unwrap();
        write_file(&dir, "keep.py", "x = 1\n");
        write_file(&dir, "vendor/skip.py", "x = 1\n");

        let files = collect_files(
            &[dir.path().to_path_buf()],
            &registry,
            None,
            &["**/vendor/**".to_string()],
        )
        .unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.py"));
    }

    #[test]
    fn test_collect_rejects_bad_pattern() {
        let registry = Registry::builtin().unwrap();
        let dir = TempDir::new().unwrap();
        let result = collect_files(
            &[dir.path().to_path_buf()],
            &registry,
            None,
            &["[".to_string()],
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_collect_accepts_single_file_path() {
        let registry = Registry::builtin().unwrap();
        let dir = TempDir::new().unwrap();
        let file = write_file(&dir, "one.py", "def f():\n    return 1\n");

        let files = collect_files(&[file.clone()], &registry, None, &[]).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_run_rewrites_in_place() {
        let registry = Registry::builtin().unwrap();
        let dir = TempDir::new().unwrap();
        let file = write_file(&dir, "app.py", "def handler(event):\n    return event\n");

        let options = BatchOptions {
            write: true,
            ..Default::default()
        };
        let summary = run(&registry, &[file.clone()], &options, |_| {});

        assert_eq!(summary.instrumented, 1);
        assert_eq!(summary.checkpoints, 2);
        assert_eq!(summary.failures, 0);
        let rewritten = fs::read_to_string(&file).unwrap();
        assert!(rewritten.starts_with("import wattmark_runtime as _wattmark_rt\n"));
        assert!(rewritten.contains("function_enter_handler_1"));
    }

    #[test]
    fn test_run_dry_run_leaves_files_alone() {
        let registry = Registry::builtin().unwrap();
        let dir = TempDir::new().unwrap();
        let source = "def handler(event):\n    return event\n";
        let file = write_file(&dir, "app.py", source);

        let options = BatchOptions::default();
        let mut reports = Vec::new();
        let summary = run(&registry, &[file.clone()], &options, |r| {
            reports.push(r.clone())
        });

        assert_eq!(summary.instrumented, 1);
        assert_eq!(fs::read_to_string(&file).unwrap(), source);
        assert!(matches!(
            reports[0].status,
            FileStatus::Instrumented { points: 2, .. }
        ));
    }

    #[test]
    fn test_run_counts_already_instrumented() {
        let registry = Registry::builtin().unwrap();
        let dir = TempDir::new().unwrap();
        let file = write_file(&dir, "app.py", "def f():\n    return 1\n");

        let options = BatchOptions {
            write: true,
            ..Default::default()
        };
        let first = run(&registry, &[file.clone()], &options, |_| {});
        assert_eq!(first.instrumented, 1);

        let second = run(&registry, &[file.clone()], &options, |_| {});
        assert_eq!(second.instrumented, 0);
        assert_eq!(second.already_instrumented, 1);
    }

    #[test]
    fn test_run_counts_unchanged_files() {
        let registry = Registry::builtin().unwrap();
        let dir = TempDir::new().unwrap();
        let file = write_file(&dir, "flat.py", "x = 1\ny = 2\n");

        let options = BatchOptions {
            write: true,
            ..Default::default()
        };
        let summary = run(&registry, &[file.clone()], &options, |_| {});
        assert_eq!(summary.unchanged, 1);
        assert_eq!(fs::read_to_string(&file).unwrap(), "x = 1\ny = 2\n");
    }

    #[test]
    fn test_run_parallel_workers_cover_all_files() {
        let registry = Registry::builtin().unwrap();
        let dir = TempDir::new().unwrap();
        let mut files = Vec::new();
        for i in 0..12 {
            files.push(write_file(
                &dir,
                &format!("mod_{i}.py"),
                &format!("def job_{i}():\n    return {i}\n"),
            ));
        }

        let options = BatchOptions {
            write: true,
            jobs: 4,
            ..Default::default()
        };
        let summary = run(&registry, &files, &options, |_| {});
        assert_eq!(summary.files, 12);
        assert_eq!(summary.instrumented, 12);
        assert_eq!(summary.checkpoints, 24);
    }

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(worker_count(4, 2), 2);
        assert_eq!(worker_count(4, 100), 4);
        assert_eq!(worker_count(999, 999), MAX_WORKERS);
        assert!(worker_count(0, 8) >= 1);
    }
}
