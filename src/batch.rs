// batch.rs - Fans per-file jobs out over a fixed-size worker pool

use crate::options::ProcessOptions;
use crate::processor::{self, ProcessError};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Could not create output directory {}: {source}", .path.display())]
    OutputDir { path: PathBuf, source: io::Error },
    #[error("Could not start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Shared counters the GUI polls while a batch runs.
#[derive(Debug, Default)]
pub struct Progress {
    total: AtomicUsize,
    completed: AtomicUsize,
    succeeded: AtomicUsize,
}

impl Progress {
    pub fn reset(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.succeeded.store(0, Ordering::SeqCst);
    }

    fn record(&self, success: bool) {
        if success {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// (completed, total)
    pub fn snapshot(&self) -> (usize, usize) {
        (self.completed.load(Ordering::SeqCst), self.total.load(Ordering::SeqCst))
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub filename: String,
    pub original_size: u64,
    pub new_size: u64,
    pub success: bool,
    pub message: String,
    pub outputs: Vec<PathBuf>,
}

impl ProcessResult {
    fn from_outcome(path: &Path, outcome: Result<processor::ProcessOutcome, ProcessError>) -> Self {
        let filename = path.file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        match outcome {
            Ok(outcome) => Self {
                filename,
                original_size: outcome.original_size,
                new_size: outcome.written_size,
                success: true,
                message: String::new(),
                outputs: outcome.outputs,
            },
            Err(e) => Self {
                filename,
                original_size: fs::metadata(path).map(|m| m.len()).unwrap_or(0),
                new_size: 0,
                success: false,
                message: e.to_string(),
                outputs: Vec::new(),
            },
        }
    }

    pub fn compression_ratio(&self) -> f32 {
        if self.original_size > 0 {
            self.new_size as f32 / self.original_size as f32
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub results: Vec<ProcessResult>,
}

/// Output stems for every file, in input order. A stem already taken in
/// this batch (compared case-insensitively) gets a `_1`, `_2`, ... suffix so
/// no two jobs write the same output. `None` for paths without a file name.
pub fn assign_output_names(files: &[PathBuf], options: &ProcessOptions) -> Vec<Option<String>> {
    let mut taken = HashSet::new();
    files
        .iter()
        .map(|path| {
            let base = processor::output_base_name(path, options)?;
            let mut name = base.clone();
            let mut suffix = 1;
            while !taken.insert(name.to_lowercase()) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            if name != base {
                warn!(path = %path.display(), name = %name, "Output name already used in this batch, renaming");
            }
            Some(name)
        })
        .collect()
}

/// Runs `optimize_image` for every file on `workers` threads (0 means one
/// per CPU). Failures are logged and counted, never retried. Results come
/// back in input order.
pub fn run_batch(
    files: &[PathBuf],
    output_dir: &Path,
    options: &ProcessOptions,
    workers: usize,
    progress: &Progress,
) -> Result<BatchReport, BatchError> {
    fs::create_dir_all(output_dir).map_err(|source| BatchError::OutputDir {
        path: output_dir.to_path_buf(),
        source,
    })?;

    progress.reset(files.len());
    let names = assign_output_names(files, options);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("shrink-worker-{}", i))
        .build()?;

    info!(files = files.len(), threads = pool.current_num_threads(), "Started processing");

    let results: Vec<ProcessResult> = pool.install(|| {
        files
            .par_iter()
            .zip(names.par_iter())
            .map(|(path, name)| {
                let outcome = name
                    .as_deref()
                    .ok_or(ProcessError::NoFileName)
                    .and_then(|name| processor::optimize_image(path, output_dir, name, options));
                if let Err(e) = &outcome {
                    error!(path = %path.display(), error = %e, "Error processing image");
                }
                let result = ProcessResult::from_outcome(path, outcome);
                progress.record(result.success);
                result
            })
            .collect()
    });

    let processed = results.iter().filter(|r| r.success).count();
    let report = BatchReport {
        processed,
        failed: results.len() - processed,
        results,
    };

    info!(processed = report.processed, failed = report.failed, "Image processing finished");
    Ok(report)
}
