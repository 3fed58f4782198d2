use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE: &str = "image_processor.log";

/// Installs the global subscriber: stderr plus an append-only log file in
/// `log_dir`. `RUST_LOG` wins over `default_level`. If the log file can't
/// be opened, logging continues on stderr only.
pub fn init_tracing(default_level: &str, log_dir: &Path) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_path = log_dir.join(LOG_FILE);
    let (file_layer, file_error) = match open_log_file(log_dir) {
        Ok(file) => (
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        warn!(path = %log_path.display(), error = %e, "Could not open log file, logging to stderr only");
    }
}

fn open_log_file(log_dir: &Path) -> io::Result<File> {
    fs::create_dir_all(log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))
}

#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn log_file_is_created_and_appended() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        writeln!(open_log_file(&log_dir).unwrap(), "first").unwrap();
        writeln!(open_log_file(&log_dir).unwrap(), "second").unwrap();

        let content = fs::read_to_string(log_dir.join(LOG_FILE)).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn unusable_log_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();

        assert!(open_log_file(&blocker).is_err());
    }
}
