//! Tracing setup: console layer (pretty or JSON) plus an optional JSON-lines
//! file with rotation. Logging problems are reported on stderr and otherwise
//! ignored.

use std::path::Path;
use std::time::{Duration, SystemTime};

use scalelink_config::Logging;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::FILE_GUARD;

/// Log files older than this are removed when acquisition starts.
pub const LOG_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// `RUST_LOG` wins over `level`.
pub fn init_tracing(json: bool, level: &str, logging: &Logging) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let file = logging.file.as_deref().and_then(|path| {
        let path = Path::new(path);
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let name = path.file_name()?;
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("log directory {}: {e}", dir.display());
            return None;
        }
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        Some(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        )
    });

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .try_init();
}

/// Delete rotated logs next to `log_file` whose name starts with its file
/// name and that were last modified before `max_age`. Returns how many
/// files were removed.
pub fn prune_old_logs(log_file: &Path, max_age: Duration) -> usize {
    let Some(prefix) = log_file.file_name().and_then(|n| n.to_str()) else {
        return 0;
    };
    let dir = log_file
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let now = SystemTime::now();

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_str().is_some_and(|n| n.starts_with(prefix)) {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| now.duration_since(t).ok());
        if age.is_some_and(|a| a > max_age) {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "could not remove old log"),
            }
        }
    }
    if removed > 0 {
        tracing::info!(removed, "old log files removed");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn age(path: &Path, days: u64) {
        let f = File::options().write(true).open(path).unwrap();
        f.set_modified(SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60))
            .unwrap();
    }

    #[test]
    fn prunes_only_old_matching_logs() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("scalelink.log");
        for name in [
            "scalelink.log",
            "scalelink.log.2026-01-01",
            "scalelink.log.2026-10-18",
            "other.log",
        ] {
            std::fs::write(dir.path().join(name), "{}\n").unwrap();
        }
        age(&dir.path().join("scalelink.log.2026-01-01"), 30);
        age(&dir.path().join("other.log"), 30);
        age(&dir.path().join("scalelink.log.2026-10-18"), 1);

        assert_eq!(prune_old_logs(&log, LOG_RETENTION), 1);
        assert!(!dir.path().join("scalelink.log.2026-01-01").exists());
        assert!(dir.path().join("scalelink.log.2026-10-18").exists());
        assert!(dir.path().join("other.log").exists());
        assert!(log.exists());
    }

    #[test]
    fn missing_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("nope").join("scalelink.log");
        assert_eq!(prune_old_logs(&log, LOG_RETENTION), 0);
    }
}
