/// Small grab bag shared by the rest of the crate: the crate version
/// (stamped into the cache schema row for invalidation) and logging
/// initialization.
use std::collections::HashSet;
use std::fs;
use std::io;
use std::sync::Mutex;

use directories::ProjectDirs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, EnvFilter};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static LOGGING_INITIALIZED: Mutex<Option<HashSet<String>>> = Mutex::new(None);

/// Initialize tracing output. `output` is either "stderr" or "file"; the
/// file variant writes to the platform state directory. Safe to call more
/// than once; repeat calls are no-ops.
pub fn initialize_logging(output: &str) -> io::Result<()> {
    {
        let mut initialized = LOGGING_INITIALIZED.lock().unwrap();
        let set = initialized.get_or_insert_with(HashSet::new);
        if !set.is_empty() || !set.insert(output.to_string()) {
            return Ok(());
        }
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if output == "file" {
        let proj_dirs =
            ProjectDirs::from("", "", "wired").ok_or_else(|| io::Error::other("failed to resolve project directories"))?;
        let log_dir = proj_dirs.state_dir().unwrap_or(proj_dirs.cache_dir());
        fs::create_dir_all(log_dir)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .max_log_files(10)
            .filename_prefix("wired")
            .filename_suffix("log")
            .build(log_dir)
            .map_err(io::Error::other)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The guard must outlive the process for buffered logs to flush.
        std::mem::forget(guard);

        let subscriber = fmt::Subscriber::builder().with_env_filter(env_filter).with_writer(non_blocking).with_target(true).finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        let subscriber = fmt::Subscriber::builder().with_env_filter(env_filter).with_target(true).finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    Ok(())
}
