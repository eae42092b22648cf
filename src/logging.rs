use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "t9s=info";

/// Default log location: `<data_dir>/t9s/t9s.log`
pub fn default_log_file() -> Option<PathBuf> {
  dirs::data_dir().map(|d| d.join("t9s").join("t9s.log"))
}

/// Send tracing output to a file; the terminal belongs to the UI.
///
/// The returned guard flushes the writer on drop and must outlive the app.
/// Returns `None` when there is nowhere to write logs.
pub fn init(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let path = match log_file.map(Path::to_path_buf).or_else(default_log_file) {
    Some(p) => p,
    None => return Ok(None),
  };

  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(dir, file_name);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  tracing_subscriber::fmt()
    .with_writer(writer)
    .with_env_filter(filter)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(Some(guard))
}
