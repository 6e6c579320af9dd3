//! Persist collected metrics to the report directory

use std::fs;
use std::path::{Path, PathBuf};

use super::PowerError;
use super::collect::PowerMetrics;

/// Write `metrics` as pretty JSON to `<dir>/<name>.json`, creating `dir` if needed
pub fn write_metrics_report(
    dir: &Path,
    name: &str,
    metrics: &PowerMetrics,
) -> Result<PathBuf, PowerError> {
    fs::create_dir_all(dir).map_err(|source| PowerError::Report {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(format!("{}.json", name));
    let body = serde_json::to_string_pretty(metrics)?;

    fs::write(&path, body).map_err(|source| PowerError::Report {
        path: path.clone(),
        source,
    })?;

    tracing::info!(path = %path.display(), metrics = metrics.len(), "wrote power metrics report");
    Ok(path)
}
