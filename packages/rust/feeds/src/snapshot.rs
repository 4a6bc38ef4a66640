//! Raw feed response snapshots, kept for audit.
//!
//! Layout: `{raw_dir}/{run_timestamp}/{feed_name}/page-{N}.{ext}`.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use grantscout_shared::{GrantScoutError, Result};

/// Writes raw response bodies under a run-scoped directory.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    run_dir: Option<PathBuf>,
}

impl SnapshotWriter {
    pub fn new(raw_dir: impl AsRef<Path>, run_timestamp: &str) -> Self {
        Self {
            run_dir: Some(raw_dir.as_ref().join(run_timestamp)),
        }
    }

    /// A writer that discards everything.
    pub fn disabled() -> Self {
        Self { run_dir: None }
    }

    pub fn run_dir(&self) -> Option<&Path> {
        self.run_dir.as_deref()
    }

    /// Persist one page of a feed's raw response.
    pub fn write(&self, feed: &str, page: u32, ext: &str, body: &str) -> Result<Option<PathBuf>> {
        let Some(run_dir) = &self.run_dir else {
            return Ok(None);
        };

        let dir = run_dir.join(sanitize(feed));
        std::fs::create_dir_all(&dir).map_err(|e| GrantScoutError::io(&dir, e))?;

        let path = dir.join(format!("page-{page}.{ext}"));
        std::fs::write(&path, body).map_err(|e| GrantScoutError::io(&path, e))?;
        debug!(?path, bytes = body.len(), "snapshot written");
        Ok(Some(path))
    }

    /// Like [`write`](Self::write), but a failure is only logged.
    pub fn record(&self, feed: &str, page: u32, ext: &str, body: &str) {
        if let Err(e) = self.write(feed, page, ext, body) {
            warn!(feed, page, error = %e, "failed to write raw snapshot");
        }
    }
}

/// Feed names become directory names; keep them to a safe alphabet.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "feed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn writes_into_run_scoped_layout() {
        let raw = std::env::temp_dir().join(format!("gs-snap-{}", Uuid::now_v7()));
        let writer = SnapshotWriter::new(&raw, "20250701_090000");

        let path = writer
            .write("grant connect", 2, "json", "{\"items\":[]}")
            .unwrap()
            .unwrap();

        assert_eq!(
            path,
            raw.join("20250701_090000").join("grant_connect").join("page-2.json")
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"items\":[]}");

        let _ = std::fs::remove_dir_all(&raw);
    }

    #[test]
    fn disabled_writer_is_noop() {
        let writer = SnapshotWriter::disabled();
        assert!(writer.write("x", 1, "xml", "<rss/>").unwrap().is_none());
    }
}
