/// skinarb-live — Host Bridge
///
/// Host-facing seams: where finished result sets get written, and what a
/// host can ask the engine to do.

use anyhow::{bail, Context, Result};
use arb_detector::FilterParams;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Key the latest full result set is stored under.
pub const LATEST_BLOB_KEY: &str = "latest-data.json";

#[async_trait]
pub trait BlobSink: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Operations a host exposes. Neither method fails: errors are logged and
/// turned into a best-effort byte payload.
#[async_trait]
pub trait Trigger: Send + Sync {
    /// Runs one analysis and returns the published result set as JSON.
    async fn run_analysis(&self) -> Vec<u8>;

    /// Filters a JSON result set. Empty bytes if `input` cannot be decoded.
    async fn filter(&self, input: &[u8], params: &FilterParams) -> Vec<u8>;
}

/// Blobs as plain files in one directory. Writes go to a temp file first and
/// are renamed into place, so readers never see a half-written blob.
pub struct FileBlobSink {
    dir: PathBuf,
}

impl FileBlobSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[async_trait]
impl BlobSink for FileBlobSink {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            bail!("invalid blob key '{key}'");
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("cannot create {}", self.dir.display()))?;

        let target = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("cannot write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .with_context(|| format!("cannot move blob into {}", target.display()))?;

        debug!("blob '{key}' written: {} bytes", bytes.len());
        Ok(())
    }
}
