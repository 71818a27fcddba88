//! Source control - validated clones into scoped temporary directories

use crate::process::{CommandError, CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};

/// Error types for source control operations
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Invalid repository URL '{url}': expected prefix {prefix}")]
    InvalidUrl { url: String, prefix: String },

    #[error("Failed to create checkout directory: {0}")]
    TempDir(String),

    #[error("Clone failed: {0}")]
    Clone(#[from] CommandError),
}

/// Repository name from its URL, e.g. `https://github.com/acme/widgets.git` -> `widgets`
pub fn repo_name(repo_url: &str) -> String {
    let trimmed = repo_url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    last.trim_end_matches(".git").to_string()
}

/// A repository checked out into a temporary directory.
///
/// The directory is removed when the checkout is dropped or released.
#[derive(Debug)]
pub struct Checkout {
    url: String,
    dir: TempDir,
}

impl Checkout {
    /// Create an empty checkout directory for `url`
    pub fn create(url: &str) -> Result<Self, SourceError> {
        let dir = tempfile::Builder::new()
            .prefix("agentops-")
            .tempdir()
            .map_err(|e| SourceError::TempDir(e.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the checkout now; cleanup failures are ignored
    pub fn release(self) {
        let path = self.dir.path().display().to_string();
        if let Err(e) = self.dir.close() {
            debug!("Ignoring cleanup failure for {} at {}: {}", self.url, path, e);
        }
    }
}

/// Trait for source control access
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Check the URL against the required host prefix
    fn validate_url(&self, url: &str) -> Result<(), SourceError>;

    /// Clone the repository into a fresh temporary directory
    async fn checkout(&self, url: &str) -> Result<Checkout, SourceError>;
}

/// Git over the `git` CLI
pub struct GitSource {
    host_prefix: String,
    runner: Arc<dyn CommandRunner>,
}

impl GitSource {
    pub fn new(host_prefix: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            host_prefix: host_prefix.into(),
            runner,
        }
    }
}

#[async_trait]
impl SourceControl for GitSource {
    fn validate_url(&self, url: &str) -> Result<(), SourceError> {
        if url.starts_with(&self.host_prefix) && url.len() > self.host_prefix.len() {
            Ok(())
        } else {
            Err(SourceError::InvalidUrl {
                url: url.to_string(),
                prefix: self.host_prefix.clone(),
            })
        }
    }

    async fn checkout(&self, url: &str) -> Result<Checkout, SourceError> {
        self.validate_url(url)?;
        let checkout = Checkout::create(url)?;

        info!("Cloning {} into {}", url, checkout.path().display());
        let spec = CommandSpec::new("git")
            .args(["clone", "--depth", "1", url])
            .arg(checkout.path().display().to_string());
        self.runner.run_checked(&spec).await?;

        Ok(checkout)
    }
}
