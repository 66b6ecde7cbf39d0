//! Persisted webhook registry
//!
//! Each registered URL is stored as one file under the registry directory,
//! named by the hex SHA-256 digest of the URL and holding the raw URL bytes.
//! The in-memory snapshot is rebuilt from disk after every mutation and
//! replaced wholesale, so readers always see a complete list.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{Error, Result};

/// A registered callback URL and its on-disk key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEndpoint {
    /// Callback URL
    pub url: String,
    /// Hex digest of `url`, used as the file name
    pub id_hash: String,
}

impl WebhookEndpoint {
    /// Build the endpoint record for a URL
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let id_hash = hex::encode(Sha256::digest(url.as_bytes()));
        Self { url, id_hash }
    }
}

/// Directory-backed set of webhook URLs
pub struct WebhookRegistry {
    dir: PathBuf,
    snapshot: RwLock<Arc<[String]>>,
}

impl WebhookRegistry {
    /// Create a registry over `dir`. The snapshot starts empty until [`reload`](Self::reload).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            snapshot: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Backing directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Register a URL. Registering the same URL twice leaves one entry.
    pub fn register(&self, url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(Error::validation("URL can't be empty"));
        }

        let endpoint = WebhookEndpoint::new(url);
        let written = self.write_endpoint(&endpoint);
        self.refresh();
        written?;

        info!(url = %endpoint.url, id = %endpoint.id_hash, "Registered webhook");
        Ok(())
    }

    /// Remove a URL. Removing an unknown URL is not an error.
    pub fn unregister(&self, url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(Error::validation("URL can't be empty"));
        }

        let endpoint = WebhookEndpoint::new(url);
        let path = self.dir.join(&endpoint.id_hash);
        let removed = match fs::remove_file(&path) {
            Ok(()) => {
                info!(url = %endpoint.url, id = %endpoint.id_hash, "Removed webhook");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(url = %endpoint.url, "Webhook not registered, nothing to remove");
                Ok(())
            }
            Err(e) => Err(Error::storage(&path, &e)),
        };
        self.refresh();
        removed
    }

    /// Current snapshot of registered URLs
    #[must_use]
    pub fn list(&self) -> Arc<[String]> {
        Arc::clone(&self.snapshot.read())
    }

    /// Rebuild the snapshot from disk.
    ///
    /// A read failure stops the walk; whatever was read before it becomes the
    /// new snapshot and the error is returned.
    pub fn reload(&self) -> Result<usize> {
        let (urls, outcome) = self.scan();
        let count = urls.len();
        *self.snapshot.write() = Arc::from(urls);
        outcome.map(|()| count)
    }

    fn refresh(&self) {
        if let Err(e) = self.reload() {
            warn!(dir = %self.dir.display(), error = %e, "Webhook registry reload incomplete");
        }
    }

    fn write_endpoint(&self, endpoint: &WebhookEndpoint) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::storage(&self.dir, &e))?;
        let path = self.dir.join(&endpoint.id_hash);
        fs::write(&path, endpoint.url.as_bytes()).map_err(|e| Error::storage(&path, &e))
    }

    fn scan(&self) -> (Vec<String>, Result<()>) {
        let mut urls = Vec::new();

        if !self.dir.exists() {
            return (urls, Ok(()));
        }

        for entry in WalkDir::new(&self.dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let err = Error::Storage(format!("{}: {e}", self.dir.display()));
                    return (urls, Err(err));
                }
            };
            // Anything that is not a directory is an entry, symlinks included
            if entry.file_type().is_dir() {
                continue;
            }
            match fs::read(entry.path()) {
                Ok(raw) => urls.push(String::from_utf8_lossy(&raw).into_owned()),
                Err(e) => return (urls, Err(Error::storage(entry.path(), &e))),
            }
        }

        (urls, Ok(()))
    }
}
