//! Base64 attachments materialized as temporary files
//!
//! A [`TempAttachment`] deletes its file when dropped, so every attachment a
//! send created is gone once the send returns, whichever way it returns.

use std::io;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Error, Result};

/// Temporary file owned by a single send operation
#[derive(Debug)]
pub struct TempAttachment {
    path: PathBuf,
}

impl TempAttachment {
    /// Location on disk
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempAttachment {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed attachment"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove attachment"),
        }
    }
}

/// Decode `encoded` and write it to `<dir>/<uuid>.<ext>`, flushed to disk.
///
/// The extension comes from the content's magic bytes; content with no
/// recognizable signature is rejected.
pub async fn materialize(dir: &Path, encoded: &str) -> Result<TempAttachment> {
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| Error::decode(format!("Invalid base64 attachment: {e}")))?;

    let kind = infer::get(&decoded)
        .ok_or_else(|| Error::decode("Unable to detect attachment content type"))?;

    let path = dir.join(format!("{}.{}", Uuid::new_v4(), kind.extension()));
    let (attachment, mut file) = create_owned(path).await?;

    write_synced(&mut file, &decoded)
        .await
        .map_err(|e| Error::storage(attachment.path(), &e))?;

    debug!(
        path = %attachment.path().display(),
        mime = kind.mime_type(),
        bytes = decoded.len(),
        "Materialized attachment"
    );
    Ok(attachment)
}

/// Create `path` exclusively; the guard exists only once the file is ours
async fn create_owned(path: PathBuf) -> Result<(TempAttachment, File)> {
    let file = File::create_new(&path)
        .await
        .map_err(|e| Error::storage(&path, &e))?;
    Ok((TempAttachment { path }, file))
}

async fn write_synced(file: &mut File, data: &[u8]) -> io::Result<()> {
    file.write_all(data).await?;
    file.sync_all().await
}
