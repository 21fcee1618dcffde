//! Blob storage boundary.
//!
//! Export files are addressed as `{source}/{filename}`. [`LocalBlobStore`]
//! serves a directory tree with one sub-directory per source and stands in
//! for an object store.

use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

/// Address of one export file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobRef {
    pub source: String,
    pub name: String,
}

impl BlobRef {
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
        }
    }

    /// Storage key, also recorded as the lineage blob path
    pub fn key(&self) -> String {
        format!("{}/{}", self.source, self.name)
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.name)
    }
}

/// Listing and download capability of an object store
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Blobs under one source, sorted by name
    async fn list(&self, source: &str) -> IngestResult<Vec<BlobRef>>;

    /// Full content of one blob
    async fn download(&self, blob: &BlobRef) -> IngestResult<Vec<u8>>;
}

/// Blob store backed by a local directory
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, blob: &BlobRef) -> PathBuf {
        self.root.join(&blob.source).join(&blob.name)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn list(&self, source: &str) -> IngestResult<Vec<BlobRef>> {
        let dir = self.root.join(source);
        if !dir.exists() {
            log::warn!("No blob directory for source {source} at {}", dir.display());
            return Ok(Vec::new());
        }

        let blob_err = |source: std::io::Error| IngestError::Blob {
            path: dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(blob_err)?;
        let mut blobs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(blob_err)? {
            if !entry.file_type().await.map_err(blob_err)?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                blobs.push(BlobRef::new(source, name));
            }
        }
        blobs.sort();
        Ok(blobs)
    }

    async fn download(&self, blob: &BlobRef) -> IngestResult<Vec<u8>> {
        let path = self.path_of(blob);
        tokio::fs::read(&path)
            .await
            .map_err(|source| IngestError::Blob { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let keap = dir.path().join("keap");
        std::fs::create_dir_all(keap.join("nested")).unwrap();
        std::fs::write(keap.join("b_contacts.csv"), "id\n1\n").unwrap();
        std::fs::write(keap.join("a_orders.csv"), "id\n2\n").unwrap();

        let store = LocalBlobStore::new(dir.path());
        let blobs = store.list("keap").await.unwrap();
        assert_eq!(
            blobs,
            vec![
                BlobRef::new("keap", "a_orders.csv"),
                BlobRef::new("keap", "b_contacts.csv")
            ]
        );
        assert_eq!(blobs[0].key(), "keap/a_orders.csv");

        let content = store.download(&blobs[1]).await.unwrap();
        assert_eq!(content, b"id\n1\n");
    }

    #[tokio::test]
    async fn test_missing_source_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        assert!(store.list("stripe").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let err = store
            .download(&BlobRef::new("keap", "nope.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Blob { .. }));
    }
}
