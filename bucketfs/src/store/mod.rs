//! The object-store client seam.
//!
//! Everything above this module talks to a bucket through [`BlobStore`].
//! Two implementations ship with the crate: [`MemoryBlobStore`] keeps
//! objects in process memory and [`DirBlobStore`] keeps them in a local
//! directory tree.

mod dir;
mod etag;
mod memory;

pub use dir::{DirBlobStore, DirConnector};
pub use etag::{EtagHasher, MULTIPART_PART_SIZE};
pub use memory::{CallCounters, MemoryBlobStore, MemoryConnector};

use std::collections::HashMap;
use std::fmt::Debug;
use std::io::Read;
use std::sync::Arc;

use crate::config::FileSystemConfig;
use crate::error::StoreError;
use crate::metadata::{ContainerMetadata, ObjectMetadata, StorageKind};
use crate::uri::ConnectionTarget;

/// Object content returned by [`BlobStore::get_blob`].
pub struct BlobPayload {
    pub metadata: ObjectMetadata,
    /// Exactly `metadata.size` bytes.
    pub content: Box<dyn Read + Send>,
}

impl Debug for BlobPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobPayload")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// One object to upload.
pub struct BlobUpload<'a> {
    pub key: &'a str,
    pub content: &'a mut dyn Read,
    /// Number of bytes `content` yields.
    pub length: u64,
    pub content_type: String,
    pub user_metadata: HashMap<String, String>,
    pub kind: StorageKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub multipart: bool,
}

/// Metadata applied to the target of a server-side copy.
///
/// `None` fields fall back to the store defaults for a new object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobCopyOptions {
    pub content_type: Option<String>,
    pub user_metadata: Option<HashMap<String, String>>,
}

pub type ContainerIter<'a> =
    Box<dyn Iterator<Item = Result<ContainerMetadata, StoreError>> + Send + 'a>;
pub type KeyIter<'a> = Box<dyn Iterator<Item = Result<String, StoreError>> + Send + 'a>;

/// BlobStore is the interface to an S3-compatible object store.
///
/// All calls are blocking. Implementations must be safe to share between
/// threads; the filesystem holds one instance behind an `Arc` for its
/// whole lifetime.
pub trait BlobStore: Send + Sync + Debug + 'static {
    /// Lists the containers (buckets) visible to the connection.
    fn list_containers(&self) -> Result<ContainerIter<'_>, StoreError>;

    /// Returns the metadata of the object at `key`, or `None` if absent.
    fn blob_metadata(&self, bucket: &str, key: &str)
        -> Result<Option<ObjectMetadata>, StoreError>;

    /// Checks if an object exists at exactly `key`.
    fn blob_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self.blob_metadata(bucket, key)?.is_some())
    }

    /// Fetches the object at `key` with its metadata, or `None` if absent.
    fn get_blob(&self, bucket: &str, key: &str) -> Result<Option<BlobPayload>, StoreError>;

    /// Stores an object, replacing any previous one at the same key.
    ///
    /// Returns the etag of the stored object.
    fn put_blob(
        &self,
        bucket: &str,
        upload: BlobUpload<'_>,
        options: PutOptions,
    ) -> Result<String, StoreError>;

    /// Removes the object at `key`. Removing an absent key is not an error.
    fn remove_blob(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Copies an object server side. Returns the etag of the copy.
    fn copy_blob(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
        options: BlobCopyOptions,
    ) -> Result<String, StoreError>;

    /// Lists the keys in `bucket` that start with `prefix`, in key order.
    fn list_blobs<'a>(&'a self, bucket: &str, prefix: &str) -> Result<KeyIter<'a>, StoreError>;
}

/// Opens a [`BlobStore`] for a parsed connection URI.
pub trait StoreConnector: Send + Sync + Debug {
    fn connect(
        &self,
        target: &ConnectionTarget,
        config: &FileSystemConfig,
    ) -> Result<Arc<dyn BlobStore>, StoreError>;
}

/// Error a real endpoint would answer for a missing bucket.
pub(crate) fn no_such_bucket(bucket: &str) -> StoreError {
    StoreError::Remote {
        status: 404,
        message: format!("NoSuchBucket: {}", bucket),
    }
}

pub(crate) fn no_such_key(bucket: &str, key: &str) -> StoreError {
    StoreError::Remote {
        status: 404,
        message: format!("NoSuchKey: {}/{}", bucket, key),
    }
}

pub(crate) fn invalid_request(message: impl Into<String>) -> StoreError {
    StoreError::Remote {
        status: 400,
        message: message.into(),
    }
}
