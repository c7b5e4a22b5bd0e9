//! Folder-marker conventions on top of a [`BlobStore`].
//!
//! A directory `a/b` is represented by an empty object at `a/b/.self`
//! with content type `application/directory`. Every lookup first tries
//! the exact key and then the marker, so callers see files and
//! directories through one set of calls.

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Arc;

use tracing::debug;

use crate::error::{FsResult, StoreError};
use crate::metadata::{
    ContainerMetadata, ObjectMetadata, StorageKind, DEFAULT_CONTENT_TYPE, DIRECTORY_CONTENT_TYPE,
    FOLDER_MARKER,
};
use crate::metrics::SharedMetrics;
use crate::store::{BlobCopyOptions, BlobPayload, BlobStore, BlobUpload, PutOptions};

/// Store key of the folder marker for `key`.
pub fn marker_key(key: &str) -> String {
    if key.is_empty() {
        FOLDER_MARKER.to_string()
    } else {
        format!("{}/{}", key, FOLDER_MARKER)
    }
}

/// Whether `key` names a folder marker object.
pub fn is_marker_key(key: &str) -> bool {
    key == FOLDER_MARKER || key.ends_with(&format!("/{}", FOLDER_MARKER))
}

#[derive(Debug, Clone)]
pub struct StoreAdapter {
    store: Arc<dyn BlobStore>,
    multipart_threshold: u64,
    metrics: SharedMetrics,
}

impl StoreAdapter {
    pub fn new(
        store: Arc<dyn BlobStore>,
        multipart_threshold: u64,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            store,
            multipart_threshold,
            metrics,
        }
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn multipart_threshold(&self) -> u64 {
        self.multipart_threshold
    }

    /// Runs `probe` on the exact key, then on its folder marker.
    ///
    /// The bucket root has no object of its own, so for the empty key only
    /// the marker is probed.
    fn locate<T>(
        &self,
        key: &str,
        operation: &'static str,
        probe: impl Fn(&str) -> Result<Option<T>, StoreError>,
    ) -> FsResult<Option<T>> {
        if !key.is_empty() {
            self.metrics.remote_call(operation);
            if let Some(found) = probe(key)? {
                return Ok(Some(found));
            }
        }
        self.metrics.remote_call(operation);
        Ok(probe(&marker_key(key))?)
    }

    /// Metadata for `key` or its folder marker.
    pub fn head(&self, bucket: &str, key: &str) -> FsResult<Option<ObjectMetadata>> {
        self.locate(key, "head", |k| self.store.blob_metadata(bucket, k))
    }

    pub fn exists(&self, bucket: &str, key: &str) -> FsResult<bool> {
        Ok(self.head(bucket, key)?.is_some())
    }

    /// Content and metadata for `key` or its folder marker.
    pub fn get(&self, bucket: &str, key: &str) -> FsResult<Option<BlobPayload>> {
        self.locate(key, "get", |k| self.store.get_blob(bucket, k))
    }

    /// Uploads `length` bytes from `content` to `key`.
    ///
    /// Switches to multipart when `length` is strictly above the configured
    /// threshold. Returns the etag.
    pub fn put(
        &self,
        bucket: &str,
        key: &str,
        content: &mut dyn Read,
        length: u64,
        content_type: Option<&str>,
        user_metadata: HashMap<String, String>,
    ) -> FsResult<String> {
        let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_string();
        let multipart = length > self.multipart_threshold;
        if multipart {
            self.metrics.multipart_upload();
        }
        debug!(bucket, key, length, multipart, "uploading blob");
        self.metrics.remote_call("put");
        let etag = self.store.put_blob(
            bucket,
            BlobUpload {
                key,
                content,
                length,
                kind: StorageKind::for_content_type(&content_type),
                content_type,
                user_metadata,
            },
            PutOptions { multipart },
        )?;
        Ok(etag)
    }

    /// Writes the folder marker for `key`.
    pub fn create_folder(&self, bucket: &str, key: &str) -> FsResult<String> {
        let mut empty = io::empty();
        self.put(
            bucket,
            &marker_key(key),
            &mut empty,
            0,
            Some(DIRECTORY_CONTENT_TYPE),
            HashMap::new(),
        )
    }

    /// Deletes the object at `key` if present, otherwise its folder marker.
    pub fn delete(&self, bucket: &str, key: &str) -> FsResult<()> {
        self.metrics.remote_call("head");
        let target = if !key.is_empty() && self.store.blob_exists(bucket, key)? {
            key.to_string()
        } else {
            marker_key(key)
        };
        debug!(bucket, key = %target, "removing blob");
        self.metrics.remote_call("remove");
        self.store.remove_blob(bucket, &target)?;
        Ok(())
    }

    pub fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
        options: BlobCopyOptions,
    ) -> FsResult<String> {
        self.metrics.remote_call("copy");
        let etag = self.store.copy_blob(
            source_bucket,
            source_key,
            target_bucket,
            target_key,
            options,
        )?;
        Ok(etag)
    }

    pub fn list_containers(&self) -> FsResult<Vec<ContainerMetadata>> {
        self.metrics.remote_call("list");
        let containers = self
            .store
            .list_containers()?
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(containers)
    }

    /// Keys in `bucket` under `prefix`, markers included.
    pub fn list_keys(&self, bucket: &str, prefix: &str) -> FsResult<Vec<String>> {
        self.metrics.remote_call("list");
        let keys = self
            .store
            .list_blobs(bucket, prefix)?
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(keys)
    }
}
