use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{
    invalid_request, no_such_bucket, no_such_key, BlobCopyOptions, BlobPayload, BlobStore,
    BlobUpload, ContainerIter, EtagHasher, KeyIter, PutOptions, StoreConnector,
};
use crate::config::FileSystemConfig;
use crate::error::StoreError;
use crate::metadata::{ContainerMetadata, ObjectMetadata, StorageKind, DEFAULT_CONTENT_TYPE};
use crate::uri::ConnectionTarget;

const BLOB_SUFFIX: &str = ".blob";
const META_SUFFIX: &str = ".meta.json";
const COPY_BUFFER: usize = 64 * 1024;

/// Object store backed by a local directory.
///
/// Every bucket is a subdirectory of the root. An object is a pair of
/// files named after the URL-encoded key: `<key>.blob` holds the content
/// and `<key>.meta.json` holds the [`ObjectMetadata`]. An object exists
/// when its metadata file does.
#[derive(Debug, Clone)]
pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create_container(&self, bucket: &str) -> Result<(), StoreError> {
        fs::create_dir_all(self.root.join(bucket))?;
        Ok(())
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        let dir = self.root.join(bucket);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(no_such_bucket(bucket))
        }
    }

    fn object_paths(&self, bucket: &str, key: &str) -> Result<(PathBuf, PathBuf), StoreError> {
        let dir = self.bucket_dir(bucket)?;
        let encoded = urlencoding::encode(key);
        Ok((
            dir.join(format!("{}{}", encoded, BLOB_SUFFIX)),
            dir.join(format!("{}{}", encoded, META_SUFFIX)),
        ))
    }

    fn read_meta(meta_path: &Path) -> Result<Option<ObjectMetadata>, StoreError> {
        let data = match fs::read(meta_path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    fn write_meta(meta_path: &Path, metadata: &ObjectMetadata) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(metadata)
            .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        fs::write(meta_path, data)?;
        Ok(())
    }

    /// Streams `content` into a temporary file next to `blob_path` and
    /// renames it into place once exactly `length` bytes arrived.
    /// Returns the etag.
    fn write_blob(
        dir: &Path,
        blob_path: &Path,
        content: &mut dyn Read,
        length: u64,
        multipart: bool,
    ) -> Result<String, StoreError> {
        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        let mut hasher = EtagHasher::default();
        let mut buf = vec![0u8; COPY_BUFFER];
        let mut written = 0u64;
        loop {
            let n = content.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            staged.write_all(&buf[..n])?;
            written += n as u64;
        }
        if written != length {
            return Err(invalid_request(format!(
                "declared length {} but received {} bytes",
                length, written
            )));
        }
        staged.flush()?;
        staged.persist(blob_path).map_err(|e| e.error)?;
        Ok(hasher.finish(multipart))
    }
}

fn system_time(time: io::Result<std::time::SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

impl BlobStore for DirBlobStore {
    fn list_containers(&self) -> Result<ContainerIter<'_>, StoreError> {
        let entries = fs::read_dir(&self.root)?;
        Ok(Box::new(entries.filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(StoreError::from(e))),
            };
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => return Some(Err(StoreError::from(e))),
            };
            if !meta.is_dir() {
                return None;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let created = system_time(meta.created()).or_else(|| system_time(meta.modified()));
            Some(Ok(ContainerMetadata::new(name, created)))
        })))
    }

    fn blob_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StoreError> {
        let (_, meta_path) = self.object_paths(bucket, key)?;
        Self::read_meta(&meta_path)
    }

    fn get_blob(&self, bucket: &str, key: &str) -> Result<Option<BlobPayload>, StoreError> {
        let (blob_path, meta_path) = self.object_paths(bucket, key)?;
        let Some(metadata) = Self::read_meta(&meta_path)? else {
            return Ok(None);
        };
        let file = File::open(&blob_path)?;
        Ok(Some(BlobPayload {
            metadata,
            content: Box::new(BufReader::new(file)),
        }))
    }

    fn put_blob(
        &self,
        bucket: &str,
        upload: BlobUpload<'_>,
        options: PutOptions,
    ) -> Result<String, StoreError> {
        if upload.key.is_empty() {
            return Err(invalid_request("object key must not be empty"));
        }
        let dir = self.bucket_dir(bucket)?;
        let (blob_path, meta_path) = self.object_paths(bucket, upload.key)?;
        let previous = Self::read_meta(&meta_path)?;

        let etag = Self::write_blob(
            &dir,
            &blob_path,
            upload.content,
            upload.length,
            options.multipart,
        )?;

        let now = Utc::now();
        let metadata = ObjectMetadata {
            id: previous
                .as_ref()
                .and_then(|p| p.id.clone())
                .or_else(|| Some(uuid::Uuid::new_v4().to_string())),
            name: upload.key.to_string(),
            size: upload.length,
            content_type: Some(upload.content_type),
            etag: Some(etag.clone()),
            last_modified: Some(now),
            created: previous.as_ref().and_then(|p| p.created).or(Some(now)),
            user_metadata: upload.user_metadata,
            kind: upload.kind,
        };
        Self::write_meta(&meta_path, &metadata)?;
        debug!(bucket, key = upload.key, etag = %etag, "stored blob on disk");
        Ok(etag)
    }

    fn remove_blob(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let (blob_path, meta_path) = self.object_paths(bucket, key)?;
        for path in [meta_path, blob_path] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn copy_blob(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
        options: BlobCopyOptions,
    ) -> Result<String, StoreError> {
        let payload = self
            .get_blob(source_bucket, source_key)?
            .ok_or_else(|| no_such_key(source_bucket, source_key))?;
        let mut content = payload.content;
        let content_type = options
            .content_type
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        self.put_blob(
            target_bucket,
            BlobUpload {
                key: target_key,
                content: &mut content,
                length: payload.metadata.size,
                kind: StorageKind::for_content_type(&content_type),
                content_type,
                user_metadata: options.user_metadata.unwrap_or_default(),
            },
            PutOptions::default(),
        )
    }

    fn list_blobs<'a>(&'a self, bucket: &str, prefix: &str) -> Result<KeyIter<'a>, StoreError> {
        let dir = self.bucket_dir(bucket)?;
        let mut keys = Vec::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            let Some(encoded) = name.strip_suffix(META_SUFFIX) else {
                continue;
            };
            let key = urlencoding::decode(encoded)
                .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?
                .into_owned();
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(Box::new(keys.into_iter().map(Ok::<_, StoreError>)))
    }
}

/// Serves every connection from one local directory, whatever the
/// endpoint. The bucket directory is created on connect unless the
/// filesystem is read-only.
#[derive(Debug, Clone)]
pub struct DirConnector {
    root: PathBuf,
}

impl DirConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl StoreConnector for DirConnector {
    fn connect(
        &self,
        target: &ConnectionTarget,
        config: &FileSystemConfig,
    ) -> Result<Arc<dyn BlobStore>, StoreError> {
        if !self.root.is_dir() {
            return Err(StoreError::Connection(format!(
                "store root {} is not a directory",
                self.root.display()
            )));
        }
        let store = DirBlobStore::new(&self.root);
        if !config.read_only && !self.root.join(target.bucket()).exists() {
            info!(
                bucket = target.bucket(),
                root = %self.root.display(),
                "creating bucket directory"
            );
            store.create_container(target.bucket())?;
        }
        Ok(Arc::new(store))
    }
}
