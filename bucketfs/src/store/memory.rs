use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{
    invalid_request, no_such_bucket, no_such_key, BlobCopyOptions, BlobPayload, BlobStore,
    BlobUpload, ContainerIter, EtagHasher, KeyIter, PutOptions, StoreConnector,
};
use crate::config::FileSystemConfig;
use crate::error::StoreError;
use crate::metadata::{ContainerMetadata, ObjectMetadata, StorageKind, DEFAULT_CONTENT_TYPE};
use crate::uri::ConnectionTarget;

/// Remote calls seen by a [`MemoryBlobStore`].
#[derive(Debug, Default)]
pub struct CallCounters {
    heads: AtomicU64,
    gets: AtomicU64,
    puts: AtomicU64,
    multipart_puts: AtomicU64,
    removes: AtomicU64,
    copies: AtomicU64,
    lists: AtomicU64,
}

impl CallCounters {
    pub fn heads(&self) -> u64 {
        self.heads.load(Ordering::Relaxed)
    }

    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    pub fn multipart_puts(&self) -> u64 {
        self.multipart_puts.load(Ordering::Relaxed)
    }

    pub fn removes(&self) -> u64 {
        self.removes.load(Ordering::Relaxed)
    }

    pub fn copies(&self) -> u64 {
        self.copies.load(Ordering::Relaxed)
    }

    pub fn lists(&self) -> u64 {
        self.lists.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
struct StoredBlob {
    metadata: ObjectMetadata,
    content: Bytes,
}

#[derive(Debug)]
struct Container {
    created: DateTime<Utc>,
    blobs: BTreeMap<String, StoredBlob>,
}

/// In-process object store.
///
/// Behaves like a single S3 endpoint: buckets must be created before use
/// and every call is counted in [`CallCounters`].
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    containers: RwLock<BTreeMap<String, Container>>,
    calls: CallCounters,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `bucket` if it does not exist yet.
    pub fn create_container(&self, bucket: &str) -> Result<(), StoreError> {
        let mut containers = self.write()?;
        containers.entry(bucket.to_string()).or_insert_with(|| Container {
            created: Utc::now(),
            blobs: BTreeMap::new(),
        });
        Ok(())
    }

    pub fn calls(&self) -> &CallCounters {
        &self.calls
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Container>>, StoreError> {
        self.containers.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Container>>, StoreError> {
        self.containers.write().map_err(|_| poisoned())
    }

    fn lookup(&self, bucket: &str, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        let containers = self.read()?;
        let container = containers.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        Ok(container.blobs.get(key).cloned())
    }

    fn insert(&self, bucket: &str, mut blob: StoredBlob) -> Result<(), StoreError> {
        let mut containers = self.write()?;
        let container = containers
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        // Overwrites keep the identity and creation time of the object they replace.
        if let Some(previous) = container.blobs.get(&blob.metadata.name) {
            blob.metadata.id = previous.metadata.id.clone();
            blob.metadata.created = previous.metadata.created;
        }
        container.blobs.insert(blob.metadata.name.clone(), blob);
        Ok(())
    }
}

fn poisoned() -> StoreError {
    StoreError::Io(io::Error::new(
        io::ErrorKind::Other,
        "memory store lock poisoned",
    ))
}

fn new_metadata(
    key: &str,
    size: u64,
    etag: String,
    content_type: String,
    user_metadata: HashMap<String, String>,
) -> ObjectMetadata {
    let now = Utc::now();
    ObjectMetadata {
        id: Some(uuid::Uuid::new_v4().to_string()),
        name: key.to_string(),
        size,
        kind: StorageKind::for_content_type(&content_type),
        content_type: Some(content_type),
        etag: Some(etag),
        last_modified: Some(now),
        created: Some(now),
        user_metadata,
    }
}

impl BlobStore for MemoryBlobStore {
    fn list_containers(&self) -> Result<ContainerIter<'_>, StoreError> {
        CallCounters::bump(&self.calls.lists);
        let containers: Vec<_> = self
            .read()?
            .iter()
            .map(|(name, c)| {
                Ok::<_, StoreError>(ContainerMetadata::new(name.clone(), Some(c.created)))
            })
            .collect();
        Ok(Box::new(containers.into_iter()))
    }

    fn blob_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StoreError> {
        CallCounters::bump(&self.calls.heads);
        Ok(self.lookup(bucket, key)?.map(|b| b.metadata))
    }

    fn get_blob(&self, bucket: &str, key: &str) -> Result<Option<BlobPayload>, StoreError> {
        CallCounters::bump(&self.calls.gets);
        Ok(self.lookup(bucket, key)?.map(|blob| BlobPayload {
            metadata: blob.metadata,
            content: Box::new(Cursor::new(blob.content)),
        }))
    }

    fn put_blob(
        &self,
        bucket: &str,
        upload: BlobUpload<'_>,
        options: PutOptions,
    ) -> Result<String, StoreError> {
        CallCounters::bump(&self.calls.puts);
        if options.multipart {
            CallCounters::bump(&self.calls.multipart_puts);
        }
        if upload.key.is_empty() {
            return Err(invalid_request("object key must not be empty"));
        }

        let mut content = Vec::new();
        upload.content.read_to_end(&mut content)?;
        if content.len() as u64 != upload.length {
            return Err(invalid_request(format!(
                "declared length {} but received {} bytes",
                upload.length,
                content.len()
            )));
        }

        let mut hasher = EtagHasher::default();
        hasher.update(&content);
        let etag = hasher.finish(options.multipart);

        let mut metadata = new_metadata(
            upload.key,
            upload.length,
            etag.clone(),
            upload.content_type,
            upload.user_metadata,
        );
        metadata.kind = upload.kind;
        self.insert(
            bucket,
            StoredBlob {
                metadata,
                content: Bytes::from(content),
            },
        )?;
        debug!(bucket, key = upload.key, etag = %etag, "stored blob");
        Ok(etag)
    }

    fn remove_blob(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        CallCounters::bump(&self.calls.removes);
        let mut containers = self.write()?;
        let container = containers
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        container.blobs.remove(key);
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
        CallCounters::bump(&self.calls.copies);
        let source = self
            .lookup(source_bucket, source_key)?
            .ok_or_else(|| no_such_key(source_bucket, source_key))?;

        let mut hasher = EtagHasher::default();
        hasher.update(&source.content);
        let etag = hasher.finish(false);

        let metadata = new_metadata(
            target_key,
            source.metadata.size,
            etag.clone(),
            options
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            options.user_metadata.unwrap_or_default(),
        );
        self.insert(
            target_bucket,
            StoredBlob {
                metadata,
                content: source.content,
            },
        )?;
        Ok(etag)
    }

    fn list_blobs<'a>(&'a self, bucket: &str, prefix: &str) -> Result<KeyIter<'a>, StoreError> {
        CallCounters::bump(&self.calls.lists);
        let containers = self.read()?;
        let container = containers.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        let keys: Vec<_> = container
            .blobs
            .keys()
            .filter(|k| k.starts_with(prefix))
            .map(|k| Ok::<_, StoreError>(k.clone()))
            .collect();
        Ok(Box::new(keys.into_iter()))
    }
}

/// Hands out one shared [`MemoryBlobStore`] per endpoint, so filesystems
/// reopened against the same endpoint see the same objects.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    stores: Mutex<HashMap<String, Arc<MemoryBlobStore>>>,
    credentials: Option<(String, String)>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only connections presenting this user and password are accepted.
    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    /// The store behind `endpoint`, created empty on first use.
    pub fn store(&self, endpoint: &str) -> Result<Arc<MemoryBlobStore>, StoreError> {
        let mut stores = self.stores.lock().map_err(|_| poisoned())?;
        Ok(stores
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(MemoryBlobStore::new()))
            .clone())
    }
}

impl StoreConnector for MemoryConnector {
    fn connect(
        &self,
        target: &ConnectionTarget,
        _config: &FileSystemConfig,
    ) -> Result<Arc<dyn BlobStore>, StoreError> {
        if let Some((user, password)) = &self.credentials {
            let given = target.credentials();
            if given.user.as_ref() != Some(user) || given.password.as_ref() != Some(password) {
                return Err(StoreError::Auth(format!(
                    "access denied for {}",
                    given.user.as_deref().unwrap_or("anonymous")
                )));
            }
        }
        let store: Arc<dyn BlobStore> = self.store(target.endpoint())?;
        Ok(store)
    }
}
