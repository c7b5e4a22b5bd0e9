//! Random-access channels over whole objects.
//!
//! An object store only reads and writes whole objects, so a channel
//! stages the object in a local temporary file. Opening downloads the
//! current content (unless a writable channel truncates), reads and writes go to the local
//! copy, and closing uploads the copy as a single new object.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::adapter::StoreAdapter;
use crate::error::{FsError, FsResult};
use crate::metadata::ObjectMetadata;
use crate::options::{OpenOption, OpenOptions};
use crate::path::{BlobPath, PATH_SEPARATOR};

const STAGING_PREFIX: &str = "temp-s3-";

/// A seekable byte channel on one object.
///
/// Changes are only visible in the store after [`BlobChannel::close`].
/// Dropping an open channel discards them.
#[derive(Debug)]
pub struct BlobChannel {
    adapter: Arc<StoreAdapter>,
    path: BlobPath,
    bucket: String,
    key: String,
    options: OpenOptions,
    metadata: Option<ObjectMetadata>,
    staging: Option<NamedTempFile>,
}

impl BlobChannel {
    pub(crate) fn open(
        adapter: Arc<StoreAdapter>,
        path: BlobPath,
        options: OpenOptions,
    ) -> FsResult<Self> {
        options.validate()?;
        let (bucket, key) = match (path.bucket(), path.bucket_key()) {
            (Some(bucket), Some(key)) => (bucket.to_string(), key),
            _ => {
                return Err(FsError::IllegalPath(format!(
                    "{} must be absolute to open a channel",
                    path
                )))
            }
        };
        if key.is_empty() {
            return Err(FsError::IllegalPath(format!(
                "{} is the bucket root and cannot hold content",
                path
            )));
        }

        let metadata = adapter.head(&bucket, &key)?;
        match &metadata {
            Some(_) if options.contains(OpenOption::CreateNew) => {
                return Err(FsError::AlreadyExists(path.render()));
            }
            Some(meta) if meta.is_directory() => {
                return Err(FsError::IllegalPath(format!("{} is a directory", path)));
            }
            None if !options.creates() => return Err(FsError::NotFound(path.render())),
            _ => {}
        }

        let suffix = path.render().replace(PATH_SEPARATOR, "_");
        let mut staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(&suffix)
            .tempfile()?;

        // Truncation only applies to channels that can write.
        let truncate = options.is_writable() && options.contains(OpenOption::TruncateExisting);
        if metadata.is_some() && !truncate {
            let mut payload = adapter.get(&bucket, &key)?.ok_or_else(|| {
                FsError::NotFound(format!("{} vanished before its content was read", path))
            })?;
            let hydrated = io::copy(&mut payload.content, staging.as_file_mut())?;
            adapter.metrics().bytes_hydrated(hydrated);
            debug!(path = %path, bytes = hydrated, "hydrated staging file");
        }

        let file = staging.as_file_mut();
        if options.contains(OpenOption::Append) {
            file.seek(SeekFrom::End(0))?;
        } else {
            file.seek(SeekFrom::Start(0))?;
        }

        adapter.metrics().channel_opened();
        Ok(BlobChannel {
            adapter,
            path,
            bucket,
            key,
            options,
            metadata,
            staging: Some(staging),
        })
    }

    pub fn path(&self) -> &BlobPath {
        &self.path
    }

    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// Metadata of the object as it was when the channel opened.
    pub fn metadata(&self) -> Option<&ObjectMetadata> {
        self.metadata.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.staging.is_some()
    }

    #[cfg(test)]
    fn staging_path(&self) -> Option<std::path::PathBuf> {
        self.staging.as_ref().map(|staging| staging.path().to_path_buf())
    }

    fn file(&mut self) -> FsResult<&mut File> {
        match self.staging.as_mut() {
            Some(staging) => Ok(staging.as_file_mut()),
            None => Err(FsError::Closed(format!("channel for {}", self.path))),
        }
    }

    pub fn size(&mut self) -> FsResult<u64> {
        Ok(self.file()?.metadata()?.len())
    }

    pub fn position(&mut self) -> FsResult<u64> {
        Ok(self.file()?.stream_position()?)
    }

    pub fn set_position(&mut self, position: u64) -> FsResult<()> {
        self.file()?.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Cuts the staged content to `size` bytes. Growing is a no-op.
    pub fn truncate(&mut self, size: u64) -> FsResult<()> {
        if !self.options.is_writable() {
            return Err(FsError::IllegalState(format!(
                "channel for {} is not writable",
                self.path
            )));
        }
        let file = self.file()?;
        if size < file.metadata()?.len() {
            file.set_len(size)?;
        }
        if file.stream_position()? > size {
            file.seek(SeekFrom::Start(size))?;
        }
        Ok(())
    }

    /// Ends the session and writes the outcome to the store.
    ///
    /// With `DeleteOnClose` the object is deleted, a pure `{Read}` session
    /// uploads nothing, and anything else uploads the staged bytes with the
    /// content type and user metadata captured at open. The staging file is
    /// removed whatever happens. Closing twice is a no-op.
    pub fn close(&mut self) -> FsResult<()> {
        let Some(mut staging) = self.staging.take() else {
            return Ok(());
        };
        let result = self.finish(staging.as_file_mut());
        if let Err(e) = staging.close() {
            warn!(path = %self.path, error = %e, "failed to remove staging file");
        }
        self.adapter.metrics().channel_closed();
        result
    }

    fn finish(&self, file: &mut File) -> FsResult<()> {
        if self.options.contains(OpenOption::DeleteOnClose) {
            if self.adapter.exists(&self.bucket, &self.key)? {
                self.adapter.delete(&self.bucket, &self.key)?;
            }
            return Ok(());
        }
        if self.options.is_read_only_session() {
            return Ok(());
        }

        file.flush()?;
        let length = file.metadata()?.len();
        file.seek(SeekFrom::Start(0))?;
        let (content_type, user_metadata) = match &self.metadata {
            Some(meta) => (meta.content_type.as_deref(), meta.user_metadata.clone()),
            None => (None, Default::default()),
        };
        self.adapter.put(
            &self.bucket,
            &self.key,
            file,
            length,
            content_type,
            user_metadata,
        )?;
        self.adapter.metrics().bytes_flushed(length);
        debug!(path = %self.path, bytes = length, "flushed channel");
        Ok(())
    }
}

impl Read for BlobChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.options.is_readable() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("channel for {} is not readable", self.path),
            ));
        }
        self.file().map_err(io::Error::from)?.read(buf)
    }
}

impl Write for BlobChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.options.is_writable() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("channel for {} is not writable", self.path),
            ));
        }
        let append = self.options.contains(OpenOption::Append);
        let file = self.file().map_err(io::Error::from)?;
        if append {
            file.seek(SeekFrom::End(0))?;
        }
        file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file().map_err(io::Error::from)?.flush()
    }
}

impl Seek for BlobChannel {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file().map_err(io::Error::from)?.seek(pos)
    }
}

impl Drop for BlobChannel {
    fn drop(&mut self) {
        if self.staging.is_some() {
            if self.options.mutates() {
                warn!(path = %self.path, "channel dropped without close, changes discarded");
            }
            self.adapter.metrics().channel_closed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SharedMetrics;
    use crate::error::StoreError;
    use crate::store::{
        BlobCopyOptions, BlobPayload, BlobStore, BlobUpload, ContainerIter, KeyIter,
        MemoryBlobStore, PutOptions,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory store that can be told to lose object bodies or refuse uploads.
    #[derive(Debug)]
    struct FaultyStore {
        inner: MemoryBlobStore,
        drop_bodies: AtomicBool,
        reject_puts: AtomicBool,
    }

    impl FaultyStore {
        fn new() -> Self {
            let inner = MemoryBlobStore::new();
            inner.create_container("bucket").unwrap();
            FaultyStore {
                inner,
                drop_bodies: AtomicBool::new(false),
                reject_puts: AtomicBool::new(false),
            }
        }
    }

    impl BlobStore for FaultyStore {
        fn list_containers(&self) -> Result<ContainerIter<'_>, StoreError> {
            self.inner.list_containers()
        }

        fn blob_metadata(
            &self,
            bucket: &str,
            key: &str,
        ) -> Result<Option<ObjectMetadata>, StoreError> {
            self.inner.blob_metadata(bucket, key)
        }

        fn get_blob(&self, bucket: &str, key: &str) -> Result<Option<BlobPayload>, StoreError> {
            if self.drop_bodies.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.get_blob(bucket, key)
        }

        fn put_blob(
            &self,
            bucket: &str,
            upload: BlobUpload<'_>,
            options: PutOptions,
        ) -> Result<String, StoreError> {
            if self.reject_puts.load(Ordering::SeqCst) {
                return Err(StoreError::Remote {
                    status: 503,
                    message: "SlowDown".to_string(),
                });
            }
            self.inner.put_blob(bucket, upload, options)
        }

        fn remove_blob(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
            self.inner.remove_blob(bucket, key)
        }

        fn copy_blob(
            &self,
            source_bucket: &str,
            source_key: &str,
            target_bucket: &str,
            target_key: &str,
            options: BlobCopyOptions,
        ) -> Result<String, StoreError> {
            self.inner
                .copy_blob(source_bucket, source_key, target_bucket, target_key, options)
        }

        fn list_blobs<'a>(&'a self, bucket: &str, prefix: &str) -> Result<KeyIter<'a>, StoreError> {
            self.inner.list_blobs(bucket, prefix)
        }
    }

    fn faulty_setup() -> (Arc<FaultyStore>, Arc<StoreAdapter>) {
        let store = Arc::new(FaultyStore::new());
        let adapter = Arc::new(StoreAdapter::new(
            store.clone(),
            u64::MAX,
            SharedMetrics::default(),
        ));
        (store, adapter)
    }

    fn setup() -> (Arc<MemoryBlobStore>, Arc<StoreAdapter>) {
        let store = Arc::new(MemoryBlobStore::new());
        store.create_container("bucket").unwrap();
        let adapter = Arc::new(StoreAdapter::new(
            store.clone(),
            u64::MAX,
            SharedMetrics::default(),
        ));
        (store, adapter)
    }

    fn path(key: &str) -> BlobPath {
        BlobPath::absolute("bucket", [key]).unwrap()
    }

    fn seed(adapter: &StoreAdapter, key: &str, data: &[u8], content_type: &str) {
        let mut content = data;
        let meta = HashMap::from([("owner".to_string(), "alice".to_string())]);
        adapter
            .put(
                "bucket",
                key,
                &mut content,
                data.len() as u64,
                Some(content_type),
                meta,
            )
            .unwrap();
    }

    fn read_object(adapter: &StoreAdapter, key: &str) -> Vec<u8> {
        let mut payload = adapter.get("bucket", key).unwrap().unwrap();
        let mut out = Vec::new();
        payload.content.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_read_session_never_uploads() {
        let (store, adapter) = setup();
        seed(&adapter, "a.txt", b"hello", "text/plain");
        let puts = store.calls().puts();

        let mut channel =
            BlobChannel::open(adapter.clone(), path("a.txt"), OpenOptions::read_only()).unwrap();
        let mut content = String::new();
        channel.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");
        channel.close().unwrap();

        assert_eq!(store.calls().puts(), puts);
    }

    #[test]
    fn test_write_keeps_content_type_and_metadata() {
        let (_, adapter) = setup();
        seed(&adapter, "doc.pdf", b"%PDF-old", "application/pdf");

        let options = OpenOptions::from([OpenOption::Write, OpenOption::TruncateExisting]);
        let mut channel = BlobChannel::open(adapter.clone(), path("doc.pdf"), options).unwrap();
        assert_eq!(channel.size().unwrap(), 0);
        channel.write_all(b"%PDF-new-content").unwrap();
        channel.close().unwrap();

        let meta = adapter.head("bucket", "doc.pdf").unwrap().unwrap();
        assert_eq!(meta.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(meta.user_metadata.get("owner").map(String::as_str), Some("alice"));
        assert_eq!(read_object(&adapter, "doc.pdf"), b"%PDF-new-content");
    }

    #[test]
    fn test_append_writes_at_end() {
        let (_, adapter) = setup();
        seed(&adapter, "log", b"one\n", "text/plain");

        let options = OpenOptions::from([OpenOption::Append]);
        let mut channel = BlobChannel::open(adapter.clone(), path("log"), options).unwrap();
        channel.seek(SeekFrom::Start(0)).unwrap();
        channel.write_all(b"two\n").unwrap();
        channel.close().unwrap();

        assert_eq!(read_object(&adapter, "log"), b"one\ntwo\n");
    }

    #[test]
    fn test_open_existence_rules() {
        let (_, adapter) = setup();
        seed(&adapter, "present", b"x", "text/plain");

        let err = BlobChannel::open(adapter.clone(), path("missing"), OpenOptions::read_only())
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));

        let options = OpenOptions::from([OpenOption::CreateNew, OpenOption::Write]);
        let err = BlobChannel::open(adapter.clone(), path("present"), options).unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(_)));

        let options = OpenOptions::from([OpenOption::Append, OpenOption::Read]);
        let err = BlobChannel::open(adapter.clone(), path("present"), options).unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));
    }

    #[test]
    fn test_create_uploads_new_object() {
        let (_, adapter) = setup();
        let options = OpenOptions::from([OpenOption::Create, OpenOption::Write]);
        let mut channel = BlobChannel::open(adapter.clone(), path("new.bin"), options).unwrap();
        channel.write_all(b"fresh").unwrap();
        channel.close().unwrap();

        let meta = adapter.head("bucket", "new.bin").unwrap().unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(
            meta.content_type.as_deref(),
            Some(crate::metadata::DEFAULT_CONTENT_TYPE)
        );
    }

    #[test]
    fn test_delete_on_close() {
        let (_, adapter) = setup();
        seed(&adapter, "tmp", b"x", "text/plain");
        let options = OpenOptions::from([OpenOption::Read, OpenOption::DeleteOnClose]);
        let mut channel = BlobChannel::open(adapter.clone(), path("tmp"), options).unwrap();
        channel.close().unwrap();
        assert!(!adapter.exists("bucket", "tmp").unwrap());
    }

    #[test]
    fn test_truncate_and_position() {
        let (_, adapter) = setup();
        seed(&adapter, "t", b"0123456789", "text/plain");
        let options = OpenOptions::from([OpenOption::Read, OpenOption::Write]);
        let mut channel = BlobChannel::open(adapter.clone(), path("t"), options).unwrap();
        channel.set_position(8).unwrap();
        channel.truncate(4).unwrap();
        assert_eq!(channel.size().unwrap(), 4);
        assert_eq!(channel.position().unwrap(), 4);
        channel.truncate(100).unwrap();
        assert_eq!(channel.size().unwrap(), 4);
        channel.close().unwrap();
        assert_eq!(read_object(&adapter, "t"), b"0123");
    }

    #[test]
    fn test_closed_channel_rejects_io() {
        let (_, adapter) = setup();
        seed(&adapter, "c", b"x", "text/plain");
        let mut channel =
            BlobChannel::open(adapter.clone(), path("c"), OpenOptions::read_only()).unwrap();
        channel.close().unwrap();
        channel.close().unwrap();
        assert!(!channel.is_open());
        assert!(channel.read(&mut [0u8; 1]).is_err());
        assert!(matches!(channel.size(), Err(FsError::Closed(_))));
    }

    #[test]
    fn test_read_only_channel_refuses_writes() {
        let (_, adapter) = setup();
        seed(&adapter, "r", b"x", "text/plain");
        let mut channel =
            BlobChannel::open(adapter.clone(), path("r"), OpenOptions::read_only()).unwrap();
        assert!(channel.write(b"y").is_err());
        assert!(channel.truncate(0).is_err());
    }

    #[test]
    fn test_dropped_channel_discards_changes() {
        let (_, adapter) = setup();
        seed(&adapter, "d", b"keep", "text/plain");
        {
            let options = OpenOptions::from([OpenOption::Write, OpenOption::TruncateExisting]);
            let mut channel = BlobChannel::open(adapter.clone(), path("d"), options).unwrap();
            channel.write_all(b"lost").unwrap();
        }
        assert_eq!(read_object(&adapter, "d"), b"keep");
    }

    #[test]
    fn test_truncate_ignored_without_write() {
        let (_, adapter) = setup();
        seed(&adapter, "keep.txt", b"precious", "text/plain");

        for options in [
            OpenOptions::from([OpenOption::Read, OpenOption::TruncateExisting]),
            OpenOptions::from([OpenOption::TruncateExisting]),
        ] {
            let mut channel =
                BlobChannel::open(adapter.clone(), path("keep.txt"), options).unwrap();
            let mut content = Vec::new();
            channel.read_to_end(&mut content).unwrap();
            assert_eq!(content, b"precious");
            channel.close().unwrap();
            assert_eq!(read_object(&adapter, "keep.txt"), b"precious");
        }
    }

    #[test]
    fn test_missing_body_fails_open() {
        let (store, adapter) = faulty_setup();
        seed(&adapter, "ghost", b"boo", "text/plain");
        store.drop_bodies.store(true, Ordering::SeqCst);

        let options = OpenOptions::from([OpenOption::Read, OpenOption::Write]);
        let err = BlobChannel::open(adapter.clone(), path("ghost"), options).unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));

        store.drop_bodies.store(false, Ordering::SeqCst);
        assert_eq!(read_object(&adapter, "ghost"), b"boo");
    }

    #[test]
    fn test_bucket_root_cannot_be_opened() {
        let (store, adapter) = setup();
        let root = BlobPath::absolute("bucket", std::iter::empty::<&str>()).unwrap();
        let options = OpenOptions::from([OpenOption::Create, OpenOption::Write]);
        let err = BlobChannel::open(adapter, root, options).unwrap_err();
        assert!(matches!(err, FsError::IllegalPath(_)));
        assert_eq!(store.calls().heads(), 0);
    }

    #[test]
    fn test_staging_file_removed_after_close() {
        let (_, adapter) = setup();
        seed(&adapter, "s", b"data", "text/plain");
        let options = OpenOptions::from([OpenOption::Read, OpenOption::Write]);
        let mut channel = BlobChannel::open(adapter.clone(), path("s"), options).unwrap();
        let staged = channel.staging_path().unwrap();
        assert!(staged.exists());
        assert!(staged
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(STAGING_PREFIX));

        channel.write_all(b"DATA").unwrap();
        channel.close().unwrap();
        assert!(!staged.exists());
        assert!(channel.staging_path().is_none());
    }

    #[test]
    fn test_staging_file_removed_when_upload_fails() {
        let (store, adapter) = faulty_setup();
        seed(&adapter, "u", b"old", "text/plain");
        let options = OpenOptions::from([OpenOption::Write, OpenOption::TruncateExisting]);
        let mut channel = BlobChannel::open(adapter.clone(), path("u"), options).unwrap();
        let staged = channel.staging_path().unwrap();
        channel.write_all(b"new").unwrap();

        store.reject_puts.store(true, Ordering::SeqCst);
        let err = channel.close().unwrap_err();
        assert!(matches!(err, FsError::Transport(_)));
        assert!(!staged.exists());
        assert!(!channel.is_open());
        assert_eq!(read_object(&adapter, "u"), b"old");
    }

    #[test]
    fn test_staging_file_removed_on_drop() {
        let (_, adapter) = setup();
        seed(&adapter, "p", b"x", "text/plain");
        let channel =
            BlobChannel::open(adapter.clone(), path("p"), OpenOptions::read_only()).unwrap();
        let staged = channel.staging_path().unwrap();
        assert!(staged.exists());
        drop(channel);
        assert!(!staged.exists());
    }
}
