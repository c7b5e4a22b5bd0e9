use std::collections::BTreeSet;
use std::convert::Infallible;
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{debug, info};

use crate::adapter::StoreAdapter;
use crate::attributes::{self, AttributeEntry, AttributeMap, AttributeValue, AttributeView};
use crate::channel::BlobChannel;
use crate::config::FileSystemConfig;
use crate::error::{FsError, FsResult};
use crate::file_store::FileStore;
use crate::manager::Registry;
use crate::metadata::{ObjectMetadata, FOLDER_MARKER};
use crate::options::{AccessMode, CopyOption, OpenOption, OpenOptions};
use crate::path::{BlobPath, FileSystemId, PATH_SEPARATOR};
use crate::store::BlobCopyOptions;
use crate::uri::ConnectionTarget;

/// Which attributes a query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeSelection {
    All,
    Names(Vec<String>),
}

/// A parsed `"[view:]name[,name...]"` or `"[view:]*"` query.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeQuery {
    view: String,
    selection: AttributeSelection,
}

impl AttributeQuery {
    /// Resolves the query to table entries without touching the store.
    fn entries(&self) -> FsResult<Vec<&'static AttributeEntry>> {
        match &self.selection {
            AttributeSelection::All => Ok(attributes::all_for(&self.view)?.collect()),
            AttributeSelection::Names(names) => names
                .iter()
                .map(|name| attributes::lookup(&self.view, name))
                .collect(),
        }
    }
}

impl FromStr for AttributeQuery {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (view, rest) = match s.split_once(':') {
            Some((view, rest)) => (view.trim(), rest),
            None => (AttributeView::Basic.name(), s),
        };
        if rest.trim() == "*" {
            return Ok(AttributeQuery {
                view: view.to_string(),
                selection: AttributeSelection::All,
            });
        }
        let names: Vec<String> = rest
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(FsError::InvalidArgument(format!(
                "Empty attribute query: {}",
                s
            )));
        }
        Ok(AttributeQuery {
            view: view.to_string(),
            selection: AttributeSelection::Names(names),
        })
    }
}

/// A bucket presented as a hierarchical filesystem.
///
/// Obtained from [`crate::ConnectionManager::open`]. Every query goes to the
/// store; nothing is cached between calls.
#[derive(Debug)]
pub struct BucketFileSystem {
    id: FileSystemId,
    target: ConnectionTarget,
    config: FileSystemConfig,
    adapter: RwLock<Option<Arc<StoreAdapter>>>,
    registry: Weak<Registry>,
}

impl BucketFileSystem {
    pub(crate) fn new(
        target: ConnectionTarget,
        config: FileSystemConfig,
        adapter: StoreAdapter,
        registry: Weak<Registry>,
    ) -> Self {
        Self {
            id: FileSystemId::next(),
            target,
            config,
            adapter: RwLock::new(Some(Arc::new(adapter))),
            registry,
        }
    }

    pub fn id(&self) -> FileSystemId {
        self.id
    }

    /// Connection key this filesystem is registered under.
    pub fn key(&self) -> &str {
        self.target.key()
    }

    pub fn bucket(&self) -> &str {
        self.target.bucket()
    }

    pub fn endpoint(&self) -> &str {
        self.target.endpoint()
    }

    pub fn config(&self) -> &FileSystemConfig {
        &self.config
    }

    pub fn separator(&self) -> &'static str {
        PATH_SEPARATOR
    }

    pub fn supported_attribute_views(&self) -> Vec<&'static str> {
        AttributeView::ALL.iter().map(AttributeView::name).collect()
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    pub fn is_open(&self) -> bool {
        self.adapter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// An absolute path in this filesystem's bucket.
    ///
    /// A leading segment equal to the bucket name is taken as the bucket
    /// qualifier, so `path(["/docs/a"])` and `path(["a"])` are equal in
    /// bucket `docs`.
    pub fn path<I, S>(&self, parts: I) -> BlobPath
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        BlobPath::owned_absolute(self.bucket(), self.id, parts)
    }

    pub fn root_directory(&self) -> BlobPath {
        self.path(std::iter::empty::<&str>())
    }

    fn client(&self) -> FsResult<Arc<StoreAdapter>> {
        self.adapter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| FsError::Closed(format!("filesystem {}", self.key())))
    }

    /// Store key for `path`, after checking that the path belongs here.
    fn locate(&self, path: &BlobPath) -> FsResult<String> {
        let (bucket, key) = match (path.bucket(), path.bucket_key()) {
            (Some(bucket), Some(key)) => (bucket, key),
            _ => {
                return Err(FsError::IllegalPath(format!(
                    "{} is not absolute",
                    path
                )))
            }
        };
        if path.owner().is_some_and(|owner| owner != self.id) || bucket != self.bucket() {
            return Err(FsError::IllegalPath(format!(
                "{} belongs to another filesystem than {}",
                path,
                self.key()
            )));
        }
        Ok(key)
    }

    fn ensure_writable(&self, operation: &str) -> FsResult<()> {
        if self.config.read_only {
            return Err(FsError::ReadOnly(format!("{} on {}", operation, self.key())));
        }
        Ok(())
    }

    pub fn exists(&self, path: &BlobPath) -> FsResult<bool> {
        let key = self.locate(path)?;
        self.client()?.exists(self.bucket(), &key)
    }

    /// Fresh metadata snapshot for `path`, or `NotFound`.
    pub fn metadata(&self, path: &BlobPath) -> FsResult<ObjectMetadata> {
        let key = self.locate(path)?;
        self.client()?
            .head(self.bucket(), &key)?
            .ok_or_else(|| FsError::NotFound(path.render()))
    }

    pub fn new_channel(
        &self,
        path: &BlobPath,
        options: impl Into<OpenOptions>,
    ) -> FsResult<BlobChannel> {
        let options = options.into();
        self.locate(path)?;
        if options.mutates() {
            self.ensure_writable("open for writing")?;
        }
        BlobChannel::open(self.client()?, path.clone(), options)
    }

    /// Reads the whole object at `path`.
    pub fn read(&self, path: &BlobPath) -> FsResult<Vec<u8>> {
        let mut channel = self.new_channel(path, OpenOptions::read_only())?;
        let mut content = Vec::new();
        channel.read_to_end(&mut content)?;
        channel.close()?;
        Ok(content)
    }

    /// Replaces the object at `path` with `data`, creating it if needed.
    pub fn write(&self, path: &BlobPath, data: &[u8]) -> FsResult<()> {
        let mut channel = self.new_channel(
            path,
            [
                OpenOption::Create,
                OpenOption::Write,
                OpenOption::TruncateExisting,
            ],
        )?;
        channel.write_all(data)?;
        channel.close()
    }

    pub fn create_directory(&self, path: &BlobPath) -> FsResult<()> {
        let key = self.locate(path)?;
        self.ensure_writable("create directory")?;
        self.client()?.create_folder(self.bucket(), &key)?;
        debug!(path = %path, "created directory");
        Ok(())
    }

    /// Deletes `path`. Deleting something that does not exist is a no-op.
    pub fn delete(&self, path: &BlobPath) -> FsResult<()> {
        let key = self.locate(path)?;
        self.ensure_writable("delete")?;
        let client = self.client()?;
        if client.exists(self.bucket(), &key)? {
            client.delete(self.bucket(), &key)?;
        } else {
            debug!(path = %path, "delete of missing path ignored");
        }
        Ok(())
    }

    /// Server-side copy of a regular file.
    ///
    /// Fails with `AlreadyExists` when the target exists, unless
    /// [`CopyOption::ReplaceExisting`] is given. With
    /// [`CopyOption::CopyAttributes`] the content type and user metadata of
    /// the source are carried over.
    pub fn copy(
        &self,
        source: &BlobPath,
        target: &BlobPath,
        options: &[CopyOption],
    ) -> FsResult<()> {
        let source_key = self.locate(source)?;
        let target_key = self.locate(target)?;
        self.ensure_writable("copy")?;
        if options.contains(&CopyOption::AtomicMove) {
            return Err(FsError::Unsupported("atomic copy".to_string()));
        }
        if self.is_same_file(source, target) {
            return Ok(());
        }

        let client = self.client()?;
        let source_meta = client
            .head(self.bucket(), &source_key)?
            .ok_or_else(|| FsError::NotFound(source.render()))?;
        if source_meta.is_directory() {
            return Err(FsError::Unsupported(format!(
                "{} is a directory, copying folders is not possible",
                source
            )));
        }
        if !options.contains(&CopyOption::ReplaceExisting)
            && client.exists(self.bucket(), &target_key)?
        {
            return Err(FsError::AlreadyExists(target.render()));
        }

        let copy_options = if options.contains(&CopyOption::CopyAttributes) {
            BlobCopyOptions {
                content_type: source_meta.content_type,
                user_metadata: Some(source_meta.user_metadata),
            }
        } else {
            BlobCopyOptions::default()
        };
        client.copy(
            self.bucket(),
            &source_key,
            self.bucket(),
            &target_key,
            copy_options,
        )?;
        debug!(source = %source, target = %target, "copied object");
        Ok(())
    }

    /// Copy followed by delete of the source.
    ///
    /// Not atomic: if the delete fails, both objects remain and the error
    /// is returned.
    pub fn rename(
        &self,
        source: &BlobPath,
        target: &BlobPath,
        options: &[CopyOption],
    ) -> FsResult<()> {
        if options.contains(&CopyOption::AtomicMove) {
            return Err(FsError::Unsupported("atomic move".to_string()));
        }
        if self.is_same_file(source, target) {
            self.locate(source)?;
            return Ok(());
        }
        self.copy(source, target, options)?;
        self.delete(source)
    }

    /// Reads attributes selected by `query` (`"size"`, `"basic:*"`,
    /// `"posix:owner"`, `"basic:size,isDirectory"`).
    ///
    /// The query is validated before any store call. Attributes that cannot
    /// be produced come back as `None`.
    pub fn read_attributes(&self, path: &BlobPath, query: &str) -> FsResult<AttributeMap> {
        let query: AttributeQuery = query.parse()?;
        let entries = query.entries()?;
        let metadata = self.metadata(path)?;
        Ok(attributes::collect(entries, &metadata))
    }

    pub fn set_attribute(
        &self,
        path: &BlobPath,
        attribute: &str,
        _value: AttributeValue,
    ) -> FsResult<()> {
        Err(FsError::Unsupported(format!(
            "setting attribute {} on {}",
            attribute, path
        )))
    }

    pub fn create_symbolic_link(&self, link: &BlobPath, _target: &BlobPath) -> FsResult<()> {
        Err(FsError::Unsupported(format!("symbolic link {}", link)))
    }

    pub fn new_watch_service(&self) -> FsResult<Infallible> {
        Err(FsError::Unsupported("watch service".to_string()))
    }

    pub fn path_matcher(&self, syntax_and_pattern: &str) -> FsResult<Infallible> {
        Err(FsError::Unsupported(format!("path matcher {}", syntax_and_pattern)))
    }

    /// Immediate children of the directory at `path`, sorted.
    ///
    /// Deeper keys are collapsed to their first segment below `path` and
    /// folder markers are not listed.
    pub fn read_dir(&self, path: &BlobPath) -> FsResult<Vec<BlobPath>> {
        let key = self.locate(path)?;
        let client = self.client()?;
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{}{}", key, PATH_SEPARATOR)
        };

        let mut children = BTreeSet::new();
        let mut listed_any = false;
        for found in client.list_keys(self.bucket(), &prefix)? {
            listed_any = true;
            let Some(rest) = found.strip_prefix(&prefix) else {
                continue;
            };
            let child = rest.split(PATH_SEPARATOR).next().unwrap_or_default();
            if child.is_empty() || child == FOLDER_MARKER {
                continue;
            }
            children.insert(child.to_string());
        }

        if !listed_any && !key.is_empty() {
            match client.head(self.bucket(), &key)? {
                None => return Err(FsError::NotFound(path.render())),
                Some(meta) if meta.is_regular_file() => {
                    return Err(FsError::IllegalPath(format!("{} is not a directory", path)))
                }
                Some(_) => {}
            }
        }

        Ok(children
            .into_iter()
            .map(|child| path.resolve_str(&child))
            .collect())
    }

    /// The container backing this filesystem, as a [`FileStore`].
    pub fn file_stores(&self) -> FsResult<Vec<FileStore>> {
        let containers = self.client()?.list_containers()?;
        Ok(containers
            .into_iter()
            .filter(|c| c.name == self.bucket())
            .map(|c| FileStore::new(c, self.config.read_only))
            .collect())
    }

    pub fn is_same_file(&self, a: &BlobPath, b: &BlobPath) -> bool {
        a.render() == b.render()
    }

    /// True for an existing path whose file name starts with a dot.
    pub fn is_hidden(&self, path: &BlobPath) -> FsResult<bool> {
        let dotted = path
            .bucket_key()
            .and_then(|key| key.rsplit(PATH_SEPARATOR).next().map(|name| name.starts_with('.')))
            .unwrap_or(false);
        Ok(dotted && self.exists(path)?)
    }

    pub fn check_access(&self, path: &BlobPath, modes: &[AccessMode]) -> FsResult<()> {
        if modes.contains(&AccessMode::Execute) {
            return Err(FsError::Unsupported(format!("execute access on {}", path)));
        }
        if !self.exists(path)? {
            return Err(FsError::NotFound(path.render()));
        }
        if modes.contains(&AccessMode::Write) {
            self.ensure_writable("write access")?;
        }
        Ok(())
    }

    /// Releases the client and removes this filesystem from its manager.
    ///
    /// Later operations fail with `Closed`. Open channels keep working on
    /// their own staging files but are not tracked. Closing twice is a
    /// no-op.
    pub fn close(&self) {
        let released = self
            .adapter
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_none() {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            let mut filesystems = registry.write().unwrap_or_else(PoisonError::into_inner);
            if filesystems
                .get(self.key())
                .is_some_and(|registered| registered.id == self.id)
            {
                filesystems.remove(self.key());
            }
        }
        info!(uri = self.key(), "closed filesystem");
    }
}
