use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::adapter::StoreAdapter;
use crate::config::FileSystemConfig;
use crate::error::{FsError, FsResult};
use crate::filesystem::BucketFileSystem;
use crate::metrics::SharedMetrics;
use crate::store::StoreConnector;
use crate::uri::ConnectionTarget;

/// Open filesystems by connection key.
pub(crate) type Registry = RwLock<HashMap<String, Arc<BucketFileSystem>>>;

/// Opens, tracks and closes [`BucketFileSystem`] instances.
///
/// At most one filesystem is open per connection key (scheme, host, port
/// and path of the URI). Instances are shared through `Arc` and remove
/// themselves from the registry when closed.
#[derive(Debug)]
pub struct ConnectionManager {
    connector: Arc<dyn StoreConnector>,
    filesystems: Arc<Registry>,
    metrics: SharedMetrics,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self::with_metrics(connector, SharedMetrics::default())
    }

    pub fn with_metrics(connector: Arc<dyn StoreConnector>, metrics: SharedMetrics) -> Self {
        Self {
            connector,
            filesystems: Arc::new(RwLock::new(HashMap::new())),
            metrics,
        }
    }

    /// Opens a filesystem for `uri`, configured from `env` entries
    /// (`s3.filesystem.*` keys).
    ///
    /// # Errors
    /// * `InvalidArgument` - malformed URI or configuration value
    /// * `AlreadyExists` - a filesystem is already open for this key
    /// * `Transport` - the store rejected the connection
    pub fn open<I, K, V>(&self, uri: &str, env: I) -> FsResult<Arc<BucketFileSystem>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let config = FileSystemConfig::from_env(env)?;
        self.open_with_config(uri, config)
    }

    pub fn open_with_config(
        &self,
        uri: &str,
        config: FileSystemConfig,
    ) -> FsResult<Arc<BucketFileSystem>> {
        let target = ConnectionTarget::parse(uri, &config)?;

        {
            let filesystems = self
                .filesystems
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if filesystems.contains_key(target.key()) {
                return Err(FsError::AlreadyExists(target.key().to_string()));
            }
        }

        // Connecting may hit the network, keep it outside the lock.
        debug!(uri = target.key(), endpoint = target.endpoint(), "connecting");
        let store = self.connector.connect(&target, &config)?;
        let adapter = StoreAdapter::new(store, config.multipart_threshold(), self.metrics.clone());

        let mut filesystems = self
            .filesystems
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if filesystems.contains_key(target.key()) {
            return Err(FsError::AlreadyExists(target.key().to_string()));
        }
        let key = target.key().to_string();
        let filesystem = Arc::new(BucketFileSystem::new(
            target,
            config,
            adapter,
            Arc::downgrade(&self.filesystems),
        ));
        filesystems.insert(key, filesystem.clone());
        info!(
            uri = filesystem.key(),
            bucket = filesystem.bucket(),
            read_only = filesystem.is_read_only(),
            "opened filesystem"
        );
        Ok(filesystem)
    }

    /// The open filesystem for `uri`, or `NotFound`.
    pub fn get(&self, uri: &str) -> FsResult<Arc<BucketFileSystem>> {
        let key = ConnectionTarget::connection_key(uri)?;
        self.filesystems
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or(FsError::NotFound(key))
    }

    /// Closes the filesystem for `uri` if one is open.
    pub fn close(&self, uri: &str) -> FsResult<()> {
        let key = ConnectionTarget::connection_key(uri)?;
        let removed = self
            .filesystems
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        if let Some(filesystem) = removed {
            filesystem.close();
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.filesystems
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Connection keys of all open filesystems, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .filesystems
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }
}
