//! # Bucket Filesystem Library
//!
//! Presents an object-storage bucket as a hierarchical filesystem with
//! random-access file channels.
//!
//! ## Features
//!
//! - **Hierarchical Paths**: `/bucket/dir/file` paths over flat object keys
//! - **Folder Markers**: Directories are empty `dir/.self` objects
//! - **Random-Access Channels**: Objects staged in a local temporary file,
//!   uploaded on close
//! - **Attribute Views**: `basic` and `posix` views derived from object metadata
//! - **Pluggable Stores**: In-memory and directory-backed stores, or any
//!   [`BlobStore`] implementation
//! - **Connection Registry**: One open filesystem per `s3://` / `ss3://` URI
//!
//! ## Example
//!
//! ```no_run
//! use bucketfs::{ConnectionManager, DirConnector, OpenOption};
//! use std::io::Write;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConnectionManager::new(Arc::new(DirConnector::new("./data")));
//! let fs = manager.open("s3://localhost:9000/docs", [("s3.filesystem.readonly", "false")])?;
//!
//! fs.create_directory(&fs.path(["reports"]))?;
//!
//! let path = fs.path(["reports", "q1.txt"]);
//! let mut channel = fs.new_channel(&path, [OpenOption::Create, OpenOption::Write])?;
//! channel.write_all(b"quarterly numbers")?;
//! channel.close()?;
//!
//! let attributes = fs.read_attributes(&path, "basic:size,isDirectory")?;
//! println!("{:?}", attributes);
//!
//! for child in fs.read_dir(&fs.path(["reports"]))? {
//!     println!("{}", child);
//! }
//! fs.close();
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod attributes;
pub mod channel;
pub mod config;
pub mod error;
pub mod file_store;
pub mod filesystem;
pub mod manager;
pub mod metadata;
pub mod metrics;
pub mod options;
pub mod path;
pub mod store;
pub mod uri;

// Core filesystem types
pub use channel::BlobChannel;
pub use filesystem::BucketFileSystem;
pub use manager::ConnectionManager;
pub use path::{BlobPath, FileSystemId, PATH_SEPARATOR};

pub use attributes::{AttributeMap, AttributeValue, AttributeView};
pub use config::{EnvironmentKey, FileSystemConfig, ProxyConfig};
pub use error::{FsError, FsErrorKind, FsResult, StoreError};
pub use file_store::{FileStore, FileStoreAttribute};
pub use metadata::{ContainerMetadata, ObjectMetadata, StorageKind};
pub use options::{AccessMode, CopyOption, OpenOption, OpenOptions};
pub use uri::ConnectionTarget;

// Store seam and bundled implementations
pub use store::{
    BlobStore, DirBlobStore, DirConnector, MemoryBlobStore, MemoryConnector, StoreConnector,
};

pub use metrics::{MetricsCollector, NoOpMetrics, SharedMetrics};
