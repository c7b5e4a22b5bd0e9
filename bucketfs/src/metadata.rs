use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type that marks a folder marker object.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/directory";

/// Content type used when an object is uploaded without one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Name of the zero-length object that stands in for a directory.
pub const FOLDER_MARKER: &str = ".self";

/// What kind of entry the store reports for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Blob,
    Container,
    Folder,
    RelativePath,
}

impl StorageKind {
    pub fn for_content_type(content_type: &str) -> Self {
        if content_type == DIRECTORY_CONTENT_TYPE {
            StorageKind::Folder
        } else {
            StorageKind::Blob
        }
    }
}

/// Point-in-time snapshot of an object's metadata.
///
/// Captured when a channel opens or an attribute query runs and never
/// refreshed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Provider assigned identifier, if the store has one.
    pub id: Option<String>,
    /// Key of the object inside its bucket.
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    pub kind: StorageKind,
}

impl ObjectMetadata {
    pub fn is_directory(&self) -> bool {
        self.content_type.as_deref() == Some(DIRECTORY_CONTENT_TYPE)
    }

    /// Anything that is not a folder marker counts as a regular file,
    /// including objects stored without a content type.
    pub fn is_regular_file(&self) -> bool {
        !self.is_directory()
    }
}

/// A bucket as reported by the container listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub name: String,
    pub etag: Option<String>,
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    pub kind: StorageKind,
}

impl ContainerMetadata {
    pub fn new(name: impl Into<String>, created: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            etag: None,
            created,
            user_metadata: HashMap::new(),
            kind: StorageKind::Container,
        }
    }
}
