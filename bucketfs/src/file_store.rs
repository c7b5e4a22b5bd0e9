use std::str::FromStr;

use crate::error::{FsError, FsResult};
use crate::metadata::ContainerMetadata;

pub const FILE_STORE_TYPE: &str = "s3-Container";

/// Named capabilities a [`FileStore`] can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStoreAttribute {
    Etag,
    Id,
    LastModified,
    Metadata,
    MillisecondPrecision,
    Public,
    RecursiveDelete,
    RootContainer,
    Size,
    SkipCreateContainer,
}

impl FileStoreAttribute {
    pub fn name(&self) -> &'static str {
        match self {
            FileStoreAttribute::Etag => "ETAG",
            FileStoreAttribute::Id => "ID",
            FileStoreAttribute::LastModified => "LAST_MODIFIED",
            FileStoreAttribute::Metadata => "METADATA",
            FileStoreAttribute::MillisecondPrecision => "MILLISECOND_PRECISION",
            FileStoreAttribute::Public => "PUBLIC",
            FileStoreAttribute::RecursiveDelete => "RECURSIVE_DELETE",
            FileStoreAttribute::RootContainer => "ROOTCONTAINER",
            FileStoreAttribute::Size => "SIZE",
            FileStoreAttribute::SkipCreateContainer => "SKIP_CREATE_CONTAINER",
        }
    }
}

impl FromStr for FileStoreAttribute {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ETAG" => Ok(FileStoreAttribute::Etag),
            "ID" => Ok(FileStoreAttribute::Id),
            "LAST_MODIFIED" => Ok(FileStoreAttribute::LastModified),
            "METADATA" => Ok(FileStoreAttribute::Metadata),
            "MILLISECOND_PRECISION" => Ok(FileStoreAttribute::MillisecondPrecision),
            "PUBLIC" => Ok(FileStoreAttribute::Public),
            "RECURSIVE_DELETE" => Ok(FileStoreAttribute::RecursiveDelete),
            "ROOTCONTAINER" => Ok(FileStoreAttribute::RootContainer),
            "SIZE" => Ok(FileStoreAttribute::Size),
            "SKIP_CREATE_CONTAINER" => Ok(FileStoreAttribute::SkipCreateContainer),
            _ => Err(FsError::UnknownAttribute {
                view: "filestore".to_string(),
                name: s.to_string(),
            }),
        }
    }
}

/// A bucket seen as a storage volume.
///
/// Object stores report no capacity, so all space figures are unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStore {
    container: ContainerMetadata,
    read_only: bool,
}

impl FileStore {
    pub fn new(container: ContainerMetadata, read_only: bool) -> Self {
        Self {
            container,
            read_only,
        }
    }

    pub fn name(&self) -> &str {
        &self.container.name
    }

    pub fn store_type(&self) -> &'static str {
        FILE_STORE_TYPE
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn total_space(&self) -> u64 {
        u64::MAX
    }

    pub fn usable_space(&self) -> u64 {
        u64::MAX
    }

    pub fn unallocated_space(&self) -> u64 {
        u64::MAX
    }

    pub fn container(&self) -> &ContainerMetadata {
        &self.container
    }

    /// Looks up a capability by name. `ETAG` comes from the container
    /// itself, everything else from its user metadata.
    pub fn attribute(&self, name: &str) -> FsResult<Option<String>> {
        let attribute: FileStoreAttribute = name.parse()?;
        Ok(match attribute {
            FileStoreAttribute::Etag => self.container.etag.clone(),
            other => self.container.user_metadata.get(other.name()).cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_attributes() {
        let mut container = ContainerMetadata::new("docs", None);
        container.etag = Some("abc".to_string());
        container
            .user_metadata
            .insert("PUBLIC".to_string(), "false".to_string());
        let store = FileStore::new(container, false);

        assert_eq!(store.name(), "docs");
        assert_eq!(store.store_type(), "s3-Container");
        assert_eq!(store.total_space(), u64::MAX);
        assert_eq!(store.attribute("etag").unwrap().as_deref(), Some("abc"));
        assert_eq!(store.attribute("PUBLIC").unwrap().as_deref(), Some("false"));
        assert_eq!(store.attribute("SIZE").unwrap(), None);
        assert!(matches!(
            store.attribute("colour"),
            Err(FsError::UnknownAttribute { .. })
        ));
    }
}
