//! Named attribute views over [`ObjectMetadata`].
//!
//! Two views exist. `basic` is derived from the metadata snapshot; `posix`
//! names owner, group and permissions, which an object store cannot answer,
//! so those always come back absent.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::metadata::{ObjectMetadata, StorageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeView {
    Basic,
    Posix,
}

impl AttributeView {
    pub const ALL: [AttributeView; 2] = [AttributeView::Basic, AttributeView::Posix];

    pub fn name(&self) -> &'static str {
        match self {
            AttributeView::Basic => "basic",
            AttributeView::Posix => "posix",
        }
    }
}

impl FromStr for AttributeView {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(AttributeView::Basic),
            "posix" => Ok(AttributeView::Posix),
            _ => Err(FsError::InvalidArgument(format!(
                "Unknown attribute view: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for AttributeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Time(DateTime<Utc>),
    Flag(bool),
    Size(u64),
    Key(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Time(t) => write!(f, "{}", t.to_rfc3339()),
            AttributeValue::Flag(b) => write!(f, "{}", b),
            AttributeValue::Size(n) => write!(f, "{}", n),
            AttributeValue::Key(k) => f.write_str(k),
        }
    }
}

/// Attribute name to value; `None` marks an attribute whose extraction failed.
pub type AttributeMap = BTreeMap<String, Option<AttributeValue>>;

type Extractor = fn(&ObjectMetadata) -> FsResult<AttributeValue>;

/// One row of the attribute table.
#[derive(Debug)]
pub struct AttributeEntry {
    view: AttributeView,
    name: &'static str,
    extract: Extractor,
}

impl AttributeEntry {
    pub fn view(&self) -> AttributeView {
        self.view
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn extract(&self, metadata: &ObjectMetadata) -> FsResult<AttributeValue> {
        (self.extract)(metadata)
    }

    /// Like [`AttributeEntry::extract`], but a failure yields `None`.
    pub fn extract_or_absent(&self, metadata: &ObjectMetadata) -> Option<AttributeValue> {
        match self.extract(metadata) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(
                    view = %self.view,
                    attribute = self.name,
                    error = %e,
                    "attribute unavailable"
                );
                None
            }
        }
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH)
}

fn last_modified(m: &ObjectMetadata) -> FsResult<AttributeValue> {
    Ok(AttributeValue::Time(m.last_modified.unwrap_or_else(epoch)))
}

fn creation_time(m: &ObjectMetadata) -> FsResult<AttributeValue> {
    Ok(AttributeValue::Time(m.created.unwrap_or_else(epoch)))
}

fn is_regular_file(m: &ObjectMetadata) -> FsResult<AttributeValue> {
    Ok(AttributeValue::Flag(m.is_regular_file()))
}

fn is_directory(m: &ObjectMetadata) -> FsResult<AttributeValue> {
    Ok(AttributeValue::Flag(m.is_directory()))
}

fn is_symbolic_link(_: &ObjectMetadata) -> FsResult<AttributeValue> {
    Ok(AttributeValue::Flag(false))
}

fn is_other(m: &ObjectMetadata) -> FsResult<AttributeValue> {
    Ok(AttributeValue::Flag(m.kind == StorageKind::RelativePath))
}

fn size(m: &ObjectMetadata) -> FsResult<AttributeValue> {
    Ok(AttributeValue::Size(m.size))
}

fn file_key(m: &ObjectMetadata) -> FsResult<AttributeValue> {
    m.id
        .clone()
        .map(AttributeValue::Key)
        .ok_or_else(|| FsError::IllegalState(format!("{} has no provider id", m.name)))
}

fn posix_unsupported(_: &ObjectMetadata) -> FsResult<AttributeValue> {
    Err(FsError::Unsupported("posix attributes".to_string()))
}

static ATTRIBUTES: [AttributeEntry; 12] = [
    AttributeEntry {
        view: AttributeView::Basic,
        name: "lastModifiedTime",
        extract: last_modified,
    },
    // Object stores do not track access times.
    AttributeEntry {
        view: AttributeView::Basic,
        name: "lastAccessTime",
        extract: last_modified,
    },
    AttributeEntry {
        view: AttributeView::Basic,
        name: "creationTime",
        extract: creation_time,
    },
    AttributeEntry {
        view: AttributeView::Basic,
        name: "isRegularFile",
        extract: is_regular_file,
    },
    AttributeEntry {
        view: AttributeView::Basic,
        name: "isDirectory",
        extract: is_directory,
    },
    AttributeEntry {
        view: AttributeView::Basic,
        name: "isSymbolicLink",
        extract: is_symbolic_link,
    },
    AttributeEntry {
        view: AttributeView::Basic,
        name: "isOther",
        extract: is_other,
    },
    AttributeEntry {
        view: AttributeView::Basic,
        name: "size",
        extract: size,
    },
    AttributeEntry {
        view: AttributeView::Basic,
        name: "fileKey",
        extract: file_key,
    },
    AttributeEntry {
        view: AttributeView::Posix,
        name: "owner",
        extract: posix_unsupported,
    },
    AttributeEntry {
        view: AttributeView::Posix,
        name: "group",
        extract: posix_unsupported,
    },
    AttributeEntry {
        view: AttributeView::Posix,
        name: "permissions",
        extract: posix_unsupported,
    },
];

/// Finds the entry for `name` in `view`.
pub fn lookup(view: &str, name: &str) -> FsResult<&'static AttributeEntry> {
    let parsed: Option<AttributeView> = view.parse().ok();
    ATTRIBUTES
        .iter()
        .find(|entry| Some(entry.view) == parsed && entry.name == name)
        .ok_or_else(|| FsError::UnknownAttribute {
            view: view.to_string(),
            name: name.to_string(),
        })
}

/// Every entry of `view`, in table order. Fails if the view is unknown.
pub fn all_for(view: &str) -> FsResult<impl Iterator<Item = &'static AttributeEntry> + Clone> {
    let view: AttributeView = view.parse()?;
    Ok(ATTRIBUTES.iter().filter(move |entry| entry.view == view))
}

/// Extracts `entries` from one metadata snapshot.
pub fn collect<'a, I>(entries: I, metadata: &ObjectMetadata) -> AttributeMap
where
    I: IntoIterator<Item = &'a AttributeEntry>,
{
    entries
        .into_iter()
        .map(|entry| (entry.name.to_string(), entry.extract_or_absent(metadata)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::DIRECTORY_CONTENT_TYPE;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn metadata() -> ObjectMetadata {
        ObjectMetadata {
            id: Some("id-1".to_string()),
            name: "docs/a.txt".to_string(),
            size: 42,
            content_type: Some("text/plain".to_string()),
            etag: None,
            last_modified: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            created: None,
            user_metadata: HashMap::new(),
            kind: StorageKind::Blob,
        }
    }

    #[test]
    fn test_basic_view_from_metadata() {
        let meta = metadata();
        let map = collect(all_for("basic").unwrap(), &meta);
        assert_eq!(map.len(), 9);
        assert_eq!(map["size"], Some(AttributeValue::Size(42)));
        assert_eq!(map["isRegularFile"], Some(AttributeValue::Flag(true)));
        assert_eq!(map["isDirectory"], Some(AttributeValue::Flag(false)));
        assert_eq!(map["lastAccessTime"], map["lastModifiedTime"]);
        assert_eq!(map["creationTime"], Some(AttributeValue::Time(epoch())));
        assert_eq!(map["fileKey"], Some(AttributeValue::Key("id-1".to_string())));
    }

    #[test]
    fn test_directory_and_missing_id() {
        let mut meta = metadata();
        meta.content_type = Some(DIRECTORY_CONTENT_TYPE.to_string());
        meta.id = None;
        let map = collect(all_for("basic").unwrap(), &meta);
        assert_eq!(map["isDirectory"], Some(AttributeValue::Flag(true)));
        assert_eq!(map["isRegularFile"], Some(AttributeValue::Flag(false)));
        assert_eq!(map["fileKey"], None);
    }

    #[test]
    fn test_posix_values_are_absent() {
        let map = collect(all_for("posix").unwrap(), &metadata());
        assert_eq!(map.len(), 3);
        assert!(map.values().all(Option::is_none));
    }

    #[test]
    fn test_lookup_failures() {
        assert!(matches!(
            lookup("basic", "colour"),
            Err(FsError::UnknownAttribute { .. })
        ));
        assert!(matches!(
            lookup("acl", "owner"),
            Err(FsError::UnknownAttribute { .. })
        ));
        assert!(all_for("acl").is_err());
    }

    #[test]
    fn test_all_for_is_restartable() {
        let entries = all_for("posix").unwrap();
        assert_eq!(entries.clone().count(), 3);
        assert_eq!(entries.count(), 3);
    }
}
