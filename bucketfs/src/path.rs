//! Hierarchical paths over a flat bucket namespace.
//!
//! A [`BlobPath`] is an immutable list of non-empty, trimmed segments. Absolute
//! paths are bucket-qualified: segment 0 *is* the bucket and the remaining
//! segments form the object key inside it. Relative paths carry no bucket and
//! can never be turned into absolute ones.
//!
//! Rendering is always `"/" + segments.join("/")`, so the absolute path for key
//! `a/b` in bucket `docs` renders as `/docs/a/b` while its store key is `a/b`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::error::{FsError, FsResult};

pub const PATH_SEPARATOR: &str = "/";

static NEXT_FILESYSTEM_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of the filesystem instance a path was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileSystemId(u64);

impl FileSystemId {
    pub(crate) fn next() -> Self {
        FileSystemId(NEXT_FILESYSTEM_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Path value over a slash separated segment list.
///
/// Equality, hashing and ordering are structural over the rendered form (the
/// variant is part of the identity, the owning filesystem is not).
#[derive(Debug, Clone)]
pub enum BlobPath {
    Absolute {
        bucket: String,
        owner: Option<FileSystemId>,
        segments: Vec<String>,
    },
    Relative {
        segments: Vec<String>,
    },
}

/// Splits raw strings on the separator, dropping empty and blank tokens.
fn split_segments<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .flat_map(|part| {
            part.as_ref()
                .split(PATH_SEPARATOR)
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

impl BlobPath {
    /// Builds a relative path from one or more raw strings.
    pub fn relative<I, S>(parts: I) -> BlobPath
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        BlobPath::Relative {
            segments: split_segments(parts),
        }
    }

    /// Builds an absolute path inside `bucket` that is not bound to any
    /// filesystem instance.
    ///
    /// Leading segments equal to the bucket name are taken as the bucket
    /// qualifier and dropped, so `absolute("docs", ["/docs/a"])` and
    /// `absolute("docs", ["a"])` are the same path and a store key never
    /// starts with the bucket name.
    pub fn absolute<I, S>(bucket: &str, parts: I) -> FsResult<BlobPath>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let bucket = validate_bucket(bucket)?;
        Ok(BlobPath::bucket_path(bucket, None, split_segments(parts)))
    }

    pub(crate) fn owned_absolute<I, S>(bucket: &str, owner: FileSystemId, parts: I) -> BlobPath
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        BlobPath::bucket_path(bucket.to_string(), Some(owner), split_segments(parts))
    }

    fn bucket_path(bucket: String, owner: Option<FileSystemId>, key: Vec<String>) -> BlobPath {
        let mut segments = Vec::with_capacity(key.len() + 1);
        segments.push(bucket.clone());
        segments.extend(key.into_iter().skip_while(|segment| *segment == bucket));
        BlobPath::Absolute {
            bucket,
            owner,
            segments,
        }
    }

    /// Builds a path of the same variant (and bucket/owner) as `self` from
    /// key segments, i.e. without the bucket.
    fn derive(&self, key: Vec<String>) -> BlobPath {
        match self {
            BlobPath::Absolute { bucket, owner, .. } => {
                BlobPath::bucket_path(bucket.clone(), *owner, key)
            }
            BlobPath::Relative { .. } => BlobPath::Relative { segments: key },
        }
    }

    fn single(segment: &str) -> BlobPath {
        BlobPath::Relative {
            segments: vec![segment.to_string()],
        }
    }

    pub fn segments(&self) -> &[String] {
        match self {
            BlobPath::Absolute { segments, .. } => segments,
            BlobPath::Relative { segments } => segments,
        }
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self, BlobPath::Absolute { .. })
    }

    pub fn is_empty(&self) -> bool {
        self.segments().is_empty()
    }

    pub fn bucket(&self) -> Option<&str> {
        match self {
            BlobPath::Absolute { bucket, .. } => Some(bucket),
            BlobPath::Relative { .. } => None,
        }
    }

    pub fn owner(&self) -> Option<FileSystemId> {
        match self {
            BlobPath::Absolute { owner, .. } => *owner,
            BlobPath::Relative { .. } => None,
        }
    }

    /// Flat object key inside the bucket: every segment but the bucket itself.
    pub fn bucket_key(&self) -> Option<String> {
        match self {
            BlobPath::Absolute { segments, .. } => Some(segments[1..].join(PATH_SEPARATOR)),
            BlobPath::Relative { .. } => None,
        }
    }

    pub fn render(&self) -> String {
        format!("{}{}", PATH_SEPARATOR, self.segments().join(PATH_SEPARATOR))
    }

    pub fn name_count(&self) -> usize {
        self.segments().len()
    }

    pub fn file_name(&self) -> Option<BlobPath> {
        self.segments().last().map(|last| BlobPath::single(last))
    }

    pub fn name(&self, index: usize) -> FsResult<BlobPath> {
        self.segments()
            .get(index)
            .map(|segment| BlobPath::single(segment))
            .ok_or_else(|| {
                FsError::InvalidArgument(format!("index {} out of range for {}", index, self))
            })
    }

    /// Relative path over `segments[begin..end]`.
    pub fn subpath(&self, begin: usize, end: usize) -> FsResult<BlobPath> {
        let len = self.name_count();
        if begin >= end || end > len {
            return Err(FsError::InvalidArgument(format!(
                "subpath range {}..{} invalid for {} segments",
                begin, end, len
            )));
        }
        Ok(BlobPath::Relative {
            segments: self.segments()[begin..end].to_vec(),
        })
    }

    /// Bucket root for absolute paths, nothing for relative ones.
    pub fn root(&self) -> Option<BlobPath> {
        match self {
            BlobPath::Absolute { .. } => Some(self.derive(Vec::new())),
            BlobPath::Relative { .. } => None,
        }
    }

    /// Drops the last segment.
    ///
    /// The bucket root is its own parent. A relative path with fewer than two
    /// segments has none.
    pub fn parent(&self) -> Option<BlobPath> {
        let segments = self.segments();
        match self {
            BlobPath::Absolute { .. } if segments.len() <= 1 => self.root(),
            BlobPath::Absolute { .. } => {
                Some(self.derive(segments[1..segments.len() - 1].to_vec()))
            }
            BlobPath::Relative { .. } if segments.len() <= 1 => None,
            BlobPath::Relative { .. } => {
                Some(self.derive(segments[..segments.len() - 1].to_vec()))
            }
        }
    }

    fn key_segments(&self) -> &[String] {
        match self {
            BlobPath::Absolute { segments, .. } => &segments[1..],
            BlobPath::Relative { segments } => segments,
        }
    }

    fn appended(&self, other: &[String]) -> BlobPath {
        let mut segments = self.key_segments().to_vec();
        let qualifier = self.bucket();
        segments.extend(
            other
                .iter()
                .skip_while(|segment| Some(segment.as_str()) == qualifier)
                .cloned(),
        );
        self.derive(segments)
    }

    /// Appends `other` to this path. Resolving an empty path is the identity.
    pub fn resolve(&self, other: &BlobPath) -> BlobPath {
        if other.is_empty() {
            return self.clone();
        }
        self.appended(other.segments())
    }

    pub fn resolve_str(&self, other: &str) -> BlobPath {
        let other = split_segments([other]);
        if other.is_empty() {
            return self.clone();
        }
        self.appended(&other)
    }

    pub fn resolve_sibling(&self, other: &BlobPath) -> BlobPath {
        match self.parent() {
            Some(parent) => parent.resolve(other),
            None => other.clone(),
        }
    }

    /// Relative path from `self` to `other`, computed on rendered strings.
    ///
    /// Fails when `other` does not render with `self` as a prefix.
    pub fn relativize(&self, other: &BlobPath) -> FsResult<BlobPath> {
        let base = self.render();
        let target = other.render();
        target
            .strip_prefix(base.as_str())
            .map(|rest| BlobPath::relative([rest]))
            .ok_or_else(|| {
                FsError::IllegalState(format!("{} is not a prefix of {}", base, target))
            })
    }

    /// String prefix test over rendered forms; segment boundaries are not
    /// enforced, so `/ab` starts with `/a`.
    pub fn starts_with(&self, other: &BlobPath) -> bool {
        self.render().starts_with(other.render().as_str())
    }

    /// Like [`BlobPath::starts_with`], with `other` parsed in this path's variant.
    pub fn starts_with_str(&self, other: &str) -> bool {
        self.starts_with(&self.derive(split_segments([other])))
    }

    /// String suffix test over rendered forms.
    pub fn ends_with(&self, other: &BlobPath) -> bool {
        self.render().ends_with(other.render().as_str())
    }

    /// Like [`BlobPath::ends_with`], with `other` parsed as a relative path.
    pub fn ends_with_str(&self, other: &str) -> bool {
        self.ends_with(&BlobPath::relative([other]))
    }

    pub fn normalize(&self) -> BlobPath {
        self.clone()
    }

    pub fn to_absolute(&self) -> FsResult<BlobPath> {
        match self {
            BlobPath::Absolute { .. } => Ok(self.clone()),
            BlobPath::Relative { .. } => Err(FsError::IllegalState(format!(
                "Relative path cannot be made absolute: {}",
                self
            ))),
        }
    }

    /// One single-segment relative path per segment, in order.
    pub fn iter(&self) -> impl Iterator<Item = BlobPath> + '_ {
        self.segments().iter().map(|segment| BlobPath::single(segment))
    }
}

fn validate_bucket(bucket: &str) -> FsResult<String> {
    let trimmed = bucket.trim();
    if trimmed.is_empty() || trimmed.contains(PATH_SEPARATOR) {
        return Err(FsError::IllegalPath(format!(
            "invalid bucket name '{}'",
            bucket
        )));
    }
    Ok(trimmed.to_string())
}

impl PartialEq for BlobPath {
    fn eq(&self, other: &Self) -> bool {
        self.is_absolute() == other.is_absolute() && self.segments() == other.segments()
    }
}

impl Eq for BlobPath {}

impl Hash for BlobPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.is_absolute().hash(state);
        self.render().hash(state);
    }
}

impl PartialOrd for BlobPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlobPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.render()
            .cmp(&other.render())
            .then_with(|| self.is_absolute().cmp(&other.is_absolute()))
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl<'a> IntoIterator for &'a BlobPath {
    type Item = BlobPath;
    type IntoIter = Box<dyn Iterator<Item = BlobPath> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsErrorKind;

    fn abs(parts: &[&str]) -> BlobPath {
        BlobPath::absolute("es-spl", parts.iter().copied()).unwrap()
    }

    #[test]
    fn test_split_discards_empty_and_blank_tokens() {
        let path = BlobPath::relative(["//a/ b /", "", "  ", "c//d"]);
        assert_eq!(path.segments(), &["a", "b", "c", "d"]);
        assert_eq!(path.render(), "/a/b/c/d");
    }

    #[test]
    fn test_absolute_render_and_bucket_key() {
        let path = abs(&["test", "test.pdf"]);
        assert_eq!(path.render(), "/es-spl/test/test.pdf");
        assert_eq!(path.bucket(), Some("es-spl"));
        assert_eq!(path.bucket_key().as_deref(), Some("test/test.pdf"));
        assert_eq!(path.name_count(), 3);

        let root = abs(&[""]);
        assert_eq!(root.render(), "/es-spl");
        assert_eq!(root.bucket_key().as_deref(), Some(""));
    }

    #[test]
    fn test_bucket_key_never_starts_with_bucket() {
        for raw in ["/es-spl/a", "es-spl/es-spl/a", "a/es-spl", "es-spl"] {
            let path = abs(&[raw]);
            let key = path.bucket_key().unwrap();
            assert_ne!(key.split('/').next(), Some("es-spl"), "{} -> {}", raw, key);
        }
    }

    #[test]
    fn test_render_parse_round_trip() {
        let paths = vec![
            abs(&["a/b/c"]),
            abs(&[""]),
            BlobPath::relative(["x", "y/z"]),
            BlobPath::relative([""]),
        ];
        for path in paths {
            let reparsed = match path.bucket() {
                Some(bucket) => BlobPath::absolute(bucket, [path.render()]).unwrap(),
                None => BlobPath::relative([path.render()]),
            };
            assert_eq!(reparsed.render(), path.render());
            assert_eq!(reparsed, path);
        }
    }

    #[test]
    fn test_invalid_bucket_is_rejected() {
        let err = BlobPath::absolute(" ", ["a"]).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::IllegalPath);
        let err = BlobPath::absolute("a/b", ["a"]).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::IllegalPath);
    }

    #[test]
    fn test_resolve_empty_is_identity() {
        let path = abs(&["test"]);
        assert_eq!(path.resolve_str("").render(), path.render());
        assert_eq!(path.resolve(&BlobPath::relative([""])), path);
    }

    #[test]
    fn test_resolve_appends_and_strips_bucket_duplicate() {
        let dir = abs(&["test"]);
        assert_eq!(dir.resolve_str("test.pdf").render(), "/es-spl/test/test.pdf");
        assert_eq!(dir.resolve_str("/es-spl/x").render(), "/es-spl/test/x");
        assert_eq!(
            dir.resolve(&abs(&["other"])).render(),
            "/es-spl/test/other"
        );
        assert!(dir.resolve_str("a").is_absolute());

        let rel = BlobPath::relative(["a"]);
        assert_eq!(rel.resolve_str("es-spl/b").render(), "/a/es-spl/b");
        assert!(!rel.resolve_str("b").is_absolute());
    }

    #[test]
    fn test_parent() {
        let path = abs(&["a/b/c"]);
        assert_eq!(path.parent().unwrap().render(), "/es-spl/a/b");
        assert_eq!(abs(&["a"]).parent().unwrap().render(), "/es-spl");

        let root = abs(&[""]);
        assert_eq!(root.parent(), Some(root.clone()));

        assert_eq!(
            BlobPath::relative(["a/b"]).parent(),
            Some(BlobPath::relative(["a"]))
        );
        assert_eq!(BlobPath::relative(["a"]).parent(), None);
        assert_eq!(BlobPath::relative([""]).parent(), None);
    }

    #[test]
    fn test_resolve_sibling() {
        let path = abs(&["docs/a.txt"]);
        assert_eq!(
            path.resolve_sibling(&BlobPath::relative(["b.txt"])).render(),
            "/es-spl/docs/b.txt"
        );
        let rel = BlobPath::relative(["a"]);
        assert_eq!(
            rel.resolve_sibling(&BlobPath::relative(["b"])),
            BlobPath::relative(["b"])
        );
    }

    #[test]
    fn test_relativize() {
        let base = abs(&["a"]);
        let child = abs(&["a/b/c"]);
        let rel = base.relativize(&child).unwrap();
        assert!(!rel.is_absolute());
        assert_eq!(rel.render(), "/b/c");

        let err = child.relativize(&base).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::IllegalState);
    }

    #[test]
    fn test_starts_and_ends_with_are_string_based() {
        let path = abs(&["ab/c"]);
        assert!(path.starts_with(&abs(&["a"])));
        assert!(path.starts_with_str("ab"));
        assert!(path.starts_with_str("a"));
        assert!(!path.starts_with_str("b"));

        assert!(path.ends_with_str("c"));
        assert!(path.ends_with_str("ab/c"));
        assert!(path.ends_with(&BlobPath::relative(["ab/c"])));
        assert!(!path.ends_with_str("d"));
    }

    #[test]
    fn test_iter_is_restartable() {
        let path = abs(&["x/y"]);
        let first: Vec<String> = path.iter().map(|p| p.render()).collect();
        let second: Vec<String> = (&path).into_iter().map(|p| p.render()).collect();
        assert_eq!(first, vec!["/es-spl", "/x", "/y"]);
        assert_eq!(first, second);
        assert!(path.iter().all(|p| !p.is_absolute() && p.name_count() == 1));
    }

    #[test]
    fn test_to_absolute() {
        let path = abs(&["a"]);
        assert_eq!(path.to_absolute().unwrap(), path);
        let err = BlobPath::relative(["a"]).to_absolute().unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::IllegalState);
    }

    #[test]
    fn test_name_and_subpath() {
        let path = abs(&["a/b/c"]);
        assert_eq!(path.name(0).unwrap().render(), "/es-spl");
        assert_eq!(path.name(3).unwrap().render(), "/c");
        assert_eq!(path.name(4).unwrap_err().kind(), FsErrorKind::InvalidArgument);
        assert_eq!(path.subpath(1, 3).unwrap().render(), "/a/b");
        assert!(path.subpath(2, 2).is_err());
        assert!(path.subpath(1, 5).is_err());
        assert_eq!(path.file_name().unwrap().render(), "/c");
        assert_eq!(BlobPath::relative([""]).file_name(), None);
    }

    #[test]
    fn test_root() {
        let path = abs(&["a/b"]);
        assert_eq!(path.root().unwrap().render(), "/es-spl");
        assert_eq!(BlobPath::relative(["a"]).root(), None);
    }

    #[test]
    fn test_equality_ignores_owner_but_not_variant() {
        let owned = BlobPath::owned_absolute("es-spl", FileSystemId::next(), ["a"]);
        assert_eq!(owned, abs(&["a"]));
        assert_ne!(BlobPath::relative(["es-spl/a"]), abs(&["a"]));
        assert_ne!(
            abs(&["a"]),
            BlobPath::absolute("other", ["a"]).unwrap()
        );
    }

    #[test]
    fn test_ordering_by_rendered_form() {
        let mut paths = vec![abs(&["b"]), abs(&["a/z"]), abs(&["a"])];
        paths.sort();
        let rendered: Vec<String> = paths.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["/es-spl/a", "/es-spl/a/z", "/es-spl/b"]);
    }
}
