use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::{FsError, FsResult};

/// How a channel is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpenOption {
    Read,
    Write,
    Append,
    TruncateExisting,
    Create,
    CreateNew,
    DeleteOnClose,
}

impl FromStr for OpenOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(OpenOption::Read),
            "write" => Ok(OpenOption::Write),
            "append" => Ok(OpenOption::Append),
            "truncate_existing" => Ok(OpenOption::TruncateExisting),
            "create" => Ok(OpenOption::Create),
            "create_new" => Ok(OpenOption::CreateNew),
            "delete_on_close" => Ok(OpenOption::DeleteOnClose),
            _ => Err(format!("Unknown open option: {}", s)),
        }
    }
}

/// Set of [`OpenOption`]s for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions(BTreeSet<OpenOption>);

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pure read session: exactly `{Read}`.
    pub fn read_only() -> Self {
        Self::new().with(OpenOption::Read)
    }

    pub fn with(mut self, option: OpenOption) -> Self {
        self.0.insert(option);
        self
    }

    pub fn contains(&self, option: OpenOption) -> bool {
        self.0.contains(&option)
    }

    pub fn iter(&self) -> impl Iterator<Item = OpenOption> + '_ {
        self.0.iter().copied()
    }

    /// True when the set is exactly `{Read}`; such sessions never write back.
    pub fn is_read_only_session(&self) -> bool {
        self.0.len() == 1 && self.contains(OpenOption::Read)
    }

    pub fn is_writable(&self) -> bool {
        self.contains(OpenOption::Write) || self.contains(OpenOption::Append)
    }

    /// Reading is allowed with `Read`, or by default when nothing asks for writing.
    pub fn is_readable(&self) -> bool {
        self.contains(OpenOption::Read) || !self.is_writable()
    }

    pub fn creates(&self) -> bool {
        self.contains(OpenOption::Create) || self.contains(OpenOption::CreateNew)
    }

    /// Whether a session with these options may change the store.
    pub fn mutates(&self) -> bool {
        !self.is_read_only_session()
    }

    pub(crate) fn validate(&self) -> FsResult<()> {
        if self.contains(OpenOption::Append) && self.contains(OpenOption::Read) {
            return Err(FsError::InvalidArgument(
                "Append may not be combined with Read".to_string(),
            ));
        }
        if self.contains(OpenOption::Append) && self.contains(OpenOption::TruncateExisting) {
            return Err(FsError::InvalidArgument(
                "Append may not be combined with TruncateExisting".to_string(),
            ));
        }
        Ok(())
    }
}

impl FromIterator<OpenOption> for OpenOptions {
    fn from_iter<T: IntoIterator<Item = OpenOption>>(iter: T) -> Self {
        OpenOptions(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[OpenOption; N]> for OpenOptions {
    fn from(options: [OpenOption; N]) -> Self {
        options.into_iter().collect()
    }
}

/// Options for copy and move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyOption {
    /// Overwrite an existing target.
    ReplaceExisting,
    /// Carry content type and user metadata over to the target.
    CopyAttributes,
    /// Requires an atomic move, which an object store cannot provide.
    AtomicMove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    Execute,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_session_is_exactly_read() {
        assert!(OpenOptions::read_only().is_read_only_session());
        assert!(!OpenOptions::from([OpenOption::Read, OpenOption::Create]).is_read_only_session());
        assert!(!OpenOptions::new().is_read_only_session());
    }

    #[test]
    fn test_readable_and_writable() {
        let create_only = OpenOptions::from([OpenOption::Create]);
        assert!(create_only.is_readable());
        assert!(!create_only.is_writable());

        let write = OpenOptions::from([OpenOption::Write]);
        assert!(write.is_writable());
        assert!(!write.is_readable());

        let both = OpenOptions::from([OpenOption::Read, OpenOption::Write]);
        assert!(both.is_readable() && both.is_writable());
    }

    #[test]
    fn test_validate_rejects_append_conflicts() {
        assert!(OpenOptions::from([OpenOption::Append, OpenOption::Read])
            .validate()
            .is_err());
        assert!(OpenOptions::from([OpenOption::Append, OpenOption::TruncateExisting])
            .validate()
            .is_err());
        assert!(OpenOptions::from([OpenOption::Append, OpenOption::Create])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_parse_open_option() {
        assert_eq!("create_new".parse::<OpenOption>(), Ok(OpenOption::CreateNew));
        assert_eq!("READ".parse::<OpenOption>(), Ok(OpenOption::Read));
        assert!("sync".parse::<OpenOption>().is_err());
    }
}
