use std::fmt;
use std::io;

/// Failure reported by the object-store client behind [`crate::store::BlobStore`].
///
/// These are passed through to callers unmodified inside [`FsError::Transport`];
/// nothing in this crate retries them.
#[derive(Debug)]
pub enum StoreError {
    /// The endpoint could not be reached.
    Connection(String),
    /// The credentials were rejected.
    Auth(String),
    /// The store answered with an error status.
    Remote { status: u16, message: String },
    /// Local I/O performed by the client failed.
    Io(io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connection(msg) => write!(f, "connection failed: {}", msg),
            StoreError::Auth(msg) => write!(f, "authentication failed: {}", msg),
            StoreError::Remote { status, message } => {
                write!(f, "remote error {}: {}", status, message)
            }
            StoreError::Io(e) => write!(f, "client I/O error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// Inspectable category of an [`FsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsErrorKind {
    NotFound,
    AlreadyExists,
    IllegalPath,
    Unsupported,
    IllegalState,
    UnknownAttribute,
    InvalidArgument,
    ReadOnly,
    Closed,
    Transport,
    Io,
}

/// Error type for every filesystem-level operation.
#[derive(Debug)]
pub enum FsError {
    NotFound(String),
    AlreadyExists(String),
    IllegalPath(String),
    Unsupported(String),
    IllegalState(String),
    UnknownAttribute { view: String, name: String },
    InvalidArgument(String),
    ReadOnly(String),
    Closed(String),
    Transport(StoreError),
    Io(io::Error),
}

impl FsError {
    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsError::NotFound(_) => FsErrorKind::NotFound,
            FsError::AlreadyExists(_) => FsErrorKind::AlreadyExists,
            FsError::IllegalPath(_) => FsErrorKind::IllegalPath,
            FsError::Unsupported(_) => FsErrorKind::Unsupported,
            FsError::IllegalState(_) => FsErrorKind::IllegalState,
            FsError::UnknownAttribute { .. } => FsErrorKind::UnknownAttribute,
            FsError::InvalidArgument(_) => FsErrorKind::InvalidArgument,
            FsError::ReadOnly(_) => FsErrorKind::ReadOnly,
            FsError::Closed(_) => FsErrorKind::Closed,
            FsError::Transport(_) => FsErrorKind::Transport,
            FsError::Io(_) => FsErrorKind::Io,
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::NotFound(path) => write!(f, "Object {} does not exist", path),
            FsError::AlreadyExists(path) => write!(f, "Object {} already exists", path),
            FsError::IllegalPath(msg) => write!(f, "Illegal path: {}", msg),
            FsError::Unsupported(what) => write!(f, "Unsupported operation: {}", what),
            FsError::IllegalState(msg) => write!(f, "Illegal state: {}", msg),
            FsError::UnknownAttribute { view, name } => {
                write!(f, "No attribute {} found at {} view", name, view)
            }
            FsError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            FsError::ReadOnly(msg) => write!(f, "Read-only filesystem: {}", msg),
            FsError::Closed(what) => write!(f, "{} is closed", what),
            FsError::Transport(e) => write!(f, "Object store failure: {}", e),
            FsError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::Transport(e) => Some(e),
            FsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for FsError {
    fn from(e: StoreError) -> Self {
        FsError::Transport(e)
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        FsError::Io(e)
    }
}

impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        let kind = match e.kind() {
            FsErrorKind::NotFound => io::ErrorKind::NotFound,
            FsErrorKind::AlreadyExists => io::ErrorKind::AlreadyExists,
            FsErrorKind::ReadOnly => io::ErrorKind::PermissionDenied,
            FsErrorKind::InvalidArgument => io::ErrorKind::InvalidInput,
            FsErrorKind::Io => {
                if let FsError::Io(inner) = e {
                    return inner;
                }
                io::ErrorKind::Other
            }
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

pub type FsResult<T> = Result<T, FsError>;
