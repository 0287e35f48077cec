/// Storage engine failures, one variant per contract error.
///
/// Converted to negated errnos at the syscall boundary so handler return
/// values follow the raw calling convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImfsError {
    /// The descriptor does not name a live handle, or the handle's access
    /// mode does not permit the operation.
    InvalidDescriptor { fd: i32 },
    /// No object for this path and no create flag was given.
    NotFound { path: String },
    /// Out-of-range argument (negative seek target, unknown whence).
    InvalidArgument { what: &'static str },
    /// fcntl command outside the supported set.
    NotSupported { cmd: i32 },
    /// The chunk arena cap would be exceeded; nothing was written.
    StorageExhausted { needed_chunks: usize },
}

impl ImfsError {
    pub fn errno(&self) -> i32 {
        match self {
            ImfsError::InvalidDescriptor { .. } => -libc::EBADF,
            ImfsError::NotFound { .. } => -libc::ENOENT,
            ImfsError::InvalidArgument { .. } => -libc::EINVAL,
            ImfsError::NotSupported { .. } => -libc::EOPNOTSUPP,
            ImfsError::StorageExhausted { .. } => -libc::ENOSPC,
        }
    }
}

impl std::fmt::Display for ImfsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImfsError::InvalidDescriptor { fd } => write!(f, "descriptor {fd} is not open"),
            ImfsError::NotFound { path } => write!(f, "no stored object at {path:?}"),
            ImfsError::InvalidArgument { what } => write!(f, "invalid argument: {what}"),
            ImfsError::NotSupported { cmd } => write!(f, "unsupported fcntl command {cmd}"),
            ImfsError::StorageExhausted { needed_chunks } => {
                write!(f, "chunk arena exhausted ({needed_chunks} chunks required)")
            }
        }
    }
}

impl std::error::Error for ImfsError {}
