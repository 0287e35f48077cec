use crate::domain::DomainId;

/// Failures of the copy service, the handler table, and domain bookkeeping.
///
/// Every variant maps onto a negated errno so results can flow back through
/// the raw `i32` syscall calling convention unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// An address range does not lie inside its domain's arena.
    InvalidAddress {
        domain: DomainId,
        addr: u64,
        len: usize,
    },
    /// The destination cannot hold the bytes to transfer.
    BufferTooSmall { needed: usize, capacity: usize },
    /// Registration attempted for a syscall number outside the supported set.
    InvalidSyscall { nr: u32 },
    /// No live domain with this id.
    UnknownDomain { domain: DomainId },
}

impl CoreError {
    /// Negated errno for the raw calling convention.
    pub fn errno(&self) -> i32 {
        match self {
            CoreError::InvalidAddress { .. } | CoreError::UnknownDomain { .. } => -libc::EFAULT,
            CoreError::BufferTooSmall { .. } => -libc::ENOBUFS,
            CoreError::InvalidSyscall { .. } => -libc::ENOSYS,
        }
    }
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidAddress { domain, addr, len } => {
                write!(
                    f,
                    "address range {addr:#x}+{len} is not valid in domain {domain}"
                )
            }
            CoreError::BufferTooSmall { needed, capacity } => {
                write!(f, "destination holds {capacity} bytes, {needed} required")
            }
            CoreError::InvalidSyscall { nr } => {
                write!(f, "syscall {nr} is outside the supported set")
            }
            CoreError::UnknownDomain { domain } => write!(f, "no live domain {domain}"),
        }
    }
}

impl std::error::Error for CoreError {}
