//! Shared, version-pinned protocol identifiers for the weir interposition
//! framework.
//!
//! These constants are the single source of truth for the supported syscall
//! set, the cross-domain copy wire values, and the schema/version strings
//! that appear in machine-readable I/O.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

pub const WEIR_CHAIN_MANIFEST_SCHEMA_VERSION: &str = "weir.chain.manifest@0.1.0";
pub const WEIR_SEED_MANIFEST_SCHEMA_VERSION: &str = "weir.seed.manifest@0.1.0";
pub const WEIR_RUN_REPORT_SCHEMA_VERSION: &str = "weir.run.report@0.1.0";

pub const ENV_SEEDS: &str = "WEIR_SEEDS";
pub const ENV_AUDIT_LOG: &str = "WEIR_AUDIT_LOG";

/// Sentinel an interposed call carries in argument slots the syscall does
/// not use. Trace output elides these slots.
pub const ARG_UNUSED: u64 = 0xdead_beef_dead_beef;

/// Fixed failure value the dispatcher returns for an unresolved callback.
pub const DISPATCH_UNRESOLVED: i32 = -1;

// Interposable syscall numbers. The set is fixed: registration for a number
// outside this table is a contract violation, not a passthrough.
pub const SYS_READ: u32 = 0;
pub const SYS_WRITE: u32 = 1;
pub const SYS_OPEN: u32 = 2;
pub const SYS_CLOSE: u32 = 3;
pub const SYS_STAT: u32 = 4;
pub const SYS_FSTAT: u32 = 5;
pub const SYS_POLL: u32 = 7;
pub const SYS_LSEEK: u32 = 8;
pub const SYS_MMAP: u32 = 9;
pub const SYS_MPROTECT: u32 = 10;
pub const SYS_MUNMAP: u32 = 11;
pub const SYS_BRK: u32 = 12;
pub const SYS_IOCTL: u32 = 16;
pub const SYS_PREAD: u32 = 17;
pub const SYS_PWRITE: u32 = 18;
pub const SYS_ACCESS: u32 = 21;
pub const SYS_PIPE: u32 = 22;
pub const SYS_DUP: u32 = 32;
pub const SYS_DUP2: u32 = 33;
pub const SYS_GETPID: u32 = 39;
pub const SYS_EXECVE: u32 = 59;
pub const SYS_EXIT: u32 = 60;
pub const SYS_FCNTL: u32 = 72;

static SYSCALL_NAMES: Lazy<BTreeMap<u32, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        (SYS_READ, "READ"),
        (SYS_WRITE, "WRITE"),
        (SYS_OPEN, "OPEN"),
        (SYS_CLOSE, "CLOSE"),
        (SYS_STAT, "STAT"),
        (SYS_FSTAT, "FSTAT"),
        (SYS_POLL, "POLL"),
        (SYS_LSEEK, "LSEEK"),
        (SYS_MMAP, "MMAP"),
        (SYS_MPROTECT, "MPROTECT"),
        (SYS_MUNMAP, "MUNMAP"),
        (SYS_BRK, "BRK"),
        (SYS_IOCTL, "IOCTL"),
        (SYS_PREAD, "PREAD"),
        (SYS_PWRITE, "PWRITE"),
        (SYS_ACCESS, "ACCESS"),
        (SYS_PIPE, "PIPE"),
        (SYS_DUP, "DUP"),
        (SYS_DUP2, "DUP2"),
        (SYS_GETPID, "GETPID"),
        (SYS_EXECVE, "EXECVE"),
        (SYS_EXIT, "EXIT"),
        (SYS_FCNTL, "FCNTL"),
    ])
});

static SYSCALL_NUMBERS: Lazy<BTreeMap<&'static str, u32>> = Lazy::new(|| {
    SYSCALL_NAMES.iter().map(|(nr, name)| (*name, *nr)).collect()
});

pub fn is_supported_syscall(nr: u32) -> bool {
    SYSCALL_NAMES.contains_key(&nr)
}

pub fn syscall_name(nr: u32) -> Option<&'static str> {
    SYSCALL_NAMES.get(&nr).copied()
}

/// Reverse lookup by the canonical upper-case name.
pub fn syscall_number(name: &str) -> Option<u32> {
    SYSCALL_NUMBERS.get(name).copied()
}

/// Wire values for the cross-domain copy mode.
///
/// `EXACT` copies exactly the requested length; `TERMINATED` stops after the
/// first zero byte (string arguments).
pub const COPY_MODE_EXACT: u64 = 0;
pub const COPY_MODE_TERMINATED: u64 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_set_matches_name_table() {
        assert!(is_supported_syscall(SYS_OPEN));
        assert!(is_supported_syscall(SYS_FCNTL));
        assert!(!is_supported_syscall(6));
        assert!(!is_supported_syscall(10_000));
    }

    #[test]
    fn names_resolve_for_the_fs_set() {
        assert_eq!(syscall_name(SYS_OPEN), Some("OPEN"));
        assert_eq!(syscall_name(SYS_LSEEK), Some("LSEEK"));
        assert_eq!(syscall_name(999), None);
    }

    #[test]
    fn name_lookup_round_trips() {
        assert_eq!(syscall_number("OPEN"), Some(SYS_OPEN));
        assert_eq!(syscall_number("open"), None);
        for (nr, name) in SYSCALL_NAMES.iter() {
            assert_eq!(syscall_number(name), Some(*nr));
        }
    }
}
