use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::DomainId;
use crate::error::CoreError;
use crate::runtime::SyscallHandler;
use weir_contracts::is_supported_syscall;

/// A resolved registration: the callback plus the domain that owns its code.
#[derive(Clone)]
pub struct HandlerEntry {
    pub handler_domain: DomainId,
    pub callback: Arc<dyn SyscallHandler>,
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("handler_domain", &self.handler_domain)
            .finish_non_exhaustive()
    }
}

/// Per-interceptor-instance registration map, keyed by
/// (target domain, syscall number).
///
/// Each interceptor instance owns its table; independently running instances
/// cannot observe or corrupt each other's registrations. At most one entry
/// per key, last write wins.
#[derive(Default)]
pub struct HandlerTable {
    entries: BTreeMap<(DomainId, u32), HandlerEntry>,
}

impl HandlerTable {
    pub fn new() -> Self {
        HandlerTable {
            entries: BTreeMap::new(),
        }
    }

    pub fn register(
        &mut self,
        target: DomainId,
        nr: u32,
        handler_domain: DomainId,
        callback: Arc<dyn SyscallHandler>,
    ) -> Result<(), CoreError> {
        if !is_supported_syscall(nr) {
            return Err(CoreError::InvalidSyscall { nr });
        }
        self.entries.insert(
            (target, nr),
            HandlerEntry {
                handler_domain,
                callback,
            },
        );
        Ok(())
    }

    /// Remove a registration if present. Removing an absent key is a no-op,
    /// not an error; returns whether an entry existed.
    pub fn deregister(&mut self, target: DomainId, nr: u32) -> bool {
        self.entries.remove(&(target, nr)).is_some()
    }

    pub fn lookup(&self, target: DomainId, nr: u32) -> Option<&HandlerEntry> {
        self.entries.get(&(target, nr))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
