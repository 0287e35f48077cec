use weir_contracts::ARG_UNUSED;

/// Identity of one isolated address space (a cell or an interceptor).
///
/// Unique while the domain is live; the value may be reused after the domain
/// has been reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomainId(u64);

impl DomainId {
    pub const fn from_raw(raw: u64) -> Self {
        DomainId(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One generic argument slot: an untyped 64-bit value plus the domain that
/// owns the memory it references. The domain tag is only meaningful when the
/// receiving callback treats the slot as a reference; for scalars it is
/// carried but ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSlot {
    pub value: u64,
    pub domain: DomainId,
}

impl ArgSlot {
    pub const fn new(value: u64, domain: DomainId) -> Self {
        ArgSlot { value, domain }
    }

    pub fn is_unused(&self) -> bool {
        self.value == ARG_UNUSED
    }
}

/// The unit the dispatcher operates on: syscall number, calling domain, and
/// six tagged argument slots.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub nr: u32,
    pub caller: DomainId,
    pub args: [ArgSlot; 6],
}

impl Invocation {
    pub fn new(nr: u32, caller: DomainId, args: [ArgSlot; 6]) -> Self {
        Invocation { nr, caller, args }
    }

    /// Build an invocation whose slots all reference the caller's own
    /// memory, the common case for calls issued by a cell.
    pub fn from_caller(nr: u32, caller: DomainId, values: [u64; 6]) -> Self {
        Invocation {
            nr,
            caller,
            args: values.map(|value| ArgSlot::new(value, caller)),
        }
    }

    pub fn arg(&self, index: usize) -> ArgSlot {
        self.args[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_caller_tags_every_slot_with_the_caller() {
        let cell = DomainId::from_raw(7);
        let inv = Invocation::from_caller(2, cell, [1, 2, 3, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED]);
        assert!(inv.args.iter().all(|a| a.domain == cell));
        assert!(inv.arg(3).is_unused());
        assert!(!inv.arg(0).is_unused());
    }
}
