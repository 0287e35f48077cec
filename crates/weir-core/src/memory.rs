use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::domain::DomainId;
use crate::error::CoreError;
use weir_contracts::{COPY_MODE_EXACT, COPY_MODE_TERMINATED};

/// Default arena size for a newly created domain.
pub const DEFAULT_ARENA_BYTES: usize = 1 << 20;

/// How the copy service treats the source bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Copy exactly the requested length, zero bytes included.
    Exact,
    /// Stop after the first zero byte; the terminator is transferred and
    /// counted. Used for string arguments.
    Terminated,
}

impl CopyMode {
    pub fn from_wire(raw: u64) -> Option<CopyMode> {
        match raw {
            COPY_MODE_EXACT => Some(CopyMode::Exact),
            COPY_MODE_TERMINATED => Some(CopyMode::Terminated),
            _ => None,
        }
    }

    pub fn wire(self) -> u64 {
        match self {
            CopyMode::Exact => COPY_MODE_EXACT,
            CopyMode::Terminated => COPY_MODE_TERMINATED,
        }
    }
}

/// One domain's private memory: a bounded byte arena.
///
/// Addresses are offsets into the arena. The tail of the arena doubles as a
/// staging scratch region growing downward; callbacks borrow from it while
/// marshaling and release it before returning, so a serialized interceptor
/// never observes scratch pressure across calls.
pub struct AddressSpace {
    id: DomainId,
    bytes: Vec<u8>,
    scratch_floor: usize,
}

impl AddressSpace {
    fn new(id: DomainId, capacity: usize) -> Self {
        AddressSpace {
            id,
            bytes: vec![0u8; capacity],
            scratch_floor: capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn checked_range(&self, addr: u64, len: usize) -> Result<std::ops::Range<usize>, CoreError> {
        let start = usize::try_from(addr).map_err(|_| CoreError::InvalidAddress {
            domain: self.id,
            addr,
            len,
        })?;
        let end = start.checked_add(len).filter(|end| *end <= self.bytes.len());
        match end {
            Some(end) => Ok(start..end),
            None => Err(CoreError::InvalidAddress {
                domain: self.id,
                addr,
                len,
            }),
        }
    }

    pub fn read(&self, addr: u64, len: usize) -> Result<&[u8], CoreError> {
        let range = self.checked_range(addr, len)?;
        Ok(&self.bytes[range])
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), CoreError> {
        let range = self.checked_range(addr, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub fn scratch_mark(&self) -> u64 {
        self.scratch_floor as u64
    }

    pub fn scratch_alloc(&mut self, len: usize) -> Result<u64, CoreError> {
        if len > self.scratch_floor {
            return Err(CoreError::BufferTooSmall {
                needed: len,
                capacity: self.scratch_floor,
            });
        }
        self.scratch_floor -= len;
        Ok(self.scratch_floor as u64)
    }

    pub fn scratch_release_to(&mut self, mark: u64) {
        let mark = usize::try_from(mark).unwrap_or(self.bytes.len());
        self.scratch_floor = mark.min(self.bytes.len());
    }
}

struct MemoryState {
    spaces: BTreeMap<DomainId, AddressSpace>,
    next_id: u64,
}

/// Registry of live address spaces, one per domain.
///
/// The copy service lives here: it is the only operation that touches two
/// domains at once, and it mutates destination memory only.
pub struct DomainMemory {
    state: Mutex<MemoryState>,
}

impl Default for DomainMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainMemory {
    pub fn new() -> Self {
        DomainMemory {
            state: Mutex::new(MemoryState {
                spaces: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    pub fn create_domain(&self, arena_bytes: usize) -> DomainId {
        let mut state = self.state.lock().expect("domain memory poisoned");
        let id = DomainId::from_raw(state.next_id);
        state.next_id += 1;
        state.spaces.insert(id, AddressSpace::new(id, arena_bytes));
        id
    }

    /// Tear down a terminated domain's arena. Returns false if the domain
    /// was not live.
    pub fn reap(&self, id: DomainId) -> bool {
        let mut state = self.state.lock().expect("domain memory poisoned");
        state.spaces.remove(&id).is_some()
    }

    pub fn is_live(&self, id: DomainId) -> bool {
        let state = self.state.lock().expect("domain memory poisoned");
        state.spaces.contains_key(&id)
    }

    pub fn read_bytes(&self, id: DomainId, addr: u64, len: usize) -> Result<Vec<u8>, CoreError> {
        let state = self.state.lock().expect("domain memory poisoned");
        let space = state
            .spaces
            .get(&id)
            .ok_or(CoreError::UnknownDomain { domain: id })?;
        space.read(addr, len).map(|bytes| bytes.to_vec())
    }

    pub fn write_bytes(&self, id: DomainId, addr: u64, data: &[u8]) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("domain memory poisoned");
        let space = state
            .spaces
            .get_mut(&id)
            .ok_or(CoreError::UnknownDomain { domain: id })?;
        space.write(addr, data)
    }

    pub fn scratch_mark(&self, id: DomainId) -> Result<u64, CoreError> {
        let state = self.state.lock().expect("domain memory poisoned");
        let space = state
            .spaces
            .get(&id)
            .ok_or(CoreError::UnknownDomain { domain: id })?;
        Ok(space.scratch_mark())
    }

    pub fn scratch_alloc(&self, id: DomainId, len: usize) -> Result<u64, CoreError> {
        let mut state = self.state.lock().expect("domain memory poisoned");
        let space = state
            .spaces
            .get_mut(&id)
            .ok_or(CoreError::UnknownDomain { domain: id })?;
        space.scratch_alloc(len)
    }

    pub fn scratch_release_to(&self, id: DomainId, mark: u64) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("domain memory poisoned");
        let space = state
            .spaces
            .get_mut(&id)
            .ok_or(CoreError::UnknownDomain { domain: id })?;
        space.scratch_release_to(mark);
        Ok(())
    }

    /// Move bytes between two domains' arenas.
    ///
    /// The source range of `max_len` bytes must be fully readable. In
    /// `Terminated` mode the transfer stops after the first zero byte (the
    /// terminator is written and counted); in `Exact` mode exactly `max_len`
    /// bytes move. Returns the number of bytes written to the destination.
    /// Synchronous; on error no destination byte has been written.
    pub fn copy(
        &self,
        src: DomainId,
        src_addr: u64,
        dst: DomainId,
        dst_addr: u64,
        max_len: usize,
        mode: CopyMode,
    ) -> Result<usize, CoreError> {
        let mut state = self.state.lock().expect("domain memory poisoned");

        let staged = {
            let src_space = state
                .spaces
                .get(&src)
                .ok_or(CoreError::UnknownDomain { domain: src })?;
            let bytes = src_space.read(src_addr, max_len)?;
            match mode {
                CopyMode::Exact => bytes.to_vec(),
                CopyMode::Terminated => match bytes.iter().position(|b| *b == 0) {
                    Some(idx) => bytes[..idx + 1].to_vec(),
                    None => bytes.to_vec(),
                },
            }
        };

        let dst_space = state
            .spaces
            .get_mut(&dst)
            .ok_or(CoreError::UnknownDomain { domain: dst })?;
        if staged.is_empty() {
            return Ok(0);
        }
        let dst_cap = dst_space.capacity();
        let dst_start = usize::try_from(dst_addr).unwrap_or(usize::MAX);
        if dst_start >= dst_cap {
            return Err(CoreError::InvalidAddress {
                domain: dst,
                addr: dst_addr,
                len: staged.len(),
            });
        }
        if dst_start.saturating_add(staged.len()) > dst_cap {
            return Err(CoreError::BufferTooSmall {
                needed: staged.len(),
                capacity: dst_cap - dst_start,
            });
        }
        dst_space.write(dst_addr, &staged)?;
        Ok(staged.len())
    }
}
