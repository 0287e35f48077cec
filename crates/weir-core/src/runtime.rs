use std::sync::Arc;

use crate::domain::{ArgSlot, DomainId, Invocation};
use crate::error::CoreError;
use crate::memory::{CopyMode, DomainMemory};

/// A registered syscall callback.
///
/// The callback receives the raw invocation: the calling domain and six
/// value/owning-domain pairs. Interpretation is entirely its own: before
/// touching a reference argument's referent it must stage the bytes into its
/// own domain through the copy service, and it must stage output bytes back
/// before returning. A copy failure aborts the call with the copy error's
/// code; partial marshal-and-continue is not allowed.
///
/// Return convention: non-negative success value, negative negated errno.
pub trait SyscallHandler: Send + Sync {
    fn handle(&self, rt: &dyn Runtime, inv: &Invocation) -> i32;
}

/// The primitives an interceptor consumes from the runtime it is embedded
/// in. `weir-chain` provides the in-process reference implementation.
pub trait Runtime: Send + Sync {
    /// Install `callback` for `nr` issued by `target`. Last write wins.
    fn register(
        &self,
        target: DomainId,
        nr: u32,
        handler_domain: DomainId,
        callback: Arc<dyn SyscallHandler>,
    ) -> Result<(), CoreError>;

    /// The cross-domain copy service. Mutates destination memory only.
    fn copy(
        &self,
        src: DomainId,
        src_addr: u64,
        dst: DomainId,
        dst_addr: u64,
        max_len: usize,
        mode: CopyMode,
    ) -> Result<usize, CoreError>;

    /// Pass the call to the next interposition layer below `depth`, with the
    /// original (non-staged) argument values and owning-domain tags.
    fn forward(&self, inv: &Invocation, depth: usize) -> i32;

    /// Access to domain arenas. A callback uses this only for memory it
    /// owns; it models the interceptor's direct view of its own address
    /// space (cells use it the same way through their context).
    fn memory(&self) -> &DomainMemory;
}

struct ScratchGuard<'a> {
    mem: &'a DomainMemory,
    domain: DomainId,
    mark: u64,
}

impl<'a> ScratchGuard<'a> {
    fn take(mem: &'a DomainMemory, domain: DomainId) -> Result<Self, CoreError> {
        let mark = mem.scratch_mark(domain)?;
        Ok(ScratchGuard { mem, domain, mark })
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        let _ = self.mem.scratch_release_to(self.domain, self.mark);
    }
}

/// Stage exactly `len` bytes referenced by `src` into `own` domain memory
/// and return them. Binary payloads (read/write buffers).
pub fn stage_in_exact(
    rt: &dyn Runtime,
    own: DomainId,
    src: ArgSlot,
    len: usize,
) -> Result<Vec<u8>, CoreError> {
    let mem = rt.memory();
    let _guard = ScratchGuard::take(mem, own)?;
    let local = mem.scratch_alloc(own, len)?;
    let n = rt.copy(src.domain, src.value, own, local, len, CopyMode::Exact)?;
    mem.read_bytes(own, local, n)
}

/// Stage a zero-terminated string referenced by `src`, reading at most
/// `max_len` bytes. Returns the bytes before the terminator.
pub fn stage_in_str(
    rt: &dyn Runtime,
    own: DomainId,
    src: ArgSlot,
    max_len: usize,
) -> Result<Vec<u8>, CoreError> {
    let mem = rt.memory();
    let _guard = ScratchGuard::take(mem, own)?;
    let local = mem.scratch_alloc(own, max_len)?;
    let n = rt.copy(
        src.domain,
        src.value,
        own,
        local,
        max_len,
        CopyMode::Terminated,
    )?;
    let mut bytes = mem.read_bytes(own, local, n)?;
    if bytes.last() == Some(&0) {
        bytes.pop();
    }
    Ok(bytes)
}

/// Stage `bytes` out of `own` domain memory into the memory `dst` references.
pub fn stage_out(
    rt: &dyn Runtime,
    own: DomainId,
    bytes: &[u8],
    dst: ArgSlot,
) -> Result<usize, CoreError> {
    let mem = rt.memory();
    let _guard = ScratchGuard::take(mem, own)?;
    let local = mem.scratch_alloc(own, bytes.len())?;
    mem.write_bytes(own, local, bytes)?;
    rt.copy(
        own,
        local,
        dst.domain,
        dst.value,
        bytes.len(),
        CopyMode::Exact,
    )
}
