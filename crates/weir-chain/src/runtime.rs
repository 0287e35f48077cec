use std::sync::{Arc, Mutex};

use weir_core::{
    dispatch, CopyMode, CoreError, DomainId, DomainMemory, HandlerTable, Invocation, Runtime,
    SyscallHandler,
};

use crate::host::HostInterface;

struct RuntimeState {
    /// One handler table per interceptor instance, keyed by its domain.
    tables: std::collections::BTreeMap<DomainId, HandlerTable>,
    /// Interceptor domains in bring-up order, outermost first.
    stages: Vec<DomainId>,
    cell: Option<DomainId>,
}

/// In-process embedding of the interposition core for one chain.
///
/// Owns the domain arenas, the per-interceptor handler tables and the host
/// terminal. Distinct chains get distinct runtimes and share nothing, so
/// registrations in one can never be observed from another.
pub struct LocalRuntime {
    memory: DomainMemory,
    state: Mutex<RuntimeState>,
    host: Box<dyn HostInterface>,
}

impl LocalRuntime {
    pub fn new(host: Box<dyn HostInterface>) -> Self {
        LocalRuntime {
            memory: DomainMemory::new(),
            state: Mutex::new(RuntimeState {
                tables: std::collections::BTreeMap::new(),
                stages: Vec::new(),
                cell: None,
            }),
            host,
        }
    }

    pub fn create_stage_domain(&self, arena_bytes: usize) -> DomainId {
        let id = self.memory.create_domain(arena_bytes);
        let mut state = self.state.lock().expect("runtime state poisoned");
        state.stages.push(id);
        id
    }

    pub fn create_cell_domain(&self, arena_bytes: usize) -> DomainId {
        let id = self.memory.create_domain(arena_bytes);
        let mut state = self.state.lock().expect("runtime state poisoned");
        state.cell = Some(id);
        id
    }

    pub fn reap_all(&self) {
        let mut state = self.state.lock().expect("runtime state poisoned");
        for id in state.stages.drain(..) {
            self.memory.reap(id);
        }
        if let Some(cell) = state.cell.take() {
            self.memory.reap(cell);
        }
        state.tables.clear();
    }

    /// Route a call issued by `origin` to the nearest enclosing layer that
    /// registered for it, or to the host terminal when none claims it.
    ///
    /// A layer that did not register the syscall is transparent: the call
    /// escapes past it unchanged, as if that layer had issued it, and the
    /// next layer out gets a chance to claim it. Argument values and
    /// owning-domain tags are never rewritten along the way.
    fn route(&self, origin: DomainId, inv: &Invocation) -> i32 {
        let mut origin = origin;
        loop {
            let resolved = {
                let state = self.state.lock().expect("runtime state poisoned");
                match parent_of(&state, origin) {
                    Some(parent) => Some((
                        parent,
                        state
                            .tables
                            .get(&parent)
                            .and_then(|table| table.lookup(origin, inv.nr))
                            .cloned(),
                    )),
                    None => None,
                }
            };
            match resolved {
                Some((_, Some(entry))) => return dispatch(Some(&entry), self, inv),
                Some((parent, None)) => origin = parent,
                None => return self.host.call(inv),
            }
        }
    }

    /// Entry for calls issued by the cell itself.
    pub fn syscall_from_cell(&self, inv: &Invocation) -> i32 {
        self.route(inv.caller, inv)
    }
}

fn parent_of(state: &RuntimeState, origin: DomainId) -> Option<DomainId> {
    if state.cell == Some(origin) {
        return state.stages.last().copied();
    }
    let idx = state.stages.iter().position(|d| *d == origin)?;
    if idx == 0 {
        None
    } else {
        Some(state.stages[idx - 1])
    }
}

impl Runtime for LocalRuntime {
    fn register(
        &self,
        target: DomainId,
        nr: u32,
        handler_domain: DomainId,
        callback: Arc<dyn SyscallHandler>,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("runtime state poisoned");
        state
            .tables
            .entry(handler_domain)
            .or_default()
            .register(target, nr, handler_domain, callback)
    }

    fn copy(
        &self,
        src: DomainId,
        src_addr: u64,
        dst: DomainId,
        dst_addr: u64,
        max_len: usize,
        mode: CopyMode,
    ) -> Result<usize, CoreError> {
        self.memory.copy(src, src_addr, dst, dst_addr, max_len, mode)
    }

    /// Continue a call past the interceptor at `depth` (its bring-up
    /// index): the call is re-routed as issued by that interceptor, with
    /// the original caller and owning-domain tags untouched.
    fn forward(&self, inv: &Invocation, depth: usize) -> i32 {
        let issuer = {
            let state = self.state.lock().expect("runtime state poisoned");
            state.stages.get(depth).copied()
        };
        match issuer {
            Some(issuer) => self.route(issuer, inv),
            None => self.host.call(inv),
        }
    }

    fn memory(&self) -> &DomainMemory {
        &self.memory
    }
}
