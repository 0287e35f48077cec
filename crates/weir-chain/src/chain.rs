use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{Context, Result};

use weir_core::{CoreError, DomainId, Invocation, Runtime, SyscallHandler, DEFAULT_ARENA_BYTES};

use crate::host::{DenyAllHost, HostInterface};
use crate::report::{RunReport, StageReport};
use crate::runtime::LocalRuntime;
use weir_contracts::WEIR_RUN_REPORT_SCHEMA_VERSION;

/// Where a stage sits: its own domain and its bring-up index (0 is the
/// outermost interceptor). Handlers capture this to forward from their own
/// position.
#[derive(Debug, Clone, Copy)]
pub struct StageCtx {
    pub domain: DomainId,
    pub index: usize,
}

/// One interposition layer. `prepare` runs to completion before the next
/// stage's domain is created; that ordering, not a delay, is what makes
/// preloaded state visible to the first interposed call.
pub trait Interceptor: Send {
    fn name(&self) -> &str;

    fn prepare(&mut self, _rt: &dyn Runtime, _ctx: &StageCtx) -> Result<()> {
        Ok(())
    }

    /// The handler set to install against the next stage's domain.
    fn handlers(&self, ctx: &StageCtx) -> Vec<(u32, Arc<dyn SyscallHandler>)>;
}

/// The cell program: runs in its own domain against `CellCtx` and returns
/// an exit status.
pub type CellProgram = Box<dyn FnOnce(&mut CellCtx) -> i32 + Send>;

/// The cell's view of the world: its arena and the syscall entry.
pub struct CellCtx {
    rt: Arc<LocalRuntime>,
    domain: DomainId,
}

impl CellCtx {
    pub fn domain(&self) -> DomainId {
        self.domain
    }

    pub fn poke(&self, addr: u64, data: &[u8]) -> Result<(), CoreError> {
        self.rt.memory().write_bytes(self.domain, addr, data)
    }

    pub fn peek(&self, addr: u64, len: usize) -> Result<Vec<u8>, CoreError> {
        self.rt.memory().read_bytes(self.domain, addr, len)
    }

    /// Place a NUL-terminated string at `addr` in the cell's arena.
    pub fn poke_cstr(&self, addr: u64, s: &str) -> Result<(), CoreError> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.poke(addr, &bytes)
    }

    pub fn syscall(&self, nr: u32, args: [u64; 6]) -> i32 {
        let inv = Invocation::from_caller(nr, self.domain, args);
        self.rt.syscall_from_cell(&inv)
    }
}

/// Supervisor for one chain: interceptor stages outermost-first around one
/// cell program.
pub struct Chain {
    stages: Vec<Box<dyn Interceptor>>,
    host: Box<dyn HostInterface>,
    arena_bytes: usize,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stages.len())
            .field("arena_bytes", &self.arena_bytes)
            .finish_non_exhaustive()
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    pub fn new() -> Self {
        Chain {
            stages: Vec::new(),
            host: Box::new(DenyAllHost),
            arena_bytes: DEFAULT_ARENA_BYTES,
        }
    }

    pub fn stage(mut self, interceptor: Box<dyn Interceptor>) -> Self {
        self.stages.push(interceptor);
        self
    }

    pub fn host(mut self, host: Box<dyn HostInterface>) -> Self {
        self.host = host;
        self
    }

    pub fn arena_bytes(mut self, bytes: usize) -> Self {
        self.arena_bytes = bytes;
        self
    }

    /// Bring the chain up stage by stage, run `cell` in its own domain, and
    /// report the composite outcome.
    ///
    /// Per stage: create its domain, run `prepare` to completion, create
    /// the next domain, and install the handler set against it before any
    /// of the next stage's code runs. The cell thread additionally blocks
    /// on an explicit ready signal until every registration is in place.
    pub fn run(mut self, cell: CellProgram) -> Result<RunReport> {
        let rt = Arc::new(LocalRuntime::new(self.host));
        let mut stage_reports = Vec::with_capacity(self.stages.len());

        let mut pending: Option<(usize, Vec<(u32, Arc<dyn SyscallHandler>)>, DomainId)> = None;

        for (index, stage) in self.stages.iter_mut().enumerate() {
            let domain = rt.create_stage_domain(self.arena_bytes);

            // The previous stage registers against this domain before any
            // of this stage's code runs.
            if let Some((prev_index, handlers, prev_domain)) = pending.take() {
                install(&rt, domain, prev_domain, &handlers)
                    .with_context(|| format!("register stage {prev_index} handlers"))?;
            }

            let ctx = StageCtx { domain, index };
            stage
                .prepare(rt.as_ref(), &ctx)
                .with_context(|| format!("prepare interceptor {:?}", stage.name()))?;

            let handlers = stage.handlers(&ctx);
            stage_reports.push(StageReport {
                name: stage.name().to_string(),
                domain: domain.raw(),
                handlers: handlers.len(),
            });
            pending = Some((index, handlers, domain));
        }

        let cell_domain = rt.create_cell_domain(self.arena_bytes);
        if let Some((prev_index, handlers, prev_domain)) = pending.take() {
            install(&rt, cell_domain, prev_domain, &handlers)
                .with_context(|| format!("register stage {prev_index} handlers"))?;
        }

        let (ready_tx, ready_rx) = mpsc::channel::<()>();
        let cell_rt = Arc::clone(&rt);
        let cell_thread = std::thread::spawn(move || {
            // Gate until the supervisor has finished every registration.
            let _ = ready_rx.recv();
            let mut ctx = CellCtx {
                rt: cell_rt,
                domain: cell_domain,
            };
            cell(&mut ctx)
        });

        ready_tx.send(()).ok();
        let cell_status = cell_thread
            .join()
            .map_err(|_| anyhow::anyhow!("cell thread panicked"))?;

        rt.reap_all();

        Ok(RunReport {
            schema_version: WEIR_RUN_REPORT_SCHEMA_VERSION.to_string(),
            stages: stage_reports,
            cell_status,
        })
    }
}

fn install(
    rt: &Arc<LocalRuntime>,
    target: DomainId,
    handler_domain: DomainId,
    handlers: &[(u32, Arc<dyn SyscallHandler>)],
) -> Result<()> {
    for (nr, callback) in handlers {
        rt.register(target, *nr, handler_domain, Arc::clone(callback))
            .map_err(|e| anyhow::anyhow!("register syscall {nr}: {e}"))?;
    }
    Ok(())
}
