use std::sync::Arc;

use weir_chain::{Interceptor, StageCtx};
use weir_contracts::{
    syscall_name, SYS_CLOSE, SYS_FCNTL, SYS_LSEEK, SYS_MMAP, SYS_OPEN, SYS_READ, SYS_WRITE,
};
use weir_core::{stage_in_str, Invocation, Runtime, SyscallHandler};

use crate::PATH_STAGE_MAX;

/// The set a bare `TraceInterceptor::default()` traces.
pub const DEFAULT_TRACE_SYSCALLS: &[u32] = &[
    SYS_OPEN, SYS_READ, SYS_WRITE, SYS_LSEEK, SYS_FCNTL, SYS_CLOSE, SYS_MMAP,
];

/// Logs every traced call to stderr as `NAME (args) = ret` and forwards it
/// with the original argument values. Argument slots carrying the unused
/// sentinel are elided; OPEN's path argument is staged so the trace shows
/// the string, while the forwarded call still carries the original
/// reference.
pub struct TraceInterceptor {
    syscalls: Vec<u32>,
}

impl Default for TraceInterceptor {
    fn default() -> Self {
        Self::new(DEFAULT_TRACE_SYSCALLS.to_vec())
    }
}

impl TraceInterceptor {
    pub fn new(syscalls: Vec<u32>) -> Self {
        TraceInterceptor { syscalls }
    }
}

impl Interceptor for TraceInterceptor {
    fn name(&self) -> &str {
        "trace"
    }

    fn handlers(&self, ctx: &StageCtx) -> Vec<(u32, Arc<dyn SyscallHandler>)> {
        let tracer = Arc::new(TraceCall { ctx: *ctx });
        self.syscalls
            .iter()
            .map(|nr| (*nr, Arc::clone(&tracer) as Arc<dyn SyscallHandler>))
            .collect()
    }
}

struct TraceCall {
    ctx: StageCtx,
}

impl SyscallHandler for TraceCall {
    fn handle(&self, rt: &dyn Runtime, inv: &Invocation) -> i32 {
        let ret = rt.forward(inv, self.ctx.index);
        eprintln!("{}", trace_line(rt, self.ctx, inv, ret));
        ret
    }
}

fn trace_line(rt: &dyn Runtime, ctx: StageCtx, inv: &Invocation, ret: i32) -> String {
    let name = syscall_name(inv.nr).unwrap_or("UNKNOWN");
    let mut rendered = Vec::new();
    for (i, slot) in inv.args.iter().enumerate() {
        if slot.is_unused() {
            continue;
        }
        if inv.nr == SYS_OPEN && i == 0 {
            match stage_in_str(rt, ctx.domain, *slot, PATH_STAGE_MAX) {
                Ok(path) => {
                    rendered.push(format!("{:?}", String::from_utf8_lossy(&path)));
                    continue;
                }
                Err(_) => {
                    // Fall back to the raw value if the path cannot be
                    // staged; tracing must never fail the call.
                }
            }
        }
        rendered.push(slot.value.to_string());
    }
    format!("{name} ({}) = {ret}", rendered.join(", "))
}
