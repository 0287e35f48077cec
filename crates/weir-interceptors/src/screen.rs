use std::sync::Arc;

use weir_chain::{Interceptor, StageCtx};
use weir_contracts::{SYS_EXECVE, SYS_OPEN};
use weir_core::{stage_in_str, Invocation, Runtime, SyscallHandler};

use crate::PATH_STAGE_MAX;

/// Prefix that marks a rejected path by default (the PE header magic).
pub const DEFAULT_MAGIC: &[u8] = b"MZ";

/// Rejects open/exec requests whose path argument starts with a configured
/// magic marker; everything else passes through untouched.
///
/// The path is staged out of the calling domain before inspection, so the
/// decision is made on a private copy, never on memory the caller could
/// still mutate.
pub struct ScreenInterceptor {
    magic: Vec<u8>,
    reject: i32,
}

impl Default for ScreenInterceptor {
    fn default() -> Self {
        Self::new(DEFAULT_MAGIC.to_vec())
    }
}

impl ScreenInterceptor {
    pub fn new(magic: Vec<u8>) -> Self {
        ScreenInterceptor {
            magic,
            reject: -libc::ENOEXEC,
        }
    }

    pub fn reject_with(mut self, code: i32) -> Self {
        self.reject = code;
        self
    }
}

impl Interceptor for ScreenInterceptor {
    fn name(&self) -> &str {
        "screen"
    }

    fn handlers(&self, ctx: &StageCtx) -> Vec<(u32, Arc<dyn SyscallHandler>)> {
        let screen = Arc::new(ScreenPath {
            magic: self.magic.clone(),
            reject: self.reject,
            ctx: *ctx,
        });
        vec![
            (SYS_OPEN, Arc::clone(&screen) as Arc<dyn SyscallHandler>),
            (SYS_EXECVE, screen),
        ]
    }
}

struct ScreenPath {
    magic: Vec<u8>,
    reject: i32,
    ctx: StageCtx,
}

impl SyscallHandler for ScreenPath {
    fn handle(&self, rt: &dyn Runtime, inv: &Invocation) -> i32 {
        let path = match stage_in_str(rt, self.ctx.domain, inv.arg(0), PATH_STAGE_MAX) {
            Ok(bytes) => bytes,
            Err(e) => return e.errno(),
        };
        if path.starts_with(&self.magic) {
            eprintln!(
                "[weir-screen] blocked {} of {:?} from domain {}",
                weir_contracts::syscall_name(inv.nr).unwrap_or("?"),
                String::from_utf8_lossy(&path),
                inv.caller
            );
            return self.reject;
        }
        rt.forward(inv, self.ctx.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_chain::Chain;
    use weir_contracts::ARG_UNUSED;

    #[test]
    fn magic_prefixed_paths_are_rejected_with_enoexec() {
        let report = Chain::new()
            .stage(Box::new(ScreenInterceptor::default()))
            .run(Box::new(|cell| {
                cell.poke_cstr(0, "MZprogram.exe").unwrap();
                let opened = cell.syscall(
                    SYS_OPEN,
                    [0, libc::O_RDONLY as u64, 0, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
                );
                assert_eq!(opened, -libc::ENOEXEC);
                cell.syscall(
                    SYS_EXECVE,
                    [0, 0, 0, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
                )
            }))
            .unwrap();
        assert_eq!(report.cell_status, -libc::ENOEXEC);
    }

    #[test]
    fn the_rejection_code_is_configurable() {
        let report = Chain::new()
            .stage(Box::new(
                ScreenInterceptor::new(b"#!".to_vec()).reject_with(-libc::EACCES),
            ))
            .run(Box::new(|cell| {
                cell.poke_cstr(0, "#!payload.sh").unwrap();
                cell.syscall(
                    SYS_OPEN,
                    [0, libc::O_RDONLY as u64, 0, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
                )
            }))
            .unwrap();
        assert_eq!(report.cell_status, -libc::EACCES);
    }

    #[test]
    fn clean_paths_are_forwarded() {
        struct OkHost;
        impl weir_chain::HostInterface for OkHost {
            fn call(&self, _inv: &Invocation) -> i32 {
                7
            }
        }

        let report = Chain::new()
            .stage(Box::new(ScreenInterceptor::default()))
            .host(Box::new(OkHost))
            .run(Box::new(|cell| {
                cell.poke_cstr(0, "plain.txt").unwrap();
                cell.syscall(
                    SYS_OPEN,
                    [0, libc::O_RDONLY as u64, 0, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
                )
            }))
            .unwrap();
        assert_eq!(report.cell_status, 7);
    }
}
