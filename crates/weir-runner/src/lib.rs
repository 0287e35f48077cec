//! Assembly of chains from manifests plus the built-in cell scenarios the
//! runner binary can execute against them.

use std::path::PathBuf;

use anyhow::{Context, Result};

use weir_chain::{CellProgram, Chain, ChainManifest, RunReport, StageSpec};
use weir_contracts::{syscall_number, ARG_UNUSED, SYS_CLOSE, SYS_OPEN, SYS_READ, SYS_WRITE};
use weir_imfs::ImfsConfig;
use weir_interceptors::{FsInterceptor, ScreenInterceptor, TraceInterceptor};

/// Command-line / environment values that take precedence over per-stage
/// manifest fields.
#[derive(Debug, Default, Clone)]
pub struct RunnerOverrides {
    pub seeds: Option<PathBuf>,
    pub audit_log: Option<PathBuf>,
}

/// Map a manifest onto a concrete chain of interceptors.
pub fn build_chain(manifest: &ChainManifest, overrides: &RunnerOverrides) -> Result<Chain> {
    let mut chain = Chain::new();
    for spec in &manifest.stages {
        chain = chain.stage(build_stage(spec, overrides)?);
    }
    Ok(chain)
}

fn build_stage(
    spec: &StageSpec,
    overrides: &RunnerOverrides,
) -> Result<Box<dyn weir_chain::Interceptor>> {
    match spec.interceptor.as_str() {
        "trace" => {
            let numbers = match &spec.syscalls {
                Some(names) => names
                    .iter()
                    .map(|name| {
                        syscall_number(name)
                            .with_context(|| format!("unknown syscall name {name:?}"))
                    })
                    .collect::<Result<Vec<u32>>>()?,
                None => weir_interceptors::DEFAULT_TRACE_SYSCALLS.to_vec(),
            };
            Ok(Box::new(TraceInterceptor::new(numbers)))
        }
        "fs" => {
            let mut config = ImfsConfig {
                max_chunks: spec.max_chunks,
                ..ImfsConfig::default()
            };
            if let Some(audit) = overrides.audit_log.clone().or_else(|| spec.audit_log.clone()) {
                config.audit_log = audit;
            }
            let mut fs = FsInterceptor::new(config);
            if let Some(seeds) = overrides.seeds.clone().or_else(|| spec.seeds.clone()) {
                fs = fs.with_seeds(seeds);
            }
            Ok(Box::new(fs))
        }
        "screen" => {
            let magic = spec
                .magic
                .as_ref()
                .map(|m| m.as_bytes().to_vec())
                .unwrap_or_else(|| weir_interceptors::DEFAULT_MAGIC.to_vec());
            Ok(Box::new(ScreenInterceptor::new(magic)))
        }
        other => anyhow::bail!("unknown interceptor kind {other:?}"),
    }
}

/// Resolve a built-in cell scenario by name.
pub fn cell_program(name: &str) -> Result<CellProgram> {
    match name {
        "fs-check" => Ok(Box::new(fs_check_cell)),
        "screen-check" => Ok(Box::new(screen_check_cell)),
        other => anyhow::bail!("unknown cell scenario {other:?}"),
    }
}

pub fn run_manifest(manifest: &ChainManifest, overrides: &RunnerOverrides) -> Result<RunReport> {
    let chain = build_chain(manifest, overrides)?;
    let cell = cell_program(&manifest.cell)?;
    chain.run(cell)
}

/// Create a file, write "Hello", reopen it read-only, read it back, compare.
/// Returns 0 when every step behaves, 1 at the first deviation.
fn fs_check_cell(cell: &mut weir_chain::CellCtx) -> i32 {
    const PATH_ADDR: u64 = 0;
    const WRITE_ADDR: u64 = 512;
    const READ_ADDR: u64 = 1024;

    if cell.poke_cstr(PATH_ADDR, "testfile.txt").is_err() {
        return 1;
    }

    let fd = cell.syscall(
        SYS_OPEN,
        [
            PATH_ADDR,
            (libc::O_CREAT | libc::O_RDWR | libc::O_TRUNC) as u64,
            0o644,
            ARG_UNUSED,
            ARG_UNUSED,
            ARG_UNUSED,
        ],
    );
    if fd < 0 {
        eprintln!("FAIL: open create returned {fd}");
        return 1;
    }

    if cell.poke(WRITE_ADDR, b"Hello").is_err() {
        return 1;
    }
    let wrote = cell.syscall(
        SYS_WRITE,
        [fd as u64, WRITE_ADDR, 5, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
    );
    if wrote != 5 {
        eprintln!("FAIL: write returned {wrote}");
        return 1;
    }

    let closed = cell.syscall(
        SYS_CLOSE,
        [fd as u64, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
    );
    if closed != 0 {
        eprintln!("FAIL: close after write returned {closed}");
        return 1;
    }

    let fd = cell.syscall(
        SYS_OPEN,
        [PATH_ADDR, libc::O_RDONLY as u64, 0, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
    );
    if fd < 0 {
        eprintln!("FAIL: open readonly returned {fd}");
        return 1;
    }

    let got = cell.syscall(
        SYS_READ,
        [fd as u64, READ_ADDR, 5, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
    );
    if got != 5 {
        eprintln!("FAIL: read returned {got}");
        return 1;
    }
    match cell.peek(READ_ADDR, 5) {
        Ok(bytes) if bytes == b"Hello" => {}
        Ok(bytes) => {
            eprintln!("FAIL: data mismatch ({:?})", String::from_utf8_lossy(&bytes));
            return 1;
        }
        Err(_) => return 1,
    }

    let closed = cell.syscall(
        SYS_CLOSE,
        [fd as u64, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
    );
    if closed != 0 {
        eprintln!("FAIL: close after read returned {closed}");
        return 1;
    }

    0
}

/// Open a magic-prefixed path and expect the screen to reject it.
fn screen_check_cell(cell: &mut weir_chain::CellCtx) -> i32 {
    if cell.poke_cstr(0, "MZblocked.bin").is_err() {
        return 1;
    }
    let ret = cell.syscall(
        SYS_OPEN,
        [0, libc::O_RDONLY as u64, 0, ARG_UNUSED, ARG_UNUSED, ARG_UNUSED],
    );
    if ret == -libc::ENOEXEC {
        0
    } else {
        eprintln!("FAIL: screened open returned {ret}");
        1
    }
}
