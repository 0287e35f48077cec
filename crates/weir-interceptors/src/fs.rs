use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use weir_chain::{Interceptor, StageCtx};
use weir_contracts::{SYS_CLOSE, SYS_FCNTL, SYS_LSEEK, SYS_OPEN, SYS_READ, SYS_WRITE};
use weir_core::{stage_in_exact, stage_in_str, stage_out, Invocation, Runtime, SyscallHandler};
use weir_imfs::{install_seeds, load_seed_manifest, Imfs, ImfsConfig};

use crate::PATH_STAGE_MAX;

/// Serves open/read/write/lseek/fcntl/close from a private in-memory
/// filesystem instead of the host.
///
/// Seed content is installed during `prepare`, which the chain runs to
/// completion before the cell's domain exists, so the first open a cell
/// issues already sees every preloaded object.
pub struct FsInterceptor {
    fs: Arc<Mutex<Imfs>>,
    seeds: Option<PathBuf>,
}

impl FsInterceptor {
    pub fn new(config: ImfsConfig) -> Self {
        FsInterceptor {
            fs: Arc::new(Mutex::new(Imfs::new(config))),
            seeds: None,
        }
    }

    pub fn with_seeds(mut self, manifest: PathBuf) -> Self {
        self.seeds = Some(manifest);
        self
    }

    /// Shared view of the storage engine, for teardown inspection.
    pub fn storage(&self) -> Arc<Mutex<Imfs>> {
        Arc::clone(&self.fs)
    }
}

impl Interceptor for FsInterceptor {
    fn name(&self) -> &str {
        "fs"
    }

    fn prepare(&mut self, _rt: &dyn Runtime, _ctx: &StageCtx) -> Result<()> {
        if let Some(manifest_path) = &self.seeds {
            let manifest = load_seed_manifest(manifest_path)?;
            let mut fs = self.fs.lock().expect("imfs poisoned");
            install_seeds(&mut fs, &manifest)
                .with_context(|| format!("install seeds from {}", manifest_path.display()))?;
        }
        Ok(())
    }

    fn handlers(&self, ctx: &StageCtx) -> Vec<(u32, Arc<dyn SyscallHandler>)> {
        let calls = Arc::new(FsCalls {
            fs: Arc::clone(&self.fs),
            ctx: *ctx,
        });
        [SYS_OPEN, SYS_READ, SYS_WRITE, SYS_LSEEK, SYS_FCNTL, SYS_CLOSE]
            .into_iter()
            .map(|nr| (nr, Arc::clone(&calls) as Arc<dyn SyscallHandler>))
            .collect()
    }
}

struct FsCalls {
    fs: Arc<Mutex<Imfs>>,
    ctx: StageCtx,
}

impl SyscallHandler for FsCalls {
    fn handle(&self, rt: &dyn Runtime, inv: &Invocation) -> i32 {
        match inv.nr {
            SYS_OPEN => self.open(rt, inv),
            SYS_READ => self.read(rt, inv),
            SYS_WRITE => self.write(rt, inv),
            SYS_LSEEK => self.lseek(inv),
            SYS_FCNTL => self.fcntl(inv),
            SYS_CLOSE => self.close(inv),
            _ => rt.forward(inv, self.ctx.index),
        }
    }
}

impl FsCalls {
    fn open(&self, rt: &dyn Runtime, inv: &Invocation) -> i32 {
        let path = match stage_in_str(rt, self.ctx.domain, inv.arg(0), PATH_STAGE_MAX) {
            Ok(bytes) => bytes,
            Err(e) => return e.errno(),
        };
        let path = String::from_utf8_lossy(&path).into_owned();
        let flags = inv.arg(1).value as i32;
        let mode = inv.arg(2).value as u32;

        let mut fs = self.fs.lock().expect("imfs poisoned");
        fs.open(&path, flags, mode).unwrap_or_else(|e| e.errno())
    }

    fn read(&self, rt: &dyn Runtime, inv: &Invocation) -> i32 {
        let fd = inv.arg(0).value as i32;
        let count = inv.arg(2).value as usize;

        let data = {
            let mut fs = self.fs.lock().expect("imfs poisoned");
            match fs.read(fd, count) {
                Ok(data) => data,
                Err(e) => return e.errno(),
            }
        };

        // A cell is allowed to probe with a null buffer; skip staging then.
        if inv.arg(1).value != 0 && !data.is_empty() {
            if let Err(e) = stage_out(rt, self.ctx.domain, &data, inv.arg(1)) {
                return e.errno();
            }
        }
        data.len() as i32
    }

    fn write(&self, rt: &dyn Runtime, inv: &Invocation) -> i32 {
        let fd = inv.arg(0).value as i32;
        let count = inv.arg(2).value as usize;

        // Standard streams are not ours to emulate.
        if (0..3).contains(&fd) {
            return rt.forward(inv, self.ctx.index);
        }

        let data = match stage_in_exact(rt, self.ctx.domain, inv.arg(1), count) {
            Ok(data) => data,
            Err(e) => return e.errno(),
        };

        let mut fs = self.fs.lock().expect("imfs poisoned");
        match fs.write(fd, &data) {
            Ok(n) => n as i32,
            Err(e) => e.errno(),
        }
    }

    fn lseek(&self, inv: &Invocation) -> i32 {
        let fd = inv.arg(0).value as i32;
        let offset = inv.arg(1).value as i64;
        let whence = inv.arg(2).value as i32;

        let mut fs = self.fs.lock().expect("imfs poisoned");
        match fs.lseek(fd, offset, whence) {
            Ok(pos) => pos as i32,
            Err(e) => e.errno(),
        }
    }

    fn fcntl(&self, inv: &Invocation) -> i32 {
        let fd = inv.arg(0).value as i32;
        let cmd = inv.arg(1).value as i32;
        let arg = inv.arg(2).value as i64;

        let mut fs = self.fs.lock().expect("imfs poisoned");
        fs.fcntl(fd, cmd, arg).unwrap_or_else(|e| e.errno())
    }

    fn close(&self, inv: &Invocation) -> i32 {
        let fd = inv.arg(0).value as i32;
        let mut fs = self.fs.lock().expect("imfs poisoned");
        fs.close(fd).unwrap_or_else(|e| e.errno())
    }
}
