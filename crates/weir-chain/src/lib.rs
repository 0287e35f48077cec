//! Interceptor topology: chain bring-up, the in-process reference runtime,
//! and composite run reporting.
//!
//! A chain wraps one cell in an ordered sequence of interceptors. Each
//! stage finishes preparing and has its handlers registered against the
//! next stage's domain before that stage's code runs; the cell additionally
//! gates on an explicit ready signal, so no stage ever races bring-up.

mod chain;
mod host;
mod manifest;
mod report;
mod runtime;

pub use chain::{CellCtx, CellProgram, Chain, Interceptor, StageCtx};
pub use host::{DenyAllHost, HostInterface};
pub use manifest::{load_chain_manifest, ChainManifest, StageSpec};
pub use report::{RunReport, StageReport};
pub use runtime::LocalRuntime;
