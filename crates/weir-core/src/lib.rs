//! Interposition core: domain identities, the cross-domain copy service,
//! per-interceptor handler tables, and the dispatch entry point.
//!
//! An interceptor sits between an isolated cell and whatever runs beneath it,
//! registers typed callbacks for individual syscalls, and services or
//! forwards each interposed call. This crate defines those contracts and the
//! address-space plumbing they marshal bytes through; the chain runtime that
//! embeds them lives in `weir-chain`.

mod dispatch;
mod domain;
mod error;
mod memory;
mod runtime;
mod table;

pub use dispatch::dispatch;
pub use domain::{ArgSlot, DomainId, Invocation};
pub use error::CoreError;
pub use memory::{AddressSpace, CopyMode, DomainMemory, DEFAULT_ARENA_BYTES};
pub use runtime::{stage_in_exact, stage_in_str, stage_out, Runtime, SyscallHandler};
pub use table::{HandlerEntry, HandlerTable};
