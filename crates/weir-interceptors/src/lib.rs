//! Ready-made interposition layers: syscall tracing, the in-memory
//! filesystem, and magic-prefix content screening.
//!
//! Each is an `Interceptor` for `weir-chain`; all argument marshaling goes
//! through the staging helpers so reference arguments are copied into the
//! layer's own domain before they are inspected.

mod fs;
mod screen;
mod trace;

pub use fs::FsInterceptor;
pub use screen::{ScreenInterceptor, DEFAULT_MAGIC};
pub use trace::{TraceInterceptor, DEFAULT_TRACE_SYSCALLS};

/// Longest path argument a handler will stage. Paths are staged with the
/// terminated copy mode, so shorter strings cost only their own length.
pub(crate) const PATH_STAGE_MAX: usize = 256;
