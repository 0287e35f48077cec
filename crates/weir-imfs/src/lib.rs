//! In-memory file storage engine for filesystem-emulating interceptors.
//!
//! Content is held in bounded fixed-size chunks addressed through an arena,
//! never as one contiguous buffer, so large objects stay representable when
//! host memory is fragmented. Open handles are separate short-lived entities
//! over the stored objects; failed opens leave a line in an append-only
//! audit artifact.

mod arena;
mod audit;
mod error;
mod fs;
mod seed;

pub use arena::{ChunkArena, CHUNK_SIZE};
pub use audit::{AuditLog, DEFAULT_AUDIT_LOG};
pub use error::ImfsError;
pub use fs::{Imfs, ImfsConfig};
pub use seed::{install_seeds, load_seed_manifest, SeedFile, SeedManifest};
