use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::arena::{ChunkArena, CHUNK_SIZE};
use crate::audit::{AuditLog, DEFAULT_AUDIT_LOG};
use crate::error::ImfsError;

const FIRST_FD: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    fn from_flags(flags: i32) -> Access {
        match flags & libc::O_ACCMODE {
            libc::O_WRONLY => Access::WriteOnly,
            libc::O_RDWR => Access::ReadWrite,
            _ => Access::ReadOnly,
        }
    }

    fn readable(self) -> bool {
        !matches!(self, Access::WriteOnly)
    }

    fn writable(self) -> bool {
        !matches!(self, Access::ReadOnly)
    }

    fn flag_bits(self) -> i32 {
        match self {
            Access::ReadOnly => libc::O_RDONLY,
            Access::WriteOnly => libc::O_WRONLY,
            Access::ReadWrite => libc::O_RDWR,
        }
    }
}

/// One stored object: stable path, logical length, ordered chunk indices.
/// Independent of any handle; retained after the last close.
struct FileNode {
    path: String,
    len: u64,
    chunks: Vec<u32>,
}

/// One open handle over a node. Short-lived; destroyed by close.
struct OpenFile {
    node: usize,
    offset: u64,
    access: Access,
    append: bool,
    fd_flags: i32,
}

pub struct ImfsConfig {
    /// Cap on live content chunks; `None` is unbounded.
    pub max_chunks: Option<usize>,
    pub audit_log: PathBuf,
}

impl Default for ImfsConfig {
    fn default() -> Self {
        ImfsConfig {
            max_chunks: None,
            audit_log: PathBuf::from(DEFAULT_AUDIT_LOG),
        }
    }
}

/// The in-memory storage engine.
///
/// Serviced single-threaded per interceptor instance; callers that share an
/// instance across threads wrap it in their own lock.
pub struct Imfs {
    arena: ChunkArena,
    nodes: Vec<FileNode>,
    by_path: BTreeMap<String, usize>,
    handles: BTreeMap<i32, OpenFile>,
    audit: AuditLog,
}

impl Imfs {
    pub fn new(config: ImfsConfig) -> Self {
        Imfs {
            arena: ChunkArena::new(config.max_chunks),
            nodes: Vec::new(),
            by_path: BTreeMap::new(),
            handles: BTreeMap::new(),
            audit: AuditLog::new(config.audit_log),
        }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn object_len(&self, path: &str) -> Option<u64> {
        self.by_path.get(path).map(|idx| self.nodes[*idx].len)
    }

    pub fn live_chunks(&self) -> usize {
        self.arena.live_chunks()
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Attach a handle to the object at `path`, creating it when `O_CREAT`
    /// is present. Failed opens are recorded in the audit artifact before
    /// the error propagates; recording never fails the open further.
    pub fn open(&mut self, path: &str, flags: i32, _mode: u32) -> Result<i32, ImfsError> {
        let result = self.open_inner(path, flags);
        if let Err(err) = &result {
            self.audit.record_failed_open(path, -err.errno());
        }
        result
    }

    fn open_inner(&mut self, path: &str, flags: i32) -> Result<i32, ImfsError> {
        let access = Access::from_flags(flags);

        let node = match self.by_path.get(path).copied() {
            Some(idx) => {
                if flags & libc::O_TRUNC != 0 && access.writable() {
                    self.truncate_node(idx);
                }
                idx
            }
            None if flags & libc::O_CREAT != 0 => {
                let idx = self.nodes.len();
                self.nodes.push(FileNode {
                    path: path.to_string(),
                    len: 0,
                    chunks: Vec::new(),
                });
                self.by_path.insert(path.to_string(), idx);
                idx
            }
            None => {
                return Err(ImfsError::NotFound {
                    path: path.to_string(),
                })
            }
        };

        let append = flags & libc::O_APPEND != 0;
        let offset = if append { self.nodes[node].len } else { 0 };

        let mut fd = FIRST_FD;
        while self.handles.contains_key(&fd) {
            fd += 1;
        }
        self.handles.insert(
            fd,
            OpenFile {
                node,
                offset,
                access,
                append,
                fd_flags: 0,
            },
        );
        Ok(fd)
    }

    fn truncate_node(&mut self, idx: usize) {
        let node = &mut self.nodes[idx];
        for chunk in node.chunks.drain(..) {
            self.arena.release(chunk);
        }
        node.len = 0;
    }

    /// Read up to `max_len` bytes at the handle's offset, walking the chunk
    /// sequence. Returns an empty buffer, not an error, at end-of-object.
    pub fn read(&mut self, fd: i32, max_len: usize) -> Result<Vec<u8>, ImfsError> {
        let handle = self
            .handles
            .get(&fd)
            .ok_or(ImfsError::InvalidDescriptor { fd })?;
        if !handle.access.readable() {
            return Err(ImfsError::InvalidDescriptor { fd });
        }

        let node = &self.nodes[handle.node];
        let offset = handle.offset;
        if offset >= node.len {
            return Ok(Vec::new());
        }

        let n = usize::try_from((node.len - offset).min(max_len as u64))
            .unwrap_or(max_len);
        let mut out = Vec::with_capacity(n);
        let mut pos = offset as usize;
        while out.len() < n {
            let chunk = node.chunks[pos / CHUNK_SIZE];
            let within = pos % CHUNK_SIZE;
            let take = (CHUNK_SIZE - within).min(n - out.len());
            out.extend_from_slice(&self.arena.chunk(chunk)[within..within + take]);
            pos += take;
        }

        let advanced = out.len() as u64;
        self.handles.get_mut(&fd).expect("handle vanished").offset = offset + advanced;
        Ok(out)
    }

    /// Write `data` at the handle's offset (at end-of-object for append
    /// handles), allocating the full chunk span up front: either every byte
    /// lands or the call fails with no mutation visible to later reads.
    pub fn write(&mut self, fd: i32, data: &[u8]) -> Result<usize, ImfsError> {
        let handle = self
            .handles
            .get(&fd)
            .ok_or(ImfsError::InvalidDescriptor { fd })?;
        if !handle.access.writable() {
            return Err(ImfsError::InvalidDescriptor { fd });
        }

        let node_idx = handle.node;
        let offset = if handle.append {
            self.nodes[node_idx].len
        } else {
            handle.offset
        };

        if data.is_empty() {
            return Ok(0);
        }

        let end = offset + data.len() as u64;
        let chunks_for_end = (end as usize).div_ceil(CHUNK_SIZE);
        let have = self.nodes[node_idx].chunks.len();
        if chunks_for_end > have {
            let extra = chunks_for_end - have;
            let fresh = self
                .arena
                .allocate_many(extra)
                .ok_or(ImfsError::StorageExhausted {
                    needed_chunks: extra,
                })?;
            self.nodes[node_idx].chunks.extend(fresh);
        }

        // A seek gap between the old length and `offset` stays zero: gap
        // bytes live in chunks that were zeroed on allocation and have
        // never been written inside the logical length.
        let mut pos = offset as usize;
        let mut written = 0;
        while written < data.len() {
            let chunk = self.nodes[node_idx].chunks[pos / CHUNK_SIZE];
            let within = pos % CHUNK_SIZE;
            let take = (CHUNK_SIZE - within).min(data.len() - written);
            self.arena.chunk_mut(chunk)[within..within + take]
                .copy_from_slice(&data[written..written + take]);
            pos += take;
            written += take;
        }

        let node = &mut self.nodes[node_idx];
        node.len = node.len.max(end);
        self.handles.get_mut(&fd).expect("handle vanished").offset = end;
        Ok(data.len())
    }

    pub fn lseek(&mut self, fd: i32, offset: i64, whence: i32) -> Result<i64, ImfsError> {
        let handle = self
            .handles
            .get(&fd)
            .ok_or(ImfsError::InvalidDescriptor { fd })?;

        let base = match whence {
            libc::SEEK_SET => 0,
            libc::SEEK_CUR => handle.offset as i64,
            libc::SEEK_END => self.nodes[handle.node].len as i64,
            _ => return Err(ImfsError::InvalidArgument { what: "whence" }),
        };
        let target = base.checked_add(offset).filter(|t| *t >= 0);
        let Some(target) = target else {
            return Err(ImfsError::InvalidArgument {
                what: "seek offset",
            });
        };

        self.handles.get_mut(&fd).expect("handle vanished").offset = target as u64;
        Ok(target)
    }

    /// Descriptor-flag queries and sets only; anything else is unsupported.
    pub fn fcntl(&mut self, fd: i32, cmd: i32, arg: i64) -> Result<i32, ImfsError> {
        let handle = self
            .handles
            .get_mut(&fd)
            .ok_or(ImfsError::InvalidDescriptor { fd })?;
        match cmd {
            libc::F_GETFD => Ok(handle.fd_flags),
            libc::F_SETFD => {
                handle.fd_flags = arg as i32;
                Ok(0)
            }
            libc::F_GETFL => {
                let mut flags = handle.access.flag_bits();
                if handle.append {
                    flags |= libc::O_APPEND;
                }
                Ok(flags)
            }
            libc::F_SETFL => {
                handle.append = arg as i32 & libc::O_APPEND != 0;
                Ok(0)
            }
            _ => Err(ImfsError::NotSupported { cmd }),
        }
    }

    /// Release the handle. The underlying object is retained: other handles
    /// and future opens still reach it.
    pub fn close(&mut self, fd: i32) -> Result<i32, ImfsError> {
        match self.handles.remove(&fd) {
            Some(_) => Ok(0),
            None => Err(ImfsError::InvalidDescriptor { fd }),
        }
    }

    /// Stable name of the object a live handle points at.
    pub fn handle_path(&self, fd: i32) -> Option<&str> {
        let handle = self.handles.get(&fd)?;
        Some(&self.nodes[handle.node].path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_audit(prefix: &str) -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        std::env::temp_dir().join(format!("{prefix}_{pid}_{n}.log"))
    }

    fn fresh() -> Imfs {
        Imfs::new(ImfsConfig {
            max_chunks: None,
            audit_log: temp_audit("weir_imfs"),
        })
    }

    #[test]
    fn create_write_reopen_read_round_trip() {
        let mut fs = fresh();

        let fd = fs
            .open("testfile.txt", libc::O_CREAT | libc::O_RDWR | libc::O_TRUNC, 0o644)
            .unwrap();
        assert_eq!(fs.write(fd, b"Hello").unwrap(), 5);
        assert_eq!(fs.close(fd).unwrap(), 0);

        let fd = fs.open("testfile.txt", libc::O_RDONLY, 0).unwrap();
        assert_eq!(fs.read(fd, 5).unwrap(), b"Hello");
        assert_eq!(fs.close(fd).unwrap(), 0);
    }

    #[test]
    fn many_small_writes_equal_one_large_write() {
        let payload: Vec<u8> = (0..u8::MAX).cycle().take(3 * CHUNK_SIZE + 17).collect();

        let mut whole = fresh();
        let fd = whole.open("a", libc::O_CREAT | libc::O_RDWR, 0).unwrap();
        whole.write(fd, &payload).unwrap();
        whole.lseek(fd, 0, libc::SEEK_SET).unwrap();
        let from_whole = whole.read(fd, payload.len()).unwrap();

        let mut pieces = fresh();
        let fd = pieces.open("a", libc::O_CREAT | libc::O_RDWR, 0).unwrap();
        for part in payload.chunks(731) {
            pieces.write(fd, part).unwrap();
        }
        pieces.lseek(fd, 0, libc::SEEK_SET).unwrap();
        let from_pieces = pieces.read(fd, payload.len()).unwrap();

        assert_eq!(from_whole, payload);
        assert_eq!(from_pieces, payload);
    }

    #[test]
    fn content_spans_multiple_chunks_never_one_allocation() {
        let mut fs = fresh();
        let fd = fs.open("big", libc::O_CREAT | libc::O_WRONLY, 0).unwrap();
        let payload = vec![0x5A; 5 * CHUNK_SIZE];
        fs.write(fd, &payload).unwrap();
        assert_eq!(fs.live_chunks(), 5);
        assert_eq!(fs.object_len("big"), Some(5 * CHUNK_SIZE as u64));
    }

    #[test]
    fn read_at_end_of_object_is_empty_not_an_error() {
        let mut fs = fresh();
        let fd = fs.open("a", libc::O_CREAT | libc::O_RDWR, 0).unwrap();
        fs.write(fd, b"xy").unwrap();
        assert_eq!(fs.read(fd, 16).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn short_read_at_tail() {
        let mut fs = fresh();
        let fd = fs.open("a", libc::O_CREAT | libc::O_RDWR, 0).unwrap();
        fs.write(fd, b"abcdef").unwrap();
        fs.lseek(fd, 4, libc::SEEK_SET).unwrap();
        assert_eq!(fs.read(fd, 100).unwrap(), b"ef");
    }

    #[test]
    fn open_without_create_fails_and_audits() {
        let audit = temp_audit("weir_imfs_audit");
        let mut fs = Imfs::new(ImfsConfig {
            max_chunks: None,
            audit_log: audit.clone(),
        });

        let err = fs.open("missing.txt", libc::O_RDONLY, 0).unwrap_err();
        assert_eq!(err.errno(), -libc::ENOENT);

        let content = std::fs::read_to_string(&audit).unwrap();
        assert_eq!(content, format!("PATH=missing.txt | RET={}\n", libc::ENOENT));
        let _ = std::fs::remove_file(&audit);
    }

    #[test]
    fn descriptors_are_unique_while_live_and_reused_after_close() {
        let mut fs = fresh();
        let a = fs.open("a", libc::O_CREAT | libc::O_RDWR, 0).unwrap();
        let b = fs.open("a", libc::O_RDONLY, 0).unwrap();
        assert_ne!(a, b);
        assert_eq!(fs.handle_path(a), Some("a"));
        assert_eq!(fs.open_handles(), 2);

        fs.close(a).unwrap();
        assert_eq!(fs.open_handles(), 1);
        let c = fs.open("a", libc::O_RDONLY, 0).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn object_survives_close_of_all_handles() {
        let mut fs = fresh();
        let fd = fs.open("kept", libc::O_CREAT | libc::O_WRONLY, 0).unwrap();
        fs.write(fd, b"data").unwrap();
        fs.close(fd).unwrap();
        assert!(fs.contains("kept"));
        assert_eq!(fs.object_len("kept"), Some(4));
    }

    #[test]
    fn lseek_rejects_negative_targets_and_bad_whence() {
        let mut fs = fresh();
        let fd = fs.open("a", libc::O_CREAT | libc::O_RDWR, 0).unwrap();
        fs.write(fd, b"abc").unwrap();

        assert_eq!(
            fs.lseek(fd, -10, libc::SEEK_SET).unwrap_err().errno(),
            -libc::EINVAL
        );
        assert_eq!(
            fs.lseek(fd, 0, 99).unwrap_err().errno(),
            -libc::EINVAL
        );
        assert_eq!(fs.lseek(fd, -1, libc::SEEK_END).unwrap(), 2);
    }

    #[test]
    fn write_past_end_zero_fills_the_gap() {
        let mut fs = fresh();
        let fd = fs.open("a", libc::O_CREAT | libc::O_RDWR, 0).unwrap();
        fs.write(fd, b"ab").unwrap();
        fs.lseek(fd, 6, libc::SEEK_SET).unwrap();
        fs.write(fd, b"z").unwrap();

        fs.lseek(fd, 0, libc::SEEK_SET).unwrap();
        assert_eq!(fs.read(fd, 7).unwrap(), b"ab\0\0\0\0z");
    }

    #[test]
    fn truncate_releases_chunks_for_reuse() {
        let mut fs = fresh();
        let fd = fs.open("a", libc::O_CREAT | libc::O_WRONLY, 0).unwrap();
        fs.write(fd, &vec![1u8; 2 * CHUNK_SIZE]).unwrap();
        fs.close(fd).unwrap();
        assert_eq!(fs.live_chunks(), 2);

        let fd = fs
            .open("a", libc::O_WRONLY | libc::O_TRUNC, 0)
            .unwrap();
        assert_eq!(fs.live_chunks(), 0);
        assert_eq!(fs.object_len("a"), Some(0));
        fs.close(fd).unwrap();
    }

    #[test]
    fn append_handles_write_at_the_end() {
        let mut fs = fresh();
        let fd = fs.open("a", libc::O_CREAT | libc::O_WRONLY, 0).unwrap();
        fs.write(fd, b"base").unwrap();
        fs.close(fd).unwrap();

        let fd = fs
            .open("a", libc::O_WRONLY | libc::O_APPEND, 0)
            .unwrap();
        fs.write(fd, b"+tail").unwrap();
        fs.close(fd).unwrap();

        let fd = fs.open("a", libc::O_RDONLY, 0).unwrap();
        assert_eq!(fs.read(fd, 16).unwrap(), b"base+tail");
    }

    #[test]
    fn exhausted_arena_fails_atomically() {
        let mut fs = Imfs::new(ImfsConfig {
            max_chunks: Some(2),
            audit_log: temp_audit("weir_imfs_cap"),
        });
        let fd = fs.open("a", libc::O_CREAT | libc::O_RDWR, 0).unwrap();
        fs.write(fd, &vec![7u8; CHUNK_SIZE]).unwrap();

        let err = fs.write(fd, &vec![8u8; 2 * CHUNK_SIZE]).unwrap_err();
        assert_eq!(err.errno(), -libc::ENOSPC);

        // Nothing from the failed call is observable.
        assert_eq!(fs.object_len("a"), Some(CHUNK_SIZE as u64));
        fs.lseek(fd, 0, libc::SEEK_SET).unwrap();
        assert_eq!(fs.read(fd, 2 * CHUNK_SIZE).unwrap(), vec![7u8; CHUNK_SIZE]);
    }

    #[test]
    fn read_on_a_write_only_handle_is_rejected() {
        let mut fs = fresh();
        let fd = fs.open("a", libc::O_CREAT | libc::O_WRONLY, 0).unwrap();
        assert_eq!(fs.read(fd, 1).unwrap_err().errno(), -libc::EBADF);
        assert_eq!(fs.write(fd, b"ok").unwrap(), 2);
    }

    #[test]
    fn operations_on_closed_descriptors_fail() {
        let mut fs = fresh();
        let fd = fs.open("a", libc::O_CREAT | libc::O_RDWR, 0).unwrap();
        fs.close(fd).unwrap();

        assert_eq!(fs.read(fd, 1).unwrap_err().errno(), -libc::EBADF);
        assert_eq!(fs.write(fd, b"x").unwrap_err().errno(), -libc::EBADF);
        assert_eq!(fs.lseek(fd, 0, libc::SEEK_SET).unwrap_err().errno(), -libc::EBADF);
        assert_eq!(fs.close(fd).unwrap_err().errno(), -libc::EBADF);
    }

    #[test]
    fn fcntl_flag_round_trip_and_unsupported_cmd() {
        let mut fs = fresh();
        let fd = fs
            .open("a", libc::O_CREAT | libc::O_RDWR | libc::O_APPEND, 0)
            .unwrap();

        let fl = fs.fcntl(fd, libc::F_GETFL, 0).unwrap();
        assert_eq!(fl & libc::O_ACCMODE, libc::O_RDWR);
        assert_ne!(fl & libc::O_APPEND, 0);

        fs.fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC as i64).unwrap();
        assert_eq!(fs.fcntl(fd, libc::F_GETFD, 0).unwrap(), libc::FD_CLOEXEC);

        assert_eq!(
            fs.fcntl(fd, libc::F_GETLK, 0).unwrap_err().errno(),
            -libc::EOPNOTSUPP
        );
    }
}
