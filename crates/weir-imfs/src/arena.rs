/// Bytes per content chunk. An object's content is a sequence of chunk
/// indices, never one allocation sized to the object.
pub const CHUNK_SIZE: usize = 4096;

/// Index-addressed pool of fixed-size chunks with a free list.
///
/// Chunks are individually boxed so the pool itself never needs one large
/// contiguous region. Released indices are handed out again zeroed.
pub struct ChunkArena {
    chunks: Vec<Box<[u8; CHUNK_SIZE]>>,
    free: Vec<u32>,
    max_chunks: Option<usize>,
}

impl ChunkArena {
    pub fn new(max_chunks: Option<usize>) -> Self {
        ChunkArena {
            chunks: Vec::new(),
            free: Vec::new(),
            max_chunks,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Chunks currently backing object content.
    pub fn live_chunks(&self) -> usize {
        self.chunks.len() - self.free.len()
    }

    pub fn can_allocate(&self, n: usize) -> bool {
        match self.max_chunks {
            Some(cap) => self.live_chunks().saturating_add(n) <= cap,
            None => true,
        }
    }

    pub fn allocate(&mut self) -> Option<u32> {
        if !self.can_allocate(1) {
            return None;
        }
        if let Some(idx) = self.free.pop() {
            self.chunks[idx as usize].fill(0);
            return Some(idx);
        }
        let idx = u32::try_from(self.chunks.len()).ok()?;
        self.chunks.push(Box::new([0u8; CHUNK_SIZE]));
        Some(idx)
    }

    /// All-or-nothing allocation of `n` chunks, so a caller can reserve the
    /// full span of a write before mutating anything.
    pub fn allocate_many(&mut self, n: usize) -> Option<Vec<u32>> {
        if !self.can_allocate(n) {
            return None;
        }
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            match self.allocate() {
                Some(idx) => out.push(idx),
                None => {
                    for idx in out {
                        self.release(idx);
                    }
                    return None;
                }
            }
        }
        Some(out)
    }

    pub fn release(&mut self, idx: u32) {
        debug_assert!((idx as usize) < self.chunks.len());
        debug_assert!(!self.free.contains(&idx));
        self.free.push(idx);
    }

    pub fn chunk(&self, idx: u32) -> &[u8; CHUNK_SIZE] {
        &self.chunks[idx as usize]
    }

    pub fn chunk_mut(&mut self, idx: u32) -> &mut [u8; CHUNK_SIZE] {
        &mut self.chunks[idx as usize]
    }
}
