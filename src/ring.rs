// Fixed-capacity circular byte buffer; the owner serializes access and loops
// across the wrap boundary, since one call never crosses it.

/// One memory page on common platforms.
pub const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug)]
pub struct RingBuffer {
    mem: Box<[u8]>,
    start: usize,
    len: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            mem: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.mem.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.mem.len()
    }

    fn end(&self) -> usize {
        (self.start + self.len) % self.mem.len()
    }

    // Contiguous bytes readable from `start` without wrapping.
    fn readable_run(&self) -> usize {
        let end = self.end();
        if self.len == 0 {
            0
        } else if self.start < end {
            end - self.start
        } else {
            self.mem.len() - self.start
        }
    }

    // Contiguous bytes writable at `end` without wrapping.
    fn writable_run(&self) -> usize {
        let end = self.end();
        if self.len == 0 {
            self.mem.len()
        } else if self.start < end {
            self.mem.len() - end
        } else {
            self.start - end
        }
    }

    /// Copy up to `dst.len()` bytes out of the buffer. Returns 0 when empty.
    /// A wrapped buffer needs a second call to drain the remainder.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let run = self.readable_run();
        if dst.is_empty() || run == 0 {
            return 0;
        }
        let n = dst.len().min(run);
        dst[..n].copy_from_slice(&self.mem[self.start..self.start + n]);
        self.len -= n;
        // Reset to the origin when drained so the next write gets the full
        // capacity as one contiguous run.
        self.start = if self.len == 0 {
            0
        } else {
            (self.start + n) % self.mem.len()
        };
        n
    }

    /// Copy as many bytes of `src` as fit in one contiguous run. Returns 0
    /// when full; callers loop for the remainder.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let run = self.writable_run();
        if src.is_empty() || run == 0 {
            return 0;
        }
        let n = src.len().min(run);
        let end = self.end();
        self.mem[end..end + n].copy_from_slice(&src[..n]);
        self.len += n;
        n
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
