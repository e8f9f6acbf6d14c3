/// A simple allocator that reuses byte buffers to reduce allocations on hot
/// paths (decode scratch space, outgoing datagrams).
pub struct BufferPool {
    /// Pool of reusable buffers
    pool: Vec<Vec<u8>>,
    /// Capacity of freshly allocated buffers
    buffer_size: usize,
    /// Maximum pool size
    max_pool_size: usize,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(buffer_size: usize, max_pool_size: usize) -> Self {
        Self { pool: Vec::with_capacity(max_pool_size), buffer_size, max_pool_size }
    }

    /// Takes a buffer from the pool or allocates a new one.
    pub fn allocate(&mut self) -> Vec<u8> {
        self.pool.pop().unwrap_or_else(|| Vec::with_capacity(self.buffer_size))
    }

    /// Returns a buffer to the pool for reuse.
    pub fn recycle(&mut self, mut buffer: Vec<u8>) {
        if self.pool.len() < self.max_pool_size {
            buffer.clear();
            self.pool.push(buffer);
        }
    }

    /// Returns the number of buffers currently in the pool.
    pub fn available(&self) -> usize {
        self.pool.len()
    }

    /// Drops all pooled buffers.
    pub fn clear(&mut self) {
        self.pool.clear();
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_MTU, 64)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("available", &self.pool.len())
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_basic() {
        let mut pool = BufferPool::new(100, 10);

        let buf1 = pool.allocate();
        assert!(buf1.capacity() >= 100);
        assert_eq!(pool.available(), 0);

        pool.recycle(buf1);
        assert_eq!(pool.available(), 1);

        let buf2 = pool.allocate();
        assert_eq!(pool.available(), 0);
        drop(buf2);
    }

    #[test]
    fn test_pool_max_size() {
        let mut pool = BufferPool::new(100, 2);

        for _ in 0..5 {
            pool.recycle(Vec::new());
        }

        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_recycled_buffer_is_cleared() {
        let mut pool = BufferPool::new(16, 4);

        pool.recycle(vec![1, 2, 3]);
        let buf = pool.allocate();
        assert!(buf.is_empty());
    }
}
