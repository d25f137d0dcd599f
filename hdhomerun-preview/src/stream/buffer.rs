//! Fixed-capacity ring buffer for TS data.

use parking_lot::Mutex;

/// TS packet size.
pub const TS_PACKET_SIZE: usize = 188;

/// Default size of the ring buffer (2 MiB).
pub const DEFAULT_RING_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// A bounded byte ring buffer for TS data.
///
/// One producer (the stream pump) writes and one consumer (the media
/// player's read callback) drains, possibly from different threads. Both
/// operations take the same lock, never block waiting for space or data,
/// and never grow the storage. One slot is kept free to tell a full
/// buffer from an empty one, so at most `capacity - 1` bytes are stored.
pub struct RingBuffer {
    inner: Mutex<RingInner>,
    capacity: usize,
}

struct RingInner {
    /// The underlying storage (heap-allocated).
    data: Box<[u8]>,
    /// Write position (producer side).
    write_pos: usize,
    /// Read position (consumer side).
    read_pos: usize,
}

impl RingInner {
    fn available(&self, capacity: usize) -> usize {
        if self.write_pos >= self.read_pos {
            self.write_pos - self.read_pos
        } else {
            capacity - self.read_pos + self.write_pos
        }
    }
}

impl RingBuffer {
    /// Create a ring buffer with the given capacity in bytes.
    ///
    /// Capacities below 2 are raised to 2 so that one byte can be stored.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            inner: Mutex::new(RingInner {
                data: vec![0u8; capacity].into_boxed_slice(),
                write_pos: 0,
                read_pos: 0,
            }),
            capacity,
        }
    }

    /// Total storage size. Usable space is one byte less.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of bytes available for reading.
    pub fn available(&self) -> usize {
        self.inner.lock().available(self.capacity)
    }

    /// Get the number of bytes of free space for writing.
    pub fn free_space(&self) -> usize {
        self.capacity - self.available() - 1
    }

    /// Write data to the buffer.
    ///
    /// Stores as many leading bytes of `data` as fit and drops the rest.
    /// Returns the number of bytes stored (may be 0).
    pub fn write(&self, data: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        let free = self.capacity - inner.available(self.capacity) - 1;

        let to_write = data.len().min(free);
        if to_write == 0 {
            return 0;
        }

        let write = inner.write_pos;
        let first_chunk = to_write.min(self.capacity - write);
        inner.data[write..write + first_chunk].copy_from_slice(&data[..first_chunk]);
        if first_chunk < to_write {
            let second = to_write - first_chunk;
            inner.data[..second].copy_from_slice(&data[first_chunk..to_write]);
        }

        inner.write_pos = (write + to_write) % self.capacity;
        to_write
    }

    /// Read data into a provided buffer, consuming it.
    ///
    /// Returns the number of bytes copied (may be 0).
    pub fn read_into(&self, dest: &mut [u8]) -> usize {
        let mut inner = self.inner.lock();
        let available = inner.available(self.capacity);

        let to_read = dest.len().min(available);
        if to_read == 0 {
            return 0;
        }

        // Copy data, handling wrap-around
        let read = inner.read_pos;
        let first_chunk = to_read.min(self.capacity - read);
        dest[..first_chunk].copy_from_slice(&inner.data[read..read + first_chunk]);
        if first_chunk < to_read {
            let second_chunk = to_read - first_chunk;
            dest[first_chunk..to_read].copy_from_slice(&inner.data[..second_chunk]);
        }

        inner.read_pos = (read + to_read) % self.capacity;
        to_read
    }

    /// Read and consume up to `max_len` bytes.
    pub fn read(&self, max_len: usize) -> Vec<u8> {
        let mut out = vec![0u8; max_len.min(self.capacity)];
        let n = self.read_into(&mut out);
        out.truncate(n);
        out
    }

    /// Clear the buffer.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.read_pos = 0;
        inner.write_pos = 0;
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RING_BUFFER_SIZE)
    }
}
