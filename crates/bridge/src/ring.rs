//! Fixed-capacity circular byte buffer.
//!
//! The ring buffer is a plain byte FIFO with no message boundaries. It never
//! blocks and carries no lock of its own: a session guards both of its
//! buffers with one shared mutex (see [`crate::device`]).

/// Default inbound (transport to shell) buffer size.
pub const DEFAULT_INBOUND_SIZE: usize = 32;

/// Default outbound (shell to transport) buffer size.
pub const DEFAULT_OUTBOUND_SIZE: usize = 64;

/// A circular byte buffer.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    /// Backing storage.
    buf: Box<[u8]>,
    /// Index of the oldest byte.
    head: usize,
    /// Number of occupied bytes.
    len: usize,
}

impl RingBuffer {
    /// Creates a buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Returns the total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns the number of occupied bytes.
    #[inline]
    pub fn data_len(&self) -> usize {
        self.len
    }

    /// Returns the number of free bytes.
    #[inline]
    pub fn space_len(&self) -> usize {
        self.buf.len() - self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    /// Appends as much of `data` as fits.
    ///
    /// Returns the number of bytes written, zero when the buffer is full.
    pub fn put(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.space_len());
        if n == 0 {
            return 0;
        }

        let cap = self.buf.len();
        let tail = (self.head + self.len) % cap;
        let first = n.min(cap - tail);
        self.buf[tail..tail + first].copy_from_slice(&data[..first]);
        self.buf[..n - first].copy_from_slice(&data[first..n]);

        self.len += n;
        n
    }

    /// Removes up to `out.len()` bytes into `out`.
    ///
    /// Returns the number of bytes read, zero when the buffer is empty.
    pub fn get(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        if n == 0 {
            return 0;
        }

        let cap = self.buf.len();
        let first = n.min(cap - self.head);
        out[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        out[first..n].copy_from_slice(&self.buf[..n - first]);

        self.head = (self.head + n) % cap;
        self.len -= n;
        if self.len == 0 {
            self.head = 0;
        }
        n
    }
}
