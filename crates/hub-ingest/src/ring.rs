//! Fixed-capacity ray ring buffer
//!
//! The producer is a real-time socket feed that cannot be slowed down, so the
//! buffer never blocks and never grows: when it is full, `enqueue` overwrites
//! the oldest unread item. Capacity is chosen once at construction.

use tracing::trace;

use crate::error::RingError;

/// Lossy FIFO queue with a fixed backing store
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Next slot to write
    head: usize,
    /// Next slot to read
    tail: usize,
    len: usize,
    overwritten: u64,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding up to `capacity` items (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            head: 0,
            tail: 0,
            len: 0,
            overwritten: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Add an item, discarding the oldest unread one if the buffer is full
    pub fn enqueue(&mut self, item: T) {
        let capacity = self.capacity();
        if self.len == capacity {
            // Full: head == tail, the slot being written holds the oldest item
            self.tail = (self.tail + 1) % capacity;
            self.overwritten += 1;
            trace!("Ring buffer full, dropped oldest item");
        } else {
            self.len += 1;
        }
        self.slots[self.head] = Some(item);
        self.head = (self.head + 1) % capacity;
    }

    /// Remove and return the oldest unread item
    pub fn dequeue(&mut self) -> Result<T, RingError> {
        if self.len == 0 {
            return Err(RingError::Empty);
        }
        let item = self.slots[self.tail].take().ok_or(RingError::Empty)?;
        self.tail = (self.tail + 1) % self.capacity();
        self.len -= 1;
        Ok(item)
    }

    /// Number of unread items
    pub fn size(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn has_data(&self) -> bool {
        self.len > 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Items lost to overwrites since construction
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    /// Drop every unread item
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    /// Dequeue everything currently pending, oldest first
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        while let Ok(item) = self.dequeue() {
            out.push(item);
        }
        out
    }
}
