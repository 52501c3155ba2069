use std::fmt::Display;

/// The inflights keep all messages that broadcast append by leader raft
/// to all followers but not received append response yet. the buffer in
/// the "Inflights" is a ringbuffer
#[derive(Debug, PartialEq)]
pub struct RingBuffer {
    start: usize,
    count: usize,
    buffer: Vec<u64>,
}

impl RingBuffer {
    pub fn new(cap: usize) -> Self {
        RingBuffer {
            buffer: Vec::with_capacity(cap),
            count: 0,
            start: 0,
        }
    }

    fn next_pos(&self) -> usize {
        let mut next_pos = self.start + self.count;
        if next_pos >= self.capacity() {
            next_pos -= self.capacity();
        }
        next_pos
    }

    /// Inflight indexes from the oldest to the newest.
    pub fn to_vec(&self) -> Vec<u64> {
        let cap = self.capacity();
        (0..self.count)
            .map(|step| {
                let mut pos = self.start + step;
                if pos >= cap {
                    pos -= cap;
                }
                self.buffer[pos]
            })
            .collect()
    }
}

pub trait Inflights {
    fn capacity(&self) -> usize;

    fn is_full(&self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert inflight to inflights ring buffer in order
    fn push_back(&mut self, inflight: u64);

    /// Release buffer to given watermark "to_inflight"
    /// # Example
    /// \[8,9,0,1,3,5\] start: 2, count: 4, to_inflight: 3
    /// then after release... start: 5, count: 1 <br/>
    /// It's equal release \[0,1,3,5\] to \[5\]
    fn release_to(&mut self, to_inflight: u64);

    fn pop_front(&mut self) -> Option<u64>;

    fn clear(&mut self);
}

/// We should keep the actual capacity of buffer after clone.
/// Defatult Clone will not keep the capacity of the buffer
impl Clone for RingBuffer {
    fn clone(&self) -> Self {
        let mut buffer = Vec::with_capacity(self.capacity());
        buffer.extend_from_slice(&self.buffer);
        RingBuffer {
            start: self.start,
            count: self.count,
            buffer,
        }
    }
}

impl Display for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inflights = self.to_vec();
        if inflights.len() > 20 {
            return write!(
                f,
                "start: {}, count: {}, buffer: [{} .. {}]",
                self.start,
                self.count,
                inflights[0],
                inflights[inflights.len() - 1]
            );
        }
        write!(f, "{:?}", inflights)
    }
}

/// This is the inflight impl for bing buffer which hold all
/// inflights messages in a ring buffer in order.
impl Inflights for RingBuffer {
    #[inline]
    fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.capacity() == self.count
    }

    #[inline]
    fn len(&self) -> usize {
        self.count
    }

    #[inline]
    fn push_back(&mut self, inflight: u64) {
        if self.is_full() {
            panic!("Inflight buffer is full, please release some buffer before use")
        }

        let next_pos = self.next_pos();
        assert!(next_pos <= self.buffer.len());

        let in_first_lap: bool = next_pos == self.buffer.len();
        if in_first_lap {
            self.buffer.push(inflight);
        } else {
            self.buffer[next_pos] = inflight;
        }
        self.count += 1;
    }

    #[inline]
    fn release_to(&mut self, to_inflight: u64) {
        let mut cursor = self.start;
        let mut step = 0usize;
        while step < self.count {
            // break out when reach watermark
            if to_inflight < self.buffer[cursor] {
                break;
            }
            cursor += 1;
            if cursor >= self.capacity() {
                cursor -= self.capacity();
            }
            step += 1;
        }
        self.start = cursor;
        self.count -= step;
    }

    #[inline]
    fn pop_front(&mut self) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        let pop = self.buffer[self.start];
        self.release_to(pop);
        Some(pop)
    }

    fn clear(&mut self) {
        self.start = 0;
        self.count = 0;
    }
}
