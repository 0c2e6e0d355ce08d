use std::collections::VecDeque;

use bytes::Bytes;

/// Bounded log of recent upstream bytes, addressed by session-wide offset.
///
/// `total_bytes` counts everything ever pushed; the deque holds only the
/// most recent `limit` bytes of it. Acknowledged chunks are trimmed from
/// the front, and a resuming client is replayed everything from its
/// acknowledged offset to the end.
#[derive(Debug)]
pub struct ReplayBuffer {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    total: u64,
    limit: usize,
}

impl ReplayBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            buffered: 0,
            total: 0,
            limit,
        }
    }

    /// Append an upstream chunk, evicting oldest chunks past the limit.
    pub fn push(&mut self, chunk: Bytes) {
        self.total += chunk.len() as u64;
        self.buffered += chunk.len();
        self.chunks.push_back(chunk);
        while self.buffered > self.limit {
            match self.chunks.pop_front() {
                Some(front) => self.buffered -= front.len(),
                None => break,
            }
        }
    }

    /// Drop chunks that lie entirely below the acknowledged offset.
    pub fn trim_to(&mut self, ack: u64) {
        let mut start = self.start_offset();
        while let Some(front) = self.chunks.front() {
            let end = start + front.len() as u64;
            if end > ack {
                break;
            }
            start = end;
            self.buffered -= front.len();
            self.chunks.pop_front();
        }
    }

    /// Chunks to replay to a client resuming from `offset`.
    ///
    /// `None` replays the whole buffer. An offset at or past the total
    /// replays nothing; an offset older than the buffered window replays
    /// from the start of what is still held. The first chunk is sliced
    /// when the offset falls inside it.
    pub fn replay_from(&self, offset: Option<u64>) -> Vec<Bytes> {
        let Some(offset) = offset else {
            return self.chunks.iter().cloned().collect();
        };
        if offset >= self.total {
            return Vec::new();
        }

        let mut skip = offset.saturating_sub(self.start_offset()) as usize;
        let mut out = Vec::new();
        for chunk in &self.chunks {
            if skip >= chunk.len() {
                skip -= chunk.len();
                continue;
            }
            out.push(chunk.slice(skip..));
            skip = 0;
        }
        out
    }

    /// Total bytes ever pushed through this buffer.
    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    /// Bytes currently held for replay.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Session-wide offset of the first buffered byte.
    fn start_offset(&self) -> u64 {
        self.total - self.buffered as u64
    }
}
