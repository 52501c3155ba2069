//! Chunked shipping of a snapshot from the leader to one follower.
//!
//! The leader keeps a [SnapshotSender] per follower in `Snapshot` state and
//! keeps exactly one chunk in flight. Every chunk after the first carries the
//! hash of its predecessor, the follower's [SnapshotReceiver] only accepts a
//! chunk that extends what it already holds and re-acks copies of chunks it
//! already took. Anything else resets the transfer to chunk 1.

use std::fmt::{self, Debug};

use crate::protos::prelude::{ClusterConfig, InstallSnapshot, RaftVersion, Snapshot};

/// Hash of one chunk's bytes.
#[inline]
pub fn chunk_hash(chunk: &[u8]) -> u64 {
    fxhash::hash64(chunk)
}

/// Leader side of a transfer.
#[derive(Clone)]
pub struct SnapshotSender {
    index: u64,
    term: u64,
    data: Vec<u8>,
    config: Option<ClusterConfig>,
    chunk_size: usize,
    total_chunks: u32,
    /// 1-based index of the chunk waiting for its reply.
    in_flight: u32,
    /// Logical time the chunk in flight was sent at.
    sent_at: u64,
}

/// What the leader does with an `InstallSnapshotReply`.
#[derive(Debug, PartialEq)]
pub enum SenderProgress {
    /// Late or duplicated reply.
    Ignore,
    /// Send the chunk now in flight.
    SendChunk,
    /// The follower acknowledged the final chunk.
    Done(u64),
}

impl SnapshotSender {
    pub fn new(snapshot: Snapshot, chunk_size: usize, now: u64) -> Self {
        let chunk_size = chunk_size.max(1);
        let meta = snapshot.get_metadata();
        let total = (snapshot.data.len() + chunk_size - 1) / chunk_size;
        SnapshotSender {
            index: meta.index,
            term: meta.term,
            config: meta.config.clone(),
            data: snapshot.data,
            chunk_size,
            total_chunks: total.max(1) as u32,
            in_flight: 1,
            sent_at: now,
        }
    }

    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    #[inline]
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    #[inline]
    pub fn in_flight(&self) -> u32 {
        self.in_flight
    }

    fn chunk(&self, chunk_index: u32) -> &[u8] {
        let start = (chunk_index as usize - 1) * self.chunk_size;
        let end = (start + self.chunk_size).min(self.data.len());
        &self.data[start.min(end)..end]
    }

    /// Build the request for the chunk in flight and restart its reply timer.
    pub fn current_chunk(&mut self, term: u64, leader_id: u64, version: RaftVersion, now: u64) -> InstallSnapshot {
        self.sent_at = now;
        let chunk_index = self.in_flight;
        InstallSnapshot {
            term,
            leader_id,
            last_included_index: self.index,
            last_included_term: self.term,
            chunk_data: self.chunk(chunk_index).to_vec(),
            chunk_index,
            total_chunks: self.total_chunks,
            last_chunk_hash: if chunk_index > 1 {
                Some(chunk_hash(self.chunk(chunk_index - 1)))
            } else {
                None
            },
            cluster_config: if chunk_index == self.total_chunks {
                self.config.clone()
            } else {
                None
            },
            raft_version: version.as_u8(),
        }
    }

    /// Advance on a reply. A rejection of the chunk in flight, or a follower
    /// asking for chunk 1, restarts from the first chunk. Anything else only
    /// counts for the chunk in flight.
    pub fn on_reply(&mut self, chunk_index: u32, success: bool) -> SenderProgress {
        if !success {
            if chunk_index != self.in_flight && chunk_index != 1 {
                return SenderProgress::Ignore;
            }
            self.in_flight = 1;
            return SenderProgress::SendChunk;
        }
        if chunk_index != self.in_flight {
            return SenderProgress::Ignore;
        }
        if self.in_flight == self.total_chunks {
            return SenderProgress::Done(self.index);
        }
        self.in_flight += 1;
        SenderProgress::SendChunk
    }

    /// No reply for the chunk in flight within `timeout` ticks.
    #[inline]
    pub fn timed_out(&self, now: u64, timeout: u64) -> bool {
        now.saturating_sub(self.sent_at) >= timeout
    }
}

impl Debug for SnapshotSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotSender")
            .field("index", &self.index)
            .field("term", &self.term)
            .field("bytes", &self.data.len())
            .field("in_flight", &self.in_flight)
            .field("total_chunks", &self.total_chunks)
            .finish()
    }
}

/// What the follower answers for one chunk.
#[derive(Debug, PartialEq)]
pub enum ReceiveOutcome {
    /// Chunk kept (or already kept), acknowledge it.
    Ack(u32),
    /// Chunk doesn't extend the partial snapshot, the leader has to restart.
    Reject,
    /// The final chunk arrived, here is the whole snapshot.
    Complete(Snapshot),
}

/// Follower side of a transfer. Holds the chunks received so far.
#[derive(Debug, Default)]
pub struct SnapshotReceiver {
    index: u64,
    term: u64,
    total_chunks: u32,
    /// Last chunk accepted, 0 when idle.
    received: u32,
    last_hash: u64,
    buffer: Vec<u8>,
}

impl SnapshotReceiver {
    #[inline]
    fn same_snapshot(&self, chunk: &InstallSnapshot) -> bool {
        self.received > 0
            && self.index == chunk.last_included_index
            && self.term == chunk.last_included_term
            && self.total_chunks == chunk.total_chunks
    }

    pub fn receive(&mut self, chunk: &InstallSnapshot) -> ReceiveOutcome {
        if chunk.chunk_index == 0 || chunk.chunk_index > chunk.total_chunks {
            self.reset();
            return ReceiveOutcome::Reject;
        }
        if self.same_snapshot(chunk) && chunk.chunk_index <= self.received {
            // duplicated or late copy of a chunk already taken.
            return ReceiveOutcome::Ack(chunk.chunk_index);
        }
        if chunk.chunk_index == 1 {
            self.reset();
            self.index = chunk.last_included_index;
            self.term = chunk.last_included_term;
            self.total_chunks = chunk.total_chunks;
        } else if !(self.same_snapshot(chunk)
            && chunk.chunk_index == self.received + 1
            && chunk.last_chunk_hash == Some(self.last_hash))
        {
            self.reset();
            return ReceiveOutcome::Reject;
        }

        self.buffer.extend_from_slice(&chunk.chunk_data);
        self.received = chunk.chunk_index;
        self.last_hash = chunk_hash(&chunk.chunk_data);

        if chunk.chunk_index < chunk.total_chunks {
            return ReceiveOutcome::Ack(chunk.chunk_index);
        }
        // keep the identity around so a duplicated final chunk is re-acked.
        let data = std::mem::take(&mut self.buffer);
        ReceiveOutcome::Complete(Snapshot::new(
            self.index,
            self.term,
            chunk.cluster_config.clone(),
            data,
        ))
    }

    /// Drop whatever was received so far.
    pub fn reset(&mut self) {
        *self = SnapshotReceiver::default();
    }

    #[inline]
    pub fn received(&self) -> u32 {
        self.received
    }
}
