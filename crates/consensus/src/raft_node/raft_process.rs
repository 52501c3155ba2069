use std::mem;

use crate::protos::prelude::Envelope;
use crate::{
    errors::{Error, Result},
    raft::{raft_role::RaftRole, raft_tracker::RaftManager},
};

use crate::storage::Storage;

use super::{LightReady, RaftNode, Ready, ReadyRecord};
use slog::trace;

/// How a driver moves a [RaftNode] forward: step inputs into it, then
/// drain what became ready in order.
pub trait RaftProcess {
    /// Whether anything must be handled before the next input:
    /// * messages for other peers
    /// * a changed role or leader (soft state)
    /// * a changed term, vote or commit (hard state)
    /// * entries or a received snapshot to persist
    /// * committed entries to apply
    /// * the learned address of the leader
    fn has_ready(&self) -> bool;

    /// Feed a message received from another peer. Replies from peers that
    /// aren't tracked are refused with `StepPeerNotFound`.
    fn step(&mut self, envelope: Envelope) -> Result<()>;

    /// Take everything ready. Whatever it holds must be persisted before
    /// its messages leave, then handed back with `advance`.
    fn get_ready(&mut self) -> Ready;

    /// Mark `rd` as persisted and applied. Messages held back until the
    /// state they report was durable come out in the returned `LightReady`,
    /// together with entries committed meanwhile.
    fn advance(&mut self, rd: Ready) -> LightReady;

    /// Mark `rd` as persisted only, applying is left to `advance_apply`.
    fn advance_append(&mut self, rd: Ready) -> LightReady;

    /// Everything handed out so far was applied, returns the applied index.
    fn advance_apply(&mut self) -> u64;

    fn advance_apply_to(&mut self, applied: u64);
}

impl<S: Storage> RaftProcess for RaftNode<S> {
    fn has_ready(&self) -> bool {
        let raft_peer = &self.raft;
        if !raft_peer.messages.is_empty() || !self.messages.is_empty() {
            trace!(self.logger, "[ready] has messages to send");
            return true;
        }
        if raft_peer.soft_state() != self.prev_soft_state {
            trace!(
                self.logger,
                "[ready] soft state change, ori: {:?} now: {:?}",
                self.prev_soft_state,
                raft_peer.soft_state()
            );
            return true;
        }
        if raft_peer.hard_state() != self.prev_hard_state {
            trace!(self.logger, "[ready] hard state changed");
            return true;
        }
        if !raft_peer.address_updates.is_empty() {
            trace!(self.logger, "[ready] learned leader address");
            return true;
        }
        if !raft_peer.raft_log.unstable_entries().is_empty() {
            trace!(self.logger, "[ready] has some unstable entries need to be persist");
            return true;
        }
        if self.snapshot().map_or(false, |snapshot| !snapshot.is_empty()) {
            trace!(self.logger, "[ready] receive snapshot");
            return true;
        }
        if raft_peer.raft_log.is_entries_stable_since(self.since_committed_index) {
            trace!(self.logger, "[ready] commit normal entries");
            return true;
        }

        false
    }

    fn step(&mut self, envelope: Envelope) -> Result<()> {
        if self.raft.tracker.get(envelope.from).is_some() || !envelope.message.is_reply() {
            return self.raft.process(envelope);
        }
        Err(Error::StepPeerNotFound)
    }

    fn get_ready(&mut self) -> Ready {
        let raft_peer = &mut self.raft;
        self.ready_records_number += 1;

        let mut ready = Ready {
            seq: self.ready_records_number,
            ..Default::default()
        };
        let mut ready_record = ReadyRecord {
            seq: self.ready_records_number,
            ..Default::default()
        };

        if self.prev_soft_state.raft_state != RaftRole::Leader
            && raft_peer.current_raft_role == RaftRole::Leader
        {
            // just won an election, everything held so far was persisted
            // along with the vote, it may leave now.
            for mut record in self.records.drain(..) {
                assert_eq!(record.last_entry, None);
                assert_eq!(record.snapshot, None);
                self.messages.append(&mut record.messages);
            }
        }

        let soft_state = raft_peer.soft_state();
        if soft_state != self.prev_soft_state {
            ready.soft_state = Some(soft_state);
        }
        let hard_state = raft_peer.hard_state();
        if hard_state != self.prev_hard_state {
            if hard_state.vote != self.prev_hard_state.vote
                || hard_state.term != self.prev_hard_state.term
            {
                ready.must_sync = true;
            }
            ready.hard_state = Some(hard_state);
        }

        if !raft_peer.address_updates.is_empty() {
            mem::swap(&mut ready.address_updates, &mut raft_peer.address_updates);
        }

        if let Some(snapshot) = raft_peer.raft_log.unstable_snapshot() {
            // get snapshot from unstable raftlog.
            ready.snapshot = snapshot.clone();
            let snapshot_metadata = ready.snapshot.get_metadata();
            let (snapshot_index, snapshot_term) = (snapshot_metadata.index, snapshot_metadata.term);
            assert!(self.since_committed_index <= snapshot_index);
            self.since_committed_index = snapshot_index;
            assert!(
                !raft_peer.raft_log.is_entries_stable_since(self.since_committed_index),
                "has snapshot but also has committed entries since {}",
                self.since_committed_index
            );
            ready_record.snapshot = Some((snapshot_index, snapshot_term));
            ready.must_sync = true;
        }

        ready.unstable_entries = raft_peer.raft_log.unstable_entries().to_vec();
        if let Some(ent) = ready.unstable_entries.last() {
            ready.must_sync = true;
            ready_record.last_entry = Some((ent.index, ent.term));
        }

        // If current peer is not Leader, then don't give it messages (from raft)
        // only Leader can hold messages in light ready when `get_ready`.
        if !raft_peer.messages.is_empty() && raft_peer.current_raft_role != RaftRole::Leader {
            mem::swap(&mut ready_record.messages, &mut raft_peer.messages);
        }

        ready.light_rd = self.gen_light_ready();
        self.records.push_back(ready_record);
        ready
    }

    fn advance(&mut self, rd: Ready) -> LightReady {
        let applied_index = self.since_committed_index;
        let light_rd = self.advance_append(rd);
        self.advance_apply_to(applied_index);
        light_rd
    }

    fn advance_append(&mut self, rd: Ready) -> LightReady {
        self.commit_ready(rd);
        self.persist_ready(self.ready_records_number);

        let mut light_rd = self.gen_light_ready();
        let hard_state = self.raft.hard_state();
        if hard_state.commit > self.prev_hard_state.commit {
            light_rd.committed_index = Some(hard_state.commit);
            self.prev_hard_state.commit = hard_state.commit;
        } else {
            light_rd.committed_index = None;
        }
        light_rd
    }

    #[inline]
    fn advance_apply(&mut self) -> u64 {
        let applied_index = self.since_committed_index;
        self.commit_apply(applied_index);
        applied_index
    }

    #[inline]
    fn advance_apply_to(&mut self, applied_index: u64) {
        self.commit_apply(applied_index)
    }
}
