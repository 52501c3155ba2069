use std::cmp::{max, min};

use crate::protos::prelude::{PayloadVersion, RaftVersion};

use super::{
    inflights::{Inflights, RingBuffer},
    progress_state::ProgressState,
};

/// Progress represents a follower’s progress in the view of the leader. Leader
/// maintains progresses of all followers, and sends entries to the follower
/// based on its progress.
///
/// NB(tbg): Progress is basically a ***State machine*** whose transitions are mostly
/// strewn around `*raft.raft`. Additionally, some fields are only used when in a
/// certain State. All of this isn't ideal.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// The next index and mach index in specific follower raft
    /// match_index means the index that follower has been sync with leader
    pub match_index: u64,

    /// and the next_index means the index that leader raft will try to sync
    /// with follower raft at next time
    pub next_index: u64,

    pub state: ProgressState,

    /// ProbeSent is used while this follower is in StateProbe. When ProbeSent is
    /// true, raft should pause sending replication message to this peer until
    /// ProbeSent is reset. See resume() and is_paused()
    pub probe_sent: bool,

    /// This is true if the progress is recently active. Receiving any messages
    /// from the corresponding follower indicates the progress is active.
    /// RecentActive can be reset to false after an election timeout.
    pub recent_active: bool,

    /// Set whenever the follower answered an append, cleared at each
    /// heartbeat. A replicating follower that stays silent over a whole
    /// heartbeat interval is probed again.
    pub heard_since_heartbeat: bool,

    /// Index of the snapshot being shipped while in `Snapshot`.
    pub pending_snapshot: u64,
    pub inflights: RingBuffer,

    /// Versions the follower reported in its last append reply,
    /// `None` until it has answered once.
    pub raft_version: Option<RaftVersion>,
    pub payload_version: PayloadVersion,

    /// The follower asked for our address in its last reply.
    pub wants_leader_address: bool,
}

impl Progress {
    pub fn new(next_index: u64, max_inflights: usize) -> Self {
        Progress {
            match_index: 0,
            next_index,
            state: Default::default(),
            probe_sent: false,
            recent_active: false,
            heard_since_heartbeat: false,
            pending_snapshot: 0,
            inflights: RingBuffer::new(max_inflights),
            raft_version: None,
            payload_version: 0,
            wants_leader_address: false,
        }
    }

    /// Detect if pause in each state of voters progress.
    ///
    /// If current voter's progress:
    /// * When in `Snapshot`: always paused, chunks are paced by their replies.
    /// * When in `Probe`: paused if `probe_sent` is true.
    /// * When in Replicate: paused if this replicated voter's
    /// messagebox (inflight message) is full.
    #[inline]
    pub fn is_paused(&self) -> bool {
        match self.state {
            ProgressState::Snapshot => true,
            ProgressState::Probe => self.probe_sent,
            ProgressState::Replicate => self.inflights.is_full(),
        }
    }

    /// Pause the `Probe` voter's progress, then Leader would
    /// not appending to this `Probe` follower.
    #[inline]
    pub fn pause(&mut self) {
        self.probe_sent = true;
    }

    /// Called when this peer has accepted an append. It resets
    /// ProbeSent to signal that additional append messages should be sent without
    /// further delay.
    #[inline]
    pub fn resume(&mut self) {
        self.probe_sent = false;
    }

    /// try_update is called when an ***AppendEntriesReply*** arrives from the follower, with the
    /// index acked by it. The method returns false if the given n index comes from
    /// an outdated message. Otherwise it updates the progress and returns true.
    /// ## Params
    /// * n_index: the index come from follower in the quorum (cluster)
    /// ## Returns
    /// * true if update succeed
    pub fn try_update(&mut self, n_index: u64) -> bool {
        let need_update: bool = self.match_index < n_index;
        if need_update {
            self.match_index = n_index;
            self.resume();
        }
        self.next_index = max(self.next_index, n_index + 1);
        need_update
    }

    /// Adjusts the Progress to the receipt of a rejected append. `rejected` is
    /// the previous index of the last probe, `probe_hint` the highest index
    /// the follower may still share with us.
    ///
    /// A replicating peer falls back to probing right after its match index,
    /// a probing peer is lowered to the hint but never below `match + 1`.
    /// Returns false when the rejection can't change anything (snapshot in flight).
    pub fn try_decr_to(&mut self, rejected: u64, probe_hint: u64) -> bool {
        match self.state {
            ProgressState::Snapshot => false,
            ProgressState::Replicate => {
                self.enter_probe();
                true
            }
            ProgressState::Probe => {
                self.next_index = max(min(rejected, probe_hint + 1), self.match_index + 1);
                self.resume();
                true
            }
        }
    }

    /// Push inflight messages to `Progress` and update `next_index` and return
    /// current state of the `State machine`
    #[inline]
    pub fn push_inflight(&mut self, last_index: u64) -> &ProgressState {
        match self.state {
            ProgressState::Snapshot => {
                panic!(
                    "Unexcepted state: {:?} when pushing inflght message index",
                    self.state
                )
            }
            ProgressState::Probe => self.pause(),
            ProgressState::Replicate => {
                self.next_index = last_index + 1;
                self.inflights.push_back(last_index);
            }
        }
        &self.state
    }

    /// Transfer state of current progress after a successful append.
    #[inline]
    pub fn next_state(&mut self, to_index: u64) -> &ProgressState {
        match self.state {
            ProgressState::Snapshot => {
                if self.is_snapshot_abort() {
                    self.enter_probe();
                }
            }
            ProgressState::Probe => self.enter_replicate(),
            ProgressState::Replicate => self.inflights.release_to(to_index),
        };
        &self.state
    }

    pub fn enter_snapshot(&mut self, snapshot_index: u64) {
        self.reset_state(ProgressState::Snapshot);
        self.pending_snapshot = snapshot_index;
    }

    pub fn enter_probe(&mut self) {
        match self.state {
            ProgressState::Snapshot => {
                // If the original state is ProgressStateSnapshot, progress knows that
                // the pending snapshot has been sent to this peer successfully, then
                // probes from pendingSnapshot + 1.
                let stashed_pending_snapshot = self.pending_snapshot;
                self.reset_state(ProgressState::Probe);
                self.next_index = max(stashed_pending_snapshot + 1, self.match_index + 1);
            }
            _ => {
                self.reset_state(ProgressState::Probe);
                self.next_index = self.match_index + 1;
            }
        }
    }

    pub fn enter_replicate(&mut self) {
        self.reset_state(ProgressState::Replicate);
        self.next_index = self.match_index + 1;
    }

    /// The follower installed the whole snapshot, it now holds everything
    /// up to the snapshot index.
    pub fn snapshot_installed(&mut self) {
        self.match_index = max(self.match_index, self.pending_snapshot);
        self.enter_probe();
    }

    fn reset_state(&mut self, new_state: ProgressState) {
        self.resume();
        self.state = new_state;
        self.pending_snapshot = 0;
        self.inflights.clear();
    }

    pub(crate) fn reset(&mut self, next_index: u64) {
        self.resume();
        self.next_index = next_index;
        self.pending_snapshot = 0;
        self.state = ProgressState::default();
        self.match_index = 0;
        self.recent_active = false;
        self.heard_since_heartbeat = false;
        self.wants_leader_address = false;
        self.inflights.clear();
    }

    /// If the progress in snapshot state but it's pending snapshot index
    /// is stale, it means that snapshot is abort
    fn is_snapshot_abort(&self) -> bool {
        self.state == ProgressState::Snapshot && self.match_index >= self.pending_snapshot
    }

    /// The version to speak with this follower, until it has answered once
    /// the given fallback is used.
    #[inline]
    pub fn negotiated_version(&self, local: RaftVersion, fallback: RaftVersion) -> RaftVersion {
        match self.raft_version {
            Some(reported) => local.min(reported),
            None => local.min(fallback),
        }
    }
}
