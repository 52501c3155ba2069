use std::collections::BTreeMap;

use crate::protos::prelude::{HardState, RaftVersion};

use crate::raft::raft_role::RaftRole;
use crate::raft::raft_tracker::progress_state::ProgressState;
use crate::raft::{Raft, SoftState};
use crate::storage::Storage;

/// How far the leader got with one member.
#[derive(Debug, Clone, PartialEq)]
pub struct Replication {
    pub match_index: u64,
    pub next_index: u64,
    pub state: ProgressState,
    pub voter: bool,
    /// Version traffic to this member is encoded with.
    pub version: RaftVersion,
}

/// A point in time view of a node, owned so it may outlive the borrow.
#[derive(Debug, Clone, Default)]
pub struct Status {
    pub id: u64,
    pub hard_state: HardState,
    pub soft_state: SoftState,
    pub applied_index: u64,
    /// The log starts right after this index.
    pub snapshot_index: u64,
    /// Whether a quorum heard from this leader recently.
    pub in_lease: bool,
    pub leader_address: Option<String>,
    /// Leader only, every member including the leader itself.
    pub replication: BTreeMap<u64, Replication>,
}

impl Status {
    pub fn new<S: Storage>(raft: &Raft<S>) -> Status {
        let soft_state = raft.soft_state();
        let replication = if soft_state.raft_state == RaftRole::Leader {
            raft.tracker
                .iter()
                .map(|(id, progress)| {
                    let replication = Replication {
                        match_index: progress.match_index,
                        next_index: progress.next_index,
                        state: progress.state,
                        voter: raft.tracker.is_voter(*id),
                        version: raft.peer_versions.version_for(*id),
                    };
                    (*id, replication)
                })
                .collect()
        } else {
            BTreeMap::new()
        };
        Status {
            id: raft.id,
            hard_state: raft.hard_state(),
            soft_state,
            applied_index: raft.raft_log.get_applied(),
            snapshot_index: raft.raft_log.first_index() - 1,
            in_lease: raft.in_lease(),
            leader_address: raft.leader_address.clone(),
            replication,
        }
    }

    #[inline]
    pub fn leader_id(&self) -> u64 {
        self.soft_state.leader_id
    }

    #[inline]
    pub fn role(&self) -> RaftRole {
        self.soft_state.raft_state
    }

    #[inline]
    pub fn is_leader(&self) -> bool {
        self.role() == RaftRole::Leader
    }

    pub fn voters(&self) -> Vec<u64> {
        self.replication
            .iter()
            .filter(|(_, replication)| replication.voter)
            .map(|(id, _)| *id)
            .collect()
    }
}
