use std::{collections::VecDeque, fmt::Debug, mem};

use slog::{error, Logger};

use crate::protos::prelude::{ClusterConfig, Entry, Envelope, HardState, Snapshot};
use crate::{
    errors::*,
    raft::{raft_log::Stable, raft_role::RaftRole, SoftState},
};
use crate::{config::Config, raft::Raft, storage::Storage};

use self::status::Status;

pub mod raft_process;
pub mod ready;
pub mod status;

/// Everything the driver has to handle after the raft peer made progress,
/// in this order:
/// 1. persist `snapshot`, `unstable_entries` and `hard_state`.
/// 2. send the messages of the light ready.
/// 3. apply the committed entries of the light ready.
/// 4. `advance` and handle the returned [LightReady] the same way.
#[derive(Debug, Default, PartialEq)]
pub struct Ready {
    seq: u64,
    hard_state: Option<HardState>,
    soft_state: Option<SoftState>,
    /// The entries those store in inflights (memory) not persisted yet
    unstable_entries: Vec<Entry>,
    snapshot: Snapshot,
    /// Leader addresses learned from `AppendEntries`, (leader id, address).
    address_updates: Vec<(u64, String)>,
    light_rd: LightReady,
    must_sync: bool,
}

/// LightReady encapsulates the committed_index, committed_entries and
/// messages that are ready to be applied or be sent to other peers.
#[derive(Debug, Default, PartialEq)]
pub struct LightReady {
    /// The latest updated quorum's index (if has some).
    /// when `raft_log.maybe_commit` success, this value
    /// become Some(`raft_log.quorum_index`).
    committed_index: Option<u64>,
    committed_entries: Vec<Entry>,
    messages: Vec<Envelope>,
    /// The membership that took effect while handing out the committed
    /// entries, with the index of its entry. It must be persisted.
    cluster_config: Option<(ClusterConfig, u64)>,
}

#[derive(Default, Debug, PartialEq)]
struct ReadyRecord {
    seq: u64,
    last_entry: Option<(u64, u64)>,
    snapshot: Option<(u64, u64)>,
    messages: Vec<Envelope>,
}

pub struct RaftNode<STORAGE: Storage> {
    pub raft: Raft<STORAGE>,
    ready_records_number: u64,
    prev_soft_state: SoftState,
    prev_hard_state: HardState,
    records: VecDeque<ReadyRecord>,
    /// ## Description
    /// `since_committed_index` is dynamic index value, which could be increased when
    /// invoking `gen_light_ready` at `get_ready` and `advance_append`, it always use to
    /// mark the index up to which committed entries have been handed out.
    /// ### Update conditions
    /// * **After commit**: when quorum committed index has been changed, then `gen_light_ready`
    /// will refresh it to last stable entry's index.
    /// * **Recv Snapshot**: when received a snapshot from Leader, then refresh it to `snapshot.index`.
    /// ### Noting
    /// since_committed_index <= min(raft_log.persist, raft_log.quorum_index)
    /// ### From
    /// * config.applied, or the snapshot the storage starts from.
    since_committed_index: u64,
    messages: Vec<Envelope>,
    logger: Logger,
}

impl<STORAGE: Storage> Debug for RaftNode<STORAGE> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Peer({}): {:?}", self.role(), self.raft.id)
    }
}

/// Facade of the raft
impl<STORAGE: Storage> RaftNode<STORAGE> {
    pub fn new(store: STORAGE, conf: &Config, logger: &Logger) -> Result<Self> {
        let raft = Raft::new(store, conf, logger)?;
        let since_committed_index = conf.applied.max(raft.raft_log.first_index() - 1);
        let logger = raft.logger.clone();
        let mut node = RaftNode {
            raft,
            ready_records_number: 0,
            prev_soft_state: Default::default(),
            prev_hard_state: Default::default(),
            records: VecDeque::new(),
            since_committed_index,
            messages: Vec::new(),
            logger,
        };

        node.prev_soft_state = node.raft.soft_state();
        node.prev_hard_state = node.raft.hard_state();
        Ok(node)
    }

    /// Grabs the snapshot from the raft if available.
    #[inline]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.raft.snapshot_ref()
    }

    /// Status returns the current status of the given group.
    #[inline]
    pub fn status(&self) -> Status {
        Status::new(&self.raft)
    }

    #[inline]
    pub fn leader_id(&self) -> u64 {
        self.raft.leader_id
    }

    #[inline]
    pub fn role(&self) -> RaftRole {
        self.raft.current_raft_role
    }

    #[inline]
    pub fn prev_ss(&self) -> &SoftState {
        &self.prev_soft_state
    }

    #[inline]
    pub fn tick(&mut self) -> bool {
        self.raft.tick()
    }

    #[inline]
    pub fn campaign(&mut self) {
        self.raft.campaign()
    }

    pub fn persist_ready(&mut self, seq: u64) {
        let (mut index, mut term, mut snapshot_index) = (0, 0, 0);
        while let Some(mut record) = self.records.pop_front() {
            if record.seq > seq {
                self.records.push_front(record);
                break;
            }
            if let Some((idx, _)) = record.snapshot {
                index = 0;
                term = 0;
                snapshot_index = idx;
            }
            if let Some((idx, t)) = record.last_entry {
                index = idx;
                term = t;
            }
            if !record.messages.is_empty() {
                self.messages.append(&mut record.messages);
            }
        }

        if snapshot_index != 0 {
            self.raft.persist_snapshot(snapshot_index);
        }
        if index != 0 {
            self.raft.persist_entries(index, term);
        }
    }

    fn commit_ready(&mut self, ready: Ready) {
        if let Some(ss) = ready.soft_state {
            self.prev_soft_state = ss;
        }
        if let Some(hs) = ready.hard_state {
            self.prev_hard_state = hs;
        }

        let ready_record = match self.records.back() {
            Some(record) => record,
            None => return,
        };
        assert_eq!(ready_record.seq, ready.seq, "advance an outdated ready");

        let raft_peer = &mut self.raft;
        if let Some((index, _)) = ready_record.snapshot {
            // clear snapshot from unstable.
            raft_peer.raft_log.stable_snapshot(index);
        }
        if let Some((index, term)) = ready_record.last_entry {
            raft_peer.raft_log.stable_entries(index, term);
        }
    }

    #[inline]
    fn commit_apply(&mut self, applied_index: u64) {
        self.raft.commit_apply(applied_index)
    }

    #[inline]
    pub fn store(&self) -> &STORAGE {
        self.raft.store()
    }

    #[inline]
    pub fn mut_store(&mut self) -> &mut STORAGE {
        self.raft.mut_store()
    }

    /// This action will take committed entries from raft_log, install the
    /// membership carried by the committed conf change entries and collect
    /// the messages that may be sent now.
    fn gen_light_ready(&mut self) -> LightReady {
        let mut light_rd: LightReady = LightReady::default();
        // fetch the committed entries since applied index (to quorum committed or persisted) as committed_entries of lr
        light_rd.committed_entries = self
            .raft
            .raft_log
            .entries_stable_since(self.since_committed_index)
            .unwrap_or_default();

        // then update `since_committed_index` to last entry's index of committed entries
        if let Some(last_entry) = light_rd.committed_entries.last() {
            assert!(last_entry.index > self.since_committed_index);
            self.since_committed_index = last_entry.index;
        }

        for entry in light_rd.committed_entries.iter().filter(|entry| entry.is_conf_change()) {
            if entry.index <= self.raft.config_index {
                continue;
            }
            let config = match ClusterConfig::from_bytes(&entry.data) {
                Ok(config) => config,
                Err(err) => {
                    error!(self.logger, "undecodable conf change at {}: {}", entry.index, err);
                    continue;
                }
            };
            match self.raft.apply_cluster_config(&config, entry.index) {
                Ok(true) => light_rd.cluster_config = Some((config, entry.index)),
                Ok(false) => {}
                Err(err) => error!(self.logger, "failed to apply conf change at {}: {}", entry.index, err),
            }
        }

        if !self.messages.is_empty() {
            // take the messages from `record` queue after `persist_ready` in `advance_append` if it has some.
            mem::swap(&mut self.messages, &mut light_rd.messages);
        }

        // take messages from raft as a leader
        if self.raft.current_raft_role == RaftRole::Leader && !self.raft.messages.is_empty() {
            light_rd.give_message(&mut self.raft.messages);
        }
        light_rd
    }
}
