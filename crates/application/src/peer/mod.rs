//! Module of raft peer, the driver of one consensus node. It owns the node
//! together with its storage, the state machine and the way out to other
//! peers, and handles every input in the same order:
//! * step the input (tick, frame, proposal) into the node
//! * persist what the resulting `Ready` asks for
//! * send the messages, each encoded for the version its receiver speaks
//! * apply the committed entries, then advance the node

pub mod config;
mod ready;

use std::fmt::Debug;

use slog::{debug, info, o, warn, Logger};

use self::config::PeerConfig;
use crate::{
    mailbox::Transport,
    protos::prelude::{codec, ClusterConfig},
    state_machine::StateMachine,
    storage::Storage,
    ConsensusError, RaftResult, RaftRole, RaftStatus,
};
use common::errors::StorageError;
use common::protocol::proposal::Proposed;
use consensus::raft::DUMMY_INDEX;
use consensus::raft_node::{raft_process::RaftProcess, RaftNode};

pub struct Peer<S: Storage, M: StateMachine, T: Transport> {
    node: RaftNode<S>,
    machine: M,
    transport: T,
    compact_log_threshold: u64,
    /// Index of the latest snapshot taken or installed.
    snapshot_index: u64,
    logger: Logger,
}

impl<S: Storage, M: StateMachine, T: Transport> Debug for Peer<S, M, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id())
            .field("role", &self.role())
            .field("leader_id", &self.leader_id())
            .field("applied", &self.applied_index())
            .field("snapshot_index", &self.snapshot_index)
            .finish()
    }
}

impl<S: Storage, M: StateMachine, T: Transport> Peer<S, M, T> {
    /// Start a peer on `store`. When the store holds a snapshot newer than
    /// `conf.applied`, the state machine is restored from it first and the
    /// committed entries after it are replayed as the node catches up.
    pub fn new(store: S, mut machine: M, transport: T, conf: &PeerConfig, logger: &Logger) -> RaftResult<Self> {
        let snapshot = store.snapshot(DUMMY_INDEX)?;
        let snapshot_index = snapshot.get_metadata().index;
        let node = RaftNode::new(store, &conf.consensus_config, logger)?;
        let logger = logger.new(o!("peer" => conf.id));
        if snapshot_index > conf.applied {
            machine.restore(&snapshot.data)?;
            info!(logger, "restored state machine from snapshot"; "index" => snapshot_index);
        }
        let mut peer = Peer {
            node,
            machine,
            transport,
            compact_log_threshold: conf.compact_log_threshold,
            snapshot_index,
            logger,
        };
        // committed entries not applied yet are handed out right away.
        peer.handle_ready()?;
        Ok(peer)
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.node.raft.id
    }

    #[inline]
    pub fn role(&self) -> RaftRole {
        self.node.role()
    }

    #[inline]
    pub fn leader_id(&self) -> u64 {
        self.node.leader_id()
    }

    #[inline]
    pub fn is_leader(&self) -> bool {
        self.role() == RaftRole::Leader
    }

    #[inline]
    pub fn term(&self) -> u64 {
        self.node.raft.term
    }

    #[inline]
    pub fn applied_index(&self) -> u64 {
        self.node.raft.raft_log.get_applied()
    }

    #[inline]
    pub fn snapshot_index(&self) -> u64 {
        self.snapshot_index
    }

    #[inline]
    pub fn status(&self) -> RaftStatus {
        self.node.status()
    }

    #[inline]
    pub fn node(&self) -> &RaftNode<S> {
        &self.node
    }

    #[inline]
    pub fn store(&self) -> &S {
        self.node.store()
    }

    #[inline]
    pub fn machine(&self) -> &M {
        &self.machine
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Advance the logical clock by one tick.
    pub fn tick(&mut self) -> RaftResult<()> {
        self.node.tick();
        self.handle_ready()
    }

    /// Start an election right away instead of waiting for the timeout.
    pub fn campaign(&mut self) -> RaftResult<()> {
        self.node.campaign();
        self.handle_ready()
    }

    /// Feed a frame another peer sent us. The version tag of the frame is
    /// what we answer that peer with from now on (never above our own).
    pub fn receive(&mut self, frame: &[u8]) -> RaftResult<()> {
        let (tag, envelope) = codec::decode_frame(frame)?;
        if envelope.to != self.id() {
            warn!(self.logger, "dropped a frame addressed to {}", envelope.to; "from" => envelope.from);
            return Ok(());
        }
        let from = envelope.from;
        if self.node.raft.peer_versions.observe(from, tag) {
            debug!(
                self.logger,
                "speak {} with {}",
                self.node.raft.peer_versions.version_for(from),
                from
            );
        }
        match self.node.step(envelope) {
            Ok(()) => {}
            Err(ConsensusError::StepPeerNotFound) => {
                debug!(self.logger, "ignored a reply from {} which is not a member", from);
                return Ok(());
            }
            Err(err) => return Err(err),
        }
        self.handle_ready()
    }

    /// Append `payload` to the log, leader only. It's applied once the
    /// returned index shows up committed.
    pub fn propose(&mut self, payload: Vec<u8>) -> RaftResult<Proposed> {
        let proposed = self.node.raft.propose(payload)?;
        self.handle_ready()?;
        Ok(proposed)
    }

    /// Replace the membership with `config`, leader only. The new
    /// membership takes effect once its entry is applied.
    pub fn propose_conf_change(&mut self, config: ClusterConfig) -> RaftResult<Proposed> {
        let proposed = self.node.raft.propose_conf_change(config)?;
        self.handle_ready()?;
        Ok(proposed)
    }

    /// Snapshot the state machine at the applied index and drop the log up
    /// to there. Returns the index of the snapshot taken, `None` when
    /// nothing was applied since the last one.
    pub fn compact(&mut self) -> RaftResult<Option<u64>> {
        let applied = self.applied_index();
        if applied <= self.snapshot_index {
            return Ok(None);
        }
        let data = self.machine.snapshot()?;
        let store = self.node.store();
        match store.create_snapshot(applied, data) {
            Ok(_) => {}
            Err(ConsensusError::Store(StorageError::SnapshotOutOfDate)) => return Ok(None),
            Err(err) => return Err(err),
        }
        store.compact(applied + 1)?;
        self.snapshot_index = applied;
        info!(self.logger, "compacted log"; "snapshot index" => applied);
        Ok(Some(applied))
    }
}
