use std::ops::{Deref, DerefMut};

use rand::{rngs::StdRng, Rng, SeedableRng};
use slog::{debug, trace, Logger};

use crate::errors::*;
use crate::protos::prelude::{Envelope, PayloadVersion, RaftMessage};
use crate::{config::Config, storage::Storage, HashMap};

use super::{
    peer_versions::PeerVersions,
    raft_log::RaftLog,
    raft_role::RaftRole,
    snapshot_transfer::{SnapshotReceiver, SnapshotSender},
    DEFAULT_INITIAL_TERM, DUMMY_ID, DUMMY_INDEX,
};

/// The static part of a raft peer, taken from [Config] once at startup.
pub struct RaftConf {
    pub id: u64,
    pub max_inflight_msgs: usize,
    /// Max entries carried by one `AppendEntries`.
    pub max_msg_size: u64,
    pub check_quorum: bool,
    pub heartbeat_timeout: usize,
    pub election_timeout: usize,
    pub min_election_timeout: usize,
    pub max_election_timeout: usize,
    pub snapshot_chunk_size: usize,
    pub snapshot_reply_timeout: usize,
    pub payload_version: PayloadVersion,
    pub local_address: Option<String>,
}

impl RaftConf {
    pub fn new(conf: &Config) -> Self {
        RaftConf {
            id: conf.id,
            max_inflight_msgs: conf.max_inflight_messages,
            max_msg_size: conf.max_entries_per_message,
            check_quorum: conf.should_check_quorum,
            heartbeat_timeout: conf.tick_heartbeat_timeout,
            election_timeout: conf.tick_election_timeout,
            min_election_timeout: conf.min_election_tick(),
            max_election_timeout: conf.max_election_tick(),
            snapshot_chunk_size: conf.snapshot_chunk_size,
            snapshot_reply_timeout: conf.snapshot_reply_tick(),
            payload_version: conf.payload_version,
            local_address: conf.local_address.clone(),
        }
    }

    #[inline]
    pub fn min_election_timeout(&self) -> usize {
        self.min_election_timeout
    }

    #[inline]
    pub fn max_election_timeout(&self) -> usize {
        self.max_election_timeout
    }

    /// Only peers with an address of their own keep track of the leader's.
    #[inline]
    pub fn tracks_leader_address(&self) -> bool {
        self.local_address.is_some()
    }
}

impl<S: Storage> DerefMut for RaftCore<S> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conf
    }
}

impl<S: Storage> Deref for RaftCore<S> {
    type Target = RaftConf;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.conf
    }
}

/// Volatile and persistent state of one raft peer except the
/// per-follower bookkeeping, which lives in the tracker.
pub struct RaftCore<S: Storage> {
    pub term: u64,
    pub vote: u64,
    pub raft_log: RaftLog<S>,
    pub current_raft_role: RaftRole,
    promotable: bool,
    pub leader_id: u64,
    /// Address of `leader_id`, once the leader told us.
    pub leader_address: Option<String>,
    pub pending_conf_index: u64,
    /// Log index of the membership config currently in effect.
    pub config_index: u64,

    /// Logical clock, one unit per tick.
    pub now: u64,
    pub election_deadline: u64,
    pub heartbeat_deadline: u64,
    /// Leader only, the next point to verify a quorum is still around.
    pub quorum_check_deadline: u64,
    pub randomized_election_timeout: usize,
    rng: StdRng,

    pub peer_versions: PeerVersions,
    /// One transfer per follower in `Snapshot` state (leader side).
    pub snapshot_senders: HashMap<u64, SnapshotSender>,
    /// Partial snapshot coming from the leader (follower side).
    pub snapshot_receiver: SnapshotReceiver,

    pub logger: Logger,
    conf: RaftConf,
}

impl<S: Storage> RaftCore<S> {
    pub fn new(storage: S, conf: &Config, logger: Logger) -> Result<Self> {
        let rng = match conf.election_seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ conf.id),
            None => StdRng::from_entropy(),
        };
        Ok(RaftCore {
            term: DEFAULT_INITIAL_TERM,
            vote: DUMMY_ID,
            raft_log: RaftLog::new(storage, logger.clone())?,
            current_raft_role: RaftRole::Follower,
            promotable: false,
            leader_id: DUMMY_ID,
            leader_address: None,
            pending_conf_index: DUMMY_INDEX,
            config_index: DUMMY_INDEX,
            now: 0,
            election_deadline: 0,
            heartbeat_deadline: 0,
            quorum_check_deadline: 0,
            randomized_election_timeout: conf.min_election_tick(),
            rng,
            peer_versions: PeerVersions::new(conf.raft_version, conf.initial_peer_version()),
            snapshot_senders: HashMap::default(),
            snapshot_receiver: SnapshotReceiver::default(),
            logger,
            conf: RaftConf::new(conf),
        })
    }

    /// Stash mail to given mailbox, it's abstract RPC send.
    /// This method do not send message really, instead it'll stash the
    /// message to `raft.messages` and wait for the driver to flush them
    /// to the real transport once the matching `Ready` is persisted.
    pub fn send_to_mailbox(&self, to: u64, mail: RaftMessage, mailbox: &mut Vec<Envelope>) {
        let envelope = Envelope::new(self.id, to, mail);
        trace!(self.logger, "sending {}", envelope);
        mailbox.push(envelope);
    }

    #[inline]
    pub fn promotable(&self) -> bool {
        self.promotable
    }

    #[inline]
    pub fn set_promotable(&mut self, promotable: bool) {
        self.promotable = promotable
    }

    #[inline]
    pub fn has_pending_conf(&self) -> bool {
        self.pending_conf_index > self.raft_log.get_applied()
    }

    #[inline]
    pub fn pass_election_timeout(&self) -> bool {
        self.now >= self.election_deadline
    }

    /// Push the election deadline a fresh randomized timeout away.
    pub fn reset_election_deadline(&mut self) {
        let timeout = self
            .rng
            .gen_range(self.conf.min_election_timeout..self.conf.max_election_timeout);
        trace!(
            self.logger,
            "reset election timeout {prev} -> {cur}",
            prev = self.randomized_election_timeout,
            cur = timeout
        );
        self.randomized_election_timeout = timeout;
        self.election_deadline = self.now + timeout as u64;
    }

    /// Pin the election timeout, tests use this to script elections.
    pub fn set_randomized_election_timeout(&mut self, timeout: usize) {
        assert!(
            self.conf.min_election_timeout <= timeout && timeout < self.conf.max_election_timeout,
            "election timeout {} out of [{}, {})",
            timeout,
            self.conf.min_election_timeout,
            self.conf.max_election_timeout
        );
        self.randomized_election_timeout = timeout;
        self.election_deadline = self.now + timeout as u64;
    }

    #[inline]
    pub fn reset_heartbeat_deadline(&mut self) {
        self.heartbeat_deadline = self.now + self.conf.heartbeat_timeout as u64;
    }

    #[inline]
    pub fn reset_quorum_check_deadline(&mut self) {
        self.quorum_check_deadline = self.now + self.conf.election_timeout as u64;
    }

    /// Whether a follower still misses the address of its leader.
    #[inline]
    pub fn needs_leader_address(&self) -> bool {
        self.tracks_leader_address() && self.leader_id != DUMMY_ID && self.leader_address.is_none()
    }

    /// Switch to `leader_id`, forgetting the address of the previous one.
    pub fn follow(&mut self, leader_id: u64) {
        if self.leader_id != leader_id {
            debug!(self.logger, "leader changed {from} -> {to}", from = self.leader_id, to = leader_id; "term" => self.term);
            self.leader_address = None;
        }
        self.leader_id = leader_id;
    }
}
