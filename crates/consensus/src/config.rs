use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::protos::version::{PayloadVersion, RaftVersion};

pub mod raft_config_vals {
    /// default 1
    pub const RAFT_PEER_ID: u64 = 1u64;
    /// default 10
    pub const RAFT_ELECTION_TIMEOUT: usize = 10;
    /// default 2
    pub const RAFT_HEARTBEAT_TIMEOUT: usize = 2;

    pub const RAFT_MESSAGE_MAX_INFLIGHTS: usize = 256;

    pub const RAFT_RESTART_APPLIED_INDEX: u64 = 0;

    pub const RAFT_CHECK_QUORUM_ENABLE: bool = true;

    pub const RAFT_MAX_ENTRIES_PER_MESSAGE: u64 = 64;

    /// 2MB per snapshot chunk.
    pub const RAFT_SNAPSHOT_CHUNK_SIZE: usize = 2_048_000;

    pub const RAFT_PAYLOAD_VERSION: u16 = 0;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node ID, normal use to mark current physical node.
    pub id: u64,
    pub tick_election_timeout: usize,
    pub tick_election_timeout_max: usize,
    pub tick_election_timeout_min: usize,
    pub tick_heartbeat_timeout: usize,
    /// Leader steps down when it has not heard from a quorum
    /// within an election timeout.
    pub should_check_quorum: bool,
    pub max_inflight_messages: usize,
    pub max_entries_per_message: u64,
    pub snapshot_chunk_size: usize,
    /// Ticks to wait for a chunk reply before re-sending it,
    /// 0 means twice the election timeout.
    pub snapshot_reply_timeout: usize,
    pub raft_version: RaftVersion,
    /// Version assumed for a peer we never heard from. `None` means
    /// one version older than `raft_version`.
    pub initial_peer_version: Option<RaftVersion>,
    pub payload_version: PayloadVersion,
    pub applied: u64,
    /// Address of this node, when set followers track the address of
    /// their leader and ask for it if unknown.
    pub local_address: Option<String>,
    /// Fixed seed of the election timeout randomizer.
    pub election_seed: Option<u64>,
}

impl Config {
    pub fn new(id: u64) -> Self {
        Config {
            id,
            ..Default::default()
        }
    }

    /// The minimum number of ticks before an election.
    #[inline]
    pub fn min_election_tick(&self) -> usize {
        if self.tick_election_timeout_min == 0 {
            self.tick_election_timeout
        } else {
            self.tick_election_timeout_min
        }
    }

    /// The maximum number of ticks before an election.
    #[inline]
    pub fn max_election_tick(&self) -> usize {
        if self.tick_election_timeout_max == 0 {
            2 * self.tick_election_timeout
        } else {
            self.tick_election_timeout_max
        }
    }

    #[inline]
    pub fn snapshot_reply_tick(&self) -> usize {
        if self.snapshot_reply_timeout == 0 {
            2 * self.tick_election_timeout
        } else {
            self.snapshot_reply_timeout
        }
    }

    #[inline]
    pub fn initial_peer_version(&self) -> RaftVersion {
        self.initial_peer_version
            .or_else(|| self.raft_version.previous())
            .unwrap_or(self.raft_version)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id == 0 {
            return Err(Error::ConfigInvalid("invalid node id 0".to_owned()));
        }
        if self.tick_heartbeat_timeout == 0 {
            return Err(Error::ConfigInvalid("heartbeat tick must greater than 0".to_owned()));
        }
        if self.tick_election_timeout <= self.tick_heartbeat_timeout {
            return Err(Error::ConfigInvalid(
                "election tick must be greater than heartbeat tick".to_owned(),
            ));
        }
        let (min, max) = (self.min_election_tick(), self.max_election_tick());
        if min < self.tick_election_timeout {
            return Err(Error::ConfigInvalid(format!(
                "min election tick {} must not be less than election tick {}",
                min, self.tick_election_timeout
            )));
        }
        if min >= max {
            return Err(Error::ConfigInvalid(format!(
                "min election tick {} should be less than max election tick {}",
                min, max
            )));
        }
        if self.max_inflight_messages == 0 {
            return Err(Error::ConfigInvalid("max inflight messages must be greater than 0".to_owned()));
        }
        if self.snapshot_chunk_size == 0 {
            return Err(Error::ConfigInvalid("snapshot chunk size must be greater than 0".to_owned()));
        }
        if self.initial_peer_version() > self.raft_version {
            return Err(Error::ConfigInvalid(format!(
                "initial peer version {} is newer than local version {}",
                self.initial_peer_version(),
                self.raft_version
            )));
        }
        Ok(())
    }
}

use raft_config_vals as vals;
impl Default for Config {
    #[inline]
    fn default() -> Self {
        Config {
            id: vals::RAFT_PEER_ID,
            tick_election_timeout: vals::RAFT_ELECTION_TIMEOUT,
            tick_election_timeout_min: 0,
            tick_election_timeout_max: 0,
            tick_heartbeat_timeout: vals::RAFT_HEARTBEAT_TIMEOUT,
            should_check_quorum: vals::RAFT_CHECK_QUORUM_ENABLE,
            max_inflight_messages: vals::RAFT_MESSAGE_MAX_INFLIGHTS,
            max_entries_per_message: vals::RAFT_MAX_ENTRIES_PER_MESSAGE,
            snapshot_chunk_size: vals::RAFT_SNAPSHOT_CHUNK_SIZE,
            snapshot_reply_timeout: 0,
            raft_version: RaftVersion::CURRENT,
            initial_peer_version: None,
            payload_version: vals::RAFT_PAYLOAD_VERSION,
            applied: vals::RAFT_RESTART_APPLIED_INDEX,
            local_address: None,
            election_seed: None,
        }
    }
}
