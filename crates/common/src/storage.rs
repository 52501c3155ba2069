pub mod memory;

use crate::errors::Result;
use protos::raft_log_proto::*;

pub use memory::MemStorage;

/// What a node restores from at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaftState {
    pub hard_state: HardState,
    pub cluster_config: ClusterConfig,
    /// Log index of the entry that produced `cluster_config`,
    /// 0 for the bootstrap configuration.
    pub config_index: u64,
}

impl RaftState {
    pub fn new(hard_state: HardState, cluster_config: ClusterConfig, config_index: u64) -> RaftState {
        RaftState {
            hard_state,
            cluster_config,
            config_index,
        }
    }

    #[inline]
    pub fn initialized(&self) -> bool {
        !self.cluster_config.servers.is_empty()
    }
}

/// The durable side of a raft node. Reads are issued by the consensus
/// core, writes by the driver while handling a `Ready`. Every write must
/// be durable when it returns.
pub trait Storage: Send + Sync {
    fn initial_state(&self) -> Result<RaftState>;

    /// Entries in `[low, high)`, at most `max` of them (at least one is
    /// always returned when the range is not empty).
    fn entries(&self, low: u64, high: u64, max: Option<u64>) -> Result<Vec<Entry>>;

    fn term(&self, index: u64) -> Result<u64>;

    fn first_index(&self) -> Result<u64>;

    fn last_index(&self) -> Result<u64>;

    /// Prepare snapshot at `leader` side, then send it to
    /// `follower`. The snapshot must cover at least `request_index`.
    fn snapshot(&self, request_index: u64) -> Result<Snapshot>;

    /// Append entries, overwriting any existing suffix starting at the
    /// first given index.
    fn append(&self, entries: &[Entry]) -> Result<()>;

    fn set_hard_state(&self, hard_state: HardState) -> Result<()>;

    fn set_cluster_config(&self, config: ClusterConfig, index: u64) -> Result<()>;

    /// Replace the whole content with the snapshot received from the leader.
    fn apply_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Record a snapshot of the state machine taken at `index`.
    fn create_snapshot(&self, index: u64, data: Vec<u8>) -> Result<Snapshot>;

    /// Discard entries before `compact_index`.
    fn compact(&self, compact_index: u64) -> Result<()>;
}

pub const NO_LIMIT: u64 = u64::MAX;

pub fn limit_size<T: Clone>(entries: &mut Vec<T>, max: Option<u64>) {
    if entries.len() <= 1 {
        return;
    }
    let max = match max {
        None | Some(NO_LIMIT) => return,
        Some(max) => max.max(1),
    };
    entries.truncate(max as usize);
}
