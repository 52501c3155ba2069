use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::RaftConfig;

/// Default to 10000, compact the log every 10000 applied entries.
pub const PEER_COMPACT_LOG_THRESHOLD: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Take a snapshot of the state machine and compact the log once this
    /// many entries were applied since the last snapshot, 0 disables it and
    /// leaves compaction to [Peer::compact](crate::Peer::compact).
    pub compact_log_threshold: u64,
    /// consensus algorithm related-config, not changeable.
    pub consensus_config: RaftConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            compact_log_threshold: PEER_COMPACT_LOG_THRESHOLD,
            consensus_config: Default::default(),
        }
    }
}

impl Deref for PeerConfig {
    type Target = RaftConfig;

    fn deref(&self) -> &Self::Target {
        &self.consensus_config
    }
}

impl DerefMut for PeerConfig {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.consensus_config
    }
}

impl PeerConfig {
    pub fn new(id: u64) -> Self {
        Self {
            consensus_config: RaftConfig::new(id),
            ..Default::default()
        }
    }
}
