pub mod config;
pub mod raft;
pub mod raft_node;
use common::storage;

mod confchange;
mod quorum;

use common::protos;
use common::errors;

use raft::raft_tracker::configuration::Cluster;

/// In this situaion, we using fxhash for u64 type raft's id
pub type DefaultHashBuilder = std::hash::BuildHasherDefault<fxhash::FxHasher>;
pub type HashMap<K, V> = std::collections::HashMap<K, V, DefaultHashBuilder>;
pub type HashSet<K> = std::collections::HashSet<K, DefaultHashBuilder>;

pub mod prelude {
    pub use crate::{DefaultHashBuilder, HashMap, HashSet};
    pub use crate::{
        config as raft_config,
        raft::{
            self, *,
            peer_versions::*,
            raft_core::*,
            raft_log::*,
            raft_role::*,
            raft_tracker::*,
            snapshot_transfer::*,
        },
        raft_node::{
            self, *,
            raft_process::*,
            ready::*,
            status::*,
        },
        storage::*,
    };
}
