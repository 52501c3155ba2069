use std::fmt::{self, Display};
use std::ops::Deref;

use crate::protos::raft_log_proto::ClusterConfig;
use crate::{quorum::{majority::Majority, Quorum}, HashSet};

use super::ProgressTracker;

/// The membership as the tracker sees it: a majority of voters plus the
/// non voting servers, with the config they were built from.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct Cluster {
    pub(crate) quorum: Majority,
    pub(crate) non_voters: HashSet<u64>,
    pub(crate) config: ClusterConfig,
}

impl Cluster {
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            quorum: config.voters().into_iter().collect(),
            non_voters: config.non_voters().into_iter().collect(),
            config: config.clone(),
        }
    }

    #[inline(always)]
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    #[inline(always)]
    pub fn voters(&self) -> &Majority {
        &self.quorum
    }

    #[inline(always)]
    pub fn non_voters(&self) -> &HashSet<u64> {
        &self.non_voters
    }

    #[inline]
    pub fn is_voter(&self, peer_id: u64) -> bool {
        self.quorum.contain_voter(peer_id)
    }

    #[inline]
    pub fn contains(&self, peer_id: u64) -> bool {
        self.is_voter(peer_id) || self.non_voters.contains(&peer_id)
    }

    pub fn clear(&mut self) {
        self.quorum.clear();
        self.non_voters.clear();
        self.config = ClusterConfig::default();
    }
}

impl Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config)
    }
}

impl Deref for ProgressTracker {
    type Target = Cluster;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.cluster
    }
}
