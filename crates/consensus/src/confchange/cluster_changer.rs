use crate::errors::{Error, Result};
use crate::protos::raft_log_proto::ClusterConfig;
use crate::raft::raft_tracker::{ProgressMap, ProgressTracker};
use crate::raft::DUMMY_ID;
use crate::{Cluster, HashSet};

#[derive(Debug, PartialEq)]
pub enum ChangeType {
    AddPeer,
    RemovePeer,
}

/// The ChangeRecord is (peer_id, change), which mark the change of the cluster<br/>
/// E.g. (peer 1, AddPeer), (peer 1, RemovePeer)
#[derive(Debug, PartialEq)]
pub struct ChangeRecord(u64, ChangeType);

impl ChangeRecord {
    #[inline]
    pub fn get_peer(&self) -> u64 {
        self.0
    }

    #[inline]
    pub fn get_type(&self) -> &ChangeType {
        &self.1
    }
}

/// Used to collect changes of cluster.
#[derive(Debug)]
pub struct ChangeRecords<'a> {
    base: &'a ProgressMap,
    logs: Vec<ChangeRecord>,
}

impl ChangeRecords<'_> {
    fn new(tracker: &ProgressTracker) -> ChangeRecords {
        ChangeRecords {
            base: tracker.all_progress(),
            logs: vec![],
        }
    }

    fn append_change(&mut self, peer_id: u64, change: ChangeType) {
        self.logs.push(ChangeRecord(peer_id, change));
    }

    pub fn into_changes(self) -> Vec<ChangeRecord> {
        self.logs
    }

    fn contains(&self, peer_id: u64) -> bool {
        match self.logs.iter().rfind(|ChangeRecord(id, _)| *id == peer_id) {
            Some(ChangeRecord(_, ChangeType::AddPeer)) => true,
            Some(ChangeRecord(_, ChangeType::RemovePeer)) => false,
            None => self.base.contains_key(&peer_id),
        }
    }
}

/// Computes how the tracked membership moves to a new configuration.
pub struct ClusterChanger<'a> {
    tracker: &'a ProgressTracker,
}

impl ClusterChanger<'_> {
    pub fn new(tracker: &ProgressTracker) -> ClusterChanger {
        ClusterChanger { tracker }
    }

    /// Rebuild the tracker from a persisted (or received) configuration.
    pub fn restore(tracker: &mut ProgressTracker, next_index: u64, config: &ClusterConfig) -> Result<()> {
        let (cluster, changes) = ClusterChanger::new(tracker).change_to(config)?;
        tracker.apply_cluster_changes(cluster, changes, next_index);
        Ok(())
    }

    /// A configuration is acceptable when it names at least one voter
    /// and every server id is a real id appearing only once.
    pub fn validate(config: &ClusterConfig) -> Result<()> {
        if config.voters().is_empty() {
            return Err(Error::ConfChange(format!(
                "config {} must contain at least one voter",
                config
            )));
        }
        let mut seen = HashSet::default();
        for id in config.ids() {
            if id == DUMMY_ID {
                return Err(Error::ConfChange(format!("config {} contains id 0", config)));
            }
            if !seen.insert(id) {
                return Err(Error::ConfChange(format!(
                    "server {} appears twice in config {}",
                    id, config
                )));
            }
        }
        Ok(())
    }

    /// Diff the tracked members against `config`. Returns the cluster to
    /// install along with the progresses to create and drop.
    pub fn change_to(&self, config: &ClusterConfig) -> Result<(Cluster, Vec<ChangeRecord>)> {
        Self::validate(config)?;
        let mut records = ChangeRecords::new(self.tracker);
        for peer_id in config.ids() {
            if !records.contains(peer_id) {
                records.append_change(peer_id, ChangeType::AddPeer);
            }
        }
        let mut stale: Vec<u64> = self
            .tracker
            .all_progress()
            .keys()
            .filter(|peer_id| !config.contains(**peer_id))
            .cloned()
            .collect();
        stale.sort_unstable();
        for peer_id in stale {
            records.append_change(peer_id, ChangeType::RemovePeer);
        }
        Ok((Cluster::new(config), records.into_changes()))
    }
}
