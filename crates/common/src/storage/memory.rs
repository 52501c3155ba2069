use std::cmp;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::{Error, Result, StorageError};
use crate::protos::raft_log_proto::*;

use super::{limit_size, RaftState, Storage};

/// The Memory Storage Core instance holds the actual state of the storage struct. To access this
/// value, use the `rl` and `wl` functions on the main MemStorage implementation.
#[derive(Default)]
pub struct MemStorageCore {
    raft_state: RaftState,
    // entries[i] has raft log position i+snapshot.get_metadata().index+1
    entries: Vec<Entry>,
    // The last snapshot recorded or received, data included.
    snapshot: Snapshot,
    // If it is true, the next snapshot will return a
    // SnapshotTemporarilyUnavailable error.
    trigger_snap_unavailable: bool,
}

impl MemStorageCore {
    /// Get the hard state.
    pub fn hard_state(&self) -> &HardState {
        &self.raft_state.hard_state
    }

    fn first_index(&self) -> u64 {
        match self.entries.first() {
            Some(entry) => entry.index,
            None => self.snapshot.get_metadata().index + 1,
        }
    }

    fn last_index(&self) -> u64 {
        match self.entries.last() {
            Some(entry) => entry.index,
            None => self.snapshot.get_metadata().index,
        }
    }

    fn term(&self, index: u64) -> Result<u64> {
        let meta = self.snapshot.get_metadata();
        if index == meta.index {
            return Ok(meta.term);
        }
        let offset = self.first_index();
        if index < offset {
            return Err(Error::Store(StorageError::Compacted));
        } else if index > self.last_index() {
            return Err(Error::Store(StorageError::Unavailable));
        }
        Ok(self.entries[(index - offset) as usize].term)
    }

    /// Overwrites the contents of this Storage object with those of the given snapshot.
    /// ## Err
    /// Return Err if snapshot index is less than the storage's snapshot index.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> Result<()> {
        let meta = snapshot.get_metadata();
        let index = meta.index;

        if self.snapshot.get_metadata().index > index {
            return Err(Error::Store(StorageError::SnapshotOutOfDate));
        }

        let hard_state = &mut self.raft_state.hard_state;
        if meta.term > hard_state.term {
            hard_state.term = meta.term;
            hard_state.vote = 0;
        }
        hard_state.commit = index;
        self.entries.clear();

        if let Some(config) = meta.get_config() {
            self.raft_state.cluster_config = config.clone();
            self.raft_state.config_index = index;
        }
        self.snapshot = snapshot;
        Ok(())
    }

    pub fn create_snapshot(&mut self, index: u64, data: Vec<u8>) -> Result<Snapshot> {
        if index <= self.snapshot.get_metadata().index {
            return Err(Error::Store(StorageError::SnapshotOutOfDate));
        }
        if index > self.raft_state.hard_state.commit {
            panic!(
                "snapshot index {} is larger than commit {}",
                index, self.raft_state.hard_state.commit
            );
        }
        let term = self.term(index)?;
        let config = Some(self.raft_state.cluster_config.clone());
        self.snapshot = Snapshot::new(index, term, config, data);
        Ok(self.snapshot.clone())
    }

    /// Discards all log entries prior to compact_index.
    /// It is the application's responsibility to not attempt to compact an index
    /// greater than RaftLog.applied.
    /// ## Err
    /// Return Err if the entries to discard are not covered by the snapshot.
    pub fn compact(&mut self, compact_index: u64) -> Result<()> {
        if compact_index <= self.first_index() {
            // Don't need to treat this case as an error.
            return Ok(());
        }
        if compact_index > self.snapshot.get_metadata().index + 1 {
            return Err(Error::Store(StorageError::Unavailable));
        }
        if let Some(entry) = self.entries.first() {
            let offset = cmp::min(compact_index - entry.index, self.entries.len() as u64);
            self.entries.drain(..offset as usize);
        }
        Ok(())
    }

    /// Append the new entries to storage.
    pub fn append(&mut self, ents: &[Entry]) -> Result<()> {
        if ents.is_empty() {
            return Ok(());
        }
        if self.first_index() > ents[0].index {
            panic!(
                "overwrite compacted raft logs, compacted: {}, append: {}",
                self.first_index() - 1,
                ents[0].index,
            );
        }
        if self.last_index() + 1 < ents[0].index {
            panic!(
                "raft logs should be continuous, last index: {}, new appended: {}",
                self.last_index(),
                ents[0].index,
            );
        }

        // Remove all entries overwritten by `ents`.
        let diff = ents[0].index - self.first_index();
        self.entries.drain(diff as usize..);
        self.entries.extend_from_slice(ents);
        Ok(())
    }

    /// Trigger a SnapshotTemporarilyUnavailable error.
    pub fn trigger_snap_unavailable(&mut self) {
        self.trigger_snap_unavailable = true;
    }

    /// Return the entries size.
    #[inline]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn get_entries(&self) -> &Vec<Entry> {
        &self.entries
    }
}

/// Volatile storage for tests and embedded use. Clones share the same core.
#[derive(Clone, Default)]
pub struct MemStorage {
    core: Arc<RwLock<MemStorageCore>>,
}

impl MemStorage {
    /// An empty storage, e.g. a server about to join an existing cluster.
    pub fn new() -> Self {
        MemStorage::default()
    }

    /// A storage bootstrapped with the initial membership.
    pub fn new_with_config(config: ClusterConfig) -> Self {
        let store = MemStorage::new();
        store.wl().raft_state.cluster_config = config;
        store
    }

    pub fn rl(&self) -> RwLockReadGuard<'_, MemStorageCore> {
        self.core.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wl(&self) -> RwLockWriteGuard<'_, MemStorageCore> {
        self.core.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemStorage {
    fn initial_state(&self) -> Result<RaftState> {
        Ok(self.rl().raft_state.clone())
    }

    fn entries(&self, low: u64, high: u64, max_size: Option<u64>) -> Result<Vec<Entry>> {
        let core = self.rl();
        if low < core.first_index() {
            return Err(Error::Store(StorageError::Compacted));
        }
        if high > core.last_index() + 1 {
            panic!(
                "index out of bound (last: {}, high: {})",
                core.last_index() + 1,
                high
            );
        }
        if low >= high {
            return Ok(Vec::new());
        }
        let offset = core.first_index();
        let lo = (low - offset) as usize;
        let hi = (high - offset) as usize;
        let mut result = core.entries[lo..hi].to_vec();
        limit_size(&mut result, max_size);
        Ok(result)
    }

    fn term(&self, index: u64) -> Result<u64> {
        self.rl().term(index)
    }

    fn first_index(&self) -> Result<u64> {
        Ok(self.rl().first_index())
    }

    fn last_index(&self) -> Result<u64> {
        Ok(self.rl().last_index())
    }

    fn snapshot(&self, request_index: u64) -> Result<Snapshot> {
        let mut core = self.wl();
        if core.trigger_snap_unavailable {
            core.trigger_snap_unavailable = false;
            return Err(Error::Store(StorageError::SnapshotTemporarilyUnavailable));
        }
        if core.snapshot.get_metadata().index < request_index {
            return Err(Error::Store(StorageError::SnapshotTemporarilyUnavailable));
        }
        Ok(core.snapshot.clone())
    }

    fn append(&self, entries: &[Entry]) -> Result<()> {
        self.wl().append(entries)
    }

    fn set_hard_state(&self, hard_state: HardState) -> Result<()> {
        self.wl().raft_state.hard_state = hard_state;
        Ok(())
    }

    fn set_cluster_config(&self, config: ClusterConfig, index: u64) -> Result<()> {
        let mut core = self.wl();
        core.raft_state.cluster_config = config;
        core.raft_state.config_index = index;
        Ok(())
    }

    fn apply_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.wl().apply_snapshot(snapshot)
    }

    fn create_snapshot(&self, index: u64, data: Vec<u8>) -> Result<Snapshot> {
        self.wl().create_snapshot(index, data)
    }

    fn compact(&self, compact_index: u64) -> Result<()> {
        self.wl().compact(compact_index)
    }
}

#[cfg(test)]
mod tests {
    use super::MemStorage;
    use crate::errors::{Error, StorageError};
    use crate::protos::raft_log_proto::*;
    use crate::storage::Storage;

    fn entries(from: u64, to: u64, term: u64) -> Vec<Entry> {
        (from..=to)
            .map(|index| Entry::new(EntryType::EntryNormal, term, index, vec![index as u8]))
            .collect()
    }

    #[test]
    fn test_append_and_truncate() {
        let store = MemStorage::new_with_config(ClusterConfig::with_voters(&[1, 2, 3]));
        assert_eq!(store.first_index().unwrap(), 1);
        assert_eq!(store.last_index().unwrap(), 0);

        store.append(&entries(1, 5, 1)).unwrap();
        assert_eq!(store.last_index().unwrap(), 5);
        // overwrite the suffix from index 4.
        store.append(&entries(4, 4, 2)).unwrap();
        assert_eq!(store.last_index().unwrap(), 4);
        assert_eq!(store.term(4).unwrap(), 2);
        assert_eq!(store.term(3).unwrap(), 1);
        assert_eq!(store.entries(2, 5, Some(2)).unwrap().len(), 2);
        assert_eq!(store.term(5), Err(Error::Store(StorageError::Unavailable)));
    }

    #[test]
    fn test_snapshot_and_compact() {
        let store = MemStorage::new_with_config(ClusterConfig::with_voters(&[1]));
        store.append(&entries(1, 10, 1)).unwrap();
        store.set_hard_state(HardState::new(1, 1, 8)).unwrap();

        let snapshot = store.create_snapshot(8, b"state".to_vec()).unwrap();
        assert_eq!(snapshot.get_metadata().index, 8);
        assert_eq!(snapshot.get_metadata().term, 1);
        store.compact(9).unwrap();
        assert_eq!(store.first_index().unwrap(), 9);
        assert_eq!(store.term(8).unwrap(), 1);
        assert_eq!(store.entries(5, 9, None), Err(Error::Store(StorageError::Compacted)));
        assert_eq!(store.snapshot(8).unwrap().data, b"state".to_vec());
        assert_eq!(
            store.snapshot(9),
            Err(Error::Store(StorageError::SnapshotTemporarilyUnavailable))
        );
        // can't discard what the snapshot doesn't cover.
        assert!(store.compact(10).is_err());
        assert_eq!(
            store.create_snapshot(7, vec![]),
            Err(Error::Store(StorageError::SnapshotOutOfDate))
        );
    }

    #[test]
    fn test_apply_snapshot() {
        let store = MemStorage::new();
        store.append(&entries(1, 3, 1)).unwrap();
        store.set_hard_state(HardState::new(1, 2, 3)).unwrap();
        let config = ClusterConfig::with_voters(&[1, 2]);
        store
            .apply_snapshot(Snapshot::new(20, 3, Some(config.clone()), b"remote".to_vec()))
            .unwrap();
        assert_eq!(store.first_index().unwrap(), 21);
        assert_eq!(store.last_index().unwrap(), 20);
        let state = store.initial_state().unwrap();
        // the vote was cast in an older term.
        assert_eq!(state.hard_state, HardState::new(3, 0, 20));
        assert_eq!(state.cluster_config, config);
        assert_eq!(state.config_index, 20);
        assert!(store.apply_snapshot(Snapshot::new(10, 2, None, vec![])).is_err());
    }
}
