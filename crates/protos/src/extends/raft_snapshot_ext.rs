use crate::raft_log_proto::{ClusterConfig, Snapshot, SnapshotMetadata};

static EMPTY_METADATA: SnapshotMetadata = SnapshotMetadata {
    config: None,
    index: 0,
    term: 0,
};

impl Snapshot {
    pub fn new(index: u64, term: u64, config: Option<ClusterConfig>, data: Vec<u8>) -> Self {
        Snapshot {
            data,
            metadata: Some(SnapshotMetadata { config, index, term }),
        }
    }

    pub fn get_metadata(&self) -> &SnapshotMetadata {
        self.metadata.as_ref().unwrap_or(&EMPTY_METADATA)
    }

    /// A snapshot at index 0 stands for "nothing compacted yet".
    pub fn is_empty(&self) -> bool {
        self.get_metadata().index == 0
    }

    pub fn get_metadata_mut(&mut self) -> &mut SnapshotMetadata {
        self.metadata.get_or_insert_with(SnapshotMetadata::default)
    }

    pub fn take_metadata(&mut self) -> SnapshotMetadata {
        self.metadata.take().unwrap_or_default()
    }
}

impl SnapshotMetadata {
    #[inline]
    pub fn get_config(&self) -> Option<&ClusterConfig> {
        self.config.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use crate::raft_log_proto::{ClusterConfig, Snapshot};

    #[test]
    fn test_snapshot_metadata() {
        let empty = Snapshot::default();
        assert!(empty.is_empty());
        assert_eq!(empty.get_metadata().term, 0);

        let snap = Snapshot::new(100, 3, Some(ClusterConfig::with_voters(&[1, 2, 3])), b"state".to_vec());
        assert!(!snap.is_empty());
        assert_eq!(snap.get_metadata().index, 100);
        assert_eq!(snap.get_metadata().get_config().map(|c| c.voters().len()), Some(3));
    }
}
