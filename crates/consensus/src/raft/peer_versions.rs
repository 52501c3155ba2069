use crate::protos::prelude::RaftVersion;
use crate::HashMap;

/// Protocol version spoken with every peer. A peer starts at the
/// configured initial version and moves to whatever it tagged its
/// traffic with, never above our own.
#[derive(Debug, Clone)]
pub struct PeerVersions {
    local: RaftVersion,
    initial: RaftVersion,
    reported: HashMap<u64, u8>,
}

impl PeerVersions {
    pub fn new(local: RaftVersion, initial: RaftVersion) -> Self {
        PeerVersions {
            local,
            initial: local.min(initial),
            reported: HashMap::default(),
        }
    }

    #[inline]
    pub fn local(&self) -> RaftVersion {
        self.local
    }

    /// Record the version tag seen on a frame (or in a reply) from `peer`.
    /// Returns true when the version to speak changed.
    pub fn observe(&mut self, peer: u64, tag: u8) -> bool {
        let before = self.version_for(peer);
        self.reported.insert(peer, tag);
        before != self.version_for(peer)
    }

    /// The version to encode traffic for `peer` with.
    pub fn version_for(&self, peer: u64) -> RaftVersion {
        match self.reported.get(&peer) {
            Some(tag) => self.local.negotiate(*tag),
            None => self.initial,
        }
    }

    pub fn forget(&mut self, peer: u64) {
        self.reported.remove(&peer);
    }
}
