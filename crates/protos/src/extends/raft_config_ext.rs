use std::fmt::Display;

use prost::Message;

use crate::raft_log_proto::{ClusterConfig, ServerInfo};

impl ServerInfo {
    #[inline]
    pub fn voter(id: u64) -> Self {
        ServerInfo { id, voting: true }
    }

    #[inline]
    pub fn non_voter(id: u64) -> Self {
        ServerInfo { id, voting: false }
    }
}

impl ClusterConfig {
    pub fn new(servers: Vec<ServerInfo>) -> Self {
        ClusterConfig { servers }
    }

    pub fn with_voters(voters: &[u64]) -> Self {
        ClusterConfig {
            servers: voters.iter().map(|id| ServerInfo::voter(*id)).collect(),
        }
    }

    pub fn voters(&self) -> Vec<u64> {
        self.servers.iter().filter(|s| s.voting).map(|s| s.id).collect()
    }

    pub fn non_voters(&self) -> Vec<u64> {
        self.servers.iter().filter(|s| !s.voting).map(|s| s.id).collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.servers.iter().map(|s| s.id)
    }

    #[inline]
    pub fn contains(&self, id: u64) -> bool {
        self.servers.iter().any(|s| s.id == id)
    }

    #[inline]
    pub fn is_voter(&self, id: u64) -> bool {
        self.servers.iter().any(|s| s.id == id && s.voting)
    }

    /// Majority of the voting members: `floor(voters / 2) + 1`.
    #[inline]
    pub fn quorum(&self) -> usize {
        self.voters().len() / 2 + 1
    }

    /// Add (or update) a member, keeping the original position of existing ones.
    pub fn upsert(&mut self, server: ServerInfo) {
        match self.servers.iter_mut().find(|s| s.id == server.id) {
            Some(exists) => exists.voting = server.voting,
            None => self.servers.push(server),
        }
    }

    pub fn remove(&mut self, id: u64) -> Option<ServerInfo> {
        let pos = self.servers.iter().position(|s| s.id == id)?;
        Some(self.servers.remove(pos))
    }

    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    #[inline]
    pub fn from_bytes(data: &[u8]) -> Result<Self, prost::DecodeError> {
        ClusterConfig::decode(data)
    }
}

impl Display for ClusterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let members = self
            .servers
            .iter()
            .map(|s| if s.voting { s.id.to_string() } else { format!("~{}", s.id) })
            .collect::<Vec<String>>()
            .join(" ");
        write!(f, "({})", members)
    }
}

#[cfg(test)]
mod tests {
    use crate::raft_log_proto::{ClusterConfig, ServerInfo};

    #[test]
    fn test_cluster_config_quorum() {
        let mut config = ClusterConfig::with_voters(&[1, 2, 3]);
        assert_eq!(config.quorum(), 2);
        config.upsert(ServerInfo::non_voter(4));
        // non-voting members never count.
        assert_eq!(config.quorum(), 2);
        config.upsert(ServerInfo::voter(4));
        assert_eq!(config.quorum(), 3);
        assert_eq!(config.ids().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(config.remove(2).map(|s| s.id), Some(2));
        assert_eq!(config.voters(), vec![1, 3, 4]);
        assert_eq!(format!("{}", config), "(1 3 4)");
    }

    #[test]
    fn test_cluster_config_bytes() {
        let config = ClusterConfig::new(vec![ServerInfo::voter(1), ServerInfo::non_voter(7)]);
        let decoded = ClusterConfig::from_bytes(&config.to_bytes()).unwrap();
        assert_eq!(decoded, config);
        assert_eq!(decoded.non_voters(), vec![7]);
    }
}
