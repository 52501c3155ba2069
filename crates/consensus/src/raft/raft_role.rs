use std::fmt::{self, Display};

pub mod raft_candidate;
pub mod raft_follower;
pub mod raft_leader;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum RaftRole {
    /// The node is a leader.
    Leader,
    /// The node could become a leader.
    Candidate,
    /// The node is a follower of the leader.
    Follower,
}

impl RaftRole {
    #[inline]
    pub fn is_leader(&self) -> bool {
        matches!(self, RaftRole::Leader)
    }
}

impl Display for RaftRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            Self::Leader => write!(f, "Leader"),
            Self::Follower => write!(f, "Follower"),
            Self::Candidate => write!(f, "Candidate"),
        }
    }
}

impl From<&str> for RaftRole {
    fn from(case: &str) -> Self {
        let lowcase = case.to_lowercase();
        match lowcase.as_str() {
            "leader" => Self::Leader,
            "candidate" => Self::Candidate,
            _ => Self::Follower,
        }
    }
}

impl Default for RaftRole {
    fn default() -> Self {
        RaftRole::Follower
    }
}
