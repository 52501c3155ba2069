use std::fmt::{self, Display};

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ProgressState {
    /// When leader raft starting to probe the log position, only one
    /// append is in flight until the follower answers.
    Probe,
    /// After leader probe the position of the rafts' log, then enter the replicate state
    Replicate,
    /// The follower is too far behind and is receiving a snapshot in chunks.
    Snapshot,
}

impl Default for ProgressState {
    fn default() -> Self {
        ProgressState::Probe
    }
}

impl Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            ProgressState::Probe => write!(f, "Probe"),
            ProgressState::Replicate => write!(f, "Replicate"),
            ProgressState::Snapshot => write!(f, "Snapshot"),
        }
    }
}
