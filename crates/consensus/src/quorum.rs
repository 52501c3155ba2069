pub mod majority;

use std::fmt::{self, Display};

/// Abstraction of quorum, it's always act as a group of raft and provide
/// some functions like determine vote result of this raft group, calculate
/// the committed index of raft group etc...
pub trait Quorum {
    /// Determine if there exists specific voter then true
    fn contain_voter(&self, peer_id: u64) -> bool;

    /// Computes the committed index from those supplied via the
    /// provided AckedIndexer.
    ///
    /// Eg. If the matched indexes are `[2,2,2,4,5]`, it will return 2.
    fn committed_index(&self, acked_voters: &impl AckedIndexer) -> u64;

    fn vote_result(&self, vote_check: impl Fn(u64) -> Option<bool>) -> VoteResult;

    /// Clear the voters in the quorum. E.g. remove them from the vector.
    fn clear(&mut self);
}

/// Enum of vote result, now we provide 3 kinds result type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoteResult {
    /// Won indicates that the quorum has voted "yes". "yes" votes more `majority(total: usize)`
    Won,
    /// Pending indicates that the decision of the vote depends on future
    /// votes, i.e. neither "yes" nor "no" has reached quorum yet.
    Pending,
    Lost,
}

/// Abstract acked (response for append) raft indexer
pub trait AckedIndexer {
    /// Find acked index of the voter via it's id
    fn acked_index(&self, voter_id: u64) -> Option<u64>;
}

impl Display for VoteResult {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteResult::Won => write!(f, "VoteWon"),
            VoteResult::Lost => write!(f, "VoteLost"),
            VoteResult::Pending => write!(f, "VotePending"),
        }
    }
}
