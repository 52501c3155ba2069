pub mod configuration;
pub mod inflights;
pub mod progress;
pub mod progress_state;

use configuration::Cluster;
use progress::Progress;

use crate::confchange::cluster_changer::{ChangeRecord, ChangeType::*};
use crate::quorum::{AckedIndexer, Quorum, VoteResult};
use crate::{DefaultHashBuilder, HashMap, HashSet};

pub type ProgressMap = HashMap<u64, Progress>;
impl AckedIndexer for ProgressMap {
    fn acked_index(&self, voter_id: u64) -> Option<u64> {
        self.get(&voter_id).map(|progress| progress.match_index)
    }
}

#[derive(Clone)]
pub struct ProgressTracker {
    /// progress include both non-voters and voters
    progress: ProgressMap,
    /// vote records only tracking the vote result of each voters.
    vote_records: HashMap<u64, bool>,
    /// the max length of inflights in each Progress
    pub(crate) max_inflight: usize,
    cluster: Cluster,
}

impl ProgressTracker {
    pub fn empty(max_inflight: usize) -> Self {
        Self::initial_capacity(0, max_inflight)
    }

    pub fn initial_capacity(members: usize, max_inflight: usize) -> Self {
        ProgressTracker {
            progress: HashMap::with_capacity_and_hasher(members, DefaultHashBuilder::default()),
            vote_records: HashMap::with_capacity_and_hasher(members, DefaultHashBuilder::default()),
            max_inflight,
            cluster: Cluster::default(),
        }
    }

    /// Fetch all voters ids (iterator) from quorum
    #[inline]
    pub fn all_voters(&self) -> impl Iterator<Item = u64> + '_ {
        self.cluster.quorum.ids().cloned()
    }

    #[inline]
    pub fn all_progress(&self) -> &ProgressMap {
        &self.progress
    }

    /// Returns an iterator across all the nodes and their progress.
    ///
    /// **Note:** Do not use this for majority/quorum calculation, non-voters
    /// are tracked here as well. Use `has_reached_quorum` instead.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&u64, &Progress)> {
        self.progress.iter()
    }

    /// Returns a mutable iterator across all the nodes and their progress.
    #[inline]
    pub fn iter_mut(&mut self) -> impl ExactSizeIterator<Item = (&u64, &mut Progress)> {
        self.progress.iter_mut()
    }

    /// Detect if quorum is only 1 peer.
    #[inline]
    pub fn is_standalone_mode(&self) -> bool {
        self.cluster.quorum.len() == 1
    }

    pub fn clear(&mut self) {
        self.progress.clear();
        self.cluster.clear();
        self.vote_records.clear();
    }

    #[inline(always)]
    pub fn cluster_info(&self) -> &Cluster {
        &self.cluster
    }

    #[inline]
    pub fn is_voter(&self, peer_id: u64) -> bool {
        self.cluster.is_voter(peer_id)
    }

    /// Whether `peer_id` is a member, voter or not.
    #[inline]
    pub fn contains(&self, peer_id: u64) -> bool {
        self.cluster.contains(peer_id)
    }

    pub fn apply_cluster_changes(
        &mut self,
        updated_cluster: Cluster,
        changes: Vec<ChangeRecord>,
        from_next_idx: u64,
    ) {
        self.cluster = updated_cluster;
        for change in changes.iter() {
            let peer_id = change.get_peer();
            match change.get_type() {
                AddPeer => {
                    let mut new_progress = Progress::new(from_next_idx, self.max_inflight);
                    new_progress.recent_active = true;
                    self.progress.insert(peer_id, new_progress);
                }
                RemovePeer => {
                    self.progress.remove(&peer_id);
                }
            }
        }
    }

    /// Same as `quorum_recently_active` without resetting the marks,
    /// used to answer lease queries between two checks.
    pub fn quorum_active(&self, perspective_of_raft: u64) -> bool {
        let active: HashSet<u64> = self
            .progress
            .iter()
            .filter(|(peer_id, progress)| **peer_id == perspective_of_raft || progress.recent_active)
            .map(|(peer_id, _)| *peer_id)
            .collect();
        self.has_reached_quorum(&active)
    }
}

/// Tally vote result of an election (vote_records table)
/// ## Params
/// * "granted" vote number
/// * "reject" vote number
/// * VoteResult after tally vote from vote_records
pub type TallyVoteResult = (usize, usize, VoteResult);

/// The features of the Raft progress manager.
/// This manager will manage all raft nodes in cluster
/// and provide some functions, e.g. determine quorum of
/// these given raft nodes, record vote of these rafts etc...
pub trait RaftManager {
    /// Grabs a reference to the progress of a node.
    fn get(&self, id: u64) -> Option<&Progress>;

    /// Grabs a mutable reference to the progress of a node.
    fn get_mut(&mut self, id: u64) -> Option<&mut Progress>;

    fn record_vote(&mut self, peer_id: u64, vote: bool);

    /// TallyVotes returns the number of granted and rejected Votes, and whether the
    /// election outcome is known.
    /// ## Returns
    /// * TallyVoteResult (granted, reject, VoteResult)
    fn tally_votes(&self) -> TallyVoteResult;

    /// Clear the records (counting via `record_vote`) from the vote table
    fn reset_votes(&mut self);

    /// Returns the Candidate's eligibility in the current election.
    fn vote_result(&self, votes: &HashMap<u64, bool>) -> VoteResult;

    /// check all progresses in state machine and detect if
    /// quorum still active (majority progress's recent_active, include me)
    /// then reset recent_active of these progress (exclude me) to false.
    fn quorum_recently_active(&mut self, perspective_of: u64) -> bool;

    /// The highest index replicated on a majority of voters.
    fn quorum_committed_index(&self) -> u64;

    /// Determine if a quorum is formed from the given set of nodes.
    ///
    /// This is the only correct way to verify you have reached a quorum for the whole group.
    /// ## Params
    /// * raft_set: the `potential quorum` formed from set of rafts
    /// ## Returns
    /// * has_reached: given raft set maybe reached the quorum, maybe not
    fn has_reached_quorum(&self, raft_set: &HashSet<u64>) -> bool;
}

impl RaftManager for ProgressTracker {
    #[inline]
    fn get(&self, id: u64) -> Option<&Progress> {
        self.progress.get(&id)
    }

    #[inline]
    fn get_mut(&mut self, id: u64) -> Option<&mut Progress> {
        self.progress.get_mut(&id)
    }

    fn record_vote(&mut self, peer_id: u64, vote: bool) {
        self.vote_records.entry(peer_id).or_insert(vote);
    }

    fn tally_votes(&self) -> TallyVoteResult {
        let (mut granted, mut reject) = (0, 0);
        for (voter_id, vote) in self.vote_records.iter() {
            if self.cluster.quorum.contain_voter(*voter_id) {
                if *vote {
                    granted += 1;
                } else {
                    reject += 1;
                }
            }
        }
        (granted, reject, self.vote_result(&self.vote_records))
    }

    #[inline]
    fn reset_votes(&mut self) {
        self.vote_records.clear();
    }

    fn vote_result(&self, votes: &HashMap<u64, bool>) -> VoteResult {
        self.cluster
            .quorum
            .vote_result(|voter_id| votes.get(&voter_id).cloned())
    }

    fn quorum_recently_active(&mut self, perspective_of_raft: u64) -> bool {
        let mut active =
            HashSet::with_capacity_and_hasher(self.progress.len(), DefaultHashBuilder::default());

        for (peer_id, progress) in &mut self.progress {
            if *peer_id == perspective_of_raft {
                progress.recent_active = true;
                active.insert(*peer_id);
            } else if progress.recent_active {
                active.insert(*peer_id);
                progress.recent_active = false;
            }
        }
        self.has_reached_quorum(&active)
    }

    #[inline]
    fn quorum_committed_index(&self) -> u64 {
        self.cluster.quorum.committed_index(&self.progress)
    }

    #[inline]
    fn has_reached_quorum(&self, raft_set: &HashSet<u64>) -> bool {
        self.cluster
            .quorum
            .vote_result(|voter| raft_set.get(&voter).map(|_| true))
            == VoteResult::Won
    }
}
