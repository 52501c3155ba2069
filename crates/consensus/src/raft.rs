use std::ops::{Deref, DerefMut};

use slog::{debug, info, o, trace, warn, Logger};

use self::{
    raft_cases::RaftCases,
    raft_core::RaftCore,
    raft_role::{
        raft_candidate::CandidateRaft, raft_follower::FollowerRaft, raft_leader::LeaderRaft,
        RaftRole,
    },
    raft_tracker::{ProgressTracker, RaftManager, TallyVoteResult},
};
use crate::confchange::cluster_changer::{ChangeType, ClusterChanger};
use crate::errors::*;
use crate::protos::prelude::{
    ClusterConfig, Entry, EntryType, Envelope, HardState, RaftMessage, RequestVote,
    RequestVoteReply, Snapshot,
};
use crate::quorum::VoteResult::{self, *};
use crate::{config::Config, storage::Storage};
use common::protocol::proposal::Proposed;

pub mod peer_versions;
pub mod raft_cases;
pub mod raft_core;
pub mod raft_log;
pub mod raft_role;
pub mod raft_tracker;
pub mod snapshot_transfer;

/// Default initial term is 0
pub const DEFAULT_INITIAL_TERM: u64 = 0;
/// Default to 0, the DUMMY_TERM also is the DEFAULT_INITIAL_TERM <br/>
/// term of quorum should always greater than DEFAULT_INITIAL_TERM after first election
pub const DUMMY_TERM: u64 = DEFAULT_INITIAL_TERM;

pub const DUMMY_ID: u64 = 0;
/// Default to 0, use to determine if index is a invalid value
pub const DUMMY_INDEX: u64 = 0;

pub struct Raft<STORAGE: Storage> {
    pub core: raft_core::RaftCore<STORAGE>,
    pub tracker: raft_tracker::ProgressTracker,
    pub messages: Vec<Envelope>,
    /// Leader addresses learned since the last `Ready`.
    pub address_updates: Vec<(u64, String)>,
}

/// The reference to Raft which we call RaftCore
impl<STORAGE: Storage> DerefMut for Raft<STORAGE> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.core
    }
}

impl<STORAGE: Storage> Deref for Raft<STORAGE> {
    type Target = raft_core::RaftCore<STORAGE>;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl<STORAGE: Storage> Raft<STORAGE> {
    pub fn new(storage: STORAGE, conf: &Config, logger: &Logger) -> Result<Raft<STORAGE>> {
        conf.validate()?;
        let logger = logger.new(o!("raft_id" => conf.id));
        let initial_state = storage.initial_state()?;
        let cluster_config = &initial_state.cluster_config;

        let tracker =
            ProgressTracker::initial_capacity(cluster_config.servers.len(), conf.max_inflight_messages);
        let core = RaftCore::new(storage, conf, logger)?;
        let mut raft = Raft {
            core,
            tracker,
            messages: Default::default(),
            address_updates: Default::default(),
        };

        if initial_state.initialized() {
            let next_index = raft.raft_log.last_index() + 1;
            ClusterChanger::restore(&mut raft.tracker, next_index, cluster_config)?;
        }
        raft.config_index = initial_state.config_index;
        let is_voter = raft.tracker.is_voter(raft.id);
        raft.set_promotable(is_voter);

        if initial_state.hard_state != HardState::default() {
            raft.init_with_state(&initial_state.hard_state)?;
        }

        // If applied index has been set, then update
        // peer's applied to config value
        if conf.applied > 0 {
            let stable = raft.raft_log.quorum_committed.min(raft.raft_log.get_persisted());
            if conf.applied > stable {
                return Err(Error::ConfigInvalid(format!(
                    "applied index {} is beyond the stable committed index {}",
                    conf.applied, stable
                )));
            }
            raft.commit_apply(conf.applied);
        }

        // then current peer act as a follower without leader
        raft.become_follower(raft.term, DUMMY_ID);
        info!(
            raft.logger,
            "raft peer created";
            "term" => raft.term,
            "quorum committed index" => raft.raft_log.quorum_committed,
            "applied index" => raft.raft_log.get_applied(),
            "last index" => raft.raft_log.last_index(),
            "last term" => raft.raft_log.last_term(),
            "cluster" => %raft.tracker.cluster_info(),
        );
        Ok(raft)
    }

    /// Restore term, vote and commit from storage. A commit index outside
    /// of the log means the persisted state can't be trusted.
    pub fn init_with_state(&mut self, state: &HardState) -> Result<()> {
        let (allowed_min_index, allowed_max_index) =
            (self.raft_log.quorum_committed, self.raft_log.last_index());
        if state.commit < allowed_min_index || state.commit > allowed_max_index {
            return Err(Error::Store(StorageError::corrupted(format!(
                "hard state commit {} is out of range [{}..{}]",
                state.commit, allowed_min_index, allowed_max_index
            ))));
        }
        self.raft_log.quorum_committed = state.commit;
        self.term = state.term;
        self.vote = state.vote;
        Ok(())
    }

    pub fn store(&self) -> &STORAGE {
        &self.raft_log.store
    }

    pub fn mut_store(&mut self) -> &mut STORAGE {
        &mut self.raft_log.store
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn mut_tracker(&mut self) -> &mut ProgressTracker {
        &mut self.tracker
    }

    pub fn snapshot_ref(&self) -> Option<&Snapshot> {
        self.raft_log.unstable.snapshot.as_ref()
    }

    pub fn soft_state(&self) -> SoftState {
        SoftState {
            leader_id: self.leader_id,
            raft_state: self.current_raft_role,
        }
    }

    pub fn hard_state(&self) -> HardState {
        HardState::new(self.term, self.vote, self.raft_log.quorum_committed)
    }

    /// Leader that heard from a quorum of voters within the current
    /// check-quorum window.
    pub fn in_lease(&self) -> bool {
        self.current_raft_role == RaftRole::Leader && self.tracker.quorum_active(self.id)
    }

    /// Advance the logical clock by one tick, then fire whatever deadline
    /// has been reached.
    pub fn tick(&mut self) -> bool {
        self.now += 1;
        match self.current_raft_role {
            RaftRole::Leader => LeaderRaft::tick_heartbeat(self),
            RaftRole::Follower | RaftRole::Candidate => FollowerRaft::tick_election(self),
        }
    }

    /// Append a normal entry carrying `data`, leader only.
    pub fn propose(&mut self, data: Vec<u8>) -> Result<Proposed> {
        self.check_leader()?;
        let mut entries = vec![Entry::proposal(data)];
        self.append_entries(&mut entries);
        LeaderRaft::broadcast_append(self);
        Ok(Proposed::new(entries[0].index, entries[0].term))
    }

    /// Propose to replace the membership with `config`. Only one change
    /// may be in flight, it takes effect once committed and applied.
    pub fn propose_conf_change(&mut self, config: ClusterConfig) -> Result<Proposed> {
        self.check_leader()?;
        ClusterChanger::validate(&config)?;
        if self.has_pending_conf() {
            return Err(Error::ConfChange(format!(
                "possible unapplied conf change at {}, applied {}",
                self.pending_conf_index,
                self.raft_log.get_applied()
            )));
        }
        let mut entries = vec![Entry::new(
            EntryType::EntryConfChange,
            DUMMY_TERM,
            DUMMY_INDEX,
            config.to_bytes(),
        )];
        self.append_entries(&mut entries);
        self.pending_conf_index = entries[0].index;
        info!(
            self.logger,
            "proposed conf change";
            "config" => %config,
            "index" => entries[0].index,
        );
        LeaderRaft::broadcast_append(self);
        Ok(Proposed::new(entries[0].index, entries[0].term))
    }

    #[inline]
    fn check_leader(&self) -> Result<()> {
        if self.current_raft_role == RaftRole::Leader {
            return Ok(());
        }
        let leader_hint = if self.leader_id == DUMMY_ID {
            None
        } else {
            Some(self.leader_id)
        };
        Err(Error::NotLeader { leader_hint })
    }

    /// Install the membership carried by the committed entry at `index`.
    /// Entries at or below the config already in effect are skipped.
    pub fn apply_cluster_config(&mut self, config: &ClusterConfig, index: u64) -> Result<bool> {
        if index <= self.config_index {
            return Ok(false);
        }
        let (cluster, changes) = ClusterChanger::new(&self.tracker).change_to(config)?;
        for change in changes.iter() {
            if change.get_type() == &ChangeType::RemovePeer {
                let peer = change.get_peer();
                self.core.snapshot_senders.remove(&peer);
                self.core.peer_versions.forget(peer);
            }
        }
        let next_index = self.raft_log.last_index() + 1;
        self.tracker.apply_cluster_changes(cluster, changes, next_index);
        self.config_index = index;
        info!(self.logger, "applied cluster config"; "config" => %config, "index" => index);
        self.post_cluster_conf_change();
        Ok(true)
    }

    fn post_cluster_conf_change(&mut self) {
        let is_voter = self.tracker.is_voter(self.id);
        self.set_promotable(is_voter);
        if self.current_raft_role != RaftRole::Leader {
            return;
        }
        if !is_voter {
            info!(self.logger, "leader is no longer a voter, stepping down"; "term" => self.term);
            self.become_follower(self.term, DUMMY_ID);
            return;
        }
        // only the current peer is Leader should broadcast configure changes of the cluster
        LeaderRaft::broadcast_cluster_conf_change(self);
    }

    #[inline]
    pub fn commit_apply(&mut self, update_applied: u64) {
        self.raft_log.update_applied_index(update_applied);
    }

    /// Since current raft received message from other rafts in the cluster,
    /// this method will be call. And we handle all kinds of cases in this
    /// method.
    pub fn process(&mut self, envelope: Envelope) -> Result<()> {
        let me = self.id;
        let case = RaftCases::receive(self, &envelope);
        trace!(
            self.logger,
            "[RaftCases] {} receive {} and step in case: {}",
            me,
            envelope,
            case
        );
        match case {
            RaftCases::StaleRequest => {
                debug!(
                    self.logger,
                    "reject {} with current term", envelope;
                    "term" => self.term,
                );
                let reply = self.stale_reply(&envelope.message);
                self.core.send_to_mailbox(envelope.from, reply, &mut self.messages);
            }
            RaftCases::StaleReply => {
                debug!(
                    self.logger,
                    "ignore {}", envelope;
                    "term" => self.term,
                );
            }
            RaftCases::ApproveRequestVote => {
                self.log_vote_info(&envelope, true);
                // record the grant first, the reply must not leave before it's persisted
                self.vote = envelope.from;
                self.reset_election_deadline();
                let reply = RequestVoteReply {
                    term: self.term,
                    vote_granted: true,
                };
                self.core
                    .send_to_mailbox(envelope.from, RaftMessage::RequestVoteReply(reply), &mut self.messages);
            }
            RaftCases::RejectRequestVote => {
                self.log_vote_info(&envelope, false);
                let reply = RequestVoteReply {
                    term: self.term,
                    vote_granted: false,
                };
                self.core
                    .send_to_mailbox(envelope.from, RaftMessage::RequestVoteReply(reply), &mut self.messages);
            }
            RaftCases::LeaderRecvMsg => return LeaderRaft::process(self, envelope),
            RaftCases::FollowerRecvMsg => return FollowerRaft::process(self, envelope),
            RaftCases::CandidateRecvMsg => return CandidateRaft::process(self, envelope),
        }
        Ok(())
    }

    /// The failure answer to a request from an older term, carrying our
    /// term so the sender steps down.
    fn stale_reply(&self, request: &RaftMessage) -> RaftMessage {
        match request {
            RaftMessage::RequestVote(_) => RaftMessage::RequestVoteReply(RequestVoteReply {
                term: self.term,
                vote_granted: false,
            }),
            RaftMessage::AppendEntries(_) => {
                RaftMessage::AppendEntriesReply(self.append_reply(false, None))
            }
            RaftMessage::InstallSnapshot(chunk) => {
                RaftMessage::InstallSnapshotReply(crate::protos::prelude::InstallSnapshotReply {
                    term: self.term,
                    follower_id: self.id,
                    chunk_index: chunk.chunk_index,
                    success: false,
                })
            }
            reply => panic!("{:?} is not a request", reply.kind()),
        }
    }

    /// Start an election: next term, vote for myself, then ask every
    /// other voter.
    pub fn campaign(&mut self) {
        if self.current_raft_role == RaftRole::Leader {
            debug!(self.logger, "ignoring campaign because already leader");
            return;
        }
        self.become_candidate();

        let my_id = self.id;
        // record my vote (always true, vote for myself)
        // only one voter(me) then won the election immediately
        if Won == self.poll_and_handle_votes(my_id, true) {
            return;
        }

        let (last_log_index, last_log_term) = (self.raft_log.last_index(), self.raft_log.last_term());
        let voters: Vec<u64> = self.tracker.all_voters().filter(|id| *id != my_id).collect();
        for to_peer_id in voters {
            let request = RequestVote {
                term: self.term,
                candidate_id: my_id,
                last_log_index,
                last_log_term,
            };
            self.core
                .send_to_mailbox(to_peer_id, RaftMessage::RequestVote(request), &mut self.messages);
        }
    }

    /// ## Description
    /// Judge vote result once a vote reply reached. <br/>
    /// Become `Leader` immediately if grant votes has reached majority <br/>
    /// or become `Follower` immediately if reject votes has reached majority
    /// without waitting for all peer's acked. <br/>
    /// Other wise keep pending and wait for more peer's vote acked until reached
    /// majority.
    fn poll_and_handle_votes(&mut self, from: u64, vote: bool) -> VoteResult {
        let (grants, rejects, vote_result) = self.poll(from, vote);
        if from != self.id {
            debug!(
                self.logger,
                "received vote reply from {from}", from = from;
                "vote me?" => vote,
                "term" => self.term,
                "approvals" => grants,
                "rejections" => rejects,
            );
        }
        match vote_result {
            Won => {
                self.become_leader();
                LeaderRaft::broadcast_append(self);
            }
            Lost => {
                self.become_follower(self.term, DUMMY_ID);
            }
            Pending => (),
        }
        vote_result
    }

    fn poll(&mut self, from: u64, vote: bool) -> TallyVoteResult {
        self.tracker.record_vote(from, vote);
        self.tracker.tally_votes()
    }

    /// Stamp `entries` with the current term and the next indexes, then
    /// stash them in the unstable log.
    fn append_entries(&mut self, entries: &mut [Entry]) {
        let last_idx = self.raft_log.last_index();
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.term = self.term;
            entry.index = last_idx + 1 + i as u64;
        }
        self.raft_log.append(entries);
    }

    /// There has only one way to became **Follower** with legal `leader_id` (not DUMMY_ID 0): <br/>
    /// Receive `AppendEntries` or `InstallSnapshot` from a legal **Leader**
    pub fn become_follower(&mut self, term: u64, leader_id: u64) {
        self.reset(term);
        self.follow(leader_id);
        self.current_raft_role = RaftRole::Follower;
        debug!(
            self.logger,
            "{me} became follower of {leader} at term {term}",
            me = self.id,
            leader = leader_id,
            term = self.term
        );
    }

    pub fn become_candidate(&mut self) {
        assert_ne!(
            self.current_raft_role,
            RaftRole::Leader,
            "invalid role transfer: [Leader ==> Candidate]"
        );
        let term = self.term + 1;
        self.reset(term);
        let me = self.id;
        self.vote = me;
        self.current_raft_role = RaftRole::Candidate;
        debug!(
            self.logger,
            "{me} became candidate at term: {term}",
            me = me,
            term = term
        );
    }

    pub fn become_leader(&mut self) {
        assert_ne!(
            RaftRole::Follower,
            self.current_raft_role,
            "invalid role transfer: [Follower ==> Leader]"
        );
        let ori_term = self.term;
        self.reset(ori_term);
        let me = self.id;
        self.follow(me);
        self.current_raft_role = RaftRole::Leader;
        self.reset_heartbeat_deadline();
        self.reset_quorum_check_deadline();

        let (me, last_index) = (self.id, self.raft_log.last_index());
        if let Some(my_progress) = self.tracker.get_mut(me) {
            my_progress.enter_replicate();
        }
        // nothing before the election point may be changed until it's applied.
        self.pending_conf_index = last_index;

        // the noop entry commits everything from previous terms once replicated.
        let mut noop = vec![Entry::new(EntryType::EntryNoop, DUMMY_TERM, DUMMY_INDEX, vec![])];
        self.append_entries(&mut noop);

        info!(
            self.logger,
            "{me} became leader at term: {term}",
            me = me,
            term = self.term
        );
    }

    fn log_vote_info(&self, envelope: &Envelope, approve: bool) {
        let hint = if approve {
            "cast vote for"
        } else {
            "reject vote from"
        };
        let (candidate_index, candidate_term) = match &envelope.message {
            RaftMessage::RequestVote(request) => (request.last_log_index, request.last_log_term),
            _ => (DUMMY_INDEX, DUMMY_TERM),
        };
        debug!(
            self.logger,
            "local: [last term: {lterm}, last index: {lindex}, vote: {vote}] {hint} peer {campaigner}: \
            [last term: {cterm}, last index: {cindex}] at term {term}",
            lterm = self.raft_log.last_term(),
            lindex = self.raft_log.last_index(),
            vote = self.vote,
            hint = hint,
            campaigner = envelope.from,
            cterm = candidate_term,
            cindex = candidate_index,
            term = self.term
        );
    }

    fn reset(&mut self, given_term: u64) {
        if self.term != given_term {
            self.term = given_term;
            self.vote = DUMMY_ID;
            // a partial snapshot belongs to the old leader.
            self.core.snapshot_receiver.reset();
        }
        self.core.follow(DUMMY_ID);
        self.reset_election_deadline();

        self.tracker.reset_votes();
        self.core.snapshot_senders.clear();
        self.pending_conf_index = DUMMY_INDEX;

        let last_index = self.raft_log.last_index();
        let persisted = self.raft_log.get_persisted();
        let self_id = self.id;
        for (&id, progress) in self.tracker.iter_mut() {
            progress.reset(last_index + 1);
            if id == self_id {
                progress.match_index = persisted;
            }
        }
    }

    pub fn persist_snapshot(&mut self, snapshot_index: u64) {
        self.raft_log.maybe_persist_snapshot(snapshot_index);
    }

    /// Entries up to `index` (of `term`) reached storage. On the leader this
    /// is the only way its own progress moves, hence what commits a
    /// single voter cluster.
    pub fn persist_entries(&mut self, index: u64, term: u64) {
        let is_update = self.raft_log.maybe_persist(index, term);
        if is_update && self.current_raft_role == RaftRole::Leader {
            if term != self.term {
                warn!(
                    self.logger,
                    "leader's persisted index changed but the term {} is not the same as {}",
                    term,
                    self.term
                );
            }
            let self_id = self.id;
            let updated = match self.tracker.get_mut(self_id) {
                Some(progress) => progress.try_update(index),
                None => false,
            };
            if updated {
                LeaderRaft::try_commit_and_broadcast(self);
            }
        }
    }
}

#[derive(Debug, Default, PartialEq, Clone, Copy)]
pub struct SoftState {
    /// The potential leader of the cluster.
    pub leader_id: u64,
    /// The soft role this node may take.
    pub raft_state: RaftRole,
}
