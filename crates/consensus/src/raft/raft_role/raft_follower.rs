use crate::errors::*;
use crate::protos::prelude::{
    AppendEntries, AppendEntriesReply, Envelope, InstallSnapshot, InstallSnapshotReply,
    RaftMessage, Snapshot,
};
use crate::{
    confchange::cluster_changer::ClusterChanger,
    raft::{snapshot_transfer::ReceiveOutcome, Raft, DUMMY_TERM},
    storage::Storage,
};
use slog::{debug, info};

/// Behaviors of a peer that is not leading: wait for the leader, and
/// campaign once it has been silent for a whole election timeout.
pub trait FollowerRaft {
    fn tick_election(&mut self) -> bool;

    fn process(&mut self, envelope: Envelope) -> Result<()>;
}

impl<STORAGE: Storage> FollowerRaft for Raft<STORAGE> {
    fn tick_election(&mut self) -> bool {
        if !self.pass_election_timeout() {
            return false;
        }
        self.reset_election_deadline();
        if !self.promotable() {
            return false;
        }
        self.campaign();
        true
    }

    fn process(&mut self, envelope: Envelope) -> Result<()> {
        let msg_from = envelope.from;
        match &envelope.message {
            RaftMessage::AppendEntries(request) => {
                self.reset_election_deadline();
                self.follow(msg_from);
                self.handle_append_entries(msg_from, request);
            }
            RaftMessage::InstallSnapshot(chunk) => {
                self.reset_election_deadline();
                self.follow(msg_from);
                self.handle_snapshot_chunk(msg_from, chunk);
            }
            _ => {
                debug!(
                    self.logger,
                    "follower ignored {}", envelope;
                    "term" => self.term,
                );
            }
        }
        Ok(())
    }
}

pub trait FollowerHandler {
    /// Reply to the leader's `AppendEntries`:
    /// * success with committed index, when the request is below what's
    /// known to be committed, nothing is appended then.
    /// * success with the last index verified against the request if
    /// `prev_log_index` matched.
    /// * failure with our own last index and term otherwise, which the
    /// leader uses as a hint to back off.
    fn handle_append_entries(&mut self, leader: u64, request: &AppendEntries);

    /// Keep (or reject) one chunk of the leader's snapshot, restoring the
    /// whole snapshot once the final chunk arrived.
    fn handle_snapshot_chunk(&mut self, leader: u64, chunk: &InstallSnapshot);

    /// Try restore from given snapshot, nothing happens if the snapshot
    /// is not newer than what's committed locally. If the log already
    /// contains the snapshot's last entry, just fast forward the commit.
    ///
    /// If success, then:
    /// * Restore snapshot to unstable and could be get in ready.
    /// * Rebuild membership from the snapshot's config.
    fn restore_from_snapshot(&mut self, snapshot: Snapshot) -> bool;
}

impl<S> FollowerHandler for Raft<S>
where
    S: Storage,
{
    fn handle_append_entries(&mut self, leader: u64, request: &AppendEntries) {
        if let Some(address) = request.leader_address.as_ref() {
            if self.leader_address.as_ref() != Some(address) {
                info!(self.logger, "learned address of leader {leader}", leader = leader; "address" => address);
                self.leader_address = Some(address.clone());
                self.address_updates.push((leader, address.clone()));
            }
        }

        let quorum_committed = self.raft_log.quorum_committed;
        // just response the committed index to leader, the entries below it
        // are known to be replicated already.
        if request.prev_log_index < quorum_committed {
            debug!(
                self.logger,
                "got append with index({index}) lower than quorum index: {quorum}",
                index = request.prev_log_index,
                quorum = quorum_committed
            );
            let reply = self.append_reply(true, Some(self.raft_log.commit_info()));
            self.core
                .send_to_mailbox(leader, RaftMessage::AppendEntriesReply(reply), &mut self.messages);
            return;
        }

        let reply = match self.raft_log.maybe_append(
            request.prev_log_index,
            request.prev_log_term,
            request.leader_commit,
            request.entries.as_slice(),
        ) {
            Some((_, last_verified)) => {
                let verified_term = self.raft_log.term(last_verified).unwrap_or(DUMMY_TERM);
                self.append_reply(true, Some((last_verified, verified_term)))
            }
            None => {
                debug!(
                    self.logger,
                    "reject append [prev_log_term: {prev_term}, prev_log_index: {prev_index}] from {leader}",
                    prev_term = request.prev_log_term, prev_index = request.prev_log_index, leader = leader;
                    "peer's log_term" => ?self.raft_log.term(request.prev_log_index).ok()
                );
                let mut reply = self.append_reply(false, None);
                // everything we hold is behind the leader's compaction point,
                // backing off entry by entry would never meet it.
                reply.force_install_snapshot = self.raft_log.last_index() < request.leader_snapshot_index;
                reply
            }
        };
        self.core
            .send_to_mailbox(leader, RaftMessage::AppendEntriesReply(reply), &mut self.messages);
    }

    fn handle_snapshot_chunk(&mut self, leader: u64, chunk: &InstallSnapshot) {
        let (chunk_index, success) = match self.core.snapshot_receiver.receive(chunk) {
            ReceiveOutcome::Ack(acked) => (acked, true),
            ReceiveOutcome::Reject => {
                debug!(
                    self.logger,
                    "rejected snapshot chunk {chunk} from {leader}",
                    chunk = chunk.chunk_index,
                    leader = leader;
                    "snapshot index" => chunk.last_included_index,
                );
                (1, false)
            }
            ReceiveOutcome::Complete(snapshot) => {
                let (snapshot_index, snapshot_term) =
                    (snapshot.get_metadata().index, snapshot.get_metadata().term);
                let restored = self.restore_from_snapshot(snapshot);
                debug!(
                    self.logger,
                    "[commit: {commit}, term: {term}] {action} snapshot [index: {snapshot_index}, term: {snapshot_term}]",
                    action = if restored { "restored" } else { "ignored" },
                    term = self.term,
                    commit = self.raft_log.quorum_committed,
                    snapshot_index = snapshot_index,
                    snapshot_term = snapshot_term
                );
                (chunk.chunk_index, true)
            }
        };
        let reply = InstallSnapshotReply {
            term: self.term,
            follower_id: self.id,
            chunk_index,
            success,
        };
        self.core
            .send_to_mailbox(leader, RaftMessage::InstallSnapshotReply(reply), &mut self.messages);
    }

    fn restore_from_snapshot(&mut self, snapshot: Snapshot) -> bool {
        let metadata = snapshot.get_metadata();
        let (snap_index, snap_term) = (metadata.index, metadata.term);
        if snap_index <= self.raft_log.quorum_committed {
            return false;
        }

        if self.raft_log.match_term(snap_index, snap_term) {
            debug!(
                self.logger,
                "fast-forwarded commit to snapshot";
                "commit" => self.raft_log.quorum_committed,
                "last_index" => self.raft_log.last_index(),
                "snapshot_index" => snap_index,
                "snapshot_term" => snap_term
            );
            self.raft_log.commit_to(snap_index);
            return false;
        }

        let config = metadata.config.clone();
        self.raft_log.restore(snapshot);

        if let Some(config) = config {
            self.tracker.clear();
            let next_index = self.raft_log.last_index() + 1;
            if let Err(err) = ClusterChanger::restore(&mut self.tracker, next_index, &config) {
                panic!("unable to restore config {}: {}", config, err);
            }
            let is_voter = self.tracker.is_voter(self.id);
            self.set_promotable(is_voter);
            self.config_index = snap_index;
        }

        info!(
            self.logger,
            "restore from snapshot success";
            "commit" => self.raft_log.quorum_committed,
            "snapshot_index" => snap_index,
            "snapshot_term" => snap_term,
            "cluster" => %self.tracker.cluster_info(),
        );
        true
    }
}

impl<S: Storage> Raft<S> {
    /// Build the answer to an `AppendEntries`, on success `verified` is the
    /// (index, term) the leader may count as matched. A failure reports
    /// our own last entry.
    pub(crate) fn append_reply(&self, success: bool, verified: Option<(u64, u64)>) -> AppendEntriesReply {
        let (log_last_index, log_last_term) =
            verified.unwrap_or_else(|| (self.raft_log.last_index(), self.raft_log.last_term()));
        AppendEntriesReply {
            follower_id: self.id,
            term: self.term,
            success,
            log_last_index,
            log_last_term,
            payload_version: self.payload_version,
            raft_version: self.peer_versions.local().as_u8(),
            force_install_snapshot: false,
            needs_leader_address: self.needs_leader_address(),
        }
    }
}
