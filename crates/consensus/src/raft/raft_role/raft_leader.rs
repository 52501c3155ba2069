use std::cmp::min;

use crate::errors::*;
use crate::protos::prelude::{
    AppendEntries, AppendEntriesReply, Entry, Envelope, InstallSnapshotReply, RaftMessage,
};
use crate::{
    raft::{
        raft_core::RaftCore,
        raft_tracker::{progress::Progress, progress_state::ProgressState, RaftManager},
        snapshot_transfer::{SenderProgress, SnapshotSender},
        Raft, DUMMY_ID, DUMMY_INDEX,
    },
    storage::Storage,
};
use slog::{debug, info, trace, warn};

/// Traits for raft leader
pub trait LeaderRaft {
    /// Tick this node do heartbeat as Leader, the leader
    /// will check quorum first (if configured), makesure its
    /// still leader, then send heartbeat to every follower once
    /// the heartbeat deadline is reached.
    fn tick_heartbeat(&mut self) -> bool;

    fn broadcast_heartbeat(&mut self);

    /// Leader peer broadcast the latest state of the log after
    /// the membership changed.
    fn broadcast_cluster_conf_change(&mut self);

    /// Send `AppendEntries` (maybe empty, to convey the commit index) to
    /// every follower that is not paused.
    fn broadcast_append(&mut self);

    fn process(&mut self, envelope: Envelope) -> Result<()>;

    /// Try to update the quorum_commit to current leader's raft_log and progress
    /// then broadcast to other peers if update success
    fn try_commit_and_broadcast(&mut self) -> bool {
        self.try_commit(true)
    }

    /// Try to update the quorum_commit to current leader's raft_log,
    /// then broadcast updated commit to other peers if `should_broadcast`
    /// ## When commit?
    /// In this situation, assume progress of all followers in state machine is: <br/>
    /// #### Before broadcast `AppendEntries` index 3.
    /// matched (index): `[1,2,2,2,3]`, quorum's index is 2 (because majority is 2) <br/>
    /// #### After received `AppendEntriesReply`
    /// * After recv peer 1 (and send 2,3 to peer 1): `[3,2,2,2,3]`, then quorum's index still 2, shouldn't update commit.
    /// * After recv peer 2 (accept): `[3,3,2,2,3]`, then quorum's index become 3, should update commit.
    /// * After recv peer 3 (accept): `[3,3,3,2,3]`, then quorum's index still 3, shouldn't update commit.
    /// * And so forth...
    ///
    /// Only an entry of the current term is committed by counting replicas,
    /// earlier ones follow it.
    fn try_commit(&mut self, should_broadcast: bool) -> bool;

    fn check_quorum_active(&mut self) -> bool;
}

impl<STORAGE: Storage> LeaderRaft for Raft<STORAGE> {
    fn tick_heartbeat(&mut self) -> bool {
        let mut has_ready = false;
        if self.now >= self.quorum_check_deadline {
            self.reset_quorum_check_deadline();
            // step 1: check if quorum still active (majority followers are recent_active)
            if self.check_quorum && !self.check_quorum_active() {
                warn!(self.logger, "stepped down to follower since quorum is not active"; "term" => self.term);
                let term = self.term;
                self.become_follower(term, DUMMY_ID);
                return true;
            }
        }

        // step 2: then try broadcasting heartbeat if I'm still Leader.
        if self.now >= self.heartbeat_deadline {
            self.reset_heartbeat_deadline();
            self.broadcast_heartbeat();
            has_ready = true;
        }
        has_ready
    }

    fn broadcast_heartbeat(&mut self) {
        let self_id = self.id;
        let core = &mut self.core;
        let messages = &mut self.messages;
        self.tracker
            .iter_mut()
            .filter(|&(id, _)| *id != self_id)
            .for_each(|(id, progress)| core.send_heartbeat(*id, progress, messages));
    }

    fn broadcast_cluster_conf_change(&mut self) {
        // try to commit if more entries has been committed, if in this case,
        // the latest commit should be broadcast (append) to all followers.
        if !self.try_commit_and_broadcast() {
            // otherwise still probe the newly added replicas.
            self.broadcast_append();
        }
    }

    fn broadcast_append(&mut self) {
        let my_id = self.id;
        let endpoint = &mut self.core;
        let msg_box = &mut self.messages;
        self.tracker
            .iter_mut()
            .filter(|&(peer_id, _)| *peer_id != my_id)
            .for_each(|(peer_id, progress)| {
                endpoint.try_send_append(*peer_id, progress, msg_box, true);
            });
    }

    fn process(&mut self, envelope: Envelope) -> Result<()> {
        match &envelope.message {
            // process the response type messages
            RaftMessage::AppendEntriesReply(reply) => self.handle_append_response(envelope.from, reply),
            RaftMessage::InstallSnapshotReply(reply) => self.handle_snapshot_reply(envelope.from, reply),
            _ => {
                debug!(
                    self.logger,
                    "leader ignored {}", envelope;
                    "term" => self.term,
                );
            }
        }
        Ok(())
    }

    fn try_commit(&mut self, should_broadcast: bool) -> bool {
        if self.maybe_commit() {
            trace!(self.logger, "should leader broadcast committed? {:?}", should_broadcast);
            if should_broadcast {
                self.broadcast_append()
            }
            return true;
        }
        false
    }

    fn check_quorum_active(&mut self) -> bool {
        let self_id = self.id;
        self.mut_tracker().quorum_recently_active(self_id)
    }
}

/// Leader peer represent a abstract endpoint of Leader in a Raft quorum.
/// It's act as a leader to send append entries, send snapshot etc..
trait LeaderPeer {
    /// Keep the follower alive and learn whether it's still in sync, what
    /// is sent depends on the state of its progress:
    /// * `Replicate`: an empty `AppendEntries` at the match index, unless the
    /// follower didn't answer since the last heartbeat while it's missing
    /// entries, then it's probed again.
    /// * `Probe`: the next probe, even if one is outstanding.
    /// * `Snapshot`: the chunk in flight, if its reply timed out.
    fn send_heartbeat(&mut self, to_peer: u64, progress: &mut Progress, msg_box: &mut Vec<Envelope>);

    /// Try sending append entries to `to_peer` from its progress's `next_index`.
    /// * If that peer's previous index of `progress.next` even not in leader's raft_log
    /// (maybe log_entry in store has been compacted before), then leader will start
    /// shipping a snapshot to the peer, and change that peer's state to `Snapshot`.
    /// * Otherwise send the entries from there on, at most `max_msg_size` of them.
    ///
    /// ## Params
    /// * to_peer: mark this message send to which peer
    /// * progress: the entries will be fetched from specific peer's progress and
    /// send to `to_peer`
    /// * msg_box: the generated message will be stashed in it.
    /// * allow_empty: to controls whether messages with no entries will be sent
    /// ("empty" messages are useful to convey updated Commit indexes, but
    /// are undesirable when we're sending multiple messages in a batch).
    ///
    /// ## Returns
    /// * true if: `AppendEntries` has been stashed
    /// * false if:
    ///     * nothing to send and not allow empty
    ///     * progress.is_paused()
    ///     * snapshot was started (or could not be) instead
    fn try_send_append(&mut self, to_peer: u64, progress: &mut Progress, msg_box: &mut Vec<Envelope>, allow_empty: bool) -> bool;

    /// Start shipping the latest snapshot to `to_peer`, sending its
    /// first chunk. Fails when no snapshot is available right now.
    fn prepare_send_snapshot(&mut self, to_peer: u64, progress: &mut Progress, msg_box: &mut Vec<Envelope>) -> bool;

    /// (Re)send the chunk in flight of the transfer to `to_peer`.
    fn send_snapshot_chunk(&mut self, to_peer: u64, msg_box: &mut Vec<Envelope>);

    fn append_request(&self, progress: &Progress, prev_log_index: u64, prev_log_term: u64, entries: Vec<Entry>) -> AppendEntries;
}

impl<STORAGE: Storage> LeaderPeer for RaftCore<STORAGE> {
    fn send_heartbeat(&mut self, to_peer: u64, progress: &mut Progress, msg_box: &mut Vec<Envelope>) {
        match progress.state {
            ProgressState::Replicate => {
                let last_index = self.raft_log.last_index();
                if progress.match_index < last_index && !progress.heard_since_heartbeat {
                    debug!(
                        self.logger,
                        "{peer} stays silent over a heartbeat, probe it again", peer = to_peer;
                        "progress" => ?progress,
                    );
                    progress.enter_probe();
                    self.try_send_append(to_peer, progress, msg_box, true);
                } else {
                    match self.raft_log.term(progress.match_index) {
                        Ok(match_term) => {
                            let heartbeat = self.append_request(progress, progress.match_index, match_term, vec![]);
                            self.send_to_mailbox(to_peer, RaftMessage::AppendEntries(heartbeat), msg_box);
                        }
                        Err(_) => {
                            self.try_send_append(to_peer, progress, msg_box, true);
                        }
                    }
                }
                progress.heard_since_heartbeat = false;
            }
            ProgressState::Probe => {
                progress.resume();
                self.try_send_append(to_peer, progress, msg_box, true);
            }
            ProgressState::Snapshot => {
                let (now, timeout) = (self.now, self.snapshot_reply_timeout as u64);
                let timed_out = self
                    .snapshot_senders
                    .get(&to_peer)
                    .map(|sender| sender.timed_out(now, timeout));
                match timed_out {
                    Some(true) => {
                        debug!(self.logger, "snapshot chunk to {peer} timed out, resend it", peer = to_peer);
                        self.send_snapshot_chunk(to_peer, msg_box);
                    }
                    Some(false) => {}
                    None => {
                        // transfer is gone, find the follower's position again.
                        progress.enter_probe();
                        self.try_send_append(to_peer, progress, msg_box, true);
                    }
                }
            }
        }
    }

    fn try_send_append(
        &mut self,
        to_peer: u64,
        progress: &mut Progress,
        msg_box: &mut Vec<Envelope>,
        allow_empty: bool,
    ) -> bool {
        if progress.is_paused() {
            trace!(
                self.logger,
                "Skipping sending to peer: {peer}, it's paused", peer = to_peer;
                "progress" => ?progress
            );
            return false;
        }
        let prev_log_index = progress.next_index - 1;
        let prev_log_term = self.raft_log.term(prev_log_index);
        // fetch entries of specific follower from it's next_index to end (or max_msg_size)
        let entries_to_send = self
            .raft_log
            .entries_remain(progress.next_index, self.max_msg_size);
        match (prev_log_term, entries_to_send) {
            (Ok(prev_log_term), Ok(entries_to_send)) => {
                // not allow send empty and found nothing to send.
                if !allow_empty && entries_to_send.is_empty() {
                    return false;
                }
                let last_entry = entries_to_send.last().map(|entry| entry.index);
                let request = self.append_request(progress, prev_log_index, prev_log_term, entries_to_send);
                match (progress.state, last_entry) {
                    // then mark the latest entry index (last one) to inflights
                    (ProgressState::Replicate, Some(last_index)) => {
                        progress.push_inflight(last_index);
                    }
                    (ProgressState::Probe, _) => progress.pause(),
                    _ => {}
                }
                self.send_to_mailbox(to_peer, RaftMessage::AppendEntries(request), msg_box);
                true
            }
            _ => {
                // even follower's next index not in leader's raft_log (compacted)
                // means that follower should sync with snapshot first.
                self.prepare_send_snapshot(to_peer, progress, msg_box);
                false
            }
        }
    }

    fn prepare_send_snapshot(&mut self, to_peer: u64, progress: &mut Progress, msg_box: &mut Vec<Envelope>) -> bool {
        let snapshot = match self.raft_log.snapshot(DUMMY_INDEX) {
            Ok(snapshot) => snapshot,
            Err(Error::Store(StorageError::SnapshotTemporarilyUnavailable)) => {
                debug!(
                    self.logger,
                    "failed to send snapshot to {} because snapshot is temporarily unavailable",
                    to_peer
                );
                return false;
            }
            Err(err) => panic!("unexpected error when fetching snapshot: {:?}", err),
        };
        let meta = snapshot.get_metadata();
        let (snapshot_index, snapshot_term) = (meta.index, meta.term);
        if snapshot_index == DUMMY_INDEX {
            warn!(self.logger, "no snapshot to send to {}", to_peer);
            return false;
        }

        info!(
            self.logger,
            "[first index: {first_index}, quorum committed: {committed}] start sending snapshot[index: {snapshot_index}, term: {snapshot_term}] to {to}",
            first_index = self.raft_log.first_index(),
            committed = self.raft_log.quorum_committed,
            snapshot_index = snapshot_index,
            snapshot_term = snapshot_term,
            to = to_peer;
            "progress" => ?progress,
        );
        progress.enter_snapshot(snapshot_index);
        let sender = SnapshotSender::new(snapshot, self.snapshot_chunk_size, self.now);
        self.snapshot_senders.insert(to_peer, sender);
        self.send_snapshot_chunk(to_peer, msg_box);
        true
    }

    fn send_snapshot_chunk(&mut self, to_peer: u64, msg_box: &mut Vec<Envelope>) {
        let (term, leader_id, version, now) = (self.term, self.id, self.peer_versions.local(), self.now);
        let chunk = match self.snapshot_senders.get_mut(&to_peer) {
            Some(sender) => sender.current_chunk(term, leader_id, version, now),
            None => return,
        };
        self.send_to_mailbox(to_peer, RaftMessage::InstallSnapshot(chunk), msg_box);
    }

    fn append_request(&self, progress: &Progress, prev_log_index: u64, prev_log_term: u64, entries: Vec<Entry>) -> AppendEntries {
        let leader_address = if progress.wants_leader_address {
            self.local_address.clone()
        } else {
            None
        };
        AppendEntries {
            term: self.term,
            leader_id: self.id,
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit: self.raft_log.quorum_committed,
            leader_snapshot_index: self.raft_log.first_index() - 1,
            payload_version: self.payload_version,
            leader_address,
        }
    }
}

trait LeaderHandler {
    /// Update the follower's progress with its reply:
    /// * On success, `log_last_index` is the highest index known to match,
    /// try to commit and keep replicating.
    /// * On failure, back `next_index` off using the follower's last entry
    /// as a hint, or start a snapshot when the follower asked for it.
    fn handle_append_response(&mut self, from: u64, reply: &AppendEntriesReply);

    /// Move the snapshot transfer to `from` forward, once the final chunk is
    /// acknowledged the follower continues with normal replication.
    fn handle_snapshot_reply(&mut self, from: u64, reply: &InstallSnapshotReply);

    fn maybe_commit(&mut self) -> bool;
}

impl<STORAGE: Storage> LeaderHandler for Raft<STORAGE> {
    fn handle_append_response(&mut self, from: u64, reply: &AppendEntriesReply) {
        self.core.peer_versions.observe(from, reply.raft_version);
        let local_version = self.core.peer_versions.local();
        let responder_progress = match self.tracker.get_mut(from) {
            Some(progress) => progress,
            None => {
                debug!(self.core.logger, "no progress available for responder {}", from);
                return;
            }
        };
        responder_progress.recent_active = true;
        responder_progress.raft_version = Some(local_version.negotiate(reply.raft_version));
        responder_progress.payload_version = reply.payload_version;
        responder_progress.wants_leader_address = reply.needs_leader_address;

        if !reply.success {
            debug!(
                self.core.logger,
                "received append rejection";
                "last_index" => reply.log_last_index,
                "last_term" => reply.log_last_term,
                "from" => from,
                "force_install_snapshot" => reply.force_install_snapshot,
            );
            if reply.force_install_snapshot {
                if responder_progress.state != ProgressState::Snapshot {
                    self.core.prepare_send_snapshot(from, responder_progress, &mut self.messages);
                }
                return;
            }
            let rejected = responder_progress.next_index - 1;
            let hint_index = min(reply.log_last_index, rejected.saturating_sub(1));
            let (probe_hint, _) = self
                .core
                .raft_log
                .find_conflict_by_term(hint_index, reply.log_last_term);
            // receive reject append response from a follower who's in state Probe or Replicate,
            // then decrease it's progress next and start to syncing with it.
            if responder_progress.try_decr_to(rejected, probe_hint) {
                trace!(
                    self.core.logger,
                    "decreased progress of {}", from;
                    "progress" => ?responder_progress,
                );
                self.core.try_send_append(from, responder_progress, &mut self.messages, true);
            }
            return;
        }

        let index = reply.log_last_index;
        if index < responder_progress.match_index {
            // receive a out dated reply, should not update the progress.
            debug!(self.core.logger, "stale append reply from {}", from; "index" => index);
            return;
        }
        let paused_before_update = responder_progress.is_paused();
        let updated = responder_progress.try_update(index);
        if updated {
            responder_progress.heard_since_heartbeat = true;
        }
        // then follower transfer to next state
        if responder_progress.next_state(index) != &ProgressState::Snapshot {
            self.core.snapshot_senders.remove(&from);
        }

        if updated && !self.try_commit_and_broadcast() && paused_before_update {
            // the follower was held back, tell it where the commit is now.
            if let Some(responder_progress) = self.tracker.get_mut(from) {
                self.core.try_send_append(from, responder_progress, &mut self.messages, true);
            }
        }

        // If we have more entries to send to a follower, send as many messages as we
        // can (without sending empty messages for the commit index)
        if let Some(responder_progress) = self.tracker.get_mut(from) {
            while self
                .core
                .try_send_append(from, responder_progress, &mut self.messages, false)
            {}
        }
    }

    fn handle_snapshot_reply(&mut self, from: u64, reply: &InstallSnapshotReply) {
        let progress = match self.tracker.get_mut(from) {
            Some(progress) => progress,
            None => return,
        };
        progress.recent_active = true;
        if progress.state != ProgressState::Snapshot {
            debug!(self.core.logger, "ignore snapshot reply from {} in state {}", from, progress.state);
            return;
        }
        let outcome = match self.core.snapshot_senders.get_mut(&from) {
            Some(sender) => sender.on_reply(reply.chunk_index, reply.success),
            None => return,
        };
        match outcome {
            SenderProgress::Ignore => {}
            SenderProgress::SendChunk => self.core.send_snapshot_chunk(from, &mut self.messages),
            SenderProgress::Done(snapshot_index) => {
                self.core.snapshot_senders.remove(&from);
                progress.snapshot_installed();
                info!(
                    self.core.logger,
                    "{peer} installed snapshot {index}, resume replication",
                    peer = from,
                    index = snapshot_index;
                    "progress" => ?progress,
                );
                self.core.try_send_append(from, progress, &mut self.messages, true);
            }
        }
    }

    fn maybe_commit(&mut self) -> bool {
        let quorum_committed = self.tracker.quorum_committed_index();
        let term = self.core.term;
        // try to update commit index of raft_log to quorum committed
        self.core.raft_log.maybe_commit(quorum_committed, term)
    }
}
