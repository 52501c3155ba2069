use slog::{error, info, trace};

use super::Peer;
use crate::{
    mailbox::Transport,
    protos::prelude::{codec, Entry, Envelope},
    state_machine::StateMachine,
    storage::Storage,
    RaftResult,
};
use consensus::raft_node::{raft_process::RaftProcess, Ready};

impl<S: Storage, M: StateMachine, T: Transport> Peer<S, M, T> {
    /// Handle whatever the node made ready until nothing is left. Nothing
    /// leaves before the state it depends on is durable, and nothing is
    /// applied before it's committed and persisted.
    pub(super) fn handle_ready(&mut self) -> RaftResult<()> {
        while self.node.has_ready() {
            let mut ready = self.node.get_ready();
            if let Some(ss) = ready.soft_state_ref() {
                info!(
                    self.logger,
                    "soft state changed";
                    "role" => %ss.raft_state,
                    "leader" => ss.leader_id,
                    "term" => self.node.raft.term,
                );
            }
            self.persist_ready(&mut ready)?;
            self.send(ready.take_messages());
            self.apply(ready.take_committed_entries())?;

            let mut light_rd = self.node.advance(ready);
            if let Some(commit) = light_rd.committed_index() {
                trace!(self.logger, "persist commit"; "commit" => commit);
                self.node.store().set_hard_state(self.node.raft.hard_state())?;
            }
            if let Some((config, index)) = light_rd.take_cluster_config() {
                self.node.store().set_cluster_config(config, index)?;
            }
            self.send(light_rd.take_messages());
            self.apply(light_rd.take_committed_entries())?;
            self.node.advance_apply();
            self.maybe_compact()?;
        }
        Ok(())
    }

    fn persist_ready(&mut self, ready: &mut Ready) -> RaftResult<()> {
        let store = self.node.store();
        if let Some(snapshot) = ready.some_snapshot() {
            let (index, term) = (snapshot.get_metadata().index, snapshot.get_metadata().term);
            let data = snapshot.data.clone();
            // storage first, a restart restores the state machine from it.
            store.apply_snapshot(snapshot)?;
            self.machine.restore(&data)?;
            self.snapshot_index = index;
            info!(self.logger, "installed snapshot"; "index" => index, "term" => term);
        }
        let entries = ready.take_unstable_entries();
        if !entries.is_empty() {
            store.append(&entries)?;
        }
        if let Some(hard_state) = ready.hard_state_ref() {
            store.set_hard_state(hard_state.clone())?;
        }
        if let Some((config, index)) = ready.take_cluster_config() {
            store.set_cluster_config(config, index)?;
        }
        for (id, address) in ready.take_address_updates() {
            self.transport.update_address(id, &address);
        }
        Ok(())
    }

    fn send(&self, messages: Vec<Envelope>) {
        for envelope in messages {
            let version = self.node.raft.peer_versions.version_for(envelope.to);
            match codec::encode_frame(version, &envelope) {
                Ok(frame) => self.transport.send(envelope.to, frame),
                Err(err) => error!(self.logger, "failed to encode {}: {}", envelope, err),
            }
        }
    }

    /// Hand the payload of `entries` to the state machine, noop and
    /// membership entries carry none.
    fn apply(&mut self, entries: Vec<Entry>) -> RaftResult<()> {
        for entry in entries {
            if entry.is_noop() || entry.is_conf_change() {
                continue;
            }
            self.machine.apply(entry.index, &entry.data)?;
        }
        Ok(())
    }

    fn maybe_compact(&mut self) -> RaftResult<()> {
        if self.compact_log_threshold == 0 {
            return Ok(());
        }
        if self.applied_index().saturating_sub(self.snapshot_index) >= self.compact_log_threshold {
            self.compact()?;
        }
        Ok(())
    }
}
