//! Lossless conversions between the message records and their
//! protobuf wire shapes.

use crate::message::*;
use crate::raft_payload_proto::{envelope_proto::Payload, *};

impl From<&RequestVote> for RequestVoteProto {
    fn from(m: &RequestVote) -> Self {
        RequestVoteProto {
            term: m.term,
            candidate_id: m.candidate_id,
            last_log_index: m.last_log_index,
            last_log_term: m.last_log_term,
        }
    }
}

impl From<RequestVoteProto> for RequestVote {
    fn from(p: RequestVoteProto) -> Self {
        RequestVote {
            term: p.term,
            candidate_id: p.candidate_id,
            last_log_index: p.last_log_index,
            last_log_term: p.last_log_term,
        }
    }
}

impl From<&RequestVoteReply> for RequestVoteReplyProto {
    fn from(m: &RequestVoteReply) -> Self {
        RequestVoteReplyProto { term: m.term, vote_granted: m.vote_granted }
    }
}

impl From<RequestVoteReplyProto> for RequestVoteReply {
    fn from(p: RequestVoteReplyProto) -> Self {
        RequestVoteReply { term: p.term, vote_granted: p.vote_granted }
    }
}

impl From<&AppendEntries> for AppendEntriesProto {
    fn from(m: &AppendEntries) -> Self {
        AppendEntriesProto {
            term: m.term,
            leader_id: m.leader_id,
            prev_log_index: m.prev_log_index,
            prev_log_term: m.prev_log_term,
            entries: m.entries.clone(),
            leader_commit: m.leader_commit,
            leader_snapshot_index: m.leader_snapshot_index,
            payload_version: m.payload_version as u32,
            leader_address: m.leader_address.clone(),
        }
    }
}

impl From<AppendEntriesProto> for AppendEntries {
    fn from(p: AppendEntriesProto) -> Self {
        AppendEntries {
            term: p.term,
            leader_id: p.leader_id,
            prev_log_index: p.prev_log_index,
            prev_log_term: p.prev_log_term,
            entries: p.entries,
            leader_commit: p.leader_commit,
            leader_snapshot_index: p.leader_snapshot_index,
            payload_version: p.payload_version as u16,
            leader_address: p.leader_address,
        }
    }
}

impl From<&AppendEntriesReply> for AppendEntriesReplyProto {
    fn from(m: &AppendEntriesReply) -> Self {
        AppendEntriesReplyProto {
            follower_id: m.follower_id,
            term: m.term,
            success: m.success,
            log_last_index: m.log_last_index,
            log_last_term: m.log_last_term,
            payload_version: m.payload_version as u32,
            raft_version: m.raft_version as u32,
            force_install_snapshot: m.force_install_snapshot,
            needs_leader_address: m.needs_leader_address,
        }
    }
}

impl From<AppendEntriesReplyProto> for AppendEntriesReply {
    fn from(p: AppendEntriesReplyProto) -> Self {
        AppendEntriesReply {
            follower_id: p.follower_id,
            term: p.term,
            success: p.success,
            log_last_index: p.log_last_index,
            log_last_term: p.log_last_term,
            payload_version: p.payload_version as u16,
            raft_version: p.raft_version as u8,
            force_install_snapshot: p.force_install_snapshot,
            needs_leader_address: p.needs_leader_address,
        }
    }
}

impl From<&InstallSnapshot> for InstallSnapshotProto {
    fn from(m: &InstallSnapshot) -> Self {
        InstallSnapshotProto {
            term: m.term,
            leader_id: m.leader_id,
            last_included_index: m.last_included_index,
            last_included_term: m.last_included_term,
            chunk_data: m.chunk_data.clone(),
            chunk_index: m.chunk_index,
            total_chunks: m.total_chunks,
            last_chunk_hash: m.last_chunk_hash,
            cluster_config: m.cluster_config.clone(),
            raft_version: m.raft_version as u32,
        }
    }
}

impl From<InstallSnapshotProto> for InstallSnapshot {
    fn from(p: InstallSnapshotProto) -> Self {
        InstallSnapshot {
            term: p.term,
            leader_id: p.leader_id,
            last_included_index: p.last_included_index,
            last_included_term: p.last_included_term,
            chunk_data: p.chunk_data,
            chunk_index: p.chunk_index,
            total_chunks: p.total_chunks,
            last_chunk_hash: p.last_chunk_hash,
            cluster_config: p.cluster_config,
            raft_version: p.raft_version as u8,
        }
    }
}

impl From<&InstallSnapshotReply> for InstallSnapshotReplyProto {
    fn from(m: &InstallSnapshotReply) -> Self {
        InstallSnapshotReplyProto {
            term: m.term,
            follower_id: m.follower_id,
            chunk_index: m.chunk_index,
            success: m.success,
        }
    }
}

impl From<InstallSnapshotReplyProto> for InstallSnapshotReply {
    fn from(p: InstallSnapshotReplyProto) -> Self {
        InstallSnapshotReply {
            term: p.term,
            follower_id: p.follower_id,
            chunk_index: p.chunk_index,
            success: p.success,
        }
    }
}

impl From<&Envelope> for EnvelopeProto {
    fn from(envelope: &Envelope) -> Self {
        let payload = match &envelope.message {
            RaftMessage::RequestVote(m) => Payload::RequestVote(m.into()),
            RaftMessage::RequestVoteReply(m) => Payload::RequestVoteReply(m.into()),
            RaftMessage::AppendEntries(m) => Payload::AppendEntries(m.into()),
            RaftMessage::AppendEntriesReply(m) => Payload::AppendEntriesReply(m.into()),
            RaftMessage::InstallSnapshot(m) => Payload::InstallSnapshot(m.into()),
            RaftMessage::InstallSnapshotReply(m) => Payload::InstallSnapshotReply(m.into()),
        };
        EnvelopeProto {
            from: envelope.from,
            to: envelope.to,
            payload: Some(payload),
        }
    }
}

impl From<Payload> for RaftMessage {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::RequestVote(p) => RaftMessage::RequestVote(p.into()),
            Payload::RequestVoteReply(p) => RaftMessage::RequestVoteReply(p.into()),
            Payload::AppendEntries(p) => RaftMessage::AppendEntries(p.into()),
            Payload::AppendEntriesReply(p) => RaftMessage::AppendEntriesReply(p.into()),
            Payload::InstallSnapshot(p) => RaftMessage::InstallSnapshot(p.into()),
            Payload::InstallSnapshotReply(p) => RaftMessage::InstallSnapshotReply(p.into()),
        }
    }
}
