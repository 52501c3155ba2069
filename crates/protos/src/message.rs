//! The six RPCs exchanged between raft peers. Each one is a plain record,
//! the sum type [RaftMessage] is what the consensus core dispatches on and
//! what the codec table turns into bytes.

use std::fmt::{self, Display, Formatter};

use crate::raft_log_proto::{ClusterConfig, Entry};
use crate::version::PayloadVersion;

#[derive(Debug, Clone, PartialEq)]
pub struct RequestVote {
    pub term: u64,
    pub candidate_id: u64,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestVoteReply {
    pub term: u64,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppendEntries {
    pub term: u64,
    pub leader_id: u64,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<Entry>,
    pub leader_commit: u64,
    /// The leader's compaction point, entries at or below it can only be
    /// shipped as a snapshot.
    pub leader_snapshot_index: u64,
    pub payload_version: PayloadVersion,
    /// Attached only after the follower asked for it.
    pub leader_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppendEntriesReply {
    pub follower_id: u64,
    pub term: u64,
    pub success: bool,
    /// On success the last index verified against the request,
    /// on failure the follower's own last index.
    pub log_last_index: u64,
    pub log_last_term: u64,
    pub payload_version: PayloadVersion,
    pub raft_version: u8,
    pub force_install_snapshot: bool,
    pub needs_leader_address: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstallSnapshot {
    pub term: u64,
    pub leader_id: u64,
    pub last_included_index: u64,
    pub last_included_term: u64,
    pub chunk_data: Vec<u8>,
    /// 1-based.
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Hash of the bytes of chunk `chunk_index - 1`.
    pub last_chunk_hash: Option<u64>,
    pub cluster_config: Option<ClusterConfig>,
    pub raft_version: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstallSnapshotReply {
    pub term: u64,
    pub follower_id: u64,
    pub chunk_index: u32,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RaftMessage {
    RequestVote(RequestVote),
    RequestVoteReply(RequestVoteReply),
    AppendEntries(AppendEntries),
    AppendEntriesReply(AppendEntriesReply),
    InstallSnapshot(InstallSnapshot),
    InstallSnapshotReply(InstallSnapshotReply),
}

/// Stable one byte tag of each kind, used by the fixed layout codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    RequestVote = 1,
    RequestVoteReply = 2,
    AppendEntries = 3,
    AppendEntriesReply = 4,
    InstallSnapshot = 5,
    InstallSnapshotReply = 6,
}

impl MessageKind {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::RequestVote),
            2 => Some(Self::RequestVoteReply),
            3 => Some(Self::AppendEntries),
            4 => Some(Self::AppendEntriesReply),
            5 => Some(Self::InstallSnapshot),
            6 => Some(Self::InstallSnapshotReply),
            _ => None,
        }
    }
}

impl RaftMessage {
    #[inline]
    pub fn term(&self) -> u64 {
        match self {
            RaftMessage::RequestVote(m) => m.term,
            RaftMessage::RequestVoteReply(m) => m.term,
            RaftMessage::AppendEntries(m) => m.term,
            RaftMessage::AppendEntriesReply(m) => m.term,
            RaftMessage::InstallSnapshot(m) => m.term,
            RaftMessage::InstallSnapshotReply(m) => m.term,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            RaftMessage::RequestVote(_) => MessageKind::RequestVote,
            RaftMessage::RequestVoteReply(_) => MessageKind::RequestVoteReply,
            RaftMessage::AppendEntries(_) => MessageKind::AppendEntries,
            RaftMessage::AppendEntriesReply(_) => MessageKind::AppendEntriesReply,
            RaftMessage::InstallSnapshot(_) => MessageKind::InstallSnapshot,
            RaftMessage::InstallSnapshotReply(_) => MessageKind::InstallSnapshotReply,
        }
    }

    /// Replies never get an answer, a stale one is just discarded.
    #[inline]
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            RaftMessage::RequestVoteReply(_)
                | RaftMessage::AppendEntriesReply(_)
                | RaftMessage::InstallSnapshotReply(_)
        )
    }

    /// Messages only a leader sends, receiving one in the same or a higher
    /// term tells who the leader is.
    #[inline]
    pub fn is_from_leader(&self) -> bool {
        matches!(
            self,
            RaftMessage::AppendEntries(_) | RaftMessage::InstallSnapshot(_)
        )
    }
}

/// A message with its routing header.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub from: u64,
    pub to: u64,
    pub message: RaftMessage,
}

impl Envelope {
    #[inline]
    pub fn new(from: u64, to: u64, message: RaftMessage) -> Self {
        Envelope { from, to, message }
    }

    #[inline]
    pub fn term(&self) -> u64 {
        self.message.term()
    }
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::RequestVote => "RequestVote",
            MessageKind::RequestVoteReply => "RequestVoteReply",
            MessageKind::AppendEntries => "AppendEntries",
            MessageKind::AppendEntriesReply => "AppendEntriesReply",
            MessageKind::InstallSnapshot => "InstallSnapshot",
            MessageKind::InstallSnapshotReply => "InstallSnapshotReply",
        };
        write!(f, "{}", name)
    }
}

impl Display for Envelope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} -> {} at term {}]",
            self.message.kind(),
            self.from,
            self.to,
            self.term()
        )
    }
}
