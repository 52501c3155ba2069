#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RequestVoteProto {
    #[prost(uint64, tag="1")]
    pub term: u64,
    #[prost(uint64, tag="2")]
    pub candidate_id: u64,
    #[prost(uint64, tag="3")]
    pub last_log_index: u64,
    #[prost(uint64, tag="4")]
    pub last_log_term: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RequestVoteReplyProto {
    #[prost(uint64, tag="1")]
    pub term: u64,
    #[prost(bool, tag="2")]
    pub vote_granted: bool,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppendEntriesProto {
    #[prost(uint64, tag="1")]
    pub term: u64,
    #[prost(uint64, tag="2")]
    pub leader_id: u64,
    #[prost(uint64, tag="3")]
    pub prev_log_index: u64,
    #[prost(uint64, tag="4")]
    pub prev_log_term: u64,
    #[prost(message, repeated, tag="5")]
    pub entries: ::prost::alloc::vec::Vec<super::raft_log_proto::Entry>,
    #[prost(uint64, tag="6")]
    pub leader_commit: u64,
    /// Entries at or below this index only exist in the leader's snapshot.
    #[prost(uint64, tag="7")]
    pub leader_snapshot_index: u64,
    #[prost(uint32, tag="8")]
    pub payload_version: u32,
    /// Since Argon.
    #[prost(string, optional, tag="9")]
    pub leader_address: ::core::option::Option<::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppendEntriesReplyProto {
    #[prost(uint64, tag="1")]
    pub follower_id: u64,
    #[prost(uint64, tag="2")]
    pub term: u64,
    #[prost(bool, tag="3")]
    pub success: bool,
    #[prost(uint64, tag="4")]
    pub log_last_index: u64,
    #[prost(uint64, tag="5")]
    pub log_last_term: u64,
    #[prost(uint32, tag="6")]
    pub payload_version: u32,
    #[prost(uint32, tag="7")]
    pub raft_version: u32,
    #[prost(bool, tag="8")]
    pub force_install_snapshot: bool,
    /// Since Argon.
    #[prost(bool, tag="9")]
    pub needs_leader_address: bool,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstallSnapshotProto {
    #[prost(uint64, tag="1")]
    pub term: u64,
    #[prost(uint64, tag="2")]
    pub leader_id: u64,
    #[prost(uint64, tag="3")]
    pub last_included_index: u64,
    #[prost(uint64, tag="4")]
    pub last_included_term: u64,
    #[prost(bytes="vec", tag="5")]
    pub chunk_data: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, tag="6")]
    pub chunk_index: u32,
    #[prost(uint32, tag="7")]
    pub total_chunks: u32,
    #[prost(uint64, optional, tag="8")]
    pub last_chunk_hash: ::core::option::Option<u64>,
    /// Only carried by the final chunk.
    #[prost(message, optional, tag="9")]
    pub cluster_config: ::core::option::Option<super::raft_log_proto::ClusterConfig>,
    #[prost(uint32, tag="10")]
    pub raft_version: u32,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstallSnapshotReplyProto {
    #[prost(uint64, tag="1")]
    pub term: u64,
    #[prost(uint64, tag="2")]
    pub follower_id: u64,
    #[prost(uint32, tag="3")]
    pub chunk_index: u32,
    #[prost(bool, tag="4")]
    pub success: bool,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnvelopeProto {
    #[prost(uint64, tag="1")]
    pub from: u64,
    #[prost(uint64, tag="2")]
    pub to: u64,
    #[prost(oneof="envelope_proto::Payload", tags="3, 4, 5, 6, 7, 8")]
    pub payload: ::core::option::Option<envelope_proto::Payload>,
}
/// Nested message and enum types in `EnvelopeProto`.
pub mod envelope_proto {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag="3")]
        RequestVote(super::RequestVoteProto),
        #[prost(message, tag="4")]
        RequestVoteReply(super::RequestVoteReplyProto),
        #[prost(message, tag="5")]
        AppendEntries(super::AppendEntriesProto),
        #[prost(message, tag="6")]
        AppendEntriesReply(super::AppendEntriesReplyProto),
        #[prost(message, tag="7")]
        InstallSnapshot(super::InstallSnapshotProto),
        #[prost(message, tag="8")]
        InstallSnapshotReply(super::InstallSnapshotReplyProto),
    }
}
