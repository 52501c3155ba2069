/// The entry is a type of change that needs to be applied. The usage of `data`
/// is determined by the entry_type.
///
/// For normal entries, the data field is the opaque command proposed by the
/// application. For configuration changes, the data contains an encoded
/// `ClusterConfig` which replaces the current one once the entry is committed.
/// Noop entries are appended by a freshly elected leader and carry nothing.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Entry {
    #[prost(enumeration="EntryType", tag="1")]
    pub entry_type: i32,
    #[prost(uint64, tag="2")]
    pub term: u64,
    #[prost(uint64, tag="3")]
    pub index: u64,
    #[prost(bytes="vec", tag="4")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerInfo {
    #[prost(uint64, tag="1")]
    pub id: u64,
    /// Non-voting servers receive replication but never count toward quorum.
    #[prost(bool, tag="2")]
    pub voting: bool,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClusterConfig {
    /// Ordered set of members, the order is the order they were added.
    #[prost(message, repeated, tag="1")]
    pub servers: ::prost::alloc::vec::Vec<ServerInfo>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HardState {
    #[prost(uint64, tag="1")]
    pub term: u64,
    #[prost(uint64, tag="2")]
    pub vote: u64,
    #[prost(uint64, tag="3")]
    pub commit: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SnapshotMetadata {
    /// Only present when the membership changed at or before the snapshot point.
    #[prost(message, optional, tag="1")]
    pub config: ::core::option::Option<ClusterConfig>,
    /// The last included index.
    #[prost(uint64, tag="2")]
    pub index: u64,
    /// The term of the last included index.
    #[prost(uint64, tag="3")]
    pub term: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Snapshot {
    #[prost(bytes="vec", tag="1")]
    pub data: ::prost::alloc::vec::Vec<u8>,
    #[prost(message, optional, tag="2")]
    pub metadata: ::core::option::Option<SnapshotMetadata>,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EntryType {
    EntryNormal = 0,
    EntryConfChange = 1,
    EntryNoop = 2,
}
