pub mod raft_log_proto;
pub mod raft_payload_proto;

pub mod codec;
pub mod message;
pub mod version;

pub mod extends {
    pub mod raft_config_ext;
    pub mod raft_log_ext;
    pub mod raft_payload_ext;
    pub mod raft_snapshot_ext;
}

pub mod prelude {
    pub use crate::codec::{self, codec_for, decode_frame, encode_frame, Codec, CodecError};
    pub use crate::message::*;
    pub use crate::raft_log_proto::{self, *};
    pub use crate::version::{PayloadVersion, RaftVersion};
    pub use prost::{self, Message};
}
