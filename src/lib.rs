//! A raft consensus core. The crates it's made of:
//! * `protos`: log entries, messages and the versioned wire codec.
//! * `common`: errors, logging and the `Storage` trait with its in-memory
//! implementation.
//! * `consensus`: the raft algorithm itself, driven through `RaftNode`.
//! * `components`: durable storage on local files.
//! * `application`: the `Peer` driving a node, its storage, the state
//! machine and the transport.

pub use application::*;
pub use common::{self, protos};
pub use consensus;
pub use components::storage::{FileStorage, MemStorage, Storage};
