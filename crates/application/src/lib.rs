//! A single raft peer driven on one thread: every input (a tick, a frame
//! from another peer, a proposal) is stepped into the consensus core, then
//! the resulting `Ready` is persisted, sent and applied before the next
//! input is taken.

pub mod mailbox;
pub mod peer;
pub mod state_machine;

#[cfg(test)]
mod simulation;

// For public use
pub use consensus::raft::{raft_role::RaftRole, SoftState};
pub use mailbox::Transport;
pub use peer::{config::PeerConfig, Peer};
pub use state_machine::StateMachine;

// For internal use
use common::errors::{Error as ConsensusError, Result as RaftResult};
use common::protos;
use components::storage;

use consensus::config::Config as RaftConfig;
use consensus::raft_node::status::Status as RaftStatus;
