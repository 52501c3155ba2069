use crate::errors::*;
use crate::protos::prelude::{Envelope, RaftMessage};
use crate::{raft::Raft, storage::Storage};
use slog::debug;

use super::raft_follower::FollowerRaft;

pub trait CandidateRaft {
    fn process(&mut self, envelope: Envelope) -> Result<()>;
}

impl<STORAGE: Storage> CandidateRaft for Raft<STORAGE> {
    fn process(&mut self, envelope: Envelope) -> Result<()> {
        let (msg_from, msg_term) = (envelope.from, envelope.term());
        match &envelope.message {
            // someone else won the election of this term, follow it and
            // let the follower handle the message.
            RaftMessage::AppendEntries(_) | RaftMessage::InstallSnapshot(_) => {
                debug_assert_eq!(self.term, msg_term);
                self.become_follower(msg_term, msg_from);
                return FollowerRaft::process(self, envelope);
            }
            RaftMessage::RequestVoteReply(reply) => {
                if !self.tracker.is_voter(msg_from) {
                    debug!(self.logger, "ignore vote from non voter {from}", from = msg_from);
                    return Ok(());
                }
                // record vote from other peer, and tally result.
                self.poll_and_handle_votes(msg_from, reply.vote_granted);
            }
            _ => {
                debug!(
                    self.logger,
                    "candidate ignored {}", envelope;
                    "term" => self.term,
                );
            }
        }
        Ok(())
    }
}
