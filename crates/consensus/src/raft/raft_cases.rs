use std::fmt::Display;

use crate::storage::Storage;

use super::{Raft, DUMMY_ID};
use crate::protos::prelude::{Envelope, RaftMessage};
use crate::raft::raft_role::RaftRole as role;
use slog::{debug, Value};

#[derive(Debug)]
pub enum RaftCases {
    /// maybe step in case when recv `RequestVote`<br/>
    /// and response `RequestVoteReply` in accept
    ApproveRequestVote,
    /// maybe step in case when recv `RequestVote`<br/>
    /// and response `RequestVoteReply` in reject
    RejectRequestVote,
    /// a request with lower term from an outdated peer, answered with a
    /// failure carrying our term so that peer steps down.
    StaleRequest,
    /// a reply with lower term, answers something we no longer wait for.
    /// no messages will be generated after step in.
    StaleReply,

    // dispatch the normal message to each kinds of roles
    LeaderRecvMsg,
    FollowerRecvMsg,
    CandidateRecvMsg,
}

impl RaftCases {
    /// Pre-handle a message received from other peer before really consume it in the right way.
    /// * **High Term Msg**:
    ///     Local peer is outdated, become follower (of remote peer if it's
    ///     `AppendEntries` or `InstallSnapshot`), then handle this message as new role.
    /// * **Low Term Msg**:
    ///     The remote peer is outdated, a request is rejected with my term,
    ///     a reply is ignored.
    /// * **Same Term**:
    ///     Consume it directly
    pub fn receive<S: Storage>(local_raft: &mut Raft<S>, envelope: &Envelope) -> Self {
        let message = &envelope.message;
        let term = message.term();
        if term > local_raft.term {
            debug!(
                local_raft.logger,
                "received a message with higher term from {from}",
                from = envelope.from;
                "term" => local_raft.term,
                "message_term" => term,
                "msg type" => %message.kind(),
            );
            let leader_id = if message.is_from_leader() {
                envelope.from
            } else {
                DUMMY_ID
            };
            local_raft.become_follower(term, leader_id);
            return RaftCases::dispatch_message(local_raft, envelope);
        }
        if term < local_raft.term {
            if message.is_reply() {
                return Self::StaleReply;
            }
            return Self::StaleRequest;
        }
        RaftCases::dispatch_message(local_raft, envelope)
    }

    fn dispatch_message<S: Storage>(peer: &mut Raft<S>, envelope: &Envelope) -> Self {
        match &envelope.message {
            // when current raft peer recv a vote request
            RaftMessage::RequestVote(request) => {
                if Self::can_vote(peer, request.candidate_id)
                    && peer.promotable()
                    && peer
                        .raft_log
                        .is_up_to_date(request.last_log_index, request.last_log_term)
                {
                    RaftCases::ApproveRequestVote
                } else {
                    RaftCases::RejectRequestVote
                }
            }
            // otherwise we step in raft peer in each state
            _ => match peer.current_raft_role {
                role::Leader => Self::LeaderRecvMsg,
                role::Candidate => Self::CandidateRecvMsg,
                role::Follower => Self::FollowerRecvMsg,
            },
        }
    }

    /// A vote is granted at most once per term, repeating it for the
    /// same candidate is fine.
    #[inline]
    pub fn can_vote<S: Storage>(peer: &Raft<S>, candidate: u64) -> bool {
        peer.vote == DUMMY_ID || peer.vote == candidate
    }

    fn describe_case(&self) -> &'static str {
        match self {
            RaftCases::CandidateRecvMsg => "receive a msg as candidate",
            RaftCases::StaleRequest => "receive a request with low term",
            RaftCases::StaleReply => "receive a reply with low term",
            RaftCases::ApproveRequestVote => "decide to approve the vote",
            RaftCases::RejectRequestVote => "decide to reject the vote",
            RaftCases::LeaderRecvMsg => "receive a msg as leader",
            RaftCases::FollowerRecvMsg => "receive a msg as follower",
        }
    }
}

impl Value for RaftCases {
    fn serialize(
        &self,
        _record: &slog::Record,
        key: slog::Key,
        serializer: &mut dyn slog::Serializer,
    ) -> slog::Result {
        let case = self.describe_case();
        serializer.emit_str(key, case)
    }
}

impl Display for RaftCases {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = self.describe_case();
        write!(f, "{}", c)
    }
}
