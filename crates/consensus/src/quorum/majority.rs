// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::hash_set::Iter;
use std::fmt::Formatter;
use std::ops::Deref;

use crate::{DefaultHashBuilder, HashSet};

use super::{AckedIndexer, Quorum, VoteResult};

/// A set of IDs that uses majority quorums to make decisions. impl in Hashset
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Majority {
    voters: HashSet<u64>,
}

impl Quorum for Majority {
    fn committed_index(&self, acked_voters: &impl AckedIndexer) -> u64 {
        if self.voters.is_empty() {
            // an empty config commits nothing on its own behalf.
            return u64::MAX;
        }
        let mut matched: Vec<u64> = self
            .voters
            .iter()
            .map(|v| acked_voters.acked_index(*v).unwrap_or_default())
            .collect();
        matched.sort_unstable_by(|a, b| b.cmp(a));
        // find majority grant index as quorum's commit, e.g. [4,3,2,2,2] then 2 is quorum's commit.
        matched[majority(matched.len()) - 1]
    }

    fn vote_result(&self, check: impl Fn(u64) -> Option<bool>) -> VoteResult {
        if self.voters.is_empty() {
            // By convention, the elections on an empty config win.
            return VoteResult::Won;
        }

        let (mut yes, mut missing) = (0, 0);
        for voter in self.voters.iter() {
            match check(*voter) {
                Some(true) => yes += 1,
                Some(false) => (),
                // the vote maybe not arrived, not meaning reject
                None => missing += 1,
            }
        }
        let quorum_requirement = majority(self.voters.len());
        if yes >= quorum_requirement {
            VoteResult::Won
        } else if yes + missing >= quorum_requirement {
            VoteResult::Pending
        } else {
            VoteResult::Lost
        }
    }

    #[inline]
    fn contain_voter(&self, to_peer_id: u64) -> bool {
        self.voters.contains(&to_peer_id)
    }

    #[inline]
    fn clear(&mut self) {
        self.voters.clear()
    }
}

impl Majority {
    /// Creates a new Majority using the given IDs.
    pub fn new(voters: HashSet<u64>) -> Majority {
        Majority { voters }
    }

    /// Creates an empty Majority with given capacity.
    pub fn with_capacity(cap: usize) -> Majority {
        Majority {
            voters: HashSet::with_capacity_and_hasher(cap, DefaultHashBuilder::default()),
        }
    }

    /// Returns an iterator over voters.
    pub fn ids(&self) -> Iter<'_, u64> {
        self.voters.iter()
    }

    /// Returns the voters as a sorted vec.
    pub fn slice(&self) -> Vec<u64> {
        let mut voters: Vec<u64> = self.voters.iter().cloned().collect();
        voters.sort_unstable();
        voters
    }
}

/// Calculate quorm of given total.
#[inline]
pub fn majority(total: usize) -> usize {
    total / 2 + 1
}

impl Deref for Majority {
    type Target = HashSet<u64>;

    #[inline]
    fn deref(&self) -> &HashSet<u64> {
        &self.voters
    }
}

impl FromIterator<u64> for Majority {
    fn from_iter<T: IntoIterator<Item = u64>>(iter: T) -> Self {
        Majority {
            voters: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for Majority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({})",
            self.slice()
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<String>>()
                .join(" ")
        )
    }
}
