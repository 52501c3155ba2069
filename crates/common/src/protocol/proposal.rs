/// Where an accepted proposal landed in the leader's log. It is not
/// committed yet, watch `Ready::committed_entries` for `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proposed {
    pub index: u64,
    pub term: u64,
}

impl Proposed {
    #[inline]
    pub fn new(index: u64, term: u64) -> Self {
        Proposed { index, term }
    }
}
