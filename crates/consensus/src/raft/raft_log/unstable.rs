use crate::protos::raft_log_proto::{Entry, Snapshot};

use super::Stable;

/// The unstable.buffer[i] has raft log position i + unstable.offset.
/// Note that unstable.offset may be less than the highest log
/// position in storage; this means that the next write to storage
/// might need to truncate the log before persisting unstable.entries.
#[derive(Debug)]
pub struct Unstable {
    pub snapshot: Option<Snapshot>,
    pub buffer: Vec<Entry>,
    pub offset: u64,
}

impl Unstable {
    pub fn new(offset: u64) -> Self {
        Unstable {
            offset,
            snapshot: None,
            buffer: vec![],
        }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.buffer.clear();
        self.offset = snapshot.get_metadata().index + 1;
        self.snapshot = Some(snapshot);
    }

    pub fn maybe_first_index(&self) -> Option<u64> {
        self.snapshot
            .as_ref()
            .map(|snap| snap.get_metadata().index + 1)
    }

    pub fn maybe_last_index(&self) -> Option<u64> {
        match self.buffer.len() {
            0 => self.snapshot.as_ref().map(|snap| snap.get_metadata().index),
            len => Some(self.offset + len as u64 - 1),
        }
    }

    pub fn slice(&self, lo: u64, hi: u64) -> &[Entry] {
        self.deal_with_boundary(lo, hi);
        let (lo, hi) = ((lo - self.offset) as usize, (hi - self.offset) as usize);
        &self.buffer[lo..hi]
    }

    pub fn maybe_term(&self, index: u64) -> Option<u64> {
        if index < self.offset {
            let meta = self.snapshot.as_ref()?.get_metadata();
            if index == meta.index {
                Some(meta.term)
            } else {
                None
            }
        } else {
            self.maybe_last_index().and_then(|last| {
                if last < index {
                    return None;
                }
                Some(self.buffer[(index - self.offset) as usize].term)
            })
        }
    }

    /// Stash entries to unstable buffer
    /// ## Notes
    /// There has 3 cases when stashing buffer, see: <br/>
    /// * ***Case 1:*** <br/>
    ///   when buffered is {3,4,5} and entries is {1,2,3,4} (or is {1,2}) <br/>
    ///   then just replace buffer to {1,2,3,4} (or to {1,2}), offset is 1 <br/>
    /// * ***Case 2:*** <br/>
    ///   when buffered is {3,4,5} and entries is {6,7,8} <br/>
    ///   then just append entries to end of buffer, {3,4,5,6,7,8}, offset still 3 <br/>
    /// * ***Case 3:*** <br/>
    ///   Then Keep the origin buffered which index < after and replace others with new entries <br/>
    ///   Assumes buffered is {3,4,5,6} and entries is {5,6,7}, then {3,4,5,6,7}
    ///   with the new 5 and 6, offset still be 3
    pub fn stash(&mut self, entries: &[Entry]) {
        let after = entries[0].index;
        if after == self.offset + self.buffer.len() as u64 {
            // step in case 2
        } else if after <= self.offset {
            // step in case 1
            self.offset = after;
            self.buffer.clear();
        } else {
            // step in case 3
            let offset = self.offset;
            self.deal_with_boundary(offset, after);
            self.buffer.truncate((after - offset) as usize);
        }
        self.buffer.extend_from_slice(entries);
    }

    fn deal_with_boundary(&self, lo: u64, hi: u64) {
        if lo > hi {
            panic!("invalid range of low: {} high: {}", lo, hi);
        }

        let buffer_high = self.offset + self.buffer.len() as u64;
        if lo < self.offset || hi > buffer_high {
            panic!(
                "out of range, input: [low({}), .. hi({})] actual: [offset({}) .. high({})], ",
                lo, hi, self.offset, buffer_high
            );
        }
    }
}

impl Stable for Unstable {
    /// To stable (actually, it's clear) the snapshot in the unstable storage with expected index.
    /// ### Params
    /// * ***expected_index***: this index will be used to match the index of snapshot, only if it's matched will be approve
    fn stable_snapshot(&mut self, expected_index: u64) {
        match self.snapshot.as_ref() {
            Some(snapshot) if snapshot.get_metadata().index == expected_index => {
                self.snapshot = None;
            }
            Some(snapshot) => panic!(
                "unstable.snapshot has different index: {} from expected: {}",
                snapshot.get_metadata().index,
                expected_index
            ),
            None => panic!(
                "unstable snapshot is None, require one snapshot of index: {}",
                expected_index
            ),
        }
    }

    /// Entries up to `expected_index` were written out. Ignored when the
    /// buffer was overwritten meanwhile and the term no longer matches.
    fn stable_entries(&mut self, expected_index: u64, expected_term: u64) {
        if self.maybe_term(expected_index) != Some(expected_term) || expected_index < self.offset {
            return;
        }
        let stabled = (expected_index + 1 - self.offset) as usize;
        self.buffer.drain(..stabled);
        self.offset = expected_index + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::Unstable;
    use crate::protos::raft_log_proto::{Entry, EntryType, Snapshot};
    use crate::raft::raft_log::Stable;

    fn entry(index: u64, term: u64) -> Entry {
        Entry::new(EntryType::EntryNormal, term, index, vec![])
    }

    #[test]
    fn test_stash_cases() {
        let mut unstable = Unstable::new(3);
        unstable.stash(&[entry(3, 1), entry(4, 1), entry(5, 1)]);
        unstable.stash(&[entry(6, 1)]);
        assert_eq!(unstable.maybe_last_index(), Some(6));

        unstable.stash(&[entry(5, 2), entry(6, 2), entry(7, 2)]);
        assert_eq!(unstable.maybe_term(4), Some(1));
        assert_eq!(unstable.maybe_term(5), Some(2));
        assert_eq!(unstable.slice(5, 8).len(), 3);

        unstable.stash(&[entry(2, 3)]);
        assert_eq!(unstable.offset, 2);
        assert_eq!(unstable.maybe_last_index(), Some(2));
    }

    #[test]
    fn test_stable_entries() {
        let mut unstable = Unstable::new(1);
        unstable.stash(&[entry(1, 1), entry(2, 1), entry(3, 2)]);
        unstable.stable_entries(2, 1);
        assert_eq!(unstable.offset, 3);
        assert_eq!(unstable.buffer.len(), 1);
        // wrong term, nothing changes.
        unstable.stable_entries(3, 1);
        assert_eq!(unstable.offset, 3);
        unstable.stable_entries(3, 2);
        assert!(unstable.buffer.is_empty());
        assert_eq!(unstable.offset, 4);
    }

    #[test]
    fn test_restore_snapshot() {
        let mut unstable = Unstable::new(5);
        unstable.stash(&[entry(5, 1)]);
        unstable.restore(Snapshot::new(10, 3, None, vec![]));
        assert_eq!(unstable.maybe_first_index(), Some(11));
        assert_eq!(unstable.maybe_last_index(), Some(10));
        assert_eq!(unstable.maybe_term(10), Some(3));
        assert_eq!(unstable.maybe_term(9), None);
        unstable.stable_snapshot(10);
        assert!(unstable.snapshot.is_none());
    }
}
