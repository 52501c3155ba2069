use std::cmp::{max, min};
use std::fmt::{self, Display};

use slog::{debug, trace, Logger};

use crate::errors::*;
use crate::protos::raft_log_proto::{Entry, Snapshot};
use crate::storage::{limit_size, Storage};

use self::unstable::Unstable;

mod unstable;

use super::{DUMMY_INDEX, DUMMY_TERM};

/// The implementation of raft log.
/// Entries in current raft:
/// ```text
/// Store (stable)                       Buffer (unstable)
/// ------------------------------------|---------------------------
///  ____                        ____       _____              ____
/// |__1_| -->  ... ...    -->  |__x_|  |  |_x+1_|  ...  -->  |__m_|
/// ------------------------------|-----|----|----------------------
///                               | index    |
///                            persisted   offset
///
///                       applied =< min(persisted, quorum_committed)
///
///                                       quorum_committed
/// Entries in quorum (other nodes):          |
/// Store (stable)                            |    Buffer (unstable)
/// ------------------------------------------|---|---------------------------
///  ____                      ____         ____      _____              ____
/// |__1_| -->  ... ...  -->  |__x_|  -->  |__y_| |  |_y+1_|  ...  -->  |__n_|
/// ----------------------------------------------|---------------------------
///```
pub struct RaftLog<S: Storage> {
    /// Contains all stable entries since the last snapshot
    pub store: S,

    /// Contains all unstable entries and snapshot in memory,
    /// All these unstable data will be flush to stable store
    pub unstable: Unstable,

    /// The highest log position that is known to be in stable storage
    /// on a quorum of nodes.
    ///
    /// Invariant: applied <= quorum_committed
    pub quorum_committed: u64,

    /// The highest log position that the application has been instructed
    /// to apply to its state machine.
    ///
    /// Invariant: applied <= min(quorum_committed, persisted)
    applied: u64,

    /// The highest log position that is known to be persisted in stable
    /// storage. It's used for limiting the upper bound of quorum_committed and
    /// persisted entries.
    ///
    /// Invariant: persisted < unstable.offset && applied <= persisted
    persisted: u64,

    pub(crate) logger: Logger,
}

impl<S> RaftLog<S>
where
    S: Storage,
{
    /// Initialize the RaftLog with store.first_index and store.last_index
    pub fn new(store: S, logger: Logger) -> Result<RaftLog<S>> {
        let first_idx = store.first_index()?;
        let last_index = store.last_index()?;

        Ok(RaftLog {
            store,
            quorum_committed: first_idx - 1,
            applied: first_idx - 1, // initial
            persisted: last_index,  // initial
            unstable: Unstable::new(last_index + 1),
            logger,
        })
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        debug!(
            self.logger,
            "log [{log}] starts to restore snapshot [index: {snapshot_index}, term: {snapshot_term}]",
            log = self.to_string(),
            snapshot_index = snapshot.get_metadata().index,
            snapshot_term = snapshot.get_metadata().term,
        );
        let restore_index = snapshot.get_metadata().index;
        assert!(
            restore_index >= self.quorum_committed,
            "{} < {}",
            restore_index,
            self.quorum_committed
        );
        // If `persisted` is greater than `quorum_committed`, reset it to `quorum_committed`.
        // Only the persisted entries below `committed` are known to equal the snapshot content.
        if self.quorum_committed < self.persisted {
            self.persisted = self.quorum_committed;
        }
        self.quorum_committed = restore_index;
        self.unstable.restore(snapshot);
    }

    #[inline]
    pub fn get_persisted(&self) -> u64 {
        self.persisted // getter
    }

    #[inline]
    pub fn get_applied(&self) -> u64 {
        self.applied // getter
    }

    /// Grab a read-only reference to the underlying storage.
    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Grab a mutable reference to the underlying storage.
    #[inline]
    pub fn mut_store(&mut self) -> &mut S {
        &mut self.store
    }

    /// Determines if the given (index, term) log is more up-to-date
    /// by comparing the index and term of the last entry in the existing logs.
    /// If the logs have last entry with different terms, then the log with the
    /// later term is more up-to-date. If the logs end with the same term, then
    /// whichever log has the larger last_index is more up-to-date. If the logs are
    /// the same, the given log is up-to-date.
    pub fn is_up_to_date(&self, index: u64, term: u64) -> bool {
        term > self.last_term() || (term == self.last_term() && index >= self.last_index())
    }

    #[inline]
    pub fn unstable(&self) -> &Unstable {
        &self.unstable
    }

    #[inline]
    pub fn unstable_entries(&self) -> &[Entry] {
        &self.unstable.buffer
    }

    #[inline]
    pub fn unstable_snapshot(&self) -> Option<&Snapshot> {
        self.unstable.snapshot.as_ref()
    }

    #[inline]
    pub fn update_applied_index(&mut self, applied: u64) {
        self.set_applied(applied);
    }

    fn set_applied(&mut self, index: u64) {
        if index == 0 {
            return;
        }
        if index > min(self.quorum_committed, self.persisted) || index < self.applied {
            panic!(
                "applied: {} should always less than quorum_committed: {} and persisted: {}, and larger than origin applied({})",
                index, self.quorum_committed, self.persisted, self.applied
            );
        }
        self.applied = index; // setter
    }

    /// Try to find the `conflict index` on given `term`, the `conflict index` less or equal to
    /// given `index`. It's the largest index whose term is not larger than `term`.
    pub fn find_conflict_by_term(&self, mut index: u64, term: u64) -> (u64, Option<u64>) {
        let last_index = self.last_index();
        if index > last_index {
            // conflict index should not be larger than last index (in both unstable and stable)
            return (index, None);
        }
        while index > 0 {
            match self.term(index) {
                Ok(current_term) => {
                    if current_term <= term {
                        return (index, Some(current_term));
                    }
                    // advance to previous index
                    index -= 1;
                }
                Err(_err) => {
                    // compacted, nothing below can be inspected
                    return (index, None);
                }
            }
        }
        (index, None)
    }

    /// Finds the first index of the conflict.
    /// ## Params
    /// * entries: the entries prepare to check
    /// ## Returns
    /// * u64: DUMMY_INDEX if there has not conflict betwee passed in entries and storage,
    /// otherwise return conflict_index
    /// ## Example
    /// Assume there exists (index, term) entries in storage(both stable unstable), it's
    /// looks like: <br/>
    /// `[(1,1), (2,1), (3,1), (4,2), (5,2)]`
    ///
    /// The entries passed in looks like: <br/>
    /// `[(2,1), (3,2), (4,2), (5,3), (6,3)]`
    ///
    /// Then return will be 3, and the first conflict entry if `(3,2)`
    ///
    /// If there are no conflicting entries, but the given entries contains new
    /// entries, the index of the first new entry will be returned.
    pub fn find_conflict(&self, entries: &[Entry]) -> u64 {
        for entry in entries {
            if !self.match_term(entry.index, entry.term) {
                // if the entry in same index with difference term, it means conflict occurred
                let conflict_index = entry.index;
                if conflict_index <= self.last_index() {
                    debug!(
                        self.logger,
                        "found conflict at index {index}", index = conflict_index;
                        "stored term" => self.term(entry.index).unwrap_or(0),
                        "conflict term in append entry" => entry.term
                    );
                }
                return conflict_index;
            }
        }
        DUMMY_INDEX
    }

    pub fn commit_to(&mut self, index: u64) {
        if self.quorum_committed >= index {
            // commit index should larger than committed value
            return;
        }
        if self.last_index() < index {
            // committed index should never larger than last index that stored in buffer (or stable storage)
            panic!(
                "prepared commit index {} is out of range [{}]",
                index,
                self.last_index()
            );
        }
        trace!(
            self.logger,
            "update committed to index({:?}), old committed: {:?}",
            index,
            self.quorum_committed
        );
        self.quorum_committed = index;
    }

    pub fn maybe_commit(&mut self, index: u64, term: u64) -> bool {
        if index > self.quorum_committed && self.match_term(index, term) {
            self.commit_to(index);
            true
        } else {
            false
        }
    }

    /// Grab the commited entry info if exists (in stable & unstable)
    /// ## Returns
    /// * (index, term) committed index and matched term (of committed)
    pub fn commit_info(&self) -> (u64, u64) {
        match self.term(self.quorum_committed) {
            Ok(matched_term) => (self.quorum_committed, matched_term),
            Err(e) => {
                panic!(
                    "last committed entry at {} is missing: {:?}",
                    self.quorum_committed, e
                )
            }
        }
    }

    /// Attempt to persist index and term
    pub fn maybe_persist(&mut self, index: u64, term: u64) -> bool {
        // It's possible that the term check can be passed but index is greater
        // than or equal to the first_update_index in some corner cases, entries
        // proposed by an older leader and overwritten meanwhile.
        // So never forward the persisted index beyond first_update_index, the
        // entries from there on are not written out yet.
        let first_update_index = match self.unstable.snapshot.as_ref() {
            Some(snapshot) => snapshot.get_metadata().index,
            None => self.unstable.offset,
        };
        if index > self.persisted
            && index < first_update_index
            && self.store.term(index).map_or(false, |t| t == term)
        {
            self.persisted = index;
            return true;
        }
        false
    }

    pub fn maybe_persist_snapshot(&mut self, snapshot_index: u64) -> bool {
        if snapshot_index <= self.persisted {
            return false;
        }
        if snapshot_index > self.quorum_committed {
            panic!(
                "snapshot index {} can't be larger than committed {}",
                snapshot_index, self.quorum_committed
            );
        }
        if snapshot_index >= self.unstable.offset {
            panic!(
                "snapshot index {} can't reach unstable offset {}",
                snapshot_index, self.unstable.offset
            );
        }
        self.persisted = snapshot_index;
        true
    }

    /// Find specific index and term in both stable and unstable storage, true if matched
    pub fn match_term(&self, index: u64, term: u64) -> bool {
        self.term(index)
            .map(|found_term| found_term == term)
            .unwrap_or(false)
    }

    #[inline]
    pub fn last_term(&self) -> u64 {
        match self.term(self.last_index()) {
            Ok(last_term) => last_term,
            Err(e) => panic!(
                "unexpected error when getting the last term, refer to: {:?}",
                e
            ),
        }
    }

    pub fn append(&mut self, entries: &[Entry]) -> u64 {
        trace!(
            self.logger,
            "Entries being appended to unstable list";
            "ents" => ?entries,
        );

        if entries.is_empty() {
            return self.last_index();
        }

        let after = entries[0].index - 1;
        if after < self.quorum_committed {
            panic!(
                "after {} is out of range [committed {}]",
                after, self.quorum_committed
            )
        }
        // the overwritten entries are not durable anymore.
        if after < self.persisted {
            self.persisted = after;
        }
        self.unstable.stash(entries);
        self.last_index()
    }

    /// Try append entries without conflict to unstable storage and commit, parts of conflicted will be dropped.
    /// ## Params
    /// * m_index:      the previous index received from leader
    /// * m_term:       the term of m_index
    /// * m_committed:  the leader tells us the actual committed in the quorum
    /// * m_entries:    the entries that leader raft want append to current raft
    /// ## Returns (None if the previous entry doesn't match)
    /// * conflict_index:   the first appended (or overwritten) index, DUMMY_INDEX if nothing
    /// * last_verified:    index of the last entry now known to match the leader
    pub fn maybe_append(
        &mut self,
        m_index: u64,
        m_term: u64,
        m_committed: u64,
        m_entries: &[Entry],
    ) -> Option<(u64, u64)> {
        if !self.match_term(m_index, m_term) {
            return None;
        }

        let conflict_index = self.find_conflict(m_entries);
        if conflict_index == DUMMY_INDEX {
            // there has not conflict between entries and stored
        } else if conflict_index <= self.quorum_committed {
            panic!(
                "entry {} conflict with committed entry {}",
                conflict_index, self.quorum_committed
            );
        } else {
            // otherwise append these entries (not conflict part) to unstable
            let append_from = (conflict_index - (m_index + 1)) as usize;
            self.append(&m_entries[append_from..]);
            if self.persisted > conflict_index - 1 {
                self.persisted = conflict_index - 1;
            }
        }
        let last_verified = m_index + m_entries.len() as u64;
        self.commit_to(min(m_committed, last_verified));
        Some((conflict_index, last_verified))
    }

    pub fn entries_remain(&self, from_index: u64, limit: impl Into<Option<u64>>) -> Result<Vec<Entry>> {
        let end = self.last_index();
        if end < from_index {
            return Ok(Vec::new());
        }
        self.entries(from_index, end + 1, limit.into())
    }

    /// Fetch all committed (and persisted) entries since applied entry's index
    pub fn entries_stable(&self) -> Option<Vec<Entry>> {
        self.entries_stable_since(self.applied)
    }

    /// Fetch all committed (and persisted) entries from given start index.
    /// ## Params
    /// * from_index: the index passed in, should not be larger than `quorum_committed` and `persisted`
    pub fn entries_stable_since(&self, from_index: u64) -> Option<Vec<Entry>> {
        let offset = max(from_index + 1, self.first_index());
        let high = min(self.quorum_committed, self.persisted) + 1;
        if high > offset {
            match self.entries(offset, high, None) {
                Ok(entries) => return Some(entries),
                Err(err) => panic!(
                    "unexpected error getting unapplied entries [{}, {}): {:?}",
                    offset, high, err
                ),
            }
        }
        None
    }

    pub fn is_entries_stable(&self) -> bool {
        self.is_entries_stable_since(self.applied)
    }

    pub fn is_entries_stable_since(&self, from_index: u64) -> bool {
        let offset = max(from_index + 1, self.first_index());
        let high = min(self.quorum_committed, self.persisted) + 1;
        high > offset
    }

    fn validate_boundary(&self, l: u64, h: u64) -> Option<Error> {
        if l > h {
            panic!("invalid slice {} > {}", l, h);
        }
        let first_index = self.first_index();
        if l < first_index {
            return Some(Error::Store(StorageError::Compacted));
        }
        let last_index = self.last_index();
        if h > last_index + 1 {
            panic!(
                "slice[{},{}] out of bound[{},{}]",
                l, h, first_index, last_index
            )
        }
        None
    }

    /// Get the entries in range of low to high from both storage (of raft) and unstable buffer
    pub fn entries(&self, low: u64, high: u64, limit: Option<u64>) -> Result<Vec<Entry>> {
        let mut result: Vec<Entry> = vec![];
        if low == high {
            return Ok(result);
        }
        if let Some(err) = self.validate_boundary(low, high) {
            return Err(err);
        }

        if low < self.unstable.offset {
            // part of queried entries should be fetched from storage
            let unstable_high = min(self.unstable.offset, high);
            match self.store.entries(low, unstable_high, limit) {
                Ok(entries) => {
                    result = entries;
                    if (result.len() as u64) < (unstable_high - low) {
                        return Ok(result);
                    }
                }
                Err(Error::Store(StorageError::Compacted)) => {
                    return Err(Error::Store(StorageError::Compacted))
                }
                Err(err) => panic!(
                    "entries[{}:{}] is unavailable from storage: {:?}",
                    low, unstable_high, err
                ),
            }
        }

        // still remain some quired entries stored in buffer
        if high > self.unstable.offset {
            let offset = self.unstable.offset;
            let unstable = self.unstable.slice(max(offset, low), high);
            result.extend_from_slice(unstable);
        }
        limit_size(&mut result, limit);
        Ok(result)
    }

    /// Grab specific entry's term via index from unstable (if exists) or storage.
    /// Indexes past the last one have term 0, compacted ones are an error.
    pub fn term(&self, index: u64) -> Result<u64> {
        let dummy_idx = self.first_index() - 1;
        if index < dummy_idx {
            return Err(Error::Store(StorageError::Compacted));
        }
        if index > self.last_index() {
            return Ok(DUMMY_TERM);
        }
        match self.unstable.maybe_term(index) {
            Some(term) => Ok(term),
            _ => self.store.term(index).map_err(|err| {
                match err {
                    Error::Store(StorageError::Compacted)
                    | Error::Store(StorageError::Unavailable) => {}
                    _ => panic!("unexpected error: {:?}", err),
                }
                err
            }),
        }
    }

    /// Grab first entry's index from unstable (if exists) or storage
    pub fn first_index(&self) -> u64 {
        match self.unstable.maybe_first_index() {
            Some(index) => index,
            None => self
                .store
                .first_index()
                .unwrap_or_else(|e| panic!("first index of storage is unavailable: {:?}", e)),
        }
    }

    /// Grab last entry's index from unstable (if exists) or storage
    pub fn last_index(&self) -> u64 {
        match self.unstable.maybe_last_index() {
            Some(index) => index,
            None => self
                .store
                .last_index()
                .unwrap_or_else(|e| panic!("last index of storage is unavailable: {:?}", e)),
        }
    }

    /// The snapshot a lagging follower should receive, covering at least `index`.
    pub fn snapshot(&self, index: u64) -> Result<Snapshot> {
        if let Some(snapshot) = self.unstable.snapshot.as_ref() {
            if index <= snapshot.get_metadata().index {
                return Ok(snapshot.clone());
            }
        }
        self.store.snapshot(index)
    }
}

/// Stable trait for raft log and unstable, which make unstable store (buffer, snapshot etc...) to stable.
pub trait Stable {
    fn stable_snapshot(&mut self, expected_index: u64);

    fn stable_entries(&mut self, expected_index: u64, expected_term: u64);
}

impl<S> Stable for RaftLog<S>
where
    S: Storage,
{
    fn stable_snapshot(&mut self, expected_index: u64) {
        self.unstable.stable_snapshot(expected_index);
    }

    fn stable_entries(&mut self, expected_index: u64, expected_term: u64) {
        self.unstable.stable_entries(expected_index, expected_term);
    }
}

impl<S> Display for RaftLog<S>
where
    S: Storage,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "quorum_committed={}, persisted={}, applied={}, unstable.offset={}, unstable.buffer.len()={}",
            self.quorum_committed,
            self.persisted,
            self.applied,
            self.unstable.offset,
            self.unstable.buffer.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{RaftLog, Stable};
    use crate::errors::{Error, StorageError};
    use crate::protos::raft_log_proto::{ClusterConfig, Entry, EntryType, HardState, Snapshot};
    use crate::storage::{MemStorage, Storage};
    use common::logger::discard;

    fn entries(terms: &[(u64, u64)]) -> Vec<Entry> {
        terms
            .iter()
            .map(|(index, term)| Entry::new(EntryType::EntryNormal, *term, *index, vec![]))
            .collect()
    }

    fn new_log(stored: &[(u64, u64)]) -> RaftLog<MemStorage> {
        let store = MemStorage::new_with_config(ClusterConfig::with_voters(&[1]));
        store.append(&entries(stored)).unwrap();
        RaftLog::new(store, discard()).unwrap()
    }

    #[test]
    fn test_maybe_append_truncates_conflicts() {
        let mut log = new_log(&[(1, 1), (2, 1), (3, 2), (4, 2)]);
        // previous entry mismatch.
        assert_eq!(log.maybe_append(4, 3, 4, &[]), None);
        assert_eq!(log.maybe_append(5, 2, 4, &[]), None);

        let appended = log.maybe_append(2, 1, 3, &entries(&[(3, 3), (4, 3), (5, 3)]));
        assert_eq!(appended, Some((3, 5)));
        assert_eq!(log.last_index(), 5);
        assert_eq!(log.term(3).unwrap(), 3);
        assert_eq!(log.quorum_committed, 3);
        // persisted can't cover the overwritten entries any more.
        assert_eq!(log.get_persisted(), 2);

        // a duplicate is a no-op.
        assert_eq!(log.maybe_append(2, 1, 3, &entries(&[(3, 3)])), Some((0, 3)));
        assert_eq!(log.last_index(), 5);
    }

    #[test]
    fn test_find_conflict_by_term() {
        let log = new_log(&[(1, 1), (2, 1), (3, 2), (4, 4), (5, 4), (6, 5)]);
        assert_eq!(log.find_conflict_by_term(6, 3), (3, Some(2)));
        assert_eq!(log.find_conflict_by_term(6, 5), (6, Some(5)));
        assert_eq!(log.find_conflict_by_term(5, 1), (2, Some(1)));
        assert_eq!(log.find_conflict_by_term(10, 1), (10, None));
    }

    #[test]
    fn test_is_up_to_date() {
        let log = new_log(&[(1, 1), (2, 2), (3, 2)]);
        assert!(log.is_up_to_date(3, 2));
        assert!(log.is_up_to_date(1, 3));
        assert!(!log.is_up_to_date(2, 2));
        assert!(!log.is_up_to_date(9, 1));
    }

    #[test]
    fn test_committed_entries_need_persistence() {
        let mut log = new_log(&[(1, 1)]);
        log.append(&entries(&[(2, 1), (3, 1)]));
        log.commit_to(3);
        // only the stored entry can be applied.
        assert_eq!(log.entries_stable().map(|e| e.len()), Some(1));

        let unstable = log.unstable_entries().to_vec();
        log.store.append(&unstable).unwrap();
        log.stable_entries(3, 1);
        assert!(log.maybe_persist(3, 1));
        assert_eq!(log.entries_stable().map(|e| e.len()), Some(3));
        log.update_applied_index(3);
        assert!(log.entries_stable().is_none());
    }

    #[test]
    fn test_compacted_access() {
        let store = MemStorage::new_with_config(ClusterConfig::with_voters(&[1]));
        store.append(&entries(&[(1, 1), (2, 1), (3, 2), (4, 2)])).unwrap();
        store.set_hard_state(HardState::new(2, 1, 3)).unwrap();
        store.create_snapshot(3, vec![]).unwrap();
        store.compact(4).unwrap();

        let log = RaftLog::new(store, discard()).unwrap();
        assert_eq!(log.first_index(), 4);
        assert_eq!(log.term(3).unwrap(), 2);
        assert_eq!(log.term(2), Err(Error::Store(StorageError::Compacted)));
        assert_eq!(log.entries(2, 5, None), Err(Error::Store(StorageError::Compacted)));
        assert_eq!(log.snapshot(3).unwrap().get_metadata().index, 3);
    }

    #[test]
    fn test_restore() {
        let mut log = new_log(&[(1, 1), (2, 1)]);
        log.restore(Snapshot::new(10, 4, None, vec![]));
        assert_eq!(log.quorum_committed, 10);
        assert_eq!(log.first_index(), 11);
        assert_eq!(log.last_index(), 10);
        assert_eq!(log.last_term(), 4);
        assert!(log.unstable_snapshot().is_some());
    }
}
