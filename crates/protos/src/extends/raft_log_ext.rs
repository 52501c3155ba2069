use std::fmt::Display;

use crate::raft_log_proto::{Entry, EntryType, HardState};

impl Entry {
    pub fn new(entry_type: EntryType, term: u64, index: u64, data: Vec<u8>) -> Self {
        let mut entry = Entry {
            term,
            index,
            data,
            ..Default::default()
        };
        entry.set_entry_type(entry_type);
        entry
    }

    /// An unindexed normal entry carrying `data`, term and index
    /// are assigned by the leader when appending.
    pub fn proposal(data: Vec<u8>) -> Self {
        Self::new(EntryType::EntryNormal, 0, 0, data)
    }

    #[inline]
    pub fn is_conf_change(&self) -> bool {
        self.entry_type() == EntryType::EntryConfChange
    }

    #[inline]
    pub fn is_noop(&self) -> bool {
        self.entry_type() == EntryType::EntryNoop
    }
}

impl HardState {
    pub fn new(term: u64, vote: u64, commit: u64) -> Self {
        HardState { term, vote, commit }
    }
}

impl Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let basic = format!(
            "[index: {:?}, term: {:?}, type: {:?}",
            self.index,
            self.term,
            self.entry_type()
        );
        if self.data.len() > 1024 {
            return write!(f, "{}, data: {} bytes]", basic, self.data.len());
        }
        match std::str::from_utf8(&self.data) {
            Ok(content) if !content.is_empty() => write!(f, "{}, data: {}]", basic, content),
            _ => write!(f, "{}]", basic),
        }
    }
}
