use protos::codec::CodecError;
use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: std::io::Error) {
            from()
            source(err)
        }
        Store(err: StorageError) {
            from()
            source(err)
        }
        Codec(err: CodecError) {
            from()
            source(err)
        }
        Other(err: Box<dyn std::error::Error + Sync + Send>) {
            from()
            source(&**err)
            display("{:?}", err)
        }
        NotLeader { leader_hint: Option<u64> } {
            display("not leader, the leader may be {:?}", leader_hint)
        }
        ConfChange(message: String) {
            display("{}", message)
        }
        ConfigInvalid(reason: String) {
            display("invalid raft config: {}", reason)
        }
        StepPeerNotFound {
            display("the peer attempt to step was not found")
        }
    }
}

quick_error! {
    /// An error with the storage.
    #[derive(Debug)]
    pub enum StorageError {
        /// The storage was compacted and not accessible
        Compacted {
            display("log compacted")
        }
        /// The log is not available.
        Unavailable {
            display("log unavailable")
        }
        /// The snapshot is out of date.
        SnapshotOutOfDate {
            display("snapshot out of date")
        }
        /// The snapshot is being created.
        SnapshotTemporarilyUnavailable {
            display("snapshot is temporarily unavailable")
        }
        /// Persisted state can not be trusted, the node must not start on it.
        Corrupted(reason: String) {
            display("storage corrupted: {}", reason)
        }
        /// A record too long for its u32 length prefix.
        RecordTooLarge(len: usize) {
            display("record of {} bytes can't be framed", len)
        }
        /// Some other error occurred.
        Other(err: Box<dyn std::error::Error + Sync + Send>) {
            from()
            source(&**err)
            display("error {:?}", err)
        }
    }
}

impl StorageError {
    pub fn corrupted<R: ToString>(reason: R) -> Self {
        StorageError::Corrupted(reason.to_string())
    }
}

impl PartialEq for Error {
    #[cfg_attr(feature = "cargo-clippy", allow(clippy::match_same_arms))]
    fn eq(&self, other: &Error) -> bool {
        match (self, other) {
            (Error::Io(ref e1), Error::Io(ref e2)) => e1.kind() == e2.kind(),
            (Error::Store(ref e1), Error::Store(ref e2)) => e1 == e2,
            (Error::Codec(_), Error::Codec(_)) => true,
            (Error::NotLeader { leader_hint: l1 }, Error::NotLeader { leader_hint: l2 }) => l1 == l2,
            (Error::ConfChange(e1), Error::ConfChange(e2)) => e1 == e2,
            (Error::ConfigInvalid(e1), Error::ConfigInvalid(e2)) => e1 == e2,
            (Error::StepPeerNotFound, Error::StepPeerNotFound) => true,
            _ => false,
        }
    }
}

impl PartialEq for StorageError {
    #[cfg_attr(feature = "cargo-clippy", allow(clippy::match_same_arms))]
    fn eq(&self, other: &StorageError) -> bool {
        match (self, other) {
            (StorageError::Compacted, StorageError::Compacted) => true,
            (StorageError::Unavailable, StorageError::Unavailable) => true,
            (StorageError::SnapshotOutOfDate, StorageError::SnapshotOutOfDate) => true,
            (
                StorageError::SnapshotTemporarilyUnavailable,
                StorageError::SnapshotTemporarilyUnavailable,
            ) => true,
            (StorageError::Corrupted(_), StorageError::Corrupted(_)) => true,
            (StorageError::RecordTooLarge(l1), StorageError::RecordTooLarge(l2)) => l1 == l2,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
