use std::io::Result;

/// The application the committed log is replayed into.
///
/// Entries are handed out once each, in index order, while the peer runs.
/// After a restart everything after the last snapshot is handed out again,
/// so `apply` must tolerate an index it has seen before.
pub trait StateMachine {
    /// Apply the payload committed at `index`.
    fn apply(&mut self, index: u64, payload: &[u8]) -> Result<()>;

    /// Replace the whole state with a snapshot taken by some peer's
    /// [snapshot](StateMachine::snapshot).
    fn restore(&mut self, data: &[u8]) -> Result<()>;

    /// Serialize the state covering every entry applied so far.
    fn snapshot(&self) -> Result<Vec<u8>>;
}
