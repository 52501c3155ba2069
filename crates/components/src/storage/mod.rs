pub mod file_storage;
mod record;

pub use common::storage::{MemStorage, RaftState, Storage};
pub use file_storage::FileStorage;
