#[cfg(feature = "storage")]
pub mod storage;

pub use common::{self, protos};
