pub mod errors;
pub mod logger;
pub mod protocol;
pub mod storage;

pub use protos;
