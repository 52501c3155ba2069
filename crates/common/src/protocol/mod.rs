pub mod proposal;

pub type NodeID = u64;
