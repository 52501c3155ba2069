/// The way out of a peer. Frames are handed over already encoded for the
/// protocol version the receiver speaks, delivery is best effort: raft
/// copes with frames lost, duplicated or reordered.
pub trait Transport {
    fn send(&self, to: u64, frame: Vec<u8>);

    /// The address `id` can be reached at was learned from its traffic.
    #[allow(unused_variables)]
    fn update_address(&self, id: u64, address: &str) {
        // could be customized
    }
}
