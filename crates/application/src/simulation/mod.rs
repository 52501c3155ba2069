//! A deterministic in-memory cluster of real peers. Every frame goes
//! through the codec, the network in between may cut links, drop,
//! duplicate, reorder or tamper with frames. The safety properties of raft
//! are checked after every round of delivery.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::rc::Rc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use common::logger::discard;
use common::protocol::proposal::Proposed;

use crate::protos::prelude::*;
use crate::storage::{MemStorage, Storage};
use crate::{Peer, PeerConfig, StateMachine, Transport};

mod tests;

/// Remembers every payload applied, by index.
#[derive(Debug, Default)]
pub struct Recorder {
    applied: BTreeMap<u64, Vec<u8>>,
    last_index: u64,
}

impl Recorder {
    pub fn applied(&self) -> &BTreeMap<u64, Vec<u8>> {
        &self.applied
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.applied.values().cloned().collect()
    }
}

impl StateMachine for Recorder {
    fn apply(&mut self, index: u64, payload: &[u8]) -> io::Result<()> {
        assert!(index > self.last_index, "applied {} after {}", index, self.last_index);
        self.last_index = index;
        self.applied.insert(index, payload.to_vec());
        Ok(())
    }

    fn restore(&mut self, data: &[u8]) -> io::Result<()> {
        let mut reader = data;
        let count = reader.read_u64::<BigEndian>()?;
        let mut applied = BTreeMap::new();
        for _ in 0..count {
            let index = reader.read_u64::<BigEndian>()?;
            let len = reader.read_u32::<BigEndian>()? as usize;
            let mut payload = vec![0; len];
            reader.read_exact(&mut payload)?;
            applied.insert(index, payload);
        }
        if !reader.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "trailing snapshot data"));
        }
        self.last_index = applied.keys().next_back().copied().unwrap_or(0);
        self.applied = applied;
        Ok(())
    }

    fn snapshot(&self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        data.write_u64::<BigEndian>(self.applied.len() as u64)?;
        for (index, payload) in self.applied.iter() {
            data.write_u64::<BigEndian>(*index)?;
            data.write_u32::<BigEndian>(payload.len() as u32)?;
            data.write_all(payload)?;
        }
        Ok(data)
    }
}

#[derive(Debug, Clone)]
pub struct Packet {
    pub from: u64,
    pub to: u64,
    pub frame: Vec<u8>,
}

/// Puts everything a peer sends onto the shared queue of the cluster.
pub struct Wire {
    from: u64,
    queue: Rc<RefCell<VecDeque<Packet>>>,
    addresses: RefCell<HashMap<u64, String>>,
}

impl Wire {
    pub fn address_of(&self, id: u64) -> Option<String> {
        self.addresses.borrow().get(&id).cloned()
    }
}

impl Transport for Wire {
    fn send(&self, to: u64, frame: Vec<u8>) {
        self.queue.borrow_mut().push_back(Packet {
            from: self.from,
            to,
            frame,
        });
    }

    fn update_address(&self, id: u64, address: &str) {
        self.addresses.borrow_mut().insert(id, address.to_owned());
    }
}

/// A frame handed to a peer, with what it decoded to.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub from: u64,
    pub to: u64,
    pub frame: Vec<u8>,
    pub envelope: Envelope,
}

pub type SimPeer = Peer<MemStorage, Recorder, Wire>;

type Tamper = Box<dyn FnMut(u64, u64, &mut Envelope) -> bool>;

/// Rounds of delivery before the network is considered to never settle.
const MAX_ROUNDS: usize = 100_000;

pub struct Cluster {
    pub peers: BTreeMap<u64, SimPeer>,
    stores: BTreeMap<u64, MemStorage>,
    configs: BTreeMap<u64, PeerConfig>,
    queue: Rc<RefCell<VecDeque<Packet>>>,
    pub rng: StdRng,
    /// Directed links losing everything.
    cut: HashSet<(u64, u64)>,
    pub drop_rate: f64,
    pub duplicate_rate: f64,
    pub reorder: bool,
    /// Every frame handed to a peer, in order.
    pub delivered: Vec<Delivered>,
    tamper: Option<Tamper>,
    leaders: BTreeMap<u64, u64>,
    leader_logs: BTreeMap<u64, Vec<(u64, u64)>>,
}

pub fn peer_config(id: u64, seed: u64) -> PeerConfig {
    let mut conf = PeerConfig::new(id);
    conf.compact_log_threshold = 0;
    conf.snapshot_chunk_size = 64;
    conf.election_seed = Some(seed.wrapping_mul(7919).wrapping_add(id));
    conf
}

impl Cluster {
    pub fn new(ids: &[u64], seed: u64) -> Self {
        Self::with_configs(ids.iter().map(|id| peer_config(*id, seed)).collect(), seed)
    }

    pub fn with_configs(configs: Vec<PeerConfig>, seed: u64) -> Self {
        let voters: Vec<u64> = configs.iter().map(|conf| conf.id).collect();
        let mut cluster = Cluster {
            peers: BTreeMap::new(),
            stores: BTreeMap::new(),
            configs: BTreeMap::new(),
            queue: Rc::new(RefCell::new(VecDeque::new())),
            rng: StdRng::seed_from_u64(seed),
            cut: HashSet::new(),
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            reorder: false,
            delivered: Vec::new(),
            tamper: None,
            leaders: BTreeMap::new(),
            leader_logs: BTreeMap::new(),
        };
        for conf in configs {
            let id = conf.id;
            let store = MemStorage::new_with_config(ClusterConfig::with_voters(&voters));
            cluster.stores.insert(id, store);
            cluster.configs.insert(id, conf);
            cluster.start(id);
        }
        cluster
    }

    /// Add a peer that isn't part of any membership yet, it waits for the
    /// leader to contact it.
    pub fn add_blank(&mut self, id: u64, seed: u64) {
        self.stores.insert(id, MemStorage::new());
        self.configs.insert(id, peer_config(id, seed));
        self.start(id);
    }

    fn start(&mut self, id: u64) {
        let wire = Wire {
            from: id,
            queue: self.queue.clone(),
            addresses: RefCell::new(HashMap::new()),
        };
        let store = self.stores[&id].clone();
        let peer = Peer::new(store, Recorder::default(), wire, &self.configs[&id], &discard())
            .unwrap_or_else(|err| panic!("failed to start peer {}: {}", id, err));
        self.peers.insert(id, peer);
    }

    pub fn peer(&self, id: u64) -> &SimPeer {
        &self.peers[&id]
    }

    pub fn peer_mut(&mut self, id: u64) -> &mut SimPeer {
        self.peers.get_mut(&id).expect("peer is down")
    }

    pub fn store(&self, id: u64) -> &MemStorage {
        &self.stores[&id]
    }

    /// The peer stops, whatever it persisted stays.
    pub fn crash(&mut self, id: u64) {
        self.peers.remove(&id);
    }

    pub fn restart(&mut self, id: u64) {
        self.crash(id);
        self.start(id);
    }

    pub fn isolate(&mut self, id: u64) {
        for other in self.stores.keys().copied().filter(|other| *other != id) {
            self.cut.insert((id, other));
            self.cut.insert((other, id));
        }
    }

    /// Only peers within the same group can talk.
    pub fn partition(&mut self, groups: &[Vec<u64>]) {
        self.heal();
        for (i, group) in groups.iter().enumerate() {
            for (j, other) in groups.iter().enumerate() {
                if i == j {
                    continue;
                }
                for from in group {
                    for to in other {
                        self.cut.insert((*from, *to));
                    }
                }
            }
        }
    }

    pub fn cut_link(&mut self, from: u64, to: u64) {
        self.cut.insert((from, to));
    }

    pub fn heal(&mut self) {
        self.cut.clear();
    }

    /// Called with (from, to, envelope) for every frame before it's
    /// delivered, returning true when the envelope was changed.
    pub fn set_tamper<F>(&mut self, tamper: F)
    where
        F: FnMut(u64, u64, &mut Envelope) -> bool + 'static,
    {
        self.tamper = Some(Box::new(tamper));
    }

    /// Frames waiting for delivery.
    pub fn take_packets(&mut self) -> Vec<Packet> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn tick(&mut self) {
        for peer in self.peers.values_mut() {
            peer.tick().unwrap();
        }
        self.deliver();
    }

    /// Tick until `done` holds, false if it didn't within `max_ticks`.
    pub fn run_until<F: FnMut(&Cluster) -> bool>(&mut self, max_ticks: usize, mut done: F) -> bool {
        for _ in 0..max_ticks {
            if done(self) {
                return true;
            }
            self.tick();
        }
        done(self)
    }

    /// Deliver until the network is quiet, returns how many frames arrived.
    pub fn deliver(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_ROUNDS {
            let mut batch = self.take_packets();
            if batch.is_empty() {
                return delivered;
            }
            if self.reorder {
                batch.shuffle(&mut self.rng);
            }
            for packet in batch {
                if self.deliver_one(packet) {
                    delivered += 1;
                }
            }
            self.check_safety();
        }
        panic!("network never settled");
    }

    pub fn deliver_one(&mut self, packet: Packet) -> bool {
        let Packet { from, to, mut frame } = packet;
        if self.cut.contains(&(from, to)) || !self.peers.contains_key(&to) {
            return false;
        }
        if self.drop_rate > 0.0 && self.rng.gen_bool(self.drop_rate) {
            return false;
        }
        let (tag, mut envelope) = decode_frame(&frame).expect("undecodable frame");
        assert_eq!(envelope.from, from, "frame sent by {} claims {}", from, envelope.from);
        if let Some(tamper) = self.tamper.as_mut() {
            if tamper(from, to, &mut envelope) {
                let version = RaftVersion::from_u8(tag).expect("unknown version tag");
                frame = encode_frame(version, &envelope).expect("tampered frame not encodable");
            }
        }
        if self.duplicate_rate > 0.0 && self.rng.gen_bool(self.duplicate_rate) {
            self.queue.borrow_mut().push_back(Packet {
                from,
                to,
                frame: frame.clone(),
            });
        }
        self.peers
            .get_mut(&to)
            .expect("peer is down")
            .receive(&frame)
            .unwrap_or_else(|err| panic!("{} failed to receive from {}: {}", to, from, err));
        self.delivered.push(Delivered {
            from,
            to,
            frame,
            envelope,
        });
        true
    }

    /// The leader of the highest term, if any.
    pub fn leader(&self) -> Option<u64> {
        self.peers
            .values()
            .filter(|peer| peer.is_leader())
            .max_by_key(|peer| peer.term())
            .map(|peer| peer.id())
    }

    pub fn wait_leader(&mut self, max_ticks: usize) -> u64 {
        assert!(self.run_until(max_ticks, |cluster| cluster.leader().is_some()), "no leader elected");
        self.leader().unwrap()
    }

    /// Propose through the current leader and deliver.
    pub fn propose(&mut self, payload: &[u8]) -> Option<Proposed> {
        let leader = self.leader()?;
        let proposed = self.peer_mut(leader).propose(payload.to_vec()).ok();
        self.deliver();
        proposed
    }

    /// Every entry persisted by `id` as (index, term).
    pub fn log_of(&self, id: u64) -> Vec<(u64, u64)> {
        self.stores[&id]
            .rl()
            .get_entries()
            .iter()
            .map(|entry| (entry.index, entry.term))
            .collect()
    }

    /// Last index of `id`, the snapshot index once everything is compacted.
    pub fn last_index(&self, id: u64) -> u64 {
        Storage::last_index(&self.stores[&id]).unwrap()
    }

    /// Everything any peer appended to its state machine agrees with `id`.
    pub fn applied(&self, id: u64) -> Vec<Vec<u8>> {
        self.peers[&id].machine().payloads()
    }

    pub fn check_safety(&mut self) {
        self.check_election_safety();
        self.check_log_matching();
        self.check_state_machine_safety();
        self.check_leader_completeness();
    }

    /// At most one leader per term, and a leader never rewrites its log.
    fn check_election_safety(&mut self) {
        for peer in self.peers.values().filter(|peer| peer.is_leader()) {
            let (id, term) = (peer.id(), peer.term());
            let leader = *self.leaders.entry(term).or_insert(id);
            assert_eq!(leader, id, "{} and {} both lead term {}", leader, id, term);

            let log = self.log_of(id);
            if let Some(before) = self.leader_logs.get(&term) {
                let first = log.first().map_or(u64::MAX, |(index, _)| *index);
                let now: HashSet<&(u64, u64)> = log.iter().collect();
                for entry in before.iter().filter(|(index, _)| *index >= first) {
                    assert!(now.contains(entry), "leader {} of term {} lost {:?}", id, term, entry);
                }
                let last_before = before.last().map_or(0, |(index, _)| *index);
                assert!(self.last_index(id) >= last_before, "leader {} log shrank", id);
            }
            self.leader_logs.insert(term, log);
        }
    }

    /// Two logs holding an entry with the same index and term are
    /// identical up to it.
    fn check_log_matching(&self) {
        let logs: Vec<(u64, BTreeMap<u64, Entry>)> = self
            .stores
            .iter()
            .map(|(id, store)| {
                let entries = store.rl().get_entries().iter().map(|e| (e.index, e.clone())).collect();
                (*id, entries)
            })
            .collect();
        for (i, (a, left)) in logs.iter().enumerate() {
            for (b, right) in logs.iter().skip(i + 1) {
                let matched = left
                    .iter()
                    .rev()
                    .find(|(index, entry)| right.get(index).map_or(false, |other| other.term == entry.term))
                    .map(|(index, _)| *index);
                let matched = match matched {
                    Some(index) => index,
                    None => continue,
                };
                for (index, entry) in left.range(..=matched) {
                    if let Some(other) = right.get(index) {
                        assert_eq!(entry, other, "logs of {} and {} differ at {}", a, b, index);
                    }
                }
            }
        }
    }

    /// No two state machines applied different payloads at one index.
    fn check_state_machine_safety(&self) {
        let mut seen: BTreeMap<u64, (u64, &Vec<u8>)> = BTreeMap::new();
        for peer in self.peers.values() {
            for (index, payload) in peer.machine().applied() {
                let (first, expected) = *seen.entry(*index).or_insert((peer.id(), payload));
                assert_eq!(expected, payload, "{} and {} applied different payloads at {}", first, peer.id(), index);
            }
        }
    }

    /// The leader of the newest term holds every applied entry.
    fn check_leader_completeness(&self) {
        let newest_term = self.peers.values().map(|peer| peer.term()).max().unwrap_or(0);
        let leader = match self
            .peers
            .values()
            .find(|peer| peer.is_leader() && peer.term() == newest_term)
        {
            Some(leader) => leader,
            None => return,
        };
        let leader_log: BTreeMap<u64, Entry> = self.stores[&leader.id()]
            .rl()
            .get_entries()
            .iter()
            .map(|entry| (entry.index, entry.clone()))
            .collect();
        let leader_last = self.last_index(leader.id());
        for peer in self.peers.values() {
            for (index, payload) in peer.machine().applied() {
                assert!(
                    *index <= leader_last,
                    "leader {} misses {} applied by {}",
                    leader.id(),
                    index,
                    peer.id()
                );
                if let Some(entry) = leader_log.get(index) {
                    assert_eq!(&entry.data, payload, "leader {} disagrees at {}", leader.id(), index);
                }
            }
        }
    }
}
