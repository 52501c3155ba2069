use std::cell::Cell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use rand::{seq::SliceRandom, Rng};

use common::logger::discard;
use components::storage::FileStorage;

use super::*;
use crate::{ConsensusError, RaftRole};

fn message_of(packet: &Packet) -> RaftMessage {
    decode_frame(&packet.frame).unwrap().1.message
}

fn all_applied(cluster: &Cluster, count: usize) -> bool {
    cluster.peers.values().all(|peer| peer.machine().applied().len() == count)
}

fn followers(cluster: &Cluster, leader: u64) -> Vec<u64> {
    cluster.peers.keys().copied().filter(|id| *id != leader).collect()
}

#[test]
fn test_elect_and_replicate() {
    let mut cluster = Cluster::new(&[1, 2, 3], 1);
    let leader = cluster.wait_leader(100);
    for payload in [b"a", b"b", b"c"] {
        assert!(cluster.propose(payload).is_some());
    }
    assert!(cluster.run_until(50, |c| all_applied(c, 3)));
    for id in [1, 2, 3] {
        assert_eq!(cluster.applied(id), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(cluster.peer(id).leader_id(), leader);
    }
    // noop of the leader, then the three proposals.
    assert_eq!(cluster.peer(leader).applied_index(), 4);
}

#[test]
fn test_proposal_to_follower_is_refused() {
    let mut cluster = Cluster::new(&[1, 2, 3], 2);
    let leader = cluster.wait_leader(100);
    let follower = followers(&cluster, leader)[0];
    match cluster.peer_mut(follower).propose(b"x".to_vec()) {
        Err(ConsensusError::NotLeader { leader_hint }) => assert_eq!(leader_hint, Some(leader)),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_receive_checks_frames() {
    let mut cluster = Cluster::new(&[1, 2, 3], 3);
    assert!(matches!(cluster.peer_mut(1).receive(&[]), Err(ConsensusError::Codec(_))));
    assert!(matches!(cluster.peer_mut(1).receive(&[1, 2, 3]), Err(ConsensusError::Codec(_))));

    let request = RequestVote {
        term: 5,
        candidate_id: 2,
        last_log_index: 0,
        last_log_term: 0,
    };
    let misrouted = Envelope::new(2, 3, RaftMessage::RequestVote(request));
    let frame = encode_frame(RaftVersion::CURRENT, &misrouted).unwrap();
    cluster.peer_mut(1).receive(&frame).unwrap();
    assert_eq!(cluster.peer(1).term(), 0);
    assert!(cluster.take_packets().is_empty());
}

/// A follower that missed some entries gets exactly the missing ones once
/// it's back, starting right after what it already holds.
#[test]
fn test_rejoined_follower_catches_up_from_its_match() {
    let mut cluster = Cluster::new(&[1, 2, 3], 7);
    let leader = cluster.wait_leader(100);
    let follower = *followers(&cluster, leader).last().unwrap();
    for payload in [b"1", b"2"] {
        cluster.propose(payload);
    }
    assert!(cluster.run_until(50, |c| all_applied(c, 2)));

    cluster.isolate(follower);
    for payload in [b"3", b"4", b"5"] {
        cluster.propose(payload);
    }
    let held = cluster.last_index(follower);
    assert_eq!(held, 3);
    assert_eq!(cluster.last_index(leader), 6);

    let mark = cluster.delivered.len();
    cluster.heal();
    assert!(cluster.run_until(100, |c| all_applied(c, 5)));
    for delivered in cluster.delivered[mark..].iter().filter(|d| d.to == follower) {
        if let RaftMessage::AppendEntries(request) = &delivered.envelope.message {
            for entry in request.entries.iter() {
                assert!(entry.index > held, "resent {} to {}", entry.index, follower);
            }
        }
    }
    let leader = cluster.leader().unwrap();
    assert_eq!(cluster.log_of(follower), cluster.log_of(leader));
}

/// Entries a deposed leader appended alone are cut off and replaced by the
/// log of the new leader.
#[test]
fn test_deposed_leader_suffix_is_replaced() {
    let mut cluster = Cluster::new(&[1, 2, 3], 11);
    let old = cluster.wait_leader(100);
    cluster.propose(b"committed");
    assert!(cluster.run_until(50, |c| all_applied(c, 1)));

    cluster.isolate(old);
    for payload in [b"lost-1", b"lost-2"] {
        cluster.peer_mut(old).propose(payload.to_vec()).unwrap();
    }
    cluster.deliver();
    let lost: Vec<(u64, u64)> = cluster.log_of(old).into_iter().rev().take(2).collect();
    assert!(cluster.run_until(300, |c| c.leader().map_or(false, |leader| leader != old)));
    assert!(cluster.propose(b"kept").is_some());

    cluster.heal();
    let expected = vec![b"committed".to_vec(), b"kept".to_vec()];
    assert!(cluster.run_until(300, |c| all_applied(c, 2)));
    assert_eq!(cluster.applied(old), expected);

    let leader = cluster.leader().unwrap();
    let log = cluster.log_of(old);
    for entry in lost.iter() {
        assert!(!log.contains(entry), "{:?} survived in {:?}", entry, log);
    }
    assert_eq!(log, cluster.log_of(leader));
}

/// A follower far behind the compacted log of the leader asks for a
/// snapshot, a chunk failing its hash check restarts the transfer.
#[test]
fn test_far_behind_follower_installs_snapshot() {
    let mut cluster = Cluster::new(&[1, 2, 3], 21);
    let leader = cluster.wait_leader(100);
    let lagging = *followers(&cluster, leader).last().unwrap();
    for i in 0..9 {
        cluster.propose(format!("entry-{}", i).as_bytes());
    }
    assert!(cluster.run_until(50, |c| all_applied(c, 9)));
    assert_eq!(cluster.last_index(lagging), 10);

    cluster.crash(lagging);
    let mut i = 9;
    while cluster.last_index(leader) < 101 {
        cluster.propose(format!("entry-{}", i).as_bytes());
        i += 1;
    }
    assert!(cluster.run_until(50, |c| c.peers.values().all(|peer| peer.applied_index() >= 100)));
    for id in followers(&cluster, lagging) {
        assert!(cluster.peer_mut(id).compact().unwrap().unwrap() >= 100);
    }

    // a fresh leader knows nothing about the lagging follower.
    cluster.restart(leader);
    cluster.wait_leader(300);

    let tampered = Rc::new(Cell::new(false));
    let once = tampered.clone();
    cluster.set_tamper(move |_, to, envelope| {
        if to != lagging || once.get() {
            return false;
        }
        match &mut envelope.message {
            RaftMessage::InstallSnapshot(chunk) if chunk.chunk_index == 3 => {
                chunk.last_chunk_hash = chunk.last_chunk_hash.map(|hash| hash ^ 0xdead);
                once.set(true);
                true
            }
            _ => false,
        }
    });
    let mark = cluster.delivered.len();
    cluster.restart(lagging);
    let total = i;
    assert!(cluster.run_until(500, |c| all_applied(c, total)));
    assert!(tampered.get());
    assert!(cluster.peer(lagging).snapshot_index() >= 100);
    let leader = cluster.leader().unwrap();
    assert_eq!(cluster.applied(lagging), cluster.applied(leader));

    let traffic = &cluster.delivered[mark..];
    let first_chunk = traffic
        .iter()
        .position(|d| d.to == lagging && matches!(d.envelope.message, RaftMessage::InstallSnapshot(_)))
        .unwrap();
    let forced = traffic[..first_chunk].iter().any(|d| {
        d.from == lagging
            && matches!(&d.envelope.message, RaftMessage::AppendEntriesReply(reply) if reply.force_install_snapshot)
    });
    assert!(forced, "snapshot was not asked for");

    let chunks: Vec<u32> = traffic
        .iter()
        .filter(|d| d.to == lagging)
        .filter_map(|d| match &d.envelope.message {
            RaftMessage::InstallSnapshot(chunk) => Some(chunk.chunk_index),
            _ => None,
        })
        .collect();
    assert_eq!(&chunks[..3], &[1, 2, 3]);
    // restarted from the first chunk instead of resuming.
    assert_eq!(chunks[3], 1);
    let refused = traffic.iter().any(|d| {
        d.from == lagging
            && matches!(&d.envelope.message, RaftMessage::InstallSnapshotReply(reply) if !reply.success)
    });
    assert!(refused);
}

/// A candidate whose log ends in an older term is refused even with a
/// higher term.
#[test]
fn test_stale_candidate_is_denied() {
    let mut cluster = Cluster::new(&[1, 2, 3], 31);
    let first = cluster.wait_leader(100);
    cluster.propose(b"a");
    assert!(cluster.run_until(50, |c| all_applied(c, 1)));

    let stale = *followers(&cluster, first).last().unwrap();
    cluster.isolate(stale);
    // the others move on to a newer term.
    cluster.restart(first);
    assert!(cluster.run_until(300, |c| c.leader().map_or(false, |leader| c.peer(leader).term() > 1)));
    let newer = cluster.propose(b"b").unwrap();
    assert!(cluster.run_until(300, |c| {
        let others = c.peers.values().filter(|peer| peer.id() != stale).map(|peer| peer.term());
        c.peer(stale).term() > others.max().unwrap_or(0)
    }));

    let mark = cluster.delivered.len();
    cluster.heal();
    // it asks for votes the moment it's back.
    cluster.peer_mut(stale).campaign().unwrap();
    cluster.deliver();
    assert!(cluster.run_until(300, |c| all_applied(c, 2)));
    assert_ne!(cluster.leader(), Some(stale));

    let traffic = &cluster.delivered[mark..];
    let mut denied = 0;
    for (at, delivered) in traffic.iter().enumerate() {
        let request = match &delivered.envelope.message {
            RaftMessage::RequestVote(request) if delivered.from == stale => request,
            _ => continue,
        };
        if request.last_log_term >= newer.term {
            continue;
        }
        let voter = delivered.to;
        let reply = traffic[at..].iter().find_map(|d| match &d.envelope.message {
            RaftMessage::RequestVoteReply(reply) if d.from == voter && d.to == stale => Some(reply),
            _ => None,
        });
        if let Some(reply) = reply {
            assert!(!reply.vote_granted, "{} voted for a stale log", voter);
            assert!(reply.term >= request.term);
            denied += 1;
        }
    }
    assert!(denied > 0);
}

/// Two candidates split the vote, the randomized timeouts pick a leader
/// in a later term.
#[test]
fn test_split_vote_resolves_over_many_seeds() {
    let mut resolved_after = BTreeSet::new();
    for seed in 0..40 {
        let mut cluster = Cluster::new(&[1, 2, 3, 4], seed);
        cluster.partition(&[vec![1, 2], vec![3, 4]]);
        cluster.peer_mut(1).campaign().unwrap();
        cluster.peer_mut(3).campaign().unwrap();
        cluster.deliver();
        assert_eq!(cluster.leader(), None);
        for candidate in [1, 3] {
            assert_eq!(cluster.peer(candidate).role(), RaftRole::Candidate);
            assert_eq!(cluster.peer(candidate).term(), 1);
        }

        cluster.heal();
        let mut ticks = 0;
        while cluster.leader().is_none() {
            assert!(ticks < 400, "seed {} elected nobody", seed);
            cluster.tick();
            ticks += 1;
        }
        let leader = cluster.leader().unwrap();
        assert!(cluster.peer(leader).term() >= 2, "seed {}", seed);
        resolved_after.insert(ticks);
    }
    assert!(resolved_after.len() > 1, "elections are not randomized");
}

#[test]
fn test_safety_under_random_faults() {
    let ids = [1, 2, 3, 4, 5];
    for seed in 0..8 {
        let mut cluster = Cluster::new(&ids, seed);
        cluster.reorder = true;
        cluster.drop_rate = 0.1;
        cluster.duplicate_rate = 0.05;
        for step in 0..400 {
            match cluster.rng.gen_range(0..100) {
                0..=4 => {
                    let mut shuffled = ids.to_vec();
                    shuffled.shuffle(&mut cluster.rng);
                    let at = cluster.rng.gen_range(1..ids.len());
                    let (left, right) = shuffled.split_at(at);
                    cluster.partition(&[left.to_vec(), right.to_vec()]);
                }
                5..=9 => cluster.heal(),
                10..=11 => {
                    let id = ids[cluster.rng.gen_range(0..ids.len())];
                    cluster.restart(id);
                }
                12..=13 => {
                    let id = ids[cluster.rng.gen_range(0..ids.len())];
                    cluster.peer_mut(id).compact().unwrap();
                }
                14..=49 => {
                    cluster.propose(format!("{}-{}", seed, step).as_bytes());
                }
                _ => {}
            }
            cluster.tick();
        }

        cluster.heal();
        cluster.drop_rate = 0.0;
        cluster.duplicate_rate = 0.0;
        let settled = cluster.run_until(1000, |c| {
            let leader = match c.leader() {
                Some(leader) => leader,
                None => return false,
            };
            let last = c.last_index(leader);
            c.peers.values().all(|peer| peer.applied_index() == last)
        });
        assert!(settled, "seed {} never settled", seed);
        let reference = cluster.applied(1);
        for id in ids {
            assert_eq!(cluster.applied(id), reference, "seed {} peer {}", seed, id);
        }
    }
}

/// Re-delivering an append that was already taken changes nothing and is
/// answered the same way.
#[test]
fn test_duplicate_append_is_idempotent() {
    let mut cluster = Cluster::new(&[1, 2, 3], 5);
    cluster.peer_mut(1).campaign().unwrap();
    cluster.deliver();
    assert_eq!(cluster.leader(), Some(1));
    cluster.propose(b"a");
    assert!(cluster.run_until(20, |c| all_applied(c, 1)));

    cluster.peer_mut(1).propose(b"b".to_vec()).unwrap();
    let mut packets: VecDeque<Packet> = cluster.take_packets().into();
    let at = packets
        .iter()
        .position(|p| p.to == 2 && matches!(message_of(p), RaftMessage::AppendEntries(ref r) if !r.entries.is_empty()))
        .unwrap();
    let append = packets.remove(at).unwrap();
    assert!(cluster.deliver_one(append.clone()));
    let original: Vec<Packet> = cluster.take_packets();
    assert_eq!(original.len(), 1);
    assert!(matches!(message_of(&original[0]), RaftMessage::AppendEntriesReply(ref r) if r.success));
    for packet in packets.into_iter().chain(original.iter().cloned()) {
        cluster.deliver_one(packet);
    }
    cluster.deliver();
    assert!(cluster.run_until(20, |c| all_applied(c, 2)));

    let log = cluster.log_of(2);
    for _ in 0..2 {
        assert!(cluster.deliver_one(append.clone()));
        let replies = cluster.take_packets();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].frame, original[0].frame);
        assert_eq!(cluster.log_of(2), log);
    }
    assert_eq!(cluster.applied(2), vec![b"a".to_vec(), b"b".to_vec()]);
}

#[test]
fn test_mixed_versions_replicate() {
    let mut configs: Vec<PeerConfig> = (1..=3).map(|id| peer_config(id, 41)).collect();
    configs[1].raft_version = RaftVersion::Fluorine;
    configs[2].raft_version = RaftVersion::Helium;
    let mut cluster = Cluster::with_configs(configs, 41);
    cluster.peer_mut(1).campaign().unwrap();
    cluster.deliver();
    assert_eq!(cluster.leader(), Some(1));
    for payload in [b"x", b"y"] {
        cluster.propose(payload);
    }
    assert!(cluster.run_until(50, |c| all_applied(c, 2)));

    let versions = &cluster.peer(1).node().raft.peer_versions;
    assert_eq!(versions.version_for(2), RaftVersion::Fluorine);
    assert_eq!(versions.version_for(3), RaftVersion::Helium);
    assert_eq!(cluster.peer(3).node().raft.peer_versions.version_for(1), RaftVersion::Helium);

    let last = cluster.delivered.iter().rev().find(|d| d.from == 1 && d.to == 3).unwrap();
    assert_eq!(last.frame[0], RaftVersion::Helium.as_u8());

    // every frame survives a round trip at its own version and the one
    // below it.
    for delivered in cluster.delivered.iter() {
        let (tag, envelope) = decode_frame(&delivered.frame).unwrap();
        let version = RaftVersion::from_u8(tag).unwrap();
        assert_eq!(encode_frame(version, &envelope).unwrap(), delivered.frame);
        if let Some(lower) = version.previous() {
            let frame = encode_frame(lower, &envelope).unwrap();
            let (_, decoded) = decode_frame(&frame).unwrap();
            let mut expected = envelope.clone();
            codec::downgrade(&mut expected.message, lower);
            assert_eq!(decoded, expected);
            assert_eq!(encode_frame(lower, &decoded).unwrap(), frame);
        }
    }
}

#[test]
fn test_membership_changes() {
    let mut cluster = Cluster::new(&[1, 2, 3], 51);
    let leader = cluster.wait_leader(100);
    cluster.propose(b"before");
    assert!(cluster.run_until(50, |c| all_applied(c, 1)));

    // a non-voter catches up without counting for the quorum.
    cluster.add_blank(4, 51);
    let with_learner = ClusterConfig::new(vec![
        ServerInfo::voter(1),
        ServerInfo::voter(2),
        ServerInfo::voter(3),
        ServerInfo::non_voter(4),
    ]);
    cluster.peer_mut(leader).propose_conf_change(with_learner).unwrap();
    cluster.deliver();
    assert!(cluster.run_until(100, |c| c.applied(4) == vec![b"before".to_vec()]));
    assert_eq!(cluster.peer(4).role(), RaftRole::Follower);
    assert!(!cluster.peer(leader).node().raft.tracker.is_voter(4));

    let promoted = ClusterConfig::with_voters(&[1, 2, 3, 4]);
    cluster.peer_mut(leader).propose_conf_change(promoted.clone()).unwrap();
    // only one change may be pending at a time.
    assert!(matches!(
        cluster.peer_mut(leader).propose_conf_change(promoted.clone()),
        Err(ConsensusError::ConfChange(_))
    ));
    cluster.deliver();
    assert!(cluster.run_until(100, |c| c.peers.values().all(|peer| peer.node().raft.tracker.is_voter(4))));
    assert_eq!(cluster.store(4).initial_state().unwrap().cluster_config, promoted);

    let removed = *followers(&cluster, leader).iter().find(|id| **id != 4).unwrap();
    let remaining: Vec<u64> = [1, 2, 3, 4].into_iter().filter(|id| *id != removed).collect();
    let shrunk = ClusterConfig::with_voters(&remaining);
    cluster.peer_mut(leader).propose_conf_change(shrunk.clone()).unwrap();
    cluster.deliver();
    assert!(cluster.run_until(100, |c| c.peer(leader).node().raft.tracker.cluster_info().config() == &shrunk));
    cluster.crash(removed);

    cluster.propose(b"after");
    assert!(cluster.run_until(100, |c| all_applied(c, 2)));
    for id in remaining {
        assert_eq!(cluster.applied(id), vec![b"before".to_vec(), b"after".to_vec()]);
    }
}

#[test]
fn test_restart_replays_after_snapshot() {
    let mut cluster = Cluster::new(&[1, 2, 3], 61);
    let leader = cluster.wait_leader(100);
    for payload in [b"1", b"2", b"3"] {
        cluster.propose(payload);
    }
    assert!(cluster.run_until(50, |c| all_applied(c, 3)));
    let follower = followers(&cluster, leader)[0];
    assert_eq!(cluster.peer_mut(follower).compact().unwrap(), Some(4));
    assert_eq!(cluster.peer_mut(follower).compact().unwrap(), None);
    cluster.propose(b"4");
    assert!(cluster.run_until(50, |c| all_applied(c, 4)));

    cluster.restart(follower);
    let peer = cluster.peer(follower);
    assert_eq!(peer.snapshot_index(), 4);
    assert_eq!(peer.applied_index(), 5);
    assert_eq!(cluster.applied(follower), cluster.applied(leader));
}

#[test]
fn test_compact_by_threshold() {
    let configs = (1..=3)
        .map(|id| {
            let mut conf = peer_config(id, 71);
            conf.compact_log_threshold = 5;
            conf
        })
        .collect();
    let mut cluster = Cluster::with_configs(configs, 71);
    cluster.wait_leader(100);
    for i in 0..12 {
        cluster.propose(format!("{}", i).as_bytes());
    }
    assert!(cluster.run_until(50, |c| all_applied(c, 12)));
    for peer in cluster.peers.values() {
        assert!(peer.snapshot_index() >= 10, "{:?}", peer);
        assert!(Storage::first_index(peer.store()).unwrap() > 10);
    }
}

#[test]
fn test_file_backed_peer_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let logger = discard();
    let voters = ClusterConfig::with_voters(&[1]);
    let conf = peer_config(1, 81);
    let wire = || Wire {
        from: 1,
        queue: Rc::new(RefCell::new(VecDeque::new())),
        addresses: RefCell::new(HashMap::new()),
    };

    {
        let store = FileStorage::open(dir.path(), voters.clone(), &logger).unwrap();
        let mut peer = Peer::new(store, Recorder::default(), wire(), &conf, &logger).unwrap();
        peer.campaign().unwrap();
        assert!(peer.is_leader());
        for payload in [b"a", b"b", b"c"] {
            peer.propose(payload.to_vec()).unwrap();
        }
        assert_eq!(peer.compact().unwrap(), Some(4));
        for payload in [b"d", b"e"] {
            peer.propose(payload.to_vec()).unwrap();
        }
        assert_eq!(peer.machine().applied().len(), 5);
    }

    let store = FileStorage::open(dir.path(), voters, &logger).unwrap();
    let peer = Peer::new(store, Recorder::default(), wire(), &conf, &logger).unwrap();
    assert_eq!(peer.snapshot_index(), 4);
    assert_eq!(peer.term(), 1);
    assert_eq!(peer.applied_index(), 6);
    let payloads: Vec<Vec<u8>> = [b"a", b"b", b"c", b"d", b"e"].iter().map(|p| p.to_vec()).collect();
    assert_eq!(peer.machine().payloads(), payloads);
}

#[test]
fn test_restart_after_interrupted_snapshot_install() {
    let dir = tempfile::tempdir().unwrap();
    let logger = discard();
    let voters = ClusterConfig::with_voters(&[1, 2, 3]);
    let conf = peer_config(2, 83);
    let hard_state = {
        let store = FileStorage::open(dir.path(), voters.clone(), &logger).unwrap();
        store.set_hard_state(HardState::new(1, 1, 0)).unwrap();
        std::fs::read(dir.path().join("hard_state")).unwrap()
    };
    {
        let store = FileStorage::open(dir.path(), voters.clone(), &logger).unwrap();
        let empty_image = 0u64.to_be_bytes().to_vec();
        store.apply_snapshot(Snapshot::new(20, 2, Some(voters.clone()), empty_image)).unwrap();
    }
    // lost the hard state written after the snapshot file.
    std::fs::write(dir.path().join("hard_state"), hard_state).unwrap();

    let store = FileStorage::open(dir.path(), voters, &logger).unwrap();
    let wire = Wire {
        from: 2,
        queue: Rc::new(RefCell::new(VecDeque::new())),
        addresses: RefCell::new(HashMap::new()),
    };
    let peer = Peer::new(store, Recorder::default(), wire, &conf, &logger).unwrap();
    assert_eq!(peer.snapshot_index(), 20);
    assert_eq!(peer.term(), 2);
    assert_eq!(peer.applied_index(), 20);
    assert!(peer.machine().applied().is_empty());
}
