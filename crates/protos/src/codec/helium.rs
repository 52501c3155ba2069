//! The oldest layout: every field in a fixed order, integers big-endian,
//! byte strings and lists prefixed with a u32 length.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::{Codec, CodecError, CodecResult};
use crate::message::*;
use crate::raft_log_proto::{ClusterConfig, Entry, EntryType, ServerInfo};
use crate::version::RaftVersion;

pub struct HeliumCodec;

impl Codec for HeliumCodec {
    fn version(&self) -> RaftVersion {
        RaftVersion::Helium
    }

    fn encode(&self, envelope: &Envelope) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);
        buf.write_u8(envelope.message.kind() as u8)?;
        buf.write_u64::<BigEndian>(envelope.from)?;
        buf.write_u64::<BigEndian>(envelope.to)?;
        match &envelope.message {
            RaftMessage::RequestVote(m) => {
                buf.write_u64::<BigEndian>(m.term)?;
                buf.write_u64::<BigEndian>(m.candidate_id)?;
                buf.write_u64::<BigEndian>(m.last_log_index)?;
                buf.write_u64::<BigEndian>(m.last_log_term)?;
            }
            RaftMessage::RequestVoteReply(m) => {
                buf.write_u64::<BigEndian>(m.term)?;
                write_bool(&mut buf, m.vote_granted)?;
            }
            RaftMessage::AppendEntries(m) => {
                buf.write_u64::<BigEndian>(m.term)?;
                buf.write_u64::<BigEndian>(m.leader_id)?;
                buf.write_u64::<BigEndian>(m.prev_log_index)?;
                buf.write_u64::<BigEndian>(m.prev_log_term)?;
                write_len(&mut buf, m.entries.len())?;
                for entry in m.entries.iter() {
                    write_entry(&mut buf, entry)?;
                }
                buf.write_u64::<BigEndian>(m.leader_commit)?;
                buf.write_u64::<BigEndian>(m.leader_snapshot_index)?;
                buf.write_u16::<BigEndian>(m.payload_version)?;
            }
            RaftMessage::AppendEntriesReply(m) => {
                buf.write_u64::<BigEndian>(m.follower_id)?;
                buf.write_u64::<BigEndian>(m.term)?;
                write_bool(&mut buf, m.success)?;
                buf.write_u64::<BigEndian>(m.log_last_index)?;
                buf.write_u64::<BigEndian>(m.log_last_term)?;
                buf.write_u16::<BigEndian>(m.payload_version)?;
                buf.write_u8(m.raft_version)?;
            }
            RaftMessage::InstallSnapshot(m) => {
                buf.write_u64::<BigEndian>(m.term)?;
                buf.write_u64::<BigEndian>(m.leader_id)?;
                buf.write_u64::<BigEndian>(m.last_included_index)?;
                buf.write_u64::<BigEndian>(m.last_included_term)?;
                write_bytes(&mut buf, &m.chunk_data)?;
                buf.write_u32::<BigEndian>(m.chunk_index)?;
                buf.write_u32::<BigEndian>(m.total_chunks)?;
                match m.last_chunk_hash {
                    Some(hash) => {
                        write_bool(&mut buf, true)?;
                        buf.write_u64::<BigEndian>(hash)?;
                    }
                    None => write_bool(&mut buf, false)?,
                }
                match &m.cluster_config {
                    Some(config) => {
                        write_bool(&mut buf, true)?;
                        write_config(&mut buf, config)?;
                    }
                    None => write_bool(&mut buf, false)?,
                }
                buf.write_u8(m.raft_version)?;
            }
            RaftMessage::InstallSnapshotReply(m) => {
                buf.write_u64::<BigEndian>(m.term)?;
                buf.write_u64::<BigEndian>(m.follower_id)?;
                buf.write_u32::<BigEndian>(m.chunk_index)?;
                write_bool(&mut buf, m.success)?;
            }
        }
        Ok(buf)
    }

    fn decode(&self, body: &[u8]) -> CodecResult<Envelope> {
        let mut rd = Cursor::new(body);
        let tag = rd.read_u8()?;
        let kind = MessageKind::from_u8(tag).ok_or(CodecError::UnknownKind(tag))?;
        let from = rd.read_u64::<BigEndian>()?;
        let to = rd.read_u64::<BigEndian>()?;
        let message = match kind {
            MessageKind::RequestVote => RaftMessage::RequestVote(RequestVote {
                term: rd.read_u64::<BigEndian>()?,
                candidate_id: rd.read_u64::<BigEndian>()?,
                last_log_index: rd.read_u64::<BigEndian>()?,
                last_log_term: rd.read_u64::<BigEndian>()?,
            }),
            MessageKind::RequestVoteReply => RaftMessage::RequestVoteReply(RequestVoteReply {
                term: rd.read_u64::<BigEndian>()?,
                vote_granted: read_bool(&mut rd)?,
            }),
            MessageKind::AppendEntries => {
                let term = rd.read_u64::<BigEndian>()?;
                let leader_id = rd.read_u64::<BigEndian>()?;
                let prev_log_index = rd.read_u64::<BigEndian>()?;
                let prev_log_term = rd.read_u64::<BigEndian>()?;
                let count = rd.read_u32::<BigEndian>()? as usize;
                let mut entries = Vec::with_capacity(count.min(remaining(&rd)));
                for _ in 0..count {
                    entries.push(read_entry(&mut rd)?);
                }
                RaftMessage::AppendEntries(AppendEntries {
                    term,
                    leader_id,
                    prev_log_index,
                    prev_log_term,
                    entries,
                    leader_commit: rd.read_u64::<BigEndian>()?,
                    leader_snapshot_index: rd.read_u64::<BigEndian>()?,
                    payload_version: rd.read_u16::<BigEndian>()?,
                    leader_address: None,
                })
            }
            MessageKind::AppendEntriesReply => RaftMessage::AppendEntriesReply(AppendEntriesReply {
                follower_id: rd.read_u64::<BigEndian>()?,
                term: rd.read_u64::<BigEndian>()?,
                success: read_bool(&mut rd)?,
                log_last_index: rd.read_u64::<BigEndian>()?,
                log_last_term: rd.read_u64::<BigEndian>()?,
                payload_version: rd.read_u16::<BigEndian>()?,
                raft_version: rd.read_u8()?,
                force_install_snapshot: false,
                needs_leader_address: false,
            }),
            MessageKind::InstallSnapshot => {
                let term = rd.read_u64::<BigEndian>()?;
                let leader_id = rd.read_u64::<BigEndian>()?;
                let last_included_index = rd.read_u64::<BigEndian>()?;
                let last_included_term = rd.read_u64::<BigEndian>()?;
                let chunk_data = read_bytes(&mut rd)?;
                let chunk_index = rd.read_u32::<BigEndian>()?;
                let total_chunks = rd.read_u32::<BigEndian>()?;
                let last_chunk_hash = if read_bool(&mut rd)? {
                    Some(rd.read_u64::<BigEndian>()?)
                } else {
                    None
                };
                let cluster_config = if read_bool(&mut rd)? {
                    Some(read_config(&mut rd)?)
                } else {
                    None
                };
                RaftMessage::InstallSnapshot(InstallSnapshot {
                    term,
                    leader_id,
                    last_included_index,
                    last_included_term,
                    chunk_data,
                    chunk_index,
                    total_chunks,
                    last_chunk_hash,
                    cluster_config,
                    raft_version: rd.read_u8()?,
                })
            }
            MessageKind::InstallSnapshotReply => {
                RaftMessage::InstallSnapshotReply(InstallSnapshotReply {
                    term: rd.read_u64::<BigEndian>()?,
                    follower_id: rd.read_u64::<BigEndian>()?,
                    chunk_index: rd.read_u32::<BigEndian>()?,
                    success: read_bool(&mut rd)?,
                })
            }
        };
        let remain = remaining(&rd);
        if remain > 0 {
            return Err(CodecError::TrailingBytes(remain));
        }
        Ok(Envelope::new(from, to, message))
    }
}

#[inline]
fn remaining(rd: &Cursor<&[u8]>) -> usize {
    rd.get_ref().len().saturating_sub(rd.position() as usize)
}

#[inline]
fn write_bool(buf: &mut Vec<u8>, flag: bool) -> CodecResult<()> {
    buf.write_u8(flag as u8)?;
    Ok(())
}

fn read_bool(rd: &mut Cursor<&[u8]>) -> CodecResult<bool> {
    match rd.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CodecError::Decode(format!("invalid flag byte {}", other))),
    }
}

/// Lengths go out as u32, anything longer can't be framed.
fn write_len(buf: &mut Vec<u8>, len: usize) -> CodecResult<()> {
    let len = u32::try_from(len).map_err(|_| CodecError::TooLarge(len))?;
    buf.write_u32::<BigEndian>(len)?;
    Ok(())
}

fn write_bytes(buf: &mut Vec<u8>, data: &[u8]) -> CodecResult<()> {
    write_len(buf, data.len())?;
    buf.extend_from_slice(data);
    Ok(())
}

fn read_bytes(rd: &mut Cursor<&[u8]>) -> CodecResult<Vec<u8>> {
    let len = rd.read_u32::<BigEndian>()? as usize;
    if len > remaining(rd) {
        return Err(CodecError::Truncated);
    }
    let mut data = vec![0; len];
    rd.read_exact(&mut data)?;
    Ok(data)
}

fn write_entry(buf: &mut Vec<u8>, entry: &Entry) -> CodecResult<()> {
    buf.write_u8(entry.entry_type() as u8)?;
    buf.write_u64::<BigEndian>(entry.term)?;
    buf.write_u64::<BigEndian>(entry.index)?;
    write_bytes(buf, &entry.data)
}

fn read_entry(rd: &mut Cursor<&[u8]>) -> CodecResult<Entry> {
    let tag = rd.read_u8()?;
    let entry_type = EntryType::from_i32(tag as i32)
        .ok_or_else(|| CodecError::Decode(format!("unknown entry type {}", tag)))?;
    let term = rd.read_u64::<BigEndian>()?;
    let index = rd.read_u64::<BigEndian>()?;
    let data = read_bytes(rd)?;
    Ok(Entry::new(entry_type, term, index, data))
}

fn write_config(buf: &mut Vec<u8>, config: &ClusterConfig) -> CodecResult<()> {
    write_len(buf, config.servers.len())?;
    for server in config.servers.iter() {
        buf.write_u64::<BigEndian>(server.id)?;
        write_bool(buf, server.voting)?;
    }
    Ok(())
}

fn read_config(rd: &mut Cursor<&[u8]>) -> CodecResult<ClusterConfig> {
    let count = rd.read_u32::<BigEndian>()? as usize;
    let mut servers = Vec::with_capacity(count.min(remaining(rd)));
    for _ in 0..count {
        let id = rd.read_u64::<BigEndian>()?;
        let voting = read_bool(rd)?;
        servers.push(ServerInfo { id, voting });
    }
    Ok(ClusterConfig::new(servers))
}
