//! Framing of everything `FileStorage` writes to disk:
//!
//! ```text
//! +-------------+----------------+-----------------+
//! | len: u32 BE | checksum: u64 BE | payload (len)  |
//! +-------------+----------------+-----------------+
//! ```
//!
//! The checksum is the fxhash of the payload.
use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use common::errors::{Error, Result, StorageError};

pub const HEADER_SIZE: usize = 12;

#[inline]
pub fn checksum(payload: &[u8]) -> u64 {
    fxhash::hash64(payload)
}

/// Write one record, returns how many bytes it took.
pub fn write_record<W: Write>(writer: &mut W, payload: &[u8]) -> Result<u64> {
    let len = frame_len(payload.len())?;
    writer.write_u32::<BigEndian>(len)?;
    writer.write_u64::<BigEndian>(checksum(payload))?;
    writer.write_all(payload)?;
    Ok((HEADER_SIZE + payload.len()) as u64)
}

#[inline]
fn frame_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::Store(StorageError::RecordTooLarge(len)))
}

/// What the input held at the position of the next record.
#[derive(Debug, PartialEq)]
pub enum NextRecord {
    Record(Vec<u8>),
    /// Clean end of input.
    End,
    /// The input ends inside a record, the way an append cut by a crash
    /// leaves it.
    Torn,
}

/// Read the next record out of the `remaining` bytes left in the input.
/// A payload failing its checksum is `Corrupted`, a record running past
/// the end of input is `Torn`.
pub fn next_record<R: Read>(reader: &mut R, remaining: u64) -> Result<NextRecord> {
    let mut header = [0u8; HEADER_SIZE];
    match fill(reader, &mut header)? {
        0 => return Ok(NextRecord::End),
        HEADER_SIZE => {}
        _ => return Ok(NextRecord::Torn),
    }
    let len = BigEndian::read_u32(&header[..4]) as u64;
    if len > remaining.saturating_sub(HEADER_SIZE as u64) {
        return Ok(NextRecord::Torn);
    }
    let expected = BigEndian::read_u64(&header[4..]);
    let mut payload = vec![0; len as usize];
    if fill(reader, &mut payload)? < payload.len() {
        return Ok(NextRecord::Torn);
    }
    let actual = checksum(&payload);
    if actual != expected {
        return Err(Error::Store(StorageError::corrupted(format!(
            "checksum mismatch, expected {:#x} got {:#x}",
            expected, actual
        ))));
    }
    Ok(NextRecord::Record(payload))
}

/// Read the next record of a file that is only ever replaced whole, so a
/// record cut short can't be trusted either. `None` at a clean end.
pub fn read_record<R: Read>(reader: &mut R, remaining: u64) -> Result<Option<Vec<u8>>> {
    match next_record(reader, remaining)? {
        NextRecord::Record(payload) => Ok(Some(payload)),
        NextRecord::End => Ok(None),
        NextRecord::Torn => Err(Error::Store(StorageError::corrupted("truncated record"))),
    }
}

/// Like `read_exact`, but tells how far it got before the input ended.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
