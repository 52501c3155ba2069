//! Wire codecs keyed by [RaftVersion]. A frame is one version byte
//! followed by the body produced by that version's codec.

mod helium;
mod proto;

use quick_error::quick_error;

use crate::message::{Envelope, RaftMessage};
use crate::version::RaftVersion;

pub use helium::HeliumCodec;
pub use proto::ProtoCodec;

quick_error! {
    #[derive(Debug)]
    pub enum CodecError {
        Truncated {
            display("frame truncated")
        }
        UnknownVersion(tag: u8) {
            display("unknown raft version tag {}", tag)
        }
        UnknownKind(tag: u8) {
            display("unknown message kind {}", tag)
        }
        Decode(reason: String) {
            display("malformed frame: {}", reason)
        }
        Prost(err: prost::DecodeError) {
            from()
            source(err)
        }
        TooLarge(len: usize) {
            display("length {} doesn't fit a u32 prefix", len)
        }
        TrailingBytes(remain: usize) {
            display("{} bytes left after decoding", remain)
        }
        Io(err: std::io::Error) {
            source(err)
            display("{:?}", err)
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => CodecError::Truncated,
            _ => CodecError::Io(err),
        }
    }
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// A pure encode/decode pair for a single protocol version.
pub trait Codec: Sync {
    fn version(&self) -> RaftVersion;

    fn encode(&self, envelope: &Envelope) -> CodecResult<Vec<u8>>;

    fn decode(&self, body: &[u8]) -> CodecResult<Envelope>;
}

static HELIUM: HeliumCodec = HeliumCodec;
static FLUORINE: ProtoCodec = ProtoCodec::new(RaftVersion::Fluorine);
static ARGON: ProtoCodec = ProtoCodec::new(RaftVersion::Argon);

pub fn codec_for(version: RaftVersion) -> &'static dyn Codec {
    match version {
        RaftVersion::Helium => &HELIUM,
        RaftVersion::Fluorine => &FLUORINE,
        RaftVersion::Argon => &ARGON,
    }
}

/// Clear every field `version` can not carry.
pub fn downgrade(message: &mut RaftMessage, version: RaftVersion) {
    match message {
        RaftMessage::AppendEntries(append) if !version.supports_leader_address() => {
            append.leader_address = None;
        }
        RaftMessage::AppendEntriesReply(reply) => {
            if !version.supports_leader_address() {
                reply.needs_leader_address = false;
            }
            if !version.supports_force_install_snapshot() {
                reply.force_install_snapshot = false;
            }
        }
        _ => {}
    }
}

pub fn encode_frame(version: RaftVersion, envelope: &Envelope) -> CodecResult<Vec<u8>> {
    let body = codec_for(version).encode(envelope)?;
    let mut frame = Vec::with_capacity(body.len() + 1);
    frame.push(version.as_u8());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a frame, returning the raw version tag the sender put on it
/// together with the envelope. Tags newer than ours are read with the
/// newest codec we know.
pub fn decode_frame(frame: &[u8]) -> CodecResult<(u8, Envelope)> {
    let (tag, body) = frame.split_first().ok_or(CodecError::Truncated)?;
    let version = if *tag > RaftVersion::CURRENT.as_u8() {
        RaftVersion::CURRENT
    } else {
        RaftVersion::from_u8(*tag).ok_or(CodecError::UnknownVersion(*tag))?
    };
    let envelope = codec_for(version).decode(body)?;
    Ok((*tag, envelope))
}
