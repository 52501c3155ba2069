use prost::Message;

use super::{downgrade, Codec, CodecError, CodecResult};
use crate::message::Envelope;
use crate::raft_payload_proto::EnvelopeProto;
use crate::version::RaftVersion;

/// Protobuf envelope, shared by every version since Fluorine. Fields a
/// version does not know are masked on both directions.
pub struct ProtoCodec {
    version: RaftVersion,
}

impl ProtoCodec {
    pub const fn new(version: RaftVersion) -> Self {
        ProtoCodec { version }
    }
}

impl Codec for ProtoCodec {
    fn version(&self) -> RaftVersion {
        self.version
    }

    fn encode(&self, envelope: &Envelope) -> CodecResult<Vec<u8>> {
        let mut masked = envelope.clone();
        downgrade(&mut masked.message, self.version);
        Ok(EnvelopeProto::from(&masked).encode_to_vec())
    }

    fn decode(&self, body: &[u8]) -> CodecResult<Envelope> {
        let proto = EnvelopeProto::decode(body)?;
        let payload = proto
            .payload
            .ok_or_else(|| CodecError::Decode("envelope without payload".to_owned()))?;
        let mut envelope = Envelope::new(proto.from, proto.to, payload.into());
        downgrade(&mut envelope.message, self.version);
        Ok(envelope)
    }
}
