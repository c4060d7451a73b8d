use bytes::{Buf, BufMut, Bytes};
use tonic::codec::{BufferSettings, Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

/// A gRPC codec that has no knowledge of what is being sent or received.
///
/// Unlike a protobuf codec which works with generated message types, this
/// codec moves each gRPC message as an opaque byte buffer. It is installed
/// on both sides of the proxy - as the server codec of the inbound
/// catch-all service and as the call codec of the outbound client stream -
/// so wire bytes are copied between the two streams unmodified.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Codec for PassThrough {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = PassThroughEncoder;
    type Decoder = PassThroughDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        PassThroughEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        PassThroughDecoder
    }
}

/// Writes the message bytes into the outgoing frame verbatim.
#[derive(Debug)]
pub struct PassThroughEncoder;

impl Encoder for PassThroughEncoder {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put(item);
        Ok(())
    }

    fn buffer_settings(&self) -> BufferSettings {
        BufferSettings::default()
    }
}

/// Hands back the full message payload as a single byte buffer.
#[derive(Debug)]
pub struct PassThroughDecoder;

impl Decoder for PassThroughDecoder {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }

    fn buffer_settings(&self) -> BufferSettings {
        BufferSettings::default()
    }
}
