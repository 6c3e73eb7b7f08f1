//! The varint-length-prefixed protobuf `Message` envelope carried by the
//! Messaging service (§6 wire protocols).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut};
use prost::Message as ProstMessage;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use dep2p_transport::BoxedStream;

use crate::error::{RealmError, RealmResult};

/// Reserved metadata key carrying the stringified error when a handler
/// returns a failure; filtered out of metadata surfaced to applications.
pub const METADATA_ERROR_KEY: &str = "error";
/// Reserved metadata key carrying measured round-trip latency in
/// milliseconds; filtered the same way as [`METADATA_ERROR_KEY`].
pub const METADATA_LATENCY_KEY: &str = "latency";

#[derive(Clone, Copy, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    Request = 0,
    Response = 1,
}

#[derive(Clone, PartialEq, ProstMessage)]
pub struct Message {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub from: Vec<u8>,
    #[prost(enumeration = "MessageType", tag = "3")]
    pub r#type: i32,
    #[prost(uint32, tag = "4")]
    pub priority: u32,
    #[prost(bytes = "vec", tag = "5")]
    pub payload: Vec<u8>,
    #[prost(uint64, tag = "6")]
    pub timestamp: u64,
    #[prost(map = "string, bytes", tag = "7")]
    pub metadata: HashMap<String, Vec<u8>>,
}

impl Message {
    pub fn now_unix() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }

    /// Metadata with the reserved `error`/`latency` keys filtered out,
    /// the view applications are handed.
    pub fn application_metadata(&self) -> HashMap<String, Vec<u8>> {
        self.metadata
            .iter()
            .filter(|(k, _)| k.as_str() != METADATA_ERROR_KEY && k.as_str() != METADATA_LATENCY_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Writes `msg` as a varint length prefix followed by its protobuf
/// encoding.
pub fn encode(msg: &Message, buf: &mut impl BufMut) -> RealmResult<()> {
    msg.encode_length_delimited(buf).map_err(|e| RealmError::Codec(e.to_string()))
}

pub fn encode_to_vec(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(msg.encoded_len() + 10);
    msg.encode_length_delimited(&mut buf).expect("Vec<u8> never runs out of capacity");
    buf
}

/// Reads one varint-length-prefixed `Message` off `buf`, enforcing
/// `max_size` against the declared length before decoding the payload.
pub fn decode(buf: &mut impl Buf, max_size: usize) -> RealmResult<Message> {
    let mut peek = buf.chunk();
    let declared_len = prost::decode_length_delimiter(&mut peek).map_err(|e| RealmError::Codec(e.to_string()))?;
    if declared_len > max_size {
        return Err(RealmError::Codec(format!("message of {declared_len} bytes exceeds max_message_size")));
    }
    Message::decode_length_delimited(buf).map_err(|e| RealmError::Codec(e.to_string()))
}

/// Writes a `Message` to a live stream, length-prefix and all.
pub async fn write_message(stream: &mut BoxedStream, msg: &Message) -> RealmResult<()> {
    let buf = encode_to_vec(msg);
    stream.write_all(&buf).await.map_err(|e| RealmError::Codec(e.to_string()))
}

/// Reads one varint-length-prefixed `Message` off a live stream,
/// enforcing `max_size` before allocating the payload buffer.
pub async fn read_message(stream: &mut BoxedStream, max_size: usize) -> RealmResult<Message> {
    let mut len: usize = 0;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).await.map_err(|e| RealmError::Codec(e.to_string()))?;
        len |= ((byte[0] & 0x7f) as usize) << shift;
        if byte[0] & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 63 {
            return Err(RealmError::Codec("varint length prefix too long".into()));
        }
    }
    if len > max_size {
        return Err(RealmError::Codec(format!("message of {len} bytes exceeds max_message_size")));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.map_err(|e| RealmError::Codec(e.to_string()))?;
    Message::decode(payload.as_slice()).map_err(|e| RealmError::Codec(e.to_string()))
}
