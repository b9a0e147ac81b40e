//! On-disk record frame.
//!
//! Layout:
//!   [4-byte magic "TDMK"][1-byte format][4-byte LE body length]
//!   [protobuf body][8-byte SHA-256 prefix of the body]
//!
//! Every numeric field of the body uses a fixed-width protobuf encoding.

use prost::Message;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

const MAGIC: &[u8; 4] = b"TDMK";
const FORMAT: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 1 + 4;
const DIGEST_LEN: usize = 8;
/// Upper bound on a single record body.
pub const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

#[derive(Clone, PartialEq, Message)]
pub struct RecordFrame {
    #[prost(string, tag = "1")]
    pub kind: String,
    #[prost(fixed32, tag = "2")]
    pub schema_version: u32,
    #[prost(string, tag = "3")]
    pub entity_id: String,
    #[prost(message, optional, tag = "4")]
    pub timestamp: Option<TimestampFrame>,
    #[prost(message, repeated, tag = "5")]
    pub fields: Vec<FieldFrame>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TimestampFrame {
    #[prost(sfixed64, tag = "1")]
    pub micros: i64,
    #[prost(sfixed32, optional, tag = "2")]
    pub offset_seconds: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FieldFrame {
    #[prost(fixed32, tag = "1")]
    pub tag: u32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(oneof = "ValueFrame", tags = "3, 4, 5, 6, 7, 8, 9")]
    pub value: Option<ValueFrame>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum ValueFrame {
    #[prost(bool, tag = "3")]
    Bool(bool),
    #[prost(sfixed64, tag = "4")]
    Int(i64),
    #[prost(fixed64, tag = "5")]
    Uint(u64),
    #[prost(double, tag = "6")]
    Float(f64),
    #[prost(string, tag = "7")]
    Text(String),
    #[prost(bytes = "vec", tag = "8")]
    Bytes(Vec<u8>),
    #[prost(message, tag = "9")]
    Timestamp(TimestampFrame),
}

fn digest(body: &[u8]) -> [u8; DIGEST_LEN] {
    let full = Sha256::digest(body);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&full[..DIGEST_LEN]);
    out
}

/// Wrap an encoded frame in the header and trailer.
///
/// Bodies larger than [`MAX_BODY_LEN`] are refused, since [`open`] would
/// reject them.
pub fn seal(frame: &RecordFrame) -> Result<Vec<u8>> {
    let body = frame.encode_to_vec();
    let too_large = || Error::RecordTooLarge {
        len: body.len(),
        max: MAX_BODY_LEN,
    };
    if body.len() > MAX_BODY_LEN {
        return Err(too_large());
    }
    let len = u32::try_from(body.len()).map_err(|_| too_large())?;

    let mut out = Vec::with_capacity(HEADER_LEN + body.len() + DIGEST_LEN);
    out.extend_from_slice(MAGIC);
    out.push(FORMAT);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(&digest(&body));
    Ok(out)
}

/// Verify the header and trailer, then decode the frame.
pub fn open(bytes: &[u8]) -> Result<RecordFrame> {
    if bytes.len() < HEADER_LEN + DIGEST_LEN {
        return Err(Error::corrupt(format!("{} bytes is shorter than a frame", bytes.len())));
    }
    let (header, rest) = bytes.split_at(HEADER_LEN);
    if &header[..4] != MAGIC {
        return Err(Error::corrupt("bad magic"));
    }
    if header[4] != FORMAT {
        return Err(Error::corrupt(format!("unknown frame format {}", header[4])));
    }
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&header[5..9]);
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_BODY_LEN {
        return Err(Error::corrupt(format!("invalid body length: {len}")));
    }
    if rest.len() != len + DIGEST_LEN {
        return Err(Error::corrupt(format!(
            "body length {len} does not match {} available bytes",
            rest.len().saturating_sub(DIGEST_LEN)
        )));
    }
    let (body, trailer) = rest.split_at(len);
    if trailer != digest(body) {
        return Err(Error::corrupt("digest mismatch"));
    }
    RecordFrame::decode(body).map_err(|e| Error::corrupt(format!("protobuf decode error: {e}")))
}
