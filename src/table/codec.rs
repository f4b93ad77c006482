//! Binary codec for persisted tables.
//!
//! # Layout
//!
//! ```text
//! [magic "TSRT"][u16 version][u32 payload length][payload][sha256(payload)]
//! ```
//!
//! The payload is a bincode encoding of plain strings: table name, column
//! names, optional default, and rows of optional cell text. Nothing else can
//! be expressed, so a decoded file is always data and never behavior.
//!
//! Decoding fails closed: any header, length, checksum or payload mismatch
//! is an error.

use bincode::Options;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Cell, TableData};

const MAGIC: &[u8; 4] = b"TSRT";
const VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4;
const CHECKSUM_LEN: usize = 32;

/// Upper bound on a single payload (256 MiB).
pub const MAX_PAYLOAD_BYTES: u64 = 256 * 1024 * 1024;

/// Errors produced when decoding a persisted table.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("cache file is truncated ({0} bytes)")]
    Truncated(usize),

    #[error("cache file has bad magic")]
    BadMagic,

    #[error("unsupported cache file version {0}")]
    UnsupportedVersion(u16),

    #[error("payload length mismatch: header says {declared}, file holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("payload of {0} bytes exceeds the limit")]
    PayloadTooLarge(usize),

    #[error("payload checksum mismatch")]
    ChecksumMismatch,

    #[error("payload decode failed: {0}")]
    Payload(#[from] bincode::Error),
}

#[derive(Serialize, Deserialize)]
struct TableWire {
    name: String,
    columns: Vec<String>,
    default_value: Option<String>,
    rows: Vec<Vec<Option<String>>>,
}

fn options() -> impl Options {
    bincode::options().with_limit(MAX_PAYLOAD_BYTES)
}

/// Encode a table.
pub fn encode(table: &TableData) -> Result<Vec<u8>, CodecError> {
    let wire = TableWire {
        name: table.name().to_string(),
        columns: table.columns().to_vec(),
        default_value: table.default_value().map(str::to_string),
        rows: table
            .rows()
            .iter()
            .map(|row| row.iter().map(Cell::to_raw).collect())
            .collect(),
    };
    let payload = options().serialize(&wire)?;
    if payload.len() as u64 > MAX_PAYLOAD_BYTES {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + CHECKSUM_LEN);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&Sha256::digest(&payload));
    Ok(out)
}

/// Decode a table, rejecting anything that is not exactly what [`encode`]
/// produces.
pub fn decode(bytes: &[u8]) -> Result<TableData, CodecError> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(CodecError::Truncated(bytes.len()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(CodecError::BadMagic);
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let declared = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    if declared as u64 > MAX_PAYLOAD_BYTES {
        return Err(CodecError::PayloadTooLarge(declared));
    }
    let actual = bytes.len() - HEADER_LEN - CHECKSUM_LEN;
    if declared != actual {
        return Err(CodecError::LengthMismatch { declared, actual });
    }

    let payload = &bytes[HEADER_LEN..HEADER_LEN + declared];
    let checksum = &bytes[HEADER_LEN + declared..];
    if Sha256::digest(payload).as_slice() != checksum {
        return Err(CodecError::ChecksumMismatch);
    }

    let wire: TableWire = options().deserialize(payload)?;
    let rows = wire
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| cell.map(|s| Cell::parse(&s)).unwrap_or(Cell::Null))
                .collect()
        })
        .collect();

    Ok(TableData::new(wire.name, wire.columns, rows).with_default_value(wire.default_value))
}
