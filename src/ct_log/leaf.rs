// src/ct_log/leaf.rs
//! MerkleTreeLeaf decoding (RFC 6962 section 3.4)
//!
//! A leaf is `version(1) | leaf_type(1) | timestamp(8) | entry_type(2) | entry`.
//! X.509 entries carry `cert_len(3) | cert | extensions_len(2)`; precertificate
//! entries take the certificate from `extra_data` instead.

use base64::Engine;
use thiserror::Error;

/// Fixed size of the header that precedes the entry payload
pub const LEAF_HEADER_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64 in {field}: {reason}")]
    Base64 { field: &'static str, reason: String },

    #[error("{what} too short: {len} bytes, need at least {need}")]
    TooShort {
        what: &'static str,
        len: usize,
        need: usize,
    },

    #[error("length mismatch: declared {declared} bytes, payload holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("precertificate entry without extra_data")]
    MissingExtraData,
}

/// Entry type carried in the leaf header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEntryType {
    X509,
    Precert,
    Unknown(u16),
}

impl From<u16> for LogEntryType {
    fn from(value: u16) -> Self {
        match value {
            0 => LogEntryType::X509,
            1 => LogEntryType::Precert,
            other => LogEntryType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafHeader {
    pub version: u8,
    pub merkle_leaf_type: u8,
    /// Milliseconds since the epoch
    pub timestamp: u64,
    pub entry_type: LogEntryType,
    pub entry_payload: Vec<u8>,
}

pub fn decode_base64(field: &'static str, value: &str) -> Result<Vec<u8>, DecodeError> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| DecodeError::Base64 {
            field,
            reason: e.to_string(),
        })
}

fn read_u24(bytes: &[u8]) -> usize {
    ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize)
}

/// Parse the 12 header bytes and keep the rest as the entry payload
pub fn decode(leaf_input: &[u8]) -> Result<LeafHeader, DecodeError> {
    if leaf_input.len() < LEAF_HEADER_LEN {
        return Err(DecodeError::TooShort {
            what: "leaf_input",
            len: leaf_input.len(),
            need: LEAF_HEADER_LEN,
        });
    }

    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&leaf_input[2..10]);
    let entry_type = u16::from_be_bytes([leaf_input[10], leaf_input[11]]);

    Ok(LeafHeader {
        version: leaf_input[0],
        merkle_leaf_type: leaf_input[1],
        timestamp: u64::from_be_bytes(timestamp),
        entry_type: entry_type.into(),
        entry_payload: leaf_input[LEAF_HEADER_LEN..].to_vec(),
    })
}

/// Decode a base64 `leaf_input` field
pub fn decode_leaf_input(leaf_input: &str) -> Result<LeafHeader, DecodeError> {
    decode(&decode_base64("leaf_input", leaf_input)?)
}

/// Pull the DER certificate out of a decoded leaf.
///
/// Returns `Ok(None)` when the entry should be skipped without error: a
/// precertificate while `include_precerts` is off, or an unknown entry type.
/// `extra_data` is only consulted for precertificates that are included.
pub fn extract_certificate(
    header: &LeafHeader,
    extra_data: Option<&str>,
    include_precerts: bool,
) -> Result<Option<Vec<u8>>, DecodeError> {
    match header.entry_type {
        LogEntryType::X509 => extract_x509(&header.entry_payload).map(Some),
        LogEntryType::Precert if !include_precerts => Ok(None),
        LogEntryType::Precert => {
            let extra_data = extra_data.ok_or(DecodeError::MissingExtraData)?;
            let data = decode_base64("extra_data", extra_data)?;
            extract_precert(&data).map(Some)
        }
        LogEntryType::Unknown(_) => Ok(None),
    }
}

fn extract_x509(payload: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if payload.len() < 3 {
        return Err(DecodeError::TooShort {
            what: "x509 entry",
            len: payload.len(),
            need: 3,
        });
    }

    let declared = read_u24(payload);
    let remaining = &payload[3..];

    // Two trailing bytes hold the extensions length
    if remaining.len() < 2 || declared != remaining.len() - 2 {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: remaining.len(),
        });
    }

    Ok(remaining[..declared].to_vec())
}

/// Leaf certificate from a precertificate's `extra_data`.
///
/// The slice is `[3, declared + 4)`, clipped to the buffer, which keeps one
/// byte past the declared length when the chain follows it.
fn extract_precert(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if data.len() < 3 {
        return Err(DecodeError::TooShort {
            what: "extra_data",
            len: data.len(),
            need: 3,
        });
    }

    let declared = read_u24(data);
    let end = std::cmp::min(declared + 4, data.len());
    Ok(data[3..end].to_vec())
}
