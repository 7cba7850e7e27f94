//! Versioned text encoding for operation sequences.
//!
//! The same string lands in `.ops` sidecars and inside `.macro` files:
//!
//! ```json
//! {"format":"zenithedit-ops","version":1,"operations":[{"op":"crop","x":0,...}]}
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SerializationError;
use crate::ops::Operation;

pub const FORMAT_TAG: &str = "zenithedit-ops";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: &'a str,
    version: u32,
    operations: &'a [Operation],
}

#[derive(Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    #[serde(default)]
    operations: Vec<serde_json::Value>,
}

pub fn encode(ops: &[Operation]) -> String {
    let envelope = EnvelopeRef {
        format: FORMAT_TAG,
        version: FORMAT_VERSION,
        operations: ops,
    };
    serde_json::to_string(&envelope).expect("operation records always serialize")
}

/// Strict decode that reports why a string was rejected.
pub fn try_decode(raw: &str) -> Result<Vec<Operation>, SerializationError> {
    let envelope: Envelope = serde_json::from_str(raw.trim())?;
    if envelope.format != FORMAT_TAG {
        return Err(SerializationError::UnsupportedFormat(envelope.format));
    }
    if envelope.version != FORMAT_VERSION {
        return Err(SerializationError::UnsupportedVersion(envelope.version));
    }
    envelope
        .operations
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(SerializationError::from))
        .collect()
}

/// Best-effort decode: malformed or foreign input yields an empty sequence.
pub fn decode(raw: &str) -> Vec<Operation> {
    match try_decode(raw) {
        Ok(ops) => ops,
        Err(err) => {
            debug!("discarding undecodable operation data: {err}");
            Vec::new()
        }
    }
}
