//! Message codec: envelope encoding, fragment reassembly and fail-soft
//! decoding.
//!
//! Outgoing messages serialize to the family's flat tagged object. Incoming
//! text is first parsed into a generic JSON tree, its tag read from
//! [`MessageFamily::TAG_FIELD`], and only then decoded into the family's
//! event enum, so an unknown tag and a malformed payload are told apart in
//! the logs. Nothing here ever fails the session.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ProtocolError, Result};
use crate::protocol::MessageFamily;

/// Buffers text fragments until the final fragment arrives.
///
/// The buffer is discarded after every complete message.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: String,
}

impl FrameAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Returns the complete message once `last` is set.
    pub fn push(&mut self, data: &str, last: bool) -> Option<String> {
        self.buffer.push_str(data);
        if last {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// `true` when no partial message is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop any partial message, e.g. when the socket is replaced.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Serialize an outgoing message to its JSON text frame.
///
/// # Errors
///
/// Returns [`SessionError::Serialization`](crate::SessionError::Serialization)
/// if the message cannot be encoded.
pub fn encode<F: MessageFamily>(message: &F::Outgoing) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decode one complete text frame, reporting why it was rejected.
///
/// # Errors
///
/// Returns a [`ProtocolError`] describing the rejected frame.
pub fn try_decode<F: MessageFamily>(text: &str) -> std::result::Result<F::Incoming, ProtocolError> {
    let tree: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    let tag = match tree.get(F::TAG_FIELD).and_then(Value::as_str) {
        Some(tag) => tag.to_owned(),
        None => {
            return Err(ProtocolError::MissingTag {
                field: F::TAG_FIELD,
            })
        }
    };
    if !F::KNOWN_TAGS.contains(&tag.as_str()) {
        return Err(ProtocolError::UnknownTag(tag));
    }
    serde_json::from_value(tree).map_err(|source| ProtocolError::InvalidPayload { tag, source })
}

/// Decode one complete text frame, logging and dropping anything invalid.
pub fn decode<F: MessageFamily>(text: &str) -> Option<F::Incoming> {
    match try_decode::<F>(text) {
        Ok(message) => {
            debug!(family = F::NAME, ?message, "decoded frame");
            Some(message)
        }
        Err(ProtocolError::UnknownTag(tag)) => {
            warn!(family = F::NAME, %tag, "dropping frame with unknown tag");
            None
        }
        Err(e) => {
            warn!(family = F::NAME, error = %e, raw = %text, "dropping undecodable frame");
            None
        }
    }
}
