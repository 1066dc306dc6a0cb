//! Encoding and decoding of push-channel frames.
//!
//! Frames are JSON; decoding happens inside the engine so that a malformed
//! frame is a droppable event, not a transport failure.

use crate::event::WireEvent;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serializing an event to a frame failed.
    #[error("event encode failed: {0}")]
    Encode(String),
    /// A frame could not be decoded into a known event.
    #[error("event decode failed: {0}")]
    Decode(String),
}

/// Encodes a [`WireEvent`] into a JSON frame.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the event cannot be serialized.
pub fn encode_event(event: &WireEvent) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(event).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes a JSON frame into a [`WireEvent`].
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the frame is not valid JSON, carries
/// an unknown `type` discriminator, or is missing required fields.
pub fn decode_event(frame: &[u8]) -> Result<WireEvent, CodecError> {
    serde_json::from_slice(frame).map_err(|e| CodecError::Decode(e.to_string()))
}
