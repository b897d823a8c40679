//! collab-protocol
//!
//! Wire-level encoding/decoding for the session engine.
//!
//! This crate is responsible for turning logical engine messages
//! (`collab_core::InputMessage` / `OutputMessage`) into JSON frames and
//! back again, validating inbound payloads on the way in.
//!
//! - [`wire_types`] : event names and size limits
//! - [`payloads`]   : serde shapes of each event's `data`
//! - [`json_codec`] : envelope encode/decode

pub mod wire_types;
pub mod payloads;
pub mod json_codec;

pub use json_codec::{
    ProtocolError,
    check_frame_len,
    decode_input,
    encode_input,
    decode_output,
    encode_output,
};
