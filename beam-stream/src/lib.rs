//! Wire framing for encoded Beam media streams
//!
//! Serializes codec metadata, per-packet timing/flag metadata, and
//! codec-specific header fixups into a byte stream consumed by the client.

pub mod codec;
pub mod packet;
pub mod streamer;

pub use codec::*;
pub use packet::*;
pub use streamer::*;
