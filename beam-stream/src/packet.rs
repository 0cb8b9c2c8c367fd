//! Encoded access units

use bytes::Bytes;

/// One access unit produced by the hardware encoder: either a displayable
/// frame or a codec configuration blob.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    /// Encoded payload
    pub data: Bytes,
    /// Presentation timestamp in microseconds (meaningless for config packets)
    pub pts_us: u64,
    /// Codec initialization data, not image content
    pub config: bool,
    /// Self-contained frame requiring no prior frame to decode
    pub key_frame: bool,
}

impl EncodedPacket {
    pub fn frame(data: Bytes, pts_us: u64, key_frame: bool) -> Self {
        Self { data, pts_us, config: false, key_frame }
    }

    pub fn config(data: Bytes) -> Self {
        Self { data, pts_us: 0, config: true, key_frame: false }
    }
}
