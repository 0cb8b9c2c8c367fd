//! Length-delimited, timestamped packet framing
//!
//! Layout (all integers big-endian):
//! - stream header, written once: 4-byte codec id, then for video 4-byte
//!   width + 4-byte height of the initial negotiated size
//! - per packet: 8 bytes of pts+flags (bit 63 = config, bit 62 = key frame)
//!   and 4 bytes of payload length, followed by the raw payload
//!
//! Config blobs of some audio codecs come wrapped in an extra envelope
//! emitted by the hardware encoder; it is stripped before sending.

use std::io::{self, Write};

use bytes::{BufMut, BytesMut};
use tracing::debug;

use beam_common::{BeamResult, Size};

use crate::codec::{AudioCodec, Codec};
use crate::packet::EncodedPacket;

/// The packet is a codec configuration blob; the remaining bits of the
/// pts field are meaningless.
pub const PACKET_FLAG_CONFIG: u64 = 1 << 63;
/// The packet is a key frame; the remaining bits hold the real pts.
pub const PACKET_FLAG_KEY_FRAME: u64 = 1 << 62;

/// Frames encoded packets onto a byte channel.
///
/// Ordering and reliability are assumed from the underlying transport; the
/// streamer provides no encryption, retransmission or multiplexing.
pub struct Streamer<W: Write> {
    writer: W,
    codec: Codec,
    send_codec_meta: bool,
    send_frame_meta: bool,
}

impl<W: Write> Streamer<W> {
    pub fn new(writer: W, codec: impl Into<Codec>, send_codec_meta: bool, send_frame_meta: bool) -> Self {
        Self { writer, codec: codec.into(), send_codec_meta, send_frame_meta }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Write the video stream header: codec id plus the initial video size.
    pub fn write_video_header(&mut self, size: Size) -> BeamResult<()> {
        if !self.send_codec_meta {
            return Ok(());
        }
        let mut buf = BytesMut::with_capacity(12);
        buf.put_u32(self.codec.id());
        buf.put_u32(size.width);
        buf.put_u32(size.height);
        self.writer.write_all(&buf)?;
        Ok(())
    }

    /// Write the audio stream header: codec id only.
    pub fn write_audio_header(&mut self) -> BeamResult<()> {
        if !self.send_codec_meta {
            return Ok(());
        }
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u32(self.codec.id());
        self.writer.write_all(&buf)?;
        Ok(())
    }

    /// Signal that the device disables this stream.
    ///
    /// Code 0 means the stream is disabled but mirroring should continue;
    /// code 1 means a configuration error occurred and the peer must stop.
    pub fn write_disable_stream(&mut self, error: bool) -> BeamResult<()> {
        let mut code = [0u8; 4];
        if error {
            code[3] = 1;
        }
        self.writer.write_all(&code)?;
        Ok(())
    }

    pub fn write_packet(&mut self, packet: &EncodedPacket) -> BeamResult<()> {
        let mut payload: &[u8] = &packet.data;

        if packet.config {
            if self.codec == Codec::Audio(AudioCodec::Opus) {
                payload = fix_opus_config_packet(payload)?;
            } else if self.codec == Codec::Audio(AudioCodec::Flac) {
                payload = fix_flac_config_packet(payload)?;
            }
            debug!("Writing {} config packet ({} bytes)", self.codec.name(), payload.len());
        }

        if self.send_frame_meta {
            self.write_frame_meta(payload.len(), packet)?;
        }

        self.writer.write_all(payload)?;
        Ok(())
    }

    fn write_frame_meta(&mut self, packet_size: usize, packet: &EncodedPacket) -> BeamResult<()> {
        let pts_and_flags = if packet.config {
            PACKET_FLAG_CONFIG
        } else if packet.key_frame {
            packet.pts_us | PACKET_FLAG_KEY_FRAME
        } else {
            packet.pts_us
        };

        let mut buf = BytesMut::with_capacity(12);
        buf.put_u64(pts_and_flags);
        buf.put_u32(packet_size as u32);
        self.writer.write_all(&buf)?;
        Ok(())
    }
}

/// Strip the envelope of an OPUS config blob down to the raw OpusHead.
///
/// The hardware encoder emits sections each prefixed by a 64-bit ASCII id
/// and a 64-bit native-endian length; only the "AOPUSHDR" section payload
/// must be sent as codec extradata.
fn fix_opus_config_packet(data: &[u8]) -> BeamResult<&[u8]> {
    const OPUS_HEADER_ID: &[u8; 8] = b"AOPUSHDR";

    if data.len() < 16 {
        return Err(invalid_data("Not enough data in OPUS config packet"));
    }
    if &data[..8] != OPUS_HEADER_ID {
        return Err(invalid_data("OPUS header not found"));
    }

    // The size is in native byte order
    let size = u64::from_ne_bytes(data[8..16].try_into().unwrap());
    if size >= 0x7FFF_FFFF {
        return Err(invalid_data("Invalid block size in OPUS header"));
    }
    let size = size as usize;
    if data.len() - 16 < size {
        return Err(invalid_data("Not enough data in OPUS header"));
    }

    Ok(&data[16..16 + size])
}

/// Strip the envelope of a FLAC config blob down to the raw STREAMINFO block.
///
/// The blob starts with the 4-byte "fLaC" marker and a 4-byte big-endian
/// payload length.
fn fix_flac_config_packet(data: &[u8]) -> BeamResult<&[u8]> {
    const FLAC_HEADER_ID: &[u8; 4] = b"fLaC";

    if data.len() < 8 {
        return Err(invalid_data("Not enough data in FLAC config packet"));
    }
    if &data[..4] != FLAC_HEADER_ID {
        return Err(invalid_data("FLAC header not found"));
    }

    let size = u32::from_be_bytes(data[4..8].try_into().unwrap()) as usize;
    if data.len() - 8 < size {
        return Err(invalid_data("Not enough data in FLAC header"));
    }

    Ok(&data[8..8 + size])
}

fn invalid_data(msg: &str) -> beam_common::BeamError {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string()).into()
}
