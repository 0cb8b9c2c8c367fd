//! Wire-format tests for the streamer
//!
//! These verify the exact byte layout written to the transport.

use bytes::Bytes;

use beam_common::Size;
use beam_stream::{
    AudioCodec, EncodedPacket, Streamer, VideoCodec, PACKET_FLAG_CONFIG, PACKET_FLAG_KEY_FRAME,
};

fn video_streamer(out: &mut Vec<u8>) -> Streamer<&mut Vec<u8>> {
    Streamer::new(out, VideoCodec::H264, true, true)
}

#[test]
fn video_header_layout() {
    let mut out = Vec::new();
    let mut streamer = video_streamer(&mut out);
    streamer.write_video_header(Size::new(1280, 720)).unwrap();

    assert_eq!(out.len(), 12);
    assert_eq!(&out[0..4], b"h264");
    assert_eq!(&out[4..8], &0x0000_0500u32.to_be_bytes()); // 1280
    assert_eq!(&out[8..12], &0x0000_02D0u32.to_be_bytes()); // 720
}

#[test]
fn header_skipped_when_codec_meta_disabled() {
    let mut out = Vec::new();
    let mut streamer = Streamer::new(&mut out, VideoCodec::H265, false, true);
    streamer.write_video_header(Size::new(1920, 1080)).unwrap();
    assert!(out.is_empty());
}

#[test]
fn audio_header_is_codec_id_only() {
    let mut out = Vec::new();
    let mut streamer = Streamer::new(&mut out, AudioCodec::Opus, true, true);
    streamer.write_audio_header().unwrap();
    assert_eq!(out, b"opus");
}

#[test]
fn config_packet_meta_ignores_pts() {
    let mut out = Vec::new();
    let mut streamer = video_streamer(&mut out);

    let mut packet = EncodedPacket::config(Bytes::from_static(&[1, 2, 3]));
    packet.pts_us = 987_654_321; // nominal pts must not leak into the meta
    streamer.write_packet(&packet).unwrap();

    assert_eq!(&out[0..8], &PACKET_FLAG_CONFIG.to_be_bytes());
    assert_eq!(&out[8..12], &3u32.to_be_bytes());
    assert_eq!(&out[12..], &[1, 2, 3]);
}

#[test]
fn key_frame_meta_carries_pts_and_flag() {
    let mut out = Vec::new();
    let mut streamer = video_streamer(&mut out);

    let pts = 123_456_789_012u64;
    let packet = EncodedPacket::frame(Bytes::from_static(b"frame"), pts, true);
    streamer.write_packet(&packet).unwrap();

    let field = u64::from_be_bytes(out[0..8].try_into().unwrap());
    assert_eq!(field, pts | PACKET_FLAG_KEY_FRAME);
    // Masking out the two flag bits restores the timestamp
    assert_eq!(field & !(PACKET_FLAG_CONFIG | PACKET_FLAG_KEY_FRAME), pts);
    assert_eq!(&out[8..12], &5u32.to_be_bytes());
    assert_eq!(&out[12..], b"frame");
}

#[test]
fn non_key_frame_meta_is_raw_pts() {
    let mut out = Vec::new();
    let mut streamer = video_streamer(&mut out);

    let packet = EncodedPacket::frame(Bytes::from_static(b"x"), 42, false);
    streamer.write_packet(&packet).unwrap();
    assert_eq!(&out[0..8], &42u64.to_be_bytes());
}

#[test]
fn frame_meta_skipped_when_disabled() {
    let mut out = Vec::new();
    let mut streamer = Streamer::new(&mut out, VideoCodec::H264, true, false);
    let packet = EncodedPacket::frame(Bytes::from_static(b"payload"), 1, false);
    streamer.write_packet(&packet).unwrap();
    assert_eq!(out, b"payload");
}

#[test]
fn disable_stream_codes() {
    let mut out = Vec::new();
    let mut streamer = Streamer::new(&mut out, AudioCodec::Aac, true, true);
    streamer.write_disable_stream(false).unwrap();
    streamer.write_disable_stream(true).unwrap();
    assert_eq!(out, &[0, 0, 0, 0, 0, 0, 0, 1]);
}

#[test]
fn opus_config_envelope_is_stripped() {
    // "AOPUSHDR" + native-endian length + payload, followed by trailing
    // sections which must not be sent
    let header: &[u8] = &[0x11, 0x22, 0x33];
    let mut blob = Vec::new();
    blob.extend_from_slice(b"AOPUSHDR");
    blob.extend_from_slice(&(header.len() as u64).to_ne_bytes());
    blob.extend_from_slice(header);
    blob.extend_from_slice(b"AOPUSDLYxxxxxxxx");

    let mut out = Vec::new();
    let mut streamer = Streamer::new(&mut out, AudioCodec::Opus, true, false);
    streamer.write_packet(&EncodedPacket::config(Bytes::from(blob))).unwrap();
    assert_eq!(out, header);
}

#[test]
fn opus_config_with_bad_magic_is_refused() {
    let mut out = Vec::new();
    let mut streamer = Streamer::new(&mut out, AudioCodec::Opus, true, false);
    let blob = Bytes::from_static(b"NOTOPUSHDRxxxxxxxx");
    assert!(streamer.write_packet(&EncodedPacket::config(blob)).is_err());
}

#[test]
fn flac_config_envelope_is_stripped() {
    let header: &[u8] = &[0xAA; 34];
    let mut blob = Vec::new();
    blob.extend_from_slice(b"fLaC");
    blob.extend_from_slice(&(header.len() as u32).to_be_bytes());
    blob.extend_from_slice(header);
    blob.extend_from_slice(&[0x84, 0x00, 0x00, 0x28]); // trailing comment block

    let mut out = Vec::new();
    let mut streamer = Streamer::new(&mut out, AudioCodec::Flac, true, false);
    streamer.write_packet(&EncodedPacket::config(Bytes::from(blob))).unwrap();
    assert_eq!(out, header);
}

#[test]
fn flac_config_with_inconsistent_size_is_refused() {
    let mut blob = Vec::new();
    blob.extend_from_slice(b"fLaC");
    blob.extend_from_slice(&100u32.to_be_bytes()); // longer than remaining
    blob.extend_from_slice(&[0u8; 10]);

    let mut out = Vec::new();
    let mut streamer = Streamer::new(&mut out, AudioCodec::Flac, true, false);
    assert!(streamer.write_packet(&EncodedPacket::config(Bytes::from(blob))).is_err());
}
