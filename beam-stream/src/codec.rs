//! Codec identifiers
//!
//! Each codec has a 32-bit id which is its 4-byte ASCII short name, sent in
//! the stream header so the client can instantiate the right decoder.

/// Supported video codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    H265,
    Av1,
}

impl VideoCodec {
    /// 4-byte ASCII representation of the codec name
    pub fn id(&self) -> u32 {
        match self {
            VideoCodec::H264 => 0x6832_3634, // "h264"
            VideoCodec::H265 => 0x6832_3635, // "h265"
            VideoCodec::Av1 => 0x0061_7631,  // "av1"
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
            VideoCodec::Av1 => "av1",
        }
    }

    pub fn from_name(name: &str) -> Option<VideoCodec> {
        match name {
            "h264" => Some(VideoCodec::H264),
            "h265" => Some(VideoCodec::H265),
            "av1" => Some(VideoCodec::Av1),
            _ => None,
        }
    }
}

/// Supported audio codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Opus,
    Aac,
    Flac,
    Raw,
}

impl AudioCodec {
    /// 4-byte ASCII representation of the codec name
    pub fn id(&self) -> u32 {
        match self {
            AudioCodec::Opus => 0x6f70_7573, // "opus"
            AudioCodec::Aac => 0x0061_6163,  // "aac"
            AudioCodec::Flac => 0x666c_6163, // "flac"
            AudioCodec::Raw => 0x0072_6177,  // "raw"
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AudioCodec::Opus => "opus",
            AudioCodec::Aac => "aac",
            AudioCodec::Flac => "flac",
            AudioCodec::Raw => "raw",
        }
    }

    pub fn from_name(name: &str) -> Option<AudioCodec> {
        match name {
            "opus" => Some(AudioCodec::Opus),
            "aac" => Some(AudioCodec::Aac),
            "flac" => Some(AudioCodec::Flac),
            "raw" => Some(AudioCodec::Raw),
            _ => None,
        }
    }
}

/// Any codec, as carried by a [`Streamer`](crate::Streamer)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Video(VideoCodec),
    Audio(AudioCodec),
}

impl Codec {
    pub fn id(&self) -> u32 {
        match self {
            Codec::Video(c) => c.id(),
            Codec::Audio(c) => c.id(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Video(c) => c.name(),
            Codec::Audio(c) => c.name(),
        }
    }
}

impl From<VideoCodec> for Codec {
    fn from(c: VideoCodec) -> Self {
        Codec::Video(c)
    }
}

impl From<AudioCodec> for Codec {
    fn from(c: AudioCodec) -> Self {
        Codec::Audio(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_ids_are_ascii_names() {
        assert_eq!(&VideoCodec::H264.id().to_be_bytes(), b"h264");
        assert_eq!(&VideoCodec::H265.id().to_be_bytes(), b"h265");
        assert_eq!(&VideoCodec::Av1.id().to_be_bytes(), b"\0av1");
        assert_eq!(&AudioCodec::Opus.id().to_be_bytes(), b"opus");
        assert_eq!(&AudioCodec::Aac.id().to_be_bytes(), b"\0aac");
        assert_eq!(&AudioCodec::Flac.id().to_be_bytes(), b"flac");
        assert_eq!(&AudioCodec::Raw.id().to_be_bytes(), b"\0raw");
    }

    #[test]
    fn codec_name_round_trip() {
        for c in [VideoCodec::H264, VideoCodec::H265, VideoCodec::Av1] {
            assert_eq!(VideoCodec::from_name(c.name()), Some(c));
        }
        for c in [AudioCodec::Opus, AudioCodec::Aac, AudioCodec::Flac, AudioCodec::Raw] {
            assert_eq!(AudioCodec::from_name(c.name()), Some(c));
        }
    }
}
