//! MPEG audio layer III frame headers

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

const BITRATES_V1: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const BITRATES_V2: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channels: u16,
}

impl FrameHeader {
    pub const SIZE: usize = 4;

    /// Parses a layer III header; `None` for anything else or invalid fields
    pub fn parse(b: [u8; 4]) -> Option<Self> {
        if b[0] != 0xFF || b[1] & 0xE0 != 0xE0 {
            return None;
        }

        let version = match (b[1] >> 3) & 0x03 {
            0 => MpegVersion::Mpeg25,
            2 => MpegVersion::Mpeg2,
            3 => MpegVersion::Mpeg1,
            _ => return None,
        };

        if (b[1] >> 1) & 0x03 != 1 {
            return None;
        }

        let bitrate_index = (b[2] >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }

        let rate_index = ((b[2] >> 2) & 0x03) as usize;
        if rate_index == 3 {
            return None;
        }

        let (bitrate_kbps, sample_rate) = match version {
            MpegVersion::Mpeg1 => (BITRATES_V1[bitrate_index], [44_100, 48_000, 32_000][rate_index]),
            MpegVersion::Mpeg2 => (BITRATES_V2[bitrate_index], [22_050, 24_000, 16_000][rate_index]),
            MpegVersion::Mpeg25 => (BITRATES_V2[bitrate_index], [11_025, 12_000, 8_000][rate_index]),
        };

        Some(Self {
            version,
            bitrate_kbps,
            sample_rate,
            padding: (b[2] >> 1) & 0x01 == 1,
            channels: if b[3] >> 6 == 3 { 1 } else { 2 },
        })
    }

    pub fn samples_per_frame(&self) -> u32 {
        match self.version {
            MpegVersion::Mpeg1 => 1152,
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => 576,
        }
    }

    /// Whole frame length in bytes, header included
    pub fn frame_length(&self) -> usize {
        self.unpadded_length() + usize::from(self.padding)
    }

    pub fn unpadded_length(&self) -> usize {
        let coefficient = self.samples_per_frame() / 8;
        (coefficient * self.bitrate_kbps * 1000 / self.sample_rate) as usize
    }

    /// Side information size, which precedes a Xing tag
    pub fn side_info_size(&self) -> usize {
        match (self.version, self.channels) {
            (MpegVersion::Mpeg1, 1) => 17,
            (MpegVersion::Mpeg1, _) => 32,
            (_, 1) => 9,
            _ => 17,
        }
    }

    pub fn frame_duration_ms(&self) -> f64 {
        self.samples_per_frame() as f64 * 1000.0 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_128k_44100_stereo() {
        let header = FrameHeader::parse([0xFF, 0xFB, 0x90, 0x00]).unwrap();
        assert_eq!(header.version, MpegVersion::Mpeg1);
        assert_eq!(header.bitrate_kbps, 128);
        assert_eq!(header.sample_rate, 44_100);
        assert_eq!(header.channels, 2);
        assert_eq!(header.frame_length(), 417);
        assert_eq!(header.side_info_size(), 32);
    }

    #[test]
    fn test_padding_and_mono() {
        let header = FrameHeader::parse([0xFF, 0xFB, 0x92, 0xC0]).unwrap();
        assert!(header.padding);
        assert_eq!(header.channels, 1);
        assert_eq!(header.frame_length(), 418);
    }

    #[test]
    fn test_rejects_other_layers_and_bad_fields() {
        // layer II
        assert!(FrameHeader::parse([0xFF, 0xFD, 0x90, 0x00]).is_none());
        // bad bitrate
        assert!(FrameHeader::parse([0xFF, 0xFB, 0xF0, 0x00]).is_none());
        // reserved rate
        assert!(FrameHeader::parse([0xFF, 0xFB, 0x9C, 0x00]).is_none());
        assert!(FrameHeader::parse([0x00, 0xFB, 0x90, 0x00]).is_none());
    }
}
