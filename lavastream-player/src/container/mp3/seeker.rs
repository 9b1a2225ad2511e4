//! Position lookup for MP3 files
//!
//! MP3 has no real index. A Xing/Info tag gives frame count and an optional
//! 100-entry table of contents; without one, a constant bitrate is assumed
//! when the content length is known. Streams cannot seek at all.

use super::header::FrameHeader;
use crate::container::bytes::{be32, ReadBytes};
use crate::error::{Error, Result};

const XING_FRAMES: u32 = 0x01;
const XING_BYTES: u32 = 0x02;
const XING_TOC: u32 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekTarget {
    pub position: u64,
    pub timecode_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mp3Seeker {
    Xing {
        data_start: u64,
        data_size: u64,
        duration_ms: i64,
        toc: Option<Vec<u8>>,
    },
    ConstantBitrate {
        data_start: u64,
        data_end: u64,
        average_frame_size: f64,
        frame_count: u64,
        frame_duration_ms: f64,
    },
    Stream,
}

impl Mp3Seeker {
    /// Builds a Xing seeker if the first frame carries a usable tag
    pub fn from_xing_frame(
        header: &FrameHeader,
        frame: &[u8],
        frame_start: u64,
        content_length: Option<u64>,
    ) -> Option<Self> {
        let offset = FrameHeader::SIZE + header.side_info_size();
        let tag = frame.get(offset..offset + 4)?;
        if tag != b"Xing" && tag != b"Info" {
            return None;
        }

        let flags = be32(frame, offset + 4)?;
        if flags & XING_FRAMES == 0 {
            return None;
        }

        let mut cursor = offset + 8;
        let frames = be32(frame, cursor)?;
        cursor += 4;

        let data_start = frame_start + frame.len() as u64;
        let data_size = if flags & XING_BYTES != 0 {
            let bytes = be32(frame, cursor)? as u64;
            cursor += 4;
            bytes.saturating_sub(frame.len() as u64)
        } else {
            content_length?.saturating_sub(data_start)
        };

        let toc = if flags & XING_TOC != 0 {
            Some(frame.get(cursor..cursor + 100)?.to_vec())
        } else {
            None
        };

        let duration_ms =
            (frames as u64 * header.samples_per_frame() as u64 * 1000 / header.sample_rate as u64) as i64;

        Some(Mp3Seeker::Xing {
            data_start,
            data_size,
            duration_ms,
            toc,
        })
    }

    pub fn constant_bitrate(header: &FrameHeader, data_start: u64, content_length: u64) -> Self {
        let average_frame_size =
            header.samples_per_frame() as f64 / 8.0 * header.bitrate_kbps as f64 * 1000.0 / header.sample_rate as f64;
        let data_end = content_length.max(data_start);
        let frame_count = ((data_end - data_start) as f64 / average_frame_size) as u64;

        Mp3Seeker::ConstantBitrate {
            data_start,
            data_end,
            average_frame_size,
            frame_count,
            frame_duration_ms: header.frame_duration_ms(),
        }
    }

    pub fn is_seekable(&self) -> bool {
        !matches!(self, Mp3Seeker::Stream)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match self {
            Mp3Seeker::Xing { duration_ms, .. } => Some(*duration_ms),
            Mp3Seeker::ConstantBitrate {
                frame_count,
                frame_duration_ms,
                ..
            } => Some((*frame_count as f64 * frame_duration_ms) as i64),
            Mp3Seeker::Stream => None,
        }
    }

    pub fn seek_target(&self, timecode_ms: i64) -> Result<SeekTarget> {
        let timecode_ms = timecode_ms.max(0);
        match self {
            Mp3Seeker::Xing {
                data_start,
                data_size,
                duration_ms,
                toc,
            } => {
                if *duration_ms <= 0 || timecode_ms >= *duration_ms {
                    return Ok(SeekTarget {
                        position: data_start + data_size,
                        timecode_ms: *duration_ms,
                    });
                }

                let percentile = (timecode_ms * 100 / duration_ms).clamp(0, 99) as usize;
                let fraction = match toc {
                    Some(toc) => toc[percentile] as f64 / 256.0,
                    None => percentile as f64 / 100.0,
                };

                Ok(SeekTarget {
                    position: data_start + (*data_size as f64 * fraction) as u64,
                    timecode_ms: percentile as i64 * duration_ms / 100,
                })
            }
            Mp3Seeker::ConstantBitrate {
                data_start,
                data_end,
                average_frame_size,
                frame_count,
                frame_duration_ms,
            } => {
                let index = ((timecode_ms as f64 / frame_duration_ms) as u64).min(*frame_count);
                let position = (*data_start + (index as f64 * average_frame_size) as u64).min(*data_end);
                Ok(SeekTarget {
                    position,
                    timecode_ms: (index as f64 * frame_duration_ms) as i64,
                })
            }
            Mp3Seeker::Stream => Err(Error::NotSeekable),
        }
    }
}

/// Reads the rest of a frame whose header was already consumed
pub(crate) fn read_frame_body<R: ReadBytes + ?Sized>(input: &mut R, header: &FrameHeader, raw: [u8; 4]) -> std::io::Result<Vec<u8>> {
    let length = header.frame_length();
    let mut frame = Vec::with_capacity(length);
    frame.extend_from_slice(&raw);
    frame.resize(length, 0);
    input.read_exact(&mut frame[FrameHeader::SIZE..])?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FrameHeader {
        FrameHeader::parse([0xFF, 0xFB, 0x90, 0x00]).unwrap()
    }

    #[test]
    fn test_stream_seeker_refuses() {
        assert!(matches!(Mp3Seeker::Stream.seek_target(1000), Err(Error::NotSeekable)));
        assert_eq!(Mp3Seeker::Stream.duration_ms(), None);
    }

    #[test]
    fn test_cbr_seek_lands_on_frame_boundary() {
        let h = header();
        let seeker = Mp3Seeker::constant_bitrate(&h, 0, 417 * 100);
        let target = seeker.seek_target(1000).unwrap();
        // 1000 ms / 26.12 ms per frame = frame 38
        assert_eq!(target.timecode_ms, (38.0 * h.frame_duration_ms()) as i64);
        assert!(target.timecode_ms <= 1000);

        let end = seeker.seek_target(1_000_000).unwrap();
        assert!(end.position <= 417 * 100);
    }

    #[test]
    fn test_xing_toc_lookup() {
        let h = header();
        let mut frame = vec![0u8; h.frame_length()];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        let at = 4 + 32;
        frame[at..at + 4].copy_from_slice(b"Xing");
        frame[at + 4..at + 8].copy_from_slice(&(XING_FRAMES | XING_TOC).to_be_bytes());
        frame[at + 8..at + 12].copy_from_slice(&1000u32.to_be_bytes());
        for i in 0..100 {
            frame[at + 12 + i] = (i * 256 / 100) as u8;
        }

        let seeker = Mp3Seeker::from_xing_frame(&h, &frame, 0, Some(417 * 1001)).unwrap();
        assert_eq!(seeker.duration_ms(), Some(26_122));
        let target = seeker.seek_target(13_061).unwrap();
        assert_eq!(target.timecode_ms, 50 * 26_122 / 100);
        assert!(target.position > 417);
    }
}
