use super::AudioDataFormat;

/// One encoded chunk as handed to the playback sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Position of the chunk's first sample in the track
    pub timecode_ms: i64,
    /// Volume the chunk was produced at
    pub volume: u16,
    pub format: AudioDataFormat,
    pub data: Vec<u8>,
}

impl AudioFrame {
    pub fn duration_ms(&self) -> i64 {
        self.format.frame_duration_ms()
    }

    /// Whether the payload is the format's silence pattern emitted at zero
    /// volume
    pub fn is_silence(&self) -> bool {
        self.volume == 0 && self.data == self.format.silence_bytes()
    }

    pub fn end_timecode_ms(&self) -> i64 {
        self.timecode_ms + self.duration_ms()
    }
}
