//! MPEG-4 (ISO base media) probe and AAC track demuxer
//!
//! Only the movie header is held in memory; samples are read from their
//! recorded offsets as they are requested.

mod boxes;

pub use boxes::{Mp4Movie, Mp4Track, Sample};

use super::detection::DetectionResult;
use super::{
    track_parameter, AudioTrackFormat, CodecConfig, ContainerProbe, ContainerTrack, Demuxer,
    MediaContainerHints, MediaPacket, TrackKind,
};
use crate::container::bytes::{is_eof, ReadBytes};
use crate::error::{Error, Result};
use crate::io::SeekableInput;
use lavastream_common::friendly::{FriendlyError, Severity};
use lavastream_common::TrackInfo;
use tracing::debug;

pub const PROBE_NAME: &str = "mp4";

const NO_AUDIO: &str = "No supported audio formats in MP4 file.";
const UNSUPPORTED_LAYOUT: &str = "MP4 file uses an unsupported format.";

/// Largest movie header read into memory
const MAX_MOOV_SIZE: u64 = 64 * 1024 * 1024;

/// Largest single sample read when the input length is unknown
const MAX_SAMPLE_SIZE: u64 = 1024 * 1024;

pub struct Mp4Probe;

impl ContainerProbe for Mp4Probe {
    fn name(&self) -> &'static str {
        PROBE_NAME
    }

    fn matches_hints(&self, _hints: &MediaContainerHints) -> bool {
        false
    }

    fn probe(&self, identifier: &str, input: &mut dyn SeekableInput) -> Result<Option<DetectionResult>> {
        let ftyp = [None, None, None, None, Some(b'f'), Some(b't'), Some(b'y'), Some(b'p')];
        if !super::check_next_bytes(input, &ftyp)? {
            return Ok(None);
        }

        debug!(track = %identifier, "Track is an MP4 file");
        let mut demuxer = Mp4Demuxer::new(input, None);
        match demuxer.parse_headers() {
            Ok(()) => {}
            Err(Error::Unsupported(reason)) => {
                return Ok(Some(DetectionResult::unsupported(PROBE_NAME, reason)));
            }
            Err(e) => return Err(e),
        }

        let movie = demuxer.movie.as_ref();
        let info = TrackInfo::builder(identifier)
            .title(movie.and_then(|m| m.title.clone()))
            .author(movie.and_then(|m| m.artist.clone()))
            .length_ms(demuxer.duration_ms())
            .is_stream(false)
            .build();

        Ok(Some(DetectionResult::supported(PROBE_NAME, None, info)))
    }

    fn create_demuxer(&self, parameters: Option<&str>, input: Box<dyn SeekableInput>) -> Result<Box<dyn Demuxer>> {
        let mut demuxer = Mp4Demuxer::new(input, track_parameter(parameters));
        demuxer.parse_headers().map_err(|e| match e {
            Error::Unsupported(reason) => Error::Friendly(FriendlyError::new(reason, Severity::Common)),
            other => other,
        })?;
        Ok(Box::new(demuxer))
    }
}

pub struct Mp4Demuxer<I> {
    input: I,
    requested_track: Option<u64>,
    movie: Option<Mp4Movie>,
    selected: usize,
    format: Option<AudioTrackFormat>,
    next_sample: usize,
}

impl<I: SeekableInput> Mp4Demuxer<I> {
    pub fn new(input: I, requested_track: Option<u64>) -> Self {
        Self {
            input,
            requested_track,
            movie: None,
            selected: 0,
            format: None,
            next_sample: 0,
        }
    }

    fn track(&self) -> Option<&Mp4Track> {
        self.movie.as_ref()?.tracks.get(self.selected)
    }

    /// Walks top-level boxes until the movie header is found
    fn read_movie(&mut self) -> Result<Mp4Movie> {
        let mut fragmented = false;
        loop {
            let size = match self.input.read_be32() {
                Ok(size) => size as u64,
                Err(e) if is_eof(&e) => break,
                Err(e) => return Err(e.into()),
            };
            let kind = self.input.read_vec(4)?;
            let (header, size) = match size {
                1 => (16, self.input.read_be64()?),
                0 => (8, self.input.remaining().map_or(u64::MAX, |r| r + 8)),
                n => (8, n),
            };
            if size < header {
                return Err(Error::container(format!("MP4 box declares invalid size {}", size)));
            }
            let body = size - header;

            match &kind[..] {
                b"moov" => {
                    if let Some(remaining) = self.input.remaining() {
                        if body > remaining {
                            return Err(Error::container(format!(
                                "MP4 moov declares {} bytes but {} remain",
                                body, remaining
                            )));
                        }
                    }
                    if body > MAX_MOOV_SIZE {
                        return Err(Error::container("MP4 moov box is too large"));
                    }
                    let data = self.input.read_vec(body as usize)?;
                    let mut movie = boxes::parse_movie(&data)?;
                    movie.fragmented |= fragmented;
                    return Ok(movie);
                }
                b"moof" => {
                    fragmented = true;
                    self.input.skip_fully(body)?;
                }
                _ => {
                    if size == u64::MAX {
                        break;
                    }
                    self.input.skip_fully(body)?;
                }
            }
        }
        Err(Error::Unsupported(UNSUPPORTED_LAYOUT.to_string()))
    }

    fn select_track(&self, movie: &Mp4Movie) -> Option<usize> {
        let candidates = movie.tracks.iter().enumerate().filter(|(_, t)| t.is_aac());
        match self.requested_track {
            Some(id) => candidates
                .clone()
                .find(|(_, t)| t.id as u64 == id)
                .or_else(|| candidates.clone().next())
                .map(|(i, _)| i),
            None => candidates.map(|(i, _)| i).next(),
        }
    }
}

impl<I: SeekableInput> Demuxer for Mp4Demuxer<I> {
    fn parse_headers(&mut self) -> Result<()> {
        if self.movie.is_some() {
            return Ok(());
        }
        if self.input.position() != 0 {
            self.input.seek(0)?;
        }

        let movie = self.read_movie()?;
        let selected = self
            .select_track(&movie)
            .ok_or_else(|| Error::Unsupported(NO_AUDIO.to_string()))?;

        let track = &movie.tracks[selected];
        if movie.fragmented || track.samples.is_empty() {
            return Err(Error::Unsupported(UNSUPPORTED_LAYOUT.to_string()));
        }

        self.format = Some(AudioTrackFormat {
            codec: CodecConfig::Aac {
                audio_specific_config: track.decoder_specific.clone().unwrap_or_default(),
            },
            sample_rate: track.sample_rate,
            channels: track.channels,
        });
        debug!(
            "Selected MP4 track {} of {} ({} samples)",
            track.id,
            movie.tracks.len(),
            track.samples.len()
        );

        self.selected = selected;
        self.movie = Some(movie);
        Ok(())
    }

    fn tracks(&self) -> Vec<ContainerTrack> {
        let Some(movie) = &self.movie else {
            return Vec::new();
        };
        movie
            .tracks
            .iter()
            .map(|t| ContainerTrack {
                id: t.id as u64,
                kind: match &t.handler {
                    b"soun" => TrackKind::Audio,
                    b"vide" => TrackKind::Video,
                    _ => TrackKind::Other,
                },
                codec: t
                    .sample_entry
                    .map(|e| String::from_utf8_lossy(&e).into_owned())
                    .unwrap_or_default(),
                supported: t.is_aac(),
            })
            .collect()
    }

    fn audio_format(&self) -> Option<&AudioTrackFormat> {
        self.format.as_ref()
    }

    fn next_packet(&mut self) -> Result<Option<MediaPacket>> {
        let Some(track) = self.track() else {
            return Ok(None);
        };
        let Some(sample) = track.samples.get(self.next_sample).copied() else {
            return Ok(None);
        };
        let timescale = track.timescale.max(1) as u64;

        if self.input.position() != sample.offset {
            self.input.seek(sample.offset)?;
        }
        let limit = self.input.remaining().unwrap_or(MAX_SAMPLE_SIZE);
        if sample.size as u64 > limit {
            return Err(Error::container(format!(
                "MP4 sample at {} declares {} bytes but only {} can be read",
                sample.offset, sample.size, limit
            )));
        }
        let data = match self.input.read_vec(sample.size as usize) {
            Ok(data) => data,
            Err(e) if is_eof(&e) => {
                return Err(Error::container(format!(
                    "MP4 sample at {} extends past the end of the file",
                    sample.offset
                )))
            }
            Err(e) => return Err(e.into()),
        };
        self.next_sample += 1;

        Ok(Some(MediaPacket {
            timecode_ms: (sample.time.saturating_mul(1000) / timescale) as i64,
            data,
        }))
    }

    fn seek(&mut self, timecode_ms: i64) -> Result<i64> {
        if !self.input.can_seek_hard() {
            return Err(Error::NotSeekable);
        }
        let Some(track) = self.track() else {
            return Err(Error::NotSeekable);
        };
        let timescale = track.timescale.max(1) as u64;
        let target = (timecode_ms.max(0) as u64).saturating_mul(timescale) / 1000;

        let after = track.samples.partition_point(|s| s.time <= target);
        let index = if target >= track.duration {
            track.samples.len()
        } else {
            after.saturating_sub(1)
        };

        let reached = match track.samples.get(index) {
            Some(sample) => sample.time.saturating_mul(1000) / timescale,
            None => track.duration.saturating_mul(1000) / timescale,
        };
        self.next_sample = index;
        Ok(reached as i64)
    }

    fn is_seekable(&self) -> bool {
        self.input.can_seek_hard()
    }

    fn duration_ms(&self) -> Option<i64> {
        self.track().and_then(Mp4Track::duration_ms)
    }
}
