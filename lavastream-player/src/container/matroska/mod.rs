//! Matroska/WebM probe and demuxer
//!
//! Headers (Info, Tracks, Cues) are parsed up to the first Cluster. After
//! that, demuxing reads elements flat: entering a Cluster or BlockGroup
//! just means reading on inside it, so clusters of unknown size from live
//! streams work the same as sized ones.

mod block;
mod ebml;

pub use block::{parse_block_body, split_xiph_private, BlockFrames};
pub use ebml::{ids, MatroskaElement, MutableElement};

use super::detection::DetectionResult;
use super::{
    track_parameter, AudioTrackFormat, CodecConfig, ContainerProbe, ContainerTrack, Demuxer,
    MediaContainerHints, MediaPacket, TrackKind,
};
use crate::container::bytes::ReadBytes;
use crate::error::{Error, Result};
use crate::io::SeekableInput;
use ebml::{finish, for_each_child, read_binary, read_float, read_string, read_uint, read_vint, MAX_PAYLOAD_SIZE};
use lavastream_common::friendly::{FriendlyError, Severity};
use lavastream_common::TrackInfo;
use std::collections::VecDeque;
use tracing::{debug, warn};

pub const PROBE_NAME: &str = "matroska/webm";

pub const OPUS_CODEC: &str = "A_OPUS";
pub const VORBIS_CODEC: &str = "A_VORBIS";
pub const AAC_CODEC: &str = "A_AAC";

/// Supported codecs in order of preference
const SUPPORTED_CODECS: [&str; 3] = [OPUS_CODEC, VORBIS_CODEC, AAC_CODEC];

const NO_AUDIO: &str = "No supported audio tracks present in the file.";

const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;

pub struct MatroskaProbe;

impl ContainerProbe for MatroskaProbe {
    fn name(&self) -> &'static str {
        PROBE_NAME
    }

    fn matches_hints(&self, _hints: &MediaContainerHints) -> bool {
        false
    }

    fn probe(&self, identifier: &str, input: &mut dyn SeekableInput) -> Result<Option<DetectionResult>> {
        let ebml_tag = [Some(0x1A), Some(0x45), Some(0xDF), Some(0xA3)];
        if !super::check_next_bytes(input, &ebml_tag)? {
            return Ok(None);
        }

        debug!(track = %identifier, "Track is a matroska file");
        let mut demuxer = MatroskaDemuxer::new(input, None);
        match demuxer.parse_headers() {
            Ok(()) => {}
            Err(Error::Unsupported(reason)) => {
                return Ok(Some(DetectionResult::unsupported(PROBE_NAME, reason)));
            }
            Err(e) => return Err(e),
        }

        let length_ms = demuxer.duration_ms();
        let info = TrackInfo::builder(identifier)
            .title(demuxer.title.clone())
            .length_ms(length_ms)
            .is_stream(length_ms.is_none() && !demuxer.is_seekable())
            .build();

        Ok(Some(DetectionResult::supported(PROBE_NAME, None, info)))
    }

    fn create_demuxer(&self, parameters: Option<&str>, input: Box<dyn SeekableInput>) -> Result<Box<dyn Demuxer>> {
        let mut demuxer = MatroskaDemuxer::new(input, track_parameter(parameters));
        demuxer.parse_headers().map_err(|e| match e {
            Error::Unsupported(reason) => Error::Friendly(FriendlyError::new(reason, Severity::Common)),
            other => other,
        })?;
        Ok(Box::new(demuxer))
    }
}

/// One TrackEntry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatroskaTrack {
    pub number: u64,
    pub track_type: u64,
    pub codec_id: String,
    pub codec_private: Option<Vec<u8>>,
    pub sampling_frequency: f64,
    pub channels: u64,
}

impl MatroskaTrack {
    pub fn is_audio(&self) -> bool {
        self.track_type == TRACK_TYPE_AUDIO
    }

    pub fn is_supported(&self) -> bool {
        self.is_audio() && SUPPORTED_CODECS.contains(&self.codec_id.as_str())
    }

    fn preference(&self) -> usize {
        SUPPORTED_CODECS
            .iter()
            .position(|codec| *codec == self.codec_id)
            .unwrap_or(SUPPORTED_CODECS.len())
    }

    fn codec_config(&self) -> Result<CodecConfig> {
        let private = self.codec_private.clone();
        match self.codec_id.as_str() {
            OPUS_CODEC => Ok(CodecConfig::Opus { head: private }),
            AAC_CODEC => {
                let audio_specific_config =
                    private.ok_or_else(|| Error::container("Matroska AAC track has no codec private data"))?;
                Ok(CodecConfig::Aac { audio_specific_config })
            }
            VORBIS_CODEC => {
                let private =
                    private.ok_or_else(|| Error::container("Matroska Vorbis track has no codec private data"))?;
                let mut parts = split_xiph_private(&private)?.into_iter();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(identification), Some(_comment), Some(setup)) => {
                        Ok(CodecConfig::Vorbis { identification, setup })
                    }
                    _ => Err(Error::container("Matroska Vorbis codec private needs three headers")),
                }
            }
            other => Err(Error::Unsupported(format!("Matroska codec {} is not supported", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CuePoint {
    /// In timecode scale units
    time: u64,
    /// Relative to the segment payload
    cluster_position: u64,
}

pub struct MatroskaDemuxer<I> {
    input: I,
    requested_track: Option<u64>,
    segment: Option<MatroskaElement>,
    timecode_scale: u64,
    /// In timecode scale units
    duration: Option<f64>,
    title: Option<String>,
    tracks: Vec<MatroskaTrack>,
    selected_track: u64,
    format: Option<AudioTrackFormat>,
    cues: Vec<CuePoint>,
    cues_position: Option<u64>,
    first_cluster: Option<u64>,
    cluster_timecode: u64,
    pending: VecDeque<MediaPacket>,
    scratch: MutableElement,
}

impl<I: SeekableInput> MatroskaDemuxer<I> {
    pub fn new(input: I, requested_track: Option<u64>) -> Self {
        Self {
            input,
            requested_track,
            segment: None,
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            duration: None,
            title: None,
            tracks: Vec::new(),
            selected_track: 0,
            format: None,
            cues: Vec::new(),
            cues_position: None,
            first_cluster: None,
            cluster_timecode: 0,
            pending: VecDeque::new(),
            scratch: MutableElement::new(1),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn ticks_to_ms(&self, ticks: i64) -> i64 {
        ((ticks as i128 * self.timecode_scale as i128) / 1_000_000) as i64
    }

    fn ms_to_ticks(&self, ms: i64) -> u64 {
        (ms.max(0) as u128 * 1_000_000 / self.timecode_scale.max(1) as u128) as u64
    }

    fn read_info(&mut self, info: &MatroskaElement) -> Result<()> {
        let mut scale = DEFAULT_TIMECODE_SCALE;
        let mut duration = None;
        let mut title = None;
        for_each_child(&mut self.input, info, |input, child| {
            match child.id {
                ids::TIMECODE_SCALE => scale = read_uint(input, child)?,
                ids::DURATION => duration = Some(read_float(input, child)?),
                ids::TITLE => title = Some(read_string(input, child)?).filter(|t| !t.is_empty()),
                _ => {}
            }
            Ok(())
        })?;

        self.timecode_scale = if scale == 0 { DEFAULT_TIMECODE_SCALE } else { scale };
        self.duration = duration.filter(|d: &f64| d.is_finite() && *d > 0.0);
        self.title = title;
        Ok(())
    }

    fn read_tracks(&mut self, tracks: &MatroskaElement) -> Result<()> {
        let mut parsed = Vec::new();
        for_each_child(&mut self.input, tracks, |input, entry| {
            if entry.id != ids::TRACK_ENTRY {
                return Ok(());
            }
            let mut track = MatroskaTrack {
                sampling_frequency: 8000.0,
                channels: 1,
                ..Default::default()
            };
            for_each_child(input, entry, |input, field| {
                match field.id {
                    ids::TRACK_NUMBER => track.number = read_uint(input, field)?,
                    ids::TRACK_TYPE => track.track_type = read_uint(input, field)?,
                    ids::CODEC_ID => track.codec_id = read_string(input, field)?,
                    ids::CODEC_PRIVATE => track.codec_private = Some(read_binary(input, field)?),
                    ids::AUDIO => for_each_child(input, field, |input, audio| {
                        match audio.id {
                            ids::SAMPLING_FREQUENCY => track.sampling_frequency = read_float(input, audio)?,
                            ids::CHANNELS => track.channels = read_uint(input, audio)?,
                            _ => {}
                        }
                        Ok(())
                    })?,
                    _ => {}
                }
                Ok(())
            })?;
            parsed.push(track);
            Ok(())
        })?;
        self.tracks = parsed;
        Ok(())
    }

    fn read_cues(&mut self, cues: &MatroskaElement) -> Result<()> {
        let mut points = Vec::new();
        for_each_child(&mut self.input, cues, |input, point| {
            if point.id != ids::CUE_POINT {
                return Ok(());
            }
            let mut time = None;
            let mut cluster_position = None;
            for_each_child(input, point, |input, field| {
                match field.id {
                    ids::CUE_TIME => time = Some(read_uint(input, field)?),
                    ids::CUE_TRACK_POSITIONS => for_each_child(input, field, |input, position| {
                        if position.id == ids::CUE_CLUSTER_POSITION && cluster_position.is_none() {
                            cluster_position = Some(read_uint(input, position)?);
                        }
                        Ok(())
                    })?,
                    _ => {}
                }
                Ok(())
            })?;
            if let (Some(time), Some(cluster_position)) = (time, cluster_position) {
                points.push(CuePoint { time, cluster_position });
            }
            Ok(())
        })?;

        points.sort_by_key(|p| p.time);
        debug!("Read {} matroska cue points", points.len());
        self.cues = points;
        Ok(())
    }

    fn read_seek_head(&mut self, seek_head: &MatroskaElement) -> Result<()> {
        let mut cues_position = None;
        for_each_child(&mut self.input, seek_head, |input, seek| {
            if seek.id != ids::SEEK {
                return Ok(());
            }
            let mut id = None;
            let mut position = None;
            for_each_child(input, seek, |input, field| {
                match field.id {
                    ids::SEEK_ID => id = Some(read_uint(input, field)?),
                    ids::SEEK_POSITION => position = Some(read_uint(input, field)?),
                    _ => {}
                }
                Ok(())
            })?;
            if id == Some(ids::CUES as u64) {
                cues_position = position;
            }
            Ok(())
        })?;
        self.cues_position = cues_position;
        Ok(())
    }

    /// Reads cues stored after the clusters, returning to the current position
    fn read_trailing_cues(&mut self, segment: &MatroskaElement) -> Result<()> {
        let Some(relative) = self.cues_position else {
            return Ok(());
        };
        if !self.cues.is_empty() || !self.input.can_seek_hard() {
            return Ok(());
        }

        let resume = self.input.position();
        self.input.seek(segment.data_position() + relative)?;
        let mut scratch = MutableElement::new(1);
        if scratch.read(&mut self.input, segment.end())? && scratch.id() == ids::CUES {
            let cues = scratch.frozen();
            self.read_cues(&cues)?;
        }
        self.input.seek(resume)?;
        Ok(())
    }

    fn select_track(&self) -> Option<&MatroskaTrack> {
        let mut candidates: Vec<&MatroskaTrack> = self.tracks.iter().filter(|t| t.is_supported()).collect();
        if let Some(requested) = self.requested_track {
            if let Some(track) = candidates.iter().find(|t| t.number == requested) {
                return Some(*track);
            }
        }
        candidates.sort_by_key(|t| t.preference());
        candidates.first().copied()
    }

    /// Reads the selected track's frames from a block at the input position
    fn read_block(&mut self, element: &MatroskaElement) -> Result<()> {
        let size = element.data_size.unwrap_or(0);
        if size > MAX_PAYLOAD_SIZE {
            return Err(Error::container(format!("Matroska block of {} bytes is too large", size)));
        }
        let Some((track, track_length)) = read_vint(&mut self.input, false)? else {
            return Err(Error::container("Matroska block is truncated"));
        };
        if track != self.selected_track {
            return Ok(());
        }

        let body_size = size
            .checked_sub(track_length as u64)
            .ok_or_else(|| Error::container("Matroska block is shorter than its header"))?;
        let body = self.input.read_vec(body_size as usize)?;
        let block = parse_block_body(&body)?;

        let timecode = self.ticks_to_ms(self.cluster_timecode as i64 + block.relative_timecode as i64);
        self.pending.extend(block.frames.into_iter().map(|data| MediaPacket {
            timecode_ms: timecode,
            data,
        }));
        Ok(())
    }
}

/// Timecode of a cluster, read from its children
fn cluster_timecode<I: SeekableInput + ?Sized>(input: &mut I, cluster: &MatroskaElement) -> Result<Option<u64>> {
    let mut scratch = MutableElement::new(cluster.level + 1);
    while scratch.read(input, cluster.end())? {
        let child = scratch.frozen();
        if child.id == ids::TIMECODE {
            return Ok(Some(read_uint(input, &child)?));
        }
        if child.id == ids::SIMPLE_BLOCK || child.id == ids::BLOCK_GROUP {
            break;
        }
        finish(input, &child)?;
    }
    Ok(None)
}

impl<I: SeekableInput> Demuxer for MatroskaDemuxer<I> {
    fn parse_headers(&mut self) -> Result<()> {
        if self.segment.is_some() {
            return Ok(());
        }
        if self.input.position() != 0 {
            self.input.seek(0)?;
        }

        let mut scratch = MutableElement::new(0);
        if !scratch.read(&mut self.input, None)? || scratch.id() != ids::EBML {
            return Err(Error::container("Matroska file does not start with an EBML header"));
        }
        let header = scratch.frozen();
        let mut doc_type = String::new();
        for_each_child(&mut self.input, &header, |input, child| {
            if child.id == ids::DOC_TYPE {
                doc_type = read_string(input, child)?;
            }
            Ok(())
        })?;
        debug!("Matroska document type {}", doc_type);

        if !scratch.read(&mut self.input, None)? || scratch.id() != ids::SEGMENT {
            return Err(Error::container("Matroska file has no segment"));
        }
        let segment = scratch.frozen();

        let mut children = MutableElement::new(1);
        while children.read(&mut self.input, segment.end())? {
            let child = children.frozen();
            match child.id {
                ids::INFO => self.read_info(&child)?,
                ids::TRACKS => self.read_tracks(&child)?,
                ids::CUES => self.read_cues(&child)?,
                ids::SEEK_HEAD => self.read_seek_head(&child)?,
                ids::CLUSTER => {
                    // the input stays inside the cluster for demuxing
                    self.first_cluster = Some(child.position);
                    break;
                }
                _ => {}
            }
            finish(&mut self.input, &child)?;
        }

        if let Err(e) = self.read_trailing_cues(&segment) {
            warn!("Ignoring unreadable matroska cues: {}", e);
            self.cues.clear();
        }

        let track = self
            .select_track()
            .cloned()
            .ok_or_else(|| Error::Unsupported(NO_AUDIO.to_string()))?;
        debug!(
            "Selected matroska track {} ({}) of {}",
            track.number,
            track.codec_id,
            self.tracks.len()
        );

        self.format = Some(AudioTrackFormat {
            codec: track.codec_config()?,
            sample_rate: track.sampling_frequency.round() as u32,
            channels: track.channels as u16,
        });
        self.selected_track = track.number;
        self.segment = Some(segment);
        Ok(())
    }

    fn tracks(&self) -> Vec<ContainerTrack> {
        self.tracks
            .iter()
            .map(|t| ContainerTrack {
                id: t.number,
                kind: match t.track_type {
                    TRACK_TYPE_AUDIO => TrackKind::Audio,
                    TRACK_TYPE_VIDEO => TrackKind::Video,
                    _ => TrackKind::Other,
                },
                codec: t.codec_id.clone(),
                supported: t.is_supported(),
            })
            .collect()
    }

    fn audio_format(&self) -> Option<&AudioTrackFormat> {
        self.format.as_ref()
    }

    fn next_packet(&mut self) -> Result<Option<MediaPacket>> {
        let Some(segment) = self.segment else {
            return Ok(None);
        };

        loop {
            if let Some(packet) = self.pending.pop_front() {
                return Ok(Some(packet));
            }

            if !self.scratch.read(&mut self.input, segment.end())? {
                return Ok(None);
            }
            let element = self.scratch.frozen();
            match element.id {
                ids::CLUSTER => {
                    self.cluster_timecode = 0;
                    continue;
                }
                ids::BLOCK_GROUP => continue,
                ids::TIMECODE => self.cluster_timecode = read_uint(&mut self.input, &element)?,
                ids::SIMPLE_BLOCK | ids::BLOCK => self.read_block(&element)?,
                _ => {}
            }
            finish(&mut self.input, &element)?;
        }
    }

    fn seek(&mut self, timecode_ms: i64) -> Result<i64> {
        let Some(segment) = self.segment else {
            return Err(Error::NotSeekable);
        };
        if !self.input.can_seek_hard() {
            return Err(Error::NotSeekable);
        }
        self.pending.clear();

        if let Some(duration_ms) = self.duration_ms() {
            if timecode_ms >= duration_ms {
                let end = segment.end().or(self.input.content_length());
                if let Some(end) = end {
                    self.input.seek(end)?;
                    return Ok(duration_ms);
                }
            }
        }

        let target = self.ms_to_ticks(timecode_ms);
        let (position, ticks) = if !self.cues.is_empty() {
            let index = self.cues.partition_point(|c| c.time <= target).saturating_sub(1);
            let cue = self.cues[index];
            (segment.data_position() + cue.cluster_position, cue.time)
        } else {
            let Some(first) = self.first_cluster else {
                return Ok(0);
            };
            let mut best = (first, 0u64);
            let mut scratch = MutableElement::new(1);
            self.input.seek(first)?;
            while scratch.read(&mut self.input, segment.end())? {
                let element = scratch.frozen();
                if element.id != ids::CLUSTER {
                    finish(&mut self.input, &element)?;
                    continue;
                }
                let Some(end) = element.end() else {
                    break;
                };
                let time = cluster_timecode(&mut self.input, &element)?.unwrap_or(0);
                if time > target {
                    break;
                }
                best = (element.position, time);
                self.input.seek(end)?;
            }
            best
        };

        self.input.seek(position)?;
        self.cluster_timecode = ticks;
        Ok(self.ticks_to_ms(ticks as i64))
    }

    fn is_seekable(&self) -> bool {
        self.input.can_seek_hard()
    }

    fn duration_ms(&self) -> Option<i64> {
        self.duration.map(|ticks| self.ticks_to_ms(ticks.round() as i64))
    }
}
