//! MPEG transport streams carrying one ADTS audio stream
//!
//! [`TsElementaryReader`] follows PAT and PMT to the audio PID,
//! [`PesPacketReader`] strips PES headers from its payloads, and the result
//! is read as a plain ADTS stream.

use super::adts::{AdtsDemuxer, AdtsStreamReader};
use super::detection::{DetectionResult, STREAM_SCAN_DISTANCE};
use super::{ContainerProbe, Demuxer, MediaContainerHints};
use crate::error::Result;
use crate::io::{SeekableInput, HEAD_MARK_LIMIT};
use lavastream_common::TrackInfo;
use std::io::{self, Read};
use tracing::{debug, trace};

pub const PROBE_NAME: &str = "mpegts-adts";

pub const PACKET_SIZE: usize = 188;
const SYNC_BYTE: u8 = 0x47;
const PAT_PID: u16 = 0;

/// PMT stream type of ADTS-framed AAC
pub const ADTS_STREAM_TYPE: u8 = 0x0F;

/// Packets examined by the probe on inputs that can seek back freely
const PROBE_PACKET_LIMIT: usize = 64;

/// Transport packet reader yielding the payloads of one elementary stream
pub struct TsElementaryReader<R> {
    input: R,
    stream_type: u8,
    pmt_pid: Option<u16>,
    elementary_pid: Option<u16>,
    packet: [u8; PACKET_SIZE],
    packet_limit: Option<usize>,
    packets_read: usize,
}

impl<R: Read> TsElementaryReader<R> {
    pub fn new(input: R, stream_type: u8) -> Self {
        Self {
            input,
            stream_type,
            pmt_pid: None,
            elementary_pid: None,
            packet: [0; PACKET_SIZE],
            packet_limit: None,
            packets_read: 0,
        }
    }

    /// Stops reading after `limit` packets, as if the stream ended
    pub fn with_packet_limit(mut self, limit: usize) -> Self {
        self.packet_limit = Some(limit);
        self
    }

    pub fn elementary_pid(&self) -> Option<u16> {
        self.elementary_pid
    }

    fn read_packet(&mut self) -> io::Result<bool> {
        if self.packet_limit.is_some_and(|limit| self.packets_read >= limit) {
            return Ok(false);
        }

        // resynchronise on the next sync byte
        let mut skipped = 0usize;
        loop {
            let mut first = [0u8; 1];
            match self.input.read_exact(&mut first) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
                Err(e) => return Err(e),
            }
            if first[0] == SYNC_BYTE {
                break;
            }
            skipped += 1;
        }
        if skipped > 0 {
            trace!("Skipped {} bytes to regain transport stream sync", skipped);
        }

        self.packet[0] = SYNC_BYTE;
        match self.input.read_exact(&mut self.packet[1..]) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e),
        }
        self.packets_read += 1;
        Ok(true)
    }

    /// Next payload of the selected stream, with its unit start flag
    pub fn next_payload(&mut self) -> io::Result<Option<(bool, Vec<u8>)>> {
        loop {
            if !self.read_packet()? {
                return Ok(None);
            }

            let unit_start = self.packet[1] & 0x40 != 0;
            let pid = u16::from_be_bytes([self.packet[1] & 0x1F, self.packet[2]]);
            let adaptation = (self.packet[3] >> 4) & 0x03;
            if adaptation & 0x01 == 0 {
                continue;
            }
            let mut start = 4;
            if adaptation & 0x02 != 0 {
                start += 1 + self.packet[4] as usize;
            }
            if start >= PACKET_SIZE {
                continue;
            }

            if pid == PAT_PID {
                if let Some(pmt_pid) = parse_pat(&self.packet[start..], unit_start) {
                    self.pmt_pid = Some(pmt_pid);
                }
            } else if Some(pid) == self.pmt_pid {
                if let Some(pid) = parse_pmt(&self.packet[start..], unit_start, self.stream_type) {
                    if self.elementary_pid != Some(pid) {
                        debug!("Transport stream elementary PID {:#x}", pid);
                    }
                    self.elementary_pid = Some(pid);
                }
            } else if Some(pid) == self.elementary_pid {
                return Ok(Some((unit_start, self.packet[start..].to_vec())));
            }
        }
    }
}

/// Table body of a PSI section starting in this payload, without the CRC
fn psi_section(payload: &[u8], unit_start: bool) -> Option<&[u8]> {
    if !unit_start {
        return None;
    }
    let pointer = *payload.first()? as usize;
    let section = payload.get(1 + pointer..)?;
    let length = (((section.get(1)? & 0x0F) as usize) << 8) | *section.get(2)? as usize;
    section.get(3..3 + length.checked_sub(4)?)
}

/// PID of the first program's map table
fn parse_pat(payload: &[u8], unit_start: bool) -> Option<u16> {
    let body = psi_section(payload, unit_start)?;
    body.get(5..)?.chunks_exact(4).find_map(|entry| {
        let program = u16::from_be_bytes([entry[0], entry[1]]);
        (program != 0).then(|| u16::from_be_bytes([entry[2] & 0x1F, entry[3]]))
    })
}

/// PID of the first stream of `stream_type` in a program map table
fn parse_pmt(payload: &[u8], unit_start: bool, stream_type: u8) -> Option<u16> {
    let body = psi_section(payload, unit_start)?;
    let info_length = (((body.get(7)? & 0x0F) as usize) << 8) | *body.get(8)? as usize;
    let mut at = 9 + info_length;
    while at + 5 <= body.len() {
        let kind = body[at];
        let pid = u16::from_be_bytes([body[at + 1] & 0x1F, body[at + 2]]);
        let es_info_length = (((body[at + 3] & 0x0F) as usize) << 8) | body[at + 4] as usize;
        if kind == stream_type {
            return Some(pid);
        }
        at += 5 + es_info_length;
    }
    None
}

/// Offset of the elementary data in a payload that starts a PES packet
fn pes_payload_offset(payload: &[u8]) -> Option<usize> {
    if payload.get(0..3)? != [0x00, 0x00, 0x01] {
        return None;
    }
    let offset = match *payload.get(3)? {
        // streams without the optional PES header
        0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xFF => 6,
        _ => 9 + *payload.get(8)? as usize,
    };
    (offset <= payload.len()).then_some(offset)
}

/// Elementary stream bytes with PES headers removed
pub struct PesPacketReader<R> {
    ts: TsElementaryReader<R>,
    buffer: Vec<u8>,
    offset: usize,
    in_packet: bool,
}

impl<R: Read> PesPacketReader<R> {
    pub fn new(ts: TsElementaryReader<R>) -> Self {
        Self {
            ts,
            buffer: Vec::new(),
            offset: 0,
            in_packet: false,
        }
    }
}

impl<R: Read> Read for PesPacketReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.offset >= self.buffer.len() {
            let Some((unit_start, payload)) = self.ts.next_payload()? else {
                return Ok(0);
            };
            if unit_start {
                match pes_payload_offset(&payload) {
                    Some(offset) => {
                        self.buffer = payload;
                        self.offset = offset;
                        self.in_packet = true;
                    }
                    None => {
                        debug!("Dropping transport payload without a PES header");
                        self.in_packet = false;
                    }
                }
            } else if self.in_packet {
                self.buffer = payload;
                self.offset = 0;
            }
        }

        let count = buf.len().min(self.buffer.len() - self.offset);
        buf[..count].copy_from_slice(&self.buffer[self.offset..self.offset + count]);
        self.offset += count;
        Ok(count)
    }
}

pub type MpegTsAdtsDemuxer<R> = AdtsDemuxer<PesPacketReader<R>>;

pub struct MpegTsAdtsProbe;

impl ContainerProbe for MpegTsAdtsProbe {
    fn name(&self) -> &'static str {
        PROBE_NAME
    }

    fn matches_hints(&self, hints: &MediaContainerHints) -> bool {
        hints
            .file_extension
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case("ts"))
    }

    fn probe(&self, identifier: &str, input: &mut dyn SeekableInput) -> Result<Option<DetectionResult>> {
        if !super::check_next_bytes(input, &[Some(SYNC_BYTE)])? {
            return Ok(None);
        }

        // forward-only inputs can only be rewound within the saved head
        let limit = if input.can_seek_hard() {
            PROBE_PACKET_LIMIT
        } else {
            HEAD_MARK_LIMIT / PACKET_SIZE
        };
        let ts = TsElementaryReader::new(&mut *input, ADTS_STREAM_TYPE).with_packet_limit(limit);
        let mut reader = AdtsStreamReader::new(PesPacketReader::new(ts));
        if reader.find_header(STREAM_SCAN_DISTANCE)?.is_none() {
            return Ok(None);
        }

        debug!(track = %identifier, "Track is an MPEG-TS stream with an ADTS track");
        let info = TrackInfo::builder(identifier).is_stream(true).build();
        Ok(Some(DetectionResult::supported(PROBE_NAME, None, info)))
    }

    fn create_demuxer(&self, _parameters: Option<&str>, input: Box<dyn SeekableInput>) -> Result<Box<dyn Demuxer>> {
        let ts = TsElementaryReader::new(input, ADTS_STREAM_TYPE);
        let mut demuxer: MpegTsAdtsDemuxer<_> = AdtsDemuxer::new(PesPacketReader::new(ts));
        demuxer.parse_headers()?;
        Ok(Box::new(demuxer))
    }
}
