//! Fixture builders for lavastream-player integration tests
//!
//! Every container is synthesised byte by byte, so the tests need no media
//! files on disk and each fixture's layout is visible next to its use.
//!
//! - MP3: constant-bitrate MPEG-1 layer III frame streams
//! - MP4: ftyp/moov/mdat trees with AAC and video tracks
//! - Matroska: EBML trees with Opus/AAC tracks and clusters
//! - ADTS: raw AAC frame streams
//! - WAV: written with `hound`

#![allow(dead_code)]

use lavastream_player::playback::{ConsumeMode, TrackEvent, TrackExecutor};
use lavastream_player::format::AudioFrame;
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::broadcast;

// ========================================
// MP3
// ========================================

/// MPEG-1 layer III, 128 kbps, 44.1 kHz, stereo, no padding
pub const MP3_FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];

/// Bytes in one frame with [`MP3_FRAME_HEADER`]
pub const MP3_FRAME_SIZE: usize = 417;

/// Samples per channel in one layer III frame
pub const MP3_FRAME_SAMPLES: u64 = 1152;

/// Frame count covering at least `duration_ms`
pub fn mp3_frames_for(duration_ms: u64) -> usize {
    ((duration_ms * 44_100 + MP3_FRAME_SAMPLES * 1000 - 1) / (MP3_FRAME_SAMPLES * 1000)) as usize
}

/// A headerless CBR stream lasting at least `duration_ms`
pub fn mp3_stream(duration_ms: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    for _ in 0..mp3_frames_for(duration_ms) {
        bytes.extend_from_slice(&MP3_FRAME_HEADER);
        bytes.extend_from_slice(&[0u8; MP3_FRAME_SIZE - 4]);
    }
    bytes
}

// ========================================
// MP4
// ========================================

pub fn mp4_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

pub fn mp4_full_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut payload = vec![0u8; 4];
    payload.extend_from_slice(body);
    mp4_box(kind, &payload)
}

/// Elementary stream descriptor carrying AAC-LC 44.1 kHz stereo config
fn esds() -> Vec<u8> {
    let mut decoder_config = vec![0x40, 0x15, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    decoder_config.extend_from_slice(&[0x05, 2, 0x12, 0x10]);
    let mut es = vec![0, 1, 0, 0x04, 13];
    es.extend_from_slice(&decoder_config);
    let mut body = vec![0x03, es.len() as u8];
    body.extend_from_slice(&es);
    mp4_full_box(b"esds", &body)
}

fn mp4a_entry() -> Vec<u8> {
    let mut body = vec![0u8; 28];
    body[16..18].copy_from_slice(&2u16.to_be_bytes());
    body[24..28].copy_from_slice(&(44_100u32 << 16).to_be_bytes());
    body.extend_from_slice(&esds());
    mp4_box(b"mp4a", &body)
}

/// One track whose samples all sit in a single chunk at `sample_offset`
fn trak(id: u32, handler: &[u8; 4], entry: Vec<u8>, sample_offset: u32, sizes: &[u32]) -> Vec<u8> {
    let mut tkhd = vec![0u8; 80];
    tkhd[8..12].copy_from_slice(&id.to_be_bytes());

    let mut hdlr = vec![0u8; 4];
    hdlr.extend_from_slice(handler);
    hdlr.extend_from_slice(&[0u8; 13]);

    let mut mdhd = vec![0u8; 8];
    mdhd.extend_from_slice(&44_100u32.to_be_bytes());
    mdhd.extend_from_slice(&(1024 * sizes.len() as u32).to_be_bytes());
    mdhd.extend_from_slice(&[0u8; 4]);

    let mut stsd = 1u32.to_be_bytes().to_vec();
    stsd.extend_from_slice(&entry);

    let mut stts = 1u32.to_be_bytes().to_vec();
    stts.extend_from_slice(&(sizes.len() as u32).to_be_bytes());
    stts.extend_from_slice(&1024u32.to_be_bytes());

    let mut stsc = 1u32.to_be_bytes().to_vec();
    for v in [1u32, sizes.len() as u32, 1] {
        stsc.extend_from_slice(&v.to_be_bytes());
    }

    let mut stsz = 0u32.to_be_bytes().to_vec();
    stsz.extend_from_slice(&(sizes.len() as u32).to_be_bytes());
    for size in sizes {
        stsz.extend_from_slice(&size.to_be_bytes());
    }

    let mut stco = 1u32.to_be_bytes().to_vec();
    stco.extend_from_slice(&sample_offset.to_be_bytes());

    let stbl = [
        mp4_full_box(b"stsd", &stsd),
        mp4_full_box(b"stts", &stts),
        mp4_full_box(b"stsc", &stsc),
        mp4_full_box(b"stsz", &stsz),
        mp4_full_box(b"stco", &stco),
    ]
    .concat();
    let mdia = [
        mp4_full_box(b"mdhd", &mdhd),
        mp4_full_box(b"hdlr", &hdlr),
        mp4_box(b"minf", &mp4_box(b"stbl", &stbl)),
    ]
    .concat();

    mp4_box(b"trak", &[mp4_full_box(b"tkhd", &tkhd), mp4_box(b"mdia", &mdia)].concat())
}

/// A video track, plus an AAC track of ten 4-byte samples when
/// `with_audio` is set
pub fn mp4_file(with_audio: bool) -> Vec<u8> {
    let ftyp = mp4_box(b"ftyp", b"M4A \0\0\0\0isom");
    let samples: Vec<u8> = (0..40u8).collect();
    let sizes = [4u32; 10];

    let moov = |offset: u32| {
        let mut tracks = trak(1, b"vide", mp4_box(b"avc1", &[0u8; 16]), offset, &[8]);
        if with_audio {
            tracks.extend(trak(2, b"soun", mp4a_entry(), offset, &sizes));
        }
        mp4_box(b"moov", &tracks)
    };
    let data_offset = (ftyp.len() + moov(0).len() + 8) as u32;

    [ftyp, moov(data_offset), mp4_box(b"mdat", &samples)].concat()
}

// ========================================
// Matroska
// ========================================

pub mod ebml_ids {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const SEGMENT: u32 = 0x1853_8067;
    pub const INFO: u32 = 0x1549_A966;
    pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
    pub const DURATION: u32 = 0x4489;
    pub const TITLE: u32 = 0x7BA9;
    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const CODEC_ID: u32 = 0x86;
    pub const CODEC_PRIVATE: u32 = 0x63A2;
    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const CHANNELS: u32 = 0x9F;
    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const TIMECODE: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
}

pub fn ebml_element(id: u32, body: &[u8]) -> Vec<u8> {
    let id_bytes = id.to_be_bytes();
    let skip = id_bytes.iter().take_while(|b| **b == 0).count();
    let mut out = id_bytes[skip..].to_vec();
    if body.len() < 127 {
        out.push(0x80 | body.len() as u8);
    } else {
        out.push(0x01);
        out.extend_from_slice(&(body.len() as u64).to_be_bytes()[1..]);
    }
    out.extend_from_slice(body);
    out
}

fn ebml_uint(id: u32, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    ebml_element(id, &bytes[skip..])
}

fn ebml_float(id: u32, value: f64) -> Vec<u8> {
    ebml_element(id, &value.to_bits().to_be_bytes())
}

pub fn ebml_header() -> Vec<u8> {
    ebml_element(ebml_ids::EBML, &ebml_element(ebml_ids::DOC_TYPE, b"webm"))
}

/// Segment info: millisecond timecodes, 2 s duration, title "Clip"
pub fn matroska_info() -> Vec<u8> {
    ebml_element(
        ebml_ids::INFO,
        &[
            ebml_uint(ebml_ids::TIMECODE_SCALE, 1_000_000),
            ebml_float(ebml_ids::DURATION, 2000.0),
            ebml_element(ebml_ids::TITLE, b"Clip"),
        ]
        .concat(),
    )
}

fn matroska_audio_track(number: u64, codec: &str, private: &[u8], rate: f64) -> Vec<u8> {
    let audio = [
        ebml_float(ebml_ids::SAMPLING_FREQUENCY, rate),
        ebml_uint(ebml_ids::CHANNELS, 2),
    ]
    .concat();
    let entry = [
        ebml_uint(ebml_ids::TRACK_NUMBER, number),
        ebml_uint(ebml_ids::TRACK_TYPE, 2),
        ebml_element(ebml_ids::CODEC_ID, codec.as_bytes()),
        ebml_element(ebml_ids::CODEC_PRIVATE, private),
        ebml_element(ebml_ids::AUDIO, &audio),
    ]
    .concat();
    ebml_element(ebml_ids::TRACK_ENTRY, &entry)
}

fn simple_block(track: u8, timecode: i16, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0x80 | track];
    body.extend_from_slice(&timecode.to_be_bytes());
    body.push(0x80);
    body.extend_from_slice(payload);
    ebml_element(ebml_ids::SIMPLE_BLOCK, &body)
}

/// WebM with an AAC track (1) and an Opus track (2), one cluster
pub fn matroska_file() -> Vec<u8> {
    let tracks = ebml_element(
        ebml_ids::TRACKS,
        &[
            matroska_audio_track(1, "A_AAC", &[0x12, 0x10], 44_100.0),
            matroska_audio_track(2, "A_OPUS", b"OpusHead\x01\x02", 48_000.0),
        ]
        .concat(),
    );
    let cluster = ebml_element(
        ebml_ids::CLUSTER,
        &[
            ebml_uint(ebml_ids::TIMECODE, 0),
            simple_block(2, 0, &[0xFC, 0xFF, 0xFE]),
            simple_block(2, 20, &[0xFC, 0xFF, 0xFE]),
        ]
        .concat(),
    );
    let segment = [matroska_info(), tracks, cluster].concat();
    [ebml_header(), ebml_element(ebml_ids::SEGMENT, &segment)].concat()
}

/// EBML header followed by a segment declaring 4096 bytes with only the
/// info element behind it
pub fn truncated_matroska_file() -> Vec<u8> {
    let mut bytes = ebml_header();
    bytes.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0x01, 0, 0, 0, 0, 0, 0x10, 0x00]);
    bytes.extend_from_slice(&matroska_info());
    bytes
}

// ========================================
// ADTS
// ========================================

/// AAC-LC, 44.1 kHz stereo frame with `payload` and no CRC
pub fn adts_frame(payload: &[u8]) -> Vec<u8> {
    let length = payload.len() + 7;
    let mut out = vec![
        0xFF,
        0xF1,
        (1 << 6) | (4 << 2),
        (2 << 6) | ((length >> 11) as u8 & 0x03),
        (length >> 3) as u8,
        ((length & 0x07) << 5) as u8 | 0x1F,
        0xFC,
    ];
    out.extend_from_slice(payload);
    out
}

pub fn adts_stream(frames: usize) -> Vec<u8> {
    (0..frames).flat_map(|i| adts_frame(&[i as u8; 64])).collect()
}

// ========================================
// WAV
// ========================================

/// 16-bit PCM sawtooth, `duration_ms` long
pub fn wav_bytes(sample_rate: u32, channels: u16, duration_ms: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let frames = sample_rate as u64 * duration_ms as u64 / 1000;
        for i in 0..frames {
            for _ in 0..channels {
                writer.write_sample(((i % 200) as i16 - 100) * 100).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Writes [`wav_bytes`] to a temporary `.wav` file
pub fn wav_file(sample_rate: u32, channels: u16, duration_ms: u32) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
    std::io::Write::write_all(&mut file, &wav_bytes(sample_rate, channels, duration_ms)).unwrap();
    file
}

// ========================================
// Playback
// ========================================

/// Consumes frames until the executor's buffer reports its end
pub fn drain_frames(executor: &TrackExecutor) -> Vec<AudioFrame> {
    let mut frames = Vec::new();
    while let Some(frame) = executor.provide(ConsumeMode::Timeout(Duration::from_secs(5))) {
        frames.push(frame);
    }
    frames
}

/// Events received so far, without waiting
pub fn received_events(receiver: &mut broadcast::Receiver<TrackEvent>) -> Vec<TrackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
