//! ISO base media box parsing for the movie header (`moov`)

use crate::container::bytes::{be16, be32, be64};
use crate::error::{Error, Result};

pub type FourCc = [u8; 4];

/// Iterates the child boxes of an in-memory box body
pub fn children(mut data: &[u8]) -> Result<Vec<(FourCc, &[u8])>> {
    let mut boxes = Vec::new();
    while data.len() >= 8 {
        let declared = be32(data, 0).unwrap_or(0) as u64;
        let mut kind = [0u8; 4];
        kind.copy_from_slice(&data[4..8]);

        let (header, size) = match declared {
            0 => (8, data.len() as u64),
            1 => {
                let large = be64(data, 8)
                    .ok_or_else(|| Error::container("Truncated MP4 box header"))?;
                (16, large)
            }
            n => (8, n),
        };

        if size < header as u64 || size > data.len() as u64 {
            return Err(Error::container(format!(
                "MP4 box {} declares {} bytes but {} remain",
                String::from_utf8_lossy(&kind),
                size,
                data.len()
            )));
        }

        boxes.push((kind, &data[header..size as usize]));
        data = &data[size as usize..];
    }
    Ok(boxes)
}

fn child<'a>(data: &'a [u8], kind: &FourCc) -> Result<Option<&'a [u8]>> {
    Ok(children(data)?
        .into_iter()
        .find(|(k, _)| k == kind)
        .map(|(_, body)| body))
}

fn truncated(what: &str) -> Error {
    Error::container(format!("Truncated MP4 {} box", what))
}

/// Most samples a fixed-size `stsz` may declare, the same number a
/// per-sample table fits in the largest accepted movie header
const MAX_FIXED_SIZE_SAMPLES: u64 = 16 * 1024 * 1024;

/// Reads a table entry count, rejecting counts the box body cannot hold
fn entry_count(body: &[u8], at: usize, entry_size: usize, what: &str) -> Result<usize> {
    let count = be32(body, at).ok_or_else(|| truncated(what))? as usize;
    let available = body.len().saturating_sub(at + 4) / entry_size;
    if count > available {
        return Err(Error::container(format!(
            "MP4 {} box declares {} entries but holds {}",
            what, count, available
        )));
    }
    Ok(count)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub offset: u64,
    pub size: u32,
    /// Decode time in the track's timescale
    pub time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mp4Track {
    pub id: u32,
    pub handler: FourCc,
    pub timescale: u32,
    pub duration: u64,
    pub sample_entry: Option<FourCc>,
    pub channels: u16,
    pub sample_rate: u32,
    /// MPEG-4 object type from the decoder config (0x40 = AAC)
    pub object_type: Option<u8>,
    pub decoder_specific: Option<Vec<u8>>,
    pub samples: Vec<Sample>,
}

impl Mp4Track {
    pub fn is_audio(&self) -> bool {
        &self.handler == b"soun"
    }

    pub fn is_aac(&self) -> bool {
        self.is_audio()
            && self.sample_entry.as_ref() == Some(b"mp4a")
            && self.object_type == Some(0x40)
            && self.decoder_specific.is_some()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        (self.timescale > 0)
            .then(|| (self.duration.saturating_mul(1000) / self.timescale as u64) as i64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mp4Movie {
    pub tracks: Vec<Mp4Track>,
    pub fragmented: bool,
    pub title: Option<String>,
    pub artist: Option<String>,
}

/// Parses the body of a `moov` box
pub fn parse_movie(moov: &[u8]) -> Result<Mp4Movie> {
    let mut movie = Mp4Movie::default();
    for (kind, body) in children(moov)? {
        match &kind {
            b"trak" => movie.tracks.push(parse_track(body)?),
            b"mvex" => movie.fragmented = true,
            b"udta" => parse_user_data(body, &mut movie)?,
            _ => {}
        }
    }
    Ok(movie)
}

fn parse_track(trak: &[u8]) -> Result<Mp4Track> {
    let mut track = Mp4Track::default();

    if let Some(tkhd) = child(trak, b"tkhd")? {
        let version = *tkhd.first().ok_or_else(|| truncated("tkhd"))?;
        let at = if version == 1 { 20 } else { 12 };
        track.id = be32(tkhd, at).ok_or_else(|| truncated("tkhd"))?;
    }

    let Some(mdia) = child(trak, b"mdia")? else {
        return Ok(track);
    };

    if let Some(hdlr) = child(mdia, b"hdlr")? {
        let handler = hdlr.get(8..12).ok_or_else(|| truncated("hdlr"))?;
        track.handler.copy_from_slice(handler);
    }

    if let Some(mdhd) = child(mdia, b"mdhd")? {
        let version = *mdhd.first().ok_or_else(|| truncated("mdhd"))?;
        if version == 1 {
            track.timescale = be32(mdhd, 20).ok_or_else(|| truncated("mdhd"))?;
            track.duration = be64(mdhd, 24).ok_or_else(|| truncated("mdhd"))?;
        } else {
            track.timescale = be32(mdhd, 12).ok_or_else(|| truncated("mdhd"))?;
            track.duration = be32(mdhd, 16).ok_or_else(|| truncated("mdhd"))? as u64;
        }
    }

    let stbl = match child(mdia, b"minf")? {
        Some(minf) => child(minf, b"stbl")?,
        None => None,
    };
    if let Some(stbl) = stbl {
        parse_sample_table(stbl, &mut track)?;
    }
    Ok(track)
}

fn parse_sample_table(stbl: &[u8], track: &mut Mp4Track) -> Result<()> {
    if let Some(stsd) = child(stbl, b"stsd")? {
        parse_sample_description(stsd, track)?;
    }

    let time_to_sample = match child(stbl, b"stts")? {
        Some(stts) => read_pairs(stts, "stts")?,
        None => return Ok(()),
    };
    let sample_to_chunk = match child(stbl, b"stsc")? {
        Some(stsc) => read_triples(stsc)?,
        None => return Ok(()),
    };
    let timed_samples = time_to_sample
        .iter()
        .map(|&(count, _)| count as u64)
        .sum::<u64>();
    let sizes = match child(stbl, b"stsz")? {
        Some(stsz) => read_sizes(stsz, timed_samples)?,
        None => return Ok(()),
    };
    let chunk_offsets = match (child(stbl, b"stco")?, child(stbl, b"co64")?) {
        (Some(stco), _) => read_offsets(stco, false)?,
        (None, Some(co64)) => read_offsets(co64, true)?,
        (None, None) => return Ok(()),
    };

    let mut samples = Vec::with_capacity(sizes.len());
    let mut sample_index = 0usize;
    for (i, &(first_chunk, per_chunk, _)) in sample_to_chunk.iter().enumerate() {
        let next_first = sample_to_chunk
            .get(i + 1)
            .map(|e| e.0)
            .unwrap_or(chunk_offsets.len() as u32 + 1);
        for chunk in first_chunk..next_first {
            let Some(&chunk_offset) = chunk_offsets.get(chunk.saturating_sub(1) as usize) else {
                return Err(Error::container("MP4 sample-to-chunk entry references a missing chunk"));
            };
            let mut offset = chunk_offset;
            for _ in 0..per_chunk {
                let Some(&size) = sizes.get(sample_index) else {
                    break;
                };
                samples.push(Sample { offset, size, time: 0 });
                offset = offset
                    .checked_add(size as u64)
                    .ok_or_else(|| Error::container("MP4 sample offsets overflow"))?;
                sample_index += 1;
            }
        }
    }

    let mut time = 0u64;
    let mut iter = samples.iter_mut();
    'outer: for &(count, delta) in &time_to_sample {
        for _ in 0..count {
            let Some(sample) = iter.next() else {
                break 'outer;
            };
            sample.time = time;
            time = time
                .checked_add(delta as u64)
                .ok_or_else(|| Error::container("MP4 sample times overflow"))?;
        }
    }

    if track.duration == 0 {
        track.duration = time;
    }
    track.samples = samples;
    Ok(())
}

fn parse_sample_description(stsd: &[u8], track: &mut Mp4Track) -> Result<()> {
    let entries = stsd.get(8..).ok_or_else(|| truncated("stsd"))?;
    let Some((kind, entry)) = children(entries)?.into_iter().next() else {
        return Ok(());
    };
    track.sample_entry = Some(kind);

    if &kind != b"mp4a" {
        return Ok(());
    }

    // 6 reserved + 2 data reference index, then the sound description
    let version = be16(entry, 8).ok_or_else(|| truncated("mp4a"))?;
    track.channels = be16(entry, 16).ok_or_else(|| truncated("mp4a"))?;
    track.sample_rate = be32(entry, 24).ok_or_else(|| truncated("mp4a"))? >> 16;

    let extension = match version {
        1 => 16,
        2 => 36,
        _ => 0,
    };
    let boxes = entry.get(28 + extension..).ok_or_else(|| truncated("mp4a"))?;

    let mut esds = child(boxes, b"esds")?;
    if esds.is_none() {
        if let Some(wave) = child(boxes, b"wave")? {
            esds = child(wave, b"esds")?;
        }
    }
    if let Some(esds) = esds {
        parse_es_descriptor(esds.get(4..).unwrap_or_default(), track);
    }
    Ok(())
}

/// Reads an expandable descriptor length
fn descriptor_length(data: &[u8], at: &mut usize) -> Option<usize> {
    let mut length = 0usize;
    for _ in 0..4 {
        let b = *data.get(*at)?;
        *at += 1;
        length = (length << 7) | (b & 0x7F) as usize;
        if b & 0x80 == 0 {
            break;
        }
    }
    Some(length)
}

fn parse_es_descriptor(data: &[u8], track: &mut Mp4Track) {
    let mut at = 0usize;
    while at < data.len() {
        let tag = data[at];
        at += 1;
        let Some(length) = descriptor_length(data, &mut at) else {
            return;
        };

        match tag {
            0x03 => {
                // ES_ID then flags, with optional fields behind them
                let Some(&flags) = data.get(at + 2) else { return };
                at += 3;
                if flags & 0x80 != 0 {
                    at += 2;
                }
                if flags & 0x40 != 0 {
                    at += 1 + data.get(at).copied().unwrap_or(0) as usize;
                }
                if flags & 0x20 != 0 {
                    at += 2;
                }
            }
            0x04 => {
                track.object_type = data.get(at).copied();
                at += 13;
            }
            0x05 => {
                track.decoder_specific = data.get(at..at + length).map(<[u8]>::to_vec);
                return;
            }
            _ => at += length,
        }
    }
}

fn read_pairs(body: &[u8], what: &str) -> Result<Vec<(u32, u32)>> {
    let count = entry_count(body, 4, 8, what)?;
    (0..count)
        .map(|i| {
            let at = 8 + i * 8;
            Ok((
                be32(body, at).ok_or_else(|| truncated(what))?,
                be32(body, at + 4).ok_or_else(|| truncated(what))?,
            ))
        })
        .collect()
}

fn read_triples(body: &[u8]) -> Result<Vec<(u32, u32, u32)>> {
    let count = entry_count(body, 4, 12, "stsc")?;
    (0..count)
        .map(|i| {
            let at = 8 + i * 12;
            Ok((
                be32(body, at).ok_or_else(|| truncated("stsc"))?,
                be32(body, at + 4).ok_or_else(|| truncated("stsc"))?,
                be32(body, at + 8).ok_or_else(|| truncated("stsc"))?,
            ))
        })
        .collect()
}

/// Sample sizes; a fixed-size table may not describe more samples than the
/// time-to-sample table does
fn read_sizes(body: &[u8], timed_samples: u64) -> Result<Vec<u32>> {
    let fixed = be32(body, 4).ok_or_else(|| truncated("stsz"))?;
    if fixed != 0 {
        let count = be32(body, 8).ok_or_else(|| truncated("stsz"))? as u64;
        if count > timed_samples || count > MAX_FIXED_SIZE_SAMPLES {
            return Err(Error::container(format!(
                "MP4 stsz declares {} samples but stts times {}",
                count, timed_samples
            )));
        }
        return Ok(vec![fixed; count as usize]);
    }
    let count = entry_count(body, 8, 4, "stsz")?;
    (0..count)
        .map(|i| be32(body, 12 + i * 4).ok_or_else(|| truncated("stsz")))
        .collect()
}

fn read_offsets(body: &[u8], wide: bool) -> Result<Vec<u64>> {
    let count = if wide {
        entry_count(body, 4, 8, "co64")?
    } else {
        entry_count(body, 4, 4, "stco")?
    };
    (0..count)
        .map(|i| {
            if wide {
                be64(body, 8 + i * 8).ok_or_else(|| truncated("co64"))
            } else {
                be32(body, 8 + i * 4)
                    .map(u64::from)
                    .ok_or_else(|| truncated("stco"))
            }
        })
        .collect()
}

fn parse_user_data(udta: &[u8], movie: &mut Mp4Movie) -> Result<()> {
    let Some(meta) = child(udta, b"meta")? else {
        return Ok(());
    };
    // ISO meta is a full box; QuickTime meta starts with children directly
    let meta = if meta.get(4..8) == Some(b"hdlr".as_slice()) {
        meta
    } else {
        meta.get(4..).unwrap_or_default()
    };

    let Some(ilst) = child(meta, b"ilst")? else {
        return Ok(());
    };
    for (kind, item) in children(ilst)? {
        let value = child(item, b"data")?
            .and_then(|data| data.get(8..))
            .map(|text| String::from_utf8_lossy(text).trim().to_string())
            .filter(|text| !text.is_empty());
        match &kind {
            [0xA9, b'n', b'a', b'm'] => movie.title = value,
            [0xA9, b'A', b'R', b'T'] => movie.artist = value,
            _ => {}
        }
    }
    Ok(())
}
