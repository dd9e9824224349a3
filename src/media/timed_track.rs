//! QuickTime timed-metadata tracks.
//!
//! `ffmpeg` cannot author `mebx` metadata tracks, so markers are added to a finished movie by
//! rewriting its `moov` box: the existing media data stays where it is, each marker sample goes
//! into a small trailing `mdat`, and the rebuilt `moov` (with one extra `trak` per marker) is
//! written last.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write as _};
use std::path::Path;

use crate::foundation::error::{AssetError, AssetResult};
use crate::media::metadata::{KEY_SPACE_MDTA, MetadataKey, TimedMetadata};

/// Local key id of the single key declared by a marker track.
const LOCAL_KEY_ID: u32 = 1;
/// Well-known data type of a signed 8-bit integer.
const DATA_TYPE_INT8: u32 = 65;
/// ISO-639-2/T `und`, packed.
const LANGUAGE_UND: u16 = 0x55C4;
const FIXED_ONE: u32 = 0x0001_0000;
/// Marker samples last one movie tick.
const MARKER_TICKS: u32 = 1;

fn malformed(msg: impl std::fmt::Display) -> AssetError {
    AssetError::metadata(format!("malformed movie: {msg}"))
}

fn fourcc(typ: &[u8; 4]) -> String {
    String::from_utf8_lossy(typ).into_owned()
}

fn read_u32(bytes: &[u8], at: usize) -> AssetResult<u32> {
    bytes
        .get(at..at + 4)
        .and_then(|s| <[u8; 4]>::try_from(s).ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| malformed("truncated field"))
}

fn read_u64(bytes: &[u8], at: usize) -> AssetResult<u64> {
    bytes
        .get(at..at + 8)
        .and_then(|s| <[u8; 8]>::try_from(s).ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| malformed("truncated field"))
}

/// One box inside an in-memory buffer.
#[derive(Clone, Copy, Debug)]
struct BoxRef {
    typ: [u8; 4],
    start: usize,
    header: usize,
    end: usize,
}

impl BoxRef {
    fn raw<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        bytes.get(self.start..self.end).unwrap_or_default()
    }

    fn payload<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        bytes
            .get(self.start + self.header..self.end)
            .unwrap_or_default()
    }
}

fn parse_boxes(bytes: &[u8]) -> AssetResult<Vec<BoxRef>> {
    let mut boxes = Vec::new();
    let mut at = 0usize;
    while at < bytes.len() {
        let size32 = read_u32(bytes, at)?;
        let typ: [u8; 4] = bytes
            .get(at + 4..at + 8)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| malformed("truncated box header"))?;
        let (size, header) = match size32 {
            0 => ((bytes.len() - at) as u64, 8),
            1 => (read_u64(bytes, at + 8)?, 16),
            n => (u64::from(n), 8),
        };
        let end = usize::try_from(size)
            .ok()
            .filter(|s| *s >= header)
            .and_then(|s| at.checked_add(s))
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| malformed(format!("box '{}' overruns its parent", fourcc(&typ))))?;
        boxes.push(BoxRef {
            typ,
            start: at,
            header,
            end,
        });
        at = end;
    }
    Ok(boxes)
}

fn child<'a>(bytes: &'a [u8], typ: &[u8; 4]) -> AssetResult<Option<&'a [u8]>> {
    Ok(parse_boxes(bytes)?
        .into_iter()
        .find(|b| &b.typ == typ)
        .map(|b| b.payload(bytes)))
}

fn descend<'a>(mut bytes: &'a [u8], path: &[&[u8; 4]]) -> AssetResult<Option<&'a [u8]>> {
    for typ in path {
        match child(bytes, typ)? {
            Some(inner) => bytes = inner,
            None => return Ok(None),
        }
    }
    Ok(Some(bytes))
}

/// A top-level box of a file on disk.
#[derive(Clone, Copy, Debug)]
struct FileBox {
    typ: [u8; 4],
    start: u64,
    end: u64,
}

fn top_level_boxes(file: &mut File) -> AssetResult<Vec<FileBox>> {
    let len = file.metadata()?.len();
    let mut boxes = Vec::new();
    let mut at = 0u64;
    while at < len {
        file.seek(SeekFrom::Start(at))?;
        let mut head = [0u8; 8];
        file.read_exact(&mut head)
            .map_err(|_| malformed("truncated top-level box header"))?;
        let typ = [head[4], head[5], head[6], head[7]];
        let size = match u32::from_be_bytes([head[0], head[1], head[2], head[3]]) {
            0 => len - at,
            1 => {
                let mut large = [0u8; 8];
                file.read_exact(&mut large)
                    .map_err(|_| malformed("truncated 64-bit box size"))?;
                u64::from_be_bytes(large)
            }
            n => u64::from(n),
        };
        let end = at
            .checked_add(size)
            .filter(|end| size >= 8 && *end <= len)
            .ok_or_else(|| malformed(format!("box '{}' overruns the file", fourcc(&typ))))?;
        boxes.push(FileBox {
            typ,
            start: at,
            end,
        });
        at = end;
    }
    Ok(boxes)
}

fn read_range(file: &mut File, start: u64, len: u64) -> AssetResult<Vec<u8>> {
    let len = usize::try_from(len).map_err(|_| malformed("box too large to load"))?;
    let mut buf = vec![0u8; len];
    file.seek(SeekFrom::Start(start))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

struct MovieHeader {
    timescale: u32,
    next_track_id: u32,
    /// Offset of `next_track_id` inside the `mvhd` payload.
    next_track_id_at: usize,
}

fn movie_header(mvhd: &[u8]) -> AssetResult<MovieHeader> {
    let version = *mvhd.first().ok_or_else(|| malformed("empty 'mvhd'"))?;
    let (timescale_at, next_track_id_at) = if version == 1 { (20, 108) } else { (12, 96) };
    let timescale = read_u32(mvhd, timescale_at)?;
    if timescale == 0 {
        return Err(malformed("movie timescale is zero"));
    }
    Ok(MovieHeader {
        timescale,
        next_track_id: read_u32(mvhd, next_track_id_at)?,
        next_track_id_at,
    })
}

fn build_box(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let size = (8 + payload.len()) as u32;
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(typ);
    out.extend_from_slice(payload);
    out
}

/// Full box payload: version/flags word followed by big-endian `u32` fields.
fn full_box_u32s(version_flags: u32, fields: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + fields.len() * 4);
    out.extend_from_slice(&version_flags.to_be_bytes());
    for f in fields {
        out.extend_from_slice(&f.to_be_bytes());
    }
    out
}

/// One sample: a single value item keyed by [`LOCAL_KEY_ID`].
fn marker_sample(value: i8) -> Vec<u8> {
    build_box(&LOCAL_KEY_ID.to_be_bytes(), &value.to_be_bytes())
}

fn build_tkhd(track_id: u32, duration: u32) -> Vec<u8> {
    // enabled | in movie
    let mut p = full_box_u32s(0x0000_0003, &[0, 0, track_id, 0, duration, 0, 0]);
    // layer, alternate group, volume, reserved
    p.extend_from_slice(&[0u8; 8]);
    for m in [FIXED_ONE, 0, 0, 0, FIXED_ONE, 0, 0, 0, 0x4000_0000] {
        p.extend_from_slice(&m.to_be_bytes());
    }
    // width, height
    p.extend_from_slice(&[0u8; 8]);
    build_box(b"tkhd", &p)
}

fn build_edts(start: u32, duration: u32) -> Vec<u8> {
    let mut entries: Vec<u32> = Vec::new();
    if start > 0 {
        entries.extend([start, u32::MAX, FIXED_ONE]);
    }
    entries.extend([duration, 0, FIXED_ONE]);
    let count = (entries.len() / 3) as u32;
    let mut fields = vec![count];
    fields.extend(entries);
    build_box(b"edts", &build_box(b"elst", &full_box_u32s(0, &fields)))
}

fn build_mdhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut p = full_box_u32s(0, &[0, 0, timescale, duration]);
    p.extend_from_slice(&LANGUAGE_UND.to_be_bytes());
    p.extend_from_slice(&0u16.to_be_bytes());
    build_box(b"mdhd", &p)
}

fn build_hdlr() -> Vec<u8> {
    let mut p = Vec::with_capacity(25);
    p.extend_from_slice(&0u32.to_be_bytes());
    p.extend_from_slice(b"mhlr");
    p.extend_from_slice(b"meta");
    p.extend_from_slice(&[0u8; 12]);
    // empty counted name
    p.push(0);
    build_box(b"hdlr", &p)
}

fn build_gmhd() -> Vec<u8> {
    let mut gmin = 0u32.to_be_bytes().to_vec();
    // graphics mode (dither copy), op color
    for v in [0x0040u16, 0x8000, 0x8000, 0x8000, 0, 0] {
        gmin.extend_from_slice(&v.to_be_bytes());
    }
    build_box(b"gmhd", &build_box(b"gmin", &gmin))
}

fn build_dinf() -> Vec<u8> {
    // self-contained data reference
    let url = build_box(b"url ", &1u32.to_be_bytes());
    let mut dref = full_box_u32s(0, &[1]);
    dref.extend(url);
    build_box(b"dinf", &build_box(b"dref", &dref))
}

fn build_stsd(key: MetadataKey) -> Vec<u8> {
    let mut keyd = KEY_SPACE_MDTA.as_bytes().to_vec();
    keyd.extend_from_slice(key.wire_key().as_bytes());
    let dtyp = full_box_u32s(0, &[DATA_TYPE_INT8]);
    let key_entry = build_box(
        &LOCAL_KEY_ID.to_be_bytes(),
        &[build_box(b"keyd", &keyd), build_box(b"dtyp", &dtyp)].concat(),
    );

    // 6 reserved bytes, data reference index 1
    let mut mebx = vec![0u8; 6];
    mebx.extend_from_slice(&1u16.to_be_bytes());
    mebx.extend(build_box(b"keys", &key_entry));

    let mut stsd = full_box_u32s(0, &[1]);
    stsd.extend(build_box(b"mebx", &mebx));
    build_box(b"stsd", &stsd)
}

fn build_stbl(key: MetadataKey, chunk_offset: u32, sample_size: u32) -> Vec<u8> {
    let stbl = [
        build_stsd(key),
        build_box(b"stts", &full_box_u32s(0, &[1, 1, MARKER_TICKS])),
        build_box(b"stsc", &full_box_u32s(0, &[1, 1, 1, 1])),
        build_box(b"stsz", &full_box_u32s(0, &[0, 1, sample_size])),
        build_box(b"stco", &full_box_u32s(0, &[1, chunk_offset])),
    ]
    .concat();
    build_box(b"stbl", &stbl)
}

fn build_marker_trak(
    track_id: u32,
    timescale: u32,
    marker: &TimedMetadata,
    chunk_offset: u32,
    sample_size: u32,
) -> Vec<u8> {
    let start = (marker.pts.max(0.0) * f64::from(timescale)).round() as u32;
    let minf = [
        build_gmhd(),
        build_dinf(),
        build_stbl(marker.key, chunk_offset, sample_size),
    ]
    .concat();
    let mdia = [
        build_mdhd(timescale, MARKER_TICKS),
        build_hdlr(),
        build_box(b"minf", &minf),
    ]
    .concat();
    let trak = [
        build_tkhd(track_id, start.saturating_add(MARKER_TICKS)),
        build_edts(start, MARKER_TICKS),
        build_box(b"mdia", &mdia),
    ]
    .concat();
    build_box(b"trak", &trak)
}

/// Add one single-sample timed-metadata track per marker to the movie at `path`.
///
/// Every `mdat` must precede the `moov` box, which is how `ffmpeg` lays out a movie without
/// `faststart`; other layouts are rejected before the file is touched.
#[tracing::instrument(skip(markers), fields(path = %path.display(), markers = markers.len()))]
pub fn append_timed_metadata_tracks(path: &Path, markers: &[TimedMetadata]) -> AssetResult<()> {
    if markers.is_empty() {
        return Ok(());
    }
    let mut src = File::open(path)?;
    let len = src.metadata()?.len();
    let top = top_level_boxes(&mut src)?;
    let moov_idx = top
        .iter()
        .position(|b| &b.typ == b"moov")
        .ok_or_else(|| malformed("no 'moov' box"))?;
    if top[moov_idx + 1..].iter().any(|b| &b.typ == b"mdat") {
        return Err(AssetError::metadata(
            "'moov' precedes media data; cannot append a timed-metadata track",
        ));
    }
    let moov = top[moov_idx];
    let moov_bytes = read_range(&mut src, moov.start, moov.end - moov.start)?;
    let moov_box = parse_boxes(&moov_bytes)?
        .into_iter()
        .next()
        .ok_or_else(|| malformed("empty 'moov'"))?;
    let moov_payload = moov_box.payload(&moov_bytes);
    let children = parse_boxes(moov_payload)?;
    let mvhd = children
        .iter()
        .find(|b| &b.typ == b"mvhd")
        .ok_or_else(|| malformed("no 'mvhd' box"))?;
    let header = movie_header(mvhd.payload(moov_payload))?;

    let tmp = path.with_extension("timed-metadata.tmp");
    let rewritten = (|| -> AssetResult<()> {
        let mut out = BufWriter::new(File::create(&tmp)?);
        src.seek(SeekFrom::Start(0))?;
        std::io::copy(&mut (&mut src).take(moov.start), &mut out)?;
        src.seek(SeekFrom::Start(moov.end))?;
        std::io::copy(&mut (&mut src).take(len - moov.end), &mut out)?;
        let mut written = moov.start + (len - moov.end);

        let mut track_id = header.next_track_id.max(1);
        let mut traks = Vec::with_capacity(markers.len());
        for marker in markers {
            let sample = marker_sample(marker.value);
            let chunk_offset = u32::try_from(written + 8).map_err(|_| {
                AssetError::metadata("movie too large for 32-bit chunk offsets")
            })?;
            let mdat = build_box(b"mdat", &sample);
            out.write_all(&mdat)?;
            written += mdat.len() as u64;
            traks.push(build_marker_trak(
                track_id,
                header.timescale,
                marker,
                chunk_offset,
                sample.len() as u32,
            ));
            track_id += 1;
        }

        let extra: usize = traks.iter().map(Vec::len).sum();
        let mut payload = Vec::with_capacity(moov_payload.len() + extra);
        for c in &children {
            let raw = c.raw(moov_payload);
            if &c.typ == b"mvhd" {
                let mut patched = raw.to_vec();
                let at = c.header + header.next_track_id_at;
                if let Some(slot) = patched.get_mut(at..at + 4) {
                    slot.copy_from_slice(&track_id.to_be_bytes());
                }
                payload.extend(patched);
            } else {
                payload.extend_from_slice(raw);
            }
        }
        for trak in traks {
            payload.extend(trak);
        }
        out.write_all(&build_box(b"moov", &payload))?;
        out.flush()?;
        Ok(())
    })();
    drop(src);

    match rewritten.and_then(|()| std::fs::rename(&tmp, path).map_err(AssetError::from)) {
        Ok(()) => {
            tracing::debug!("timed metadata tracks appended");
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Markers carried by the timed-metadata tracks of the movie at `path`.
///
/// Only the first sample of each `mebx` track is read; tracks whose key is not a known
/// [`MetadataKey`] are skipped.
pub fn read_timed_metadata(path: &Path) -> AssetResult<Vec<TimedMetadata>> {
    let mut file = File::open(path)?;
    let top = top_level_boxes(&mut file)?;
    let Some(moov) = top.iter().find(|b| &b.typ == b"moov") else {
        return Ok(Vec::new());
    };
    let moov_bytes = read_range(&mut file, moov.start, moov.end - moov.start)?;
    let moov = child(&moov_bytes, b"moov")?.ok_or_else(|| malformed("empty 'moov'"))?;
    let mvhd = child(moov, b"mvhd")?.ok_or_else(|| malformed("no 'mvhd' box"))?;
    let timescale = movie_header(mvhd)?.timescale;

    let mut markers = Vec::new();
    for trak in parse_boxes(moov)?.iter().filter(|b| &b.typ == b"trak") {
        if let Some(marker) = marker_in_trak(&mut file, trak.payload(moov), timescale)? {
            markers.push(marker);
        }
    }
    Ok(markers)
}

fn marker_in_trak(
    file: &mut File,
    trak: &[u8],
    movie_timescale: u32,
) -> AssetResult<Option<TimedMetadata>> {
    let Some(mdia) = child(trak, b"mdia")? else {
        return Ok(None);
    };
    let Some(hdlr) = child(mdia, b"hdlr")? else {
        return Ok(None);
    };
    if hdlr.get(8..12) != Some(b"meta".as_slice()) {
        return Ok(None);
    }
    let Some(stbl) = descend(mdia, &[b"minf", b"stbl"])? else {
        return Ok(None);
    };
    let keys = sample_keys(stbl)?;
    if keys.is_empty() {
        return Ok(None);
    }

    let Some(offset) = first_chunk_offset(stbl)? else {
        return Ok(None);
    };
    let Some(size) = first_sample_size(stbl)? else {
        return Ok(None);
    };
    let sample = read_range(file, offset, u64::from(size))?;
    let pts = edit_start(trak, movie_timescale)?;

    for item in parse_boxes(&sample)? {
        let id = u32::from_be_bytes(item.typ);
        let Some((_, key)) = keys.iter().find(|(k, _)| *k == id) else {
            continue;
        };
        let Some(value) = item.payload(&sample).first() else {
            continue;
        };
        return Ok(Some(TimedMetadata {
            key: *key,
            pts,
            value: i8::from_be_bytes([*value]),
        }));
    }
    Ok(None)
}

/// Local key ids declared by the track's `mebx` sample entry.
fn sample_keys(stbl: &[u8]) -> AssetResult<Vec<(u32, MetadataKey)>> {
    let Some(stsd) = child(stbl, b"stsd")? else {
        return Ok(Vec::new());
    };
    let entries = stsd.get(8..).unwrap_or_default();
    let Some(mebx) = parse_boxes(entries)?
        .into_iter()
        .find(|b| &b.typ == b"mebx")
        .map(|b| b.payload(entries))
    else {
        return Ok(Vec::new());
    };
    let Some(keys) = child(mebx.get(8..).unwrap_or_default(), b"keys")? else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for entry in parse_boxes(keys)? {
        let Some(keyd) = child(entry.payload(keys), b"keyd")? else {
            continue;
        };
        if keyd.get(..4) != Some(KEY_SPACE_MDTA.as_bytes()) {
            continue;
        }
        let key = std::str::from_utf8(&keyd[4..])
            .ok()
            .and_then(MetadataKey::from_wire_key);
        if let Some(key) = key {
            out.push((u32::from_be_bytes(entry.typ), key));
        }
    }
    Ok(out)
}

fn first_chunk_offset(stbl: &[u8]) -> AssetResult<Option<u64>> {
    if let Some(stco) = child(stbl, b"stco")? {
        if read_u32(stco, 4)? == 0 {
            return Ok(None);
        }
        return Ok(Some(u64::from(read_u32(stco, 8)?)));
    }
    if let Some(co64) = child(stbl, b"co64")? {
        if read_u32(co64, 4)? == 0 {
            return Ok(None);
        }
        return Ok(Some(read_u64(co64, 8)?));
    }
    Ok(None)
}

fn first_sample_size(stbl: &[u8]) -> AssetResult<Option<u32>> {
    let Some(stsz) = child(stbl, b"stsz")? else {
        return Ok(None);
    };
    let fixed = read_u32(stsz, 4)?;
    let count = read_u32(stsz, 8)?;
    Ok(match (fixed, count) {
        (_, 0) => None,
        (0, _) => Some(read_u32(stsz, 12)?),
        (n, _) => Some(n),
    })
}

/// Presentation start of the track: the total of its leading empty edits, in seconds.
fn edit_start(trak: &[u8], movie_timescale: u32) -> AssetResult<f64> {
    let Some(elst) = descend(trak, &[b"edts", b"elst"])? else {
        return Ok(0.0);
    };
    let version = *elst.first().ok_or_else(|| malformed("empty 'elst'"))?;
    let count = read_u32(elst, 4)? as usize;
    let mut empty = 0u64;
    let mut at = 8;
    for _ in 0..count {
        let (duration, media_time, stride) = if version == 1 {
            (read_u64(elst, at)?, read_u64(elst, at + 8)? as i64, 20)
        } else {
            (
                u64::from(read_u32(elst, at)?),
                i64::from(read_u32(elst, at + 4)? as i32),
                12,
            )
        };
        if media_time != -1 {
            break;
        }
        empty += duration;
        at += stride;
    }
    Ok(empty as f64 / f64::from(movie_timescale))
}

#[cfg(test)]
#[path = "../../tests/unit/media/timed_track.rs"]
mod tests;
