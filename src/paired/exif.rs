//! Vendor maker-note field carrying the paired-asset identifier inside a JPEG.
//!
//! The identifier lives in an Apple-style maker note (`"Apple iOS\0"` header, own IFD with
//! offsets relative to the maker note) under tag `0x0011`, reachable from
//! `IFD0 -> ExifIFD (0x8769) -> MakerNote (0x927C)`.

use std::path::Path;

use image::RgbaImage;
use image::codecs::jpeg::JpegEncoder;

use crate::foundation::error::{AssetError, AssetResult};
use crate::media::metadata::VendorField;

const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";
const MAKER_NOTE_PREFIX: &[u8; 10] = b"Apple iOS\0";
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_MAKER_NOTE: u16 = 0x927C;
const TYPE_ASCII: u16 = 2;
const TYPE_LONG: u16 = 4;
const TYPE_UNDEFINED: u16 = 7;
const MARKER_SOI: u8 = 0xD8;
const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;
const MARKER_SOS: u8 = 0xDA;

#[derive(Clone, Copy, Debug)]
struct ByteOrder {
    big: bool,
}

impl ByteOrder {
    fn from_mark(mark: &[u8]) -> Option<Self> {
        match mark {
            b"MM" => Some(Self { big: true }),
            b"II" => Some(Self { big: false }),
            _ => None,
        }
    }

    fn u16(self, buf: &[u8], at: usize) -> Option<u16> {
        let b: [u8; 2] = buf.get(at..at + 2)?.try_into().ok()?;
        Some(if self.big {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    }

    fn u32(self, buf: &[u8], at: usize) -> Option<u32> {
        let b: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
        Some(if self.big {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        })
    }
}

#[derive(Clone, Copy, Debug)]
struct IfdEntry {
    kind: u16,
    count: u32,
    /// Absolute position of the 4-byte value/offset field.
    value_at: usize,
}

fn find_entry(buf: &[u8], order: ByteOrder, ifd_at: usize, tag: u16) -> Option<IfdEntry> {
    let n = order.u16(buf, ifd_at)? as usize;
    (0..n).find_map(|i| {
        let at = ifd_at + 2 + i * 12;
        (order.u16(buf, at)? == tag).then_some(())?;
        Some(IfdEntry {
            kind: order.u16(buf, at + 2)?,
            count: order.u32(buf, at + 4)?,
            value_at: at + 8,
        })
    })
}

fn push_entry(out: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: [u8; 4]) {
    out.extend_from_slice(&tag.to_be_bytes());
    out.extend_from_slice(&kind.to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    out.extend_from_slice(&value);
}

/// Maker note holding `identifier` under the content-identifier tag. Big-endian.
fn maker_note(identifier: &str) -> Vec<u8> {
    let mut text = identifier.as_bytes().to_vec();
    text.push(0);
    let count = text.len() as u32;

    let mut out = Vec::with_capacity(32 + text.len());
    out.extend_from_slice(MAKER_NOTE_PREFIX);
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(b"MM");
    out.extend_from_slice(&1u16.to_be_bytes());
    let inline = text.len() <= 4;
    let value = if inline {
        let mut v = [0u8; 4];
        v[..text.len()].copy_from_slice(&text);
        v
    } else {
        // header (14) + count (2) + one entry (12) + next-IFD (4)
        32u32.to_be_bytes()
    };
    push_entry(&mut out, VendorField::ContentIdentifier.tag(), TYPE_ASCII, count, value);
    out.extend_from_slice(&0u32.to_be_bytes());
    if !inline {
        out.extend_from_slice(&text);
    }
    out
}

/// APP1 payload (`Exif\0\0` + TIFF) whose maker note carries `identifier`.
fn exif_payload(identifier: &str) -> Vec<u8> {
    let note = maker_note(identifier);
    let exif_ifd_at = 8u32 + 18;
    let note_at = exif_ifd_at + 18;

    let mut tiff = Vec::with_capacity(note_at as usize + note.len());
    tiff.extend_from_slice(b"MM");
    tiff.extend_from_slice(&42u16.to_be_bytes());
    tiff.extend_from_slice(&8u32.to_be_bytes());

    tiff.extend_from_slice(&1u16.to_be_bytes());
    push_entry(&mut tiff, TAG_EXIF_IFD, TYPE_LONG, 1, exif_ifd_at.to_be_bytes());
    tiff.extend_from_slice(&0u32.to_be_bytes());

    tiff.extend_from_slice(&1u16.to_be_bytes());
    push_entry(
        &mut tiff,
        TAG_MAKER_NOTE,
        TYPE_UNDEFINED,
        note.len() as u32,
        note_at.to_be_bytes(),
    );
    tiff.extend_from_slice(&0u32.to_be_bytes());
    tiff.extend_from_slice(&note);

    let mut payload = EXIF_HEADER.to_vec();
    payload.extend_from_slice(&tiff);
    payload
}

/// JPEG segments before the entropy-coded data: `(marker, whole segment bytes)`.
fn header_segments(jpeg: &[u8]) -> AssetResult<(Vec<(u8, &[u8])>, &[u8])> {
    if jpeg.get(..2) != Some(&[0xFF, MARKER_SOI][..]) {
        return Err(AssetError::metadata("not a jpeg (missing SOI)"));
    }
    let mut segments = Vec::new();
    let mut at = 2;
    loop {
        let (Some(&0xFF), Some(&marker)) = (jpeg.get(at), jpeg.get(at + 1)) else {
            return Err(AssetError::metadata("truncated jpeg header"));
        };
        if marker == MARKER_SOS || !(0xE0..=0xEF).contains(&marker) {
            return Ok((segments, &jpeg[at..]));
        }
        let len = jpeg
            .get(at + 2..at + 4)
            .map(|b| usize::from(u16::from_be_bytes([b[0], b[1]])))
            .ok_or_else(|| AssetError::metadata("truncated jpeg segment"))?;
        let end = at + 2 + len;
        let seg = jpeg
            .get(at..end)
            .ok_or_else(|| AssetError::metadata("jpeg segment overruns file"))?;
        segments.push((marker, seg));
        at = end;
    }
}

fn is_exif(marker: u8, segment: &[u8]) -> bool {
    marker == MARKER_APP1 && segment.get(4..10) == Some(&EXIF_HEADER[..])
}

/// Return `jpeg` with an Exif segment carrying `identifier`, replacing any existing one.
pub fn embed_identifier(jpeg: &[u8], identifier: &str) -> AssetResult<Vec<u8>> {
    let payload = exif_payload(identifier);
    let seg_len = u16::try_from(payload.len() + 2)
        .map_err(|_| AssetError::metadata("identifier too long for an exif segment"))?;
    let (segments, rest) = header_segments(jpeg)?;

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&[0xFF, MARKER_SOI]);
    for (_, seg) in segments.iter().filter(|(m, _)| *m == MARKER_APP0) {
        out.extend_from_slice(seg);
    }
    out.extend_from_slice(&[0xFF, MARKER_APP1]);
    out.extend_from_slice(&seg_len.to_be_bytes());
    out.extend_from_slice(&payload);
    for (_, seg) in segments
        .iter()
        .filter(|(m, seg)| *m != MARKER_APP0 && !is_exif(*m, seg))
    {
        out.extend_from_slice(seg);
    }
    out.extend_from_slice(rest);
    Ok(out)
}

fn identifier_in_tiff(tiff: &[u8]) -> Option<String> {
    let order = ByteOrder::from_mark(tiff.get(..2)?)?;
    let ifd0 = order.u32(tiff, 4)? as usize;
    let exif = find_entry(tiff, order, ifd0, TAG_EXIF_IFD)?;
    let exif_at = order.u32(tiff, exif.value_at)? as usize;
    let note = find_entry(tiff, order, exif_at, TAG_MAKER_NOTE)?;
    let note_at = order.u32(tiff, note.value_at)? as usize;
    let note = tiff.get(note_at..note_at + note.count as usize)?;
    identifier_in_maker_note(note)
}

fn identifier_in_maker_note(note: &[u8]) -> Option<String> {
    if note.get(..MAKER_NOTE_PREFIX.len())? != MAKER_NOTE_PREFIX {
        return None;
    }
    let order = ByteOrder::from_mark(note.get(12..14)?)?;
    let entry = find_entry(note, order, 14, VendorField::ContentIdentifier.tag())?;
    if entry.kind != TYPE_ASCII {
        return None;
    }
    let len = entry.count as usize;
    let bytes = if len <= 4 {
        note.get(entry.value_at..entry.value_at + len)?
    } else {
        let at = order.u32(note, entry.value_at)? as usize;
        note.get(at..at + len)?
    };
    let text = bytes.split(|b| *b == 0).next()?;
    String::from_utf8(text.to_vec()).ok()
}

/// Identifier stored in the vendor field of `jpeg`, if any.
pub fn read_identifier(jpeg: &[u8]) -> AssetResult<Option<String>> {
    let (segments, _) = header_segments(jpeg)?;
    Ok(segments
        .iter()
        .filter(|(m, seg)| is_exif(*m, seg))
        .find_map(|(_, seg)| identifier_in_tiff(&seg[10..])))
}

/// [`read_identifier`] for a file on disk.
pub fn read_still_identifier(path: &Path) -> AssetResult<Option<String>> {
    let bytes = std::fs::read(path)?;
    read_identifier(&bytes)
}

/// Encode `image` as JPEG (alpha dropped) with `identifier` in its vendor field.
pub fn encode_tagged_jpeg(image: &RgbaImage, quality: u8, identifier: &str) -> AssetResult<Vec<u8>> {
    let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut plain = Vec::new();
    JpegEncoder::new_with_quality(&mut plain, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| AssetError::metadata(format!("jpeg encode failed: {e}")))?;
    embed_identifier(&plain, identifier)
}

#[cfg(test)]
#[path = "../../tests/unit/paired/exif.rs"]
mod tests;
