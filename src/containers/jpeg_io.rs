//! JPEG container I/O.
//!
//! A JPEG file is a sequence of 0xFF-prefixed markers: no payload (SOI,
//! EOI, RSTn), a big-endian u16 length plus payload (APPn, COM, DQT,
//! DHT, ...), or, for SOS, a payload followed by the entropy-coded
//! scan. The scanner stops at SOS; everything from the SOS marker
//! through EOI is treated as an opaque trailer and copied byte-for-byte
//! on every rewrite, which is what makes updates lossless.

use std::io::{Cursor, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::byteio::ByteOrder;
use crate::error::{ReadError, Result, WriteError};
use crate::iptc::{self, IptcMetadata};
use crate::tiff::{self, TiffOutputSet};

// JPEG markers
const SOI: u8 = 0xD8; // Start of Image
const EOI: u8 = 0xD9; // End of Image
const SOS: u8 = 0xDA; // Start of Scan (entropy-coded data follows)
const APP1: u8 = 0xE1; // EXIF / XMP
const APP13: u8 = 0xED; // Photoshop IRB (IPTC)
const TEM: u8 = 0x01;
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;

pub(crate) const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
pub(crate) const EXIF_SIGNATURE: &[u8] = b"Exif\0\0";

/// Max payload of a single marker segment (u16 length includes itself)
const MAX_SEGMENT_PAYLOAD: usize = 65533;

/// One marker segment located in the source buffer
#[derive(Debug, Clone, Copy)]
struct RawSegment {
    marker: u8,
    start: usize,
    total: usize,
}

impl RawSegment {
    /// Payload after the marker and length words
    fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        if self.total < 4 {
            return &[];
        }
        &data[self.start + 4..self.start + self.total]
    }

    fn span<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.start + self.total]
    }
}

/// Marker segments up to (not including) the trailer, which runs from
/// the SOS marker (or EOI for scan-less files) to the end of the input
#[derive(Debug)]
struct JpegScan {
    segments: Vec<RawSegment>,
    trailer_start: usize,
}

fn scan(data: &[u8]) -> Result<JpegScan> {
    if data.len() < 3 || data[0] != 0xFF || data[1] != SOI {
        return Err(ReadError::InvalidMagic);
    }
    let mut source = Cursor::new(data);
    source.set_position(2);

    let mut segments = Vec::new();
    loop {
        let start = source.position() as usize;
        let prefix = read_marker_byte(&mut source)?;
        if prefix != 0xFF {
            return Err(ReadError::InvalidMagic);
        }
        let mut marker = read_marker_byte(&mut source)?;
        while marker == 0xFF {
            // fill bytes before the marker code
            marker = read_marker_byte(&mut source)?;
        }
        match marker {
            EOI | SOS => {
                return Ok(JpegScan {
                    segments,
                    trailer_start: start,
                });
            }
            TEM | RST0..=RST7 => {
                segments.push(RawSegment {
                    marker,
                    start,
                    total: source.position() as usize - start,
                });
            }
            _ => {
                let length_pos = source.position() as usize;
                let length = source
                    .read_u16::<BigEndian>()
                    .map_err(|_| ReadError::TruncatedInput {
                        offset: length_pos,
                        needed: 2,
                    })? as usize;
                if length < 2 {
                    return Err(ReadError::InvalidMagic);
                }
                let end = length_pos + length;
                if end > data.len() {
                    return Err(ReadError::TruncatedInput {
                        offset: length_pos,
                        needed: length,
                    });
                }
                source.set_position(end as u64);
                segments.push(RawSegment {
                    marker,
                    start,
                    total: end - start,
                });
            }
        }
    }
}

fn read_marker_byte(source: &mut Cursor<&[u8]>) -> Result<u8> {
    let offset = source.position() as usize;
    source
        .read_u8()
        .map_err(|_| ReadError::TruncatedInput { offset, needed: 1 })
}

fn is_exif_app1(data: &[u8], seg: &RawSegment) -> bool {
    seg.marker == APP1 && seg.payload(data).starts_with(EXIF_SIGNATURE)
}

fn is_xmp_app1(data: &[u8], seg: &RawSegment) -> bool {
    seg.marker == APP1 && seg.payload(data).starts_with(XMP_SIGNATURE)
}

fn is_iptc_app13(data: &[u8], seg: &RawSegment) -> bool {
    seg.marker == APP13 && iptc::is_photoshop_irb(seg.payload(data))
}

/// Frame a payload as a complete marker segment
fn build_segment(marker: u8, payload: &[u8]) -> Result<Vec<u8>, WriteError> {
    if payload.len() > MAX_SEGMENT_PAYLOAD {
        return Err(WriteError::InvalidValue(format!(
            "segment payload of {} bytes exceeds the marker limit",
            payload.len()
        )));
    }
    let mut out = Vec::with_capacity(payload.len() + 4);
    write_segment(&mut out, marker, payload)
        .map_err(|err| WriteError::InvalidValue(err.to_string()))?;
    Ok(out)
}

fn write_segment<W: Write>(writer: &mut W, marker: u8, payload: &[u8]) -> std::io::Result<()> {
    writer.write_u8(0xFF)?;
    writer.write_u8(marker)?;
    // the length word covers itself but not the marker
    writer.write_u16::<BigEndian>((payload.len() + 2) as u16)?;
    writer.write_all(payload)?;
    Ok(())
}

/// Replace the segment matched by `pred` (dropping any duplicates), or
/// insert `new_segment` before the `insert_index`-th segment when none
/// matches. SOI stays at offset 0 and the trailer is copied verbatim.
fn replace_or_insert(
    data: &[u8],
    scanned: &JpegScan,
    new_segment: &[u8],
    pred: impl Fn(&[u8], &RawSegment) -> bool,
    insert_index: usize,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + new_segment.len());
    out.extend_from_slice(&[0xFF, SOI]);

    if scanned.segments.iter().any(|s| pred(data, s)) {
        let mut placed = false;
        for seg in &scanned.segments {
            if pred(data, seg) {
                if !placed {
                    out.extend_from_slice(new_segment);
                    placed = true;
                }
            } else {
                out.extend_from_slice(seg.span(data));
            }
        }
    } else {
        for (i, seg) in scanned.segments.iter().enumerate() {
            if i == insert_index {
                out.extend_from_slice(new_segment);
            }
            out.extend_from_slice(seg.span(data));
        }
        if insert_index >= scanned.segments.len() {
            out.extend_from_slice(new_segment);
        }
    }

    out.extend_from_slice(&data[scanned.trailer_start..]);
    out
}

/// Replace (or insert) the APP1 XMP segment.
///
/// A new segment goes immediately after an existing EXIF APP1, else
/// right after SOI, preserving marker order otherwise.
pub fn update_xmp(data: &[u8], packet: &[u8]) -> Result<Vec<u8>, WriteError> {
    let scanned = scan(data).map_err(WriteError::Read)?;
    let mut payload = XMP_SIGNATURE.to_vec();
    payload.extend_from_slice(packet);
    let segment = build_segment(APP1, &payload)?;
    let insert_index = scanned
        .segments
        .iter()
        .position(|s| is_exif_app1(data, s))
        .map(|i| i + 1)
        .unwrap_or(0);
    Ok(replace_or_insert(data, &scanned, &segment, is_xmp_app1, insert_index))
}

/// Serialize the output set and replace (or insert) the APP1 EXIF
/// segment. A payload past the marker limit fails with
/// [`WriteError::ExifTooLarge`]; multi-segment EXIF is not supported.
pub fn update_exif(data: &[u8], output_set: &TiffOutputSet) -> Result<Vec<u8>, WriteError> {
    let scanned = scan(data).map_err(WriteError::Read)?;
    let mut payload = EXIF_SIGNATURE.to_vec();
    payload.extend_from_slice(&output_set.serialize()?);
    if payload.len() > MAX_SEGMENT_PAYLOAD {
        return Err(WriteError::ExifTooLarge(payload.len()));
    }
    let segment = build_segment(APP1, &payload)?;
    Ok(replace_or_insert(data, &scanned, &segment, is_exif_app1, 0))
}

/// Rewrite the IPTC IIM block inside the Photoshop IRB (APP13),
/// preserving every other resource block. A new APP13 goes after the
/// APP1 group.
pub fn write_iptc(data: &[u8], metadata: &IptcMetadata) -> Result<Vec<u8>, WriteError> {
    let scanned = scan(data).map_err(WriteError::Read)?;
    let existing = scanned
        .segments
        .iter()
        .find(|s| is_iptc_app13(data, s))
        .map(|s| s.payload(data));
    let payload = iptc::irb_with_iim(existing, &metadata.serialize());
    let segment = build_segment(APP13, &payload)?;
    let insert_index = scanned
        .segments
        .iter()
        .rposition(|s| s.marker == APP1)
        .map(|i| i + 1)
        .unwrap_or(0);
    Ok(replace_or_insert(data, &scanned, &segment, is_iptc_app13, insert_index))
}

/// The embedded TIFF stream of the first EXIF APP1, signature stripped
pub(crate) fn extract_exif(data: &[u8]) -> Result<Option<Vec<u8>>> {
    let scanned = scan(data)?;
    Ok(scanned
        .segments
        .iter()
        .find(|s| is_exif_app1(data, s))
        .map(|s| s.payload(data)[EXIF_SIGNATURE.len()..].to_vec()))
}

/// The XMP packet of the first XMP APP1, signature stripped
pub(crate) fn extract_xmp(data: &[u8]) -> Result<Option<Vec<u8>>> {
    let scanned = scan(data)?;
    Ok(scanned
        .segments
        .iter()
        .find(|s| is_xmp_app1(data, s))
        .map(|s| s.payload(data)[XMP_SIGNATURE.len()..].to_vec()))
}

/// The raw IIM bytes of the Photoshop IRB, when present
pub(crate) fn extract_iptc(data: &[u8]) -> Result<Option<Vec<u8>>> {
    let scanned = scan(data)?;
    Ok(scanned
        .segments
        .iter()
        .find(|s| is_iptc_app13(data, s))
        .and_then(|s| iptc::iim_from_irb(s.payload(data))))
}

/// Lossless orientation fast path: locate the IFD0 Orientation value
/// byte inside the existing APP1 EXIF segment and overwrite it in
/// place. Returns true only when the byte was found and patched; the
/// caller falls back to a full EXIF rewrite otherwise.
pub fn patch_orientation(data: &mut [u8], orientation: u8) -> bool {
    let Ok(scanned) = scan(data) else {
        return false;
    };
    let Some(seg) = scanned.segments.iter().copied().find(|s| is_exif_app1(data, s)) else {
        return false;
    };
    let tiff_start = seg.start + 4 + EXIF_SIGNATURE.len();
    let tiff_end = seg.start + seg.total;
    let Some((value_byte, zero_byte)) = find_orientation_slot(&data[tiff_start..tiff_end]) else {
        return false;
    };
    data[tiff_start + zero_byte] = 0;
    data[tiff_start + value_byte] = orientation;
    true
}

/// Offsets (relative to the TIFF stream) of the orientation SHORT's
/// value byte and its zero half within the 4-byte inline slot
fn find_orientation_slot(tiff: &[u8]) -> Option<(usize, usize)> {
    let header = tiff::read_header(tiff).ok()?;
    let order = header.byte_order;
    let dir = header.first_ifd_offset as usize;
    if dir + 2 > tiff.len() {
        return None;
    }
    let entry_count = order.u16_from([tiff[dir], tiff[dir + 1]]) as usize;

    for i in 0..entry_count {
        let entry = dir + 2 + i * 12;
        if entry + 12 > tiff.len() {
            return None;
        }
        let tag = order.u16_from([tiff[entry], tiff[entry + 1]]);
        if tag != tiff::tags::tag::ORIENTATION {
            continue;
        }
        let type_code = order.u16_from([tiff[entry + 2], tiff[entry + 3]]);
        let count = order.u32_from([
            tiff[entry + 4],
            tiff[entry + 5],
            tiff[entry + 6],
            tiff[entry + 7],
        ]);
        if type_code != tiff::FieldType::Short.code() || count != 1 {
            return None;
        }
        // a SHORT of 1..=8 lives in one byte of the inline slot; the
        // other slot byte is its zero half
        let slot = entry + 8;
        return Some(match order {
            ByteOrder::LittleEndian => (slot, slot + 1),
            ByteOrder::BigEndian => (slot + 1, slot),
        });
    }
    None
}
