//! In-memory fixture builders shared by the unit and integration tests.
//!
//! Fixtures are synthesized rather than checked in: a minimal JPEG is a
//! handful of markers around an opaque scan, a minimal BMFF file is a
//! few hand-rolled boxes. Enable the `test-utils` feature to use these
//! from a downstream test suite.

use crate::byteio::ByteOrder;
use crate::tiff::tags::{tag, DIRECTORY_TYPE_ROOT};
use crate::tiff::{TiffOutputField, TiffOutputSet};

/// SOS header, a short entropy-coded scan (with a stuffed 0xFF00), and
/// EOI. Everything from SOS on must survive every rewrite verbatim.
pub const TRAILER: &[u8] = &[
    0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, // SOS header
    0x12, 0x34, 0xFF, 0x00, 0x56, 0x78, // entropy-coded data
    0xFF, 0xD9, // EOI
];

fn app0_jfif() -> Vec<u8> {
    let mut seg = vec![0xFF, 0xE0, 0x00, 0x10];
    seg.extend_from_slice(b"JFIF\0");
    seg.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    seg
}

fn dqt_stub() -> Vec<u8> {
    vec![0xFF, 0xDB, 0x00, 0x06, 0x00, 0x01, 0x02, 0x03]
}

/// A JPEG with APP0 + DQT and no metadata segments
pub fn minimal_jpeg() -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend_from_slice(&app0_jfif());
    jpeg.extend_from_slice(&dqt_stub());
    jpeg.extend_from_slice(TRAILER);
    jpeg
}

/// A JPEG with the given pre-framed marker segments between SOI and the
/// scan trailer
pub fn jpeg_with_segments(segments: &[Vec<u8>]) -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8];
    for seg in segments {
        jpeg.extend_from_slice(seg);
    }
    jpeg.extend_from_slice(TRAILER);
    jpeg
}

/// Frame a TIFF stream as an APP1 EXIF segment
pub fn app1_exif_segment(tiff: &[u8]) -> Vec<u8> {
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(tiff);
    frame_segment(0xE1, &payload)
}

/// Frame an XMP packet as an APP1 XMP segment
pub fn app1_xmp_segment(packet: &[u8]) -> Vec<u8> {
    let mut payload = b"http://ns.adobe.com/xap/1.0/\0".to_vec();
    payload.extend_from_slice(packet);
    frame_segment(0xE1, &payload)
}

fn frame_segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut seg = vec![0xFF, marker];
    seg.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    seg.extend_from_slice(payload);
    seg
}

/// A JPEG carrying an EXIF APP1 whose IFD0 holds the given orientation
pub fn jpeg_with_orientation(order: ByteOrder, orientation: u16) -> Vec<u8> {
    let mut set = TiffOutputSet::new(order);
    let root = set.get_or_create(DIRECTORY_TYPE_ROOT).expect("image directory");
    root.set(TiffOutputField::short(tag::ORIENTATION, order, orientation));
    let tiff = set.serialize().expect("fixture TIFF");
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend_from_slice(&app0_jfif());
    jpeg.extend_from_slice(&app1_exif_segment(&tiff));
    jpeg.extend_from_slice(&dqt_stub());
    jpeg.extend_from_slice(TRAILER);
    jpeg
}

/// Frame a BMFF box
pub fn bmff_box(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut b = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    b.extend_from_slice(fourcc);
    b.extend_from_slice(payload);
    b
}

/// An `ftyp` box for the given major brand
pub fn ftyp_box(brand: &[u8; 4]) -> Vec<u8> {
    let mut payload = brand.to_vec();
    payload.extend_from_slice(&[0, 0, 0, 0]);
    payload.extend_from_slice(brand);
    bmff_box(b"ftyp", &payload)
}

/// A BMFF file from pre-framed boxes, `ftyp` first
pub fn bmff_file(brand: &[u8; 4], boxes: &[Vec<u8>]) -> Vec<u8> {
    let mut data = ftyp_box(brand);
    for b in boxes {
        data.extend_from_slice(b);
    }
    data
}

/// A JXL container with an `Exif` box (4-byte header + TIFF stream)
pub fn jxl_with_exif(tiff: &[u8]) -> Vec<u8> {
    let mut payload = vec![0, 0, 0, 0];
    payload.extend_from_slice(tiff);
    bmff_file(
        b"jxl ",
        &[bmff_box(b"Exif", &payload), bmff_box(b"jxlc", &[0xFF, 0x0A, 0x00])],
    )
}

/// A `meta` full box (version+flags) wrapping the given child boxes
pub fn meta_box(children: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = vec![0, 0, 0, 0]; // version + flags
    for c in children {
        payload.extend_from_slice(c);
    }
    bmff_box(b"meta", &payload)
}
