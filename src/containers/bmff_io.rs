//! ISO-BMFF box I/O (HEIC, AVIF, JPEG XL container, MP4).
//!
//! A box is `size(u32) | type(4 bytes) | payload`. Size 1 means a u64
//! `largesize` follows the type; size 0 means the box runs to the end of
//! the stream (final box only). The parser builds an `atree` of box
//! info plus a path map; it never materializes payloads, so scanning
//! past a multi-gigabyte `mdat` is cheap, and `stop_after_meta` lets a
//! caller avoid even that when only `meta` matters (iPhone files place
//! `meta` first, Samsung files place it after `mdat`).
//!
//! For JPEG XL the `Exif` box carries a 4-byte (version + flags) header
//! before the TIFF stream and `xml ` carries the XMP packet; `brob`
//! (brotli-wrapped) boxes are treated as opaque. XMP may also arrive in
//! the dedicated uuid box. Box replacement rewrites every containing
//! box length; length-changing edits are refused when the file carries
//! `meta/iloc`, whose absolute offsets the rewrite would invalidate.
//! A box that does not exist yet is appended at end-of-file in that
//! case, which shifts no referenced offset.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use atree::{Arena, Token};
use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{ReadError, Result, WriteError};

const HEADER_SIZE: u64 = 8;
const HEADER_SIZE_LARGE: u64 = 16;

/// The XMP uuid (be7acfcb-97a9-42e8-9c71-999491e3afac)
const XMP_UUID: [u8; 16] = [
    0xbe, 0x7a, 0xcf, 0xcb, 0x97, 0xa9, 0x42, 0xe8, 0x9c, 0x71, 0x99, 0x94, 0x91, 0xe3, 0xaf, 0xac,
];

/// Boxes whose payload is a sequence of child boxes
const CONTAINER_BOXES: &[&[u8; 4]] = &[
    b"moov", b"trak", b"mdia", b"minf", b"stbl", b"udta", b"dinf", b"meta", b"iprp", b"ipco",
];

/// The JXL `Exif` box payload header: 1-byte version + 3-byte flags
const EXIF_BOX_HEADER_LEN: usize = 4;

#[derive(Debug, Clone)]
struct BoxInfo {
    fourcc: [u8; 4],
    offset: u64,
    size: u64,
    header_len: u64,
    large: bool,
    to_end: bool,
}

impl BoxInfo {
    fn payload_start(&self) -> usize {
        (self.offset + self.header_len) as usize
    }

    fn end(&self) -> usize {
        (self.offset + self.size) as usize
    }
}

struct BoxHeader {
    fourcc: [u8; 4],
    size: u64,
    header_len: u64,
    large: bool,
    to_end: bool,
}

fn truncated(offset: u64, needed: usize) -> ReadError {
    ReadError::TruncatedInput {
        offset: offset as usize,
        needed,
    }
}

fn read_box_header(cursor: &mut Cursor<&[u8]>, end: u64) -> Result<Option<BoxHeader>> {
    let start = cursor.position();
    if start >= end {
        return Ok(None);
    }
    if end - start < HEADER_SIZE {
        return Err(truncated(start, HEADER_SIZE as usize));
    }
    let size32 = cursor
        .read_u32::<BigEndian>()
        .map_err(|_| truncated(start, 4))?;
    let mut fourcc = [0u8; 4];
    cursor
        .read_exact(&mut fourcc)
        .map_err(|_| truncated(start + 4, 4))?;

    let (size, header_len, large, to_end) = if size32 == 1 {
        let large_size = cursor
            .read_u64::<BigEndian>()
            .map_err(|_| truncated(start + 8, 8))?;
        (large_size, HEADER_SIZE_LARGE, true, false)
    } else if size32 == 0 {
        // extends to the end of the stream; only valid for the final box
        (end - start, HEADER_SIZE, false, true)
    } else {
        (size32 as u64, HEADER_SIZE, false, false)
    };

    if size < header_len || start + size > end {
        return Err(truncated(start, size as usize));
    }
    Ok(Some(BoxHeader {
        fourcc,
        size,
        header_len,
        large,
        to_end,
    }))
}

/// Parsed box hierarchy with a path map (`meta/iloc` etc.)
pub(crate) struct BoxTree {
    arena: Arena<BoxInfo>,
    by_path: HashMap<String, Vec<Token>>,
}

impl BoxTree {
    pub(crate) fn parse(data: &[u8], stop_after_meta: bool) -> Result<BoxTree> {
        if data.len() < 12 || &data[4..8] != b"ftyp" {
            return Err(ReadError::InvalidMagic);
        }
        let len = data.len() as u64;
        let root_info = BoxInfo {
            fourcc: [0; 4],
            offset: 0,
            size: len,
            header_len: 0,
            large: false,
            to_end: false,
        };
        let (mut arena, root) = Arena::with_data(root_info);
        let mut by_path = HashMap::new();
        let mut cursor = Cursor::new(data);
        build_tree(
            &mut cursor,
            len,
            &mut arena,
            &root,
            "",
            &mut by_path,
            stop_after_meta,
            0,
        )?;
        Ok(BoxTree { arena, by_path })
    }

    /// First box of the given type anywhere in the tree, by file order
    fn find(&self, fourcc: &[u8; 4]) -> Option<Token> {
        let mut best: Option<Token> = None;
        for tokens in self.by_path.values() {
            for &token in tokens {
                if &self.arena[token].data.fourcc == fourcc {
                    match best {
                        Some(b) if self.arena[b].data.offset <= self.arena[token].data.offset => {}
                        _ => best = Some(token),
                    }
                }
            }
        }
        best
    }

    /// The uuid box carrying XMP, when present
    fn find_xmp_uuid(&self, data: &[u8]) -> Option<Token> {
        for tokens in self.by_path.values() {
            for &token in tokens {
                let info = &self.arena[token].data;
                if &info.fourcc != b"uuid" {
                    continue;
                }
                let start = info.payload_start();
                if start + 16 <= info.end() && data[start..start + 16] == XMP_UUID {
                    return Some(token);
                }
            }
        }
        None
    }

    fn has_iloc(&self) -> bool {
        self.by_path
            .keys()
            .any(|path| path == "meta/iloc" || path.ends_with("/meta/iloc"))
    }

    fn info(&self, token: Token) -> &BoxInfo {
        &self.arena[token].data
    }

    /// Containing boxes of a token, innermost first, synthetic root excluded
    fn ancestors(&self, token: Token) -> Vec<BoxInfo> {
        token
            .ancestors(&self.arena)
            .map(|node| node.data.clone())
            .filter(|info| info.header_len != 0)
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn build_tree(
    cursor: &mut Cursor<&[u8]>,
    end: u64,
    arena: &mut Arena<BoxInfo>,
    parent: &Token,
    parent_path: &str,
    by_path: &mut HashMap<String, Vec<Token>>,
    stop_after_meta: bool,
    depth: usize,
) -> Result<()> {
    while cursor.position() < end {
        let start = cursor.position();
        let Some(header) = read_box_header(cursor, end)? else {
            break;
        };
        let info = BoxInfo {
            fourcc: header.fourcc,
            offset: start,
            size: header.size,
            header_len: header.header_len,
            large: header.large,
            to_end: header.to_end,
        };
        let fourcc_str = String::from_utf8_lossy(&header.fourcc).into_owned();
        let path = if parent_path.is_empty() {
            fourcc_str
        } else {
            format!("{parent_path}/{fourcc_str}")
        };
        let token = parent.append(arena, info);
        by_path.entry(path.clone()).or_default().push(token);

        let box_end = start + header.size;
        if CONTAINER_BOXES.contains(&&header.fourcc) {
            // meta is a full box: version + flags precede the children
            let full_box_ext = if &header.fourcc == b"meta" { 4 } else { 0 };
            cursor.set_position(start + header.header_len + full_box_ext);
            build_tree(
                cursor,
                box_end,
                arena,
                &token,
                &path,
                by_path,
                stop_after_meta,
                depth + 1,
            )?;
        }
        cursor.set_position(box_end);

        if depth == 0 && stop_after_meta && &header.fourcc == b"meta" {
            break;
        }
    }
    Ok(())
}

/// The TIFF stream inside the `Exif` box, 4-byte box header stripped
pub(crate) fn read_exif(data: &[u8], stop_after_meta: bool) -> Result<Option<Vec<u8>>> {
    let tree = BoxTree::parse(data, stop_after_meta)?;
    let Some(token) = tree.find(b"Exif") else {
        return Ok(None);
    };
    let info = tree.info(token);
    let payload = &data[info.payload_start()..info.end()];
    if payload.len() < EXIF_BOX_HEADER_LEN {
        return Ok(None);
    }
    Ok(Some(payload[EXIF_BOX_HEADER_LEN..].to_vec()))
}

/// The XMP packet from an `xml ` box or the XMP uuid box
pub(crate) fn read_xmp(data: &[u8], stop_after_meta: bool) -> Result<Option<Vec<u8>>> {
    let tree = BoxTree::parse(data, stop_after_meta)?;
    if let Some(token) = tree.find(b"xml ") {
        let info = tree.info(token);
        return Ok(Some(data[info.payload_start()..info.end()].to_vec()));
    }
    if let Some(token) = tree.find_xmp_uuid(data) {
        let info = tree.info(token);
        return Ok(Some(data[info.payload_start() + 16..info.end()].to_vec()));
    }
    Ok(None)
}

/// Replace (or insert) the `Exif` box payload
pub fn replace_exif(data: &[u8], tiff: &[u8]) -> Result<Vec<u8>, WriteError> {
    let tree = BoxTree::parse(data, false).map_err(WriteError::Read)?;
    match tree.find(b"Exif") {
        Some(token) => rebuild_with_payload(data, &tree, token, EXIF_BOX_HEADER_LEN, tiff),
        None => {
            let mut payload = vec![0u8; EXIF_BOX_HEADER_LEN];
            payload.extend_from_slice(tiff);
            if tree.has_iloc() {
                // appending at the end shifts no iloc-referenced offsets
                let mut out = data.to_vec();
                out.extend_from_slice(&frame_box(*b"Exif", &payload));
                return Ok(out);
            }
            insert_after_ftyp(data, &tree, *b"Exif", &payload)
        }
    }
}

/// Replace (or insert) the XMP payload, whichever box form carries it
pub fn replace_xmp(data: &[u8], packet: &[u8]) -> Result<Vec<u8>, WriteError> {
    let tree = BoxTree::parse(data, false).map_err(WriteError::Read)?;
    if let Some(token) = tree.find(b"xml ") {
        return rebuild_with_payload(data, &tree, token, 0, packet);
    }
    if let Some(token) = tree.find_xmp_uuid(data) {
        return rebuild_with_payload(data, &tree, token, 16, packet);
    }
    if tree.has_iloc() {
        // appending at the end shifts no iloc-referenced offsets
        let mut payload = XMP_UUID.to_vec();
        payload.extend_from_slice(packet);
        let mut out = data.to_vec();
        out.extend_from_slice(&frame_box(*b"uuid", &payload));
        return Ok(out);
    }
    insert_after_ftyp(data, &tree, *b"xml ", packet)
}

fn frame_box(fourcc: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() as u64 + HEADER_SIZE) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(&fourcc);
    out.extend_from_slice(payload);
    out
}

fn insert_after_ftyp(
    data: &[u8],
    tree: &BoxTree,
    fourcc: [u8; 4],
    payload: &[u8],
) -> Result<Vec<u8>, WriteError> {
    let ftyp = tree
        .find(b"ftyp")
        .ok_or_else(|| WriteError::InvalidValue("BMFF input has no ftyp box".to_string()))?;
    let insert_at = tree.info(ftyp).end();
    let boxed = frame_box(fourcc, payload);
    let mut out = Vec::with_capacity(data.len() + boxed.len());
    out.extend_from_slice(&data[..insert_at]);
    out.extend_from_slice(&boxed);
    out.extend_from_slice(&data[insert_at..]);
    Ok(out)
}

/// Re-emit the file with one box's payload replaced (keeping the first
/// `keep_prefix` payload bytes) and every containing box length patched
fn rebuild_with_payload(
    data: &[u8],
    tree: &BoxTree,
    token: Token,
    keep_prefix: usize,
    new_payload: &[u8],
) -> Result<Vec<u8>, WriteError> {
    let info = tree.info(token).clone();
    let old_payload_len = (info.size - info.header_len) as usize;
    if keep_prefix > old_payload_len {
        return Err(WriteError::InvalidValue(
            "box payload shorter than its fixed header".to_string(),
        ));
    }
    let new_size = info.header_len + keep_prefix as u64 + new_payload.len() as u64;
    let delta = new_size as i64 - info.size as i64;
    if delta != 0 && tree.has_iloc() {
        return Err(WriteError::IlocOffsetShift);
    }

    let box_start = info.offset as usize;
    let mut out = Vec::with_capacity((data.len() as i64 + delta) as usize);
    out.extend_from_slice(&data[..box_start]);
    if info.large {
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(&info.fourcc);
        out.extend_from_slice(&new_size.to_be_bytes());
    } else {
        if new_size > u32::MAX as u64 {
            return Err(WriteError::InvalidValue(
                "box size exceeds the 32-bit length form".to_string(),
            ));
        }
        out.extend_from_slice(&(new_size as u32).to_be_bytes());
        out.extend_from_slice(&info.fourcc);
    }
    let payload_start = info.payload_start();
    out.extend_from_slice(&data[payload_start..payload_start + keep_prefix]);
    out.extend_from_slice(new_payload);
    out.extend_from_slice(&data[info.end()..]);

    // every containing box grows or shrinks by the same delta
    for ancestor in tree.ancestors(token) {
        if ancestor.to_end {
            continue;
        }
        let patched = (ancestor.size as i64 + delta) as u64;
        let at = ancestor.offset as usize;
        if ancestor.large {
            out[at + 8..at + 16].copy_from_slice(&patched.to_be_bytes());
        } else {
            if patched > u32::MAX as u64 {
                return Err(WriteError::InvalidValue(
                    "containing box size exceeds the 32-bit length form".to_string(),
                ));
            }
            out[at..at + 4].copy_from_slice(&(patched as u32).to_be_bytes());
        }
    }
    Ok(out)
}
