//! TIFF/IFD forest reader.
//!
//! Walks the IFD chain and every offset-linked sub-directory depth-first,
//! guarding against cycles with a visited-offset set. Entry-level damage
//! (bad field type, dangling value offset, duplicate tag) is absorbed by
//! skipping the entry; sub-directory damage drops the originating offset
//! field from the parent; damage inside IFD1 drops the thumbnail
//! directory. Header damage is fatal.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::field_type::{FieldType, Value};
use super::tags::{self, tag};
use crate::byteio::{ByteOrder, ByteReader};
use crate::error::{ReadError, Result};

/// TIFF version word, fixed at 42
pub const TIFF_VERSION: u16 = 42;

const ENTRY_SIZE: usize = 12;

/// The 8-byte TIFF header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub version: u16,
    pub first_ifd_offset: u32,
}

/// One parsed IFD entry with its raw value bytes
#[derive(Debug, Clone)]
pub struct TiffField {
    pub tag: u16,
    /// Directory type this field was found in
    pub dir_type: i32,
    pub field_type: FieldType,
    pub count: u32,
    /// Raw value bytes; `count × element_size` long
    pub value: Vec<u8>,
    /// The 4-byte inline value-or-offset word as it appeared on disk
    pub value_or_offset: [u8; 4],
    pub byte_order: ByteOrder,
    /// Original position of the entry within its directory
    pub sort_hint: usize,
}

impl TiffField {
    pub fn name(&self) -> String {
        tags::tag_name(self.tag, self.dir_type)
    }

    /// Decode the raw bytes into a typed value
    pub fn decoded(&self) -> Result<Value> {
        Value::decode(self.field_type, self.count, &self.value, self.byte_order)
    }

    /// The value as a list of u32, accepting SHORT, LONG and IFD fields
    pub fn u32_values(&self) -> Result<Vec<u32>> {
        match self.decoded()? {
            Value::Short(v) => Ok(v.into_iter().map(u32::from).collect()),
            Value::Long(v) | Value::Ifd(v) => Ok(v),
            _ => Err(ReadError::FieldTypeMismatch {
                name: self.name(),
                expected: FieldType::Long,
                actual: self.field_type,
            }),
        }
    }

    /// The value as a single u32, accepting SHORT and LONG fields
    pub fn first_u32(&self) -> Result<u32> {
        self.u32_values()?
            .first()
            .copied()
            .ok_or_else(|| ReadError::FieldCountMismatch(self.name()))
    }

    /// The value as a single SHORT
    pub fn short_value(&self) -> Result<u16> {
        match self.decoded()? {
            Value::Short(v) if v.len() == 1 => Ok(v[0]),
            Value::Short(_) => Err(ReadError::FieldCountMismatch(self.name())),
            _ => Err(ReadError::FieldTypeMismatch {
                name: self.name(),
                expected: FieldType::Short,
                actual: self.field_type,
            }),
        }
    }

    /// The value as an ASCII string
    pub fn ascii_value(&self) -> Result<String> {
        match self.decoded()? {
            Value::Ascii(s) => Ok(s),
            _ => Err(ReadError::FieldTypeMismatch {
                name: self.name(),
                expected: FieldType::Ascii,
                actual: self.field_type,
            }),
        }
    }
}

/// One parsed directory
#[derive(Debug, Clone)]
pub struct TiffDirectory {
    pub dir_type: i32,
    /// Whether this directory was reached through a `SubIFDs` entry
    pub entered_via_sub_ifds: bool,
    pub fields: Vec<TiffField>,
    /// Offset of the directory within the TIFF stream
    pub offset: u32,
    /// Offset of the next directory in the chain; 0 terminates
    pub next_directory_offset: u32,
    pub byte_order: ByteOrder,
    /// Embedded JPEG thumbnail bytes, when the directory declares one
    pub jpeg_thumbnail: Option<Vec<u8>>,
}

impl TiffDirectory {
    pub fn field(&self, tag: u16) -> Option<&TiffField> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    pub fn required_field(&self, tag: u16, name: &'static str) -> Result<&TiffField> {
        self.field(tag).ok_or(ReadError::MissingRequiredField(name))
    }

    fn remove_field(&mut self, tag: u16) {
        self.fields.retain(|f| f.tag != tag);
    }
}

/// Header plus every directory discovered by the DFS
#[derive(Debug, Clone)]
pub struct TiffContents {
    pub header: TiffHeader,
    pub directories: Vec<TiffDirectory>,
}

impl TiffContents {
    /// Parse a complete TIFF stream
    pub fn parse(data: &[u8]) -> Result<TiffContents> {
        let header = read_header(data)?;
        let mut directories = Vec::new();
        let mut visited = HashSet::new();
        walk_chain(
            data,
            header.byte_order,
            header.first_ifd_offset,
            tags::DIRECTORY_TYPE_ROOT,
            false,
            &mut visited,
            &mut directories,
        )?;
        if directories.is_empty() {
            return Err(ReadError::NoDirectories);
        }
        Ok(TiffContents {
            header,
            directories,
        })
    }

    /// First directory of the given type
    pub fn directory(&self, dir_type: i32) -> Option<&TiffDirectory> {
        self.directories.iter().find(|d| d.dir_type == dir_type)
    }

    /// Field lookup across the forest
    pub fn find_field(&self, dir_type: i32, tag: u16) -> Option<&TiffField> {
        self.directory(dir_type).and_then(|d| d.field(tag))
    }

    /// The root directory (IFD0)
    pub fn root(&self) -> Option<&TiffDirectory> {
        self.directory(tags::DIRECTORY_TYPE_ROOT)
    }

    /// Embedded JPEG thumbnail bytes, from whichever directory carries one
    pub fn jpeg_thumbnail(&self) -> Option<&[u8]> {
        self.directories
            .iter()
            .find_map(|d| d.jpeg_thumbnail.as_deref())
    }
}

/// Parse the 8-byte header
pub fn read_header(data: &[u8]) -> Result<TiffHeader> {
    let mut r = ByteReader::new(data);
    let b0 = r.read_u8()?;
    let b1 = r.read_u8()?;
    let byte_order = match (b0, b1) {
        (b'I', b'I') => ByteOrder::LittleEndian,
        (b'M', b'M') => ByteOrder::BigEndian,
        _ => return Err(ReadError::InvalidByteOrder),
    };
    let version = r.read_u16(byte_order)?;
    if version != TIFF_VERSION {
        return Err(ReadError::InvalidMagic);
    }
    let first_ifd_offset = r.read_u32(byte_order)?;
    Ok(TiffHeader {
        byte_order,
        version,
        first_ifd_offset,
    })
}

/// The fixed inspection order for offset-carrying tags
const SUB_DIRECTORY_TAGS: &[(u16, i32)] = &[
    (tag::EXIF_OFFSET, tags::DIRECTORY_TYPE_EXIF),
    (tag::GPS_INFO, tags::DIRECTORY_TYPE_GPS),
    (tag::INTEROP_OFFSET, tags::DIRECTORY_TYPE_INTEROP),
];

/// Walk a next-IFD chain starting at `first`.
///
/// Chaining applies only to non-negative (image) directory types; errors
/// inside IFD1 are absorbed and terminate the chain.
fn walk_chain(
    data: &[u8],
    order: ByteOrder,
    first: u32,
    start_type: i32,
    via_sub_ifds: bool,
    visited: &mut HashSet<u32>,
    out: &mut Vec<TiffDirectory>,
) -> Result<()> {
    let mut offset = first;
    let mut dir_type = start_type;
    let mut via_sub = via_sub_ifds;
    loop {
        let next = match walk_one(data, order, offset, dir_type, via_sub, visited, out) {
            Ok(next) => next,
            Err(err) if dir_type == tags::DIRECTORY_TYPE_THUMBNAIL => {
                warn!(error = %err, "dropping unreadable thumbnail directory");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        match next {
            Some(n) if dir_type >= 0 => {
                offset = n;
                dir_type += 1;
                via_sub = false;
            }
            _ => return Ok(()),
        }
    }
}

/// Parse one directory and its sub-directories; returns the next-IFD
/// offset when the directory declares one.
fn walk_one(
    data: &[u8],
    order: ByteOrder,
    offset: u32,
    dir_type: i32,
    via_sub_ifds: bool,
    visited: &mut HashSet<u32>,
    out: &mut Vec<TiffDirectory>,
) -> Result<Option<u32>> {
    if offset as usize >= data.len() {
        // forest is silently truncated at a dangling chain offset
        return Ok(None);
    }
    if !visited.insert(offset) {
        debug!(offset, "directory offset already visited, breaking cycle");
        return Ok(None);
    }

    let reader = ByteReader::new(data);
    let count_bytes = reader.bytes_at(offset as usize, 2)?;
    let entry_count = order.u16_from([count_bytes[0], count_bytes[1]]);

    let mut fields: Vec<TiffField> = Vec::with_capacity(entry_count as usize);
    for index in 0..entry_count as usize {
        let entry_offset = offset as usize + 2 + index * ENTRY_SIZE;
        let entry = reader.bytes_at(entry_offset, ENTRY_SIZE)?;

        let tag_id = order.u16_from([entry[0], entry[1]]);
        if tag_id == 0 && dir_type != tags::DIRECTORY_TYPE_GPS {
            // tag 0 is only meaningful as GPSVersionID inside the GPS IFD
            debug!(dir_type, "skipping tag 0 entry");
            continue;
        }

        let type_code = order.u16_from([entry[2], entry[3]]);
        let field_type = match FieldType::from_code(type_code) {
            Ok(ft) => ft,
            Err(err) => {
                warn!(tag = tag_id, error = %err, "skipping entry with unknown field type");
                continue;
            }
        };

        let count = order.u32_from([entry[4], entry[5], entry[6], entry[7]]);
        let value_or_offset = [entry[8], entry[9], entry[10], entry[11]];

        let byte_len = match (count as usize).checked_mul(field_type.element_size()) {
            Some(len) => len,
            None => {
                warn!(tag = tag_id, count, "skipping entry with overflowing length");
                continue;
            }
        };

        let value = if byte_len <= 4 {
            value_or_offset[..byte_len].to_vec()
        } else {
            let value_offset = order.u32_from(value_or_offset) as usize;
            match reader.bytes_at(value_offset, byte_len) {
                Ok(bytes) => bytes.to_vec(),
                Err(_) => {
                    warn!(tag = tag_id, value_offset, byte_len, "skipping entry with dangling value offset");
                    continue;
                }
            }
        };

        if fields.iter().any(|f| f.tag == tag_id) {
            warn!(tag = tag_id, "skipping duplicate tag within directory");
            continue;
        }

        fields.push(TiffField {
            tag: tag_id,
            dir_type,
            field_type,
            count,
            value,
            value_or_offset,
            byte_order: order,
            sort_hint: index,
        });
    }

    let next_offset_pos = offset as usize + 2 + entry_count as usize * ENTRY_SIZE;
    let next_bytes = reader.bytes_at(next_offset_pos, 4)?;
    let next_directory_offset =
        order.u32_from([next_bytes[0], next_bytes[1], next_bytes[2], next_bytes[3]]);

    let jpeg_thumbnail = capture_thumbnail(data, &fields);

    out.push(TiffDirectory {
        dir_type,
        entered_via_sub_ifds: via_sub_ifds,
        fields,
        offset,
        next_directory_offset,
        byte_order: order,
        jpeg_thumbnail,
    });
    let dir_index = out.len() - 1;

    // semantic sub-directories, in fixed order
    for &(sub_tag, sub_type) in SUB_DIRECTORY_TAGS {
        let sub_offset = match out[dir_index].field(sub_tag) {
            Some(field) => field.first_u32().ok(),
            None => None,
        };
        let Some(sub_offset) = sub_offset else { continue };
        if sub_offset == 0 {
            continue;
        }
        if !descend(data, order, sub_offset, sub_type, false, visited, out) {
            debug!(tag = sub_tag, "removing offset field whose sub-directory failed to parse");
            out[dir_index].remove_field(sub_tag);
        }
    }

    // SubIFDs may carry several offsets; the i-th becomes EXIF_SUB_IFD{i+1}
    let sub_ifd_offsets = out[dir_index]
        .field(tag::SUB_IFDS)
        .and_then(|f| f.u32_values().ok());
    if let Some(offsets) = sub_ifd_offsets {
        let mut failed = false;
        for (i, &sub_offset) in offsets.iter().enumerate() {
            if sub_offset == 0 {
                continue;
            }
            let sub_type = match i {
                0 => tags::EXIF_SUB_IFD1,
                1 => tags::EXIF_SUB_IFD2,
                2 => tags::EXIF_SUB_IFD3,
                _ => tags::DIRECTORY_TYPE_SUB,
            };
            if !descend(data, order, sub_offset, sub_type, true, visited, out) {
                failed = true;
                break;
            }
        }
        if failed {
            debug!("removing SubIFDs field whose sub-directory failed to parse");
            out[dir_index].remove_field(tag::SUB_IFDS);
        }
    }

    Ok((next_directory_offset > 0).then_some(next_directory_offset))
}

/// Recurse into a sub-directory; false means the caller must drop the
/// originating offset field. Partially parsed directories from a failed
/// descent are rolled back.
fn descend(
    data: &[u8],
    order: ByteOrder,
    offset: u32,
    dir_type: i32,
    via_sub_ifds: bool,
    visited: &mut HashSet<u32>,
    out: &mut Vec<TiffDirectory>,
) -> bool {
    if offset as usize >= data.len() {
        return false;
    }
    let snapshot = out.len();
    match walk_chain(data, order, offset, dir_type, via_sub_ifds, visited, out) {
        Ok(()) => true,
        Err(err) => {
            warn!(offset, dir_type, error = %err, "sub-directory parse failed");
            out.truncate(snapshot);
            false
        }
    }
}

/// Capture embedded JPEG thumbnail bytes when the directory declares one;
/// a declared length past the end of the stream is clipped, not fatal.
fn capture_thumbnail(data: &[u8], fields: &[TiffField]) -> Option<Vec<u8>> {
    let offset = fields
        .iter()
        .find(|f| f.tag == tag::JPEG_INTERCHANGE_FORMAT)?
        .first_u32()
        .ok()? as usize;
    let length = fields
        .iter()
        .find(|f| f.tag == tag::JPEG_INTERCHANGE_FORMAT_LENGTH)?
        .first_u32()
        .ok()? as usize;
    if offset >= data.len() {
        return None;
    }
    let end = offset.saturating_add(length).min(data.len());
    Some(data[offset..end].to_vec())
}
