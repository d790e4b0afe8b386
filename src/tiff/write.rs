//! TIFF stream writer.
//!
//! Serializes a [`TiffOutputSet`] in two phases: a topology pass that
//! assigns every directory block, external value blob, and thumbnail
//! payload a tentative offset, then an offset-resolution pass that
//! synthesizes the pointer fields (ExifOffset, GPSInfo, InteropOffset,
//! SubIFDs, the thumbnail tag pair) and chains the image directories.
//! Entries are emitted ascending by tag id; the sort hint only breaks
//! ties.

use tracing::debug;

use super::field_type::{FieldType, Value};
use super::read::{TiffContents, TIFF_VERSION};
use super::tags::{self, tag};
use crate::byteio::ByteOrder;
use crate::error::WriteError;

const ENTRY_SIZE: u32 = 12;

/// Directory types at or below this are maker-note trees
const MAKER_NOTE_DIRECTORY_CEILING: i32 = -100;

/// Tags whose text values are trimmed of NUL padding and whitespace on
/// conversion from a read tree; emptied fields are omitted.
const TRIMMED_TEXT_TAGS: &[u16] = &[tag::COPYRIGHT, tag::ARTIST, tag::USER_COMMENT];

/// Writer-side field: tag, type, count, encoded payload
#[derive(Debug, Clone)]
pub struct TiffOutputField {
    pub tag: u16,
    pub field_type: FieldType,
    pub count: u32,
    pub value: Vec<u8>,
    /// Stable tie-breaker recording the field's original position
    pub sort_hint: usize,
}

impl TiffOutputField {
    pub fn new(tag: u16, field_type: FieldType, count: u32, value: Vec<u8>) -> Self {
        Self {
            tag,
            field_type,
            count,
            value,
            sort_hint: 0,
        }
    }

    /// Build a field from a typed value
    pub fn from_value(tag: u16, value: &Value, order: ByteOrder) -> Self {
        let (field_type, count, bytes) = value.encode(order);
        Self::new(tag, field_type, count, bytes)
    }

    pub fn short(tag: u16, order: ByteOrder, value: u16) -> Self {
        Self::from_value(tag, &Value::Short(vec![value]), order)
    }

    pub fn long(tag: u16, order: ByteOrder, value: u32) -> Self {
        Self::from_value(tag, &Value::Long(vec![value]), order)
    }

    pub fn ascii(tag: u16, text: &str) -> Self {
        let (field_type, count, bytes) =
            Value::Ascii(text.to_string()).encode(ByteOrder::LittleEndian);
        Self::new(tag, field_type, count, bytes)
    }

    pub fn rationals(tag: u16, order: ByteOrder, values: &[(u32, u32)]) -> Self {
        Self::from_value(tag, &Value::Rational(values.to_vec()), order)
    }

    pub fn bytes(tag: u16, field_type: FieldType, data: Vec<u8>) -> Self {
        let count = data.len() as u32;
        Self::new(tag, field_type, count, data)
    }
}

/// Writer-side directory
#[derive(Debug, Clone)]
pub struct TiffOutputDirectory {
    pub dir_type: i32,
    /// Referenced from `SubIFDs` instead of chained
    pub sub_ifd: bool,
    fields: Vec<TiffOutputField>,
    pub jpeg_thumbnail: Option<Vec<u8>>,
}

impl TiffOutputDirectory {
    /// Maker-note sub-trees cannot be written
    pub fn new(dir_type: i32) -> Result<Self, WriteError> {
        if dir_type <= MAKER_NOTE_DIRECTORY_CEILING {
            return Err(WriteError::UnsupportedDirectory(dir_type));
        }
        Ok(Self {
            dir_type,
            sub_ifd: false,
            fields: Vec::new(),
            jpeg_thumbnail: None,
        })
    }

    pub fn fields(&self) -> &[TiffOutputField] {
        &self.fields
    }

    pub fn field(&self, tag: u16) -> Option<&TiffOutputField> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Add a field, replacing any existing field with the same tag
    pub fn set(&mut self, field: TiffOutputField) {
        self.remove(field.tag);
        self.fields.push(field);
    }

    pub fn remove(&mut self, tag: u16) {
        self.fields.retain(|f| f.tag != tag);
    }
}

/// Writer-side mirror of a TIFF forest
#[derive(Debug, Clone)]
pub struct TiffOutputSet {
    pub byte_order: ByteOrder,
    pub directories: Vec<TiffOutputDirectory>,
}

impl TiffOutputSet {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            directories: Vec::new(),
        }
    }

    /// Build an output set mirroring a read tree.
    ///
    /// Offset-carrier tags are dropped (the writer synthesizes them),
    /// Copyright/Artist/UserComment are trimmed, and IFD0 receives an
    /// Orientation of 1 when it has none so later in-place edits have a
    /// byte to patch.
    pub fn from_contents(contents: &TiffContents) -> Result<Self, WriteError> {
        let order = contents.header.byte_order;
        let mut set = TiffOutputSet::new(order);

        for dir in &contents.directories {
            if dir.dir_type <= MAKER_NOTE_DIRECTORY_CEILING {
                debug!(dir_type = dir.dir_type, "maker-note directory not copied");
                continue;
            }
            let mut out_dir = TiffOutputDirectory::new(dir.dir_type)?;
            out_dir.sub_ifd = dir.entered_via_sub_ifds;
            for field in &dir.fields {
                if tags::is_writer_synthesized(field.tag) {
                    continue;
                }
                let mut out_field = TiffOutputField::new(
                    field.tag,
                    field.field_type,
                    field.count,
                    field.value.clone(),
                );
                out_field.sort_hint = field.sort_hint;
                if TRIMMED_TEXT_TAGS.contains(&field.tag) {
                    match trimmed_text(field.field_type, &field.value) {
                        Some(trimmed) => {
                            out_field.count = trimmed.len() as u32;
                            out_field.value = trimmed;
                        }
                        None => continue,
                    }
                }
                out_dir.set(out_field);
            }
            out_dir.jpeg_thumbnail = dir.jpeg_thumbnail.clone();
            set.directories.push(out_dir);
        }

        let root = set.get_or_create(tags::DIRECTORY_TYPE_ROOT)?;
        if root.field(tag::ORIENTATION).is_none() {
            root.set(TiffOutputField::short(tag::ORIENTATION, order, 1));
        }
        Ok(set)
    }

    pub fn directory(&self, dir_type: i32) -> Option<&TiffOutputDirectory> {
        self.directories.iter().find(|d| d.dir_type == dir_type)
    }

    pub fn directory_mut(&mut self, dir_type: i32) -> Option<&mut TiffOutputDirectory> {
        self.directories.iter_mut().find(|d| d.dir_type == dir_type)
    }

    /// Find or append a directory of the given type
    pub fn get_or_create(&mut self, dir_type: i32) -> Result<&mut TiffOutputDirectory, WriteError> {
        if let Some(index) = self.directories.iter().position(|d| d.dir_type == dir_type) {
            return Ok(&mut self.directories[index]);
        }
        self.directories.push(TiffOutputDirectory::new(dir_type)?);
        Ok(self.directories.last_mut().expect("just pushed"))
    }

    /// Serialize the set into a self-consistent TIFF stream
    pub fn serialize(&self) -> Result<Vec<u8>, WriteError> {
        let order = self.byte_order;

        for dir in &self.directories {
            if let Some(field) = dir.fields.iter().find(|f| tags::is_writer_synthesized(f.tag)) {
                return Err(WriteError::InvalidValue(format!(
                    "tag 0x{:04X} is synthesized by the writer and must not be set",
                    field.tag
                )));
            }
        }

        let mut dirs = self.directories.clone();
        // an Interop directory needs an EXIF directory to hold its pointer
        if dirs.iter().any(|d| d.dir_type == tags::DIRECTORY_TYPE_INTEROP)
            && !dirs.iter().any(|d| d.dir_type == tags::DIRECTORY_TYPE_EXIF)
        {
            dirs.push(TiffOutputDirectory::new(tags::DIRECTORY_TYPE_EXIF)?);
        }
        if !dirs
            .iter()
            .any(|d| d.dir_type == tags::DIRECTORY_TYPE_ROOT && !d.sub_ifd)
        {
            return Err(WriteError::InvalidValue(
                "output set has no root directory".to_string(),
            ));
        }

        // phase 1: topology
        let mut planned = plan_order(&dirs);
        synthesize_pointer_fields(&mut planned, order)?;

        for dir in &mut planned {
            dir.fields
                .sort_by_key(|f| (f.field.tag, f.field.sort_hint));
        }

        let mut cursor: u32 = 8;
        for dir in &mut planned {
            dir.offset = cursor;
            cursor += 2 + ENTRY_SIZE * dir.fields.len() as u32 + 4;
        }
        for dir in &mut planned {
            for field in &mut dir.fields {
                if field.field.value.len() > 4 {
                    field.blob_offset = Some(cursor);
                    cursor += field.field.value.len() as u32;
                    cursor += cursor % 2; // word-align the next blob
                }
            }
        }
        for dir in &mut planned {
            if let Some(thumbnail) = &dir.thumbnail {
                dir.thumbnail_offset = cursor;
                cursor += thumbnail.len() as u32;
                cursor += cursor % 2;
            }
        }

        // phase 2: offset resolution
        resolve_pointer_fields(&mut planned, order);
        chain_image_directories(&mut planned);

        // emit
        let mut out = Vec::with_capacity(cursor as usize);
        match order {
            ByteOrder::LittleEndian => out.extend_from_slice(b"II"),
            ByteOrder::BigEndian => out.extend_from_slice(b"MM"),
        }
        order.push_u16(&mut out, TIFF_VERSION);
        order.push_u32(&mut out, planned[0].offset);

        for dir in &planned {
            order.push_u16(&mut out, dir.fields.len() as u16);
            for field in &dir.fields {
                order.push_u16(&mut out, field.field.tag);
                order.push_u16(&mut out, field.field.field_type.code());
                order.push_u32(&mut out, field.field.count);
                match field.blob_offset {
                    Some(offset) => order.push_u32(&mut out, offset),
                    None => {
                        let mut slot = [0u8; 4];
                        slot[..field.field.value.len()].copy_from_slice(&field.field.value);
                        out.extend_from_slice(&slot);
                    }
                }
            }
            order.push_u32(&mut out, dir.next_offset);
        }
        for dir in &planned {
            for field in &dir.fields {
                if let Some(offset) = field.blob_offset {
                    debug_assert_eq!(out.len(), offset as usize);
                    out.extend_from_slice(&field.field.value);
                    if out.len() % 2 == 1 {
                        out.push(0);
                    }
                }
            }
        }
        for dir in &planned {
            if let Some(thumbnail) = &dir.thumbnail {
                debug_assert_eq!(out.len(), dir.thumbnail_offset as usize);
                out.extend_from_slice(thumbnail);
                if out.len() % 2 == 1 {
                    out.push(0);
                }
            }
        }

        Ok(out)
    }
}

fn trimmed_text(field_type: FieldType, value: &[u8]) -> Option<Vec<u8>> {
    let is_pad = |b: &u8| matches!(b, 0 | b' ' | b'\t' | b'\r' | b'\n');
    let start = value.iter().position(|b| !is_pad(b))?;
    let end = value.iter().rposition(|b| !is_pad(b))? + 1;
    let mut trimmed = value[start..end].to_vec();
    if field_type == FieldType::Ascii {
        trimmed.push(0);
    }
    Some(trimmed)
}

#[derive(Debug)]
struct PlannedField {
    field: TiffOutputField,
    blob_offset: Option<u32>,
}

#[derive(Debug)]
struct PlannedDirectory {
    dir_type: i32,
    sub_ifd: bool,
    fields: Vec<PlannedField>,
    thumbnail: Option<Vec<u8>>,
    offset: u32,
    next_offset: u32,
    thumbnail_offset: u32,
}

/// Layout order: IFD0, EXIF, GPS, Interop, sub-IFDs in creation order,
/// IFD1, then the remaining image IFDs.
fn plan_order(dirs: &[TiffOutputDirectory]) -> Vec<PlannedDirectory> {
    let mut indices: Vec<usize> = Vec::with_capacity(dirs.len());
    let push_matching = |indices: &mut Vec<usize>, pred: &dyn Fn(&TiffOutputDirectory) -> bool| {
        for (i, d) in dirs.iter().enumerate() {
            if !indices.contains(&i) && pred(d) {
                indices.push(i);
            }
        }
    };
    push_matching(&mut indices, &|d| {
        d.dir_type == tags::DIRECTORY_TYPE_ROOT && !d.sub_ifd
    });
    push_matching(&mut indices, &|d| d.dir_type == tags::DIRECTORY_TYPE_EXIF);
    push_matching(&mut indices, &|d| d.dir_type == tags::DIRECTORY_TYPE_GPS);
    push_matching(&mut indices, &|d| d.dir_type == tags::DIRECTORY_TYPE_INTEROP);
    push_matching(&mut indices, &|d| d.sub_ifd);
    push_matching(&mut indices, &|d| d.dir_type == tags::DIRECTORY_TYPE_THUMBNAIL);
    push_matching(&mut indices, &|_| true);

    indices
        .into_iter()
        .map(|i| {
            let d = &dirs[i];
            PlannedDirectory {
                dir_type: d.dir_type,
                sub_ifd: d.sub_ifd,
                fields: d
                    .fields
                    .iter()
                    .cloned()
                    .map(|field| PlannedField {
                        field,
                        blob_offset: None,
                    })
                    .collect(),
                thumbnail: d.jpeg_thumbnail.clone(),
                offset: 0,
                next_offset: 0,
                thumbnail_offset: 0,
            }
        })
        .collect()
}

/// Add the pointer fields with placeholder payloads so the size
/// computation sees the final entry counts.
fn synthesize_pointer_fields(
    planned: &mut [PlannedDirectory],
    order: ByteOrder,
) -> Result<(), WriteError> {
    let root = planned
        .iter()
        .position(|d| d.dir_type == tags::DIRECTORY_TYPE_ROOT && !d.sub_ifd)
        .expect("root checked by caller");
    let exif = planned
        .iter()
        .position(|d| d.dir_type == tags::DIRECTORY_TYPE_EXIF);
    let gps = planned
        .iter()
        .position(|d| d.dir_type == tags::DIRECTORY_TYPE_GPS);
    let interop = planned
        .iter()
        .position(|d| d.dir_type == tags::DIRECTORY_TYPE_INTEROP);
    let sub_count = planned.iter().filter(|d| d.sub_ifd).count();

    let mut synth = |dir: usize, tag_id: u16, count: u32| {
        planned[dir].fields.push(PlannedField {
            field: TiffOutputField::new(
                tag_id,
                FieldType::Long,
                count,
                vec![0u8; count as usize * 4],
            ),
            blob_offset: None,
        });
    };

    if exif.is_some() {
        synth(root, tag::EXIF_OFFSET, 1);
    }
    if gps.is_some() {
        synth(root, tag::GPS_INFO, 1);
    }
    if interop.is_some() {
        let exif = exif.expect("interop implies exif directory");
        synth(exif, tag::INTEROP_OFFSET, 1);
    }
    if sub_count > 0 {
        synth(root, tag::SUB_IFDS, sub_count as u32);
    }
    for dir in planned.iter_mut() {
        if let Some(thumbnail) = &dir.thumbnail {
            let length = thumbnail.len() as u32;
            dir.fields.push(PlannedField {
                field: TiffOutputField::new(
                    tag::JPEG_INTERCHANGE_FORMAT,
                    FieldType::Long,
                    1,
                    vec![0u8; 4],
                ),
                blob_offset: None,
            });
            dir.fields.push(PlannedField {
                field: TiffOutputField::new(
                    tag::JPEG_INTERCHANGE_FORMAT_LENGTH,
                    FieldType::Long,
                    1,
                    order.u32_bytes(length).to_vec(),
                ),
                blob_offset: None,
            });
        }
    }
    Ok(())
}

/// Patch the synthesized placeholder payloads with resolved offsets
fn resolve_pointer_fields(planned: &mut [PlannedDirectory], order: ByteOrder) {
    let offset_of = |planned: &[PlannedDirectory], pred: &dyn Fn(&PlannedDirectory) -> bool| {
        planned.iter().find(|d| pred(d)).map(|d| d.offset)
    };
    let exif_offset = offset_of(planned, &|d| d.dir_type == tags::DIRECTORY_TYPE_EXIF);
    let gps_offset = offset_of(planned, &|d| d.dir_type == tags::DIRECTORY_TYPE_GPS);
    let interop_offset = offset_of(planned, &|d| d.dir_type == tags::DIRECTORY_TYPE_INTEROP);
    let sub_offsets: Vec<u32> = planned
        .iter()
        .filter(|d| d.sub_ifd)
        .map(|d| d.offset)
        .collect();

    for dir in planned.iter_mut() {
        let thumbnail_offset = dir.thumbnail_offset;
        for field in &mut dir.fields {
            let value = match field.field.tag {
                tag::EXIF_OFFSET => exif_offset.map(|o| order.u32_bytes(o).to_vec()),
                tag::GPS_INFO => gps_offset.map(|o| order.u32_bytes(o).to_vec()),
                tag::INTEROP_OFFSET => interop_offset.map(|o| order.u32_bytes(o).to_vec()),
                tag::SUB_IFDS => {
                    let mut bytes = Vec::with_capacity(sub_offsets.len() * 4);
                    for &o in &sub_offsets {
                        order.push_u32(&mut bytes, o);
                    }
                    Some(bytes)
                }
                tag::JPEG_INTERCHANGE_FORMAT => {
                    Some(order.u32_bytes(thumbnail_offset).to_vec())
                }
                _ => None,
            };
            if let Some(value) = value {
                debug_assert_eq!(value.len(), field.field.value.len());
                field.field.value = value;
            }
        }
    }
}

/// Chain IFD0 → IFD1 → IFD2 …; sub-directories stay terminal
fn chain_image_directories(planned: &mut [PlannedDirectory]) {
    let mut image_positions: Vec<usize> = (0..planned.len())
        .filter(|&i| planned[i].dir_type >= 0 && !planned[i].sub_ifd)
        .collect();
    image_positions.sort_by_key(|&i| planned[i].dir_type);
    for pair in image_positions.windows(2) {
        planned[pair[0]].next_offset = planned[pair[1]].offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiff::tags::{
        DIRECTORY_TYPE_EXIF, DIRECTORY_TYPE_GPS, DIRECTORY_TYPE_MAKER_NOTE_CANON,
        DIRECTORY_TYPE_ROOT, DIRECTORY_TYPE_THUMBNAIL,
    };
    use crate::tiff::TiffContents;

    fn set_with_orientation(order: ByteOrder, orientation: u16) -> TiffOutputSet {
        let mut set = TiffOutputSet::new(order);
        let root = set.get_or_create(DIRECTORY_TYPE_ROOT).unwrap();
        root.set(TiffOutputField::short(tag::ORIENTATION, order, orientation));
        set
    }

    #[test]
    fn maker_note_directory_rejected() {
        assert!(matches!(
            TiffOutputDirectory::new(DIRECTORY_TYPE_MAKER_NOTE_CANON),
            Err(WriteError::UnsupportedDirectory(-101))
        ));
        assert!(matches!(
            TiffOutputDirectory::new(-102),
            Err(WriteError::UnsupportedDirectory(-102))
        ));
    }

    #[test]
    fn serialize_minimal_set_round_trips() {
        let set = set_with_orientation(ByteOrder::LittleEndian, 6);
        let bytes = set.serialize().unwrap();
        assert_eq!(&bytes[..4], &[b'I', b'I', 42, 0]);

        let contents = TiffContents::parse(&bytes).unwrap();
        let root = contents.root().unwrap();
        assert_eq!(root.fields.len(), 1);
        assert_eq!(root.field(tag::ORIENTATION).unwrap().short_value().unwrap(), 6);
    }

    #[test]
    fn serialize_big_endian() {
        let set = set_with_orientation(ByteOrder::BigEndian, 3);
        let bytes = set.serialize().unwrap();
        assert_eq!(&bytes[..4], &[b'M', b'M', 0, 42]);
        let contents = TiffContents::parse(&bytes).unwrap();
        assert_eq!(
            contents.root().unwrap().field(tag::ORIENTATION).unwrap().short_value().unwrap(),
            3
        );
    }

    #[test]
    fn pointer_fields_are_synthesized_and_resolved() {
        let order = ByteOrder::LittleEndian;
        let mut set = set_with_orientation(order, 1);
        set.get_or_create(DIRECTORY_TYPE_EXIF)
            .unwrap()
            .set(TiffOutputField::ascii(tag::DATE_TIME_ORIGINAL, "2023:07:12 14:48:45"));
        set.get_or_create(DIRECTORY_TYPE_GPS)
            .unwrap()
            .set(TiffOutputField::ascii(tag::GPS_LATITUDE_REF, "N"));

        let bytes = set.serialize().unwrap();
        let contents = TiffContents::parse(&bytes).unwrap();
        assert_eq!(contents.directories.len(), 3);

        let root = contents.root().unwrap();
        assert!(root.field(tag::EXIF_OFFSET).is_some());
        assert!(root.field(tag::GPS_INFO).is_some());

        let exif = contents.directory(DIRECTORY_TYPE_EXIF).unwrap();
        assert_eq!(
            exif.field(tag::DATE_TIME_ORIGINAL).unwrap().ascii_value().unwrap(),
            "2023:07:12 14:48:45"
        );
        let gps = contents.directory(DIRECTORY_TYPE_GPS).unwrap();
        assert_eq!(gps.field(tag::GPS_LATITUDE_REF).unwrap().ascii_value().unwrap(), "N");
    }

    #[test]
    fn caller_materialized_pointer_tag_rejected() {
        let order = ByteOrder::LittleEndian;
        let mut set = set_with_orientation(order, 1);
        set.directory_mut(DIRECTORY_TYPE_ROOT)
            .unwrap()
            .set(TiffOutputField::long(tag::EXIF_OFFSET, order, 1234));
        assert!(matches!(set.serialize(), Err(WriteError::InvalidValue(_))));
    }

    #[test]
    fn entries_emitted_in_tag_order() {
        let order = ByteOrder::LittleEndian;
        let mut set = TiffOutputSet::new(order);
        let root = set.get_or_create(DIRECTORY_TYPE_ROOT).unwrap();
        // insert out of order with adversarial sort hints
        let mut software = TiffOutputField::ascii(tag::SOFTWARE, "meta");
        software.sort_hint = 0;
        let mut width = TiffOutputField::long(tag::IMAGE_WIDTH, order, 640);
        width.sort_hint = 9;
        root.set(software);
        root.set(width);
        root.set(TiffOutputField::short(tag::ORIENTATION, order, 1));

        let bytes = set.serialize().unwrap();
        let contents = TiffContents::parse(&bytes).unwrap();
        let tags_in_order: Vec<u16> = contents.root().unwrap().fields.iter().map(|f| f.tag).collect();
        let mut sorted = tags_in_order.clone();
        sorted.sort_unstable();
        assert_eq!(tags_in_order, sorted);
    }

    #[test]
    fn thumbnail_tags_synthesized() {
        let order = ByteOrder::LittleEndian;
        let mut set = set_with_orientation(order, 1);
        let thumb = vec![0xFF, 0xD8, 0xFF, 0xD9];
        let ifd1 = set.get_or_create(DIRECTORY_TYPE_THUMBNAIL).unwrap();
        ifd1.set(TiffOutputField::short(tag::COMPRESSION, order, 6));
        ifd1.jpeg_thumbnail = Some(thumb.clone());

        let bytes = set.serialize().unwrap();
        let contents = TiffContents::parse(&bytes).unwrap();
        let ifd1 = contents.directory(DIRECTORY_TYPE_THUMBNAIL).unwrap();
        assert!(ifd1.field(tag::JPEG_INTERCHANGE_FORMAT).is_some());
        assert_eq!(ifd1.jpeg_thumbnail.as_deref(), Some(thumb.as_slice()));
    }

    #[test]
    fn from_contents_drops_pointers_and_defaults_orientation() {
        let order = ByteOrder::LittleEndian;
        let mut set = TiffOutputSet::new(order);
        let root = set.get_or_create(DIRECTORY_TYPE_ROOT).unwrap();
        root.set(TiffOutputField::long(tag::IMAGE_WIDTH, order, 640));
        set.get_or_create(DIRECTORY_TYPE_EXIF)
            .unwrap()
            .set(TiffOutputField::ascii(tag::DATE_TIME_ORIGINAL, "2023:01:01 00:00:00"));

        let bytes = set.serialize().unwrap();
        let contents = TiffContents::parse(&bytes).unwrap();
        let rebuilt = TiffOutputSet::from_contents(&contents).unwrap();

        let root = rebuilt.directory(DIRECTORY_TYPE_ROOT).unwrap();
        // ExifOffset dropped, orientation defaulted to 1
        assert!(root.field(tag::EXIF_OFFSET).is_none());
        assert_eq!(root.field(tag::ORIENTATION).unwrap().value[..2], [1, 0]);
        assert!(rebuilt.directory(DIRECTORY_TYPE_EXIF).is_some());
    }

    #[test]
    fn text_tags_trimmed_on_conversion() {
        let order = ByteOrder::LittleEndian;
        let mut set = set_with_orientation(order, 1);
        let root = set.directory_mut(DIRECTORY_TYPE_ROOT).unwrap();
        root.set(TiffOutputField::bytes(
            tag::ARTIST,
            FieldType::Ascii,
            b"  photographer \0\0\0".to_vec(),
        ));
        root.set(TiffOutputField::bytes(
            tag::COPYRIGHT,
            FieldType::Ascii,
            b" \0\0 \0".to_vec(),
        ));

        let bytes = set.serialize().unwrap();
        let contents = TiffContents::parse(&bytes).unwrap();
        let rebuilt = TiffOutputSet::from_contents(&contents).unwrap();
        let root = rebuilt.directory(DIRECTORY_TYPE_ROOT).unwrap();
        assert_eq!(root.field(tag::ARTIST).unwrap().value, b"photographer\0");
        assert!(root.field(tag::COPYRIGHT).is_none());
    }

    #[test]
    fn round_trip_preserves_non_synthesized_fields() {
        let order = ByteOrder::BigEndian;
        let mut set = TiffOutputSet::new(order);
        let root = set.get_or_create(DIRECTORY_TYPE_ROOT).unwrap();
        root.set(TiffOutputField::short(tag::ORIENTATION, order, 8));
        root.set(TiffOutputField::ascii(tag::MAKE, "ACME"));
        root.set(TiffOutputField::rationals(0x011A, order, &[(300, 1)]));
        set.get_or_create(DIRECTORY_TYPE_GPS)
            .unwrap()
            .set(TiffOutputField::rationals(
                tag::GPS_LATITUDE,
                order,
                &[(53, 1), (131_635, 10_000), (0, 1)],
            ));

        let first = set.serialize().unwrap();
        let reparsed = TiffContents::parse(&first).unwrap();
        let second = TiffOutputSet::from_contents(&reparsed).unwrap().serialize().unwrap();
        let reparsed_again = TiffContents::parse(&second).unwrap();

        for dir in &reparsed.directories {
            let again = reparsed_again.directory(dir.dir_type).unwrap();
            for field in &dir.fields {
                if tags::is_writer_synthesized(field.tag) {
                    continue;
                }
                let other = again.field(field.tag).unwrap();
                assert_eq!(field.value, other.value, "tag 0x{:04X}", field.tag);
            }
        }
    }
}
