//! Static tag metadata and directory-type ids.
//!
//! Directory types are stable integers, not ordinals: non-negative ids
//! are image directories (IFD0, IFD1, ...), negative ids are semantic
//! sub-directories reached through offset-carrying tags.

use super::field_type::FieldType;

/// IFD0, the root image directory
pub const DIRECTORY_TYPE_ROOT: i32 = 0;
/// IFD1, the thumbnail directory
pub const DIRECTORY_TYPE_THUMBNAIL: i32 = 1;
/// Second/third/fourth image IFDs; also the first three `SubIFDs` targets
pub const EXIF_SUB_IFD1: i32 = 2;
pub const EXIF_SUB_IFD2: i32 = 3;
pub const EXIF_SUB_IFD3: i32 = 4;
/// `SubIFDs` targets beyond the third
pub const DIRECTORY_TYPE_SUB: i32 = -5;
/// Wildcard used by consumers that do not care about the directory
pub const DIRECTORY_TYPE_UNKNOWN: i32 = -1;
/// EXIF sub-directory (via `ExifOffset`)
pub const DIRECTORY_TYPE_EXIF: i32 = -2;
/// GPS sub-directory (via `GPSInfo`)
pub const DIRECTORY_TYPE_GPS: i32 = -3;
/// Interoperability sub-directory (via `InteropOffset`)
pub const DIRECTORY_TYPE_INTEROP: i32 = -4;
/// Maker-note trees; parsed never, written never
pub const DIRECTORY_TYPE_MAKER_NOTE_CANON: i32 = -101;
pub const DIRECTORY_TYPE_MAKER_NOTE_NIKON: i32 = -102;

/// Well-known tag ids
pub mod tag {
    pub const GPS_VERSION_ID: u16 = 0x0000;
    pub const GPS_LATITUDE_REF: u16 = 0x0001;
    pub const GPS_LATITUDE: u16 = 0x0002;
    pub const GPS_LONGITUDE_REF: u16 = 0x0003;
    pub const GPS_LONGITUDE: u16 = 0x0004;

    pub const IMAGE_WIDTH: u16 = 0x0100;
    pub const IMAGE_LENGTH: u16 = 0x0101;
    pub const COMPRESSION: u16 = 0x0103;
    pub const MAKE: u16 = 0x010F;
    pub const MODEL: u16 = 0x0110;
    pub const ORIENTATION: u16 = 0x0112;
    pub const JPEG_INTERCHANGE_FORMAT: u16 = 0x0201;
    pub const JPEG_INTERCHANGE_FORMAT_LENGTH: u16 = 0x0202;
    pub const SOFTWARE: u16 = 0x0131;
    pub const DATE_TIME: u16 = 0x0132;
    pub const ARTIST: u16 = 0x013B;
    pub const SUB_IFDS: u16 = 0x014A;
    pub const XMP: u16 = 0x02BC;
    pub const RATING: u16 = 0x4746;
    pub const IPTC_NAA: u16 = 0x83BB;
    pub const COPYRIGHT: u16 = 0x8298;
    pub const EXIF_OFFSET: u16 = 0x8769;
    pub const GPS_INFO: u16 = 0x8825;
    pub const DATE_TIME_ORIGINAL: u16 = 0x9003;
    pub const DATE_TIME_DIGITIZED: u16 = 0x9004;
    pub const USER_COMMENT: u16 = 0x9286;
    pub const SUB_SEC_TIME_ORIGINAL: u16 = 0x9291;
    pub const INTEROP_OFFSET: u16 = 0xA005;
}

/// How many values a known tag carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// Exactly `n` elements
    Fixed(u32),
    /// Any number of elements
    Variable,
}

/// Static metadata for a known tag
#[derive(Debug, Clone, Copy)]
pub struct TagInfo {
    pub tag: u16,
    pub name: &'static str,
    /// Directory the tag normally lives in; `DIRECTORY_TYPE_UNKNOWN` for
    /// tags valid in any image directory
    pub directory: i32,
    pub field_type: FieldType,
    pub multiplicity: Multiplicity,
    /// Whether the value is a byte offset into the TIFF stream
    pub carries_offset: bool,
}

use self::Multiplicity::{Fixed, Variable};

const fn info(
    tag: u16,
    name: &'static str,
    directory: i32,
    field_type: FieldType,
    multiplicity: Multiplicity,
    carries_offset: bool,
) -> TagInfo {
    TagInfo {
        tag,
        name,
        directory,
        field_type,
        multiplicity,
        carries_offset,
    }
}

/// The known-tag catalog. Kept sorted by (directory class, tag id) for
/// readability; lookup is linear, the table is small.
pub static KNOWN_TAGS: &[TagInfo] = &[
    info(tag::IMAGE_WIDTH, "ImageWidth", DIRECTORY_TYPE_UNKNOWN, FieldType::Long, Fixed(1), false),
    info(tag::IMAGE_LENGTH, "ImageLength", DIRECTORY_TYPE_UNKNOWN, FieldType::Long, Fixed(1), false),
    info(tag::COMPRESSION, "Compression", DIRECTORY_TYPE_UNKNOWN, FieldType::Short, Fixed(1), false),
    info(tag::MAKE, "Make", DIRECTORY_TYPE_ROOT, FieldType::Ascii, Variable, false),
    info(tag::MODEL, "Model", DIRECTORY_TYPE_ROOT, FieldType::Ascii, Variable, false),
    info(tag::ORIENTATION, "Orientation", DIRECTORY_TYPE_ROOT, FieldType::Short, Fixed(1), false),
    info(tag::SOFTWARE, "Software", DIRECTORY_TYPE_ROOT, FieldType::Ascii, Variable, false),
    info(tag::DATE_TIME, "DateTime", DIRECTORY_TYPE_ROOT, FieldType::Ascii, Fixed(20), false),
    info(tag::ARTIST, "Artist", DIRECTORY_TYPE_ROOT, FieldType::Ascii, Variable, false),
    info(tag::SUB_IFDS, "SubIFDs", DIRECTORY_TYPE_ROOT, FieldType::Long, Variable, true),
    info(tag::XMP, "XMP", DIRECTORY_TYPE_ROOT, FieldType::Byte, Variable, false),
    info(tag::RATING, "Rating", DIRECTORY_TYPE_ROOT, FieldType::Short, Fixed(1), false),
    info(tag::IPTC_NAA, "IPTC-NAA", DIRECTORY_TYPE_ROOT, FieldType::Undefined, Variable, false),
    info(tag::COPYRIGHT, "Copyright", DIRECTORY_TYPE_ROOT, FieldType::Ascii, Variable, false),
    info(tag::EXIF_OFFSET, "ExifOffset", DIRECTORY_TYPE_ROOT, FieldType::Long, Fixed(1), true),
    info(tag::GPS_INFO, "GPSInfo", DIRECTORY_TYPE_ROOT, FieldType::Long, Fixed(1), true),
    info(
        tag::JPEG_INTERCHANGE_FORMAT,
        "JPEGInterchangeFormat",
        DIRECTORY_TYPE_THUMBNAIL,
        FieldType::Long,
        Fixed(1),
        true,
    ),
    info(
        tag::JPEG_INTERCHANGE_FORMAT_LENGTH,
        "JPEGInterchangeFormatLength",
        DIRECTORY_TYPE_THUMBNAIL,
        FieldType::Long,
        Fixed(1),
        false,
    ),
    info(
        tag::DATE_TIME_ORIGINAL,
        "DateTimeOriginal",
        DIRECTORY_TYPE_EXIF,
        FieldType::Ascii,
        Fixed(20),
        false,
    ),
    info(
        tag::DATE_TIME_DIGITIZED,
        "DateTimeDigitized",
        DIRECTORY_TYPE_EXIF,
        FieldType::Ascii,
        Fixed(20),
        false,
    ),
    info(tag::USER_COMMENT, "UserComment", DIRECTORY_TYPE_EXIF, FieldType::Undefined, Variable, false),
    info(
        tag::SUB_SEC_TIME_ORIGINAL,
        "SubSecTimeOriginal",
        DIRECTORY_TYPE_EXIF,
        FieldType::Ascii,
        Variable,
        false,
    ),
    info(tag::INTEROP_OFFSET, "InteropOffset", DIRECTORY_TYPE_EXIF, FieldType::Long, Fixed(1), true),
    info(tag::GPS_VERSION_ID, "GPSVersionID", DIRECTORY_TYPE_GPS, FieldType::Byte, Fixed(4), false),
    info(tag::GPS_LATITUDE_REF, "GPSLatitudeRef", DIRECTORY_TYPE_GPS, FieldType::Ascii, Fixed(2), false),
    info(tag::GPS_LATITUDE, "GPSLatitude", DIRECTORY_TYPE_GPS, FieldType::Rational, Fixed(3), false),
    info(tag::GPS_LONGITUDE_REF, "GPSLongitudeRef", DIRECTORY_TYPE_GPS, FieldType::Ascii, Fixed(2), false),
    info(tag::GPS_LONGITUDE, "GPSLongitude", DIRECTORY_TYPE_GPS, FieldType::Rational, Fixed(3), false),
];

/// Look up a tag, preferring an entry whose directory affinity matches
pub fn lookup(tag: u16, dir_type: i32) -> Option<&'static TagInfo> {
    let mut fallback = None;
    for entry in KNOWN_TAGS {
        if entry.tag != tag {
            continue;
        }
        if entry.directory == dir_type {
            return Some(entry);
        }
        if fallback.is_none() {
            fallback = Some(entry);
        }
    }
    fallback
}

/// Display name for a tag, `Tag(0xNNNN)` when unknown
pub fn tag_name(tag: u16, dir_type: i32) -> String {
    match lookup(tag, dir_type) {
        Some(entry) => entry.name.to_string(),
        None => format!("Tag(0x{tag:04X})"),
    }
}

/// Tags the TIFF writer synthesizes; callers must not materialize them
pub const WRITER_SYNTHESIZED_TAGS: &[u16] = &[
    tag::EXIF_OFFSET,
    tag::GPS_INFO,
    tag::INTEROP_OFFSET,
    tag::SUB_IFDS,
    tag::JPEG_INTERCHANGE_FORMAT,
    tag::JPEG_INTERCHANGE_FORMAT_LENGTH,
];

pub fn is_writer_synthesized(tag: u16) -> bool {
    WRITER_SYNTHESIZED_TAGS.contains(&tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_prefers_directory_affinity() {
        // tag 0x0001 is GPSLatitudeRef only in the GPS directory
        let gps = lookup(tag::GPS_LATITUDE_REF, DIRECTORY_TYPE_GPS).unwrap();
        assert_eq!(gps.name, "GPSLatitudeRef");

        let orientation = lookup(tag::ORIENTATION, DIRECTORY_TYPE_ROOT).unwrap();
        assert_eq!(orientation.field_type, FieldType::Short);
        assert!(!orientation.carries_offset);
    }

    #[test]
    fn offset_carriers_flagged() {
        for &t in WRITER_SYNTHESIZED_TAGS {
            assert!(is_writer_synthesized(t));
        }
        assert!(!is_writer_synthesized(tag::ORIENTATION));
        assert!(lookup(tag::EXIF_OFFSET, DIRECTORY_TYPE_ROOT).unwrap().carries_offset);
    }

    #[test]
    fn unknown_tag_name() {
        assert_eq!(tag_name(0xBEEF, DIRECTORY_TYPE_ROOT), "Tag(0xBEEF)");
        assert_eq!(tag_name(tag::ORIENTATION, DIRECTORY_TYPE_ROOT), "Orientation");
    }
}
