//! Error types for metadata-io

use crate::containers::Container;
use crate::tiff::FieldType;

/// Result type for metadata-io read operations
pub type Result<T, E = ReadError> = std::result::Result<T, E>;

/// Errors that can occur while parsing an image or one of its metadata
/// dialects.
///
/// Entry-level problems (a bad field, a dangling offset, an unknown field
/// type) are absorbed by the parsers and never surface here; these
/// variants cover header-level and directory-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The input does not start with a recognized container signature
    #[error("unrecognized image container (bad magic number)")]
    InvalidMagic,

    /// The two TIFF byte-order bytes disagree or are neither `II` nor `MM`
    #[error("invalid TIFF byte order bytes")]
    InvalidByteOrder,

    /// A read crossed the end of the input
    #[error("truncated input: needed {needed} bytes at offset {offset}")]
    TruncatedInput { offset: usize, needed: usize },

    /// A TIFF stream parsed cleanly but yielded no directories
    #[error("TIFF stream contains no directories")]
    NoDirectories,

    /// A field the caller requires is absent
    #[error("missing required field {0}")]
    MissingRequiredField(&'static str),

    /// A field is present but carries an unexpected field type
    #[error("field {name}: expected {expected}, found {actual}")]
    FieldTypeMismatch {
        name: String,
        expected: FieldType,
        actual: FieldType,
    },

    /// A field is present but carries an unexpected element count
    #[error("field {0}: unexpected element count")]
    FieldCountMismatch(String),

    /// A TIFF entry declared a field type code outside the known range
    #[error("unknown TIFF field type code {0}")]
    UnknownFieldType(u16),

    /// XML parsing error (from quick-xml) while handling an XMP packet
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Errors that can occur while preparing or emitting an update.
///
/// A failed update never modifies the output; the writers buffer
/// in-memory before emission.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// Output directories cannot be created for maker-note sub-trees
    #[error("cannot create an output directory for directory type {0}")]
    UnsupportedDirectory(i32),

    /// The serialized EXIF payload does not fit a single JPEG segment
    #[error("EXIF payload of {0} bytes exceeds the JPEG segment limit")]
    ExifTooLarge(usize),

    /// The update would invalidate offsets referenced from `meta/iloc`
    #[error("update would shift iloc-referenced offsets")]
    IlocOffsetShift,

    /// A value in the update request is out of range or malformed
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// The container has no metadata embedding path
    #[error("no update path for {0} input")]
    UnsupportedContainer(Container),

    /// A read error occurred while preparing the output set
    #[error(transparent)]
    Read(#[from] ReadError),
}
