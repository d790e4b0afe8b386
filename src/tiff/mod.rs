//! TIFF/IFD tree reading and writing.
//!
//! TIFF Structure:
//! - Header: byte order (II/MM), version (0x002A), first IFD offset
//! - IFD (Image File Directory): entry count, entries (12 bytes each),
//!   next IFD offset
//! - Entry: tag (2), type (2), count (4), value-or-offset (4)
//!
//! The reader ([`TiffContents::parse`]) walks the whole forest including
//! offset-linked sub-directories; the writer ([`TiffOutputSet`]) re-emits
//! a forest with resolved offsets. Cross-references between directories
//! are directory-type ids plus offsets, never owning references.

mod field_type;
pub mod tags;
mod read;
mod write;

pub use field_type::{FieldType, Value};
pub use read::{read_header, TiffContents, TiffDirectory, TiffField, TiffHeader, TIFF_VERSION};
pub use write::{TiffOutputDirectory, TiffOutputField, TiffOutputSet};
