//! Lossless metadata I/O for still-image containers.
//!
//! This crate parses and rewrites the metadata carried inside JPEG,
//! TIFF, RAF, JPEG XL and ISO-BMFF (HEIC/AVIF) files, exposing one
//! read/update surface over the three embedded dialects: EXIF/TIFF IFD
//! trees, XMP packets, and IPTC IIM records.
//!
//! # Design Principles
//!
//! - **Lossless**: updates splice metadata segments only; the encoded
//!   pixel payload is copied byte-for-byte
//! - **Whole-buffer**: operations are pure functions from input bytes
//!   (plus an update) to output bytes; no background state
//! - **Tolerant reader, strict writer**: damaged fields and dangling
//!   offsets are skipped on read, while the writer only emits
//!   self-consistent streams
//!
//! # Reading
//!
//! ```no_run
//! # fn main() -> metadata_io::Result<()> {
//! let bytes = std::fs::read("image.jpg").expect("read file");
//! let metadata = metadata_io::read_metadata(&bytes)?;
//!
//! if let Some(tiff) = &metadata.tiff {
//!     println!("{} IFDs", tiff.directories.len());
//! }
//! if let Some(xmp) = &metadata.xmp {
//!     println!("XMP: {} bytes", xmp.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Updating
//!
//! ```no_run
//! use metadata_io::{MetadataUpdate, MetadataUpdater, Orientation};
//!
//! # fn main() -> Result<(), metadata_io::WriteError> {
//! let bytes = std::fs::read("image.jpg").expect("read file");
//! let updater = MetadataUpdater::new();
//! let rotated = updater.apply(&bytes, &MetadataUpdate::Orientation(Orientation::RotateRight))?;
//! std::fs::write("image.jpg", rotated).expect("write file");
//! # Ok(())
//! # }
//! ```

pub mod byteio;
pub mod containers;
mod error;
pub mod iptc;
pub mod tiff;
mod updates;
pub mod xmp;

pub use byteio::ByteOrder;
pub use containers::Container;
pub use error::{ReadError, Result, WriteError};
pub use iptc::{IptcMetadata, IptcRecord};
pub use tiff::{TiffContents, TiffDirectory, TiffField, TiffOutputDirectory, TiffOutputField, TiffOutputSet};
pub use updates::{
    FixedZone, GpsCoordinates, MetadataUpdate, MetadataUpdater, Orientation, SystemZone,
    ZoneProvider,
};

// Fixture builders - compiled for tests or when explicitly enabled
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use crate::tiff::tags::{tag, DIRECTORY_TYPE_ROOT};

/// The three metadata trees of one image, parsed up front and never
/// mutated afterwards
#[derive(Debug, Clone)]
pub struct ImageMetadata {
    pub container: Container,
    /// The EXIF/TIFF IFD forest, when the image carries one
    pub tiff: Option<TiffContents>,
    /// The raw XMP packet
    pub xmp: Option<String>,
    /// IPTC IIM records from the Photoshop IRB (JPEG) or the IPTC-NAA
    /// tag (TIFF)
    pub iptc: Option<IptcMetadata>,
}

impl ImageMetadata {
    /// The IFD0 orientation value, when present
    pub fn orientation(&self) -> Option<u16> {
        self.tiff
            .as_ref()?
            .find_field(DIRECTORY_TYPE_ROOT, tag::ORIENTATION)?
            .short_value()
            .ok()
    }
}

/// Parse every metadata dialect an image carries.
///
/// The container is detected by magic number; see [`containers::sniff`].
pub fn read_metadata(data: &[u8]) -> Result<ImageMetadata> {
    let container = containers::sniff(data)?;
    match container {
        Container::Jpeg => read_jpeg_metadata(data, container),
        Container::Raf => {
            let jpeg = containers::raf_embedded_jpeg(data)?;
            read_jpeg_metadata(&jpeg, container)
        }
        Container::Tiff => {
            let contents = TiffContents::parse(data)?;
            let xmp = contents
                .find_field(DIRECTORY_TYPE_ROOT, tag::XMP)
                .map(|f| String::from_utf8_lossy(&f.value).into_owned());
            let iptc = contents
                .find_field(DIRECTORY_TYPE_ROOT, tag::IPTC_NAA)
                .map(|f| IptcMetadata::parse(&f.value));
            Ok(ImageMetadata {
                container,
                tiff: Some(contents),
                xmp,
                iptc,
            })
        }
        Container::Bmff => {
            let tiff = containers::bmff_io::read_exif(data, false)?
                .map(|bytes| TiffContents::parse(&bytes))
                .transpose()?;
            let xmp = containers::bmff_io::read_xmp(data, false)?
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
            Ok(ImageMetadata {
                container,
                tiff,
                xmp,
                iptc: None,
            })
        }
        Container::JxlCodestream => Ok(ImageMetadata {
            container,
            tiff: None,
            xmp: None,
            iptc: None,
        }),
    }
}

fn read_jpeg_metadata(data: &[u8], container: Container) -> Result<ImageMetadata> {
    let tiff = containers::jpeg_io::extract_exif(data)?
        .map(|bytes| TiffContents::parse(&bytes))
        .transpose()?;
    let xmp = containers::jpeg_io::extract_xmp(data)?
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
    let iptc = containers::jpeg_io::extract_iptc(data)?.map(|iim| IptcMetadata::parse(&iim));
    Ok(ImageMetadata {
        container,
        tiff,
        xmp,
        iptc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byteio::ByteOrder;
    use crate::test_utils::{jpeg_with_orientation, minimal_jpeg};

    #[test]
    fn reads_jpeg_metadata() {
        let jpeg = jpeg_with_orientation(ByteOrder::LittleEndian, 6);
        let metadata = read_metadata(&jpeg).unwrap();
        assert_eq!(metadata.container, Container::Jpeg);
        assert_eq!(metadata.orientation(), Some(6));
        assert!(metadata.xmp.is_none());
        assert!(metadata.iptc.is_none());
    }

    #[test]
    fn reads_raf_embedded_jpeg() {
        let mut raf = b"FUJIFILMCCD-RAW ".to_vec();
        raf.extend_from_slice(&[0u8; 16]);
        raf.extend_from_slice(&jpeg_with_orientation(ByteOrder::BigEndian, 3));
        let metadata = read_metadata(&raf).unwrap();
        assert_eq!(metadata.container, Container::Raf);
        assert_eq!(metadata.orientation(), Some(3));
    }

    #[test]
    fn jpeg_without_metadata_reads_empty() {
        let metadata = read_metadata(&minimal_jpeg()).unwrap();
        assert!(metadata.tiff.is_none());
        assert_eq!(metadata.orientation(), None);
    }

    #[test]
    fn unknown_magic_rejected() {
        assert!(matches!(
            read_metadata(b"\x89PNG\r\n\x1a\n"),
            Err(ReadError::InvalidMagic)
        ));
    }
}
