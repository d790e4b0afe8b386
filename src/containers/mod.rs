//! Container-specific I/O.
//!
//! Each envelope format has an I/O module that knows how to locate and
//! splice its metadata payloads; this module holds the container kinds,
//! the magic-number sniffing that dispatches between them, and RAF's
//! embedded-JPEG discovery.

pub mod bmff_io;
pub mod jpeg_io;

use crate::byteio::PrependReader;
use crate::error::{ReadError, Result};

/// RAF magic at offset 0
const RAF_SIGNATURE: &[u8] = b"FUJIFILMCCD-RAW";

/// Container format detected from the input's magic number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    /// JPEG marker stream (`FF D8 FF`)
    Jpeg,
    /// TIFF and its raw derivatives, DNG/ARW/NEF (`II*\0` / `MM\0*`)
    Tiff,
    /// ISO Base Media File Format: HEIC/HEIF/AVIF/JXL-container/MP4
    /// (`ftyp` at offset 4)
    Bmff,
    /// Naked JPEG XL codestream (`FF 0A`), no metadata container
    JxlCodestream,
    /// Fujifilm RAF with an embedded JPEG
    Raf,
}

impl Container {
    pub fn as_str(&self) -> &'static str {
        match self {
            Container::Jpeg => "JPEG",
            Container::Tiff => "TIFF",
            Container::Bmff => "ISO-BMFF",
            Container::JxlCodestream => "JPEG XL codestream",
            Container::Raf => "RAF",
        }
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the container from the magic number at offset 0
pub fn sniff(data: &[u8]) -> Result<Container> {
    if data.len() >= 3 && data[0] == 0xFF && data[1] == 0xD8 && data[2] == 0xFF {
        return Ok(Container::Jpeg);
    }
    if data.len() >= 4 && (&data[..4] == b"II\x2A\x00" || &data[..4] == b"MM\x00\x2A") {
        return Ok(Container::Tiff);
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return Ok(Container::Bmff);
    }
    if data.len() >= 2 && data[0] == 0xFF && data[1] == 0x0A {
        return Ok(Container::JxlCodestream);
    }
    if data.starts_with(RAF_SIGNATURE) {
        return Ok(Container::Raf);
    }
    Err(ReadError::InvalidMagic)
}

/// Extract the JPEG embedded in a RAF file.
///
/// The JPEG sits at a byte-aligned offset past the RAF header,
/// discoverable by scanning for its SOI marker. The embedded stream is
/// presented behind a [`PrependReader`] that re-synthesizes the SOI in
/// front of the remainder.
pub fn raf_embedded_jpeg(data: &[u8]) -> Result<Vec<u8>> {
    if !data.starts_with(RAF_SIGNATURE) {
        return Err(ReadError::InvalidMagic);
    }
    let start = data[RAF_SIGNATURE.len()..]
        .windows(3)
        .position(|w| w == [0xFF, 0xD8, 0xFF])
        .map(|p| p + RAF_SIGNATURE.len())
        .ok_or(ReadError::InvalidMagic)?;
    let reader = PrependReader::new(&[0xFF, 0xD8], &data[start + 2..]);
    Ok(reader.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ftyp_box, minimal_jpeg};

    #[test]
    fn sniffs_known_magics() {
        assert_eq!(sniff(&minimal_jpeg()).unwrap(), Container::Jpeg);
        assert_eq!(sniff(b"II\x2A\x00\x08\x00\x00\x00").unwrap(), Container::Tiff);
        assert_eq!(sniff(b"MM\x00\x2A\x00\x00\x00\x08").unwrap(), Container::Tiff);
        assert_eq!(sniff(&ftyp_box(b"heic")).unwrap(), Container::Bmff);
        assert_eq!(sniff(&[0xFF, 0x0A, 0x00]).unwrap(), Container::JxlCodestream);
        assert!(matches!(sniff(b"PNG..."), Err(ReadError::InvalidMagic)));
    }

    #[test]
    fn raf_jpeg_discovery() {
        let jpeg = minimal_jpeg();
        let mut raf = RAF_SIGNATURE.to_vec();
        raf.extend_from_slice(b"0201FF129502"); // header fields, no SOI
        raf.extend_from_slice(&jpeg);
        assert_eq!(sniff(&raf).unwrap(), Container::Raf);
        assert_eq!(raf_embedded_jpeg(&raf).unwrap(), jpeg);
    }

    #[test]
    fn raf_without_jpeg_is_an_error() {
        let mut raf = RAF_SIGNATURE.to_vec();
        raf.extend_from_slice(&[0u8; 32]);
        assert!(raf_embedded_jpeg(&raf).is_err());
    }
}
