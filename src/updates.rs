//! Typed metadata updates and the coordinator that projects them onto
//! the three dialects.
//!
//! For every update the coordinator runs, in fixed order: XMP update →
//! EXIF update → IPTC update. XMP is the authoritative copy for rating,
//! keywords and persons and is always rewritten; the EXIF stage
//! consumes bytes already carrying the new XMP so its splice cannot
//! disturb it; IPTC (keywords only) comes last and sees the already
//! updated container. A sub-update is a no-op when the variant is
//! irrelevant to that dialect.

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone};
use tracing::debug;

use crate::containers::{self, bmff_io, jpeg_io, Container};
use crate::error::WriteError;
use crate::iptc::IptcMetadata;
use crate::tiff::tags::{tag, DIRECTORY_TYPE_EXIF, DIRECTORY_TYPE_GPS, DIRECTORY_TYPE_ROOT};
use crate::tiff::{FieldType, TiffContents, TiffOutputField, TiffOutputSet};
use crate::xmp::{
    SerializeOptions, SimpleXmp, XmpArrayKind, XmpDocument, XmpToolkit, NS_DC, NS_EXIF,
    NS_MICROSOFT_PHOTO, NS_TIFF, NS_XMP,
};

/// EXIF orientation values 1–8
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Orientation {
    Standard = 1,
    FlipHorizontal = 2,
    Rotate180 = 3,
    FlipVertical = 4,
    Transpose = 5,
    RotateRight = 6,
    Transverse = 7,
    RotateLeft = 8,
}

impl Orientation {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Some(match value {
            1 => Orientation::Standard,
            2 => Orientation::FlipHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipVertical,
            5 => Orientation::Transpose,
            6 => Orientation::RotateRight,
            7 => Orientation::Transverse,
            8 => Orientation::RotateLeft,
            _ => return None,
        })
    }
}

/// Decimal GPS coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsCoordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Latitude in degrees/decimal-minutes form, e.g. `53,13.1635N`
    pub fn latitude_ddm(&self) -> String {
        ddm(self.latitude, 'N', 'S')
    }

    /// Longitude in degrees/decimal-minutes form, e.g. `8,14.3797E`
    pub fn longitude_ddm(&self) -> String {
        ddm(self.longitude, 'E', 'W')
    }

    fn latitude_rationals(&self) -> [(u32, u32); 3] {
        ddm_rationals(self.latitude)
    }

    fn longitude_rationals(&self) -> [(u32, u32); 3] {
        ddm_rationals(self.longitude)
    }
}

/// Degrees are the integer floor of the absolute value; minutes are the
/// remainder × 60 with four decimal places; the sign selects the
/// hemisphere letter (0.0 is north/east).
fn ddm(value: f64, positive: char, negative: char) -> String {
    let hemisphere = if value < 0.0 { negative } else { positive };
    let abs = value.abs();
    let degrees = abs.floor();
    let minutes = (abs - degrees) * 60.0;
    format!("{},{:.4}{}", degrees as u32, minutes, hemisphere)
}

fn ddm_rationals(value: f64) -> [(u32, u32); 3] {
    let abs = value.abs();
    let degrees = abs.floor();
    let minutes = (abs - degrees) * 60.0;
    [
        (degrees as u32, 1),
        ((minutes * 10_000.0).round() as u32, 10_000),
        (0, 1),
    ]
}

/// A typed metadata update request
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataUpdate {
    /// Set the orientation in XMP and EXIF
    Orientation(Orientation),
    /// Set or clear the capture time (epoch milliseconds)
    TakenDate(Option<i64>),
    /// Set or clear the GPS position
    GpsCoordinates(Option<GpsCoordinates>),
    /// Set the XMP rating, −1 (rejected) through 5
    Rating(i32),
    /// Replace the keyword set in XMP and IPTC
    Keywords(BTreeSet<String>),
    /// Replace the persons-in-image set in XMP
    Persons(BTreeSet<String>),
}

/// Supplies the local UTC offset used for date rendering.
///
/// Production code uses [`SystemZone`]; tests inject a [`FixedZone`] so
/// rendered dates are reproducible.
pub trait ZoneProvider {
    fn zone_offset(&self) -> FixedOffset;
}

/// The ambient system zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemZone;

impl ZoneProvider for SystemZone {
    fn zone_offset(&self) -> FixedOffset {
        Local::now().offset().fix()
    }
}

/// A fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct FixedZone(pub FixedOffset);

impl ZoneProvider for FixedZone {
    fn zone_offset(&self) -> FixedOffset {
        self.0
    }
}

/// Applies [`MetadataUpdate`]s to image buffers.
///
/// A failed update returns the error without producing output bytes;
/// all writers buffer in memory first.
#[derive(Debug, Clone)]
pub struct MetadataUpdater<X = SimpleXmp, Z = SystemZone> {
    xmp: X,
    zone: Z,
}

impl MetadataUpdater {
    pub fn new() -> Self {
        Self {
            xmp: SimpleXmp,
            zone: SystemZone,
        }
    }
}

impl Default for MetadataUpdater {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: XmpToolkit, Z: ZoneProvider> MetadataUpdater<X, Z> {
    /// Build a coordinator with an explicit XMP toolkit and zone provider
    pub fn with_parts(xmp: X, zone: Z) -> Self {
        Self { xmp, zone }
    }

    /// Apply one update, returning the rewritten bytes
    pub fn apply(&self, data: &[u8], update: &MetadataUpdate) -> Result<Vec<u8>, WriteError> {
        validate(update)?;
        let container = containers::sniff(data)?;
        match container {
            Container::Jpeg => self.apply_jpeg(data, update),
            Container::Bmff => self.apply_bmff(data, update),
            other => Err(WriteError::UnsupportedContainer(other)),
        }
    }

    fn apply_jpeg(&self, data: &[u8], update: &MetadataUpdate) -> Result<Vec<u8>, WriteError> {
        let existing = jpeg_io::extract_xmp(data)?;
        let packet = self.projected_xmp(existing.as_deref(), update)?;
        let mut out = jpeg_io::update_xmp(data, packet.as_bytes())?;

        if exif_relevant(update) {
            let mut patched = false;
            if let MetadataUpdate::Orientation(orientation) = update {
                patched = jpeg_io::patch_orientation(&mut out, orientation.value());
                if patched {
                    debug!("orientation patched in place");
                }
            }
            if !patched {
                let set = match jpeg_io::extract_exif(&out)? {
                    Some(tiff) => TiffOutputSet::from_contents(&TiffContents::parse(&tiff)?)?,
                    None => fresh_output_set()?,
                };
                let set = self.projected_exif(set, update)?;
                out = jpeg_io::update_exif(&out, &set)?;
            }
        }

        if let MetadataUpdate::Keywords(keywords) = update {
            let mut iptc = jpeg_io::extract_iptc(&out)?
                .map(|iim| IptcMetadata::parse(&iim))
                .unwrap_or_default();
            iptc.set_keywords(keywords);
            out = jpeg_io::write_iptc(&out, &iptc)?;
        }

        Ok(out)
    }

    fn apply_bmff(&self, data: &[u8], update: &MetadataUpdate) -> Result<Vec<u8>, WriteError> {
        let existing = bmff_io::read_xmp(data, false)?;
        let packet = self.projected_xmp(existing.as_deref(), update)?;
        let mut out = bmff_io::replace_xmp(data, packet.as_bytes())?;

        if exif_relevant(update) {
            let set = match bmff_io::read_exif(&out, false)? {
                Some(tiff) => TiffOutputSet::from_contents(&TiffContents::parse(&tiff)?)?,
                None => fresh_output_set()?,
            };
            let set = self.projected_exif(set, update)?;
            out = bmff_io::replace_exif(&out, &set.serialize()?)?;
        }

        // IPTC is carried only by the JPEG/Photoshop envelope
        Ok(out)
    }

    /// Parse (or create) the XMP document, project the update, serialize
    /// without the packet wrapper for embedding
    fn projected_xmp(
        &self,
        existing: Option<&[u8]>,
        update: &MetadataUpdate,
    ) -> Result<String, WriteError> {
        let mut doc = match existing {
            Some(bytes) => self.xmp.parse(&String::from_utf8_lossy(bytes))?,
            None => self.xmp.empty(),
        };
        self.project_xmp(&mut doc, update)?;
        Ok(doc.serialize(&SerializeOptions {
            packet_wrapper: false,
        })?)
    }

    fn project_xmp(&self, doc: &mut X::Document, update: &MetadataUpdate) -> Result<(), WriteError> {
        match update {
            MetadataUpdate::Orientation(orientation) => {
                doc.set_simple(NS_TIFF, "tiff:Orientation", &orientation.value().to_string())?;
            }
            MetadataUpdate::TakenDate(Some(ms)) => {
                let iso = format_iso_local(*ms, self.zone.zone_offset())?;
                doc.set_simple(NS_EXIF, "exif:DateTimeOriginal", &iso)?;
            }
            MetadataUpdate::TakenDate(None) => {
                doc.delete("exif:DateTimeOriginal")?;
            }
            MetadataUpdate::GpsCoordinates(Some(coordinates)) => {
                doc.set_simple(NS_EXIF, "exif:GPSLatitude", &coordinates.latitude_ddm())?;
                doc.set_simple(NS_EXIF, "exif:GPSLongitude", &coordinates.longitude_ddm())?;
            }
            MetadataUpdate::GpsCoordinates(None) => {
                doc.delete("exif:GPSLatitude")?;
                doc.delete("exif:GPSLongitude")?;
            }
            MetadataUpdate::Rating(rating) => {
                doc.set_simple(NS_XMP, "xmp:Rating", &rating.to_string())?;
            }
            MetadataUpdate::Keywords(keywords) => {
                if keywords.is_empty() {
                    doc.delete("dc:subject")?;
                } else {
                    let items: Vec<String> = keywords.iter().cloned().collect();
                    doc.set_array(NS_DC, "dc:subject", XmpArrayKind::Bag, &items)?;
                }
            }
            MetadataUpdate::Persons(persons) => {
                if persons.is_empty() {
                    doc.delete("MP:RegionPersonDisplayName")?;
                } else {
                    let items: Vec<String> = persons.iter().cloned().collect();
                    doc.set_array(
                        NS_MICROSOFT_PHOTO,
                        "MP:RegionPersonDisplayName",
                        XmpArrayKind::Seq,
                        &items,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Project the EXIF-relevant part of the update onto an output set
    fn projected_exif(
        &self,
        mut set: TiffOutputSet,
        update: &MetadataUpdate,
    ) -> Result<TiffOutputSet, WriteError> {
        let order = set.byte_order;
        match update {
            MetadataUpdate::Orientation(orientation) => {
                set.get_or_create(DIRECTORY_TYPE_ROOT)?.set(TiffOutputField::short(
                    tag::ORIENTATION,
                    order,
                    orientation.value() as u16,
                ));
            }
            MetadataUpdate::TakenDate(Some(ms)) => {
                let (datetime, subsec) = format_exif_datetime(*ms, self.zone.zone_offset())?;
                let exif = set.get_or_create(DIRECTORY_TYPE_EXIF)?;
                exif.set(TiffOutputField::ascii(tag::DATE_TIME_ORIGINAL, &datetime));
                exif.set(TiffOutputField::ascii(tag::SUB_SEC_TIME_ORIGINAL, &subsec));
            }
            MetadataUpdate::TakenDate(None) => {
                if let Some(exif) = set.directory_mut(DIRECTORY_TYPE_EXIF) {
                    exif.remove(tag::DATE_TIME_ORIGINAL);
                    exif.remove(tag::SUB_SEC_TIME_ORIGINAL);
                }
            }
            MetadataUpdate::GpsCoordinates(Some(coordinates)) => {
                let gps = set.get_or_create(DIRECTORY_TYPE_GPS)?;
                if gps.field(tag::GPS_VERSION_ID).is_none() {
                    gps.set(TiffOutputField::bytes(
                        tag::GPS_VERSION_ID,
                        FieldType::Byte,
                        vec![2, 3, 0, 0],
                    ));
                }
                let latitude_ref = if coordinates.latitude < 0.0 { "S" } else { "N" };
                let longitude_ref = if coordinates.longitude < 0.0 { "W" } else { "E" };
                gps.set(TiffOutputField::ascii(tag::GPS_LATITUDE_REF, latitude_ref));
                gps.set(TiffOutputField::rationals(
                    tag::GPS_LATITUDE,
                    order,
                    &coordinates.latitude_rationals(),
                ));
                gps.set(TiffOutputField::ascii(tag::GPS_LONGITUDE_REF, longitude_ref));
                gps.set(TiffOutputField::rationals(
                    tag::GPS_LONGITUDE,
                    order,
                    &coordinates.longitude_rationals(),
                ));
            }
            MetadataUpdate::GpsCoordinates(None) => {
                if let Some(gps) = set.directory_mut(DIRECTORY_TYPE_GPS) {
                    gps.remove(tag::GPS_LATITUDE_REF);
                    gps.remove(tag::GPS_LATITUDE);
                    gps.remove(tag::GPS_LONGITUDE_REF);
                    gps.remove(tag::GPS_LONGITUDE);
                }
            }
            // rating, keywords and persons are not mirrored into EXIF
            _ => {}
        }
        Ok(set)
    }
}

/// Whether the EXIF dialect mirrors this update at all
fn exif_relevant(update: &MetadataUpdate) -> bool {
    matches!(
        update,
        MetadataUpdate::Orientation(_)
            | MetadataUpdate::TakenDate(_)
            | MetadataUpdate::GpsCoordinates(_)
    )
}

fn fresh_output_set() -> Result<TiffOutputSet, WriteError> {
    let order = crate::byteio::ByteOrder::LittleEndian;
    let mut set = TiffOutputSet::new(order);
    // a default orientation keeps the in-place patch path available
    set.get_or_create(DIRECTORY_TYPE_ROOT)?
        .set(TiffOutputField::short(tag::ORIENTATION, order, 1));
    Ok(set)
}

fn validate(update: &MetadataUpdate) -> Result<(), WriteError> {
    match update {
        MetadataUpdate::Rating(rating) if !(-1..=5).contains(rating) => Err(
            WriteError::InvalidValue(format!("rating {rating} out of range -1..=5")),
        ),
        MetadataUpdate::GpsCoordinates(Some(coordinates)) => {
            if !(-90.0..=90.0).contains(&coordinates.latitude) {
                return Err(WriteError::InvalidValue(format!(
                    "latitude {} out of range -90..=90",
                    coordinates.latitude
                )));
            }
            if !(-180.0..=180.0).contains(&coordinates.longitude) {
                return Err(WriteError::InvalidValue(format!(
                    "longitude {} out of range -180..=180",
                    coordinates.longitude
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn local_datetime(ms: i64, offset: FixedOffset) -> Result<DateTime<FixedOffset>, WriteError> {
    offset
        .timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| WriteError::InvalidValue(format!("timestamp {ms} out of range")))
}

/// ISO-8601 local date-time without a zone suffix, millisecond precision
pub(crate) fn format_iso_local(ms: i64, offset: FixedOffset) -> Result<String, WriteError> {
    Ok(local_datetime(ms, offset)?
        .format("%Y-%m-%dT%H:%M:%S%.3f")
        .to_string())
}

/// The EXIF `YYYY:MM:DD HH:MM:SS` form plus the sub-second digits
fn format_exif_datetime(ms: i64, offset: FixedOffset) -> Result<(String, String), WriteError> {
    let datetime = local_datetime(ms, offset)?;
    Ok((
        datetime.format("%Y:%m:%d %H:%M:%S").to_string(),
        format!("{:03}", ms.rem_euclid(1000)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc_plus_2() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    #[test]
    fn ddm_rendering() {
        let c = GpsCoordinates::new(53.219391, 8.239661);
        assert_eq!(c.latitude_ddm(), "53,13.1635N");
        assert_eq!(c.longitude_ddm(), "8,14.3797E");

        let c = GpsCoordinates::new(-33.8688, -151.2093);
        assert_eq!(c.latitude_ddm(), "33,52.1280S");
        assert_eq!(c.longitude_ddm(), "151,12.5580W");
    }

    #[test]
    fn hemisphere_boundary_is_north_east() {
        let c = GpsCoordinates::new(0.0, 0.0);
        assert_eq!(c.latitude_ddm(), "0,0.0000N");
        assert_eq!(c.longitude_ddm(), "0,0.0000E");
    }

    #[test]
    fn ddm_rationals_round_minutes() {
        let c = GpsCoordinates::new(53.219391, 8.239661);
        assert_eq!(c.latitude_rationals(), [(53, 1), (131_635, 10_000), (0, 1)]);
        assert_eq!(c.longitude_rationals(), [(8, 1), (143_797, 10_000), (0, 1)]);
    }

    #[test]
    fn iso_rendering_in_fixed_zone() {
        assert_eq!(
            format_iso_local(1_689_166_125_401, utc_plus_2()).unwrap(),
            "2023-07-12T14:48:45.401"
        );
    }

    #[test]
    fn exif_datetime_rendering() {
        let (datetime, subsec) = format_exif_datetime(1_689_166_125_401, utc_plus_2()).unwrap();
        assert_eq!(datetime, "2023:07:12 14:48:45");
        assert_eq!(subsec, "401");
    }

    #[test]
    fn orientation_values_round_trip() {
        for v in 1..=8u8 {
            assert_eq!(Orientation::from_value(v).unwrap().value(), v);
        }
        assert_eq!(Orientation::from_value(0), None);
        assert_eq!(Orientation::from_value(9), None);
        assert_eq!(Orientation::RotateRight.value(), 6);
    }

    #[test]
    fn out_of_range_values_rejected() {
        assert!(matches!(
            validate(&MetadataUpdate::Rating(6)),
            Err(WriteError::InvalidValue(_))
        ));
        assert!(validate(&MetadataUpdate::Rating(-1)).is_ok());
        assert!(matches!(
            validate(&MetadataUpdate::GpsCoordinates(Some(GpsCoordinates::new(91.0, 0.0)))),
            Err(WriteError::InvalidValue(_))
        ));
        assert!(matches!(
            validate(&MetadataUpdate::GpsCoordinates(Some(GpsCoordinates::new(0.0, 181.0)))),
            Err(WriteError::InvalidValue(_))
        ));
    }
}
