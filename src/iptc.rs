//! IPTC IIM records and the Photoshop Image Resource Block that carries
//! them inside JPEG APP13.
//!
//! IIM dataset format:
//!   Byte 0:    0x1C (tag marker)
//!   Byte 1:    record number (1 = envelope, 2 = application)
//!   Byte 2:    dataset number (2:25 = Keywords, 1:90 = coded character set)
//!   Bytes 3-4: data length (big-endian u16)
//!   Bytes 5+:  data
//!
//! Only record-edit semantics live here: foreign datasets and foreign
//! 8BIM resource blocks round-trip verbatim.

use std::collections::BTreeSet;

/// Dataset tag marker
const DATASET_MARKER: u8 = 0x1C;

/// 1:90 payload declaring UTF-8 (ESC % G)
const CODED_CHARSET_UTF8: &[u8] = &[0x1B, 0x25, 0x47];

/// Record 2 version emitted as 2:0
const RECORD_VERSION: u16 = 4;

pub const RECORD_ENVELOPE: u8 = 1;
pub const RECORD_APPLICATION: u8 = 2;
pub const DATASET_CODED_CHARACTER_SET: u8 = 90;
pub const DATASET_RECORD_VERSION: u8 = 0;
pub const DATASET_KEYWORDS: u8 = 25;

const PHOTOSHOP_SIGNATURE: &[u8] = b"Photoshop 3.0\0";
const RESOURCE_BLOCK_SIGNATURE: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;

/// One IIM dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IptcRecord {
    pub record: u8,
    pub dataset: u8,
    pub data: Vec<u8>,
}

impl IptcRecord {
    pub fn new(record: u8, dataset: u8, data: Vec<u8>) -> Self {
        Self {
            record,
            dataset,
            data,
        }
    }

    pub fn keyword(text: &str) -> Self {
        Self::new(RECORD_APPLICATION, DATASET_KEYWORDS, text.as_bytes().to_vec())
    }
}

/// A parsed IIM block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IptcMetadata {
    pub records: Vec<IptcRecord>,
}

impl IptcMetadata {
    /// Parse raw IIM bytes. Lenient: bytes before the next 0x1C marker
    /// and datasets running past the end are skipped.
    pub fn parse(data: &[u8]) -> Self {
        let mut records = Vec::new();
        let mut pos = 0;
        while pos + 5 <= data.len() {
            if data[pos] != DATASET_MARKER {
                pos += 1;
                continue;
            }
            let record = data[pos + 1];
            let dataset = data[pos + 2];
            let length = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
            pos += 5;
            if pos + length > data.len() {
                break;
            }
            records.push(IptcRecord::new(record, dataset, data[pos..pos + length].to_vec()));
            pos += length;
        }
        Self { records }
    }

    /// All 2:25 keyword values, in stored order
    pub fn keywords(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.record == RECORD_APPLICATION && r.dataset == DATASET_KEYWORDS)
            .map(|r| String::from_utf8_lossy(&r.data).into_owned())
            .collect()
    }

    /// Replace the 2:25 keyword records with the given set, one record
    /// per keyword in ascending order. Foreign records are preserved;
    /// the 1:90 UTF-8 marker and 2:0 record version are ensured.
    pub fn set_keywords(&mut self, keywords: &BTreeSet<String>) {
        self.records
            .retain(|r| !(r.record == RECORD_APPLICATION && r.dataset == DATASET_KEYWORDS));
        if !self
            .records
            .iter()
            .any(|r| r.record == RECORD_ENVELOPE && r.dataset == DATASET_CODED_CHARACTER_SET)
        {
            self.records.insert(
                0,
                IptcRecord::new(
                    RECORD_ENVELOPE,
                    DATASET_CODED_CHARACTER_SET,
                    CODED_CHARSET_UTF8.to_vec(),
                ),
            );
        }
        if !self
            .records
            .iter()
            .any(|r| r.record == RECORD_APPLICATION && r.dataset == DATASET_RECORD_VERSION)
        {
            self.records.push(IptcRecord::new(
                RECORD_APPLICATION,
                DATASET_RECORD_VERSION,
                RECORD_VERSION.to_be_bytes().to_vec(),
            ));
        }
        // BTreeSet iterates in ascending order
        for keyword in keywords {
            self.records.push(IptcRecord::keyword(keyword));
        }
    }

    /// Serialize to raw IIM bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for record in &self.records {
            out.push(DATASET_MARKER);
            out.push(record.record);
            out.push(record.dataset);
            out.extend_from_slice(&(record.data.len() as u16).to_be_bytes());
            out.extend_from_slice(&record.data);
        }
        out
    }
}

/// One 8BIM resource block inside a Photoshop IRB
#[derive(Debug, Clone)]
struct ResourceBlock {
    resource_id: u16,
    name: Vec<u8>,
    data: Vec<u8>,
}

/// Walk the 8BIM blocks of an IRB payload (after the "Photoshop 3.0\0"
/// signature has been stripped)
fn parse_resource_blocks(mut data: &[u8]) -> Vec<ResourceBlock> {
    let mut blocks = Vec::new();
    while data.len() >= 12 {
        if &data[..4] != RESOURCE_BLOCK_SIGNATURE {
            break;
        }
        let resource_id = u16::from_be_bytes([data[4], data[5]]);
        // Pascal string name, padded so name length field + bytes is even
        let name_len = data[6] as usize;
        let padded_name = (1 + name_len + 1) & !1;
        let size_pos = 6 + padded_name;
        if data.len() < size_pos + 4 {
            break;
        }
        let size = u32::from_be_bytes([
            data[size_pos],
            data[size_pos + 1],
            data[size_pos + 2],
            data[size_pos + 3],
        ]) as usize;
        let data_pos = size_pos + 4;
        if data.len() < data_pos + size {
            break;
        }
        blocks.push(ResourceBlock {
            resource_id,
            name: data[6..6 + padded_name].to_vec(),
            data: data[data_pos..data_pos + size].to_vec(),
        });
        let mut consumed = data_pos + size;
        if size % 2 == 1 {
            consumed += 1; // data is padded to even length
        }
        data = &data[consumed.min(data.len())..];
    }
    blocks
}

fn write_resource_block(out: &mut Vec<u8>, block: &ResourceBlock) {
    out.extend_from_slice(RESOURCE_BLOCK_SIGNATURE);
    out.extend_from_slice(&block.resource_id.to_be_bytes());
    out.extend_from_slice(&block.name);
    out.extend_from_slice(&(block.data.len() as u32).to_be_bytes());
    out.extend_from_slice(&block.data);
    if block.data.len() % 2 == 1 {
        out.push(0);
    }
}

/// Whether an APP13 payload is a Photoshop IRB
pub(crate) fn is_photoshop_irb(app13_payload: &[u8]) -> bool {
    app13_payload.starts_with(PHOTOSHOP_SIGNATURE)
}

/// Extract the raw IIM bytes from an APP13 payload, when it is a
/// Photoshop IRB carrying resource 0x0404
pub(crate) fn iim_from_irb(app13_payload: &[u8]) -> Option<Vec<u8>> {
    let rest = app13_payload.strip_prefix(PHOTOSHOP_SIGNATURE)?;
    parse_resource_blocks(rest)
        .into_iter()
        .find(|b| b.resource_id == IPTC_RESOURCE_ID)
        .map(|b| b.data)
}

/// Rebuild an APP13 payload with the IPTC resource replaced (or added)
/// and every other resource block byte-preserved. `existing` may be None
/// when the file had no APP13.
pub(crate) fn irb_with_iim(existing: Option<&[u8]>, iim: &[u8]) -> Vec<u8> {
    let mut blocks = match existing.and_then(|p| p.strip_prefix(PHOTOSHOP_SIGNATURE)) {
        Some(rest) => parse_resource_blocks(rest),
        None => Vec::new(),
    };

    let iptc_block = ResourceBlock {
        resource_id: IPTC_RESOURCE_ID,
        name: vec![0, 0],
        data: iim.to_vec(),
    };
    match blocks.iter_mut().find(|b| b.resource_id == IPTC_RESOURCE_ID) {
        Some(slot) => *slot = iptc_block,
        None => blocks.push(iptc_block),
    }

    let mut out = Vec::new();
    out.extend_from_slice(PHOTOSHOP_SIGNATURE);
    for block in &blocks {
        write_resource_block(&mut out, block);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyword_set(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn parse_skips_junk_and_truncated_datasets() {
        let mut data = vec![0x00, 0x00]; // junk before the first marker
        data.extend_from_slice(&[DATASET_MARKER, 2, 25, 0, 5]);
        data.extend_from_slice(b"hello");
        data.extend_from_slice(&[DATASET_MARKER, 2, 25, 0, 99]); // runs past end
        data.extend_from_slice(b"x");
        let iptc = IptcMetadata::parse(&data);
        assert_eq!(iptc.keywords(), vec!["hello"]);
    }

    #[test]
    fn keywords_round_trip_sorted() {
        let mut iptc = IptcMetadata::default();
        iptc.set_keywords(&keyword_set(&["test", "hello", "Äußerst öffentlich"]));
        let bytes = iptc.serialize();
        let back = IptcMetadata::parse(&bytes);
        // byte-wise ordering puts the non-ASCII keyword last
        assert_eq!(back.keywords(), vec!["hello", "test", "Äußerst öffentlich"]);
    }

    #[test]
    fn utf8_charset_marker_emitted_once() {
        let mut iptc = IptcMetadata::default();
        iptc.set_keywords(&keyword_set(&["a"]));
        iptc.set_keywords(&keyword_set(&["b"]));
        let markers: Vec<_> = iptc
            .records
            .iter()
            .filter(|r| r.record == RECORD_ENVELOPE && r.dataset == DATASET_CODED_CHARACTER_SET)
            .collect();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].data, CODED_CHARSET_UTF8);
        assert_eq!(iptc.keywords(), vec!["b"]);
    }

    #[test]
    fn foreign_records_preserved() {
        let mut iptc = IptcMetadata::default();
        iptc.records.push(IptcRecord::new(2, 120, b"caption".to_vec()));
        iptc.set_keywords(&keyword_set(&["kw"]));
        let back = IptcMetadata::parse(&iptc.serialize());
        assert!(back.records.iter().any(|r| r.dataset == 120 && r.data == b"caption"));
        assert_eq!(back.keywords(), vec!["kw"]);
    }

    #[test]
    fn irb_round_trip_preserves_foreign_blocks() {
        // IRB with a foreign resolution block (0x03ED) and an IPTC block
        let mut payload = PHOTOSHOP_SIGNATURE.to_vec();
        write_resource_block(
            &mut payload,
            &ResourceBlock {
                resource_id: 0x03ED,
                name: vec![0, 0],
                data: vec![1, 2, 3],
            },
        );
        let mut iptc = IptcMetadata::default();
        iptc.set_keywords(&keyword_set(&["old"]));
        write_resource_block(
            &mut payload,
            &ResourceBlock {
                resource_id: IPTC_RESOURCE_ID,
                name: vec![0, 0],
                data: iptc.serialize(),
            },
        );

        let mut replacement = IptcMetadata::default();
        replacement.set_keywords(&keyword_set(&["new"]));
        let rebuilt = irb_with_iim(Some(&payload), &replacement.serialize());

        let blocks = parse_resource_blocks(rebuilt.strip_prefix(PHOTOSHOP_SIGNATURE).unwrap());
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].resource_id, 0x03ED);
        assert_eq!(blocks[0].data, vec![1, 2, 3]);
        let iim = iim_from_irb(&rebuilt).unwrap();
        assert_eq!(IptcMetadata::parse(&iim).keywords(), vec!["new"]);
    }

    #[test]
    fn irb_from_scratch() {
        let mut iptc = IptcMetadata::default();
        iptc.set_keywords(&keyword_set(&["solo"]));
        let payload = irb_with_iim(None, &iptc.serialize());
        assert!(payload.starts_with(PHOTOSHOP_SIGNATURE));
        let iim = iim_from_irb(&payload).unwrap();
        assert_eq!(IptcMetadata::parse(&iim).keywords(), vec!["solo"]);
    }
}
