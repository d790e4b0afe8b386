//! XMP packet editing.
//!
//! The engine needs a handful of operations on an XMP packet: set or
//! delete a simple property, replace a bag/seq array, serialize with or
//! without the xpacket wrapper. [`XmpToolkit`] is the seam for an
//! external XMP implementation; [`SimpleXmp`] is the built-in one. It
//! edits packets with single-pass event rewrites over `quick-xml`,
//! copying untouched regions of the source verbatim, so properties the
//! engine does not know about survive unchanged.
//!
//! Properties can appear as attributes on `rdf:Description` or as child
//! elements; both forms are recognized. New properties are written in
//! element form with a self-contained namespace declaration.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::Result;

pub const NS_TIFF: &str = "http://ns.adobe.com/tiff/1.0/";
pub const NS_EXIF: &str = "http://ns.adobe.com/exif/1.0/";
pub const NS_XMP: &str = "http://ns.adobe.com/xap/1.0/";
pub const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
pub const NS_MICROSOFT_PHOTO: &str = "http://ns.microsoft.com/photo/1.2/";

const DESCRIPTION: &[u8] = b"rdf:Description";

const XPACKET_BEGIN: &str = "<?xpacket begin=\"\u{FEFF}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>";
const XPACKET_END: &str = "<?xpacket end=\"w\"?>";

const EMPTY_XMPMETA: &str = "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\
<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\
<rdf:Description rdf:about=\"\"></rdf:Description>\
</rdf:RDF></x:xmpmeta>";

/// Array form of a multi-valued XMP property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmpArrayKind {
    /// Unordered `rdf:Bag`
    Bag,
    /// Ordered `rdf:Seq`
    Seq,
}

/// Serialization options
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializeOptions {
    /// Include the `<?xpacket?>` wrapper (sidecars yes, embedding no)
    pub packet_wrapper: bool,
}

/// Editable XMP document
pub trait XmpDocument {
    /// Set a simple property, replacing any existing form of it
    fn set_simple(&mut self, ns: &str, name: &str, value: &str) -> Result<()>;

    /// Replace a bag/seq property with the given items
    fn set_array(&mut self, ns: &str, name: &str, kind: XmpArrayKind, items: &[String])
        -> Result<()>;

    /// Remove a property in either attribute or element form
    fn delete(&mut self, name: &str) -> Result<()>;

    fn serialize(&self, options: &SerializeOptions) -> Result<String>;
}

/// Factory for XMP documents; the engine is generic over this
pub trait XmpToolkit {
    type Document: XmpDocument;

    fn parse(&self, packet: &str) -> Result<Self::Document>;
    fn empty(&self) -> Self::Document;
}

/// The built-in quick-xml based toolkit
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleXmp;

/// Document held as the raw `x:xmpmeta` XML, edited in place
#[derive(Debug, Clone)]
pub struct SimpleXmpDocument {
    xml: String,
}

impl XmpToolkit for SimpleXmp {
    type Document = SimpleXmpDocument;

    fn parse(&self, packet: &str) -> Result<SimpleXmpDocument> {
        let xml = strip_packet_wrapper(packet);
        if !xml.contains("rdf:Description") {
            return Ok(self.empty());
        }
        Ok(SimpleXmpDocument {
            xml: xml.to_string(),
        })
    }

    fn empty(&self) -> SimpleXmpDocument {
        SimpleXmpDocument {
            xml: EMPTY_XMPMETA.to_string(),
        }
    }
}

impl XmpDocument for SimpleXmpDocument {
    fn set_simple(&mut self, ns: &str, name: &str, value: &str) -> Result<()> {
        let prefix = name.split(':').next().unwrap_or(name);
        let element = format!(
            "<{name} xmlns:{prefix}=\"{ns}\">{}</{name}>",
            escape(value)
        );
        self.xml = rewrite(&self.xml, name, Some(&element))?;
        Ok(())
    }

    fn set_array(
        &mut self,
        ns: &str,
        name: &str,
        kind: XmpArrayKind,
        items: &[String],
    ) -> Result<()> {
        let prefix = name.split(':').next().unwrap_or(name);
        let container = match kind {
            XmpArrayKind::Bag => "rdf:Bag",
            XmpArrayKind::Seq => "rdf:Seq",
        };
        let mut element = format!("<{name} xmlns:{prefix}=\"{ns}\"><{container}>");
        for item in items {
            element.push_str("<rdf:li>");
            element.push_str(&escape(item.as_str()));
            element.push_str("</rdf:li>");
        }
        element.push_str(&format!("</{container}></{name}>"));
        self.xml = rewrite(&self.xml, name, Some(&element))?;
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<()> {
        self.xml = rewrite(&self.xml, name, None)?;
        Ok(())
    }

    fn serialize(&self, options: &SerializeOptions) -> Result<String> {
        if options.packet_wrapper {
            Ok(format!("{XPACKET_BEGIN}{}{XPACKET_END}", self.xml))
        } else {
            Ok(self.xml.clone())
        }
    }
}

fn strip_packet_wrapper(packet: &str) -> &str {
    match (packet.find("<x:xmpmeta"), packet.rfind("</x:xmpmeta>")) {
        (Some(start), Some(end)) if end > start => &packet[start..end + "</x:xmpmeta>".len()],
        _ => packet.trim(),
    }
}

fn has_attribute(e: &BytesStart<'_>, name: &str) -> bool {
    e.attributes()
        .flatten()
        .any(|a| a.key.as_ref() == name.as_bytes())
}

/// Re-emit an `rdf:Description` open tag with one attribute removed,
/// preserving the stored (still escaped) values of the others
fn rebuild_description(e: &BytesStart<'_>, strip: &str, self_closing: bool) -> String {
    let mut out = format!("<{}", String::from_utf8_lossy(e.name().as_ref()));
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == strip.as_bytes() {
            continue;
        }
        out.push(' ');
        out.push_str(&String::from_utf8_lossy(attr.key.as_ref()));
        out.push_str("=\"");
        out.push_str(&String::from_utf8_lossy(&attr.value));
        out.push('"');
    }
    out.push_str(if self_closing { "/>" } else { ">" });
    out
}

/// Single-pass rewrite: remove every form of `target`, then insert
/// `replacement` (when given) at the close of the first
/// `rdf:Description`. Untouched regions are copied from the source
/// byte-for-byte.
fn rewrite(xml: &str, target: &str, replacement: Option<&str>) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::with_capacity(xml.len() + replacement.map_or(0, str::len));
    let mut prev = 0usize;
    let mut inserted = replacement.is_none();

    loop {
        let event = reader.read_event()?;
        let pos = reader.buffer_position() as usize;
        match event {
            Event::Start(e) if e.name().as_ref() == target.as_bytes() => {
                // drop the whole subtree
                reader.read_to_end(e.name())?;
                prev = reader.buffer_position() as usize;
            }
            Event::Empty(e) if e.name().as_ref() == target.as_bytes() => {
                prev = pos;
            }
            Event::Start(e) if e.name().as_ref() == DESCRIPTION => {
                if has_attribute(&e, target) {
                    out.push_str(&rebuild_description(&e, target, false));
                } else {
                    out.push_str(&xml[prev..pos]);
                }
                prev = pos;
            }
            Event::Empty(e) if e.name().as_ref() == DESCRIPTION => {
                if !inserted {
                    // expand the empty element so the property has a home
                    out.push_str(&rebuild_description(&e, target, false));
                    out.push_str(replacement.unwrap_or_default());
                    out.push_str("</rdf:Description>");
                    inserted = true;
                } else if has_attribute(&e, target) {
                    out.push_str(&rebuild_description(&e, target, true));
                } else {
                    out.push_str(&xml[prev..pos]);
                }
                prev = pos;
            }
            Event::End(e) if e.name().as_ref() == DESCRIPTION && !inserted => {
                out.push_str(replacement.unwrap_or_default());
                out.push_str(&xml[prev..pos]);
                inserted = true;
                prev = pos;
            }
            Event::Eof => {
                out.push_str(&xml[prev..]);
                break;
            }
            _ => {
                out.push_str(&xml[prev..pos]);
                prev = pos;
            }
        }
    }
    Ok(out)
}

/// Read a simple property in element or attribute form.
///
/// A single pass over the packet, in the manner of a batch get; used by
/// the read surface and the test suite.
pub fn property_value(packet: &str, name: &str) -> Option<String> {
    let mut reader = Reader::from_str(packet);
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == name.as_bytes() => {
                if let Ok(text) = reader.read_text(e.name()) {
                    return Some(text.into_owned());
                }
                return None;
            }
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.name().as_ref() == DESCRIPTION =>
            {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == name.as_bytes() {
                        if let Ok(value) = attr.decode_and_unescape_value(reader.decoder()) {
                            return Some(value.into_owned());
                        }
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Read the `rdf:li` items of a bag/seq property
pub fn array_items(packet: &str, name: &str) -> Vec<String> {
    let mut reader = Reader::from_str(packet);
    let mut items = Vec::new();
    let mut in_target = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == name.as_bytes() => {
                in_target = true;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == name.as_bytes() => {
                return items;
            }
            Ok(Event::Start(ref e)) if in_target && e.name().as_ref() == b"rdf:li" => {
                if let Ok(text) = reader.read_text(e.name()) {
                    items.push(text.into_owned());
                }
            }
            Ok(Event::Eof) | Err(_) => return items,
            _ => {}
        }
    }
}
