//! Content type resolution for package parts.
//!
//! `[Content_Types].xml` assigns a content type to every part, either by
//! file extension (`Default`) or by exact partname (`Override`). An override
//! always wins over a default. Both maps match case-insensitively.

use crate::common::xml::escape_xml;
use crate::opc::constants::{DEFAULT_CONTENT_TYPES, content_type as ct, namespace};
use crate::opc::error::{OpcError, Result};
use crate::opc::oxml::XML_DECLARATION;
use crate::opc::packuri::PackURI;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;

/// Content type map for looking up content types by partname or extension.
///
/// Keys are stored lower-cased; the original spelling is kept alongside so
/// the map serializes back the way it was written.
#[derive(Debug, Clone, Default)]
pub struct ContentTypeMap {
    /// extension (lower-case) -> (extension as written, content type)
    defaults: HashMap<String, (String, String)>,

    /// partname (lower-case) -> (partname as written, content type)
    overrides: HashMap<String, (String, String)>,
}

impl ContentTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `Default` and `Override` entries of `[Content_Types].xml`.
    pub fn from_xml(xml: &[u8]) -> Result<Self> {
        let mut map = Self::new();
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                    b"Default" => {
                        let (extension, content_type) = Self::pair(e, b"Extension")?;
                        match (extension, content_type) {
                            (Some(ext), Some(ct)) => map.add_default(&ext, &ct),
                            _ => log::warn!("skipping Default entry without Extension or ContentType"),
                        }
                    },
                    b"Override" => {
                        let (partname, content_type) = Self::pair(e, b"PartName")?;
                        match (partname, content_type) {
                            (Some(pn), Some(ct)) => map.add_override(&pn, &ct),
                            _ => log::warn!("skipping Override entry without PartName or ContentType"),
                        }
                    },
                    _ => {},
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(OpcError::XmlError(format!(
                        "Content types parse error: {}",
                        e
                    )));
                },
                _ => {},
            }
            buf.clear();
        }

        Ok(map)
    }

    /// Read the key attribute named `key` and the `ContentType` attribute.
    fn pair(e: &BytesStart<'_>, key: &[u8]) -> Result<(Option<String>, Option<String>)> {
        let mut first = None;
        let mut content_type = None;
        for attr in e.attributes() {
            let attr = attr?;
            let name = attr.key.as_ref();
            if name == key {
                first = Some(attr.unescape_value()?.into_owned());
            } else if name == b"ContentType" {
                content_type = Some(attr.unescape_value()?.into_owned());
            }
        }
        Ok((first, content_type))
    }

    /// Compose the map to write for a set of live parts.
    ///
    /// `rels` and `xml` defaults are always present. A part whose
    /// (extension, content type) pair is a well-known default becomes a
    /// `Default` entry; every other part gets an `Override`.
    pub fn from_parts<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = (&'a PackURI, &'a str)>,
    {
        let mut map = Self::new();
        map.add_default("rels", ct::OPC_RELATIONSHIPS);
        map.add_default("xml", ct::XML);

        for (partname, content_type) in parts {
            let ext = partname.ext();
            // A template main part is stored as a regular document
            let content_type = if ext.eq_ignore_ascii_case("xml") && content_type == ct::WML_TEMPLATE_MAIN {
                ct::WML_DOCUMENT_MAIN
            } else {
                content_type
            };

            if Self::is_default_content_type(ext, content_type) {
                map.add_default(ext, content_type);
            } else {
                map.add_override(partname.as_str(), content_type);
            }
        }

        map
    }

    /// Whether an extension/content-type pair is one of the built-in defaults.
    pub fn is_default_content_type(ext: &str, content_type: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        DEFAULT_CONTENT_TYPES
            .iter()
            .any(|&(e, c)| e == ext && c == content_type)
    }

    /// Add a default content type mapping for a file extension.
    pub fn add_default(&mut self, extension: &str, content_type: &str) {
        self.defaults.insert(
            extension.to_lowercase(),
            (extension.to_string(), content_type.to_string()),
        );
    }

    /// Add an override content type mapping for a specific partname.
    pub fn add_override(&mut self, partname: &str, content_type: &str) {
        self.overrides.insert(
            partname.to_lowercase(),
            (partname.to_string(), content_type.to_string()),
        );
    }

    /// Content type for a partname: its override if there is one, otherwise
    /// the default for its extension.
    pub fn content_type_for(&self, partname: &PackURI) -> Result<&str> {
        if let Some((_, ct)) = self.overrides.get(&partname.as_str().to_lowercase()) {
            return Ok(ct);
        }

        if let Some((_, ct)) = self.defaults.get(&partname.ext().to_lowercase()) {
            return Ok(ct);
        }

        Err(OpcError::ContentTypeNotFound(partname.to_string()))
    }

    /// Default entries sorted by extension.
    pub fn defaults(&self) -> Vec<(&str, &str)> {
        let mut defaults: Vec<(&str, &str)> = self
            .defaults
            .values()
            .map(|(ext, ct)| (ext.as_str(), ct.as_str()))
            .collect();
        defaults.sort_unstable();
        defaults
    }

    /// Override entries sorted by partname.
    pub fn overrides(&self) -> Vec<(&str, &str)> {
        let mut overrides: Vec<(&str, &str)> = self
            .overrides
            .values()
            .map(|(pn, ct)| (pn.as_str(), ct.as_str()))
            .collect();
        overrides.sort_unstable();
        overrides
    }

    /// Generate the XML for [Content_Types].xml.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(512 + 160 * (self.defaults.len() + self.overrides.len()));

        xml.push_str(XML_DECLARATION);
        xml.push_str(r#"<Types xmlns=""#);
        xml.push_str(namespace::OPC_CONTENT_TYPES);
        xml.push_str(r#"">"#);

        for (ext, content_type) in self.defaults() {
            xml.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                escape_xml(ext),
                escape_xml(content_type)
            ));
        }

        for (partname, content_type) in self.overrides() {
            xml.push_str(&format!(
                r#"<Override PartName="{}" ContentType="{}"/>"#,
                escape_xml(partname),
                escape_xml(content_type)
            ));
        }

        xml.push_str("</Types>");
        xml
    }
}
