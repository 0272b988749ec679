//! A small owned XML element tree for part payloads.
//!
//! XML parts keep their raw bytes until somebody asks for the element tree;
//! the tree is then built once with quick-xml and serialized back on demand.
//! Qualified names are kept verbatim (`w:p`, `r:id`), so namespace prefixes
//! and declarations survive a parse/serialize cycle untouched.

use crate::common::xml::{escape_text, escape_xml, unescape_xml};
use crate::opc::error::{OpcError, Result};
use encoding_rs::{Encoding, UTF_8};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;

/// XML declaration prepended to every serialized XML part.
pub const XML_DECLARATION: &str = "<?xml version='1.0' encoding='UTF-8' standalone='yes'?>\n";

/// A node in an element's child list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    /// Unescaped character data
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

/// An element with its attributes (in document order) and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    /// Create an empty element with the given qualified name.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Qualified name, e.g. `w:document`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        match self.name.rfind(':') {
            Some(pos) => &self.name[pos + 1..],
            None => &self.name,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, keeping its position if it already exists.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => self
                .attributes
                .push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(key, _)| key == name)?;
        Some(self.attributes.remove(pos).1)
    }

    #[inline]
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    #[inline]
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    #[inline]
    pub fn children_mut(&mut self) -> &mut Vec<XmlNode> {
        &mut self.children
    }

    /// Child elements, skipping text and other node kinds.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    /// First child element with the given qualified name.
    pub fn find_child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|el| el.name == name)
    }

    pub fn find_child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    /// Append a child element and return a mutable reference to it.
    pub fn append_child(&mut self, child: XmlElement) -> &mut XmlElement {
        self.children.push(XmlNode::Element(child));
        match self.children.last_mut() {
            Some(XmlNode::Element(el)) => el,
            _ => unreachable!("an element was just pushed"),
        }
    }

    /// Remove every child element with the given qualified name, returning
    /// how many were removed.
    pub fn remove_children(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|node| !matches!(node, XmlNode::Element(el) if el.name == name));
        before - self.children.len()
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(t) | XmlNode::CData(t) => text.push_str(t),
                _ => {},
            }
        }
        text
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children.clear();
        if !text.is_empty() {
            self.children.push(XmlNode::Text(text.to_string()));
        }
    }

    /// Count attributes named `name` whose value equals `value`, in this
    /// element and all of its descendants.
    pub fn count_attribute_values(&self, name: &str, value: &str) -> usize {
        let own = self
            .attributes
            .iter()
            .filter(|(key, v)| key == name && v == value)
            .count();
        own + self
            .child_elements()
            .map(|child| child.count_attribute_values(name, value))
            .sum::<usize>()
    }

    /// Parse a complete document and return its root element.
    ///
    /// UTF-16 input is accepted when it starts with a byte order mark.
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let text = decode_document(xml)?;
        let mut reader = Reader::from_reader(text.as_bytes());
        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => stack.push(Self::from_start(e)?),
                Ok(Event::Empty(ref e)) => {
                    let element = Self::from_start(e)?;
                    attach(&mut stack, &mut root, element)?;
                },
                Ok(Event::End(_)) => {
                    let element = stack.pop().ok_or_else(|| {
                        OpcError::XmlError("unbalanced end tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, element)?;
                },
                Ok(Event::Text(e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let raw = std::str::from_utf8(e.as_ref())?;
                        parent.push_text(&unescape_xml(raw));
                    }
                },
                Ok(Event::GeneralRef(e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let name = std::str::from_utf8(e.as_ref())?;
                        parent.push_text(&resolve_reference(name));
                    }
                },
                Ok(Event::CData(e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let data = std::str::from_utf8(e.as_ref())?;
                        parent.children.push(XmlNode::CData(data.to_string()));
                    }
                },
                Ok(Event::Comment(e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let data = std::str::from_utf8(e.as_ref())?;
                        parent.children.push(XmlNode::Comment(data.to_string()));
                    }
                },
                Ok(Event::PI(e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let data = std::str::from_utf8(e.as_ref())?;
                        parent
                            .children
                            .push(XmlNode::ProcessingInstruction(data.to_string()));
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(OpcError::XmlError(format!("XML parse error: {}", e))),
                _ => {},
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(OpcError::XmlError(format!(
                "unclosed element '{}'",
                stack[stack.len() - 1].name
            )));
        }
        root.ok_or_else(|| OpcError::XmlError("document has no root element".to_string()))
    }

    fn from_start(e: &BytesStart<'_>) -> Result<Self> {
        let name = std::str::from_utf8(e.name().as_ref())?.to_string();
        let mut element = Self::new(name);
        for attr in e.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = attr.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn push_text(&mut self, text: &str) {
        if let Some(XmlNode::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(XmlNode::Text(text.to_string()));
        }
    }

    /// Serialize this element (no declaration, no pretty-printing).
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(256);
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_xml(value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                XmlNode::Element(el) => el.write_into(out),
                XmlNode::Text(text) => out.push_str(&escape_text(text)),
                XmlNode::CData(data) => {
                    out.push_str("<![CDATA[");
                    out.push_str(data);
                    out.push_str("]]>");
                },
                XmlNode::Comment(data) => {
                    out.push_str("<!--");
                    out.push_str(data);
                    out.push_str("-->");
                },
                XmlNode::ProcessingInstruction(data) => {
                    out.push_str("<?");
                    out.push_str(data);
                    out.push_str("?>");
                },
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Serialize as a standalone part payload: declaration plus element.
    pub fn to_part_blob(&self) -> Vec<u8> {
        let mut out = String::with_capacity(XML_DECLARATION.len() + 256);
        out.push_str(XML_DECLARATION);
        self.write_into(&mut out);
        out.into_bytes()
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Element(element));
            Ok(())
        },
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        },
        None => Err(OpcError::XmlError(
            "document has more than one root element".to_string(),
        )),
    }
}

/// Resolve an entity or character reference name (the text between `&` and `;`).
fn resolve_reference(name: &str) -> String {
    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    match code.and_then(char::from_u32) {
        Some(ch) => ch.to_string(),
        None => unescape_xml(&format!("&{};", name)),
    }
}

/// Document text as UTF-8, with any byte order mark removed.
fn decode_document(xml: &[u8]) -> Result<Cow<'_, str>> {
    let Some((encoding, bom_len)) = Encoding::for_bom(xml) else {
        return Ok(Cow::Borrowed(std::str::from_utf8(xml)?));
    };
    let body = &xml[bom_len..];
    if encoding == UTF_8 {
        return Ok(Cow::Borrowed(std::str::from_utf8(body)?));
    }

    let (text, had_errors) = encoding.decode_without_bom_handling(body);
    if had_errors {
        return Err(OpcError::XmlError(format!("malformed {} document", encoding.name())));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le_with_bom(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xff, 0xfe];
        bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        bytes
    }

    #[test]
    fn test_parse_utf16_with_bom() {
        let xml = utf16le_with_bom(
            r#"<?xml version="1.0" encoding="UTF-16"?><ds:datastoreItem xmlns:ds="urn:ds" ds:itemID="{A}"><ds:schemaRefs>Grüße</ds:schemaRefs></ds:datastoreItem>"#,
        );
        let root = XmlElement::parse(&xml).unwrap();
        assert_eq!(root.name(), "ds:datastoreItem");
        assert_eq!(root.attribute("ds:itemID"), Some("{A}"));
        assert_eq!(root.find_child("ds:schemaRefs").unwrap().text(), "Grüße");

        let mut be = vec![0xfe, 0xff];
        be.extend("<a b=\"1\"/>".encode_utf16().flat_map(u16::to_be_bytes));
        assert_eq!(XmlElement::parse(&be).unwrap().attribute("b"), Some("1"));
    }

    #[test]
    fn test_parse_skips_utf8_bom() {
        let root = XmlElement::parse(b"\xef\xbb\xbf<a/>").unwrap();
        assert_eq!(root.name(), "a");
    }

    #[test]
    fn test_parse_rejects_unmarked_binary() {
        assert!(XmlElement::parse(&[0x3c, 0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_parse_and_serialize() {
        let xml = br#"<?xml version="1.0"?>
<w:document xmlns:w="urn:w" xmlns:r="urn:r"><w:body><w:p><w:t xml:space="preserve">Hi &amp; bye</w:t></w:p><w:hdr r:id="rId3"/></w:body></w:document>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.name(), "w:document");
        assert_eq!(root.local_name(), "document");
        assert_eq!(root.attribute("xmlns:r"), Some("urn:r"));

        let body = root.find_child("w:body").unwrap();
        let t = body.find_child("w:p").unwrap().find_child("w:t").unwrap();
        assert_eq!(t.text(), "Hi & bye");

        let out = root.to_xml();
        assert!(out.starts_with(r#"<w:document xmlns:w="urn:w" xmlns:r="urn:r">"#));
        assert!(out.contains("Hi &amp; bye"));
        assert!(out.contains(r#"<w:hdr r:id="rId3"/>"#));
    }

    #[test]
    fn test_part_blob_has_declaration() {
        let root = XmlElement::new("a").with_attribute("b", "1");
        let blob = root.to_part_blob();
        assert_eq!(
            blob,
            b"<?xml version='1.0' encoding='UTF-8' standalone='yes'?>\n<a b=\"1\"/>".to_vec()
        );
    }

    #[test]
    fn test_count_attribute_values() {
        let xml = br#"<a xmlns:r="urn:r"><b r:id="rId1"/><c><d r:id="rId1"/><d r:id="rId2"/></c></a>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.count_attribute_values("r:id", "rId1"), 2);
        assert_eq!(root.count_attribute_values("r:id", "rId2"), 1);
        assert_eq!(root.count_attribute_values("r:id", "rId9"), 0);
    }

    #[test]
    fn test_character_references() {
        let root = XmlElement::parse(b"<a>&#65;&#x42;&lt;</a>").unwrap();
        assert_eq!(root.text(), "AB<");
    }

    #[test]
    fn test_malformed_documents() {
        assert!(XmlElement::parse(b"").is_err());
        assert!(XmlElement::parse(b"<a><b></a>").is_err());
    }

    #[test]
    fn test_edit_tree() {
        let mut root = XmlElement::new("root");
        root.append_child(XmlElement::new("x")).set_text("one");
        root.append_child(XmlElement::new("x"));
        root.append_child(XmlElement::new("y"));
        assert_eq!(root.remove_children("x"), 2);
        assert_eq!(root.to_xml(), "<root><y/></root>");
    }

    #[test]
    fn test_edit_attributes_in_place() {
        let mut root = XmlElement::parse(br#"<w:sectPr xmlns:w="urn:w"><w:pgSz w:w="12240" w:h="15840"/></w:sectPr>"#).unwrap();

        let size = root.find_child_mut("w:pgSz").unwrap();
        size.set_attribute("w:w", "11906");
        assert_eq!(size.remove_attribute("w:h").as_deref(), Some("15840"));
        assert_eq!(size.remove_attribute("w:h"), None);

        assert!(root.find_child_mut("w:cols").is_none());
        assert_eq!(root.to_xml(), r#"<w:sectPr xmlns:w="urn:w"><w:pgSz w:w="11906"/></w:sectPr>"#);
    }
}
