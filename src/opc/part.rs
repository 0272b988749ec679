//! Open Packaging Convention (OPC) objects related to package parts.
//!
//! A part is one node of the package graph: a partname, a content type, a
//! payload and its own outgoing relationships. Parts live in an arena owned
//! by [`OpcPackage`](crate::opc::OpcPackage) and refer to each other only
//! through [`PartId`]s stored in relationships.

use crate::opc::error::{OpcError, Result};
use crate::opc::oxml::XmlElement;
use crate::opc::packuri::PackURI;
use crate::opc::rel::{RelTarget, Relationship, Relationships};
use crate::parts::image::ImageInfo;
use memchr::memmem;
use once_cell::unsync::OnceCell;
use std::borrow::Cow;

/// Stable index of a part in its package's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartId(usize);

impl PartId {
    #[inline]
    pub(crate) fn new(index: usize) -> Self {
        PartId(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The closed set of part kinds the engine knows how to treat specially.
///
/// Anything unrecognized is `Generic` and is carried through a load/save
/// cycle untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartKind {
    Generic,
    CoreProperties,
    /// Main document or template part
    Document,
    Header,
    Footer,
    Numbering,
    Settings,
    Styles,
    Theme,
    Image(ImageInfo),
}

impl PartKind {
    /// Kinds whose payload is always an XML document.
    pub fn is_xml(&self) -> bool {
        !matches!(self, PartKind::Generic | PartKind::Image(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PartKind::Generic => "generic",
            PartKind::CoreProperties => "core-properties",
            PartKind::Document => "document",
            PartKind::Header => "header",
            PartKind::Footer => "footer",
            PartKind::Numbering => "numbering",
            PartKind::Settings => "settings",
            PartKind::Styles => "styles",
            PartKind::Theme => "theme",
            PartKind::Image(_) => "image",
        }
    }
}

/// Hooks invoked uniformly on every part by the loader and the writer.
///
/// Both default to doing nothing.
pub trait PartLifecycle {
    /// Called once the whole graph has been wired after a load.
    fn after_unmarshal(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called on every reachable part right before it is serialized.
    fn before_marshal(&mut self) -> Result<()> {
        Ok(())
    }
}

/// XML payload: raw bytes plus a lazily parsed element tree.
///
/// The tree is parsed on first access. Once it has been handed out mutably
/// it becomes the source of truth and the bytes are regenerated from it.
#[derive(Debug, Clone)]
pub struct XmlPayload {
    blob: Vec<u8>,
    element: OnceCell<XmlElement>,
    dirty: bool,
}

impl XmlPayload {
    pub fn new(blob: Vec<u8>) -> Self {
        Self {
            blob,
            element: OnceCell::new(),
            dirty: false,
        }
    }

    pub fn from_element(element: XmlElement) -> Self {
        Self {
            blob: Vec::new(),
            element: OnceCell::with_value(element),
            dirty: true,
        }
    }

    pub fn element(&self) -> Result<&XmlElement> {
        self.element.get_or_try_init(|| XmlElement::parse(&self.blob))
    }

    pub fn element_mut(&mut self) -> Result<&mut XmlElement> {
        self.element()?;
        self.dirty = true;
        self.element
            .get_mut()
            .ok_or_else(|| OpcError::XmlError("element tree unavailable".to_string()))
    }

    pub fn is_parsed(&self) -> bool {
        self.element.get().is_some()
    }

    pub fn blob(&self) -> Cow<'_, [u8]> {
        match (self.dirty, self.element.get()) {
            (true, Some(element)) => Cow::Owned(element.to_part_blob()),
            _ => Cow::Borrowed(&self.blob),
        }
    }

    fn set_blob(&mut self, blob: Vec<u8>) {
        self.blob = blob;
        self.element = OnceCell::new();
        self.dirty = false;
    }

    /// Count `r:id="<r_id>"` references in the payload.
    fn rel_ref_count(&self, r_id: &str) -> usize {
        match (self.dirty, self.element.get()) {
            (true, Some(element)) => element.count_attribute_values("r:id", r_id),
            // The byte scan only understands UTF-8
            _ if self.blob.starts_with(&[0xff, 0xfe]) || self.blob.starts_with(&[0xfe, 0xff]) => self
                .element()
                .map_or(0, |element| element.count_attribute_values("r:id", r_id)),
            _ => count_rel_refs(&self.blob, r_id),
        }
    }
}

impl PartLifecycle for XmlPayload {
    /// Fold an edited tree back into bytes.
    fn before_marshal(&mut self) -> Result<()> {
        if self.dirty {
            if let Some(element) = self.element.take() {
                self.blob = element.to_part_blob();
            }
            self.dirty = false;
        }
        Ok(())
    }
}

/// Byte-level scan for `r:id` attributes referencing `r_id`, either quote style.
fn count_rel_refs(blob: &[u8], r_id: &str) -> usize {
    let double = format!(r#"r:id="{}""#, r_id);
    let single = format!("r:id='{}'", r_id);
    memmem::find_iter(blob, double.as_bytes()).count()
        + memmem::find_iter(blob, single.as_bytes()).count()
}

#[derive(Debug, Clone)]
enum Payload {
    Blob(Vec<u8>),
    Xml(XmlPayload),
}

fn not_xml(partname: &PackURI, content_type: &str) -> OpcError {
    OpcError::XmlError(format!("part {} ({}) has no XML payload", partname, content_type))
}

/// Stored bytes of a payload, ignoring any unsaved tree edits.
fn payload_bytes(payload: &Payload) -> &[u8] {
    match payload {
        Payload::Blob(blob) => blob,
        Payload::Xml(payload) => &payload.blob,
    }
}

/// A part in an OPC package.
#[derive(Debug, Clone)]
pub struct Part {
    partname: PackURI,
    content_type: String,
    kind: PartKind,
    payload: Payload,
    /// Relationships from this part to other parts
    rels: Relationships,
}

impl Part {
    /// Create a generic part. XML content types get a lazily parsed payload.
    pub fn new(partname: PackURI, content_type: String, blob: Vec<u8>) -> Self {
        Self::with_kind(partname, content_type, PartKind::Generic, blob)
    }

    /// Create a part of a specific kind from its serialized payload.
    pub fn with_kind(partname: PackURI, content_type: String, kind: PartKind, blob: Vec<u8>) -> Self {
        let payload = if kind.is_xml() || is_xml_content_type(&content_type) {
            Payload::Xml(XmlPayload::new(blob))
        } else {
            Payload::Blob(blob)
        };
        let rels = Relationships::new(partname.base_uri().to_string());
        Self {
            partname,
            content_type,
            kind,
            payload,
            rels,
        }
    }

    /// Create an XML part of a specific kind from an element tree.
    pub fn from_element(partname: PackURI, content_type: String, kind: PartKind, element: XmlElement) -> Self {
        let rels = Relationships::new(partname.base_uri().to_string());
        Self {
            partname,
            content_type,
            kind,
            payload: Payload::Xml(XmlPayload::from_element(element)),
            rels,
        }
    }

    /// Construct a part during load. XML payloads are kept as raw bytes;
    /// malformed or mis-encoded XML only surfaces from [`element`](Self::element).
    pub fn load(partname: PackURI, content_type: String, kind: PartKind, blob: Vec<u8>) -> Result<Self> {
        Ok(Self::with_kind(partname, content_type, kind, blob))
    }

    #[inline]
    pub fn partname(&self) -> &PackURI {
        &self.partname
    }

    /// Move this part to a new partname. Relative references in its own
    /// relationships are recomputed from the new location on save.
    pub fn set_partname(&mut self, partname: PackURI) {
        self.rels.set_base_uri(partname.base_uri().to_string());
        self.partname = partname;
    }

    #[inline]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    #[inline]
    pub fn kind(&self) -> &PartKind {
        &self.kind
    }

    #[inline]
    pub fn is_xml(&self) -> bool {
        matches!(self.payload, Payload::Xml(_))
    }

    /// Serialized payload. For an XML part whose tree has been edited, the
    /// bytes are regenerated from the tree.
    pub fn blob(&self) -> Cow<'_, [u8]> {
        match &self.payload {
            Payload::Blob(blob) => Cow::Borrowed(blob),
            Payload::Xml(payload) => payload.blob(),
        }
    }

    /// Replace the payload bytes, discarding any parsed tree.
    pub fn set_blob(&mut self, blob: Vec<u8>) {
        match &mut self.payload {
            Payload::Blob(current) => *current = blob,
            Payload::Xml(payload) => payload.set_blob(blob),
        }
        if let PartKind::Image(info) = &mut self.kind {
            info.refresh(payload_bytes(&self.payload));
        }
    }

    /// Parsed element tree of an XML part, built on first access.
    pub fn element(&self) -> Result<&XmlElement> {
        match &self.payload {
            Payload::Xml(payload) => payload.element(),
            Payload::Blob(_) => Err(not_xml(&self.partname, &self.content_type)),
        }
    }

    /// Mutable element tree; the part is re-serialized from it on save.
    pub fn element_mut(&mut self) -> Result<&mut XmlElement> {
        match &mut self.payload {
            Payload::Xml(payload) => payload.element_mut(),
            Payload::Blob(_) => Err(not_xml(&self.partname, &self.content_type)),
        }
    }

    #[inline]
    pub fn rels(&self) -> &Relationships {
        &self.rels
    }

    #[inline]
    pub fn rels_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }

    /// Add a relationship with a known id. Used while wiring a loaded graph.
    pub fn load_rel(&mut self, reltype: &str, target: RelTarget, r_id: &str) -> &Relationship {
        self.rels
            .add_relationship(reltype.to_string(), target, r_id.to_string())
    }

    /// Return the rId of the relationship of `reltype` to `target`, adding
    /// one when none exists yet.
    pub fn relate_to(&mut self, target: PartId, reltype: &str) -> String {
        self.rels.get_or_add(reltype, target).r_id().to_string()
    }

    /// Same as [`relate_to`](Self::relate_to) for an external URI.
    pub fn relate_to_ext(&mut self, target_ref: &str, reltype: &str) -> String {
        self.rels.get_or_add_ext_rel(reltype, target_ref)
    }

    /// Target of the single relationship of `reltype` from this part.
    pub fn part_related_by(&self, reltype: &str) -> Result<PartId> {
        self.rels.part_with_reltype(reltype)
    }

    /// `Target` value of relationship `r_id`: the external URI, or the
    /// target partname relative to this part.
    pub fn target_ref(&self, r_id: &str, parts: &[Part]) -> Result<String> {
        self.rels
            .get(r_id)
            .ok_or_else(|| OpcError::RelationshipNotFound(format!("rId: {}", r_id)))?
            .target_ref(self.rels.base_uri(), parts)
    }

    /// Remove relationship `r_id` unless the part's XML still references it
    /// at least twice. Returns whether the relationship was removed.
    pub fn drop_rel(&mut self, r_id: &str) -> bool {
        if self.rel_ref_count(r_id) < 2 {
            return self.rels.remove(r_id).is_some();
        }
        log::debug!(
            "keeping {} on {}: still referenced from part content",
            r_id,
            self.partname
        );
        false
    }

    /// Number of `r:id` attributes in this part's content equal to `r_id`.
    /// Always zero for binary parts.
    pub fn rel_ref_count(&self, r_id: &str) -> usize {
        match &self.payload {
            Payload::Xml(payload) => payload.rel_ref_count(r_id),
            Payload::Blob(_) => 0,
        }
    }
}

impl PartLifecycle for Part {
    fn after_unmarshal(&mut self) -> Result<()> {
        if let PartKind::Image(info) = &mut self.kind {
            info.refresh(payload_bytes(&self.payload));
        }
        Ok(())
    }

    fn before_marshal(&mut self) -> Result<()> {
        match &mut self.payload {
            Payload::Xml(payload) => payload.before_marshal(),
            Payload::Blob(_) => Ok(()),
        }
    }
}

/// Whether a content type names an XML payload (`application/xml`, `*+xml`).
#[inline]
pub fn is_xml_content_type(content_type: &str) -> bool {
    content_type.ends_with("+xml") || content_type.ends_with("/xml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opc::constants::{content_type as ct, relationship_type as rt};

    fn header_part(xml: &[u8]) -> Part {
        Part::with_kind(
            PackURI::new("/word/header1.xml").unwrap(),
            ct::WML_HEADER.to_string(),
            PartKind::Header,
            xml.to_vec(),
        )
    }

    #[test]
    fn test_blob_part() {
        let partname = PackURI::new("/word/media/image1.png").unwrap();
        let content = vec![0x89, 0x50, 0x4E, 0x47];
        let part = Part::new(partname, ct::PNG.to_string(), content.clone());

        assert_eq!(part.content_type(), "image/png");
        assert!(!part.is_xml());
        assert_eq!(part.blob().as_ref(), content.as_slice());
        assert!(part.element().is_err());
    }

    #[test]
    fn test_xml_part_is_lazy() {
        let xml = b"<?xml version=\"1.0\"?>\n<w:hdr xmlns:w=\"urn:w\"><w:p/></w:hdr>";
        let part = header_part(xml);

        // Reading the tree does not change the bytes
        assert_eq!(part.element().unwrap().name(), "w:hdr");
        assert_eq!(part.blob().as_ref(), xml.as_slice());
    }

    #[test]
    fn test_xml_part_reserializes_after_edit() {
        let mut part = header_part(b"<w:hdr xmlns:w=\"urn:w\"><w:p/></w:hdr>");
        part.element_mut()
            .unwrap()
            .append_child(XmlElement::new("w:tbl"));

        let blob = part.blob().into_owned();
        assert_eq!(
            String::from_utf8(blob).unwrap(),
            "<?xml version='1.0' encoding='UTF-8' standalone='yes'?>\n<w:hdr xmlns:w=\"urn:w\"><w:p/><w:tbl/></w:hdr>"
        );

        part.before_marshal().unwrap();
        assert!(part.blob().starts_with(b"<?xml version='1.0'"));
    }

    #[test]
    fn test_encoding_errors_surface_on_element_access() {
        let bytes = vec![0x3c, 0xff, 0xfe];
        let mut part = Part::load(
            PackURI::new("/word/styles.xml").unwrap(),
            ct::WML_STYLES.to_string(),
            PartKind::Styles,
            bytes.clone(),
        )
        .unwrap();

        assert!(part.is_xml());
        assert!(part.element().is_err());
        assert!(part.element_mut().is_err());
        assert_eq!(part.blob().as_ref(), bytes.as_slice());
    }

    #[test]
    fn test_utf16_part_keeps_its_bytes() {
        let mut blob = vec![0xff, 0xfe];
        blob.extend(r#"<?xml version="1.0" encoding="UTF-16"?><ds:datastoreItem xmlns:ds="urn:ds"/>"#.encode_utf16().flat_map(u16::to_le_bytes));
        let part = Part::load(
            PackURI::new("/customXml/itemProps1.xml").unwrap(),
            ct::XML.to_string(),
            PartKind::Generic,
            blob.clone(),
        )
        .unwrap();

        assert_eq!(part.element().unwrap().local_name(), "datastoreItem");
        assert_eq!(part.blob().as_ref(), blob.as_slice());
    }

    #[test]
    fn test_utf16_references_are_counted() {
        let mut blob = vec![0xff, 0xfe];
        blob.extend(r#"<w:hdr xmlns:r="urn:r"><a r:id="rId1"/><b r:id="rId1"/></w:hdr>"#.encode_utf16().flat_map(u16::to_le_bytes));
        let mut part = Part::with_kind(
            PackURI::new("/word/header1.xml").unwrap(),
            ct::WML_HEADER.to_string(),
            PartKind::Header,
            blob,
        );
        part.relate_to(PartId::new(1), rt::IMAGE);

        assert_eq!(part.rel_ref_count("rId1"), 2);
        assert!(!part.drop_rel("rId1"));
    }

    #[test]
    fn test_element_mut_on_binary_part() {
        let mut part = Part::new(PackURI::new("/word/media/image1.png").unwrap(), ct::PNG.to_string(), vec![0x89]);
        assert!(matches!(part.element_mut(), Err(OpcError::XmlError(_))));
        assert!(matches!(part.element(), Err(OpcError::XmlError(_))));
    }

    #[test]
    fn test_drop_rel_respects_reference_count() {
        let xml = br#"<w:hdr xmlns:w="urn:w" xmlns:r="urn:r"><a r:id="rId1"/><b r:id="rId1"/><c r:id="rId2"/></w:hdr>"#;
        let mut part = header_part(xml);
        part.relate_to(PartId::new(1), rt::IMAGE);
        part.relate_to(PartId::new(2), rt::IMAGE);
        part.relate_to(PartId::new(3), rt::IMAGE);

        assert_eq!(part.rel_ref_count("rId1"), 2);
        assert!(!part.drop_rel("rId1"));
        assert!(part.rels().contains("rId1"));

        assert!(part.drop_rel("rId2"));
        assert!(part.drop_rel("rId3"));
        assert_eq!(part.rels().len(), 1);
    }

    #[test]
    fn test_rel_ref_count_on_edited_tree() {
        let mut part = header_part(br#"<w:hdr xmlns:r="urn:r"/>"#);
        part.element_mut()
            .unwrap()
            .append_child(XmlElement::new("x").with_attribute("r:id", "rId4"));
        assert_eq!(part.rel_ref_count("rId4"), 1);
        assert_eq!(part.rel_ref_count("rId40"), 0);
    }

    #[test]
    fn test_relate_to_and_part_related_by() {
        let mut part = header_part(b"<w:hdr/>");
        let r_id = part.relate_to(PartId::new(7), rt::IMAGE);
        assert_eq!(r_id, "rId1");
        assert_eq!(part.relate_to(PartId::new(7), rt::IMAGE), "rId1");
        assert_eq!(part.part_related_by(rt::IMAGE).unwrap(), PartId::new(7));
        assert!(part.part_related_by(rt::STYLES).is_err());
    }

    #[test]
    fn test_payload_parsed_on_first_access() {
        let payload = XmlPayload::new(b"<w:hdr xmlns:w=\"urn:w\"/>".to_vec());
        assert!(!payload.is_parsed());
        assert_eq!(payload.element().unwrap().local_name(), "hdr");
        assert!(payload.is_parsed());
    }

    #[test]
    fn test_set_partname_moves_rels_base() {
        let mut part = header_part(b"<w:hdr/>");
        part.set_partname(PackURI::new("/word/headers/header9.xml").unwrap());
        assert_eq!(part.partname().idx(), Some(9));
        assert_eq!(part.rels().base_uri(), "/word/headers");
    }

    #[test]
    fn test_is_xml_content_type() {
        assert!(is_xml_content_type("application/xml"));
        assert!(is_xml_content_type(ct::WML_DOCUMENT_MAIN));
        assert!(!is_xml_content_type("image/png"));
    }
}
