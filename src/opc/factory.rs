//! Selection of the part kind to build for a serialized part.
//!
//! The registry is an ordinary value: [`PartFactory::default`] carries the
//! built-in table and callers may extend a copy before handing it to
//! [`OpcPackage::open_with_factory`](crate::opc::OpcPackage::open_with_factory).

use crate::opc::constants::{content_type as ct, relationship_type as rt};
use crate::opc::error::Result;
use crate::opc::packuri::PackURI;
use crate::opc::part::{Part, PartKind};
use crate::parts::image::ImageInfo;
use std::collections::HashMap;

/// Registry mapping content types and relationship types to part kinds.
#[derive(Debug, Clone)]
pub struct PartFactory {
    /// reltype -> kind; consulted before content types
    by_reltype: HashMap<String, PartKind>,
    by_content_type: HashMap<String, PartKind>,
}

impl PartFactory {
    /// A registry with no entries; every part loads as [`PartKind::Generic`].
    pub fn empty() -> Self {
        Self {
            by_reltype: HashMap::new(),
            by_content_type: HashMap::new(),
        }
    }

    pub fn register_content_type(&mut self, content_type: &str, kind: PartKind) -> &mut Self {
        self.by_content_type.insert(content_type.to_string(), kind);
        self
    }

    pub fn register_reltype(&mut self, reltype: &str, kind: PartKind) -> &mut Self {
        self.by_reltype.insert(reltype.to_string(), kind);
        self
    }

    /// Kind for a part reached through `reltype` and declared as
    /// `content_type`. The relationship type wins; images in particular are
    /// not reliably typed by content type.
    pub fn kind_for(&self, content_type: &str, reltype: &str) -> PartKind {
        self.by_reltype
            .get(reltype)
            .or_else(|| self.by_content_type.get(content_type))
            .cloned()
            .unwrap_or(PartKind::Generic)
    }

    /// Build the part for one serialized part.
    pub fn load(&self, partname: PackURI, content_type: String, reltype: &str, blob: Vec<u8>) -> Result<Part> {
        let kind = self.kind_for(&content_type, reltype);
        log::trace!("loading {} as {} part", partname, kind.name());
        Part::load(partname, content_type, kind, blob)
    }
}

impl Default for PartFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory
            .register_reltype(rt::IMAGE, PartKind::Image(ImageInfo::default()))
            .register_content_type(ct::OPC_CORE_PROPERTIES, PartKind::CoreProperties)
            .register_content_type(ct::WML_DOCUMENT_MAIN, PartKind::Document)
            .register_content_type(ct::WML_TEMPLATE_MAIN, PartKind::Document)
            .register_content_type(ct::WML_HEADER, PartKind::Header)
            .register_content_type(ct::WML_FOOTER, PartKind::Footer)
            .register_content_type(ct::WML_NUMBERING, PartKind::Numbering)
            .register_content_type(ct::WML_SETTINGS, PartKind::Settings)
            .register_content_type(ct::WML_STYLES, PartKind::Styles)
            .register_content_type(ct::OFC_THEME, PartKind::Theme);
        factory
    }
}
