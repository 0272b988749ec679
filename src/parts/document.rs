//! WordprocessingML conveniences on top of the package graph.
//!
//! These are the operations a document model needs from the engine: the
//! main document part, core properties, the singleton parts related from the
//! document (created when missing), header/footer parts and images.

use crate::opc::constants::{content_type as ct, relationship_type as rt};
use crate::opc::error::{OpcError, Result};
use crate::opc::package::{OpcPackage, RelSource};
use crate::opc::packuri::PackURI;
use crate::opc::part::{Part, PartId, PartKind};
use crate::parts::core_properties::{
    CORE_PROPERTIES_PARTNAME, CoreProperties, CorePropertiesMut, default_core_properties_element,
};
use crate::parts::image::{IMAGE_PARTNAME_TEMPLATE, ImageInfo, content_type_for_ext, filename_ext, sha1_hex};
use crate::parts::templates;
use chrono::Utc;

/// Where a singleton document part lives and what it starts as.
struct PartTemplate {
    partname: &'static str,
    content_type: &'static str,
    reltype: &'static str,
    kind: PartKind,
    xml: &'static str,
}

impl PartTemplate {
    fn build(&self) -> Result<Part> {
        Ok(Part::with_kind(
            PackURI::new(self.partname)?,
            self.content_type.to_string(),
            self.kind.clone(),
            self.xml.as_bytes().to_vec(),
        ))
    }
}

impl OpcPackage {
    /// The core-properties part, created with default values when the
    /// package has none.
    pub fn core_properties_part(&mut self) -> Result<PartId> {
        match self.part_related_by(RelSource::Package, rt::CORE_PROPERTIES) {
            Err(OpcError::RelationshipNotFound(_)) => {
                let element = default_core_properties_element(Utc::now())?;
                let part = Part::from_element(
                    PackURI::new(CORE_PROPERTIES_PARTNAME)?,
                    ct::OPC_CORE_PROPERTIES.to_string(),
                    PartKind::CoreProperties,
                    element,
                );
                let id = self.add_part(part);
                self.relate_to(RelSource::Package, id, rt::CORE_PROPERTIES)?;
                log::debug!("created default core properties at {}", CORE_PROPERTIES_PARTNAME);
                Ok(id)
            },
            other => other,
        }
    }

    pub fn core_properties(&mut self) -> Result<CoreProperties<'_>> {
        let id = self.core_properties_part()?;
        Ok(CoreProperties::new(self.part(id).element()?))
    }

    /// Writable core properties. The part is re-serialized on save.
    pub fn core_properties_mut(&mut self) -> Result<CorePropertiesMut<'_>> {
        let id = self.core_properties_part()?;
        Ok(CorePropertiesMut::new(self.part_mut(id).element_mut()?))
    }

    pub fn styles_part(&mut self) -> Result<PartId> {
        self.document_part_or_default(PartTemplate {
            partname: "/word/styles.xml",
            content_type: ct::WML_STYLES,
            reltype: rt::STYLES,
            kind: PartKind::Styles,
            xml: templates::DEFAULT_STYLES_XML,
        })
    }

    pub fn settings_part(&mut self) -> Result<PartId> {
        self.document_part_or_default(PartTemplate {
            partname: "/word/settings.xml",
            content_type: ct::WML_SETTINGS,
            reltype: rt::SETTINGS,
            kind: PartKind::Settings,
            xml: templates::DEFAULT_SETTINGS_XML,
        })
    }

    pub fn numbering_part(&mut self) -> Result<PartId> {
        self.document_part_or_default(PartTemplate {
            partname: "/word/numbering.xml",
            content_type: ct::WML_NUMBERING,
            reltype: rt::NUMBERING,
            kind: PartKind::Numbering,
            xml: templates::DEFAULT_NUMBERING_XML,
        })
    }

    pub fn theme_part(&mut self) -> Result<PartId> {
        self.document_part_or_default(PartTemplate {
            partname: "/word/theme/theme1.xml",
            content_type: ct::OFC_THEME,
            reltype: rt::THEME,
            kind: PartKind::Theme,
            xml: templates::DEFAULT_THEME_XML,
        })
    }

    /// Part related from the main document by `template.reltype`. When there
    /// is none, a reachable part already at the template's partname is
    /// related, otherwise one is built from the template.
    fn document_part_or_default(&mut self, template: PartTemplate) -> Result<PartId> {
        let document = self.main_document_part()?;
        match self.part_related_by(document.into(), template.reltype) {
            Err(OpcError::RelationshipNotFound(_)) => {
                let partname = PackURI::new(template.partname)?;
                let id = match self.part_by_name(&partname) {
                    Some(existing) => existing,
                    None => {
                        log::debug!("creating default {}", partname);
                        self.add_part(template.build()?)
                    },
                };
                self.relate_to(document.into(), id, template.reltype)?;
                Ok(id)
            },
            other => other,
        }
    }

    /// Create a header part at the next free `/word/header%d.xml` and relate
    /// it from the main document.
    pub fn add_header_part(&mut self) -> Result<(String, PartId)> {
        self.add_story_part(
            "/word/header%d.xml",
            ct::WML_HEADER,
            rt::HEADER,
            PartKind::Header,
            templates::DEFAULT_HEADER_XML,
        )
    }

    pub fn add_footer_part(&mut self) -> Result<(String, PartId)> {
        self.add_story_part(
            "/word/footer%d.xml",
            ct::WML_FOOTER,
            rt::FOOTER,
            PartKind::Footer,
            templates::DEFAULT_FOOTER_XML,
        )
    }

    fn add_story_part(
        &mut self,
        template: &str,
        content_type: &str,
        reltype: &str,
        kind: PartKind,
        xml: &str,
    ) -> Result<(String, PartId)> {
        let document = self.main_document_part()?;
        let partname = self.next_partname(template)?;
        let part = Part::with_kind(partname, content_type.to_string(), kind, xml.as_bytes().to_vec());
        let id = self.add_part(part);
        let r_id = self.relate_to(document.into(), id, reltype)?;
        Ok((r_id, id))
    }

    /// Drop the main document's relationship `r_id` to a header part.
    pub fn drop_header_part(&mut self, r_id: &str) -> Result<bool> {
        let document = self.main_document_part()?;
        self.drop_rel(document.into(), r_id)
    }

    pub fn drop_footer_part(&mut self, r_id: &str) -> Result<bool> {
        self.drop_header_part(r_id)
    }

    /// Image part holding `blob`. An image with the same SHA-1 is reused;
    /// otherwise a new part is added at the first free
    /// `/word/media/image%d.<ext>`, typed from `filename`'s extension.
    ///
    /// A new part is not reachable until something relates to it.
    pub fn get_or_add_image_part(&mut self, blob: &[u8], filename: &str) -> Result<PartId> {
        let sha1 = sha1_hex(blob);
        if let Some(id) = self.find_image_part(&sha1) {
            return Ok(id);
        }

        let ext = filename_ext(filename).ok_or_else(|| {
            OpcError::InvalidValue(format!("image filename '{}' has no extension", filename))
        })?;
        let content_type = content_type_for_ext(&ext)?;
        let partname = self.next_image_partname(&ext)?;

        log::debug!("adding image {} ({} bytes)", partname, blob.len());
        let part = Part::with_kind(
            partname,
            content_type.to_string(),
            PartKind::Image(ImageInfo::from_blob(blob)),
            blob.to_vec(),
        );
        Ok(self.add_part(part))
    }

    /// Relate `source` to the image part for `blob`, adding the part if
    /// needed. Returns the rId and the image part.
    pub fn relate_image(&mut self, source: PartId, blob: &[u8], filename: &str) -> Result<(String, PartId)> {
        let image = self.get_or_add_image_part(blob, filename)?;
        let r_id = self.relate_to(source.into(), image, rt::IMAGE)?;
        Ok((r_id, image))
    }

    fn find_image_part(&self, sha1: &str) -> Option<PartId> {
        let same_digest = |id: PartId| matches!(self.part(id).kind(), PartKind::Image(info) if info.sha1() == sha1);

        if let Some(&id) = self.image_index().get(sha1) {
            if same_digest(id) {
                return Some(id);
            }
        }
        // index misses images whose bytes were replaced after they were added
        (0..self.parts().len()).map(PartId::new).find(|&id| same_digest(id))
    }

    /// First image number in 1..=n not used by an image part, else n + 1.
    fn next_image_partname(&self, ext: &str) -> Result<PackURI> {
        let used: Vec<u32> = self
            .parts()
            .iter()
            .filter(|part| matches!(part.kind(), PartKind::Image(_)))
            .filter_map(|part| part.partname().idx())
            .collect();

        let count = used.len() as u32;
        let n = (1..=count)
            .find(|n| !used.contains(n))
            .unwrap_or(count + 1);

        let template = format!("{}{}", IMAGE_PARTNAME_TEMPLATE, ext);
        PackURI::new(template.replacen("%d", &n.to_string(), 1))
    }
}
