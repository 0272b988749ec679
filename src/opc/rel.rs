//! Relationship-related objects for OPC packages.
//!
//! A relationship is a typed edge from a source (a part, or the package
//! itself) to either another part in the same package or an external URI.
//! Internal targets are stored as arena ids rather than references, so the
//! edge set may contain cycles without any ownership cycle.

use crate::common::xml::escape_xml;
use crate::opc::constants::namespace;
use crate::opc::error::{OpcError, Result};
use crate::opc::oxml::XML_DECLARATION;
use crate::opc::packuri::PackURI;
use crate::opc::part::{Part, PartId};
use std::fmt;

/// Target of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelTarget {
    /// Another part in the same package
    Part(PartId),
    /// An external URI (hyperlink, linked image, ...)
    External(String),
}

/// A single relationship from a source to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1", "rId2")
    r_id: String,

    /// Relationship type URI
    reltype: String,

    target: RelTarget,
}

impl Relationship {
    pub fn new(r_id: String, reltype: String, target: RelTarget) -> Self {
        Self {
            r_id,
            reltype,
            target,
        }
    }

    #[inline]
    pub fn r_id(&self) -> &str {
        &self.r_id
    }

    #[inline]
    pub fn reltype(&self) -> &str {
        &self.reltype
    }

    #[inline]
    pub fn target(&self) -> &RelTarget {
        &self.target
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        matches!(self.target, RelTarget::External(_))
    }

    /// The target part of an internal relationship.
    ///
    /// Returns an error if this is an external relationship.
    pub fn target_part(&self) -> Result<PartId> {
        match &self.target {
            RelTarget::Part(id) => Ok(*id),
            RelTarget::External(url) => Err(OpcError::InvalidRelationship(format!(
                "target_part property on external relationship {} ({}) is undefined",
                self.r_id, url
            ))),
        }
    }

    /// The `Target` attribute value as written to a `.rels` stream: the
    /// external URI verbatim, or the target's partname relative to
    /// `base_uri`.
    pub fn target_ref(&self, base_uri: &str, parts: &[Part]) -> Result<String> {
        match &self.target {
            RelTarget::External(url) => Ok(url.clone()),
            RelTarget::Part(id) => {
                let part = parts
                    .get(id.index())
                    .ok_or_else(|| OpcError::PartNotFound(format!("part #{}", id.index())))?;
                Ok(part.partname().relative_ref(base_uri))
            },
        }
    }
}

/// Collection of relationships from a single source.
///
/// Relationships keep their insertion order, which is also the order they
/// are serialized in and the order graph walks follow. Collections are
/// small, so lookups scan linearly.
#[derive(Debug, Clone)]
pub struct Relationships {
    /// Base URI of the source, used to compute relative target references
    base_uri: String,

    rels: Vec<Relationship>,
}

impl Relationships {
    pub fn new(base_uri: String) -> Self {
        Self {
            base_uri,
            rels: Vec::new(),
        }
    }

    #[inline]
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub(crate) fn set_base_uri(&mut self, base_uri: String) {
        self.base_uri = base_uri;
    }

    /// Insert a relationship with a known id. Used by the loader, where ids
    /// come from the serialized package and must be preserved exactly.
    ///
    /// The insert is unconditional: an existing relationship with the same
    /// id is kept, and [`get`](Self::get) keeps returning the earlier one.
    pub fn add_relationship(&mut self, reltype: String, target: RelTarget, r_id: String) -> &Relationship {
        if self.contains(&r_id) {
            log::warn!("relationship id {} is already used under {}", r_id, self.base_uri);
        }
        self.rels.push(Relationship::new(r_id, reltype, target));
        &self.rels[self.rels.len() - 1]
    }

    #[inline]
    pub fn get(&self, r_id: &str) -> Option<&Relationship> {
        self.rels.iter().find(|rel| rel.r_id == r_id)
    }

    #[inline]
    pub fn contains(&self, r_id: &str) -> bool {
        self.get(r_id).is_some()
    }

    /// Return the internal relationship of `reltype` to `target`, adding one
    /// with the next available rId when none exists.
    pub fn get_or_add(&mut self, reltype: &str, target: PartId) -> &Relationship {
        let existing = self.rels.iter().position(|rel| {
            rel.reltype == reltype && matches!(rel.target, RelTarget::Part(id) if id == target)
        });
        match existing {
            Some(idx) => &self.rels[idx],
            None => {
                let r_id = self.next_r_id();
                self.add_relationship(reltype.to_string(), RelTarget::Part(target), r_id)
            },
        }
    }

    /// Return the rId of the external relationship of `reltype` to
    /// `target_ref`, adding one when none exists.
    pub fn get_or_add_ext_rel(&mut self, reltype: &str, target_ref: &str) -> String {
        let existing = self.rels.iter().find(|rel| {
            rel.reltype == reltype && matches!(&rel.target, RelTarget::External(url) if url == target_ref)
        });
        if let Some(rel) = existing {
            return rel.r_id.clone();
        }

        let r_id = self.next_r_id();
        self.add_relationship(
            reltype.to_string(),
            RelTarget::External(target_ref.to_string()),
            r_id.clone(),
        );
        r_id
    }

    /// The first of `rId1`, `rId2`, ... not already in use. Gaps left by
    /// removed relationships are filled before new numbers are used.
    pub fn next_r_id(&self) -> String {
        let mut used_numbers: Vec<u32> = self
            .rels
            .iter()
            .filter_map(|rel| {
                let suffix = rel.r_id.strip_prefix("rId")?;
                // "rId01" never collides with a generated "rId1"
                if suffix.starts_with('0') {
                    return None;
                }
                atoi_simd::parse::<u32, false, false>(suffix.as_bytes()).ok()
            })
            .collect();

        used_numbers.sort_unstable();

        let mut next_num = 1u32;
        for &num in &used_numbers {
            match num.cmp(&next_num) {
                std::cmp::Ordering::Equal => next_num += 1,
                std::cmp::Ordering::Greater => break,
                std::cmp::Ordering::Less => {},
            }
        }

        format!("rId{}", next_num)
    }

    /// The target part of the single relationship of `reltype`.
    ///
    /// Fails with `RelationshipNotFound` when there is none and with
    /// `AmbiguousRelationship` when there is more than one.
    pub fn part_with_reltype(&self, reltype: &str) -> Result<PartId> {
        let mut matching = self.rels.iter().filter(|rel| rel.reltype == reltype);
        let rel = matching.next().ok_or_else(|| {
            OpcError::RelationshipNotFound(format!("no relationship of type '{}' in collection", reltype))
        })?;
        if matching.next().is_some() {
            return Err(OpcError::AmbiguousRelationship(reltype.to_string()));
        }
        rel.target_part()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Relationship> {
        self.rels.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    pub fn remove(&mut self, r_id: &str) -> Option<Relationship> {
        let idx = self.rels.iter().position(|rel| rel.r_id == r_id)?;
        Some(self.rels.remove(idx))
    }

    /// Serialize to the XML of a `.rels` stream.
    pub fn to_xml(&self, parts: &[Part]) -> Result<String> {
        let mut xml = String::with_capacity(256 + self.rels.len() * 160);

        xml.push_str(XML_DECLARATION);
        xml.push_str(r#"<Relationships xmlns=""#);
        xml.push_str(namespace::OPC_RELATIONSHIPS);
        if self.rels.is_empty() {
            xml.push_str(r#""/>"#);
            return Ok(xml);
        }
        xml.push_str(r#"">"#);

        for rel in &self.rels {
            let target_ref = rel.target_ref(&self.base_uri, parts)?;
            let target_mode = if rel.is_external() {
                r#" TargetMode="External""#
            } else {
                ""
            };

            xml.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                escape_xml(&rel.r_id),
                escape_xml(&rel.reltype),
                escape_xml(&target_ref),
                target_mode
            ));
        }

        xml.push_str("</Relationships>");
        Ok(xml)
    }
}

impl Default for Relationships {
    fn default() -> Self {
        Self::new(PackURI::package().as_str().to_string())
    }
}

impl<'a> IntoIterator for &'a Relationships {
    type Item = &'a Relationship;
    type IntoIter = std::slice::Iter<'a, Relationship>;

    fn into_iter(self) -> Self::IntoIter {
        self.rels.iter()
    }
}

impl fmt::Display for RelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelTarget::Part(id) => write!(f, "part #{}", id.index()),
            RelTarget::External(url) => f.write_str(url),
        }
    }
}
