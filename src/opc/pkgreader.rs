//! Low-level, read-only API to a serialized Open Packaging Convention (OPC) package.
//!
//! [`PackageReader`] parses the content types, then walks the relationship
//! graph from the package root and collects every reachable part as a
//! [`SerializedPart`]: partname, content type, the reltype of the edge that
//! first reached it, its bytes and its own serialized relationships. Nothing
//! here knows about typed parts; that is the unmarshaller's job.

use crate::opc::constants::target_mode;
use crate::opc::content_types::ContentTypeMap;
use crate::opc::error::{OpcError, Result};
use crate::opc::packuri::PackURI;
use crate::opc::phys_pkg::PhysPkgReader;
use quick_xml::Reader;
use quick_xml::events::Event;
use smallvec::SmallVec;
use std::collections::HashSet;

/// Relationships of one source, as read from its `.rels` stream.
pub type SerializedRels = SmallVec<[SerializedRelationship; 8]>;

/// Serialized part with its content and relationships.
#[derive(Debug)]
pub struct SerializedPart {
    pub partname: PackURI,
    pub content_type: String,

    /// The relationship type of the edge that discovered this part
    pub reltype: String,

    pub blob: Vec<u8>,
    pub srels: SerializedRels,
}

/// Serialized relationship as read from a .rels file.
#[derive(Debug, Clone)]
pub struct SerializedRelationship {
    /// Base URI for resolving relative references
    pub base_uri: String,

    /// Relationship ID (e.g., "rId1")
    pub r_id: String,

    /// Relationship type URI
    pub reltype: String,

    /// Target reference (relative URI or external URL)
    pub target_ref: String,

    /// Target mode (Internal or External)
    pub target_mode: String,
}

impl SerializedRelationship {
    #[inline]
    pub fn is_external(&self) -> bool {
        self.target_mode == target_mode::EXTERNAL
    }

    /// Absolute partname of an internal relationship's target.
    pub fn target_partname(&self) -> Result<PackURI> {
        if self.is_external() {
            return Err(OpcError::InvalidRelationship(format!(
                "{} is external and has no target partname",
                self.r_id
            )));
        }
        PackURI::from_rel_ref(&self.base_uri, &self.target_ref)
    }
}

/// The serialized contents of a package: root relationships plus every
/// part reachable from them, in depth-first discovery order.
#[derive(Debug)]
pub struct PackageReader {
    pkg_srels: SerializedRels,
    sparts: Vec<SerializedPart>,
}

impl PackageReader {
    /// Read content types and walk the relationship graph of `phys_reader`.
    ///
    /// Member bytes are moved out of the physical reader as parts are found.
    pub fn from_phys_reader(phys_reader: &mut PhysPkgReader) -> Result<Self> {
        let content_types = ContentTypeMap::from_xml(&phys_reader.content_types_xml()?)?;
        let pkg_srels = Self::load_rels(phys_reader, &PackURI::package())?;
        let sparts = Self::walk_parts(phys_reader, &pkg_srels, &content_types)?;

        log::debug!(
            "package walk found {} parts from {} root relationships",
            sparts.len(),
            pkg_srels.len()
        );

        Ok(Self { pkg_srels, sparts })
    }

    /// Relationships of `source_uri`. A missing `.rels` member is an empty set.
    fn load_rels(phys_reader: &PhysPkgReader, source_uri: &PackURI) -> Result<SerializedRels> {
        match phys_reader.rels_xml_for(source_uri)? {
            Some(xml) => parse_rels_xml(&xml, source_uri.base_uri()),
            None => Ok(SmallVec::new()),
        }
    }

    /// Depth-first, pre-order walk over internal relationships. Each part is
    /// visited once no matter how many edges lead to it.
    fn walk_parts(
        phys_reader: &mut PhysPkgReader,
        pkg_srels: &[SerializedRelationship],
        content_types: &ContentTypeMap,
    ) -> Result<Vec<SerializedPart>> {
        let mut sparts = Vec::with_capacity(32);
        let mut visited: HashSet<String> = HashSet::with_capacity(32);
        let mut stack = vec![internal_targets(pkg_srels)?.into_iter()];

        while let Some(targets) = stack.last_mut() {
            let Some((partname, reltype)) = targets.next() else {
                stack.pop();
                continue;
            };

            if !visited.insert(partname.as_str().to_lowercase()) {
                continue;
            }

            if !phys_reader.contains(&partname) {
                return Err(OpcError::PartNotFound(partname.to_string()));
            }

            let srels = Self::load_rels(phys_reader, &partname)?;
            let children = internal_targets(&srels)?;
            let content_type = content_types.content_type_for(&partname)?.to_string();
            let blob = phys_reader.take_blob(&partname)?;

            log::trace!("found {} ({} bytes, {} rels)", partname, blob.len(), srels.len());

            sparts.push(SerializedPart {
                partname,
                content_type,
                reltype,
                blob,
                srels,
            });
            stack.push(children.into_iter());
        }

        Ok(sparts)
    }

    pub fn iter_sparts(&self) -> impl Iterator<Item = &SerializedPart> {
        self.sparts.iter()
    }

    pub fn pkg_srels(&self) -> &[SerializedRelationship] {
        &self.pkg_srels
    }

    /// Every serialized relationship with the partname of its source, the
    /// package root first.
    pub fn iter_srels(&self) -> impl Iterator<Item = (PackURI, &SerializedRelationship)> {
        let root = self.pkg_srels.iter().map(|srel| (PackURI::package(), srel));
        let parts = self
            .sparts
            .iter()
            .flat_map(|spart| spart.srels.iter().map(move |srel| (spart.partname.clone(), srel)));
        root.chain(parts)
    }

    /// Take ownership of package-level relationships.
    pub fn take_pkg_srels(&mut self) -> SerializedRels {
        std::mem::take(&mut self.pkg_srels)
    }

    /// Take ownership of all serialized parts.
    pub fn take_sparts(&mut self) -> Vec<SerializedPart> {
        std::mem::take(&mut self.sparts)
    }
}

/// `(target partname, reltype)` for every internal relationship, in order.
fn internal_targets(srels: &[SerializedRelationship]) -> Result<Vec<(PackURI, String)>> {
    srels
        .iter()
        .filter(|srel| !srel.is_external())
        .map(|srel| Ok((srel.target_partname()?, srel.reltype.clone())))
        .collect()
}

/// Parse a `.rels` stream. Relationship elements missing `Id`, `Type` or
/// `Target` are skipped with a warning; a repeated `Id` is an error.
pub fn parse_rels_xml(rels_xml: &[u8], base_uri: &str) -> Result<SerializedRels> {
    let mut srels: SerializedRels = SmallVec::new();
    let mut seen = HashSet::new();
    let mut reader = Reader::from_reader(rels_xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let mut r_id = None;
                    let mut reltype = None;
                    let mut target_ref = None;
                    let mut target_mode = target_mode::INTERNAL.to_string();

                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"Id" => r_id = Some(attr.unescape_value()?.into_owned()),
                            b"Type" => reltype = Some(attr.unescape_value()?.into_owned()),
                            b"Target" => target_ref = Some(attr.unescape_value()?.into_owned()),
                            b"TargetMode" => target_mode = attr.unescape_value()?.into_owned(),
                            _ => {},
                        }
                    }

                    match (r_id, reltype, target_ref) {
                        (Some(r_id), Some(reltype), Some(target_ref)) => {
                            if !seen.insert(r_id.clone()) {
                                return Err(OpcError::InvalidRelationship(format!(
                                    "duplicate relationship id {} under {}",
                                    r_id, base_uri
                                )));
                            }
                            srels.push(SerializedRelationship {
                                base_uri: base_uri.to_string(),
                                r_id,
                                reltype,
                                target_ref,
                                target_mode,
                            });
                        },
                        (r_id, _, _) => log::warn!(
                            "skipping incomplete relationship {:?} under {}",
                            r_id,
                            base_uri
                        ),
                    }
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpcError::XmlError(format!("Rels parse error: {}", e))),
            _ => {},
        }
        buf.clear();
    }

    Ok(srels)
}
