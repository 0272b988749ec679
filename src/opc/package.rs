//! Objects that implement reading and writing OPC packages.
//!
//! [`OpcPackage`] is the root of the package graph. It owns every part in an
//! arena and the package-level relationships; the set of parts that belong
//! to the package at any moment is whatever a depth-first walk from those
//! relationships reaches.

use crate::opc::constants::relationship_type as rt;
use crate::opc::error::{OpcError, Result};
use crate::opc::factory::PartFactory;
use crate::opc::packuri::PackURI;
use crate::opc::part::{Part, PartId, PartKind, PartLifecycle};
use crate::opc::phys_pkg::PhysPkgReader;
use crate::opc::pkgreader::{PackageReader, SerializedRelationship};
use crate::opc::pkgwriter::{PackageWriter, SaveOptions};
use crate::opc::rel::{RelTarget, Relationship, Relationships};
use fixedbitset::FixedBitSet;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;
use std::slice;

/// Source of a relationship: the package itself or one of its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelSource {
    Package,
    Part(PartId),
}

impl From<PartId> for RelSource {
    fn from(id: PartId) -> Self {
        RelSource::Part(id)
    }
}

/// Main API class for working with OPC packages.
#[derive(Debug, Clone)]
pub struct OpcPackage {
    /// Package-level relationships, rooted at `/`
    rels: Relationships,

    /// Arena of every part ever loaded or added. Unreachable parts stay
    /// here but are not walked, looked up by name, or saved.
    parts: Vec<Part>,

    /// SHA-1 -> image part, for de-duplicating added images
    image_index: HashMap<String, PartId>,
}

impl OpcPackage {
    /// Create a new empty OPC package.
    pub fn new() -> Self {
        Self {
            rels: Relationships::new(PackURI::package().as_str().to_string()),
            parts: Vec::new(),
            image_index: HashMap::new(),
        }
    }

    /// Open a package from a ZIP file or an unpacked directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_factory(path, &PartFactory::default())
    }

    /// Open a package, choosing part kinds with a caller-supplied registry.
    pub fn open_with_factory<P: AsRef<Path>>(path: P, factory: &PartFactory) -> Result<Self> {
        let mut phys_reader = PhysPkgReader::open(path)?;
        Self::from_phys_reader(&mut phys_reader, factory)
    }

    /// Load a package from ZIP bytes held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let mut phys_reader = PhysPkgReader::from_bytes(data)?;
        Self::from_phys_reader(&mut phys_reader, &PartFactory::default())
    }

    /// Load a package from a stream of ZIP bytes.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut phys_reader = PhysPkgReader::from_reader(reader)?;
        Self::from_phys_reader(&mut phys_reader, &PartFactory::default())
    }

    pub fn from_phys_reader(phys_reader: &mut PhysPkgReader, factory: &PartFactory) -> Result<Self> {
        let pkg_reader = PackageReader::from_phys_reader(phys_reader)?;
        Self::unmarshal(pkg_reader, factory)
    }

    /// Build the typed graph from serialized parts.
    ///
    /// Parts are constructed first, then every serialized relationship is
    /// replayed against the constructed parts, then the lifecycle hooks run
    /// on each part and finally on the package.
    fn unmarshal(mut pkg_reader: PackageReader, factory: &PartFactory) -> Result<Self> {
        let mut package = Self::new();
        let sparts = pkg_reader.take_sparts();
        let pkg_srels = pkg_reader.take_pkg_srels();

        let mut by_name: HashMap<String, PartId> = HashMap::with_capacity(sparts.len());
        let mut part_srels = Vec::with_capacity(sparts.len());

        for spart in sparts {
            let part = factory.load(spart.partname, spart.content_type, &spart.reltype, spart.blob)?;
            let id = PartId::new(package.parts.len());
            by_name.insert(part.partname().as_str().to_lowercase(), id);
            package.parts.push(part);
            part_srels.push(spart.srels);
        }

        for srel in &pkg_srels {
            let target = resolve_target(srel, &by_name)?;
            package.rels.add_relationship(srel.reltype.clone(), target, srel.r_id.clone());
        }

        for (index, srels) in part_srels.iter().enumerate() {
            for srel in srels {
                let target = resolve_target(srel, &by_name)?;
                package.parts[index].load_rel(&srel.reltype, target, &srel.r_id);
            }
        }

        for part in &mut package.parts {
            part.after_unmarshal()?;
        }
        package.after_unmarshal()?;

        log::debug!(
            "unmarshalled {} parts, {} package relationships",
            package.parts.len(),
            package.rels.len()
        );
        Ok(package)
    }

    /// Save to a file with default options.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        PackageWriter::write(path, self, &SaveOptions::default())
    }

    pub fn save_with_options<P: AsRef<Path>>(&mut self, path: P, options: &SaveOptions) -> Result<()> {
        PackageWriter::write(path, self, options)
    }

    /// Serialize to ZIP bytes with default options.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        PackageWriter::to_bytes(self, &SaveOptions::default())
    }

    pub fn save_to_writer<W: Write>(&mut self, writer: W) -> Result<()> {
        PackageWriter::write_to_stream(writer, self, &SaveOptions::default())
    }

    /// Package-level relationships.
    #[inline]
    pub fn rels(&self) -> &Relationships {
        &self.rels
    }

    #[inline]
    pub fn rels_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }

    /// Relationships of a source.
    pub fn rels_of(&self, source: RelSource) -> Result<&Relationships> {
        match source {
            RelSource::Package => Ok(&self.rels),
            RelSource::Part(id) => Ok(self.get_part(id)?.rels()),
        }
    }

    fn rels_of_mut(&mut self, source: RelSource) -> Result<&mut Relationships> {
        match source {
            RelSource::Package => Ok(&mut self.rels),
            RelSource::Part(id) => Ok(self.get_part_mut(id)?.rels_mut()),
        }
    }

    /// The part with id `id`.
    ///
    /// # Panics
    /// If `id` was not issued by this package.
    #[inline]
    pub fn part(&self, id: PartId) -> &Part {
        &self.parts[id.index()]
    }

    /// # Panics
    /// If `id` was not issued by this package.
    #[inline]
    pub fn part_mut(&mut self, id: PartId) -> &mut Part {
        &mut self.parts[id.index()]
    }

    /// The part with id `id`, or `PartNotFound` for an id from elsewhere.
    pub fn get_part(&self, id: PartId) -> Result<&Part> {
        self.parts.get(id.index()).ok_or_else(|| Self::unknown_id(id))
    }

    pub fn get_part_mut(&mut self, id: PartId) -> Result<&mut Part> {
        self.parts.get_mut(id.index()).ok_or_else(|| Self::unknown_id(id))
    }

    /// Every part in the arena, reachable or not, indexed by `PartId`.
    #[inline]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Add a part to the arena. It becomes part of the package once some
    /// relationship targets it.
    pub fn add_part(&mut self, part: Part) -> PartId {
        let id = PartId::new(self.parts.len());
        if let PartKind::Image(info) = part.kind() {
            self.image_index.insert(info.sha1().to_string(), id);
        }
        self.parts.push(part);
        id
    }

    /// Reachable part with `partname`, compared case-insensitively.
    pub fn part_by_name(&self, partname: &PackURI) -> Option<PartId> {
        let wanted = partname.as_str();
        self.iter_parts()
            .find(|&id| self.part(id).partname().as_str().eq_ignore_ascii_case(wanted))
    }

    /// Reachable parts in depth-first pre-order, each exactly once.
    pub fn iter_parts(&self) -> PartIter<'_> {
        PartIter {
            parts: &self.parts,
            stack: vec![self.rels.iter()],
            visited: FixedBitSet::with_capacity(self.parts.len()),
        }
    }

    /// Every relationship reachable from the package root, with its source.
    ///
    /// Edges into already-visited parts are reported; the walk just does not
    /// descend into them a second time.
    pub fn iter_rels(&self) -> RelIter<'_> {
        RelIter {
            parts: &self.parts,
            stack: vec![(RelSource::Package, self.rels.iter())],
            visited: FixedBitSet::with_capacity(self.parts.len()),
        }
    }

    /// Relate `source` to `target`, reusing an existing relationship of the
    /// same type to the same part. Returns the rId.
    pub fn relate_to(&mut self, source: RelSource, target: PartId, reltype: &str) -> Result<String> {
        self.get_part(target)?;
        Ok(self.rels_of_mut(source)?.get_or_add(reltype, target).r_id().to_string())
    }

    /// Relate `source` to an external URI. Returns the rId.
    pub fn relate_to_ext(&mut self, source: RelSource, target_ref: &str, reltype: &str) -> Result<String> {
        Ok(self.rels_of_mut(source)?.get_or_add_ext_rel(reltype, target_ref))
    }

    /// Add a package-level relationship with a known rId.
    pub fn load_rel(&mut self, reltype: &str, target: RelTarget, r_id: &str) -> &Relationship {
        self.rels
            .add_relationship(reltype.to_string(), target, r_id.to_string())
    }

    /// Target of the single relationship of `reltype` from `source`.
    pub fn part_related_by(&self, source: RelSource, reltype: &str) -> Result<PartId> {
        self.rels_of(source)?.part_with_reltype(reltype)
    }

    /// Drop relationship `r_id` from `source`. Parts keep relationships
    /// their XML still references more than once; the package never does.
    pub fn drop_rel(&mut self, source: RelSource, r_id: &str) -> Result<bool> {
        match source {
            RelSource::Package => Ok(self.rels.remove(r_id).is_some()),
            RelSource::Part(id) => Ok(self.get_part_mut(id)?.drop_rel(r_id)),
        }
    }

    /// `Target` value of relationship `r_id` of `source`.
    pub fn target_ref(&self, source: RelSource, r_id: &str) -> Result<String> {
        let rels = self.rels_of(source)?;
        rels.get(r_id)
            .ok_or_else(|| OpcError::RelationshipNotFound(format!("rId: {}", r_id)))?
            .target_ref(rels.base_uri(), &self.parts)
    }

    /// The unique target of the package's `officeDocument` relationship.
    pub fn main_document_part(&self) -> Result<PartId> {
        self.rels.part_with_reltype(rt::OFFICE_DOCUMENT)
    }

    /// First partname from `template` not used by a reachable part, with
    /// `%d` replaced by 1, 2, ... so that gaps are filled first.
    pub fn next_partname(&self, template: &str) -> Result<PackURI> {
        if !template.contains("%d") {
            return Err(OpcError::InvalidValue(format!(
                "partname template '{}' has no %d placeholder",
                template
            )));
        }

        let used: HashSet<String> = self
            .iter_parts()
            .map(|id| self.part(id).partname().as_str().to_lowercase())
            .collect();

        let mut n = 1usize;
        loop {
            let candidate = template.replacen("%d", &n.to_string(), 1);
            if !used.contains(&candidate.to_lowercase()) {
                return PackURI::new(candidate);
            }
            n += 1;
        }
    }

    /// Whether `id` is reachable from the package root.
    pub fn is_reachable(&self, id: PartId) -> bool {
        self.iter_parts().any(|reached| reached == id)
    }

    pub(crate) fn image_index(&self) -> &HashMap<String, PartId> {
        &self.image_index
    }

    fn unknown_id(id: PartId) -> OpcError {
        OpcError::PartNotFound(format!("part #{}", id.index()))
    }
}

impl PartLifecycle for OpcPackage {
    /// Index the digests of the loaded image parts.
    fn after_unmarshal(&mut self) -> Result<()> {
        self.image_index.clear();
        for (index, part) in self.parts.iter().enumerate() {
            if let PartKind::Image(info) = part.kind() {
                self.image_index
                    .entry(info.sha1().to_string())
                    .or_insert(PartId::new(index));
            }
        }
        Ok(())
    }
}

impl Default for OpcPackage {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a serialized relationship onto the constructed parts.
fn resolve_target(srel: &SerializedRelationship, by_name: &HashMap<String, PartId>) -> Result<RelTarget> {
    if srel.is_external() {
        return Ok(RelTarget::External(srel.target_ref.clone()));
    }
    let partname = srel.target_partname()?;
    by_name
        .get(&partname.as_str().to_lowercase())
        .map(|&id| RelTarget::Part(id))
        .ok_or_else(|| OpcError::PartNotFound(partname.to_string()))
}

/// Depth-first iterator over reachable parts. See [`OpcPackage::iter_parts`].
pub struct PartIter<'a> {
    parts: &'a [Part],
    stack: Vec<slice::Iter<'a, Relationship>>,
    visited: FixedBitSet,
}

impl Iterator for PartIter<'_> {
    type Item = PartId;

    fn next(&mut self) -> Option<PartId> {
        loop {
            let rel = match self.stack.last_mut()?.next() {
                Some(rel) => rel,
                None => {
                    self.stack.pop();
                    continue;
                },
            };

            let RelTarget::Part(id) = rel.target() else {
                continue;
            };
            let Some(part) = self.parts.get(id.index()) else {
                continue;
            };
            if self.visited.put(id.index()) {
                continue;
            }

            self.stack.push(part.rels().iter());
            return Some(*id);
        }
    }
}

/// Depth-first iterator over reachable relationships. See
/// [`OpcPackage::iter_rels`].
pub struct RelIter<'a> {
    parts: &'a [Part],
    stack: Vec<(RelSource, slice::Iter<'a, Relationship>)>,
    visited: FixedBitSet,
}

impl<'a> Iterator for RelIter<'a> {
    type Item = (RelSource, &'a Relationship);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (source, rels) = self.stack.last_mut()?;
            let source = *source;
            let Some(rel) = rels.next() else {
                self.stack.pop();
                continue;
            };

            if let RelTarget::Part(id) = rel.target() {
                if let Some(part) = self.parts.get(id.index()) {
                    if !self.visited.put(id.index()) {
                        self.stack.push((RelSource::Part(*id), part.rels().iter()));
                    }
                }
            }
            return Some((source, rel));
        }
    }
}
