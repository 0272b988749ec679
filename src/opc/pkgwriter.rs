//! Writes an in-memory OPC package to a ZIP archive.
//!
//! The live graph is walked fresh on every save, so parts that are no
//! longer reachable from the package root are simply not written.

use crate::opc::content_types::ContentTypeMap;
use crate::opc::error::Result;
use crate::opc::package::OpcPackage;
use crate::opc::packuri::{CONTENT_TYPES_URI, PackURI};
use crate::opc::part::{PartId, PartLifecycle};
use crate::opc::phys_pkg::{Compression, PhysPkgWriter};
use std::io::{Seek, Write};
use std::path::Path;

/// Options controlling how a package is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub compression: Compression,
}

impl SaveOptions {
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

/// Writes a package to a file, a stream or a byte vector.
pub struct PackageWriter;

impl PackageWriter {
    /// Build the archive in memory, then write it to `path`.
    pub fn write<P: AsRef<Path>>(path: P, package: &mut OpcPackage, options: &SaveOptions) -> Result<()> {
        let mut phys_writer = PhysPkgWriter::in_memory(options.compression);
        Self::write_package(&mut phys_writer, package)?;
        phys_writer.save(path)
    }

    /// Serialize the package and write the archive bytes to `writer`.
    pub fn write_to_stream<W: Write>(mut writer: W, package: &mut OpcPackage, options: &SaveOptions) -> Result<()> {
        let bytes = Self::to_bytes(package, options)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Serialize the package to archive bytes.
    pub fn to_bytes(package: &mut OpcPackage, options: &SaveOptions) -> Result<Vec<u8>> {
        let mut phys_writer = PhysPkgWriter::in_memory(options.compression);
        Self::write_package(&mut phys_writer, package)?;
        phys_writer.finish_to_bytes()
    }

    fn write_package<W: Write + Seek>(phys_writer: &mut PhysPkgWriter<W>, package: &mut OpcPackage) -> Result<()> {
        let part_ids: Vec<PartId> = package.iter_parts().collect();

        for &id in &part_ids {
            package.part_mut(id).before_marshal()?;
        }

        Self::write_content_types(phys_writer, package, &part_ids)?;
        Self::write_pkg_rels(phys_writer, package)?;
        Self::write_parts(phys_writer, package, &part_ids)?;

        log::debug!("wrote package with {} parts", part_ids.len());
        Ok(())
    }

    fn write_content_types<W: Write + Seek>(
        phys_writer: &mut PhysPkgWriter<W>,
        package: &OpcPackage,
        part_ids: &[PartId],
    ) -> Result<()> {
        let content_types = ContentTypeMap::from_parts(part_ids.iter().map(|&id| {
            let part = package.part(id);
            (part.partname(), part.content_type())
        }));
        let uri = PackURI::new(CONTENT_TYPES_URI)?;
        phys_writer.write(&uri, content_types.to_xml().as_bytes())
    }

    /// The package-level `.rels` is always written, even when empty.
    fn write_pkg_rels<W: Write + Seek>(phys_writer: &mut PhysPkgWriter<W>, package: &OpcPackage) -> Result<()> {
        let xml = package.rels().to_xml(package.parts())?;
        phys_writer.write(&PackURI::package().rels_uri(), xml.as_bytes())
    }

    /// Each part's payload, plus its `.rels` only when it has relationships.
    fn write_parts<W: Write + Seek>(
        phys_writer: &mut PhysPkgWriter<W>,
        package: &OpcPackage,
        part_ids: &[PartId],
    ) -> Result<()> {
        for &id in part_ids {
            let part = package.part(id);
            phys_writer.write(part.partname(), &part.blob())?;

            if !part.rels().is_empty() {
                let xml = part.rels().to_xml(package.parts())?;
                phys_writer.write(&part.partname().rels_uri(), xml.as_bytes())?;
            }
        }
        Ok(())
    }
}
