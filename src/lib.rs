//! ooxml-opc - An Open Packaging Conventions engine for Office Open XML
//!
//! This library loads a `.docx`-style package (a ZIP archive or an unpacked
//! directory) into a graph of parts connected by relationships, lets callers
//! edit that graph, and writes it back out as a valid package.
//!
//! # Features
//!
//! - **Package graph**: parts and relationships addressed by stable ids,
//!   walked lazily in depth-first order
//! - **Content types**: `[Content_Types].xml` read and regenerated with the
//!   usual default/override split
//! - **Lazy XML**: part payloads are parsed only when accessed and written
//!   back byte-for-byte unless edited
//! - **Document helpers**: core properties, styles, settings, numbering,
//!   theme, headers, footers and de-duplicated images
//!
//! # Example - Editing a DOCX file
//!
//! ```no_run
//! use ooxml_opc::OpcPackage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pkg = OpcPackage::open("document.docx")?;
//!
//! for id in pkg.iter_parts() {
//!     let part = pkg.part(id);
//!     println!("{} ({})", part.partname(), part.content_type());
//! }
//!
//! pkg.core_properties_mut()?.set_title("Quarterly report")?;
//! let (r_id, _header) = pkg.add_header_part()?;
//! println!("new header related as {}", r_id);
//!
//! pkg.save("edited.docx")?;
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod opc;
pub mod parts;

pub use opc::{
    OpcError, OpcPackage, PackURI, Part, PartFactory, PartId, PartKind, RelSource, RelTarget, Relationship,
    Relationships, Result, SaveOptions,
};
pub use parts::{CoreProperties, CorePropertiesMut, ImageInfo};
