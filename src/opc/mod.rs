//! Open Packaging Conventions (OPC) implementation.
//!
//! This module reads, edits and writes the container format underneath
//! Office Open XML documents:
//!
//! - Package structure (parts, relationships)
//! - Content type management
//! - ZIP and unpacked-directory physical packages
//! - Lazily parsed XML part payloads
//!
//! # Performance Features
//!
//! - Uses `memchr` for fast relationship reference counting in part XML
//! - Uses `atoi_simd` for fast rId parsing
//! - Uses `quick-xml` for streaming XML parsing
//! - Walks the part graph with a bitset instead of hashing partnames

pub mod constants;
pub mod content_types;
pub mod error;
pub mod factory;
pub mod oxml;
pub mod package;
pub mod packuri;
pub mod part;
pub mod phys_pkg;
pub mod pkgreader;
pub mod pkgwriter;
pub mod rel;

// Re-export commonly used types
pub use content_types::ContentTypeMap;
pub use error::{OpcError, Result};
pub use factory::PartFactory;
pub use oxml::{XmlElement, XmlNode};
pub use package::{OpcPackage, RelSource};
pub use packuri::PackURI;
pub use part::{Part, PartId, PartKind, PartLifecycle};
pub use phys_pkg::{Compression, PhysPkgReader, PhysPkgWriter};
pub use pkgwriter::SaveOptions;
pub use rel::{RelTarget, Relationship, Relationships};
