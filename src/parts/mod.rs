//! Typed parts of a WordprocessingML package.
//!
//! The engine in [`crate::opc`] treats every part alike; the modules here
//! give meaning to the few a document model needs: core properties,
//! images, and the default payloads of parts created on demand. The
//! document-level helpers are methods on [`OpcPackage`](crate::opc::OpcPackage).

pub mod core_properties;
pub mod document;
pub mod image;
pub mod templates;

pub use core_properties::{CoreProperties, CorePropertiesMut, parse_w3cdtf};
pub use image::ImageInfo;
