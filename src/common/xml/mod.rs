//! XML helpers shared by the package serializers.

mod escape;

pub use escape::{escape_text, escape_xml, unescape_xml};
