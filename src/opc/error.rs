//! Error types for OPC package operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpcError {
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Invalid pack URI: {0}")]
    InvalidPackUri(String),

    #[error("Part not found: {0}")]
    PartNotFound(String),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    #[error("More than one relationship of type '{0}'")]
    AmbiguousRelationship(String),

    #[error("Content type not found for partname: {0}")]
    ContentTypeNotFound(String),

    #[error("Invalid relationship: {0}")]
    InvalidRelationship(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Value for '{name}' exceeds 255 characters (got {len})")]
    ValueTooLong { name: &'static str, len: usize },

    #[error("XML parsing error: {0}")]
    XmlError(String),

    #[error("ZIP error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    #[error("Attribute error: {0}")]
    AttrError(String),
}

impl OpcError {
    /// True for the "something required is absent" family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OpcError::PackageNotFound(_)
                | OpcError::PartNotFound(_)
                | OpcError::RelationshipNotFound(_)
                | OpcError::ContentTypeNotFound(_)
        )
    }
}

impl From<quick_xml::Error> for OpcError {
    fn from(err: quick_xml::Error) -> Self {
        OpcError::XmlError(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for OpcError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        OpcError::AttrError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(OpcError::RelationshipNotFound("rId9".to_string()).is_not_found());
        assert!(OpcError::ContentTypeNotFound("/a.bin".to_string()).is_not_found());
        assert!(!OpcError::AmbiguousRelationship("urn:t".to_string()).is_not_found());
        assert!(!OpcError::ValueTooLong { name: "title", len: 300 }.is_not_found());
    }

    #[test]
    fn test_display() {
        let err = OpcError::ValueTooLong { name: "title", len: 300 };
        assert_eq!(err.to_string(), "Value for 'title' exceeds 255 characters (got 300)");
    }
}
