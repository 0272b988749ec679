//! The PackURI value type: a validated, absolute partname within a package.
use crate::opc::error::{OpcError, Result};

/// The package pseudo-partname, representing the package itself
pub const PACKAGE_URI: &str = "/";

/// The URI for the [Content_Types].xml part
pub const CONTENT_TYPES_URI: &str = "/[Content_Types].xml";

/// A partname within an OPC package, e.g. `/word/document.xml`.
///
/// PackURIs always begin with a forward slash and use forward slashes as path
/// separators. All derived components (base URI, filename, extension, index)
/// are pure functions of the string, so the value is immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackURI {
    uri: String,
}

impl PackURI {
    /// Create a new PackURI, failing when `uri` does not begin with `/`.
    pub fn new<S: Into<String>>(uri: S) -> Result<Self> {
        let uri = uri.into();
        if !uri.starts_with('/') {
            return Err(OpcError::InvalidPackUri(format!(
                "PackURI must begin with slash, got '{}'",
                uri
            )));
        }
        Ok(PackURI { uri })
    }

    /// The package pseudo-partname `/`.
    pub fn package() -> Self {
        PackURI {
            uri: PACKAGE_URI.to_string(),
        }
    }

    /// Resolve a relative reference (like `../styles.xml`) against a base URI
    /// (like `/word/theme`) to produce an absolute PackURI (`/word/styles.xml`).
    ///
    /// A reference that is already absolute is normalized and returned as-is.
    pub fn from_rel_ref(base_uri: &str, relative_ref: &str) -> Result<Self> {
        let joined = if relative_ref.starts_with('/') {
            relative_ref.to_string()
        } else if base_uri.ends_with('/') {
            format!("{}{}", base_uri, relative_ref)
        } else {
            format!("{}/{}", base_uri, relative_ref)
        };
        Self::new(normalize_path(&joined))
    }

    /// Directory portion of this PackURI, e.g. `/ppt/slides` for
    /// `/ppt/slides/slide1.xml`. The pseudo-partname `/` yields `/`.
    pub fn base_uri(&self) -> &str {
        match self.uri.rfind('/') {
            Some(0) | None => "/",
            Some(pos) => &self.uri[..pos],
        }
    }

    /// Filename portion, e.g. `slide1.xml`. Empty for the pseudo-partname.
    pub fn filename(&self) -> &str {
        match self.uri.rfind('/') {
            Some(pos) => &self.uri[pos + 1..],
            None => "",
        }
    }

    /// Extension without the leading period, e.g. `xml`.
    pub fn ext(&self) -> &str {
        let filename = self.filename();
        match filename.rfind('.') {
            Some(pos) => &filename[pos + 1..],
            None => "",
        }
    }

    /// Partname index for tuple partnames, `21` for `/ppt/slides/slide21.xml`,
    /// `None` for singleton partnames such as `/ppt/presentation.xml`.
    pub fn idx(&self) -> Option<u32> {
        let filename = self.filename();
        let stem = match filename.rfind('.') {
            Some(pos) => &filename[..pos],
            None => filename,
        };
        let digits_at = stem
            .bytes()
            .rposition(|b| !b.is_ascii_digit())
            .map_or(0, |pos| pos + 1);
        let (prefix, digits) = stem.split_at(digits_at);
        if prefix.is_empty() || digits.is_empty() || digits.starts_with('0') {
            return None;
        }
        atoi_simd::parse::<u32, false, false>(digits.as_bytes()).ok()
    }

    /// The zip member name: the URI with its leading slash stripped.
    /// Empty for the pseudo-partname.
    pub fn membername(&self) -> &str {
        &self.uri[1..]
    }

    /// Relative reference from `base_uri` to this PackURI, suitable for a
    /// `Target` attribute. `/ppt/slideLayouts/slideLayout1.xml` seen from
    /// `/ppt/slides` is `../slideLayouts/slideLayout1.xml`.
    pub fn relative_ref(&self, base_uri: &str) -> String {
        if base_uri == PACKAGE_URI {
            return self.membername().to_string();
        }

        let from_parts: Vec<&str> = base_uri.split('/').filter(|s| !s.is_empty()).collect();
        let to_parts: Vec<&str> = self.uri.split('/').filter(|s| !s.is_empty()).collect();

        let common = from_parts
            .iter()
            .zip(to_parts.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut segments: Vec<&str> = Vec::with_capacity(from_parts.len() + to_parts.len());
        segments.extend(std::iter::repeat_n("..", from_parts.len() - common));
        segments.extend_from_slice(&to_parts[common..]);
        segments.join("/")
    }

    /// PackURI of the `.rels` part for this source, e.g.
    /// `/word/_rels/document.xml.rels`; `/_rels/.rels` for the package.
    pub fn rels_uri(&self) -> PackURI {
        let base_uri = self.base_uri();
        let uri = if base_uri == PACKAGE_URI {
            format!("/_rels/{}.rels", self.filename())
        } else {
            format!("{}/_rels/{}.rels", base_uri, self.filename())
        };
        PackURI { uri }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

/// Resolve `.` and `..` segments and collapse repeated slashes.
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {},
            ".." => {
                parts.pop();
            },
            _ => parts.push(part),
        }
    }

    let mut normalized = String::with_capacity(path.len());
    for part in parts {
        normalized.push('/');
        normalized.push_str(part);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

impl std::fmt::Display for PackURI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

impl AsRef<str> for PackURI {
    fn as_ref(&self) -> &str {
        &self.uri
    }
}

impl TryFrom<&str> for PackURI {
    type Error = OpcError;

    fn try_from(value: &str) -> Result<Self> {
        PackURI::new(value)
    }
}
