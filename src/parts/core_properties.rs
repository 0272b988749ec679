//! Dublin Core document properties stored in `/docProps/core.xml`.
//!
//! [`CoreProperties`] reads the element tree of the core-properties part;
//! [`CorePropertiesMut`] also writes it. Children are matched by local name,
//! so documents using unusual namespace prefixes still read correctly.

use crate::opc::constants::namespace;
use crate::opc::error::{OpcError, Result};
use crate::opc::oxml::{XmlElement, XmlNode};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

/// Partname of a core-properties part created on demand.
pub const CORE_PROPERTIES_PARTNAME: &str = "/docProps/core.xml";

/// Upper bound on the length of string properties, in characters.
pub const MAX_TEXT_LEN: usize = 255;

const W3CDTF_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Read access to core properties.
#[derive(Debug, Clone, Copy)]
pub struct CoreProperties<'a> {
    element: &'a XmlElement,
}

impl<'a> CoreProperties<'a> {
    pub fn new(element: &'a XmlElement) -> Self {
        Self { element }
    }

    pub fn title(&self) -> String {
        self.text("dc:title")
    }

    pub fn subject(&self) -> String {
        self.text("dc:subject")
    }

    /// `dc:creator`
    pub fn author(&self) -> String {
        self.text("dc:creator")
    }

    pub fn keywords(&self) -> String {
        self.text("cp:keywords")
    }

    /// `dc:description`
    pub fn comments(&self) -> String {
        self.text("dc:description")
    }

    pub fn last_modified_by(&self) -> String {
        self.text("cp:lastModifiedBy")
    }

    pub fn category(&self) -> String {
        self.text("cp:category")
    }

    pub fn content_status(&self) -> String {
        self.text("cp:contentStatus")
    }

    pub fn identifier(&self) -> String {
        self.text("dc:identifier")
    }

    pub fn language(&self) -> String {
        self.text("dc:language")
    }

    pub fn version(&self) -> String {
        self.text("cp:version")
    }

    /// Revision number; 0 when absent, negative or not a number.
    pub fn revision(&self) -> u32 {
        self.text("cp:revision").trim().parse().unwrap_or(0)
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.datetime("dcterms:created")
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.datetime("dcterms:modified")
    }

    pub fn last_printed(&self) -> Option<DateTime<Utc>> {
        self.datetime("cp:lastPrinted")
    }

    fn text(&self, qname: &str) -> String {
        child(self.element, qname)
            .map(XmlElement::text)
            .unwrap_or_default()
    }

    /// Unparseable stored dates read as absent.
    fn datetime(&self, qname: &str) -> Option<DateTime<Utc>> {
        let text = self.text(qname);
        if text.is_empty() {
            return None;
        }
        match parse_w3cdtf(&text) {
            Ok(dt) => Some(dt),
            Err(_) => {
                log::debug!("ignoring unparseable {} value '{}'", qname, text);
                None
            },
        }
    }
}

/// Read-write access to core properties.
#[derive(Debug)]
pub struct CorePropertiesMut<'a> {
    element: &'a mut XmlElement,
}

impl<'a> CorePropertiesMut<'a> {
    pub fn new(element: &'a mut XmlElement) -> Self {
        Self { element }
    }

    pub fn view(&self) -> CoreProperties<'_> {
        CoreProperties::new(&*self.element)
    }

    pub fn set_title(&mut self, value: &str) -> Result<()> {
        self.set_text("title", "dc:title", value)
    }

    pub fn set_subject(&mut self, value: &str) -> Result<()> {
        self.set_text("subject", "dc:subject", value)
    }

    pub fn set_author(&mut self, value: &str) -> Result<()> {
        self.set_text("author", "dc:creator", value)
    }

    pub fn set_keywords(&mut self, value: &str) -> Result<()> {
        self.set_text("keywords", "cp:keywords", value)
    }

    pub fn set_comments(&mut self, value: &str) -> Result<()> {
        self.set_text("comments", "dc:description", value)
    }

    pub fn set_last_modified_by(&mut self, value: &str) -> Result<()> {
        self.set_text("last_modified_by", "cp:lastModifiedBy", value)
    }

    pub fn set_category(&mut self, value: &str) -> Result<()> {
        self.set_text("category", "cp:category", value)
    }

    pub fn set_content_status(&mut self, value: &str) -> Result<()> {
        self.set_text("content_status", "cp:contentStatus", value)
    }

    pub fn set_identifier(&mut self, value: &str) -> Result<()> {
        self.set_text("identifier", "dc:identifier", value)
    }

    pub fn set_language(&mut self, value: &str) -> Result<()> {
        self.set_text("language", "dc:language", value)
    }

    pub fn set_version(&mut self, value: &str) -> Result<()> {
        self.set_text("version", "cp:version", value)
    }

    /// Revision must be a positive integer.
    pub fn set_revision(&mut self, revision: u32) -> Result<()> {
        if revision == 0 {
            return Err(OpcError::InvalidValue(
                "revision property requires positive int, got 0".to_string(),
            ));
        }
        ensure_ns(self.element, "cp");
        child_mut(self.element, "cp:revision")?.set_text(&revision.to_string());
        Ok(())
    }

    pub fn set_created(&mut self, value: DateTime<Utc>) -> Result<()> {
        self.set_datetime("dcterms:created", value)
    }

    pub fn set_modified(&mut self, value: DateTime<Utc>) -> Result<()> {
        self.set_datetime("dcterms:modified", value)
    }

    pub fn set_last_printed(&mut self, value: DateTime<Utc>) -> Result<()> {
        self.set_datetime("cp:lastPrinted", value)
    }

    fn set_text(&mut self, name: &'static str, qname: &str, value: &str) -> Result<()> {
        let len = value.chars().count();
        if len > MAX_TEXT_LEN {
            return Err(OpcError::ValueTooLong { name, len });
        }
        ensure_ns(self.element, prefix_of(qname));
        child_mut(self.element, qname)?.set_text(value);
        Ok(())
    }

    fn set_datetime(&mut self, qname: &str, value: DateTime<Utc>) -> Result<()> {
        ensure_ns(self.element, prefix_of(qname));
        let typed = qname.starts_with("dcterms:");
        if typed {
            ensure_ns(self.element, "xsi");
        }

        let el = child_mut(self.element, qname)?;
        el.set_text(&value.format(W3CDTF_FORMAT).to_string());
        // created and modified carry an explicit W3CDTF type
        if typed {
            el.set_attribute("xsi:type", "dcterms:W3CDTF");
        }
        Ok(())
    }
}

/// Empty `cp:coreProperties` root with every namespace the properties use.
pub fn new_core_properties_element() -> XmlElement {
    XmlElement::new("cp:coreProperties")
        .with_attribute("xmlns:cp", namespace::OPC_CORE_PROPERTIES)
        .with_attribute("xmlns:dc", namespace::DC)
        .with_attribute("xmlns:dcterms", namespace::DC_TERMS)
        .with_attribute("xmlns:dcmitype", namespace::DCMI_TYPE)
        .with_attribute("xmlns:xsi", namespace::XSI)
}

/// Properties given to a core-properties part created on demand.
pub fn default_core_properties_element(now: DateTime<Utc>) -> Result<XmlElement> {
    let mut element = new_core_properties_element();
    let mut props = CorePropertiesMut::new(&mut element);
    props.set_title("Word Document")?;
    props.set_last_modified_by("ooxml-opc")?;
    props.set_revision(1)?;
    props.set_modified(now)?;
    Ok(element)
}

/// Parse a W3C date-time (`2024-05-01T10:00:00Z`, `2024-05-01T12:00:00+02:00`,
/// `2024-05-01`, `2024-05`, `2024`) into UTC.
///
/// Fractional seconds are ignored.
pub fn parse_w3cdtf(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    let invalid = || OpcError::InvalidValue(format!("could not parse W3CDTF datetime string '{}'", value));

    let split = if value.len() > 19 && value.is_char_boundary(19) {
        19
    } else {
        value.len()
    };
    let (stamp, rest) = value.split_at(split);

    let naive = parse_timestamp(stamp).ok_or_else(invalid)?;
    let offset = parse_offset(rest).ok_or_else(invalid)?;
    Ok(naive.and_utc() - offset)
}

fn parse_timestamp(stamp: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    let date = match stamp.len() {
        10 => NaiveDate::parse_from_str(stamp, "%Y-%m-%d").ok()?,
        7 => NaiveDate::parse_from_str(&format!("{}-01", stamp), "%Y-%m-%d").ok()?,
        4 if stamp.bytes().all(|b| b.is_ascii_digit()) => {
            NaiveDate::parse_from_str(&format!("{}-01-01", stamp), "%Y-%m-%d").ok()?
        },
        _ => return None,
    };
    date.and_hms_opt(0, 0, 0)
}

/// Offset east of UTC from what follows the timestamp: nothing, `Z`, or
/// `+HH:MM`/`-HH:MM`, optionally preceded by fractional seconds.
fn parse_offset(rest: &str) -> Option<TimeDelta> {
    let rest = match rest.strip_prefix('.') {
        Some(fraction) => fraction.trim_start_matches(|c: char| c.is_ascii_digit()),
        None => rest,
    };

    match rest {
        "" | "Z" => Some(TimeDelta::zero()),
        _ => {
            let (sign, hhmm) = match rest.as_bytes().first()? {
                b'+' => (1, &rest[1..]),
                b'-' => (-1, &rest[1..]),
                _ => return None,
            };
            let (hours, minutes) = hhmm.split_once(':')?;
            if hours.len() != 2 || minutes.len() != 2 {
                return None;
            }
            let hours: i64 = hours.parse().ok()?;
            let minutes: i64 = minutes.parse().ok()?;
            Some(TimeDelta::minutes(sign * (hours * 60 + minutes)))
        },
    }
}

fn prefix_of(qname: &str) -> &str {
    qname.split_once(':').map_or("", |(prefix, _)| prefix)
}

fn local_of(qname: &str) -> &str {
    qname.split_once(':').map_or(qname, |(_, local)| local)
}

fn child<'e>(element: &'e XmlElement, qname: &str) -> Option<&'e XmlElement> {
    let local = local_of(qname);
    element.child_elements().find(|el| el.local_name() == local)
}

/// Existing child with the local name of `qname`, or a new one appended.
fn child_mut<'e>(element: &'e mut XmlElement, qname: &str) -> Result<&'e mut XmlElement> {
    if child(element, qname).is_none() {
        return Ok(element.append_child(XmlElement::new(qname)));
    }
    let local = local_of(qname);
    element
        .children_mut()
        .iter_mut()
        .find_map(|node| match node {
            XmlNode::Element(el) if el.local_name() == local => Some(el),
            _ => None,
        })
        .ok_or_else(|| OpcError::XmlError(format!("core property {} vanished", qname)))
}

/// Declare `prefix` on the root if the document does not already.
fn ensure_ns(root: &mut XmlElement, prefix: &str) {
    let uri = match prefix {
        "cp" => namespace::OPC_CORE_PROPERTIES,
        "dc" => namespace::DC,
        "dcterms" => namespace::DC_TERMS,
        "xsi" => namespace::XSI,
        _ => return,
    };
    let key = format!("xmlns:{}", prefix);
    if root.attribute(&key).is_none() {
        root.set_attribute(&key, uri);
    }
}
