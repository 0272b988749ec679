//! Fixture packages built in memory for the integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const RT_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const RT_STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub const RT_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const RT_HYPERLINK: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

pub const CT_DOCUMENT: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
pub const CT_STYLES: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";

pub const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <w:body><w:p><w:r><w:t>Hello</w:t></w:r></w:p><w:p><w:hyperlink r:id="rId3"/></w:p></w:body>
</w:document>"#;

pub const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:style w:styleId="Normal"/></w:styles>"#;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR fixture";

/// Content types with an `xml` default and an override for the main document.
pub fn content_types(overrides: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Default Extension="png" ContentType="image/png"/>
"#,
    );
    for (partname, content_type) in overrides {
        xml.push_str(&format!(
            "  <Override PartName=\"{}\" ContentType=\"{}\"/>\n",
            partname, content_type
        ));
    }
    xml.push_str("</Types>");
    xml
}

/// A `.rels` stream from `(Id, Type, Target, external)` tuples.
pub fn rels(entries: &[(&str, &str, &str, bool)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (id, reltype, target, external) in entries {
        let mode = if *external { r#" TargetMode="External""# } else { "" };
        xml.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
            id, reltype, target, mode
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

/// ZIP archive with the given members, in order.
pub fn zip_package(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in members {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Members of a small but complete document: main document, styles, an
/// image and an external hyperlink.
pub fn sample_members() -> Vec<(String, Vec<u8>)> {
    vec![
        (
            "[Content_Types].xml".to_string(),
            content_types(&[("/word/document.xml", CT_DOCUMENT), ("/word/styles.xml", CT_STYLES)]).into_bytes(),
        ),
        (
            "_rels/.rels".to_string(),
            rels(&[("rId1", RT_OFFICE_DOCUMENT, "word/document.xml", false)]).into_bytes(),
        ),
        ("word/document.xml".to_string(), DOCUMENT_XML.as_bytes().to_vec()),
        (
            "word/_rels/document.xml.rels".to_string(),
            rels(&[
                ("rId1", RT_STYLES, "styles.xml", false),
                ("rId2", RT_IMAGE, "media/image1.png", false),
                ("rId3", RT_HYPERLINK, "https://example.com/", true),
            ])
            .into_bytes(),
        ),
        ("word/styles.xml".to_string(), STYLES_XML.as_bytes().to_vec()),
        ("word/media/image1.png".to_string(), PNG_BYTES.to_vec()),
    ]
}

pub fn sample_docx() -> Vec<u8> {
    let members = sample_members();
    let borrowed: Vec<(&str, &[u8])> = members
        .iter()
        .map(|(name, data)| (name.as_str(), data.as_slice()))
        .collect();
    zip_package(&borrowed)
}

/// Route engine logs to the test harness when `RUST_LOG` is set.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
