mod common;

use common::*;
use ooxml_opc::opc::constants::content_type as ct;
use ooxml_opc::opc::{Compression, PhysPkgReader};
use ooxml_opc::{OpcError, OpcPackage, PackURI, PartKind, RelSource, RelTarget, SaveOptions};
use std::collections::BTreeSet;
use std::fs;

/// `(source partname, reltype, target partname or external URI)` for every
/// reachable relationship.
fn graph(pkg: &OpcPackage) -> BTreeSet<(String, String, String)> {
    pkg.iter_rels()
        .map(|(source, rel)| {
            let source = match source {
                RelSource::Package => "/".to_string(),
                RelSource::Part(id) => pkg.part(id).partname().to_string(),
            };
            let target = match rel.target() {
                RelTarget::Part(id) => pkg.part(*id).partname().to_string(),
                RelTarget::External(uri) => uri.clone(),
            };
            (source, rel.reltype().to_string(), target)
        })
        .collect()
}

fn part_named(pkg: &OpcPackage, partname: &str) -> Option<ooxml_opc::PartId> {
    pkg.part_by_name(&PackURI::new(partname).unwrap())
}

#[test]
fn opens_minimal_document_package() {
    init_logging();
    let data = zip_package(&[
        ("[Content_Types].xml", content_types(&[("/word/document.xml", CT_DOCUMENT)]).as_bytes()),
        ("_rels/.rels", rels(&[("rId1", RT_OFFICE_DOCUMENT, "word/document.xml", false)]).as_bytes()),
        ("word/document.xml", DOCUMENT_XML.as_bytes()),
    ]);

    let pkg = OpcPackage::from_bytes(data).unwrap();
    let parts: Vec<_> = pkg.iter_parts().collect();
    assert_eq!(parts.len(), 1);

    let main = pkg.main_document_part().unwrap();
    assert_eq!(parts[0], main);
    assert_eq!(pkg.part(main).content_type(), CT_DOCUMENT);
    assert_eq!(pkg.part(main).kind(), &PartKind::Document);
    // no word/_rels/document.xml.rels member
    assert!(pkg.part(main).rels().is_empty());
}

#[test]
fn walks_parts_and_relationships_depth_first() {
    let pkg = OpcPackage::from_bytes(sample_docx()).unwrap();

    let names: Vec<String> = pkg
        .iter_parts()
        .map(|id| pkg.part(id).partname().to_string())
        .collect();
    assert_eq!(names, ["/word/document.xml", "/word/styles.xml", "/word/media/image1.png"]);
    assert_eq!(pkg.iter_rels().count(), 4);

    let document = pkg.main_document_part().unwrap();
    assert_eq!(pkg.target_ref(document.into(), "rId3").unwrap(), "https://example.com/");
    assert_eq!(pkg.target_ref(document.into(), "rId2").unwrap(), "media/image1.png");

    let image = part_named(&pkg, "/word/media/image1.png").unwrap();
    assert!(matches!(pkg.part(image).kind(), PartKind::Image(info) if info.sha1().len() == 40));
}

#[test]
fn round_trip_preserves_graph_and_payloads() {
    let original = sample_members();
    let mut pkg = OpcPackage::from_bytes(sample_docx()).unwrap();
    let before = graph(&pkg);

    let saved = pkg.to_bytes().unwrap();
    let reopened = OpcPackage::from_bytes(saved.clone()).unwrap();
    assert_eq!(graph(&reopened), before);

    for id in reopened.iter_parts() {
        let part = reopened.part(id);
        let member = part.partname().membername();
        let (_, bytes) = original.iter().find(|(name, _)| name == member).unwrap();
        assert_eq!(part.blob().as_ref(), bytes.as_slice(), "payload of {}", member);
    }

    let members = PhysPkgReader::from_bytes(saved).unwrap().member_names().unwrap();
    assert!(members.iter().any(|name| name == "_rels/.rels"));
    assert!(members.iter().any(|name| name == "word/_rels/document.xml.rels"));
    // parts without relationships get no .rels member
    assert!(!members.iter().any(|name| name == "word/_rels/styles.xml.rels"));
}

#[test]
fn edited_part_is_reserialized_others_untouched() {
    let mut pkg = OpcPackage::from_bytes(sample_docx()).unwrap();
    let document = pkg.main_document_part().unwrap();
    pkg.part_mut(document)
        .element_mut()
        .unwrap()
        .set_attribute("w:conformance", "transitional");

    let reopened = OpcPackage::from_bytes(pkg.to_bytes().unwrap()).unwrap();
    let document = reopened.main_document_part().unwrap();
    let blob = reopened.part(document).blob().into_owned();
    assert!(blob.starts_with(b"<?xml version='1.0' encoding='UTF-8' standalone='yes'?>\n<w:document"));
    assert_eq!(
        reopened.part(document).element().unwrap().attribute("w:conformance"),
        Some("transitional")
    );

    let styles = part_named(&reopened, "/word/styles.xml").unwrap();
    assert_eq!(reopened.part(styles).blob().as_ref(), STYLES_XML.as_bytes());
}

#[test]
fn two_main_documents_are_ambiguous() {
    let data = zip_package(&[
        (
            "[Content_Types].xml",
            content_types(&[("/word/document.xml", CT_DOCUMENT), ("/word/document2.xml", CT_DOCUMENT)]).as_bytes(),
        ),
        (
            "_rels/.rels",
            rels(&[
                ("rId1", RT_OFFICE_DOCUMENT, "word/document.xml", false),
                ("rId2", RT_OFFICE_DOCUMENT, "word/document2.xml", false),
            ])
            .as_bytes(),
        ),
        ("word/document.xml", DOCUMENT_XML.as_bytes()),
        ("word/document2.xml", DOCUMENT_XML.as_bytes()),
    ]);

    let pkg = OpcPackage::from_bytes(data).unwrap();
    assert_eq!(pkg.iter_parts().count(), 2);
    assert!(matches!(pkg.main_document_part(), Err(OpcError::AmbiguousRelationship(_))));
}

#[test]
fn cyclic_relationships_load_and_save() {
    let data = zip_package(&[
        (
            "[Content_Types].xml",
            content_types(&[("/word/document.xml", CT_DOCUMENT), ("/word/styles.xml", CT_STYLES)]).as_bytes(),
        ),
        ("_rels/.rels", rels(&[("rId1", RT_OFFICE_DOCUMENT, "word/document.xml", false)]).as_bytes()),
        ("word/document.xml", DOCUMENT_XML.as_bytes()),
        ("word/_rels/document.xml.rels", rels(&[("rId1", RT_STYLES, "styles.xml", false)]).as_bytes()),
        ("word/styles.xml", STYLES_XML.as_bytes()),
        (
            "word/_rels/styles.xml.rels",
            rels(&[("rId1", RT_OFFICE_DOCUMENT, "/word/document.xml", false)]).as_bytes(),
        ),
    ]);

    let mut pkg = OpcPackage::from_bytes(data).unwrap();
    assert_eq!(pkg.iter_parts().count(), 2);
    assert_eq!(pkg.iter_rels().count(), 3);

    let styles = part_named(&pkg, "/word/styles.xml").unwrap();
    assert_eq!(pkg.target_ref(styles.into(), "rId1").unwrap(), "document.xml");

    let reopened = OpcPackage::from_bytes(pkg.to_bytes().unwrap()).unwrap();
    assert_eq!(graph(&reopened), graph(&pkg));
}

#[test]
fn missing_content_types_is_fatal() {
    let data = zip_package(&[
        ("_rels/.rels", rels(&[("rId1", RT_OFFICE_DOCUMENT, "word/document.xml", false)]).as_bytes()),
        ("word/document.xml", DOCUMENT_XML.as_bytes()),
    ]);
    assert!(matches!(OpcPackage::from_bytes(data), Err(OpcError::PackageNotFound(_))));
}

#[test]
fn relationship_to_missing_member_is_an_error() {
    let data = zip_package(&[
        ("[Content_Types].xml", content_types(&[("/word/document.xml", CT_DOCUMENT)]).as_bytes()),
        ("_rels/.rels", rels(&[("rId1", RT_OFFICE_DOCUMENT, "word/document.xml", false)]).as_bytes()),
        ("word/document.xml", DOCUMENT_XML.as_bytes()),
        (
            "word/_rels/document.xml.rels",
            rels(&[("rId1", RT_STYLES, "styles.xml", false), ("rId3", RT_HYPERLINK, "https://example.com/", true)])
                .as_bytes(),
        ),
    ]);

    match OpcPackage::from_bytes(data) {
        Err(OpcError::PartNotFound(name)) => assert_eq!(name, "/word/styles.xml"),
        other => panic!("unexpected result: {:?}", other.map(|pkg| pkg.iter_parts().count())),
    }
}

#[test]
fn duplicate_relationship_id_is_an_error() {
    let data = zip_package(&[
        ("[Content_Types].xml", content_types(&[("/word/document.xml", CT_DOCUMENT)]).as_bytes()),
        ("_rels/.rels", rels(&[("rId1", RT_OFFICE_DOCUMENT, "word/document.xml", false)]).as_bytes()),
        ("word/document.xml", DOCUMENT_XML.as_bytes()),
        (
            "word/_rels/document.xml.rels",
            rels(&[("rId3", RT_HYPERLINK, "https://a.example/", true), ("rId3", RT_HYPERLINK, "https://b.example/", true)])
                .as_bytes(),
        ),
    ]);
    assert!(matches!(OpcPackage::from_bytes(data), Err(OpcError::InvalidRelationship(_))));
}

#[test]
fn utf16_custom_xml_round_trips() {
    const RT_CUSTOM_XML: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/customXml";
    let mut item = vec![0xff, 0xfe];
    item.extend(
        r#"<?xml version="1.0" encoding="UTF-16" standalone="no"?><b:Sources xmlns:b="urn:bib" SelectedStyle="APA"/>"#
            .encode_utf16()
            .flat_map(u16::to_le_bytes),
    );

    let data = zip_package(&[
        ("[Content_Types].xml", content_types(&[("/word/document.xml", CT_DOCUMENT)]).as_bytes()),
        ("_rels/.rels", rels(&[("rId1", RT_OFFICE_DOCUMENT, "word/document.xml", false)]).as_bytes()),
        ("word/document.xml", DOCUMENT_XML.as_bytes()),
        (
            "word/_rels/document.xml.rels",
            rels(&[
                ("rId1", RT_CUSTOM_XML, "../customXml/item1.xml", false),
                ("rId3", RT_HYPERLINK, "https://example.com/", true),
            ])
            .as_bytes(),
        ),
        ("customXml/item1.xml", item.as_slice()),
    ]);

    let mut pkg = OpcPackage::from_bytes(data).unwrap();
    let id = part_named(&pkg, "/customXml/item1.xml").unwrap();
    assert_eq!(pkg.part(id).kind(), &PartKind::Generic);
    assert_eq!(pkg.part(id).content_type(), ct::XML);
    let root = pkg.part(id).element().unwrap();
    assert_eq!(root.local_name(), "Sources");
    assert_eq!(root.attribute("SelectedStyle"), Some("APA"));

    let reopened = OpcPackage::from_bytes(pkg.to_bytes().unwrap()).unwrap();
    assert_eq!(graph(&reopened), graph(&pkg));
    let id = part_named(&reopened, "/customXml/item1.xml").unwrap();
    assert_eq!(reopened.part(id).blob().as_ref(), item.as_slice());
}

#[test]
fn override_wins_over_default_case_insensitively() {
    let data = zip_package(&[
        (
            "[Content_Types].xml",
            content_types(&[("/word/document.xml", CT_DOCUMENT), ("/WORD/Media/IMAGE1.PNG", "image/x-custom")])
                .as_bytes(),
        ),
        ("_rels/.rels", rels(&[("rId1", RT_OFFICE_DOCUMENT, "word/document.xml", false)]).as_bytes()),
        ("word/document.xml", DOCUMENT_XML.as_bytes()),
        ("word/_rels/document.xml.rels", rels(&[("rId2", RT_IMAGE, "media/image1.png", false)]).as_bytes()),
        ("word/media/image1.png", PNG_BYTES),
    ]);

    let pkg = OpcPackage::from_bytes(data).unwrap();
    let image = part_named(&pkg, "/word/media/image1.png").unwrap();
    assert_eq!(pkg.part(image).content_type(), "image/x-custom");
}

#[test]
fn opens_unpacked_directory() {
    let dir = tempfile::tempdir().unwrap();
    for (name, data) in sample_members() {
        let path = dir.path().join(&name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    let pkg = OpcPackage::open(dir.path()).unwrap();
    assert_eq!(pkg.iter_parts().count(), 3);
    assert_eq!(graph(&pkg), graph(&OpcPackage::from_bytes(sample_docx()).unwrap()));
}

#[test]
fn unpacked_directory_matches_member_names_case_insensitively() {
    let dir = tempfile::tempdir().unwrap();
    for (name, data) in sample_members() {
        let name = name.replace("word/document.xml", "Word/Document.xml").replace("word/", "Word/");
        let path = dir.path().join(&name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    let pkg = OpcPackage::open(dir.path()).unwrap();
    assert_eq!(pkg.iter_parts().count(), 3);
    assert_eq!(graph(&pkg), graph(&OpcPackage::from_bytes(sample_docx()).unwrap()));
}

#[test]
fn open_missing_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = OpcPackage::open(dir.path().join("absent.docx"));
    assert!(matches!(result, Err(OpcError::PackageNotFound(_))));
}

#[test]
fn saves_to_file_without_compression() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stored.docx");

    let mut pkg = OpcPackage::from_bytes(sample_docx()).unwrap();
    let options = SaveOptions::default().with_compression(Compression::Stored);
    pkg.save_with_options(&path, &options).unwrap();

    let reopened = OpcPackage::open(&path).unwrap();
    assert_eq!(graph(&reopened), graph(&pkg));
}

#[test]
fn save_to_writer_and_to_bytes_agree() {
    let mut pkg = OpcPackage::from_bytes(sample_docx()).unwrap();
    let mut out = Vec::new();
    pkg.save_to_writer(&mut out).unwrap();

    let from_writer = OpcPackage::from_bytes(out).unwrap();
    let from_bytes = OpcPackage::from_bytes(pkg.to_bytes().unwrap()).unwrap();
    assert_eq!(graph(&from_writer), graph(&from_bytes));
}

#[test]
fn unreachable_parts_are_not_saved() {
    let mut pkg = OpcPackage::from_bytes(sample_docx()).unwrap();
    let document = pkg.main_document_part().unwrap();
    assert!(pkg.drop_rel(document.into(), "rId1").unwrap());

    let saved = pkg.to_bytes().unwrap();
    let members = PhysPkgReader::from_bytes(saved.clone()).unwrap().member_names().unwrap();
    assert!(!members.iter().any(|name| name == "word/styles.xml"));

    let reopened = OpcPackage::from_bytes(saved).unwrap();
    assert_eq!(reopened.iter_parts().count(), 2);
}

#[test]
fn content_types_are_regenerated_from_live_parts() {
    let mut pkg = OpcPackage::from_bytes(sample_docx()).unwrap();
    let saved = pkg.to_bytes().unwrap();

    let reader = PhysPkgReader::from_bytes(saved).unwrap();
    let xml = reader.text_for(&PackURI::new("/[Content_Types].xml").unwrap()).unwrap();
    assert!(xml.starts_with("<?xml version='1.0' encoding='UTF-8' standalone='yes'?>\n<Types"));
    assert!(xml.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));
    assert!(xml.contains(&format!(r#"<Override PartName="/word/styles.xml" ContentType="{}"/>"#, CT_STYLES)));
    assert!(!xml.contains("/word/media/image1.png"));
}

#[test]
fn template_main_part_is_saved_as_document() {
    let data = zip_package(&[
        ("[Content_Types].xml", content_types(&[("/word/document.xml", ct::WML_TEMPLATE_MAIN)]).as_bytes()),
        ("_rels/.rels", rels(&[("rId1", RT_OFFICE_DOCUMENT, "word/document.xml", false)]).as_bytes()),
        ("word/document.xml", DOCUMENT_XML.as_bytes()),
    ]);

    let mut pkg = OpcPackage::from_bytes(data).unwrap();
    let main = pkg.main_document_part().unwrap();
    assert_eq!(pkg.part(main).kind(), &PartKind::Document);

    let reopened = OpcPackage::from_bytes(pkg.to_bytes().unwrap()).unwrap();
    let main = reopened.main_document_part().unwrap();
    assert_eq!(reopened.part(main).content_type(), CT_DOCUMENT);
}
