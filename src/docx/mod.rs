pub mod fonts;
pub mod headers;
pub mod package;
pub mod rels;
pub mod sections;
pub mod styles;
pub mod title;
pub mod tree;
pub mod xml;

#[cfg(test)]
pub(crate) mod testutil;

/// WordprocessingML main namespace (`w:`).
pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
/// Office document relationships namespace (`r:`).
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
/// Package relationships namespace used inside `*.rels` parts.
pub const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
/// Content types manifest namespace.
pub const CT_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
/// Dublin Core elements, used by `docProps/core.xml` for `dc:title`.
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";

pub const MAIN_DOCUMENT: &str = "word/document.xml";
pub const STYLES: &str = "word/styles.xml";
pub const FONT_TABLE: &str = "word/fontTable.xml";
pub const DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";
pub const CONTENT_TYPES: &str = "[Content_Types].xml";
pub const CORE_PROPS: &str = "docProps/core.xml";

pub const HEADER_PARTS: [&str; 3] = ["word/header1.xml", "word/header2.xml", "word/header3.xml"];
pub const FOOTER_PARTS: [&str; 3] = ["word/footer1.xml", "word/footer2.xml", "word/footer3.xml"];

pub const REL_TYPE_HEADER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
pub const REL_TYPE_FONT_TABLE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/fontTable";

pub const CT_HEADER: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml";
pub const CT_FOOTER: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml";
pub const CT_FONT_TABLE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.fontTable+xml";
pub const CT_RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";

/// Prefix conventionally bound to a namespace, used when a document must declare one.
pub fn conventional_prefix(ns: &str) -> Option<&'static str> {
    match ns {
        W_NS => Some("w"),
        R_NS => Some("r"),
        DC_NS => Some("dc"),
        XML_NS => Some("xml"),
        _ => None,
    }
}

/// Relationship part path for a part: `word/header1.xml` -> `word/_rels/header1.xml.rels`.
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}
