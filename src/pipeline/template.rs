use anyhow::Context;
use serde::Serialize;

use crate::docx::headers::{slots, SlotKind, TITLE_PLACEHOLDER};
use crate::docx::package::DocxPackage;
use crate::docx::title::run_text;
use crate::error::MergeError;
use crate::progress::ConsoleProgress;

const NO_TEXT: &str = "No visible text content";
const NO_PREVIEW: &str = "Preview not available";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlotPreview {
    pub kind: SlotKind,
    pub path: String,
    pub text: String,
    pub has_placeholder: bool,
}

/// What a template would install: its header/footer slots with a text preview.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TemplateSummary {
    pub slots: Vec<SlotPreview>,
}

impl TemplateSummary {
    pub fn count(&self, kind: SlotKind) -> usize {
        self.slots.iter().filter(|s| s.kind == kind).count()
    }

    pub fn has_placeholder(&self) -> bool {
        self.slots.iter().any(|s| s.has_placeholder)
    }
}

fn preview(pkg: &DocxPackage, path: &str) -> String {
    match pkg.read_xml(path) {
        Ok(Some(doc)) => {
            let text = run_text(&doc.root, " ");
            let text = text.trim();
            if text.is_empty() {
                NO_TEXT.to_string()
            } else {
                text.to_string()
            }
        }
        _ => NO_PREVIEW.to_string(),
    }
}

/// Open and validate a template, listing the header/footer parts it carries.
///
/// Fails with `NoHeadersFooters` when none of the six slots is present.
pub fn inspect_template(bytes: &[u8], progress: &ConsoleProgress) -> anyhow::Result<TemplateSummary> {
    let pkg = DocxPackage::from_bytes(bytes).context("open template")?;
    pkg.validate().context("template")?;

    let mut summary = TemplateSummary::default();
    for (kind, path) in slots() {
        if !pkg.has_part(path) {
            continue;
        }
        let has_placeholder = matches!(
            pkg.part_text(path),
            Some(Ok(text)) if text.contains(TITLE_PLACEHOLDER)
        );
        let text = preview(&pkg, path);
        progress.debug(format!("template {path}: {text}"));
        summary.slots.push(SlotPreview {
            kind,
            path: path.to_string(),
            text,
            has_placeholder,
        });
    }
    if summary.slots.is_empty() {
        return Err(MergeError::NoHeadersFooters.into());
    }

    progress.success(format!(
        "Template loaded with {} headers and {} footers",
        summary.count(SlotKind::Header),
        summary.count(SlotKind::Footer)
    ));
    if !summary.has_placeholder() {
        progress.warn(format!(
            "Template has no {TITLE_PLACEHOLDER} placeholder; titles will not be inserted"
        ));
    }
    Ok(summary)
}
