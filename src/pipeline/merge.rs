use anyhow::Context;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::docx::fonts::{normalize_fonts, resolve_target_font};
use crate::docx::headers::replace_headers_footers;
use crate::docx::package::DocxPackage;
use crate::docx::sections::{apply_flow_chart_section, SectionInsertion};
use crate::docx::title::{extract_title, ExtractedTitle};
use crate::pipeline::config::MergeConfig;
use crate::progress::ConsoleProgress;

/// One finished target document.
#[derive(Clone, Debug, Serialize)]
pub struct MergeResult {
    pub output_name: String,
    pub source_name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub size: usize,
    pub sha256: String,
    pub title: Option<ExtractedTitle>,
    pub headers_footers_replaced: usize,
    pub font: Option<String>,
    pub flow_chart: Option<SectionInsertion>,
    /// Sub-steps that degraded instead of failing the file.
    pub warnings: Vec<String>,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Merge the template's formatting into one target document.
///
/// The template is opened from `template_bytes` on every call so that nothing done to
/// one target can be observed while processing the next.
pub fn merge_one(
    template_bytes: &[u8],
    target_name: &str,
    target_bytes: &[u8],
    config: &MergeConfig,
    progress: &ConsoleProgress,
) -> anyhow::Result<MergeResult> {
    progress.info(format!("Processing: {target_name}"));
    let template = DocxPackage::from_bytes(template_bytes).context("open template")?;
    template.validate().context("template")?;
    let mut target = DocxPackage::from_bytes(target_bytes)
        .with_context(|| format!("open {target_name}"))?;
    target.validate().with_context(|| format!("target {target_name}"))?;

    let mut warnings = Vec::new();

    let title = if config.extract_title {
        let t = extract_title(&target, Some(target_name), progress);
        progress.success(format!("Extracted title: \"{}\"", t.text));
        Some(t)
    } else {
        None
    };

    let hf = replace_headers_footers(
        &mut target,
        &template,
        title.as_ref().map(|t| t.text.as_str()),
        progress,
    )
    .context("replace headers/footers")?;
    warnings.extend(hf.warnings);

    let font = resolve_target_font(
        config.font_override.as_deref(),
        config.preserve_target_fonts,
        &template,
        progress,
    );
    match &font {
        Some(font) => {
            let report = normalize_fonts(&mut target, &template, font, progress)
                .context("normalize fonts")?;
            warnings.extend(report.warnings);
        }
        None => progress.info("Preserving target document fonts"),
    }

    let flow_chart = if config.insert_flow_chart {
        progress.info("Attempting to insert \"Process Flow Chart\" section");
        let outcome = apply_flow_chart_section(&mut target, progress)
            .context("insert flow chart section")?;
        if outcome == SectionInsertion::Skipped {
            warnings.push("flow chart section not inserted: no numbered PROCEDURE heading".to_string());
        }
        Some(outcome)
    } else {
        None
    };

    let bytes = target.to_bytes().context("serialize output")?;
    let output_name = config.output_name(target_name);
    progress.success(format!(
        "{target_name} -> {output_name}: {} headers/footers replaced",
        hf.copied_parts.len()
    ));
    Ok(MergeResult {
        output_name,
        source_name: target_name.to_string(),
        size: bytes.len(),
        sha256: sha256_hex(&bytes),
        bytes,
        title,
        headers_footers_replaced: hf.copied_parts.len(),
        font,
        flow_chart,
        warnings,
    })
}
