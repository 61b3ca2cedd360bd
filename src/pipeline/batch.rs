use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::error::{classify, ErrorKind, MergeError};
use crate::pipeline::config::{InputLimits, MergeConfig};
use crate::pipeline::merge::{merge_one, MergeResult};
use crate::progress::ConsoleProgress;

/// A target document as handed to the batch: its file name and raw bytes.
#[derive(Clone, Debug)]
pub struct TargetInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl TargetInput {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read target: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FileError {
    pub file: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchResult {
    pub outputs: Vec<MergeResult>,
    pub errors: Vec<FileError>,
    pub attempted: usize,
}

impl BatchResult {
    pub fn summary(&self) -> String {
        format!(
            "{}/{} files processed successfully",
            self.outputs.len(),
            self.attempted
        )
    }
}

/// Reject a target before opening it: wrong extension, oversize or empty.
pub fn validate_input(name: &str, len: u64, limits: &InputLimits) -> Result<(), MergeError> {
    if !name.to_lowercase().ends_with(&limits.extension) {
        return Err(MergeError::InvalidInput(format!(
            "Please select a valid {} file",
            limits.extension
        )));
    }
    if len > limits.max_bytes {
        return Err(MergeError::InvalidInput(format!(
            "File size exceeds {}MB limit",
            limits.max_mb()
        )));
    }
    if len == 0 {
        return Err(MergeError::InvalidInput(
            "File appears to be corrupted or not a valid Word document".to_string(),
        ));
    }
    Ok(())
}

/// Merge the template into every target in order. A failing file is recorded and the
/// batch moves on.
pub fn run_batch(
    template_bytes: &[u8],
    targets: &[TargetInput],
    config: &MergeConfig,
    progress: &ConsoleProgress,
) -> BatchResult {
    let mut result = BatchResult::default();
    let mut seen: HashSet<&str> = HashSet::new();
    let total = targets.len();

    for (i, target) in targets.iter().enumerate() {
        progress.progress("Processing", i + 1, total);
        if !seen.insert(target.name.as_str()) {
            progress.warn(format!("{} already queued; duplicate skipped", target.name));
            continue;
        }
        result.attempted += 1;

        let outcome = validate_input(&target.name, target.bytes.len() as u64, &config.limits)
            .map_err(anyhow::Error::new)
            .and_then(|()| {
                merge_one(template_bytes, &target.name, &target.bytes, config, progress)
            });
        match outcome {
            Ok(merged) => {
                progress.success(format!("Successfully processed: {}", target.name));
                result.outputs.push(merged);
            }
            Err(e) => {
                let message = format!("{e:#}");
                progress.error(format!("Failed to process {}: {message}", target.name));
                result.errors.push(FileError {
                    file: target.name.clone(),
                    kind: classify(&e),
                    message,
                });
            }
        }
    }

    progress.success(format!("Processing complete. {}", result.summary()));
    result
}
