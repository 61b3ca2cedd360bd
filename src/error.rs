use serde::Serialize;

/// Failures the merge pipeline distinguishes between.
///
/// Internal code works with `anyhow::Error`; a variant of this enum is wrapped inside
/// whenever the caller needs to react to the failure class rather than just log it.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("File appears to be corrupted or not a valid Word document: {0}")]
    CorruptArchive(String),

    #[error("missing required part: {0}")]
    MissingRequiredPart(String),

    #[error("missing <w:styles> root in {0}")]
    MissingStylesRoot(String),

    #[error("missing section properties in {0}")]
    MissingSectionProperties(String),

    #[error("malformed xml in {part}: {detail}")]
    MalformedXml { part: String, detail: String },

    #[error("No headers or footers found in template document")]
    NoHeadersFooters,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    CorruptArchive,
    MissingRequiredPart,
    MissingStylesRoot,
    MissingSectionProperties,
    MalformedXml,
    NoHeadersFooters,
    Processing,
}

impl MergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::InvalidInput(_) => ErrorKind::InvalidInput,
            MergeError::CorruptArchive(_) => ErrorKind::CorruptArchive,
            MergeError::MissingRequiredPart(_) => ErrorKind::MissingRequiredPart,
            MergeError::MissingStylesRoot(_) => ErrorKind::MissingStylesRoot,
            MergeError::MissingSectionProperties(_) => ErrorKind::MissingSectionProperties,
            MergeError::MalformedXml { .. } => ErrorKind::MalformedXml,
            MergeError::NoHeadersFooters => ErrorKind::NoHeadersFooters,
        }
    }
}

/// Classify an error chain by the first `MergeError` found in it.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    err.chain()
        .find_map(|e| e.downcast_ref::<MergeError>())
        .map(MergeError::kind)
        .unwrap_or(ErrorKind::Processing)
}
