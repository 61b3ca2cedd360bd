mod batch;
mod bundle;
mod config;
mod merge;
mod template;

pub use batch::{run_batch, validate_input, BatchResult, FileError, TargetInput};
pub use bundle::bundle_outputs;
pub use config::{InputLimits, MergeConfig, MergeOverrides};
pub use merge::{merge_one, sha256_hex, MergeResult};
pub use template::{inspect_template, SlotPreview, TemplateSummary};
