use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{find_default_config, load_config, AppConfig, CONFIG_ENV, DEFAULT_CONFIG_NAME};

const DEFAULT_MAX_FILE_MB: u64 = 50;
const DEFAULT_EXTENSION: &str = ".docx";
const DEFAULT_SUFFIX: &str = "_updated";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InputLimits {
    pub max_bytes: u64,
    pub extension: String,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_FILE_MB * 1024 * 1024,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl InputLimits {
    pub fn max_mb(&self) -> u64 {
        self.max_bytes / (1024 * 1024)
    }
}

/// Options for one merge session. Built once, then shared read-only by every file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MergeConfig {
    pub debug_mode: bool,
    pub insert_flow_chart: bool,
    pub preserve_target_fonts: bool,
    pub font_override: Option<String>,
    pub extract_title: bool,
    pub limits: InputLimits,
    pub output_suffix: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            insert_flow_chart: false,
            preserve_target_fonts: false,
            font_override: None,
            extract_title: true,
            limits: InputLimits::default(),
            output_suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

/// Command-line switches; a set flag wins over the config file.
#[derive(Clone, Debug, Default)]
pub struct MergeOverrides {
    pub debug: bool,
    pub insert_flow_chart: bool,
    pub preserve_target_fonts: bool,
    pub font: Option<String>,
    pub no_extract_title: bool,
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

impl MergeConfig {
    pub fn from_app_config(file: &AppConfig, cli: &MergeOverrides) -> Self {
        let defaults = Self::default();
        let m = &file.merge;
        let extension = non_empty(file.input.extension.as_deref())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                if e.starts_with('.') {
                    e
                } else {
                    format!(".{e}")
                }
            })
            .unwrap_or(defaults.limits.extension);
        let max_mb = file
            .input
            .max_file_mb
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_FILE_MB);
        Self {
            debug_mode: cli.debug || m.debug_mode.unwrap_or(defaults.debug_mode),
            insert_flow_chart: cli.insert_flow_chart
                || m.insert_flow_chart.unwrap_or(defaults.insert_flow_chart),
            preserve_target_fonts: cli.preserve_target_fonts
                || m.preserve_target_fonts.unwrap_or(defaults.preserve_target_fonts),
            font_override: non_empty(cli.font.as_deref())
                .or_else(|| non_empty(m.font_override.as_deref())),
            extract_title: !cli.no_extract_title
                && m.extract_title.unwrap_or(defaults.extract_title),
            limits: InputLimits {
                max_bytes: max_mb * 1024 * 1024,
                extension,
            },
            output_suffix: file
                .output
                .suffix
                .clone()
                .unwrap_or(defaults.output_suffix),
        }
    }

    /// Locate and load the config file (explicit path, then `DOCX_RESTYLE_CONFIG`, then an
    /// upward search from `workdir`) and apply command-line overrides.
    /// Returns the config file used, if any.
    pub fn resolve(
        config_path: Option<PathBuf>,
        workdir: &Path,
        cli: &MergeOverrides,
    ) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let cfg_file = config_path
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(workdir, DEFAULT_CONFIG_NAME));

        let mut file_cfg = AppConfig::default();
        let mut used = None;
        if let Some(p) = cfg_file {
            if p.exists() {
                file_cfg = load_config(&p)?;
                used = Some(p);
            }
        }
        Ok((Self::from_app_config(&file_cfg, cli), used))
    }

    /// `Report.DOCX` -> `Report_updated.docx`.
    pub fn output_name(&self, original: &str) -> String {
        let ext = &self.limits.extension;
        let stem = if original.len() >= ext.len()
            && original.is_char_boundary(original.len() - ext.len())
            && original[original.len() - ext.len()..].eq_ignore_ascii_case(ext)
        {
            &original[..original.len() - ext.len()]
        } else {
            original
        };
        format!("{stem}{}{ext}", self.output_suffix)
    }
}
