use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_NAME: &str = "docx-restyle.toml";
pub const CONFIG_ENV: &str = "DOCX_RESTYLE_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub merge: MergeSection,
    #[serde(default)]
    pub input: InputSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct MergeSection {
    /// Log every merge step, not just outcomes.
    #[serde(default)]
    pub debug_mode: Option<bool>,
    /// Insert a "PROCESS FLOW CHART" section before the numbered PROCEDURE heading.
    #[serde(default)]
    pub insert_flow_chart: Option<bool>,
    /// Keep the target's fonts; ignored when `font_override` is set.
    #[serde(default)]
    pub preserve_target_fonts: Option<bool>,
    #[serde(default)]
    pub font_override: Option<String>,
    /// Infer a title per target and splice it into the template's `{Enter SOP Title}`.
    #[serde(default)]
    pub extract_title: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct InputSection {
    #[serde(default)]
    pub max_file_mb: Option<u64>,
    #[serde(default)]
    pub extension: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct OutputSection {
    #[serde(default)]
    pub suffix: Option<String>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

pub const DEFAULT_CONFIG_TOML: &str = r#"[merge]
debug_mode = false
insert_flow_chart = false
preserve_target_fonts = false
# font_override = "Arial"
extract_title = true

[input]
max_file_mb = 50
extension = ".docx"

[output]
suffix = "_updated"
"#;

/// Write a commented default config into `dir`; an existing file is kept unless `force`.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(DEFAULT_CONFIG_NAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

#[cfg(test)]
mod tests {
    use super::{
        find_file_upwards, init_default_config, load_config, AppConfig, DEFAULT_CONFIG_NAME,
        DEFAULT_CONFIG_TOML,
    };

    #[test]
    fn default_config_parses() {
        let cfg: AppConfig = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(cfg.merge.extract_title, Some(true));
        assert_eq!(cfg.merge.font_override, None);
        assert_eq!(cfg.input.max_file_mb, Some(50));
        assert_eq!(cfg.output.suffix.as_deref(), Some("_updated"));
    }

    #[test]
    fn partial_config_leaves_rest_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_NAME);
        std::fs::write(&path, "[merge]\nfont_override = \"Arial\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.merge.font_override.as_deref(), Some("Arial"));
        assert_eq!(cfg.merge.debug_mode, None);
        assert_eq!(cfg.input.extension, None);
    }

    #[test]
    fn bad_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_NAME);
        std::fs::write(&path, "[merge\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn finds_config_in_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), "").unwrap();
        let found = find_file_upwards(&nested, DEFAULT_CONFIG_NAME, 3).unwrap();
        assert_eq!(found, dir.path().join(DEFAULT_CONFIG_NAME));
        assert!(find_file_upwards(&nested, DEFAULT_CONFIG_NAME, 1).is_none());
    }

    #[test]
    fn init_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_default_config(dir.path(), false).unwrap();
        std::fs::write(&path, "# edited\n").unwrap();
        init_default_config(dir.path(), false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited\n");
        init_default_config(dir.path(), true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG_TOML);
    }
}
