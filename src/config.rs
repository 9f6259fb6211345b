//! Plugin configuration
//!
//! Every option the pipeline reads lives here with its default, so the
//! rest of the crate never looks up loose keys. A config file is parsed
//! once and validated before anything starts.

use crate::{Error, Result, Viewport};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Font family stack used when no font file is available
pub const DEFAULT_FONT_FAMILY: &str =
    "'JetBrains Mono', Consolas, 'Fira Code', 'Source Code Pro', monospace";

/// Top-level configuration
///
/// # Examples
///
/// ```
/// let cfg = coderender::PluginConfig::from_json_str(r#"{"font_size": 18}"#).unwrap();
/// assert_eq!(cfg.font_size, 18);
/// assert_eq!(cfg.default_theme, "github-dark");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Theme used when a command does not pick one
    pub default_theme: String,
    /// Font size in CSS pixels used when a command does not pick one
    pub font_size: u32,
    /// Font file to embed; defaults to the bundled JetBrains Mono
    pub font_path: Option<PathBuf>,
    /// CSS family stack used when no font file can be embedded
    pub font_family: Option<String>,
    /// Replaces `<assets>/highlight/highlight.min.js`
    pub highlight_js_path: Option<PathBuf>,
    /// Replaces the per-theme stylesheet lookup with one fixed file
    pub highlight_css_path: Option<PathBuf>,
    /// Line-number gutter defaults
    pub line_numbers: LineNumberConfig,
    /// Session ids the commands stay silent in
    pub blacklist: Vec<String>,
    /// Root of the bundled highlighter, themes, fonts and language files
    pub assets_dir: PathBuf,
    /// Host data directory; the scratch directory lives below it
    pub data_dir: PathBuf,
    /// Overrides `<data_dir>/temp/code_render`
    pub scratch_dir: Option<PathBuf>,
    /// Overrides `<assets>/languages.json`
    pub languages_file: Option<PathBuf>,
    /// Overrides `<assets>/custom_languages.json`
    pub custom_languages_file: Option<PathBuf>,
    /// Overrides `<assets>/languages` (grammar descriptors)
    pub grammar_dir: Option<PathBuf>,
    /// Seconds between scratch directory sweeps
    pub cleanup_interval_secs: u64,
    /// Page size each snippet is laid out in
    pub viewport: Viewport,
    /// Browser process settings
    pub browser: BrowserConfig,
}

/// Line-number gutter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LineNumberConfig {
    /// Draw a gutter unless a command says otherwise
    pub enabled: bool,
    /// Number printed next to the first line
    pub start_from: u32,
    /// Also number snippets that are a single line long
    pub single_line: bool,
}

/// Settings for the headless browser process
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chrome/Chromium executable; auto-detected when unset
    pub chrome_path: Option<PathBuf>,
    /// Keep Chrome's sandbox on (disable only inside containers that need it)
    pub sandbox: bool,
    /// How long a page may take to finish highlighting
    pub load_timeout_ms: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            default_theme: "github-dark".to_string(),
            font_size: 14,
            font_path: None,
            font_family: None,
            highlight_js_path: None,
            highlight_css_path: None,
            line_numbers: LineNumberConfig::default(),
            blacklist: Vec::new(),
            assets_dir: PathBuf::from("assets"),
            data_dir: PathBuf::from("data"),
            scratch_dir: None,
            languages_file: None,
            custom_languages_file: None,
            grammar_dir: None,
            cleanup_interval_secs: 900,
            viewport: Viewport::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl Default for LineNumberConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_from: 1,
            single_line: false,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            sandbox: true,
            load_timeout_ms: 30000,
        }
    }
}

impl PluginConfig {
    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a JSON config document
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: PluginConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(6..=96).contains(&self.font_size) {
            return Err(Error::ConfigError(format!(
                "font_size must be between 6 and 96, got {}",
                self.font_size
            )));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(Error::ConfigError("cleanup_interval_secs must be positive".into()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::ConfigError("viewport dimensions must be non-zero".into()));
        }
        if !is_safe_asset_name(&self.default_theme) {
            return Err(Error::ConfigError(format!(
                "default_theme '{}' is not a valid theme name",
                self.default_theme
            )));
        }
        Ok(())
    }

    pub fn is_blocked(&self, session_id: Option<&str>) -> bool {
        match session_id {
            Some(id) if !id.is_empty() => self.blacklist.iter().any(|b| b == id),
            _ => false,
        }
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("temp").join("code_render"))
    }

    pub fn languages_file(&self) -> PathBuf {
        self.languages_file
            .clone()
            .unwrap_or_else(|| self.assets_dir.join("languages.json"))
    }

    pub fn custom_languages_file(&self) -> PathBuf {
        self.custom_languages_file
            .clone()
            .unwrap_or_else(|| self.assets_dir.join("custom_languages.json"))
    }

    pub fn grammar_dir(&self) -> PathBuf {
        self.grammar_dir
            .clone()
            .unwrap_or_else(|| self.assets_dir.join("languages"))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Theme and language names end up in file names and CSS classes, so only
/// a conservative character set is accepted.
pub(crate) fn is_safe_asset_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '#'))
        && !name.contains("..")
}
