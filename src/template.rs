//! Self-contained HTML documents for the browser to screenshot
//!
//! Nothing in a built document points at the network or the filesystem:
//! the highlighter, grammar registrations, theme stylesheet and font are
//! all inlined, so a sandboxed browser can render it offline.

use crate::config::{is_safe_asset_name, LineNumberConfig, PluginConfig, DEFAULT_FONT_FAMILY};
use crate::RenderRequest;
use base64::Engine as Base64Engine;
use log::{debug, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Element the browser screenshots; falls back to the full page
pub const CODE_SELECTOR: &str = ".code-container";

/// Set on `<body>` once highlighting and numbering are done
pub const READY_SELECTOR: &str = "body[data-rendered]";

const EMBEDDED_FONT_FAMILY: &str = "CodeRenderFont";

static SCRIPT_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</script").expect("script close pattern"));
static STYLE_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</style").expect("style close pattern"));

/// Runs after the highlighter is loaded: highlight every block, optionally
/// draw the line-number gutter, then flag the body as rendered.
const DRIVER_JS: &str = r#"
(function () {
  var opts = window.__codeRender || {};
  function numberLines(block) {
    var count = block.textContent.replace(/\n$/, '').split('\n').length;
    if (count < 2 && !opts.singleLine) return;
    var numbers = [];
    for (var i = 0; i < count; i++) numbers.push(String(opts.startFrom + i));
    var gutter = document.createElement('pre');
    gutter.className = 'line-numbers';
    gutter.setAttribute('aria-hidden', 'true');
    gutter.textContent = numbers.join('\n');
    var row = block.closest('.code-body');
    if (row) row.insertBefore(gutter, row.firstChild);
  }
  function highlight(block) {
    if (!window.hljs) return;
    var m = /\blanguage-([\w+#.-]+)/.exec(block.className);
    if (m && !window.hljs.getLanguage(m[1])) block.classList.remove('language-' + m[1]);
    try {
      if (window.hljs.highlightElement) window.hljs.highlightElement(block);
      else window.hljs.highlightBlock(block);
    } catch (e) {
      console.error('highlight.js error', e);
    }
  }
  function render() {
    var blocks = document.querySelectorAll('pre code');
    for (var i = 0; i < blocks.length; i++) {
      highlight(blocks[i]);
      if (opts.lineNumbers) numberLines(blocks[i]);
    }
    document.body.setAttribute('data-rendered', '1');
  }
  if (document.readyState === 'loading') {
    document.addEventListener('DOMContentLoaded', render);
  } else {
    render();
  }
})();
"#;

/// A font ready to be declared in the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontFace {
    /// CSS `font-family` value for the code
    pub family: String,
    /// Font file inlined as a data URL, if one was found
    pub embedded: Option<EmbeddedFont>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedFont {
    pub mime: &'static str,
    pub base64: String,
}

impl Default for FontFace {
    fn default() -> Self {
        Self {
            family: DEFAULT_FONT_FAMILY.to_string(),
            embedded: None,
        }
    }
}

/// Inputs of [`build_document`]
#[derive(Debug, Clone)]
pub struct DocumentParts<'a> {
    pub request: &'a RenderRequest,
    /// Theme stylesheet; empty falls back to plain dark styling
    pub theme_css: &'a str,
    /// Highlighter source followed by grammar registrations
    pub script: &'a str,
    pub font: &'a FontFace,
    /// Gutter numbering; drawn only when the request asks for it
    pub line_numbers: LineNumberConfig,
}

/// Assemble one offline HTML document.
pub fn build_document(parts: &DocumentParts<'_>) -> String {
    let request = parts.request;

    let language_class = request
        .language
        .as_deref()
        .filter(|lang| is_safe_asset_name(lang))
        .map(|lang| format!(" language-{}", lang))
        .unwrap_or_default();

    let font_face_css = parts
        .font
        .embedded
        .as_ref()
        .map(|font| {
            format!(
                "@font-face {{ font-family: '{}'; src: url(data:{};base64,{}); font-weight: normal; font-style: normal; }}",
                EMBEDDED_FONT_FAMILY, font.mime, font.base64
            )
        })
        .unwrap_or_default();

    let options = serde_json::json!({
        "lineNumbers": request.line_numbers,
        "startFrom": parts.line_numbers.start_from,
        "singleLine": parts.line_numbers.single_line,
    });

    let script = format!("{}\n;window.__codeRender = {};\n", parts.script, options);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<style>
{font_face}
html, body {{ margin: 0; background: #1e1e1e; }}
body {{ padding: 20px; }}
.code-container {{ display: inline-block; padding: 16px 20px; border-radius: 12px; box-shadow: 0 10px 30px rgba(0,0,0,0.4); max-width: 1100px; overflow: hidden; color: #d4d4d4; background: #1e1e1e; }}
</style>
<style>
{theme_css}
</style>
<style>
.code-body {{ display: flex; align-items: flex-start; }}
pre {{ margin: 0; font-size: {font_size}px; line-height: 1.5; font-family: {font_family}; white-space: pre; }}
pre code.hljs {{ display: block; padding: 0; overflow: visible; background: transparent; }}
.line-numbers {{ padding-right: 14px; margin-right: 14px; text-align: right; opacity: 0.45; user-select: none; border-right: 1px solid currentColor; }}
</style>
<script>{script}</script>
</head>
<body>
<div class="code-container hljs">
<div class="code-body"><pre><code class="hljs{language_class}">{code}</code></pre></div>
</div>
<script>{driver}</script>
</body>
</html>
"#,
        font_face = font_face_css,
        theme_css = neutralize_style_close(parts.theme_css),
        font_size = request.font_size,
        font_family = css_font_family(parts.font),
        script = neutralize_script_close(&script),
        language_class = language_class,
        code = escape_html(&request.code),
        driver = DRIVER_JS,
    )
}

/// Keep inlined script text from terminating its `<script>` element.
pub fn neutralize_script_close(script: &str) -> String {
    SCRIPT_CLOSE.replace_all(script, r"<\/script").into_owned()
}

fn neutralize_style_close(css: &str) -> String {
    STYLE_CLOSE.replace_all(css, r"<\/style").into_owned()
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn css_font_family(font: &FontFace) -> String {
    let family: String = font
        .family
        .chars()
        .filter(|c| !matches!(c, ';' | '{' | '}' | '<' | '>'))
        .collect();
    match font.embedded {
        Some(_) => format!("'{}', {}", EMBEDDED_FONT_FAMILY, family),
        None => family,
    }
}

/// Locates and reads the bundled highlighter, themes and font.
///
/// Layout under the assets directory:
/// `highlight/highlight.min.js`, `highlight/styles/<theme>.min.css`,
/// `fonts/ttf/JetBrainsMono-Regular.ttf`. Anything missing reads as empty.
#[derive(Debug, Clone)]
pub struct AssetStore {
    assets_dir: PathBuf,
    highlight_js_path: Option<PathBuf>,
    highlight_css_path: Option<PathBuf>,
    font_path: Option<PathBuf>,
    font_family: Option<String>,
}

impl AssetStore {
    pub fn from_config(config: &PluginConfig) -> Self {
        Self {
            assets_dir: config.assets_dir.clone(),
            highlight_js_path: config.highlight_js_path.clone(),
            highlight_css_path: config.highlight_css_path.clone(),
            font_path: config.font_path.clone(),
            font_family: config.font_family.clone(),
        }
    }

    fn styles_dir(&self) -> PathBuf {
        self.assets_dir.join("highlight").join("styles")
    }

    pub async fn highlight_script(&self) -> String {
        let path = self
            .highlight_js_path
            .clone()
            .unwrap_or_else(|| self.assets_dir.join("highlight").join("highlight.min.js"));
        read_or_empty(&path).await
    }

    /// Stylesheet for `theme`; unsafe names never reach the filesystem.
    pub async fn theme_css(&self, theme: &str) -> String {
        if let Some(path) = &self.highlight_css_path {
            return read_or_empty(path).await;
        }
        if !is_safe_asset_name(theme) {
            warn!("Ignoring theme with unsupported name: {:?}", theme);
            return String::new();
        }
        read_or_empty(&self.styles_dir().join(format!("{}.min.css", theme))).await
    }

    pub async fn font_face(&self) -> FontFace {
        let family = self
            .font_family
            .clone()
            .unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string());

        let path = self
            .font_path
            .clone()
            .unwrap_or_else(|| self.assets_dir.join("fonts").join("ttf").join("JetBrainsMono-Regular.ttf"));

        let embedded = match tokio::fs::read(&path).await {
            Ok(bytes) => Some(EmbeddedFont {
                mime: font_mime(&path),
                base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            }),
            Err(e) => {
                debug!("No font at {}: {}", path.display(), e);
                None
            }
        };

        FontFace { family, embedded }
    }

    /// Theme names available on disk, sorted
    pub fn themes(&self) -> Vec<String> {
        let mut themes: Vec<String> = std::fs::read_dir(self.styles_dir())
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| {
                        let name = entry.file_name().to_string_lossy().to_string();
                        name.strip_suffix(".min.css")
                            .or_else(|| name.strip_suffix(".css"))
                            .map(str::to_string)
                    })
                    .collect()
            })
            .unwrap_or_default();
        themes.sort();
        themes.dedup();
        themes
    }
}

async fn read_or_empty(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Asset missing: {}", path.display());
            String::new()
        }
        Err(e) => {
            warn!("Failed to read asset {}: {}", path.display(), e);
            String::new()
        }
    }
}

fn font_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("otf") => "font/otf",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttc") => "font/collection",
        _ => "font/ttf",
    }
}
