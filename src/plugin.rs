//! The commands a chat host exposes
//!
//! Every command is a thin sequence over the pipeline: pick the text,
//! extract the code, resolve the language, merge options over the
//! configured defaults, build the document, screenshot it. Commands never
//! fail outward: user mistakes and internal errors both come back as text
//! replies, and blocked sessions get no reply at all.

use crate::args::{argument_text, RenderArgs};
use crate::browser::{BrowserBackend, BrowserRenderer};
use crate::extract::extract_code;
use crate::grammar::GrammarRegistry;
use crate::janitor::Janitor;
use crate::language::LanguageRegistry;
use crate::message::{AttachmentFetcher, Invocation, Reply};
use crate::template::{build_document, AssetStore, DocumentParts};
use crate::{Error, PluginConfig, RenderRequest, Result};
use log::{error, info, warn};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

const MIN_FONT_SIZE: u32 = 6;
const MAX_FONT_SIZE: u32 = 96;

pub const USAGE: &str = "Quote a message that contains code, or put the code after the command.\n\n\
Usage: render [options] [code]\n\n\
Options:\n\
  -l <language> or lang=<language>\n\
  -t <theme> or theme=<theme>\n\
  -s <size> or size=<size>\n\
  -n, noline, --no-line   hide line numbers\n\
  -ln, line, --line       show line numbers\n\n\
Example: render -l python -t dracula print('hello')";

pub const RENDER_TOOL_NAME: &str = "render_code";

pub const RENDER_TOOL_DESCRIPTION: &str =
    "Render a code snippet as a syntax-highlighted image and send it to the chat.";

/// JSON schema of the tool's arguments, for hosts that expose it to a model
pub fn render_tool_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "code": { "type": "string", "description": "Source code to render" },
            "language": { "type": "string", "description": "Language id such as rust or python; omit to auto-detect" },
            "theme": { "type": "string", "description": "Highlight theme such as github-dark or monokai" }
        },
        "required": ["code"]
    })
}

/// Decode file contents as UTF-8 (BOM stripped), falling back to GBK.
pub fn decode_source(bytes: &[u8]) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(text.strip_prefix('\u{feff}').unwrap_or(text).to_string());
    }
    encoding_rs::GBK
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

pub struct CodeRenderPlugin {
    config: PluginConfig,
    languages: LanguageRegistry,
    grammars: GrammarRegistry,
    assets: AssetStore,
    renderer: BrowserRenderer,
    janitor: Janitor,
    janitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl CodeRenderPlugin {
    /// Validate the config and load language and grammar definitions.
    /// Nothing is started until [`initialize`](Self::initialize).
    pub fn new(config: PluginConfig, backend: Arc<dyn BrowserBackend>) -> Result<Self> {
        config.validate()?;

        let grammars = GrammarRegistry::load_dir(&config.grammar_dir());
        let languages = LanguageRegistry::load(
            &config.languages_file(),
            &config.custom_languages_file(),
            &grammars,
        );
        let scratch_dir = config.scratch_dir();

        Ok(Self {
            assets: AssetStore::from_config(&config),
            renderer: BrowserRenderer::new(backend, scratch_dir.clone()),
            janitor: Janitor::new(scratch_dir, config.cleanup_interval()),
            janitor_task: Mutex::new(None),
            languages,
            grammars,
            config,
        })
    }

    /// Same as [`new`](Self::new) with headless Chrome as the browser.
    #[cfg(feature = "cdp")]
    pub fn with_chrome(config: PluginConfig) -> Result<Self> {
        let backend = Arc::new(crate::browser::cdp::CdpBackend::from_config(&config));
        Self::new(config, backend)
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn languages(&self) -> &LanguageRegistry {
        &self.languages
    }

    pub fn renderer(&self) -> &BrowserRenderer {
        &self.renderer
    }

    /// Prepare the scratch directory, clear what a previous run left,
    /// schedule periodic cleanup and warm up the browser. A browser that
    /// fails to start here is retried on the first render.
    pub async fn initialize(&self) {
        if let Err(e) = tokio::fs::create_dir_all(self.janitor.dir()).await {
            warn!("Failed to create {}: {}", self.janitor.dir().display(), e);
        }

        self.janitor.sweep().await;

        if let Ok(mut task) = self.janitor_task.lock() {
            if task.is_none() {
                *task = Some(self.janitor.clone().spawn());
            }
        }

        if let Err(e) = self.renderer.start().await {
            error!("Browser unavailable at startup, will retry on first render: {}", e);
        }

        info!(
            "Code renderer initialized, {} languages and {} custom grammars loaded",
            self.languages.len(),
            self.grammars.len()
        );
    }

    /// Stop cleanup, clear the scratch directory and close the browser.
    pub async fn terminate(&self) {
        let task = self.janitor_task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            task.abort();
        }

        self.janitor.sweep().await;

        if let Err(e) = self.renderer.stop().await {
            error!("Error while closing the browser: {}", e);
        }
    }

    /// `render`: code from the quoted message, else from the text after
    /// the options.
    pub async fn render_inline(&self, invocation: &Invocation) -> Option<Reply> {
        if self.config.is_blocked(invocation.session_id.as_deref()) {
            return None;
        }
        Some(reply_or_error("render", self.render_inline_inner(invocation)).await)
    }

    async fn render_inline_inner(&self, invocation: &Invocation) -> Result<Reply> {
        let args = RenderArgs::parse(&argument_text(&invocation.text));

        let source = match invocation.quoted_text() {
            Some(text) => text.to_string(),
            None if !args.remaining.is_empty() => args.remaining.clone(),
            None => return Ok(Reply::text(USAGE)),
        };

        let (code, hint) = extract_code(&source);
        if code.trim().is_empty() {
            return Ok(Reply::text("No code found in the message."));
        }

        let language = self
            .languages
            .resolve(args.language.as_deref(), None)
            .or_else(|| self.languages.resolve(hint.as_deref(), None));

        let request = self.build_request(code, language, &args);
        self.render_request(&request).await.map(Reply::Image)
    }

    /// `render_file`: code from the file attached to the quoted message.
    pub async fn render_file(&self, invocation: &Invocation, fetcher: &dyn AttachmentFetcher) -> Option<Reply> {
        if self.config.is_blocked(invocation.session_id.as_deref()) {
            return None;
        }
        Some(reply_or_error("render_file", self.render_file_inner(invocation, fetcher)).await)
    }

    async fn render_file_inner(&self, invocation: &Invocation, fetcher: &dyn AttachmentFetcher) -> Result<Reply> {
        let args = RenderArgs::parse(&argument_text(&invocation.text));

        let Some(attachment) = invocation.quoted_attachment() else {
            return Ok(Reply::text("Quote a message that carries a file."));
        };

        let bytes = match fetcher.fetch(attachment).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to fetch attachment {}: {}", attachment.name, e);
                return Ok(Reply::text("Could not download the file."));
            }
        };

        let Some(code) = decode_source(&bytes) else {
            return Ok(Reply::text("Unsupported file encoding (only UTF-8 and GBK are supported)."));
        };
        if code.trim().is_empty() {
            return Ok(Reply::text("The file is empty."));
        }

        let language = self
            .languages
            .resolve(args.language.as_deref(), Some(&attachment.name));

        let request = self.build_request(code, language, &args);
        let path = self.render_request(&request).await?;
        info!("Rendered file {}", attachment.name);
        Ok(Reply::Image(path))
    }

    /// Tool entry point for a language model: structured arguments, no
    /// text parsing.
    pub async fn render_tool(
        &self,
        session_id: Option<&str>,
        code: &str,
        language: Option<&str>,
        theme: Option<&str>,
    ) -> Option<Reply> {
        if self.config.is_blocked(session_id) {
            return None;
        }
        if code.trim().is_empty() {
            return Some(Reply::text("No code to render."));
        }

        let args = RenderArgs {
            theme: theme.map(str::to_string),
            ..Default::default()
        };
        let language = self.languages.resolve(language, None);
        let request = self.build_request(code.to_string(), language, &args);
        Some(reply_or_error(RENDER_TOOL_NAME, async { self.render_request(&request).await.map(Reply::Image) }).await)
    }

    /// `render_themes`: themes bundled on disk
    pub fn list_themes(&self, session_id: Option<&str>) -> Option<Reply> {
        if self.config.is_blocked(session_id) {
            return None;
        }
        let themes = self.assets.themes();
        if themes.is_empty() {
            return Some(Reply::text("No theme stylesheets are installed."));
        }

        let mut lines = vec!["Available themes:".to_string()];
        lines.extend(themes.iter().map(|t| format!("- {}", t)));
        lines.push(format!("\nDefault: {}. Pick one with render -t <theme>", self.config.default_theme));
        Some(Reply::Text(lines.join("\n")))
    }

    /// `render_langs`: languages the resolver knows by name
    pub fn list_languages(&self, session_id: Option<&str>) -> Option<Reply> {
        if self.config.is_blocked(session_id) {
            return None;
        }

        let mut lines = vec!["Known languages:".to_string()];
        for entry in self.languages.entries() {
            let name = entry.display_name.as_deref().unwrap_or(&entry.id);
            if entry.aliases.is_empty() {
                lines.push(format!("- {}", name));
            } else {
                lines.push(format!("- {} ({})", name, entry.aliases.join(", ")));
            }
        }
        lines.push(format!(
            "\n{} languages. Any highlight.js language id also works with -l.",
            self.languages.len()
        ));
        Some(Reply::Text(lines.join("\n")))
    }

    fn build_request(&self, code: String, language: Option<String>, args: &RenderArgs) -> RenderRequest {
        let theme = args
            .theme
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.config.default_theme.clone());

        let font_size = args
            .font_size
            .filter(|size| *size > 0)
            .unwrap_or(self.config.font_size)
            .clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);

        RenderRequest {
            code,
            language,
            theme,
            font_size,
            line_numbers: args.line_numbers.unwrap_or(self.config.line_numbers.enabled),
        }
    }

    async fn render_request(&self, request: &RenderRequest) -> Result<PathBuf> {
        let (highlighter, theme_css, font) = tokio::join!(
            self.assets.highlight_script(),
            self.assets.theme_css(&request.theme),
            self.assets.font_face(),
        );
        let script = highlighter + &self.grammars.script_payload();

        let document = build_document(&DocumentParts {
            request,
            theme_css: &theme_css,
            script: &script,
            font: &font,
            line_numbers: self.config.line_numbers,
        });

        let path = self.renderer.render(&document).await?;
        info!(
            "Rendered {} code, theme {}, {} chars",
            request
                .language
                .as_deref()
                .map(|id| self.languages.display_name(id))
                .unwrap_or("auto-detected"),
            request.theme,
            request.code.chars().count()
        );
        Ok(path)
    }
}

async fn reply_or_error(command: &str, fut: impl Future<Output = Result<Reply>>) -> Reply {
    match fut.await {
        Ok(reply) => reply,
        Err(Error::Closed) => Reply::text("The renderer is shutting down."),
        Err(e) => {
            error!("{} failed: {}", command, e);
            Reply::Text(format!("Render failed: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_utf8_and_gbk() {
        assert_eq!(decode_source(b"fn main() {}").as_deref(), Some("fn main() {}"));
        assert_eq!(decode_source(b"\xEF\xBB\xBFx = 1").as_deref(), Some("x = 1"));
        // "你好" in GBK
        assert_eq!(decode_source(b"print('\xC4\xE3\xBA\xC3')").as_deref(), Some("print('你好')"));
        assert_eq!(decode_source(b"\xFF\xFF\xFF"), None);
    }

    #[test]
    fn tool_schema_requires_code() {
        let schema = render_tool_schema();
        assert_eq!(schema["required"], serde_json::json!(["code"]));
        assert!(schema["properties"]["language"].is_object());
    }
}
