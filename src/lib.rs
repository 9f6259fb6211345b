//! Code Render
//!
//! Turns snippets of source code into syntax-highlighted PNG images, for
//! posting back into a chat session. A snippet is pulled out of a message
//! (fenced, inline, quoted or attached as a file), its language resolved,
//! and it is laid out as a self-contained HTML document that a shared
//! headless Chrome highlights with a bundled highlight.js and screenshots.
//!
//! # Features
//!
//! - **CDP Backend** (default): Uses Chrome DevTools Protocol via headless Chrome
//! - **Offline documents**: scripts, theme CSS and fonts are inlined, the
//!   browser never touches the network
//! - **Custom grammars**: small JSON grammar descriptors extend the highlighter
//!
//! # Example
//!
//! ```no_run
//! use coderender::{CodeRenderPlugin, Invocation, PluginConfig, Reply};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let plugin = CodeRenderPlugin::with_chrome(PluginConfig::default())?;
//! plugin.initialize().await;
//!
//! let invocation = Invocation::new("render\n-l rust -t nord fn main() {}");
//! if let Some(Reply::Image(path)) = plugin.render_inline(&invocation).await {
//!     println!("image written to {}", path.display());
//! }
//! plugin.terminate().await;
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;

pub mod error;
pub use error::{Error, Result};

pub mod args;
pub mod browser;
pub mod config;
pub mod extract;
pub mod grammar;
pub mod janitor;
pub mod language;
pub mod message;
pub mod plugin;
pub mod template;

pub use args::RenderArgs;
pub use browser::{BrowserBackend, BrowserRenderer, BrowserSession, BrowserState};
pub use config::{LineNumberConfig, PluginConfig};
pub use extract::extract_code;
pub use grammar::{GrammarDescriptor, GrammarRegistry};
pub use janitor::Janitor;
pub use language::{LanguageEntry, LanguageRegistry};
pub use message::{Attachment, AttachmentFetcher, FsAttachmentFetcher, Invocation, QuotedMessage, Reply};
pub use plugin::CodeRenderPlugin;

#[cfg(feature = "cdp")]
pub use browser::cdp::CdpBackend;

/// Viewport dimensions of the page each snippet is laid out in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
        }
    }
}

/// Everything needed to draw one snippet
///
/// Built per invocation from the parsed arguments merged over the
/// configured defaults, and dropped once the image exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Source text, unescaped
    pub code: String,
    /// Highlighter language id; `None` lets the highlighter auto-detect
    pub language: Option<String>,
    /// Theme name, matched against the bundled theme stylesheets
    pub theme: String,
    /// Font size in CSS pixels
    pub font_size: u32,
    /// Whether a line-number gutter is drawn
    pub line_numbers: bool,
}
