//! `coderender` - render code snippets to PNG from the command line.
//!
//! Plays the part of a chat host: each subcommand becomes one command
//! invocation against the plugin, and the reply is printed (or the image
//! copied to `--out`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use coderender::plugin::{render_tool_schema, RENDER_TOOL_NAME};
use coderender::{
    Attachment, CodeRenderPlugin, FsAttachmentFetcher, Invocation, Janitor, PluginConfig, QuotedMessage, Reply,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "coderender",
    version,
    about = "Render source code snippets into syntax-highlighted PNG images"
)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Session id the command runs in (checked against the blacklist)
    #[arg(long, global = true, value_name = "ID")]
    session: Option<String>,

    /// Where to copy the rendered image
    #[arg(short, long, global = true, value_name = "FILE", default_value = "code.png")]
    out: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render code given inline, e.g. `render -l rust -t nord 'fn main() {}'`
    Render {
        /// Options and code, as typed after the chat command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Treat this file's text as the quoted message
        #[arg(long, value_name = "FILE")]
        quote: Option<PathBuf>,
    },

    /// Render a source file, as if it were attached to a quoted message
    RenderFile {
        file: PathBuf,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Call the model-facing tool with structured arguments
    Tool {
        #[arg(long, conflicts_with = "code_file")]
        code: Option<String>,

        #[arg(long, value_name = "FILE")]
        code_file: Option<PathBuf>,

        #[arg(short, long)]
        language: Option<String>,

        #[arg(short, long)]
        theme: Option<String>,

        /// Print the tool's JSON schema instead of rendering
        #[arg(long)]
        schema: bool,
    },

    /// List installed themes
    Themes,

    /// List known languages
    Langs,

    /// Empty the scratch directory
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PluginConfig::load(path)?,
        None => PluginConfig::default(),
    };
    let session = cli.session.clone();

    match cli.command {
        Command::Themes => {
            let plugin = CodeRenderPlugin::with_chrome(config)?;
            print_reply(plugin.list_themes(session.as_deref()), &cli.out).await
        }
        Command::Langs => {
            let plugin = CodeRenderPlugin::with_chrome(config)?;
            print_reply(plugin.list_languages(session.as_deref()), &cli.out).await
        }
        Command::Sweep => {
            let janitor = Janitor::new(config.scratch_dir(), config.cleanup_interval());
            let removed = janitor.sweep().await;
            println!("Removed {} files from {}", removed, janitor.dir().display());
            Ok(())
        }
        Command::Tool { schema: true, .. } => {
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "name": RENDER_TOOL_NAME,
                "description": coderender::plugin::RENDER_TOOL_DESCRIPTION,
                "parameters": render_tool_schema(),
            }))?);
            Ok(())
        }
        command => {
            let plugin = CodeRenderPlugin::with_chrome(config)?;
            plugin.initialize().await;

            let printed = match run_render(&plugin, command, session).await {
                Ok(reply) => print_reply(reply, &cli.out).await,
                Err(e) => Err(e),
            };

            plugin.terminate().await;
            printed
        }
    }
}

async fn run_render(plugin: &CodeRenderPlugin, command: Command, session: Option<String>) -> anyhow::Result<Option<Reply>> {
    let reply = match command {
        Command::Render { args, quote } => {
            let mut invocation = Invocation::new(format!("render\n{}", args.join(" ")));
            invocation.session_id = session;
            if let Some(path) = quote {
                let text = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                invocation = invocation.quoting(QuotedMessage {
                    text: Some(text),
                    attachments: Vec::new(),
                });
            }
            plugin.render_inline(&invocation).await
        }
        Command::RenderFile { file, args } => {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let mut invocation = Invocation::new(format!("render_file\n{}", args.join(" "))).quoting(QuotedMessage {
                text: None,
                attachments: vec![Attachment {
                    name,
                    location: file.to_string_lossy().to_string(),
                }],
            });
            invocation.session_id = session;
            plugin.render_file(&invocation, &FsAttachmentFetcher).await
        }
        Command::Tool {
            code,
            code_file,
            language,
            theme,
            ..
        } => {
            let code = match (code, code_file) {
                (Some(code), _) => code,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => String::new(),
            };
            plugin
                .render_tool(session.as_deref(), &code, language.as_deref(), theme.as_deref())
                .await
        }
        Command::Themes | Command::Langs | Command::Sweep => None,
    };
    Ok(reply)
}

async fn print_reply(reply: Option<Reply>, out: &Path) -> anyhow::Result<()> {
    match reply {
        Some(Reply::Image(path)) => {
            tokio::fs::copy(&path, out)
                .await
                .with_context(|| format!("copying {} to {}", path.display(), out.display()))?;
            println!("{}", out.display());
        }
        Some(Reply::Text(text)) => println!("{}", text),
        None => log::info!("Session is blacklisted, no reply"),
    }
    Ok(())
}
