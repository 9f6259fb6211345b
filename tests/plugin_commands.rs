//! Command behavior end to end, with a scripted browser in place of Chrome

mod common;

use common::FakeBackend;
use coderender::plugin::USAGE;
use coderender::{Attachment, CodeRenderPlugin, FsAttachmentFetcher, Invocation, PluginConfig, QuotedMessage, Reply};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

const HLJS: &str = "/* highlight.js stand-in */ window.hljs = window.hljs || {};";

struct Fixture {
    dir: TempDir,
    backend: Arc<FakeBackend>,
    plugin: CodeRenderPlugin,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(tweak: impl FnOnce(&mut PluginConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        let styles = assets.join("highlight").join("styles");
        std::fs::create_dir_all(&styles).unwrap();
        std::fs::create_dir_all(assets.join("languages")).unwrap();

        std::fs::write(assets.join("highlight").join("highlight.min.js"), HLJS).unwrap();
        std::fs::write(styles.join("github-dark.min.css"), ".hljs{color:#c9d1d9} /* github-dark */").unwrap();
        std::fs::write(styles.join("nord.min.css"), ".hljs{color:#d8dee9} /* nord */").unwrap();
        std::fs::write(assets.join("languages.json"), include_str!("../assets/languages.json")).unwrap();
        std::fs::write(
            assets.join("languages").join("ljos.json"),
            include_str!("../assets/languages/ljos.json"),
        )
        .unwrap();

        let mut config = PluginConfig {
            assets_dir: assets,
            data_dir: dir.path().join("data"),
            blacklist: vec!["muted-group".to_string()],
            ..Default::default()
        };
        tweak(&mut config);

        let backend = FakeBackend::new();
        let plugin = CodeRenderPlugin::new(config, backend.clone()).unwrap();
        Self { dir, backend, plugin }
    }

    fn write_file(&self, name: &str, bytes: &[u8]) -> Attachment {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        Attachment {
            name: name.to_string(),
            location: path.to_string_lossy().to_string(),
        }
    }

    /// The single document captured so far
    fn document(&self) -> String {
        let documents = self.backend.documents();
        assert_eq!(documents.len(), 1, "expected exactly one capture");
        documents.into_iter().next().unwrap()
    }
}

fn quoting_text(command: &str, text: &str) -> Invocation {
    Invocation::new(command).quoting(QuotedMessage {
        text: Some(text.to_string()),
        attachments: vec![],
    })
}

fn quoting_file(command: &str, attachment: Attachment) -> Invocation {
    Invocation::new(command).quoting(QuotedMessage {
        text: None,
        attachments: vec![attachment],
    })
}

fn text(reply: Option<Reply>) -> String {
    match reply {
        Some(Reply::Text(text)) => text,
        other => panic!("expected a text reply, got {:?}", other),
    }
}

fn image(reply: Option<Reply>) -> std::path::PathBuf {
    match reply {
        Some(Reply::Image(path)) => path,
        other => panic!("expected an image reply, got {:?}", other),
    }
}

#[tokio::test]
async fn blacklisted_sessions_get_no_reply() {
    let fx = Fixture::new();
    let attachment = fx.write_file("a.py", b"print(1)");

    let inline = Invocation::new("render\nprint(1)").with_session("muted-group");
    let file = quoting_file("render_file", attachment).with_session("muted-group");

    assert_eq!(fx.plugin.render_inline(&inline).await, None);
    assert_eq!(fx.plugin.render_file(&file, &FsAttachmentFetcher).await, None);
    assert_eq!(fx.plugin.render_tool(Some("muted-group"), "x", None, None).await, None);
    assert_eq!(fx.plugin.list_themes(Some("muted-group")), None);
    assert_eq!(fx.plugin.list_languages(Some("muted-group")), None);
    assert_eq!(fx.backend.launches(), 0);

    // other sessions are served
    let other = Invocation::new("render\nprint(1)").with_session("friends");
    image(fx.plugin.render_inline(&other).await);
}

#[tokio::test]
async fn bare_command_replies_with_usage() {
    let fx = Fixture::new();
    assert_eq!(text(fx.plugin.render_inline(&Invocation::new("render")).await), USAGE);
    assert_eq!(
        text(fx.plugin.render_inline(&Invocation::new("render\n-l rust -t nord")).await),
        USAGE
    );
    assert_eq!(fx.backend.launches(), 0);
}

#[tokio::test]
async fn quoted_text_wins_over_trailing_text() {
    let fx = Fixture::new();
    let invocation = quoting_text("render\n-l py leftover words", "```rust\nfn main() {}\n```");

    let path = image(fx.plugin.render_inline(&invocation).await);
    assert!(path.exists());

    let html = fx.document();
    assert!(html.contains(r#"<code class="hljs language-python">fn main() {}</code>"#));
    assert!(!html.contains("leftover"));
}

#[tokio::test]
async fn fence_label_is_resolved_through_aliases() {
    let fx = Fixture::new();
    let invocation = Invocation::new("render\n```js\nconst a = 1 < 2;\n```");

    image(fx.plugin.render_inline(&invocation).await);
    assert!(fx
        .document()
        .contains(r#"<code class="hljs language-javascript">const a = 1 &lt; 2;</code>"#));
}

#[tokio::test]
async fn unlabeled_code_is_left_to_auto_detection() {
    let fx = Fixture::new();
    image(fx.plugin.render_inline(&Invocation::new("render\n`SELECT 1`")).await);
    assert!(fx.document().contains(r#"<code class="hljs">SELECT 1</code>"#));
}

#[tokio::test]
async fn empty_fence_reports_no_code() {
    let fx = Fixture::new();
    let invocation = quoting_text("render", "```python\n```");
    assert_eq!(
        text(fx.plugin.render_inline(&invocation).await),
        "No code found in the message."
    );
    assert_eq!(fx.backend.launches(), 0);
}

#[tokio::test]
async fn options_override_configured_defaults() {
    let fx = Fixture::new();
    let invocation = Invocation::new("render\ntheme=nord size=20 noline\nx = 1");

    image(fx.plugin.render_inline(&invocation).await);
    let html = fx.document();
    assert!(html.contains("/* nord */"));
    assert!(!html.contains("/* github-dark */"));
    assert!(html.contains("font-size: 20px"));
    assert!(html.contains(r#""lineNumbers":false"#));
    assert!(html.contains(HLJS));
}

#[tokio::test]
async fn defaults_apply_when_options_are_absent_or_unusable() {
    let fx = Fixture::with_config(|c| {
        c.font_size = 18;
        c.line_numbers.start_from = 0;
    });
    let invocation = Invocation::new("render\nsize=0 theme= x = 1");

    image(fx.plugin.render_inline(&invocation).await);
    let html = fx.document();
    assert!(html.contains("/* github-dark */"));
    assert!(html.contains("font-size: 18px"));
    assert!(html.contains(r#""lineNumbers":true"#));
    assert!(html.contains(r#""startFrom":0"#));
}

#[tokio::test]
async fn oversized_font_is_clamped() {
    let fx = Fixture::new();
    image(fx.plugin.render_inline(&Invocation::new("render\n-s 500 x")).await);
    assert!(fx.document().contains("font-size: 96px"));
}

#[tokio::test]
async fn custom_grammars_are_registered_in_every_document() {
    let fx = Fixture::new();
    image(fx.plugin.render_inline(&Invocation::new("render\n-l lj fn main() {}")).await);

    let html = fx.document();
    assert!(html.contains(r#"window.hljs.registerLanguage("ljos""#));
    assert!(html.contains(r#"<code class="hljs language-ljos">"#));
}

#[tokio::test]
async fn file_language_comes_from_its_name() {
    let fx = Fixture::new();
    let invocation = quoting_file("render_file", fx.write_file("build.rs", b"fn main() {}\n"));

    image(fx.plugin.render_file(&invocation, &FsAttachmentFetcher).await);
    assert!(fx.document().contains(r#"<code class="hljs language-rust">fn main() {}"#));
}

#[tokio::test]
async fn file_language_can_be_overridden() {
    let fx = Fixture::new();
    let invocation = quoting_file("render_file\n-l ts", fx.write_file("notes.txt", b"let a: number = 1"));

    image(fx.plugin.render_file(&invocation, &FsAttachmentFetcher).await);
    assert!(fx.document().contains("language-typescript"));
}

#[tokio::test]
async fn gbk_files_are_decoded() {
    let fx = Fixture::new();
    // print('你好') encoded as GBK
    let invocation = quoting_file("render_file", fx.write_file("hello.py", b"print('\xC4\xE3\xBA\xC3')"));

    image(fx.plugin.render_file(&invocation, &FsAttachmentFetcher).await);
    let html = fx.document();
    assert!(html.contains("print(&#x27;你好&#x27;)"));
    assert!(html.contains("language-python"));
}

#[tokio::test]
async fn unusable_files_are_rejected_with_text() {
    let fx = Fixture::new();

    let empty = quoting_file("render_file", fx.write_file("empty.py", b" \n\t\n"));
    assert_eq!(
        text(fx.plugin.render_file(&empty, &FsAttachmentFetcher).await),
        "The file is empty."
    );

    let binary = quoting_file("render_file", fx.write_file("blob.bin", b"\xFF\xFF\xFF"));
    assert!(text(fx.plugin.render_file(&binary, &FsAttachmentFetcher).await).starts_with("Unsupported file encoding"));

    let missing = quoting_file(
        "render_file",
        Attachment {
            name: "gone.py".to_string(),
            location: fx.dir.path().join("gone.py").to_string_lossy().to_string(),
        },
    );
    assert_eq!(
        text(fx.plugin.render_file(&missing, &FsAttachmentFetcher).await),
        "Could not download the file."
    );

    let nothing_quoted = quoting_text("render_file", "just text");
    assert_eq!(
        text(fx.plugin.render_file(&nothing_quoted, &FsAttachmentFetcher).await),
        "Quote a message that carries a file."
    );

    assert_eq!(fx.backend.launches(), 0);
}

#[tokio::test]
async fn tool_renders_structured_arguments() {
    let fx = Fixture::new();

    assert_eq!(
        text(fx.plugin.render_tool(None, "   ", Some("rust"), None).await),
        "No code to render."
    );

    image(fx.plugin.render_tool(None, "x = {'a': 1}", Some("Python3"), Some("nord")).await);
    let html = fx.document();
    assert!(html.contains("language-python"));
    assert!(html.contains("/* nord */"));
}

#[tokio::test]
async fn browser_failure_becomes_a_failure_reply() {
    let fx = Fixture::new();
    fx.backend.fail_launch.store(true, Ordering::SeqCst);

    let reply = text(fx.plugin.render_inline(&Invocation::new("render\nx")).await);
    assert!(reply.starts_with("Render failed:"), "{}", reply);
    assert!(reply.contains("no chrome here"));
}

#[tokio::test]
async fn listings_show_themes_and_languages() {
    let fx = Fixture::new();

    let themes = text(fx.plugin.list_themes(None));
    assert!(themes.contains("- github-dark"));
    assert!(themes.contains("- nord"));
    assert!(themes.contains("Default: github-dark"));

    let languages = text(fx.plugin.list_languages(None));
    assert!(languages.contains("- Python (py, python3)"));
    assert!(languages.contains("- Ljos (lj)"));
}

#[tokio::test]
async fn lifecycle_clears_scratch_files() {
    let fx = Fixture::new();
    let scratch = fx.plugin.config().scratch_dir();
    std::fs::create_dir_all(&scratch).unwrap();
    std::fs::write(scratch.join("stale.png"), b"old").unwrap();

    fx.plugin.initialize().await;
    assert!(!scratch.join("stale.png").exists());
    assert_eq!(fx.backend.launches(), 1);

    let path = image(fx.plugin.render_inline(&Invocation::new("render\nx")).await);
    assert!(path.starts_with(&scratch));
    assert_eq!(fx.backend.launches(), 1);

    fx.plugin.terminate().await;
    assert!(!path.exists());
    assert!(is_empty(&scratch));
    assert_eq!(
        text(fx.plugin.render_inline(&Invocation::new("render\nx")).await),
        "The renderer is shutting down."
    );
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let backend = FakeBackend::new();
    let config = PluginConfig {
        font_size: 2,
        ..Default::default()
    };
    assert!(CodeRenderPlugin::new(config, backend).is_err());
}

fn is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}
