//! Host-neutral message model
//!
//! The chat host delivers an [`Invocation`] per command and turns the
//! returned [`Reply`] into a message. Attachments are downloaded through
//! the host's [`AttachmentFetcher`].

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// A file attached to a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name as shown in the chat, used for language detection
    pub name: String,
    /// Host-specific handle the fetcher understands (URL, file id, path)
    pub location: String,
}

/// The message a command invocation replies to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotedMessage {
    /// Concatenated text segments, if any
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// One command invocation as delivered by the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Session (group or private chat) the command came from
    pub session_id: Option<String>,
    /// Full message text; the first line holds the command keyword
    pub text: String,
    pub quoted: Option<QuotedMessage>,
}

impl Invocation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn quoting(mut self, quoted: QuotedMessage) -> Self {
        self.quoted = Some(quoted);
        self
    }

    /// Non-blank text of the quoted message
    pub fn quoted_text(&self) -> Option<&str> {
        self.quoted
            .as_ref()
            .and_then(|q| q.text.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    /// First file attached to the quoted message
    pub fn quoted_attachment(&self) -> Option<&Attachment> {
        self.quoted.as_ref().and_then(|q| q.attachments.first())
    }
}

/// What a command sends back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A rendered PNG in the scratch directory
    Image(PathBuf),
    /// A user-facing message (usage help, errors, listings)
    Text(String),
}

impl Reply {
    pub fn text(message: impl Into<String>) -> Self {
        Reply::Text(message.into())
    }
}

/// Downloads quoted attachments on behalf of the commands
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>>;
}

/// Treats `Attachment::location` as a local file path
#[derive(Debug, Clone, Copy, Default)]
pub struct FsAttachmentFetcher;

#[async_trait]
impl AttachmentFetcher for FsAttachmentFetcher {
    async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        tokio::fs::read(&attachment.location)
            .await
            .map_err(|e| Error::AttachmentError(format!("{}: {}", attachment.location, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_helpers() {
        let plain = Invocation::new("render");
        assert_eq!(plain.quoted_text(), None);
        assert_eq!(plain.quoted_attachment(), None);

        let blank = Invocation::new("render").quoting(QuotedMessage {
            text: Some("   ".to_string()),
            attachments: vec![],
        });
        assert_eq!(blank.quoted_text(), None);

        let file = Attachment {
            name: "a.rs".to_string(),
            location: "/tmp/a.rs".to_string(),
        };
        let quoted = Invocation::new("render_file")
            .with_session("s1")
            .quoting(QuotedMessage {
                text: Some("see file".to_string()),
                attachments: vec![file.clone()],
            });
        assert_eq!(quoted.session_id.as_deref(), Some("s1"));
        assert_eq!(quoted.quoted_text(), Some("see file"));
        assert_eq!(quoted.quoted_attachment(), Some(&file));
    }

    #[tokio::test]
    async fn fs_fetcher_reports_missing_files() {
        let missing = Attachment {
            name: "x.py".to_string(),
            location: "/definitely/not/here/x.py".to_string(),
        };
        let err = FsAttachmentFetcher.fetch(&missing).await.unwrap_err();
        assert!(matches!(err, Error::AttachmentError(_)));
    }
}
