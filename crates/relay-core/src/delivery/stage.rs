//! DeliveryStage: hand completed files to the user.
//!
//! Small text files go inline as a formatted message; everything else is
//! uploaded as an attachment. Files are processed in ascending index order
//! and a failure on one file is reported and skipped, never fatal. Uploads
//! are spaced by a fixed delay to stay under transport rate limits.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_types::conversation::{ConversationId, TextFormat};
use relay_types::error::DeliveryError;
use relay_types::fetch::FetchableFile;

use super::text::{inline_message, is_text_file};
use crate::session::replies;
use crate::transport::ChatTransport;

/// Largest inline message the transport accepts.
pub const INLINE_MESSAGE_LIMIT: usize = 4096;

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub inline_limit: usize,
    /// Attachments larger than this are refused before reading them.
    pub max_upload_bytes: u64,
    pub upload_delay: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            inline_limit: INLINE_MESSAGE_LIMIT,
            max_upload_bytes: 50 * 1024 * 1024,
            upload_delay: Duration::from_secs(1),
        }
    }
}

/// Tally of one delivery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub inline: usize,
    pub uploaded: usize,
    pub failed: usize,
    /// Files not attempted because the run was cancelled.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivered {
    Inline,
    Attachment,
}

pub struct DeliveryStage<T: ChatTransport> {
    transport: Arc<T>,
    settings: DeliverySettings,
}

impl<T: ChatTransport> DeliveryStage<T> {
    pub fn new(transport: Arc<T>, settings: DeliverySettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Deliver `files` to `conversation`, then send the closing notice.
    ///
    /// Checks `cancel` before each file and during pauses; a cancelled run
    /// stops early without the closing notice.
    pub async fn deliver(
        &self,
        conversation: ConversationId,
        files: &[FetchableFile],
        cancel: &CancellationToken,
    ) -> DeliveryReport {
        let mut ordered: Vec<&FetchableFile> = files.iter().collect();
        ordered.sort_by_key(|f| f.index);

        let mut report = DeliveryReport::default();
        for (position, file) in ordered.iter().enumerate() {
            if cancel.is_cancelled() {
                report.skipped = ordered.len() - position;
                info!(%conversation, skipped = report.skipped, "delivery cancelled");
                return report;
            }

            let pause = match self.deliver_one(conversation, file).await {
                Ok(Delivered::Inline) => {
                    report.inline += 1;
                    false
                }
                Ok(Delivered::Attachment) => {
                    report.uploaded += 1;
                    true
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(%conversation, file = err.file_name(), error = %err, "file delivery failed");
                    self.notify(conversation, &err.to_string()).await;
                    matches!(err, DeliveryError::Upload { .. })
                }
            };

            let more = position + 1 < ordered.len();
            if pause && more {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.upload_delay) => {}
                }
            }
        }

        if cancel.is_cancelled() {
            return report;
        }
        self.notify(conversation, replies::ALL_DELIVERED).await;
        info!(
            %conversation,
            inline = report.inline,
            uploaded = report.uploaded,
            failed = report.failed,
            "delivery finished"
        );
        report
    }

    async fn deliver_one(
        &self,
        conversation: ConversationId,
        file: &FetchableFile,
    ) -> Result<Delivered, DeliveryError> {
        let path = file
            .resolved_path
            .as_deref()
            .ok_or_else(|| DeliveryError::Missing {
                name: file.name.clone(),
            })?;
        let open_error = |e: std::io::Error| DeliveryError::Open {
            name: file.name.clone(),
            reason: e.to_string(),
        };

        let size = tokio::fs::metadata(path).await.map_err(open_error)?.len();

        if is_text_file(&file.name) && size < self.settings.inline_limit as u64 {
            let bytes = tokio::fs::read(path).await.map_err(open_error)?;
            match String::from_utf8(bytes) {
                Ok(content) => {
                    let message = inline_message(&file.name, &content);
                    if message.len() <= self.settings.inline_limit {
                        match self
                            .transport
                            .send_text(conversation, &message, TextFormat::Html)
                            .await
                        {
                            Ok(_) => return Ok(Delivered::Inline),
                            Err(e) => {
                                debug!(file = %file.name, error = %e, "inline send failed, uploading instead");
                            }
                        }
                    }
                }
                Err(_) => debug!(file = %file.name, "not valid UTF-8, uploading instead"),
            }
        }

        if size > self.settings.max_upload_bytes {
            return Err(DeliveryError::TooLarge {
                name: file.name.clone(),
                size,
                limit: self.settings.max_upload_bytes,
            });
        }

        let bytes = tokio::fs::read(path).await.map_err(open_error)?;
        let caption = format!("File: {}", file.name);
        self.transport
            .send_document(conversation, bytes, &file.name, &caption)
            .await
            .map_err(|source| DeliveryError::Upload {
                name: file.name.clone(),
                source,
            })?;
        Ok(Delivered::Attachment)
    }

    async fn notify(&self, conversation: ConversationId, text: &str) {
        if let Err(e) = self
            .transport
            .send_text(conversation, text, TextFormat::Plain)
            .await
        {
            warn!(%conversation, error = %e, "failed to send delivery notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;

    use crate::testing::{RecordingTransport, Sent};

    const CONV: ConversationId = ConversationId(5);

    fn file(index: usize, root: &Path, name: &str, content: Option<&[u8]>) -> FetchableFile {
        let path = root.join(name);
        if let Some(bytes) = content {
            std::fs::write(&path, bytes).unwrap();
        }
        FetchableFile {
            index,
            name: name.to_string(),
            relative_path: name.to_string(),
            size: content.map(|c| c.len() as u64).unwrap_or(0),
            selected: true,
            resolved_path: Some(path),
        }
    }

    fn stage(transport: &Arc<RecordingTransport>, settings: DeliverySettings) -> DeliveryStage<RecordingTransport> {
        DeliveryStage::new(Arc::clone(transport), settings)
    }

    fn quick() -> DeliverySettings {
        DeliverySettings {
            upload_delay: Duration::from_millis(1),
            ..DeliverySettings::default()
        }
    }

    #[tokio::test]
    async fn test_small_text_goes_inline() {
        let root = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let files = [file(0, root.path(), "notes.txt", Some(b"hello <world>"))];

        let report = stage(&transport, quick())
            .deliver(CONV, &files, &CancellationToken::new())
            .await;

        assert_eq!(report.inline, 1);
        match &transport.sent()[0] {
            Sent::Text { text, format, .. } => {
                assert_eq!(*format, TextFormat::Html);
                assert_eq!(text, "<b>File: notes.txt</b>\n\n<pre>hello &lt;world&gt;</pre>");
            }
            other => panic!("expected inline text, got {other:?}"),
        }
        assert_eq!(transport.texts().last().unwrap(), replies::ALL_DELIVERED);
    }

    #[tokio::test]
    async fn test_binary_and_large_text_become_attachments() {
        let root = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let big_text = vec![b'a'; INLINE_MESSAGE_LIMIT + 10];
        let files = [
            file(0, root.path(), "movie.mkv", Some(b"\x00\x01video")),
            file(1, root.path(), "huge.log", Some(&big_text)),
            file(2, root.path(), "latin1.txt", Some(b"caf\xe9")),
        ];

        let report = stage(&transport, quick())
            .deliver(CONV, &files, &CancellationToken::new())
            .await;

        assert_eq!(report.uploaded, 3);
        assert_eq!(transport.documents(), vec!["movie.mkv", "huge.log", "latin1.txt"]);
        let captions: Vec<String> = transport
            .sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Document { caption, .. } => Some(caption),
                _ => None,
            })
            .collect();
        assert_eq!(captions[0], "File: movie.mkv");
    }

    #[tokio::test]
    async fn test_partial_failure_continues() {
        let root = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        transport.fail_document("b.mkv");
        let files = [
            file(0, root.path(), "a.iso", Some(b"a")),
            file(1, root.path(), "b.mkv", Some(b"b")),
            file(2, root.path(), "c.iso", Some(b"c")),
        ];

        let report = stage(&transport, quick())
            .deliver(CONV, &files, &CancellationToken::new())
            .await;

        assert_eq!(report.uploaded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(transport.documents(), vec!["a.iso", "c.iso"]);
        let texts = transport.texts();
        assert!(texts.iter().any(|t| t.starts_with("Error uploading file b.mkv")));
        assert_eq!(texts.last().unwrap(), replies::ALL_DELIVERED);
    }

    #[tokio::test]
    async fn test_missing_and_oversized_files_are_reported() {
        let root = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let mut missing = file(0, root.path(), "gone.bin", None);
        missing.resolved_path = None;
        let files = [
            missing,
            file(1, root.path(), "vanished.bin", None),
            file(2, root.path(), "big.bin", Some(&[0u8; 64])),
        ];
        let settings = DeliverySettings {
            max_upload_bytes: 32,
            ..quick()
        };

        let report = stage(&transport, settings)
            .deliver(CONV, &files, &CancellationToken::new())
            .await;

        assert_eq!(report.failed, 3);
        assert!(transport.documents().is_empty());
        let texts = transport.texts();
        assert!(texts[0].contains("gone.bin is missing"));
        assert!(texts[1].starts_with("Error opening file vanished.bin"));
        assert!(texts[2].contains("big.bin is too large"));
    }

    #[tokio::test]
    async fn test_files_delivered_in_index_order() {
        let root = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let files = [
            file(2, root.path(), "c.iso", Some(b"c")),
            file(0, root.path(), "a.iso", Some(b"a")),
        ];

        stage(&transport, quick())
            .deliver(CONV, &files, &CancellationToken::new())
            .await;
        assert_eq!(transport.documents(), vec!["a.iso", "c.iso"]);
    }

    #[tokio::test]
    async fn test_cancelled_delivery_stops_without_notice() {
        let root = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let files = [
            file(0, root.path(), "a.iso", Some(b"a")),
            file(1, root.path(), "b.iso", Some(b"b")),
        ];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = stage(&transport, quick()).deliver(CONV, &files, &cancel).await;
        assert_eq!(report.skipped, 2);
        assert!(transport.sent().is_empty());
    }
}
