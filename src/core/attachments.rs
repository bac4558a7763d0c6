//! Staging and encoding of user-selected files.
//!
//! Selection only records what the user picked. File contents are read when
//! the pending set is encoded at send time, and encoding never mutates the
//! pending set; the owner clears it once the send has been accepted.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use tracing::{debug, warn};

use crate::core::constants::MAX_ATTACHMENTS;
use crate::core::error::ValidationError;
use crate::core::message::MessagePart;
use crate::utils::media::media_type_for_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentData {
    /// Bytes already held in memory.
    Bytes(Vec<u8>),
    /// A file on disk, read at encode time.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub byte_size: u64,
    pub media_type: String,
    pub data: AttachmentData,
}

impl Attachment {
    /// Stage in-memory bytes. The media type is guessed from `name` when not given.
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        let name = name.into();
        let media_type = media_type
            .map(str::to_string)
            .unwrap_or_else(|| media_type_for_name(&name).to_string());
        Self {
            byte_size: bytes.len() as u64,
            name,
            media_type,
            data: AttachmentData::Bytes(bytes),
        }
    }

    /// Stage a file by path. Only metadata is read here.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            media_type: media_type_for_name(&name).to_string(),
            name,
            byte_size: metadata.len(),
            data: AttachmentData::File(path.to_path_buf()),
        })
    }

    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        match &self.data {
            AttachmentData::Bytes(bytes) => Ok(bytes.clone()),
            AttachmentData::File(path) => tokio::fs::read(path).await,
        }
    }
}

/// An attachment materialized for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAttachment {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl EncodedAttachment {
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.media_type,
            base64::prelude::BASE64_STANDARD.encode(&self.bytes)
        )
    }

    pub fn to_part(&self) -> MessagePart {
        MessagePart::File {
            media_type: self.media_type.clone(),
            url: self.data_url(),
            filename: Some(self.name.clone()),
        }
    }
}

/// Reading a staged file failed during encoding.
#[derive(Debug)]
pub struct EncodeError {
    pub name: String,
    pub source: std::io::Error,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to read attachment '{}': {}", self.name, self.source)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Ordered set of attachments waiting to be sent, bounded by `max`.
#[derive(Debug, Clone)]
pub struct AttachmentSet {
    pending: Vec<Attachment>,
    max: usize,
}

impl Default for AttachmentSet {
    fn default() -> Self {
        Self::new(MAX_ATTACHMENTS)
    }
}

impl AttachmentSet {
    pub fn new(max: usize) -> Self {
        Self {
            pending: Vec::new(),
            max,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn list(&self) -> &[Attachment] {
        &self.pending
    }

    /// Stage `files` after the current pending set, all or nothing.
    pub fn select(&mut self, files: Vec<Attachment>) -> Result<(), ValidationError> {
        if self.pending.len() + files.len() > self.max {
            let err = ValidationError::TooManyAttachments {
                pending: self.pending.len(),
                adding: files.len(),
                max: self.max,
            };
            warn!(
                pending = self.pending.len(),
                adding = files.len(),
                max = self.max,
                "Attachment selection rejected"
            );
            return Err(err);
        }

        debug!(adding = files.len(), "Staging attachments");
        self.pending.extend(files);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Attachment, ValidationError> {
        if index >= self.pending.len() {
            return Err(ValidationError::AttachmentIndexOutOfRange {
                index,
                len: self.pending.len(),
            });
        }
        Ok(self.pending.remove(index))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Read every pending attachment, preserving order.
    pub async fn encode(&self) -> Result<Vec<EncodedAttachment>, EncodeError> {
        let mut encoded = Vec::with_capacity(self.pending.len());
        for attachment in &self.pending {
            let bytes = attachment.read_bytes().await.map_err(|source| EncodeError {
                name: attachment.name.clone(),
                source,
            })?;
            encoded.push(EncodedAttachment {
                name: attachment.name.clone(),
                media_type: attachment.media_type.clone(),
                bytes,
            });
        }
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn image(name: &str) -> Attachment {
        Attachment::from_bytes(name, None, vec![1, 2, 3])
    }

    #[test]
    fn select_preserves_selection_order() {
        let mut set = AttachmentSet::default();
        set.select(vec![image("a.png"), image("b.png")]).expect("first");
        set.select(vec![image("c.png")]).expect("second");
        let names: Vec<_> = set.list().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn select_over_limit_leaves_pending_unchanged() {
        let mut set = AttachmentSet::default();
        set.select((0..4).map(|i| image(&format!("{i}.png"))).collect())
            .expect("four fit");
        let before = set.list().to_vec();

        let err = set
            .select(vec![image("x.png"), image("y.png")])
            .expect_err("six exceed the limit");
        assert_eq!(
            err,
            ValidationError::TooManyAttachments {
                pending: 4,
                adding: 2,
                max: 5
            }
        );
        assert_eq!(set.list(), before.as_slice());

        set.select(vec![image("z.png")]).expect("exactly five fit");
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn remove_keeps_order_of_the_rest() {
        let mut set = AttachmentSet::default();
        set.select(vec![image("a.png"), image("b.png"), image("c.png")])
            .expect("select");
        let removed = set.remove(1).expect("remove");
        assert_eq!(removed.name, "b.png");
        let names: Vec<_> = set.list().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["a.png", "c.png"]);
        assert!(matches!(
            set.remove(7),
            Err(ValidationError::AttachmentIndexOutOfRange { index: 7, len: 2 })
        ));
    }

    #[test]
    fn from_bytes_guesses_media_type_unless_given() {
        assert_eq!(image("cat.jpg").media_type, "image/jpeg");
        let explicit = Attachment::from_bytes("blob", Some("image/webp"), vec![0]);
        assert_eq!(explicit.media_type, "image/webp");
        assert_eq!(explicit.byte_size, 1);
    }

    #[tokio::test]
    async fn encode_reads_files_lazily_and_keeps_pending_set() {
        let mut file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .expect("temp file");
        file.write_all(b"png-bytes").expect("write");

        let mut set = AttachmentSet::default();
        let staged = Attachment::from_path(file.path()).await.expect("stage");
        assert_eq!(staged.byte_size, 9);
        assert_eq!(staged.media_type, "image/png");
        set.select(vec![image("first.gif"), staged]).expect("select");

        let encoded = set.encode().await.expect("encode");
        assert_eq!(encoded.len(), 2);
        assert_eq!(encoded[0].media_type, "image/gif");
        assert_eq!(encoded[1].bytes, b"png-bytes");
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn encode_reports_missing_files_by_name() {
        let dir = tempfile::tempdir().expect("dir");
        let path = dir.path().join("gone.png");
        std::fs::write(&path, b"x").expect("write");
        let staged = Attachment::from_path(&path).await.expect("stage");
        std::fs::remove_file(&path).expect("remove");

        let mut set = AttachmentSet::default();
        set.select(vec![staged]).expect("select");
        let err = set.encode().await.expect_err("file vanished");
        assert_eq!(err.name, "gone.png");
    }

    #[test]
    fn encoded_attachment_becomes_data_url_file_part() {
        let encoded = EncodedAttachment {
            name: "dot.png".into(),
            media_type: "image/png".into(),
            bytes: b"hi".to_vec(),
        };
        assert_eq!(
            encoded.to_part(),
            MessagePart::File {
                media_type: "image/png".into(),
                url: "data:image/png;base64,aGk=".into(),
                filename: Some("dot.png".into()),
            }
        );
    }
}
