//! Stored message model.
//!
//! A [`Message`] is either a text snippet or an uploaded file. Files carry an
//! access key (the capability for downloading them) and a [`Payload`] that is
//! overwritten with [`SCRUB_BYTE`] before its memory is released.

use serde::Serialize;
use serde_repr::Serialize_repr;

/// Sentinel written over payload bytes when a payload is scrubbed.
pub const SCRUB_BYTE: u8 = 0xCC;

/// Number of random bytes in a file access key (rendered as 32 hex chars).
pub const ACCESS_KEY_BYTES: usize = 16;

/// Length of a rendered access key.
pub const ACCESS_KEY_LEN: usize = ACCESS_KEY_BYTES * 2;

/// Kind of stored content, serialized as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr)]
#[repr(u8)]
pub enum MessageKind {
    /// Text snippet; the label is the body.
    Text = 0,
    /// Uploaded file; the label is the original filename.
    File = 1,
}

/// Raw file content that scrubs itself.
///
/// Every byte is overwritten with [`SCRUB_BYTE`] on [`Payload::scrub`] and
/// again when the payload is dropped, so freed memory never holds the
/// original content.
///
/// # Security
///
/// - **Debug Redaction**: the `Debug` impl only prints the length.
#[derive(Default, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Allocate exactly `len` zeroed bytes, or `None` if the allocation
    /// cannot be satisfied.
    pub fn try_zeroed(len: usize) -> Option<Self> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(len).ok()?;
        bytes.resize(len, 0);
        Some(Self(bytes))
    }

    /// Mutable access for filling the buffer in place.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Returns the bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the payload holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrites every byte with [`SCRUB_BYTE`], keeping the length.
    pub fn scrub(&mut self) {
        self.0.fill(SCRUB_BYTE);
        std::hint::black_box(&mut self.0);
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        self.scrub();
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Payload(<redacted {} bytes>)", self.0.len())
    }
}

/// A stored message.
///
/// Messages are immutable once stored; the only mutation is removal.
#[derive(Debug)]
pub struct Message {
    pub(crate) id: u32,
    pub(crate) kind: MessageKind,
    pub(crate) created_at: i64,
    pub(crate) label: String,
    pub(crate) access_key: Option<String>,
    pub(crate) payload: Option<Payload>,
}

impl Message {
    /// Store-assigned id, unique for the lifetime of the store.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Text or file.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Insertion time in seconds since the Unix epoch.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Text body for text messages, original filename for files.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Download capability, present only for files.
    pub fn access_key(&self) -> Option<&str> {
        self.access_key.as_deref()
    }

    /// File content, present only for files.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Scrubs the payload in place (no-op for text messages).
    pub fn scrub(&mut self) {
        if let Some(payload) = self.payload.as_mut() {
            payload.scrub();
        }
    }

    /// Metadata view, without the payload.
    pub fn view(&self) -> MessageView {
        MessageView {
            id: self.id,
            kind: self.kind,
            created_at: self.created_at,
            label: self.label.clone(),
            access_key: self.access_key.clone(),
            size: self.payload.as_ref().map(Payload::len),
        }
    }
}

/// Message metadata as listed to clients.
///
/// Never carries payload bytes, so list responses stay small.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    /// Message id
    pub id: u32,
    /// Text or file
    pub kind: MessageKind,
    /// Insertion time (Unix seconds)
    pub created_at: i64,
    /// Text body or filename
    pub label: String,
    /// Download key, files only
    #[serde(rename = "key", skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    /// Payload length in bytes, files only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

/// A file's content copied out of the store for download.
#[derive(Debug)]
pub struct FileContent {
    /// Original filename
    pub name: String,
    /// Copy of the payload; scrubbed when dropped
    pub data: Payload,
}
