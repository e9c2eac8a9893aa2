//! Message Store
//!
//! The only shared mutable state of the relay: an insertion-ordered list of
//! messages plus the id counter.
//!
//! ## Invariants
//!
//! - Ids start at 1, strictly increase and are never reused, even after
//!   deletion
//! - Insertion order is preserved; deletion never renumbers or reorders
//! - Every operation runs under one exclusive lock and never performs I/O or
//!   awaits while holding it (randomness and the clock are sampled before the
//!   lock is taken)

use parking_lot::Mutex;

use crate::{
    env::Environment,
    message::{ACCESS_KEY_BYTES, FileContent, Message, MessageKind, MessageView, Payload},
};

/// Errors from store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// Every `u32` id has been handed out; ids are never reused.
    #[error("message id space exhausted")]
    IdSpaceExhausted,
}

#[derive(Debug)]
struct Inner {
    /// Id assigned to the next inserted message
    next_id: u32,
    /// Messages in insertion order
    messages: Vec<Message>,
}

/// Ordered, lock-guarded collection of messages.
pub struct Store<E>
where
    E: Environment,
{
    env: E,
    inner: Mutex<Inner>,
}

impl<E> Store<E>
where
    E: Environment,
{
    /// Create an empty store. The first inserted message gets id 1.
    pub fn new(env: E) -> Self {
        Self { env, inner: Mutex::new(Inner { next_id: 1, messages: Vec::new() }) }
    }

    /// Store a text snippet and return its id.
    pub fn insert_text(&self, text: impl Into<String>) -> Result<u32, StoreError> {
        self.insert(MessageKind::Text, text.into(), None)
    }

    /// Store a file and return its id. A fresh access key is generated.
    pub fn insert_file(
        &self,
        name: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Result<u32, StoreError> {
        self.insert(MessageKind::File, name.into(), Some(payload.into()))
    }

    /// Append a message, assigning the next id.
    ///
    /// File messages get a 128-bit random access key. A payload passed with
    /// a text kind is dropped (and scrubbed).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::IdSpaceExhausted` once `u32::MAX` ids have been
    /// used. The store is not modified in that case.
    pub fn insert(
        &self,
        kind: MessageKind,
        label: String,
        payload: Option<Payload>,
    ) -> Result<u32, StoreError> {
        let created_at = self.env.unix_time();
        let (access_key, payload) = match kind {
            MessageKind::File => {
                (Some(self.env.random_hex(ACCESS_KEY_BYTES)), Some(payload.unwrap_or_default()))
            },
            MessageKind::Text => (None, None),
        };

        let mut inner = self.inner.lock();
        let id = inner.next_id;
        // u32::MAX itself is never handed out, it marks exhaustion
        inner.next_id = id.checked_add(1).ok_or(StoreError::IdSpaceExhausted)?;
        inner.messages.push(Message { id, kind, created_at, label, access_key, payload });
        drop(inner);

        tracing::debug!(id, ?kind, "message stored");
        Ok(id)
    }

    /// Snapshot of all message metadata in insertion order.
    pub fn list(&self) -> Vec<MessageView> {
        self.inner.lock().messages.iter().map(Message::view).collect()
    }

    /// Remove the message with `id`, preserving the order of the rest.
    ///
    /// The removed message is handed back so the caller can scrub it before
    /// discarding; its payload is scrubbed on drop regardless.
    pub fn delete(&self, id: u32) -> Option<Message> {
        let mut inner = self.inner.lock();
        let pos = inner.messages.iter().position(|m| m.id == id)?;
        let removed = inner.messages.remove(pos);
        drop(inner);

        tracing::debug!(id, "message removed");
        Some(removed)
    }

    /// Look up a file by its access key and copy its content out.
    ///
    /// The copy is made under the lock so the caller can write it to the
    /// network after the lock is released.
    pub fn find_by_access_key(&self, key: &str) -> Option<FileContent> {
        let inner = self.inner.lock();
        inner.messages.iter().find(|m| m.access_key.as_deref() == Some(key)).map(|m| FileContent {
            name: m.label.clone(),
            data: m.payload.as_ref().map(|p| Payload::from(p.as_slice())).unwrap_or_default(),
        })
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> std::fmt::Debug for Store<E>
where
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Store")
            .field("message_count", &inner.messages.len())
            .field("next_id", &inner.next_id)
            .finish()
    }
}

#[cfg(test)]
impl<E> Store<E>
where
    E: Environment,
{
    fn set_next_id(&self, next_id: u32) {
        self.inner.lock().next_id = next_id;
    }
}
