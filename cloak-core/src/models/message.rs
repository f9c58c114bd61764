use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Body shown in place of a message that could not be decrypted
pub const UNDECRYPTABLE_PLACEHOLDER: &str = "[Encrypted message - unable to decrypt]";

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Message {
   pub id: String,
   pub sender: String,
   pub body: String,
   pub timestamp: DateTime<Utc>,
   pub is_directed: bool,
   pub recipient: Option<String>,
   pub origin_peer: Option<String>,
   /// Travelled encrypted on the wire
   pub encrypted: bool,
   pub undecryptable: bool,
}

impl Message {
   pub(crate) fn new(sender: &str, body: String, timestamp: DateTime<Utc>) -> Self {
      Self {
         id: uuid::Uuid::new_v4().to_string(),
         sender: sender.to_string(),
         body,
         timestamp,
         is_directed: false,
         recipient: None,
         origin_peer: None,
         encrypted: false,
         undecryptable: false,
      }
   }
}

/// Append-only, ordered record of every message shown to the user.
///
/// Entries are never edited after insertion. An optional feed receives a copy
/// of each entry as it is appended.
#[derive(Debug, Default)]
pub struct MessageLog {
   entries: Vec<Message>,
   feed: Option<mpsc::UnboundedSender<Message>>,
}

impl MessageLog {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_feed(feed: mpsc::UnboundedSender<Message>) -> Self {
      Self {
         entries: Vec::new(),
         feed: Some(feed),
      }
   }

   pub(crate) fn append(&mut self, message: Message) {
      if let Some(feed) = &self.feed {
         if feed.send(message.clone()).is_err() {
            debug!("Message feed receiver dropped");
            self.feed = None;
         }
      }
      self.entries.push(message);
   }

   pub fn entries(&self) -> &[Message] {
      &self.entries
   }

   pub fn last(&self) -> Option<&Message> {
      self.entries.last()
   }

   pub fn len(&self) -> usize {
      self.entries.len()
   }

   pub fn is_empty(&self) -> bool {
      self.entries.is_empty()
   }
}
