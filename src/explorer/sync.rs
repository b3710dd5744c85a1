//! Peer synchronization messages.
//!
//! The explorer only commits and announces; moving the messages between peers
//! is the job of whatever transport subscribes to the event channel.

use serde::{Deserialize, Serialize};

use super::document::Document;

/// Emitted after a locally produced change has been committed.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A slide embedded on this instance was added to the collection
    NewPatchEmbedding(Document),
}

impl SyncEvent {
    /// Wire message announcing this event, signed with the sender name.
    pub fn into_message(self, from: Option<String>) -> PeerMessage {
        match self {
            SyncEvent::NewPatchEmbedding(data) => PeerMessage::NewPatchEmbedding { from, data },
        }
    }
}

/// Message exchanged between explorer peers.
///
/// ```json
/// { "type": "newPatchEmbedding", "from": "peer-1", "data": { "embedding": [...], ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PeerMessage {
    NewPatchEmbedding {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        data: Document,
    },
}
