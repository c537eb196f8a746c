//! Domain model structs carried on the wire and persisted by the store.
//!
//! Every struct derives `Serialize` and `Deserialize` with camelCase field
//! names so it can be handed directly to browser clients as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user identity.  Plain email address, used as a key throughout -- the
/// service trusts the registered identity as given.
pub type Identity = String;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A known user identity and the connection id it last registered with.
///
/// This is a historical record only; live reachability is decided by the
/// in-memory connection registry, never by this table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Email address (primary key).
    pub email: Identity,
    /// Last-known connection id.
    pub socket: String,
    /// Optional human-readable display name.
    #[serde(default)]
    pub name: String,
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A chat group.
///
/// Invariants: `admin` is always a member of `participants` (auto-appended
/// at creation when missing), and the admin identity never changes after
/// creation.  `participants` preserves insertion order and holds no
/// duplicates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Unique group identifier.
    pub id: Uuid,
    /// Human-readable group name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Member identities, in the order they were added.
    pub participants: Vec<Identity>,
    /// The group administrator.  Immutable after creation.
    pub admin: Identity,
    /// When the group was created.
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// Whether `identity` is currently a member.
    pub fn is_participant(&self, identity: &str) -> bool {
        self.participants.iter().any(|p| p == identity)
    }
}

// ---------------------------------------------------------------------------
// Group message
// ---------------------------------------------------------------------------

/// A single persisted group message.  Immutable once created; deleted only
/// as a cascade of deleting the owning group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    /// Unique message identifier.
    pub id: Uuid,
    /// The group this message belongs to.
    pub group_id: Uuid,
    /// Sender identity.
    pub sender: Identity,
    /// Message text.
    pub message: String,
    /// Server-assigned timestamp.
    pub timestamp: DateTime<Utc>,
}

/// The client-facing shape of a group message returned by history queries.
///
/// `sender_id` and `sender_name` both carry the stored sender identity;
/// display-name resolution is left to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub sender_id: Identity,
    pub sender_name: Identity,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl From<GroupMessage> for MessageView {
    fn from(msg: GroupMessage) -> Self {
        Self {
            id: format!("m{}", msg.id),
            sender_id: msg.sender.clone(),
            sender_name: msg.sender,
            text: msg.message,
            timestamp: msg.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// File descriptor
// ---------------------------------------------------------------------------

/// Metadata describing an uploaded file.
///
/// Produced by the upload endpoint and relayed verbatim between clients by
/// `send-file`; the file bytes themselves never travel over the socket.
/// The serialized field names (`fileUrl`, `type`) are the contract browser
/// clients already speak, so the descriptor round-trips unchanged from the
/// upload response into `send-file`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// URL the receiver can fetch the file from.
    #[serde(rename = "fileUrl")]
    pub url: String,
    /// Original file name as uploaded.
    pub original_name: String,
    /// File size in bytes.
    pub size: u64,
    /// MIME type reported by the uploader.
    #[serde(rename = "type")]
    pub mime_type: String,
}
