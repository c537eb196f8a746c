//! Wire protocol events exchanged between clients and the server.
//!
//! Every frame is a JSON text message of the shape
//! `{"event": "<name>", "data": <payload>}`.  Event names are kebab-case
//! and payload fields camelCase, so browser clients can speak the protocol
//! without any translation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{FileDescriptor, Group, Identity, MessageView};

/// Events a client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Claim an identity for this connection.
    RegisterUser(Identity),

    /// Send a direct message to another identity.
    ///
    /// Fields default to empty when absent, so a frame missing a key is
    /// answered by the server's missing-field validation rather than being
    /// dropped at the parse step.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        #[serde(default)]
        selected: Identity,
        #[serde(default)]
        message: String,
        #[serde(default)]
        from: Identity,
    },

    /// Create a new group.
    #[serde(rename_all = "camelCase")]
    CreateGroup {
        #[serde(default)]
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        participants: Vec<Identity>,
        #[serde(default)]
        admin: Identity,
    },

    /// List the groups the given identity belongs to.
    GetUserGroups(Identity),

    /// Send a message to a group.
    #[serde(rename_all = "camelCase")]
    SendGroupMessage {
        group_id: Uuid,
        #[serde(default)]
        message: String,
        #[serde(default)]
        from: Identity,
    },

    /// Fetch recent message history for a group.
    GetGroupMessages(Uuid),

    /// Add members to a group (admin only).
    #[serde(rename_all = "camelCase")]
    AddGroupMembers {
        group_id: Uuid,
        #[serde(default)]
        new_members: Vec<Identity>,
        #[serde(default)]
        admin_email: Identity,
    },

    /// Remove a member from a group (admin only).
    #[serde(rename_all = "camelCase")]
    RemoveGroupMember {
        group_id: Uuid,
        #[serde(default)]
        member_to_remove: Identity,
        #[serde(default)]
        admin_email: Identity,
    },

    /// Update a group's name and description (admin only).
    #[serde(rename_all = "camelCase")]
    UpdateGroup {
        group_id: Uuid,
        #[serde(default)]
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        admin_email: Identity,
    },

    /// Delete a group and its message history (admin only).
    #[serde(rename_all = "camelCase")]
    DeleteGroup {
        group_id: Uuid,
        #[serde(default)]
        admin_email: Identity,
    },

    /// Leave a group (self-initiated; admins cannot leave).
    #[serde(rename_all = "camelCase")]
    LeaveGroup {
        group_id: Uuid,
        #[serde(default)]
        member_email: Identity,
    },

    /// Relay an uploaded file's descriptor to another identity.
    #[serde(rename_all = "camelCase")]
    SendFile {
        #[serde(default)]
        selected: Identity,
        #[serde(default)]
        file_info: Option<FileDescriptor>,
        #[serde(default)]
        from: Identity,
        #[serde(default)]
        to: Option<Identity>,
    },
}

/// Events the server sends to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// The full set of currently reachable identities.  Broadcast to every
    /// connection whenever the set changes.
    OnlineUsers(Vec<Identity>),

    /// A direct message delivered to its recipient.
    ReceiveMessage { from: Identity, message: String },

    /// Delivery status for the sender's own last send.
    MessageStatus {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// A group the receiver was just added to at creation.
    NewGroup(Group),

    /// A group operation failed; sent to the acting client only.
    GroupError { message: String },

    /// Response to `get-user-groups`.
    UserGroups(Vec<Group>),

    /// A group message fanned out to every participant.
    #[serde(rename_all = "camelCase")]
    ReceiveGroupMessage {
        group_id: Uuid,
        from: Identity,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Response to `get-group-messages`.
    #[serde(rename_all = "camelCase")]
    GroupMessages {
        group_id: Uuid,
        messages: Vec<MessageView>,
    },

    /// A group's metadata or membership changed.
    GroupUpdated(Group),

    /// The receiver was removed from (or left) a group.
    #[serde(rename_all = "camelCase")]
    MemberRemoved {
        group_id: Uuid,
        removed_member: Identity,
    },

    /// A group was deleted.
    GroupDeleted(Uuid),

    /// A relayed file descriptor.
    #[serde(rename_all = "camelCase")]
    ReceiveFile {
        from: Identity,
        file_info: FileDescriptor,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<Identity>,
    },
}

impl ServerEvent {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientEvent {
    /// Parse a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
