//! Group lifecycle management.
//!
//! Validates and applies every group mutation against the store, then fans
//! out the resulting notifications through the [`Router`].  A group moves
//! through exactly three states: non-existent -> active -> deleted
//! (terminal).
//!
//! Two invariants hold for every active group: the admin is always a
//! participant, and the admin identity never changes after creation.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use courier_shared::constants::GROUP_HISTORY_LIMIT;
use courier_shared::protocol::ServerEvent;
use courier_shared::types::{Group, GroupMessage, Identity, MessageView};
use courier_store::{Database, StoreError};

use crate::error::RelayError;
use crate::router::Router;

/// Applies group lifecycle operations and notifies affected members.
pub struct GroupManager {
    store: Arc<Mutex<Database>>,
    router: Router,
}

impl GroupManager {
    pub fn new(store: Arc<Mutex<Database>>, router: Router) -> Self {
        Self { store, router }
    }

    /// Load a group or translate its absence into the relay taxonomy.
    async fn load_group(&self, group_id: Uuid) -> Result<Group, RelayError> {
        let db = self.store.lock().await;
        match db.get_group(group_id) {
            Ok(group) => Ok(group),
            Err(StoreError::NotFound) => {
                Err(RelayError::NotFound("Group not found".to_string()))
            }
            Err(other) => Err(RelayError::Storage(other)),
        }
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a group and notify every participant with `new-group`.
    ///
    /// The admin is appended to the participant list when missing, so the
    /// admin-is-a-participant invariant holds from the moment the group is
    /// persisted.
    pub async fn create(
        &self,
        name: &str,
        description: &str,
        participants: Vec<Identity>,
        admin: &str,
    ) -> Result<Group, RelayError> {
        if name.trim().is_empty() || participants.is_empty() || admin.trim().is_empty() {
            return Err(RelayError::Validation(
                "Missing required fields".to_string(),
            ));
        }

        // Dedup by identity equality, preserving first-seen order.
        let mut members: Vec<Identity> = Vec::new();
        for participant in participants {
            if !members.contains(&participant) {
                members.push(participant);
            }
        }
        if !members.iter().any(|m| m == admin) {
            members.push(admin.to_string());
        }

        let group = Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            participants: members,
            admin: admin.to_string(),
            created_at: Utc::now(),
        };

        {
            let db = self.store.lock().await;
            db.create_group(&group)?;
        }

        self.router
            .deliver_to_many(&group.participants, &ServerEvent::NewGroup(group.clone()))
            .await;

        info!(
            group = %group.id,
            name = %group.name,
            participants = group.participants.len(),
            "group created"
        );
        Ok(group)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Add members to a group.  Admin only.
    ///
    /// Members already present are filtered out; if nothing remains the
    /// operation is a no-op error and the participant list is unchanged.
    pub async fn add_members(
        &self,
        group_id: Uuid,
        new_members: Vec<Identity>,
        acting: &str,
    ) -> Result<Group, RelayError> {
        let mut group = self.load_group(group_id).await?;

        if group.admin != acting {
            return Err(RelayError::Forbidden(
                "Only admin can add members".to_string(),
            ));
        }

        let mut to_add: Vec<Identity> = Vec::new();
        for member in new_members {
            if !group.is_participant(&member) && !to_add.contains(&member) {
                to_add.push(member);
            }
        }

        if to_add.is_empty() {
            return Err(RelayError::NoOp(
                "All selected users are already members".to_string(),
            ));
        }

        let added = to_add.len();
        group.participants.extend(to_add);

        {
            let db = self.store.lock().await;
            db.set_group_participants(group.id, &group.participants)?;
        }

        // Everyone, new members included, sees the updated group.
        self.router
            .deliver_to_many(
                &group.participants,
                &ServerEvent::GroupUpdated(group.clone()),
            )
            .await;

        info!(group = %group.id, added, "members added to group");
        Ok(group)
    }

    /// Remove a member from a group.  Admin only; the admin itself can
    /// never be removed.
    pub async fn remove_member(
        &self,
        group_id: Uuid,
        target: &str,
        acting: &str,
    ) -> Result<Group, RelayError> {
        let group = self.load_group(group_id).await?;

        if group.admin != acting {
            return Err(RelayError::Forbidden(
                "Only admin can remove members".to_string(),
            ));
        }
        if !group.is_participant(target) {
            return Err(RelayError::NotFound(
                "User is not a member of this group".to_string(),
            ));
        }
        if target == group.admin {
            return Err(RelayError::Forbidden(
                "Cannot remove admin from group".to_string(),
            ));
        }

        let group = self.evict(group, target).await?;
        info!(group = %group.id, member = %target, "member removed from group");
        Ok(group)
    }

    /// Leave a group.  Self-initiated; the admin cannot leave.
    pub async fn leave(&self, group_id: Uuid, member: &str) -> Result<Group, RelayError> {
        let group = self.load_group(group_id).await?;

        if !group.is_participant(member) {
            return Err(RelayError::NotFound(
                "You are not a member of this group".to_string(),
            ));
        }
        if member == group.admin {
            return Err(RelayError::Forbidden(
                "Admin cannot leave group. Transfer ownership or delete the group.".to_string(),
            ));
        }

        let group = self.evict(group, member).await?;
        info!(group = %group.id, member = %member, "member left group");
        Ok(group)
    }

    /// Shared removal path: persist the shrunken participant list, tell the
    /// removed identity, then tell the remaining participants.
    async fn evict(&self, mut group: Group, member: &str) -> Result<Group, RelayError> {
        group.participants.retain(|p| p != member);

        {
            let db = self.store.lock().await;
            db.set_group_participants(group.id, &group.participants)?;
        }

        // Dedicated notification so the removed member's client can drop
        // the group view.
        self.router
            .deliver_to_one(
                member,
                ServerEvent::MemberRemoved {
                    group_id: group.id,
                    removed_member: member.to_string(),
                },
            )
            .await;

        self.router
            .deliver_to_many(
                &group.participants,
                &ServerEvent::GroupUpdated(group.clone()),
            )
            .await;

        Ok(group)
    }

    // ------------------------------------------------------------------
    // Update / delete
    // ------------------------------------------------------------------

    /// Overwrite a group's name and description.  Admin only; participants
    /// and admin are untouched.
    pub async fn update(
        &self,
        group_id: Uuid,
        name: &str,
        description: &str,
        acting: &str,
    ) -> Result<Group, RelayError> {
        let mut group = self.load_group(group_id).await?;

        if group.admin != acting {
            return Err(RelayError::Forbidden(
                "Only admin can update group".to_string(),
            ));
        }

        group.name = name.to_string();
        group.description = description.to_string();

        {
            let db = self.store.lock().await;
            db.update_group_info(group.id, &group.name, &group.description)?;
        }

        self.router
            .deliver_to_many(
                &group.participants,
                &ServerEvent::GroupUpdated(group.clone()),
            )
            .await;

        info!(group = %group.id, name = %group.name, "group updated");
        Ok(group)
    }

    /// Delete a group, cascading its message log.  Admin only.
    ///
    /// Participants are notified before the group record is deleted, so
    /// clients see `group-deleted` even if the final delete fails.  That
    /// ordering is deliberate and preserved as-is.
    pub async fn delete(&self, group_id: Uuid, acting: &str) -> Result<(), RelayError> {
        let group = self.load_group(group_id).await?;

        if group.admin != acting {
            return Err(RelayError::Forbidden(
                "Only admin can delete group".to_string(),
            ));
        }

        {
            let db = self.store.lock().await;
            db.delete_group_messages(group.id)?;
        }

        self.router
            .deliver_to_many(&group.participants, &ServerEvent::GroupDeleted(group.id))
            .await;

        {
            let db = self.store.lock().await;
            db.delete_group(group.id)?;
        }

        info!(group = %group.id, name = %group.name, "group deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Persist a group message and fan it out to every participant.
    pub async fn send_message(
        &self,
        group_id: Uuid,
        sender: &str,
        text: &str,
    ) -> Result<GroupMessage, RelayError> {
        let group = self.load_group(group_id).await?;

        if !group.is_participant(sender) {
            return Err(RelayError::Forbidden(
                "Not a group participant".to_string(),
            ));
        }

        let message = GroupMessage {
            id: Uuid::new_v4(),
            group_id,
            sender: sender.to_string(),
            message: text.to_string(),
            timestamp: Utc::now(),
        };

        {
            let db = self.store.lock().await;
            db.insert_group_message(&message)?;
        }

        self.router
            .deliver_to_many(
                &group.participants,
                &ServerEvent::ReceiveGroupMessage {
                    group_id,
                    from: message.sender.clone(),
                    message: message.message.clone(),
                    timestamp: message.timestamp,
                },
            )
            .await;

        Ok(message)
    }

    /// Recent message history for a group, oldest first.
    ///
    /// A group with no messages -- including one that was just deleted --
    /// yields an empty list rather than an error.
    pub async fn fetch_messages(&self, group_id: Uuid) -> Result<Vec<MessageView>, RelayError> {
        let db = self.store.lock().await;
        let messages = db.recent_group_messages(group_id, GROUP_HISTORY_LIMIT)?;
        Ok(messages.into_iter().map(MessageView::from).collect())
    }

    /// All groups the given identity participates in.
    pub async fn groups_for(&self, identity: &str) -> Result<Vec<Group>, RelayError> {
        let db = self.store.lock().await;
        Ok(db.groups_for_participant(identity)?)
    }
}
