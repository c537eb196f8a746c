//! CRUD operations for [`Group`] records.
//!
//! A group row holds the scalar fields; the order-preserving participant
//! list lives in the `group_members` table, keyed by `(group_id, email)`
//! with an explicit `position` column so membership order survives storage.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use courier_shared::types::Group;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new group together with its participant list.
    pub fn create_group(&self, group: &Group) -> Result<()> {
        let tx = self.conn().unchecked_transaction()?;

        tx.execute(
            "INSERT INTO groups (id, name, description, admin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                group.id.to_string(),
                group.name,
                group.description,
                group.admin,
                group.created_at.to_rfc3339(),
            ],
        )?;

        insert_members(&tx, group.id, &group.participants)?;

        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single group by UUID, participants included.
    pub fn get_group(&self, id: Uuid) -> Result<Group> {
        let mut group = self
            .conn()
            .query_row(
                "SELECT id, name, description, admin, created_at
                 FROM groups
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_group,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        group.participants = self.group_participants(id)?;
        Ok(group)
    }

    /// List all groups a given identity participates in, newest first.
    pub fn groups_for_participant(&self, email: &str) -> Result<Vec<Group>> {
        let mut stmt = self.conn().prepare(
            "SELECT g.id, g.name, g.description, g.admin, g.created_at
             FROM groups g
             JOIN group_members m ON m.group_id = g.id
             WHERE m.email = ?1
             ORDER BY g.created_at DESC",
        )?;

        let rows = stmt.query_map(params![email], row_to_group)?;

        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        for group in &mut groups {
            group.participants = self.group_participants(group.id)?;
        }
        Ok(groups)
    }

    /// Participant emails of a group, in insertion order.
    fn group_participants(&self, group_id: Uuid) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT email FROM group_members
             WHERE group_id = ?1
             ORDER BY position ASC",
        )?;

        let rows = stmt.query_map(params![group_id.to_string()], |row| row.get(0))?;

        let mut emails = Vec::new();
        for row in rows {
            emails.push(row?);
        }
        Ok(emails)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite a group's name and description.  Participants and admin are
    /// untouched.  Returns `false` if the group does not exist.
    pub fn update_group_info(&self, id: Uuid, name: &str, description: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE groups SET name = ?2, description = ?3 WHERE id = ?1",
            params![id.to_string(), name, description],
        )?;
        Ok(affected > 0)
    }

    /// Replace a group's participant list, preserving the given order.
    pub fn set_group_participants(&self, id: Uuid, participants: &[String]) -> Result<()> {
        let tx = self.conn().unchecked_transaction()?;

        tx.execute(
            "DELETE FROM group_members WHERE group_id = ?1",
            params![id.to_string()],
        )?;
        insert_members(&tx, id, participants)?;

        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a group by UUID.  Member rows cascade.  Returns `true` if a
    /// row was deleted.
    pub fn delete_group(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM groups WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Insert participant rows with sequential positions.
fn insert_members(
    tx: &rusqlite::Transaction<'_>,
    group_id: Uuid,
    participants: &[String],
) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO group_members (group_id, position, email)
         VALUES (?1, ?2, ?3)",
    )?;
    for (position, email) in participants.iter().enumerate() {
        stmt.execute(params![group_id.to_string(), position as i64, email])?;
    }
    Ok(())
}

/// Map a `rusqlite::Row` to a [`Group`] with an empty participant list.
fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let description: String = row.get(2)?;
    let admin: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Group {
        id,
        name,
        description,
        participants: Vec::new(),
        admin,
        created_at,
    })
}
