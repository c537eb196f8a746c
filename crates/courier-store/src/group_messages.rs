//! Operations on the append-only per-group message log.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use courier_shared::types::GroupMessage;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Append a message to a group's log.
    pub fn insert_group_message(&self, message: &GroupMessage) -> Result<()> {
        self.conn().execute(
            "INSERT INTO group_messages (id, group_id, sender, message, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id.to_string(),
                message.group_id.to_string(),
                message.sender,
                message.message,
                message.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The `limit` most recent messages for a group, returned oldest first.
    pub fn recent_group_messages(&self, group_id: Uuid, limit: u32) -> Result<Vec<GroupMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, group_id, sender, message, timestamp
             FROM group_messages
             WHERE group_id = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![group_id.to_string(), limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        // Newest-first from the query; the caller wants chronological order.
        messages.reverse();
        Ok(messages)
    }

    /// Delete every message belonging to a group.  Returns the number of
    /// rows removed.
    pub fn delete_group_messages(&self, group_id: Uuid) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM group_messages WHERE group_id = ?1",
            params![group_id.to_string()],
        )?;
        Ok(affected)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupMessage> {
    let id_str: String = row.get(0)?;
    let group_id_str: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let message: String = row.get(3)?;
    let ts_str: String = row.get(4)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let group_id = Uuid::parse_str(&group_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(GroupMessage {
        id,
        group_id,
        sender,
        message,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use courier_shared::types::Group;

    fn setup_group(db: &Database) -> Uuid {
        let group = Group {
            id: Uuid::new_v4(),
            name: "G".to_string(),
            description: String::new(),
            participants: vec!["a@x.com".to_string()],
            admin: "a@x.com".to_string(),
            created_at: Utc::now(),
        };
        db.create_group(&group).unwrap();
        group.id
    }

    fn message_at(group_id: Uuid, n: i64) -> GroupMessage {
        GroupMessage {
            id: Uuid::new_v4(),
            group_id,
            sender: "a@x.com".to_string(),
            message: format!("msg {n}"),
            timestamp: Utc::now() + Duration::seconds(n),
        }
    }

    #[test]
    fn recent_returns_chronological_order() {
        let db = Database::open_in_memory().unwrap();
        let group_id = setup_group(&db);

        for n in 0..5 {
            db.insert_group_message(&message_at(group_id, n)).unwrap();
        }

        let messages = db.recent_group_messages(group_id, 50).unwrap();
        assert_eq!(messages.len(), 5);
        for pair in messages.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        assert_eq!(messages[0].message, "msg 0");
        assert_eq!(messages[4].message, "msg 4");
    }

    #[test]
    fn recent_keeps_newest_when_over_limit() {
        let db = Database::open_in_memory().unwrap();
        let group_id = setup_group(&db);

        for n in 0..60 {
            db.insert_group_message(&message_at(group_id, n)).unwrap();
        }

        let messages = db.recent_group_messages(group_id, 50).unwrap();
        assert_eq!(messages.len(), 50);
        // The 10 oldest were cut; the window starts at msg 10.
        assert_eq!(messages[0].message, "msg 10");
        assert_eq!(messages[49].message, "msg 59");
    }

    #[test]
    fn delete_empties_the_log() {
        let db = Database::open_in_memory().unwrap();
        let group_id = setup_group(&db);

        for n in 0..3 {
            db.insert_group_message(&message_at(group_id, n)).unwrap();
        }

        assert_eq!(db.delete_group_messages(group_id).unwrap(), 3);
        assert!(db.recent_group_messages(group_id, 50).unwrap().is_empty());
    }
}
