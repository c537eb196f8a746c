//! CRUD operations for [`User`] records.
//!
//! The users table is a historical record of which connection id each
//! identity last registered with.  Routing decisions never read it; the
//! in-memory registry is authoritative for liveness.

use rusqlite::params;

use courier_shared::types::User;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert or update the last-known connection id for an identity.
    pub fn upsert_user(&self, email: &str, socket: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (email, socket) VALUES (?1, ?2)
             ON CONFLICT(email) DO UPDATE SET socket = excluded.socket",
            params![email, socket],
        )?;
        Ok(())
    }

    /// List all known users, ordered by email.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT email, socket, name FROM users ORDER BY email ASC")?;

        let rows = stmt.query_map([], |row| {
            Ok(User {
                email: row.get(0)?,
                socket: row.get(1)?,
                name: row.get(2)?,
            })
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Return every (email, last-known connection id) pair.
    pub fn user_socket_map(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn().prepare("SELECT email, socket FROM users")?;

        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row?);
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_overwrites_socket() {
        let db = Database::open_in_memory().unwrap();

        db.upsert_user("a@x.com", "conn-1").unwrap();
        db.upsert_user("a@x.com", "conn-2").unwrap();

        let pairs = db.user_socket_map().unwrap();
        assert_eq!(pairs, vec![("a@x.com".to_string(), "conn-2".to_string())]);
    }

    #[test]
    fn list_users_is_sorted() {
        let db = Database::open_in_memory().unwrap();

        db.upsert_user("b@x.com", "c2").unwrap();
        db.upsert_user("a@x.com", "c1").unwrap();

        let users = db.list_users().unwrap();
        let emails: Vec<_> = users.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.com", "b@x.com"]);
    }
}
