//! CRUD operations for [`Notification`] records.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{time_at, uuid_at, Notification};

impl Database {
    pub fn create_notification(&self, notification: &Notification) -> Result<()> {
        self.conn().execute(
            "INSERT INTO notifications (id, user_id, subject, message, read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                notification.id.to_string(),
                notification.user_id.to_string(),
                notification.subject,
                notification.message,
                notification.read,
                notification.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Unread notifications for a user, oldest first.
    pub fn list_unread_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, subject, message, read, created_at
             FROM notifications
             WHERE user_id = ?1 AND read = 0
             ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            Ok(Notification {
                id: uuid_at(row, 0)?,
                user_id: uuid_at(row, 1)?,
                subject: row.get(2)?,
                message: row.get(3)?,
                read: row.get(4)?,
                created_at: time_at(row, 5)?,
            })
        })?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    pub fn mark_notification_read(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1 AND read = 0",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::fixtures;

    #[test]
    fn unread_then_read() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");

        let note = Notification::new(alice.id, "You got a new sample", "abc123");
        db.create_notification(&note).unwrap();
        assert_eq!(db.list_unread_notifications(alice.id).unwrap(), vec![note.clone()]);

        assert!(db.mark_notification_read(note.id).unwrap());
        assert!(db.list_unread_notifications(alice.id).unwrap().is_empty());
    }

    #[test]
    fn unknown_user_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let note = Notification::new(Uuid::new_v4(), "subject", "body");
        assert!(db.create_notification(&note).is_err());
    }
}
