//! CRUD operations for [`User`] and [`SampleSource`] records.

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{time_at, uuid_at, SampleSource, User};

impl Database {
    /// Insert a new user. Usernames are unique.
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, username, created_at) VALUES (?1, ?2, ?3)",
                params![user.id.to_string(), user.username, user.created_at.to_rfc3339()],
            )
            .map_err(|e| StoreError::from_write(e, &user.username))?;
        Ok(())
    }

    pub fn get_user(&self, id: Uuid) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, username, created_at FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(User {
                        id: uuid_at(row, 0)?,
                        username: row.get(1)?,
                        created_at: time_at(row, 2)?,
                    })
                },
            )
            .map_err(StoreError::from_read)
    }

    pub fn create_source(&self, source: &SampleSource) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO sample_sources (id, user_id, name, link, descr, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    source.id.to_string(),
                    source.user_id.to_string(),
                    source.name,
                    source.link,
                    source.descr,
                    source.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| StoreError::from_write(e, &source.name))?;
        Ok(())
    }

    pub fn get_source(&self, id: Uuid) -> Result<SampleSource> {
        self.conn()
            .query_row(
                "SELECT id, user_id, name, link, descr, created_at
                 FROM sample_sources
                 WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(SampleSource {
                        id: uuid_at(row, 0)?,
                        user_id: uuid_at(row, 1)?,
                        name: row.get(2)?,
                        link: row.get(3)?,
                        descr: row.get(4)?,
                        created_at: time_at(row, 5)?,
                    })
                },
            )
            .map_err(StoreError::from_read)
    }

    /// Delete a user. Their channels, sources and notifications go with
    /// them; their samples stay, unowned.
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// Only used by sibling test modules to keep fixtures short.
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::models::{Channel, SampleSource, User};
    use crate::Database;

    pub fn user(db: &Database, username: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            created_at: Utc::now(),
        };
        db.create_user(&user).unwrap();
        user
    }

    pub fn source(db: &Database, owner: &User, name: &str) -> SampleSource {
        let source = SampleSource {
            id: Uuid::new_v4(),
            user_id: owner.id,
            name: name.to_string(),
            link: Some("https://honeynet.example.org".to_string()),
            descr: None,
            created_at: Utc::now(),
        };
        db.create_source(&source).unwrap();
        source
    }

    /// Write a raw port value, bypassing the `u16` in [`Channel`].
    pub fn set_port(db: &Database, channel_id: Uuid, port: i64) {
        db.conn()
            .execute(
                "UPDATE channels SET port = ?2 WHERE id = ?1",
                rusqlite::params![channel_id.to_string(), port],
            )
            .unwrap();
    }

    pub fn channel(owner: &User, name: &str) -> Channel {
        let now = Utc::now();
        Channel {
            id: Uuid::new_v4(),
            owner_id: owner.id,
            name: name.to_string(),
            host: "feeds.example.org".to_string(),
            port: 10000,
            subchans: "dionaea.capture".to_string(),
            pubchans: "mazu.samples".to_string(),
            ident: "sensor-1".to_string(),
            secret: "s3cret".to_string(),
            is_default: false,
            source_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
