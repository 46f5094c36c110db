use rusqlite::Connection;
use tracing::info;

use crate::models::ProfileRow;
use crate::{Database, OptionalExt, StoreError};

impl Database {
    pub fn get_profile(&self, identity_id: &str) -> Result<Option<ProfileRow>, StoreError> {
        self.with_conn(|conn| query_profile(conn, identity_id))
    }

    /// Update whichever profile fields are given; `None` leaves a field as is.
    pub fn update_profile(
        &self,
        identity_id: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        bio: Option<&str>,
    ) -> Result<ProfileRow, StoreError> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO profiles (identity_id, first_name, last_name, bio)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(identity_id) DO UPDATE SET
                    first_name = COALESCE(excluded.first_name, profiles.first_name),
                    last_name  = COALESCE(excluded.last_name, profiles.last_name),
                    bio        = COALESCE(excluded.bio, profiles.bio),
                    updated_at = datetime('now')",
                (identity_id, first_name, last_name, bio),
            )?;
            query_profile(tx, identity_id)?.ok_or(StoreError::IdentityNotFound)
        })
    }

    pub fn get_bio(&self, identity_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_profile(identity_id)?.and_then(|p| p.bio))
    }

    pub fn set_bio(&self, identity_id: &str, bio: &str) -> Result<(), StoreError> {
        self.update_profile(identity_id, None, None, Some(bio))?;
        Ok(())
    }

    /// Record that a picture of `content_type` is stored for the identity.
    /// The bytes themselves live outside the database.
    /// Record the picture's content type (`None` clears it) and return the
    /// one it replaced.
    pub fn set_picture_content_type(
        &self,
        identity_id: &str,
        content_type: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        let previous = self.with_tx(|tx| {
            let previous: Option<Option<String>> = tx
                .query_row(
                    "SELECT picture_content_type FROM profiles WHERE identity_id = ?1",
                    [identity_id],
                    |r| r.get(0),
                )
                .optional()?;
            tx.execute(
                "INSERT INTO profiles (identity_id, picture_content_type) VALUES (?1, ?2)
                 ON CONFLICT(identity_id) DO UPDATE SET
                    picture_content_type = excluded.picture_content_type,
                    updated_at = datetime('now')",
                (identity_id, content_type),
            )?;
            Ok(previous.flatten())
        })?;

        info!("Profile picture updated for {}", identity_id);
        Ok(previous)
    }
}

fn query_profile(conn: &Connection, identity_id: &str) -> Result<Option<ProfileRow>, StoreError> {
    conn.query_row(
        "SELECT identity_id, first_name, last_name, bio, picture_content_type
         FROM profiles WHERE identity_id = ?1",
        [identity_id],
        |row| {
            Ok(ProfileRow {
                identity_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                bio: row.get(3)?,
                picture_content_type: row.get(4)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use crate::StoreError;
    use crate::testing::{temp_db, user};

    #[test]
    fn partial_updates_keep_other_fields() {
        let (db, _dir) = temp_db();
        let ana = user(&db, "ana");

        assert!(db.get_profile(&ana.id).unwrap().is_none());
        assert!(db.get_bio(&ana.id).unwrap().is_none());

        db.update_profile(&ana.id, Some("Ana"), Some("Lopez"), None).unwrap();
        db.set_bio(&ana.id, "plays every Friday").unwrap();

        let profile = db.get_profile(&ana.id).unwrap().unwrap();
        assert_eq!(profile.first_name.as_deref(), Some("Ana"));
        assert_eq!(profile.last_name.as_deref(), Some("Lopez"));
        assert_eq!(profile.bio.as_deref(), Some("plays every Friday"));
        assert!(profile.picture_content_type.is_none());

        assert_eq!(db.set_picture_content_type(&ana.id, Some("image/png")).unwrap(), None);
        let profile = db.get_profile(&ana.id).unwrap().unwrap();
        assert_eq!(profile.picture_content_type.as_deref(), Some("image/png"));
        assert_eq!(profile.bio.as_deref(), Some("plays every Friday"));
    }

    #[test]
    fn picture_content_type_returns_previous() {
        let (db, _dir) = temp_db();
        let ana = user(&db, "ana");

        db.set_picture_content_type(&ana.id, Some("image/png")).unwrap();
        let previous = db.set_picture_content_type(&ana.id, Some("image/webp")).unwrap();
        assert_eq!(previous.as_deref(), Some("image/png"));

        let previous = db.set_picture_content_type(&ana.id, None).unwrap();
        assert_eq!(previous.as_deref(), Some("image/webp"));
        assert!(db.get_profile(&ana.id).unwrap().unwrap().picture_content_type.is_none());
    }

    #[test]
    fn profile_requires_existing_identity() {
        let (db, _dir) = temp_db();
        let err = db.set_bio("nobody", "hi").unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
    }
}
