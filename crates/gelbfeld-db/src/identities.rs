use rusqlite::{Connection, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::IdentityRow;
use crate::{Database, OptionalExt, StoreError};

const IDENTITY_COLUMNS: &str = "id, username, email, password, created_at";

impl Database {
    /// Insert a new identity. Username and email are both unique under
    /// case-insensitive comparison; the stored casing is kept for display.
    /// Both must be ASCII, since `COLLATE NOCASE` folds ASCII only.
    pub fn create_identity(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<IdentityRow, StoreError> {
        if !username.is_ascii() || !email.is_ascii() {
            return Err(StoreError::InvalidInput(
                "username and email must be ASCII".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();

        let row = self
            .with_tx(|tx| {
                let username_taken: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM identities WHERE username = ?1)",
                    [username],
                    |r| r.get(0),
                )?;
                if username_taken {
                    return Err(StoreError::UsernameTaken);
                }

                let email_taken: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM identities WHERE email = ?1)",
                    [email],
                    |r| r.get(0),
                )?;
                if email_taken {
                    return Err(StoreError::EmailTaken);
                }

                tx.execute(
                    "INSERT INTO identities (id, username, email, password) VALUES (?1, ?2, ?3, ?4)",
                    (&id, username, email, password_hash),
                )?;

                query_identity_by_id(tx, &id)?.ok_or(StoreError::IdentityNotFound)
            })
            .map_err(|e| match e {
                StoreError::UniqueViolation(msg) if msg.contains("identities.email") => {
                    StoreError::EmailTaken
                }
                other => other.or_conflict(StoreError::UsernameTaken),
            })?;

        info!("Registered identity {} ({})", row.username, row.id);
        Ok(row)
    }

    /// Look up an identity by username or email, case-insensitively.
    pub fn find_identity_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<IdentityRow>, StoreError> {
        self.with_conn(|conn| query_identity_by_identifier(conn, identifier))
    }

    pub fn find_identity_by_id(&self, id: &str) -> Result<Option<IdentityRow>, StoreError> {
        self.with_conn(|conn| query_identity_by_id(conn, id))
    }
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<IdentityRow> {
    Ok(IdentityRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub(crate) fn query_identity_by_id(
    conn: &Connection,
    id: &str,
) -> Result<Option<IdentityRow>, StoreError> {
    conn.query_row(
        &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = ?1"),
        [id],
        identity_from_row,
    )
    .optional()
}

/// Username matches win over email matches; usernames cannot contain '@' so
/// in practice at most one row matches.
pub(crate) fn query_identity_by_identifier(
    conn: &Connection,
    identifier: &str,
) -> Result<Option<IdentityRow>, StoreError> {
    conn.query_row(
        &format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities
             WHERE username = ?1 OR email = ?1
             ORDER BY (username = ?1) DESC
             LIMIT 1"
        ),
        [identifier],
        identity_from_row,
    )
    .optional()
}

/// Resolve a user reference given either as an identity id or as a
/// username/email.
pub(crate) fn query_identity_by_reference(
    conn: &Connection,
    reference: &str,
) -> Result<Option<IdentityRow>, StoreError> {
    match query_identity_by_id(conn, reference)? {
        Some(row) => Ok(Some(row)),
        None => query_identity_by_identifier(conn, reference),
    }
}
