use gelbfeld_types::models::RelationshipStatus;
use rusqlite::{Connection, Row};
use tracing::info;
use uuid::Uuid;

use crate::identities::query_identity_by_identifier;
use crate::models::{IdentityRow, PendingRow, RelationshipRow};
use crate::{Database, OptionalExt, StoreError};

/// Canonical ordering of an unordered pair, matching the `user_low < user_high`
/// table constraint.
fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

impl Database {
    // -- Transitions --

    /// none/rejected -> pending(requester).
    ///
    /// A rejected row for the pair is deleted and replaced; a pending or
    /// accepted row in either direction fails with `AlreadyActive`. The
    /// partial unique index on the canonical pair backs the check, so a racing
    /// insert from another process surfaces as the same error.
    pub fn request_friendship(
        &self,
        requester_id: &str,
        target_identifier: &str,
    ) -> Result<RelationshipRow, StoreError> {
        let id = Uuid::new_v4().to_string();

        let row = self
            .with_tx(|tx| {
                let target = query_identity_by_identifier(tx, target_identifier)?
                    .ok_or(StoreError::TargetNotFound)?;
                if target.id == requester_id {
                    return Err(StoreError::SelfRequest);
                }

                let (low, high) = canonical_pair(requester_id, &target.id);

                let active: bool = tx.query_row(
                    "SELECT EXISTS(
                        SELECT 1 FROM relationships
                        WHERE user_low = ?1 AND user_high = ?2 AND status IN ('pending', 'accepted')
                    )",
                    [low, high],
                    |r| r.get(0),
                )?;
                if active {
                    return Err(StoreError::AlreadyActive);
                }

                tx.execute(
                    "DELETE FROM relationships WHERE user_low = ?1 AND user_high = ?2 AND status = 'rejected'",
                    [low, high],
                )?;

                tx.execute(
                    "INSERT INTO relationships (id, user_low, user_high, requester_id, recipient_id, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'pending')",
                    (&id, low, high, requester_id, &target.id),
                )?;

                query_relationship(tx, &id)?.ok_or(StoreError::RelationshipNotFound)
            })
            .map_err(|e| e.or_conflict(StoreError::AlreadyActive))?;

        info!(
            "Friend request {} from {} to {}",
            row.id, row.requester_id, row.recipient_id
        );
        Ok(row)
    }

    /// pending -> accepted | rejected. Only the recipient may respond.
    pub fn respond_to_request(
        &self,
        relationship_id: &str,
        recipient_id: &str,
        accept: bool,
    ) -> Result<(), StoreError> {
        let status = if accept {
            RelationshipStatus::Accepted
        } else {
            RelationshipStatus::Rejected
        };

        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE relationships SET status = ?1, updated_at = datetime('now')
                 WHERE id = ?2 AND recipient_id = ?3 AND status = 'pending'",
                (status.as_str(), relationship_id, recipient_id),
            )?;
            if changed == 0 {
                return Err(StoreError::RelationshipNotFound);
            }
            Ok(())
        })?;

        info!("Friend request {} {}", relationship_id, status);
        Ok(())
    }

    /// Withdraw a pending request. Only the requester may cancel.
    pub fn cancel_request(&self, relationship_id: &str, requester_id: &str) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let deleted = tx.execute(
                "DELETE FROM relationships WHERE id = ?1 AND requester_id = ?2 AND status = 'pending'",
                [relationship_id, requester_id],
            )?;
            if deleted == 0 {
                return Err(StoreError::RelationshipNotFound);
            }
            Ok(())
        })?;

        info!("Friend request {} cancelled", relationship_id);
        Ok(())
    }

    /// Remove an accepted friendship between the caller and another identity.
    /// Either side may remove; the row is deleted, not marked.
    pub fn remove_friend(&self, caller_id: &str, other_identifier: &str) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let other = query_identity_by_identifier(tx, other_identifier)?
                .ok_or(StoreError::RelationshipNotFound)?;
            let (low, high) = canonical_pair(caller_id, &other.id);

            let deleted = tx.execute(
                "DELETE FROM relationships WHERE user_low = ?1 AND user_high = ?2 AND status = 'accepted'",
                [low, high],
            )?;
            if deleted == 0 {
                return Err(StoreError::RelationshipNotFound);
            }
            info!("Friendship between {} and {} removed", caller_id, other.id);
            Ok(())
        })
    }

    // -- Reads --

    /// Identities with an accepted relationship to `identity_id`, in either
    /// direction, ordered by username.
    pub fn list_friends(&self, identity_id: &str) -> Result<Vec<IdentityRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT i.id, i.username, i.email, i.password, i.created_at
                 FROM relationships r
                 JOIN identities i
                   ON i.id = CASE WHEN r.user_low = ?1 THEN r.user_high ELSE r.user_low END
                 WHERE (r.user_low = ?1 OR r.user_high = ?1) AND r.status = 'accepted'
                 ORDER BY i.username",
            )?;

            let rows = stmt
                .query_map([identity_id], |row| {
                    Ok(IdentityRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        email: row.get(2)?,
                        password: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Pending requests addressed to `identity_id`, oldest first.
    pub fn list_incoming_requests(&self, identity_id: &str) -> Result<Vec<PendingRow>, StoreError> {
        self.with_conn(|conn| {
            query_pending(
                conn,
                "SELECT r.id, i.id, i.username, r.created_at
                 FROM relationships r
                 JOIN identities i ON i.id = r.requester_id
                 WHERE r.recipient_id = ?1 AND r.status = 'pending'
                 ORDER BY r.created_at, r.rowid",
                identity_id,
            )
        })
    }

    /// Pending requests sent by `identity_id`, oldest first.
    pub fn list_outgoing_requests(&self, identity_id: &str) -> Result<Vec<PendingRow>, StoreError> {
        self.with_conn(|conn| {
            query_pending(
                conn,
                "SELECT r.id, i.id, i.username, r.created_at
                 FROM relationships r
                 JOIN identities i ON i.id = r.recipient_id
                 WHERE r.requester_id = ?1 AND r.status = 'pending'
                 ORDER BY r.created_at, r.rowid",
                identity_id,
            )
        })
    }

    pub fn status_between(&self, a: &str, b: &str) -> Result<RelationshipStatus, StoreError> {
        self.with_conn(|conn| query_status_between(conn, a, b))
    }
}

fn relationship_from_row(row: &Row<'_>) -> rusqlite::Result<RelationshipRow> {
    Ok(RelationshipRow {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        recipient_id: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_relationship(conn: &Connection, id: &str) -> Result<Option<RelationshipRow>, StoreError> {
    conn.query_row(
        "SELECT id, requester_id, recipient_id, status, created_at FROM relationships WHERE id = ?1",
        [id],
        relationship_from_row,
    )
    .optional()
}

fn query_pending(conn: &Connection, sql: &str, identity_id: &str) -> Result<Vec<PendingRow>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([identity_id], |row| {
            Ok(PendingRow {
                relationship_id: row.get(0)?,
                user_id: row.get(1)?,
                username: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Active rows take precedence; a pair with only rejected rows reports
/// `Rejected`, and a pair with no rows `None`.
pub(crate) fn query_status_between(
    conn: &Connection,
    a: &str,
    b: &str,
) -> Result<RelationshipStatus, StoreError> {
    let (low, high) = canonical_pair(a, b);
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM relationships
             WHERE user_low = ?1 AND user_high = ?2
             ORDER BY CASE status WHEN 'accepted' THEN 0 WHEN 'pending' THEN 1 ELSE 2 END
             LIMIT 1",
            [low, high],
            |r| r.get(0),
        )
        .optional()?;

    match status {
        None => Ok(RelationshipStatus::None),
        Some(s) => s
            .parse()
            .map_err(|e: String| StoreError::unavailable(format!("corrupt relationship row: {e}"))),
    }
}
