use std::collections::HashSet;

use gelbfeld_types::models::PlayerSpec;
use rusqlite::{Connection, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identities::{query_identity_by_id, query_identity_by_reference};
use crate::models::{CounterMismatchRow, PlayerRef, RoundDetail, RoundPlayerRow, RoundRow, Scoreboard};
use crate::{Database, OptionalExt, StoreError};

const MAX_ROUND_NAME_LEN: usize = 64;
const MAX_GUEST_NAME_LEN: usize = 32;

impl Database {
    /// Create a round owned by `creator_id`.
    ///
    /// The creator is always enrolled first, followed by `players` in order.
    /// User references that resolve to nobody are skipped; a registered user
    /// listed twice (or the creator listed again) is enrolled once. Two
    /// entries whose display names collide case-insensitively fail with
    /// `DuplicatePlayer`, as does a guest whose name is already a player in the
    /// creator's existing round of the same name.
    pub fn create_round(
        &self,
        creator_id: &str,
        name: &str,
        players: &[PlayerSpec],
    ) -> Result<RoundDetail, StoreError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_ROUND_NAME_LEN {
            return Err(StoreError::InvalidInput(format!(
                "round name must be 1-{MAX_ROUND_NAME_LEN} characters"
            )));
        }

        let round_id = Uuid::new_v4().to_string();

        let detail = self
            .with_tx(|tx| {
                let creator =
                    query_identity_by_id(tx, creator_id)?.ok_or(StoreError::IdentityNotFound)?;

                let mut enrolled = vec![PlayerRef::Registered {
                    user_id: creator.id.clone(),
                    username: creator.username.clone(),
                }];
                let mut guests = Vec::new();

                for spec in players {
                    let candidate = match spec {
                        PlayerSpec::User { identifier } => {
                            match query_identity_by_reference(tx, identifier.trim())? {
                                Some(identity) => PlayerRef::Registered {
                                    user_id: identity.id,
                                    username: identity.username,
                                },
                                None => {
                                    warn!("Skipping unknown player '{}' in round '{}'", identifier, name);
                                    continue;
                                }
                            }
                        }
                        PlayerSpec::Guest { name: guest } => {
                            let guest = guest.trim();
                            if guest.is_empty() || guest.chars().count() > MAX_GUEST_NAME_LEN {
                                return Err(StoreError::InvalidInput(format!(
                                    "guest name must be 1-{MAX_GUEST_NAME_LEN} characters"
                                )));
                            }
                            guests.push(guest.to_string());
                            PlayerRef::Guest { name: guest.to_string() }
                        }
                    };

                    if let PlayerRef::Registered { user_id, .. } = &candidate {
                        let already = enrolled.iter().any(|p| {
                            matches!(p, PlayerRef::Registered { user_id: existing, .. } if existing == user_id)
                        });
                        if already {
                            continue;
                        }
                    }

                    let key = candidate.display_name().to_lowercase();
                    if enrolled.iter().any(|p| p.display_name().to_lowercase() == key) {
                        return Err(StoreError::DuplicatePlayer(candidate.display_name().to_string()));
                    }
                    enrolled.push(candidate);
                }

                let existing: Option<String> = tx
                    .query_row(
                        "SELECT id FROM rounds WHERE name = ?1 AND creator_id = ?2",
                        [name, creator_id],
                        |r| r.get(0),
                    )
                    .optional()?;
                if let Some(existing_id) = existing {
                    let taken: HashSet<String> = query_players(tx, &existing_id)?
                        .into_iter()
                        .map(|p| p.player.display_name().to_lowercase())
                        .collect();
                    if let Some(guest) = guests.iter().find(|g| taken.contains(&g.to_lowercase())) {
                        return Err(StoreError::DuplicatePlayer(guest.clone()));
                    }
                    return Err(StoreError::DuplicateRoundName);
                }

                tx.execute(
                    "INSERT INTO rounds (id, name, creator_id) VALUES (?1, ?2, ?3)",
                    [round_id.as_str(), name, creator_id],
                )?;

                let mut stmt = tx.prepare(
                    "INSERT INTO round_players (id, round_id, user_id, guest_name, position)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (position, player) in enrolled.iter().enumerate() {
                    let (user_id, guest_name) = match player {
                        PlayerRef::Registered { user_id, .. } => (Some(user_id.as_str()), None),
                        PlayerRef::Guest { name } => (None, Some(name.as_str())),
                    };
                    stmt.execute(rusqlite::params![
                        Uuid::new_v4().to_string(),
                        &round_id,
                        user_id,
                        guest_name,
                        position as i64,
                    ])?;
                }

                let round = query_round(tx, &round_id)?.ok_or(StoreError::RoundNotFound)?;
                let players = query_players(tx, &round_id)?;
                Ok(RoundDetail { round, players })
            })
            .map_err(|e| e.or_conflict(StoreError::DuplicateRoundName))?;

        info!(
            "Round '{}' ({}) created by {} with {} players",
            detail.round.name,
            detail.round.id,
            creator_id,
            detail.players.len()
        );
        Ok(detail)
    }

    /// Award one point: bump the player's counter and append a score event in
    /// the same transaction. Returns the new total.
    pub fn add_point(
        &self,
        round_id: &str,
        round_player_id: &str,
        caller_id: &str,
    ) -> Result<i64, StoreError> {
        let total = self.with_tx(|tx| {
            let owner: String = tx
                .query_row(
                    "SELECT round_id FROM round_players WHERE id = ?1",
                    [round_player_id],
                    |r| r.get(0),
                )
                .optional()?
                .ok_or(StoreError::PlayerNotFound)?;
            if owner != round_id {
                return Err(StoreError::PlayerRoundMismatch);
            }

            tx.execute(
                "UPDATE round_players SET points = points + 1 WHERE id = ?1",
                [round_player_id],
            )?;
            tx.execute(
                "INSERT INTO score_events (id, round_id, round_player_id) VALUES (?1, ?2, ?3)",
                (Uuid::new_v4().to_string(), round_id, round_player_id),
            )?;

            let points: i64 = tx.query_row(
                "SELECT points FROM round_players WHERE id = ?1",
                [round_player_id],
                |r| r.get(0),
            )?;
            Ok(points)
        })?;

        debug!(
            "Point for player {} in round {} by {} (total {})",
            round_player_id, round_id, caller_id, total
        );
        Ok(total)
    }

    /// Per-player scores plus the round's total event count, read from one
    /// snapshot.
    pub fn get_scores(&self, round_id: &str) -> Result<Scoreboard, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let round = query_round(&tx, round_id)?.ok_or(StoreError::RoundNotFound)?;
            let field_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM score_events WHERE round_id = ?1",
                [round_id],
                |r| r.get(0),
            )?;
            let players = query_players(&tx, round_id)?;
            tx.finish()?;
            Ok(Scoreboard { round, field_count, players })
        })
    }

    /// Delete a round and, by cascade, its players and score events. Only the
    /// creator may delete.
    pub fn delete_round(&self, round_id: &str, caller_id: &str) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let creator: String = tx
                .query_row("SELECT creator_id FROM rounds WHERE id = ?1", [round_id], |r| r.get(0))
                .optional()?
                .ok_or(StoreError::RoundNotFound)?;
            if creator != caller_id {
                return Err(StoreError::NotAuthorized);
            }
            tx.execute("DELETE FROM rounds WHERE id = ?1", [round_id])?;
            Ok(())
        })?;

        info!("Round {} deleted by {}", round_id, caller_id);
        Ok(())
    }

    /// Rounds the identity created or is enrolled in, newest first.
    pub fn list_rounds(&self, identity_id: &str) -> Result<Vec<RoundRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.name, r.creator_id, r.created_at
                 FROM rounds r
                 WHERE r.creator_id = ?1
                    OR EXISTS (SELECT 1 FROM round_players p WHERE p.round_id = r.id AND p.user_id = ?1)
                 ORDER BY r.created_at DESC, r.rowid DESC",
            )?;
            let rows = stmt
                .query_map([identity_id], round_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Recount each player's score events and report counters that disagree.
    /// An empty result means the round is consistent.
    pub fn check_consistency(&self, round_id: &str) -> Result<Vec<CounterMismatchRow>, StoreError> {
        let mismatches = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            query_round(&tx, round_id)?.ok_or(StoreError::RoundNotFound)?;

            let mut stmt = tx.prepare(
                "SELECT p.id, p.points,
                        (SELECT COUNT(*) FROM score_events e WHERE e.round_player_id = p.id)
                 FROM round_players p
                 WHERE p.round_id = ?1
                 ORDER BY p.position",
            )?;
            let rows = stmt
                .query_map([round_id], |row| {
                    Ok(CounterMismatchRow {
                        player_id: row.get(0)?,
                        cached: row.get(1)?,
                        events: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);
            tx.finish()?;

            Ok(rows.into_iter().filter(|r| r.cached != r.events).collect::<Vec<_>>())
        })?;

        if !mismatches.is_empty() {
            warn!("Round {} has {} inconsistent score counters", round_id, mismatches.len());
        }
        Ok(mismatches)
    }
}

fn round_from_row(row: &Row<'_>) -> rusqlite::Result<RoundRow> {
    Ok(RoundRow {
        id: row.get(0)?,
        name: row.get(1)?,
        creator_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn query_round(conn: &Connection, id: &str) -> Result<Option<RoundRow>, StoreError> {
    conn.query_row(
        "SELECT id, name, creator_id, created_at FROM rounds WHERE id = ?1",
        [id],
        round_from_row,
    )
    .optional()
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<RoundPlayerRow> {
    let user_id: Option<String> = row.get(2)?;
    let username: Option<String> = row.get(3)?;
    let guest_name: Option<String> = row.get(4)?;

    let player = match (user_id, username, guest_name) {
        (Some(user_id), Some(username), None) => PlayerRef::Registered { user_id, username },
        (None, _, Some(name)) => PlayerRef::Guest { name },
        _ => {
            return Err(rusqlite::Error::InvalidColumnType(
                2,
                "user_id".to_string(),
                rusqlite::types::Type::Null,
            ));
        }
    };

    Ok(RoundPlayerRow {
        id: row.get(0)?,
        round_id: row.get(1)?,
        player,
        points: row.get(5)?,
        position: row.get(6)?,
    })
}

fn query_players(conn: &Connection, round_id: &str) -> Result<Vec<RoundPlayerRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.round_id, p.user_id, u.username, p.guest_name, p.points, p.position
         FROM round_players p
         LEFT JOIN identities u ON u.id = p.user_id
         WHERE p.round_id = ?1
         ORDER BY p.position",
    )?;
    let rows = stmt
        .query_map([round_id], player_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{temp_db, user};

    fn guest(name: &str) -> PlayerSpec {
        PlayerSpec::Guest { name: name.to_string() }
    }

    fn registered(identifier: &str) -> PlayerSpec {
        PlayerSpec::User { identifier: identifier.to_string() }
    }

    fn points_sum(board: &Scoreboard) -> i64 {
        board.players.iter().map(|p| p.points).sum()
    }

    #[test]
    fn creator_is_enrolled_first() {
        let (db, _dir) = temp_db();
        let ana = user(&db, "ana");
        user(&db, "bo");

        let detail = db
            .create_round(&ana.id, "Game1", &[registered("bo"), guest("Max")])
            .unwrap();

        let names: Vec<&str> = detail.players.iter().map(|p| p.player.display_name()).collect();
        assert_eq!(names, vec!["ana", "bo", "Max"]);
        assert_eq!(detail.round.creator_id, ana.id);
        assert!(detail.players.iter().all(|p| p.points == 0));
    }

    #[test]
    fn unknown_users_are_skipped_and_duplicates_collapsed() {
        let (db, _dir) = temp_db();
        let ana = user(&db, "ana");
        let bo = user(&db, "bo");

        let detail = db
            .create_round(
                &ana.id,
                "Game1",
                &[registered("ghost"), registered("bo"), registered(&bo.id), registered("ana")],
            )
            .unwrap();
        assert_eq!(detail.players.len(), 2);
    }

    #[test]
    fn colliding_names_in_one_request_fail() {
        let (db, _dir) = temp_db();
        let ana = user(&db, "ana");
        user(&db, "bo");

        let err = db
            .create_round(&ana.id, "Game1", &[guest("Max"), guest("max")])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePlayer(ref n) if n == "max"));

        let err = db
            .create_round(&ana.id, "Game1", &[registered("bo"), guest("Bo")])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePlayer(_)));

        // Nothing was written by the failed attempts.
        assert!(db.list_rounds(&ana.id).unwrap().is_empty());
    }

    #[test]
    fn round_name_unique_per_creator() {
        let (db, _dir) = temp_db();
        let ana = user(&db, "ana");
        let bo = user(&db, "bo");

        db.create_round(&ana.id, "Trivia", &[]).unwrap();
        let err = db.create_round(&ana.id, "Trivia", &[]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRoundName));

        db.create_round(&bo.id, "Trivia", &[]).unwrap();
    }

    #[test]
    fn reused_name_with_known_guest_reports_duplicate_player() {
        let (db, _dir) = temp_db();
        let ana = user(&db, "ana");

        db.create_round(&ana.id, "Trivia", &[guest("Max")]).unwrap();
        let err = db.create_round(&ana.id, "Trivia", &[guest("Max")]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePlayer(ref n) if n == "Max"));
    }

    #[test]
    fn scenario_three_points_for_bo() {
        let (db, _dir) = temp_db();
        let ana = user(&db, "ana");
        let bo = user(&db, "bo");

        let rel = db.request_friendship(&ana.id, "bo").unwrap();
        db.respond_to_request(&rel.id, &bo.id, true).unwrap();

        let detail = db
            .create_round(&ana.id, "Game1", &[registered("bo"), guest("Max")])
            .unwrap();
        let round_id = detail.round.id.clone();
        let bo_player = detail.players[1].id.clone();

        for expected in 1..=3 {
            assert_eq!(db.add_point(&round_id, &bo_player, &ana.id).unwrap(), expected);
        }

        let board = db.get_scores(&round_id).unwrap();
        assert_eq!(board.round.name, "Game1");
        assert_eq!(board.players.len(), 3);
        assert_eq!(board.field_count, 3);
        assert_eq!(board.players[1].points, 3);
        assert_eq!(board.players[2].player, PlayerRef::Guest { name: "Max".into() });
        assert_eq!(board.players[2].points, 0);
        assert_eq!(points_sum(&board), board.field_count);
        assert!(db.check_consistency(&round_id).unwrap().is_empty());
    }

    #[test]
    fn add_point_validates_player_and_round() {
        let (db, _dir) = temp_db();
        let ana = user(&db, "ana");

        let one = db.create_round(&ana.id, "One", &[]).unwrap();
        let two = db.create_round(&ana.id, "Two", &[]).unwrap();

        assert!(matches!(
            db.add_point(&one.round.id, "missing", &ana.id).unwrap_err(),
            StoreError::PlayerNotFound
        ));
        assert!(matches!(
            db.add_point(&one.round.id, &two.players[0].id, &ana.id).unwrap_err(),
            StoreError::PlayerRoundMismatch
        ));

        let board = db.get_scores(&two.round.id).unwrap();
        assert_eq!(board.field_count, 0);
        assert_eq!(points_sum(&board), 0);
    }

    #[test]
    fn concurrent_points_are_not_lost() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db);
        let ana = user(&db, "ana");
        let callers: Vec<String> = (0..4).map(|i| user(&db, &format!("caller{i}")).id).collect();

        let detail = db.create_round(&ana.id, "Race", &[guest("Max")]).unwrap();
        let round_id = detail.round.id.clone();
        let player_id = detail.players[1].id.clone();

        const PER_THREAD: usize = 25;
        let handles: Vec<_> = callers
            .into_iter()
            .map(|caller| {
                let db = db.clone();
                let round_id = round_id.clone();
                let player_id = player_id.clone();
                std::thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        db.add_point(&round_id, &player_id, &caller).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let board = db.get_scores(&round_id).unwrap();
        assert_eq!(board.players[1].points, (4 * PER_THREAD) as i64);
        assert_eq!(board.field_count, (4 * PER_THREAD) as i64);
        assert!(db.check_consistency(&round_id).unwrap().is_empty());
    }

    #[test]
    fn consistency_check_reports_drift() {
        let (db, _dir) = temp_db();
        let ana = user(&db, "ana");
        let detail = db.create_round(&ana.id, "Drift", &[]).unwrap();
        let player = detail.players[0].id.clone();
        db.add_point(&detail.round.id, &player, &ana.id).unwrap();

        db.with_tx(|tx| {
            tx.execute("UPDATE round_players SET points = 5 WHERE id = ?1", [&player])?;
            Ok(())
        })
        .unwrap();

        let mismatches = db.check_consistency(&detail.round.id).unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].cached, 5);
        assert_eq!(mismatches[0].events, 1);
    }

    #[test]
    fn only_creator_deletes_and_delete_cascades() {
        let (db, _dir) = temp_db();
        let ana = user(&db, "ana");
        let bo = user(&db, "bo");

        let detail = db.create_round(&ana.id, "Game1", &[registered("bo")]).unwrap();
        let round_id = detail.round.id.clone();
        db.add_point(&round_id, &detail.players[1].id, &bo.id).unwrap();

        assert!(matches!(
            db.delete_round(&round_id, &bo.id).unwrap_err(),
            StoreError::NotAuthorized
        ));
        db.delete_round(&round_id, &ana.id).unwrap();

        assert!(matches!(db.get_scores(&round_id).unwrap_err(), StoreError::RoundNotFound));
        assert!(matches!(
            db.delete_round(&round_id, &ana.id).unwrap_err(),
            StoreError::RoundNotFound
        ));

        let leftovers: (i64, i64) = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM round_players), (SELECT COUNT(*) FROM score_events)",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )?)
            })
            .unwrap();
        assert_eq!(leftovers, (0, 0));
    }

    #[test]
    fn list_rounds_includes_enrolled_rounds() {
        let (db, _dir) = temp_db();
        let ana = user(&db, "ana");
        let bo = user(&db, "bo");

        db.create_round(&ana.id, "Game1", &[registered("bo")]).unwrap();
        db.create_round(&ana.id, "Solo", &[]).unwrap();

        assert_eq!(db.list_rounds(&ana.id).unwrap().len(), 2);
        let bo_rounds: Vec<String> = db.list_rounds(&bo.id).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(bo_rounds, vec!["Game1"]);
    }
}
