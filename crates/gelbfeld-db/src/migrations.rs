use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (identities, relationships, rounds)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE identities (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL COLLATE NOCASE UNIQUE,
                email       TEXT NOT NULL COLLATE NOCASE UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- One row per unordered pair while active. user_low < user_high is
            -- the canonical ordering; requester/recipient keep the direction.
            CREATE TABLE relationships (
                id            TEXT PRIMARY KEY,
                user_low      TEXT NOT NULL REFERENCES identities(id),
                user_high     TEXT NOT NULL REFERENCES identities(id),
                requester_id  TEXT NOT NULL REFERENCES identities(id),
                recipient_id  TEXT NOT NULL REFERENCES identities(id),
                status        TEXT NOT NULL DEFAULT 'pending'
                              CHECK (status IN ('pending', 'accepted', 'rejected')),
                created_at    TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at    TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK (user_low < user_high),
                CHECK (requester_id <> recipient_id),
                CHECK (requester_id IN (user_low, user_high)),
                CHECK (recipient_id IN (user_low, user_high))
            );

            CREATE UNIQUE INDEX idx_relationships_active_pair
                ON relationships(user_low, user_high)
                WHERE status IN ('pending', 'accepted');

            CREATE INDEX idx_relationships_recipient
                ON relationships(recipient_id, status);

            CREATE INDEX idx_relationships_requester
                ON relationships(requester_id, status);

            CREATE TABLE rounds (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                creator_id  TEXT NOT NULL REFERENCES identities(id),
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (name, creator_id)
            );

            CREATE TABLE round_players (
                id          TEXT PRIMARY KEY,
                round_id    TEXT NOT NULL REFERENCES rounds(id) ON DELETE CASCADE,
                user_id     TEXT REFERENCES identities(id),
                guest_name  TEXT,
                points      INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0),
                position    INTEGER NOT NULL,
                CHECK ((user_id IS NULL) <> (guest_name IS NULL)),
                UNIQUE (round_id, user_id),
                UNIQUE (round_id, position)
            );

            CREATE INDEX idx_round_players_user
                ON round_players(user_id);

            CREATE TABLE score_events (
                id               TEXT PRIMARY KEY,
                round_id         TEXT NOT NULL REFERENCES rounds(id) ON DELETE CASCADE,
                round_player_id  TEXT NOT NULL REFERENCES round_players(id) ON DELETE CASCADE,
                created_at       TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_score_events_round
                ON score_events(round_id);

            CREATE INDEX idx_score_events_player
                ON score_events(round_player_id);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (profiles)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE profiles (
                identity_id           TEXT PRIMARY KEY REFERENCES identities(id) ON DELETE CASCADE,
                first_name            TEXT,
                last_name             TEXT,
                bio                   TEXT,
                picture_content_type  TEXT,
                updated_at            TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT INTO schema_version (version) VALUES (2);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
