//! Row -> API model conversion. Ids and timestamps are stored as text; a
//! corrupt value is logged and replaced with a default rather than failing
//! the whole response.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use gelbfeld_db::models::{IdentityRow, PlayerRef, RoundDetail, RoundPlayerRow, RoundRow};
use gelbfeld_types::api::{FriendResponse, RoundPlayerResponse, RoundResponse, RoundSummary};
use gelbfeld_types::models::{Identity, PlayerKind};

pub fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub fn identity(row: &IdentityRow) -> Identity {
    Identity {
        id: parse_id(&row.id, "identity id"),
        username: row.username.clone(),
        email: row.email.clone(),
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn friend(row: &IdentityRow) -> FriendResponse {
    FriendResponse {
        user_id: parse_id(&row.id, "identity id"),
        username: row.username.clone(),
    }
}

pub fn player_kind(player: &PlayerRef) -> PlayerKind {
    match player {
        PlayerRef::Registered { user_id, username } => PlayerKind::Registered {
            user_id: parse_id(user_id, "player user_id"),
            username: username.clone(),
        },
        PlayerRef::Guest { name } => PlayerKind::Guest { name: name.clone() },
    }
}

pub fn round_player(row: &RoundPlayerRow) -> RoundPlayerResponse {
    RoundPlayerResponse {
        id: parse_id(&row.id, "round player id"),
        kind: player_kind(&row.player),
        points: row.points,
    }
}

pub fn round_summary(row: &RoundRow) -> RoundSummary {
    RoundSummary {
        id: parse_id(&row.id, "round id"),
        name: row.name.clone(),
        creator_id: parse_id(&row.creator_id, "round creator_id"),
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn round_detail(detail: &RoundDetail) -> RoundResponse {
    let summary = round_summary(&detail.round);
    RoundResponse {
        id: summary.id,
        name: summary.name,
        creator_id: summary.creator_id,
        created_at: summary.created_at,
        players: detail.players.iter().map(round_player).collect(),
    }
}
