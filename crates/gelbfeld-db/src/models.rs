//! Row types as read from SQLite. The API layer converts these into
//! gelbfeld-types models.

#[derive(Debug, Clone)]
pub struct IdentityRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct RelationshipRow {
    pub id: String,
    pub requester_id: String,
    pub recipient_id: String,
    pub status: String,
    pub created_at: String,
}

/// A pending request joined with the identity on the other side.
#[derive(Debug, Clone)]
pub struct PendingRow {
    pub relationship_id: String,
    pub user_id: String,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct RoundRow {
    pub id: String,
    pub name: String,
    pub creator_id: String,
    pub created_at: String,
}

/// Who a round player row refers to. The table CHECK guarantees exactly one
/// of `user_id` / `guest_name` is set; rows violating it fail to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerRef {
    Registered { user_id: String, username: String },
    Guest { name: String },
}

impl PlayerRef {
    pub fn display_name(&self) -> &str {
        match self {
            Self::Registered { username, .. } => username,
            Self::Guest { name } => name,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Self::Guest { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RoundPlayerRow {
    pub id: String,
    pub round_id: String,
    pub player: PlayerRef,
    pub points: i64,
    pub position: i64,
}

#[derive(Debug, Clone)]
pub struct RoundDetail {
    pub round: RoundRow,
    pub players: Vec<RoundPlayerRow>,
}

#[derive(Debug, Clone)]
pub struct Scoreboard {
    pub round: RoundRow,
    /// Count of score events for the whole round, read independently of the
    /// per-player counters.
    pub field_count: i64,
    pub players: Vec<RoundPlayerRow>,
}

#[derive(Debug, Clone)]
pub struct CounterMismatchRow {
    pub player_id: String,
    pub cached: i64,
    pub events: i64,
}

#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub identity_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub picture_content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchRow {
    pub username: String,
    pub email: String,
    pub status: gelbfeld_types::models::RelationshipStatus,
}
