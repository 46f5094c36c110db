use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PlayerKind, PlayerSpec, RelationshipStatus};

// -- Token Claims --

/// Bearer token claims. The token binds to an identity and carries nothing
/// else besides its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Friends --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FriendRequestBody {
    /// Username or email of the identity to befriend.
    pub target: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespondRequest {
    pub accept: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RelationshipResponse {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub recipient_id: Uuid,
    pub status: RelationshipStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FriendResponse {
    pub user_id: Uuid,
    pub username: String,
}

/// A pending request as seen by one side: `user_id`/`username` are the
/// counterpart (requester for incoming, recipient for outgoing).
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingRequestResponse {
    pub relationship_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub username: String,
    pub status: RelationshipStatus,
}

// -- Rounds --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoundRequest {
    pub name: String,
    #[serde(default)]
    pub players: Vec<PlayerSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoundPlayerResponse {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: PlayerKind,
    pub points: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoundResponse {
    pub id: Uuid,
    pub name: String,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub players: Vec<RoundPlayerResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoundSummary {
    pub id: Uuid,
    pub name: String,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddPointResponse {
    pub round_player_id: Uuid,
    pub points: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub name: String,
    pub points: i64,
    pub player_id: Uuid,
    pub is_guest: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoresResponse {
    pub round_id: Uuid,
    /// Number of score events recorded for the round.
    pub field_count: i64,
    pub round_name: String,
    pub player_count: usize,
    pub scores: Vec<ScoreEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CounterMismatch {
    pub player_id: Uuid,
    pub cached: i64,
    pub events: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConsistencyResponse {
    pub round_id: Uuid,
    pub consistent: bool,
    pub mismatches: Vec<CounterMismatch>,
}

// -- Search --

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub username: String,
    pub email: String,
    pub status: RelationshipStatus,
}

// -- Profile --

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub has_picture: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BioBody {
    pub bio: String,
}
