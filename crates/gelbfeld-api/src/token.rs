use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use gelbfeld_types::api::Claims;

/// Issues and verifies opaque bearer tokens bound to an identity.
pub trait TokenService: Send + Sync {
    fn issue(&self, identity_id: Uuid) -> anyhow::Result<String>;

    /// Returns the identity the token was issued for, or `None` for anything
    /// malformed, expired or signed with another key.
    fn verify(&self, token: &str) -> Option<Uuid>;
}

/// HS256 JWTs. The signing key is fixed at construction.
pub struct JwtTokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtTokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

impl TokenService for JwtTokenService {
    fn issue(&self, identity_id: Uuid) -> anyhow::Result<String> {
        let claims = Claims {
            sub: identity_id,
            exp: (Utc::now() + self.ttl).timestamp() as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    fn verify(&self, token: &str) -> Option<Uuid> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims.sub)
            .ok()
    }
}
