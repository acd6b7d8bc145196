use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::Role;
use crate::Error;

/// What a session token carries. The embedded password hash is deliberate:
/// the principal resolver re-checks it against the credential store on every
/// call, which is how a password reset revokes tokens that are still
/// cryptographically valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub role: Role,
    pub username: String,
    pub password_hash: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies signed, self-contained session tokens (HS256).
/// Verification needs no store lookup; the store re-check is the principal
/// resolver's job.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, role: Role, username: &str, password_hash: &str) -> Result<String, Error> {
        let now = Utc::now();
        let claims = Claims {
            role,
            username: username.to_owned(),
            password_hash: password_hash.to_owned(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Fails on bad signature, expiry or malformed payload, uniformly as
    /// `Unauthenticated`.
    pub fn verify(&self, token: &str) -> Result<Claims, Error> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(b"unit-test-secret", Duration::hours(2))
    }

    #[test]
    fn issue_then_verify_round_trips_claims() {
        let tokens = service();
        let token = tokens
            .issue(Role::Student, "a@b.com", "cafebabe")
            .unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.role, Role::Student);
        assert_eq!(claims.username, "a@b.com");
        assert_eq!(claims.password_hash, "cafebabe");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let tokens = service();
        let token = tokens
            .issue(Role::Professor, "p@b.com", "deadbeef")
            .unwrap();

        let mut forged = token.clone();
        forged.pop();
        forged.push(if token.ends_with('A') { 'B' } else { 'A' });
        assert!(matches!(
            tokens.verify(&forged),
            Err(Error::Unauthenticated { .. })
        ));
    }

    #[test]
    fn token_from_another_key_is_rejected() {
        let other = TokenService::new(b"some-other-secret", Duration::hours(2));
        let token = other.issue(Role::Student, "a@b.com", "cafebabe").unwrap();

        assert!(matches!(
            service().verify(&token),
            Err(Error::Unauthenticated { .. })
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        // Negative ttl puts exp well past the default validation leeway.
        let tokens = TokenService::new(b"unit-test-secret", Duration::hours(-2));
        let token = tokens.issue(Role::Student, "a@b.com", "cafebabe").unwrap();

        assert!(matches!(
            tokens.verify(&token),
            Err(Error::Unauthenticated { .. })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            service().verify("not-a-token"),
            Err(Error::Unauthenticated { .. })
        ));
    }
}
