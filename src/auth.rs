use hmac::Hmac;
use lazy_static::lazy_static;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::mail::Mailer;
use crate::models::Role;
use crate::store::Store;
use crate::token::TokenService;
use crate::Error;

const USERNAME_MAX: usize = 120;
const NAME_MAX: usize = 50;
const RESET_PASSWORD_LEN: usize = 10;
const PBKDF2_ROUNDS: u32 = 10_000;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[_a-z0-9-]+(\.[_a-z0-9-]+)*@[a-z0-9-]+(\.[a-z0-9-]+)*(\.[a-z]{2,})$")
            .unwrap();
}

/// Deterministic credential hash: PBKDF2-HMAC-SHA256 with a salt derived
/// from the lowercased username. Determinism is load-bearing — the store is
/// queried by (role, username, hash) and the same hash rides inside issued
/// tokens for per-call re-validation.
pub fn hash_password(username: &str, password: &str) -> String {
    let salt = Sha256::digest(username.to_lowercase().as_bytes());
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), &salt, PBKDF2_ROUNDS, &mut out);
    hex::encode(out)
}

fn valid_password(password: &str) -> bool {
    let len = password.chars().count();
    (8..=30).contains(&len)
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
}

/// Registration payload. Fields are optional so an absent record surfaces as
/// "Missing records" instead of a deserialization error.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub surname: Option<String>,
}

/// Composes the credential store, the token service and the mail
/// collaborator into the login / register / reset flows.
pub struct Authenticator<S, M> {
    store: S,
    tokens: TokenService,
    mailer: M,
}

impl<S: Store, M: Mailer> Authenticator<S, M> {
    pub fn new(store: S, tokens: TokenService, mailer: M) -> Self {
        Self {
            store,
            tokens,
            mailer,
        }
    }

    /// One error surface for unknown user and wrong password.
    pub async fn login(&self, role: Role, username: &str, password: &str) -> Result<String, Error> {
        let hash = hash_password(username, password);
        self.login_with_hash(role, username, &hash).await
    }

    async fn login_with_hash(
        &self,
        role: Role,
        username: &str,
        hash: &str,
    ) -> Result<String, Error> {
        match self
            .store
            .account_by_credentials(role, username, hash)
            .await?
        {
            Some(_) => self.tokens.issue(role, username, hash),
            None => {
                log::warn!("failed {} login for {}", role, username);
                Err(Error::unauthenticated("Invalid username or password"))
            }
        }
    }

    /// Student-only; professors are provisioned out-of-band. Returns the
    /// token of a fresh login so the caller is authenticated immediately.
    pub async fn register(&self, data: Registration) -> Result<String, Error> {
        let (username, password, name, surname) =
            match (data.username, data.password, data.name, data.surname) {
                (Some(u), Some(p), Some(n), Some(s)) => (u, p, n, s),
                _ => return Err(Error::validation("Missing records")),
            };

        let email = username.to_lowercase();
        if !EMAIL_RE.is_match(&email) || email.len() > USERNAME_MAX {
            return Err(Error::validation("Invalid email"));
        }

        if self.store.account_by_username(&email).await?.is_some() {
            return Err(Error::validation("Used email"));
        }

        if !valid_password(&password) {
            return Err(Error::validation("Invalid password"));
        }

        if name.chars().count() > NAME_MAX || surname.chars().count() > NAME_MAX {
            return Err(Error::validation("Invalid records length"));
        }

        let hash = hash_password(&email, &password);
        let account = self
            .store
            .insert_account(&email, &hash, Role::Student)
            .await?;
        self.store
            .insert_student(account.id, &name, &surname)
            .await?;
        log::info!("registered student {}", email);

        self.login_with_hash(Role::Student, &email, &hash).await
    }

    /// Rotates the password first, then notifies. A failed delivery is
    /// surfaced as `Delivery`: the rotation has already committed, so the
    /// caller must not read this as a retryable login failure.
    pub async fn reset(&self, role: Role, username: &str) -> Result<(), Error> {
        let account = self
            .store
            .account_by_login(role, username)
            .await?
            .ok_or_else(|| Error::unauthenticated("Invalid email"))?;

        let new_password: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RESET_PASSWORD_LEN)
            .map(char::from)
            .collect();
        let hash = hash_password(username, &new_password);
        self.store
            .update_account_password(account.id, &hash)
            .await?;

        if !self
            .mailer
            .send_reset_notice(role, username, &new_password)
            .await
        {
            log::warn!("reset notice for {} {} not delivered", role, username);
            return Err(Error::delivery(
                "Reset notice failed after the password was rotated",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::memory::MemStore;

    #[derive(Clone, Default)]
    struct CapturingMailer {
        delivered: Arc<Mutex<Option<String>>>,
        fail: bool,
    }

    impl CapturingMailer {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn last_password(&self) -> Option<String> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for CapturingMailer {
        async fn send_reset_notice(&self, _role: Role, _username: &str, pw: &str) -> bool {
            *self.delivered.lock().unwrap() = Some(pw.to_owned());
            !self.fail
        }
    }

    fn auth(store: MemStore, mailer: CapturingMailer) -> Authenticator<MemStore, CapturingMailer> {
        let tokens = TokenService::new(b"auth-test-secret", Duration::hours(1));
        Authenticator::new(store, tokens, mailer)
    }

    fn registration(username: &str, password: &str) -> Registration {
        Registration {
            username: Some(username.to_owned()),
            password: Some(password.to_owned()),
            name: Some("Jo".to_owned()),
            surname: Some("Doe".to_owned()),
        }
    }

    fn assert_validation(result: Result<String, Error>, expected: &str) {
        match result {
            Err(Error::Validation { message }) => assert_eq!(message, expected),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn register_issues_a_working_student_token() {
        let store = MemStore::new();
        let auth = auth(store.clone(), CapturingMailer::default());

        let token = auth.register(registration("a@b.com", "Aa123456")).await.unwrap();

        let tokens = TokenService::new(b"auth-test-secret", Duration::hours(1));
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.role, Role::Student);
        assert_eq!(claims.username, "a@b.com");

        // The freshly registered credentials must authenticate right away.
        auth.login(Role::Student, "a@b.com", "Aa123456")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn register_lowercases_the_email() {
        let store = MemStore::new();
        let auth = auth(store.clone(), CapturingMailer::default());

        auth.register(registration("UPPER@Case.COM", "Aa123456"))
            .await
            .unwrap();
        assert!(store
            .account_by_username("upper@case.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn register_rejects_missing_fields() {
        let auth = auth(MemStore::new(), CapturingMailer::default());
        let mut data = registration("a@b.com", "Aa123456");
        data.surname = None;

        assert_validation(auth.register(data).await, "Missing records");
    }

    #[tokio::test]
    async fn register_rejects_malformed_and_oversized_emails() {
        let auth = auth(MemStore::new(), CapturingMailer::default());

        assert_validation(
            auth.register(registration("not-an-email", "Aa123456")).await,
            "Invalid email",
        );

        let oversized = format!("{}@b.com", "a".repeat(120));
        assert_validation(
            auth.register(registration(&oversized, "Aa123456")).await,
            "Invalid email",
        );
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let auth = auth(MemStore::new(), CapturingMailer::default());

        auth.register(registration("a@b.com", "Aa123456")).await.unwrap();
        assert_validation(
            auth.register(registration("a@b.com", "Bb654321")).await,
            "Used email",
        );
    }

    #[tokio::test]
    async fn register_enforces_the_password_policy() {
        let auth = auth(MemStore::new(), CapturingMailer::default());

        for bad in ["short1A", "nodigitsAA", "NOLOWER123", "noupper123"] {
            assert_validation(
                auth.register(registration("a@b.com", bad)).await,
                "Invalid password",
            );
        }
    }

    #[tokio::test]
    async fn register_rejects_oversized_names() {
        let auth = auth(MemStore::new(), CapturingMailer::default());
        let mut data = registration("a@b.com", "Aa123456");
        data.name = Some("x".repeat(51));

        assert_validation(auth.register(data).await, "Invalid records length");
    }

    #[tokio::test]
    async fn name_caps_count_characters_not_bytes() {
        let auth = auth(MemStore::new(), CapturingMailer::default());
        let mut data = registration("a@b.com", "Aa123456");
        // 40 characters, 80 bytes.
        data.surname = Some("é".repeat(40));

        auth.register(data).await.unwrap();
    }

    #[tokio::test]
    async fn login_does_not_distinguish_unknown_user_from_wrong_password() {
        let auth = auth(MemStore::new(), CapturingMailer::default());
        auth.register(registration("a@b.com", "Aa123456")).await.unwrap();

        let unknown = auth.login(Role::Student, "ghost@b.com", "Aa123456").await;
        let wrong = auth.login(Role::Student, "a@b.com", "Wrong1234").await;
        match (unknown, wrong) {
            (
                Err(Error::Unauthenticated { message: a }),
                Err(Error::Unauthenticated { message: b }),
            ) => assert_eq!(a, b),
            other => panic!("expected two unauthenticated errors, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn login_checks_the_role() {
        let auth = auth(MemStore::new(), CapturingMailer::default());
        auth.register(registration("a@b.com", "Aa123456")).await.unwrap();

        assert!(matches!(
            auth.login(Role::Professor, "a@b.com", "Aa123456").await,
            Err(Error::Unauthenticated { .. })
        ));
    }

    #[tokio::test]
    async fn reset_rotates_the_password_and_mails_the_new_one() {
        let store = MemStore::new();
        let mailer = CapturingMailer::default();
        let auth = auth(store, mailer.clone());
        auth.register(registration("a@b.com", "Aa123456")).await.unwrap();

        auth.reset(Role::Student, "a@b.com").await.unwrap();

        let new_password = mailer.last_password().unwrap();
        assert_eq!(new_password.len(), RESET_PASSWORD_LEN);
        assert!(matches!(
            auth.login(Role::Student, "a@b.com", "Aa123456").await,
            Err(Error::Unauthenticated { .. })
        ));
        auth.login(Role::Student, "a@b.com", &new_password)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reset_for_unknown_account_fails() {
        let auth = auth(MemStore::new(), CapturingMailer::default());

        match auth.reset(Role::Student, "ghost@b.com").await {
            Err(Error::Unauthenticated { message }) => assert_eq!(message, "Invalid email"),
            other => panic!("expected unauthenticated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_delivery_still_rotates_the_password() {
        let auth = auth(MemStore::new(), CapturingMailer::failing());
        auth.register(registration("a@b.com", "Aa123456")).await.unwrap();

        assert!(matches!(
            auth.reset(Role::Student, "a@b.com").await,
            Err(Error::Delivery { .. })
        ));
        // The old password is gone even though delivery failed.
        assert!(matches!(
            auth.login(Role::Student, "a@b.com", "Aa123456").await,
            Err(Error::Unauthenticated { .. })
        ));
    }
}
