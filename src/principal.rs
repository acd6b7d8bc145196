use crate::models::{Professor, Role, Student};
use crate::store::Store;
use crate::token::TokenService;
use crate::Error;

/// The authenticated entity behind the current call.
#[derive(Debug, Clone)]
pub enum Actor {
    Student(Student),
    Professor(Professor),
}

/// Turns a session token into a concrete Student or Professor. Resolution is
/// fresh on every call — no caching — so the embedded password hash is always
/// checked against the latest stored one.
pub struct Resolver<S> {
    store: S,
    tokens: TokenService,
}

impl<S: Store> Resolver<S> {
    pub fn new(store: S, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    pub async fn resolve(&self, token: &str, required: Role) -> Result<Actor, Error> {
        let claims = self.tokens.verify(token)?;

        // Role confusion is rejected before any data is touched.
        if claims.role != required {
            return Err(Error::forbidden("Wrong role for this operation"));
        }

        let account = self
            .store
            .account_by_credentials(claims.role, &claims.username, &claims.password_hash)
            .await?
            .ok_or_else(|| Error::unauthenticated("Credentials no longer valid"))?;

        match required {
            Role::Student => self
                .store
                .student_by_account(account.id)
                .await?
                .map(Actor::Student),
            Role::Professor => self
                .store
                .professor_by_account(account.id)
                .await?
                .map(Actor::Professor),
        }
        .ok_or_else(|| Error::unauthenticated("No profile for this account"))
    }

    pub async fn student(&self, token: &str) -> Result<Student, Error> {
        match self.resolve(token, Role::Student).await? {
            Actor::Student(student) => Ok(student),
            Actor::Professor(_) => Err(Error::forbidden("Wrong role for this operation")),
        }
    }

    pub async fn professor(&self, token: &str) -> Result<Professor, Error> {
        match self.resolve(token, Role::Professor).await? {
            Actor::Professor(professor) => Ok(professor),
            Actor::Student(_) => Err(Error::forbidden("Wrong role for this operation")),
        }
    }
}
