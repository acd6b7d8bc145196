use async_trait::async_trait;

use crate::models::Role;

/// Mail collaborator. Returns a bare success flag: the caller decides what a
/// failed delivery means (for password resets it is a partial failure, since
/// the password has already been rotated).
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_reset_notice(&self, role: Role, username: &str, new_password: &str) -> bool;
}

/// Stand-in delivery backend: logs the notice instead of sending it. Wire a
/// real SMTP client behind the trait for production.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_reset_notice(&self, role: Role, username: &str, _new_password: &str) -> bool {
        log::info!("password reset notice for {} {}", role, username);
        true
    }
}
