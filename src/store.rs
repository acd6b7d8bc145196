use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{
    Account, Discussion, FellowStudent, Group, GroupFile, Professor, Reservation, Role, Student,
};
use crate::Error;

/// Clamped pagination request: page number floored at 0, page size forced
/// into [1, 50] before it ever reaches a backend.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl PageRequest {
    pub fn of(page: Option<i64>, size: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(0).max(0),
            size: size.unwrap_or(1).clamp(1, 50),
        }
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_mul(self.size)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn of(items: Vec<T>, req: PageRequest, total: i64) -> Self {
        Self {
            items,
            page: req.page,
            page_size: req.size,
            total,
        }
    }
}

/// The storage collaborator. The engine and the authentication orchestrator
/// are written against this trait only; `pg::PgStore` is the production
/// backend and `memory::MemStore` backs the test suites.
///
/// Every `*_active` lookup excludes soft-deleted rows. Uniqueness and
/// capacity guards in the engine are check-then-act; backends are expected
/// to carry the matching unique indexes (see schema.sql) as the backstop
/// under concurrent writers.
#[async_trait]
pub trait Store: Send + Sync {
    // accounts

    async fn account_by_username(&self, username: &str) -> Result<Option<Account>, Error>;

    async fn account_by_login(&self, role: Role, username: &str)
        -> Result<Option<Account>, Error>;

    /// The full credential triple. The principal resolver re-checks this on
    /// every call, so a password reset invalidates outstanding tokens.
    async fn account_by_credentials(
        &self,
        role: Role,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<Account>, Error>;

    async fn insert_account(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Account, Error>;

    async fn update_account_password(
        &self,
        account_id: i64,
        password_hash: &str,
    ) -> Result<(), Error>;

    // students

    async fn insert_student(
        &self,
        account_id: i64,
        name: &str,
        surname: &str,
    ) -> Result<Student, Error>;

    async fn student_by_account(&self, account_id: i64) -> Result<Option<Student>, Error>;

    async fn student_by_id(&self, id: i64) -> Result<Option<Student>, Error>;

    async fn students(&self, req: PageRequest) -> Result<Page<Student>, Error>;

    // professors

    async fn insert_professor(
        &self,
        account_id: i64,
        name: &str,
        surname: &str,
    ) -> Result<Professor, Error>;

    async fn professor_by_account(&self, account_id: i64) -> Result<Option<Professor>, Error>;

    async fn professor_by_id(&self, id: i64) -> Result<Option<Professor>, Error>;

    async fn professors(&self, req: PageRequest) -> Result<Page<Professor>, Error>;

    // groups

    async fn insert_group(
        &self,
        professor_id: i64,
        admin_id: i64,
        name: &str,
    ) -> Result<Group, Error>;

    async fn group_active(&self, id: i64) -> Result<Option<Group>, Error>;

    async fn update_group_name(&self, id: i64, name: &str) -> Result<Group, Error>;

    async fn soft_delete_group(&self, id: i64) -> Result<(), Error>;

    async fn count_groups_by_admin_and_professor(
        &self,
        admin_id: i64,
        professor_id: i64,
    ) -> Result<i64, Error>;

    /// Active groups the student belongs to, as admin or as fellow.
    async fn groups_by_member(&self, student_id: i64, req: PageRequest)
        -> Result<Page<Group>, Error>;

    async fn groups_by_professor(
        &self,
        professor_id: i64,
        req: PageRequest,
    ) -> Result<Page<Group>, Error>;

    // fellow students

    async fn fellows_active_by_group(&self, group_id: i64) -> Result<Vec<FellowStudent>, Error>;

    async fn fellow_active(
        &self,
        student_id: i64,
        group_id: i64,
    ) -> Result<Option<FellowStudent>, Error>;

    async fn insert_fellow(&self, student_id: i64, group_id: i64)
        -> Result<FellowStudent, Error>;

    async fn soft_delete_fellow(&self, id: i64) -> Result<(), Error>;

    // discussions

    async fn insert_discussion(
        &self,
        professor_id: i64,
        name: &str,
        date: DateTime<Utc>,
    ) -> Result<Discussion, Error>;

    async fn discussion_active(&self, id: i64) -> Result<Option<Discussion>, Error>;

    async fn update_discussion(
        &self,
        id: i64,
        name: &str,
        date: DateTime<Utc>,
    ) -> Result<Discussion, Error>;

    /// Soft-deletes the discussion and every active reservation referencing
    /// it in one atomic unit. No intermediate state may be observable.
    async fn soft_delete_discussion_cascade(&self, id: i64) -> Result<(), Error>;

    async fn discussions_by_professor(
        &self,
        professor_id: i64,
        req: PageRequest,
    ) -> Result<Page<Discussion>, Error>;

    // reservations

    async fn insert_reservation(
        &self,
        group_id: i64,
        discussion_id: i64,
    ) -> Result<Reservation, Error>;

    async fn reservation_active(&self, id: i64) -> Result<Option<Reservation>, Error>;

    async fn update_reservation_discussion(
        &self,
        id: i64,
        discussion_id: i64,
    ) -> Result<Reservation, Error>;

    async fn soft_delete_reservation(&self, id: i64) -> Result<(), Error>;

    async fn count_active_reservations_by_group(&self, group_id: i64) -> Result<i64, Error>;

    async fn reservations_by_group(
        &self,
        group_id: i64,
        req: PageRequest,
    ) -> Result<Page<Reservation>, Error>;

    /// Reservations whose linked discussion belongs to the professor.
    async fn reservations_by_professor(
        &self,
        professor_id: i64,
        req: PageRequest,
    ) -> Result<Page<Reservation>, Error>;

    // files

    async fn insert_file(
        &self,
        group_id: i64,
        name: &str,
        filename: &str,
    ) -> Result<GroupFile, Error>;

    async fn file_active(&self, id: i64) -> Result<Option<GroupFile>, Error>;

    async fn soft_delete_file(&self, id: i64) -> Result<(), Error>;

    /// Newest first.
    async fn files_by_group(
        &self,
        group_id: i64,
        req: PageRequest,
    ) -> Result<Page<GroupFile>, Error>;
}
