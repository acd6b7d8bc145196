use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{
    Account, Discussion, FellowStudent, Group, GroupFile, Professor, Reservation, Role, Student,
};
use crate::store::{Page, PageRequest, Store};
use crate::Error;

/// Postgres storage backend. schema.sql at the repository root declares the
/// tables plus the unique indexes backing the engine's capacity and
/// uniqueness guards against concurrent writers.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn account_by_username(&self, username: &str) -> Result<Option<Account>, Error> {
        let account =
            sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE username = $1 LIMIT 1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(account)
    }

    async fn account_by_login(
        &self,
        role: Role,
        username: &str,
    ) -> Result<Option<Account>, Error> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE role = $1 AND username = $2 LIMIT 1",
        )
        .bind(role)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn account_by_credentials(
        &self,
        role: Role,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<Account>, Error> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE role = $1 AND username = $2 AND password_hash = $3 LIMIT 1",
        )
        .bind(role)
        .bind(username)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn insert_account(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Account, Error> {
        let account = sqlx::query_as::<_, Account>(
            "INSERT INTO accounts (username, password_hash, role) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(username)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;
        Ok(account)
    }

    async fn update_account_password(
        &self,
        account_id: i64,
        password_hash: &str,
    ) -> Result<(), Error> {
        sqlx::query("UPDATE accounts SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_student(
        &self,
        account_id: i64,
        name: &str,
        surname: &str,
    ) -> Result<Student, Error> {
        let student = sqlx::query_as::<_, Student>(
            "INSERT INTO students (account_id, name, surname) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(account_id)
        .bind(name)
        .bind(surname)
        .fetch_one(&self.pool)
        .await?;
        Ok(student)
    }

    async fn student_by_account(&self, account_id: i64) -> Result<Option<Student>, Error> {
        let student =
            sqlx::query_as::<_, Student>("SELECT * FROM students WHERE account_id = $1 LIMIT 1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(student)
    }

    async fn student_by_id(&self, id: i64) -> Result<Option<Student>, Error> {
        let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(student)
    }

    async fn students(&self, req: PageRequest) -> Result<Page<Student>, Error> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students")
            .fetch_one(&self.pool)
            .await?;
        let items = sqlx::query_as::<_, Student>(
            "SELECT * FROM students ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(req.size)
        .bind(req.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::of(items, req, total))
    }

    async fn insert_professor(
        &self,
        account_id: i64,
        name: &str,
        surname: &str,
    ) -> Result<Professor, Error> {
        let professor = sqlx::query_as::<_, Professor>(
            "INSERT INTO professors (account_id, name, surname) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(account_id)
        .bind(name)
        .bind(surname)
        .fetch_one(&self.pool)
        .await?;
        Ok(professor)
    }

    async fn professor_by_account(&self, account_id: i64) -> Result<Option<Professor>, Error> {
        let professor = sqlx::query_as::<_, Professor>(
            "SELECT * FROM professors WHERE account_id = $1 LIMIT 1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(professor)
    }

    async fn professor_by_id(&self, id: i64) -> Result<Option<Professor>, Error> {
        let professor =
            sqlx::query_as::<_, Professor>("SELECT * FROM professors WHERE id = $1 LIMIT 1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(professor)
    }

    async fn professors(&self, req: PageRequest) -> Result<Page<Professor>, Error> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM professors")
            .fetch_one(&self.pool)
            .await?;
        let items = sqlx::query_as::<_, Professor>(
            "SELECT * FROM professors ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(req.size)
        .bind(req.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::of(items, req, total))
    }

    async fn insert_group(
        &self,
        professor_id: i64,
        admin_id: i64,
        name: &str,
    ) -> Result<Group, Error> {
        let group = sqlx::query_as::<_, Group>(
            "INSERT INTO study_groups (professor_id, admin_id, name, deleted) \
             VALUES ($1, $2, $3, FALSE) RETURNING *",
        )
        .bind(professor_id)
        .bind(admin_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(group)
    }

    async fn group_active(&self, id: i64) -> Result<Option<Group>, Error> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT * FROM study_groups WHERE id = $1 AND deleted = FALSE LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn update_group_name(&self, id: i64, name: &str) -> Result<Group, Error> {
        let group = sqlx::query_as::<_, Group>(
            "UPDATE study_groups SET name = $1 WHERE id = $2 AND deleted = FALSE RETURNING *",
        )
        .bind(name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        group.ok_or_else(|| Error::not_found("Invalid groupId"))
    }

    async fn soft_delete_group(&self, id: i64) -> Result<(), Error> {
        sqlx::query("UPDATE study_groups SET deleted = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_groups_by_admin_and_professor(
        &self,
        admin_id: i64,
        professor_id: i64,
    ) -> Result<i64, Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM study_groups \
             WHERE admin_id = $1 AND professor_id = $2 AND deleted = FALSE",
        )
        .bind(admin_id)
        .bind(professor_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn groups_by_member(
        &self,
        student_id: i64,
        req: PageRequest,
    ) -> Result<Page<Group>, Error> {
        const MEMBER: &str = "deleted = FALSE AND (admin_id = $1 OR EXISTS (\
             SELECT 1 FROM fellow_students f \
             WHERE f.group_id = study_groups.id AND f.student_id = $1 AND f.deleted = FALSE))";

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM study_groups WHERE {}",
            MEMBER
        ))
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        let items = sqlx::query_as::<_, Group>(&format!(
            "SELECT * FROM study_groups WHERE {} ORDER BY id LIMIT $2 OFFSET $3",
            MEMBER
        ))
        .bind(student_id)
        .bind(req.size)
        .bind(req.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::of(items, req, total))
    }

    async fn groups_by_professor(
        &self,
        professor_id: i64,
        req: PageRequest,
    ) -> Result<Page<Group>, Error> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM study_groups WHERE professor_id = $1 AND deleted = FALSE",
        )
        .bind(professor_id)
        .fetch_one(&self.pool)
        .await?;
        let items = sqlx::query_as::<_, Group>(
            "SELECT * FROM study_groups WHERE professor_id = $1 AND deleted = FALSE \
             ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(professor_id)
        .bind(req.size)
        .bind(req.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::of(items, req, total))
    }

    async fn fellows_active_by_group(&self, group_id: i64) -> Result<Vec<FellowStudent>, Error> {
        let fellows = sqlx::query_as::<_, FellowStudent>(
            "SELECT * FROM fellow_students WHERE group_id = $1 AND deleted = FALSE",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(fellows)
    }

    async fn fellow_active(
        &self,
        student_id: i64,
        group_id: i64,
    ) -> Result<Option<FellowStudent>, Error> {
        let fellow = sqlx::query_as::<_, FellowStudent>(
            "SELECT * FROM fellow_students \
             WHERE student_id = $1 AND group_id = $2 AND deleted = FALSE LIMIT 1",
        )
        .bind(student_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(fellow)
    }

    async fn insert_fellow(
        &self,
        student_id: i64,
        group_id: i64,
    ) -> Result<FellowStudent, Error> {
        let fellow = sqlx::query_as::<_, FellowStudent>(
            "INSERT INTO fellow_students (student_id, group_id, deleted) \
             VALUES ($1, $2, FALSE) RETURNING *",
        )
        .bind(student_id)
        .bind(group_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(fellow)
    }

    async fn soft_delete_fellow(&self, id: i64) -> Result<(), Error> {
        sqlx::query("UPDATE fellow_students SET deleted = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_discussion(
        &self,
        professor_id: i64,
        name: &str,
        date: DateTime<Utc>,
    ) -> Result<Discussion, Error> {
        let discussion = sqlx::query_as::<_, Discussion>(
            "INSERT INTO discussions (professor_id, name, date, deleted) \
             VALUES ($1, $2, $3, FALSE) RETURNING *",
        )
        .bind(professor_id)
        .bind(name)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(discussion)
    }

    async fn discussion_active(&self, id: i64) -> Result<Option<Discussion>, Error> {
        let discussion = sqlx::query_as::<_, Discussion>(
            "SELECT * FROM discussions WHERE id = $1 AND deleted = FALSE LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(discussion)
    }

    async fn update_discussion(
        &self,
        id: i64,
        name: &str,
        date: DateTime<Utc>,
    ) -> Result<Discussion, Error> {
        let discussion = sqlx::query_as::<_, Discussion>(
            "UPDATE discussions SET name = $1, date = $2 \
             WHERE id = $3 AND deleted = FALSE RETURNING *",
        )
        .bind(name)
        .bind(date)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        discussion.ok_or_else(|| Error::not_found("Invalid discussionId"))
    }

    async fn soft_delete_discussion_cascade(&self, id: i64) -> Result<(), Error> {
        // One transaction: the discussion and its reservations disappear
        // together or not at all.
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE discussions SET deleted = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut tx)
            .await?;
        sqlx::query(
            "UPDATE reservations SET deleted = TRUE WHERE discussion_id = $1 AND deleted = FALSE",
        )
        .bind(id)
        .execute(&mut tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn discussions_by_professor(
        &self,
        professor_id: i64,
        req: PageRequest,
    ) -> Result<Page<Discussion>, Error> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM discussions WHERE professor_id = $1 AND deleted = FALSE",
        )
        .bind(professor_id)
        .fetch_one(&self.pool)
        .await?;
        let items = sqlx::query_as::<_, Discussion>(
            "SELECT * FROM discussions WHERE professor_id = $1 AND deleted = FALSE \
             ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(professor_id)
        .bind(req.size)
        .bind(req.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::of(items, req, total))
    }

    async fn insert_reservation(
        &self,
        group_id: i64,
        discussion_id: i64,
    ) -> Result<Reservation, Error> {
        let reservation = sqlx::query_as::<_, Reservation>(
            "INSERT INTO reservations (group_id, discussion_id, deleted) \
             VALUES ($1, $2, FALSE) RETURNING *",
        )
        .bind(group_id)
        .bind(discussion_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(reservation)
    }

    async fn reservation_active(&self, id: i64) -> Result<Option<Reservation>, Error> {
        let reservation = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE id = $1 AND deleted = FALSE LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reservation)
    }

    async fn update_reservation_discussion(
        &self,
        id: i64,
        discussion_id: i64,
    ) -> Result<Reservation, Error> {
        let reservation = sqlx::query_as::<_, Reservation>(
            "UPDATE reservations SET discussion_id = $1 \
             WHERE id = $2 AND deleted = FALSE RETURNING *",
        )
        .bind(discussion_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        reservation.ok_or_else(|| Error::not_found("Invalid reservationId"))
    }

    async fn soft_delete_reservation(&self, id: i64) -> Result<(), Error> {
        sqlx::query("UPDATE reservations SET deleted = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_active_reservations_by_group(&self, group_id: i64) -> Result<i64, Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM reservations WHERE group_id = $1 AND deleted = FALSE",
        )
        .bind(group_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn reservations_by_group(
        &self,
        group_id: i64,
        req: PageRequest,
    ) -> Result<Page<Reservation>, Error> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM reservations WHERE group_id = $1 AND deleted = FALSE",
        )
        .bind(group_id)
        .fetch_one(&self.pool)
        .await?;
        let items = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE group_id = $1 AND deleted = FALSE \
             ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(group_id)
        .bind(req.size)
        .bind(req.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::of(items, req, total))
    }

    async fn reservations_by_professor(
        &self,
        professor_id: i64,
        req: PageRequest,
    ) -> Result<Page<Reservation>, Error> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM reservations r \
             JOIN discussions d ON d.id = r.discussion_id \
             WHERE d.professor_id = $1 AND r.deleted = FALSE",
        )
        .bind(professor_id)
        .fetch_one(&self.pool)
        .await?;
        let items = sqlx::query_as::<_, Reservation>(
            "SELECT r.* FROM reservations r \
             JOIN discussions d ON d.id = r.discussion_id \
             WHERE d.professor_id = $1 AND r.deleted = FALSE \
             ORDER BY r.id LIMIT $2 OFFSET $3",
        )
        .bind(professor_id)
        .bind(req.size)
        .bind(req.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::of(items, req, total))
    }

    async fn insert_file(
        &self,
        group_id: i64,
        name: &str,
        filename: &str,
    ) -> Result<GroupFile, Error> {
        let file = sqlx::query_as::<_, GroupFile>(
            "INSERT INTO group_files (group_id, name, filename, created_on, deleted) \
             VALUES ($1, $2, $3, NOW(), FALSE) RETURNING *",
        )
        .bind(group_id)
        .bind(name)
        .bind(filename)
        .fetch_one(&self.pool)
        .await?;
        Ok(file)
    }

    async fn file_active(&self, id: i64) -> Result<Option<GroupFile>, Error> {
        let file = sqlx::query_as::<_, GroupFile>(
            "SELECT * FROM group_files WHERE id = $1 AND deleted = FALSE LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(file)
    }

    async fn soft_delete_file(&self, id: i64) -> Result<(), Error> {
        sqlx::query("UPDATE group_files SET deleted = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn files_by_group(
        &self,
        group_id: i64,
        req: PageRequest,
    ) -> Result<Page<GroupFile>, Error> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM group_files WHERE group_id = $1 AND deleted = FALSE",
        )
        .bind(group_id)
        .fetch_one(&self.pool)
        .await?;
        let items = sqlx::query_as::<_, GroupFile>(
            "SELECT * FROM group_files WHERE group_id = $1 AND deleted = FALSE \
             ORDER BY created_on DESC LIMIT $2 OFFSET $3",
        )
        .bind(group_id)
        .bind(req.size)
        .bind(req.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::of(items, req, total))
    }
}
