use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Registration;
use crate::models::{Discussion, Group, GroupFile, Professor, Reservation, Role, Student};
use crate::store::{Page, PageRequest};
use crate::{proceeds, App, Error, Payload};

/// Body wrapper for authenticated POST/PUT calls: the session token rides
/// beside the actual payload. GET/DELETE carry it in the query string.
#[derive(Debug, Clone, Deserialize)]
pub struct Authed<V> {
    pub token: String,
    #[serde(flatten)]
    pub value: V,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagedQuery {
    pub token: String,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PagedQuery {
    fn request(&self) -> PageRequest {
        PageRequest::of(self.page, self.page_size)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenValue {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Done {}

#[derive(Debug, Clone, Deserialize)]
pub struct Login {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetRequest {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroup {
    pub professor_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameGroup {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveMember {
    pub student_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscussionData {
    pub name: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReservation {
    pub group_id: i64,
    pub discussion_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveReservation {
    pub discussion_id: i64,
}

// ----------------------------------------------------------------------
// public

pub async fn register(
    Extension(app): Extension<Arc<App>>,
    Json(data): Json<Registration>,
) -> Payload<TokenValue> {
    let token = app.auth.register(data).await?;
    proceeds(TokenValue { token })
}

pub async fn login_student(
    Extension(app): Extension<Arc<App>>,
    Json(login): Json<Login>,
) -> Payload<TokenValue> {
    let token = app
        .auth
        .login(Role::Student, &login.username, &login.password)
        .await?;
    proceeds(TokenValue { token })
}

pub async fn login_professor(
    Extension(app): Extension<Arc<App>>,
    Json(login): Json<Login>,
) -> Payload<TokenValue> {
    let token = app
        .auth
        .login(Role::Professor, &login.username, &login.password)
        .await?;
    proceeds(TokenValue { token })
}

pub async fn reset_student(
    Extension(app): Extension<Arc<App>>,
    Json(req): Json<ResetRequest>,
) -> Payload<Done> {
    app.auth.reset(Role::Student, &req.username).await?;
    proceeds(Done {})
}

pub async fn reset_professor(
    Extension(app): Extension<Arc<App>>,
    Json(req): Json<ResetRequest>,
) -> Payload<Done> {
    app.auth.reset(Role::Professor, &req.username).await?;
    proceeds(Done {})
}

// ----------------------------------------------------------------------
// student surface

pub async fn student_profile(
    Extension(app): Extension<Arc<App>>,
    Query(q): Query<TokenQuery>,
) -> Payload<Student> {
    let student = app.resolver.student(&q.token).await?;
    proceeds(student)
}

pub async fn students(
    Extension(app): Extension<Arc<App>>,
    Query(q): Query<PagedQuery>,
) -> Payload<Page<Student>> {
    app.resolver.student(&q.token).await?;
    proceeds(app.engine.students(q.request()).await?)
}

pub async fn student_by_id(
    Extension(app): Extension<Arc<App>>,
    Path(student_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Student> {
    app.resolver.student(&q.token).await?;
    proceeds(app.engine.student(student_id).await?)
}

pub async fn professors(
    Extension(app): Extension<Arc<App>>,
    Query(q): Query<PagedQuery>,
) -> Payload<Page<Professor>> {
    app.resolver.student(&q.token).await?;
    proceeds(app.engine.professors(q.request()).await?)
}

pub async fn professor_by_id(
    Extension(app): Extension<Arc<App>>,
    Path(professor_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Professor> {
    app.resolver.student(&q.token).await?;
    proceeds(app.engine.professor(professor_id).await?)
}

pub async fn student_groups(
    Extension(app): Extension<Arc<App>>,
    Query(q): Query<PagedQuery>,
) -> Payload<Page<Group>> {
    let student = app.resolver.student(&q.token).await?;
    proceeds(app.engine.student_groups(&student, q.request()).await?)
}

pub async fn group_by_id(
    Extension(app): Extension<Arc<App>>,
    Path(group_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Group> {
    app.resolver.student(&q.token).await?;
    proceeds(app.engine.group(group_id).await?)
}

pub async fn create_group(
    Extension(app): Extension<Arc<App>>,
    Json(body): Json<Authed<CreateGroup>>,
) -> Payload<Group> {
    let student = app.resolver.student(&body.token).await?;
    let group = app
        .engine
        .create_group(&student, body.value.professor_id, &body.value.name)
        .await?;
    proceeds(group)
}

pub async fn update_group(
    Extension(app): Extension<Arc<App>>,
    Path(group_id): Path<i64>,
    Json(body): Json<Authed<RenameGroup>>,
) -> Payload<Group> {
    let student = app.resolver.student(&body.token).await?;
    let group = app
        .engine
        .update_group(&student, group_id, &body.value.name)
        .await?;
    proceeds(group)
}

pub async fn delete_group(
    Extension(app): Extension<Arc<App>>,
    Path(group_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Done> {
    let student = app.resolver.student(&q.token).await?;
    app.engine.delete_group(&student, group_id).await?;
    proceeds(Done {})
}

pub async fn join_group(
    Extension(app): Extension<Arc<App>>,
    Path(group_id): Path<i64>,
    Json(body): Json<TokenQuery>,
) -> Payload<Group> {
    let student = app.resolver.student(&body.token).await?;
    proceeds(app.engine.join_group(&student, group_id).await?)
}

pub async fn leave_group(
    Extension(app): Extension<Arc<App>>,
    Path(group_id): Path<i64>,
    Json(body): Json<TokenQuery>,
) -> Payload<Done> {
    let student = app.resolver.student(&body.token).await?;
    app.engine.leave_group(&student, group_id).await?;
    proceeds(Done {})
}

pub async fn remove_member(
    Extension(app): Extension<Arc<App>>,
    Path(group_id): Path<i64>,
    Json(body): Json<Authed<RemoveMember>>,
) -> Payload<Done> {
    let student = app.resolver.student(&body.token).await?;
    app.engine
        .remove_member(&student, group_id, body.value.student_id)
        .await?;
    proceeds(Done {})
}

pub async fn discussions_of_professor(
    Extension(app): Extension<Arc<App>>,
    Path(professor_id): Path<i64>,
    Query(q): Query<PagedQuery>,
) -> Payload<Page<Discussion>> {
    app.resolver.student(&q.token).await?;
    proceeds(app.engine.discussions_of(professor_id, q.request()).await?)
}

pub async fn discussion_by_id(
    Extension(app): Extension<Arc<App>>,
    Path(discussion_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Discussion> {
    app.resolver.student(&q.token).await?;
    proceeds(app.engine.discussion(discussion_id).await?)
}

pub async fn group_reservations(
    Extension(app): Extension<Arc<App>>,
    Path(group_id): Path<i64>,
    Query(q): Query<PagedQuery>,
) -> Payload<Page<Reservation>> {
    app.resolver.student(&q.token).await?;
    proceeds(app.engine.group_reservations(group_id, q.request()).await?)
}

pub async fn reservation_by_id(
    Extension(app): Extension<Arc<App>>,
    Path(reservation_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Reservation> {
    app.resolver.student(&q.token).await?;
    proceeds(app.engine.reservation(reservation_id).await?)
}

pub async fn create_reservation(
    Extension(app): Extension<Arc<App>>,
    Json(body): Json<Authed<CreateReservation>>,
) -> Payload<Reservation> {
    let student = app.resolver.student(&body.token).await?;
    let reservation = app
        .engine
        .create_reservation(&student, body.value.group_id, body.value.discussion_id)
        .await?;
    proceeds(reservation)
}

pub async fn update_reservation(
    Extension(app): Extension<Arc<App>>,
    Path(reservation_id): Path<i64>,
    Json(body): Json<Authed<MoveReservation>>,
) -> Payload<Reservation> {
    let student = app.resolver.student(&body.token).await?;
    let reservation = app
        .engine
        .update_reservation(&student, reservation_id, body.value.discussion_id)
        .await?;
    proceeds(reservation)
}

pub async fn delete_reservation(
    Extension(app): Extension<Arc<App>>,
    Path(reservation_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Done> {
    let student = app.resolver.student(&q.token).await?;
    app.engine.delete_reservation(&student, reservation_id).await?;
    proceeds(Done {})
}

pub async fn group_files(
    Extension(app): Extension<Arc<App>>,
    Path(group_id): Path<i64>,
    Query(q): Query<PagedQuery>,
) -> Payload<Page<GroupFile>> {
    app.resolver.student(&q.token).await?;
    proceeds(app.engine.group_files(group_id, q.request()).await?)
}

pub async fn file_by_id(
    Extension(app): Extension<Arc<App>>,
    Path(file_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<GroupFile> {
    app.resolver.student(&q.token).await?;
    proceeds(app.engine.file(file_id).await?)
}

pub async fn upload_file(
    Extension(app): Extension<Arc<App>>,
    Path((group_id, name)): Path<(i64, String)>,
    Query(q): Query<TokenQuery>,
    bytes: Bytes,
) -> Payload<GroupFile> {
    let student = app.resolver.student(&q.token).await?;
    // Guard before any bytes hit the vault.
    app.engine.assert_group_admin(&student, group_id).await?;
    let stored = app.vault.store(&name, &bytes).await?;
    let file = app
        .engine
        .record_file(&student, group_id, &name, &stored)
        .await?;
    proceeds(file)
}

pub async fn download_file(
    Extension(app): Extension<Arc<App>>,
    Path(file_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Result<Vec<u8>, Error> {
    app.resolver.student(&q.token).await?;
    let file = app.engine.file(file_id).await?;
    app.vault.read(&file.filename).await
}

pub async fn delete_file(
    Extension(app): Extension<Arc<App>>,
    Path(file_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Done> {
    let student = app.resolver.student(&q.token).await?;
    app.engine.delete_file(&student, file_id).await?;
    proceeds(Done {})
}

// ----------------------------------------------------------------------
// professor surface

pub async fn professor_profile(
    Extension(app): Extension<Arc<App>>,
    Query(q): Query<TokenQuery>,
) -> Payload<Professor> {
    let professor = app.resolver.professor(&q.token).await?;
    proceeds(professor)
}

pub async fn professor_students(
    Extension(app): Extension<Arc<App>>,
    Query(q): Query<PagedQuery>,
) -> Payload<Page<Student>> {
    app.resolver.professor(&q.token).await?;
    proceeds(app.engine.students(q.request()).await?)
}

pub async fn professor_student_by_id(
    Extension(app): Extension<Arc<App>>,
    Path(student_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Student> {
    app.resolver.professor(&q.token).await?;
    proceeds(app.engine.student(student_id).await?)
}

pub async fn professor_groups(
    Extension(app): Extension<Arc<App>>,
    Query(q): Query<PagedQuery>,
) -> Payload<Page<Group>> {
    let professor = app.resolver.professor(&q.token).await?;
    proceeds(app.engine.professor_groups(&professor, q.request()).await?)
}

pub async fn professor_group_by_id(
    Extension(app): Extension<Arc<App>>,
    Path(group_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Group> {
    app.resolver.professor(&q.token).await?;
    proceeds(app.engine.group(group_id).await?)
}

pub async fn professor_discussions(
    Extension(app): Extension<Arc<App>>,
    Query(q): Query<PagedQuery>,
) -> Payload<Page<Discussion>> {
    let professor = app.resolver.professor(&q.token).await?;
    proceeds(
        app.engine
            .discussions_of(professor.id, q.request())
            .await?,
    )
}

pub async fn professor_discussion_by_id(
    Extension(app): Extension<Arc<App>>,
    Path(discussion_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Discussion> {
    app.resolver.professor(&q.token).await?;
    proceeds(app.engine.discussion(discussion_id).await?)
}

pub async fn create_discussion(
    Extension(app): Extension<Arc<App>>,
    Json(body): Json<Authed<DiscussionData>>,
) -> Payload<Discussion> {
    let professor = app.resolver.professor(&body.token).await?;
    let discussion = app
        .engine
        .create_discussion(&professor, &body.value.name, body.value.date)
        .await?;
    proceeds(discussion)
}

pub async fn update_discussion(
    Extension(app): Extension<Arc<App>>,
    Path(discussion_id): Path<i64>,
    Json(body): Json<Authed<DiscussionData>>,
) -> Payload<Discussion> {
    let professor = app.resolver.professor(&body.token).await?;
    let discussion = app
        .engine
        .update_discussion(&professor, discussion_id, &body.value.name, body.value.date)
        .await?;
    proceeds(discussion)
}

pub async fn delete_discussion(
    Extension(app): Extension<Arc<App>>,
    Path(discussion_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Done> {
    let professor = app.resolver.professor(&q.token).await?;
    app.engine.delete_discussion(&professor, discussion_id).await?;
    proceeds(Done {})
}

pub async fn professor_reservations(
    Extension(app): Extension<Arc<App>>,
    Query(q): Query<PagedQuery>,
) -> Payload<Page<Reservation>> {
    let professor = app.resolver.professor(&q.token).await?;
    proceeds(
        app.engine
            .professor_reservations(&professor, q.request())
            .await?,
    )
}

pub async fn professor_delete_reservation(
    Extension(app): Extension<Arc<App>>,
    Path(reservation_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<Done> {
    let professor = app.resolver.professor(&q.token).await?;
    app.engine
        .professor_delete_reservation(&professor, reservation_id)
        .await?;
    proceeds(Done {})
}

pub async fn professor_group_files(
    Extension(app): Extension<Arc<App>>,
    Path(group_id): Path<i64>,
    Query(q): Query<PagedQuery>,
) -> Payload<Page<GroupFile>> {
    app.resolver.professor(&q.token).await?;
    proceeds(app.engine.group_files(group_id, q.request()).await?)
}

pub async fn professor_file_by_id(
    Extension(app): Extension<Arc<App>>,
    Path(file_id): Path<i64>,
    Query(q): Query<TokenQuery>,
) -> Payload<GroupFile> {
    app.resolver.professor(&q.token).await?;
    proceeds(app.engine.file(file_id).await?)
}
