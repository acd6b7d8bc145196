pub mod auth;
pub mod engine;
pub mod err;
pub mod http;
pub mod io;
pub mod mail;
pub mod memory;
pub mod models;
pub mod pg;
pub mod principal;
pub mod store;
pub mod token;

use axum::handler::Handler;
use axum::http::Uri;
use axum::routing::{delete, get, post, put};
use axum::{Extension, Json, Router};

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;

use crate::auth::Authenticator;
use crate::engine::Engine;
use crate::err::{Error, Success};
use crate::io::FileVault;
use crate::mail::LogMailer;
use crate::pg::PgStore;
use crate::principal::Resolver;
use crate::token::TokenService;

pub type Payload<T> = axum::response::Result<Json<Success<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Success::of(value)))
}

/// Everything a handler needs, shared behind one `Arc`.
pub struct App {
    pub auth: Authenticator<PgStore, LogMailer>,
    pub resolver: Resolver<PgStore>,
    pub engine: Engine<PgStore>,
    pub vault: FileVault,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let database_url = env_or("DATABASE_URL", "postgres://localhost/campus");
    let token_secret = env_or("TOKEN_SECRET", "campus-dev-secret");
    let token_ttl: i64 = env_or("TOKEN_TTL_HOURS", "48").parse()?;
    let upload_dir = env_or("UPLOAD_DIR", "uploads");
    let bind = env_or("BIND_ADDR", "127.0.0.1:3000");

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&database_url)
        .await?;
    let store = PgStore::new(pool);
    let tokens = TokenService::new(token_secret.as_bytes(), Duration::hours(token_ttl));
    let vault = FileVault::new(&upload_dir);
    vault.prepare().await.map_err(|e| anyhow::anyhow!("{:?}", e))?;

    let app = Arc::new(App {
        auth: Authenticator::new(store.clone(), tokens.clone(), LogMailer),
        resolver: Resolver::new(store.clone(), tokens),
        engine: Engine::new(store),
        vault,
    });

    let router = Router::new()
        // public
        .route("/public/register", post(http::register))
        .route("/public/student/login", post(http::login_student))
        .route("/public/professor/login", post(http::login_professor))
        .route("/public/student/reset", post(http::reset_student))
        .route("/public/professor/reset", post(http::reset_professor))
        // student
        .route("/student/profile", get(http::student_profile))
        .route("/student/students", get(http::students))
        .route("/student/students/:id", get(http::student_by_id))
        .route("/student/professors", get(http::professors))
        .route("/student/professors/:id", get(http::professor_by_id))
        .route(
            "/student/groups",
            get(http::student_groups).post(http::create_group),
        )
        .route(
            "/student/groups/:id",
            get(http::group_by_id)
                .put(http::update_group)
                .delete(http::delete_group),
        )
        .route("/student/groups/:id/join", post(http::join_group))
        .route("/student/groups/:id/leave", post(http::leave_group))
        .route("/student/groups/:id/members", delete(http::remove_member))
        .route(
            "/student/professors/:id/discussions",
            get(http::discussions_of_professor),
        )
        .route("/student/discussions/:id", get(http::discussion_by_id))
        .route(
            "/student/groups/:id/reservations",
            get(http::group_reservations),
        )
        .route("/student/reservations", post(http::create_reservation))
        .route(
            "/student/reservations/:id",
            get(http::reservation_by_id)
                .put(http::update_reservation)
                .delete(http::delete_reservation),
        )
        .route("/student/groups/:id/files", get(http::group_files))
        .route(
            "/student/groups/:id/files/:name",
            put(http::upload_file),
        )
        .route(
            "/student/files/:id",
            get(http::file_by_id).delete(http::delete_file),
        )
        .route("/student/files/:id/content", get(http::download_file))
        // professor
        .route("/professor/profile", get(http::professor_profile))
        .route("/professor/students", get(http::professor_students))
        .route(
            "/professor/students/:id",
            get(http::professor_student_by_id),
        )
        .route("/professor/groups", get(http::professor_groups))
        .route("/professor/groups/:id", get(http::professor_group_by_id))
        .route(
            "/professor/discussions",
            get(http::professor_discussions).post(http::create_discussion),
        )
        .route(
            "/professor/discussions/:id",
            get(http::professor_discussion_by_id)
                .put(http::update_discussion)
                .delete(http::delete_discussion),
        )
        .route(
            "/professor/reservations",
            get(http::professor_reservations),
        )
        .route(
            "/professor/reservations/:id",
            delete(http::professor_delete_reservation),
        )
        .route(
            "/professor/groups/:id/files",
            get(http::professor_group_files),
        )
        .route("/professor/files/:id", get(http::professor_file_by_id))
        .fallback(err::handler404.into_service())
        .layer(Extension(app));

    let addr: SocketAddr = bind.parse()?;
    log::info!("Starting Campus HTTP Server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}
