use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_role")]
pub enum Role {
    Student,
    Professor,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "Student"),
            Role::Professor => write!(f, "Professor"),
        }
    }
}

/// Login credentials. Never leaves the process: no `Serialize`, so the
/// password hash cannot end up in a response body by accident.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub surname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Professor {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub surname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: i64,
    pub professor_id: i64,
    pub admin_id: i64,
    pub name: String,
    pub deleted: bool,
}

/// A non-admin member of a group. The admin is implicitly a member and never
/// has a row here.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FellowStudent {
    pub id: i64,
    pub student_id: i64,
    pub group_id: i64,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Discussion {
    pub id: i64,
    pub professor_id: i64,
    pub name: String,
    pub date: DateTime<Utc>,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reservation {
    pub id: i64,
    pub group_id: i64,
    pub discussion_id: i64,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupFile {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
    pub filename: String,
    pub created_on: DateTime<Utc>,
    pub deleted: bool,
}

/// Lifecycle of every soft-deletable entity: `Active -> Deleted`, terminal.
/// Deleted rows stay in storage for audit but are invisible to active
/// queries, which filter through this trait in one place.
pub trait Lifecycle {
    fn is_deleted(&self) -> bool;
    fn mark_deleted(&mut self);

    fn is_active(&self) -> bool {
        !self.is_deleted()
    }
}

macro_rules! lifecycle {
    ($($entity:ty),+ $(,)?) => {
        $(impl Lifecycle for $entity {
            fn is_deleted(&self) -> bool {
                self.deleted
            }

            fn mark_deleted(&mut self) {
                self.deleted = true;
            }
        })+
    };
}

lifecycle!(Group, FellowStudent, Discussion, Reservation, GroupFile);
