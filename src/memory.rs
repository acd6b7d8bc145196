use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    Account, Discussion, FellowStudent, Group, GroupFile, Lifecycle, Professor, Reservation, Role,
    Student,
};
use crate::store::{Page, PageRequest, Store};
use crate::Error;

/// In-memory storage backend. One mutex over the whole state, so every
/// multi-row mutation (notably the discussion-delete cascade) is naturally
/// atomic. Backs the test suites; also handy for local experiments without
/// a database.
#[derive(Clone, Default)]
pub struct MemStore(Arc<Mutex<Inner>>);

#[derive(Default)]
struct Inner {
    next_id: i64,
    accounts: Vec<Account>,
    students: Vec<Student>,
    professors: Vec<Professor>,
    groups: Vec<Group>,
    fellows: Vec<FellowStudent>,
    discussions: Vec<Discussion>,
    reservations: Vec<Reservation>,
    files: Vec<GroupFile>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut inner)
    }
}

fn active<T: Lifecycle>(rows: &[T]) -> impl Iterator<Item = &T> {
    rows.iter().filter(|row| row.is_active())
}

fn paginate<T: Clone>(matching: Vec<&T>, req: PageRequest) -> Page<T> {
    let total = matching.len() as i64;
    let items = matching
        .into_iter()
        .skip(req.offset() as usize)
        .take(req.size as usize)
        .cloned()
        .collect();
    Page::of(items, req, total)
}

#[async_trait]
impl Store for MemStore {
    async fn account_by_username(&self, username: &str) -> Result<Option<Account>, Error> {
        self.with(|s| {
            Ok(s.accounts
                .iter()
                .find(|a| a.username == username)
                .cloned())
        })
    }

    async fn account_by_login(
        &self,
        role: Role,
        username: &str,
    ) -> Result<Option<Account>, Error> {
        self.with(|s| {
            Ok(s.accounts
                .iter()
                .find(|a| a.role == role && a.username == username)
                .cloned())
        })
    }

    async fn account_by_credentials(
        &self,
        role: Role,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<Account>, Error> {
        self.with(|s| {
            Ok(s.accounts
                .iter()
                .find(|a| {
                    a.role == role && a.username == username && a.password_hash == password_hash
                })
                .cloned())
        })
    }

    async fn insert_account(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Account, Error> {
        self.with(|s| {
            let account = Account {
                id: s.next_id(),
                username: username.to_owned(),
                password_hash: password_hash.to_owned(),
                role,
            };
            s.accounts.push(account.clone());
            Ok(account)
        })
    }

    async fn update_account_password(
        &self,
        account_id: i64,
        password_hash: &str,
    ) -> Result<(), Error> {
        self.with(|s| {
            if let Some(account) = s.accounts.iter_mut().find(|a| a.id == account_id) {
                account.password_hash = password_hash.to_owned();
            }
            Ok(())
        })
    }

    async fn insert_student(
        &self,
        account_id: i64,
        name: &str,
        surname: &str,
    ) -> Result<Student, Error> {
        self.with(|s| {
            let student = Student {
                id: s.next_id(),
                account_id,
                name: name.to_owned(),
                surname: surname.to_owned(),
            };
            s.students.push(student.clone());
            Ok(student)
        })
    }

    async fn student_by_account(&self, account_id: i64) -> Result<Option<Student>, Error> {
        self.with(|s| {
            Ok(s.students
                .iter()
                .find(|st| st.account_id == account_id)
                .cloned())
        })
    }

    async fn student_by_id(&self, id: i64) -> Result<Option<Student>, Error> {
        self.with(|s| Ok(s.students.iter().find(|st| st.id == id).cloned()))
    }

    async fn students(&self, req: PageRequest) -> Result<Page<Student>, Error> {
        self.with(|s| Ok(paginate(s.students.iter().collect(), req)))
    }

    async fn insert_professor(
        &self,
        account_id: i64,
        name: &str,
        surname: &str,
    ) -> Result<Professor, Error> {
        self.with(|s| {
            let professor = Professor {
                id: s.next_id(),
                account_id,
                name: name.to_owned(),
                surname: surname.to_owned(),
            };
            s.professors.push(professor.clone());
            Ok(professor)
        })
    }

    async fn professor_by_account(&self, account_id: i64) -> Result<Option<Professor>, Error> {
        self.with(|s| {
            Ok(s.professors
                .iter()
                .find(|p| p.account_id == account_id)
                .cloned())
        })
    }

    async fn professor_by_id(&self, id: i64) -> Result<Option<Professor>, Error> {
        self.with(|s| Ok(s.professors.iter().find(|p| p.id == id).cloned()))
    }

    async fn professors(&self, req: PageRequest) -> Result<Page<Professor>, Error> {
        self.with(|s| Ok(paginate(s.professors.iter().collect(), req)))
    }

    async fn insert_group(
        &self,
        professor_id: i64,
        admin_id: i64,
        name: &str,
    ) -> Result<Group, Error> {
        self.with(|s| {
            let group = Group {
                id: s.next_id(),
                professor_id,
                admin_id,
                name: name.to_owned(),
                deleted: false,
            };
            s.groups.push(group.clone());
            Ok(group)
        })
    }

    async fn group_active(&self, id: i64) -> Result<Option<Group>, Error> {
        self.with(|s| Ok(active(&s.groups).find(|g| g.id == id).cloned()))
    }

    async fn update_group_name(&self, id: i64, name: &str) -> Result<Group, Error> {
        self.with(|s| {
            let group = s
                .groups
                .iter_mut()
                .find(|g| g.id == id && g.is_active())
                .ok_or_else(|| Error::not_found("Invalid groupId"))?;
            group.name = name.to_owned();
            Ok(group.clone())
        })
    }

    async fn soft_delete_group(&self, id: i64) -> Result<(), Error> {
        self.with(|s| {
            if let Some(group) = s.groups.iter_mut().find(|g| g.id == id) {
                group.mark_deleted();
            }
            Ok(())
        })
    }

    async fn count_groups_by_admin_and_professor(
        &self,
        admin_id: i64,
        professor_id: i64,
    ) -> Result<i64, Error> {
        self.with(|s| {
            Ok(active(&s.groups)
                .filter(|g| g.admin_id == admin_id && g.professor_id == professor_id)
                .count() as i64)
        })
    }

    async fn groups_by_member(
        &self,
        student_id: i64,
        req: PageRequest,
    ) -> Result<Page<Group>, Error> {
        self.with(|s| {
            let memberships: Vec<i64> = active(&s.fellows)
                .filter(|f| f.student_id == student_id)
                .map(|f| f.group_id)
                .collect();
            let matching = active(&s.groups)
                .filter(|g| g.admin_id == student_id || memberships.contains(&g.id))
                .collect();
            Ok(paginate(matching, req))
        })
    }

    async fn groups_by_professor(
        &self,
        professor_id: i64,
        req: PageRequest,
    ) -> Result<Page<Group>, Error> {
        self.with(|s| {
            let matching = active(&s.groups)
                .filter(|g| g.professor_id == professor_id)
                .collect();
            Ok(paginate(matching, req))
        })
    }

    async fn fellows_active_by_group(&self, group_id: i64) -> Result<Vec<FellowStudent>, Error> {
        self.with(|s| {
            Ok(active(&s.fellows)
                .filter(|f| f.group_id == group_id)
                .cloned()
                .collect())
        })
    }

    async fn fellow_active(
        &self,
        student_id: i64,
        group_id: i64,
    ) -> Result<Option<FellowStudent>, Error> {
        self.with(|s| {
            Ok(active(&s.fellows)
                .find(|f| f.student_id == student_id && f.group_id == group_id)
                .cloned())
        })
    }

    async fn insert_fellow(
        &self,
        student_id: i64,
        group_id: i64,
    ) -> Result<FellowStudent, Error> {
        self.with(|s| {
            let fellow = FellowStudent {
                id: s.next_id(),
                student_id,
                group_id,
                deleted: false,
            };
            s.fellows.push(fellow.clone());
            Ok(fellow)
        })
    }

    async fn soft_delete_fellow(&self, id: i64) -> Result<(), Error> {
        self.with(|s| {
            if let Some(fellow) = s.fellows.iter_mut().find(|f| f.id == id) {
                fellow.mark_deleted();
            }
            Ok(())
        })
    }

    async fn insert_discussion(
        &self,
        professor_id: i64,
        name: &str,
        date: DateTime<Utc>,
    ) -> Result<Discussion, Error> {
        self.with(|s| {
            let discussion = Discussion {
                id: s.next_id(),
                professor_id,
                name: name.to_owned(),
                date,
                deleted: false,
            };
            s.discussions.push(discussion.clone());
            Ok(discussion)
        })
    }

    async fn discussion_active(&self, id: i64) -> Result<Option<Discussion>, Error> {
        self.with(|s| Ok(active(&s.discussions).find(|d| d.id == id).cloned()))
    }

    async fn update_discussion(
        &self,
        id: i64,
        name: &str,
        date: DateTime<Utc>,
    ) -> Result<Discussion, Error> {
        self.with(|s| {
            let discussion = s
                .discussions
                .iter_mut()
                .find(|d| d.id == id && d.is_active())
                .ok_or_else(|| Error::not_found("Invalid discussionId"))?;
            discussion.name = name.to_owned();
            discussion.date = date;
            Ok(discussion.clone())
        })
    }

    async fn soft_delete_discussion_cascade(&self, id: i64) -> Result<(), Error> {
        // Single lock held throughout, so the cascade is atomic.
        self.with(|s| {
            if let Some(discussion) = s.discussions.iter_mut().find(|d| d.id == id) {
                discussion.mark_deleted();
            }
            for reservation in s
                .reservations
                .iter_mut()
                .filter(|r| r.discussion_id == id && r.is_active())
            {
                reservation.mark_deleted();
            }
            Ok(())
        })
    }

    async fn discussions_by_professor(
        &self,
        professor_id: i64,
        req: PageRequest,
    ) -> Result<Page<Discussion>, Error> {
        self.with(|s| {
            let matching = active(&s.discussions)
                .filter(|d| d.professor_id == professor_id)
                .collect();
            Ok(paginate(matching, req))
        })
    }

    async fn insert_reservation(
        &self,
        group_id: i64,
        discussion_id: i64,
    ) -> Result<Reservation, Error> {
        self.with(|s| {
            let reservation = Reservation {
                id: s.next_id(),
                group_id,
                discussion_id,
                deleted: false,
            };
            s.reservations.push(reservation.clone());
            Ok(reservation)
        })
    }

    async fn reservation_active(&self, id: i64) -> Result<Option<Reservation>, Error> {
        self.with(|s| Ok(active(&s.reservations).find(|r| r.id == id).cloned()))
    }

    async fn update_reservation_discussion(
        &self,
        id: i64,
        discussion_id: i64,
    ) -> Result<Reservation, Error> {
        self.with(|s| {
            let reservation = s
                .reservations
                .iter_mut()
                .find(|r| r.id == id && r.is_active())
                .ok_or_else(|| Error::not_found("Invalid reservationId"))?;
            reservation.discussion_id = discussion_id;
            Ok(reservation.clone())
        })
    }

    async fn soft_delete_reservation(&self, id: i64) -> Result<(), Error> {
        self.with(|s| {
            if let Some(reservation) = s.reservations.iter_mut().find(|r| r.id == id) {
                reservation.mark_deleted();
            }
            Ok(())
        })
    }

    async fn count_active_reservations_by_group(&self, group_id: i64) -> Result<i64, Error> {
        self.with(|s| {
            Ok(active(&s.reservations)
                .filter(|r| r.group_id == group_id)
                .count() as i64)
        })
    }

    async fn reservations_by_group(
        &self,
        group_id: i64,
        req: PageRequest,
    ) -> Result<Page<Reservation>, Error> {
        self.with(|s| {
            let matching = active(&s.reservations)
                .filter(|r| r.group_id == group_id)
                .collect();
            Ok(paginate(matching, req))
        })
    }

    async fn reservations_by_professor(
        &self,
        professor_id: i64,
        req: PageRequest,
    ) -> Result<Page<Reservation>, Error> {
        self.with(|s| {
            let owned: Vec<i64> = s
                .discussions
                .iter()
                .filter(|d| d.professor_id == professor_id)
                .map(|d| d.id)
                .collect();
            let matching = active(&s.reservations)
                .filter(|r| owned.contains(&r.discussion_id))
                .collect();
            Ok(paginate(matching, req))
        })
    }

    async fn insert_file(
        &self,
        group_id: i64,
        name: &str,
        filename: &str,
    ) -> Result<GroupFile, Error> {
        self.with(|s| {
            let file = GroupFile {
                id: s.next_id(),
                group_id,
                name: name.to_owned(),
                filename: filename.to_owned(),
                created_on: Utc::now(),
                deleted: false,
            };
            s.files.push(file.clone());
            Ok(file)
        })
    }

    async fn file_active(&self, id: i64) -> Result<Option<GroupFile>, Error> {
        self.with(|s| Ok(active(&s.files).find(|f| f.id == id).cloned()))
    }

    async fn soft_delete_file(&self, id: i64) -> Result<(), Error> {
        self.with(|s| {
            if let Some(file) = s.files.iter_mut().find(|f| f.id == id) {
                file.mark_deleted();
            }
            Ok(())
        })
    }

    async fn files_by_group(
        &self,
        group_id: i64,
        req: PageRequest,
    ) -> Result<Page<GroupFile>, Error> {
        self.with(|s| {
            let mut matching: Vec<&GroupFile> = active(&s.files)
                .filter(|f| f.group_id == group_id)
                .collect();
            matching.sort_by(|a, b| b.created_on.cmp(&a.created_on));
            Ok(paginate(matching, req))
        })
    }
}
