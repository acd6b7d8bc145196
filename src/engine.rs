use chrono::{DateTime, Utc};

use crate::err::ConflictKind;
use crate::models::{
    Discussion, Group, GroupFile, Professor, Reservation, Student,
};
use crate::store::{Page, PageRequest, Store};
use crate::Error;

const NAME_MAX: usize = 100;

// Caps are character counts, not byte lengths.
fn name_too_long(name: &str) -> bool {
    name.chars().count() > NAME_MAX
}

/// The four entity state machines and their transition guards. Every method
/// takes the resolved actor explicitly; nothing here reads ambient security
/// state. Temporal guards are evaluated against the wall clock at call time.
pub struct Engine<S> {
    store: S,
}

impl<S: Store> Engine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    // ------------------------------------------------------------------
    // groups

    pub async fn create_group(
        &self,
        actor: &Student,
        professor_id: i64,
        name: &str,
    ) -> Result<Group, Error> {
        if name_too_long(name) {
            return Err(Error::validation("Invalid records length"));
        }
        self.store
            .professor_by_id(professor_id)
            .await?
            .ok_or_else(|| Error::not_found("Invalid professorId"))?;

        let existing = self
            .store
            .count_groups_by_admin_and_professor(actor.id, professor_id)
            .await?;
        if existing > 0 {
            return Err(Error::conflict(
                ConflictKind::AlreadyMember,
                "Already in a group with this professor",
            ));
        }

        log::info!("student {} opens a group under professor {}", actor.id, professor_id);
        self.store.insert_group(professor_id, actor.id, name).await
    }

    pub async fn update_group(
        &self,
        actor: &Student,
        group_id: i64,
        name: &str,
    ) -> Result<Group, Error> {
        if name_too_long(name) {
            return Err(Error::validation("Invalid records length"));
        }
        let group = self.active_group(group_id).await?;
        Self::require_admin(actor, &group)?;
        self.store.update_group_name(group_id, name).await
    }

    pub async fn delete_group(&self, actor: &Student, group_id: i64) -> Result<(), Error> {
        let group = self.active_group(group_id).await?;
        Self::require_admin(actor, &group)?;
        self.store.soft_delete_group(group_id).await
    }

    pub async fn join_group(&self, actor: &Student, group_id: i64) -> Result<Group, Error> {
        let group = self.active_group(group_id).await?;
        let fellows = self.store.fellows_active_by_group(group_id).await?;

        if group.admin_id == actor.id || fellows.iter().any(|f| f.student_id == actor.id) {
            return Err(Error::conflict(
                ConflictKind::AlreadyMember,
                "You are already in this group",
            ));
        }
        // Capacity is 3: the admin plus two fellows.
        if fellows.len() >= 2 {
            return Err(Error::conflict(ConflictKind::GroupFull, "The group is full"));
        }

        self.store.insert_fellow(actor.id, group_id).await?;
        Ok(group)
    }

    pub async fn leave_group(&self, actor: &Student, group_id: i64) -> Result<(), Error> {
        let group = self.active_group(group_id).await?;
        if group.admin_id == actor.id {
            return Err(Error::conflict(
                ConflictKind::MustDeleteInstead,
                "Unable to leave, but you can delete this group",
            ));
        }

        let fellow = self
            .store
            .fellow_active(actor.id, group_id)
            .await?
            .ok_or_else(|| Error::not_found("You are not in this group"))?;
        self.store.soft_delete_fellow(fellow.id).await
    }

    pub async fn remove_member(
        &self,
        actor: &Student,
        group_id: i64,
        student_id: i64,
    ) -> Result<(), Error> {
        let group = self.active_group(group_id).await?;
        Self::require_admin(actor, &group)?;

        let fellow = self
            .store
            .fellow_active(student_id, group_id)
            .await?
            .ok_or_else(|| Error::not_found("Invalid studentId"))?;
        self.store.soft_delete_fellow(fellow.id).await
    }

    pub async fn group(&self, group_id: i64) -> Result<Group, Error> {
        self.active_group(group_id).await
    }

    pub async fn student_groups(
        &self,
        actor: &Student,
        req: PageRequest,
    ) -> Result<Page<Group>, Error> {
        self.store.groups_by_member(actor.id, req).await
    }

    pub async fn professor_groups(
        &self,
        actor: &Professor,
        req: PageRequest,
    ) -> Result<Page<Group>, Error> {
        self.store.groups_by_professor(actor.id, req).await
    }

    // ------------------------------------------------------------------
    // discussions

    pub async fn create_discussion(
        &self,
        actor: &Professor,
        name: &str,
        date: DateTime<Utc>,
    ) -> Result<Discussion, Error> {
        if name_too_long(name) {
            return Err(Error::validation("Invalid records length"));
        }
        if date <= Utc::now() {
            return Err(Error::conflict(
                ConflictKind::PastDate,
                "Unable to create a discussion with an earlier date than the current one",
            ));
        }
        self.store.insert_discussion(actor.id, name, date).await
    }

    pub async fn update_discussion(
        &self,
        actor: &Professor,
        discussion_id: i64,
        name: &str,
        date: DateTime<Utc>,
    ) -> Result<Discussion, Error> {
        if name_too_long(name) {
            return Err(Error::validation("Invalid records length"));
        }
        let discussion = self.active_discussion(discussion_id).await?;
        Self::require_discussion_owner(actor, &discussion)?;

        let now = Utc::now();
        if now > discussion.date {
            return Err(Error::conflict(
                ConflictKind::Immutable,
                "Unable to update a past discussion",
            ));
        }
        if date <= now {
            return Err(Error::conflict(
                ConflictKind::PastDate,
                "Unable to update the date with an earlier one than the current",
            ));
        }
        self.store.update_discussion(discussion_id, name, date).await
    }

    /// Soft-deletes the discussion together with every active reservation
    /// referencing it; the storage contract makes the cascade atomic.
    pub async fn delete_discussion(
        &self,
        actor: &Professor,
        discussion_id: i64,
    ) -> Result<(), Error> {
        let discussion = self.active_discussion(discussion_id).await?;
        Self::require_discussion_owner(actor, &discussion)?;

        if Utc::now() > discussion.date {
            return Err(Error::conflict(
                ConflictKind::Immutable,
                "Unable to delete a past discussion",
            ));
        }

        log::info!("discussion {} deleted, cascading reservations", discussion_id);
        self.store.soft_delete_discussion_cascade(discussion_id).await
    }

    pub async fn discussion(&self, discussion_id: i64) -> Result<Discussion, Error> {
        self.active_discussion(discussion_id).await
    }

    pub async fn discussions_of(
        &self,
        professor_id: i64,
        req: PageRequest,
    ) -> Result<Page<Discussion>, Error> {
        self.store.discussions_by_professor(professor_id, req).await
    }

    // ------------------------------------------------------------------
    // reservations

    pub async fn create_reservation(
        &self,
        actor: &Student,
        group_id: i64,
        discussion_id: i64,
    ) -> Result<Reservation, Error> {
        let group = self.active_group(group_id).await?;
        Self::require_admin(actor, &group)?;

        let discussion = self.active_discussion(discussion_id).await?;
        if Utc::now() > discussion.date {
            return Err(Error::conflict(
                ConflictKind::PastDiscussion,
                "Unable to create a reservation for a past discussion",
            ));
        }

        // At most one active reservation per group, whatever the discussion.
        let held = self
            .store
            .count_active_reservations_by_group(group_id)
            .await?;
        if held > 0 {
            return Err(Error::conflict(
                ConflictKind::DuplicateReservation,
                "Already exist a reservation",
            ));
        }

        self.store.insert_reservation(group_id, discussion_id).await
    }

    pub async fn update_reservation(
        &self,
        actor: &Student,
        reservation_id: i64,
        discussion_id: i64,
    ) -> Result<Reservation, Error> {
        let reservation = self.active_reservation(reservation_id).await?;
        let group = self.active_group(reservation.group_id).await?;
        Self::require_admin(actor, &group)?;
        self.require_linked_discussion_open(&reservation).await?;

        let target = self.active_discussion(discussion_id).await?;
        if Utc::now() > target.date {
            return Err(Error::conflict(
                ConflictKind::PastDiscussion,
                "Unable to move a reservation to a past discussion",
            ));
        }

        self.store
            .update_reservation_discussion(reservation_id, discussion_id)
            .await
    }

    pub async fn delete_reservation(
        &self,
        actor: &Student,
        reservation_id: i64,
    ) -> Result<(), Error> {
        let reservation = self.active_reservation(reservation_id).await?;
        let group = self.active_group(reservation.group_id).await?;
        Self::require_admin(actor, &group)?;
        self.require_linked_discussion_open(&reservation).await?;

        self.store.soft_delete_reservation(reservation_id).await
    }

    /// Professor-side delete: the owner of the linked discussion may drop a
    /// reservation, under the same temporal freeze as the admin.
    pub async fn professor_delete_reservation(
        &self,
        actor: &Professor,
        reservation_id: i64,
    ) -> Result<(), Error> {
        let reservation = self.active_reservation(reservation_id).await?;
        let discussion = self.active_discussion(reservation.discussion_id).await?;
        Self::require_discussion_owner(actor, &discussion)?;
        if Utc::now() > discussion.date {
            return Err(Error::conflict(
                ConflictKind::Immutable,
                "Unable to delete a past reservation",
            ));
        }

        self.store.soft_delete_reservation(reservation_id).await
    }

    pub async fn reservation(&self, reservation_id: i64) -> Result<Reservation, Error> {
        self.active_reservation(reservation_id).await
    }

    pub async fn group_reservations(
        &self,
        group_id: i64,
        req: PageRequest,
    ) -> Result<Page<Reservation>, Error> {
        self.store.reservations_by_group(group_id, req).await
    }

    pub async fn professor_reservations(
        &self,
        actor: &Professor,
        req: PageRequest,
    ) -> Result<Page<Reservation>, Error> {
        self.store.reservations_by_professor(actor.id, req).await
    }

    // ------------------------------------------------------------------
    // files

    /// Admin check only; call before streaming any bytes to the vault.
    pub async fn assert_group_admin(&self, actor: &Student, group_id: i64) -> Result<(), Error> {
        let group = self.active_group(group_id).await?;
        Self::require_admin(actor, &group)
    }

    pub async fn record_file(
        &self,
        actor: &Student,
        group_id: i64,
        name: &str,
        stored: &str,
    ) -> Result<GroupFile, Error> {
        self.assert_group_admin(actor, group_id).await?;
        self.store.insert_file(group_id, name, stored).await
    }

    pub async fn delete_file(&self, actor: &Student, file_id: i64) -> Result<(), Error> {
        let file = self
            .store
            .file_active(file_id)
            .await?
            .ok_or_else(|| Error::not_found("Invalid fileId"))?;
        let group = self.active_group(file.group_id).await?;
        Self::require_admin(actor, &group)?;
        self.store.soft_delete_file(file.id).await
    }

    pub async fn file(&self, file_id: i64) -> Result<GroupFile, Error> {
        self.store
            .file_active(file_id)
            .await?
            .ok_or_else(|| Error::not_found("Invalid fileId"))
    }

    pub async fn group_files(
        &self,
        group_id: i64,
        req: PageRequest,
    ) -> Result<Page<GroupFile>, Error> {
        self.store.files_by_group(group_id, req).await
    }

    // ------------------------------------------------------------------
    // directory reads

    pub async fn student(&self, student_id: i64) -> Result<Student, Error> {
        self.store
            .student_by_id(student_id)
            .await?
            .ok_or_else(|| Error::not_found("Invalid studentId"))
    }

    pub async fn students(&self, req: PageRequest) -> Result<Page<Student>, Error> {
        self.store.students(req).await
    }

    pub async fn professor(&self, professor_id: i64) -> Result<Professor, Error> {
        self.store
            .professor_by_id(professor_id)
            .await?
            .ok_or_else(|| Error::not_found("Invalid professorId"))
    }

    pub async fn professors(&self, req: PageRequest) -> Result<Page<Professor>, Error> {
        self.store.professors(req).await
    }

    // ------------------------------------------------------------------
    // shared guards

    async fn active_group(&self, group_id: i64) -> Result<Group, Error> {
        self.store
            .group_active(group_id)
            .await?
            .ok_or_else(|| Error::not_found("Invalid groupId"))
    }

    async fn active_discussion(&self, discussion_id: i64) -> Result<Discussion, Error> {
        self.store
            .discussion_active(discussion_id)
            .await?
            .ok_or_else(|| Error::not_found("Invalid discussionId"))
    }

    async fn active_reservation(&self, reservation_id: i64) -> Result<Reservation, Error> {
        self.store
            .reservation_active(reservation_id)
            .await?
            .ok_or_else(|| Error::not_found("Invalid reservationId"))
    }

    fn require_admin(actor: &Student, group: &Group) -> Result<(), Error> {
        if group.admin_id != actor.id {
            return Err(Error::forbidden("You are not the admin of this group"));
        }
        Ok(())
    }

    fn require_discussion_owner(actor: &Professor, discussion: &Discussion) -> Result<(), Error> {
        if discussion.professor_id != actor.id {
            return Err(Error::forbidden(
                "You are not the professor of this discussion",
            ));
        }
        Ok(())
    }

    /// A reservation freezes once its linked discussion is in the past, no
    /// matter when the reservation itself was created.
    async fn require_linked_discussion_open(
        &self,
        reservation: &Reservation,
    ) -> Result<(), Error> {
        let discussion = self.active_discussion(reservation.discussion_id).await?;
        if Utc::now() > discussion.date {
            return Err(Error::conflict(
                ConflictKind::Immutable,
                "The linked discussion has already taken place",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::memory::MemStore;
    use crate::models::Role;
    use crate::store::Store;

    struct Fixture {
        store: MemStore,
        engine: Engine<MemStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = MemStore::new();
            Self {
                engine: Engine::new(store.clone()),
                store,
            }
        }

        async fn student(&self, tag: &str) -> Student {
            let account = self
                .store
                .insert_account(&format!("{}@uni.it", tag), "hash", Role::Student)
                .await
                .unwrap();
            self.store
                .insert_student(account.id, tag, "Test")
                .await
                .unwrap()
        }

        async fn professor(&self, tag: &str) -> Professor {
            let account = self
                .store
                .insert_account(&format!("{}@uni.it", tag), "hash", Role::Professor)
                .await
                .unwrap();
            self.store
                .insert_professor(account.id, tag, "Test")
                .await
                .unwrap()
        }

        fn soon() -> DateTime<Utc> {
            Utc::now() + Duration::hours(6)
        }
    }

    fn assert_conflict<T: std::fmt::Debug>(result: Result<T, Error>, expected: ConflictKind) {
        match result {
            Err(Error::Conflict { kind, .. }) => assert_eq!(kind, expected),
            other => panic!("expected {:?} conflict, got {:?}", expected, other),
        }
    }

    // groups

    #[tokio::test]
    async fn one_group_per_student_per_professor() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let prof = fx.professor("prof").await;

        fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();
        assert_conflict(
            fx.engine.create_group(&admin, prof.id, "beta").await,
            ConflictKind::AlreadyMember,
        );

        // A different professor is fine.
        let other = fx.professor("other").await;
        fx.engine.create_group(&admin, other.id, "gamma").await.unwrap();
    }

    #[tokio::test]
    async fn deleted_group_frees_the_professor_slot() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let prof = fx.professor("prof").await;

        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();
        fx.engine.delete_group(&admin, group.id).await.unwrap();

        fx.engine.create_group(&admin, prof.id, "beta").await.unwrap();
        assert!(matches!(
            fx.engine.group(group.id).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn group_mutations_are_admin_only() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let intruder = fx.student("intruder").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();

        assert!(matches!(
            fx.engine.update_group(&intruder, group.id, "renamed").await,
            Err(Error::Forbidden { .. })
        ));
        assert!(matches!(
            fx.engine.delete_group(&intruder, group.id).await,
            Err(Error::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn group_name_cap_counts_characters_not_bytes() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let prof = fx.professor("prof").await;

        // 100 characters but 200 bytes: within the cap.
        let group = fx
            .engine
            .create_group(&admin, prof.id, &"é".repeat(100))
            .await
            .unwrap();
        assert!(matches!(
            fx.engine.update_group(&admin, group.id, &"x".repeat(101)).await,
            Err(Error::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn group_holds_at_most_three_members() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();

        let first = fx.student("first").await;
        let second = fx.student("second").await;
        let third = fx.student("third").await;

        fx.engine.join_group(&first, group.id).await.unwrap();
        fx.engine.join_group(&second, group.id).await.unwrap();
        assert_conflict(
            fx.engine.join_group(&third, group.id).await,
            ConflictKind::GroupFull,
        );
    }

    #[tokio::test]
    async fn joining_twice_is_a_conflict() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();
        let fellow = fx.student("fellow").await;

        fx.engine.join_group(&fellow, group.id).await.unwrap();
        assert_conflict(
            fx.engine.join_group(&fellow, group.id).await,
            ConflictKind::AlreadyMember,
        );
        // The admin is implicitly a member.
        assert_conflict(
            fx.engine.join_group(&admin, group.id).await,
            ConflictKind::AlreadyMember,
        );
    }

    #[tokio::test]
    async fn leaving_frees_a_seat() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();

        let first = fx.student("first").await;
        let second = fx.student("second").await;
        let third = fx.student("third").await;
        fx.engine.join_group(&first, group.id).await.unwrap();
        fx.engine.join_group(&second, group.id).await.unwrap();

        fx.engine.leave_group(&first, group.id).await.unwrap();
        fx.engine.join_group(&third, group.id).await.unwrap();
    }

    #[tokio::test]
    async fn admin_cannot_leave_and_strangers_are_not_members() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let stranger = fx.student("stranger").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();

        assert_conflict(
            fx.engine.leave_group(&admin, group.id).await,
            ConflictKind::MustDeleteInstead,
        );
        assert!(matches!(
            fx.engine.leave_group(&stranger, group.id).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn admin_removes_a_member() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let fellow = fx.student("fellow").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();
        fx.engine.join_group(&fellow, group.id).await.unwrap();

        assert!(matches!(
            fx.engine.remove_member(&fellow, group.id, admin.id).await,
            Err(Error::Forbidden { .. })
        ));
        fx.engine
            .remove_member(&admin, group.id, fellow.id)
            .await
            .unwrap();
        assert!(matches!(
            fx.engine.remove_member(&admin, group.id, fellow.id).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn member_listing_includes_admin_and_fellow_groups() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let fellow = fx.student("fellow").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();
        fx.engine.join_group(&fellow, group.id).await.unwrap();

        let req = PageRequest::of(Some(0), Some(10));
        let mine = fx.engine.student_groups(&fellow, req).await.unwrap();
        assert_eq!(mine.items.len(), 1);
        let owned = fx.engine.student_groups(&admin, req).await.unwrap();
        assert_eq!(owned.items.len(), 1);
    }

    // discussions

    #[tokio::test]
    async fn discussion_date_must_be_in_the_future() {
        let fx = Fixture::new();
        let prof = fx.professor("prof").await;

        assert_conflict(
            fx.engine
                .create_discussion(&prof, "late", Utc::now() - Duration::minutes(5))
                .await,
            ConflictKind::PastDate,
        );
        fx.engine
            .create_discussion(&prof, "on time", Fixture::soon())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn discussion_update_is_owner_only_and_future_only() {
        let fx = Fixture::new();
        let prof = fx.professor("prof").await;
        let other = fx.professor("other").await;
        let discussion = fx
            .engine
            .create_discussion(&prof, "topic", Fixture::soon())
            .await
            .unwrap();

        assert!(matches!(
            fx.engine
                .update_discussion(&other, discussion.id, "hijack", Fixture::soon())
                .await,
            Err(Error::Forbidden { .. })
        ));
        assert_conflict(
            fx.engine
                .update_discussion(&prof, discussion.id, "topic", Utc::now() - Duration::hours(1))
                .await,
            ConflictKind::PastDate,
        );
        fx.engine
            .update_discussion(&prof, discussion.id, "retitled", Fixture::soon())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn past_discussion_is_immutable() {
        let fx = Fixture::new();
        let prof = fx.professor("prof").await;
        let past = fx
            .store
            .insert_discussion(prof.id, "held", Utc::now() - Duration::hours(1))
            .await
            .unwrap();

        assert_conflict(
            fx.engine
                .update_discussion(&prof, past.id, "rewrite", Fixture::soon())
                .await,
            ConflictKind::Immutable,
        );
        assert_conflict(
            fx.engine.delete_discussion(&prof, past.id).await,
            ConflictKind::Immutable,
        );
    }

    #[tokio::test]
    async fn deleting_a_discussion_cascades_to_reservations() {
        let fx = Fixture::new();
        let prof = fx.professor("prof").await;
        let discussion = fx
            .engine
            .create_discussion(&prof, "topic", Fixture::soon())
            .await
            .unwrap();

        let first_admin = fx.student("first").await;
        let second_admin = fx.student("second").await;
        let g1 = fx.engine.create_group(&first_admin, prof.id, "a").await.unwrap();
        let g2 = fx.engine.create_group(&second_admin, prof.id, "b").await.unwrap();
        let r1 = fx
            .engine
            .create_reservation(&first_admin, g1.id, discussion.id)
            .await
            .unwrap();
        let r2 = fx
            .engine
            .create_reservation(&second_admin, g2.id, discussion.id)
            .await
            .unwrap();

        fx.engine.delete_discussion(&prof, discussion.id).await.unwrap();

        assert!(matches!(
            fx.engine.discussion(discussion.id).await,
            Err(Error::NotFound { .. })
        ));
        for id in [r1.id, r2.id] {
            assert!(matches!(
                fx.engine.reservation(id).await,
                Err(Error::NotFound { .. })
            ));
        }
        // Both groups may reserve again.
        assert_eq!(
            fx.store.count_active_reservations_by_group(g1.id).await.unwrap(),
            0
        );
    }

    // reservations

    #[tokio::test]
    async fn reservation_requires_the_group_admin() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let fellow = fx.student("fellow").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();
        fx.engine.join_group(&fellow, group.id).await.unwrap();
        let discussion = fx
            .engine
            .create_discussion(&prof, "topic", Fixture::soon())
            .await
            .unwrap();

        assert!(matches!(
            fx.engine
                .create_reservation(&fellow, group.id, discussion.id)
                .await,
            Err(Error::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn one_active_reservation_per_group() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();
        let first = fx
            .engine
            .create_discussion(&prof, "first", Fixture::soon())
            .await
            .unwrap();
        let second = fx
            .engine
            .create_discussion(&prof, "second", Fixture::soon())
            .await
            .unwrap();

        let held = fx
            .engine
            .create_reservation(&admin, group.id, first.id)
            .await
            .unwrap();
        // Uniqueness is keyed by group, not by discussion.
        assert_conflict(
            fx.engine.create_reservation(&admin, group.id, second.id).await,
            ConflictKind::DuplicateReservation,
        );

        fx.engine.delete_reservation(&admin, held.id).await.unwrap();
        fx.engine
            .create_reservation(&admin, group.id, second.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn no_reservation_for_a_past_discussion() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();
        let past = fx
            .store
            .insert_discussion(prof.id, "held", Utc::now() - Duration::hours(1))
            .await
            .unwrap();

        assert_conflict(
            fx.engine.create_reservation(&admin, group.id, past.id).await,
            ConflictKind::PastDiscussion,
        );
    }

    #[tokio::test]
    async fn reservation_freezes_once_the_discussion_passes() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();
        // Created while valid, discussion since held: frozen now.
        let past = fx
            .store
            .insert_discussion(prof.id, "held", Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        let upcoming = fx
            .engine
            .create_discussion(&prof, "next", Fixture::soon())
            .await
            .unwrap();
        let frozen = fx.store.insert_reservation(group.id, past.id).await.unwrap();

        assert_conflict(
            fx.engine.delete_reservation(&admin, frozen.id).await,
            ConflictKind::Immutable,
        );
        assert_conflict(
            fx.engine
                .update_reservation(&admin, frozen.id, upcoming.id)
                .await,
            ConflictKind::Immutable,
        );
        assert_conflict(
            fx.engine.professor_delete_reservation(&prof, frozen.id).await,
            ConflictKind::Immutable,
        );
    }

    #[tokio::test]
    async fn reservation_moves_to_another_upcoming_discussion() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();
        let first = fx
            .engine
            .create_discussion(&prof, "first", Fixture::soon())
            .await
            .unwrap();
        let second = fx
            .engine
            .create_discussion(&prof, "second", Fixture::soon())
            .await
            .unwrap();
        let held = fx
            .engine
            .create_reservation(&admin, group.id, first.id)
            .await
            .unwrap();

        let moved = fx
            .engine
            .update_reservation(&admin, held.id, second.id)
            .await
            .unwrap();
        assert_eq!(moved.discussion_id, second.id);
    }

    #[tokio::test]
    async fn professor_deletes_only_reservations_on_own_discussions() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let prof = fx.professor("prof").await;
        let other = fx.professor("other").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();
        let discussion = fx
            .engine
            .create_discussion(&prof, "topic", Fixture::soon())
            .await
            .unwrap();
        let held = fx
            .engine
            .create_reservation(&admin, group.id, discussion.id)
            .await
            .unwrap();

        assert!(matches!(
            fx.engine.professor_delete_reservation(&other, held.id).await,
            Err(Error::Forbidden { .. })
        ));
        fx.engine
            .professor_delete_reservation(&prof, held.id)
            .await
            .unwrap();
    }

    // files

    #[tokio::test]
    async fn files_are_admin_gated() {
        let fx = Fixture::new();
        let admin = fx.student("admin").await;
        let fellow = fx.student("fellow").await;
        let prof = fx.professor("prof").await;
        let group = fx.engine.create_group(&admin, prof.id, "alpha").await.unwrap();
        fx.engine.join_group(&fellow, group.id).await.unwrap();

        assert!(matches!(
            fx.engine.assert_group_admin(&fellow, group.id).await,
            Err(Error::Forbidden { .. })
        ));

        let file = fx
            .engine
            .record_file(&admin, group.id, "notes.pdf", "uuid.pdf")
            .await
            .unwrap();
        assert!(matches!(
            fx.engine.delete_file(&fellow, file.id).await,
            Err(Error::Forbidden { .. })
        ));
        fx.engine.delete_file(&admin, file.id).await.unwrap();
        assert!(matches!(
            fx.engine.file(file.id).await,
            Err(Error::NotFound { .. })
        ));
    }
}
