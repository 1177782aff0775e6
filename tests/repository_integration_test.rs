// ==========================================
// Repository 集成测试
// ==========================================
// 职责: 验证持久化往返、乐观锁版本号、软删除、过滤查询
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod repository_integration_test {
    use crate::test_helpers::{at, create_test_db};
    use std::collections::BTreeSet;
    use thesis_lifecycle::domain::lecturer::Lecturer;
    use thesis_lifecycle::domain::session::{Location, Session};
    use thesis_lifecycle::domain::student::Student;
    use thesis_lifecycle::domain::thesis::ThesisRecord;
    use thesis_lifecycle::domain::transition_log::TransitionLog;
    use thesis_lifecycle::domain::types::{ActorRole, Capability, SessionKind, SessionStatus, ThesisState};
    use thesis_lifecycle::repository::{
        EntityStore, RepositoryError, SessionRepository, ThesisFilter, ThesisRepository, TransitionLogRepository,
    };

    fn lecturer(no: &str) -> Lecturer {
        let caps: BTreeSet<Capability> = [Capability::Supervisor, Capability::Examiner].into_iter().collect();
        Lecturer::new(no, format!("Dosen {}", no), caps, 8, at(2024, 1, 1, 9, 0))
    }

    fn insert_thesis(store: &EntityStore, thesis: &ThesisRecord) {
        store
            .write(|tx| ThesisRepository::insert_tx(tx, thesis))
            .unwrap();
    }

    #[test]
    fn test_student_round_trip_and_unique_registration() {
        let (_tmp, db_path) = create_test_db();
        let store = EntityStore::open(&db_path).unwrap();

        let student = Student::new("2020001", "Budi", "Informatika", 2020, at(2024, 1, 1, 9, 0));
        store.students.create(&student).unwrap();

        let loaded = store.students.find_by_id(&student.student_id).unwrap().unwrap();
        assert_eq!(loaded, student);
        let by_no = store.students.find_by_registration_no("2020001").unwrap().unwrap();
        assert_eq!(by_no.student_id, student.student_id);

        let dup = Student::new("2020001", "Andi", "Informatika", 2020, at(2024, 1, 1, 9, 0));
        let err = store.students.create(&dup).unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)), "学号必须唯一: {:?}", err);
    }

    #[test]
    fn test_version_increment_and_stale_update() {
        let (_tmp, db_path) = create_test_db();
        let store = EntityStore::open(&db_path).unwrap();

        let mut l = lecturer("D001");
        store.lecturers.create(&l).unwrap();

        l.capacity_limit = 10;
        let v2 = store.lecturers.update(&l).unwrap();
        assert_eq!(v2, 2);

        // 用旧版本号再次更新
        let err = store.lecturers.update(&l).unwrap_err();
        match err {
            RepositoryError::OptimisticLockFailure { expected, actual, .. } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("应为乐观锁冲突, 实际 {:?}", other),
        }

        let loaded = store.lecturers.find_by_id(&l.lecturer_id).unwrap().unwrap();
        assert_eq!(loaded.capacity_limit, 10);
        assert_eq!(loaded.version, 2);
    }

    #[test]
    fn test_soft_delete_hides_from_default_listing() {
        let (_tmp, db_path) = create_test_db();
        let store = EntityStore::open(&db_path).unwrap();

        let s1 = Student::new("2020001", "Budi", "Informatika", 2020, at(2024, 1, 1, 9, 0));
        let s2 = Student::new("2020002", "Sari", "Informatika", 2020, at(2024, 1, 1, 9, 0));
        store.students.create(&s1).unwrap();
        store.students.create(&s2).unwrap();

        let version = store.students.archive(&s1.student_id, 1, at(2024, 2, 1, 9, 0)).unwrap();
        assert_eq!(version, 2);

        let active = store.students.list(false).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].student_id, s2.student_id);
        assert_eq!(store.students.list(true).unwrap().len(), 2);

        // 软删除后仍可按ID读取
        let archived = store.students.find_by_id(&s1.student_id).unwrap().unwrap();
        assert!(archived.archived);

        let err = store.students.archive(&s2.student_id, 7, at(2024, 2, 1, 9, 0)).unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLockFailure { .. }));
    }

    #[test]
    fn test_thesis_filters() {
        let (_tmp, db_path) = create_test_db();
        let store = EntityStore::open(&db_path).unwrap();

        let s2020 = Student::new("2020001", "Budi", "Informatika", 2020, at(2024, 1, 1, 9, 0));
        let s2021 = Student::new("2021001", "Sari", "Informatika", 2021, at(2024, 1, 1, 9, 0));
        store.students.create(&s2020).unwrap();
        store.students.create(&s2021).unwrap();
        let sup = lecturer("D001");
        let ex1 = lecturer("D002");
        let ex2 = lecturer("D003");
        for l in [&sup, &ex1, &ex2] {
            store.lecturers.create(l).unwrap();
        }

        let mut a = ThesisRecord::new_draft(&s2020.student_id, "Topik A", "", at(2024, 1, 2, 9, 0));
        a.state = ThesisState::ExaminersAssigned;
        a.supervisor_id = Some(sup.lecturer_id.clone());
        a.examiner_ids = vec![ex1.lecturer_id.clone(), ex2.lecturer_id.clone()];
        insert_thesis(&store, &a);

        let b = ThesisRecord::new_draft(&s2021.student_id, "Topik B", "", at(2024, 1, 3, 9, 0));
        insert_thesis(&store, &b);

        let loaded = store.theses.find_by_id(&a.thesis_id).unwrap().unwrap();
        assert_eq!(loaded.examiner_ids, a.examiner_ids, "评委顺序保持不变");

        let by_examiner = store
            .theses
            .list_filtered(&ThesisFilter {
                examiner_id: Some(ex2.lecturer_id.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_examiner.len(), 1);
        assert_eq!(by_examiner[0].thesis_id, a.thesis_id);

        let by_batch = store
            .theses
            .list_filtered(&ThesisFilter {
                batch_year: Some(2021),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_batch.len(), 1);
        assert_eq!(by_batch[0].thesis_id, b.thesis_id);

        let drafts = store
            .theses
            .list_filtered(&ThesisFilter {
                state: Some(ThesisState::Draft),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(drafts.len(), 1);

        let all = store.theses.list_filtered(&ThesisFilter::default()).unwrap();
        assert_eq!(
            all.iter().map(|t| t.thesis_id.clone()).collect::<Vec<_>>(),
            vec![a.thesis_id.clone(), b.thesis_id.clone()],
            "按创建时间排序"
        );

        let counts = store.theses.count_by_state().unwrap();
        assert_eq!(counts.get(&ThesisState::Draft), Some(&1));
        assert_eq!(counts.get(&ThesisState::ExaminersAssigned), Some(&1));
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let (_tmp, db_path) = create_test_db();
        let store = EntityStore::open(&db_path).unwrap();
        let student = Student::new("2020001", "Budi", "Informatika", 2020, at(2024, 1, 1, 9, 0));
        store.students.create(&student).unwrap();
        let thesis = ThesisRecord::new_draft(&student.student_id, "Topik", "", at(2024, 1, 2, 9, 0));

        let result: Result<(), RepositoryError> = store.write(|tx| {
            ThesisRepository::insert_tx(tx, &thesis)?;
            Err(RepositoryError::InternalError("中途失败".to_string()))
        });
        assert!(result.is_err());
        assert!(store.theses.find_by_id(&thesis.thesis_id).unwrap().is_none(), "事务失败时整体回滚");
    }

    #[test]
    fn test_sessions_and_transition_logs() {
        let (_tmp, db_path) = create_test_db();
        let store = EntityStore::open(&db_path).unwrap();
        let student = Student::new("2020001", "Budi", "Informatika", 2020, at(2024, 1, 1, 9, 0));
        store.students.create(&student).unwrap();
        let sup = lecturer("D001");
        store.lecturers.create(&sup).unwrap();
        let mut thesis = ThesisRecord::new_draft(&student.student_id, "Topik", "", at(2024, 1, 2, 9, 0));
        thesis.supervisor_id = Some(sup.lecturer_id.clone());
        thesis.state = ThesisState::InSupervision;
        insert_thesis(&store, &thesis);

        let session = Session {
            session_id: "SES-1".to_string(),
            thesis_id: thesis.thesis_id.clone(),
            kind: SessionKind::Supervision,
            student_id: student.student_id.clone(),
            lecturer_ids: vec![sup.lecturer_id.clone()],
            start_at: at(2024, 5, 15, 14, 0),
            duration_minutes: 60,
            location: Location::Room("301".to_string()),
            status: SessionStatus::Scheduled,
            attempt_no: 0,
            notes: None,
            archived: false,
            created_at: at(2024, 5, 1, 8, 0),
            updated_at: at(2024, 5, 1, 8, 0),
            version: 1,
        };
        store.write(|tx| SessionRepository::insert_tx(tx, &session)).unwrap();

        let loaded = store.sessions.find_by_id("SES-1").unwrap().unwrap();
        assert_eq!(loaded, session);

        let upcoming = store
            .sessions
            .list_upcoming_for_participant(&sup.lecturer_id, at(2024, 5, 1, 8, 0))
            .unwrap();
        assert_eq!(upcoming.len(), 1);
        let past = store
            .sessions
            .list_upcoming_for_participant(&sup.lecturer_id, at(2024, 6, 1, 8, 0))
            .unwrap();
        assert!(past.is_empty());

        let log = TransitionLog {
            log_id: "LOG-1".to_string(),
            thesis_id: thesis.thesis_id.clone(),
            from_state: Some(ThesisState::SupervisorAssigned),
            to_state: ThesisState::InSupervision,
            actor_id: "ADMIN-1".to_string(),
            actor_role: ActorRole::Admin,
            occurred_at: at(2024, 5, 1, 8, 0),
            version_after: 2,
            detail: Some("session=SES-1".to_string()),
        };
        store.write(|tx| TransitionLogRepository::insert_tx(tx, &log)).unwrap();
        let logs = store.transitions.list_by_thesis(&thesis.thesis_id).unwrap();
        assert_eq!(logs, vec![log]);
    }
}
