// ==========================================
// 并发控制测试
// ==========================================
// 职责: 验证 IMMEDIATE 事务 + 乐观锁下的先提交者胜出
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod concurrent_control_test {
    use crate::test_helpers::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use thesis_lifecycle::api::ApiError;
    use thesis_lifecycle::domain::types::{Capability, SessionKind};

    const THREADS: usize = 6;

    #[test]
    fn test_concurrent_room_booking_single_winner() {
        let env = TestEnv::new();
        let theses: Vec<_> = (0..THREADS)
            .map(|i| {
                let student = env.student(&format!("2023{:03}", i));
                let sup = env.lecturer(&format!("D{:03}", i));
                env.with_supervisor(&env.approved(&student), &sup)
            })
            .collect();

        let api = env.state.thesis_api.clone();
        let admin = env.admin.clone();
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = theses
            .into_iter()
            .map(|t| {
                let api = api.clone();
                let admin = admin.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let req = request(SessionKind::Supervision, at(2024, 5, 15, 14, 0), 60, "301");
                    api.schedule_session(&admin, &t.thesis_id, t.version, &req)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "同一地点同一时段只能有一个会话");
        let winner_id = winners[0].session.session_id.clone();

        for result in &results {
            if let Err(err) = result {
                match err {
                    ApiError::ConflictError {
                        conflicting_session_id, ..
                    } => assert_eq!(conflicting_session_id.as_deref(), Some(winner_id.as_str())),
                    other => panic!("失败者应收到时间冲突, 实际 {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_concurrent_stale_version_single_winner() {
        let env = TestEnv::new();
        let student = env.student("2023100");
        let actor = student_actor(&student);
        let t = env
            .state
            .thesis_api
            .create_draft(&actor, &student.student_id, "Draf", "")
            .unwrap();

        let api = env.state.thesis_api.clone();
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let api = api.clone();
                let actor = actor.clone();
                let barrier = barrier.clone();
                let thesis_id = t.thesis_id.clone();
                let version = t.version;
                thread::spawn(move || {
                    barrier.wait();
                    api.update_draft(&actor, &thesis_id, version, &format!("Judul {}", i), "")
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1, "同一版本号只允许一次成功更新");
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.code(), "STALE_VERSION");
            assert!(err.is_retryable());
        }

        let current = env.thesis(&t.thesis_id);
        assert_eq!(current.version, t.version + 1);
    }

    #[test]
    fn test_concurrent_assignment_respects_capacity() {
        let env = TestEnv::new();
        let sup = env.lecturer_with("D900", &[Capability::Supervisor], 1);
        let theses: Vec<_> = (0..THREADS)
            .map(|i| env.approved(&env.student(&format!("2023{:03}", 200 + i))))
            .collect();

        let api = env.state.thesis_api.clone();
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = theses
            .into_iter()
            .map(|t| {
                let api = api.clone();
                let admin = env.admin.clone();
                let barrier = barrier.clone();
                let sup_id = sup.lecturer_id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    api.assign_roles(&admin, &t.thesis_id, t.version, Some(&sup_id), &[])
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err, ApiError::CapacityError(_)), "应为容量错误: {:?}", err);
        }
        assert_eq!(env.load_of(&sup.lecturer_id), 1, "负载不得超过上限");
    }
}
