// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、固定时钟、名录与流程夹具
// ==========================================
#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thesis_lifecycle::api::{NewLecturer, NewStudent};
use thesis_lifecycle::app::AppState;
use thesis_lifecycle::domain::lecturer::Lecturer;
use thesis_lifecycle::domain::session::Location;
use thesis_lifecycle::domain::student::Student;
use thesis_lifecycle::domain::thesis::ThesisRecord;
use thesis_lifecycle::domain::types::{Actor, ActorRole, Capability, SessionKind, ThesisState};
use thesis_lifecycle::engine::clock::{Clock, FixedClock};
use thesis_lifecycle::engine::schedule::SessionRequest;
use thesis_lifecycle::engine::workflow::ReviewDecision;

/// 创建临时测试数据库
pub fn create_test_db() -> (NamedTempFile, String) {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    (temp_file, db_path)
}

pub fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

// ==========================================
// TestEnv - 临时库 + 固定时钟 + 全套 API
// ==========================================
pub struct TestEnv {
    pub _temp_file: NamedTempFile,
    pub db_path: String,
    pub state: AppState,
    pub clock: Arc<FixedClock>,
    pub admin: Actor,
}

impl TestEnv {
    /// 时钟固定在 2024-05-01 08:00
    pub fn new() -> Self {
        thesis_lifecycle::logging::init_test();
        let (temp_file, db_path) = create_test_db();
        let clock = Arc::new(FixedClock::new(at(2024, 5, 1, 8, 0)));
        let state = AppState::with_clock(db_path.clone(), clock.clone()).unwrap();
        Self {
            _temp_file: temp_file,
            db_path,
            state,
            clock,
            admin: Actor::admin("ADMIN-1"),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn set_config(&self, key: &str, value: &str) {
        self.state.config.set_global_config_value(key, value).unwrap();
    }

    // ==========================================
    // 名录夹具
    // ==========================================

    pub fn student(&self, registration_no: &str) -> Student {
        self.state
            .directory_api
            .register_student(
                &self.admin,
                &NewStudent {
                    registration_no: registration_no.to_string(),
                    name: format!("Mahasiswa {}", registration_no),
                    program: "Informatika".to_string(),
                    batch_year: 2020,
                },
            )
            .unwrap()
    }

    pub fn lecturer_with(&self, employee_no: &str, caps: &[Capability], capacity: i32) -> Lecturer {
        self.state
            .directory_api
            .register_lecturer(
                &self.admin,
                &NewLecturer {
                    employee_no: employee_no.to_string(),
                    name: format!("Dosen {}", employee_no),
                    expertise_tags: Vec::new(),
                    capabilities: caps.iter().copied().collect::<BTreeSet<_>>(),
                    capacity_limit: Some(capacity),
                },
            )
            .unwrap()
    }

    /// 可兼任导师与评委, 上限 8
    pub fn lecturer(&self, employee_no: &str) -> Lecturer {
        self.lecturer_with(employee_no, &[Capability::Supervisor, Capability::Examiner], 8)
    }

    pub fn thesis(&self, thesis_id: &str) -> ThesisRecord {
        self.state.store.theses.find_by_id(thesis_id).unwrap().unwrap()
    }

    pub fn load_of(&self, lecturer_id: &str) -> i32 {
        self.state
            .store
            .lecturers
            .find_by_id(lecturer_id)
            .unwrap()
            .unwrap()
            .active_load
    }

    /// 直接改写教师负载 (模拟历史在研论文)
    pub fn force_load(&self, lecturer_id: &str, load: i32) {
        let mut lecturer = self.state.store.lecturers.find_by_id(lecturer_id).unwrap().unwrap();
        lecturer.active_load = load;
        self.state.store.lecturers.update(&lecturer).unwrap();
    }

    // ==========================================
    // 流程夹具
    // ==========================================

    /// 立题 → 审核通过
    pub fn approved(&self, student: &Student) -> ThesisRecord {
        let api = &self.state.thesis_api;
        let t = api
            .submit_title(
                &student_actor(student),
                &student.student_id,
                "Analisis Sentimen Ulasan Aplikasi",
                "abstrak",
            )
            .unwrap();
        let t = api.start_review(&self.admin, &t.thesis_id, t.version).unwrap();
        api.decide_title_review(&self.admin, &t.thesis_id, t.version, &ReviewDecision::Approve)
            .unwrap()
    }

    /// 分配导师 (Approved → SupervisorAssigned)
    pub fn with_supervisor(&self, thesis: &ThesisRecord, supervisor: &Lecturer) -> ThesisRecord {
        self.state
            .thesis_api
            .assign_roles(&self.admin, &thesis.thesis_id, thesis.version, Some(&supervisor.lecturer_id), &[])
            .unwrap()
    }

    /// 次日排一次指导, 时钟推进到其结束后并完成
    pub fn supervise_once(&self, thesis: &ThesisRecord, room: &str) -> ThesisRecord {
        let start = self.now() + Duration::days(1);
        let booking = self
            .state
            .thesis_api
            .schedule_session(
                &self.admin,
                &thesis.thesis_id,
                thesis.version,
                &request(SessionKind::Supervision, start, 60, room),
            )
            .unwrap();
        self.clock.set(start + Duration::hours(2));
        self.state
            .thesis_api
            .complete_session(&self.admin, &booking.session.session_id, booking.session.version, None)
            .unwrap();
        self.thesis(&thesis.thesis_id)
    }

    /// 指导一次并由导师同意答辩
    pub fn ready_for_defense(&self, thesis: &ThesisRecord, supervisor: &Lecturer) -> ThesisRecord {
        let t = self.supervise_once(thesis, "Lab Riset");
        self.state
            .thesis_api
            .sign_off_supervision(&supervisor_actor(supervisor), &t.thesis_id, t.version)
            .unwrap()
    }

    /// 分配评委 → 排期答辩 → 完成答辩 (→ Defended)
    pub fn defend(&self, thesis: &ThesisRecord, examiners: &[&Lecturer]) -> ThesisRecord {
        let api = &self.state.thesis_api;
        let ids: Vec<String> = examiners.iter().map(|e| e.lecturer_id.clone()).collect();
        let t = api
            .assign_roles(&self.admin, &thesis.thesis_id, thesis.version, None, &ids)
            .unwrap();
        assert_eq!(t.state, ThesisState::ExaminersAssigned);

        let start = self.now() + Duration::days(2);
        let booking = api
            .schedule_session(
                &self.admin,
                &t.thesis_id,
                t.version,
                &request(SessionKind::Defense, start, 90, "Aula"),
            )
            .unwrap();
        assert_eq!(booking.thesis.state, ThesisState::DefenseScheduled);

        self.clock.set(start + Duration::hours(2));
        let done = api
            .complete_session(&self.admin, &booking.session.session_id, booking.session.version, None)
            .unwrap();
        assert_eq!(done.thesis.state, ThesisState::Defended);
        done.thesis
    }

    /// 答辩组全员评分后判定结果
    pub fn grade(
        &self,
        thesis: &ThesisRecord,
        supervisor: (&Lecturer, BTreeMap<String, i32>),
        examiners: &[(&Lecturer, BTreeMap<String, i32>)],
    ) -> ThesisRecord {
        let api = &self.state.thesis_api;
        let (sup, sup_scores) = supervisor;
        api.submit_evaluation(&supervisor_actor(sup), &thesis.thesis_id, &sup.lecturer_id, &sup_scores, None)
            .unwrap();
        for (examiner, scores) in examiners {
            api.submit_evaluation(&examiner_actor(examiner), &thesis.thesis_id, &examiner.lecturer_id, scores, None)
                .unwrap();
        }
        let current = self.thesis(&thesis.thesis_id);
        api.record_outcome(&self.admin, &current.thesis_id, current.version).unwrap()
    }

    /// 同一分数的完整答辩轮次 (从已同意答辩到出结果)
    pub fn defense_round(
        &self,
        thesis: &ThesisRecord,
        supervisor: &Lecturer,
        examiners: &[&Lecturer],
        score: i32,
    ) -> ThesisRecord {
        let t = self.defend(thesis, examiners);
        let panel: Vec<(&Lecturer, BTreeMap<String, i32>)> =
            examiners.iter().map(|e| (*e, rubric(score, score))).collect();
        self.grade(&t, (supervisor, rubric(score, score)), &panel)
    }
}

pub fn student_actor(student: &Student) -> Actor {
    Actor::new(student.student_id.clone(), ActorRole::Student)
}

pub fn supervisor_actor(lecturer: &Lecturer) -> Actor {
    Actor::new(lecturer.lecturer_id.clone(), ActorRole::Supervisor)
}

pub fn examiner_actor(lecturer: &Lecturer) -> Actor {
    Actor::new(lecturer.lecturer_id.clone(), ActorRole::Examiner)
}

pub fn request(kind: SessionKind, start_at: NaiveDateTime, minutes: i64, room: &str) -> SessionRequest {
    SessionRequest {
        kind,
        start_at,
        duration_minutes: minutes,
        location: Location::Room(room.to_string()),
        notes: None,
    }
}

pub fn rubric(content: i32, presentation: i32) -> BTreeMap<String, i32> {
    BTreeMap::from([
        ("content".to_string(), content),
        ("presentation".to_string(), presentation),
    ])
}
