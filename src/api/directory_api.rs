// ==========================================
// 毕业论文管理系统 - 名录管理 API
// ==========================================
// 职责: 学生/教师登记、编辑、软删除、名册导入
// 红线: 负载 (active_load) 只由引擎维护, 这里不可修改
// ==========================================

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::thesis_api::require_id;
use crate::config::ConfigManager;
use crate::domain::lecturer::{normalize_tags, Lecturer};
use crate::domain::student::Student;
use crate::domain::types::{Actor, Capability};
use crate::engine::clock::Clock;
use crate::engine::error::EngineError;
use crate::engine::policy::require_admin;
use crate::importer::{EnrollmentImporter, ImportReport};
use crate::repository::{EntityStore, LecturerRepository, StudentRepository, ThesisRepository};

// ==========================================
// 请求载荷
// ==========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudent {
    pub registration_no: String,
    pub name: String,
    pub program: String,
    pub batch_year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLecturer {
    pub employee_no: String,
    pub name: String,
    pub expertise_tags: Vec<String>,
    pub capabilities: BTreeSet<Capability>,
    pub capacity_limit: Option<i32>, // 缺省取 default_capacity_limit
}

/// 教师编辑 (None 表示不修改)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LecturerUpdate {
    pub name: Option<String>,
    pub expertise_tags: Option<Vec<String>>,
    pub capabilities: Option<BTreeSet<Capability>>,
    pub capacity_limit: Option<i32>,
}

// ==========================================
// DirectoryApi
// ==========================================
pub struct DirectoryApi {
    store: Arc<EntityStore>,
    config: Arc<ConfigManager>,
    clock: Arc<dyn Clock>,
    importer: EnrollmentImporter,
}

impl DirectoryApi {
    pub fn new(store: Arc<EntityStore>, config: Arc<ConfigManager>, clock: Arc<dyn Clock>) -> Self {
        let importer = EnrollmentImporter::new(store.clone(), config.clone(), clock.clone());
        Self {
            store,
            config,
            clock,
            importer,
        }
    }

    // ==========================================
    // 学生
    // ==========================================

    pub fn register_student(&self, actor: &Actor, input: &NewStudent) -> ApiResult<Student> {
        require_admin(actor, "register_student")?;
        require_id("registration_no", &input.registration_no)?;
        require_id("name", &input.name)?;
        require_id("program", &input.program)?;

        let student = Student::new(
            input.registration_no.trim(),
            input.name.trim(),
            input.program.trim(),
            input.batch_year,
            self.clock.now(),
        );
        self.store.write(|tx| -> ApiResult<()> {
            if StudentRepository::find_by_registration_no_tx(tx, &student.registration_no)?.is_some() {
                return Err(duplicate_key("学号", &student.registration_no));
            }
            StudentRepository::insert_tx(tx, &student)?;
            Ok(())
        })?;

        info!(student_id = %student.student_id, registration_no = %student.registration_no, "学生已登记");
        Ok(student)
    }

    pub fn get_student(&self, student_id: &str) -> ApiResult<Student> {
        require_id("student_id", student_id)?;
        self.store
            .students
            .find_by_id(student_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Student(id={})不存在", student_id)))
    }

    pub fn list_students(&self, include_archived: bool) -> ApiResult<Vec<Student>> {
        Ok(self.store.students.list(include_archived)?)
    }

    /// 软删除学生; 有进行中的论文时拒绝
    pub fn archive_student(&self, actor: &Actor, student_id: &str, expected_version: i64) -> ApiResult<i64> {
        require_admin(actor, "archive_student")?;
        require_id("student_id", student_id)?;
        let now = self.clock.now();

        let version = self.store.write(|tx| -> ApiResult<i64> {
            let open = ThesisRepository::list_by_student_tx(tx, student_id)?
                .into_iter()
                .find(|t| !t.archived && t.state.is_in_progress());
            if let Some(open) = open {
                return Err(EngineError::PreconditionNotMet(format!(
                    "学生 {} 有进行中的论文 {} ({})",
                    student_id, open.thesis_id, open.state
                ))
                .into());
            }
            Ok(StudentRepository::archive_tx(tx, student_id, expected_version, now)?)
        })?;

        info!(student_id, version, "学生已归档");
        Ok(version)
    }

    // ==========================================
    // 教师
    // ==========================================

    pub fn register_lecturer(&self, actor: &Actor, input: &NewLecturer) -> ApiResult<Lecturer> {
        require_admin(actor, "register_lecturer")?;
        require_id("employee_no", &input.employee_no)?;
        require_id("name", &input.name)?;
        if input.capabilities.is_empty() {
            return Err(ApiError::ValidationError("教师至少需要一种能力".to_string()));
        }
        let capacity_limit = match input.capacity_limit {
            Some(c) => c,
            None => self.config.get_default_capacity_limit()?,
        };
        if capacity_limit < 0 {
            return Err(ApiError::ValidationError(format!("容量不能为负数: {}", capacity_limit)));
        }

        let lecturer = Lecturer::new(
            input.employee_no.trim(),
            input.name.trim(),
            input.capabilities.clone(),
            capacity_limit,
            self.clock.now(),
        )
        .with_expertise(&input.expertise_tags);
        self.store.write(|tx| -> ApiResult<()> {
            if LecturerRepository::find_by_employee_no_tx(tx, &lecturer.employee_no)?.is_some() {
                return Err(duplicate_key("工号", &lecturer.employee_no));
            }
            LecturerRepository::insert_tx(tx, &lecturer)?;
            Ok(())
        })?;

        info!(lecturer_id = %lecturer.lecturer_id, employee_no = %lecturer.employee_no, "教师已登记");
        Ok(lecturer)
    }

    /// 编辑教师; 容量不得低于当前负载
    pub fn update_lecturer(
        &self,
        actor: &Actor,
        lecturer_id: &str,
        expected_version: i64,
        update: &LecturerUpdate,
    ) -> ApiResult<Lecturer> {
        require_admin(actor, "update_lecturer")?;
        require_id("lecturer_id", lecturer_id)?;
        let now = self.clock.now();

        self.store.write(|tx| -> ApiResult<Lecturer> {
            let mut lecturer = LecturerRepository::get_tx(tx, lecturer_id)?;
            if lecturer.version != expected_version {
                return Err(EngineError::VersionConflict {
                    entity: "Lecturer".to_string(),
                    id: lecturer_id.to_string(),
                    expected: expected_version,
                    actual: lecturer.version,
                }
                .into());
            }

            if let Some(name) = &update.name {
                require_id("name", name)?;
                lecturer.name = name.trim().to_string();
            }
            if let Some(tags) = &update.expertise_tags {
                lecturer.expertise_tags = normalize_tags(tags);
            }
            if let Some(caps) = &update.capabilities {
                if caps.is_empty() {
                    return Err(ApiError::ValidationError("教师至少需要一种能力".to_string()));
                }
                lecturer.capabilities = caps.clone();
            }
            if let Some(limit) = update.capacity_limit {
                if limit < lecturer.active_load {
                    return Err(ApiError::ValidationError(format!(
                        "容量 {} 低于当前负载 {}",
                        limit, lecturer.active_load
                    )));
                }
                lecturer.capacity_limit = limit;
            }

            lecturer.updated_at = now;
            lecturer.version = LecturerRepository::update_tx(tx, &lecturer)?;
            Ok(lecturer)
        })
    }

    pub fn get_lecturer(&self, lecturer_id: &str) -> ApiResult<Lecturer> {
        require_id("lecturer_id", lecturer_id)?;
        self.store
            .lecturers
            .find_by_id(lecturer_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Lecturer(id={})不存在", lecturer_id)))
    }

    pub fn list_lecturers(&self, include_archived: bool) -> ApiResult<Vec<Lecturer>> {
        Ok(self.store.lecturers.list(include_archived)?)
    }

    /// 软删除教师; 仍有在研论文时拒绝
    pub fn archive_lecturer(&self, actor: &Actor, lecturer_id: &str, expected_version: i64) -> ApiResult<i64> {
        require_admin(actor, "archive_lecturer")?;
        require_id("lecturer_id", lecturer_id)?;
        let now = self.clock.now();

        let version = self.store.write(|tx| -> ApiResult<i64> {
            let lecturer = LecturerRepository::get_tx(tx, lecturer_id)?;
            if lecturer.active_load > 0 {
                return Err(EngineError::PreconditionNotMet(format!(
                    "教师 {} 仍有 {} 篇在研论文",
                    lecturer_id, lecturer.active_load
                ))
                .into());
            }
            Ok(LecturerRepository::archive_tx(tx, lecturer_id, expected_version, now)?)
        })?;

        info!(lecturer_id, version, "教师已归档");
        Ok(version)
    }

    // ==========================================
    // 名册导入
    // ==========================================

    pub fn import_students<P: AsRef<Path>>(&self, actor: &Actor, file_path: P) -> ApiResult<ImportReport> {
        require_admin(actor, "import_students")?;
        Ok(self.importer.import_students(file_path)?)
    }

    pub fn import_lecturers<P: AsRef<Path>>(&self, actor: &Actor, file_path: P) -> ApiResult<ImportReport> {
        require_admin(actor, "import_lecturers")?;
        Ok(self.importer.import_lecturers(file_path)?)
    }
}

fn duplicate_key(label: &str, value: &str) -> ApiError {
    ApiError::RuleViolation {
        code: "DUPLICATE_KEY",
        message: format!("{} {} 已存在", label, value),
    }
}
