// ==========================================
// 名册导入集成测试
// ==========================================
// 职责: 验证 CSV / Excel 名册导入、重复跳过、坏行行号报告
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod importer_test {
    use crate::test_helpers::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use thesis_lifecycle::api::ApiError;
    use thesis_lifecycle::config::config_keys;
    use thesis_lifecycle::domain::types::{Actor, ActorRole, Capability};

    fn csv_file(lines: &[&str]) -> NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_import_students_with_bad_and_duplicate_rows() {
        let env = TestEnv::new();
        env.student("2020009"); // 库中已存在

        let file = csv_file(&[
            "NIM,Nama,Prodi,Angkatan",
            "2020001,Budi Santoso,Informatika,2020",
            "2020002,Sari Dewi,Sistem Informasi,2021",
            "2020003,,Informatika,2020",
            "2020004,Andi,Informatika,dua ribu",
            "2020001,Budi Lagi,Informatika,2020",
            "2020009,Sudah Ada,Informatika,2020",
        ]);

        let report = env
            .state
            .directory_api
            .import_students(&env.admin, file.path())
            .unwrap();
        assert_eq!(report.total_rows, 6);
        assert_eq!(report.imported(), 2);

        let error_rows: Vec<usize> = report.errors.iter().map(|e| e.row_no).collect();
        assert_eq!(error_rows, vec![4, 5], "坏行需报告文件行号");

        let dup_rows: Vec<(usize, Option<String>)> = report
            .skipped_duplicates
            .iter()
            .map(|d| (d.row_no, d.key.clone()))
            .collect();
        assert_eq!(
            dup_rows,
            vec![
                (6, Some("2020001".to_string())),
                (7, Some("2020009".to_string())),
            ]
        );

        let students = env.state.directory_api.list_students(false).unwrap();
        assert_eq!(students.len(), 3);
        let sari = students.iter().find(|s| s.registration_no == "2020002").unwrap();
        assert_eq!(sari.program, "Sistem Informasi");
        assert_eq!(sari.batch_year, 2021);
    }

    #[test]
    fn test_import_students_from_xlsx() {
        let env = TestEnv::new();
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/students.xlsx");

        let report = env
            .state
            .directory_api
            .import_students(&env.admin, &path)
            .unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.imported(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row_no, 3, "工作表行号 (表头为第 1 行)");

        let students = env.state.directory_api.list_students(false).unwrap();
        let maya = students.iter().find(|s| s.registration_no == "2021003").unwrap();
        assert_eq!(maya.program, "Sistem Informasi");
        assert_eq!(maya.batch_year, 2022);
    }

    #[test]
    fn test_import_lecturers_defaults_from_config() {
        let env = TestEnv::new();
        env.set_config(config_keys::DEFAULT_CAPACITY_LIMIT, "5");

        let file = csv_file(&[
            "nidn,name,expertise,capabilities,capacity",
            "0011,Dr. Rina,\"NLP; Computer Vision\",SUPERVISOR,10",
            "0012,Dr. Tono,networking,,",
            "0013,Dr. Wati,,DEAN,3",
        ]);

        let report = env
            .state
            .directory_api
            .import_lecturers(&env.admin, file.path())
            .unwrap();
        assert_eq!(report.imported(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row_no, 4);

        let lecturers = env.state.directory_api.list_lecturers(false).unwrap();
        let rina = lecturers.iter().find(|l| l.employee_no == "0011").unwrap();
        assert_eq!(rina.capacity_limit, 10);
        assert!(rina.has_capability(Capability::Supervisor));
        assert!(!rina.has_capability(Capability::Examiner));
        assert!(rina.expertise_tags.contains("computer vision"));

        let tono = lecturers.iter().find(|l| l.employee_no == "0012").unwrap();
        assert_eq!(tono.capacity_limit, 5, "容量缺省取配置");
        assert!(tono.has_capability(Capability::Supervisor) && tono.has_capability(Capability::Examiner));
    }

    #[test]
    fn test_import_requires_key_column_and_supported_format() {
        let env = TestEnv::new();
        let file = csv_file(&["name,program", "Budi,Informatika"]);
        let err = env
            .state
            .directory_api
            .import_students(&env.admin, file.path())
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)), "缺少学号列: {:?}", err);

        let txt = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        let err = env
            .state
            .directory_api
            .import_students(&env.admin, txt.path())
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let err = env
            .state
            .directory_api
            .import_students(&env.admin, "/nonexistent/roster.csv")
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_import_is_admin_only() {
        let env = TestEnv::new();
        let file = csv_file(&["nim,name,program,batch_year", "2020001,Budi,TI,2020"]);
        let student = Actor::new("S-1", ActorRole::Student);
        let err = env
            .state
            .directory_api
            .import_students(&student, file.path())
            .unwrap_err();
        assert_eq!(err.code(), "ROLE_NOT_PERMITTED");
        assert!(env.state.directory_api.list_students(true).unwrap().is_empty());
    }
}
