mod common;

use common::{request_ok, spawn_sidecar, str_at, temp_dir};
use serde_json::json;

const SEMESTERS: [&str; 5] = ["1-1", "1-2", "2-1", "2-2", "3-1"];

struct Session {
    child: std::process::Child,
    stdin: std::process::ChildStdin,
    reader: std::io::BufReader<std::process::ChildStdout>,
    next: usize,
}

impl Session {
    fn start(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut s = Session {
            child,
            stdin,
            reader,
            next: 0,
        };
        s.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
        s
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next += 1;
        let id = self.next.to_string();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    /// One direct subject per semester, so each semester grade equals the stored band.
    fn student_with(&mut self, name: &str, bands: [Option<i64>; 5]) -> String {
        let student = self.ok(
            "students.create",
            json!({ "semester": "1-1", "class": "7", "name": name }),
        );
        let student_id = str_at(&student, "/studentId").to_string();
        for (sem, band) in SEMESTERS.iter().zip(bands) {
            let Some(band) = band else { continue };
            let listed = self.ok("subjects.list", json!({ "semester": sem }));
            let subject_id = match listed["subjects"][0]["id"].as_str() {
                Some(id) => id.to_string(),
                None => {
                    let added = self.ok(
                        "subjects.add",
                        json!({ "semester": sem, "name": "국어", "units": 3, "type": "direct" }),
                    );
                    str_at(&added, "/subjectId").to_string()
                }
            };
            self.ok(
                "grades.saveCell",
                json!({ "studentId": student_id, "semester": sem, "subjectId": subject_id, "raw": band.to_string() }),
            );
        }
        student_id
    }

    fn finish(mut self) {
        drop(self.stdin);
        let _ = self.child.wait();
    }
}

#[test]
fn composites_follow_university_rules() {
    let mut s = Session::start("gradecalc-composites");

    let full = s.student_with("전체", [Some(1), Some(2), Some(2), Some(2), Some(2)]);
    let report = s.ok("reports.student", json!({ "studentId": full }));
    // (1.5 * 0.2) + (2 * 0.3) + (2 * 0.5) = 1.9; best earlier 1 and 3-1 2 -> 1.5
    assert_eq!(report["universityA"], 1.9);
    assert_eq!(report["universityB"], 1.5);
    assert_eq!(report["semesters"].as_array().map(|a| a.len()), Some(5));
    assert_eq!(report["semesters"][0]["semesterGrade"], 1.0);
    assert_eq!(report["semesters"][0]["subjects"][0]["name"], "국어");

    let partial = s.student_with("부분", [Some(2), Some(1), None, None, None]);
    let sem = s.ok(
        "reports.semesterGrade",
        json!({ "studentId": partial, "semester": "1-2" }),
    );
    assert_eq!(sem["semesterGrade"], 1.0);
    // Mean of the available semesters; B falls back to the best one without 3-1.
    assert_eq!(sem["universityA"], 1.5);
    assert_eq!(sem["universityB"], 1.0);

    let only_last = s.student_with("마지막", [None, None, None, None, Some(4)]);
    let last = s.ok("reports.student", json!({ "studentId": only_last }));
    assert_eq!(last["universityA"], 4.0);
    assert_eq!(last["universityB"], 4.0);

    let nothing = s.ok(
        "students.create",
        json!({ "semester": "1-1", "class": "7", "name": "없음" }),
    );
    let empty = s.ok(
        "reports.student",
        json!({ "studentId": str_at(&nothing, "/studentId") }),
    );
    assert!(empty["universityA"].is_null());
    assert!(empty["universityB"].is_null());

    let table = s.ok("reports.classTable", json!({ "class": "7", "semester": "1-1" }));
    assert_eq!(table["label"], "1학년 1학기");
    assert_eq!(table["columns"][0]["name"], "국어");
    let rows = table["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["grades"], json!([1]));
    assert_eq!(rows[2]["grades"], json!([null]));
    assert!(rows[3]["semesterGrade"].is_null());

    s.finish();
}
