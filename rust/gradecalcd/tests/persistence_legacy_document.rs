mod common;

use common::{request_ok, spawn_sidecar, spawn_sidecar_with, str_at, temp_dir};
use serde_json::json;
use std::path::Path;

fn seed_document(workspace: &Path, document: &str) {
    std::fs::create_dir_all(workspace).expect("workspace");
    let conn = rusqlite::Connection::open(workspace.join("gradecalc.sqlite3")).expect("open db");
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store(key TEXT PRIMARY KEY, value TEXT NOT NULL, updated_at TEXT)",
        [],
    )
    .expect("create kv_store");
    conn.execute(
        "INSERT INTO kv_store(key, value) VALUES('gradeCalculatorData', ?)",
        [document],
    )
    .expect("seed document");
}

fn raw_document(workspace: &Path) -> Option<String> {
    let conn = rusqlite::Connection::open(workspace.join("gradecalc.sqlite3")).expect("open db");
    let mut stmt = conn
        .prepare("SELECT value FROM kv_store WHERE key = 'gradeCalculatorData'")
        .expect("prepare");
    let mut rows = stmt.query([]).expect("query");
    let row = rows.next().expect("row")?;
    Some(row.get(0).expect("value"))
}

fn stored_document(workspace: &Path) -> Option<serde_json::Value> {
    raw_document(workspace).map(|text| serde_json::from_str(&text).expect("stored json"))
}

#[test]
fn browser_document_with_numeric_ids_loads_and_is_rewritten() {
    let workspace = temp_dir("gradecalc-legacy-doc");
    let doc = json!({
        "subjects": {
            "1-1": [
                { "id": 1700000000001_i64, "name": "국어", "units": 4, "type": "direct" },
                { "id": 1700000000002_i64, "name": "수학", "units": 2, "type": "z-score" }
            ],
            "4-1": [ { "id": 9, "name": "없는학기", "units": 1, "type": "direct" } ]
        },
        "students": [
            { "id": 1712345678901.25_f64, "grade": 1, "class": 3, "name": "홍길동", "semester": "1-1" },
            { "id": 1712345678902_i64, "class": "3", "name": "깨짐" }
        ],
        "grades": {
            "1712345678901.25": {
                "1-1": {
                    "1700000000001": { "raw": 2, "grade": 2, "units": 4 },
                    "1700000000002": { "raw": "85", "grade": 1, "units": 2 }
                }
            }
        },
        "zScoreSettings": { "1-1": { "1700000000002": { "mean": 70, "std": 10 } } }
    });
    seed_document(&workspace, &doc.to_string());

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(opened["students"], 1);
    // The unknown semester and the student without a semester are dropped.
    assert_eq!(opened["warnings"].as_array().map(|w| w.len()), Some(2));
    assert!(opened.get("loadError").is_none());

    let listed = request_ok(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(str_at(&listed, "/students/0/id"), "1712345678901.25");
    assert_eq!(str_at(&listed, "/students/0/class"), "3");
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.get",
        json!({ "studentId": "1712345678901.25", "semester": "1-1" }),
    );
    assert_eq!(got["grades"]["1700000000001"]["raw"], "2");
    // (2*4 + 1*2) / 6 = 1.666.. -> 1.67
    assert_eq!(got["semesterGrade"], 1.67);

    // Any mutation rewrites the document in canonical form.
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({ "semester": "1-2", "class": "3", "name": "새학생" }),
    );
    let stored = stored_document(&workspace).expect("document");
    assert_eq!(stored["students"][0]["id"], "1712345678901.25");
    assert_eq!(stored["subjects"]["1-1"][0]["id"], "1700000000001");
    assert_eq!(stored["zScoreSettings"]["1-1"]["1700000000002"]["std"], 10.0);
    assert!(stored["subjects"].get("4-1").is_none());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn corrupt_document_opens_empty_and_reset_clears_storage() {
    let workspace = temp_dir("gradecalc-corrupt-doc");
    seed_document(&workspace, "{ not json");
    let path = workspace.to_string_lossy().to_string();

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let opened = request_ok(&mut stdin, &mut reader, "1", "workspace.select", json!({ "path": path }));
    assert_eq!(opened["loadError"]["code"], "load_failed");
    assert_eq!(opened["students"], 0);
    // Untouched until something is written.
    assert_eq!(raw_document(&workspace).as_deref(), Some("{ not json"));

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.add",
        json!({ "semester": "1-1", "name": "국어", "units": 4, "type": "direct" }),
    );
    let stored = stored_document(&workspace).expect("document");
    assert_eq!(stored["subjects"]["1-1"][0]["name"], "국어");

    let reset = request_ok(&mut stdin, &mut reader, "3", "data.reset", json!({}));
    assert_eq!(reset["reset"], true);
    assert!(stored_document(&workspace).is_none());
    let listed = request_ok(&mut stdin, &mut reader, "4", "subjects.list", json!({ "semester": "1-1" }));
    assert_eq!(listed["subjects"], json!([]));
    drop(stdin);
    let _ = child.wait();

    // The --workspace flag opens the same (now empty) store at startup.
    let (mut child, mut stdin, mut reader) = spawn_sidecar_with(&["--workspace", &path]);
    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["workspacePath"].as_str(), Some(path.as_str()));
    let students = request_ok(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(students["students"], json!([]));
    drop(stdin);
    let _ = child.wait();
}
