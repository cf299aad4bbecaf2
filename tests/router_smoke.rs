mod common;

use common::{seed, Sidecar};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

#[test]
fn methods_require_a_workspace() {
    let exe = env!("CARGO_BIN_EXE_trainingd");
    let mut child = Command::new(exe)
        .env_remove("TRAININGD_WORKSPACE")
        .env_remove("TRAININGD_TODAY")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn trainingd");
    let mut stdin = child.stdin.take().expect("stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("stdout"));

    let mut send = |line: &str| -> serde_json::Value {
        writeln!(stdin, "{}", line).expect("write");
        stdin.flush().expect("flush");
        let mut out = String::new();
        reader.read_line(&mut out).expect("read");
        serde_json::from_str(out.trim()).expect("json")
    };

    let health = send(r#"{"id":"1","method":"health"}"#);
    assert_eq!(health["ok"].as_bool(), Some(true));
    assert!(health["result"]["workspacePath"].is_null());

    let listed = send(r#"{"id":"2","method":"classes.list","params":{}}"#);
    assert_eq!(listed["error"]["code"].as_str(), Some("no_workspace"));

    let unknown = send(r#"{"id":"3","method":"marksets.list","params":{}}"#);
    assert_eq!(unknown["error"]["code"].as_str(), Some("not_implemented"));

    let garbage = send("not json");
    assert_eq!(garbage["error"]["code"].as_str(), Some("bad_json"));

    drop(send);
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn every_handler_family_answers() {
    let mut sc = Sidecar::start("2024-06-15");
    let fx = seed(&mut sc);

    let health = sc.ok("health", json!({}));
    assert_eq!(health["today"].as_str(), Some("2024-06-15"));

    sc.ok("setup.get", json!({}));
    sc.ok("schedules.list", json!({}));
    sc.ok("classes.list", json!({ "companyId": fx.company_id }));
    sc.ok("enrollments.list", json!({ "groupId": fx.group_id }));
    sc.ok("groups.get", json!({ "groupId": fx.group_id }));

    let missing = [
        ("schedules.get", json!({ "groupId": "nope" })),
        ("classes.get", json!({ "classId": "nope" })),
        ("classes.delete", json!({ "classId": "nope" })),
        ("attendance.delete", json!({ "classId": "nope", "studentId": fx.student_id })),
        ("exams.delete", json!({ "examId": "nope" })),
        ("exams.results.delete", json!({ "resultId": "nope" })),
        ("enrollments.get", json!({ "studentId": fx.student_id, "groupId": "nope" })),
    ];
    for (method, params) in missing {
        assert_eq!(sc.fail(method, params), "not_found", "{}", method);
    }

    assert_eq!(sc.fail("classes.add", json!({})), "bad_params");
}
