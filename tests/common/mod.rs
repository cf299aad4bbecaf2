#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    pub workspace: TempDir,
}

impl Sidecar {
    /// Spawn the daemon and select a fresh workspace with the clock pinned
    /// to `today`.
    pub fn start(today: &str) -> Self {
        let exe = env!("CARGO_BIN_EXE_trainingd");
        let mut child = Command::new(exe)
            .env_remove("TRAININGD_WORKSPACE")
            .env_remove("TRAININGD_TODAY")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn trainingd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        let workspace = tempfile::tempdir().expect("temp workspace");
        let mut sidecar = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
            workspace,
        };
        let path = sidecar.workspace.path().to_string_lossy().to_string();
        sidecar.ok("workspace.select", json!({ "path": path, "today": today }));
        sidecar
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(Value::Null)
    }

    /// Expect a failure and return its error code.
    pub fn fail(&mut self, method: &str, params: Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"]["code"].as_str().expect("error code").to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub struct Fixture {
    pub company_id: String,
    pub teacher_id: String,
    pub group_id: String,
    pub student_id: String,
}

/// One company, teacher, group and enrolled student.
pub fn seed(sc: &mut Sidecar) -> Fixture {
    let company = sc.ok("companies.create", json!({ "name": "Acme" }));
    let company_id = company["company"]["id"].as_str().expect("company id").to_string();
    let teacher = sc.ok("teachers.create", json!({ "name": "Ada" }));
    let teacher_id = teacher["teacher"]["id"].as_str().expect("teacher id").to_string();
    let group = sc.ok(
        "groups.create",
        json!({ "name": "B1 Morning", "companyId": company_id, "teacherId": teacher_id }),
    );
    let group_id = group["group"]["id"].as_str().expect("group id").to_string();
    let student = sc.ok(
        "students.create",
        json!({ "name": "Sam", "companyId": company_id }),
    );
    let student_id = student["student"]["id"].as_str().expect("student id").to_string();
    sc.ok(
        "enrollments.create",
        json!({ "studentId": student_id, "groupId": group_id, "startDate": "2024-01-01" }),
    );
    Fixture {
        company_id,
        teacher_id,
        group_id,
        student_id,
    }
}

pub fn class_ids(classes: &Value) -> Vec<String> {
    classes
        .as_array()
        .expect("classes array")
        .iter()
        .map(|c| c["id"].as_str().expect("class id").to_string())
        .collect()
}
