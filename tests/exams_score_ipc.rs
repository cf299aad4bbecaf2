mod common;

use common::{seed, Sidecar};
use serde_json::json;

fn average(sc: &mut Sidecar, student_id: &str, group_id: &str) -> Option<f64> {
    let got = sc.ok(
        "enrollments.get",
        json!({ "studentId": student_id, "groupId": group_id }),
    );
    got["enrollment"]["averageScore"].as_f64()
}

#[test]
fn average_score_tracks_result_changes() {
    let mut sc = Sidecar::start("2024-03-01");
    let fx = seed(&mut sc);

    let unit1 = sc.ok(
        "exams.create",
        json!({ "groupId": fx.group_id, "title": "Unit 1", "date": "2024-03-10", "maxScore": 100 }),
    );
    let unit1_id = unit1["exam"]["id"].as_str().expect("id").to_string();
    let unit2 = sc.ok(
        "exams.create",
        json!({ "groupId": fx.group_id, "title": "Unit 2" }),
    );
    let unit2_id = unit2["exam"]["id"].as_str().expect("id").to_string();

    let bulk = sc.ok(
        "exams.results.bulkCreate",
        json!({
            "examId": unit1_id,
            "results": [
                { "studentId": fx.student_id, "score": 80 },
                { "studentId": fx.student_id, "score": 90 }
            ]
        }),
    );
    assert_eq!(bulk["results"].as_array().map(|r| r.len()), Some(2));
    let last = sc.ok(
        "exams.results.create",
        json!({ "examId": unit2_id, "studentId": fx.student_id, "score": 70, "feedback": "ok" }),
    );
    let last_id = last["result"]["id"].as_str().expect("id").to_string();
    assert_eq!(average(&mut sc, &fx.student_id, &fx.group_id), Some(80.0));

    sc.ok(
        "exams.results.update",
        json!({ "resultId": last_id, "patch": { "score": 40 } }),
    );
    assert_eq!(average(&mut sc, &fx.student_id, &fx.group_id), Some(70.0));

    sc.ok("exams.results.delete", json!({ "resultId": last_id }));
    assert_eq!(average(&mut sc, &fx.student_id, &fx.group_id), Some(85.0));

    let listed = sc.ok("exams.results.list", json!({ "examId": unit1_id }));
    assert_eq!(listed["results"].as_array().map(|r| r.len()), Some(2));

    // Dropping every result leaves the last computed average in place.
    sc.ok("exams.delete", json!({ "examId": unit1_id }));
    assert_eq!(average(&mut sc, &fx.student_id, &fx.group_id), Some(85.0));
    assert_eq!(sc.fail("exams.results.list", json!({ "examId": unit1_id })), "not_found");
}

#[test]
fn score_writes_leave_attendance_alone() {
    let mut sc = Sidecar::start("2024-03-01");
    let fx = seed(&mut sc);

    let c = sc.ok(
        "classes.add",
        json!({ "groupId": fx.group_id, "date": "2024-03-04", "startTime": "09:00", "endTime": "10:00" }),
    );
    sc.ok(
        "attendance.bulkUpsert",
        json!({
            "classId": c["class"]["id"],
            "records": [{ "studentId": fx.student_id, "status": "present" }]
        }),
    );
    let exam = sc.ok("exams.create", json!({ "groupId": fx.group_id, "title": "Final" }));
    sc.ok(
        "exams.results.create",
        json!({ "examId": exam["exam"]["id"], "studentId": fx.student_id, "score": 55.5 }),
    );

    let got = sc.ok(
        "enrollments.get",
        json!({ "studentId": fx.student_id, "groupId": fx.group_id }),
    );
    assert_eq!(got["enrollment"]["attendancePercentage"].as_f64(), Some(100.0));
    assert_eq!(got["enrollment"]["averageScore"].as_f64(), Some(55.5));
}
