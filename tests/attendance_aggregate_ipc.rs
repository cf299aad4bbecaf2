mod common;

use common::{seed, Sidecar};
use serde_json::json;

fn enrollment(sc: &mut Sidecar, student_id: &str, group_id: &str) -> serde_json::Value {
    let got = sc.ok(
        "enrollments.get",
        json!({ "studentId": student_id, "groupId": group_id }),
    );
    got["enrollment"].clone()
}

#[test]
fn attendance_percentage_follows_marked_classes() {
    let mut sc = Sidecar::start("2024-03-01");
    let fx = seed(&mut sc);

    let untouched = enrollment(&mut sc, &fx.student_id, &fx.group_id);
    assert!(untouched["attendancePercentage"].is_null());

    let mut class_ids = Vec::new();
    for day in ["2024-03-04", "2024-03-05", "2024-03-06", "2024-03-07", "2024-03-08"] {
        let c = sc.ok(
            "classes.add",
            json!({ "groupId": fx.group_id, "date": day, "startTime": "09:00", "endTime": "10:00" }),
        );
        class_ids.push(c["class"]["id"].as_str().expect("id").to_string());
    }

    // Four marked (three present), the fifth class never marked.
    for (class_id, status) in class_ids
        .iter()
        .zip(["present", "present", "present", "without_notice"])
    {
        sc.ok(
            "attendance.bulkUpsert",
            json!({
                "classId": class_id,
                "records": [{ "studentId": fx.student_id, "status": status }]
            }),
        );
    }
    let e = enrollment(&mut sc, &fx.student_id, &fx.group_id);
    assert_eq!(e["attendancePercentage"].as_f64(), Some(75.0));

    sc.ok(
        "attendance.delete",
        json!({ "classId": class_ids[0], "studentId": fx.student_id }),
    );
    let e = enrollment(&mut sc, &fx.student_id, &fx.group_id);
    assert_eq!(e["attendancePercentage"].as_f64(), Some(66.67));

    // Re-marking the same class updates in place rather than adding a record.
    sc.ok(
        "attendance.bulkUpsert",
        json!({
            "classId": class_ids[3],
            "records": [{ "studentId": fx.student_id, "status": "present" }]
        }),
    );
    let e = enrollment(&mut sc, &fx.student_id, &fx.group_id);
    assert_eq!(e["attendancePercentage"].as_f64(), Some(100.0));
}

#[test]
fn removing_the_last_record_keeps_the_previous_percentage() {
    let mut sc = Sidecar::start("2024-03-01");
    let fx = seed(&mut sc);

    let c = sc.ok(
        "classes.add",
        json!({ "groupId": fx.group_id, "date": "2024-03-04", "startTime": "09:00", "endTime": "10:00" }),
    );
    let class_id = c["class"]["id"].as_str().expect("id").to_string();
    sc.ok(
        "attendance.bulkUpsert",
        json!({
            "classId": class_id,
            "records": [{ "studentId": fx.student_id, "status": "business_trip" }]
        }),
    );
    let e = enrollment(&mut sc, &fx.student_id, &fx.group_id);
    assert_eq!(e["attendancePercentage"].as_f64(), Some(0.0));

    sc.ok(
        "attendance.delete",
        json!({ "classId": class_id, "studentId": fx.student_id }),
    );
    let e = enrollment(&mut sc, &fx.student_id, &fx.group_id);
    assert_eq!(e["attendancePercentage"].as_f64(), Some(0.0));
}

#[test]
fn a_bad_record_rolls_back_the_whole_batch() {
    let mut sc = Sidecar::start("2024-03-01");
    let fx = seed(&mut sc);

    let c = sc.ok(
        "classes.add",
        json!({ "groupId": fx.group_id, "date": "2024-03-04", "startTime": "09:00", "endTime": "10:00" }),
    );
    let class_id = c["class"]["id"].as_str().expect("id").to_string();

    let code = sc.fail(
        "attendance.bulkUpsert",
        json!({
            "classId": class_id,
            "records": [
                { "studentId": fx.student_id, "status": "present" },
                { "studentId": "ghost", "status": "present" }
            ]
        }),
    );
    assert_eq!(code, "not_found");

    let too_long = sc.fail(
        "attendance.bulkUpsert",
        json!({
            "classId": class_id,
            "records": [{ "studentId": fx.student_id, "status": "present", "minutesAttended": 61 }]
        }),
    );
    assert_eq!(too_long, "bad_params");

    let got = sc.ok("classes.get", json!({ "classId": class_id }));
    assert_eq!(got["class"]["attendance"].as_array().map(|a| a.len()), Some(0));
    let e = enrollment(&mut sc, &fx.student_id, &fx.group_id);
    assert!(e["attendancePercentage"].is_null());

    let unknown_status = sc.fail(
        "attendance.bulkUpsert",
        json!({
            "classId": class_id,
            "records": [{ "studentId": fx.student_id, "status": "sick" }]
        }),
    );
    assert_eq!(unknown_status, "bad_params");
}
