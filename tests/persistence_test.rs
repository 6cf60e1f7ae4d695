#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

fn replay(script: &str, db_path: &std::path::Path) -> Vec<serde_json::Value> {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{script}").unwrap();

    let output = Command::new(cargo_bin!("stayhub"))
        .arg("replay")
        .arg(file.path())
        .arg("--db-path")
        .arg(db_path)
        .env("CHAPA_SECRET_KEY", "CHASECK_TEST-local")
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: a host signs up and lists a room, a guest books it.
    let first = replay(
        r#"{"method":"POST","path":"/auth/signup","body":{"username":"almaz","email":"almaz@example.com","role":"host","password":"password123"}}
{"method":"POST","path":"/auth/signup","body":{"username":"dawit","email":"dawit@example.com","password":"password123"}}
{"method":"POST","path":"/listings","actor":"almaz","body":{"title":"Garden room","location":"Bahir Dar","price_per_night":"75"},"capture":"room"}
{"method":"POST","path":"/listings/{{room.listing_id}}/book","actor":"dawit","body":{"start_date":"2030-02-01","end_date":"2030-02-03"}}
"#,
        &db_path,
    );
    assert_eq!(first.len(), 4);
    assert!(first.iter().all(|r| r["status"] == 201));
    let listing_id = first[2]["body"]["listing_id"].as_str().unwrap().to_string();

    // 2. Second run against the same DB: the users, the listing and the
    //    booked nights survived.
    let second = replay(
        &format!(
            r#"{{"method":"POST","path":"/auth/login","body":{{"username":"dawit","password":"password123"}}}}
{{"method":"GET","path":"/bookings","actor":"almaz"}}
{{"method":"POST","path":"/listings/{listing_id}/book","actor":"dawit","body":{{"start_date":"2030-02-02","end_date":"2030-02-04"}}}}
"#
        ),
        &db_path,
    );
    assert_eq!(second[0]["status"], 200);
    assert_eq!(second[1]["body"].as_array().unwrap().len(), 1);
    assert_eq!(second[1]["body"][0]["total_price"], "150");
    assert_eq!(second[2]["body"]["error"], "DateConflict");
}
