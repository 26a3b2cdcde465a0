use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_absensid");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn absensid");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn entry(subject: &str, status: &str) -> serde_json::Value {
    json!({
        "subjectId": subject,
        "scheduleSessionId": "sess-ipa-7a-1",
        "date": "2024-01-10",
        "status": status,
    })
}

fn totals_sum(rows: &serde_json::Value, status: &str) -> i64 {
    rows.as_array()
        .expect("rows")
        .iter()
        .map(|r| r["totals"][status].as_i64().unwrap_or(0))
        .sum()
}

#[test]
fn batch_commit_recap_and_void_over_ipc() {
    let workspace = temp_dir("absensi-ipc-batch");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let no_ws = request(
        &mut stdin,
        &mut reader,
        "0",
        "recap.students",
        json!({ "subjectIds": ["s1"], "from": "2024-01-10", "to": "2024-01-10" }),
    );
    assert_eq!(error_code(&no_ws), "no_workspace");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "batch.open",
        json!({
            "scheduleSessionId": "sess-ipa-7a-1",
            "date": "2024-01-10",
            "classId": "7A",
            "roster": ["s1", "s2", "s3"],
        }),
    );
    let batch_id = opened["batchId"].as_str().expect("batchId").to_string();
    assert_eq!(opened["state"], json!("draft"));

    let late = request(
        &mut stdin,
        &mut reader,
        "3",
        "batch.set",
        json!({ "batchId": batch_id, "entry": entry("s1", "late") }),
    );
    assert_eq!(error_code(&late), "missing_required_field");
    assert_eq!(late["error"]["details"]["field"], json!("checkInTime"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "batch.set",
        json!({ "batchId": batch_id, "entry": entry("s1", "hadir") }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "batch.set",
        json!({ "batchId": batch_id, "entry": entry("s2", "present") }),
    );

    let incomplete = request(
        &mut stdin,
        &mut reader,
        "6",
        "batch.commit",
        json!({ "batchId": batch_id }),
    );
    assert_eq!(error_code(&incomplete), "incomplete_batch");
    assert_eq!(incomplete["error"]["details"]["missing"], json!(["s3"]));

    let none_yet = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "records.query",
        json!({ "filter": { "scheduleSessionId": "sess-ipa-7a-1", "includeVoided": true } }),
    );
    assert_eq!(none_yet["records"], json!([]));

    let mut sick = entry("s3", "sakit");
    sick["reason"] = json!("fever");
    let complete = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "batch.set",
        json!({ "batchId": batch_id, "entry": sick }),
    );
    assert_eq!(complete["state"], json!("complete"));

    let committed = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "batch.commit",
        json!({ "batchId": batch_id }),
    );
    let records = committed["records"].as_array().expect("records").clone();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r["classId"] == json!("7A")));

    let gone = request(
        &mut stdin,
        &mut reader,
        "10",
        "batch.get",
        json!({ "batchId": batch_id }),
    );
    assert_eq!(error_code(&gone), "not_found");

    let recap = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "recap.students",
        json!({ "subjectIds": ["s1", "s2", "s3"], "from": "2024-01-10", "to": "2024-01-10" }),
    );
    assert_eq!(totals_sum(&recap["rows"], "present"), 2);
    assert_eq!(totals_sum(&recap["rows"], "sick"), 1);

    let s1_id = records
        .iter()
        .find(|r| r["subjectId"] == json!("s1"))
        .and_then(|r| r["id"].as_str())
        .expect("s1 record id")
        .to_string();
    let voided = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "records.void",
        json!({ "recordId": s1_id, "reason": "wrong student" }),
    );
    assert!(voided["record"]["voidedAt"].is_string());

    let recap = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "recap.students",
        json!({ "subjectIds": ["s1", "s2", "s3"], "from": "2024-01-10", "to": "2024-01-10" }),
    );
    assert_eq!(totals_sum(&recap["rows"], "present"), 1);
    assert_eq!(totals_sum(&recap["rows"], "sick"), 1);

    let audit = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "records.query",
        json!({ "filter": { "subjectIds": ["s1"], "includeVoided": true } }),
    );
    assert_eq!(audit["records"].as_array().map(|a| a.len()), Some(1));
    let active = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "records.query",
        json!({ "filter": { "subjectIds": ["s1"] } }),
    );
    assert_eq!(active["records"], json!([]));

    let class = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "recap.class",
        json!({ "classId": "7A", "roster": ["s1", "s2", "s3", "s4"], "from": "2024-01-01", "to": "2024-01-31" }),
    );
    assert_eq!(class["rows"].as_array().map(|a| a.len()), Some(4));
    assert_eq!(class["totals"]["present"], json!(1));
    assert_eq!(class["totals"]["late"], json!(0));
}

#[test]
fn stamp_remaining_and_corrections_over_ipc() {
    let workspace = temp_dir("absensi-ipc-stamp");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "batch.open",
        json!({ "scheduleSessionId": "sess-ipa-7a-1", "date": "2024-01-10", "roster": ["s1", "s2"] }),
    );
    let batch_id = opened["batchId"].as_str().expect("batchId").to_string();

    let stamped = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "batch.stampRemaining",
        json!({ "batchId": batch_id, "status": "hadir" }),
    );
    assert_eq!(stamped["stamped"], json!(2));
    assert_eq!(stamped["state"], json!("complete"));

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "batch.remove",
        json!({ "batchId": batch_id, "subjectId": "s2" }),
    );
    assert_eq!(removed["state"], json!("draft"));
    assert_eq!(removed["missing"], json!(["s2"]));

    let discarded = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "batch.discard",
        json!({ "batchId": batch_id }),
    );
    assert_eq!(discarded["discarded"], json!(true));

    let mut late = entry("s1", "terlambat");
    late["checkInTime"] = json!("07:20");
    let upserted = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "records.upsert",
        json!({ "entry": late }),
    );
    let id = upserted["record"]["id"].as_str().expect("id").to_string();
    assert_eq!(upserted["record"]["status"], json!("late"));

    let corrected = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "records.upsert",
        json!({ "entry": entry("s1", "present") }),
    );
    assert_eq!(corrected["record"]["id"], json!(id));
    assert_eq!(corrected["record"]["status"], json!("present"));

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "records.get",
        json!({ "recordId": id }),
    );
    assert_eq!(fetched["record"]["status"], json!("present"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "9",
        "records.void",
        json!({ "recordId": "does-not-exist" }),
    );
    assert_eq!(error_code(&missing), "not_found");
}
