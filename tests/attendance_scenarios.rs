use absensid::{
    db, summarize, AttendancePolicy, AttendanceRecord, AttendanceStatus, AttendanceStore,
    BatchError, DateRange, EntryField, EntryInput, MemoryStore, RecordFilter, SessionBatch,
    SessionKey, SqliteStore, ValidationError,
};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const T: Duration = Duration::from_secs(2);

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

fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).expect("date")
}

fn session() -> SessionKey {
    SessionKey {
        schedule_session_id: "sess-ipa-7a-1".to_string(),
        date: jan(10),
        class_id: Some("7A".to_string()),
    }
}

fn input(subject: &str, status: &str) -> EntryInput {
    EntryInput {
        subject_id: subject.to_string(),
        schedule_session_id: "sess-ipa-7a-1".to_string(),
        date: "2024-01-10".to_string(),
        status: status.to_string(),
        ..EntryInput::default()
    }
}

fn ids() -> Vec<String> {
    vec!["s1".to_string(), "s2".to_string(), "s3".to_string()]
}

fn everything() -> RecordFilter {
    RecordFilter {
        include_voided: true,
        ..RecordFilter::default()
    }
}

fn commit_scenario_c(store: &dyn AttendanceStore) -> Vec<AttendanceRecord> {
    let policy = AttendancePolicy::default();
    let mut batch = SessionBatch::open(session(), ids());
    batch.add_or_replace(&input("s1", "present"), &policy).expect("s1");
    batch.add_or_replace(&input("s2", "present"), &policy).expect("s2");
    let mut sick = input("s3", "sick");
    sick.reason = Some("fever".to_string());
    batch.add_or_replace(&sick, &policy).expect("s3");
    batch.commit(store, &policy, T).expect("commit").to_vec()
}

fn check_scenarios_b_to_d(store: &dyn AttendanceStore) {
    let policy = AttendancePolicy::default();

    // Two of three roster members: commit refused, store untouched.
    let before: Vec<_> = store.query(&everything(), T).expect("query").collect();
    let mut partial = SessionBatch::open(session(), ids());
    partial.add_or_replace(&input("s1", "present"), &policy).expect("s1");
    partial.add_or_replace(&input("s2", "present"), &policy).expect("s2");
    let err = partial.commit(store, &policy, T).unwrap_err();
    assert_eq!(
        err,
        BatchError::Incomplete {
            missing: vec!["s3".to_string()]
        }
    );
    let after: Vec<_> = store.query(&everything(), T).expect("query").collect();
    assert_eq!(before, after);
    let session_rows = store
        .query(&RecordFilter::for_session("sess-ipa-7a-1", jan(10)), T)
        .expect("query");
    assert_eq!(session_rows.count(), 0);

    let records = commit_scenario_c(store);
    let rows = summarize(store, &ids(), DateRange::day(jan(10)), T).expect("summarize");
    let sum = |s| rows.iter().map(|r| r.totals.get(s)).sum::<u32>();
    assert_eq!(sum(AttendanceStatus::Present), 2);
    assert_eq!(sum(AttendanceStatus::Sick), 1);
    assert_eq!(rows.iter().map(|r| r.totals.total()).sum::<u32>(), 3);

    let s1 = records
        .iter()
        .find(|r| r.entry.subject_id == "s1")
        .expect("s1 record");
    store
        .void(&s1.id, Some("entered for wrong student"), T)
        .expect("void");
    let rows = summarize(store, &ids(), DateRange::day(jan(10)), T).expect("summarize");
    let sum = |s| rows.iter().map(|r| r.totals.get(s)).sum::<u32>();
    assert_eq!(sum(AttendanceStatus::Present), 1);
    assert_eq!(sum(AttendanceStatus::Sick), 1);
    assert_eq!(rows[0].subject_id, "s1");
    assert_eq!(rows[0].totals.total(), 0);

    let audit: Vec<_> = store.query(&everything(), T).expect("query").collect();
    let voided = audit
        .iter()
        .find(|r| r.id == s1.id)
        .expect("voided record still queryable");
    assert!(!voided.is_active());
    assert_eq!(
        store.get(&s1.id, T).expect("get").void_reason.as_deref(),
        Some("entered for wrong student")
    );
}

#[test]
fn late_without_check_in_time_names_the_field() {
    let err = absensid::validate(&input("s1", "late"), &AttendancePolicy::default()).unwrap_err();
    assert_eq!(err, ValidationError::MissingRequiredField(EntryField::CheckInTime));
}

#[test]
fn commit_recap_void_cycle_in_memory() {
    check_scenarios_b_to_d(&MemoryStore::new());
}

#[test]
fn commit_recap_void_cycle_on_sqlite() {
    let conn = db::open_db(&temp_dir("absensi-scenarios")).expect("open db");
    check_scenarios_b_to_d(&SqliteStore::new(&conn));
}

#[test]
fn unknown_token_is_absent_not_an_error() {
    assert_eq!(AttendanceStatus::normalize("dinas_luar"), AttendanceStatus::Absent);
    assert!(absensid::unknown_token_count() >= 1);
}

#[test]
fn upsert_twice_equals_upsert_once_on_both_stores() {
    let entry = absensid::validate(&input("s1", "present"), &AttendancePolicy::default())
        .expect("valid");

    let mem = MemoryStore::new();
    mem.upsert(&entry, T).expect("upsert");
    let once: Vec<_> = mem.query(&everything(), T).expect("query").collect();
    mem.upsert(&entry, T).expect("upsert");
    let twice: Vec<_> = mem.query(&everything(), T).expect("query").collect();
    assert_eq!(once, twice);

    let conn = db::open_db(&temp_dir("absensi-idempotent")).expect("open db");
    let sql = SqliteStore::new(&conn);
    sql.upsert(&entry, T).expect("upsert");
    let once: Vec<_> = sql.query(&everything(), T).expect("query").collect();
    sql.upsert(&entry, T).expect("upsert");
    let twice: Vec<_> = sql.query(&everything(), T).expect("query").collect();
    assert_eq!(once, twice);
}

#[test]
fn query_rereads_current_state() {
    let store = MemoryStore::new();
    let filter = RecordFilter::default();
    assert_eq!(store.query(&filter, T).expect("query").count(), 0);
    commit_scenario_c(&store);
    assert_eq!(store.query(&filter, T).expect("query").count(), 3);
}

#[test]
fn abandoned_batch_leaves_no_trace() {
    let store = MemoryStore::new();
    {
        let mut batch = SessionBatch::open(session(), ids());
        batch
            .stamp_remaining(AttendanceStatus::Present, &AttendancePolicy::default())
            .expect("stamp");
        assert!(batch.is_complete());
    }
    assert_eq!(store.query(&everything(), T).expect("query").count(), 0);
}

#[test]
fn concurrent_upserts_to_one_key_leave_one_whole_record() {
    let store = std::sync::Arc::new(MemoryStore::new());
    let handles: Vec<_> = ["present", "absent", "hadir", "alfa"]
        .into_iter()
        .map(|status| {
            let store = store.clone();
            std::thread::spawn(move || {
                let entry = absensid::validate(&input("s1", status), &AttendancePolicy::default())
                    .expect("valid");
                store.upsert(&entry, T).expect("upsert");
            })
        })
        .collect();
    for h in handles {
        h.join().expect("join");
    }
    let all: Vec<_> = store.query(&everything(), T).expect("query").collect();
    assert_eq!(all.len(), 1);
    assert!(matches!(
        all[0].entry.status,
        AttendanceStatus::Present | AttendanceStatus::Absent
    ));
}
