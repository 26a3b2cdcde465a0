use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Canonical attendance status. Exactly one per (subject, session, date).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Excused,
    Sick,
    Absent,
    EarlyLeave,
}

/// Fields of an entry that a status may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryField {
    SubjectId,
    ScheduleSessionId,
    Reason,
    CheckInTime,
    LeavePeriod,
    AttachmentRef,
}

impl EntryField {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryField::SubjectId => "subjectId",
            EntryField::ScheduleSessionId => "scheduleSessionId",
            EntryField::Reason => "reason",
            EntryField::CheckInTime => "checkInTime",
            EntryField::LeavePeriod => "leavePeriod",
            EntryField::AttachmentRef => "attachmentRef",
        }
    }
}

impl fmt::Display for EntryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Id,
    En,
}

// Keys are folded: lowercase with `_`, `-` and spaces removed.
const ALIASES: &[(&str, AttendanceStatus)] = &[
    ("present", AttendanceStatus::Present),
    ("hadir", AttendanceStatus::Present),
    ("h", AttendanceStatus::Present),
    ("late", AttendanceStatus::Late),
    ("terlambat", AttendanceStatus::Late),
    ("telat", AttendanceStatus::Late),
    ("t", AttendanceStatus::Late),
    ("excused", AttendanceStatus::Excused),
    ("izin", AttendanceStatus::Excused),
    ("ijin", AttendanceStatus::Excused),
    ("i", AttendanceStatus::Excused),
    ("permission", AttendanceStatus::Excused),
    ("sick", AttendanceStatus::Sick),
    ("sakit", AttendanceStatus::Sick),
    ("s", AttendanceStatus::Sick),
    ("absent", AttendanceStatus::Absent),
    ("alpha", AttendanceStatus::Absent),
    ("alfa", AttendanceStatus::Absent),
    ("alpa", AttendanceStatus::Absent),
    ("a", AttendanceStatus::Absent),
    ("tanpaketerangan", AttendanceStatus::Absent),
    ("earlyleave", AttendanceStatus::EarlyLeave),
    ("pulang", AttendanceStatus::EarlyLeave),
    ("pulangawal", AttendanceStatus::EarlyLeave),
    ("pulangcepat", AttendanceStatus::EarlyLeave),
    ("p", AttendanceStatus::EarlyLeave),
];

static UNKNOWN_TOKENS: AtomicU64 = AtomicU64::new(0);

fn fold_token(token: &str) -> String {
    token
        .trim()
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 6] = [
        AttendanceStatus::Present,
        AttendanceStatus::Late,
        AttendanceStatus::Excused,
        AttendanceStatus::Sick,
        AttendanceStatus::Absent,
        AttendanceStatus::EarlyLeave,
    ];

    /// Strict lookup: `None` for tokens outside the alias table.
    pub fn parse(token: &str) -> Option<AttendanceStatus> {
        let key = fold_token(token);
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, status)| *status)
    }

    /// Lenient lookup. Unknown tokens fall back to `Absent`; every fallback is
    /// logged and counted (see [`unknown_token_count`]).
    pub fn normalize(token: &str) -> AttendanceStatus {
        if let Some(status) = AttendanceStatus::parse(token) {
            return status;
        }
        UNKNOWN_TOKENS.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(token, fallback = "absent", "unknown attendance status token");
        AttendanceStatus::Absent
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
            AttendanceStatus::Sick => "sick",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::EarlyLeave => "earlyLeave",
        }
    }

    pub fn required_fields(self) -> &'static [EntryField] {
        match self {
            AttendanceStatus::Present | AttendanceStatus::Absent => &[],
            AttendanceStatus::Late => &[EntryField::CheckInTime],
            AttendanceStatus::Excused | AttendanceStatus::Sick => &[EntryField::Reason],
            AttendanceStatus::EarlyLeave => &[EntryField::Reason, EntryField::LeavePeriod],
        }
    }

    pub fn requires(self, field: EntryField) -> bool {
        self.required_fields().contains(&field)
    }

    /// Single-letter column code used by rekap sheets.
    pub fn code(self) -> char {
        match self {
            AttendanceStatus::Present => 'H',
            AttendanceStatus::Late => 'T',
            AttendanceStatus::Excused => 'I',
            AttendanceStatus::Sick => 'S',
            AttendanceStatus::Absent => 'A',
            AttendanceStatus::EarlyLeave => 'P',
        }
    }

    pub fn display_label(self, locale: Locale) -> &'static str {
        match (locale, self) {
            (Locale::Id, AttendanceStatus::Present) => "Hadir",
            (Locale::Id, AttendanceStatus::Late) => "Terlambat",
            (Locale::Id, AttendanceStatus::Excused) => "Izin",
            (Locale::Id, AttendanceStatus::Sick) => "Sakit",
            (Locale::Id, AttendanceStatus::Absent) => "Alfa",
            (Locale::Id, AttendanceStatus::EarlyLeave) => "Pulang",
            (Locale::En, AttendanceStatus::Present) => "Present",
            (Locale::En, AttendanceStatus::Late) => "Late",
            (Locale::En, AttendanceStatus::Excused) => "Excused",
            (Locale::En, AttendanceStatus::Sick) => "Sick",
            (Locale::En, AttendanceStatus::Absent) => "Absent",
            (Locale::En, AttendanceStatus::EarlyLeave) => "Early leave",
        }
    }

    pub fn display_color(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "#16a34a",
            AttendanceStatus::Late => "#f59e0b",
            AttendanceStatus::Excused => "#2563eb",
            AttendanceStatus::Sick => "#9333ea",
            AttendanceStatus::Absent => "#dc2626",
            AttendanceStatus::EarlyLeave => "#0d9488",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of tokens that went through the `Absent` fallback since process start.
pub fn unknown_token_count() -> u64 {
    UNKNOWN_TOKENS.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("capture lock").extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn alias_table_maps_every_dialect() {
        let cases = [
            ("present", AttendanceStatus::Present),
            ("Hadir", AttendanceStatus::Present),
            ("H", AttendanceStatus::Present),
            ("terlambat", AttendanceStatus::Late),
            ("Telat", AttendanceStatus::Late),
            ("izin", AttendanceStatus::Excused),
            ("IJIN", AttendanceStatus::Excused),
            ("sakit", AttendanceStatus::Sick),
            ("alpha", AttendanceStatus::Absent),
            ("alfa", AttendanceStatus::Absent),
            ("Alpa", AttendanceStatus::Absent),
            ("absent", AttendanceStatus::Absent),
            ("tanpa keterangan", AttendanceStatus::Absent),
            ("pulang", AttendanceStatus::EarlyLeave),
            ("early_leave", AttendanceStatus::EarlyLeave),
            ("earlyLeave", AttendanceStatus::EarlyLeave),
            ("early-leave", AttendanceStatus::EarlyLeave),
            ("  pulang awal ", AttendanceStatus::EarlyLeave),
        ];
        for (token, expected) in cases {
            assert_eq!(AttendanceStatus::parse(token), Some(expected), "token {token:?}");
            assert_eq!(AttendanceStatus::normalize(token), expected, "token {token:?}");
        }
    }

    #[test]
    fn canonical_names_round_trip_through_parse() {
        for status in AttendanceStatus::ALL {
            assert_eq!(AttendanceStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn unknown_token_falls_back_to_absent_with_warning() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let before = unknown_token_count();
        let status = tracing::subscriber::with_default(subscriber, || {
            AttendanceStatus::normalize("dinas_luar")
        });

        assert_eq!(status, AttendanceStatus::Absent);
        assert!(unknown_token_count() > before);
        let text = String::from_utf8(captured.0.lock().expect("capture lock").clone())
            .expect("utf8 log");
        assert!(text.contains("WARN"), "log was: {text}");
        assert!(text.contains("dinas_luar"), "log was: {text}");
        assert_eq!(AttendanceStatus::parse("dinas_luar"), None);
    }

    #[test]
    fn required_fields_table() {
        assert!(AttendanceStatus::Present.required_fields().is_empty());
        assert!(AttendanceStatus::Absent.required_fields().is_empty());
        assert_eq!(
            AttendanceStatus::Late.required_fields(),
            &[EntryField::CheckInTime]
        );
        assert_eq!(AttendanceStatus::Sick.required_fields(), &[EntryField::Reason]);
        assert_eq!(
            AttendanceStatus::Excused.required_fields(),
            &[EntryField::Reason]
        );
        assert!(AttendanceStatus::EarlyLeave.requires(EntryField::Reason));
        assert!(AttendanceStatus::EarlyLeave.requires(EntryField::LeavePeriod));
    }

    #[test]
    fn display_metadata_is_defined_for_all() {
        for status in AttendanceStatus::ALL {
            assert!(!status.display_label(Locale::Id).is_empty());
            assert!(!status.display_label(Locale::En).is_empty());
            assert!(status.display_color().starts_with('#'));
        }
        assert_eq!(AttendanceStatus::Absent.display_label(Locale::Id), "Alfa");
        assert_eq!(AttendanceStatus::EarlyLeave.code(), 'P');
    }

    #[test]
    fn serde_uses_camel_case_names() {
        let v = serde_json::to_value(AttendanceStatus::EarlyLeave).expect("serialize");
        assert_eq!(v, serde_json::json!("earlyLeave"));
        let back: AttendanceStatus = serde_json::from_value(v).expect("deserialize");
        assert_eq!(back, AttendanceStatus::EarlyLeave);
    }
}
