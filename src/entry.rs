use crate::error::ValidationError;
use crate::policy::AttendancePolicy;
use crate::status::{AttendanceStatus, EntryField};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// An attendance entry as decoded from the transport, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInput {
    pub subject_id: String,
    pub schedule_session_id: String,
    #[serde(default)]
    pub class_id: Option<String>,
    pub date: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub check_in_time: Option<String>,
    #[serde(default)]
    pub leave_period: Option<String>,
    #[serde(default)]
    pub attachment_ref: Option<String>,
}

/// An entry that passed [`validate`]. Only these reach a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidEntry {
    pub subject_id: String,
    pub schedule_session_id: String,
    pub class_id: Option<String>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub reason: Option<String>,
    pub check_in_time: Option<NaiveTime>,
    pub leave_period: Option<String>,
    pub attachment_ref: Option<String>,
}

impl From<&ValidEntry> for EntryInput {
    fn from(e: &ValidEntry) -> Self {
        EntryInput {
            subject_id: e.subject_id.clone(),
            schedule_session_id: e.schedule_session_id.clone(),
            class_id: e.class_id.clone(),
            date: e.date.format("%Y-%m-%d").to_string(),
            status: e.status.as_str().to_string(),
            reason: e.reason.clone(),
            check_in_time: e.check_in_time.map(|t| t.format("%H:%M:%S").to_string()),
            leave_period: e.leave_period.clone(),
            attachment_ref: e.attachment_ref.clone(),
        }
    }
}

impl ValidEntry {
    /// Re-run [`validate`] on this entry, e.g. after the policy changed.
    pub fn revalidate(&self, policy: &AttendancePolicy) -> Result<ValidEntry, ValidationError> {
        validate(&EntryInput::from(self), policy)
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            subject_id: self.subject_id.clone(),
            schedule_session_id: self.schedule_session_id.clone(),
            date: self.date,
        }
    }
}

/// Identity of a stored record: one status per subject, session and date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    pub subject_id: String,
    pub schedule_session_id: String,
    pub date: NaiveDate,
}

fn present_text(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(raw.to_string()))
}

pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ValidationError> {
    let t = raw.trim();
    NaiveTime::parse_from_str(t, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
        .map_err(|_| ValidationError::InvalidTimeFormat(raw.to_string()))
}

/// Turn a raw status token into a status, honouring `strict_status_tokens`.
pub fn resolve_status(token: &str, policy: &AttendancePolicy) -> Result<AttendanceStatus, ValidationError> {
    if policy.strict_status_tokens {
        AttendanceStatus::parse(token).ok_or_else(|| ValidationError::UnknownStatus(token.to_string()))
    } else {
        Ok(AttendanceStatus::normalize(token))
    }
}

/// Check one entry against the requirements of its status.
///
/// Only missing or malformed data fails; extra fields (a reason on a
/// `present` entry, say) are kept as-is. Blank optional fields are dropped.
pub fn validate(input: &EntryInput, policy: &AttendancePolicy) -> Result<ValidEntry, ValidationError> {
    let status = resolve_status(&input.status, policy)?;

    let subject_id = input.subject_id.trim();
    if subject_id.is_empty() {
        return Err(ValidationError::MissingRequiredField(EntryField::SubjectId));
    }
    let schedule_session_id = input.schedule_session_id.trim();
    if schedule_session_id.is_empty() {
        return Err(ValidationError::MissingRequiredField(
            EntryField::ScheduleSessionId,
        ));
    }
    let date = parse_date(&input.date)?;

    let reason = present_text(&input.reason);
    let check_in_raw = present_text(&input.check_in_time);
    let leave_period = present_text(&input.leave_period);
    let attachment_ref = present_text(&input.attachment_ref);

    for field in status.required_fields() {
        let supplied = match field {
            EntryField::Reason => reason.is_some(),
            EntryField::CheckInTime => check_in_raw.is_some(),
            EntryField::LeavePeriod => leave_period.is_some(),
            EntryField::AttachmentRef => attachment_ref.is_some(),
            EntryField::SubjectId | EntryField::ScheduleSessionId => true,
        };
        if !supplied {
            return Err(ValidationError::MissingRequiredField(*field));
        }
    }

    let check_in_time = check_in_raw.as_deref().map(parse_time_of_day).transpose()?;

    if policy.attachment.requires(status) && attachment_ref.is_none() {
        return Err(ValidationError::MissingAttachment(status));
    }

    Ok(ValidEntry {
        subject_id: subject_id.to_string(),
        schedule_session_id: schedule_session_id.to_string(),
        class_id: present_text(&input.class_id),
        date,
        status,
        reason,
        check_in_time,
        leave_period,
        attachment_ref,
    })
}
