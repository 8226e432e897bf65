use chrono::{DateTime, Days, NaiveDate, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of a job. `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }

    /// Transitions only ever leave `Pending`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        self == JobStatus::Pending && next.is_terminal()
    }
}

/// Durable state record for a job, one per `job_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub user_id: String,
    pub status: JobStatus,
    pub name: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
    pub artifact_key: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl JobRecord {
    /// A freshly admitted job.
    pub fn pending(
        job_id: Uuid,
        user_id: impl Into<String>,
        name: impl Into<String>,
        action: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            user_id: user_id.into(),
            status: JobStatus::Pending,
            name: name.into(),
            action: action.into(),
            created_at,
            artifact_key: None,
            completed_at: None,
            error: None,
        }
    }
}

/// Queue payload: the fields a worker needs to produce the artifact.
///
/// `context1` and `context2` exist only here (and in the transient outbox
/// row); they are never part of the [`JobRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub action: String,
    pub context1: String,
    pub context2: String,
    pub user_id: String,
}

impl JobMessage {
    pub fn decode(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Body of `POST /job`. Fields are opaque; only presence is checked.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitJobRequest {
    #[garde(required)]
    pub name: Option<String>,

    #[garde(required)]
    pub action: Option<String>,

    #[garde(required)]
    pub context1: Option<String>,

    #[garde(required)]
    pub context2: Option<String>,
}

/// A UTC calendar day, as the half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayRange {
    pub fn utc(date: NaiveDate) -> Self {
        let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
        let next = date.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
        Self {
            date,
            start,
            end: next.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }

    /// The UTC day containing `instant`.
    pub fn containing(instant: DateTime<Utc>) -> Self {
        Self::utc(instant.date_naive())
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(JobStatus::Pending.to_string(), "PENDING");
        assert_eq!(JobStatus::from_str("COMPLETE").unwrap(), JobStatus::Complete);
        assert_eq!(
            serde_json::to_string(&JobStatus::Failed).unwrap(),
            "\"FAILED\""
        );
    }

    #[test]
    fn test_transitions_only_leave_pending() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Complete));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Complete.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Complete.can_transition_to(JobStatus::Complete));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Complete));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_message_requires_job_id() {
        let body = r#"{"name":"T","action":"run","context1":"a","context2":"b","user_id":"u"}"#;
        assert!(JobMessage::decode(body).is_err());
    }

    #[test]
    fn test_message_name_is_optional() {
        let id = Uuid::new_v4();
        let body = format!(
            r#"{{"job_id":"{id}","action":"run","context1":"a","context2":"b","user_id":"u"}}"#
        );
        let message = JobMessage::decode(&body).unwrap();
        assert_eq!(message.job_id, id);
        assert_eq!(message.name, None);
    }

    #[test]
    fn test_submit_request_requires_all_fields() {
        let full: SubmitJobRequest = serde_json::from_str(
            r#"{"name":"T","action":"run","context1":"a","context2":""}"#,
        )
        .unwrap();
        assert!(full.validate().is_ok());

        let partial: SubmitJobRequest =
            serde_json::from_str(r#"{"name":"T","action":"run","context1":"a"}"#).unwrap();
        assert!(partial.validate().is_err());
    }

    #[test]
    fn test_day_range_bounds() {
        let day = DayRange::utc(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        let inside = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
        let next = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 3, 8, 23, 59, 59).unwrap();

        assert!(day.contains(day.start));
        assert!(day.contains(inside));
        assert!(!day.contains(next));
        assert!(!day.contains(before));
        assert_eq!(DayRange::containing(inside), day);
    }
}
