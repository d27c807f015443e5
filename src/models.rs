use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;

#[derive(Debug, Clone, Serialize)]
pub struct StudentRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub handle: String,
    pub current_rating: i32,
    pub max_rating: i32,
    pub is_inactive: bool,
    pub last_data_sync: Option<DateTime<Utc>>,
    pub is_data_syncing: bool,
    pub last_submission_at: Option<DateTime<Utc>>,
    pub inactivity_detected_at: Option<DateTime<Utc>>,
    pub last_reminder_sent: Option<DateTime<Utc>>,
    /// Raw payload of the last successful sync. Presentation only.
    pub remote_data: Option<RemotePayload>,
}

impl StudentRecord {
    pub fn new(id: Uuid, input: StudentInput) -> Self {
        Self {
            id,
            name: input.name,
            email: input.email,
            phone: input.phone,
            handle: input.handle,
            current_rating: 0,
            max_rating: 0,
            is_inactive: false,
            last_data_sync: None,
            is_data_syncing: false,
            last_submission_at: None,
            inactivity_detected_at: None,
            last_reminder_sent: None,
            remote_data: None,
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_inactive {
            "Inactive"
        } else {
            "Active"
        }
    }
}

/// Fields accepted when enrolling a student.
#[derive(Debug, Clone, Deserialize)]
pub struct StudentInput {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub handle: String,
}

impl StudentInput {
    pub fn validated(self) -> Result<Self, SyncError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(SyncError::InvalidInput("name must not be empty".to_string()));
        }
        let email = self.email.trim().to_string();
        validate_email(&email)?;
        let handle = self.handle.trim().to_string();
        validate_handle(&handle)?;

        Ok(Self {
            name,
            email,
            phone: self.phone.trim().to_string(),
            handle,
        })
    }
}

/// Partial update; `None` leaves the field as it is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub handle: Option<String>,
    pub last_reminder_sent: Option<DateTime<Utc>>,
}

impl StudentUpdate {
    pub fn validated(self) -> Result<Self, SyncError> {
        let name = match self.name {
            Some(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(SyncError::InvalidInput("name must not be empty".to_string()));
                }
                Some(name)
            }
            None => None,
        };
        let email = match self.email {
            Some(email) => {
                let email = email.trim().to_string();
                validate_email(&email)?;
                Some(email)
            }
            None => None,
        };
        let handle = match self.handle {
            Some(handle) => {
                let handle = handle.trim().to_string();
                validate_handle(&handle)?;
                Some(handle)
            }
            None => None,
        };

        Ok(Self {
            name,
            email,
            phone: self.phone.map(|phone| phone.trim().to_string()),
            handle,
            last_reminder_sent: self.last_reminder_sent,
        })
    }

    pub fn apply_to(self, record: &mut StudentRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(email) = self.email {
            record.email = email;
        }
        if let Some(phone) = self.phone {
            record.phone = phone;
        }
        if let Some(handle) = self.handle {
            record.handle = handle;
        }
        if let Some(sent) = self.last_reminder_sent {
            record.last_reminder_sent = Some(sent);
        }
    }
}

fn validate_email(email: &str) -> Result<(), SyncError> {
    if !email.is_empty() && !email.contains('@') {
        return Err(SyncError::InvalidInput(format!("invalid email address: {email}")));
    }
    Ok(())
}

fn validate_handle(handle: &str) -> Result<(), SyncError> {
    if !(3..=24).contains(&handle.len()) {
        return Err(SyncError::InvalidInput(format!(
            "handle must be 3-24 characters: {handle:?}"
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.');
    if !handle.chars().all(allowed) {
        return Err(SyncError::InvalidInput(format!(
            "handle contains unsupported characters: {handle:?}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct RemotePayload {
    pub profile: RemoteUserProfile,
    pub submissions: Vec<RemoteSubmission>,
    pub rating_history: Vec<RemoteRatingChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteUserProfile {
    pub handle: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub country: Option<String>,
    pub organization: Option<String>,
    pub rank: Option<String>,
    pub max_rank: Option<String>,
    /// Absent for users who never entered a rated contest.
    #[serde(default)]
    pub rating: i32,
    #[serde(default)]
    pub max_rating: i32,
    #[serde(default)]
    pub contribution: i32,
    #[serde(default)]
    pub last_online_time_seconds: i64,
    #[serde(default)]
    pub registration_time_seconds: i64,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSubmission {
    pub id: i64,
    pub contest_id: Option<i64>,
    pub creation_time_seconds: i64,
    pub problem: RemoteProblem,
    #[serde(default)]
    pub programming_language: String,
    pub verdict: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProblem {
    pub contest_id: Option<i64>,
    pub index: String,
    pub name: String,
    pub rating: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRatingChange {
    pub contest_id: i64,
    pub contest_name: String,
    pub handle: String,
    pub rank: i64,
    pub rating_update_time_seconds: i64,
    pub old_rating: i32,
    pub new_rating: i32,
}

/// One completed roster-wide sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Already in flight elsewhere, deleted, or re-targeted before the result landed.
    pub skipped: usize,
}

impl SyncRun {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(handle: &str) -> StudentInput {
        StudentInput {
            name: "  Alice Johnson ".to_string(),
            email: "alice.johnson@example.com".to_string(),
            phone: "+1-555-0101".to_string(),
            handle: handle.to_string(),
        }
    }

    #[test]
    fn input_is_trimmed() {
        let input = input(" tourist ").validated().unwrap();
        assert_eq!(input.name, "Alice Johnson");
        assert_eq!(input.handle, "tourist");
    }

    #[test]
    fn rejects_bad_handles() {
        assert!(input("ab").validated().is_err());
        assert!(input("has space").validated().is_err());
        assert!(input("semi;colon").validated().is_err());
        assert!(input("Um_nik").validated().is_ok());
    }

    #[test]
    fn rejects_malformed_email() {
        let mut bad = input("tourist");
        bad.email = "not-an-email".to_string();
        assert!(matches!(bad.validated(), Err(SyncError::InvalidInput(_))));
    }

    #[test]
    fn update_applies_only_given_fields() {
        let mut record = StudentRecord::new(Uuid::new_v4(), input("tourist"));
        let update = StudentUpdate {
            phone: Some(" +1-555-0199 ".to_string()),
            ..StudentUpdate::default()
        }
        .validated()
        .unwrap();
        update.apply_to(&mut record);

        assert_eq!(record.phone, "+1-555-0199");
        assert_eq!(record.handle, "tourist");
    }

    #[test]
    fn profile_without_rating_defaults_to_zero() {
        let profile: RemoteUserProfile =
            serde_json::from_str(r#"{"handle":"newbie","contribution":0}"#).unwrap();
        assert_eq!(profile.rating, 0);
        assert_eq!(profile.max_rating, 0);
    }
}
