//! Lock record bodies stored at lock paths.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Body of an automated lock: the holder's unique id.
///
/// Serialized as `{"uuid": "..."}`; the timestamp and reason are optional
/// so records written by older clients still parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Unique id of the holder (the release's execution id).
    pub uuid: String,

    /// When the lock was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Free-text reason, if the caller gave one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LockRecord {
    pub fn new(uuid: &str, reason: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            created_at: Some(Utc::now()),
            reason: (!reason.is_empty()).then(|| reason.to_string()),
        }
    }

    /// Whether this record is held by `holder`.
    pub fn is_held_by(&self, holder: &str) -> bool {
        self.uuid == holder
    }

    /// Age of the lock, if it carries a timestamp.
    pub fn age(&self) -> Option<Duration> {
        self.created_at
            .map(|created| Utc::now().signed_duration_since(created))
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        match self.age() {
            Some(age) => format_age(age),
            None => "unknown".to_string(),
        }
    }
}

/// Body of the operator override lock.
///
/// Serialized as `{"user": "...", "lock_reason": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLock {
    pub user: String,
    pub lock_reason: String,
}

impl UserLock {
    /// A user lock attributed to the current `USER@HOST`.
    pub fn new(reason: &str) -> Self {
        Self {
            user: get_owner_string(),
            lock_reason: reason.to_string(),
        }
    }
}

fn format_age(age: Duration) -> String {
    let minutes = age.num_minutes();
    let hours = age.num_hours();
    let days = age.num_days();

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

/// Owner string for operator locks (`USER@HOST`).
pub(crate) fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_record_parses() {
        let record: LockRecord = serde_json::from_str(r#"{"uuid": "UUID"}"#).unwrap();
        assert!(record.is_held_by("UUID"));
        assert!(!record.is_held_by("NOT_UUID"));
        assert_eq!(record.age_string(), "unknown");
    }

    #[test]
    fn empty_reason_is_omitted() {
        let json = serde_json::to_string(&LockRecord::new("UUID", "")).unwrap();
        assert!(json.contains("\"uuid\":\"UUID\""));
        assert!(!json.contains("reason"));
    }

    #[test]
    fn user_lock_uses_wire_field_names() {
        let lock: UserLock =
            serde_json::from_str(r#"{"user": "test", "lock_reason": "testing"}"#).unwrap();
        assert_eq!(lock.user, "test");
        assert_eq!(lock.lock_reason, "testing");

        let fresh = UserLock::new("maintenance");
        assert!(fresh.user.contains('@'));
    }

    #[test]
    fn age_string_scales_units() {
        assert_eq!(format_age(Duration::minutes(5)), "5m");
        assert_eq!(format_age(Duration::minutes(125)), "2h 5m");
        assert_eq!(format_age(Duration::hours(75)), "3d 3h");
    }
}
