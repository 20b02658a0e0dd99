use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// The user-facing toast for the outcome of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn from_error(error: &AppError) -> Self {
        let (level, title) = match error.code().split('/').next().unwrap_or_default() {
            "VALIDATION" => (NotificationLevel::Warning, "Check your input"),
            "HTTP" | "SYNC" | "GUESTY" | "SHEETS" => {
                (NotificationLevel::Error, "Integration request failed")
            }
            "SQLX" | "Sqlite" => (NotificationLevel::Error, "Could not save changes"),
            _ => (NotificationLevel::Error, "Something went wrong"),
        };
        Self {
            level,
            title: title.to_string(),
            message: error.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_warnings() {
        let err = AppError::new("VALIDATION/SCHEMA", "name is required");
        let notice = err.to_notification();
        assert_eq!(notice.level, NotificationLevel::Warning);
        assert_eq!(notice.message, "name is required");
    }

    #[test]
    fn upstream_message_is_surfaced_verbatim() {
        let err = AppError::new("HTTP/STATUS", "listing not found upstream");
        let notice = Notification::from_error(&err);
        assert_eq!(notice.level, NotificationLevel::Error);
        assert_eq!(notice.title, "Integration request failed");
        assert_eq!(notice.message, "listing not found upstream");
    }
}
