// Data models for TimesUp

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// A user-created reminder with a title, a link and a due date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: String,
    #[serde(default)]
    pub main_title: String,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub link: String,
    /// Insertion order, breaks ties between equal due dates
    pub seq: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ActionItem {
    /// Derived status at the given instant. Never stored.
    pub fn status_at(&self, now: DateTime<Utc>) -> Status {
        if self.due_date > now {
            Status::Ongoing
        } else {
            Status::Ended
        }
    }

    pub fn status(&self) -> Status {
        self.status_at(Utc::now())
    }

    pub fn is_ongoing_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == Status::Ongoing
    }
}

impl Record for ActionItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "items"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ongoing,
    Ended,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ongoing => f.pad("ongoing"),
            Status::Ended => f.pad("ended"),
        }
    }
}

/// Helper function to get current timestamp in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Drop sub-millisecond precision so the stored due date matches the indexed `due_at`
pub fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}
