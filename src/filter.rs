// Status filters for listing action items

use chrono::{DateTime, Utc};
use std::str::FromStr;

use crate::models::ActionItem;

/// Which items a listing should include, relative to an evaluation instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemFilter {
    #[default]
    All,
    /// due_date > now
    OngoingOnly,
    /// due_date <= now
    EndedOnly,
}

impl ItemFilter {
    pub const ALL: [ItemFilter; 3] = [ItemFilter::All, ItemFilter::OngoingOnly, ItemFilter::EndedOnly];

    /// SQL predicate over the `due_at` column, bound to the evaluation instant as `?1`
    pub(crate) fn sql_predicate(self) -> Option<&'static str> {
        match self {
            ItemFilter::All => None,
            ItemFilter::OngoingOnly => Some("due_at > ?1"),
            ItemFilter::EndedOnly => Some("due_at <= ?1"),
        }
    }

    pub fn matches(self, item: &ActionItem, now: DateTime<Utc>) -> bool {
        match self {
            ItemFilter::All => true,
            ItemFilter::OngoingOnly => item.is_ongoing_at(now),
            ItemFilter::EndedOnly => !item.is_ongoing_at(now),
        }
    }
}

impl std::fmt::Display for ItemFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemFilter::All => write!(f, "all"),
            ItemFilter::OngoingOnly => write!(f, "ongoing"),
            ItemFilter::EndedOnly => write!(f, "ended"),
        }
    }
}

impl FromStr for ItemFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(ItemFilter::All),
            "ongoing" => Ok(ItemFilter::OngoingOnly),
            "ended" => Ok(ItemFilter::EndedOnly),
            other => Err(format!("unknown filter '{}' (expected all, ongoing or ended)", other)),
        }
    }
}
