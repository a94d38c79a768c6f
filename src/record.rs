// Journal record types

use serde::{Deserialize, Serialize};

use crate::models::ActionItem;

/// Anything that can be written to and replayed from the journal
pub trait Record {
    /// Unique identifier for this record
    fn id(&self) -> &str;

    /// Timestamp when this record was last updated (milliseconds since epoch)
    fn updated_at(&self) -> i64;

    /// Collection name for this record type.
    /// Determines the journal filename: {collection}.jsonl
    fn collection_name() -> &'static str
    where
        Self: Sized;
}

/// One line of the journal: either a full item version or a delete marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JournalEntry {
    Tombstone(Tombstone),
    Item(ActionItem),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub id: String,
    pub deleted: bool,
    pub updated_at: i64,
}

impl Tombstone {
    pub fn new(id: impl Into<String>, updated_at: i64) -> Self {
        Self {
            id: id.into(),
            deleted: true,
            updated_at,
        }
    }
}

impl JournalEntry {
    pub fn is_deleted(&self) -> bool {
        matches!(self, JournalEntry::Tombstone(t) if t.deleted)
    }

    pub fn into_item(self) -> Option<ActionItem> {
        match self {
            JournalEntry::Item(item) => Some(item),
            JournalEntry::Tombstone(_) => None,
        }
    }
}

impl Record for JournalEntry {
    fn id(&self) -> &str {
        match self {
            JournalEntry::Tombstone(t) => &t.id,
            JournalEntry::Item(item) => &item.id,
        }
    }

    fn updated_at(&self) -> i64 {
        match self {
            JournalEntry::Tombstone(t) => t.updated_at,
            JournalEntry::Item(item) => item.updated_at,
        }
    }

    fn collection_name() -> &'static str {
        ActionItem::collection_name()
    }
}
