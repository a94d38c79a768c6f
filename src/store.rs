// Action item store: JSONL journal as source of truth, SQLite as query index

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::filter::ItemFilter;
use crate::jsonl;
use crate::models::{ActionItem, now_ms, truncate_to_millis};
use crate::notifier::{ChangeEvent, ChangeNotifier};
use crate::record::{JournalEntry, Record, Tombstone};

const CURRENT_VERSION: u32 = 1;
const DB_FILE: &str = "timesup.db";

/// Durable store of action items
///
/// Every mutation is applied to the SQLite index inside a transaction, appended
/// to the journal and fsynced, then committed, before the change notifier fires.
pub struct Store {
    base_path: PathBuf,
    db: Connection,
    notifier: ChangeNotifier,
}

impl Store {
    /// Open or create a store in the given directory with its own notifier
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_notifier(path, ChangeNotifier::new())
    }

    /// Open or create a store that publishes changes on `notifier`
    pub fn open_with_notifier<P: AsRef<Path>>(path: P, notifier: ChangeNotifier) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();

        fs::create_dir_all(&base_path)?;

        let db = Connection::open(base_path.join(DB_FILE))?;

        let mut store = Self {
            base_path,
            db,
            notifier,
        };

        store.create_schema()?;
        store.create_gitignore()?;
        store.write_version()?;

        if store.is_stale()? {
            info!("Index is stale, syncing from journal");
            store.sync()?;
        }

        info!(path = ?store.base_path, "Opened action item store");
        Ok(store)
    }

    /// Default location: `<data dir>/timesup`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("timesup"))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// The channel this store publishes on. Clone it to hand to views.
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn journal_path(&self) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", ActionItem::collection_name()))
    }

    fn create_schema(&self) -> Result<()> {
        debug!("Creating database schema");

        self.db.execute_batch(
            r#"
            PRAGMA synchronous = FULL;

            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                due_at INTEGER NOT NULL,
                data_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_due ON items(due_at, seq);

            -- Journal fingerprint at last sync, for staleness detection
            CREATE TABLE IF NOT EXISTS sync_metadata (
                journal TEXT PRIMARY KEY,
                last_sync_time INTEGER NOT NULL,
                file_mtime INTEGER NOT NULL,
                file_len INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn create_gitignore(&self) -> Result<()> {
        let gitignore_path = self.base_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(gitignore_path, format!("{DB_FILE}\n{DB_FILE}-journal\n"))?;
        }
        Ok(())
    }

    fn write_version(&self) -> Result<()> {
        let version_path = self.base_path.join(".version");
        if !version_path.exists() {
            fs::write(version_path, CURRENT_VERSION.to_string())?;
        }
        Ok(())
    }

    /// Check if the index needs rebuilding from the journal
    ///
    /// True when the journal was modified or removed since the index last
    /// recorded it, or when the index holds rows no journal accounts for.
    pub fn is_stale(&self) -> Result<bool> {
        match (journal_fingerprint(&self.journal_path())?, stored_fingerprint(&self.db)?) {
            (Some(current), Some(stored)) => Ok(current != stored),
            (Some(_), None) | (None, Some(_)) => Ok(true),
            (None, None) => {
                let rows: i64 = self.db.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
                Ok(rows > 0)
            }
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a new action item and return its id
    pub fn create(
        &mut self,
        title: impl Into<String>,
        link: impl Into<String>,
        due_date: DateTime<Utc>,
    ) -> Result<String> {
        let now = now_ms();
        let (main_title, link) = (title.into(), link.into());

        let item = self.commit(|tx| {
            let item = ActionItem {
                id: Uuid::now_v7().to_string(),
                main_title,
                due_date: truncate_to_millis(due_date),
                link,
                seq: next_seq_tx(tx)?,
                created_at: now,
                updated_at: now,
            };
            upsert_item_tx(tx, &item)?;
            let entry = JournalEntry::Item(item.clone());
            Ok((item, vec![entry]))
        })?;

        debug!(id = %item.id, seq = item.seq, "Created action item");
        self.notifier.notify(&ChangeEvent::Created { id: item.id.clone() });

        Ok(item.id)
    }

    /// Overwrite the editable fields of an existing item
    pub fn update(
        &mut self,
        id: &str,
        title: impl Into<String>,
        link: impl Into<String>,
        due_date: DateTime<Utc>,
    ) -> Result<()> {
        Self::validate_id(id)?;
        let (main_title, link) = (title.into(), link.into());

        self.commit(|tx| {
            let mut item = get_item(tx, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            item.main_title = main_title;
            item.link = link;
            item.due_date = truncate_to_millis(due_date);
            // Replay keeps the highest updated_at, so never go backwards
            item.updated_at = now_ms().max(item.updated_at);

            upsert_item_tx(tx, &item)?;
            Ok(((), vec![JournalEntry::Item(item)]))
        })?;

        debug!(id, "Updated action item");
        self.notifier.notify(&ChangeEvent::Updated { id: id.to_string() });

        Ok(())
    }

    /// Delete every item whose id is in `ids`
    ///
    /// Unknown ids are ignored. All removals commit together and exactly one
    /// notification is published per call. Returns the ids actually removed.
    pub fn delete<I, S>(&mut self, ids: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requested: BTreeSet<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
        let now = now_ms();

        let removed = self.commit(|tx| {
            let mut removed = Vec::new();
            let mut tombstones = Vec::new();
            for id in &requested {
                let updated_at: Option<i64> = tx
                    .query_row("SELECT updated_at FROM items WHERE id = ?1", [id], |row| row.get(0))
                    .optional()?;
                if let Some(updated_at) = updated_at {
                    tx.execute("DELETE FROM items WHERE id = ?1", [id])?;
                    tombstones.push(JournalEntry::Tombstone(Tombstone::new(id.clone(), now.max(updated_at))));
                    removed.push(id.clone());
                }
            }
            Ok((removed, tombstones))
        })?;

        debug!(requested = requested.len(), removed = removed.len(), "Deleted action items");
        self.notifier.notify(&ChangeEvent::Deleted { ids: removed.clone() });

        Ok(removed)
    }

    /// Run one mutation: `apply` changes the index and returns the journal
    /// entries describing the change
    ///
    /// The index transaction takes the write lock up front. The journal batch
    /// is fsynced before the transaction commits and truncated away again if
    /// the commit fails, so a failed mutation leaves no trace in either file.
    fn commit<T, F>(&mut self, apply: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<(T, Vec<JournalEntry>)>,
    {
        if self.is_stale()? {
            info!("Journal changed since last sync, syncing before write");
            self.sync()?;
        }

        let journal = self.journal_path();
        let tx = self.db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (value, entries) = apply(&tx)?;

        // Another writer may have appended since the check above. Then the old
        // fingerprint stays in place so the index remains stale until rebuilt.
        let before = journal_fingerprint(&journal)?;
        let foreign = before != stored_fingerprint(&tx)?;

        let written = jsonl::append_jsonl(&journal, &entries)
            .map_err(StoreError::from)
            .and_then(|()| finish_tx(tx, &journal, !foreign));

        if let Err(e) = written {
            let len = before.map_or(0, |(_, len)| len as u64);
            if let Err(undo) = jsonl::truncate_jsonl(&journal, len) {
                warn!(error = ?undo, "Failed to take back journal entries after index error");
            }
            return Err(e);
        }

        if foreign {
            info!("Journal was appended to concurrently, syncing");
            if let Err(e) = self.sync() {
                warn!(error = ?e, "Sync after write failed, index stays stale");
            }
        }

        Ok(value)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Get an item by id
    pub fn get(&self, id: &str) -> Result<Option<ActionItem>> {
        get_item(&self.db, id)
    }

    /// Items matching `filter` right now, earliest due first
    pub fn list(&self, filter: ItemFilter) -> Result<Vec<ActionItem>> {
        self.list_at(filter, Utc::now())
    }

    /// Items matching `filter` at the instant `now`, earliest due first
    ///
    /// Equal due dates keep insertion order.
    pub fn list_at(&self, filter: ItemFilter, now: DateTime<Utc>) -> Result<Vec<ActionItem>> {
        let mut query = String::from("SELECT data_json FROM items");
        let mut bound = Vec::new();
        if let Some(predicate) = filter.sql_predicate() {
            query.push_str(" WHERE ");
            query.push_str(predicate);
            bound.push(now.timestamp_millis());
        }
        query.push_str(" ORDER BY due_at ASC, seq ASC");

        let mut stmt = self.db.prepare(&query)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(bound), |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for row_result in rows {
            let data_json = row_result?;
            results.push(serde_json::from_str(&data_json)?);
        }

        Ok(results)
    }

    /// Number of items matching `filter` at `now`
    pub fn count_at(&self, filter: ItemFilter, now: DateTime<Utc>) -> Result<usize> {
        let mut query = String::from("SELECT COUNT(*) FROM items");
        let mut bound = Vec::new();
        if let Some(predicate) = filter.sql_predicate() {
            query.push_str(" WHERE ");
            query.push_str(predicate);
            bound.push(now.timestamp_millis());
        }

        let count: i64 = self
            .db
            .query_row(&query, rusqlite::params_from_iter(bound), |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn count(&self, filter: ItemFilter) -> Result<usize> {
        self.count_at(filter, Utc::now())
    }

    /// The ongoing item due soonest after `now`
    pub fn next_ongoing(&self, now: DateTime<Utc>) -> Result<Option<ActionItem>> {
        let json: Option<String> = self
            .db
            .query_row(
                "SELECT data_json FROM items WHERE due_at > ?1 ORDER BY due_at ASC, seq ASC LIMIT 1",
                [now.timestamp_millis()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn validate_id(id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(StoreError::InvalidId("id cannot be empty or whitespace-only".to_string()));
        }

        if id.len() > 256 {
            return Err(StoreError::InvalidId(format!("id too long: {} chars (max 256)", id.len())));
        }

        Ok(())
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Rebuild the SQLite index from the journal
    pub fn sync(&mut self) -> Result<()> {
        info!("Syncing index from journal");

        let journal = self.journal_path();
        let records: HashMap<String, JournalEntry> = jsonl::read_jsonl_latest(&journal)?;

        let tx = self.db.transaction()?;
        tx.execute("DELETE FROM items", [])?;

        let mut count = 0;
        for item in records.into_values().filter_map(JournalEntry::into_item) {
            upsert_item_tx(&tx, &item)?;
            count += 1;
        }

        tx.execute("DELETE FROM sync_metadata", [])?;
        if let Some(fingerprint) = journal_fingerprint(&journal)? {
            record_sync_tx(&tx, fingerprint)?;
        }

        tx.commit()?;

        info!(count, "Sync complete");
        Ok(())
    }
}

fn get_item(conn: &Connection, id: &str) -> Result<Option<ActionItem>> {
    let json: Option<String> = conn
        .query_row("SELECT data_json FROM items WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;

    match json {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Record the journal fingerprint (unless told not to) and commit
fn finish_tx(tx: Transaction, journal: &Path, record_fingerprint: bool) -> Result<()> {
    if record_fingerprint {
        if let Some(fingerprint) = journal_fingerprint(journal)? {
            record_sync_tx(&tx, fingerprint)?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Next insertion sequence number; read inside the write transaction
fn next_seq_tx(tx: &Transaction) -> Result<i64> {
    let seq: i64 = tx.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM items", [], |row| row.get(0))?;
    Ok(seq)
}

fn upsert_item_tx(tx: &Transaction, item: &ActionItem) -> Result<()> {
    let data_json = serde_json::to_string(item)?;

    tx.execute(
        "INSERT OR REPLACE INTO items (id, seq, due_at, data_json, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            &item.id,
            item.seq,
            item.due_date.timestamp_millis(),
            data_json,
            item.updated_at
        ],
    )?;

    Ok(())
}

fn record_sync_tx(tx: &Transaction, (file_mtime, file_len): (i64, i64)) -> Result<()> {
    tx.execute(
        "INSERT OR REPLACE INTO sync_metadata (journal, last_sync_time, file_mtime, file_len)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![ActionItem::collection_name(), now_ms(), file_mtime, file_len],
    )?;
    Ok(())
}

/// Journal fingerprint recorded at the last sync or write
fn stored_fingerprint(conn: &Connection) -> Result<Option<(i64, i64)>> {
    let stored = conn
        .query_row(
            "SELECT file_mtime, file_len FROM sync_metadata WHERE journal = ?1",
            [ActionItem::collection_name()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(stored)
}

/// Modification time (ms) and length of the journal, or None if it doesn't exist
fn journal_fingerprint(path: &Path) -> Result<Option<(i64, i64)>> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let file_mtime = metadata
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    Ok(Some((file_mtime, metadata.len() as i64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use chrono::TimeDelta;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Store) {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path()).unwrap();
        (temp, store)
    }

    fn ids(items: &[ActionItem]) -> Vec<String> {
        items.iter().map(|i| i.id.clone()).collect()
    }

    fn foreign_item(id: &str, seq: i64) -> ActionItem {
        ActionItem {
            id: id.to_string(),
            main_title: "from elsewhere".to_string(),
            due_date: truncate_to_millis(Utc::now()),
            link: String::new(),
            seq,
            created_at: now_ms(),
            updated_at: now_ms(),
        }
    }

    /// A second connection mid-read holds a shared lock, so commits on `store` fail
    fn hold_read_lock(temp: &TempDir, store: &Store) -> Connection {
        store.db.busy_timeout(Duration::from_millis(50)).unwrap();
        let reader = Connection::open(temp.path().join(DB_FILE)).unwrap();
        reader.execute_batch("BEGIN").unwrap();
        let _: i64 = reader.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0)).unwrap();
        reader
    }

    fn count_events(store: &Store) -> (Arc<AtomicUsize>, crate::Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let sub = store.notifier().subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (count, sub)
    }

    #[test]
    fn test_store_open_creates_directory() {
        let temp = TempDir::new().unwrap();
        let data_dir = temp.path().join("timesup");

        let _store = Store::open(&data_dir).unwrap();
        assert!(data_dir.join("timesup.db").exists());
        assert!(data_dir.join(".gitignore").exists());
        assert!(data_dir.join(".version").exists());
    }

    #[test]
    fn test_create_then_list_contains_record() {
        let (temp, mut store) = open_temp();
        let due = truncate_to_millis(Utc::now() + TimeDelta::hours(2));

        let id = store.create("JD | Moutai", "https://www.jd.com", due).unwrap();

        let items = store.list(ItemFilter::All).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].main_title, "JD | Moutai");
        assert_eq!(items[0].link, "https://www.jd.com");
        assert_eq!(items[0].due_date, due);

        assert!(temp.path().join("items.jsonl").exists());
    }

    #[test]
    fn test_create_assigns_fresh_ids() {
        let (_temp, mut store) = open_temp();
        let due = Utc::now();

        let mut seen = HashSet::new();
        for _ in 0..20 {
            assert!(seen.insert(store.create("same", "", due).unwrap()));
        }
        assert_eq!(store.count(ItemFilter::All).unwrap(), 20);
    }

    #[test]
    fn test_empty_title_and_link_allowed() {
        let (_temp, mut store) = open_temp();
        let id = store.create("", "", Utc::now()).unwrap();

        let item = store.get(&id).unwrap().unwrap();
        assert_eq!(item.main_title, "");
        assert_eq!(item.link, "");
    }

    #[test]
    fn test_update_reflected_in_list() {
        let (_temp, mut store) = open_temp();
        let id = store.create("Tmall | Moutai", "https://www.tmall.com", Utc::now()).unwrap();

        let new_due = truncate_to_millis(Utc::now() + TimeDelta::days(1));
        store
            .update(&id, "Suning | Moutai", "https://www.suning.com", new_due)
            .unwrap();

        let items = store.list(ItemFilter::All).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].main_title, "Suning | Moutai");
        assert_eq!(items[0].link, "https://www.suning.com");
        assert_eq!(items[0].due_date, new_due);
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let (_temp, mut store) = open_temp();
        let id = store.create("keep", "", Utc::now()).unwrap();
        let before = store.list(ItemFilter::All).unwrap();
        let (events, _sub) = count_events(&store);

        let err = store.update("no-such-id", "x", "y", Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(ref missing) if missing == "no-such-id"));

        assert_eq!(store.list(ItemFilter::All).unwrap(), before);
        assert_eq!(store.get(&id).unwrap().unwrap().main_title, "keep");
        assert_eq!(events.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_update_rejects_blank_id() {
        let (_temp, mut store) = open_temp();
        let err = store.update("   ", "x", "", Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidId(_)));
    }

    #[test]
    fn test_delete_removes_and_ignores_absent() {
        let (temp, mut store) = open_temp();
        let keep = store.create("keep", "", Utc::now()).unwrap();
        let gone = store.create("gone", "", Utc::now()).unwrap();

        let removed = store.delete([gone.as_str(), "never-existed"]).unwrap();
        assert_eq!(removed, vec![gone.clone()]);
        assert_eq!(ids(&store.list(ItemFilter::All).unwrap()), vec![keep]);

        // Deleting again is a no-op, not an error
        assert!(store.delete([gone.as_str()]).unwrap().is_empty());

        let content = fs::read_to_string(temp.path().join("items.jsonl")).unwrap();
        assert!(content.contains("\"deleted\":true"));
    }

    #[test]
    fn test_delete_batch() {
        let (_temp, mut store) = open_temp();
        let created: Vec<String> = (0..4)
            .map(|i| store.create(format!("item {i}"), "", Utc::now()).unwrap())
            .collect();

        let removed = store.delete(&created[..3]).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(ids(&store.list(ItemFilter::All).unwrap()), vec![created[3].clone()]);
    }

    #[test]
    fn test_filters_partition_all() {
        let (_temp, mut store) = open_temp();
        let now = Utc::now();
        for offset in [-120, -1, 0, 1, 45, 3600] {
            store
                .create(format!("t{offset}"), "", now + TimeDelta::seconds(offset))
                .unwrap();
        }

        let all: HashSet<String> = ids(&store.list_at(ItemFilter::All, now).unwrap()).into_iter().collect();
        let ongoing: HashSet<String> = ids(&store.list_at(ItemFilter::OngoingOnly, now).unwrap())
            .into_iter()
            .collect();
        let ended: HashSet<String> = ids(&store.list_at(ItemFilter::EndedOnly, now).unwrap())
            .into_iter()
            .collect();

        assert!(ongoing.is_disjoint(&ended));
        assert_eq!(ongoing.union(&ended).cloned().collect::<HashSet<_>>(), all);
        assert_eq!(all.len(), 6);
        assert_eq!(store.count_at(ItemFilter::OngoingOnly, now).unwrap(), ongoing.len());
        assert_eq!(store.count_at(ItemFilter::EndedOnly, now).unwrap(), ended.len());
    }

    #[test]
    fn test_filters_agree_with_status() {
        let (_temp, mut store) = open_temp();
        let now = Utc::now();
        store.create("due now", "", now).unwrap();
        store.create("soon", "", now + TimeDelta::milliseconds(2)).unwrap();

        for item in store.list_at(ItemFilter::OngoingOnly, now).unwrap() {
            assert!(item.is_ongoing_at(now));
        }
        for item in store.list_at(ItemFilter::EndedOnly, now).unwrap() {
            assert!(!item.is_ongoing_at(now));
        }
    }

    #[test]
    fn test_list_sorted_by_due_date() {
        let (_temp, mut store) = open_temp();
        let base = Utc::now();
        for hours in [5, -3, 12, 0, -8, 2] {
            store.create(format!("{hours}h"), "", base + TimeDelta::hours(hours)).unwrap();
        }

        let items = store.list(ItemFilter::All).unwrap();
        assert!(items.windows(2).all(|w| w[0].due_date <= w[1].due_date));
        assert_eq!(items.first().unwrap().main_title, "-8h");
        assert_eq!(items.last().unwrap().main_title, "12h");
    }

    #[test]
    fn test_equal_due_dates_keep_insertion_order() {
        let (_temp, mut store) = open_temp();
        let due = Utc::now();
        let created: Vec<String> = ["first", "second", "third"]
            .iter()
            .map(|t| store.create(*t, "", due).unwrap())
            .collect();

        assert_eq!(ids(&store.list(ItemFilter::All).unwrap()), created);
    }

    #[test]
    fn test_ongoing_and_ended_scenario() {
        let (_temp, mut store) = open_temp();
        let now = Utc::now();
        let a = store.create("A", "", now + TimeDelta::hours(1)).unwrap();
        let b = store.create("B", "", now - TimeDelta::hours(1)).unwrap();

        assert_eq!(ids(&store.list_at(ItemFilter::OngoingOnly, now).unwrap()), vec![a.clone()]);
        assert_eq!(ids(&store.list_at(ItemFilter::EndedOnly, now).unwrap()), vec![b.clone()]);
        assert_eq!(ids(&store.list_at(ItemFilter::All, now).unwrap()), vec![b, a]);
    }

    #[test]
    fn test_next_ongoing() {
        let (_temp, mut store) = open_temp();
        let now = Utc::now();
        assert!(store.next_ongoing(now).unwrap().is_none());

        store.create("past", "", now - TimeDelta::minutes(5)).unwrap();
        store.create("later", "", now + TimeDelta::hours(3)).unwrap();
        let soon = store.create("soon", "", now + TimeDelta::minutes(10)).unwrap();

        assert_eq!(store.next_ongoing(now).unwrap().unwrap().id, soon);
    }

    #[test]
    fn test_each_mutation_notifies_once() {
        let (_temp, mut store) = open_temp();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let _sub = store
            .notifier()
            .subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        let id = store.create("a", "", Utc::now()).unwrap();
        assert_eq!(events.lock().unwrap().len(), 1);

        store.update(&id, "b", "", Utc::now()).unwrap();
        assert_eq!(events.lock().unwrap().len(), 2);

        store.delete([id.as_str(), "other", "another"]).unwrap();
        assert_eq!(events.lock().unwrap().len(), 3);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ChangeEvent::Created { id: id.clone() },
                ChangeEvent::Updated { id: id.clone() },
                ChangeEvent::Deleted { ids: vec![id] },
            ]
        );
    }

    #[test]
    fn test_observer_sees_committed_state() {
        let temp = TempDir::new().unwrap();
        let notifier = ChangeNotifier::new();
        let data_dir = temp.path().to_path_buf();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let _sub = notifier.subscribe(move |_| {
            // A second reader of the same files sees the change already
            let reader = Store::open(&data_dir).unwrap();
            counter.store(reader.count(ItemFilter::All).unwrap(), Ordering::SeqCst);
        });

        let mut store = Store::open_with_notifier(temp.path(), notifier).unwrap();
        store.create("durable", "", Utc::now()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_write_reports_persistence_error() {
        let (temp, mut store) = open_temp();
        let id = store.create("survivor", "", Utc::now()).unwrap();
        let (events, _sub) = count_events(&store);

        // Replace the journal with a directory so appends fail
        let journal = temp.path().join("items.jsonl");
        fs::remove_file(&journal).unwrap();
        fs::create_dir(&journal).unwrap();

        let err = store.create("lost", "", Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::Persistence(PersistenceError::Io(_))));

        let err = store.update(&id, "changed", "", Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));

        let items = store.list(ItemFilter::All).unwrap();
        assert_eq!(ids(&items), vec![id]);
        assert_eq!(items[0].main_title, "survivor");
        assert_eq!(events.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reopen_preserves_items() {
        let temp = TempDir::new().unwrap();
        let now = Utc::now();

        let (kept, order) = {
            let mut store = Store::open(temp.path()).unwrap();
            let a = store.create("A", "https://a", now + TimeDelta::hours(1)).unwrap();
            let b = store.create("B", "", now - TimeDelta::hours(1)).unwrap();
            let c = store.create("C", "", now).unwrap();
            store.update(&a, "A2", "https://a2", now + TimeDelta::hours(2)).unwrap();
            store.delete([c.as_str()]).unwrap();
            (store.get(&a).unwrap().unwrap(), vec![b, a])
        };

        let store = Store::open(temp.path()).unwrap();
        assert_eq!(ids(&store.list(ItemFilter::All).unwrap()), order);
        assert_eq!(store.get(&kept.id).unwrap().unwrap(), kept);
    }

    #[test]
    fn test_sync_rebuilds_index_from_journal() {
        let (_temp, mut store) = open_temp();
        let due = Utc::now();
        let created: Vec<String> = (0..3)
            .map(|i| store.create(format!("{i}"), "", due).unwrap())
            .collect();
        store.delete([created[1].as_str()]).unwrap();
        let before = store.list(ItemFilter::All).unwrap();

        store.db.execute("DELETE FROM items", []).unwrap();
        assert!(store.list(ItemFilter::All).unwrap().is_empty());

        store.sync().unwrap();
        assert_eq!(store.list(ItemFilter::All).unwrap(), before);
        assert!(!store.is_stale().unwrap());
    }

    #[test]
    fn test_external_journal_append_marks_stale() {
        let (_temp, mut store) = open_temp();
        store.create("local", "", Utc::now()).unwrap();
        assert!(!store.is_stale().unwrap());

        jsonl::append_jsonl(&store.journal_path(), &[foreign_item("foreign-1", 99)]).unwrap();

        assert!(store.is_stale().unwrap());
        let reopened = Store::open(store.base_path()).unwrap();
        assert!(reopened.get("foreign-1").unwrap().is_some());
        assert_eq!(reopened.count(ItemFilter::All).unwrap(), 2);
    }

    #[test]
    fn test_failed_commit_takes_back_journal_entry() {
        let (temp, mut store) = open_temp();
        let kept = store.create("kept", "", Utc::now()).unwrap();
        let journal_before = fs::read_to_string(store.journal_path()).unwrap();

        let reader = hold_read_lock(&temp, &store);
        let err = store.create("lost", "", Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::Persistence(PersistenceError::Sqlite(_))));
        drop(reader);

        assert_eq!(fs::read_to_string(store.journal_path()).unwrap(), journal_before);
        assert_eq!(ids(&store.list(ItemFilter::All).unwrap()), vec![kept.clone()]);

        drop(store);
        let reopened = Store::open(temp.path()).unwrap();
        assert_eq!(ids(&reopened.list(ItemFilter::All).unwrap()), vec![kept]);
    }

    #[test]
    fn test_failed_commit_is_silent_and_later_events_stay_in_order() {
        let (temp, mut store) = open_temp();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let _sub = store
            .notifier()
            .subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        let first = store.create("first", "", Utc::now()).unwrap();

        let reader = hold_read_lock(&temp, &store);
        assert!(store.update(&first, "never saved", "", Utc::now()).is_err());
        assert!(store.delete([first.as_str()]).is_err());
        drop(reader);

        let second = store.create("second", "", Utc::now()).unwrap();
        store.delete([first.as_str()]).unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ChangeEvent::Created { id: first.clone() },
                ChangeEvent::Created { id: second.clone() },
                ChangeEvent::Deleted { ids: vec![first] },
            ]
        );

        drop(store);
        let reopened = Store::open(temp.path()).unwrap();
        let items = reopened.list(ItemFilter::All).unwrap();
        assert_eq!(ids(&items), vec![second]);
    }

    #[test]
    fn test_write_after_external_append_keeps_foreign_record() {
        let (_temp, mut store) = open_temp();
        store.create("local", "", Utc::now()).unwrap();

        jsonl::append_jsonl(&store.journal_path(), &[foreign_item("foreign-1", 99)]).unwrap();
        let local = store.create("local2", "", Utc::now()).unwrap();

        assert!(!store.is_stale().unwrap());
        assert!(store.get("foreign-1").unwrap().is_some());
        // Numbered after the record it picked up from the journal
        assert_eq!(store.get(&local).unwrap().unwrap().seq, 100);

        let reopened = Store::open(store.base_path()).unwrap();
        assert!(reopened.get("foreign-1").unwrap().is_some());
        assert_eq!(reopened.count(ItemFilter::All).unwrap(), 3);
    }

    #[test]
    fn test_reused_seq_keeps_insertion_order_after_sync() {
        let (temp, mut store) = open_temp();
        let due = truncate_to_millis(Utc::now());
        let a = store.create("a", "", due).unwrap();
        let b = store.create("b", "", due).unwrap();
        let c = store.create("c", "", due).unwrap();

        store.delete([c.as_str()]).unwrap();
        let d = store.create("d", "", due).unwrap();
        assert_eq!(store.get(&d).unwrap().unwrap().seq, 3);

        let before = store.list(ItemFilter::All).unwrap();
        assert_eq!(ids(&before), vec![a, b, d]);

        store.sync().unwrap();
        assert_eq!(store.list(ItemFilter::All).unwrap(), before);

        drop(store);
        let reopened = Store::open(temp.path()).unwrap();
        assert_eq!(reopened.list(ItemFilter::All).unwrap(), before);
    }

    #[test]
    fn test_two_stores_on_one_directory_get_distinct_seqs() {
        let temp = TempDir::new().unwrap();
        let mut first = Store::open(temp.path()).unwrap();
        let mut second = Store::open(temp.path()).unwrap();
        let due = Utc::now();

        let a = first.create("a", "", due).unwrap();
        let b = second.create("b", "", due).unwrap();
        let c = first.create("c", "", due).unwrap();

        let items = Store::open(temp.path()).unwrap().list(ItemFilter::All).unwrap();
        assert_eq!(ids(&items), vec![a, b, c]);
        assert_eq!(items.iter().map(|i| i.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_validation_id() {
        assert!(Store::validate_id("valid-id").is_ok());
        assert!(Store::validate_id("").is_err());
        assert!(Store::validate_id("  ").is_err());
        assert!(Store::validate_id(&"a".repeat(257)).is_err());
    }
}
