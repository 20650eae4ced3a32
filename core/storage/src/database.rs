use anyhow::{Context, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use journal_schemas::{
    generate_entry_id, generate_priority_id, EntryId, JournalEntry, Priority, PriorityId,
    UpdatePriorityRequest, UserId, MAX_PRIORITY_RANK,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Fields for a priority row that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewPriority<'a> {
    pub content: &'a str,
    pub rank: u32,
    pub date: NaiveDate,
    pub journal_entry_id: Option<&'a EntryId>,
}

pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Open (or create) the database file and bring the schema up to date
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database {}", path.as_ref().display()))?;
        Self::with_connection(conn)
    }

    /// Private in-memory database, used by tests and throwaway servers
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self { conn };
        db.init_schema()?;

        info!("Database initialized");
        Ok(db)
    }

    /// Create all tables and indexes
    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS journal_entries (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS priorities (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                rank INTEGER NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                date TEXT NOT NULL,
                journal_entry_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (journal_entry_id) REFERENCES journal_entries(id) ON DELETE SET NULL
            )",
            [],
        )?;

        // === CONTEXT GRAPH ===

        // Names compare case-insensitively, so "alex" and "Alex" are one person
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS context_entities (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                name TEXT NOT NULL COLLATE NOCASE,
                description TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS entity_relationships (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                source_entity_id TEXT NOT NULL,
                target_entity_id TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (source_entity_id) REFERENCES context_entities(id) ON DELETE CASCADE,
                FOREIGN KEY (target_entity_id) REFERENCES context_entities(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS clarifying_questions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Identity constraints backing the upserts in the write batch
        self.conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_identity
             ON context_entities(user_id, entity_type, name)",
            [],
        )?;

        self.conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_relationships_identity
             ON entity_relationships(user_id, source_entity_id, target_entity_id, relationship_type)",
            [],
        )?;

        self.conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_questions_text
             ON clarifying_questions(user_id, question)",
            [],
        )?;

        // Indexes for performance
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_user_date
             ON journal_entries(user_id, date DESC, created_at DESC)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_priorities_user_date ON priorities(user_id, date)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_priorities_entry ON priorities(journal_entry_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entities_updated
             ON context_entities(user_id, updated_at DESC)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_relationships_updated
             ON entity_relationships(user_id, updated_at DESC)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_questions_status
             ON clarifying_questions(user_id, status, created_at)",
            [],
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    // ========== JOURNAL ENTRIES ==========

    /// Insert a journal entry for a user
    pub fn create_entry(&self, user_id: &UserId, content: &str, date: NaiveDate) -> Result<JournalEntry> {
        let id = generate_entry_id();
        let now = now_timestamp();

        self.conn.execute(
            "INSERT INTO journal_entries (id, user_id, content, date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id.0, user_id.0, content, format_date(date), now],
        )?;

        debug!("Inserted journal entry: {}", id);

        Ok(JournalEntry {
            id,
            content: content.to_string(),
            date,
            user_id: user_id.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn get_entry(&self, user_id: &UserId, id: &EntryId) -> Result<Option<JournalEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT id, user_id, content, date, created_at, updated_at
                 FROM journal_entries WHERE id = ?1 AND user_id = ?2",
                params![id.0, user_id.0],
                row_to_entry,
            )
            .optional()?;

        Ok(entry)
    }

    /// Page through a user's entries, newest day first
    pub fn list_entries(&self, user_id: &UserId, limit: usize, offset: usize) -> Result<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, content, date, created_at, updated_at
             FROM journal_entries
             WHERE user_id = ?1
             ORDER BY date DESC, created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let entries = stmt
            .query_map(
                params![
                    user_id.0,
                    i64::try_from(limit).context("limit out of range")?,
                    i64::try_from(offset).context("offset out of range")?
                ],
                row_to_entry,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    pub fn count_entries(&self, user_id: &UserId) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM journal_entries WHERE user_id = ?1",
            params![user_id.0],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// All entries written for one day, in the order they were written
    pub fn list_entries_by_date(&self, user_id: &UserId, date: NaiveDate) -> Result<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, content, date, created_at, updated_at
             FROM journal_entries
             WHERE user_id = ?1 AND date = ?2
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let entries = stmt
            .query_map(params![user_id.0, format_date(date)], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Most recent entries, optionally leaving one out (the entry under analysis)
    pub fn recent_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        exclude: Option<&EntryId>,
    ) -> Result<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, content, date, created_at, updated_at
             FROM journal_entries
             WHERE user_id = ?1 AND id IS NOT ?2
             ORDER BY date DESC, created_at DESC, rowid DESC
             LIMIT ?3",
        )?;

        let entries = stmt
            .query_map(
                params![user_id.0, exclude.map(|id| id.0.as_str()), limit as i64],
                row_to_entry,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Returns `None` when the entry does not exist for this user
    pub fn update_entry(
        &self,
        user_id: &UserId,
        id: &EntryId,
        content: Option<&str>,
        date: Option<NaiveDate>,
    ) -> Result<Option<JournalEntry>> {
        let changed = self.conn.execute(
            "UPDATE journal_entries
             SET content = COALESCE(?1, content),
                 date = COALESCE(?2, date),
                 updated_at = ?3
             WHERE id = ?4 AND user_id = ?5",
            params![content, date.map(format_date), now_timestamp(), id.0, user_id.0],
        )?;

        if changed == 0 {
            return Ok(None);
        }

        debug!("Updated journal entry: {}", id);
        self.get_entry(user_id, id)
    }

    pub fn delete_entry(&self, user_id: &UserId, id: &EntryId) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM journal_entries WHERE id = ?1 AND user_id = ?2",
            params![id.0, user_id.0],
        )?;

        if deleted > 0 {
            info!("Deleted journal entry {} for {}", id, user_id);
        }
        Ok(deleted > 0)
    }

    // ========== PRIORITIES ==========

    pub fn create_priority(&self, user_id: &UserId, new: &NewPriority) -> Result<Priority> {
        insert_priority(&self.conn, user_id, new)
    }

    pub fn get_priority(&self, user_id: &UserId, id: &PriorityId) -> Result<Option<Priority>> {
        let priority = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1 AND user_id = ?2", PRIORITY_SELECT),
                params![id.0, user_id.0],
                row_to_priority,
            )
            .optional()?;

        Ok(priority)
    }

    /// Priorities in rank order; without a date, newest day first
    pub fn list_priorities(&self, user_id: &UserId, date: Option<NaiveDate>) -> Result<Vec<Priority>> {
        let priorities = match date {
            Some(date) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{} WHERE user_id = ?1 AND date = ?2
                     ORDER BY rank ASC, created_at ASC, rowid ASC",
                    PRIORITY_SELECT
                ))?;
                let rows = stmt
                    .query_map(params![user_id.0, format_date(date)], row_to_priority)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "{} WHERE user_id = ?1
                     ORDER BY date DESC, rank ASC, created_at ASC, rowid ASC",
                    PRIORITY_SELECT
                ))?;
                let rows = stmt
                    .query_map(params![user_id.0], row_to_priority)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        Ok(priorities)
    }

    pub fn update_priority(
        &self,
        user_id: &UserId,
        id: &PriorityId,
        update: &UpdatePriorityRequest,
    ) -> Result<Option<Priority>> {
        let changed = self.conn.execute(
            "UPDATE priorities
             SET content = COALESCE(?1, content),
                 rank = COALESCE(?2, rank),
                 completed = COALESCE(?3, completed),
                 updated_at = ?4
             WHERE id = ?5 AND user_id = ?6",
            params![
                update.content,
                update.rank,
                update.completed,
                now_timestamp(),
                id.0,
                user_id.0
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        self.get_priority(user_id, id)
    }

    /// Flip the completion flag
    pub fn toggle_priority(&self, user_id: &UserId, id: &PriorityId) -> Result<Option<Priority>> {
        let changed = self.conn.execute(
            "UPDATE priorities
             SET completed = NOT completed, updated_at = ?1
             WHERE id = ?2 AND user_id = ?3",
            params![now_timestamp(), id.0, user_id.0],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        self.get_priority(user_id, id)
    }

    pub fn set_priority_rank(&self, user_id: &UserId, id: &PriorityId, rank: u32) -> Result<Option<Priority>> {
        let update = UpdatePriorityRequest {
            rank: Some(rank),
            ..Default::default()
        };
        self.update_priority(user_id, id, &update)
    }

    pub fn delete_priority(&self, user_id: &UserId, id: &PriorityId) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM priorities WHERE id = ?1 AND user_id = ?2",
            params![id.0, user_id.0],
        )?;
        Ok(deleted > 0)
    }

    /// Rank that places a new priority after every existing one for the day
    pub fn next_priority_rank(&self, user_id: &UserId, date: NaiveDate) -> Result<u32> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(rank) FROM priorities WHERE user_id = ?1 AND date = ?2",
            params![user_id.0, format_date(date)],
            |row| row.get(0),
        )?;
        let next = max.map_or(1, |rank| rank.max(0).saturating_add(1));
        Ok(next.min(i64::from(MAX_PRIORITY_RANK)) as u32)
    }
}

pub(crate) const PRIORITY_SELECT: &str =
    "SELECT id, user_id, content, rank, completed, date, journal_entry_id, created_at, updated_at
     FROM priorities";

pub(crate) fn insert_priority(conn: &Connection, user_id: &UserId, new: &NewPriority) -> Result<Priority> {
    let id = generate_priority_id();
    let now = now_timestamp();

    conn.execute(
        "INSERT INTO priorities (id, user_id, content, rank, completed, date,
                                 journal_entry_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?7)",
        params![
            id.0,
            user_id.0,
            new.content,
            new.rank,
            format_date(new.date),
            new.journal_entry_id.map(|e| e.0.as_str()),
            now
        ],
    )?;

    debug!("Inserted priority: {} (rank {})", id, new.rank);

    Ok(Priority {
        id,
        content: new.content.to_string(),
        rank: new.rank,
        completed: false,
        date: new.date,
        journal_entry_id: new.journal_entry_id.cloned(),
        user_id: user_id.clone(),
        created_at: now.clone(),
        updated_at: now,
    })
}

fn row_to_entry(row: &Row) -> rusqlite::Result<JournalEntry> {
    Ok(JournalEntry {
        id: EntryId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        content: row.get(2)?,
        date: parse_date_column(row, 3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub(crate) fn row_to_priority(row: &Row) -> rusqlite::Result<Priority> {
    let rank: i64 = row.get(3)?;
    Ok(Priority {
        id: PriorityId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        content: row.get(2)?,
        rank: rank.max(0) as u32,
        completed: row.get(4)?,
        date: parse_date_column(row, 5)?,
        journal_entry_id: row.get::<_, Option<String>>(6)?.map(EntryId),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Fixed-width UTC timestamps so text ordering matches time ordering
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

pub(crate) fn json_error(err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn user(name: &str) -> UserId {
        UserId(name.to_string())
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_database_creation() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        assert_eq!(db.count_entries(&user("alice")).unwrap(), 0);
        assert!(db.list_priorities(&user("alice"), None).unwrap().is_empty());
    }

    #[test]
    fn test_entry_insert_and_retrieve() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();
        let alice = user("alice");

        let entry = db.create_entry(&alice, "Met with Alex", day(14)).unwrap();
        assert_eq!(db.count_entries(&alice).unwrap(), 1);

        let retrieved = db.get_entry(&alice, &entry.id).unwrap();
        assert!(retrieved.is_some());
        let retrieved = retrieved.unwrap();
        assert_eq!(retrieved.content, "Met with Alex");
        assert_eq!(retrieved.date, day(14));
    }

    #[test]
    fn test_entries_are_scoped_by_user() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice");
        let bob = user("bob");

        let entry = db.create_entry(&alice, "private thoughts", day(1)).unwrap();

        assert!(db.get_entry(&bob, &entry.id).unwrap().is_none());
        assert!(db.list_entries(&bob, 10, 0).unwrap().is_empty());
        assert!(db.update_entry(&bob, &entry.id, Some("hijack"), None).unwrap().is_none());
        assert!(!db.delete_entry(&bob, &entry.id).unwrap());
        assert_eq!(db.get_entry(&alice, &entry.id).unwrap().unwrap().content, "private thoughts");
    }

    #[test]
    fn test_entry_pagination_and_date_filter() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice");

        db.create_entry(&alice, "first", day(1)).unwrap();
        db.create_entry(&alice, "second", day(2)).unwrap();
        db.create_entry(&alice, "third", day(3)).unwrap();
        db.create_entry(&alice, "third again", day(3)).unwrap();

        let page = db.list_entries(&alice, 2, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].date, day(3));

        let rest = db.list_entries(&alice, 10, 2).unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[1].content, "first");

        let same_day = db.list_entries_by_date(&alice, day(3)).unwrap();
        assert_eq!(same_day.len(), 2);
        assert_eq!(same_day[0].content, "third");

        let recent = db.recent_entries(&alice, 5, Some(&same_day[1].id)).unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent.iter().all(|e| e.id != same_day[1].id));
    }

    #[test]
    fn test_update_entry_keeps_unset_fields() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice");
        let entry = db.create_entry(&alice, "draft", day(5)).unwrap();

        let updated = db.update_entry(&alice, &entry.id, Some("final"), None).unwrap().unwrap();
        assert_eq!(updated.content, "final");
        assert_eq!(updated.date, day(5));

        let moved = db.update_entry(&alice, &entry.id, None, Some(day(6))).unwrap().unwrap();
        assert_eq!(moved.content, "final");
        assert_eq!(moved.date, day(6));
    }

    #[test]
    fn test_priority_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice");

        assert_eq!(db.next_priority_rank(&alice, day(7)).unwrap(), 1);

        let second = db
            .create_priority(
                &alice,
                &NewPriority { content: "Book flights", rank: 2, date: day(7), journal_entry_id: None },
            )
            .unwrap();
        let first = db
            .create_priority(
                &alice,
                &NewPriority { content: "Finalize pricing", rank: 1, date: day(7), journal_entry_id: None },
            )
            .unwrap();

        assert_eq!(db.next_priority_rank(&alice, day(7)).unwrap(), 3);

        let listed = db.list_priorities(&alice, Some(day(7))).unwrap();
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);

        let toggled = db.toggle_priority(&alice, &first.id).unwrap().unwrap();
        assert!(toggled.completed);
        let toggled_back = db.toggle_priority(&alice, &first.id).unwrap().unwrap();
        assert!(!toggled_back.completed);

        let reranked = db.set_priority_rank(&alice, &second.id, 5).unwrap().unwrap();
        assert_eq!(reranked.rank, 5);
        assert_eq!(reranked.content, "Book flights");

        assert!(db.delete_priority(&alice, &second.id).unwrap());
        assert!(db.get_priority(&alice, &second.id).unwrap().is_none());
        assert!(db.toggle_priority(&user("bob"), &first.id).unwrap().is_none());
    }

    #[test]
    fn test_next_rank_stays_within_bounds() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice");

        db.create_priority(
            &alice,
            &NewPriority { content: "Someday", rank: u32::MAX, date: day(7), journal_entry_id: None },
        )
        .unwrap();

        assert_eq!(db.next_priority_rank(&alice, day(7)).unwrap(), MAX_PRIORITY_RANK);
    }

    #[test]
    fn test_list_entries_rejects_unrepresentable_offset() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice");
        db.create_entry(&alice, "Plan launch", day(9)).unwrap();

        assert!(db.list_entries(&alice, 10, usize::MAX).is_err());
    }

    #[test]
    fn test_deleting_entry_detaches_priorities() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice");
        let entry = db.create_entry(&alice, "Plan launch", day(9)).unwrap();

        let priority = db
            .create_priority(
                &alice,
                &NewPriority {
                    content: "Launch checklist",
                    rank: 1,
                    date: day(9),
                    journal_entry_id: Some(&entry.id),
                },
            )
            .unwrap();
        assert_eq!(priority.journal_entry_id.as_ref(), Some(&entry.id));

        assert!(db.delete_entry(&alice, &entry.id).unwrap());

        let kept = db.get_priority(&alice, &priority.id).unwrap().unwrap();
        assert!(kept.journal_entry_id.is_none());
    }
}
