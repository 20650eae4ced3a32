use anyhow::Result;
use chrono::NaiveDate;
use journal_schemas::{
    generate_entity_id, generate_question_id, generate_relationship_id, ClarifyingQuestion,
    ContextEntity, EntityId, EntityRelationship, EntityType, EntryId, Priority, QuestionId, QuestionStatus,
    UserId,
};
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::HashSet;
use tracing::debug;

use crate::database::{format_date, insert_priority, now_timestamp, Database, NewPriority};
use crate::graph::{find_entity, row_to_relationship, RELATIONSHIP_COLUMNS};
use crate::questions::{row_to_question, QUESTION_SELECT};

/// What an entity upsert did to the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    /// Description replaced with a different one
    Updated,
    Unchanged,
}

/// All writes of one reconciliation pass for one user. Runs inside a single
/// IMMEDIATE transaction: committed when the closure passed to
/// [`Database::write_batch`] returns `Ok`, rolled back otherwise.
pub struct WriteBatch<'conn> {
    tx: Transaction<'conn>,
    user_id: UserId,
}

impl Database {
    pub fn write_batch<T, F>(&mut self, user_id: &UserId, apply: F) -> Result<T>
    where
        F: FnOnce(&WriteBatch) -> Result<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let batch = WriteBatch {
            tx,
            user_id: user_id.clone(),
        };

        let output = apply(&batch)?;
        batch.tx.commit()?;

        Ok(output)
    }
}

impl<'conn> WriteBatch<'conn> {
    /// Whether the entry is still present, as seen by this transaction
    pub fn entry_exists(&self, entry_id: &EntryId) -> Result<bool> {
        let found = self
            .tx
            .query_row(
                "SELECT 1 FROM journal_entries WHERE id = ?1 AND user_id = ?2",
                params![entry_id.0, self.user_id.0],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn insert_priority(&self, new: &NewPriority) -> Result<Priority> {
        insert_priority(&self.tx, &self.user_id, new)
    }

    /// Normalised contents of the priorities already filed for a day
    pub fn priority_contents_for_date(&self, date: NaiveDate) -> Result<HashSet<String>> {
        let mut stmt = self
            .tx
            .prepare("SELECT content FROM priorities WHERE user_id = ?1 AND date = ?2")?;

        let contents = stmt
            .query_map(params![self.user_id.0, format_date(date)], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(contents.iter().map(|c| normalize_content(c)).collect())
    }

    /// Insert the entity, or overwrite its description when the new one is
    /// non-empty and differs. Identity is `(user, type, name)` with the name
    /// compared case-insensitively.
    pub fn upsert_entity(
        &self,
        entity_type: EntityType,
        name: &str,
        description: Option<&str>,
    ) -> Result<(ContextEntity, UpsertOutcome)> {
        let name = name.trim();
        let description = description.map(str::trim).filter(|d| !d.is_empty());
        let candidate_id = generate_entity_id();
        let now = now_timestamp();

        let written: Option<String> = self
            .tx
            .query_row(
                "INSERT INTO context_entities (id, user_id, entity_type, name, description,
                                               metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, '{}', ?6, ?6)
                 ON CONFLICT(user_id, entity_type, name) DO UPDATE SET
                     description = excluded.description,
                     updated_at = excluded.updated_at
                 WHERE excluded.description IS NOT NULL
                   AND context_entities.description IS NOT excluded.description
                 RETURNING id",
                params![
                    candidate_id.0,
                    self.user_id.0,
                    entity_type.as_str(),
                    name,
                    description,
                    now
                ],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match written {
            Some(ref id) if *id == candidate_id.0 => UpsertOutcome::Created,
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Unchanged,
        };

        let entity = find_entity(&self.tx, &self.user_id, Some(entity_type), name)?
            .ok_or_else(|| anyhow::anyhow!("Entity {} '{}' vanished after upsert", entity_type, name))?;

        debug!("Upserted entity {} '{}' ({:?})", entity_type, entity.name, outcome);
        Ok((entity, outcome))
    }

    /// Stored entity by name, narrowed by type when given
    pub fn find_entity(&self, entity_type: Option<EntityType>, name: &str) -> Result<Option<ContextEntity>> {
        find_entity(&self.tx, &self.user_id, entity_type, name)
    }

    /// The new edge, or `None` when the same edge already existed
    pub fn insert_relationship(
        &self,
        source: &EntityId,
        target: &EntityId,
        relationship_type: &str,
    ) -> Result<Option<EntityRelationship>> {
        let now = now_timestamp();
        let inserted = self
            .tx
            .query_row(
                &format!(
                    "INSERT INTO entity_relationships (id, user_id, source_entity_id, target_entity_id,
                                                       relationship_type, metadata, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, '{{}}', ?6, ?6)
                     ON CONFLICT(user_id, source_entity_id, target_entity_id, relationship_type) DO NOTHING
                     RETURNING {}",
                    RELATIONSHIP_COLUMNS
                ),
                params![
                    generate_relationship_id().0,
                    self.user_id.0,
                    source.0,
                    target.0,
                    relationship_type,
                    now
                ],
                row_to_relationship,
            )
            .optional()?;

        debug!(
            "Relationship {} -{}-> {} ({})",
            source,
            relationship_type,
            target,
            if inserted.is_some() { "created" } else { "exists" }
        );
        Ok(inserted)
    }

    /// New pending question, or `None` when the same text was already asked
    pub fn insert_question(&self, question: &str) -> Result<Option<ClarifyingQuestion>> {
        let id = generate_question_id();
        let now = now_timestamp();

        let inserted = self.tx.execute(
            "INSERT INTO clarifying_questions (id, user_id, question, answer, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?5)
             ON CONFLICT(user_id, question) DO NOTHING",
            params![
                id.0,
                self.user_id.0,
                question.trim(),
                QuestionStatus::Pending.as_str(),
                now
            ],
        )?;

        if inserted == 0 {
            return Ok(None);
        }

        self.get_question(&id)
    }

    fn get_question(&self, id: &QuestionId) -> Result<Option<ClarifyingQuestion>> {
        let question = self
            .tx
            .query_row(
                &format!("{} WHERE id = ?1 AND user_id = ?2", QUESTION_SELECT),
                params![id.0, self.user_id.0],
                row_to_question,
            )
            .optional()?;
        Ok(question)
    }
}

/// Comparison key for same-day priority dedup
pub fn normalize_content(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
