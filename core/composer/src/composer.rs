use anyhow::Result;
use journal_schemas::{ClarifyingQuestion, ContextEntity, JournalEntry, RelationshipView, UserId};
use journal_storage::Database;
use tracing::debug;

/// Window sizes for the evidence handed to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    /// Recent entries shown next to an entry under analysis
    pub entries: usize,
    /// Recent entries shown when generating questions
    pub question_entries: usize,
    pub entities: usize,
    pub relationships: usize,
    pub answered_questions: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            entries: 5,
            question_entries: 10,
            entities: 20,
            relationships: 30,
            answered_questions: 10,
        }
    }
}

/// Read-only evidence set for one extraction request
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub recent_entries: Vec<JournalEntry>,
    pub entities: Vec<ContextEntity>,
    pub relationships: Vec<RelationshipView>,
    pub answered_questions: Vec<ClarifyingQuestion>,
}

/// Gathers bounded context windows for a user
pub struct ContextComposer {
    limits: ContextLimits,
}

impl ContextComposer {
    pub fn new(limits: ContextLimits) -> Self {
        Self { limits }
    }

    /// Context for analysing one entry: the entries around it, the graph and
    /// what the user already told us
    pub fn for_entry(&self, db: &Database, user_id: &UserId, entry: &JournalEntry) -> Result<AnalysisContext> {
        let context = AnalysisContext {
            recent_entries: db.recent_entries(user_id, self.limits.entries, Some(&entry.id))?,
            entities: db.recent_entities(user_id, self.limits.entities)?,
            relationships: db.recent_relationships(user_id, self.limits.relationships)?,
            answered_questions: db.recent_answered_questions(user_id, self.limits.answered_questions)?,
        };

        self.log("entry", &context);
        Ok(context)
    }

    /// Graph context for a daily summary; the day's own entries are the input
    pub fn for_date(&self, db: &Database, user_id: &UserId) -> Result<AnalysisContext> {
        let context = AnalysisContext {
            recent_entries: Vec::new(),
            entities: db.recent_entities(user_id, self.limits.entities)?,
            relationships: db.recent_relationships(user_id, self.limits.relationships)?,
            answered_questions: Vec::new(),
        };

        self.log("daily summary", &context);
        Ok(context)
    }

    /// Context for finding gaps in the graph. Answered questions are included
    /// so the model does not ask them again.
    pub fn for_questions(&self, db: &Database, user_id: &UserId) -> Result<AnalysisContext> {
        let context = AnalysisContext {
            recent_entries: db.recent_entries(user_id, self.limits.question_entries, None)?,
            entities: db.recent_entities(user_id, self.limits.entities)?,
            relationships: db.recent_relationships(user_id, self.limits.relationships)?,
            answered_questions: db.recent_answered_questions(user_id, self.limits.answered_questions)?,
        };

        self.log("question generation", &context);
        Ok(context)
    }

    /// The graph an answer will be folded into
    pub fn for_answer(&self, db: &Database, user_id: &UserId) -> Result<AnalysisContext> {
        let context = AnalysisContext {
            recent_entries: Vec::new(),
            entities: db.recent_entities(user_id, self.limits.entities)?,
            relationships: db.recent_relationships(user_id, self.limits.relationships)?,
            answered_questions: Vec::new(),
        };

        self.log("answer", &context);
        Ok(context)
    }

    fn log(&self, purpose: &str, context: &AnalysisContext) {
        debug!(
            "Assembled {} context: {} entries, {} entities, {} relationships, {} answers",
            purpose,
            context.recent_entries.len(),
            context.entities.len(),
            context.relationships.len(),
            context.answered_questions.len()
        );
    }
}
