use chrono::NaiveDate;
use journal_composer::{ContextComposer, ContextLimits, Prompt, PromptTemplates};
use journal_schemas::{
    AnswerResponse, ClarifyingQuestion, DailySummaryResponse, EntryAnalysisResponse, EntryId,
    QuestionId, QuestionStatus, UserId,
};
use journal_storage::Database;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AnalysisError, AnalysisResult};
use crate::llm::ChatModel;
use crate::reconciler::{apply_graph, apply_priorities, apply_questions};
use crate::response::{
    parse_payload, AnswerPayload, DailySummaryPayload, EntryAnalysisPayload, QuestionsPayload,
};

/// Entry points of the extraction pipeline. Each one reads its context under
/// the database lock, releases it for the model call, then applies the reply
/// in a single write batch.
pub struct Analyzer {
    db: Arc<Mutex<Database>>,
    model: Arc<dyn ChatModel>,
    composer: ContextComposer,
    templates: PromptTemplates,
}

impl Analyzer {
    pub fn new(db: Arc<Mutex<Database>>, model: Arc<dyn ChatModel>, limits: ContextLimits) -> Self {
        Self {
            db,
            model,
            composer: ContextComposer::new(limits),
            templates: PromptTemplates::new(),
        }
    }

    /// Extract priorities, entities, relationships and questions from one entry
    pub async fn analyze_entry(
        &self,
        user_id: &UserId,
        entry_id: &EntryId,
    ) -> AnalysisResult<EntryAnalysisResponse> {
        let (entry, prompt) = {
            let db = self.db.lock().await;
            let entry = db
                .get_entry(user_id, entry_id)?
                .ok_or_else(|| AnalysisError::NotFound(format!("Journal entry {}", entry_id)))?;
            let context = self.composer.for_entry(&db, user_id, &entry)?;
            let prompt = self.templates.entry_analysis(&entry, &context);
            (entry, prompt)
        };

        info!("Analyzing entry {} for {}", entry.id, user_id);
        let payload: EntryAnalysisPayload = self.complete(&prompt).await?;

        let mut db = self.db.lock().await;
        let response = db.write_batch(user_id, |batch| {
            // The entry may have been deleted while the model was busy
            if !batch.entry_exists(&entry.id)? {
                return Ok(None);
            }

            let priorities =
                apply_priorities(batch, &payload.priorities, entry.date, Some(&entry.id), false)?;
            let (entities, relationships) =
                apply_graph(batch, &payload.entities, &payload.relationships)?;
            let questions = apply_questions(batch, &payload.clarifying_questions)?;

            Ok(Some(EntryAnalysisResponse {
                entry_id: entry.id.clone(),
                priorities,
                entities,
                relationships,
                questions,
            }))
        })?
        .ok_or_else(|| AnalysisError::NotFound(format!("Journal entry {}", entry.id)))?;

        info!(
            "Entry {} analyzed: {} priorities, {} new entities, {} new relationships, {} questions",
            entry.id,
            response.priorities.len(),
            response.entities.created,
            response.relationships.created,
            response.questions.len()
        );

        Ok(response)
    }

    /// Summarise a day and file the priorities it implies. A day without
    /// entries returns its existing priorities without asking the model.
    pub async fn daily_summary(
        &self,
        user_id: &UserId,
        date: NaiveDate,
    ) -> AnalysisResult<DailySummaryResponse> {
        let prompt = {
            let db = self.db.lock().await;
            let entries = db.list_entries_by_date(user_id, date)?;
            let existing = db.list_priorities(user_id, Some(date))?;

            if entries.is_empty() {
                debug!("No entries for {} on {}, skipping summary", user_id, date);
                return Ok(DailySummaryResponse {
                    date,
                    summary: None,
                    priorities: existing,
                    created: 0,
                });
            }

            let existing: Vec<String> = existing.into_iter().map(|p| p.content).collect();
            let context = self.composer.for_date(&db, user_id)?;
            self.templates.daily_summary(date, &entries, &existing, &context)
        };

        info!("Summarizing {} for {}", date, user_id);
        let payload: DailySummaryPayload = self.complete(&prompt).await?;

        let mut db = self.db.lock().await;
        let created = db.write_batch(user_id, |batch| {
            apply_priorities(batch, &payload.priorities, date, None, true)
        })?;
        let priorities = db.list_priorities(user_id, Some(date))?;

        let summary = payload
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(DailySummaryResponse {
            date,
            summary,
            priorities,
            created: created.len(),
        })
    }

    /// Pending questions, generating a fresh set only when none are pending
    pub async fn clarifying_questions(&self, user_id: &UserId) -> AnalysisResult<Vec<ClarifyingQuestion>> {
        let prompt = {
            let db = self.db.lock().await;
            let pending = db.list_questions(user_id, Some(QuestionStatus::Pending))?;
            if !pending.is_empty() {
                debug!("{} pending questions for {}, not generating", pending.len(), user_id);
                return Ok(pending);
            }

            let context = self.composer.for_questions(&db, user_id)?;
            if context.recent_entries.is_empty() && context.entities.is_empty() {
                debug!("Nothing known about {} yet, no questions to ask", user_id);
                return Ok(Vec::new());
            }

            self.templates.question_generation(&context)
        };

        info!("Generating clarifying questions for {}", user_id);
        let payload: QuestionsPayload = self.complete(&prompt).await?;

        let mut db = self.db.lock().await;
        let created = db.write_batch(user_id, |batch| apply_questions(batch, &payload.questions))?;
        debug!("Stored {} new questions for {}", created.len(), user_id);

        Ok(db.list_questions(user_id, Some(QuestionStatus::Pending))?)
    }

    /// Record the answer, then fold what it says into the context graph.
    /// The answer stays recorded even if the model call fails.
    pub async fn answer_question(
        &self,
        user_id: &UserId,
        question_id: &QuestionId,
        answer: &str,
    ) -> AnalysisResult<AnswerResponse> {
        let (question, prompt) = {
            let db = self.db.lock().await;
            let question = db
                .answer_question(user_id, question_id, answer)?
                .ok_or_else(|| AnalysisError::NotFound(format!("Question {}", question_id)))?;
            let context = self.composer.for_answer(&db, user_id)?;
            let prompt = self.templates.answer_interpretation(&question, answer, &context);
            (question, prompt)
        };

        info!("Interpreting answer to {} for {}", question.id, user_id);
        let payload: AnswerPayload = self.complete(&prompt).await?;

        let mut db = self.db.lock().await;
        let (entities, relationships) = db.write_batch(user_id, |batch| {
            apply_graph(batch, &payload.entities, &payload.relationships)
        })?;

        Ok(AnswerResponse {
            question,
            entities,
            relationships,
        })
    }

    /// `pending -> dismissed`; any other starting state is rejected
    pub async fn dismiss_question(
        &self,
        user_id: &UserId,
        question_id: &QuestionId,
    ) -> AnalysisResult<ClarifyingQuestion> {
        let db = self.db.lock().await;
        let question = db
            .get_question(user_id, question_id)?
            .ok_or_else(|| AnalysisError::NotFound(format!("Question {}", question_id)))?;

        if !db.dismiss_question(user_id, question_id)? {
            return Err(AnalysisError::InvalidTransition(format!(
                "Question {} is {} and cannot be dismissed",
                question_id,
                question.status.as_str()
            )));
        }

        info!("Dismissed question {} for {}", question_id, user_id);
        db.get_question(user_id, question_id)?
            .ok_or_else(|| AnalysisError::NotFound(format!("Question {}", question_id)))
    }

    async fn complete<T: DeserializeOwned>(&self, prompt: &Prompt) -> AnalysisResult<T> {
        debug!("Calling {}", self.model.describe());

        let raw = self
            .model
            .complete_json(prompt)
            .await
            .map_err(AnalysisError::Upstream)?;

        parse_payload(&raw).map_err(AnalysisError::Upstream)
    }
}
