use anyhow::Result;
use journal_schemas::{ClarifyingQuestion, QuestionId, QuestionStatus, UserId};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use crate::database::{now_timestamp, Database};

pub(crate) const QUESTION_SELECT: &str =
    "SELECT id, user_id, question, answer, status, created_at, updated_at
     FROM clarifying_questions";

impl Database {
    /// Questions in the order they were asked, optionally filtered by status
    pub fn list_questions(&self, user_id: &UserId, status: Option<QuestionStatus>) -> Result<Vec<ClarifyingQuestion>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at ASC, rowid ASC",
            QUESTION_SELECT
        ))?;

        let questions = stmt
            .query_map(params![user_id.0, status.map(|s| s.as_str())], row_to_question)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(questions)
    }

    pub fn get_question(&self, user_id: &UserId, id: &QuestionId) -> Result<Option<ClarifyingQuestion>> {
        let question = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1 AND user_id = ?2", QUESTION_SELECT),
                params![id.0, user_id.0],
                row_to_question,
            )
            .optional()?;

        Ok(question)
    }

    /// Store the answer and mark the question answered. Re-answering
    /// overwrites the previous answer.
    pub fn answer_question(&self, user_id: &UserId, id: &QuestionId, answer: &str) -> Result<Option<ClarifyingQuestion>> {
        let changed = self.conn.execute(
            "UPDATE clarifying_questions
             SET answer = ?1, status = ?2, updated_at = ?3
             WHERE id = ?4 AND user_id = ?5",
            params![
                answer,
                QuestionStatus::Answered.as_str(),
                now_timestamp(),
                id.0,
                user_id.0
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }

        debug!("Answered question: {}", id);
        self.get_question(user_id, id)
    }

    /// Only pending questions can be dismissed; returns whether a row moved
    pub fn dismiss_question(&self, user_id: &UserId, id: &QuestionId) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE clarifying_questions
             SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND user_id = ?4 AND status = ?5",
            params![
                QuestionStatus::Dismissed.as_str(),
                now_timestamp(),
                id.0,
                user_id.0,
                QuestionStatus::Pending.as_str()
            ],
        )?;

        Ok(changed > 0)
    }

    /// Latest answered questions, used as background for new prompts
    pub fn recent_answered_questions(&self, user_id: &UserId, limit: usize) -> Result<Vec<ClarifyingQuestion>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE user_id = ?1 AND status = ?2
             ORDER BY updated_at DESC, rowid DESC LIMIT ?3",
            QUESTION_SELECT
        ))?;

        let questions = stmt
            .query_map(
                params![user_id.0, QuestionStatus::Answered.as_str(), limit as i64],
                row_to_question,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(questions)
    }
}

pub(crate) fn row_to_question(row: &Row) -> rusqlite::Result<ClarifyingQuestion> {
    let status_raw: String = row.get(4)?;
    let status = QuestionStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown question status '{}'", status_raw).into(),
        )
    })?;

    Ok(ClarifyingQuestion {
        id: QuestionId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        question: row.get(2)?,
        answer: row.get(3)?,
        status,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
