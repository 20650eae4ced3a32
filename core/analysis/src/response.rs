use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Model output for an analysed entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryAnalysisPayload {
    #[serde(default)]
    pub priorities: Vec<ExtractedPriority>,
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relationships: Vec<ExtractedRelationship>,
    #[serde(default, alias = "clarifying_questions", alias = "questions")]
    pub clarifying_questions: Vec<QuestionItem>,
}

/// Model output for a day's summary
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailySummaryPayload {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub priorities: Vec<ExtractedPriority>,
}

/// Model output for question generation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionsPayload {
    #[serde(default, alias = "clarifyingQuestions")]
    pub questions: Vec<QuestionItem>,
}

/// Model output after interpreting an answer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerPayload {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relationships: Vec<ExtractedRelationship>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedPriority {
    pub content: String,
    #[serde(default)]
    pub rank: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedEntity {
    #[serde(rename = "type", alias = "entityType")]
    pub entity_type: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Endpoints come either typed (`sourceType` + `sourceName`) or as bare
/// names (`sourceEntityName`)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRelationship {
    #[serde(default, alias = "sourceEntityName", alias = "source")]
    pub source_name: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default, alias = "targetEntityName", alias = "target")]
    pub target_name: Option<String>,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(alias = "type")]
    pub relationship_type: String,
}

/// Questions arrive as plain strings or as `{"question": "..."}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QuestionItem {
    Text(String),
    Object { question: String },
}

impl QuestionItem {
    pub fn text(&self) -> &str {
        match self {
            QuestionItem::Text(text) => text,
            QuestionItem::Object { question } => question,
        }
    }
}

/// Parse a model reply into `T`. Tolerates a Markdown code fence or prose
/// around the JSON object; anything else is an error.
pub fn parse_payload<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let json = extract_json_object(raw)
        .with_context(|| format!("Model reply contains no JSON object: {}", preview(raw)))?;

    serde_json::from_str(json)
        .with_context(|| format!("Model reply does not match the expected shape: {}", preview(raw)))
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

fn preview(raw: &str) -> String {
    let mut text: String = raw.trim().chars().take(120).collect();
    if raw.trim().chars().count() > 120 {
        text.push('…');
    }
    text
}
